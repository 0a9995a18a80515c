pub mod app;
pub mod events;
pub mod onboard;
pub mod theme;
pub mod tui;
pub mod widgets;

pub use app::{App, AppState, Focus, UiCommand};
pub use events::AppEvent;
