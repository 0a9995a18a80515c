//! The pulse timer (§4.7): a monotonic-tick counter with an
//! operator/agent-settable interval from a fixed enumeration, driven off
//! elapsed wall time rather than a naive sleep loop so a suspended process
//! doesn't fire a burst of catch-up pulses on resume.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use aigent_config::PULSE_INTERVAL_OPTIONS_SECONDS;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

pub struct PulseTimer {
    interval_seconds: AtomicU64,
    paused: AtomicBool,
    elapsed_seconds: AtomicU64,
}

impl PulseTimer {
    pub fn new(initial_interval_seconds: u64) -> Arc<Self> {
        let interval = if PULSE_INTERVAL_OPTIONS_SECONDS.contains(&initial_interval_seconds) {
            initial_interval_seconds
        } else {
            warn!(requested = initial_interval_seconds, "pulse interval not in the allowed enumeration, defaulting to 1800s");
            1800
        };
        Arc::new(Self {
            interval_seconds: AtomicU64::new(interval),
            paused: AtomicBool::new(false),
            elapsed_seconds: AtomicU64::new(0),
        })
    }

    pub fn set_interval(&self, seconds: u64) -> bool {
        if !PULSE_INTERVAL_OPTIONS_SECONDS.contains(&seconds) {
            return false;
        }
        self.interval_seconds.store(seconds, Ordering::SeqCst);
        true
    }

    pub fn interval_seconds(&self) -> u64 {
        self.interval_seconds.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.elapsed_seconds.store(0, Ordering::SeqCst);
    }

    /// Human-readable label for the prompt assembler's pulse-info source.
    pub fn interval_label(&self) -> &'static str {
        match self.interval_seconds() {
            180 => "3 minutes",
            600 => "10 minutes",
            1800 => "30 minutes",
            3600 => "1 hour",
            7200 => "2 hours",
            10800 => "3 hours",
            21600 => "6 hours",
            43200 => "12 hours",
            _ => "an unrecognized interval",
        }
    }

    /// Runs the tick loop until the returned `JoinHandle` is dropped/aborted.
    /// Ticks once per second; fires (and resets) when accumulated elapsed
    /// wall time reaches the current interval. While paused, elapsed time
    /// does not accumulate, matching "paused while the executor is busy".
    pub fn spawn(self: Arc<Self>, fire_tx: mpsc::UnboundedSender<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut last_tick = Instant::now();
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                let now = Instant::now();
                let delta = now.duration_since(last_tick);
                last_tick = now;

                if self.paused.load(Ordering::SeqCst) {
                    continue;
                }

                let elapsed = self.elapsed_seconds.fetch_add(delta.as_secs().max(1), Ordering::SeqCst) + delta.as_secs().max(1);
                if elapsed >= self.interval_seconds() {
                    self.elapsed_seconds.store(0, Ordering::SeqCst);
                    debug!(interval = self.interval_seconds(), "pulse fired");
                    if fire_tx.send(()).is_err() {
                        return;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_interval_outside_enumeration() {
        let timer = PulseTimer::new(1800);
        assert!(!timer.set_interval(42));
        assert_eq!(timer.interval_seconds(), 1800);
        assert!(timer.set_interval(3600));
        assert_eq!(timer.interval_seconds(), 3600);
    }

    #[test]
    fn falls_back_to_default_on_bad_initial_value() {
        let timer = PulseTimer::new(999);
        assert_eq!(timer.interval_seconds(), 1800);
    }
}
