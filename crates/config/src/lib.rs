use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// How much autonomy the agent has to run tools without interactive sign-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Run everything, including destructive tools, without prompting.
    Autonomous,
    /// Prompt only for destructive/irreversible actions.
    Balanced,
    /// Prompt for anything beyond read-only tools.
    Safer,
}

impl Default for ApprovalMode {
    fn default() -> Self {
        ApprovalMode::Balanced
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub user_name: String,
    pub workspace_path: String,
    pub thinking_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "Aigent".to_string(),
            user_name: String::new(),
            workspace_path: ".".to_string(),
            thinking_level: "balanced".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub ollama_model: String,
    pub openrouter_model: String,
    pub ollama_local_first: bool,
    /// Base URL for the Ollama API.  Overridden at runtime by the
    /// `OLLAMA_BASE_URL` environment variable when set.
    pub ollama_base_url: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            ollama_model: "llama3.1:8b".to_string(),
            openrouter_model: "openai/gpt-4o-mini".to_string(),
            ollama_local_first: true,
            ollama_base_url: "http://localhost:11434".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub backend: String,
    pub auto_sleep_minutes: u64,
    pub auto_sleep_turn_interval: usize,
    pub auto_sleep_mode: String,
    pub night_sleep_start_hour: u8,
    pub night_sleep_end_hour: u8,
    pub core_rewrite_requires_approval: bool,
    /// Number of non-anchor entries per multi-agent sleep batch.
    /// Core and UserProfile entries are always replicated into every batch.
    pub multi_agent_sleep_batch_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: "eventlog".to_string(),
            auto_sleep_minutes: 120,
            auto_sleep_turn_interval: 6,
            auto_sleep_mode: "nightly".to_string(),
            night_sleep_start_hour: 22,
            night_sleep_end_hour: 6,
            core_rewrite_requires_approval: true,
            multi_agent_sleep_batch_size: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub approval_required: bool,
    pub allow_shell: bool,
    pub allow_wasm: bool,
    pub tool_allowlist: Vec<String>,
    pub tool_denylist: Vec<String>,
    pub approval_exempt_tools: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            approval_required: true,
            allow_shell: false,
            allow_wasm: false,
            tool_allowlist: Vec::new(),
            tool_denylist: Vec::new(),
            approval_exempt_tools: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub trusted_write_paths: Vec<String>,
    pub trusted_repos: Vec<String>,
    pub allow_system_read: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            trusted_write_paths: Vec::new(),
            trusted_repos: Vec::new(),
            allow_system_read: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub approval_mode: ApprovalMode,
    pub max_tool_passes: usize,
    pub web_search_enabled: bool,
    pub web_search_daily_cap: u32,
    pub web_fetch_enabled: bool,
    pub web_fetch_daily_cap: u32,
    pub brave_api_key: String,
    /// Use the provider's native tool/function-calling protocol instead of
    /// the text-prompted fallback format.
    pub use_native_calling: bool,
    pub git_auto_commit: bool,
    pub sandbox_enabled: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            approval_mode: ApprovalMode::Balanced,
            max_tool_passes: 10,
            web_search_enabled: true,
            web_search_daily_cap: 50,
            web_fetch_enabled: true,
            web_fetch_daily_cap: 50,
            brave_api_key: String::new(),
            use_native_calling: true,
            git_auto_commit: false,
            sandbox_enabled: true,
        }
    }
}

/// Allowed pulse intervals, in seconds (§4.2): 3m/10m/30m/1h/2h/3h/6h/12h.
pub const PULSE_INTERVAL_OPTIONS_SECONDS: [u64; 8] =
    [180, 600, 1800, 3600, 7200, 10800, 21600, 43200];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextWindowConfig {
    pub window_size: usize,
    pub overflow_trigger: usize,
}

impl Default for ContextWindowConfig {
    fn default() -> Self {
        Self {
            window_size: 30,
            overflow_trigger: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CuriosityConfig {
    pub enabled: bool,
    pub dormant_days: u32,
    pub fresh_hours: u32,
    pub min_importance: f32,
    pub weight_dormancy: f32,
    pub weight_freshness: f32,
    pub weight_importance: f32,
}

impl Default for CuriosityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dormant_days: 7,
            fresh_hours: 48,
            min_importance: 0.4,
            weight_dormancy: 0.4,
            weight_freshness: 0.3,
            weight_importance: 0.3,
        }
    }
}

/// Per-task-category model routing, keyed by `ModelTask` name
/// (`conversation` / `extraction` / `simple` / `delegation`), plus the
/// intra-provider failover model for each.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelRoutingConfig {
    pub task_models: HashMap<String, String>,
    pub failover_map: HashMap<String, String>,
    /// Seconds to wait before retrying a turn after both the primary and
    /// failover model were unavailable (§4.6), roughly 20 minutes.
    pub deferred_retry_delay_seconds: u64,
}

impl Default for ModelRoutingConfig {
    fn default() -> Self {
        let mut task_models = HashMap::new();
        task_models.insert("conversation".to_string(), "llama3.1:8b".to_string());
        task_models.insert("extraction".to_string(), "llama3.1:8b".to_string());
        task_models.insert("simple".to_string(), "llama3.1:8b".to_string());
        task_models.insert("delegation".to_string(), "llama3.1:8b".to_string());

        let mut failover_map = HashMap::new();
        failover_map.insert("conversation".to_string(), "llama3.1:8b".to_string());
        failover_map.insert("extraction".to_string(), "llama3.1:8b".to_string());
        failover_map.insert("simple".to_string(), "llama3.1:8b".to_string());
        failover_map.insert("delegation".to_string(), "llama3.1:8b".to_string());

        Self {
            task_models,
            failover_map,
            deferred_retry_delay_seconds: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OnboardingConfig {
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IntegrationsConfig {
    pub telegram_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub socket_path: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/aigent.sock".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub safety: SafetyConfig,
    pub git: GitConfig,
    pub tools: ToolsConfig,
    pub pulse: PulseConfig,
    pub context_window: ContextWindowConfig,
    pub curiosity: CuriosityConfig,
    pub model_routing: ModelRoutingConfig,
    pub telemetry: TelemetryConfig,
    pub onboarding: OnboardingConfig,
    pub integrations: IntegrationsConfig,
    pub daemon: DaemonConfig,
}

impl AppConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)?;
        }

        if let Ok(value) = env::var("OLLAMA_BASE_URL") {
            if !value.is_empty() {
                config.llm.provider = "ollama".to_string();
            }
        }

        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    pub fn active_model(&self) -> &str {
        if self.llm.provider.eq_ignore_ascii_case("openrouter") {
            &self.llm.openrouter_model
        } else {
            &self.llm.ollama_model
        }
    }

    pub fn needs_onboarding(&self) -> bool {
        !self.onboarding.completed
    }
}
