//! Unified daemon server — owns the `TurnExecutor` and exposes it over a
//! Unix domain socket so the CLI/TUI/Telegram front ends can submit turns
//! and subscribe to streamed output without linking the executor directly.

mod connection;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::net::UnixListener;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

use aigent_agent::TurnExecutor;
use aigent_config::AppConfig;
use aigent_exec::{ExecutionPolicy, ToolExecutor};
use aigent_llm::LlmRouter;
use aigent_memory::AgentMemory;
use aigent_thinker::ModelClient;
use aigent_tools::ToolRegistry;
use aigent_tools::builtins::memory_tools::{
    AdvanceCuriosityTool, CaptureScreenshotTool, CaptureWebcamTool, CompleteReminderTool,
    CreateReminderTool, DelegateTaskTool, DismissReminderTool, ListRemindersTool,
    RemoveGrowthThreadTool, RequestClarificationTool, SearchMemoriesTool, SendTelegramTool,
    SetActiveThoughtsTool, SetGrowthThreadTool, SetPulseIntervalTool, StoreCoreMemoryTool,
};

struct DaemonState {
    started_at: Instant,
}

fn build_execution_policy(config: &AppConfig) -> ExecutionPolicy {
    let workspace_root = PathBuf::from(&config.agent.workspace_path);
    ExecutionPolicy {
        approval_mode: config.tools.approval_mode.clone(),
        approval_required: config.safety.approval_required,
        allow_shell: config.safety.allow_shell,
        allow_wasm: config.safety.allow_wasm,
        workspace_root,
        tool_allowlist: config.safety.tool_allowlist.clone(),
        tool_denylist: config.safety.tool_denylist.clone(),
        approval_exempt_tools: config.safety.approval_exempt_tools.clone(),
        git_auto_commit: config.tools.git_auto_commit,
        sandbox_enabled: config.tools.sandbox_enabled,
    }
}

/// Builds the tool registry the turn executor hands to the tool loop: the
/// general-purpose workspace tools from `aigent-exec`, plus the
/// memory-subsystem tool surface that shares the same `AgentMemory` lock.
fn build_tool_registry(memory: Arc<Mutex<AgentMemory>>, config: &AppConfig) -> ToolRegistry {
    let workspace_root = PathBuf::from(&config.agent.workspace_path);
    let agent_data_dir = std::path::Path::new(".aigent").to_path_buf();
    let brave_api_key = {
        let key = config.tools.brave_api_key.trim().to_string();
        if key.is_empty() { None } else { Some(key) }
    };
    let mut registry = aigent_exec::default_registry(workspace_root, agent_data_dir, brave_api_key, config);

    registry.register(Box::new(SearchMemoriesTool { memory: memory.clone() }));
    registry.register(Box::new(StoreCoreMemoryTool { memory: memory.clone() }));
    registry.register(Box::new(SetActiveThoughtsTool { memory: memory.clone() }));
    registry.register(Box::new(SetGrowthThreadTool { memory: memory.clone() }));
    registry.register(Box::new(RemoveGrowthThreadTool { memory: memory.clone() }));
    registry.register(Box::new(CreateReminderTool { memory: memory.clone() }));
    registry.register(Box::new(CompleteReminderTool { memory: memory.clone() }));
    registry.register(Box::new(DismissReminderTool { memory: memory.clone() }));
    registry.register(Box::new(ListRemindersTool { memory: memory.clone() }));
    registry.register(Box::new(AdvanceCuriosityTool { memory }));
    registry.register(Box::new(SetPulseIntervalTool));
    registry.register(Box::new(RequestClarificationTool));
    registry.register(Box::new(SendTelegramTool));
    registry.register(Box::new(CaptureScreenshotTool));
    registry.register(Box::new(CaptureWebcamTool));
    registry.register(Box::new(DelegateTaskTool));

    registry
}

/// Build an async embedding function that calls the Ollama `/api/embeddings`
/// endpoint. Falls back to `None` silently so the system keeps working when
/// Ollama is unavailable.
fn make_ollama_embed_fn(model: &str, base_url: &str) -> aigent_memory::EmbedFn {
    let model = model.to_string();
    let base_url = std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| base_url.to_string());
    let url = format!("{}/api/embeddings", base_url.trim_end_matches('/'));

    let client = reqwest::Client::builder().timeout(std::time::Duration::from_secs(5)).build().unwrap_or_default();

    Arc::new(move |text: String| {
        let client = client.clone();
        let url = url.clone();
        let model = model.clone();
        Box::pin(async move {
            let body = serde_json::json!({ "model": model, "prompt": text });
            let resp = client.post(&url).json(&body).send().await.ok()?;
            let json: serde_json::Value = resp.json().await.ok()?;
            let embedding = json["embedding"].as_array()?.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect::<Vec<f32>>();
            if embedding.is_empty() { None } else { Some(embedding) }
        })
    })
}

pub async fn run_unified_daemon(config: AppConfig, memory_data_dir: impl AsRef<Path>, socket_path: impl AsRef<Path>) -> Result<()> {
    let socket_path = socket_path.as_ref().to_path_buf();
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }

    let mut memory = AgentMemory::new(memory_data_dir.as_ref(), config.context_window.window_size, config.context_window.overflow_trigger)
        .with_embed_fn(make_ollama_embed_fn(&config.llm.ollama_model, &config.llm.ollama_base_url));
    let purged = memory.load()?;
    if purged > 0 {
        info!(purged, "discarded empty assistant turns found in the turn log at startup");
    }
    let memory = Arc::new(Mutex::new(memory));

    let policy = build_execution_policy(&config);
    let workspace_root = policy.workspace_root.clone();
    std::fs::create_dir_all(&workspace_root).ok();
    if let Err(e) = aigent_exec::git::git_init_if_needed(&workspace_root).await {
        warn!(?e, "failed to auto-init workspace git repo (non-fatal)");
    }

    let tool_registry = Arc::new(build_tool_registry(memory.clone(), &config));
    let tool_executor = Arc::new(ToolExecutor::new(policy));
    let model = ModelClient::new(LlmRouter::default());

    let executor = TurnExecutor::new(config, memory, model, tool_registry, tool_executor);
    executor.spawn_drivers();
    let run_handle = tokio::spawn(executor.clone().run());

    let state = Arc::new(Mutex::new(DaemonState { started_at: Instant::now() }));

    let listener = UnixListener::bind(&socket_path)?;
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    info!(path = %socket_path.display(), "unified daemon listening");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_ok() && *shutdown_rx.borrow() {
                    break;
                }
            }
            accept = listener.accept() => {
                let (stream, _) = accept?;
                let state = state.clone();
                let executor = executor.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = connection::handle_connection(stream, executor, state, shutdown_tx).await {
                        error!(?err, "daemon connection handler failed");
                    }
                });
            }
        }
    }

    info!("daemon shutting down gracefully");
    run_handle.abort();
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}
