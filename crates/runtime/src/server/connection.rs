//! Unix domain socket connection handling and command dispatch.

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::warn;

use aigent_agent::{ExecutorEvent, TurnExecutor};

use crate::{BackendEvent, ClientCommand, DaemonStatus, ServerEvent};

use super::DaemonState;

fn to_backend_event(event: ExecutorEvent) -> BackendEvent {
    match event {
        ExecutorEvent::TextChunk(chunk) => BackendEvent::Token(chunk),
        ExecutorEvent::Turn { text, .. } => BackendEvent::ExternalTurn { source: "agent".to_string(), content: text },
        ExecutorEvent::Clarification { question, options } => BackendEvent::Clarification { question, options },
        ExecutorEvent::BothModelsUnavailable => BackendEvent::BothModelsUnavailable,
    }
}

pub(super) async fn handle_connection(
    stream: UnixStream,
    executor: Arc<TurnExecutor>,
    state: Arc<Mutex<DaemonState>>,
    shutdown_tx: watch::Sender<bool>,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(());
    }

    let command: ClientCommand = serde_json::from_str(line.trim())?;

    match command {
        // ── Persistent subscription — every TextChunk/Turn/Clarification
        //    event the executor broadcasts, forwarded verbatim.
        ClientCommand::Subscribe => {
            let mut rx = executor.subscribe();
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if send_event(&mut write_half, ServerEvent::Backend(to_backend_event(event))).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(n, "subscribe client lagged; {n} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            return Ok(());
        }
        ClientCommand::SubmitTurn { user, source } => {
            send_event(&mut write_half, ServerEvent::Backend(BackendEvent::Thinking)).await?;

            // Ride the broadcast stream for this turn's token chunks while
            // waiting for the oneshot reply that carries the terminal text.
            let mut rx = executor.subscribe();
            let mut reply_rx = if source.eq_ignore_ascii_case("telegram") {
                executor.events().submit_telegram_inbound(user);
                None
            } else {
                Some(executor.events().submit_user_awaiting_reply(user, None))
            };

            loop {
                tokio::select! {
                    biased;
                    event = rx.recv() => {
                        match event {
                            Ok(ExecutorEvent::TextChunk(chunk)) => {
                                if send_event(&mut write_half, ServerEvent::Backend(BackendEvent::Token(chunk))).await.is_err() {
                                    break;
                                }
                            }
                            Ok(ExecutorEvent::Turn { text, .. }) if reply_rx.is_none() => {
                                send_event(&mut write_half, ServerEvent::Backend(BackendEvent::MemoryUpdated)).await?;
                                send_event(&mut write_half, ServerEvent::Backend(BackendEvent::ExternalTurn { source: "agent".to_string(), content: text })).await?;
                                send_event(&mut write_half, ServerEvent::Backend(BackendEvent::Done)).await?;
                                break;
                            }
                            Ok(ExecutorEvent::Clarification { question, options }) => {
                                send_event(&mut write_half, ServerEvent::Backend(BackendEvent::Clarification { question, options })).await?;
                            }
                            Ok(ExecutorEvent::BothModelsUnavailable) => {
                                send_event(&mut write_half, ServerEvent::Backend(BackendEvent::BothModelsUnavailable)).await?;
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(n)) => warn!(n, "submit stream lagged"),
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                    reply = async { reply_rx.as_mut().unwrap().await }, if reply_rx.is_some() => {
                        match reply {
                            Ok(text) => {
                                send_event(&mut write_half, ServerEvent::Backend(BackendEvent::MemoryUpdated)).await?;
                                send_event(&mut write_half, ServerEvent::Backend(BackendEvent::ExternalTurn { source: "agent".to_string(), content: text })).await?;
                                send_event(&mut write_half, ServerEvent::Backend(BackendEvent::Done)).await?;
                            }
                            Err(_) => {
                                send_event(&mut write_half, ServerEvent::Backend(BackendEvent::Error("turn executor dropped the reply channel".to_string()))).await?;
                                send_event(&mut write_half, ServerEvent::Backend(BackendEvent::Done)).await?;
                            }
                        }
                        break;
                    }
                }
            }
        }
        ClientCommand::GetStatus => {
            let s = state.lock().await;
            let config = executor.config();
            let mem = executor.memory();
            let mem = mem.lock().await;
            let status = DaemonStatus {
                bot_name: config.agent.name.clone(),
                provider: config.llm.provider.clone(),
                model: config.active_model().to_string(),
                thinking_level: config.agent.thinking_level.clone(),
                memory_total: mem.turns.turn_count(),
                memory_core: mem.core.all().len(),
                memory_user_profile: mem.active_thoughts.all().len(),
                memory_reflective: mem.growth_threads.active().len() + mem.growth_threads.dormant().len(),
                memory_semantic: mem.long_term.all().iter().filter(|m| matches!(m.memory_type, aigent_memory::LongTermMemoryType::Factual)).count(),
                memory_episodic: mem.long_term.all().iter().filter(|m| matches!(m.memory_type, aigent_memory::LongTermMemoryType::Episodic)).count(),
                uptime_secs: s.started_at.elapsed().as_secs(),
                available_tools: executor.tool_registry().list_specs().iter().map(|spec| spec.name.clone()).collect(),
            };
            send_event(&mut write_half, ServerEvent::Status(status)).await?;
        }
        ClientCommand::GetMemoryPeek { limit } => {
            let mem = executor.memory();
            let mem = mem.lock().await;
            let peek = mem.turns.window(limit.max(1)).into_iter().map(|t| t.content).collect::<Vec<_>>();
            send_event(&mut write_half, ServerEvent::MemoryPeek(peek)).await?;
        }
        ClientCommand::ExecuteTool { name, args } => {
            let result = executor.tool_executor().execute(&executor.tool_registry(), &name, &args).await;
            match result {
                Ok(output) => {
                    send_event(&mut write_half, ServerEvent::ToolResult { success: output.success, output: output.output }).await?;
                }
                Err(err) => {
                    send_event(&mut write_half, ServerEvent::ToolResult { success: false, output: err.to_string() }).await?;
                }
            }
        }
        ClientCommand::ListTools => {
            let specs = executor.tool_registry().list_specs();
            send_event(&mut write_half, ServerEvent::ToolList(specs)).await?;
        }
        ClientCommand::ReloadConfig => {
            // Config is owned by the running executor for its lifetime; a
            // full reload would mean rebuilding the executor. Acknowledge
            // without reloading rather than silently doing nothing.
            send_event(&mut write_half, ServerEvent::Ack("config reload requires a daemon restart".to_string())).await?;
        }
        ClientCommand::Shutdown => {
            let _ = shutdown_tx.send(true);
            send_event(&mut write_half, ServerEvent::Ack("shutdown requested".to_string())).await?;
        }
        ClientCommand::Ping => {
            send_event(&mut write_half, ServerEvent::Ack("pong".to_string())).await?;
        }
    }

    Ok(())
}

async fn send_event(writer: &mut tokio::net::unix::OwnedWriteHalf, event: ServerEvent) -> Result<()> {
    let encoded = serde_json::to_string(&event)?;
    writer.write_all(encoded.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
