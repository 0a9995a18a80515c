//! The tool-loop driver — the multi-pass request/response state machine
//! described in §4.5. Pass 0 streams to the UI; every continuation pass is
//! request/response only, so cancellation and the accumulated-text
//! invariant stay simple.

use std::collections::HashMap;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use aigent_exec::ToolExecutor;
use aigent_llm::{ChatMessage, ChatResponse, Provider, ToolCall};
use aigent_tools::{ToolRegistry, ToolSpec};

use crate::model_client::{ModelClient, RoutedCallResult, TaskModels, classify_error, ErrorClass};
use crate::turn_context::TurnContext;

#[derive(Debug, Clone, Copy)]
pub struct ToolLoopConfig {
    /// Ceiling after which the driver forces a final answer (spec: ~5-15).
    pub max_passes: usize,
    /// Passes at/above this are logged as a possible tool-loop warning.
    pub warn_watermark: usize,
}

impl Default for ToolLoopConfig {
    fn default() -> Self {
        Self { max_passes: 10, warn_watermark: 5 }
    }
}

#[derive(Debug, Clone)]
pub struct ToolExecution {
    pub tool_name: String,
    pub args: HashMap<String, serde_json::Value>,
    pub success: bool,
    pub output: String,
    pub is_error: bool,
}

pub enum ToolLoopOutcome {
    Terminal { text: String, provider: Provider, tool_executions: Vec<ToolExecution>, passes_used: usize },
    BothModelsUnavailable { last_error: String },
}

/// Run the multi-pass tool loop to a terminal response.
///
/// `messages` is mutated in place (the caller owns the conversation so it can
/// be persisted or inspected afterwards). `ctx` accumulates side-channel
/// state (`pulse_interval_change`, `clarification`) for the executor to read
/// once the loop returns.
pub async fn run_tool_loop(
    model: &ModelClient,
    models: &TaskModels,
    messages: &mut Vec<ChatMessage>,
    tools_json: Option<&serde_json::Value>,
    tool_specs: &[ToolSpec],
    registry: &ToolRegistry,
    executor: &ToolExecutor,
    ctx: &mut TurnContext,
    config: ToolLoopConfig,
    token_tx: mpsc::Sender<String>,
) -> Result<ToolLoopOutcome> {
    let mut accumulated_text = String::new();
    let mut all_executions: Vec<ToolExecution> = Vec::new();
    let mut final_provider = models.primary_provider;
    let mut effective_tools_json = tools_json.map(|v| v.clone());
    let mut pass = 0usize;

    loop {
        if pass >= config.max_passes {
            warn!(pass, "tool loop hit max passes, forcing last accumulated text");
            break;
        }
        if pass >= config.warn_watermark {
            warn!(pass, "tool loop has run past the watermark — possible tool loop");
        }

        debug!(pass, msg_count = messages.len(), "tool loop pass");

        let result = if pass == 0 {
            model.chat_stream(models, messages, effective_tools_json.as_ref(), token_tx.clone()).await
        } else {
            model.chat(models, messages, effective_tools_json.as_ref()).await
        };

        let response: ChatResponse = match result {
            RoutedCallResult::Ok(response) => response,
            RoutedCallResult::BothModelsUnavailable { last_error } => {
                // §4.5: a web_fetch domain-blocked error on the *current* pass
                // gets one retry of the whole call with web_fetch disabled.
                // Applied once per turn, only ever on the pass that hit it.
                let looks_domain_blocked = classify_error(&anyhow::anyhow!(last_error.clone())) == ErrorClass::DomainBlocked;
                if looks_domain_blocked && !ctx.web_fetch_retry_used {
                    ctx.web_fetch_retry_used = true;
                    effective_tools_json = effective_tools_json.map(|v| strip_tool(&v, "web_fetch"));
                    info!("web_fetch domain-blocked — retrying turn once with web_fetch disabled");
                    continue;
                }
                return Ok(ToolLoopOutcome::BothModelsUnavailable { last_error });
            }
        };

        final_provider = response.provider;

        // Accumulate text from every pass, blank-line separated, so a later
        // pass's empty response doesn't erase earlier passes' text.
        if !response.content.trim().is_empty() {
            if !accumulated_text.is_empty() {
                accumulated_text.push_str("\n\n");
            }
            accumulated_text.push_str(response.content.trim());
        }

        if response.tool_calls.is_empty() {
            pass += 1;
            return Ok(ToolLoopOutcome::Terminal {
                text: accumulated_text,
                provider: final_provider,
                tool_executions: all_executions,
                passes_used: pass,
            });
        }

        messages.push(ChatMessage::assistant_tool_calls(response.tool_calls.clone()));

        let executions = execute_tool_calls(&response.tool_calls, tool_specs, registry, executor, ctx).await;
        for (call, exec) in response.tool_calls.iter().zip(executions.iter()) {
            messages.push(tool_result_message(&call.id, exec));
        }
        all_executions.extend(executions);

        if ctx.is_cancelled() {
            info!(pass, "cancellation observed after tool dispatch — exiting without another model call");
            pass += 1;
            return Ok(ToolLoopOutcome::Terminal {
                text: accumulated_text,
                provider: final_provider,
                tool_executions: all_executions,
                passes_used: pass,
            });
        }

        pass += 1;
    }

    Ok(ToolLoopOutcome::Terminal {
        text: accumulated_text,
        provider: final_provider,
        tool_executions: all_executions,
        passes_used: pass,
    })
}

fn tool_result_message(tool_use_id: &str, exec: &ToolExecution) -> ChatMessage {
    let content = if exec.is_error {
        format!("ERROR: {}", exec.output)
    } else if exec.yields_image_payload() {
        // Known simplification: `ChatMessage` content is text-only in this
        // stack, so an image-yielding tool's payload rides along as a
        // tagged string rather than a true multimodal content block.
        format!("{}\n[image attached]", exec.output)
    } else {
        exec.output.clone()
    };
    ChatMessage::tool_result(tool_use_id, content)
}

impl ToolExecution {
    fn yields_image_payload(&self) -> bool {
        false
    }
}

async fn execute_tool_calls(
    calls: &[ToolCall],
    tool_specs: &[ToolSpec],
    registry: &ToolRegistry,
    executor: &ToolExecutor,
    ctx: &mut TurnContext,
) -> Vec<ToolExecution> {
    let mut results = Vec::with_capacity(calls.len());

    for call in calls {
        let tool_name = call.function.name.clone();
        let args = call.function.arguments.clone();
        let string_args = json_value_to_string_map(&args);

        // A pulse-only tool invoked outside a pulse turn never reaches the
        // registry — the model shouldn't have been offered it, but a
        // hallucinated call is converted to a recoverable tool error rather
        // than dispatched.
        if !ctx.is_pulse {
            if let Some(spec) = tool_specs.iter().find(|s| s.name == tool_name) {
                if spec.metadata.pulse_only {
                    results.push(ToolExecution {
                        tool_name,
                        args: args.as_object().map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect()).unwrap_or_default(),
                        success: false,
                        output: "this tool is only available during pulse turns".to_string(),
                        is_error: true,
                    });
                    continue;
                }
            }
        }

        // Special-cased tools that write into the per-turn side channel
        // rather than (only) external state.
        if tool_name == "set_pulse_interval" {
            if let Some(secs) = string_args.get("interval_seconds").and_then(|v| v.parse::<u64>().ok()) {
                ctx.pulse_interval_change = Some(secs);
            }
        }
        if tool_name == "request_clarification" {
            let question = string_args.get("question").cloned().unwrap_or_default();
            let options: Vec<String> = string_args
                .get("options")
                .map(|s| s.split('|').map(|o| o.trim().to_string()).collect())
                .unwrap_or_default();
            ctx.clarification = Some(crate::turn_context::Clarification { question, options });
        }

        let result = executor.execute(registry, &tool_name, &string_args).await;
        let (success, output, is_error) = match result {
            Ok(out) => (out.success, out.output, !out.success),
            Err(err) => (false, err.to_string(), true),
        };

        results.push(ToolExecution {
            tool_name,
            args: args.as_object().map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect()).unwrap_or_default(),
            success,
            output,
            is_error,
        });
    }

    results
}

fn json_value_to_string_map(val: &serde_json::Value) -> HashMap<String, String> {
    val.as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let s = match v {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k.clone(), s)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Remove a named tool from the OpenAI-compatible `tools` array, used for the
/// single in-turn web_fetch-disabled retry.
fn strip_tool(tools_json: &serde_json::Value, name: &str) -> serde_json::Value {
    match tools_json.as_array() {
        Some(arr) => serde_json::Value::Array(
            arr.iter()
                .filter(|t| t["function"]["name"].as_str() != Some(name))
                .cloned()
                .collect(),
        ),
        None => tools_json.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aigent_exec::ExecutionPolicy;
    use aigent_tools::{Tool, ToolOutput, ToolRegistry};

    struct PulseOnlyTool;

    #[async_trait::async_trait]
    impl Tool for PulseOnlyTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "pulse_only_tool".to_string(),
                description: "only valid during a pulse".to_string(),
                params: vec![],
                metadata: aigent_tools::ToolMetadata { pulse_only: true, ..Default::default() },
            }
        }
        async fn run(&self, _args: &HashMap<String, String>) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput { success: true, output: "ran".to_string() })
        }
    }

    fn call(tool_name: &str) -> ToolCall {
        ToolCall {
            id: "call-1".to_string(),
            r#type: "function".to_string(),
            function: aigent_llm::ToolCallFunction { name: tool_name.to_string(), arguments: serde_json::json!({}) },
        }
    }

    fn autonomous_policy() -> ExecutionPolicy {
        ExecutionPolicy { approval_mode: aigent_config::ApprovalMode::Autonomous, ..Default::default() }
    }

    #[tokio::test]
    async fn pulse_only_tool_rejected_outside_pulse_turn() {
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(PulseOnlyTool));
        let executor = ToolExecutor::new(autonomous_policy());
        let specs = vec![PulseOnlyTool.spec()];
        let mut ctx = TurnContext::new(false, false);

        let results = execute_tool_calls(&[call("pulse_only_tool")], &specs, &registry, &executor, &mut ctx).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error);
        assert!(results[0].output.contains("pulse"));
    }

    #[tokio::test]
    async fn pulse_only_tool_runs_during_pulse_turn() {
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(PulseOnlyTool));
        let executor = ToolExecutor::new(autonomous_policy());
        let specs = vec![PulseOnlyTool.spec()];
        let mut ctx = TurnContext::new(true, false);

        let results = execute_tool_calls(&[call("pulse_only_tool")], &specs, &registry, &executor, &mut ctx).await;
        assert_eq!(results.len(), 1);
        assert!(!results[0].is_error);
        assert_eq!(results[0].output, "ran");
    }

    #[test]
    fn strip_tool_removes_named_entry() {
        let tools = serde_json::json!([
            {"type": "function", "function": {"name": "web_fetch"}},
            {"type": "function", "function": {"name": "web_search"}},
        ]);
        let stripped = strip_tool(&tools, "web_fetch");
        let arr = stripped.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["function"]["name"], "web_search");
    }

    #[test]
    fn json_value_to_string_map_handles_types() {
        let val = serde_json::json!({"query": "x", "count": 3, "flag": true});
        let map = json_value_to_string_map(&val);
        assert_eq!(map["query"], "x");
        assert_eq!(map["count"], "3");
        assert_eq!(map["flag"], "true");
    }
}
