use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ── Tool trait and registry ──────────────────────────────────────────────────

/// Describes a single parameter that a tool accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl ToolParam {
    /// Convenience constructor for a required string parameter.
    pub fn required(name: &str, description: &str) -> Self {
        ToolParam {
            name: name.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    /// Convenience constructor for an optional string parameter.
    pub fn optional(name: &str, description: &str) -> Self {
        ToolParam {
            name: name.to_string(),
            description: description.to_string(),
            required: false,
        }
    }
}

/// Coarse-grained sensitivity classification for a tool, consumed by
/// `aigent_exec::ExecutionPolicy` to decide whether a call needs operator
/// approval before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// Read-only or fully reversible (e.g. memory search, web search).
    #[default]
    Low,
    /// Writes local state the user can easily inspect/undo (e.g. drafts, calendar).
    Medium,
    /// Can affect the outside world or is hard to undo (e.g. shell, web_fetch, send_telegram).
    High,
}

/// Static metadata about a tool's side effects, used by the execution policy
/// and by the LLM-facing tool listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub security_level: SecurityLevel,
    pub read_only: bool,
    /// Logical grouping used for allow/deny-listing a whole family of tools
    /// (e.g. "shell", "email", "calendar") instead of one name at a time.
    pub group: String,
    /// Only valid to invoke during a pulse (autonomous) turn, e.g. `set_active_thoughts`
    /// reflection aids that don't make sense mid-conversation.
    #[serde(default)]
    pub pulse_only: bool,
    /// A successful call may emit image content blocks to append after the
    /// tool_result block in the continuation message (e.g. `capture_screenshot`).
    #[serde(default)]
    pub yields_images: bool,
}

/// Static metadata about a tool, used by the LLM to decide which tool to call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
    #[serde(default)]
    pub metadata: ToolMetadata,
}

/// The result returned after a tool runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

/// Trait implemented by every tool (built-in or WASM-loaded).
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput>;
}

/// Central registry for all available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn list_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.spec().name == name)
            .map(|t| t.as_ref())
    }
}

// ── Built-in tools ───────────────────────────────────────────────────────────

pub mod builtins;
pub use builtins::{
    AdvanceCuriosityTool, CalendarAddEventTool, CaptureScreenshotTool, CaptureWebcamTool,
    CompleteReminderTool, CreateReminderTool, DelegateTaskTool, DismissReminderTool,
    DraftEmailTool, FetchPageTool, FinanceQuoteTool, GitRollbackTool, ListRemindersTool,
    ReadFileTool, RemindMeTool, RemoveGrowthThreadTool, RequestClarificationTool, RunShellTool,
    SearchMemoriesTool, SendTelegramTool, SetActiveThoughtsTool, SetGrowthThreadTool,
    SetPulseIntervalTool, StoreCoreMemoryTool, WebBrowseTool, WebSearchTool, WriteFileTool,
};

/// Build the OpenAI-compatible `tools` array (the `{"type":"function",...}`
/// shape) from a list of tool specs, for use as the `tools` parameter on a
/// chat completion request.
pub fn specs_to_openai_tools(specs: &[ToolSpec]) -> serde_json::Value {
    let tools: Vec<serde_json::Value> = specs
        .iter()
        .map(|spec| {
            let mut properties = serde_json::Map::new();
            let mut required = Vec::new();
            for param in &spec.params {
                properties.insert(
                    param.name.clone(),
                    serde_json::json!({
                        "type": "string",
                        "description": param.description,
                    }),
                );
                if param.required {
                    required.push(serde_json::Value::String(param.name.clone()));
                }
            }
            serde_json::json!({
                "type": "function",
                "function": {
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }
                }
            })
        })
        .collect();
    serde_json::Value::Array(tools)
}

// ── ToolRegistry tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod registry_tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal dummy tool for testing the registry.
    struct DummyTool {
        name: String,
    }

    #[async_trait]
    impl Tool for DummyTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.name.clone(),
                description: format!("Dummy tool: {}", self.name),
                params: vec![ToolParam {
                    name: "input".to_string(),
                    description: "test param".to_string(),
                    required: true,
                }],
                metadata: ToolMetadata::default(),
            }
        }
        async fn run(&self, _args: &HashMap<String, String>) -> Result<ToolOutput> {
            Ok(ToolOutput {
                success: true,
                output: format!("ran {}", self.name),
            })
        }
    }

    #[test]
    fn empty_registry() {
        let reg = ToolRegistry::default();
        assert!(reg.list_specs().is_empty());
        assert!(reg.get("anything").is_none());
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(DummyTool { name: "alpha".into() }));
        reg.register(Box::new(DummyTool { name: "beta".into() }));

        assert!(reg.get("alpha").is_some());
        assert!(reg.get("beta").is_some());
        assert!(reg.get("gamma").is_none());
    }

    #[test]
    fn list_specs_returns_all() {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(DummyTool { name: "one".into() }));
        reg.register(Box::new(DummyTool { name: "two".into() }));
        reg.register(Box::new(DummyTool { name: "three".into() }));

        let specs = reg.list_specs();
        assert_eq!(specs.len(), 3);
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"one"));
        assert!(names.contains(&"two"));
        assert!(names.contains(&"three"));
    }

    #[test]
    fn get_returns_correct_tool_spec() {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(DummyTool { name: "finder".into() }));

        let tool = reg.get("finder").unwrap();
        let spec = tool.spec();
        assert_eq!(spec.name, "finder");
        assert_eq!(spec.params.len(), 1);
        assert!(spec.params[0].required);
    }

    #[tokio::test]
    async fn run_registered_tool() {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(DummyTool { name: "runner".into() }));

        let tool = reg.get("runner").unwrap();
        let result = tool.run(&HashMap::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "ran runner");
    }

    /// Duplicate registration: the first tool wins on `get` (Vec + find).
    /// This test documents the current behavior so someone adding a HashMap
    /// backend later doesn't silently change the semantics.
    #[test]
    fn duplicate_name_get_returns_first_registered() {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(DummyTool { name: "dup".into() }));
        reg.register(Box::new(DummyTool { name: "dup".into() }));

        // list_specs should show both
        let specs = reg.list_specs();
        let dup_count = specs.iter().filter(|s| s.name == "dup").count();
        assert_eq!(dup_count, 2, "both duplicates should appear in list_specs");

        // get should return the first one (deterministic for Vec+find)
        assert!(reg.get("dup").is_some());
    }
}
