//! The memory-subsystem tool surface (§6): the model's only way to read or
//! write the spec-precise memory stores (as opposed to the legacy six-tier
//! `MemoryManager`, which has no tool surface of its own). Every tool here
//! shares one `Arc<tokio::sync::Mutex<AgentMemory>>` with the turn executor
//! so a mid-conversation `store_core_memory` call is visible to the very
//! next prompt assembly.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use aigent_memory::{
    AgentMemory, CoreMemoryCategory, CuriosityStatus, GrowthStage, IntentionStatus, IntentionType,
    TriggerType,
};

use crate::{SecurityLevel, Tool, ToolMetadata, ToolOutput, ToolParam, ToolSpec};

type SharedMemory = Arc<Mutex<AgentMemory>>;

fn required<'a>(args: &'a HashMap<String, String>, name: &str) -> Result<&'a str> {
    args.get(name)
        .map(|s| s.as_str())
        .ok_or_else(|| anyhow::anyhow!("missing required param: {name}"))
}

// ── search_memories ──────────────────────────────────────────────────────

pub struct SearchMemoriesTool {
    pub memory: SharedMemory,
}

#[async_trait]
impl Tool for SearchMemoriesTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "search_memories".to_string(),
            description: "Search long-term memory for entries relevant to a query; returns the \
                top matches ranked by semantic, importance, and freshness score."
                .to_string(),
            params: vec![
                ToolParam::required("query", "What to search for"),
                ToolParam::optional("k", "Number of results to return (default 5)"),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "memory".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let query = required(args, "query")?;
        let k: usize = args.get("k").and_then(|v| v.parse().ok()).unwrap_or(5);

        let mut mem = self.memory.lock().await;
        let embedding = mem.embed(query);
        if embedding.is_none() {
            tracing::debug!("search_memories: no embedding backend configured, falling back to zero-vector semantic score");
        }
        let hits = mem
            .long_term
            .search(embedding.as_deref(), k, Utc::now(), |m| {
                aigent_memory::topic_warmth_score(query, &m.content)
            })
            .await;

        if hits.is_empty() {
            return Ok(ToolOutput { success: true, output: "no matching memories found".to_string() });
        }

        let rendered = hits
            .iter()
            .map(|h| format!("- ({:.2}) {}", h.combined_score, h.memory.content))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolOutput { success: true, output: rendered })
    }
}

// ── store_core_memory ────────────────────────────────────────────────────

pub struct StoreCoreMemoryTool {
    pub memory: SharedMemory,
}

#[async_trait]
impl Tool for StoreCoreMemoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "store_core_memory".to_string(),
            description: "Write a durable fact into core memory, unconditionally included in \
                every future system prompt."
                .to_string(),
            params: vec![
                ToolParam::required("content", "The fact to remember"),
                ToolParam::required(
                    "category",
                    "One of: narrative, identity, relationship, preference, fact",
                ),
                ToolParam::optional("promoted_from_memory_id", "Source long-term memory id, if promoting one"),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Medium,
                read_only: false,
                group: "memory".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let content = required(args, "content")?;
        let category = parse_core_category(required(args, "category")?)?;
        let promoted_from = args
            .get("promoted_from_memory_id")
            .filter(|s| !s.is_empty())
            .map(|s| Uuid::parse_str(s))
            .transpose()?;

        let mut mem = self.memory.lock().await;
        mem.core.store(content.to_string(), category, promoted_from).await?;

        Ok(ToolOutput { success: true, output: "stored in core memory".to_string() })
    }
}

fn parse_core_category(s: &str) -> Result<CoreMemoryCategory> {
    Ok(match s.to_lowercase().as_str() {
        "narrative" => CoreMemoryCategory::Narrative,
        "identity" => CoreMemoryCategory::Identity,
        "relationship" => CoreMemoryCategory::Relationship,
        "preference" => CoreMemoryCategory::Preference,
        "fact" => CoreMemoryCategory::Fact,
        other => anyhow::bail!("unknown core memory category: {other}"),
    })
}

// ── set_active_thoughts ──────────────────────────────────────────────────

pub struct SetActiveThoughtsTool {
    pub memory: SharedMemory,
}

#[async_trait]
impl Tool for SetActiveThoughtsTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "set_active_thoughts".to_string(),
            description: "Replace the whole active-thoughts set (your own curated working \
                memory, up to 10 items, highest priority first). Each thought is one line of \
                `slug|topic|elaboration`."
                .to_string(),
            params: vec![ToolParam::required(
                "thoughts",
                "Newline-separated `slug|topic|elaboration` entries, highest priority first",
            )],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "memory".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let raw = required(args, "thoughts")?;
        let thoughts: Vec<(String, String, String)> = raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                let mut parts = line.splitn(3, '|').map(|p| p.trim().to_string());
                let slug = parts.next().unwrap_or_default();
                let topic = parts.next().unwrap_or_default();
                let elaboration = parts.next().unwrap_or_default();
                (slug, topic, elaboration)
            })
            .collect();

        if thoughts.is_empty() {
            anyhow::bail!("thoughts must contain at least one `slug|topic|elaboration` line");
        }

        let mut mem = self.memory.lock().await;
        let count = thoughts.len();
        mem.active_thoughts.replace(thoughts).await?;

        Ok(ToolOutput { success: true, output: format!("active thoughts replaced ({count} items)") })
    }
}

// ── set_growth_thread / remove_growth_thread ─────────────────────────────

pub struct SetGrowthThreadTool {
    pub memory: SharedMemory,
}

#[async_trait]
impl Tool for SetGrowthThreadTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "set_growth_thread".to_string(),
            description: "Create or update a growth thread — a long-lived developmental \
                aspiration. Content must begin with a `FOCUS:` line."
                .to_string(),
            params: vec![
                ToolParam::required("slug", "Stable identifier for this thread"),
                ToolParam::required("content", "Markdown content, must start with `FOCUS:`"),
                ToolParam::optional("stage", "One of: seed, growing, integrating, dormant"),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "memory".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let slug = required(args, "slug")?;
        let content = required(args, "content")?;

        let mut mem = self.memory.lock().await;
        mem.growth_threads.upsert(slug, content.to_string()).await?;

        if let Some(stage_str) = args.get("stage").filter(|s| !s.is_empty()) {
            let stage = parse_growth_stage(stage_str)?;
            mem.growth_threads.advance(slug, stage).await?;
        }

        Ok(ToolOutput { success: true, output: format!("growth thread '{slug}' updated") })
    }
}

fn parse_growth_stage(s: &str) -> Result<GrowthStage> {
    Ok(match s.to_lowercase().as_str() {
        "seed" => GrowthStage::Seed,
        "growing" => GrowthStage::Growing,
        "integrating" => GrowthStage::Integrating,
        "dormant" => GrowthStage::Dormant,
        other => anyhow::bail!("unknown growth stage: {other}"),
    })
}

pub struct RemoveGrowthThreadTool {
    pub memory: SharedMemory,
}

#[async_trait]
impl Tool for RemoveGrowthThreadTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "remove_growth_thread".to_string(),
            description: "Retire a growth thread that has run its course.".to_string(),
            params: vec![ToolParam::required("slug", "Identifier of the thread to remove")],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "memory".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let slug = required(args, "slug")?;
        let mut mem = self.memory.lock().await;
        let removed = mem.growth_threads.remove(slug).await?;
        Ok(ToolOutput {
            success: removed,
            output: if removed {
                format!("growth thread '{slug}' removed")
            } else {
                format!("no growth thread named '{slug}'")
            },
        })
    }
}

// ── reminders / intentions ───────────────────────────────────────────────

pub struct CreateReminderTool {
    pub memory: SharedMemory,
}

#[async_trait]
impl Tool for CreateReminderTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_reminder".to_string(),
            description: "Create a reminder or self-assigned goal that fires at a future time \
                or at the start of the next session."
                .to_string(),
            params: vec![
                ToolParam::required("kind", "One of: reminder, goal"),
                ToolParam::required("content", "What to remember or accomplish"),
                ToolParam::optional("context", "Extra context for when it fires"),
                ToolParam::required("trigger_type", "One of: time, next_session"),
                ToolParam::optional("trigger_at", "RFC3339 timestamp, required if trigger_type=time"),
                ToolParam::optional("priority", "1-10, default 5"),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "memory".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let kind = match required(args, "kind")?.to_lowercase().as_str() {
            "reminder" => IntentionType::Reminder,
            "goal" => IntentionType::Goal,
            other => anyhow::bail!("unknown intention kind: {other}"),
        };
        let content = required(args, "content")?;
        let context = args.get("context").cloned().unwrap_or_default();
        let trigger_type = match required(args, "trigger_type")?.to_lowercase().as_str() {
            "time" => TriggerType::Time,
            "next_session" => TriggerType::NextSession,
            other => anyhow::bail!("unknown trigger_type: {other}"),
        };
        let trigger_at: Option<DateTime<Utc>> = args
            .get("trigger_at")
            .filter(|s| !s.is_empty())
            .map(|s| DateTime::parse_from_rfc3339(s).map(|d| d.with_timezone(&Utc)))
            .transpose()?;
        if matches!(trigger_type, TriggerType::Time) && trigger_at.is_none() {
            anyhow::bail!("trigger_at is required when trigger_type=time");
        }
        let priority: u8 = args.get("priority").and_then(|v| v.parse().ok()).unwrap_or(5);

        let mut mem = self.memory.lock().await;
        let id = mem.intentions.create(kind, content, context, trigger_type, trigger_at, priority).await?;

        Ok(ToolOutput { success: true, output: format!("reminder created: {id}") })
    }
}

pub struct CompleteReminderTool {
    pub memory: SharedMemory,
}

#[async_trait]
impl Tool for CompleteReminderTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "complete_reminder".to_string(),
            description: "Mark a reminder or goal as completed.".to_string(),
            params: vec![
                ToolParam::required("id", "Reminder id"),
                ToolParam::optional("outcome", "What happened"),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "memory".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let id = Uuid::parse_str(required(args, "id")?)?;
        let outcome = args.get("outcome").cloned();
        let mut mem = self.memory.lock().await;
        let found = mem.intentions.complete(id, outcome).await?;
        Ok(ToolOutput {
            success: found,
            output: if found { "reminder completed".to_string() } else { "no such reminder".to_string() },
        })
    }
}

pub struct DismissReminderTool {
    pub memory: SharedMemory,
}

#[async_trait]
impl Tool for DismissReminderTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "dismiss_reminder".to_string(),
            description: "Cancel a reminder or goal without completing it.".to_string(),
            params: vec![
                ToolParam::required("id", "Reminder id"),
                ToolParam::optional("outcome", "Why it was dismissed"),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "memory".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let id = Uuid::parse_str(required(args, "id")?)?;
        let outcome = args.get("outcome").cloned();
        let mut mem = self.memory.lock().await;
        let found = mem.intentions.dismiss(id, outcome).await?;
        Ok(ToolOutput {
            success: found,
            output: if found { "reminder dismissed".to_string() } else { "no such reminder".to_string() },
        })
    }
}

pub struct ListRemindersTool {
    pub memory: SharedMemory,
}

#[async_trait]
impl Tool for ListRemindersTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_reminders".to_string(),
            description: "List reminders and goals, optionally filtered by status.".to_string(),
            params: vec![ToolParam::optional(
                "status",
                "One of: pending, triggered, completed, dismissed (omit for all)",
            )],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "memory".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let status = args
            .get("status")
            .filter(|s| !s.is_empty())
            .map(|s| parse_intention_status(s))
            .transpose()?;

        let mem = self.memory.lock().await;
        let list = mem.intentions.list(status);
        if list.is_empty() {
            return Ok(ToolOutput { success: true, output: "no reminders".to_string() });
        }
        let rendered = list
            .iter()
            .map(|i| format!("- {} [{:?}] (priority {}): {}", i.id, i.status, i.priority, i.content))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(ToolOutput { success: true, output: rendered })
    }
}

fn parse_intention_status(s: &str) -> Result<IntentionStatus> {
    Ok(match s.to_lowercase().as_str() {
        "pending" => IntentionStatus::Pending,
        "triggered" => IntentionStatus::Triggered,
        "completed" => IntentionStatus::Completed,
        "dismissed" => IntentionStatus::Dismissed,
        other => anyhow::bail!("unknown status: {other}"),
    })
}

// ── advance_curiosity ─────────────────────────────────────────────────────

pub struct AdvanceCuriosityTool {
    pub memory: SharedMemory,
}

#[async_trait]
impl Tool for AdvanceCuriosityTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "advance_curiosity".to_string(),
            description: "Resolve the current active curiosity goal (explored, deferred, or \
                declined). Optionally hand off directly to a next topic instead of letting the \
                selector pick one."
                .to_string(),
            params: vec![
                ToolParam::required("status", "One of: explored, deferred, declined"),
                ToolParam::optional("notes", "What you learned or why you're dropping it"),
                ToolParam::optional("next_topic", "Short-circuit the selector with this topic instead"),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "memory".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let status = match required(args, "status")?.to_lowercase().as_str() {
            "explored" => CuriosityStatus::Explored,
            "deferred" => CuriosityStatus::Deferred,
            "declined" => CuriosityStatus::Declined,
            other => anyhow::bail!("unknown curiosity status: {other}"),
        };
        let notes = args.get("notes").cloned();

        let mut mem = self.memory.lock().await;
        if let Some(next_topic) = args.get("next_topic").filter(|s| !s.is_empty()) {
            let goal = mem.curiosity.resolve_with_next(status, notes, next_topic.clone()).await?;
            Ok(ToolOutput { success: true, output: format!("curiosity resolved; now curious about: {}", goal.content) })
        } else {
            mem.curiosity.resolve(status, notes).await?;
            Ok(ToolOutput { success: true, output: "curiosity goal resolved".to_string() })
        }
    }
}

// ── side-channel acknowledgement tools ───────────────────────────────────
//
// `set_pulse_interval` and `request_clarification` are special-cased by the
// tool loop itself (it reads their arguments directly into `TurnContext`
// before dispatch), but the dispatcher still needs a registered `Tool` to
// hand back a `tool_result`, so these just confirm receipt.

pub struct SetPulseIntervalTool;

#[async_trait]
impl Tool for SetPulseIntervalTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "set_pulse_interval".to_string(),
            description: "Change how often you wake up on your own. Valid values (seconds): \
                180, 600, 1800, 3600, 7200, 10800, 21600, 43200."
                .to_string(),
            params: vec![ToolParam::required("interval_seconds", "One of the allowed pulse intervals, in seconds")],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "control".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let secs = required(args, "interval_seconds")?;
        Ok(ToolOutput { success: true, output: format!("pulse interval set to {secs}s") })
    }
}

pub struct RequestClarificationTool;

#[async_trait]
impl Tool for RequestClarificationTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "request_clarification".to_string(),
            description: "Ask the user a clarifying question with a small set of clickable \
                options before proceeding."
                .to_string(),
            params: vec![
                ToolParam::required("question", "The clarifying question"),
                ToolParam::optional("options", "Pipe-separated list of short answer options"),
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "control".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, args: &HashMap<String, String>) -> Result<ToolOutput> {
        let question = required(args, "question")?;
        Ok(ToolOutput { success: true, output: format!("clarification requested: {question}") })
    }
}

// ── stubs named by the required tool surface but out of scope to implement ──
//
// `send_telegram` needs a live bot handle the tool crate doesn't own (the
// gateway does); the capture tools need platform camera/display access this
// build doesn't ship. Each still needs a spec so the model can see (and be
// told no about) the capability, per the "not available in this build"
// contract.

pub struct SendTelegramTool;

#[async_trait]
impl Tool for SendTelegramTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "send_telegram".to_string(),
            description: "Send a message back over Telegram instead of (or in addition to) the normal reply text.".to_string(),
            params: vec![ToolParam::required("text", "Message text to send")],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Medium,
                read_only: false,
                group: "telegram".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, _args: &HashMap<String, String>) -> Result<ToolOutput> {
        Ok(ToolOutput { success: false, output: "not available in this build".to_string() })
    }
}

pub struct CaptureScreenshotTool;

#[async_trait]
impl Tool for CaptureScreenshotTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "capture_screenshot".to_string(),
            description: "Capture the operator's screen and attach it to the conversation.".to_string(),
            params: vec![],
            metadata: ToolMetadata {
                security_level: SecurityLevel::High,
                read_only: true,
                group: "capture".to_string(),
                yields_images: true,
                ..Default::default()
            },
        }
    }

    async fn run(&self, _args: &HashMap<String, String>) -> Result<ToolOutput> {
        Ok(ToolOutput { success: false, output: "not available in this build".to_string() })
    }
}

pub struct CaptureWebcamTool;

#[async_trait]
impl Tool for CaptureWebcamTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "capture_webcam".to_string(),
            description: "Capture a frame from the operator's webcam and attach it to the conversation.".to_string(),
            params: vec![],
            metadata: ToolMetadata {
                security_level: SecurityLevel::High,
                read_only: true,
                group: "capture".to_string(),
                yields_images: true,
                ..Default::default()
            },
        }
    }

    async fn run(&self, _args: &HashMap<String, String>) -> Result<ToolOutput> {
        Ok(ToolOutput { success: false, output: "not available in this build".to_string() })
    }
}

pub struct DelegateTaskTool;

#[async_trait]
impl Tool for DelegateTaskTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "delegate_task".to_string(),
            description: "Hand a sub-task off to a separately-modeled delegate run.".to_string(),
            params: vec![ToolParam::required("task", "Description of the task to delegate")],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Medium,
                read_only: false,
                group: "delegation".to_string(),
                ..Default::default()
            },
        }
    }

    async fn run(&self, _args: &HashMap<String, String>) -> Result<ToolOutput> {
        Ok(ToolOutput { success: false, output: "not available in this build".to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn shared(dir: &std::path::Path) -> SharedMemory {
        Arc::new(Mutex::new(AgentMemory::new(dir, 30, 40)))
    }

    #[tokio::test]
    async fn store_and_search_core_memory_round_trip() {
        let dir = tempdir().unwrap();
        let memory = shared(dir.path());

        let store = StoreCoreMemoryTool { memory: memory.clone() };
        let mut args = HashMap::new();
        args.insert("content".to_string(), "likes dark roast coffee".to_string());
        args.insert("category".to_string(), "preference".to_string());
        let out = store.run(&args).await.unwrap();
        assert!(out.success);

        let mem = memory.lock().await;
        assert_eq!(mem.core.all().len(), 1);
    }

    #[tokio::test]
    async fn set_active_thoughts_parses_pipe_delimited_lines() {
        let dir = tempdir().unwrap();
        let memory = shared(dir.path());
        let tool = SetActiveThoughtsTool { memory: memory.clone() };
        let mut args = HashMap::new();
        args.insert("thoughts".to_string(), "a|Topic A|elaborating on A\nb|Topic B|elaborating on B".to_string());
        let out = tool.run(&args).await.unwrap();
        assert!(out.success);

        let mem = memory.lock().await;
        assert_eq!(mem.active_thoughts.all().len(), 2);
        assert_eq!(mem.active_thoughts.all()[0].topic, "Topic A");
    }

    #[tokio::test]
    async fn create_reminder_requires_trigger_at_for_time_trigger() {
        let dir = tempdir().unwrap();
        let memory = shared(dir.path());
        let tool = CreateReminderTool { memory };
        let mut args = HashMap::new();
        args.insert("kind".to_string(), "reminder".to_string());
        args.insert("content".to_string(), "call the dentist".to_string());
        args.insert("trigger_type".to_string(), "time".to_string());
        assert!(tool.run(&args).await.is_err());
    }

    #[tokio::test]
    async fn capture_tools_report_unavailable() {
        let out = CaptureScreenshotTool.run(&HashMap::new()).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.output, "not available in this build");
    }
}
