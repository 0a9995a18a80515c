//! The memory extractor (§4.4): between turns, when the context window
//! overflows, the oldest excess turns are handed to a single model call
//! that returns structured `(content, memory_type, category, importance)`
//! tuples. Each is embedded and written to long-term memory, and the
//! consumed turns are marked processed in the same pass so a crash
//! mid-extraction can't double-emit a memory.

use aigent_llm::ChatMessage;
use aigent_memory::{AgentMemory, ConversationTurn, LongTermMemory, LongTermMemoryType, TurnRole};
use aigent_thinker::{ModelClient, RoutedCallResult, TaskModels};
use chrono::Utc;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct ExtractedMemory {
    content: String,
    #[serde(default)]
    memory_type: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    importance: f32,
}

/// Runs one extraction pass if the window has overflowed. Returns the
/// number of memories written. No-ops (returns `Ok(0)`) if there's nothing
/// to extract.
pub async fn run_if_overflowing(memory: &mut AgentMemory, model: &ModelClient, extraction_models: &TaskModels) -> anyhow::Result<usize> {
    if !memory.turns.should_extract() {
        return Ok(0);
    }

    let batch = memory.turns.overflow_batch();
    if batch.is_empty() {
        return Ok(0);
    }

    let extracted = extract(model, extraction_models, &batch).await;
    let mut written = 0;
    let last_turn_at = batch.last().map(|t| t.created_at).unwrap_or_else(Utc::now);

    for item in extracted {
        let Some(memory_type) = parse_memory_type(&item.memory_type) else {
            warn!(raw = %item.memory_type, "extractor returned an unrecognized memory_type, skipping");
            continue;
        };
        if item.content.trim().is_empty() {
            continue;
        }

        let embedding = memory.embed(&item.content).unwrap_or_default();
        let entry = LongTermMemory {
            id: Uuid::new_v4(),
            content: item.content,
            memory_type,
            memory_category: if item.category.is_empty() { "general".to_string() } else { item.category },
            importance: item.importance.clamp(0.0, 1.0),
            created_at: Utc::now(),
            source_timestamp: last_turn_at,
            last_accessed_at: None,
            embedding,
            retrieval_count: 0,
        };
        memory.long_term.insert(entry).await?;
        written += 1;
    }

    let ids: Vec<u64> = batch.iter().map(|t| t.id).collect();
    memory.turns.mark_processed(&ids).await?;

    Ok(written)
}

fn parse_memory_type(s: &str) -> Option<LongTermMemoryType> {
    match s.to_lowercase().as_str() {
        "factual" => Some(LongTermMemoryType::Factual),
        "episodic" | "" => Some(LongTermMemoryType::Episodic),
        _ => None,
    }
}

async fn extract(model: &ModelClient, models: &TaskModels, batch: &[ConversationTurn]) -> Vec<ExtractedMemory> {
    let transcript = batch
        .iter()
        .map(|t| format!("{:?}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n");

    let instruction = "You distill a block of conversation into durable memories. Reply with a \
        JSON array only, each element `{\"content\": str, \"memory_type\": \"episodic\"|\"factual\", \
        \"category\": str, \"importance\": 0.0-1.0}`. Omit anything not worth remembering; an \
        empty array `[]` is a valid answer.";

    let messages = vec![
        ChatMessage::system(instruction),
        ChatMessage::user(format!("Conversation block to distill:\n\n{transcript}")),
    ];

    let response = match model.chat(models, &messages, None).await {
        RoutedCallResult::Ok(response) => response,
        RoutedCallResult::BothModelsUnavailable { last_error } => {
            warn!(error = %last_error, "extraction call failed on both models; this overflow batch stays unprocessed until the next overflow");
            return Vec::new();
        }
    };

    parse_extracted(&response.content)
}

fn parse_extracted(raw: &str) -> Vec<ExtractedMemory> {
    let trimmed = raw.trim();
    let json_slice = trimmed
        .find('[')
        .and_then(|start| trimmed.rfind(']').map(|end| &trimmed[start..=end]))
        .unwrap_or(trimmed);

    serde_json::from_str(json_slice).unwrap_or_else(|err| {
        warn!(error = %err, raw = %raw, "could not parse extractor output as JSON, discarding this batch's memories");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_extraction_json() {
        let raw = r#"[{"content": "likes tea", "memory_type": "factual", "category": "preference", "importance": 0.6}]"#;
        let parsed = parse_extracted(raw);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].content, "likes tea");
    }

    #[test]
    fn tolerates_surrounding_prose() {
        let raw = "Here you go:\n```json\n[{\"content\": \"x\", \"memory_type\": \"episodic\", \"category\": \"general\", \"importance\": 0.3}]\n```";
        let parsed = parse_extracted(raw);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn empty_array_is_fine() {
        assert!(parse_extracted("[]").is_empty());
    }

    #[test]
    fn garbage_input_yields_empty_rather_than_panicking() {
        assert!(parse_extracted("not json at all").is_empty());
    }
}
