//! Model client routing and failover (§4.6).
//!
//! Wraps `aigent_llm::LlmRouter`'s provider-pair call with task-based model
//! selection and the error-classification/failover contract: transient
//! provider errors retry once against a failover model; if that also fails
//! the call is tagged `both_unavailable` so the executor can arm a deferred
//! retry.

use aigent_llm::{ChatMessage, ChatResponse, LlmRouter, Provider};
use tokio::sync::mpsc;

/// Task categories, each routed to a configured model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelTask {
    Conversation,
    Extraction,
    Simple,
    Delegation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Overloaded,
    RateLimited,
    ServerError,
    Timeout,
    ConnectionError,
    DomainBlocked,
    Other,
}

/// Heuristic classification from the error's display text. `aigent-llm`
/// doesn't expose structured provider error variants, so this mirrors the
/// pragmatic string-matching already used for `/fallback` detection in
/// `LlmRouter::chat_with_fallback`.
pub fn classify_error(err: &anyhow::Error) -> ErrorClass {
    let text = err.to_string().to_lowercase();
    if text.contains("domain") && (text.contains("block") || text.contains("not allowed")) {
        ErrorClass::DomainBlocked
    } else if text.contains("overloaded") || text.contains("529") {
        ErrorClass::Overloaded
    } else if text.contains("rate limit") || text.contains("429") {
        ErrorClass::RateLimited
    } else if text.contains("timed out") || text.contains("timeout") {
        ErrorClass::Timeout
    } else if text.contains("connection") || text.contains("connect") {
        ErrorClass::ConnectionError
    } else if text.contains("500") || text.contains("502") || text.contains("503") || text.contains("server error") {
        ErrorClass::ServerError
    } else {
        ErrorClass::Other
    }
}

pub fn is_transient(class: ErrorClass) -> bool {
    matches!(
        class,
        ErrorClass::Overloaded | ErrorClass::RateLimited | ErrorClass::ServerError | ErrorClass::Timeout | ErrorClass::ConnectionError
    )
}

/// Result of a routed model call: either a response, or a tag that both the
/// primary and the failover model were unavailable (the turn executor's cue
/// to arm the deferred-retry controller).
pub enum RoutedCallResult {
    Ok(ChatResponse),
    BothModelsUnavailable { last_error: String },
}

/// Per-task model name pair: primary model name + its intra-provider
/// failover model name (`failover_map` in config).
#[derive(Debug, Clone)]
pub struct TaskModels {
    pub primary_provider: Provider,
    pub primary_model: String,
    pub failover_model: String,
}

pub struct ModelClient {
    pub router: LlmRouter,
}

impl ModelClient {
    pub fn new(router: LlmRouter) -> Self {
        Self { router }
    }

    /// Non-streaming structured chat call with task-based failover.
    /// Conversation tasks never cross provider families on failure — only
    /// the intra-provider failover model is tried. Extraction/analysis
    /// tasks may additionally fall back across provider families, handled
    /// by the caller choosing a different `TaskModels.primary_provider`
    /// on a second invocation when this returns `BothModelsUnavailable`.
    pub async fn chat(
        &self,
        models: &TaskModels,
        messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
    ) -> RoutedCallResult {
        let primary_name = models.primary_model.clone();
        let first = self
            .router
            .chat_messages(models.primary_provider, &primary_name, &primary_name, messages, tools)
            .await;

        match first {
            Ok(response) => RoutedCallResult::Ok(response),
            Err(err) => {
                let class = classify_error(&err);
                if !is_transient(class) {
                    return RoutedCallResult::BothModelsUnavailable { last_error: err.to_string() };
                }
                let failover_name = models.failover_model.clone();
                match self
                    .router
                    .chat_messages(models.primary_provider, &failover_name, &failover_name, messages, tools)
                    .await
                {
                    Ok(response) => RoutedCallResult::Ok(response),
                    Err(second_err) => RoutedCallResult::BothModelsUnavailable {
                        last_error: format!("primary: {err}; failover: {second_err}"),
                    },
                }
            }
        }
    }

    pub async fn chat_stream(
        &self,
        models: &TaskModels,
        messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
        tx: mpsc::Sender<String>,
    ) -> RoutedCallResult {
        let primary_name = models.primary_model.clone();
        let first = self
            .router
            .chat_messages_stream(models.primary_provider, &primary_name, &primary_name, messages, tools, tx.clone())
            .await;

        match first {
            Ok(response) => RoutedCallResult::Ok(response),
            Err(err) => {
                let class = classify_error(&err);
                if !is_transient(class) {
                    return RoutedCallResult::BothModelsUnavailable { last_error: err.to_string() };
                }
                let failover_name = models.failover_model.clone();
                match self
                    .router
                    .chat_messages_stream(models.primary_provider, &failover_name, &failover_name, messages, tools, tx)
                    .await
                {
                    Ok(response) => RoutedCallResult::Ok(response),
                    Err(second_err) => RoutedCallResult::BothModelsUnavailable {
                        last_error: format!("primary: {err}; failover: {second_err}"),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        assert_eq!(classify_error(&anyhow::anyhow!("503 Service Unavailable")), ErrorClass::ServerError);
        assert_eq!(classify_error(&anyhow::anyhow!("connection refused")), ErrorClass::ConnectionError);
        assert_eq!(classify_error(&anyhow::anyhow!("request timed out")), ErrorClass::Timeout);
        assert!(is_transient(classify_error(&anyhow::anyhow!("429 rate limit exceeded"))));
    }

    #[test]
    fn classifies_domain_blocked_as_non_transient() {
        let class = classify_error(&anyhow::anyhow!("web_fetch domain not allowed: example.com"));
        assert_eq!(class, ErrorClass::DomainBlocked);
        assert!(!is_transient(class));
    }
}
