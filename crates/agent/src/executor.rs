//! The turn executor (§4.1) — the serial heart of the runtime. Owns the one
//! turn lock: only the task draining `events` may issue model calls or
//! persist an assistant turn. Everything else (pulse timer, reminder
//! scanner, deferred retry, telegram reader) is a producer into the same
//! queue; this module is the single consumer.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Utc;
use rand::thread_rng;
use tokio::sync::{Mutex, broadcast, mpsc};
use tracing::{info, warn};

use aigent_config::AppConfig;
use aigent_exec::ToolExecutor;
use aigent_llm::{ChatMessage, Provider};
use aigent_memory::{
    AgentMemory, CuriosityThresholds, CuriosityWeights, InputType, TurnRole,
};
use aigent_prompt::{BudgetStatus, PromptAssembler, PromptSnapshot};
use aigent_thinker::{ModelClient, ModelTask, TaskModels, TurnContext, ToolLoopConfig, ToolLoopOutcome, run_tool_loop};
use aigent_tools::{ToolRegistry, specs_to_openai_tools};

use crate::deferred_retry::DeferredRetryController;
use crate::events::{EventSender, EventSource, InboundEvent, channel};
use crate::pulse::PulseTimer;

/// Fan-out of turn-visible effects for whatever front end is attached —
/// the UI text stream, a telegram gateway, the TUI's clarification widget.
/// Modeled as a broadcast channel rather than a callback registry so any
/// number of interface ports (§6) can subscribe independently.
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    /// A streamed text chunk from pass 0 of the tool loop.
    TextChunk(String),
    /// The turn's terminal assistant text, plus provenance so a telegram
    /// gateway knows whether it still needs to deliver it itself (§4.1 step 10).
    Turn { text: String, source: EventSource, delayed: bool },
    /// `request_clarification` fired mid-loop.
    Clarification { question: String, options: Vec<String> },
    /// Both models were unavailable; a deferred retry has been armed.
    BothModelsUnavailable,
}

/// Per-task-category model routing resolved once from config at startup.
pub struct ModelRouting {
    pub by_task: HashMap<ModelTask, TaskModels>,
}

impl ModelRouting {
    pub fn from_config(config: &AppConfig) -> Self {
        let provider = if config.llm.provider.eq_ignore_ascii_case("openrouter") {
            Provider::OpenRouter
        } else {
            Provider::Ollama
        };
        let mut by_task = HashMap::new();
        for (key, task) in [
            ("conversation", ModelTask::Conversation),
            ("extraction", ModelTask::Extraction),
            ("simple", ModelTask::Simple),
            ("delegation", ModelTask::Delegation),
        ] {
            let primary_model = config
                .model_routing
                .task_models
                .get(key)
                .cloned()
                .unwrap_or_else(|| config.active_model().to_string());
            let failover_model = config
                .model_routing
                .failover_map
                .get(key)
                .cloned()
                .unwrap_or_else(|| primary_model.clone());
            by_task.insert(task, TaskModels { primary_provider: provider, primary_model, failover_model });
        }
        Self { by_task }
    }

    pub fn get(&self, task: ModelTask) -> &TaskModels {
        self.by_task.get(&task).expect("every ModelTask is populated by from_config")
    }
}

/// Tracks daily server-side tool usage so the capabilities prompt source and
/// the model-client budget check see the same counters. Resets on UTC day
/// rollover rather than on a timer, so a long-idle process doesn't need a
/// background task just to zero these out.
struct DailyBudget {
    day: chrono::NaiveDate,
    web_search_used: u32,
    web_fetch_used: u32,
}

impl DailyBudget {
    fn new(now: chrono::DateTime<Utc>) -> Self {
        Self { day: now.date_naive(), web_search_used: 0, web_fetch_used: 0 }
    }

    fn roll(&mut self, now: chrono::DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.day {
            self.day = today;
            self.web_search_used = 0;
            self.web_fetch_used = 0;
        }
    }
}

pub struct TurnExecutor {
    config: AppConfig,
    memory: Arc<Mutex<AgentMemory>>,
    model: ModelClient,
    routing: ModelRouting,
    tool_registry: Arc<ToolRegistry>,
    tool_executor: Arc<ToolExecutor>,
    assembler: PromptAssembler,
    pulse: Arc<PulseTimer>,
    deferred_retry: DeferredRetryController,
    events: EventSender,
    receiver: Mutex<mpsc::UnboundedReceiver<InboundEvent>>,
    busy: Arc<std::sync::atomic::AtomicBool>,
    out_tx: broadcast::Sender<ExecutorEvent>,
    budget: Mutex<DailyBudget>,
    session: Mutex<aigent_memory::Session>,
    session_start_seen: std::sync::atomic::AtomicBool,
}

impl TurnExecutor {
    pub fn new(
        config: AppConfig,
        memory: Arc<Mutex<AgentMemory>>,
        model: ModelClient,
        tool_registry: Arc<ToolRegistry>,
        tool_executor: Arc<ToolExecutor>,
    ) -> Arc<Self> {
        let (events, rx, busy) = channel();
        let pulse = PulseTimer::new(config.pulse.interval_seconds);
        let deferred_retry = DeferredRetryController::new(
            events.clone(),
            std::time::Duration::from_secs(config.model_routing.deferred_retry_delay_seconds),
        );
        let routing = ModelRouting::from_config(&config);
        let pattern_breaker_every_n = 6;
        let assembler = PromptAssembler::new().with_default_sources(pattern_breaker_every_n);
        let (out_tx, _) = broadcast::channel(256);

        Arc::new(Self {
            config,
            memory,
            model,
            routing,
            tool_registry,
            tool_executor,
            assembler,
            pulse,
            deferred_retry,
            events,
            receiver: Mutex::new(rx),
            busy,
            out_tx,
            budget: Mutex::new(DailyBudget::new(Utc::now())),
            session: Mutex::new(aigent_memory::Session::start(Utc::now())),
            session_start_seen: std::sync::atomic::AtomicBool::new(true),
        })
    }

    pub fn events(&self) -> EventSender {
        self.events.clone()
    }

    pub fn pulse(&self) -> Arc<PulseTimer> {
        self.pulse.clone()
    }

    pub fn memory(&self) -> Arc<Mutex<AgentMemory>> {
        self.memory.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tool_registry(&self) -> Arc<ToolRegistry> {
        self.tool_registry.clone()
    }

    pub fn tool_executor(&self) -> Arc<ToolExecutor> {
        self.tool_executor.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutorEvent> {
        self.out_tx.subscribe()
    }

    /// Spawns the pulse timer and reminder scheduler, wiring their fires
    /// into this executor's own event queue (§4.7). Intended to be called
    /// once, alongside `run()`, by whatever binary owns the process.
    pub fn spawn_drivers(self: &Arc<Self>) {
        let (fire_tx, mut fire_rx) = mpsc::unbounded_channel();
        self.pulse.clone().spawn(fire_tx);
        let events = self.events.clone();
        tokio::spawn(async move {
            while fire_rx.recv().await.is_some() {
                events.submit_pulse();
            }
        });

        let scheduler = crate::reminders::ReminderScheduler::new(
            self.memory.clone(),
            self.events.clone(),
            std::time::Duration::from_secs(30),
        );
        scheduler.spawn(true);
    }

    /// Drains the event queue forever. Intended to be the body of the one
    /// task that owns the turn lock; callers spawn the pulse timer and
    /// reminder scheduler separately, feeding this same `events()` front door.
    pub async fn run(self: Arc<Self>) {
        loop {
            let event = {
                let mut rx = self.receiver.lock().await;
                rx.recv().await
            };
            let Some(event) = event else {
                info!("turn executor event queue closed, exiting");
                return;
            };
            self.service(event).await;
        }
    }

    async fn service(self: &Arc<Self>, event: InboundEvent) {
        match event {
            InboundEvent::User { text, image, source, reply } => {
                self.deferred_retry.cancel().await;
                let is_session_start = self.session_start_seen.swap(false, Ordering::SeqCst);
                let input_type = match source {
                    EventSource::Telegram => InputType::Telegram,
                    EventSource::Local => InputType::Text,
                };
                let outcome = self.run_turn(text, image, input_type, is_session_start, false, source.clone()).await;
                if let Some(reply) = reply {
                    let _ = reply.send(outcome.unwrap_or_default());
                }
            }
            InboundEvent::Pulse => {
                let _ = self.run_turn(String::new(), None, InputType::Pulse, false, true, EventSource::Local).await;
            }
            InboundEvent::Reminder { intention_ids } => {
                let content = format!("{} intention(s) have come due: {:?}", intention_ids.len(), intention_ids);
                let _ = self.run_turn(content, None, InputType::ReminderPulse, false, true, EventSource::Local).await;
            }
            InboundEvent::DeferredRetry { original_input, source } => {
                let outcome = self.run_turn(original_input, None, InputType::Text, false, false, source.clone()).await;
                if let Some(text) = outcome {
                    let _ = self.out_tx.send(ExecutorEvent::Turn { text: format!("[delayed response] {text}"), source, delayed: true });
                }
            }
        }
    }

    /// The per-turn pipeline (§4.1 steps 1-11). Returns the terminal
    /// assistant text, if any was produced and persisted.
    async fn run_turn(
        self: &Arc<Self>,
        user_text: String,
        image: Option<String>,
        input_type: InputType,
        is_session_start: bool,
        is_pulse: bool,
        source: EventSource,
    ) -> Option<String> {
        self.busy.store(true, Ordering::SeqCst);
        self.pulse.pause();

        let result = self.run_turn_inner(user_text, image, input_type, is_session_start, is_pulse, source).await;

        self.pulse.resume();
        self.pulse.reset();
        self.busy.store(false, Ordering::SeqCst);

        result
    }

    async fn run_turn_inner(
        self: &Arc<Self>,
        user_text: String,
        image: Option<String>,
        input_type: InputType,
        is_session_start: bool,
        is_pulse: bool,
        source: EventSource,
    ) -> Option<String> {
        let now = Utc::now();
        let session_id = self.session.lock().await.id;

        // Step 2: persist the inbound turn before any model call (skipped
        // for content-free pulse ticks, which have nothing to log as a turn).
        if !matches!(input_type, InputType::Pulse) || !user_text.is_empty() {
            let role = if matches!(input_type, InputType::Pulse | InputType::ReminderPulse) { TurnRole::System } else { TurnRole::User };
            let mut mem = self.memory.lock().await;
            if let Err(err) = mem.turns.append(role, user_text.clone(), input_type, session_id, now).await {
                warn!(error = %err, "failed to persist inbound turn");
            }
        }

        let mut ctx = TurnContext::new(is_pulse, is_session_start);

        // Step 4/5: window + semantic retrieval, both read under one lock
        // acquisition so the snapshot is internally consistent.
        let (history, snapshot_owned) = self.build_snapshot(&mut ctx, &user_text, is_pulse, now).await;

        let system_prompt = self.assembler.assemble(&user_text, &mut ctx, &snapshot_owned.as_snapshot());

        let mut messages = vec![ChatMessage::system(system_prompt)];
        for turn in &history {
            match turn.role {
                TurnRole::User | TurnRole::System => messages.push(ChatMessage::user(turn.content.clone())),
                TurnRole::Assistant => messages.push(ChatMessage::assistant(turn.content.clone())),
            }
        }

        // Step 5: relevant memories ride on the *last* message, not the
        // system prompt.
        let mut last_user_content = if user_text.is_empty() { "(autonomous pulse — no new user input this turn)".to_string() } else { user_text.clone() };
        if let Some(extra) = &ctx.relevant_memories {
            last_user_content = format!("{last_user_content}\n\n[relevant memories]\n{extra}");
        }
        if let Some(img) = &image {
            last_user_content = format!("{last_user_content}\n[attached image: {img}]");
        }
        messages.push(ChatMessage::user(last_user_content));

        let tool_specs = self.tool_registry.list_specs();
        let tool_specs: Vec<_> = if is_pulse { tool_specs } else { tool_specs.into_iter().filter(|s| !s.metadata.pulse_only).collect() };
        let tools_json = specs_to_openai_tools(&tool_specs);

        let (token_tx, mut token_rx) = mpsc::channel::<String>(64);
        let out_tx = self.out_tx.clone();
        let drain = tokio::spawn(async move {
            while let Some(chunk) = token_rx.recv().await {
                let _ = out_tx.send(ExecutorEvent::TextChunk(chunk));
            }
        });

        let models = self.routing.get(ModelTask::Conversation);
        let config = ToolLoopConfig { max_passes: self.config.tools.max_tool_passes.max(1), warn_watermark: 5 };

        let outcome = run_tool_loop(
            &self.model,
            models,
            &mut messages,
            Some(&tools_json),
            &tool_specs,
            &self.tool_registry,
            &self.tool_executor,
            &mut ctx,
            config,
            token_tx,
        )
        .await;

        drop(drain);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "tool loop failed unexpectedly");
                return None;
            }
        };

        let final_text = match outcome {
            ToolLoopOutcome::BothModelsUnavailable { last_error } => {
                warn!(error = %last_error, "both primary and failover model unavailable this turn");
                self.deferred_retry.arm(user_text, source).await;
                let _ = self.out_tx.send(ExecutorEvent::BothModelsUnavailable);
                return None;
            }
            ToolLoopOutcome::Terminal { text, tool_executions, .. } => {
                self.record_budget_usage(&tool_executions).await;
                text
            }
        };

        // Step 8: empty final text is tolerated only if produced by a
        // non-empty accumulation; an empty assistant turn is never written.
        if !final_text.trim().is_empty() {
            let mut mem = self.memory.lock().await;
            if let Err(err) = mem.turns.append(TurnRole::Assistant, final_text.clone(), InputType::System, session_id, Utc::now()).await {
                warn!(error = %err, "failed to persist assistant turn");
            }
            drop(mem);
            self.maybe_extract().await;
        }

        // Step 9: apply a mid-loop pulse-interval change only now that the
        // turn is over.
        if let Some(secs) = ctx.pulse_interval_change {
            if self.pulse.set_interval(secs) {
                info!(seconds = secs, "pulse interval changed by agent this turn");
            }
        }

        if let Some(clarification) = ctx.clarification {
            let _ = self.out_tx.send(ExecutorEvent::Clarification { question: clarification.question, options: clarification.options });
        }

        if !final_text.trim().is_empty() {
            // Step 10: a telegram-sourced turn that never called
            // `send_telegram` gets routed back by whichever gateway is
            // listening on `subscribe()`.
            let _ = self.out_tx.send(ExecutorEvent::Turn { text: final_text.clone(), source, delayed: false });
        }

        Some(final_text)
    }

    async fn record_budget_usage(&self, executions: &[aigent_thinker::ToolExecution]) {
        let mut budget = self.budget.lock().await;
        budget.roll(Utc::now());
        for exec in executions {
            match exec.tool_name.as_str() {
                "web_search" => budget.web_search_used = budget.web_search_used.saturating_add(1),
                "web_fetch" => budget.web_fetch_used = budget.web_fetch_used.saturating_add(1),
                _ => {}
            }
        }
    }

    /// Builds the read-only snapshot the prompt assembler sees, running
    /// semantic retrieval and (if enabled) the curiosity engine's
    /// `get_current_goal` under one lock acquisition.
    async fn build_snapshot(
        &self,
        ctx: &mut TurnContext,
        user_input: &str,
        is_pulse: bool,
        now: chrono::DateTime<Utc>,
    ) -> (Vec<aigent_memory::ConversationTurn>, OwnedSnapshot) {
        let mut mem = self.memory.lock().await;
        let window = self.config.context_window.window_size;
        let history = mem.turns.window(window);

        let core_memory_block = mem.core.render_block();
        let active_thoughts: Vec<_> = mem.active_thoughts.all().to_vec();
        let growth_threads_active: Vec<_> = mem.growth_threads.active().into_iter().cloned().collect();
        let growth_threads_dormant: Vec<_> = mem.growth_threads.dormant().into_iter().cloned().collect();
        let intentions_pending: Vec<_> = mem.intentions.list(Some(aigent_memory::IntentionStatus::Pending)).into_iter().cloned().collect();
        let intentions_triggered: Vec<_> = mem.intentions.list(Some(aigent_memory::IntentionStatus::Triggered)).into_iter().cloned().collect();

        let semantic_memory_block = if is_pulse || user_input.is_empty() {
            None
        } else {
            let embedding = mem.embed(user_input);
            let hits = mem
                .long_term
                .search(embedding.as_deref(), 5, now, |m| {
                    aigent_memory::topic_warmth_score(user_input, &m.content)
                })
                .await;
            if hits.is_empty() {
                None
            } else {
                Some(
                    hits.iter()
                        .map(|h| format!("- {} (importance {:.2})", h.memory.content, h.importance_score))
                        .collect::<Vec<_>>()
                        .join("\n"),
                )
            }
        };

        let curiosity_goal = if self.config.curiosity.enabled {
            let weights = CuriosityWeights {
                weight_dormancy: self.config.curiosity.weight_dormancy,
                weight_freshness: self.config.curiosity.weight_freshness,
                importance: self.config.curiosity.weight_importance,
                factual_category_boost: 1.2,
            };
            let thresholds = CuriosityThresholds {
                min_importance: self.config.curiosity.min_importance,
                min_importance_fresh: self.config.curiosity.min_importance,
                dormant_days: self.config.curiosity.dormant_days as i64,
                dormant_min_days_if_never_accessed: 3,
                fresh_hours: self.config.curiosity.fresh_hours as i64,
            };
            let memories = mem.long_term.all().to_vec();
            let mut rng = thread_rng();
            match mem.curiosity.get_current_goal(&memories, weights, thresholds, &mut rng).await {
                Ok(goal) => Some(goal),
                Err(err) => {
                    warn!(error = %err, "curiosity engine failed to produce a goal");
                    None
                }
            }
        } else {
            None
        };

        let turn_count = mem.turns.turn_count();
        let last_interaction_at = mem.turns.last_turn_at();

        drop(mem);

        let session_start = self.session.lock().await.start_time;
        let (web_search_used, web_fetch_used) = {
            let mut budget = self.budget.lock().await;
            budget.roll(now);
            (budget.web_search_used, budget.web_fetch_used)
        };

        (
            history,
            OwnedSnapshot {
                debug_mode: false,
                core_memory_block,
                active_thoughts,
                growth_threads_active,
                growth_threads_dormant,
                intentions_pending,
                intentions_triggered,
                pulse_enabled: self.config.pulse.enabled,
                pulse_interval_label: self.pulse.interval_label(),
                web_search: BudgetStatus {
                    enabled: self.config.tools.web_search_enabled,
                    daily_cap: self.config.tools.web_search_daily_cap,
                    used_today: web_search_used,
                },
                web_fetch: BudgetStatus {
                    enabled: self.config.tools.web_fetch_enabled,
                    daily_cap: self.config.tools.web_fetch_daily_cap,
                    used_today: web_fetch_used,
                },
                session_start,
                turn_count,
                last_interaction_at,
                now,
                semantic_memory_block,
                curiosity_goal,
                bot_name: self.config.agent.name.clone(),
            },
        )
    }

    async fn maybe_extract(&self) {
        let mut mem = self.memory.lock().await;
        let extraction_models = self.routing.get(ModelTask::Extraction);
        match crate::extractor::run_if_overflowing(&mut mem, &self.model, extraction_models).await {
            Ok(0) => {}
            Ok(n) => info!(count = n, "extracted memories from overflowing context window"),
            Err(err) => warn!(error = %err, "extraction pass failed"),
        }
    }
}

/// Owns the data a [`PromptSnapshot`] borrows from, so the borrow doesn't
/// have to outlive the memory-store lock guard it was built under.
struct OwnedSnapshot {
    debug_mode: bool,
    core_memory_block: String,
    active_thoughts: Vec<aigent_memory::ActiveThought>,
    growth_threads_active: Vec<aigent_memory::GrowthThread>,
    growth_threads_dormant: Vec<aigent_memory::GrowthThread>,
    intentions_pending: Vec<aigent_memory::Intention>,
    intentions_triggered: Vec<aigent_memory::Intention>,
    pulse_enabled: bool,
    pulse_interval_label: &'static str,
    web_search: BudgetStatus,
    web_fetch: BudgetStatus,
    session_start: chrono::DateTime<Utc>,
    turn_count: usize,
    last_interaction_at: Option<chrono::DateTime<Utc>>,
    now: chrono::DateTime<Utc>,
    semantic_memory_block: Option<String>,
    curiosity_goal: Option<aigent_memory::CuriosityGoal>,
    bot_name: String,
}

impl OwnedSnapshot {
    fn as_snapshot(&self) -> PromptSnapshot<'_> {
        PromptSnapshot {
            debug_mode: self.debug_mode,
            core_memory_block: self.core_memory_block.clone(),
            active_thoughts: &self.active_thoughts,
            growth_threads_active: self.growth_threads_active.iter().collect(),
            growth_threads_dormant: self.growth_threads_dormant.iter().collect(),
            intentions_pending: self.intentions_pending.iter().collect(),
            intentions_triggered: self.intentions_triggered.iter().collect(),
            pulse_enabled: self.pulse_enabled,
            pulse_interval_label: self.pulse_interval_label,
            web_search: self.web_search,
            web_fetch: self.web_fetch,
            session_start: self.session_start,
            turn_count: self.turn_count,
            last_interaction_at: self.last_interaction_at,
            now: self.now,
            semantic_memory_block: self.semantic_memory_block.clone(),
            curiosity_goal: self.curiosity_goal.clone(),
            bot_name: self.bot_name.clone(),
        }
    }
}
