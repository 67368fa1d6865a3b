//! One open conversation.
//!
//! [`ConversationSession`] owns the live view, the cost accumulator, the
//! audit recorder and the subscription pump. Nothing here is global: open a
//! session, drive it with [`ConversationSession::send`], and close it.
//!
//! Each exchange runs on its own task, so dropping a `send` future or closing
//! the session never abandons an inference that is already under way.

use crate::accumulator::CostAccumulator;
use crate::audit::AuditRecorder;
use crate::constants::{
    DEBUGGER_SYSTEM_PROMPT, DEFAULT_HISTORY_LIMIT, DEFAULT_INFER_TIMEOUT, DEFAULT_MODEL,
    DEFAULT_SYSTEM_PROMPT,
};
use crate::error::{ChargeError, InferError, SendError, StoreError};
use crate::gateway::InferenceGateway;
use crate::pricing::{RateTable, estimate};
use crate::store::{AuditLog, ConversationStore, Store, Subscription};
use crate::types::{
    AuditEntry, ChatTurn, ConversationEntry, Cost, Message, MessageId, ModelId, Role, TokenUsage,
};
use crate::view::ConversationView;
use futures::StreamExt;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: ModelId,
    pub system_prompt: String,
    /// Subscription window: how many recent messages the view keeps
    pub history_limit: usize,
    /// Upper bound on a single inference call
    pub timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: ModelId::from(DEFAULT_MODEL),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            timeout: DEFAULT_INFER_TIMEOUT,
        }
    }
}

/// Result of one accepted `send`
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The model replied; `cost` covers the user message and the reply
    Answered { reply: Message, cost: Cost },
    /// The attempt failed and was not charged
    Failed(InferError),
}

/// Result of a code analysis request
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    /// The model returned a JSON document
    Report(serde_json::Value),
    /// The model replied with something that is not JSON
    Raw(String),
    Failed(InferError),
}

struct Shared {
    store: Arc<dyn Store>,
    gateway: Arc<dyn InferenceGateway>,
    rates: Arc<RateTable>,
    audit: AuditRecorder,
    options: SessionOptions,
    view: Mutex<ConversationView>,
    accumulator: Mutex<CostAccumulator>,
    changes: watch::Sender<u64>,
}

pub struct ConversationSession {
    shared: Arc<Shared>,
    in_flight: Arc<AsyncMutex<()>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConversationSession {
    /// Subscribe to the store and start keeping the view in sync. The view
    /// already holds the current window when this returns.
    pub async fn open(
        store: Arc<dyn Store>,
        gateway: Arc<dyn InferenceGateway>,
        rates: Arc<RateTable>,
        options: SessionOptions,
    ) -> Result<Self, StoreError> {
        let mut subscription = store.subscribe(options.history_limit).await?;
        let mut view = ConversationView::new();
        if let Some(current) = subscription.next_snapshot().await {
            view.reconcile(current);
        }

        tracing::info!(
            model = %options.model,
            messages = view.len(),
            window = options.history_limit,
            "conversation session opened"
        );

        let (changes, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            audit: AuditRecorder::spawn(Arc::clone(&store)),
            store,
            gateway,
            rates,
            options,
            view: Mutex::new(view),
            accumulator: Mutex::new(CostAccumulator::new()),
            changes,
        });
        let pump = tokio::spawn(run_pump(Arc::clone(&shared), subscription));

        Ok(Self {
            shared,
            in_flight: Arc::new(AsyncMutex::new(())),
            pump: Mutex::new(Some(pump)),
            closed: AtomicBool::new(false),
        })
    }

    /// Send a user message and wait for the exchange to finish.
    ///
    /// Only one exchange may run at a time; a concurrent call gets
    /// [`SendError::Busy`]. Provider failures are not errors here: they show
    /// up as [`SendOutcome::Failed`], a system note in the view and an audit
    /// entry.
    pub async fn send(&self, text: &str) -> Result<SendOutcome, SendError> {
        if text.trim().is_empty() {
            return Err(SendError::Empty);
        }
        let guard = self.acquire()?;
        let shared = Arc::clone(&self.shared);
        let text = text.to_string();
        join(tokio::spawn(async move {
            let _guard = guard;
            shared.exchange(text).await
        }))
        .await
    }

    /// Ask the model to debug `code`. The request is charged and audited like
    /// a chat exchange but its messages are not stored.
    pub async fn analyze(&self, code: &str) -> Result<Analysis, SendError> {
        if code.trim().is_empty() {
            return Err(SendError::Empty);
        }
        let guard = self.acquire()?;
        let shared = Arc::clone(&self.shared);
        let code = code.to_string();
        join(tokio::spawn(async move {
            let _guard = guard;
            shared.analysis(code).await
        }))
        .await
    }

    /// Stop following the store and flush the audit trail. An exchange that is
    /// in flight runs to completion first. Returns the number of audit entries
    /// still undelivered.
    pub async fn close(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
        let _idle = self.in_flight.lock().await;
        let remaining = self.shared.audit.flush().await;
        tracing::info!(
            total = %self.total_cost(),
            undelivered_audit = remaining,
            "conversation session closed"
        );
        remaining
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// `true` while an exchange is running
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    pub fn total_cost(&self) -> Cost {
        lock(&self.shared.accumulator).total()
    }

    pub fn charged_events(&self) -> usize {
        lock(&self.shared.accumulator).events()
    }

    pub fn entries(&self) -> Vec<ConversationEntry> {
        lock(&self.shared.view).entries().to_vec()
    }

    pub fn messages(&self) -> Vec<Message> {
        lock(&self.shared.view).messages()
    }

    /// Ticks whenever the view changes
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.shared.changes.subscribe()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.shared.options
    }

    pub fn rates(&self) -> &RateTable {
        &self.shared.rates
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.shared.store
    }

    /// Audit entries the store has accepted
    pub async fn audit_entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        self.shared.store.audit_entries().await
    }

    /// Audit entries waiting in the local fallback queue
    pub fn pending_audit(&self) -> Vec<AuditEntry> {
        self.shared.audit.pending()
    }

    pub async fn flush_audit(&self) -> usize {
        self.shared.audit.flush().await
    }

    fn acquire(&self) -> Result<tokio::sync::OwnedMutexGuard<()>, SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        Arc::clone(&self.in_flight)
            .try_lock_owned()
            .map_err(|_| SendError::Busy)
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        let pump = self
            .pump
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pump) = pump {
            pump.abort();
        }
    }
}

async fn join<T>(task: JoinHandle<Result<T, SendError>>) -> Result<T, SendError> {
    match task.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
        Err(_) => Err(SendError::Closed),
    }
}

async fn run_pump(shared: Arc<Shared>, mut subscription: Subscription) {
    while let Some(snapshot) = subscription.next().await {
        lock(&shared.view).reconcile(snapshot);
        shared.notify();
    }
    tracing::debug!("conversation subscription ended");
}

impl Shared {
    async fn exchange(&self, text: String) -> Result<SendOutcome, SendError> {
        let model = &self.options.model;
        let user = Message::user(text);
        let user_cost = self.rates.cost(&user.content, model);

        self.show(user.clone());
        self.persist(user.clone()).await;

        let mut history = vec![system_turn(&self.options.system_prompt)];
        history.extend(lock(&self.view).history());

        let (result, latency_ms) = self.infer(&history).await;
        let reply = match result {
            Ok(reply) => Message::assistant(reply),
            Err(error) => {
                tracing::warn!(model = %model, latency_ms, error = %error, "inference failed");
                self.show(Message::system(format!("Error: {error}")));
                self.audit.record(AuditEntry::inference_error(
                    model.clone(),
                    Some(latency_ms),
                    error.to_string(),
                ));
                return Ok(SendOutcome::Failed(error));
            }
        };

        let reply_cost = self.rates.cost(&reply.content, model);
        let total = self.charge(&[(&user.id, user_cost), (&reply.id, reply_cost)])?;
        let cost = user_cost + reply_cost;

        self.show(reply.clone());
        self.persist(reply.clone()).await;

        let usage = TokenUsage {
            prompt_units: estimate(&user.content),
            completion_units: estimate(&reply.content),
        };
        self.audit
            .record(AuditEntry::success(model.clone(), cost, usage, latency_ms));

        tracing::info!(
            model = %model,
            latency_ms,
            message_id = %reply.id,
            cost = %cost,
            total = %total,
            "exchange completed"
        );
        Ok(SendOutcome::Answered { reply, cost })
    }

    async fn analysis(&self, code: String) -> Result<Analysis, SendError> {
        let model = &self.options.model;
        let history = [
            system_turn(DEBUGGER_SYSTEM_PROMPT),
            ChatTurn {
                role: Role::User,
                content: code,
            },
        ];

        let (result, latency_ms) = self.infer(&history).await;
        let reply = match result {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(model = %model, latency_ms, error = %error, "analysis failed");
                self.audit.record(AuditEntry::inference_error(
                    model.clone(),
                    Some(latency_ms),
                    error.to_string(),
                ));
                return Ok(Analysis::Failed(error));
            }
        };

        let code = &history[1].content;
        let code_cost = self.rates.cost(code, model);
        let reply_cost = self.rates.cost(&reply, model);
        self.charge(&[
            (&MessageId::generate(), code_cost),
            (&MessageId::generate(), reply_cost),
        ])?;

        let usage = TokenUsage {
            prompt_units: estimate(code),
            completion_units: estimate(&reply),
        };
        self.audit.record(AuditEntry::success(
            model.clone(),
            code_cost + reply_cost,
            usage,
            latency_ms,
        ));
        Ok(parse_report(reply))
    }

    async fn infer(&self, history: &[ChatTurn]) -> (Result<String, InferError>, u64) {
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.options.timeout,
            self.gateway.infer(history, &self.options.model),
        )
        .await
        .unwrap_or(Err(InferError::Timeout(self.options.timeout)));
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        (result, latency_ms)
    }

    /// Commit all `events` or none of them
    fn charge(&self, events: &[(&MessageId, Cost)]) -> Result<Cost, ChargeError> {
        let mut accumulator = lock(&self.accumulator);
        if let Some((id, _)) = events.iter().find(|(id, _)| accumulator.is_charged(id)) {
            return Err(ChargeError::AlreadyCharged((*id).clone()));
        }
        if let Some((_, amount)) = events.iter().find(|(_, amount)| amount.is_negative()) {
            return Err(ChargeError::Negative(*amount));
        }
        let mut total = accumulator.total();
        for (id, amount) in events {
            total = accumulator.add(id, *amount)?;
        }
        Ok(total)
    }

    async fn persist(&self, message: Message) {
        let id = message.id.clone();
        match self.store.append(message).await {
            Ok(stored) => {
                lock(&self.view).confirm(&stored);
                self.notify();
            }
            Err(e) => {
                tracing::warn!(message_id = %id, error = %e, "message not stored, keeping it local");
                self.audit.record(AuditEntry::store_error(
                    self.options.model.clone(),
                    e.to_string(),
                ));
            }
        }
    }

    fn show(&self, message: Message) {
        lock(&self.view).push_local(message);
        self.notify();
    }

    fn notify(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }
}

fn system_turn(prompt: &str) -> ChatTurn {
    ChatTurn {
        role: Role::System,
        content: prompt.to_string(),
    }
}

/// Accept a JSON object or array, optionally wrapped in a Markdown code fence
fn parse_report(reply: String) -> Analysis {
    let body = strip_fence(&reply);
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) if value.is_object() || value.is_array() => Analysis::Report(value),
        _ => Analysis::Raw(reply),
    }
}

fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
