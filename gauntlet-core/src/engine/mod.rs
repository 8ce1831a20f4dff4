//! Completion engine abstraction.
//!
//! The evaluation pipeline consumes a call-style completion capability and
//! never owns the model runtime. Engines implement [`CompletionCapability`]
//! and are validated once at binding time via [`bind`], not per call.

pub mod openai_compat;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;
use crate::types::{CompletionRequest, CompletionResponse, TokenUsage};

pub use openai_compat::{OpenAiCompatEngine, OpenAiEngineConfig};

/// A call-style completion capability: accepts a prompt and generation
/// options, returns text plus token usage.
#[async_trait]
pub trait CompletionCapability: std::fmt::Debug + Send + Sync {
    /// Perform a completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, EngineError>;

    /// Pre-validate availability before batched execution.
    async fn health_check(&self) -> bool {
        true
    }

    /// The model name this engine serves.
    fn model_name(&self) -> &str;
}

/// Validate an engine once at binding time. Returns the engine unchanged
/// when its health check passes.
pub async fn bind(
    engine: Arc<dyn CompletionCapability>,
) -> Result<Arc<dyn CompletionCapability>, EngineError> {
    if !engine.health_check().await {
        return Err(EngineError::Unavailable {
            model: engine.model_name().to_string(),
        });
    }
    tracing::debug!(model = engine.model_name(), "Completion engine bound");
    Ok(engine)
}

/// Retry policy for transient engine failures.
#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 200,
            backoff_multiplier: 2.0,
            max_backoff_ms: 2_000,
        }
    }
}

/// Execute an async operation with exponential backoff retry on transient
/// errors. Permanent errors (auth, parse) return immediately.
pub async fn with_retry<F, Fut, T>(settings: &RetrySettings, operation: F) -> Result<T, EngineError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut last_err = None;
    for attempt in 0..=settings.max_retries {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt == settings.max_retries {
                    return Err(e);
                }
                let backoff_ms = compute_backoff(settings, attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = settings.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient engine error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(EngineError::Connection {
        message: "All retry attempts exhausted".to_string(),
    }))
}

/// Check if an engine error is transient.
fn is_retryable(err: &EngineError) -> bool {
    matches!(
        err,
        EngineError::Connection { .. } | EngineError::Timeout { .. }
    )
}

fn compute_backoff(settings: &RetrySettings, attempt: u32) -> u64 {
    let base =
        settings.initial_backoff_ms as f64 * settings.backoff_multiplier.powi(attempt as i32);
    base.min(settings.max_backoff_ms as f64) as u64
}

/// A scripted completion engine for tests: responses are queued and popped
/// in order, with optional failure injection and artificial delay.
#[derive(Debug)]
pub struct MockCompletionEngine {
    model: String,
    responses: std::sync::Mutex<Vec<CompletionResponse>>,
    fail_with: std::sync::Mutex<Option<String>>,
    delay: std::sync::Mutex<Option<Duration>>,
    healthy: bool,
}

impl MockCompletionEngine {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: std::sync::Mutex::new(Vec::new()),
            fail_with: std::sync::Mutex::new(None),
            delay: std::sync::Mutex::new(None),
            healthy: true,
        }
    }

    /// An engine that always returns the given text. Queues enough copies
    /// to serve repeated calls.
    pub fn with_response(text: &str) -> Self {
        let engine = Self::new();
        for _ in 0..64 {
            engine.queue_response(Self::text_response(text));
        }
        engine
    }

    /// An engine whose health check fails.
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        self.responses.lock().unwrap().push(response);
    }

    /// Make every subsequent `complete` call fail with this message.
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    /// Delay every subsequent `complete` call (for timeout tests).
    pub fn delay_responses(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Create a simple text response with plausible usage.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: text.to_string(),
            usage: Some(TokenUsage {
                total_tokens: 150,
                prompt_tokens: Some(100),
                completion_tokens: Some(50),
            }),
            model: "mock-model".to_string(),
        }
    }

    /// Echo the last user message back (fallback when the queue is empty).
    fn echo_response(request: &CompletionRequest) -> CompletionResponse {
        let content = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == crate::types::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        CompletionResponse {
            content,
            usage: None,
            model: "mock-model".to_string(),
        }
    }
}

impl Default for MockCompletionEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionCapability for MockCompletionEngine {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, EngineError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(EngineError::ApiRequest { message });
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(Self::echo_response(&request))
        } else {
            Ok(responses.remove(0))
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
