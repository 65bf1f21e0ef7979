//! Model backend adapters
//!
//! Key design: the concrete generative model sits behind the
//! [`ModelBackend`] trait, and backends are composed into an explicit
//! ordered [`FallbackChain`] tried in sequence. Every failed attempt is
//! surfaced as a capability event so the trace shows exactly which
//! backend failed and why.

use crate::circuit_breaker::CircuitBreaker;
use crate::types::{ChatMessage, ChatRequest, ChatResponse, ResponseFormat};
use async_trait::async_trait;
use atelier_core::{AtelierError, BackendEndpoint, CapabilityEvent, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEFAULT_MAX_TOKENS: usize = 4096;
const DEFAULT_TEMPERATURE: f32 = 0.5;

// Rate limit retry configuration
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_SECS: u64 = 5;
const MAX_BACKOFF_SECS: u64 = 60;

/// A chat-completion backend. Implementations are stateless per call;
/// all conversation context arrives in the prompts.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend identifier recorded in phase records (the model name)
    fn id(&self) -> &str;

    /// Produce a completion for the given prompts
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat backend over HTTP
pub struct HttpChatBackend {
    client: reqwest::Client,
    endpoint: BackendEndpoint,
    max_tokens: usize,
    temperature: f32,
    breaker: CircuitBreaker,
}

impl HttpChatBackend {
    pub fn new(endpoint: BackendEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            breaker: CircuitBreaker::default(),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn api_key(&self) -> Result<String> {
        std::env::var(&self.endpoint.api_key_env).map_err(|_| {
            AtelierError::Capability(format!(
                "API key environment variable {} is not set",
                self.endpoint.api_key_env
            ))
        })
    }
}

#[async_trait]
impl ModelBackend for HttpChatBackend {
    fn id(&self) -> &str {
        &self.endpoint.model
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        if !self.breaker.can_execute() {
            return Err(AtelierError::Capability(format!(
                "backend {} circuit is open after repeated failures",
                self.endpoint.model
            )));
        }

        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", self.endpoint.base_url);
        let request = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_prompt),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: Some(ResponseFormat::json_object()),
        };

        let mut retries = 0;
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            tracing::debug!(
                backend = %self.endpoint.model,
                attempt = retries + 1,
                "sending completion request"
            );

            let response = self
                .client
                .post(&url)
                .bearer_auth(&api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    self.breaker.record_failure();
                    AtelierError::Capability(format!(
                        "backend {} request failed: {}",
                        self.endpoint.model, e
                    ))
                })?;

            let status = response.status();

            // Rate limited: honor retry-after, else exponential backoff
            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RETRIES {
                    self.breaker.record_failure();
                    return Err(AtelierError::Capability(format!(
                        "backend {} rate limited after {} retries",
                        self.endpoint.model, MAX_RETRIES
                    )));
                }

                let wait_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                tracing::warn!(
                    backend = %self.endpoint.model,
                    wait_secs,
                    retry = retries,
                    "rate limited (429), backing off"
                );
                tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());

                if status.is_server_error() && retries < MAX_RETRIES {
                    retries += 1;
                    tracing::warn!(
                        backend = %self.endpoint.model,
                        %status,
                        retry = retries,
                        "server error, backing off"
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                    continue;
                }

                self.breaker.record_failure();
                return Err(AtelierError::Capability(format!(
                    "backend {} error {}: {}",
                    self.endpoint.model, status, error_text
                )));
            }

            let chat: ChatResponse = response.json().await.map_err(|e| {
                AtelierError::Capability(format!(
                    "backend {} returned unparseable body: {}",
                    self.endpoint.model, e
                ))
            })?;

            let content = chat
                .choices
                .first()
                .map(|c| c.message.content.clone())
                .ok_or_else(|| {
                    AtelierError::Capability(format!(
                        "backend {} returned no choices",
                        self.endpoint.model
                    ))
                })?;

            self.breaker.record_success();

            if let Some(usage) = &chat.usage {
                tracing::debug!(
                    backend = %self.endpoint.model,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    "completion received"
                );
            }

            return Ok(content);
        }
    }
}

/// Ordered list of backends tried in sequence, each call bounded by a
/// timeout. Failed attempts accumulate as capability events until
/// drained by the caller.
pub struct FallbackChain {
    backends: Vec<Arc<dyn ModelBackend>>,
    timeout: Duration,
    events: Mutex<Vec<CapabilityEvent>>,
}

impl FallbackChain {
    pub fn new(backends: Vec<Arc<dyn ModelBackend>>, timeout: Duration) -> Self {
        debug_assert!(!backends.is_empty());
        Self {
            backends,
            timeout,
            events: Mutex::new(Vec::new()),
        }
    }

    /// Identifier of the preferred backend, for phase records
    pub fn primary_id(&self) -> String {
        self.backends
            .first()
            .map(|b| b.id().to_string())
            .unwrap_or_default()
    }

    /// Take all events accumulated since the last drain
    pub fn drain_events(&self) -> Vec<CapabilityEvent> {
        std::mem::take(&mut self.events.lock().expect("chain mutex poisoned"))
    }

    fn push_event(&self, backend: &str, detail: String) {
        self.events
            .lock()
            .expect("chain mutex poisoned")
            .push(CapabilityEvent {
                backend: backend.to_string(),
                detail,
            });
    }

    /// Try each backend in order until one succeeds
    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let mut last_error = String::new();

        for backend in &self.backends {
            let attempt = tokio::time::timeout(
                self.timeout,
                backend.complete(system_prompt, user_prompt),
            )
            .await;

            match attempt {
                Ok(Ok(text)) => return Ok(text),
                Ok(Err(e)) => {
                    tracing::warn!(backend = backend.id(), error = %e, "backend failed, trying next");
                    last_error = e.to_string();
                    self.push_event(backend.id(), last_error.clone());
                }
                Err(_) => {
                    last_error = format!("timed out after {:?}", self.timeout);
                    tracing::warn!(backend = backend.id(), "backend timed out, trying next");
                    self.push_event(backend.id(), last_error.clone());
                }
            }
        }

        Err(AtelierError::Capability(format!(
            "all {} backend(s) failed; last error: {}",
            self.backends.len(),
            last_error
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticBackend {
        id: String,
        response: Result<String>,
    }

    impl StaticBackend {
        fn ok(id: &str, text: &str) -> Arc<dyn ModelBackend> {
            Arc::new(Self {
                id: id.to_string(),
                response: Ok(text.to_string()),
            })
        }

        fn failing(id: &str) -> Arc<dyn ModelBackend> {
            Arc::new(Self {
                id: id.to_string(),
                response: Err(AtelierError::Capability("backend down".to_string())),
            })
        }
    }

    #[async_trait]
    impl ModelBackend for StaticBackend {
        fn id(&self) -> &str {
            &self.id
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(AtelierError::Capability("backend down".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_primary_success_no_events() {
        let chain = FallbackChain::new(
            vec![StaticBackend::ok("primary", "hello")],
            Duration::from_secs(5),
        );
        let text = chain.complete("sys", "user").await.unwrap();
        assert_eq!(text, "hello");
        assert!(chain.drain_events().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_records_failed_attempt() {
        let chain = FallbackChain::new(
            vec![
                StaticBackend::failing("primary"),
                StaticBackend::ok("secondary", "rescued"),
            ],
            Duration::from_secs(5),
        );
        let text = chain.complete("sys", "user").await.unwrap();
        assert_eq!(text, "rescued");

        let events = chain.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].backend, "primary");
        // A second drain returns nothing
        assert!(chain.drain_events().is_empty());
    }

    #[tokio::test]
    async fn test_all_backends_failing_is_capability_error() {
        let chain = FallbackChain::new(
            vec![
                StaticBackend::failing("primary"),
                StaticBackend::failing("secondary"),
            ],
            Duration::from_secs(5),
        );
        let err = chain.complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, AtelierError::Capability(_)));
        assert_eq!(chain.drain_events().len(), 2);
    }

    struct SlowBackend;

    #[async_trait]
    impl ModelBackend for SlowBackend {
        fn id(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("too late".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_treated_as_capability_error() {
        let chain = FallbackChain::new(vec![Arc::new(SlowBackend)], Duration::from_millis(50));
        let err = chain.complete("sys", "user").await.unwrap_err();
        assert!(matches!(err, AtelierError::Capability(_)));

        let events = chain.drain_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].detail.contains("timed out"));
    }

    #[test]
    fn test_missing_api_key_is_capability_error() {
        let backend = HttpChatBackend::new(BackendEndpoint {
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "ATELIER_TEST_UNSET_KEY".to_string(),
        });
        std::env::remove_var("ATELIER_TEST_UNSET_KEY");
        assert!(backend.api_key().is_err());
    }
}
