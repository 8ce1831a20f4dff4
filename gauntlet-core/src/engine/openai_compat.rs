//! OpenAI-compatible completion engine.
//!
//! Speaks the chat-completions wire format (OpenAI, Azure, Ollama, vLLM,
//! LM Studio): request `{messages, max_tokens, temperature}`, response
//! `choices[0].message.content` plus `usage` token counts.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use crate::engine::{with_retry, CompletionCapability, RetrySettings};
use crate::error::EngineError;
use crate::types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};

/// Configuration for an OpenAI-compatible engine.
#[derive(Debug, Clone)]
pub struct OpenAiEngineConfig {
    /// Base URL (default: the OpenAI API).
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Explicit API key; takes precedence over the environment.
    pub api_key: Option<String>,
    pub model: String,
    pub request_timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for OpenAiEngineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: "GAUNTLET_API_KEY".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            request_timeout_secs: 60,
            retry: RetrySettings::default(),
        }
    }
}

/// OpenAI-compatible completion engine over HTTP.
#[derive(Debug)]
pub struct OpenAiCompatEngine {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetrySettings,
}

impl OpenAiCompatEngine {
    pub fn new(config: &OpenAiEngineConfig) -> Result<Self, EngineError> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        let is_local = base_url.contains("localhost") || base_url.contains("127.0.0.1");

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(&config.api_key_env).ok())
            .or_else(|| {
                if is_local {
                    // Local engines (Ollama, vLLM, LM Studio) accept any token.
                    debug!("No API key set for local engine; using dummy bearer token");
                    Some("local".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| EngineError::AuthFailed {
                engine: format!("OpenAI-compatible: env var '{}' not set", config.api_key_env),
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| EngineError::Connection {
                message: format!("HTTP client build failed: {e}"),
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model: config.model.clone(),
            retry: config.retry,
        })
    }

    fn messages_to_json(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                json!({ "role": role, "content": msg.content })
            })
            .collect()
    }

    /// Parse an OpenAI-format response body.
    fn parse_response(body: &Value, model: &str) -> Result<CompletionResponse, EngineError> {
        let message = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|choice| choice.get("message"))
            .ok_or_else(|| EngineError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let usage = body.get("usage").map(|u| TokenUsage {
            total_tokens: u
                .get("total_tokens")
                .and_then(|t| t.as_u64())
                .unwrap_or(0) as usize,
            prompt_tokens: u
                .get("prompt_tokens")
                .and_then(|t| t.as_u64())
                .map(|t| t as usize),
            completion_tokens: u
                .get("completion_tokens")
                .and_then(|t| t.as_u64())
                .map(|t| t as usize),
        });

        let resp_model = body
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string();

        Ok(CompletionResponse {
            content,
            usage,
            model: resp_model,
        })
    }

    fn classify_http_error(err: reqwest::Error, timeout_ms: u64) -> EngineError {
        if err.is_timeout() {
            EngineError::Timeout { timeout_ms }
        } else if err.is_connect() {
            EngineError::Connection {
                message: err.to_string(),
            }
        } else {
            EngineError::ApiRequest {
                message: err.to_string(),
            }
        }
    }

    async fn complete_once(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, EngineError> {
        let payload = json!({
            "model": self.model,
            "messages": Self::messages_to_json(&request.messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::classify_http_error(e, 0))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::ApiRequest {
                message: format!("HTTP {status}: {body}"),
            });
        }

        let body: Value = response.json().await.map_err(|e| EngineError::ResponseParse {
            message: e.to_string(),
        })?;
        Self::parse_response(&body, &self.model)
    }
}

#[async_trait]
impl CompletionCapability for OpenAiCompatEngine {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, EngineError> {
        with_retry(&self.retry, || self.complete_once(&request)).await
    }

    async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "Engine health check failed");
                false
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_full() {
        let body = json!({
            "choices": [{"message": {"content": "Check: done"}}],
            "usage": {"total_tokens": 30, "prompt_tokens": 20, "completion_tokens": 10},
            "model": "gpt-4o-mini",
        });
        let resp = OpenAiCompatEngine::parse_response(&body, "fallback").unwrap();
        assert_eq!(resp.content, "Check: done");
        let usage = resp.usage.unwrap();
        assert_eq!(usage.total_tokens, 30);
        assert_eq!(usage.prompt_tokens, Some(20));
        assert_eq!(usage.completion_tokens, Some(10));
        assert_eq!(resp.model, "gpt-4o-mini");
    }

    #[test]
    fn test_parse_response_missing_usage() {
        let body = json!({
            "choices": [{"message": {"content": "hi"}}],
        });
        let resp = OpenAiCompatEngine::parse_response(&body, "fallback").unwrap();
        assert!(resp.usage.is_none());
        assert_eq!(resp.model, "fallback");
    }

    #[test]
    fn test_parse_response_no_choices() {
        let body = json!({"error": "rate limit"});
        let err = OpenAiCompatEngine::parse_response(&body, "m").unwrap_err();
        assert!(matches!(err, EngineError::ResponseParse { .. }));
    }

    #[test]
    fn test_messages_to_json_roles() {
        let msgs = vec![Message::system("sys"), Message::user("hi")];
        let json_msgs = OpenAiCompatEngine::messages_to_json(&msgs);
        assert_eq!(json_msgs[0]["role"], "system");
        assert_eq!(json_msgs[1]["role"], "user");
        assert_eq!(json_msgs[1]["content"], "hi");
    }

    #[test]
    fn test_new_requires_api_key_for_remote() {
        let config = OpenAiEngineConfig {
            api_key_env: "GAUNTLET_TEST_KEY_THAT_IS_UNSET".to_string(),
            ..OpenAiEngineConfig::default()
        };
        let err = OpenAiCompatEngine::new(&config).unwrap_err();
        assert!(matches!(err, EngineError::AuthFailed { .. }));
    }

    #[test]
    fn test_new_allows_local_without_key() {
        let config = OpenAiEngineConfig {
            base_url: Some("http://localhost:11434/v1".to_string()),
            api_key_env: "GAUNTLET_TEST_KEY_THAT_IS_UNSET".to_string(),
            ..OpenAiEngineConfig::default()
        };
        assert!(OpenAiCompatEngine::new(&config).is_ok());
    }
}
