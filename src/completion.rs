//! Chat-completion client abstraction.
//!
//! Segmentation and translation both send a fixed system prompt plus the
//! guide text to an OpenAI-compatible chat endpoint. The [`CompletionClient`]
//! trait is the seam; implementations:
//! - **[`DisabledClient`]** fails every call; used when no API key is set.
//! - **[`VeniceClient`]** calls `POST {base_url}/chat/completions`.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, ...)
//! - Other 4xx → fail immediately
//! - Network errors → retry
//!
//! Malformed model *output* is never retried; callers validate the reply
//! with [`parse_model_json`] and fail with a [`ModelOutputError`].

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{env_secret, CompletionConfig};

/// A single system + user exchange.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the assistant message text of the first choice.
    async fn complete(&self, request: &ChatRequest) -> Result<String>;
}

/// The model replied, but not in the shape the prompt demanded.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutputError(pub String);

impl fmt::Display for ModelOutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ModelOutputError {}

/// Parse a model reply that must be a JSON object.
///
/// A reply wrapped in a single markdown code fence is unwrapped first;
/// anything else that is not JSON is a [`ModelOutputError`].
pub fn parse_model_json(reply: &str) -> std::result::Result<serde_json::Value, ModelOutputError> {
    let body = strip_code_fence(reply.trim());
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ModelOutputError(format!("model reply is not valid JSON: {}", e)))?;
    if !value.is_object() {
        return Err(ModelOutputError(
            "model reply is not a JSON object".to_string(),
        ));
    }
    Ok(value)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(inner) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = inner.strip_suffix("```") else {
        return text;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    match inner.find('\n') {
        Some(pos) => inner[pos + 1..].trim(),
        None => inner.trim(),
    }
}

// ============ Disabled Client ============

pub struct DisabledClient;

#[async_trait]
impl CompletionClient for DisabledClient {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _request: &ChatRequest) -> Result<String> {
        bail!("Completion provider is disabled (set VENICE_API_KEY)")
    }
}

// ============ Venice Client ============

pub struct VeniceClient {
    client: reqwest::Client,
    api_key: String,
    config: CompletionConfig,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl VeniceClient {
    pub fn new(config: &CompletionConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            config: config.clone(),
        })
    }

    fn body(&self, request: &ChatRequest) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": self.config.temperature,
            "venice_parameters": { "include_venice_system_prompt": false },
        })
    }
}

/// Extract the first choice's text from a chat-completion reply.
fn parse_chat_completion(json: serde_json::Value) -> Result<String> {
    let completion: ChatCompletion = serde_json::from_value(json)
        .map_err(|e| anyhow::anyhow!("Invalid completion response: {}", e))?;

    completion
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("Empty response from completion API"))
}

#[async_trait]
impl CompletionClient for VeniceClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = self.body(request);
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_completion(json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(%status, attempt, "completion API error, retrying");
                        last_err = Some(anyhow::anyhow!(
                            "Completion API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    bail!("Completion API error {}: {}", status, body_text);
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "completion API unreachable");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Completion failed after retries")))
    }
}

/// Build the completion client selected by configuration.
///
/// `"venice"` requires `VENICE_API_KEY` in the environment.
pub fn create_completion_client(config: &CompletionConfig) -> Result<Box<dyn CompletionClient>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledClient)),
        "venice" => {
            let api_key = env_secret("VENICE_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("VENICE_API_KEY environment variable not set"))?;
            Ok(Box::new(VeniceClient::new(config, api_key)?))
        }
        other => bail!("Unknown completion provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};

    /// Serve a chat endpoint that answers with `statuses` in turn (the
    /// last one repeating) and count the requests it receives.
    async fn scripted_endpoint(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/chat/completions",
            post(move |headers: HeaderMap| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let status = statuses.get(n).or(statuses.last()).copied().unwrap_or(200);
                async move { reply(status, &headers) }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (format!("http://{}", addr), hits)
    }

    fn reply(status: u16, headers: &HeaderMap) -> Response {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer key");
        if !authorized {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        if status != 200 {
            let code = StatusCode::from_u16(status).unwrap();
            return (code, "upstream says no").into_response();
        }
        Json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Bonjour" } }]
        }))
        .into_response()
    }

    fn client_for(base_url: String) -> VeniceClient {
        let config = CompletionConfig {
            base_url,
            max_retries: 1,
            timeout_secs: 5,
            ..CompletionConfig::default()
        };
        VeniceClient::new(&config, "key".to_string()).unwrap()
    }

    fn hello() -> ChatRequest {
        ChatRequest {
            system: "Translate to French".to_string(),
            user: "Hello".to_string(),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (base, hits) = scripted_endpoint(vec![503, 200]).await;
        let text = client_for(base).complete(&hello()).await.unwrap();
        assert_eq!(text, "Bonjour");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_retries() {
        let (base, hits) = scripted_endpoint(vec![429]).await;
        let err = client_for(base).complete(&hello()).await.unwrap_err();
        assert!(err.to_string().contains("429"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_error_fails_without_retry() {
        let (base, hits) = scripted_endpoint(vec![400, 200]).await;
        let err = client_for(base).complete(&hello()).await.unwrap_err();
        assert!(err.to_string().contains("400"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_chat_completion_first_choice() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Bonjour" } },
                { "message": { "role": "assistant", "content": "ignored" } }
            ]
        });
        assert_eq!(parse_chat_completion(json).unwrap(), "Bonjour");
    }

    #[test]
    fn test_parse_chat_completion_empty() {
        let json = serde_json::json!({ "choices": [] });
        assert!(parse_chat_completion(json).is_err());

        let json = serde_json::json!({ "choices": [{ "message": { "content": "  " } }] });
        assert!(parse_chat_completion(json).is_err());
    }

    #[test]
    fn test_parse_model_json_plain() {
        let v = parse_model_json(r#"{"translation": "Hola"}"#).unwrap();
        assert_eq!(v["translation"], "Hola");
    }

    #[test]
    fn test_parse_model_json_fenced() {
        let v = parse_model_json("```json\n{\"segments\": []}\n```").unwrap();
        assert!(v["segments"].is_array());
    }

    #[test]
    fn test_parse_model_json_rejects_prose() {
        let err = parse_model_json("Sure! Here is your translation: Hola").unwrap_err();
        assert!(err.0.contains("not valid JSON"));
        assert!(parse_model_json("[1, 2]").is_err());
    }

    #[tokio::test]
    async fn test_disabled_client_errors() {
        let request = ChatRequest {
            system: "s".to_string(),
            user: "u".to_string(),
        };
        assert!(DisabledClient.complete(&request).await.is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let client = VeniceClient::new(&CompletionConfig::default(), "key".to_string()).unwrap();
        let body = client.body(&ChatRequest {
            system: "sys".to_string(),
            user: "text".to_string(),
        });
        assert_eq!(body["model"], "dolphin-2.9.2-qwen2-72b");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "text");
        assert_eq!(
            body["venice_parameters"]["include_venice_system_prompt"],
            false
        );
    }
}
