//! Completion service boundary.
//!
//! Every remote call in the pipeline goes through a [`CompletionClient`].
//! The production implementation, [`HttpCompletionClient`], talks to an
//! OpenAI-compatible `/chat/completions` endpoint. Tests substitute a
//! scripted fake.
//!
//! Callers do not use the client directly. They go through
//! [`request_json`] (generation, which needs the failure cause) or
//! [`request_structured`] (grading, which only needs "value or fallback").

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CompletionConfig;
use crate::error::{CompletionError, PracticeError, Result};

/// Matches a Markdown code fence, with or without a `json` tag.
static CODE_FENCE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").ok());

/// One request to the completion service.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Instructions sent as the system message.
    pub system_instructions: String,
    /// Structured JSON payload sent as the user message.
    pub user_payload: String,
    /// Ask the service for a JSON object response.
    pub structured_output: bool,
    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Creates a structured-output request with a serialized payload.
    pub fn structured(
        system_instructions: impl Into<String>,
        payload: &serde_json::Value,
        temperature: f32,
    ) -> Self {
        Self {
            system_instructions: system_instructions.into(),
            user_payload: payload.to_string(),
            structured_output: true,
            temperature,
        }
    }
}

/// Raw text returned by the completion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    /// Message content of the first choice.
    pub text: String,
}

/// A service that turns instructions plus a payload into text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Performs a single completion call. No retries happen here.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, CompletionError>;
}

// ============================================================================
// HTTP client
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// [`CompletionClient`] over an OpenAI-compatible chat completions API.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpCompletionClient {
    /// Creates a client for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PracticeError::ClientInit(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    /// Creates a client from configuration, reading the API key from the
    /// configured environment variable.
    pub fn from_config(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PracticeError::missing_api_key(&config.api_key_env))?;

        Self::new(&config.base_url, config.model.clone(), api_key)
    }

    /// The full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, CompletionError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_instructions,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_payload,
                },
            ],
            temperature: request.temperature,
            response_format: request.structured_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        debug!(model = %self.model, structured = request.structured_output, "Sending completion request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| status.to_string());
            return Err(if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                CompletionError::RateLimited(message)
            } else {
                CompletionError::api(status.as_u16(), message)
            });
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::malformed(format!("undecodable response: {e}")))?;

        let text = envelope
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError::malformed("response contained no message content"))?;

        Ok(CompletionResponse { text })
    }
}

// ============================================================================
// Call helpers
// ============================================================================

/// Performs one call bounded by `timeout`.
///
/// On expiry the in-flight call is dropped and a
/// [`CompletionError::Timeout`] is returned.
pub async fn complete_with_timeout(
    client: &dyn CompletionClient,
    request: CompletionRequest,
    timeout: Duration,
) -> std::result::Result<CompletionResponse, CompletionError> {
    tokio::time::timeout(timeout, client.complete(request))
        .await
        .map_err(|_| CompletionError::Timeout {
            timeout_secs: timeout.as_secs(),
        })?
}

/// Returns the JSON portion of a completion, stripping a Markdown code
/// fence when one is present.
pub fn extract_json(text: &str) -> &str {
    CODE_FENCE
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map_or_else(|| text.trim(), |m| m.as_str())
}

/// Performs one bounded call and decodes its JSON into `T`.
///
/// Output that does not decode is a [`CompletionError::Malformed`].
pub async fn request_json<T: DeserializeOwned>(
    client: &dyn CompletionClient,
    request: CompletionRequest,
    timeout: Duration,
) -> std::result::Result<T, CompletionError> {
    let response = complete_with_timeout(client, request, timeout).await?;
    serde_json::from_str(extract_json(&response.text))
        .map_err(|e| CompletionError::malformed(e.to_string()))
}

/// Performs one bounded call and decodes its JSON into `T`, or returns
/// `None` on any failure.
///
/// `purpose` names the call in the log line.
pub async fn request_structured<T: DeserializeOwned>(
    client: &dyn CompletionClient,
    request: CompletionRequest,
    timeout: Duration,
    purpose: &str,
) -> Option<T> {
    match request_json(client, request, timeout).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(purpose, error = %e, "Remote call failed, using fallback");
            None
        }
    }
}

// ============================================================================
// Test support
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::{async_trait, CompletionClient, CompletionError, CompletionRequest, CompletionResponse, Duration};

    /// A reply the fake hands out for one call.
    #[derive(Debug, Clone)]
    pub enum Reply {
        Text(String),
        Fail(CompletionError),
        Hang(Duration),
    }

    /// Replays scripted replies in order and counts calls.
    ///
    /// Once the script runs out, the last reply repeats.
    #[derive(Debug)]
    pub struct ScriptedClient {
        script: Mutex<VecDeque<Reply>>,
        last: Mutex<Option<Reply>>,
        calls: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        pub fn new(script: impl IntoIterator<Item = Reply>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                last: Mutex::new(None),
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn always(reply: Reply) -> Self {
            Self::new([reply])
        }

        pub fn text(text: &str) -> Reply {
            Reply::Text(text.to_string())
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);

            let reply = {
                let next = self.script.lock().unwrap().pop_front();
                let mut last = self.last.lock().unwrap();
                match next {
                    Some(reply) => {
                        *last = Some(reply.clone());
                        reply
                    }
                    None => last
                        .clone()
                        .unwrap_or_else(|| Reply::Fail(CompletionError::Other("empty script".into()))),
                }
            };

            match reply {
                Reply::Text(text) => Ok(CompletionResponse { text }),
                Reply::Fail(err) => Err(err),
                Reply::Hang(duration) => {
                    tokio::time::sleep(duration).await;
                    Ok(CompletionResponse {
                        text: String::new(),
                    })
                }
            }
        }
    }
}
