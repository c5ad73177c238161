//! HTTP Completion Backend
//!
//! Talks to the hosted chat function at `{base_url}/functions/v1/chat`.
//!
//! # Exchange
//!
//! ```text
//! POST /functions/v1/chat
//! Authorization: Bearer <api key>
//! Content-Type: application/json
//!
//! {"messages":[{"role":"assistant","content":"Hello!..."},...],"sessionId":"..."}
//! ```
//!
//! A 2xx response carries a `text/event-stream` body; its chunks are handed
//! to the session untouched.

use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::StatusCode;

use super::traits::{ByteStream, CompletionBackend, ExchangeRequest, TransportError};
use crate::config::{ChatConfig, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT};

/// Path of the chat function below the base URL
const CHAT_PATH: &str = "/functions/v1/chat";

/// How long an error response may take to deliver its body
const ERROR_BODY_TIMEOUT: Duration = Duration::from_millis(500);

/// Completion backend over HTTPS
#[derive(Clone)]
pub struct HttpCompletionBackend {
    /// Base URL without trailing slash
    base_url: String,
    /// Bearer credential
    api_key: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl std::fmt::Debug for HttpCompletionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCompletionBackend")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpCompletionBackend {
    /// Create a backend with the default connect timeout
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Request` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, api_key, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a backend with an explicit connect timeout
    ///
    /// Only connecting is bounded; a body may stream for as long as the
    /// server keeps it open.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Request` if the HTTP client cannot be built.
    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http_client,
        })
    }

    /// Create from a resolved [`ChatConfig`]
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Request` if the HTTP client cannot be built.
    pub fn from_config(config: &ChatConfig) -> Result<Self, TransportError> {
        Self::with_timeout(
            config.base_url.clone(),
            config.api_key.clone(),
            config.connect_timeout,
        )
    }

    /// Full URL of the chat function
    #[must_use]
    pub fn chat_url(&self) -> String {
        format!("{}{CHAT_PATH}", self.base_url)
    }
}

impl Default for HttpCompletionBackend {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open_exchange(&self, request: &ExchangeRequest) -> Result<ByteStream, TransportError> {
        let response = self
            .http_client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    TransportError::Serialization(e.to_string())
                } else {
                    TransportError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            // The body is diagnostic only; a stalled one must not delay the failure
            let body = tokio::time::timeout(ERROR_BODY_TIMEOUT, response.text())
                .await
                .ok()
                .and_then(Result::ok)
                .unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // These statuses never carry a body
        if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT) {
            return Err(TransportError::MissingBody);
        }

        tracing::debug!(
            status = %status,
            turns = request.messages.len(),
            "Chat exchange opened"
        );

        Ok(response
            .bytes_stream()
            .map_err(|e| TransportError::Body(e.to_string()))
            .boxed())
    }
}
