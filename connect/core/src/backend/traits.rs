//! Completion Backend Traits
//!
//! The seam between the conversation session and whatever serves completions.
//! A backend opens one exchange per user turn and hands back the raw response
//! body as a stream of byte chunks; framing is decoded by the session, not by
//! the backend.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;
use thiserror::Error;

use crate::messages::{SessionId, Turn};

/// Failures of the exchange itself (never of frame content)
#[derive(Debug, Error)]
pub enum TransportError {
    /// Endpoint answered with a non-success status
    #[error("completion endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if it could be read
        body: String,
    },

    /// Endpoint answered without a readable body
    #[error("completion endpoint returned no readable body")]
    MissingBody,

    /// Request could not be built or sent
    #[error("request failed: {0}")]
    Request(String),

    /// Body stream failed mid-read
    #[error("response stream failed: {0}")]
    Body(String),

    /// Request body could not be encoded
    #[error("failed to encode request: {0}")]
    Serialization(String),
}

/// Raw response body, chunked as it arrives from the network
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Body of one exchange request
///
/// Serializes as `{"messages": [...], "sessionId": "..."}`; `sessionId` is
/// omitted when the caller has none.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExchangeRequest {
    /// Whole transcript, greeting and newest user turn included
    pub messages: Vec<Turn>,
    /// Conversation on the hosted service
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl ExchangeRequest {
    /// Create a request for the given transcript
    #[must_use]
    pub fn new(messages: Vec<Turn>) -> Self {
        Self {
            messages,
            session_id: None,
        }
    }

    /// Attach a session ID
    #[must_use]
    pub fn with_session_id(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id;
        self
    }
}

/// Completion backend trait
///
/// Implement this to plug a different completion service (or a scripted
/// stand-in) into a [`crate::ConversationSession`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name for diagnostics
    fn name(&self) -> &str;

    /// Open a streaming exchange
    ///
    /// Resolves once the response headers are in. A non-success status or a
    /// response without a body must be reported as an error here, not as an
    /// empty stream.
    async fn open_exchange(&self, request: &ExchangeRequest) -> Result<ByteStream, TransportError>;
}
