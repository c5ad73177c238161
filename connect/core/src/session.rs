//! Conversation Session
//!
//! Owns one transcript and drives exchanges against a completion backend.
//!
//! # Lifecycle of a send
//!
//! ```text
//! Idle ──send──▶ Sending ──headers──▶ Streaming ──▶ Completed ─┐
//!                   │                     │    ├──▶ Failed ────┤
//!                   └──────cancel─────────┴────┴──▶ Cancelled ─┴──▶ Idle
//! ```
//!
//! The busy flag gates re-entry: a `send` issued while another is in flight
//! (from any task sharing the session) returns immediately without touching
//! the transcript. The flag is held by a guard, so it is released on every
//! exit path.
//!
//! Transport failures never reach the caller. They are logged and the
//! assistant turn is settled with [`FALLBACK_REPLY`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::backend::{CompletionBackend, ExchangeRequest, TransportError};
use crate::config::ChatConfig;
use crate::decoder::{DecodedEvent, FrameStream};
use crate::messages::{SessionId, SessionUpdate, Turn};
use crate::transcript::Transcript;

/// Assistant text shown when an exchange fails
pub const FALLBACK_REPLY: &str = "I'm sorry, I encountered an error. Please try again.";

/// Where the session is in its send cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendPhase {
    /// No exchange in flight
    Idle,
    /// Waiting for response headers
    Sending,
    /// Applying deltas from the response body
    Streaming,
}

/// Why a send was ignored
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Utterance was empty after trimming
    EmptyUtterance,
    /// Another send was in flight
    Busy,
}

/// How a send ended
///
/// Informational only; the transcript is already settled when this is
/// returned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Stream finished; `reply` is the final assistant text
    Completed {
        /// Concatenated deltas
        reply: String,
    },
    /// Exchange failed; the assistant turn holds [`FALLBACK_REPLY`]
    Failed,
    /// Exchange was cancelled; the assistant turn keeps what had arrived
    Cancelled,
    /// Nothing happened
    Skipped(SkipReason),
}

#[derive(Debug, Error)]
enum ExchangeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("exchange cancelled")]
    Cancelled,
}

/// State behind the session lock
struct SessionInner {
    transcript: Transcript,
    phase: SendPhase,
    subscribers: Vec<mpsc::UnboundedSender<SessionUpdate>>,
    /// Token of the exchange in flight
    current: Option<CancellationToken>,
}

impl SessionInner {
    fn publish(&mut self, update: SessionUpdate) {
        self.subscribers.retain(|tx| tx.send(update.clone()).is_ok());
    }

    fn publish_turn(&mut self, index: usize, appended: bool) {
        let turn = self.transcript.turns()[index].clone();
        let update = if appended {
            SessionUpdate::TurnAppended { index, turn }
        } else {
            SessionUpdate::TurnReplaced { index, turn }
        };
        self.publish(update);
    }

    fn replace_reply(&mut self, content: &str) {
        if let Some((index, _)) = self.transcript.replace_reply(content) {
            self.publish_turn(index, false);
        }
    }
}

/// A single conversation with the completion service
///
/// Share it behind an `Arc` to send from one task while observing or
/// cancelling from another.
pub struct ConversationSession<B: CompletionBackend> {
    backend: Arc<B>,
    session_id: Option<SessionId>,
    busy: AtomicBool,
    inner: Mutex<SessionInner>,
    /// Parent of every per-send token
    shutdown: CancellationToken,
}

/// Holds the busy flag for the duration of one send
///
/// Also closes the send's exchange on drop, so a send future dropped before
/// it settles still leaves its user turn followed by one assistant turn.
struct BusyGuard<'a, B: CompletionBackend> {
    session: &'a ConversationSession<B>,
    /// Index of the user turn this send appended
    user_index: Option<usize>,
}

impl<'a, B: CompletionBackend> BusyGuard<'a, B> {
    fn acquire(session: &'a ConversationSession<B>) -> Option<Self> {
        session
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;

        session.with_inner(|inner| {
            inner.phase = SendPhase::Sending;
            inner.publish(SessionUpdate::BusyChanged { busy: true });
        });

        Some(Self {
            session,
            user_index: None,
        })
    }
}

impl<B: CompletionBackend> Drop for BusyGuard<'_, B> {
    fn drop(&mut self) {
        // Released under the lock so the next send's notifications follow ours
        self.session.with_inner(|inner| {
            if let Some(index) = self
                .user_index
                .and_then(|user_index| inner.transcript.close_exchange(user_index))
            {
                tracing::debug!(index, "Send dropped before a reply began");
                inner.publish_turn(index, true);
            }
            inner.phase = SendPhase::Idle;
            inner.current = None;
            self.session.busy.store(false, Ordering::Release);
            inner.publish(SessionUpdate::BusyChanged { busy: false });
        });
    }
}

impl<B: CompletionBackend> ConversationSession<B> {
    /// Create a session with the default greeting and no session ID
    pub fn new(backend: B) -> Self {
        Self::with_transcript(Arc::new(backend), Transcript::default(), None)
    }

    /// Create a session from a resolved configuration
    pub fn from_config(backend: B, config: &ChatConfig) -> Self {
        Self::with_transcript(
            Arc::new(backend),
            Transcript::new(config.greeting.clone()),
            config.session_id.clone(),
        )
    }

    fn with_transcript(
        backend: Arc<B>,
        transcript: Transcript,
        session_id: Option<SessionId>,
    ) -> Self {
        Self {
            backend,
            session_id,
            busy: AtomicBool::new(false),
            inner: Mutex::new(SessionInner {
                transcript,
                phase: SendPhase::Idle,
                subscribers: Vec::new(),
                current: None,
            }),
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the session ID forwarded with every exchange
    #[must_use]
    pub fn with_session_id(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Replace the opening greeting
    ///
    /// Only meaningful before the first send; the transcript is reset.
    #[must_use]
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.inner.get_mut().transcript = Transcript::new(greeting);
        self
    }

    /// Session ID sent as `sessionId`
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// The backend exchanges go to
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether an exchange is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Current phase of the send cycle
    #[must_use]
    pub fn phase(&self) -> SendPhase {
        self.with_inner(|inner| inner.phase)
    }

    /// Snapshot of the transcript
    #[must_use]
    pub fn transcript(&self) -> Vec<Turn> {
        self.with_inner(|inner| inner.transcript.snapshot())
    }

    /// Number of turns, greeting included
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_inner(|inner| inner.transcript.len())
    }

    /// Always false: the greeting is never removed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.with_inner(|inner| inner.transcript.is_empty())
    }

    /// Receive every subsequent [`SessionUpdate`]
    ///
    /// The channel is unbounded so no delta is dropped or merged for a slow
    /// observer. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.with_inner(|inner| inner.subscribers.push(tx));
        rx
    }

    /// Cancel the exchange in flight
    ///
    /// Returns `false` if there was none. The cancelled send keeps the deltas
    /// already applied and releases the busy flag.
    pub fn cancel(&self) -> bool {
        self.with_inner(|inner| match inner.current {
            Some(ref token) => {
                token.cancel();
                true
            }
            None => false,
        })
    }

    /// Cancel the exchange in flight and every future one
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Send a user utterance and stream the reply into the transcript
    ///
    /// Empty (after trimming) utterances and sends while busy are ignored.
    /// Otherwise the transcript gains exactly one user turn and one assistant
    /// turn, whatever happens to the exchange.
    pub async fn send(&self, utterance: impl Into<String>) -> SendOutcome {
        let utterance = utterance.into();
        if utterance.trim().is_empty() {
            tracing::debug!("Ignoring empty utterance");
            return SendOutcome::Skipped(SkipReason::EmptyUtterance);
        }

        let Some(mut busy) = BusyGuard::acquire(self) else {
            tracing::debug!("Ignoring send while an exchange is in flight");
            return SendOutcome::Skipped(SkipReason::Busy);
        };

        let cancel = self.shutdown.child_token();
        let (request, user_index) = self.with_inner(|inner| {
            inner.current = Some(cancel.clone());
            let index = inner.transcript.push_user(utterance);
            inner.publish_turn(index, true);
            let request = ExchangeRequest::new(inner.transcript.snapshot())
                .with_session_id(self.session_id.clone());
            (request, index)
        });
        busy.user_index = Some(user_index);

        match self.run_exchange(&request, &cancel).await {
            Ok(reply) => {
                self.with_inner(|inner| inner.transcript.finish_reply());
                tracing::debug!(chars = reply.chars().count(), "Chat exchange completed");
                SendOutcome::Completed { reply }
            }
            Err(ExchangeError::Cancelled) => {
                self.with_inner(|inner| {
                    if inner.transcript.finish_reply().is_none() {
                        let (index, appended) = inner.transcript.settle_reply(String::new());
                        inner.publish_turn(index, appended);
                    }
                });
                tracing::warn!("Chat exchange cancelled");
                SendOutcome::Cancelled
            }
            Err(ExchangeError::Transport(err)) => {
                tracing::warn!(
                    error = %err,
                    backend = self.backend.name(),
                    "Chat exchange failed"
                );
                self.with_inner(|inner| {
                    let (index, appended) = inner.transcript.settle_reply(FALLBACK_REPLY);
                    inner.publish_turn(index, appended);
                });
                SendOutcome::Failed
            }
        }
    }

    /// Open the exchange and apply its deltas until the stream ends
    async fn run_exchange(
        &self,
        request: &ExchangeRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ExchangeError> {
        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ExchangeError::Cancelled),
            opened = self.backend.open_exchange(request) => opened?,
        };

        self.with_inner(|inner| {
            inner.phase = SendPhase::Streaming;
            let index = inner.transcript.begin_reply();
            inner.publish_turn(index, true);
        });

        let mut events = FrameStream::new(body);
        let mut reply = String::new();
        let mut deltas: usize = 0;

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ExchangeError::Cancelled),
                next = events.next() => next,
            };

            match next {
                Some(Ok(DecodedEvent::ContentDelta(text))) => {
                    reply.push_str(&text);
                    deltas += 1;
                    tracing::trace!(delta = %text, "Applying content delta");
                    self.with_inner(|inner| inner.replace_reply(&reply));
                }
                Some(Ok(DecodedEvent::StreamEnd)) => {
                    tracing::debug!(deltas, "Stream end sentinel received");
                    break;
                }
                Some(Ok(DecodedEvent::Unparseable(line))) => {
                    tracing::warn!(line = %line, "Failed to parse stream frame");
                }
                Some(Err(err)) => return Err(err.into()),
                None => {
                    tracing::debug!(deltas, "Response stream closed");
                    break;
                }
            }
        }

        Ok(reply)
    }

    fn with_inner<R>(&self, f: impl FnOnce(&mut SessionInner) -> R) -> R {
        let mut inner = self.inner.lock();
        f(&mut inner)
    }
}
