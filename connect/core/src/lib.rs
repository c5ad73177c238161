//! Connect Core - Streaming Chat Engine for KCA Connect
//!
//! This crate sends a student's question to the hosted completion function and
//! assembles the streamed answer into an ordered transcript, one observable
//! update per delta. It has no UI dependencies; any front end (the line-mode
//! CLI, a web view, a test harness) drives it through [`ConversationSession`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ConversationSession                       │
//! │   Transcript ◀── apply ── DecodedEvent ◀── FrameDecoder      │
//! │       │                                        ▲             │
//! │  SessionUpdate (to observers)            byte chunks         │
//! │                                                │             │
//! │                       CompletionBackend ───────┘             │
//! │                   (HttpCompletionBackend)                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use connect_core::{load_config, ConversationSession, HttpCompletionBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let backend = HttpCompletionBackend::from_config(&config)?;
//!     let session = ConversationSession::from_config(backend, &config);
//!
//!     let mut updates = session.subscribe();
//!     tokio::spawn(async move {
//!         while let Some(update) = updates.recv().await {
//!             // Render the changed turn
//!         }
//!     });
//!
//!     session.send("When is my exam?").await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: completion service abstraction and the HTTP implementation
//! - [`config`]: TOML/environment/CLI configuration
//! - [`decoder`]: `data:` line framing and incremental UTF-8 decoding
//! - [`messages`]: turns, session IDs, and observer notifications
//! - [`session`]: the send cycle, busy gating, cancellation
//! - [`transcript`]: ordered turn storage with a single in-flight reply

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod decoder;
pub mod messages;
pub mod session;
pub mod transcript;

// Re-exports for convenience
pub use backend::{
    ByteStream, CompletionBackend, ExchangeRequest, HttpCompletionBackend, TransportError,
};
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, ChatConfig,
    ConfigError, ConfigOverrides, ConfigSource,
};
pub use decoder::{parse_line, DecodedEvent, FrameDecoder, FrameStream, LineOutcome};
pub use messages::{SessionId, SessionUpdate, Turn, TurnRole};
pub use session::{ConversationSession, SendOutcome, SendPhase, SkipReason, FALLBACK_REPLY};
pub use transcript::{Transcript, DEFAULT_GREETING};
