//! Conversation Messages
//!
//! The value types that make up a transcript and travel to the completion
//! endpoint. A [`Turn`] serializes as `{"role": "user", "content": "..."}`,
//! which is exactly the shape the exchange request carries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who authored a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Student input
    User,
    /// Completion service output (including the greeting and the apology)
    Assistant,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry in the transcript
///
/// Turns are values: the session never edits one in place. An in-flight
/// assistant reply is advanced by building a new `Turn` and swapping it in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Author of the turn
    pub role: TurnRole,
    /// Turn text
    pub content: String,
}

impl Turn {
    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Identifier of the conversation on the hosted service
///
/// Opaque to this crate; it is forwarded as `sessionId` on every exchange.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh random session ID
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Notification sent from a session to its observers
///
/// Every transcript change is published exactly once, in the order it was
/// applied. Replaying the updates onto a copy of the initial transcript yields
/// the session's current transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    /// A turn was added at `index`
    TurnAppended {
        /// Position in the transcript
        index: usize,
        /// The new turn
        turn: Turn,
    },

    /// The turn at `index` was swapped for a new one
    TurnReplaced {
        /// Position in the transcript
        index: usize,
        /// The replacement turn
        turn: Turn,
    },

    /// A send started (`true`) or finished (`false`)
    BusyChanged {
        /// New value of the busy flag
        busy: bool,
    },
}

impl SessionUpdate {
    /// Apply this update to a local transcript copy
    ///
    /// Out-of-range indices are ignored.
    pub fn apply_to(&self, turns: &mut Vec<Turn>) {
        match self {
            Self::TurnAppended { index, turn } if *index == turns.len() => turns.push(turn.clone()),
            Self::TurnReplaced { index, turn } => {
                if let Some(slot) = turns.get_mut(*index) {
                    *slot = turn.clone();
                }
            }
            _ => {}
        }
    }
}
