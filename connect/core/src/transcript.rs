//! Transcript
//!
//! The ordered list of turns for one conversation. It always starts with an
//! assistant greeting. After that it only grows, except for the single
//! in-flight assistant reply at the tail, which is swapped for a fresh
//! [`Turn`] on every update.

use crate::messages::{Turn, TurnRole};

/// Greeting shown before the student says anything
pub const DEFAULT_GREETING: &str = "Hello! I'm KCA Connect AI. How can I help you today? \
You can ask me about timetables, fees, exams, or any other university information.";

/// Ordered conversation history
#[derive(Clone, Debug)]
pub struct Transcript {
    turns: Vec<Turn>,
    /// Index of the assistant reply still being streamed
    in_flight: Option<usize>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(DEFAULT_GREETING)
    }
}

impl Transcript {
    /// Create a transcript seeded with an assistant greeting
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::assistant(greeting)],
            in_flight: None,
        }
    }

    /// All turns in order
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns, greeting included
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Always false: the greeting is never removed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Most recent turn
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Index of the reply currently streaming, if any
    #[must_use]
    pub fn in_flight(&self) -> Option<usize> {
        self.in_flight
    }

    /// Owned copy of every turn
    #[must_use]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    /// Append a user turn, returning its index
    ///
    /// A reply still marked in flight from an earlier exchange is finished
    /// here, so the new exchange can only settle its own reply.
    pub(crate) fn push_user(&mut self, content: impl Into<String>) -> usize {
        self.in_flight = None;
        self.turns.push(Turn::user(content));
        self.turns.len() - 1
    }

    /// Append the empty assistant placeholder and mark it in flight
    pub(crate) fn begin_reply(&mut self) -> usize {
        self.turns.push(Turn::assistant(String::new()));
        let index = self.turns.len() - 1;
        self.in_flight = Some(index);
        index
    }

    /// Swap the in-flight reply for a new turn holding `content`
    ///
    /// Returns `None` when no reply is in flight.
    pub(crate) fn replace_reply(&mut self, content: impl Into<String>) -> Option<(usize, &Turn)> {
        let index = self.in_flight?;
        self.turns[index] = Turn::assistant(content);
        Some((index, &self.turns[index]))
    }

    /// Stop treating the tail as in flight; its content becomes final
    pub(crate) fn finish_reply(&mut self) -> Option<usize> {
        self.in_flight.take()
    }

    /// Finalize the exchange with `content`
    ///
    /// Replaces the in-flight reply when there is one, otherwise appends a new
    /// assistant turn. Either way the returned flag tells whether a turn was
    /// appended.
    pub(crate) fn settle_reply(&mut self, content: impl Into<String>) -> (usize, bool) {
        match self.in_flight.take() {
            Some(index) => {
                self.turns[index] = Turn::assistant(content);
                (index, false)
            }
            None => {
                self.turns.push(Turn::assistant(content));
                (self.turns.len() - 1, true)
            }
        }
    }

    /// Close the exchange opened by the user turn at `user_index`
    ///
    /// Finishes any in-flight reply and, if the user turn is still the tail,
    /// appends an empty assistant turn. Returns the index of the appended turn.
    pub(crate) fn close_exchange(&mut self, user_index: usize) -> Option<usize> {
        self.in_flight = None;
        if self.turns.len() != user_index + 1 {
            return None;
        }
        self.turns.push(Turn::assistant(String::new()));
        Some(user_index + 1)
    }

    /// Count of turns with the given role
    #[must_use]
    pub fn count_role(&self, role: TurnRole) -> usize {
        self.turns.iter().filter(|t| t.role == role).count()
    }
}
