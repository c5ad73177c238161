//! Line-mode rendering of session updates
//!
//! Turns the [`SessionUpdate`] stream into terminal text. Assistant replies
//! are written incrementally: each replacement prints only the characters
//! not yet on screen.

use connect_core::{SessionUpdate, Turn, TurnRole};

/// Prompt shown when the session is ready for input
pub const PROMPT: &str = "you> ";

const ASSISTANT_LABEL: &str = "kca> ";

/// Tracks what has already been written for the reply in progress
#[derive(Debug, Default)]
pub struct Renderer {
    /// Transcript index of the assistant turn on the current line
    open_index: Option<usize>,
    /// Text of that turn already printed
    printed: String,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text for the opening greeting followed by the first prompt
    pub fn greeting(turn: &Turn) -> String {
        format!("{ASSISTANT_LABEL}{}\n{PROMPT}", turn.content)
    }

    /// Text to write for one update, if any
    pub fn render(&mut self, update: &SessionUpdate) -> Option<String> {
        match update {
            // User input is already on screen
            SessionUpdate::TurnAppended { turn, .. } if turn.role == TurnRole::User => None,
            SessionUpdate::TurnAppended { index, turn } => {
                self.open_index = Some(*index);
                self.printed.clone_from(&turn.content);
                Some(format!("{ASSISTANT_LABEL}{}", turn.content))
            }
            SessionUpdate::TurnReplaced { index, turn } => {
                if self.open_index != Some(*index) {
                    return None;
                }
                let out = match turn.content.strip_prefix(self.printed.as_str()) {
                    Some(suffix) => suffix.to_string(),
                    // Content was rewritten (fallback after a partial reply)
                    None => format!("\n{ASSISTANT_LABEL}{}", turn.content),
                };
                self.printed.clone_from(&turn.content);
                (!out.is_empty()).then_some(out)
            }
            SessionUpdate::BusyChanged { busy: true } => None,
            SessionUpdate::BusyChanged { busy: false } => {
                self.open_index = None;
                self.printed.clear();
                Some(format!("\n{PROMPT}"))
            }
        }
    }
}
