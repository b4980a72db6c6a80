//! Conversation turns and the append-only history that travels to the agent.
//!
//! The agent endpoint expects the history as a JSON *string* holding an array of
//! `{ "author", "content" }` objects. [`ConversationHistory::to_wire`] and
//! [`ConversationHistory::from_wire`] are the only places that format is produced or
//! parsed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Who wrote a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Author {
    #[serde(rename = "human")]
    Human,
    /// The simulated patient. The backend calls this author `patient`.
    #[serde(rename = "patient", alias = "agent")]
    Agent,
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Author::Human => write!(f, "human"),
            Author::Agent => write!(f, "patient"),
        }
    }
}

/// One message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub author: Author,
    pub content: String,
}

impl Turn {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            author: Author::Human,
            content: content.into(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            author: Author::Agent,
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Couldn't encode conversation history: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Couldn't parse conversation history: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Ordered, append-only sequence of turns for one scenario selection.
///
/// Only the session mutates a history, so `push` and `clear` are crate-private.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub(crate) fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Encodes the history into the string carried by the `history` request field.
    pub fn to_wire(&self) -> Result<String, HistoryError> {
        serde_json::to_string(&self.turns).map_err(HistoryError::Encode)
    }

    /// Parses a `history` field. A blank string is an empty history.
    pub fn from_wire(wire: &str) -> Result<Self, HistoryError> {
        if wire.trim().is_empty() {
            return Ok(Self::default());
        }
        let turns: Vec<Turn> = serde_json::from_str(wire).map_err(HistoryError::Malformed)?;
        Ok(Self { turns })
    }
}

impl<'a> IntoIterator for &'a ConversationHistory {
    type Item = &'a Turn;
    type IntoIter = std::slice::Iter<'a, Turn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}
