//! Conversation transcript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Who produced an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One turn of conversation text. Immutable once created.
///
/// Serializes as `{role, text, spoken_at}`; the monotonic instant is
/// process-local and left out.
#[derive(Debug, Clone, Serialize)]
pub struct Utterance {
    role: Role,
    text: String,
    #[serde(skip)]
    timestamp: Instant,
    spoken_at: DateTime<Utc>,
}

impl Utterance {
    fn new(role: Role, text: String) -> Self {
        Self {
            role,
            text,
            timestamp: Instant::now(),
            spoken_at: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Monotonic creation instant, for ordering.
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Wall-clock creation time, for transcript display.
    pub fn spoken_at(&self) -> DateTime<Utc> {
        self.spoken_at
    }
}

/// Append-only, chronologically ordered list of utterances.
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Vec<Utterance>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an utterance and return a copy of it. Never fails; empty text is allowed.
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> Utterance {
        let utterance = Utterance::new(role, text.into());
        self.entries.push(utterance.clone());
        utterance
    }

    pub fn entries(&self) -> &[Utterance] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Utterance> {
        self.entries.last()
    }

    /// Drop every entry. Called when a new session starts.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
