//! Observable session state.

use serde::{Deserialize, Serialize};

use crate::emotion::Emotion;

/// Connection lifecycle of the voice transport.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Conversational activity as reported by the transport.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Idle,
    Listening,
    Thinking,
    Speaking,
}

/// Point-in-time copy of the session, published to the rendering layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Current conversation, if one has been started.
    pub session_id: Option<String>,
    pub status: ConnectionStatus,
    pub mode: Mode,
    pub emotion: Emotion,
    /// Output level in `0.0..=100.0`.
    pub volume: f32,
    /// Number of utterances in the transcript.
    pub message_count: usize,
}

impl SessionSnapshot {
    /// Label for the speaking/listening indicator.
    #[must_use]
    pub fn indicator(&self) -> &'static str {
        match self.status {
            ConnectionStatus::Disconnected => "Offline",
            ConnectionStatus::Connecting => "Connecting",
            ConnectionStatus::Error => "Error",
            ConnectionStatus::Connected => match self.mode {
                Mode::Speaking => "Speaking",
                Mode::Thinking => "Thinking",
                Mode::Listening | Mode::Idle => "Listening",
            },
        }
    }

    /// Whether the snapshot satisfies the session invariants.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let speaking_ok = self.mode != Mode::Speaking || self.status == ConnectionStatus::Connected;
        let offline_ok = self.status != ConnectionStatus::Disconnected
            || (self.mode == Mode::Idle && self.volume == 0.0);
        speaking_ok && offline_ok && (0.0..=100.0).contains(&self.volume)
    }
}
