//! Contract with the voice transport SDK.
//!
//! The transport owns microphone capture, audio playback and the network
//! link to the voice agent. The session only starts and stops it, and
//! consumes its lifecycle callbacks as [`TransportEvent`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::state::Mode;

/// Who produced a transcribed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    User,
    Ai,
}

/// Lifecycle callbacks delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connect,
    Disconnect { reason: Option<String> },
    Error { message: Option<String> },
    /// Transport-reported activity; the session never infers mode itself.
    ModeChange(Mode),
    Message { source: MessageSource, message: String },
    /// Output level in `0.0..=100.0`, for avatar animation.
    VolumeChanged(f32),
}

/// What the transport needs to open a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub session_id: String,
    pub username: String,
}

/// Voice transport collaborator.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Acquire audio devices and open the conversation.
    ///
    /// Connection progress is reported later through [`TransportEvent`]s.
    /// An error here (for example a denied microphone permission) means no
    /// events will follow.
    async fn start_session(&self, request: &SessionRequest) -> Result<(), String>;

    /// Close the conversation and release audio resources.
    async fn end_session(&self) -> Result<(), String>;
}

/// Transport that accepts every request and does nothing.
///
/// Used by the headless binary, where events are fed in by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransport;

#[async_trait]
impl VoiceTransport for NoopTransport {
    async fn start_session(&self, request: &SessionRequest) -> Result<(), String> {
        tracing::debug!(session_id = %request.session_id, "noop transport start");
        Ok(())
    }

    async fn end_session(&self) -> Result<(), String> {
        Ok(())
    }
}
