//! Alfred: voice companion core.
//!
//! Tracks a live voice conversation and the emotion the companion's avatar
//! should show:
//!
//! - [`session`]: connection/mode state machine fed by voice transport
//!   callbacks, plus the conversation transcript.
//! - [`classifier`]: emotion inference over an ordered cascade of unreliable
//!   HTTP providers, paced by a [`rate_limit::RateLimiter`].
//! - [`auth`] and [`identity`]: login gating against the backend and the
//!   remembered username.
//! - [`companion`]: the facade wiring them together.

pub mod alfred_dirs;
pub mod auth;
pub mod classifier;
pub mod companion;
pub mod config;
pub mod emotion;
pub mod error;
pub mod identity;
pub mod rate_limit;
pub mod session;

pub use classifier::{ClassificationResult, EmotionClassifier, UtteranceClassifier};
pub use companion::Companion;
pub use config::CompanionConfig;
pub use emotion::Emotion;
pub use error::{CompanionError, Result};
pub use session::{SessionSnapshot, SessionStateMachine, TransportEvent, VoiceTransport};
