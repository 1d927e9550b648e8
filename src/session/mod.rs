//! Live conversation state.
//!
//! - [`state`]: connection status, mode and the published [`SessionSnapshot`].
//! - [`log`]: the append-only transcript.
//! - [`transport`]: the voice transport seam and its callback events.
//! - [`machine`]: the state machine tying them to the emotion classifier.

pub mod log;
pub mod machine;
pub mod state;
pub mod transport;

pub use log::{MessageLog, Role, Utterance};
pub use machine::{SessionStateMachine, adopted_emotion};
pub use state::{ConnectionStatus, Mode, SessionSnapshot};
pub use transport::{MessageSource, NoopTransport, SessionRequest, TransportEvent, VoiceTransport};
