//! Session state machine.
//!
//! Reconciles transport lifecycle events and asynchronous classification
//! results into one [`SessionSnapshot`]. All state lives behind a single
//! mutex that is never held across an `.await`; every mutation ends by
//! re-establishing the session invariants and publishing the new snapshot.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::log::{MessageLog, Role, Utterance};
use super::state::{ConnectionStatus, Mode, SessionSnapshot};
use super::transport::{MessageSource, SessionRequest, TransportEvent, VoiceTransport};
use crate::classifier::{ClassificationResult, UtteranceClassifier};
use crate::emotion::Emotion;
use crate::error::{CompanionError, Result};

/// Emotion the session adopts for a classification result.
///
/// Neutral and failed classifications show as happy; anything else is
/// adopted as-is.
#[must_use]
pub fn adopted_emotion(result: &ClassificationResult) -> Emotion {
    if result.is_degraded() || result.emotion == Emotion::Neutral {
        Emotion::Happy
    } else {
        result.emotion
    }
}

#[derive(Debug, Default)]
struct SessionCore {
    session_id: Option<String>,
    status: ConnectionStatus,
    mode: Mode,
    emotion: Emotion,
    volume: f32,
    log: MessageLog,
    /// Token of the most recently issued classification. Only a result
    /// carrying this token may be applied.
    latest_seq: u64,
}

impl SessionCore {
    fn invalidate_pending(&mut self) {
        self.latest_seq = self.latest_seq.wrapping_add(1);
    }

    fn next_seq(&mut self) -> u64 {
        self.invalidate_pending();
        self.latest_seq
    }

    fn reset(&mut self, status: ConnectionStatus) {
        self.status = status;
        self.mode = Mode::Idle;
        self.emotion = Emotion::Neutral;
        self.volume = 0.0;
        self.invalidate_pending();
    }

    fn enter_error(&mut self) {
        self.status = ConnectionStatus::Error;
        self.mode = Mode::Idle;
        self.emotion = Emotion::Sad;
        self.volume = 0.0;
    }

    fn normalize(&mut self) {
        if self.status != ConnectionStatus::Connected {
            self.mode = Mode::Idle;
        }
        if self.status == ConnectionStatus::Disconnected || !self.volume.is_finite() {
            self.volume = 0.0;
        }
        self.volume = self.volume.clamp(0.0, 100.0);
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            status: self.status,
            mode: self.mode,
            emotion: self.emotion,
            volume: self.volume,
            message_count: self.log.len(),
        }
    }
}

struct Shared {
    core: Mutex<SessionCore>,
    classifier: Arc<dyn UtteranceClassifier>,
    transport: Arc<dyn VoiceTransport>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Run `f` against the core, then normalise and publish.
    fn mutate<R>(&self, f: impl FnOnce(&mut SessionCore) -> R) -> R {
        let mut core = lock(&self.core);
        let out = f(&mut core);
        core.normalize();
        let next = core.snapshot();
        debug_assert!(next.is_consistent(), "inconsistent snapshot: {next:?}");
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        out
    }

    fn apply_classification(&self, seq: u64, emotion: Emotion) {
        self.mutate(|core| {
            if seq != core.latest_seq {
                debug!(seq, latest = core.latest_seq, "dropping stale classification");
                return;
            }
            if core.status != ConnectionStatus::Connected {
                debug!(seq, status = ?core.status, "dropping classification for inactive session");
                return;
            }
            debug!(seq, %emotion, "emotion updated");
            core.emotion = emotion;
        });
    }

    fn spawn_classification(self: &Arc<Self>, seq: u64, text: String) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(seq, "no async runtime, utterance left unclassified");
            return;
        };

        let shared = Arc::clone(self);
        let handle = runtime.spawn(async move {
            let classifier = Arc::clone(&shared.classifier);
            let job = tokio::spawn(async move { classifier.classify(&text).await });
            let emotion = match job.await {
                Ok(result) => {
                    if let Some(error) = &result.error {
                        debug!(seq, error = %error, "classification degraded");
                    }
                    adopted_emotion(&result)
                }
                Err(e) => {
                    warn!(seq, error = %e, "classification task failed");
                    Emotion::Happy
                }
            };
            shared.apply_classification(seq, emotion);
        });

        let mut in_flight = lock(&self.in_flight);
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }
}

/// Owner of one conversation's observable state.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionStateMachine {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SessionStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStateMachine")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl SessionStateMachine {
    /// Create a disconnected session.
    pub fn new(
        classifier: Arc<dyn UtteranceClassifier>,
        transport: Arc<dyn VoiceTransport>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(SessionCore::default()),
                classifier,
                transport,
                snapshot_tx,
                in_flight: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Receive every published state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Copy of the transcript.
    pub fn messages(&self) -> Vec<Utterance> {
        lock(&self.shared.core).log.entries().to_vec()
    }

    /// Open a new conversation for `username`.
    ///
    /// Clears the transcript, moves to `connecting` and asks the transport to
    /// start. Connection itself is reported later through
    /// [`TransportEvent::Connect`]. Returns the new session id.
    ///
    /// # Errors
    ///
    /// - [`CompanionError::Session`] if a conversation is already active, or
    ///   if it was ended while the transport was still starting.
    /// - [`CompanionError::Transport`] if the transport refuses to start; the
    ///   session is then left in `error` with a system message explaining why.
    pub async fn start_conversation(&self, username: &str) -> Result<String> {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.shared.mutate(|core| {
            if matches!(
                core.status,
                ConnectionStatus::Connecting | ConnectionStatus::Connected
            ) {
                return Err(CompanionError::Session(
                    "a conversation is already active".to_owned(),
                ));
            }
            core.log.clear();
            core.reset(ConnectionStatus::Connecting);
            core.session_id = Some(session_id.clone());
            Ok(())
        })?;
        info!(%session_id, "starting conversation");

        let request = SessionRequest {
            session_id: session_id.clone(),
            username: username.to_owned(),
        };
        if let Err(message) = self.shared.transport.start_session(&request).await {
            warn!(%session_id, error = %message, "voice transport failed to start");
            self.shared.mutate(|core| {
                if core.session_id.as_deref() == Some(session_id.as_str()) {
                    core.enter_error();
                    core.log.append(
                        Role::System,
                        format!("Could not start the conversation: {message}"),
                    );
                }
            });
            return Err(CompanionError::Transport(message));
        }

        let still_current =
            lock(&self.shared.core).session_id.as_deref() == Some(session_id.as_str());
        if !still_current {
            info!(%session_id, "conversation ended while the transport was starting");
            return Err(CompanionError::Session(
                "conversation ended before it started".to_owned(),
            ));
        }
        Ok(session_id)
    }

    /// End the conversation and release the transport.
    ///
    /// Always returns the session to its disconnected defaults. Pending
    /// classifications are left to finish but their results are discarded.
    pub async fn end_conversation(&self) {
        let session_id = self.shared.mutate(|core| {
            core.reset(ConnectionStatus::Disconnected);
            core.session_id.take()
        });
        info!(session_id = ?session_id, "conversation ended");

        if let Err(e) = self.shared.transport.end_session().await {
            warn!(error = %e, "voice transport failed to stop cleanly");
        }
    }

    /// Dispatch one transport callback.
    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connect => self.on_connect(),
            TransportEvent::Disconnect { reason } => self.on_disconnect(reason.as_deref()),
            TransportEvent::Error { message } => self.on_error(message.as_deref()),
            TransportEvent::ModeChange(mode) => self.on_mode_change(mode),
            TransportEvent::Message { source, message } => {
                let role = match source {
                    MessageSource::User => Role::User,
                    MessageSource::Ai => Role::Assistant,
                };
                self.append_message(role, message);
            }
            TransportEvent::VolumeChanged(level) => self.on_volume_change(level),
        }
    }

    /// `connecting -> connected`. Ignored from any other state.
    pub fn on_connect(&self) {
        self.shared.mutate(|core| {
            if core.status != ConnectionStatus::Connecting {
                debug!(status = ?core.status, "ignoring connect outside of connecting");
                return;
            }
            core.status = ConnectionStatus::Connected;
            core.emotion = Emotion::Neutral;
            core.volume = 0.0;
            core.invalidate_pending();
            info!(session_id = ?core.session_id, "voice transport connected");
        });
    }

    /// Transport dropped the link. Emotion turns sad and volume drops to
    /// zero; an `error` status is kept so the failure stays visible.
    pub fn on_disconnect(&self, reason: Option<&str>) {
        self.shared.mutate(|core| {
            let previous = core.status;
            if core.status != ConnectionStatus::Error {
                core.status = ConnectionStatus::Disconnected;
            }
            core.mode = Mode::Idle;
            core.volume = 0.0;
            core.emotion = Emotion::Sad;

            if core.status != previous {
                info!(reason = ?reason, "voice transport disconnected");
                let text = match reason {
                    Some(reason) if !reason.trim().is_empty() => {
                        format!("Conversation disconnected: {reason}")
                    }
                    _ => "Conversation disconnected".to_owned(),
                };
                core.log.append(Role::System, text);
            }
        });
    }

    /// Transport reported a failure. No reconnect is attempted.
    ///
    /// Ignored while disconnected, so teardown errors after an ended
    /// conversation leave the session at rest.
    pub fn on_error(&self, message: Option<&str>) {
        self.shared.mutate(|core| {
            if core.status == ConnectionStatus::Disconnected {
                debug!(error = ?message, "ignoring transport error while disconnected");
                return;
            }
            warn!(error = ?message, status = ?core.status, "voice transport error");
            core.enter_error();
            let message = message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or("unknown error");
            core.log.append(Role::System, format!("Connection error: {message}"));
        });
    }

    /// Mirror the transport's reported mode while connected.
    pub fn on_mode_change(&self, mode: Mode) {
        self.shared.mutate(|core| {
            if core.status == ConnectionStatus::Connected {
                core.mode = mode;
            } else {
                debug!(?mode, status = ?core.status, "ignoring mode change while not connected");
            }
        });
    }

    /// Track the output level while connected.
    pub fn on_volume_change(&self, level: f32) {
        self.shared.mutate(|core| {
            if core.status == ConnectionStatus::Connected && level.is_finite() {
                core.volume = level.clamp(0.0, 100.0);
            }
        });
    }

    /// Append an utterance to the transcript.
    ///
    /// A user utterance also schedules exactly one classification; this
    /// returns before it resolves.
    pub fn append_message(&self, role: Role, text: impl Into<String>) -> Utterance {
        let (utterance, seq) = self.shared.mutate(|core| {
            let utterance = core.log.append(role, text);
            let seq = (role == Role::User).then(|| core.next_seq());
            (utterance, seq)
        });

        if let Some(seq) = seq {
            debug!(seq, "classifying user utterance");
            self.shared
                .spawn_classification(seq, utterance.text().to_owned());
        }
        utterance
    }

    /// Wait until every classification scheduled so far has been applied or
    /// dropped.
    pub async fn wait_for_classifications(&self) {
        loop {
            let handles = std::mem::take(&mut *lock(&self.shared.in_flight));
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "classification task aborted");
                }
            }
        }
    }
}
