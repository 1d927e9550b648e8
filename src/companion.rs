//! Top-level companion: login gating in front of the session.
//!
//! A conversation may only start once the backend has confirmed an
//! identity, either through [`Companion::login`] / [`Companion::register`]
//! or by resuming a remembered username at startup.

use std::sync::{Arc, Mutex, PoisonError};

use crate::auth::{AuthGateway, AuthenticatedUser};
use crate::classifier::{EmotionClassifier, UtteranceClassifier};
use crate::config::CompanionConfig;
use crate::error::{CompanionError, Result};
use crate::identity::IdentityStore;
use crate::session::{ConnectionStatus, SessionStateMachine, VoiceTransport};

/// Voice companion facade.
#[derive(Debug)]
pub struct Companion {
    gateway: AuthGateway,
    identity: IdentityStore,
    session: SessionStateMachine,
    user: Mutex<Option<String>>,
}

impl Companion {
    pub fn new(
        gateway: AuthGateway,
        identity: IdentityStore,
        classifier: Arc<dyn UtteranceClassifier>,
        transport: Arc<dyn VoiceTransport>,
    ) -> Self {
        Self {
            gateway,
            identity,
            session: SessionStateMachine::new(classifier, transport),
            user: Mutex::new(None),
        }
    }

    /// Wire up the HTTP classifier, backend gateway and identity store from config.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Config`] if an HTTP client cannot be built.
    pub fn from_config(
        config: &CompanionConfig,
        transport: Arc<dyn VoiceTransport>,
    ) -> Result<Self> {
        let classifier = EmotionClassifier::from_config(&config.classifier)?;
        let gateway = AuthGateway::from_config(&config.backend)?;
        let identity = IdentityStore::new(config.storage.identity_path());
        Ok(Self::new(gateway, identity, Arc::new(classifier), transport))
    }

    /// The live session.
    pub fn session(&self) -> &SessionStateMachine {
        &self.session
    }

    /// Username of the logged-in user.
    pub fn current_user(&self) -> Option<String> {
        self.user
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_user(&self, username: Option<String>) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = username;
    }

    /// Restore the remembered identity, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity file exists but is unreadable.
    pub fn resume(&self) -> Result<Option<String>> {
        let remembered = self.identity.load()?;
        if let Some(username) = &remembered {
            tracing::info!(%username, "resumed remembered identity");
            self.set_user(Some(username.clone()));
        }
        Ok(remembered)
    }

    /// Log in and remember the identity.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Gateway`] if the backend rejects the
    /// credentials; no identity is recorded in that case.
    pub async fn login(&self, username: &str, password: &str) -> Result<AuthenticatedUser> {
        let user = self.gateway.login(username, password).await?;
        self.adopt(&user);
        Ok(user)
    }

    /// Register a new account, then behave as [`Companion::login`].
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Gateway`] if registration is refused.
    pub async fn register(&self, username: &str, password: &str) -> Result<AuthenticatedUser> {
        let user = self.gateway.register(username, password).await?;
        self.adopt(&user);
        Ok(user)
    }

    fn adopt(&self, user: &AuthenticatedUser) {
        if let Err(e) = self.identity.remember(&user.username) {
            tracing::warn!(error = %e, "failed to remember identity");
        }
        self.set_user(Some(user.username.clone()));
    }

    /// End any conversation and forget the identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity file cannot be rewritten.
    pub async fn logout(&self) -> Result<()> {
        if self.session.snapshot().status != ConnectionStatus::Disconnected {
            self.session.end_conversation().await;
        }
        self.set_user(None);
        self.identity.forget()
    }

    /// Start a conversation for the logged-in user.
    ///
    /// # Errors
    ///
    /// - [`CompanionError::NotLoggedIn`] without an identity.
    /// - Any error from [`SessionStateMachine::start_conversation`].
    pub async fn start_conversation(&self) -> Result<String> {
        let username = self.current_user().ok_or(CompanionError::NotLoggedIn)?;
        let session_id = self.session.start_conversation(&username).await?;
        if let Err(e) = self.gateway.notify_conversation_start(&username).await {
            tracing::debug!(error = %e, "conversation start notification failed");
        }
        Ok(session_id)
    }

    /// End the current conversation.
    pub async fn end_conversation(&self) {
        self.session.end_conversation().await;
    }

    /// Ask the backend to erase the logged-in user's long-term memory.
    ///
    /// # Errors
    ///
    /// - [`CompanionError::NotLoggedIn`] without an identity.
    /// - [`CompanionError::Gateway`] if the backend refuses.
    pub async fn clear_memory(&self) -> Result<()> {
        let username = self.current_user().ok_or(CompanionError::NotLoggedIn)?;
        self.gateway.clear_memory(&username).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::classifier::ClassificationResult;
    use crate::session::NoopTransport;
    use async_trait::async_trait;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct NeutralClassifier;

    #[async_trait]
    impl UtteranceClassifier for NeutralClassifier {
        async fn classify(&self, _text: &str) -> ClassificationResult {
            ClassificationResult::neutral()
        }
    }

    fn companion(server: &MockServer, dir: &tempfile::TempDir) -> Companion {
        Companion::new(
            AuthGateway::new(server.uri(), "", reqwest::Client::new()),
            IdentityStore::new(dir.path().join("identity.json")),
            Arc::new(NeutralClassifier),
            Arc::new(NoopTransport),
        )
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"userId": "alice"})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn start_requires_login() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&server, &dir);

        let err = companion.start_conversation().await.unwrap_err();
        assert!(matches!(err, CompanionError::NotLoggedIn));
        assert_eq!(
            companion.session().snapshot().status,
            ConnectionStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn failed_login_keeps_session_locked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"detail": "Invalid username or password"})),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&server, &dir);

        let err = companion.login("alice", "nope").await.unwrap_err();
        assert!(err.to_string().contains("Invalid username or password"));
        assert!(companion.current_user().is_none());
        assert!(matches!(
            companion.start_conversation().await,
            Err(CompanionError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn login_remembers_identity_and_starts() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/conversation/start"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&server, &dir);

        companion.login("Alice", "pw").await.unwrap();
        assert_eq!(companion.current_user().as_deref(), Some("alice"));

        let session_id = companion.start_conversation().await.unwrap();
        let snapshot = companion.session().snapshot();
        assert_eq!(snapshot.status, ConnectionStatus::Connecting);
        assert_eq!(snapshot.session_id.as_deref(), Some(session_id.as_str()));

        // A fresh companion on the same identity file resumes the login.
        let resumed = self::companion(&server, &dir);
        assert_eq!(resumed.resume().unwrap().as_deref(), Some("alice"));
        assert_eq!(resumed.current_user().as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn start_notification_failure_is_ignored() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/conversation/start"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&server, &dir);

        companion.login("alice", "pw").await.unwrap();
        assert!(companion.start_conversation().await.is_ok());
    }

    #[tokio::test]
    async fn logout_ends_session_and_forgets() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&server, &dir);

        companion.login("alice", "pw").await.unwrap();
        companion.start_conversation().await.unwrap();
        companion.logout().await.unwrap();

        assert!(companion.current_user().is_none());
        assert_eq!(
            companion.session().snapshot().status,
            ConnectionStatus::Disconnected
        );
        assert_eq!(companion.resume().unwrap(), None);
    }

    #[tokio::test]
    async fn clear_memory_requires_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mem0/clear"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "cleared": true})))
            .expect(1)
            .mount(&server)
            .await;
        mount_login(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let companion = companion(&server, &dir);

        assert!(matches!(
            companion.clear_memory().await,
            Err(CompanionError::NotLoggedIn)
        ));
        companion.login("alice", "pw").await.unwrap();
        companion.clear_memory().await.unwrap();
    }
}
