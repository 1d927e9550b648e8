//! HTTP client for the login, registration and memory backend.
//!
//! The backend speaks plain JSON over HTTP:
//!
//! | Route                 | Body                     | Success                |
//! |-----------------------|--------------------------|------------------------|
//! | `POST /login`         | `{username, password}`   | `{userId}`             |
//! | `POST /register`      | `{username, password}`   | `{userId}`             |
//! | `POST /mem0/clear`    | `{userId}` + bearer      | `{ok, cleared}`        |
//! | `POST /conversation/start` | `{username}`        | `{ok, message}`        |
//!
//! Failures carry `{detail}`, where `detail` is usually a string but may be
//! a structured validation report.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::BackendConfig;
use crate::error::{CompanionError, Result};

/// Message used when either credential is blank.
pub const MISSING_CREDENTIALS: &str = "username and password are required";

/// Errors from the backend collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Rejected locally before any request was sent.
    #[error("{0}")]
    Invalid(String),

    /// The backend answered with a non-2xx status.
    #[error("{detail} (HTTP {status})")]
    Rejected { status: u16, detail: String },

    /// The backend could not be reached.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered 2xx with an unexpected body.
    #[error("unexpected backend response: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Human-readable reason suitable for showing next to a login form.
    pub fn detail(&self) -> &str {
        match self {
            Self::Invalid(detail)
            | Self::Unreachable(detail)
            | Self::Malformed(detail)
            | Self::Rejected { detail, .. } => detail,
        }
    }
}

/// Identity confirmed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    /// Canonical, lower-cased username.
    pub username: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    user_id: String,
}

/// Trim and lower-case the username, rejecting blank credentials.
///
/// # Errors
///
/// Returns [`GatewayError::Invalid`] when either field is blank.
pub fn normalize_credentials(
    username: &str,
    password: &str,
) -> std::result::Result<String, GatewayError> {
    let username = username.trim().to_lowercase();
    if username.is_empty() || password.trim().is_empty() {
        return Err(GatewayError::Invalid(MISSING_CREDENTIALS.to_owned()));
    }
    Ok(username)
}

/// Pull a readable reason out of an error body.
fn error_detail(status: u16, body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => match value.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(serde_json::Value::Null) | None => fallback_detail(status, body),
            Some(other) => other.to_string(),
        },
        Err(_) => fallback_detail(status, body),
    }
}

fn fallback_detail(status: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("request failed with HTTP {status}")
    } else {
        body.to_owned()
    }
}

/// Client for the backend routes.
#[derive(Debug, Clone)]
pub struct AuthGateway {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl AuthGateway {
    /// Create a gateway for `base_url`. An empty `auth_token` disables the
    /// bearer header on protected routes.
    pub fn new(base_url: impl Into<String>, auth_token: &str, client: reqwest::Client) -> Self {
        let auth_token = auth_token.trim();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth_token: (!auth_token.is_empty()).then(|| auth_token.to_owned()),
            client,
        }
    }

    /// Build a gateway from the `[backend]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Config`] if the HTTP client cannot be built.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CompanionError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::new(config.base_url.clone(), &config.auth_token, client))
    }

    /// Backend base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Log in with existing credentials.
    ///
    /// # Errors
    ///
    /// Any [`GatewayError`]; a wrong password is `Rejected` with status 401.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> std::result::Result<AuthenticatedUser, GatewayError> {
        self.authenticate("/login", username, password).await
    }

    /// Create an account and log in.
    ///
    /// # Errors
    ///
    /// Any [`GatewayError`]; a taken username is `Rejected` with status 409.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> std::result::Result<AuthenticatedUser, GatewayError> {
        self.authenticate("/register", username, password).await
    }

    async fn authenticate(
        &self,
        route: &str,
        username: &str,
        password: &str,
    ) -> std::result::Result<AuthenticatedUser, GatewayError> {
        let username = normalize_credentials(username, password)?;
        let credentials = Credentials {
            username: &username,
            password,
        };
        let body = self.post(route, &credentials, false).await?;

        let response: AuthResponse = serde_json::from_str(&body)
            .map_err(|e| GatewayError::Malformed(format!("{route}: {e}")))?;
        let canonical = response.user_id.trim().to_lowercase();
        if canonical.is_empty() {
            return Err(GatewayError::Malformed(format!("{route}: empty userId")));
        }
        tracing::info!(username = %canonical, route, "authenticated");
        Ok(AuthenticatedUser {
            username: canonical,
        })
    }

    /// Erase the long-term memory the backend holds for `username`.
    ///
    /// # Errors
    ///
    /// Any [`GatewayError`]; a bad token is `Rejected` with status 401.
    pub async fn clear_memory(&self, username: &str) -> std::result::Result<(), GatewayError> {
        let user_id = username.trim().to_lowercase();
        if user_id.is_empty() {
            return Err(GatewayError::Invalid("userId is required".to_owned()));
        }
        self.post(
            "/mem0/clear",
            &serde_json::json!({ "userId": user_id }),
            true,
        )
        .await?;
        tracing::info!(username = %user_id, "memory cleared");
        Ok(())
    }

    /// Record that `username` started a conversation.
    ///
    /// # Errors
    ///
    /// Any [`GatewayError`]. Callers treat this as best effort.
    pub async fn notify_conversation_start(
        &self,
        username: &str,
    ) -> std::result::Result<(), GatewayError> {
        self.post(
            "/conversation/start",
            &serde_json::json!({ "username": username }),
            false,
        )
        .await?;
        Ok(())
    }

    /// POST `payload` to `route` and return the 2xx body.
    async fn post<T: Serialize + ?Sized>(
        &self,
        route: &str,
        payload: &T,
        protected: bool,
    ) -> std::result::Result<String, GatewayError> {
        let mut request = self
            .client
            .post(format!("{}{route}", self.base_url))
            .json(payload);
        if protected && let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Unreachable(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Unreachable(format!("failed to read body: {e}")))?;

        if !(200..300).contains(&status) {
            let detail = error_detail(status, &body);
            tracing::warn!(route, status, %detail, "backend rejected request");
            return Err(GatewayError::Rejected { status, detail });
        }
        Ok(body)
    }
}
