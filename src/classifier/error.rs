//! Errors from a single classification provider attempt.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`ProviderError::code()`].
//! These errors never leave the classifier: the fallback cascade records them
//! and moves on.

/// Stable error codes for provider failures.
pub mod error_codes {
    /// Missing or unusable provider configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// The provider rejected the credentials.
    pub const AUTH_REJECTED: &str = "AUTH_REJECTED";

    /// The HTTP request could not be sent or the body could not be read.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// The provider answered with a non-2xx status.
    pub const HTTP_STATUS: &str = "HTTP_STATUS";

    /// The provider is still loading the model (cold start).
    pub const MODEL_LOADING: &str = "MODEL_LOADING";

    /// The response did not match the expected schema.
    pub const MALFORMED_RESPONSE: &str = "MALFORMED_RESPONSE";
}

/// Failure of one `(provider, model)` attempt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Missing or unusable provider configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    ConfigError(String),

    /// Credentials rejected (401/403).
    #[error("[{}] {}", error_codes::AUTH_REJECTED, .0)]
    AuthRejected(String),

    /// Transport-level failure.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    RequestError(String),

    /// Non-2xx response other than auth rejection or model loading.
    #[error("[{}] HTTP {status}: {message}", error_codes::HTTP_STATUS)]
    HttpStatus {
        /// Response status code.
        status: u16,
        /// Best-effort message extracted from the body.
        message: String,
    },

    /// Model cold start reported by the provider.
    #[error("[{}] model is loading (estimated {estimated_secs:?}s)", error_codes::MODEL_LOADING)]
    ModelLoading {
        /// Provider's estimate of the remaining load time.
        estimated_secs: Option<f32>,
    },

    /// Response body did not decode into the provider's schema.
    #[error("[{}] {}", error_codes::MALFORMED_RESPONSE, .0)]
    MalformedResponse(String),
}

impl ProviderError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => error_codes::CONFIG_INVALID,
            Self::AuthRejected(_) => error_codes::AUTH_REJECTED,
            Self::RequestError(_) => error_codes::REQUEST_FAILED,
            Self::HttpStatus { .. } => error_codes::HTTP_STATUS,
            Self::ModelLoading { .. } => error_codes::MODEL_LOADING,
            Self::MalformedResponse(_) => error_codes::MALFORMED_RESPONSE,
        }
    }

    /// Whether the next model of the same provider is worth trying.
    ///
    /// Transient failures include:
    /// - Network errors and timeouts
    /// - Non-2xx responses (rate limits, retired model names, server errors)
    /// - Model cold starts
    /// - Malformed or unparseable replies
    ///
    /// Auth rejections and configuration errors are fatal for the provider:
    /// its remaining models share the same credentials and endpoint.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConfigError(_) | Self::AuthRejected(_) => false,
            Self::RequestError(_)
            | Self::HttpStatus { .. }
            | Self::ModelLoading { .. }
            | Self::MalformedResponse(_) => true,
        }
    }

    /// Build an error from a non-2xx response.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::AuthRejected(format!("HTTP {status}: {message}")),
            _ => Self::HttpStatus { status, message },
        }
    }
}

/// Extract a human-readable message from a provider error body.
///
/// Understands `{"error": "..."}` and `{"error": {"message": "..."}}`;
/// anything else is returned verbatim.
pub(crate) fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_owned();
    };
    match value.get("error") {
        Some(serde_json::Value::String(message)) => message.clone(),
        Some(error) => error
            .get("message")
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| body.to_owned()),
        None => body.to_owned(),
    }
}
