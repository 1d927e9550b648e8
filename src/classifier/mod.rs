//! Emotion inference over unreliable external providers.
//!
//! [`EmotionClassifier::classify`] paces itself through a [`RateLimiter`],
//! then walks an ordered cascade of `(provider, model)` pairs until one
//! produces a result. Provider failures never escape: an exhausted cascade
//! degrades to a neutral result carrying a diagnostic summary.
//!
//! Two provider families are supported, each with its own response decoder:
//! - [`generative::GenerativeTextProvider`]: a text-generation endpoint
//!   prompted to answer with a JSON verdict.
//! - [`label::LabelClassifierProvider`]: a label-scoring endpoint returning
//!   `{label, score}` pairs.

pub mod error;
pub mod generative;
pub mod json;
pub mod label;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClassifierConfig, ProviderConfig, ProviderKind};
use crate::emotion::Emotion;
use crate::error::{CompanionError, Result};
use crate::rate_limit::RateLimiter;

pub use error::ProviderError;
pub use generative::GenerativeTextProvider;
pub use label::LabelClassifierProvider;

/// Normalised output of one classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// Detected emotion.
    pub emotion: Emotion,
    /// Confidence in `0.0..=1.0`, when the provider reported one.
    pub confidence: Option<f32>,
    /// Raw label scores, keyed by lower-cased provider label.
    pub scores: BTreeMap<String, f32>,
    /// Free-text explanation from generative providers.
    pub reasoning: Option<String>,
    /// Diagnostic summary when the result is a degraded fallback.
    pub error: Option<String>,
}

impl ClassificationResult {
    /// Neutral result with no scores.
    #[must_use]
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Neutral result annotated with why classification did not happen.
    #[must_use]
    pub fn degraded(summary: impl Into<String>) -> Self {
        Self {
            error: Some(summary.into()),
            ..Self::default()
        }
    }

    /// Whether this result stands in for a failed classification.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// How one cascade attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    /// Try the next model.
    TransientFailure,
    /// Skip the rest of this provider's models.
    FatalFailure,
}

/// One `(provider, model)` try, used for control flow and logging only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider_id: String,
    pub model_name: String,
    pub outcome: AttemptOutcome,
}

impl fmt::Display for ProviderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {:?}", self.provider_id, self.model_name, self.outcome)
    }
}

/// A backend that can classify an utterance with a given model.
#[async_trait]
pub trait EmotionProvider: Send + Sync {
    /// Identifier used in logs and failure summaries.
    fn id(&self) -> &str;

    /// Models to try, in order.
    fn model_names(&self) -> &[String];

    /// False when credentials are missing or placeholders.
    fn is_configured(&self) -> bool;

    /// Classify `text` with `model`.
    async fn classify(
        &self,
        model: &str,
        text: &str,
    ) -> std::result::Result<ClassificationResult, ProviderError>;
}

/// Anything the session can ask to classify an utterance.
///
/// Implementations must not fail; failures degrade to a neutral result.
#[async_trait]
pub trait UtteranceClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> ClassificationResult;
}

/// Ordered provider cascade behind a rate limiter.
pub struct EmotionClassifier {
    providers: Vec<Arc<dyn EmotionProvider>>,
    limiter: RateLimiter,
}

impl fmt::Debug for EmotionClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.providers.iter().map(|p| p.id()).collect();
        f.debug_struct("EmotionClassifier")
            .field("providers", &ids)
            .field("min_interval", &self.limiter.min_interval())
            .finish()
    }
}

impl EmotionClassifier {
    /// Create a classifier over `providers`, tried in the given order.
    pub fn new(providers: Vec<Arc<dyn EmotionProvider>>, limiter: RateLimiter) -> Self {
        Self { providers, limiter }
    }

    /// Build the HTTP providers described by the configuration table.
    ///
    /// # Errors
    ///
    /// Returns [`CompanionError::Config`] if the HTTP client cannot be built.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CompanionError::Config(format!("failed to build HTTP client: {e}")))?;

        let providers = config
            .providers
            .iter()
            .map(|p| build_provider(p, client.clone()))
            .collect();
        let limiter = RateLimiter::new(Duration::from_millis(config.min_interval_ms));
        Ok(Self::new(providers, limiter))
    }

    /// Classify the emotional tone of one utterance.
    ///
    /// Never fails. Empty input and unconfigured credentials return neutral
    /// without touching the network; an exhausted cascade returns neutral
    /// with [`ClassificationResult::error`] set.
    pub async fn classify(&self, text: &str) -> ClassificationResult {
        let text = text.trim();
        if text.is_empty() {
            return ClassificationResult::neutral();
        }

        let configured: Vec<&Arc<dyn EmotionProvider>> =
            self.providers.iter().filter(|p| p.is_configured()).collect();
        if configured.is_empty() {
            tracing::warn!("no classification provider has usable credentials");
            return ClassificationResult::degraded("no classification provider is configured");
        }

        self.limiter.acquire().await;

        let mut failures = Vec::new();
        for provider in configured {
            for model in provider.model_names() {
                match provider.classify(model, text).await {
                    Ok(result) => {
                        let attempt = ProviderAttempt {
                            provider_id: provider.id().to_owned(),
                            model_name: model.clone(),
                            outcome: AttemptOutcome::Success,
                        };
                        tracing::debug!(
                            %attempt,
                            emotion = %result.emotion,
                            confidence = ?result.confidence,
                            "classification succeeded"
                        );
                        return result;
                    }
                    Err(err) => {
                        let outcome = if err.is_transient() {
                            AttemptOutcome::TransientFailure
                        } else {
                            AttemptOutcome::FatalFailure
                        };
                        let attempt = ProviderAttempt {
                            provider_id: provider.id().to_owned(),
                            model_name: model.clone(),
                            outcome,
                        };
                        tracing::warn!(%attempt, error = %err, "classification attempt failed");
                        failures.push(format!("{}/{}: {err}", provider.id(), model));
                        if outcome == AttemptOutcome::FatalFailure {
                            break;
                        }
                    }
                }
            }
        }

        if failures.is_empty() {
            return ClassificationResult::degraded("no classification models are configured");
        }
        tracing::warn!(attempts = failures.len(), "classification cascade exhausted");
        ClassificationResult::degraded(format!(
            "all classification attempts failed: {}",
            failures.join("; ")
        ))
    }
}

#[async_trait]
impl UtteranceClassifier for EmotionClassifier {
    async fn classify(&self, text: &str) -> ClassificationResult {
        EmotionClassifier::classify(self, text).await
    }
}

fn build_provider(config: &ProviderConfig, client: reqwest::Client) -> Arc<dyn EmotionProvider> {
    let api_key = config.resolved_api_key();
    match config.kind {
        ProviderKind::GenerativeText => Arc::new(GenerativeTextProvider::new(
            config.id.clone(),
            config.endpoint.clone(),
            api_key,
            config.model_names.clone(),
            client,
        )),
        ProviderKind::Classifier => Arc::new(LabelClassifierProvider::new(
            config.id.clone(),
            config.endpoint.clone(),
            api_key,
            config.model_names.clone(),
            client,
        )),
    }
}
