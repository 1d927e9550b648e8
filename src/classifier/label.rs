//! Label-scoring classifier provider.
//!
//! Posts `{"inputs": text}` to `{endpoint}/{model}` with a bearer token and
//! expects `{label, score}` pairs back, either flat or nested one level
//! (`[[...]]`). A 503 carrying `estimated_time` or a "loading" message is the
//! provider's cold-start signal and is reported as
//! [`ProviderError::ModelLoading`].

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::error::{ProviderError, extract_error_message};
use super::{ClassificationResult, EmotionProvider};
use crate::emotion::Emotion;

/// One scored label.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

/// Every response shape the endpoint is known to produce.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LabelResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
    Failure(FailureBody),
}

#[derive(Debug, Deserialize)]
struct FailureBody {
    error: String,
    #[serde(default)]
    estimated_time: Option<f32>,
}

impl FailureBody {
    fn is_loading(&self) -> bool {
        self.estimated_time.is_some() || self.error.to_ascii_lowercase().contains("loading")
    }

    fn into_error(self) -> ProviderError {
        if self.is_loading() {
            ProviderError::ModelLoading {
                estimated_secs: self.estimated_time,
            }
        } else {
            ProviderError::MalformedResponse(format!("provider error: {}", self.error))
        }
    }
}

/// Decode a response into its label scores.
///
/// # Errors
///
/// - [`ProviderError::ModelLoading`] for the cold-start signal.
/// - [`ProviderError::HttpStatus`] / [`ProviderError::AuthRejected`] for other non-2xx statuses.
/// - [`ProviderError::MalformedResponse`] when the body matches no known shape
///   or holds no scores.
pub fn decode_response(status: u16, body: &str) -> Result<Vec<LabelScore>, ProviderError> {
    if !(200..300).contains(&status) {
        if let Ok(failure) = serde_json::from_str::<FailureBody>(body)
            && status == 503
            && failure.is_loading()
        {
            return Err(failure.into_error());
        }
        return Err(ProviderError::from_status(status, extract_error_message(body)));
    }

    let decoded: LabelResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::MalformedResponse(format!("unrecognised response shape: {e}"))
    })?;

    let scores = match decoded {
        LabelResponse::Nested(groups) => groups.into_iter().flatten().collect(),
        LabelResponse::Flat(scores) => scores,
        LabelResponse::Failure(failure) => return Err(failure.into_error()),
    };

    if scores.is_empty() {
        return Err(ProviderError::MalformedResponse(
            "response holds no label scores".to_owned(),
        ));
    }
    Ok(scores)
}

/// Highest-scoring pair; ties go to the first seen. Non-finite scores are ignored.
pub fn best_label(scores: &[LabelScore]) -> Option<&LabelScore> {
    scores
        .iter()
        .filter(|s| s.score.is_finite())
        .fold(None, |best: Option<&LabelScore>, candidate| match best {
            Some(current) if current.score >= candidate.score => Some(current),
            _ => Some(candidate),
        })
}

/// Fold label scores into a classification.
///
/// # Errors
///
/// Returns [`ProviderError::MalformedResponse`] when no score is usable.
pub fn to_result(scores: &[LabelScore]) -> Result<ClassificationResult, ProviderError> {
    let best = best_label(scores).ok_or_else(|| {
        ProviderError::MalformedResponse("no finite label score".to_owned())
    })?;

    let mut all = BTreeMap::new();
    for pair in scores {
        all.entry(pair.label.to_lowercase()).or_insert(pair.score);
    }

    Ok(ClassificationResult {
        emotion: Emotion::from_label(&best.label),
        confidence: Some(best.score.clamp(0.0, 1.0)),
        scores: all,
        reasoning: None,
        error: None,
    })
}

/// Label-scoring emotion provider.
pub struct LabelClassifierProvider {
    id: String,
    endpoint: String,
    api_key: Option<String>,
    model_names: Vec<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for LabelClassifierProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelClassifierProvider")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("has_api_key", &self.api_key.is_some())
            .field("model_names", &self.model_names)
            .finish()
    }
}

impl LabelClassifierProvider {
    /// Create a provider.
    ///
    /// - `endpoint`: base URL; requests go to `{endpoint}/{model}`.
    /// - `api_key`: `None` marks the provider as unconfigured.
    pub fn new(
        id: String,
        endpoint: String,
        api_key: Option<String>,
        model_names: Vec<String>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            id,
            endpoint,
            api_key,
            model_names,
            client,
        }
    }

    fn url_for(&self, model: &str) -> String {
        format!("{}/{model}", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmotionProvider for LabelClassifierProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn model_names(&self) -> &[String] {
        &self.model_names
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn classify(
        &self,
        model: &str,
        text: &str,
    ) -> Result<ClassificationResult, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::ConfigError(format!("{} has no API key", self.id)))?;

        let response = self
            .client
            .post(self.url_for(model))
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "inputs": text }))
            .send()
            .await
            .map_err(|e| ProviderError::RequestError(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::RequestError(format!("failed to read body: {e}")))?;

        let scores = decode_response(status, &body)?;
        to_result(&scores)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn pair(label: &str, score: f32) -> LabelScore {
        LabelScore {
            label: label.to_owned(),
            score,
        }
    }

    #[test]
    fn nested_response_maps_to_happy() {
        let body = r#"[[{"label":"joy","score":0.9},{"label":"anger","score":0.1}]]"#;
        let scores = decode_response(200, body).unwrap();
        let out = to_result(&scores).unwrap();
        assert_eq!(out.emotion, Emotion::Happy);
        assert_eq!(out.confidence, Some(0.9));
        assert_eq!(out.scores.len(), 2);
        assert_eq!(out.scores.get("anger"), Some(&0.1));
    }

    #[test]
    fn flat_response_is_accepted() {
        let body = r#"[{"label":"sadness","score":0.6},{"label":"joy","score":0.3}]"#;
        let out = to_result(&decode_response(200, body).unwrap()).unwrap();
        assert_eq!(out.emotion, Emotion::Sad);
    }

    #[test]
    fn label_case_is_ignored() {
        let out = to_result(&[pair("SURPRISE", 0.7), pair("Neutral", 0.2)]).unwrap();
        assert_eq!(out.emotion, Emotion::Surprised);
        assert!(out.scores.contains_key("surprise"));
    }

    #[test]
    fn unmapped_label_is_neutral() {
        let out = to_result(&[pair("LABEL_0", 0.99)]).unwrap();
        assert_eq!(out.emotion, Emotion::Neutral);
        assert_eq!(out.confidence, Some(0.99));
    }

    #[test]
    fn ties_go_to_first_seen() {
        let scores = [pair("anger", 0.5), pair("joy", 0.5), pair("fear", 0.2)];
        assert_eq!(best_label(&scores).unwrap().label, "anger");
    }

    #[test]
    fn non_finite_scores_are_ignored() {
        let scores = [pair("anger", f32::NAN), pair("joy", 0.2)];
        assert_eq!(best_label(&scores).unwrap().label, "joy");
        assert!(to_result(&[pair("anger", f32::NAN)]).is_err());
    }

    #[test]
    fn loading_signal_is_model_loading() {
        let body = r#"{"error":"Model j-hartmann/emotion is currently loading","estimated_time":20.5}"#;
        let err = decode_response(503, body).unwrap_err();
        assert_eq!(
            err,
            ProviderError::ModelLoading {
                estimated_secs: Some(20.5)
            }
        );
        assert!(err.is_transient());
    }

    #[test]
    fn loading_error_in_ok_body_is_model_loading() {
        let err = decode_response(200, r#"{"error":"Model is loading"}"#).unwrap_err();
        assert!(matches!(err, ProviderError::ModelLoading { .. }));
    }

    #[test]
    fn other_error_status_keeps_message() {
        let err = decode_response(500, r#"{"error":"internal"}"#).unwrap_err();
        assert_eq!(
            err,
            ProviderError::HttpStatus {
                status: 500,
                message: "internal".to_owned()
            }
        );
        let err = decode_response(401, r#"{"error":"Invalid token"}"#).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn unexpected_shapes_are_malformed() {
        for body in ["{}", r#"{"label":"joy"}"#, "[]", "[[]]", "not json", r#"[{"label":"joy"}]"#] {
            let err = decode_response(200, body).unwrap_err();
            assert!(
                matches!(err, ProviderError::MalformedResponse(_)),
                "{body} should be malformed, got {err:?}"
            );
        }
    }

    #[test]
    fn url_joins_model_path() {
        let provider = LabelClassifierProvider::new(
            "hf".into(),
            "http://localhost/models/".into(),
            Some("hf_x".into()),
            vec![],
            reqwest::Client::new(),
        );
        assert_eq!(
            provider.url_for("j-hartmann/emotion-english-distilroberta-base"),
            "http://localhost/models/j-hartmann/emotion-english-distilroberta-base"
        );
        assert!(provider.is_configured());
    }
}
