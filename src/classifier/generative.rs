//! Generative-text provider.
//!
//! Wraps the utterance in a fixed instruction prompt, posts it to a
//! `generateContent`-style endpoint (`{contents:[{parts:[{text}]}]}`), and
//! pulls the first balanced JSON object out of the model's reply. The API key
//! travels as the `key` query parameter.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::error::{ProviderError, extract_error_message};
use super::json::extract_json_object;
use super::{ClassificationResult, EmotionProvider};
use crate::emotion::Emotion;

/// Instruction template; `{utterance}` is replaced with the user's text.
pub const PROMPT_TEMPLATE: &str = "You are an emotion classifier for a voice companion.\n\
Classify the emotion expressed in the user's utterance below.\n\
Choose exactly one label from: happy, sad, angry, surprised, neutral.\n\
Reply with a single JSON object and nothing else, in this shape:\n\
{\"emotion\": \"<label>\", \"confidence\": <number between 0 and 1>, \"reasoning\": \"<one short sentence>\"}\n\
\n\
Utterance: \"{utterance}\"";

/// Render the instruction prompt for `text`.
pub fn build_prompt(text: &str) -> String {
    PROMPT_TEMPLATE.replace("{utterance}", text)
}

/// Request body for a `generateContent` call.
pub fn build_request_body(text: &str) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "parts": [{ "text": build_prompt(text) }]
        }]
    })
}

// ── Response schema ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

/// The JSON verdict the prompt asks for.
#[derive(Debug, Deserialize)]
struct EmotionVerdict {
    emotion: String,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Concatenated text of the first candidate in a `generateContent` response.
///
/// # Errors
///
/// Returns [`ProviderError::MalformedResponse`] when the body does not match
/// the schema or carries no text.
pub fn reply_text(body: &str) -> Result<String, ProviderError> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid response body: {e}")))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::MalformedResponse(
            "response has no candidate text".to_owned(),
        ));
    }
    Ok(text)
}

/// Parse the model's reply into a classification.
///
/// Surrounding prose and code fences are tolerated; only the first balanced
/// JSON object is read.
///
/// # Errors
///
/// Returns [`ProviderError::MalformedResponse`] when no object is found or
/// the object lacks an `emotion` string.
pub fn parse_verdict(reply: &str) -> Result<ClassificationResult, ProviderError> {
    let object = extract_json_object(reply).ok_or_else(|| {
        ProviderError::MalformedResponse("reply contains no JSON object".to_owned())
    })?;
    let verdict: EmotionVerdict = serde_json::from_str(object)
        .map_err(|e| ProviderError::MalformedResponse(format!("invalid verdict: {e}")))?;

    let emotion = Emotion::from_label(&verdict.emotion);
    let confidence = verdict.confidence.as_ref().and_then(confidence_value);

    let mut scores = BTreeMap::new();
    if let Some(confidence) = confidence {
        scores.insert(emotion.as_str().to_owned(), confidence);
    }

    Ok(ClassificationResult {
        emotion,
        confidence,
        scores,
        reasoning: verdict.reasoning.filter(|r| !r.trim().is_empty()),
        error: None,
    })
}

/// Accept numbers and numeric strings; clamp into `0.0..=1.0`.
fn confidence_value(value: &serde_json::Value) -> Option<f32> {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| raw.clamp(0.0, 1.0) as f32)
}

/// Generative-text emotion provider.
pub struct GenerativeTextProvider {
    id: String,
    endpoint: String,
    api_key: Option<String>,
    model_names: Vec<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for GenerativeTextProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerativeTextProvider")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("has_api_key", &self.api_key.is_some())
            .field("model_names", &self.model_names)
            .finish()
    }
}

impl GenerativeTextProvider {
    /// Create a provider.
    ///
    /// - `endpoint`: base URL; requests go to `{endpoint}/{model}:generateContent`.
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
        format!("{}/{model}:generateContent", self.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmotionProvider for GenerativeTextProvider {
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
            .query(&[("key", api_key)])
            .json(&build_request_body(text))
            .send()
            .await
            .map_err(|e| ProviderError::RequestError(format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::RequestError(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(ProviderError::from_status(
                status.as_u16(),
                extract_error_message(&body),
            ));
        }

        let reply = reply_text(&body)?;
        parse_verdict(&reply)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn prompt_embeds_utterance_and_taxonomy() {
        let prompt = build_prompt("I lost my keys");
        assert!(prompt.contains("Utterance: \"I lost my keys\""));
        for label in ["happy", "sad", "angry", "surprised", "neutral"] {
            assert!(prompt.contains(label), "prompt lists {label}");
        }
        assert!(!prompt.contains("{utterance}"));
    }

    #[test]
    fn request_body_shape() {
        let body = build_request_body("hi");
        let text = body["contents"][0]["parts"][0]["text"].as_str().unwrap();
        assert!(text.ends_with("Utterance: \"hi\""));
    }

    #[test]
    fn verdict_with_surrounding_text() {
        let out =
            parse_verdict(r#"Hello {"emotion":"sad","confidence":0.8,"reasoning":"x"} world"#)
                .unwrap();
        assert_eq!(out.emotion, Emotion::Sad);
        assert_eq!(out.confidence, Some(0.8));
        assert_eq!(out.reasoning.as_deref(), Some("x"));
        assert_eq!(out.scores.get("sad"), Some(&0.8));
        assert!(out.error.is_none());
    }

    #[test]
    fn verdict_in_code_fence() {
        let out = parse_verdict("```json\n{\"emotion\": \"Angry\", \"confidence\": \"0.7\"}\n```")
            .unwrap();
        assert_eq!(out.emotion, Emotion::Angry);
        assert_eq!(out.confidence, Some(0.7));
        assert!(out.reasoning.is_none());
    }

    #[test]
    fn confidence_is_clamped() {
        let out = parse_verdict(r#"{"emotion":"happy","confidence":3}"#).unwrap();
        assert_eq!(out.confidence, Some(1.0));
        let out = parse_verdict(r#"{"emotion":"happy","confidence":"high"}"#).unwrap();
        assert_eq!(out.confidence, None);
        assert!(out.scores.is_empty());
    }

    #[test]
    fn unknown_emotion_label_is_neutral() {
        let out = parse_verdict(r#"{"emotion":"melancholic"}"#).unwrap();
        assert_eq!(out.emotion, Emotion::Neutral);
    }

    #[test]
    fn missing_object_is_malformed() {
        let err = parse_verdict("I think the user is sad.").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn object_without_emotion_is_malformed() {
        let err = parse_verdict(r#"{"mood":"sad"}"#).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse(_)));
    }

    #[test]
    fn reply_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"emotion\":"},{"text":"\"happy\"}"}]}}]}"#;
        assert_eq!(reply_text(body).unwrap(), r#"{"emotion":"happy"}"#);
    }

    #[test]
    fn reply_text_rejects_empty_candidates() {
        assert!(matches!(
            reply_text(r#"{"candidates":[]}"#),
            Err(ProviderError::MalformedResponse(_))
        ));
        assert!(matches!(
            reply_text(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#),
            Err(ProviderError::MalformedResponse(_))
        ));
        assert!(matches!(
            reply_text("not json"),
            Err(ProviderError::MalformedResponse(_))
        ));
    }

    #[test]
    fn debug_hides_api_key() {
        let provider = GenerativeTextProvider::new(
            "gemini".into(),
            "http://localhost".into(),
            Some("secret-key".into()),
            vec!["m".into()],
            reqwest::Client::new(),
        );
        let debug = format!("{provider:?}");
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("has_api_key: true"));
    }

    #[test]
    fn url_trims_trailing_slash() {
        let provider = GenerativeTextProvider::new(
            "gemini".into(),
            "http://localhost/v1beta/models/".into(),
            None,
            vec![],
            reqwest::Client::new(),
        );
        assert_eq!(
            provider.url_for("gemini-2.0-flash"),
            "http://localhost/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert!(!provider.is_configured());
    }
}
