//! Shared emotion vocabulary.
//!
//! Classifier results, session snapshots and the rendering layer all speak
//! in terms of [`Emotion`]. Provider-specific labels (`joy`, `sadness`,
//! `anger`, ...) are folded into the vocabulary by [`Emotion::from_label`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The fixed set of emotions the companion can show.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Confused,
}

// ── Label table ─────────────────────────────────────────────────────────

/// (provider label, emotion). Matched case-insensitively.
const LABEL_TABLE: &[(&str, Emotion)] = &[
    ("joy", Emotion::Happy),
    ("happiness", Emotion::Happy),
    ("happy", Emotion::Happy),
    ("sadness", Emotion::Sad),
    ("sad", Emotion::Sad),
    ("fear", Emotion::Sad),
    ("disgust", Emotion::Sad),
    ("anger", Emotion::Angry),
    ("angry", Emotion::Angry),
    ("surprise", Emotion::Surprised),
    ("surprised", Emotion::Surprised),
    ("confusion", Emotion::Confused),
    ("confused", Emotion::Confused),
    ("neutral", Emotion::Neutral),
];

impl Emotion {
    /// Every emotion, in vocabulary order.
    pub const ALL: [Emotion; 6] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Confused,
    ];

    /// Wire / rendering name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Surprised => "surprised",
            Self::Confused => "confused",
        }
    }

    /// Map a provider label onto the vocabulary.
    ///
    /// Unknown labels map to [`Emotion::Neutral`].
    #[must_use]
    pub fn from_label(label: &str) -> Emotion {
        let label = label.trim();
        LABEL_TABLE
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(label))
            .map(|&(_, emotion)| emotion)
            .unwrap_or(Emotion::Neutral)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the six vocabulary names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown emotion: {0}")]
pub struct UnknownEmotion(pub String);

impl FromStr for Emotion {
    type Err = UnknownEmotion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownEmotion(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn provider_labels_map_to_vocabulary() {
        assert_eq!(Emotion::from_label("joy"), Emotion::Happy);
        assert_eq!(Emotion::from_label("happiness"), Emotion::Happy);
        assert_eq!(Emotion::from_label("sadness"), Emotion::Sad);
        assert_eq!(Emotion::from_label("fear"), Emotion::Sad);
        assert_eq!(Emotion::from_label("disgust"), Emotion::Sad);
        assert_eq!(Emotion::from_label("anger"), Emotion::Angry);
        assert_eq!(Emotion::from_label("surprise"), Emotion::Surprised);
        assert_eq!(Emotion::from_label("neutral"), Emotion::Neutral);
    }

    #[test]
    fn label_matching_is_case_insensitive() {
        assert_eq!(Emotion::from_label("JOY"), Emotion::Happy);
        assert_eq!(Emotion::from_label("  Anger "), Emotion::Angry);
    }

    #[test]
    fn unmapped_label_defaults_to_neutral() {
        assert_eq!(Emotion::from_label("love"), Emotion::Neutral);
        assert_eq!(Emotion::from_label(""), Emotion::Neutral);
        assert_eq!(Emotion::from_label("LABEL_3"), Emotion::Neutral);
    }

    #[test]
    fn vocabulary_names_map_to_themselves() {
        for emotion in Emotion::ALL {
            assert_eq!(Emotion::from_label(emotion.as_str()), emotion);
            assert_eq!(emotion.as_str().parse::<Emotion>().unwrap(), emotion);
        }
    }

    #[test]
    fn from_str_rejects_provider_labels() {
        assert_eq!(
            "joy".parse::<Emotion>(),
            Err(UnknownEmotion("joy".to_owned()))
        );
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Emotion::Surprised).unwrap(), "\"surprised\"");
        let parsed: Emotion = serde_json::from_str("\"confused\"").unwrap();
        assert_eq!(parsed, Emotion::Confused);
    }

    #[test]
    fn default_is_neutral() {
        assert_eq!(Emotion::default(), Emotion::Neutral);
        assert_eq!(Emotion::Happy.to_string(), "happy");
    }
}
