//! Configuration types for the companion.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CompanionError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// Emotion classification settings.
    pub classifier: ClassifierConfig,
    /// Login / memory backend settings.
    pub backend: BackendConfig,
    /// Local persistence settings.
    pub storage: StorageConfig,
}

/// Emotion classifier settings: pacing plus the ordered provider table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Minimum time between the starts of two classification calls.
    pub min_interval_ms: u64,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    /// Providers in fallback order. Each provider's models are tried in
    /// their listed order before moving on to the next provider.
    pub providers: Vec<ProviderConfig>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 3_000,
            request_timeout_secs: 15,
            providers: vec![
                ProviderConfig {
                    id: "huggingface".to_owned(),
                    kind: ProviderKind::Classifier,
                    endpoint: "https://api-inference.huggingface.co/models".to_owned(),
                    api_key: String::new(),
                    api_key_env: Some("HF_API_TOKEN".to_owned()),
                    model_names: vec![
                        "j-hartmann/emotion-english-distilroberta-base".to_owned(),
                        "bhadresh-savani/distilbert-base-uncased-emotion".to_owned(),
                    ],
                },
                ProviderConfig {
                    id: "gemini".to_owned(),
                    kind: ProviderKind::GenerativeText,
                    endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_owned(),
                    api_key: String::new(),
                    api_key_env: Some("GEMINI_API_KEY".to_owned()),
                    model_names: vec![
                        "gemini-2.0-flash".to_owned(),
                        "gemini-1.5-flash".to_owned(),
                        "gemini-1.5-flash-8b".to_owned(),
                    ],
                },
            ],
        }
    }
}

/// Which response family a provider belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Free-form text generation prompted to answer with a JSON verdict.
    GenerativeText,
    /// Label-scoring endpoint returning `{label, score}` pairs.
    Classifier,
}

/// One row of the provider table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Identifier used in logs and failure summaries.
    pub id: String,
    /// Response family.
    pub kind: ProviderKind,
    /// Base endpoint; the model name is appended per request.
    pub endpoint: String,
    /// Inline API key. Leave empty to read it from `api_key_env`.
    #[serde(default)]
    pub api_key: String,
    /// Environment variable consulted when `api_key` is empty.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Model names in the order they are tried.
    #[serde(default)]
    pub model_names: Vec<String>,
}

impl ProviderConfig {
    /// The usable API key, or `None` when the key is missing or still a
    /// placeholder value.
    pub fn resolved_api_key(&self) -> Option<String> {
        let key = if self.api_key.trim().is_empty() {
            let var = self.api_key_env.as_deref()?;
            std::env::var(var).ok()?
        } else {
            self.api_key.clone()
        };
        let key = key.trim().to_owned();
        if is_placeholder_credential(&key) {
            None
        } else {
            Some(key)
        }
    }
}

/// Whether a credential is empty or an obvious template value.
pub fn is_placeholder_credential(key: &str) -> bool {
    let lower = key.trim().to_ascii_lowercase();
    lower.is_empty()
        || lower.contains("your_")
        || lower.contains("_here")
        || lower.contains("placeholder")
        || lower.contains("changeme")
}

/// Login / memory backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the backend, without a trailing slash.
    pub base_url: String,
    /// Bearer token for protected routes (`/mem0/*`). Empty disables the header.
    pub auth_token: String,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_owned(),
            auth_token: String::new(),
            request_timeout_secs: 10,
        }
    }
}

/// Local persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Where the remembered username lives. `None` uses the data directory.
    pub identity_path: Option<PathBuf>,
}

impl StorageConfig {
    /// Effective identity file path.
    pub fn identity_path(&self) -> PathBuf {
        self.identity_path
            .clone()
            .unwrap_or_else(crate::alfred_dirs::identity_file)
    }
}

impl CompanionConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CompanionError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| CompanionError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::alfred_dirs::config_file()
    }
}
