use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    env,
    path::Path,
    time::Duration,
};

use serde::{
    Deserialize,
    Serialize,
};

use super::Result;
use crate::persistence;

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_ANKI_CONNECT_URL: &str = "http://127.0.0.1:8765";
pub const DEFAULT_DEEPL_API_URL: &str = "https://api-free.deepl.com/v2/translate";

/// Front/back templates and stylesheet for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardTemplate {
    pub front: String,
    pub back: String,
    pub styling: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub anki_connect_url: String,
    pub request_timeout_secs: u64,
    /// Merged over the built-in template table by model name.
    pub templates: BTreeMap<String, CardTemplate>,
    pub translation: TranslationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            anki_connect_url: DEFAULT_ANKI_CONNECT_URL.to_string(),
            request_timeout_secs: 30,
            templates: BTreeMap::new(),
            translation: TranslationConfig::default(),
        }
    }
}

impl Config {
    /// Explicit path, else `config.json` in the app data dir, else defaults.
    /// `ANKICONNECT_URL` overrides the configured endpoint.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config: Config = match explicit_path {
            Some(path) => persistence::load_json_from(path)?,
            None => persistence::load_json(CONFIG_FILE_NAME)?,
        };

        if let Ok(url) = env::var("ANKICONNECT_URL") {
            if !url.trim().is_empty() {
                config.anki_connect_url = url;
            }
        }
        if config.translation.backend.auth_key.is_none() {
            config.translation.backend.auth_key =
                env::var("DEEPL_AUTH_KEY").ok().filter(|key| !key.trim().is_empty());
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub rules: FieldRules,
    pub retry_count: u32,
    pub retry_delay_secs: u64,
    pub max_chunk_len: usize,
    pub backend: TranslationBackend,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            rules: FieldRules::default(),
            retry_count: 20,
            retry_delay_secs: 5,
            max_chunk_len: 4500,
            backend: TranslationBackend::default(),
        }
    }
}

impl TranslationConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationBackend {
    pub api_url: String,
    pub auth_key: Option<String>,
    pub proxy: Option<String>,
}

impl Default for TranslationBackend {
    fn default() -> Self {
        Self { api_url: DEFAULT_DEEPL_API_URL.to_string(), auth_key: None, proxy: None }
    }
}

/// Which fields get translated, and how. Rules are checked in declaration
/// order and the first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldRules {
    pub skip_fields: BTreeSet<String>,
    pub skip_prefixes: Vec<String>,
    pub html_fields: BTreeSet<String>,
    pub html_fields_by_model: BTreeMap<String, BTreeSet<String>>,
    pub plain_fields: BTreeSet<String>,
}

const DEFAULT_SKIP_FIELDS: &[&str] = &[
    "Source",
    "Version",
    "Sequence",
    "Audio",
    "Image",
    "QuestionLink",
    "References",
    "Other-Front",
    "Other-Back",
];

impl Default for FieldRules {
    fn default() -> Self {
        let mut html_fields_by_model = BTreeMap::new();
        html_fields_by_model.insert("InfoNote".to_string(), BTreeSet::from(["Text".to_string()]));

        Self {
            skip_fields: DEFAULT_SKIP_FIELDS.iter().map(|s| s.to_string()).collect(),
            skip_prefixes: vec!["Jlab-".to_string()],
            html_fields: BTreeSet::from(["RemarksFront".to_string(), "RemarksBack".to_string()]),
            html_fields_by_model,
            plain_fields: BTreeSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "request_timeout_secs": 5,
                "templates": {"Basic": {"front": "{{Front}}", "back": "{{Back}}", "styling": ".card {}"}},
                "translation": {"retry_count": 3}
            }"#,
        )
        .unwrap();

        let config: Config = persistence::load_json_from(&path).unwrap();
        assert_eq!(config.anki_connect_url, DEFAULT_ANKI_CONNECT_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.templates["Basic"].front, "{{Front}}");
        assert_eq!(config.translation.retry_count, 3);
        assert_eq!(config.translation.max_chunk_len, 4500);
        assert!(config.translation.rules.skip_fields.contains("Source"));
    }

    #[test]
    fn test_missing_config_file_is_default() {
        let dir = tempdir().unwrap();
        let config: Config = persistence::load_json_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(persistence::load_json_from::<Config>(&path).is_err());
    }
}
