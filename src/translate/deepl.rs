use log::info;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;

use super::Translator;
use crate::core::{
    config::TranslationBackend,
    http::{
        ensure_success,
        proxied_http_client,
    },
    AnkiportError,
    Config,
    Result,
};

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    #[serde(default)]
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    text: String,
}

/// Client for the DeepL v2 `translate` endpoint.
pub struct DeepLTranslator {
    client: Client,
    api_url: String,
    auth_key: String,
    source_lang: Option<String>,
    target_lang: String,
}

impl DeepLTranslator {
    pub fn new(
        backend: &TranslationBackend,
        client: Client,
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<Self> {
        let auth_key = backend
            .auth_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AnkiportError::Translation("no DeepL auth key configured".to_string()))?;

        Ok(Self {
            client,
            api_url: backend.api_url.clone(),
            auth_key,
            source_lang: source_lang.map(str::to_uppercase),
            target_lang: target_lang.to_uppercase(),
        })
    }

    pub fn from_config(config: &Config, source_lang: Option<&str>, target_lang: &str) -> Result<Self> {
        let backend = &config.translation.backend;
        let client = proxied_http_client(config.request_timeout(), backend.proxy.as_deref())?;
        if let Some(proxy) = &backend.proxy {
            info!("Using proxy {} for translation requests", proxy);
        }
        info!(
            "Translating from '{}' to '{}'",
            source_lang.unwrap_or("auto"),
            target_lang
        );
        Self::new(backend, client, source_lang, target_lang)
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        let mut body = json!({
            "text": [text],
            "target_lang": self.target_lang,
        });
        if let Some(source) = &self.source_lang {
            body["source_lang"] = json!(source);
        }
        body
    }
}

impl Translator for DeepLTranslator {
    fn translate(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.auth_key))
            .json(&self.request_body(text))
            .send()?;
        ensure_success(&response)?;

        let parsed: DeepLResponse = response.json()?;
        parsed
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| AnkiportError::Translation("DeepL returned no translations".to_string()))
    }
}
