use log::debug;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde_json::{
    json,
    Value,
};

use super::{
    types::{
        ApiResponse,
        CardInfo,
        NewNote,
        NoteInfo,
    },
    NoteService,
};
use crate::core::{
    http::{
        ensure_success,
        http_client,
    },
    AnkiportError,
    Config,
    Result,
};

const API_VERSION: u32 = 6;

/// Blocking client for the AnkiConnect add-on.
pub struct AnkiConnect {
    client: Client,
    url: String,
}

impl AnkiConnect {
    pub fn new(url: &str, client: Client) -> Self {
        Self { client, url: url.to_string() }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http_client(config.request_timeout())?;
        Ok(Self::new(&config.anki_connect_url, client))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn make_request<T: DeserializeOwned>(&self, action: &str, params: Option<Value>) -> Result<T> {
        let mut body = serde_json::Map::new();
        body.insert("action".to_string(), Value::String(action.to_string()));
        body.insert("version".to_string(), Value::Number(API_VERSION.into()));
        body.insert("params".to_string(), params.unwrap_or_else(|| json!({})));

        debug!("Invoking AnkiConnect action '{}'", action);
        let response =
            self.client.post(&self.url).json(&body).send().map_err(|e| transport_error(&self.url, e))?;
        ensure_success(&response)?;

        let response: ApiResponse = response.json()?;
        unwrap_result(action, response)
    }

    /// Used to check that AnkiConnect is reachable before a run starts.
    pub fn version(&self) -> Result<u32> {
        self.make_request("version", None)
    }
}

/// A service that refuses connections or stops answering cannot serve the
/// rest of the run either.
fn transport_error(url: &str, error: reqwest::Error) -> AnkiportError {
    if error.is_connect() || error.is_timeout() {
        AnkiportError::Unreachable { url: url.to_string(), reason: error.to_string() }
    } else {
        AnkiportError::from(error)
    }
}

/// A non-null `error` becomes [`AnkiportError::AnkiConnect`]; a missing
/// `result` is decoded from `null`.
pub fn unwrap_result<T: DeserializeOwned>(action: &str, response: ApiResponse) -> Result<T> {
    if let Some(message) = response.error {
        return Err(AnkiportError::AnkiConnect { action: action.to_string(), message });
    }
    let result = response.result.unwrap_or(Value::Null);
    serde_json::from_value(result).map_err(|e| AnkiportError::AnkiConnect {
        action: action.to_string(),
        message: format!("unexpected result shape: {e}"),
    })
}

impl NoteService for AnkiConnect {
    fn find_cards(&self, query: &str) -> Result<Vec<u64>> {
        self.make_request("findCards", Some(json!({ "query": query })))
    }

    fn cards_to_notes(&self, card_ids: &[u64]) -> Result<Vec<u64>> {
        self.make_request("cardsToNotes", Some(json!({ "cards": card_ids })))
    }

    fn cards_info(&self, card_ids: &[u64]) -> Result<Vec<CardInfo>> {
        self.make_request("cardsInfo", Some(json!({ "cards": card_ids })))
    }

    fn notes_info(&self, note_ids: &[u64]) -> Result<Vec<NoteInfo>> {
        self.make_request("notesInfo", Some(json!({ "notes": note_ids })))
    }

    fn model_field_names(&self, model_name: &str) -> Result<Vec<String>> {
        self.make_request("modelFieldNames", Some(json!({ "modelName": model_name })))
    }

    fn retrieve_media_file(&self, filename: &str) -> Result<Option<String>> {
        // AnkiConnect answers `false` for files it does not have.
        let value: Value =
            self.make_request("retrieveMediaFile", Some(json!({ "filename": filename })))?;
        Ok(value.as_str().map(ToOwned::to_owned))
    }

    fn deck_names(&self) -> Result<Vec<String>> {
        self.make_request("deckNames", None)
    }

    fn create_deck(&self, deck_name: &str) -> Result<u64> {
        self.make_request("createDeck", Some(json!({ "deck": deck_name })))
    }

    fn add_notes(&self, notes: &[NewNote]) -> Result<Vec<Option<u64>>> {
        self.make_request("addNotes", Some(json!({ "notes": notes })))
    }

    fn get_tags(&self) -> Result<Vec<String>> {
        self.make_request("getTags", None)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::TcpListener,
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_refused_connection_is_unreachable() {
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let anki = AnkiConnect::new(&url, http_client(Duration::from_secs(5)).unwrap());

        let err = anki.version().unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, AnkiportError::Unreachable { url: ref u, .. } if u == &url));
    }

    #[test]
    fn test_silent_service_times_out_as_unreachable() {
        // Accepted by the backlog, never answered.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let anki = AnkiConnect::new(&url, http_client(Duration::from_millis(200)).unwrap());

        let err = anki.find_cards("deck:current").unwrap_err();
        assert!(err.is_fatal());
        drop(listener);
    }

    #[test]
    fn test_unwrap_result_success() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"result": [1, 2, 3], "error": null}"#).unwrap();
        let ids: Vec<u64> = unwrap_result("findCards", response).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_unwrap_result_error_is_recoverable() {
        let response: ApiResponse =
            serde_json::from_str(r#"{"result": null, "error": "model was not found"}"#).unwrap();
        let err = unwrap_result::<Vec<String>>("modelFieldNames", response).unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(err, AnkiportError::AnkiConnect { ref action, .. } if action == "modelFieldNames"));
    }

    #[test]
    fn test_unwrap_result_null_into_option() {
        let response: ApiResponse = serde_json::from_str(r#"{"result": null, "error": null}"#).unwrap();
        let value: Option<String> = unwrap_result("retrieveMediaFile", response).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_unwrap_result_wrong_shape() {
        let response: ApiResponse = serde_json::from_str(r#"{"result": "text", "error": null}"#).unwrap();
        assert!(unwrap_result::<Vec<u64>>("findCards", response).is_err());
    }
}
