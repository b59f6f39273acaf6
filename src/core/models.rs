use std::{
    fs,
    path::Path,
};

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};

use super::{
    AnkiportError,
    Result,
};

pub const NOTES_FILE_NAME: &str = "notes_data.json";
pub const MEDIA_DIR_NAME: &str = "media";
pub const EXPORT_PREFIX: &str = "export_";
pub const DEFAULT_EXPORT_DIR: &str = "anki_export";
pub const DEFAULT_DECK_NAME: &str = "Reimported Anki Deck";

/// One note in the portable JSON document.
///
/// `fields` keeps insertion order; the first note seen of a model defines that
/// model's field order on import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl PortableNote {
    pub fn new(note_id: u64, model_name: &str, tags: Vec<String>) -> Self {
        Self { note_id: Some(note_id), model_name: Some(model_name.to_string()), tags, fields: Map::new() }
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), Value::String(value.to_string()));
        self
    }

    /// Human-readable key for log lines.
    pub fn display_id(&self) -> String {
        self.note_id.map(|id| id.to_string()).unwrap_or_else(|| "<no id>".to_string())
    }

    /// String content of a field; `None` for absent or non-string values.
    pub fn field_text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Field value as it is carried into a package. Non-strings are stringified and
/// `null` becomes empty.
pub fn field_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Reads a portable document. Unreadable or non-list JSON is fatal.
pub fn load_notes(path: &Path) -> Result<Vec<PortableNote>> {
    let content = fs::read_to_string(path).map_err(|e| {
        AnkiportError::InvalidInput(format!("Failed to read {}: {}", path.display(), e))
    })?;
    parse_notes(&content).map_err(|e| match e {
        AnkiportError::Json(err) => AnkiportError::InvalidInput(format!(
            "Invalid JSON format in {}: {}",
            path.display(),
            err
        )),
        other => other,
    })
}

pub fn parse_notes(content: &str) -> Result<Vec<PortableNote>> {
    let value: Value = serde_json::from_str(content)?;
    if !value.is_array() {
        return Err(AnkiportError::InvalidInput(
            "document does not contain a list of notes".to_string(),
        ));
    }
    Ok(serde_json::from_value(value)?)
}

pub fn save_notes(notes: &[PortableNote], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(notes)?;
    fs::write(path, json)?;
    Ok(())
}

/// `My Deck::Sub` -> `export_My_Deck_Sub`.
pub fn export_folder_name(selection_name: &str) -> String {
    let name = format!("{}{}", EXPORT_PREFIX, selection_name)
        .replace("::", "_")
        .replace(' ', "_");
    let trimmed = name.trim_matches('_');
    if trimmed.is_empty() {
        DEFAULT_EXPORT_DIR.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `export_My_Deck` -> `My Deck`. The export naming loses the difference
/// between `::`, spaces and underscores, so nesting is not restored.
pub fn deck_name_from_folder(folder_name: &str) -> String {
    let name = folder_name.replace(EXPORT_PREFIX, "").replace('_', " ");
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_DECK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_portable_note_serialization() {
        let note = PortableNote::new(42, "Basic", vec!["tag1".to_string()])
            .with_field("Front", "A")
            .with_field("Back", "B");
        let json = serde_json::to_string(&note).unwrap();
        assert!(json.contains("\"noteId\":42"));
        assert!(json.contains("\"modelName\":\"Basic\""));
        assert!(json.find("\"Front\"").unwrap() < json.find("\"Back\"").unwrap());
    }

    #[test]
    fn test_parse_keeps_field_order_and_non_string_values() {
        let notes = parse_notes(
            r#"[{"noteId": 1, "modelName": "M", "tags": [], "fields": {"Z": "z", "A": 5, "M": null}}]"#,
        )
        .unwrap();
        let keys: Vec<&String> = notes[0].fields.keys().collect();
        assert_eq!(keys, vec!["Z", "A", "M"]);
        assert_eq!(notes[0].field_text("A"), None);
        assert_eq!(field_value_to_string(&notes[0].fields["A"]), "5");
        assert_eq!(field_value_to_string(&notes[0].fields["M"]), "");
    }

    #[test]
    fn test_parse_tolerates_missing_optional_keys() {
        let notes = parse_notes(r#"[{"fields": {"Front": "x"}}]"#).unwrap();
        assert_eq!(notes[0].note_id, None);
        assert_eq!(notes[0].model_name, None);
        assert!(notes[0].tags.is_empty());
    }

    #[test]
    fn test_parse_rejects_non_list_documents() {
        assert!(matches!(parse_notes(r#"{"noteId": 1}"#), Err(AnkiportError::InvalidInput(_))));
        assert!(matches!(parse_notes("not json"), Err(AnkiportError::Json(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join(NOTES_FILE_NAME);
        let notes = vec![PortableNote::new(7, "Basic", vec![]).with_field("Front", "日本語")];
        save_notes(&notes, &path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("日本語"));
        assert_eq!(load_notes(&path).unwrap(), notes);
    }

    #[test]
    fn test_load_reports_malformed_json_as_invalid_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "[{").unwrap();
        assert!(matches!(load_notes(&path), Err(AnkiportError::InvalidInput(_))));
    }

    #[test]
    fn test_folder_naming() {
        assert_eq!(export_folder_name("My Deck::Sub"), "export_My_Deck_Sub");
        assert_eq!(export_folder_name("grammar"), "export_grammar");
        assert_eq!(deck_name_from_folder("export_My_Deck_Sub"), "My Deck Sub");
        assert_eq!(deck_name_from_folder("export_"), DEFAULT_DECK_NAME);
    }
}
