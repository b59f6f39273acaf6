use std::collections::HashMap;

use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Map,
    Value,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Field {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub order: u32,
}

impl Field {
    pub fn new(value: &str, order: u32) -> Self {
        Self { value: value.to_string(), order }
    }
}

/// `notesInfo` entry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteInfo {
    pub note_id: u64,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub fields: HashMap<String, Field>,
    #[serde(default)]
    pub cards: Vec<u64>,
}

impl NoteInfo {
    /// Fields sorted by the service's `order`, ties broken by name.
    pub fn ordered_fields(&self) -> Vec<(&String, &Field)> {
        let mut fields: Vec<(&String, &Field)> = self.fields.iter().collect();
        fields.sort_by(|a, b| a.1.order.cmp(&b.1.order).then_with(|| a.0.cmp(b.0)));
        fields
    }
}

/// `cardsInfo` entry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardInfo {
    pub card_id: u64,
    #[serde(default)]
    pub note: u64,
    #[serde(default)]
    pub deck_name: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub fields: HashMap<String, Field>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CardInfo {
    pub fn ordered_fields(&self) -> Vec<(&String, &Field)> {
        let mut fields: Vec<(&String, &Field)> = self.fields.iter().collect();
        fields.sort_by(|a, b| a.1.order.cmp(&b.1.order).then_with(|| a.0.cmp(b.0)));
        fields
    }

    /// Leading component of a nested deck name: `A::B::C` -> `A`.
    pub fn top_level_deck(&self) -> &str {
        self.deck_name.split("::").next().unwrap_or("")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddNoteOptions {
    pub allow_duplicate: bool,
    pub duplicate_scope: String,
}

/// `addNotes` entry.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub deck_name: String,
    pub model_name: String,
    pub fields: Map<String, Value>,
    pub tags: Vec<String>,
    pub options: AddNoteOptions,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}
