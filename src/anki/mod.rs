//! Boundary to the note-database service (AnkiConnect).

use log::info;

use crate::core::Result;

pub mod api;
pub mod types;

pub use api::AnkiConnect;
pub use types::{
    AddNoteOptions,
    CardInfo,
    Field,
    NewNote,
    NoteInfo,
};

/// The service actions the utilities consume.
///
/// A non-null `error` from the service surfaces as a recoverable
/// `AnkiportError::AnkiConnect`; a connection failure surfaces as the fatal
/// `AnkiportError::Unreachable`.
pub trait NoteService {
    fn find_cards(&self, query: &str) -> Result<Vec<u64>>;
    fn cards_to_notes(&self, card_ids: &[u64]) -> Result<Vec<u64>>;
    fn cards_info(&self, card_ids: &[u64]) -> Result<Vec<CardInfo>>;
    fn notes_info(&self, note_ids: &[u64]) -> Result<Vec<NoteInfo>>;
    fn model_field_names(&self, model_name: &str) -> Result<Vec<String>>;
    /// Base64 content, or `None` when the service has no such file.
    fn retrieve_media_file(&self, filename: &str) -> Result<Option<String>>;
    fn deck_names(&self) -> Result<Vec<String>>;
    fn create_deck(&self, deck_name: &str) -> Result<u64>;
    fn add_notes(&self, notes: &[NewNote]) -> Result<Vec<Option<u64>>>;
    fn get_tags(&self) -> Result<Vec<String>>;
}

pub fn check_connection(anki: &AnkiConnect) -> Result<()> {
    let version = anki.version()?;
    info!("AnkiConnect is online at {} (API version {})", anki.url(), version);
    Ok(())
}

/// `deck:"Name"` / `tag:"a::b"` style search clauses.
pub fn deck_query(deck_name: &str) -> String {
    format!("deck:\"{}\"", deck_name.replace('"', "\\\""))
}

pub fn tag_query(tag: &str) -> String {
    format!("tag:\"{}\"", tag.replace('"', "\\\""))
}
