use std::{
    collections::{
        BTreeSet,
        HashMap,
    },
    path::{
        Path,
        PathBuf,
    },
};

use log::{
    info,
    warn,
};
use serde_json::Value;

use super::templates::TemplateTable;
use crate::core::{
    config::CardTemplate,
    ids::{
        deck_id,
        guid_for,
        schema_id,
    },
    media::extract_media_filenames,
    models::field_value_to_string,
    PortableNote,
};

/// A note type as it is written into the package.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteModel {
    pub id: i64,
    pub name: String,
    pub fields: Vec<String>,
    pub template: CardTemplate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackagedNote {
    pub guid: String,
    pub model_id: i64,
    /// Values in the model's field order.
    pub fields: Vec<String>,
    pub tags: Vec<String>,
}

/// Everything that goes into one package file.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckPackage {
    pub deck_id: i64,
    pub deck_name: String,
    pub models: Vec<NoteModel>,
    pub notes: Vec<PackagedNote>,
    /// Deduplicated by path.
    pub media: BTreeSet<PathBuf>,
}

pub struct PackageBuilder<'a> {
    templates: &'a TemplateTable,
    media_dir: PathBuf,
    deck_id: i64,
    deck_name: String,
    models: Vec<NoteModel>,
    model_index: HashMap<String, usize>,
    notes: Vec<PackagedNote>,
    media: BTreeSet<PathBuf>,
    skipped: Vec<String>,
    missing_media: BTreeSet<String>,
}

impl<'a> PackageBuilder<'a> {
    pub fn new(deck_name: &str, media_dir: &Path, templates: &'a TemplateTable) -> Self {
        Self {
            templates,
            media_dir: media_dir.to_path_buf(),
            deck_id: deck_id(deck_name),
            deck_name: deck_name.to_string(),
            models: Vec::new(),
            model_index: HashMap::new(),
            notes: Vec::new(),
            media: BTreeSet::new(),
            skipped: Vec::new(),
            missing_media: BTreeSet::new(),
        }
    }

    /// Adds one note. Returns `false` when the note is skipped.
    pub fn add_note(&mut self, note: &PortableNote) -> bool {
        let Some(model_name) = note.model_name.as_deref().filter(|m| !m.is_empty()) else {
            warn!("Skipping note {}: missing modelName", note.display_id());
            self.skipped.push(note.display_id());
            return false;
        };

        let Some(model) = self.model_for(model_name, note) else {
            warn!("Skipping note {}: model '{}' has no fields", note.display_id(), model_name);
            self.skipped.push(note.display_id());
            return false;
        };

        let fields: Vec<String> = model
            .fields
            .iter()
            .map(|name| note.fields.get(name).map(field_value_to_string).unwrap_or_default())
            .collect();
        // Only packaged fields count; non-string values carry no references.
        let referenced: BTreeSet<String> = model
            .fields
            .iter()
            .filter_map(|name| note.fields.get(name).and_then(Value::as_str))
            .flat_map(extract_media_filenames)
            .collect();
        let model_id = model.id;

        for name in referenced {
            let path = self.media_dir.join(&name);
            if path.is_file() {
                self.media.insert(path);
            } else {
                warn!(
                    "Media file not found: '{}' for note {}. It will not be included in the package.",
                    path.display(),
                    note.display_id()
                );
                self.missing_media.insert(name);
            }
        }

        self.notes.push(PackagedNote { guid: note_guid(note), model_id, fields, tags: note.tags.clone() });
        true
    }

    /// Cached model for `model_name`, built from the first note seen with it.
    fn model_for(&mut self, model_name: &str, first_note: &PortableNote) -> Option<&NoteModel> {
        if let Some(&index) = self.model_index.get(model_name) {
            return self.models.get(index);
        }

        let field_names: Vec<String> = first_note.fields.keys().cloned().collect();
        if field_names.is_empty() {
            return None;
        }

        let model = NoteModel {
            id: schema_id(model_name, &field_names),
            name: model_name.to_string(),
            template: self.templates.resolve(model_name, &field_names),
            fields: field_names,
        };
        info!("Created model '{}' (ID: {}) with fields: {}", model.name, model.id, model.fields.join(", "));

        self.model_index.insert(model_name.to_string(), self.models.len());
        self.models.push(model);
        self.models.last()
    }

    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn missing_media(&self) -> &BTreeSet<String> {
        &self.missing_media
    }

    pub fn finish(self) -> DeckPackage {
        DeckPackage {
            deck_id: self.deck_id,
            deck_name: self.deck_name,
            models: self.models,
            notes: self.notes,
            media: self.media,
        }
    }
}

/// Notes without a source id fall back to a handle over their field values,
/// which still keeps re-imports of unchanged content stable.
fn note_guid(note: &PortableNote) -> String {
    match note.note_id {
        Some(id) => guid_for(&id.to_string()),
        None => {
            let content: Vec<String> = note.fields.values().map(field_value_to_string).collect();
            guid_for(&content.join("\u{1f}"))
        }
    }
}
