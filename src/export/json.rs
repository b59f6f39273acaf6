//! Export of notes into the portable form: `notes_data.json` plus a flat
//! `media/` folder.

use std::{
    collections::{
        HashMap,
        HashSet,
    },
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use base64::{
    engine::general_purpose::STANDARD,
    Engine,
};
use log::{
    debug,
    info,
    warn,
};
use serde_json::{
    Map,
    Value,
};

use crate::{
    anki::{
        deck_query,
        tag_query,
        NoteInfo,
        NoteService,
    },
    core::{
        media::{
            extract_media_filenames,
            MediaCache,
        },
        models::{
            export_folder_name,
            save_notes,
            MEDIA_DIR_NAME,
            NOTES_FILE_NAME,
        },
        AnkiportError,
        PortableNote,
        Result,
    },
};

/// What to export: a whole deck or everything carrying a tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Deck(String),
    Tag(String),
}

impl Selection {
    pub fn query(&self) -> String {
        match self {
            Selection::Deck(name) => deck_query(name),
            Selection::Tag(tag) => tag_query(tag),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Selection::Deck(name) | Selection::Tag(name) => name,
        }
    }

    pub fn default_output_dir(&self) -> PathBuf {
        PathBuf::from(export_folder_name(self.name()))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    pub notes: Vec<PortableNote>,
    pub skipped_notes: Vec<u64>,
    pub saved_media: Vec<String>,
    pub failed_media: Vec<String>,
    pub json_path: Option<PathBuf>,
}

/// Fetches every note behind `selection`, downloads the media they reference
/// and writes the portable document under `output_dir`.
///
/// Only an unreachable service aborts the run. A note or media file that
/// cannot be fetched is logged and skipped.
pub fn export_notes<S: NoteService + ?Sized>(
    service: &S,
    selection: &Selection,
    output_dir: &Path,
) -> Result<ExportReport> {
    let query = selection.query();
    debug!("Finding cards with query: '{}'", query);
    let card_ids = service.find_cards(&query)?;
    if card_ids.is_empty() {
        info!("No cards found for '{}'. Nothing to export.", selection.name());
        return Ok(ExportReport::default());
    }

    let note_ids = unique_in_order(service.cards_to_notes(&card_ids)?);
    info!("Found {} cards belonging to {} unique notes", card_ids.len(), note_ids.len());

    let media_dir = output_dir.join(MEDIA_DIR_NAME);
    fs::create_dir_all(&media_dir)?;

    let mut report = ExportReport::default();
    let mut cache = MediaCache::new();
    let mut field_orders: HashMap<String, Option<Vec<String>>> = HashMap::new();

    for (index, note_id) in note_ids.iter().enumerate() {
        debug!("Processing note {}/{} (note id {})", index + 1, note_ids.len(), note_id);

        let info = match service.notes_info(&[*note_id]) {
            Ok(infos) => infos.into_iter().next(),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("Could not retrieve info for note {}: {}", note_id, e);
                None
            }
        };
        let Some(info) = info else {
            warn!("Skipping note {}: no note info available", note_id);
            report.skipped_notes.push(*note_id);
            continue;
        };

        if info.model_name.is_empty() {
            warn!("Skipping note {}: no modelName", note_id);
            report.skipped_notes.push(*note_id);
            continue;
        }

        if !field_orders.contains_key(&info.model_name) {
            let declared = declared_field_order(service, &info.model_name)?;
            field_orders.insert(info.model_name.clone(), declared);
        }
        let declared = field_orders.get(&info.model_name).and_then(|o| o.as_deref());

        let fields = ordered_fields(&info, declared);
        if fields.is_empty() {
            warn!("Skipping note {}: no accessible fields", note_id);
            report.skipped_notes.push(*note_id);
            continue;
        }

        for value in fields.values().filter_map(Value::as_str) {
            for filename in extract_media_filenames(value) {
                if cache.is_attempted(&filename) {
                    debug!("Media '{}' already handled, not fetching again", filename);
                    continue;
                }
                match download_media(service, &filename, &media_dir) {
                    Ok(()) => cache.mark_saved(&filename),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!("Failed to fetch media '{}' for note {}: {}", filename, note_id, e);
                        cache.mark_failed(&filename);
                    }
                }
            }
        }

        report.notes.push(PortableNote {
            note_id: Some(*note_id),
            model_name: Some(info.model_name.clone()),
            tags: info.tags.clone(),
            fields,
        });
    }

    let json_path = output_dir.join(NOTES_FILE_NAME);
    save_notes(&report.notes, &json_path)?;

    report.saved_media = cache.saved().iter().cloned().collect();
    report.failed_media = cache.failed().iter().cloned().collect();
    report.json_path = Some(json_path.clone());

    info!("Exported {} notes to '{}'", report.notes.len(), json_path.display());
    info!("Saved {} media files to '{}'", report.saved_media.len(), media_dir.display());
    if !report.skipped_notes.is_empty() {
        warn!("Skipped {} notes: {:?}", report.skipped_notes.len(), report.skipped_notes);
    }
    if !report.failed_media.is_empty() {
        warn!("{} media files could not be saved: {:?}", report.failed_media.len(), report.failed_media);
    }

    Ok(report)
}

/// Removes repeated ids, keeping the first occurrence.
pub fn unique_in_order(ids: Vec<u64>) -> Vec<u64> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn declared_field_order<S: NoteService + ?Sized>(
    service: &S,
    model_name: &str,
) -> Result<Option<Vec<String>>> {
    match service.model_field_names(model_name) {
        Ok(names) if !names.is_empty() => Ok(Some(names)),
        Ok(_) => Ok(None),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            debug!("Falling back to note field order for '{}': {}", model_name, e);
            Ok(None)
        }
    }
}

/// Declared model order first, then any remaining fields by their `order`.
fn ordered_fields(info: &NoteInfo, declared: Option<&[String]>) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(declared) = declared {
        for name in declared {
            if let Some(field) = info.fields.get(name) {
                fields.insert(name.clone(), Value::String(field.value.clone()));
            }
        }
    }
    for (name, field) in info.ordered_fields() {
        if !name.is_empty() && !fields.contains_key(name) {
            fields.insert(name.clone(), Value::String(field.value.clone()));
        }
    }
    fields
}

/// Retrieves one media file and writes it under `media_dir` by its bare name.
pub fn download_media<S: NoteService + ?Sized>(
    service: &S,
    filename: &str,
    media_dir: &Path,
) -> Result<()> {
    let bytes = retrieve_media_bytes(service, filename)?;
    let media_path = media_dir.join(filename);
    fs::write(&media_path, bytes)?;
    debug!("Saved '{}' to '{}'", filename, media_path.display());
    Ok(())
}

pub fn retrieve_media_bytes<S: NoteService + ?Sized>(service: &S, filename: &str) -> Result<Vec<u8>> {
    let encoded = service.retrieve_media_file(filename)?.unwrap_or_default();
    if encoded.is_empty() {
        return Err(AnkiportError::Custom(format!(
            "'{filename}' does not exist in the media collection or is empty"
        )));
    }
    Ok(STANDARD.decode(encoded.trim())?)
}
