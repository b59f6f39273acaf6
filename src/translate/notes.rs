//! Incremental translation of a portable document: one `note_<id>.json` per
//! translated note, assembled into a single document at the end.

use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
};

use log::{
    error,
    info,
    warn,
};
use serde_json::Value;

use super::{
    html::translate_html,
    routing::{
        route,
        FieldAction,
    },
    TranslationSession,
    Translator,
};
use crate::core::{
    config::FieldRules,
    models::{
        load_notes,
        save_notes,
    },
    AnkiportError,
    PortableNote,
    Result,
};

pub const DEFAULT_NOTES_DIR: &str = "translated_notes_output";
pub const DEFAULT_ASSEMBLED_NAME: &str = "translated_notes_data.json";

#[derive(Debug, Clone, PartialEq)]
pub struct TranslateOptions {
    /// Directory holding the per-note files.
    pub notes_dir: PathBuf,
    pub assembled_path: PathBuf,
    pub force: bool,
    pub note_id: Option<u64>,
    pub assemble_only: bool,
}

impl TranslateOptions {
    /// Per-note files and the assembled document go next to the input.
    pub fn beside(input_json: &Path) -> Self {
        let dir = input_json.parent().unwrap_or_else(|| Path::new(""));
        Self {
            notes_dir: dir.join(DEFAULT_NOTES_DIR),
            assembled_path: dir.join(DEFAULT_ASSEMBLED_NAME),
            force: false,
            note_id: None,
            assemble_only: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslateReport {
    pub translated: usize,
    pub already_done: usize,
    pub failed: usize,
    pub assembled: usize,
}

pub fn note_file_name(note_id: u64) -> String {
    format!("note_{}.json", note_id)
}

/// Copy of `note` with routed fields translated. Non-string values and blank
/// fields are copied as they are.
pub fn translate_note<T: Translator>(
    note: &PortableNote,
    rules: &FieldRules,
    session: &TranslationSession<T>,
) -> PortableNote {
    let model_name = note.model_name.as_deref().unwrap_or("");
    let mut translated = note.clone();

    for (name, value) in translated.fields.iter_mut() {
        let Some(text) = value.as_str().filter(|t| !t.trim().is_empty()) else {
            continue;
        };
        let result = match route(rules, model_name, name) {
            FieldAction::Copy => continue,
            FieldAction::Html => {
                info!("Translating HTML field '{}' of note {}", name, note.display_id());
                translate_html(text, session)
            }
            FieldAction::Plain => {
                info!("Translating field '{}' of note {}", name, note.display_id());
                session.translate_text(text)
            }
        };
        *value = Value::String(result);
    }
    translated
}

/// Returns `Ok(false)` when the note is skipped because its file exists.
fn process_note<T: Translator>(
    note: &PortableNote,
    id: u64,
    options: &TranslateOptions,
    rules: &FieldRules,
    session: &TranslationSession<T>,
) -> Result<bool> {
    let path = options.notes_dir.join(note_file_name(id));
    if path.exists() && !options.force {
        info!("Skipping note {}: '{}' already exists (use --force to redo)", id, path.display());
        return Ok(false);
    }

    info!("Processing note {} (model: {})", id, note.model_name.as_deref().unwrap_or("?"));
    let translated = translate_note(note, rules, session);
    fs::write(&path, serde_json::to_string_pretty(&translated)?)?;
    info!("Saved translated note {} to '{}'", id, path.display());
    Ok(true)
}

/// Concatenates `note_*.json` files in file-name order. Unreadable files are
/// logged and left out. Nothing is written when there are no files.
pub fn assemble_notes(notes_dir: &Path, output: &Path) -> Result<usize> {
    info!("Assembling translated notes from '{}' into '{}'", notes_dir.display(), output.display());

    let mut files: Vec<PathBuf> = fs::read_dir(notes_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("note_") && n.ends_with(".json"))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        warn!("No note files found in '{}' to assemble", notes_dir.display());
        return Ok(0);
    }

    let mut notes = Vec::with_capacity(files.len());
    for path in &files {
        let parsed = fs::read_to_string(path)
            .map_err(AnkiportError::from)
            .and_then(|content| serde_json::from_str::<PortableNote>(&content).map_err(AnkiportError::from));
        match parsed {
            Ok(note) => notes.push(note),
            Err(e) => error!("Could not load note file '{}': {}. Skipping it.", path.display(), e),
        }
    }

    save_notes(&notes, output)?;
    info!("Assembled {} notes into '{}'", notes.len(), output.display());
    Ok(notes.len())
}

pub fn run_translation<T: Translator>(
    input_json: &Path,
    options: &TranslateOptions,
    rules: &FieldRules,
    session: &TranslationSession<T>,
) -> Result<TranslateReport> {
    fs::create_dir_all(&options.notes_dir)?;
    info!("Per-note translations are stored in '{}'", options.notes_dir.display());

    let mut report = TranslateReport::default();
    if options.assemble_only {
        info!("Assemble-only mode, skipping translation");
        report.assembled = assemble_notes(&options.notes_dir, &options.assembled_path)?;
        return Ok(report);
    }

    let notes = load_notes(input_json)?;
    if notes.is_empty() {
        info!("No notes in '{}', nothing to translate", input_json.display());
        return Ok(report);
    }

    let selected: Vec<&PortableNote> = match options.note_id {
        Some(id) => {
            let note = notes.iter().find(|n| n.note_id == Some(id)).ok_or_else(|| {
                AnkiportError::InvalidInput(format!("note {} not found in '{}'", id, input_json.display()))
            })?;
            info!("Processing only note {}", id);
            vec![note]
        }
        None => {
            info!("Processing all {} notes", notes.len());
            notes.iter().collect()
        }
    };

    for (index, note) in selected.iter().enumerate() {
        info!("Note {}/{}", index + 1, selected.len());
        let Some(id) = note.note_id else {
            warn!("Skipping note at position {}: no noteId to name its file", index + 1);
            report.failed += 1;
            continue;
        };
        match process_note(note, id, options, rules, session) {
            Ok(true) => report.translated += 1,
            Ok(false) => report.already_done += 1,
            Err(e) => {
                error!("Failed to save translated note {}: {}", id, e);
                report.failed += 1;
            }
        }
    }
    info!(
        "Translation phase complete: {} translated, {} already done, {} failed",
        report.translated, report.already_done, report.failed
    );

    report.assembled = assemble_notes(&options.notes_dir, &options.assembled_path)?;
    Ok(report)
}
