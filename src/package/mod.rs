//! Import of the portable form into a distributable `.apkg` package.

use std::path::{
    Path,
    PathBuf,
};

use log::{
    info,
    warn,
};

use crate::core::{
    models::{
        deck_name_from_folder,
        load_notes,
        MEDIA_DIR_NAME,
    },
    Result,
};

pub mod builder;
pub mod templates;
pub mod writer;

pub use builder::{
    DeckPackage,
    NoteModel,
    PackageBuilder,
    PackagedNote,
};
pub use templates::TemplateTable;
pub use writer::write_package;

pub const DEFAULT_PACKAGE_NAME: &str = "reimported_deck.apkg";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOptions {
    /// Overrides the name derived from the export folder.
    pub deck_name: Option<String>,
    /// Defaults to `media/` next to the notes file.
    pub media_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub deck_name: String,
    pub notes_packaged: usize,
    pub models: usize,
    pub media_packaged: usize,
    pub skipped_notes: Vec<String>,
    pub missing_media: Vec<String>,
    pub package_path: Option<PathBuf>,
}

/// `export_My_Deck/notes_data.json` -> `My Deck`.
pub fn deck_name_for(json_path: &Path) -> String {
    let folder = json_path
        .parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    deck_name_from_folder(&folder)
}

pub fn import_notes(
    json_path: &Path,
    output: &Path,
    options: &ImportOptions,
    templates: &TemplateTable,
) -> Result<ImportReport> {
    info!("Loading notes from {}", json_path.display());
    let notes = load_notes(json_path)?;

    let deck_name = options.deck_name.clone().unwrap_or_else(|| deck_name_for(json_path));
    if notes.is_empty() {
        info!("No notes found in {}, nothing to package", json_path.display());
        return Ok(ImportReport { deck_name, ..Default::default() });
    }

    let media_dir = options.media_dir.clone().unwrap_or_else(|| {
        json_path.parent().unwrap_or_else(|| Path::new("")).join(MEDIA_DIR_NAME)
    });

    info!("Processing {} notes into deck '{}'", notes.len(), deck_name);
    let mut builder = PackageBuilder::new(&deck_name, &media_dir, templates);
    for note in &notes {
        builder.add_note(note);
    }
    let skipped_notes = builder.skipped().to_vec();
    let missing_media: Vec<String> = builder.missing_media().iter().cloned().collect();
    let package = builder.finish();

    info!("Creating package '{}' with {} media files", output.display(), package.media.len());
    write_package(&package, output)?;

    if package.notes.len() != notes.len() {
        warn!("Packaged {} of {} notes ({} skipped)", package.notes.len(), notes.len(), skipped_notes.len());
    }
    info!("Created package {}", output.display());

    Ok(ImportReport {
        deck_name,
        notes_packaged: package.notes.len(),
        models: package.models.len(),
        media_packaged: package.media.len(),
        skipped_notes,
        missing_media,
        package_path: Some(output.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        fs::{
            self,
            File,
        },
        io::Read,
    };

    use rusqlite::Connection;
    use serde_json::{
        Map,
        Value,
    };
    use tempfile::tempdir;
    use zip::ZipArchive;

    use super::*;
    use crate::{
        anki::fake::{
            note_info,
            FakeService,
        },
        core::{
            ids::{
                deck_id,
                guid_for,
            },
            models::save_notes,
            PortableNote,
        },
        export::{
            export_notes,
            Selection,
        },
    };

    struct Unpacked {
        media: BTreeMap<String, String>,
        entries: Vec<String>,
        notes: Vec<(String, i64, String)>,
        model_ids: Vec<String>,
        decks: Map<String, Value>,
        card_decks: Vec<i64>,
    }

    fn unpack(apkg: &Path) -> Unpacked {
        let mut archive = ZipArchive::new(File::open(apkg).unwrap()).unwrap();
        let entries: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();

        let mut media_json = String::new();
        archive.by_name("media").unwrap().read_to_string(&mut media_json).unwrap();
        let media: BTreeMap<String, String> = serde_json::from_str(&media_json).unwrap();

        let dir = tempdir().unwrap();
        let db_path = dir.path().join("collection.anki2");
        let mut db_bytes = Vec::new();
        archive.by_name("collection.anki2").unwrap().read_to_end(&mut db_bytes).unwrap();
        fs::write(&db_path, db_bytes).unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let mut stmt = conn.prepare("SELECT guid, mid, flds FROM notes ORDER BY id").unwrap();
        let notes: Vec<(String, i64, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();

        let (models, decks): (String, String) =
            conn.query_row("SELECT models, decks FROM col", [], |row| Ok((row.get(0)?, row.get(1)?))).unwrap();
        let models: Map<String, Value> = serde_json::from_str(&models).unwrap();
        let decks: Map<String, Value> = serde_json::from_str(&decks).unwrap();

        let mut stmt = conn.prepare("SELECT did FROM cards ORDER BY id").unwrap();
        let card_decks: Vec<i64> = stmt.query_map([], |row| row.get(0)).unwrap().map(|r| r.unwrap()).collect();

        Unpacked { media, entries, notes, model_ids: models.keys().cloned().collect(), decks, card_decks }
    }

    #[test]
    fn test_export_import_preserves_fields() {
        let dir = tempdir().unwrap();
        let service = FakeService::default()
            .with_query("deck:\"Vocab\"", &[10])
            .with_note(note_info(1234, "Basic", &[("Front", "A"), ("Back", "B<img src=\"x.png\">")], &["n5"]), &[10])
            .with_media("x.png", b"\x89PNG\r\n\x1a\nx");

        let export_dir = dir.path().join("export_Vocab");
        let report = export_notes(&service, &Selection::Deck("Vocab".to_string()), &export_dir).unwrap();
        let json_path = report.json_path.unwrap();

        let apkg = dir.path().join("out.apkg");
        let imported =
            import_notes(&json_path, &apkg, &ImportOptions::default(), &TemplateTable::builtin()).unwrap();
        assert_eq!(imported.deck_name, "Vocab");
        assert_eq!(imported.notes_packaged, 1);

        let unpacked = unpack(&apkg);
        assert_eq!(unpacked.media.get("0").map(String::as_str), Some("x.png"));
        assert!(unpacked.entries.contains(&"0".to_string()));

        let (guid, _, flds) = &unpacked.notes[0];
        let fields: Vec<&str> = flds.split('\u{1f}').collect();
        assert_eq!(fields, vec!["A", "B<img src=\"x.png\">"]);
        assert_eq!(guid, &guid_for("1234"));

        assert!(unpacked.decks.contains_key(&deck_id("Vocab").to_string()));
        assert_eq!(unpacked.card_decks, vec![deck_id("Vocab")]);
    }

    #[test]
    fn test_shared_model_written_once() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("export_Shared").join("notes_data.json");
        let notes = vec![
            PortableNote::new(1, "Basic", vec![]).with_field("Front", "a").with_field("Back", "b"),
            PortableNote::new(2, "Basic", vec![]).with_field("Front", "c").with_field("Back", "d"),
        ];
        save_notes(&notes, &json_path).unwrap();

        let apkg = dir.path().join("shared.apkg");
        let report = import_notes(&json_path, &apkg, &ImportOptions::default(), &TemplateTable::builtin()).unwrap();
        assert_eq!(report.models, 1);

        let unpacked = unpack(&apkg);
        assert_eq!(unpacked.model_ids.len(), 1);
        let model_id: i64 = unpacked.model_ids[0].parse().unwrap();
        assert_eq!(unpacked.notes.len(), 2);
        assert!(unpacked.notes.iter().all(|(_, mid, _)| *mid == model_id));
    }

    #[test]
    fn test_missing_media_does_not_block_package() {
        let dir = tempdir().unwrap();
        let service = FakeService::default()
            .with_query("tag:\"broken\"", &[10])
            .with_note(note_info(7, "Basic", &[("Front", "Q"), ("Back", "<img src=\"missing.png\">")], &[]), &[10]);

        let export_dir = dir.path().join("export_broken");
        let exported = export_notes(&service, &Selection::Tag("broken".to_string()), &export_dir).unwrap();
        assert_eq!(exported.notes.len(), 1);
        assert_eq!(exported.failed_media, vec!["missing.png"]);

        let apkg = dir.path().join("broken.apkg");
        let report = import_notes(
            &exported.json_path.unwrap(),
            &apkg,
            &ImportOptions { deck_name: Some("Explicit".to_string()), media_dir: None },
            &TemplateTable::builtin(),
        )
        .unwrap();
        assert_eq!(report.deck_name, "Explicit");
        assert_eq!(report.notes_packaged, 1);
        assert_eq!(report.missing_media, vec!["missing.png"]);

        let unpacked = unpack(&apkg);
        assert!(unpacked.media.is_empty());
        assert_eq!(unpacked.notes.len(), 1);
    }

    #[test]
    fn test_empty_document_writes_nothing() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("notes_data.json");
        fs::write(&json_path, "[]").unwrap();

        let apkg = dir.path().join("empty.apkg");
        let report = import_notes(&json_path, &apkg, &ImportOptions::default(), &TemplateTable::builtin()).unwrap();
        assert_eq!(report.notes_packaged, 0);
        assert!(!apkg.exists());
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("notes_data.json");
        fs::write(&json_path, "{not json").unwrap();

        let apkg = dir.path().join("bad.apkg");
        assert!(import_notes(&json_path, &apkg, &ImportOptions::default(), &TemplateTable::builtin()).is_err());
        assert!(!apkg.exists());
    }

    #[test]
    fn test_deck_name_for() {
        assert_eq!(deck_name_for(Path::new("export_My_Deck/notes_data.json")), "My Deck");
        assert_eq!(deck_name_for(Path::new("notes_data.json")), "Reimported Anki Deck");
    }
}
