//! Restores reference order to a rewritten copy of a portable document.
//!
//! Notes are matched by `noteId`. Reference ids with no target note are
//! reported individually; target notes that no reference id points to are
//! dropped and only show up in the length mismatch. A reference id that
//! repeats emits its target note once per occurrence.

use std::{
    collections::HashMap,
    path::Path,
};

use log::{
    info,
    warn,
};

use crate::core::{
    models::{
        load_notes,
        save_notes,
    },
    PortableNote,
    Result,
};

pub const DEFAULT_REORDER_OUTPUT: &str = "reordered_notes_data.json";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReorderReport {
    pub notes: Vec<PortableNote>,
    /// Reference ids that had no matching target note.
    pub missing_ids: Vec<u64>,
    pub target_len: usize,
}

impl ReorderReport {
    pub fn is_mismatched(&self) -> bool {
        self.notes.len() != self.target_len
    }
}

pub fn reorder_by_reference(reference: &[PortableNote], target: Vec<PortableNote>) -> ReorderReport {
    let target_len = target.len();
    let by_id: HashMap<u64, PortableNote> =
        target.into_iter().filter_map(|note| note.note_id.map(|id| (id, note))).collect();

    info!("Reordering {} notes against {} reference notes", target_len, reference.len());

    let mut report = ReorderReport { target_len, ..Default::default() };
    for (index, reference_note) in reference.iter().enumerate() {
        let Some(id) = reference_note.note_id else {
            warn!("Reference note at index {} has no noteId, ignoring it for ordering", index);
            continue;
        };
        match by_id.get(&id) {
            Some(note) => report.notes.push(note.clone()),
            None => {
                warn!("Note {} from the reference was not found in the target, skipping", id);
                report.missing_ids.push(id);
            }
        }
    }

    if !report.missing_ids.is_empty() {
        warn!("{} reference notes were not found in the target", report.missing_ids.len());
    }
    if report.is_mismatched() {
        warn!(
            "Reordered note count ({}) does not match the target note count ({})",
            report.notes.len(),
            report.target_len
        );
    }
    report
}

/// Malformed input on either side aborts before anything is written.
pub fn reorder_files(reference_path: &Path, target_path: &Path, output_path: &Path) -> Result<ReorderReport> {
    info!("Loading reference notes from '{}'", reference_path.display());
    let reference = load_notes(reference_path)?;
    info!("Loading target notes from '{}'", target_path.display());
    let target = load_notes(target_path)?;

    let report = reorder_by_reference(&reference, target);
    save_notes(&report.notes, output_path)?;
    info!("Saved {} reordered notes to '{}'", report.notes.len(), output_path.display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn note(id: u64, front: &str) -> PortableNote {
        PortableNote::new(id, "Basic", vec![]).with_field("Front", front)
    }

    fn ids(notes: &[PortableNote]) -> Vec<u64> {
        notes.iter().filter_map(|n| n.note_id).collect()
    }

    #[test]
    fn test_follows_reference_order() {
        let reference = vec![note(3, "c"), note(1, "a"), note(2, "b")];
        let target = vec![note(1, "A"), note(2, "B"), note(3, "C")];

        let report = reorder_by_reference(&reference, target);
        assert_eq!(ids(&report.notes), vec![3, 1, 2]);
        assert_eq!(report.notes[0].field_text("Front"), Some("C"));
        assert!(report.missing_ids.is_empty());
        assert!(!report.is_mismatched());
    }

    #[test]
    fn test_missing_reference_id_is_reported() {
        let reference = vec![note(1, "a"), note(2, "b"), note(99, "z")];
        let target = vec![note(2, "B"), note(1, "A"), note(3, "C")];

        let report = reorder_by_reference(&reference, target);
        assert_eq!(ids(&report.notes), vec![1, 2]);
        assert_eq!(report.missing_ids, vec![99]);
        assert_eq!(report.target_len, 3);
        assert!(report.is_mismatched());
    }

    #[test]
    fn test_repeated_reference_id_is_found_each_time() {
        let reference = vec![note(1, "a"), note(1, "a")];
        let report = reorder_by_reference(&reference, vec![note(1, "A")]);
        assert_eq!(ids(&report.notes), vec![1, 1]);
        assert!(report.missing_ids.is_empty());
        assert!(report.is_mismatched());
    }

    #[test]
    fn test_reference_without_id_is_ignored() {
        let reference = vec![PortableNote::default(), note(1, "a")];
        let report = reorder_by_reference(&reference, vec![note(1, "A")]);
        assert_eq!(ids(&report.notes), vec![1]);
        assert!(report.missing_ids.is_empty());
    }

    #[test]
    fn test_reorder_files() {
        let dir = tempdir().unwrap();
        let reference = dir.path().join("notes_data.json");
        let target = dir.path().join("translated.json");
        let output = dir.path().join("out").join(DEFAULT_REORDER_OUTPUT);
        save_notes(&[note(2, "b"), note(1, "a")], &reference).unwrap();
        save_notes(&[note(1, "A"), note(2, "B")], &target).unwrap();

        let report = reorder_files(&reference, &target, &output).unwrap();
        assert_eq!(ids(&report.notes), vec![2, 1]);
        assert_eq!(ids(&load_notes(&output).unwrap()), vec![2, 1]);
    }

    #[test]
    fn test_malformed_target_aborts() {
        let dir = tempdir().unwrap();
        let reference = dir.path().join("notes_data.json");
        let target = dir.path().join("translated.json");
        let output = dir.path().join("out.json");
        save_notes(&[note(1, "a")], &reference).unwrap();
        fs::write(&target, "{\"noteId\": 1}").unwrap();

        assert!(reorder_files(&reference, &target, &output).is_err());
        assert!(!output.exists());
    }
}
