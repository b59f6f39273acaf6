//! Copies notes carrying a set of tags into another deck.

use log::info;
use rand::{
    seq::SliceRandom,
    Rng,
};
use serde_json::{
    Map,
    Value,
};

use crate::{
    anki::{
        tag_query,
        AddNoteOptions,
        NewNote,
        NoteInfo,
        NoteService,
    },
    core::Result,
    export::json::unique_in_order,
};

/// Field that receives the hidden marker keeping copies apart from originals.
const MARKED_FIELD: &str = "text";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloneReport {
    pub matched_cards: usize,
    pub source_notes: usize,
    pub deck_created: bool,
    pub added: Vec<Option<u64>>,
}

/// `tag:"a" tag:"b"`: cards must carry every tag.
pub fn all_tags_query(tags: &[String]) -> String {
    tags.iter().map(|t| tag_query(t)).collect::<Vec<_>>().join(" ")
}

pub fn duplicate_marker<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("<span style=\"display:none;\">&#8204;{}</span>", rng.random_range(100000..=999999))
}

pub fn cloned_note<R: Rng + ?Sized>(note: &NoteInfo, target_deck: &str, rng: &mut R) -> NewNote {
    let mut fields = Map::new();
    for (name, field) in note.ordered_fields() {
        let mut text = field.value.clone();
        if name.eq_ignore_ascii_case(MARKED_FIELD) {
            text.push_str(&duplicate_marker(rng));
        }
        fields.insert(name.clone(), Value::String(text));
    }

    NewNote {
        deck_name: target_deck.to_string(),
        model_name: note.model_name.clone(),
        fields,
        tags: note.tags.clone(),
        options: AddNoteOptions { allow_duplicate: true, duplicate_scope: "deck".to_string() },
    }
}

pub fn clone_notes_by_tags<S: NoteService + ?Sized, R: Rng + ?Sized>(
    service: &S,
    tags: &[String],
    target_deck: &str,
    shuffle: bool,
    rng: &mut R,
) -> Result<CloneReport> {
    for tag in tags {
        info!("Matching tag #{}", tag);
    }

    let card_ids = service.find_cards(&all_tags_query(tags))?;
    info!("Total cards matching all tags: {}", card_ids.len());
    if card_ids.is_empty() {
        info!("No notes found matching all tags");
        return Ok(CloneReport::default());
    }

    let cards = service.cards_info(&card_ids)?;
    let note_ids = unique_in_order(cards.iter().map(|c| c.note).collect());
    info!("Corresponding unique notes found: {}", note_ids.len());
    let mut notes = service.notes_info(&note_ids)?;

    let deck_created = !service.deck_names()?.iter().any(|d| d == target_deck);
    if deck_created {
        info!("Creating new deck: {}", target_deck);
        service.create_deck(target_deck)?;
    }

    if shuffle {
        notes.shuffle(rng);
    }
    let copies: Vec<NewNote> = notes.iter().map(|note| cloned_note(note, target_deck, rng)).collect();

    info!("Creating {} new notes in '{}'", copies.len(), target_deck);
    let added = service.add_notes(&copies)?;
    info!("Added {} notes", added.iter().filter(|id| id.is_some()).count());

    Ok(CloneReport { matched_cards: card_ids.len(), source_notes: notes.len(), deck_created, added })
}
