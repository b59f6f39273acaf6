//! Serialization of a [`DeckPackage`] into an `.apkg` file: a legacy
//! (schema 11) collection database plus media, zipped together.

use std::{
    fs::{
        self,
        File,
    },
    io::Write,
    path::Path,
    sync::OnceLock,
};

use log::debug;
use regex::Regex;
use rusqlite::{
    params,
    Connection,
};
use serde_json::{
    json,
    Map,
    Value,
};
use zip::{
    write::SimpleFileOptions,
    CompressionMethod,
    ZipWriter,
};

use super::{
    builder::{
        DeckPackage,
        NoteModel,
    },
    templates::referenced_fields,
};
use crate::core::{
    ids::field_checksum,
    Result,
};

pub const COLLECTION_ENTRY: &str = "collection.anki2";
pub const MEDIA_ENTRY: &str = "media";

const FIELD_SEPARATOR: &str = "\u{1f}";
const DEFAULT_DECK_ID: i64 = 1;

const COLLECTION_SCHEMA: &str = r#"
CREATE TABLE col (
    id              integer primary key,
    crt             integer not null,
    mod             integer not null,
    scm             integer not null,
    ver             integer not null,
    dty             integer not null,
    usn             integer not null,
    ls              integer not null,
    conf            text not null,
    models          text not null,
    decks           text not null,
    dconf           text not null,
    tags            text not null
);
CREATE TABLE notes (
    id              integer primary key,
    guid            text not null,
    mid             integer not null,
    mod             integer not null,
    usn             integer not null,
    tags            text not null,
    flds            text not null,
    sfld            text not null,
    csum            integer not null,
    flags           integer not null,
    data            text not null
);
CREATE TABLE cards (
    id              integer primary key,
    nid             integer not null,
    did             integer not null,
    ord             integer not null,
    mod             integer not null,
    usn             integer not null,
    type            integer not null,
    queue           integer not null,
    due             integer not null,
    ivl             integer not null,
    factor          integer not null,
    reps            integer not null,
    lapses          integer not null,
    left            integer not null,
    odue            integer not null,
    odid            integer not null,
    flags           integer not null,
    data            text not null
);
CREATE TABLE revlog (
    id              integer primary key,
    cid             integer not null,
    usn             integer not null,
    ease            integer not null,
    ivl             integer not null,
    lastIvl         integer not null,
    factor          integer not null,
    time            integer not null,
    type            integer not null
);
CREATE TABLE graves (
    usn             integer not null,
    oid             integer not null,
    type            integer not null
);
CREATE INDEX ix_notes_usn on notes (usn);
CREATE INDEX ix_cards_usn on cards (usn);
CREATE INDEX ix_revlog_usn on revlog (usn);
CREATE INDEX ix_cards_nid on cards (nid);
CREATE INDEX ix_cards_sched on cards (did, queue, due);
CREATE INDEX ix_revlog_cid on revlog (cid);
CREATE INDEX ix_notes_csum on notes (csum);
"#;

fn html_tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"))
}

fn strip_html(text: &str) -> String {
    html_tag_regex().replace_all(text, "").trim().to_string()
}

/// ` a b ` as stored in the notes table; empty when there are no tags.
fn format_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        String::new()
    } else {
        format!(" {} ", tags.join(" "))
    }
}

/// `[[0, "any", [field ords]]]` for the single card template. A front that
/// references no known field requires any field to be non-empty.
fn card_requirements(model: &NoteModel) -> Value {
    let referenced = referenced_fields(&model.template.front);
    let mut ords: Vec<usize> = model
        .fields
        .iter()
        .enumerate()
        .filter(|(_, name)| referenced.contains(name))
        .map(|(ord, _)| ord)
        .collect();
    if ords.is_empty() {
        ords = (0..model.fields.len()).collect();
    }
    json!([[0, "any", ords]])
}

fn model_json(model: &NoteModel, deck_id: i64, modified: i64) -> Value {
    let fields: Vec<Value> = model
        .fields
        .iter()
        .enumerate()
        .map(|(ord, name)| {
            json!({
                "name": name,
                "ord": ord,
                "font": "Liberation Sans",
                "media": [],
                "rtl": false,
                "size": 20,
                "sticky": false,
            })
        })
        .collect();

    json!({
        "id": model.id,
        "name": model.name,
        "type": 0,
        "mod": modified,
        "usn": -1,
        "sortf": 0,
        "did": deck_id,
        "tmpls": [{
            "name": "Card 1",
            "ord": 0,
            "qfmt": model.template.front,
            "afmt": model.template.back,
            "bqfmt": "",
            "bafmt": "",
            "did": null,
            "bfont": "",
            "bsize": 0,
        }],
        "flds": fields,
        "css": model.template.styling,
        "latexPre": "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n",
        "latexPost": "\\end{document}",
        "latexsvg": false,
        "req": card_requirements(model),
        "tags": [],
        "vers": [],
    })
}

fn deck_json(id: i64, name: &str, modified: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "desc": "",
        "mod": modified,
        "usn": -1,
        "conf": 1,
        "dyn": 0,
        "collapsed": false,
        "browserCollapsed": false,
        "extendNew": 0,
        "extendRev": 50,
        "newToday": [0, 0],
        "revToday": [0, 0],
        "lrnToday": [0, 0],
        "timeToday": [0, 0],
    })
}

fn deck_config_json() -> Value {
    json!({
        "1": {
            "id": 1,
            "name": "Default",
            "mod": 0,
            "usn": 0,
            "dyn": false,
            "maxTaken": 60,
            "timer": 0,
            "autoplay": true,
            "replayq": true,
            "new": {
                "delays": [1, 10],
                "ints": [1, 4, 7],
                "initialFactor": 2500,
                "order": 1,
                "perDay": 20,
                "bury": true,
                "separate": true,
            },
            "rev": {
                "perDay": 200,
                "ease4": 1.3,
                "fuzz": 0.05,
                "ivlFct": 1,
                "maxIvl": 36500,
                "bury": true,
                "minSpace": 1,
            },
            "lapse": {
                "delays": [10],
                "mult": 0,
                "minInt": 1,
                "leechFails": 8,
                "leechAction": 0,
            },
        }
    })
}

fn collection_conf_json() -> Value {
    json!({
        "activeDecks": [1],
        "curDeck": 1,
        "newSpread": 0,
        "collapseTime": 1200,
        "timeLim": 0,
        "estTimes": true,
        "dueCounts": true,
        "curModel": null,
        "nextPos": 1,
        "sortType": "noteFld",
        "sortBackwards": false,
        "addToCur": true,
    })
}

/// Writes the collection tables for `package` into a fresh database at `path`.
pub fn write_collection(package: &DeckPackage, path: &Path) -> Result<()> {
    let now = chrono::Utc::now();
    let now_secs = now.timestamp();
    let now_millis = now.timestamp_millis();

    let mut models = Map::new();
    for model in &package.models {
        models.insert(model.id.to_string(), model_json(model, package.deck_id, now_secs));
    }
    let mut decks = Map::new();
    decks.insert(DEFAULT_DECK_ID.to_string(), deck_json(DEFAULT_DECK_ID, "Default", 0));
    decks.insert(package.deck_id.to_string(), deck_json(package.deck_id, &package.deck_name, now_secs));

    let mut conn = Connection::open(path)?;
    conn.execute_batch(COLLECTION_SCHEMA)?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
         VALUES (1, ?, ?, ?, 11, 0, 0, 0, ?, ?, ?, ?, '{}')",
        params![
            now_secs,
            now_millis,
            now_millis,
            collection_conf_json().to_string(),
            Value::Object(models).to_string(),
            Value::Object(decks).to_string(),
            deck_config_json().to_string(),
        ],
    )?;

    for (position, note) in package.notes.iter().enumerate() {
        let row_id = now_millis + position as i64;
        let first_field = note.fields.first().map(String::as_str).unwrap_or("");
        tx.execute(
            "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
             VALUES (?, ?, ?, ?, -1, ?, ?, ?, ?, 0, '')",
            params![
                row_id,
                note.guid,
                note.model_id,
                now_secs,
                format_tags(&note.tags),
                note.fields.join(FIELD_SEPARATOR),
                first_field,
                field_checksum(&strip_html(first_field)),
            ],
        )?;
        tx.execute(
            "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl, factor, reps, lapses, left, odue, odid, flags, data)
             VALUES (?, ?, ?, 0, ?, -1, 0, 0, ?, 0, 0, 0, 0, 0, 0, 0, 0, '')",
            params![row_id, row_id, package.deck_id, now_secs, position as i64],
        )?;
    }
    tx.commit()?;

    debug!("Wrote {} notes into {}", package.notes.len(), path.display());
    Ok(())
}

/// Builds the collection in a scratch directory and zips it with the media.
pub fn write_package(package: &DeckPackage, output: &Path) -> Result<()> {
    let scratch = tempfile::tempdir()?;
    let collection_path = scratch.path().join(COLLECTION_ENTRY);
    write_collection(package, &collection_path)?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(output)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(COLLECTION_ENTRY, options)?;
    zip.write_all(&fs::read(&collection_path)?)?;

    let mut media_map = Map::new();
    for (index, path) in package.media.iter().enumerate() {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        media_map.insert(index.to_string(), Value::String(name));

        zip.start_file(index.to_string(), options)?;
        zip.write_all(&fs::read(path)?)?;
    }

    zip.start_file(MEDIA_ENTRY, options)?;
    zip.write_all(Value::Object(media_map).to_string().as_bytes())?;
    zip.finish()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CardTemplate;

    fn model(front: &str, fields: &[&str]) -> NoteModel {
        NoteModel {
            id: 42,
            name: "Basic".to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            template: CardTemplate { front: front.to_string(), back: "{{FrontSide}}".to_string(), styling: String::new() },
        }
    }

    #[test]
    fn test_format_tags() {
        assert_eq!(format_tags(&["a".to_string(), "b::c".to_string()]), " a b::c ");
        assert_eq!(format_tags(&[]), "");
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html("<b>Cat</b><img src=\"x.png\"> "), "Cat");
    }

    #[test]
    fn test_card_requirements() {
        assert_eq!(card_requirements(&model("{{Back}}", &["Front", "Back"])), json!([[0, "any", [1]]]));
        assert_eq!(card_requirements(&model("static text", &["Front", "Back"])), json!([[0, "any", [0, 1]]]));
    }

    #[test]
    fn test_model_json_shape() {
        let value = model_json(&model("{{Front}}", &["Front", "Back"]), 7, 100);
        assert_eq!(value["tmpls"][0]["name"], "Card 1");
        assert_eq!(value["flds"][1]["name"], "Back");
        assert_eq!(value["flds"][1]["ord"], 1);
        assert_eq!(value["did"], 7);
        assert!(value.get("latexPre").is_some());
    }
}
