use std::{
    collections::BTreeSet,
    sync::OnceLock,
};

use regex::Regex;

fn media_src_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?is)<(?:img|audio|video|source)\b[^>]*?\ssrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#,
        )
        .expect("media src pattern is valid")
    })
}

fn sound_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[sound:([^\]]+)\]").expect("sound marker pattern is valid"))
}

/// Decodes the entities an HTML serializer puts in attribute values.
/// `&amp;` goes last so `&amp;lt;` stays `&lt;`.
fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Strips any directory components: `collection.media/a.png` -> `a.png`.
pub fn bare_filename(reference: &str) -> &str {
    reference.rsplit(['/', '\\']).next().unwrap_or(reference).trim()
}

/// Returns the bare filenames referenced by the `src` attribute of
/// `img`/`audio`/`video`/`source` elements and by `[sound:NAME]` markers.
///
/// Matching is case-insensitive on element and attribute names. `src` must
/// stand as its own attribute, so `data-src` is not a reference. Attribute
/// values are entity-decoded (`a&amp;b.png` -> `a&b.png`); marker names are
/// taken as written. Empty references are ignored. The result is
/// duplicate-free and sorted.
pub fn extract_media_filenames(html: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();

    for captures in media_src_regex().captures_iter(html) {
        let reference = captures.get(1).or_else(|| captures.get(2)).or_else(|| captures.get(3));
        if let Some(reference) = reference {
            insert_bare(&mut found, &decode_entities(reference.as_str()));
        }
    }

    for captures in sound_marker_regex().captures_iter(html) {
        insert_bare(&mut found, &captures[1]);
    }

    found
}

fn insert_bare(found: &mut BTreeSet<String>, reference: &str) {
    let name = bare_filename(reference);
    if !name.is_empty() {
        found.insert(name.to_string());
    }
}

/// Which media files one run has already attempted.
///
/// A filename is retrieved at most once per run: the first successful
/// retrieval wins and failures are not retried.
#[derive(Debug, Default)]
pub struct MediaCache {
    saved: BTreeSet<String>,
    failed: BTreeSet<String>,
}

impl MediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attempted(&self, filename: &str) -> bool {
        self.saved.contains(filename) || self.failed.contains(filename)
    }

    pub fn mark_saved(&mut self, filename: &str) {
        self.saved.insert(filename.to_string());
    }

    pub fn mark_failed(&mut self, filename: &str) {
        self.failed.insert(filename.to_string());
    }

    pub fn saved(&self) -> &BTreeSet<String> {
        &self.saved
    }

    pub fn failed(&self) -> &BTreeSet<String> {
        &self.failed
    }
}

/// Magic-byte sniffing for the raster formats a card page can display.
pub fn is_image(bytes: &[u8]) -> bool {
    bytes.starts_with(b"\x89PNG\r\n\x1a\n")
        || bytes.starts_with(b"\xff\xd8\xff")
        || bytes.starts_with(b"GIF87a")
        || bytes.starts_with(b"GIF89a")
        || bytes.starts_with(b"BM")
        || bytes.starts_with(b"II*\0")
        || bytes.starts_with(b"MM\0*")
        || (bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP")
}
