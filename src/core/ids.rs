//! Stable identifiers for decks, models and notes.
//!
//! Every identifier here is a pure function of a human-meaningful string, so
//! re-running an import on unchanged input produces the same deck, model and
//! note handles. Changing the hash breaks idempotence for existing exports.
//! Collisions in the 31-bit space are possible and are not detected.

use sha1::{
    Digest,
    Sha1,
};
use sha2::Sha256;

const ID_MODULUS: u64 = 1 << 31;

const BASE91_TABLE: &[u8; 91] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!#$%&()*+,-./:;<=>?@[]^_`{|}~";

/// SHA-1 of the UTF-8 bytes, first 4 bytes big-endian, reduced into `[0, 2^31)`.
pub fn derive_id(text: &str) -> i64 {
    let digest = Sha1::digest(text.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    (u64::from(prefix) % ID_MODULUS) as i64
}

pub fn deck_id(deck_name: &str) -> i64 {
    derive_id(deck_name)
}

/// Field names are sorted so discovery order does not change the id.
pub fn schema_id<S: AsRef<str>>(model_name: &str, field_names: &[S]) -> i64 {
    let mut sorted: Vec<&str> = field_names.iter().map(|f| f.as_ref()).collect();
    sorted.sort_unstable();
    derive_id(&format!("{}{}", model_name, sorted.join(",")))
}

/// Note handle derived from the source note id, rendered in Anki's base-91
/// alphabet so the target application's duplicate check recognises re-imports.
pub fn guid_for(note_key: &str) -> String {
    let digest = Sha256::digest(note_key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let mut value = u64::from_be_bytes(prefix);

    let mut reversed = Vec::new();
    while value > 0 {
        reversed.push(BASE91_TABLE[(value % 91) as usize] as char);
        value /= 91;
    }
    reversed.iter().rev().collect()
}

/// First 8 hex digits of the SHA-1 of `text`, as stored in a note's `csum`.
pub fn field_checksum(text: &str) -> i64 {
    let digest = Sha1::digest(text.as_bytes());
    i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}
