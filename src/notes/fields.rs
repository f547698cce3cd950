use std::{
    collections::HashMap,
    sync::OnceLock,
};

use regex::Regex;
use sha2::{
    Digest,
    Sha256,
};

use super::NoteType;
use crate::core::MorphmineError;

/// Separator the host uses inside its serialized field blob.
pub const FIELD_SEPARATOR: char = '\u{1f}';

pub fn split_fields(blob: &str) -> Vec<String> {
    blob.split(FIELD_SEPARATOR).map(|f| f.to_string()).collect()
}

pub fn join_fields(fields: &[String]) -> String {
    fields.join(&FIELD_SEPARATOR.to_string())
}

/// Plain text of a field value: markup removed, common entities decoded.
pub fn strip_html(text: &str) -> String {
    static BLOCKS: OnceLock<Regex> = OnceLock::new();
    static TAGS: OnceLock<Regex> = OnceLock::new();

    let blocks = BLOCKS
        .get_or_init(|| Regex::new(r"(?is)<style.*?</style>|<script.*?</script>").unwrap());
    let tags = TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]+>").unwrap());

    let without_blocks = blocks.replace_all(text, "");
    let without_tags = tags.replace_all(&without_blocks, "");

    without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Change-detection checksum of the sort field, matching the host's
/// first-8-hex-digits convention.
pub fn field_checksum(text: &str) -> i64 {
    let digest = Sha256::digest(strip_html(text).as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as i64
}

/// Outcome of resolving a configured field name against a note type schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldResolution {
    /// The preference is empty: nothing to read or write.
    NotConfigured,
    /// The name does not exist on the note type: a misconfiguration the user
    /// has to fix.
    Missing,
    Index(usize),
}

/// Field-name → column-index resolution is hit for every field of every
/// candidate note but only depends on the note-type schema, so results are
/// cached per (note type, field name). Schema mutation mid-session is out of
/// scope; a new cache is built per recalc pass.
#[derive(Debug, Default)]
pub struct FieldIndexCache {
    cache: HashMap<(i64, String), Option<usize>>,
}

impl FieldIndexCache {
    pub fn new() -> Self {
        FieldIndexCache::default()
    }

    pub fn resolve(&mut self, note_type: &NoteType, field_name: &str) -> FieldResolution {
        if field_name.is_empty() {
            return FieldResolution::NotConfigured;
        }

        let key = (note_type.id, field_name.to_string());
        let index = *self
            .cache
            .entry(key)
            .or_insert_with(|| note_type.fields.iter().position(|f| f == field_name));

        match index {
            Some(index) => FieldResolution::Index(index),
            None => FieldResolution::Missing,
        }
    }

    /// Plain text of one configured field. A name missing from the note type
    /// is fatal (the filter is misconfigured and every later step depends on
    /// the column existing); a resolvable name whose column is absent from
    /// this particular blob is skipped.
    pub fn extract_field_text(
        &mut self,
        note_type: &NoteType,
        field_name: &str,
        fields: &[String],
    ) -> Result<Option<String>, MorphmineError> {
        match self.resolve(note_type, field_name) {
            FieldResolution::NotConfigured => Ok(None),
            FieldResolution::Missing => Err(MorphmineError::NoteFilterFields {
                field_name: field_name.to_string(),
                note_type: note_type.name.clone(),
            }),
            FieldResolution::Index(index) => Ok(fields.get(index).map(|f| strip_html(f))),
        }
    }

    /// Write `value` into the named field if it resolves; unset or unknown
    /// names are ignored.
    pub fn set_field(
        &mut self,
        note_type: &NoteType,
        fields: &mut [String],
        field_name: &str,
        value: &str,
    ) {
        if let FieldResolution::Index(index) = self.resolve(note_type, field_name) {
            if let Some(slot) = fields.get_mut(index) {
                *slot = value.to_string();
            }
        }
    }
}
