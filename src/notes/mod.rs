use std::collections::HashSet;

use crate::morph::Maturity;

pub mod fields;

pub use fields::{
    field_checksum,
    join_fields,
    split_fields,
    strip_html,
    FieldIndexCache,
    FieldResolution,
};

/// Schema of one note type in the host collection.
#[derive(Debug, Clone)]
pub struct NoteType {
    pub id: i64,
    pub name: String,
    pub fields: Vec<String>,
    /// Index of the field the host sorts its browser on.
    pub sort_field: usize,
}

/// A candidate row for all-db generation: one note plus the maximum maturity
/// across its cards. The store reports interval-0 learning cards as
/// `Maturity::FRESH` so "just graduated" and "never reviewed" stay distinct.
#[derive(Debug, Clone)]
pub struct NoteToUpdate {
    pub note_id: i64,
    pub note_type_id: i64,
    /// All field values joined with the host's field separator.
    pub fields: String,
    pub guid: String,
    pub tags: Vec<String>,
    pub max_maturity: Maturity,
}

/// A candidate row for scoring: one note plus the maximum card type across
/// its cards (0 = new, 1 = learning, 2 = review).
#[derive(Debug, Clone)]
pub struct NoteToModify {
    pub note_id: i64,
    pub note_type_id: i64,
    pub fields: String,
    pub guid: String,
    pub tags: Vec<String>,
    pub max_card_type: u8,
}

/// One row of the unreviewed-card stream.
#[derive(Debug, Clone, Copy)]
pub struct NewCard {
    pub card_id: i64,
    pub note_id: i64,
    pub due: i32,
}

/// A batched note mutation. Only emitted when tags or fields actually
/// changed.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteUpdate {
    pub note_id: i64,
    pub tags: Vec<String>,
    pub fields: String,
    pub sort_field: String,
    pub checksum: i64,
    pub modified: i64,
    pub usn: i32,
}

/// A batched due mutation for one new card.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DueUpdate {
    pub card_id: i64,
    pub due: i32,
    pub modified: i64,
    pub usn: i32,
}

/// What the pipeline needs from the host collection. All reads hand back
/// plain rows; all writes are batched so the host can apply them in one
/// transaction on its own execution context.
pub trait NoteStore: Send {
    fn note_types(&self) -> Vec<NoteType>;

    /// Notes of the given types modified after `last_updated`, one row per
    /// note with its maximum card maturity. With `ignore_suspended_leeches`
    /// the store drops suspended leech cards from consideration.
    fn notes_to_update(
        &self,
        last_updated: i64,
        note_type_ids: &[i64],
        ignore_suspended_leeches: bool,
    ) -> Vec<NoteToUpdate>;

    /// Notes of the given types modified after `last_updated` or explicitly
    /// listed in `refresh_note_ids`, one row per note with its maximum card
    /// type.
    fn notes_to_modify(
        &self,
        last_updated: i64,
        note_type_ids: &[i64],
        refresh_note_ids: &HashSet<i64>,
    ) -> Vec<NoteToModify>;

    /// Every unreviewed card with its current due value.
    fn new_cards(&self) -> Vec<NewCard>;

    fn apply_note_updates(&mut self, updates: Vec<NoteUpdate>);

    fn apply_due_updates(&mut self, updates: Vec<DueUpdate>);

    /// The host's update sequence number for mutation rows.
    fn usn(&self) -> i32;

    /// Lets the host register the tag names the pipeline manages. Hosts
    /// without a tag registry can ignore this.
    fn register_tags(&mut self, _tags: &[String]) {}
}
