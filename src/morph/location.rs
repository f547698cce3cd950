use std::hash::{
    Hash,
    Hasher,
};

use serde::{
    Deserialize,
    Serialize,
};

/// Card maturity in days. Fractional because a card that just graduated from
/// learning sits at interval 0 but is no longer "never reviewed" — the store
/// reports it as 0.5 to keep the two states apart. Wrapped so it can key
/// hash maps: the values that occur (whole days, the 0.5 sentinel, threshold
/// + 1) are all exactly representable, so bit equality is exact equality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialOrd)]
pub struct Maturity(f32);

impl Maturity {
    /// A card in learning that has not yet earned a real interval.
    pub const FRESH: Maturity = Maturity(0.5);

    pub const NONE: Maturity = Maturity(0.0);

    pub fn days(days: f32) -> Self {
        Maturity(days)
    }

    pub fn value(self) -> f32 {
        self.0
    }

    pub fn max(self, other: Maturity) -> Maturity {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl PartialEq for Maturity {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Maturity {}

impl Hash for Maturity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Where a morpheme occurrence came from: one field of one note, with the
/// text that was tokenized and the maturity of the note's cards at the time.
/// Full identity (all fields) is what occurrence counting keys on; the
/// (note id, guid, field name) projection is the key for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub note_id: i64,
    pub guid: String,
    pub field_name: String,
    pub field_value: String,
    pub maturity: Maturity,
}

/// Key of the fid index: identifies a (note, field) slot independent of its
/// text or maturity, so a re-tokenization can be skipped when only maturity
/// moved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub note_id: i64,
    pub guid: String,
    pub field_name: String,
}

impl Location {
    pub fn new(note_id: i64, guid: &str, field_name: &str, field_value: &str, maturity: Maturity) -> Self {
        Location {
            note_id,
            guid: guid.to_string(),
            field_name: field_name.to_string(),
            field_value: field_value.to_string(),
            maturity,
        }
    }

    pub fn field_key(&self) -> FieldKey {
        FieldKey {
            note_id: self.note_id,
            guid: self.guid.clone(),
            field_name: self.field_name.clone(),
        }
    }

    /// The same slot and text at a different maturity.
    pub fn with_maturity(&self, maturity: Maturity) -> Location {
        Location { maturity, ..self.clone() }
    }
}
