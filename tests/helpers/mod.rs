use std::{
    collections::HashSet,
    path::Path,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

use morphmine::{
    config::{
        NoteFilter,
        Preferences,
    },
    morph::{
        Maturity,
        Morpheme,
    },
    notes::{
        join_fields,
        DueUpdate,
        NewCard,
        NoteStore,
        NoteToModify,
        NoteToUpdate,
        NoteType,
        NoteUpdate,
    },
    segmentation::{
        Morphemizer,
        SpaceMorphemizer,
    },
};

pub const LEECH_TAG: &str = "leech";

#[derive(Debug, Clone)]
pub struct MemNote {
    pub note_id: i64,
    pub note_type_id: i64,
    pub guid: String,
    pub fields: String,
    pub tags: Vec<String>,
    pub modified: i64,
}

#[derive(Debug, Clone)]
pub struct MemCard {
    pub card_id: i64,
    pub note_id: i64,
    /// 0 = new, 1 = learning, 2 = review
    pub card_type: u8,
    pub interval: f32,
    pub suspended: bool,
    pub due: i32,
    pub modified: i64,
}

/// In-memory note store implementing the query contracts the pipeline
/// needs: per-note maximum maturity with the 0.5 graduated-learning
/// sentinel, leech exclusion, and batched mutations with batch-size history
/// so tests can assert idempotence.
pub struct MemNoteStore {
    pub note_types: Vec<NoteType>,
    pub notes: Vec<MemNote>,
    pub cards: Vec<MemCard>,
    pub note_update_batches: Vec<usize>,
    pub due_update_batches: Vec<usize>,
    pub registered_tags: Vec<String>,
    /// Artificial query latency for reentrancy tests.
    pub query_delay: Option<Duration>,
}

impl MemNoteStore {
    pub fn new(note_types: Vec<NoteType>) -> Self {
        MemNoteStore {
            note_types,
            notes: Vec::new(),
            cards: Vec::new(),
            note_update_batches: Vec::new(),
            due_update_batches: Vec::new(),
            registered_tags: Vec::new(),
            query_delay: None,
        }
    }

    pub fn add_note(
        &mut self,
        note_id: i64,
        note_type_id: i64,
        fields: &[&str],
        tags: &[&str],
        modified: i64,
    ) {
        self.notes.push(MemNote {
            note_id,
            note_type_id,
            guid: format!("guid{}", note_id),
            fields: join_fields(&fields.iter().map(|f| f.to_string()).collect::<Vec<_>>()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            modified,
        });
    }

    pub fn add_card(&mut self, card_id: i64, note_id: i64, card_type: u8, interval: f32, due: i32) {
        self.cards.push(MemCard {
            card_id,
            note_id,
            card_type,
            interval,
            suspended: false,
            due,
            modified: 0,
        });
    }

    pub fn note(&self, note_id: i64) -> &MemNote {
        self.notes.iter().find(|n| n.note_id == note_id).expect("note exists")
    }

    pub fn card(&self, card_id: i64) -> &MemCard {
        self.cards.iter().find(|c| c.card_id == card_id).expect("card exists")
    }

    pub fn card_mut(&mut self, card_id: i64) -> &mut MemCard {
        self.cards.iter_mut().find(|c| c.card_id == card_id).expect("card exists")
    }

    fn qualifying_cards<'a>(
        &'a self,
        note: &'a MemNote,
        ignore_suspended_leeches: bool,
    ) -> Vec<&'a MemCard> {
        self.cards
            .iter()
            .filter(|c| c.note_id == note.note_id)
            .filter(|c| {
                !(ignore_suspended_leeches
                    && c.suspended
                    && note.tags.iter().any(|t| t == LEECH_TAG))
            })
            .collect()
    }
}

impl NoteStore for MemNoteStore {
    fn note_types(&self) -> Vec<NoteType> {
        self.note_types.clone()
    }

    fn notes_to_update(
        &self,
        last_updated: i64,
        note_type_ids: &[i64],
        ignore_suspended_leeches: bool,
    ) -> Vec<NoteToUpdate> {
        if let Some(delay) = self.query_delay {
            std::thread::sleep(delay);
        }

        self.notes
            .iter()
            .filter(|note| note_type_ids.contains(&note.note_type_id))
            .filter_map(|note| {
                let cards = self.qualifying_cards(note, ignore_suspended_leeches);
                if cards.is_empty() {
                    return None;
                }
                let card_modified = cards.iter().map(|c| c.modified).max().unwrap_or(0);
                if note.modified <= last_updated && card_modified <= last_updated {
                    return None;
                }

                let max_maturity = cards
                    .iter()
                    .map(|c| {
                        if c.interval == 0.0 && c.card_type == 1 {
                            Maturity::FRESH
                        } else {
                            Maturity::days(c.interval)
                        }
                    })
                    .fold(Maturity::NONE, |acc, m| acc.max(m));

                Some(NoteToUpdate {
                    note_id: note.note_id,
                    note_type_id: note.note_type_id,
                    fields: note.fields.clone(),
                    guid: note.guid.clone(),
                    tags: note.tags.clone(),
                    max_maturity,
                })
            })
            .collect()
    }

    fn notes_to_modify(
        &self,
        last_updated: i64,
        note_type_ids: &[i64],
        refresh_note_ids: &HashSet<i64>,
    ) -> Vec<NoteToModify> {
        self.notes
            .iter()
            .filter(|note| note_type_ids.contains(&note.note_type_id))
            .filter(|note| {
                note.modified > last_updated || refresh_note_ids.contains(&note.note_id)
            })
            .map(|note| {
                let max_card_type = self
                    .cards
                    .iter()
                    .filter(|c| c.note_id == note.note_id)
                    .map(|c| c.card_type)
                    .max()
                    .unwrap_or(0);
                NoteToModify {
                    note_id: note.note_id,
                    note_type_id: note.note_type_id,
                    fields: note.fields.clone(),
                    guid: note.guid.clone(),
                    tags: note.tags.clone(),
                    max_card_type,
                }
            })
            .collect()
    }

    fn new_cards(&self) -> Vec<NewCard> {
        self.cards
            .iter()
            .filter(|c| c.card_type == 0)
            .map(|c| NewCard { card_id: c.card_id, note_id: c.note_id, due: c.due })
            .collect()
    }

    fn apply_note_updates(&mut self, updates: Vec<NoteUpdate>) {
        self.note_update_batches.push(updates.len());
        for update in updates {
            if let Some(note) = self.notes.iter_mut().find(|n| n.note_id == update.note_id) {
                note.tags = update.tags;
                note.fields = update.fields;
                note.modified = update.modified;
            }
        }
    }

    fn apply_due_updates(&mut self, updates: Vec<DueUpdate>) {
        self.due_update_batches.push(updates.len());
        for update in updates {
            if let Some(card) = self.cards.iter_mut().find(|c| c.card_id == update.card_id) {
                card.due = update.due;
                card.modified = update.modified;
            }
        }
    }

    fn usn(&self) -> i32 {
        1
    }

    fn register_tags(&mut self, tags: &[String]) {
        for tag in tags {
            if !self.registered_tags.contains(tag) {
                self.registered_tags.push(tag.clone());
            }
        }
    }
}

/// "Basic" note type with slots for the pipeline's writable fields.
pub fn basic_note_type() -> NoteType {
    NoteType {
        id: 1,
        name: "Basic".to_string(),
        fields: vec![
            "Front".to_string(),
            "Back".to_string(),
            "Morphmine_Unknowns".to_string(),
            "Morphmine_FocusMorph".to_string(),
        ],
        sort_field: 0,
    }
}

/// Preferences matching `basic_note_type`, with every database path under
/// the given directory.
pub fn test_prefs(dir: &Path, morphemizer: &str) -> Preferences {
    let mut prefs = Preferences {
        filters: vec![NoteFilter {
            note_type: Some("Basic".to_string()),
            fields: vec!["Front".to_string()],
            morphemizer: morphemizer.to_string(),
            ..NoteFilter::default()
        }],
        threshold_seen: 0,
        threshold_known: 21,
        threshold_mature: 21,
        ..Preferences::default()
    };

    prefs.paths.all = dir.join("all.db");
    prefs.paths.seen = dir.join("seen.db");
    prefs.paths.known = dir.join("known.db");
    prefs.paths.mature = dir.join("mature.db");
    prefs.paths.priority = dir.join("priority.db");
    prefs.paths.external = dir.join("external.db");
    prefs.paths.frequency = dir.join("frequency.txt");
    prefs.paths.stats = dir.join("stats.db");
    prefs.paths.log = dir.join("morphmine.log");

    prefs
}

pub const COUNTING_MORPHEMIZER_NAME: &str = "CountingMorphemizer";

/// Delegates to the whitespace analyzer while counting invocations, so tests
/// can prove a pass did not re-tokenize unchanged text.
pub struct CountingMorphemizer {
    pub calls: Arc<AtomicUsize>,
}

impl Morphemizer for CountingMorphemizer {
    fn name(&self) -> &str {
        COUNTING_MORPHEMIZER_NAME
    }

    fn morphemes(&self, text: &str, tags: &[String]) -> Vec<Morpheme> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SpaceMorphemizer.morphemes(text, tags)
    }
}
