use std::collections::{
    HashMap,
    HashSet,
};

use super::RecalcEvent;
use crate::{
    config::Preferences,
    core::MorphmineError,
    morph::{
        FieldKey,
        Location,
        Maturity,
        MorphDb,
        Morpheme,
    },
    notes::{
        split_fields,
        FieldIndexCache,
        NoteStore,
        NoteType,
    },
    segmentation::MorphemizerRegistry,
};

/// Bring the all-encompassing database up to date with the note store.
///
/// The preferences snapshot is part of the cache key: when it differs from
/// the one the database was built under, everything is discarded and rebuilt.
/// Otherwise only notes modified since the last pass are touched, and within
/// those, a field whose text is unchanged keeps its previously extracted
/// morphs — only its recorded maturity moves.
pub fn make_all_db<S: NoteStore>(
    store: &S,
    prefs: &Preferences,
    registry: &MorphemizerRegistry,
    all_db: MorphDb,
    progress: &(dyn Fn(RecalcEvent) + Sync),
) -> Result<MorphDb, MorphmineError> {
    progress(RecalcEvent::Label("Preparing all.db generation".to_string()));

    let snapshot = prefs.snapshot();
    let mut all_db = all_db;
    let last_updated = if all_db.meta.last_preferences.as_deref() == Some(snapshot.as_str()) {
        all_db.meta.last_updated
    } else {
        if !all_db.is_empty() {
            println!("Preferences changed. Recomputing all.db...");
        }
        all_db = MorphDb::new();
        0
    };

    let fid_db = all_db.fid_db();
    let mut loc_db = all_db.loc_db();

    let note_types: HashMap<i64, NoteType> =
        store.note_types().into_iter().map(|nt| (nt.id, nt)).collect();
    let (read_types, include_all) = prefs.read_enabled_note_types();
    let included_ids: Vec<i64> = note_types
        .values()
        .filter(|nt| include_all || read_types.contains(&nt.name))
        .map(|nt| nt.id)
        .collect();

    let notes = store.notes_to_update(last_updated, &included_ids, prefs.ignore_suspended_leeches);
    println!("Notes to update: {}", notes.len());

    progress(RecalcEvent::Label("Generating all.db data".to_string()));

    let mature_plus_one = Maturity::days(prefs.threshold_mature as f32 + 1.0);
    let mut field_index = FieldIndexCache::new();

    for (i, note) in notes.iter().enumerate() {
        if i % 500 == 0 {
            progress(RecalcEvent::Progress { done: i, total: notes.len() });
        }

        let note_type = match note_types.get(&note.note_type_id) {
            Some(note_type) => note_type,
            None => continue,
        };
        let filter = match prefs.filter_for(&note_type.name, &note.tags) {
            Some(filter) => filter,
            None => continue,
        };

        let morphemizer = registry
            .by_name(&filter.morphemizer)
            .ok_or_else(|| MorphmineError::MorphemizerNotFound(filter.morphemizer.clone()))?;

        let mut maturity = note.max_maturity;
        if filter.ignore_maturity {
            maturity = Maturity::NONE;
        }
        if note.tags.contains(&prefs.tags.already_known) {
            maturity = maturity.max(mature_plus_one);
        }

        let field_values = split_fields(&note.fields);

        for field_name in &filter.fields {
            let text = match field_index.extract_field_text(note_type, field_name, &field_values)? {
                Some(text) => text,
                None => continue,
            };

            let key = FieldKey {
                note_id: note.note_id,
                guid: note.guid.clone(),
                field_name: field_name.clone(),
            };

            match fid_db.get(&key) {
                None => {
                    let loc =
                        Location::new(note.note_id, &note.guid, field_name, &text, maturity);
                    let morphs: HashSet<Morpheme> =
                        morphemizer.morphemes(&text, &note.tags).into_iter().collect();
                    if !morphs.is_empty() {
                        loc_db.insert(loc, morphs);
                    }
                }
                Some(loc) => {
                    if loc.field_value == text && loc.maturity != maturity {
                        // same text, new maturity: re-key the location and
                        // carry the morphs over without re-tokenizing
                        if let Some(morphs) = loc_db.remove(loc) {
                            loc_db.insert(loc.with_maturity(maturity), morphs);
                        }
                    } else if loc.field_value != text {
                        loc_db.remove(loc);
                        let new_loc =
                            Location::new(note.note_id, &note.guid, field_name, &text, maturity);
                        let morphs: HashSet<Morpheme> =
                            morphemizer.morphemes(&text, &note.tags).into_iter().collect();
                        if !morphs.is_empty() {
                            loc_db.insert(new_loc, morphs);
                        }
                    }
                }
            }
        }
    }

    progress(RecalcEvent::Label("Creating all.db objects".to_string()));
    all_db.rebuild_from_loc_db(&loc_db);

    Ok(all_db)
}
