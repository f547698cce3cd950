use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::atomic::{
        AtomicUsize,
        Ordering,
    },
};

use rayon::iter::{
    IntoParallelRefIterator,
    ParallelIterator,
};

use super::RecalcEvent;
use crate::{
    config::{
        Preferences,
        ScoringWeights,
    },
    core::MorphmineError,
    dictionary::FrequencyList,
    morph::{
        FieldKey,
        Location,
        MorphDb,
        Morpheme,
    },
    notes::{
        field_checksum,
        join_fields,
        split_fields,
        strip_html,
        DueUpdate,
        FieldIndexCache,
        NoteStore,
        NoteToModify,
        NoteType,
        NoteUpdate,
    },
};

/// Default due for every candidate note: the host converts due to a signed
/// 32-bit integer, so unscored and bailed cards sort behind everything
/// representable without overflowing.
pub const DUE_SENTINEL: i32 = 2_147_483_647;

/// Cards with more unknowns than this are left untouched beyond the due
/// sentinel; they are nowhere near ready and annotating them is wasted work.
const MAX_UNKNOWNS: usize = 3;

/// Pushed onto skipped comprehension/fresh cards to park them at the end of
/// the new-card queue.
const SKIP_PENALTY: i64 = 1_000_000;

const USEFULNESS_CAP: i64 = 99_999;

const MATURITY_BIT_SEEN: u8 = 1;
const MATURITY_BIT_KNOWN: u8 = 2;
const MATURITY_BIT_MATURE: u8 = 4;

pub struct UpdateOutcome {
    pub known_db: MorphDb,
    pub notes_scored: usize,
    pub notes_changed: usize,
    pub cards_changed: usize,
}

struct NoteOutcome {
    note_id: i64,
    due: i32,
    update: Option<NoteUpdate>,
}

struct ScoringContext<'a> {
    prefs: &'a Preferences,
    all_db: &'a MorphDb,
    known_db: &'a MorphDb,
    mature_db: &'a MorphDb,
    priority_db: &'a MorphDb,
    frequency_list: &'a FrequencyList,
    fid_db: &'a HashMap<FieldKey, Location>,
    loc_db: &'a HashMap<Location, HashSet<Morpheme>>,
    note_types: &'a HashMap<i64, NoteType>,
    now: i64,
    usn: i32,
}

/// Recompute tags, annotation fields, and due ordering for every candidate
/// note, then write the changes back in two batches. Returns the known view
/// for the stats pass.
pub fn update_notes<S: NoteStore>(
    store: &mut S,
    prefs: &Preferences,
    all_db: &mut MorphDb,
    progress: &(dyn Fn(RecalcEvent) + Sync),
) -> Result<UpdateOutcome, MorphmineError> {
    progress(RecalcEvent::Label("Updating data".to_string()));

    let now = chrono::Utc::now().timestamp();
    let usn = store.usn();

    store.register_tags(&prefs.managed_tags());

    let fid_db = all_db.fid_db();
    let loc_db = all_db.loc_db();

    progress(RecalcEvent::Label("Creating seen/known/mature from all.db".to_string()));
    let seen_db = all_db.filter_by_maturity(prefs.threshold_seen as f32);
    let known_db = all_db.filter_by_maturity(prefs.threshold_known as f32);
    let mature_db = all_db.filter_by_maturity(prefs.threshold_mature as f32);

    progress(RecalcEvent::Label("Loading priority.db".to_string()));
    let priority_db = MorphDb::load_or_empty(&prefs.paths.priority);

    progress(RecalcEvent::Label("Loading frequency list".to_string()));
    let frequency_list = FrequencyList::load(&prefs.paths.frequency);

    let snapshot = prefs.snapshot();
    let last_updated = if all_db.meta.last_preferences.as_deref() == Some(snapshot.as_str()) {
        all_db.meta.last_updated
    } else {
        0
    };

    // Track which maturity bracket every morph sits in so the next pass can
    // find morphs that crossed a threshold and the notes referring to them.
    let mut new_maturities: HashMap<Morpheme, u8> = HashMap::new();
    let mut refresh_notes: HashSet<i64> = HashSet::new();
    for (morph, locs) in all_db.entries() {
        let mut bits = 0u8;
        if seen_db.matches(morph) {
            bits |= MATURITY_BIT_SEEN;
        }
        if known_db.matches(morph) {
            bits |= MATURITY_BIT_KNOWN;
        }
        if mature_db.matches(morph) {
            bits |= MATURITY_BIT_MATURE;
        }

        if all_db.meta.last_maturities.get(morph) != Some(&bits) {
            for loc in locs {
                refresh_notes.insert(loc.note_id);
            }
        }
        new_maturities.insert(morph.clone(), bits);
    }

    // The reference behavior rescans everything on every run; the transition
    // set only narrows the query when incremental updates are opted into.
    let effective_last_updated = if prefs.incremental_updates { last_updated } else { 0 };

    let note_types: HashMap<i64, NoteType> =
        store.note_types().into_iter().map(|nt| (nt.id, nt)).collect();
    let (modify_types, include_all) = prefs.modify_enabled_note_types();
    let included_ids: Vec<i64> = note_types
        .values()
        .filter(|nt| include_all || modify_types.contains(&nt.name))
        .map(|nt| nt.id)
        .collect();

    let candidates = store.notes_to_modify(effective_last_updated, &included_ids, &refresh_notes);
    let total = candidates.len();

    let ctx = ScoringContext {
        prefs,
        all_db,
        known_db: &known_db,
        mature_db: &mature_db,
        priority_db: &priority_db,
        frequency_list: &frequency_list,
        fid_db: &fid_db,
        loc_db: &loc_db,
        note_types: &note_types,
        now,
        usn,
    };

    // Scoring runs over a frozen snapshot of the views, so notes are
    // independent of each other and the loop can fan out; every mutation is
    // collected and applied in one batch afterwards.
    let scored = AtomicUsize::new(0);
    let outcomes: Vec<NoteOutcome> = candidates
        .par_iter()
        .map_init(FieldIndexCache::new, |field_index, note| {
            let done = scored.fetch_add(1, Ordering::Relaxed);
            if done % 1000 == 0 {
                progress(RecalcEvent::Progress { done, total });
            }
            score_note(&ctx, field_index, note)
        })
        .flatten_iter()
        .collect();

    let notes_scored = outcomes.len();
    let mut note_due: HashMap<i64, i32> = HashMap::new();
    let mut note_updates = Vec::new();
    for outcome in outcomes {
        note_due.insert(outcome.note_id, outcome.due);
        if let Some(update) = outcome.update {
            note_updates.push(update);
        }
    }

    progress(RecalcEvent::Label("Updating note database".to_string()));
    let notes_changed = note_updates.len();
    store.apply_note_updates(note_updates);

    progress(RecalcEvent::Label("Updating new card ordering".to_string()));
    let mut due_updates = Vec::new();
    for card in store.new_cards() {
        if let Some(&due) = note_due.get(&card.note_id) {
            if due != card.due {
                due_updates.push(DueUpdate { card_id: card.card_id, due, modified: now, usn });
            }
        }
    }
    let cards_changed = due_updates.len();
    store.apply_due_updates(due_updates);

    all_db.meta.last_preferences = Some(snapshot);
    all_db.meta.last_maturities = new_maturities;
    all_db.meta.last_updated = now;

    if prefs.save_dbs {
        progress(RecalcEvent::Label("Saving all/seen/known/mature dbs".to_string()));
        all_db.save(&prefs.paths.all)?;
        seen_db.save(&prefs.paths.seen)?;
        known_db.save(&prefs.paths.known)?;
        mature_db.save(&prefs.paths.mature)?;
    }

    Ok(UpdateOutcome { known_db, notes_scored, notes_changed, cards_changed })
}

fn score_note(
    ctx: &ScoringContext,
    field_index: &mut FieldIndexCache,
    note: &NoteToModify,
) -> Option<NoteOutcome> {
    let prefs = ctx.prefs;
    let note_type = ctx.note_types.get(&note.note_type_id)?;
    let filter = prefs.filter_for(&note_type.name, &note.tags)?;
    if !filter.modify {
        return None;
    }
    let weights = prefs.weights_for(filter);

    // all morphemes across the note's configured fields
    let mut morphemes: HashSet<&Morpheme> = HashSet::new();
    for field_name in &filter.fields {
        let key = FieldKey {
            note_id: note.note_id,
            guid: note.guid.clone(),
            field_name: field_name.clone(),
        };
        if let Some(loc) = ctx.fid_db.get(&key) {
            if let Some(morphs) = ctx.loc_db.get(loc) {
                morphemes.extend(morphs);
            }
        }
    }

    let mut unknowns: HashSet<Morpheme> = HashSet::new();
    let mut unmatures: HashSet<Morpheme> = HashSet::new();
    let mut new_knowns: HashSet<Morpheme> = HashSet::new();
    for morph in &morphemes {
        if prefs.proper_nouns_already_known && morph.is_proper_noun() {
            continue;
        }
        let morph = morph.deinflected();
        if !ctx.known_db.matches(&morph) {
            unknowns.insert(morph.clone());
        }
        if !ctx.mature_db.matches(&morph) {
            if ctx.known_db.matches(&morph) {
                new_knowns.insert(morph.clone());
            }
            unmatures.insert(morph);
        }
    }

    let morphemes_amount = morphemes.len() as i64;
    let unknowns_amount = unknowns.len();
    let unmatures_amount = unmatures.len();

    // every scored note gets at least the sentinel so bailed cards sort last
    let mut outcome = NoteOutcome { note_id: note.note_id, due: DUE_SENTINEL, update: None };

    if unknowns_amount > MAX_UNKNOWNS {
        return Some(outcome);
    }
    if prefs.skip_comprehension_cards && unknowns_amount == 0 {
        return Some(outcome);
    }

    // deterministic ordering for joined fields and repeatable scoring
    let mut unknowns: Vec<Morpheme> = unknowns.into_iter().collect();
    unknowns.sort_by(|a, b| (&a.lemma, &a.inflection).cmp(&(&b.lemma, &b.inflection)));
    let mut unmatures: Vec<Morpheme> = unmatures.into_iter().collect();
    unmatures.sort_by(|a, b| (&a.lemma, &a.inflection).cmp(&(&b.lemma, &b.inflection)));

    let mut is_priority = false;
    let mut is_frequency = false;
    let mut morph_frequency: i64 = 0;
    let mut usefulness: i64 = 0;

    for unknown in &unknowns {
        morph_frequency += ctx.all_db.frequency(unknown) as i64;

        if ctx.priority_db.frequency(unknown) > 0 {
            is_priority = true;
            usefulness += weights.priority_db_weight;
        }

        if let Some(rank) = ctx.frequency_list.rank(unknown) {
            is_frequency = true;
            // rank 0 earns the full bonus, the tail approaches zero
            let scale = 1.0 - rank as f64 / ctx.frequency_list.len() as f64;
            usefulness += (weights.frequency_bonus as f64 * scale).round() as i64;
        }
    }

    // average collection frequency of the unknowns
    let f_k_avg = if unknowns_amount > 0 {
        morph_frequency / unknowns_amount as i64
    } else {
        morph_frequency
    };
    usefulness += f_k_avg;

    // reinforce recently learned morphs; the fresher the smaller the divisor
    for morph in &new_knowns {
        if let Some(locs) = ctx.known_db.matching_locs(morph) {
            if !locs.is_empty() {
                let min_maturity = locs
                    .iter()
                    .map(|loc| loc.maturity.value())
                    .fold(f32::INFINITY, f32::min)
                    .max(1.0);
                usefulness += (weights.reinforce_new_vocab_weight / min_maturity) as i64;
            }
        }
    }

    if unknowns.iter().any(|m| m.is_verb(&prefs.verb_pos)) {
        usefulness += weights.verb_bonus;
    }

    // invert: larger raw usefulness must yield a smaller index
    usefulness = USEFULNESS_CAP - usefulness.min(USEFULNESS_CAP);

    if !(is_priority || is_frequency) && prefs.always_prioritize_frequency_morphs {
        usefulness += weights.no_priority_penalty;
    }

    let (len_diff_raw, len_diff) = length_penalty(morphemes_amount, weights);

    let mut field_values = split_fields(&note.fields);
    let fields = &prefs.fields;
    let tags_cfg = &prefs.tags;
    let is_new_card = note.max_card_type == 0;

    // desired tags are computed from scratch: keep everything unmanaged,
    // then re-derive the managed ones from this pass's classification
    let managed: Vec<&str> = [
        tags_cfg.comprehension.as_str(),
        tags_cfg.vocab.as_str(),
        tags_cfg.fresh.as_str(),
        tags_cfg.not_ready.as_str(),
        tags_cfg.priority.as_str(),
        tags_cfg.frequency.as_str(),
        tags_cfg.too_short.as_str(),
        tags_cfg.too_long.as_str(),
    ]
    .into_iter()
    .chain(tags_cfg.bad_length.as_deref())
    .collect();
    let mut tags: Vec<String> =
        note.tags.iter().filter(|t| !managed.contains(&t.as_str())).cloned().collect();

    if unmatures_amount == 0 {
        // pure review of mature material
        tags.push(tags_cfg.comprehension.clone());
        if prefs.skip_comprehension_cards {
            usefulness += SKIP_PENALTY;
        }
    } else if unknowns_amount == 1 {
        tags.push(tags_cfg.vocab.clone());
        if is_new_card {
            let focus = &unknowns[0];
            field_index.set_field(note_type, &mut field_values, &fields.focus_morph, &focus.lemma);
            field_index.set_field(
                note_type,
                &mut field_values,
                &fields.focus_morph_pos,
                &focus.pos,
            );
        }
    } else if unknowns_amount > 1 {
        tags.push(tags_cfg.not_ready.clone());
        if is_new_card {
            field_index.set_field(
                note_type,
                &mut field_values,
                &fields.focus_morph,
                &join_lemmas(&unknowns),
            );
            field_index.set_field(
                note_type,
                &mut field_values,
                &fields.focus_morph_pos,
                &join_pos(&unknowns),
            );
        }
    } else {
        // no unknowns but unmature morphs: reinforces newly learned vocab
        tags.push(tags_cfg.fresh.clone());
        if prefs.skip_fresh_cards {
            usefulness += SKIP_PENALTY;
        }
        if is_new_card {
            field_index.set_field(
                note_type,
                &mut field_values,
                &fields.focus_morph,
                &join_lemmas(&unmatures),
            );
            field_index.set_field(
                note_type,
                &mut field_values,
                &fields.focus_morph_pos,
                &join_pos(&unmatures),
            );
        }
    }

    let mmi = morph_man_index(unknowns_amount, len_diff, usefulness);
    if prefs.set_due_based_on_mmi {
        outcome.due = mmi.min(DUE_SENTINEL as i64) as i32;
    }

    field_index.set_field(
        note_type,
        &mut field_values,
        &fields.unknown_count,
        &unknowns_amount.to_string(),
    );
    field_index.set_field(
        note_type,
        &mut field_values,
        &fields.unmature_count,
        &unmatures_amount.to_string(),
    );
    field_index.set_field(note_type, &mut field_values, &fields.morph_index, &mmi.to_string());
    field_index.set_field(
        note_type,
        &mut field_values,
        &fields.unknowns,
        &join_lemmas(&unknowns),
    );
    field_index.set_field(
        note_type,
        &mut field_values,
        &fields.unmatures,
        &join_lemmas(&unmatures),
    );
    field_index.set_field(
        note_type,
        &mut field_values,
        &fields.unknown_freq,
        &f_k_avg.to_string(),
    );

    if is_priority {
        tags.push(tags_cfg.priority.clone());
    }
    if is_frequency {
        tags.push(tags_cfg.frequency.clone());
    }
    if len_diff_raw < 0 {
        tags.push(tags_cfg.too_short.clone());
    }
    if len_diff_raw > 0 {
        tags.push(tags_cfg.too_long.clone());
    }

    if !prefs.set_not_required_tags {
        let unnecessary =
            [tags_cfg.priority.as_str(), tags_cfg.too_short.as_str(), tags_cfg.too_long.as_str()];
        tags.retain(|t| !unnecessary.contains(&t.as_str()));
    }

    let joined = join_fields(&field_values);
    if joined != note.fields || tags != note.tags {
        let sort_field =
            field_values.get(note_type.sort_field).map(|f| strip_html(f)).unwrap_or_default();
        let checksum = field_values.first().map(|f| field_checksum(f)).unwrap_or(0);
        outcome.update = Some(NoteUpdate {
            note_id: note.note_id,
            tags,
            fields: joined,
            sort_field,
            checksum,
            modified: ctx.now,
            usn: ctx.usn,
        });
    }

    Some(outcome)
}

/// Distance from the good-sentence-length band, as (raw, clamped). Negative
/// raw marks too short, positive too long; the clamped magnitude caps at 9
/// so the penalty never bleeds into the unknown-count tier.
fn length_penalty(morph_count: i64, weights: &ScoringWeights) -> (i64, i64) {
    let raw = std::cmp::min(
        morph_count - weights.min_good_sentence_length,
        std::cmp::max(0, morph_count - weights.max_good_sentence_length),
    );
    (raw, std::cmp::min(9, raw.abs()))
}

/// Strictly lexicographic priority: unknown count dominates, then length
/// fit, then usefulness. len_diff <= 9 keeps its term under 10000 and
/// usefulness stays under 100000 short of the intentional skip penalties.
fn morph_man_index(unknowns: usize, len_diff: i64, usefulness: i64) -> i64 {
    100_000 * unknowns as i64 + 1_000 * len_diff + usefulness
}

fn join_lemmas(morphs: &[Morpheme]) -> String {
    morphs.iter().map(|m| m.lemma.as_str()).collect::<Vec<_>>().join(", ")
}

fn join_pos(morphs: &[Morpheme]) -> String {
    morphs.iter().map(|m| m.pos.as_str()).collect::<Vec<_>>().join(", ")
}
