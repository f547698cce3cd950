use std::{
    collections::HashSet,
    path::PathBuf,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    persistence,
    segmentation::SPACE_MORPHEMIZER_NAME,
};

const PREFERENCES_FILE: &str = "preferences.json";

/// Which notes one filter applies to and how to read them. Filters are
/// evaluated in order; the first match wins, so more specific filters belong
/// earlier in the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteFilter {
    /// None selects every note type.
    pub note_type: Option<String>,
    /// Tags a note must all carry to match.
    pub tags: Vec<String>,
    /// Field names to extract morphemes from.
    pub fields: Vec<String>,
    pub morphemizer: String,
    pub read: bool,
    pub modify: bool,
    /// Treat every matched note as unreviewed regardless of its cards.
    #[serde(default)]
    pub ignore_maturity: bool,
    /// Per-filter overrides of the global scoring weights.
    #[serde(default)]
    pub weights: Option<ScoringWeights>,
}

impl Default for NoteFilter {
    fn default() -> Self {
        NoteFilter {
            note_type: None,
            tags: Vec::new(),
            fields: Vec::new(),
            morphemizer: SPACE_MORPHEMIZER_NAME.to_string(),
            read: true,
            modify: true,
            ignore_maturity: false,
            weights: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagNames {
    pub comprehension: String,
    pub vocab: String,
    pub fresh: String,
    pub not_ready: String,
    pub already_known: String,
    pub priority: String,
    pub too_short: String,
    pub too_long: String,
    pub frequency: String,
    /// Superseded by the too-short/too-long pair; stripped wherever found.
    pub bad_length: Option<String>,
}

impl Default for TagNames {
    fn default() -> Self {
        TagNames {
            comprehension: "mm_comprehension".to_string(),
            vocab: "mm_vocab".to_string(),
            fresh: "mm_fresh".to_string(),
            not_ready: "mm_notReady".to_string(),
            already_known: "mm_alreadyKnown".to_string(),
            priority: "mm_priority".to_string(),
            too_short: "mm_tooShort".to_string(),
            too_long: "mm_tooLong".to_string(),
            frequency: "mm_frequency".to_string(),
            bad_length: Some("mm_badLength".to_string()),
        }
    }
}

/// Names of the note fields the pipeline writes its results into. An empty
/// name disables that output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNames {
    pub focus_morph: String,
    pub focus_morph_pos: String,
    pub unknown_count: String,
    pub unmature_count: String,
    pub morph_index: String,
    pub unknowns: String,
    pub unmatures: String,
    pub unknown_freq: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        FieldNames {
            focus_morph: "Morphmine_FocusMorph".to_string(),
            focus_morph_pos: "Morphmine_FocusMorphPos".to_string(),
            unknown_count: "Morphmine_UnknownCount".to_string(),
            unmature_count: "Morphmine_UnmatureCount".to_string(),
            morph_index: "Morphmine_Index".to_string(),
            unknowns: "Morphmine_Unknowns".to_string(),
            unmatures: "Morphmine_Unmatures".to_string(),
            unknown_freq: "Morphmine_UnknownFreq".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbPaths {
    pub all: PathBuf,
    pub seen: PathBuf,
    pub known: PathBuf,
    pub mature: PathBuf,
    pub priority: PathBuf,
    pub external: PathBuf,
    pub frequency: PathBuf,
    pub stats: PathBuf,
    pub log: PathBuf,
}

impl Default for DbPaths {
    fn default() -> Self {
        let dir = persistence::get_app_data_dir().join("dbs");
        DbPaths {
            all: dir.join("all.db"),
            seen: dir.join("seen.db"),
            known: dir.join("known.db"),
            mature: dir.join("mature.db"),
            priority: dir.join("priority.db"),
            external: dir.join("external.db"),
            frequency: dir.join("frequency.txt"),
            stats: dir.join("stats.db"),
            log: dir.join("morphmine.log"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Maximum bonus for rank-0 entries of the frequency list; decays
    /// linearly with rank.
    pub frequency_bonus: i64,
    pub priority_db_weight: i64,
    pub reinforce_new_vocab_weight: f32,
    pub verb_bonus: i64,
    /// Added when a note carries neither a priority nor a frequency morph,
    /// if the always-prioritize option is on.
    pub no_priority_penalty: i64,
    pub min_good_sentence_length: i64,
    pub max_good_sentence_length: i64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            frequency_bonus: 10_000,
            priority_db_weight: 200,
            reinforce_new_vocab_weight: 5.0,
            verb_bonus: 0,
            no_priority_penalty: 1_000,
            min_good_sentence_length: 2,
            max_good_sentence_length: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub filters: Vec<NoteFilter>,

    /// Maturity thresholds in days. A location counts for a view when its
    /// maturity is strictly greater than the threshold.
    pub threshold_seen: u32,
    pub threshold_known: u32,
    pub threshold_mature: u32,

    pub tags: TagNames,
    pub fields: FieldNames,
    pub paths: DbPaths,
    pub weights: ScoringWeights,

    pub ignore_suspended_leeches: bool,
    pub skip_comprehension_cards: bool,
    pub skip_fresh_cards: bool,
    pub proper_nouns_already_known: bool,
    pub save_dbs: bool,
    pub set_not_required_tags: bool,
    pub load_cached_all_db: bool,
    pub always_prioritize_frequency_morphs: bool,
    pub set_due_based_on_mmi: bool,
    /// Score only notes flagged by maturity-transition tracking instead of
    /// rescanning everything. Off by default: the reference behavior is a
    /// full rescan on every run.
    pub incremental_updates: bool,

    /// Part-of-speech prefix that marks verbs for the verb bonus.
    pub verb_pos: String,

    /// Card-metrics evaluation mode: lemma when true, inflection otherwise.
    pub evaluate_morph_lemma: bool,
    /// Interval (days) from which a morph counts as known in card metrics.
    pub interval_for_known_morphs: u32,
}

impl Default for Preferences {
    fn default() -> Self {
        Preferences {
            filters: Vec::new(),
            threshold_seen: 0,
            threshold_known: 10,
            threshold_mature: 21,
            tags: TagNames::default(),
            fields: FieldNames::default(),
            paths: DbPaths::default(),
            weights: ScoringWeights::default(),
            ignore_suspended_leeches: false,
            skip_comprehension_cards: false,
            skip_fresh_cards: false,
            proper_nouns_already_known: false,
            save_dbs: true,
            set_not_required_tags: true,
            load_cached_all_db: true,
            always_prioritize_frequency_morphs: false,
            set_due_based_on_mmi: true,
            incremental_updates: false,
            verb_pos: "動詞".to_string(),
            evaluate_morph_lemma: true,
            interval_for_known_morphs: 21,
        }
    }
}

impl Preferences {
    pub fn load() -> Self {
        persistence::load_json_or_default(PREFERENCES_FILE)
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        persistence::save_json(self, PREFERENCES_FILE)
    }

    /// First filter matching the note type and carrying a tag set that is a
    /// subset of the note's tags; None when the note is not handled at all.
    pub fn filter_for(&self, note_type: &str, note_tags: &[String]) -> Option<&NoteFilter> {
        self.filters.iter().find(|filter| {
            let type_matches = match &filter.note_type {
                Some(name) => name == note_type,
                None => true,
            };
            type_matches && filter.tags.iter().all(|tag| note_tags.contains(tag))
        })
    }

    pub fn read_enabled_note_types(&self) -> (HashSet<String>, bool) {
        Self::enabled_note_types(self.filters.iter().filter(|f| f.read))
    }

    pub fn modify_enabled_note_types(&self) -> (HashSet<String>, bool) {
        Self::enabled_note_types(self.filters.iter().filter(|f| f.modify))
    }

    fn enabled_note_types<'a>(
        filters: impl Iterator<Item = &'a NoteFilter>,
    ) -> (HashSet<String>, bool) {
        let mut types = HashSet::new();
        for filter in filters {
            match &filter.note_type {
                Some(name) => {
                    types.insert(name.clone());
                }
                None => return (types, true),
            }
        }
        (types, false)
    }

    pub fn weights_for<'a>(&'a self, filter: &'a NoteFilter) -> &'a ScoringWeights {
        filter.weights.as_ref().unwrap_or(&self.weights)
    }

    /// Every tag name the pipeline manages, for host-side tag registration.
    pub fn managed_tags(&self) -> Vec<String> {
        vec![
            self.tags.comprehension.clone(),
            self.tags.vocab.clone(),
            self.tags.fresh.clone(),
            self.tags.not_ready.clone(),
            self.tags.already_known.clone(),
            self.tags.priority.clone(),
            self.tags.too_short.clone(),
            self.tags.too_long.clone(),
            self.tags.frequency.clone(),
        ]
    }

    /// Canonical JSON snapshot used as the recalc cache key: any settings
    /// change forces a full rebuild.
    pub fn snapshot(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
