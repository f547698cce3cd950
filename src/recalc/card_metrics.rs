use std::collections::{
    HashMap,
    HashSet,
};

use crate::{
    config::Preferences,
    morph::Morpheme,
};

/// Precomputed card → morphs lookup produced by the host-side cache.
pub type CardMorphMap = HashMap<i64, Vec<Morpheme>>;

/// Morph key → rank. Lower rank means higher priority; keys are
/// lemma+lemma (lemma mode) or lemma+inflection (inflection mode).
pub type MorphPriorities = HashMap<String, usize>;

/// Per-card aggregation for call sites that decide on a single card (browser
/// actions, card inspection) without running the full pipeline. Classifies
/// against the morphs' recorded learning intervals rather than the database
/// views.
#[derive(Debug, Default)]
pub struct CardMorphsMetrics {
    pub all_morphs: Vec<Morpheme>,
    pub unknown_morphs: Vec<Morpheme>,
    pub num_learning_morphs: usize,
    pub has_learning_morphs: bool,
    pub total_priority_unknown_morphs: usize,
    pub total_priority_all_morphs: usize,
}

impl CardMorphsMetrics {
    pub fn new(
        prefs: &Preferences,
        card_id: i64,
        card_morph_map: &CardMorphMap,
        priorities: &MorphPriorities,
    ) -> Self {
        let mut metrics = CardMorphsMetrics::default();

        // a card absent from the map has no morphs; nothing to aggregate
        let card_morphs = match card_morph_map.get(&card_id) {
            Some(morphs) => morphs,
            None => return metrics,
        };

        metrics.all_morphs = card_morphs.clone();

        // an unranked morph sorts after every ranked one
        let default_priority = priorities.len() + 1;

        for morph in card_morphs {
            let (interval, key) = if prefs.evaluate_morph_lemma {
                (
                    morph.highest_lemma_learning_interval.unwrap_or(0),
                    format!("{}{}", morph.lemma, morph.lemma),
                )
            } else {
                (
                    morph.highest_inflection_learning_interval.unwrap_or(0),
                    format!("{}{}", morph.lemma, morph.inflection),
                )
            };

            let priority = priorities.get(&key).copied().unwrap_or(default_priority);
            metrics.total_priority_all_morphs += priority;

            if interval == 0 {
                metrics.unknown_morphs.push(morph.clone());
                metrics.total_priority_unknown_morphs += priority;
            } else if interval < prefs.interval_for_known_morphs {
                metrics.num_learning_morphs += 1;
            }
        }

        metrics.has_learning_morphs = metrics.num_learning_morphs > 0;
        metrics
    }

    /// Distinct unknown inflections on a card. Collection stops after the
    /// second distinct form since callers only branch on 0, 1, or more.
    pub fn unknown_inflections(card_morph_map: &CardMorphMap, card_id: i64) -> HashSet<String> {
        let mut unknowns = HashSet::new();
        if let Some(card_morphs) = card_morph_map.get(&card_id) {
            for morph in card_morphs {
                if morph.highest_inflection_learning_interval.unwrap_or(0) == 0 {
                    unknowns.insert(morph.inflection.clone());
                    if unknowns.len() > 1 {
                        break;
                    }
                }
            }
        }
        unknowns
    }

    /// Distinct unknown lemmas on a card, with the same early exit.
    pub fn unknown_lemmas(card_morph_map: &CardMorphMap, card_id: i64) -> HashSet<String> {
        let mut unknowns = HashSet::new();
        if let Some(card_morphs) = card_morph_map.get(&card_id) {
            for morph in card_morphs {
                if morph.highest_lemma_learning_interval.unwrap_or(0) == 0 {
                    unknowns.insert(morph.lemma.clone());
                    if unknowns.len() > 1 {
                        break;
                    }
                }
            }
        }
        unknowns
    }
}
