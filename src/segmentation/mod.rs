use std::{
    collections::HashMap,
    sync::{
        Arc,
        OnceLock,
    },
};

use regex::Regex;

use crate::morph::Morpheme;

/// The seam to the morphological-analysis backend. The pipeline only ever
/// calls through this trait; which analyzer actually runs is resolved by
/// name from the note filter's configuration.
pub trait Morphemizer: Send + Sync {
    fn name(&self) -> &str;

    /// Extract morphemes from one field's plain text. `tags` carries the
    /// note's tags for analyzers that condition on them.
    fn morphemes(&self, text: &str, tags: &[String]) -> Vec<Morpheme>;
}

/// Name → analyzer lookup. The whitespace analyzer is always registered so a
/// fresh profile works without any language backend installed; embedders add
/// their own implementations on top.
pub struct MorphemizerRegistry {
    morphemizers: HashMap<String, Arc<dyn Morphemizer>>,
}

impl MorphemizerRegistry {
    pub fn new() -> Self {
        let mut registry = MorphemizerRegistry { morphemizers: HashMap::new() };
        registry.register(Arc::new(SpaceMorphemizer));
        registry
    }

    pub fn register(&mut self, morphemizer: Arc<dyn Morphemizer>) {
        self.morphemizers.insert(morphemizer.name().to_string(), morphemizer);
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn Morphemizer>> {
        self.morphemizers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.morphemizers.keys().cloned().collect()
    }
}

impl Default for MorphemizerRegistry {
    fn default() -> Self {
        MorphemizerRegistry::new()
    }
}

/// Language-agnostic fallback: words are whitespace-separated, punctuation is
/// stripped, and every word is its own lemma.
pub struct SpaceMorphemizer;

pub const SPACE_MORPHEMIZER_NAME: &str = "SpaceMorphemizer";

impl Morphemizer for SpaceMorphemizer {
    fn name(&self) -> &str {
        SPACE_MORPHEMIZER_NAME
    }

    fn morphemes(&self, text: &str, _tags: &[String]) -> Vec<Morpheme> {
        static PUNCTUATION: OnceLock<Regex> = OnceLock::new();
        let punctuation = PUNCTUATION
            .get_or_init(|| Regex::new(r"[!-/:-@\[-`{-~「」。、．，？！]").unwrap());

        text.split_whitespace()
            .map(|word| punctuation.replace_all(word, ""))
            .filter(|word| !word.is_empty())
            .map(|word| {
                let lower = word.to_lowercase();
                Morpheme::new(&lower, &lower, "UNKNOWN", "UNKNOWN")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn space_morphemizer_strips_punctuation_and_case() {
        let morphs = SpaceMorphemizer.morphemes("Hello, world! Hello...", &[]);

        assert_eq!(morphs.len(), 3);
        assert_eq!(morphs[0].lemma, "hello");
        assert_eq!(morphs[1].lemma, "world");
        assert_eq!(morphs[0], morphs[2]);
    }

    #[test]
    fn registry_resolves_by_configured_name() {
        let registry = MorphemizerRegistry::new();
        assert!(registry.by_name(SPACE_MORPHEMIZER_NAME).is_some());
        assert!(registry.by_name("MecabMorphemizer").is_none());
    }
}
