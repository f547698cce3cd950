use std::hash::{
    Hash,
    Hasher,
};

use serde::{
    Deserialize,
    Serialize,
};

/// Sub-part-of-speech tag the analyzers emit for proper nouns.
pub const PROPER_NOUN_SUB_POS: &str = "固有名詞";

/// One unit of vocabulary: a surface form tied to its dictionary form and
/// part-of-speech. Identity is (lemma, inflection, pos) — the learning
/// intervals ride along but never participate in equality or hashing, so a
/// morph looked up before and after review resolves to the same entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Morpheme {
    pub lemma: String,
    pub inflection: String,
    pub pos: String,
    pub sub_pos: String,

    /// Longest scheduling interval seen on any card containing this exact
    /// inflected form. None until card data has been folded in.
    pub highest_inflection_learning_interval: Option<u32>,
    /// Longest interval seen on any card containing any inflection of this
    /// lemma.
    pub highest_lemma_learning_interval: Option<u32>,
}

impl Morpheme {
    pub fn new(lemma: &str, inflection: &str, pos: &str, sub_pos: &str) -> Self {
        Morpheme {
            lemma: lemma.to_string(),
            inflection: inflection.to_string(),
            pos: pos.to_string(),
            sub_pos: sub_pos.to_string(),
            highest_inflection_learning_interval: None,
            highest_lemma_learning_interval: None,
        }
    }

    /// Project onto the dictionary form. Idempotent: deinflecting an already
    /// deinflected morph returns an equal morph.
    pub fn deinflected(&self) -> Morpheme {
        if self.inflection == self.lemma {
            self.clone()
        } else {
            Morpheme {
                lemma: self.lemma.clone(),
                inflection: self.lemma.clone(),
                pos: self.pos.clone(),
                sub_pos: self.sub_pos.clone(),
                highest_inflection_learning_interval: self.highest_inflection_learning_interval,
                highest_lemma_learning_interval: self.highest_lemma_learning_interval,
            }
        }
    }

    pub fn is_proper_noun(&self) -> bool {
        self.sub_pos == PROPER_NOUN_SUB_POS
    }

    pub fn is_verb(&self, verb_pos: &str) -> bool {
        !verb_pos.is_empty() && self.pos.starts_with(verb_pos)
    }
}

impl PartialEq for Morpheme {
    fn eq(&self, other: &Self) -> bool {
        self.lemma == other.lemma
            && self.inflection == other.inflection
            && self.pos == other.pos
    }
}

impl Eq for Morpheme {}

impl Hash for Morpheme {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.lemma.hash(state);
        self.inflection.hash(state);
        self.pos.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn identity_ignores_intervals_and_sub_pos() {
        let mut a = Morpheme::new("食べる", "食べた", "動詞", "一般");
        let b = Morpheme::new("食べる", "食べた", "動詞", "非自立可能");
        a.highest_lemma_learning_interval = Some(30);

        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn deinflected_is_idempotent() {
        let inflected = Morpheme::new("食べる", "食べた", "動詞", "一般");
        let base = inflected.deinflected();
        assert_eq!(base.inflection, "食べる");
        assert_eq!(base.deinflected(), base);
    }

    #[test]
    fn proper_noun_and_verb_checks() {
        let name = Morpheme::new("田中", "田中", "名詞", PROPER_NOUN_SUB_POS);
        assert!(name.is_proper_noun());

        let verb = Morpheme::new("走る", "走る", "動詞-一般", "");
        assert!(verb.is_verb("動詞"));
        assert!(!verb.is_verb("名詞"));
    }
}
