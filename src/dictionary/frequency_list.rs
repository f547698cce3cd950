use std::{
    collections::HashMap,
    fs,
    path::Path,
};

use crate::morph::Morpheme;

/// Header row marking the morpheme-keyed study-plan format.
pub const STUDY_PLAN_HEADER: &str = "#study_plan_frequency";

/// A user-supplied corpus frequency list. Two tab-separated layouts exist:
/// the study-plan export keys whole morphemes (lemma, inflection, pos,
/// sub-pos plus two informational columns), a plain list keys lemmas one per
/// row. Rank is the 0-based row index; lower rank means more frequent.
#[derive(Debug, Clone)]
pub enum FrequencyList {
    Morphemes(HashMap<Morpheme, usize>),
    Lemmas(HashMap<String, usize>),
}

impl FrequencyList {
    pub fn empty() -> Self {
        FrequencyList::Lemmas(HashMap::new())
    }

    /// Read a list from disk. A missing or malformed file yields an empty
    /// list — first runs without one are an expected state.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents),
            Err(_) => FrequencyList::empty(),
        }
    }

    pub fn parse(contents: &str) -> Self {
        let mut lines = contents.lines().filter(|line| !line.trim().is_empty());

        let first = match lines.next() {
            Some(line) => line,
            None => return FrequencyList::empty(),
        };

        if first.split('\t').next() == Some(STUDY_PLAN_HEADER) {
            let mut map = HashMap::new();
            for (rank, line) in lines.enumerate() {
                let columns: Vec<&str> = line.split('\t').collect();
                if columns.len() < 6 {
                    continue;
                }
                map.entry(Morpheme::new(columns[0], columns[1], columns[2], columns[3]))
                    .or_insert(rank);
            }
            FrequencyList::Morphemes(map)
        } else {
            let mut map = HashMap::new();
            for (rank, line) in std::iter::once(first).chain(lines).enumerate() {
                let word = line.split('\t').next().unwrap_or("").trim();
                if word.is_empty() {
                    continue;
                }
                map.entry(word.to_string()).or_insert(rank);
            }
            FrequencyList::Lemmas(map)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FrequencyList::Morphemes(map) => map.len(),
            FrequencyList::Lemmas(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rank of a morph in the list, matching by full identity for the
    /// study-plan format and by lemma for the plain format.
    pub fn rank(&self, morph: &Morpheme) -> Option<usize> {
        match self {
            FrequencyList::Morphemes(map) => map.get(morph).copied(),
            FrequencyList::Lemmas(map) => map.get(&morph.lemma).copied(),
        }
    }
}
