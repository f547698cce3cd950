use std::{
    collections::{
        HashMap,
        HashSet,
    },
    fs::File,
    io::{
        BufReader,
        BufWriter,
    },
    path::Path,
};

use serde::{
    Deserialize,
    Serialize,
};

use super::{
    FieldKey,
    Location,
    Morpheme,
};
use crate::core::MorphmineError;

/// Bookkeeping carried across recalcs. `last_preferences` is the canonical
/// JSON snapshot of the settings the database was built under — any change
/// invalidates the whole cache. `last_maturities` holds the seen/known/mature
/// bitmask per morph from the previous pass so a later pass can find morphs
/// whose classification moved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbMeta {
    pub last_preferences: Option<String>,
    pub last_updated: i64,
    pub last_maturities: HashMap<Morpheme, u8>,
}

/// The occurrence database: every morpheme mapped to the set of locations it
/// was extracted from. The fid and loc indices are derived views over this
/// map, recomputed from it so they can never drift out of sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MorphDb {
    db: HashMap<Morpheme, HashSet<Location>>,
    pub meta: DbMeta,
}

impl MorphDb {
    pub fn new() -> Self {
        MorphDb::default()
    }

    /// Load from disk, failing on a missing or unreadable file.
    pub fn load(path: &Path) -> Result<Self, MorphmineError> {
        let file = File::open(path)?;
        let mut raw = Vec::new();
        zstd::stream::copy_decode(BufReader::new(file), &mut raw)?;

        let (db, _): (MorphDb, usize) =
            bincode::serde::decode_from_slice(&raw, bincode::config::standard())?;
        Ok(db)
    }

    /// Load from disk, substituting an empty database when the file does not
    /// exist or cannot be read. First runs and deleted files are expected
    /// states, not errors.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(db) => db,
            Err(_) => MorphDb::new(),
        }
    }

    /// Persist as zstd-compressed bincode. Written to a sibling temp file and
    /// renamed into place so a crash mid-save never leaves a torn database.
    pub fn save(&self, path: &Path) -> Result<(), MorphmineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let encoded = bincode::serde::encode_to_vec(self, bincode::config::standard())?;

        let tmp_path = path.with_extension("tmp");
        let tmp = File::create(&tmp_path)?;
        zstd::stream::copy_encode(encoded.as_slice(), BufWriter::new(tmp), 0)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.db.clear();
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    pub fn morphs(&self) -> impl Iterator<Item = &Morpheme> {
        self.db.keys()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Morpheme, &HashSet<Location>)> {
        self.db.iter()
    }

    /// Record that every morph in `morphs` occurs at `loc`.
    pub fn add_location(&mut self, loc: &Location, morphs: &HashSet<Morpheme>) {
        for morph in morphs {
            self.db.entry(morph.clone()).or_default().insert(loc.clone());
        }
    }

    /// Fold a location→morphs map into the database.
    pub fn add_from_loc_db(&mut self, loc_db: &HashMap<Location, HashSet<Morpheme>>) {
        for (loc, morphs) in loc_db {
            self.add_location(loc, morphs);
        }
    }

    /// Replace the occurrence map with the contents of `loc_db`, keeping meta.
    pub fn rebuild_from_loc_db(&mut self, loc_db: &HashMap<Location, HashSet<Morpheme>>) {
        self.db.clear();
        self.add_from_loc_db(loc_db);
    }

    /// Union the occurrences of `other` into self. Collisions union the
    /// location sets; `other` is left untouched.
    pub fn merge(&mut self, other: &MorphDb) {
        for (morph, locs) in &other.db {
            let entry = self.db.entry(morph.clone()).or_default();
            for loc in locs {
                entry.insert(loc.clone());
            }
        }
    }

    /// New database keeping only locations more mature than `threshold`.
    /// Works off the derived loc index; never re-tokenizes anything.
    pub fn filter_by_maturity(&self, threshold: f32) -> MorphDb {
        let mut filtered = MorphDb::new();
        for (loc, morphs) in self.loc_db() {
            if loc.maturity.value() > threshold {
                filtered.add_location(&loc, &morphs);
            }
        }
        filtered
    }

    /// Number of distinct locations this morph was seen at; 0 if absent.
    pub fn frequency(&self, morph: &Morpheme) -> usize {
        self.db.get(morph).map_or(0, |locs| locs.len())
    }

    pub fn matches(&self, morph: &Morpheme) -> bool {
        self.frequency(morph) > 0
    }

    pub fn matching_locs(&self, morph: &Morpheme) -> Option<&HashSet<Location>> {
        self.db.get(morph)
    }

    /// Inverse index: location → morphs extracted there.
    pub fn loc_db(&self) -> HashMap<Location, HashSet<Morpheme>> {
        let mut loc_db: HashMap<Location, HashSet<Morpheme>> = HashMap::new();
        for (morph, locs) in &self.db {
            for loc in locs {
                loc_db.entry(loc.clone()).or_default().insert(morph.clone());
            }
        }
        loc_db
    }

    /// Field-slot index: (note, guid, field) → the location last recorded
    /// there. Used to detect unchanged text and skip re-tokenization.
    pub fn fid_db(&self) -> HashMap<FieldKey, Location> {
        let mut fid_db = HashMap::new();
        for locs in self.db.values() {
            for loc in locs {
                fid_db.insert(loc.field_key(), loc.clone());
            }
        }
        fid_db
    }

    /// Distinct lemmas across the database.
    pub fn lemma_count(&self) -> usize {
        let lemmas: HashSet<&str> = self.db.keys().map(|m| m.lemma.as_str()).collect();
        lemmas.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morph::Maturity;

    fn morph(lemma: &str, inflection: &str) -> Morpheme {
        Morpheme::new(lemma, inflection, "名詞", "")
    }

    fn loc(note_id: i64, field: &str, maturity: f32) -> Location {
        Location::new(note_id, &format!("guid{}", note_id), field, "text", Maturity::days(maturity))
    }

    fn db_with(entries: &[(Morpheme, Location)]) -> MorphDb {
        let mut db = MorphDb::new();
        for (m, l) in entries {
            let mut set = HashSet::new();
            set.insert(m.clone());
            db.add_location(l, &set);
        }
        db
    }

    #[test]
    fn frequency_counts_distinct_locations() {
        let m = morph("学生", "学生");
        let db = db_with(&[(m.clone(), loc(1, "Front", 0.0)), (m.clone(), loc(2, "Front", 5.0))]);

        assert_eq!(db.frequency(&m), 2);
        assert!(db.matches(&m));
        assert_eq!(db.frequency(&morph("先生", "先生")), 0);
    }

    #[test]
    fn merge_is_commutative_and_associative_on_frequencies() {
        let m1 = morph("学生", "学生");
        let m2 = morph("先生", "先生");

        let a = db_with(&[(m1.clone(), loc(1, "Front", 0.0))]);
        let b = db_with(&[(m1.clone(), loc(2, "Front", 3.0)), (m2.clone(), loc(2, "Back", 3.0))]);
        let c = db_with(&[(m2.clone(), loc(3, "Front", 9.0))]);

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        for m in [&m1, &m2] {
            assert_eq!(ab.frequency(m), ba.frequency(m));
        }

        let mut abc = ab.clone();
        abc.merge(&c);
        let mut cba = c.clone();
        cba.merge(&b);
        cba.merge(&a);

        for m in [&m1, &m2] {
            assert_eq!(abc.frequency(m), cba.frequency(m));
        }

        // merging shared locations does not double count
        let mut aa = a.clone();
        aa.merge(&a);
        assert_eq!(aa.frequency(&m1), a.frequency(&m1));
    }

    #[test]
    fn maturity_filter_is_monotone_in_threshold() {
        let m = morph("学生", "学生");
        let db = db_with(&[
            (m.clone(), loc(1, "Front", 0.0)),
            (m.clone(), loc(2, "Front", 5.0)),
            (m.clone(), loc(3, "Front", 30.0)),
        ]);

        let loose = db.filter_by_maturity(0.0);
        let strict = db.filter_by_maturity(21.0);

        assert_eq!(loose.frequency(&m), 2);
        assert_eq!(strict.frequency(&m), 1);

        // every location surviving the strict filter survives the loose one
        let loose_locs = loose.matching_locs(&m).unwrap();
        for surviving in strict.matching_locs(&m).unwrap() {
            assert!(loose_locs.contains(surviving));
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.db");

        let m = morph("学生", "学生");
        let mut db = db_with(&[(m.clone(), loc(1, "Front", 0.5))]);
        db.meta.last_updated = 1234;
        db.meta.last_preferences = Some("{\"snapshot\":true}".to_string());
        db.meta.last_maturities.insert(m.clone(), 0b011);

        db.save(&path).unwrap();
        let loaded = MorphDb::load(&path).unwrap();

        assert_eq!(loaded.meta, db.meta);
        assert_eq!(loaded.len(), db.len());
        assert_eq!(loaded.matching_locs(&m), db.matching_locs(&m));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn missing_file_substitutes_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.db");

        assert!(MorphDb::load(&path).is_err());
        assert!(MorphDb::load_or_empty(&path).is_empty());
    }

    #[test]
    fn indices_stay_consistent_after_rebuild() {
        let m = morph("学生", "学生");
        let mut db = db_with(&[(m.clone(), loc(1, "Front", 0.0))]);
        db.meta.last_updated = 7;

        let mut loc_db = db.loc_db();
        let old = loc(1, "Front", 0.0);
        let morphs = loc_db.remove(&old).unwrap();
        loc_db.insert(old.with_maturity(Maturity::days(21.0)), morphs);

        db.rebuild_from_loc_db(&loc_db);

        assert_eq!(db.meta.last_updated, 7);
        let fid = db.fid_db();
        let entry = fid.get(&old.field_key()).unwrap();
        assert_eq!(entry.maturity, Maturity::days(21.0));
        assert_eq!(db.loc_db().len(), 1);
    }
}
