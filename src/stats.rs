use std::{
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

use crate::{
    core::MorphmineError,
    morph::MorphDb,
};

/// Aggregate counts the toolbar shows, derived from the known database.
/// `total_variations` counts distinct morphemes (every inflection its own
/// entry), `total_known` counts distinct lemmas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphStats {
    pub total_variations: usize,
    pub total_known: usize,
}

/// Recompute the stats cache from the known database and persist it.
pub fn update_stats(known_db: &MorphDb, path: &Path) -> Result<MorphStats, MorphmineError> {
    let stats = MorphStats {
        total_variations: known_db.len(),
        total_known: known_db.lemma_count(),
    };
    save_stats(&stats, path)?;
    Ok(stats)
}

pub fn save_stats(stats: &MorphStats, path: &Path) -> Result<(), MorphmineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let encoded = bincode::serde::encode_to_vec(stats, bincode::config::standard())?;

    let tmp_path = path.with_extension("tmp");
    let tmp = File::create(&tmp_path)?;
    zstd::stream::copy_encode(encoded.as_slice(), BufWriter::new(tmp), 0)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load the cached stats; None when the cache is missing or unreadable, in
/// which case the caller recomputes on the next recalc.
pub fn load_stats(path: &Path) -> Option<MorphStats> {
    let file = File::open(path).ok()?;
    let mut raw = Vec::new();
    zstd::stream::copy_decode(BufReader::new(file), &mut raw).ok()?;

    bincode::serde::decode_from_slice(&raw, bincode::config::standard())
        .map(|(stats, _)| stats)
        .ok()
}

/// Toolbar text for the distinct-lemma count: (label, hover detail).
pub fn unique_morph_toolbar_stats(stats: Option<&MorphStats>) -> (String, String) {
    match stats {
        Some(stats) => {
            (format!("U: {}", stats.total_known), "U = Known Unique Morphs".to_string())
        }
        None => ("U ???".to_string(), "???".to_string()),
    }
}

/// Toolbar text for the all-variations count: (label, hover detail).
pub fn all_morph_toolbar_stats(stats: Option<&MorphStats>) -> (String, String) {
    match stats {
        Some(stats) => {
            (format!("A: {}", stats.total_variations), "A = All Known Morphs".to_string())
        }
        None => ("A ????".to_string(), "???".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::morph::{
        Location,
        Maturity,
        Morpheme,
    };

    #[test]
    fn stats_count_variations_and_lemmas() {
        let mut db = MorphDb::new();
        let loc = Location::new(1, "g1", "Front", "text", Maturity::days(21.0));
        let morphs: HashSet<Morpheme> = [
            Morpheme::new("食べる", "食べる", "動詞", ""),
            Morpheme::new("食べる", "食べた", "動詞", ""),
            Morpheme::new("学生", "学生", "名詞", ""),
        ]
        .into_iter()
        .collect();
        db.add_location(&loc, &morphs);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.db");
        let stats = update_stats(&db, &path).unwrap();

        assert_eq!(stats.total_variations, 3);
        assert_eq!(stats.total_known, 2);
        assert_eq!(load_stats(&path), Some(stats));
    }

    #[test]
    fn missing_cache_reports_placeholders() {
        assert_eq!(load_stats(Path::new("/nonexistent/stats.db")), None);

        let (label, _) = unique_morph_toolbar_stats(None);
        assert_eq!(label, "U ???");

        let stats = MorphStats { total_variations: 10, total_known: 7 };
        let (label, _) = unique_morph_toolbar_stats(Some(&stats));
        assert_eq!(label, "U: 7");
        let (label, _) = all_morph_toolbar_stats(Some(&stats));
        assert_eq!(label, "A: 10");
    }
}
