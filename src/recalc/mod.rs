use std::{
    path::{
        Path,
        PathBuf,
    },
    time::SystemTime,
};

pub mod all_db;
pub mod card_metrics;
pub mod update_notes;

pub use all_db::make_all_db;
pub use card_metrics::{
    CardMorphMap,
    CardMorphsMetrics,
    MorphPriorities,
};
pub use update_notes::{
    update_notes,
    UpdateOutcome,
    DUE_SENTINEL,
};

use crate::{
    config::Preferences,
    core::{
        log,
        MorphmineError,
    },
    morph::MorphDb,
    notes::NoteStore,
    segmentation::MorphemizerRegistry,
    stats::{
        self,
        MorphStats,
    },
};

/// Progress and completion notifications published by a recalc run. The
/// worker only ever emits these; rendering them is the host's business, on
/// its own execution context.
#[derive(Debug, Clone)]
pub enum RecalcEvent {
    Label(String),
    Progress { done: usize, total: usize },
    Finished(Result<RecalcSummary, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecalcSummary {
    pub notes_scored: usize,
    pub notes_changed: usize,
    pub cards_changed: usize,
    pub stats: MorphStats,
}

/// Session-scoped cache of the all-encompassing database so consecutive
/// recalcs skip the disk load. Owned by whoever drives the pipeline and
/// passed down explicitly; the cached copy is dropped whenever the backing
/// file disappeared or was modified behind our back.
#[derive(Default)]
pub struct AllDbCache {
    entry: Option<CacheEntry>,
}

struct CacheEntry {
    path: PathBuf,
    modified: Option<SystemTime>,
    db: MorphDb,
}

impl AllDbCache {
    pub fn new() -> Self {
        AllDbCache::default()
    }

    /// Hand out the database for `path`: the cached copy when it is still
    /// current, otherwise whatever is on disk (empty on a first run).
    pub fn take(&mut self, path: &Path) -> MorphDb {
        if let Some(entry) = self.entry.take() {
            if entry.path == path && entry.modified == disk_modified(path) {
                return entry.db;
            }
        }
        MorphDb::load_or_empty(path)
    }

    /// Put the up-to-date database back, recording the on-disk state it
    /// corresponds to.
    pub fn store(&mut self, path: &Path, db: MorphDb) {
        self.entry =
            Some(CacheEntry { path: path.to_path_buf(), modified: disk_modified(path), db });
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.entry.as_ref().is_some_and(|entry| entry.path == path)
    }
}

fn disk_modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

/// One full recalculation: refresh the all-encompassing database, merge the
/// external database, rescore and rewrite the notes, refresh the stats
/// cache. On a configuration error nothing has been written back and the
/// on-disk databases are untouched.
pub fn run<S: NoteStore>(
    store: &mut S,
    prefs: &Preferences,
    registry: &MorphemizerRegistry,
    cache: &mut AllDbCache,
    progress: &(dyn Fn(RecalcEvent) + Sync),
) -> Result<RecalcSummary, MorphmineError> {
    log::printf(&prefs.paths.log, "Recalc started");

    let result = run_pipeline(store, prefs, registry, cache, progress);

    match &result {
        Ok(summary) => log::printf(
            &prefs.paths.log,
            &format!(
                "Recalc finished: {} notes scored, {} notes changed, {} cards reordered",
                summary.notes_scored, summary.notes_changed, summary.cards_changed
            ),
        ),
        Err(e) => log::printf(&prefs.paths.log, &format!("Recalc failed: {}", e)),
    }

    result
}

fn run_pipeline<S: NoteStore>(
    store: &mut S,
    prefs: &Preferences,
    registry: &MorphemizerRegistry,
    cache: &mut AllDbCache,
    progress: &(dyn Fn(RecalcEvent) + Sync),
) -> Result<RecalcSummary, MorphmineError> {
    progress(RecalcEvent::Label("Loading existing all.db".to_string()));
    let current = if prefs.load_cached_all_db {
        cache.take(&prefs.paths.all)
    } else {
        MorphDb::new()
    };

    let mut all_db = make_all_db(store, prefs, registry, current, progress)?;

    progress(RecalcEvent::Label("Merging external.db".to_string()));
    let external = MorphDb::load_or_empty(&prefs.paths.external);
    all_db.merge(&external);

    let outcome = update_notes(store, prefs, &mut all_db, progress)?;

    progress(RecalcEvent::Label("Updating stats".to_string()));
    let stats = stats::update_stats(&outcome.known_db, &prefs.paths.stats)?;

    cache.store(&prefs.paths.all, all_db);

    Ok(RecalcSummary {
        notes_scored: outcome.notes_scored,
        notes_changed: outcome.notes_changed,
        cards_changed: outcome.cards_changed,
        stats,
    })
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
    fn cache_reuses_until_the_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.db");

        let mut db = MorphDb::new();
        let mut morphs = HashSet::new();
        morphs.insert(Morpheme::new("a", "a", "X", ""));
        db.add_location(&Location::new(1, "g", "Front", "a", Maturity::NONE), &morphs);
        db.save(&path).unwrap();

        let mut cache = AllDbCache::new();
        cache.store(&path, db);
        assert!(cache.is_cached(&path));

        // untouched file: the cached copy comes back
        let db = cache.take(&path);
        assert_eq!(db.len(), 1);

        // deleted file: the cache is dropped and an empty db substituted
        cache.store(&path, db);
        std::fs::remove_file(&path).unwrap();
        assert!(cache.take(&path).is_empty());
    }
}
