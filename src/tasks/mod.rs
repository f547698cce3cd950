use std::{
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        mpsc,
        Arc,
        Mutex,
    },
    thread,
};

use crate::{
    config::Preferences,
    core::MorphmineError,
    notes::NoteStore,
    recalc::{
        self,
        AllDbCache,
        RecalcEvent,
    },
    segmentation::MorphemizerRegistry,
};

/// Runs recalculations off the interactive thread. One background slot: a
/// second start while a run is in flight is rejected, never interleaved.
/// The host polls `poll_events` from its own context to drive progress UI;
/// the worker itself touches nothing but the store it was handed.
pub struct RecalcManager {
    sender: mpsc::Sender<RecalcEvent>,
    receiver: mpsc::Receiver<RecalcEvent>,
    running: Arc<AtomicBool>,
}

impl RecalcManager {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        RecalcManager { sender, receiver, running: Arc::new(AtomicBool::new(false)) }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Drain whatever the worker has published since the last poll.
    pub fn poll_events(&mut self) -> Vec<RecalcEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Kick off a recalculation in the background. The store and cache are
    /// locked for the duration of the run; completion arrives as a
    /// `RecalcEvent::Finished` carrying either the summary or a displayable
    /// message.
    pub fn start<S: NoteStore + 'static>(
        &self,
        store: Arc<Mutex<S>>,
        prefs: Preferences,
        registry: Arc<MorphemizerRegistry>,
        cache: Arc<Mutex<AllDbCache>>,
    ) -> Result<(), MorphmineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MorphmineError::RecalcInProgress);
        }

        let sender = self.sender.clone();
        let running = self.running.clone();

        thread::spawn(move || {
            // mpsc senders are not Sync; the scoring loop reports progress
            // from many threads, so funnel events through a mutex
            let progress_sender = Mutex::new(sender.clone());
            let progress = move |event: RecalcEvent| {
                if let Ok(progress_sender) = progress_sender.lock() {
                    let _ = progress_sender.send(event);
                }
            };

            let result = match (store.lock(), cache.lock()) {
                (Ok(mut store), Ok(mut cache)) => {
                    recalc::run(&mut *store, &prefs, &registry, &mut *cache, &progress)
                }
                _ => Err(MorphmineError::Custom(
                    "Note store or cache lock was poisoned".to_string(),
                )),
            };

            let finished = match result {
                Ok(summary) => Ok(summary),
                Err(e) => Err(e.remediation().unwrap_or_else(|| e.to_string())),
            };
            let _ = sender.send(RecalcEvent::Finished(finished));

            running.store(false, Ordering::SeqCst);
        });

        Ok(())
    }
}

impl Default for RecalcManager {
    fn default() -> Self {
        RecalcManager::new()
    }
}
