use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::draft_store::SharedDraft;
use crate::model::{Phase, SavedState};
use crate::workflow::save_snapshot;

/// Background task that rewrites the draft at a fixed interval while the
/// session is in the writing phase. Stops when dropped.
#[derive(Debug)]
pub struct Autosaver {
    handle: JoinHandle<()>,
}

impl Autosaver {
    pub fn spawn(
        draft: SharedDraft,
        mut snapshots: watch::Receiver<SavedState>,
        every: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if snapshots.has_changed().is_err() {
                    tracing::debug!("session closed; autosave stopped");
                    break;
                }

                // Read the snapshot only under the lock: the session publishes
                // before it writes or deletes the draft.
                let _lock = draft.lock().await;
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.phase != Phase::Writing {
                    continue;
                }
                match save_snapshot(draft.store().as_ref(), &snapshot).await {
                    Ok(()) => tracing::debug!(write = %snapshot.write_cursor, "autosave"),
                    Err(err) => {
                        let message = format!("{err:#}");
                        tracing::warn!(error = %message, "autosave failed");
                        draft.record_warning(message);
                    }
                }
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for Autosaver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
