//! Background persistence for a [`SessionStore`].
//!
//! A single tokio task ticks on a fixed interval: it saves every session that
//! is not busy, evicts idle ones, then deletes stored records past the
//! retention window. Shutdown stops the ticker and runs one final save that
//! waits for every session lock.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::store::{SaveReport, SessionStore};

/// Handle to a running autosave task.
pub struct AutosaveHandle {
    store: Arc<SessionStore>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SessionStore {
    /// Start the autosave timer on the current tokio runtime.
    pub fn spawn_autosave(self: &Arc<Self>, interval: Duration) -> AutosaveHandle {
        let store = Arc::clone(self);
        let (stop, mut stopped) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = store.save_all(false).await;
                        if report.failed > 0 {
                            warn!(failed = report.failed, "Autosave pass had failures");
                        }
                        store.evict_idle().await;
                        store.purge_expired().await;
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            debug!("Autosave timer stopping");
                            return;
                        }
                    }
                }
            }
        });

        info!(interval_secs = interval.as_secs(), "Autosave started");
        AutosaveHandle {
            store: Arc::clone(self),
            stop,
            task,
        }
    }
}

impl AutosaveHandle {
    /// Stop the timer, wait for it, and save every session.
    pub async fn shutdown(self) -> SaveReport {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Autosave task ended abnormally");
        }
        let report = self.store.save_all(true).await;
        info!(
            saved = report.saved,
            failed = report.failed,
            "Final session save complete"
        );
        report
    }
}
