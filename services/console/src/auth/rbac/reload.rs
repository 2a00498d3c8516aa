//! Periodic bulk policy reload.
//!
//! # Purpose
//! Re-runs [`PolicyAdapter::load_policy`] on a fixed period so a fact base
//! that drifted after a failed incremental sync heals on its own.
//!
//! # Notes
//! - The first reload happens one period after spawn; startup performs its
//!   own load before serving.
//! - Reload failures are logged and the loop keeps going.
//! - [`ReloadHandle::stop`] wakes the loop immediately and waits for it to exit.
use crate::auth::rbac::sync::PolicyAdapter;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct PolicyReloader;

impl PolicyReloader {
    pub fn spawn(adapter: PolicyAdapter, period: Duration) -> ReloadHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    changed = stop_rx.changed() => {
                        // A dropped sender also means stop.
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                match adapter.load_policy().await {
                    Ok(set) => tracing::debug!(
                        permissions = set.permissions.len(),
                        groupings = set.groupings.len(),
                        "periodic policy reload complete"
                    ),
                    Err(err) => tracing::warn!(error = %err, "periodic policy reload failed"),
                }
            }
            tracing::info!("policy reloader stopped");
        });
        ReloadHandle {
            stop_tx,
            task: Some(task),
        }
    }
}

pub struct ReloadHandle {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ReloadHandle {
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "policy reloader task failed");
            }
        }
    }
}

impl Drop for ReloadHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
