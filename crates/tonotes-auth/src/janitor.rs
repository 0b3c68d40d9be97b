//! Periodic sweep of expired sessions.
//!
//! Removes `session:` cache entries whose `expires_at` has passed and deletes
//! expired session records. Runs on a fixed `tokio::time::interval` until the
//! owner cancels it.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::session::SessionRegistry;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(sessions: Arc<SessionRegistry>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Session janitor started");

    let mut interval = tokio::time::interval(every);
    // The first tick completes immediately; skip it so startup does not sweep
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session janitor stopping");
                break;
            }
            _ = interval.tick() => sweep_once(&sessions).await,
        }
    }
}

/// Spawn [`run`] on the current runtime.
pub fn spawn(
    sessions: Arc<SessionRegistry>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run(sessions, every, cancel))
}

async fn sweep_once(sessions: &SessionRegistry) {
    match sessions.sweep_expired().await {
        Ok((cached, records)) => {
            if cached > 0 || records > 0 {
                tracing::info!(cached, records, "Session janitor: purged expired sessions");
            } else {
                tracing::debug!("Session janitor: nothing to purge");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Session janitor: sweep failed");
        }
    }
}
