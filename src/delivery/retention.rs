//! Retention: the two periodic tasks that eventually delete artifacts
//! and job rows.
//!
//! The stale-job sweeper and the scheduled-deletion executor run for the
//! lifetime of the process. Each pass is a plain function so tests can
//! drive them without the timers.

use chrono::Utc;
use std::fs;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RetentionSettings;
use crate::server::metrics;

use super::models::DeliveryStatus;
use super::notifier::{DeliveryEvent, DeliveryNotifier};
use super::registry::{DeletionSchedule, JobRegistry};

/// Spawn the sweeper and executor loops. Both run until the process
/// exits.
pub fn spawn_retention_tasks(
    registry: Arc<JobRegistry>,
    deletions: Arc<DeletionSchedule>,
    notifier: Arc<dyn DeliveryNotifier>,
    settings: RetentionSettings,
) -> (JoinHandle<()>, JoinHandle<()>) {
    info!(
        "Retention enabled: job TTL {}s (sweep every {}s), artifact delay {}s (tick every {}s)",
        settings.job_ttl_seconds,
        settings.sweep_interval_seconds,
        settings.artifact_delay_seconds,
        settings.deletion_tick_seconds,
    );

    let sweeper = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
                settings.sweep_interval_seconds,
            ));
            // Skip the immediate first tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sweep_stale_jobs(&registry, settings.job_ttl_seconds);
            }
        })
    };

    let executor = {
        let registry = Arc::clone(&registry);
        let deletions = Arc::clone(&deletions);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
                settings.deletion_tick_seconds,
            ));
            ticker.tick().await;
            loop {
                ticker.tick().await;
                run_due_deletions(&registry, &deletions, notifier.as_ref());
            }
        })
    };

    (sweeper, executor)
}

/// One sweeper pass: drop every job started more than `ttl_seconds` ago,
/// regardless of status, deleting old completed artifacts first.
///
/// A long-running worker whose row is evicted here notices at its next
/// liveness check and aborts cleanly.
pub fn sweep_stale_jobs(registry: &JobRegistry, ttl_seconds: u64) {
    let cutoff = Utc::now().timestamp() - ttl_seconds as i64;
    let purged = registry.purge_started_before(cutoff);
    if purged.is_empty() {
        return;
    }

    for job in &purged {
        if job.status == DeliveryStatus::Completed {
            if let (Some(path), Some(completed_at)) = (&job.artifact_path, job.completed_at) {
                if completed_at < cutoff && path.exists() {
                    match fs::remove_file(path) {
                        Ok(()) => {
                            metrics::record_artifact_deleted("ttl_sweep");
                            info!("Deleted expired artifact {}", path.display());
                        }
                        Err(e) => {
                            warn!("Could not delete expired artifact {}: {}", path.display(), e)
                        }
                    }
                }
            }
        }
        debug!(
            "Expired delivery job {} ({} - {})",
            job.id, job.artist_name, job.album_name
        );
    }
    metrics::set_active_jobs(registry.len());
    info!("Stale-job sweep removed {} job(s)", purged.len());
}

/// One executor pass: fire every due scheduled deletion.
///
/// The entry is dropped even when the unlink fails so an undeletable
/// file cannot wedge the loop; the job row still records the attempt.
pub fn run_due_deletions(
    registry: &JobRegistry,
    deletions: &DeletionSchedule,
    notifier: &dyn DeliveryNotifier,
) {
    let now = Utc::now().timestamp();
    for entry in deletions.take_due(now) {
        if entry.artifact_path.exists() {
            match fs::remove_file(&entry.artifact_path) {
                Ok(()) => {
                    metrics::record_artifact_deleted("auto_delete");
                    info!(
                        "Auto-deleted artifact for {} ({} - {})",
                        entry.job_id, entry.artist_name, entry.album_name
                    );
                }
                Err(e) => warn!(
                    "Could not auto-delete {}: {}",
                    entry.artifact_path.display(),
                    e
                ),
            }
        }

        registry.update(&entry.job_id, |j| {
            j.zip_auto_deleted = true;
            j.auto_deleted_at = Some(now);
            j.auto_delete_at = None;
        });

        notifier.notify(DeliveryEvent::FileAutoDeleted {
            job_id: entry.job_id.clone(),
            album_name: entry.album_name.clone(),
            artist_name: entry.artist_name.clone(),
        });
    }
}
