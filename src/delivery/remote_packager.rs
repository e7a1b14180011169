//! Remote-mode packager: stages the album into a per-job scratch
//! directory on the remote host, streams a tar.gz of it back over the
//! shell channel, and cleans up after itself.
//!
//! Phase order and progress: `ssh_preparing` (5) → `ssh_transferring`
//! (10→65) → `ssh_compressing` (65→90) → `ssh_cleaning` (90→100) →
//! `completed`. Scratch pre-cleaning and `mkdir` may fail without
//! aborting; a hard copy failure aborts. A cleanup failure after the
//! artifact is written only warns.

use byte_unit::{Byte, UnitType};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog_store::AlbumRecord;
use crate::server::metrics;

use super::error::DeliveryError;
use super::models::DeliveryStatus;
use super::notifier::{DeliveryEvent, DeliveryNotifier};
use super::registry::JobRegistry;
use super::remote_shell::{RemoteShell, RemoteShellError};
use super::resolver::{artifact_basename, scratch_dir_name};

const REMOTE_SCRATCH_PARENT: &str = "/tmp";

enum RemoteOutcome {
    Completed {
        artifact_path: PathBuf,
        artifact_size: u64,
    },
    Aborted,
}

pub struct RemotePackager {
    registry: Arc<JobRegistry>,
    notifier: Arc<dyn DeliveryNotifier>,
    downloads_dir: PathBuf,
    shell: RemoteShell,
}

impl RemotePackager {
    pub fn new(
        registry: Arc<JobRegistry>,
        notifier: Arc<dyn DeliveryNotifier>,
        downloads_dir: PathBuf,
        shell: RemoteShell,
    ) -> Self {
        Self {
            registry,
            notifier,
            downloads_dir,
            shell,
        }
    }

    /// Run one remote delivery to completion.
    pub async fn run(&self, job_id: &str, album: &AlbumRecord, source: &Path) {
        match self.package(job_id, album, source).await {
            Ok(RemoteOutcome::Completed {
                artifact_path,
                artifact_size,
            }) => {
                metrics::record_delivery_completed(artifact_size);
                info!(
                    "Delivery {} completed: {} ({:.2})",
                    job_id,
                    artifact_path.display(),
                    Byte::from_u64(artifact_size).get_appropriate_unit(UnitType::Binary)
                );
                let artifact_name = artifact_path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.notifier.notify(DeliveryEvent::DownloadCompleted {
                    job_id: job_id.to_string(),
                    album_name: album.name.clone(),
                    artist_name: album.artist_name.clone(),
                    artifact_name,
                    artifact_size_bytes: artifact_size,
                });
            }
            Ok(RemoteOutcome::Aborted) => {
                debug!("Delivery {} aborted: job row was purged mid-run", job_id);
            }
            Err(e) => {
                metrics::record_delivery_failed(e.kind());
                warn!("Delivery {} failed: {}", job_id, e);
                self.registry
                    .update(job_id, |j| j.mark_error(e.kind(), e.to_string()));
                self.notifier.notify(DeliveryEvent::DownloadError {
                    job_id: job_id.to_string(),
                    album_name: album.name.clone(),
                    artist_name: album.artist_name.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    async fn package(
        &self,
        job_id: &str,
        album: &AlbumRecord,
        source: &Path,
    ) -> Result<RemoteOutcome, DeliveryError> {
        let source = source.to_string_lossy().into_owned();

        let alive = self.registry.update(job_id, |j| {
            j.status = DeliveryStatus::SshPreparing;
            j.set_progress(5);
            j.current_item = Some("checking remote directory".to_string());
        });
        if alive.is_none() {
            return Ok(RemoteOutcome::Aborted);
        }

        if !self.shell.test_dir(&source).await.map_err(DeliveryError::from)? {
            return Err(DeliveryError::SourceMissing(PathBuf::from(&source)));
        }

        if self
            .registry
            .update(job_id, |j| {
                j.status = DeliveryStatus::SshTransferring;
                j.set_progress(10);
                j.current_item = Some("staging files".to_string());
            })
            .is_none()
        {
            return Ok(RemoteOutcome::Aborted);
        }

        let scratch_name = scratch_dir_name(&album.artist_name, &album.name);
        let scratch = format!("{}/{}", REMOTE_SCRATCH_PARENT, scratch_name);

        // Pre-clean and mkdir tolerate command-level failures; a leftover
        // scratch from a crashed run must not block this one
        tolerate(job_id, "scratch pre-clean", self.shell.remove_tree(&scratch).await)?;
        tolerate(job_id, "scratch mkdir", self.shell.make_dir(&scratch).await)?;

        if let Err(e) = self.shell.stage(&source, &scratch).await {
            self.cleanup_scratch(job_id, &scratch).await;
            return Err(e.into());
        }

        if self
            .registry
            .update(job_id, |j| {
                j.status = DeliveryStatus::SshCompressing;
                j.set_progress(65);
                j.current_item = Some("compressing".to_string());
            })
            .is_none()
        {
            self.cleanup_scratch(job_id, &scratch).await;
            return Ok(RemoteOutcome::Aborted);
        }

        fs::create_dir_all(&self.downloads_dir).map_err(|e| {
            DeliveryError::ArchiveWriteFailed(format!(
                "cannot create downloads directory {}: {}",
                self.downloads_dir.display(),
                e
            ))
        })?;
        let artifact_name = format!(
            "{}.tar.gz",
            artifact_basename(&album.artist_name, &album.name)
        );
        let artifact_path = self.downloads_dir.join(&artifact_name);

        if let Err(e) = self
            .shell
            .archive_to_file(REMOTE_SCRATCH_PARENT, &scratch_name, &artifact_path)
            .await
        {
            let _ = fs::remove_file(&artifact_path);
            self.cleanup_scratch(job_id, &scratch).await;
            return Err(e.into());
        }

        if self
            .registry
            .update(job_id, |j| {
                j.status = DeliveryStatus::SshCleaning;
                j.set_progress(90);
                j.current_item = Some("cleaning remote scratch".to_string());
            })
            .is_none()
        {
            let _ = fs::remove_file(&artifact_path);
            self.cleanup_scratch(job_id, &scratch).await;
            return Ok(RemoteOutcome::Aborted);
        }

        // The artifact is usable from here on; cleanup failures only warn
        self.cleanup_scratch(job_id, &scratch).await;

        let artifact_size = fs::metadata(&artifact_path)?.len();
        let completed_at = Utc::now().timestamp();
        let updated = self.registry.update(job_id, |j| {
            j.artifact_path = Some(artifact_path.clone());
            j.artifact_name = Some(artifact_name.clone());
            j.artifact_size_bytes = Some(artifact_size);
            j.status = DeliveryStatus::Completed;
            j.set_progress(100);
            j.completed_at = Some(completed_at);
            j.current_item = None;
        });
        if updated.is_none() {
            let _ = fs::remove_file(&artifact_path);
            return Ok(RemoteOutcome::Aborted);
        }

        Ok(RemoteOutcome::Completed {
            artifact_path,
            artifact_size,
        })
    }

    async fn cleanup_scratch(&self, job_id: &str, scratch: &str) {
        if let Err(e) = self.shell.remove_tree(scratch).await {
            warn!(
                "Delivery {}: could not remove remote scratch {}: {}",
                job_id, scratch, e
            );
        }
    }
}

/// Swallow command-level failures for operations that are allowed to
/// fail (already-absent, already-present); channel failures still abort.
fn tolerate(
    job_id: &str,
    what: &str,
    result: Result<(), RemoteShellError>,
) -> Result<(), DeliveryError> {
    match result {
        Ok(()) => Ok(()),
        Err(RemoteShellError::CommandFailed { code, stderr }) => {
            warn!(
                "Delivery {}: {} exited {} ({}), continuing",
                job_id, what, code, stderr
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
