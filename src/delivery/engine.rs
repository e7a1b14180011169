//! Orchestration façade for album deliveries.
//!
//! Owns the job registry, the deletion schedule, and the notifier, and
//! spawns one packager worker per start request. HTTP handlers talk to
//! this type only.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog_store::CatalogStore;
use crate::config::DeliverySettings;
use crate::server::metrics;

use super::error::DeliveryError;
use super::extractor;
use super::local_packager::LocalPackager;
use super::models::{DeliveryJob, DeliveryMode, DeliveryStatus, ScheduledDeletion};
use super::notifier::{DeliveryEvent, DeliveryNotifier};
use super::registry::{DeletionSchedule, JobRegistry};
use super::remote_packager::RemotePackager;
use super::remote_shell::RemoteShell;
use super::resolver::resolve_source_path;

/// Response payload for a successfully started delivery.
#[derive(Debug, Clone, Serialize)]
pub struct StartedDelivery {
    pub job_id: String,
    pub status: DeliveryStatus,
    pub album_name: String,
    pub artist_name: String,
    pub mode: DeliveryMode,
}

/// Full job row plus the fields pollers derive from it.
#[derive(Debug, Serialize)]
pub struct JobStatusView {
    #[serde(flatten)]
    pub job: DeliveryJob,
    /// Seconds from start to completion/error, or to now while running.
    pub time_running: i64,
    pub auto_delete_scheduled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_delete_time_remaining: Option<i64>,
    /// Only present for completed jobs: whether the artifact is still on
    /// disk. Pollers must re-check before offering a download.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_exists: Option<bool>,
    /// Set when the requested id was resolved leniently.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// What the fetch handler needs to stream an artifact.
#[derive(Debug)]
pub struct FetchArtifact {
    pub path: PathBuf,
    pub download_name: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractSummary {
    pub extract_path: String,
    pub extracted_files: usize,
    pub total_size: u64,
    pub zip_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_errors: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct CancelledDeletion {
    pub was_scheduled_for: i64,
    pub time_remaining: i64,
}

pub struct DeliveryEngine {
    catalog_store: Arc<dyn CatalogStore>,
    registry: Arc<JobRegistry>,
    deletions: Arc<DeletionSchedule>,
    notifier: Arc<dyn DeliveryNotifier>,
    settings: DeliverySettings,
}

impl DeliveryEngine {
    pub fn new(
        catalog_store: Arc<dyn CatalogStore>,
        notifier: Arc<dyn DeliveryNotifier>,
        settings: DeliverySettings,
    ) -> Self {
        Self {
            catalog_store,
            registry: Arc::new(JobRegistry::new()),
            deletions: Arc::new(DeletionSchedule::new()),
            notifier,
            settings,
        }
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn deletions(&self) -> Arc<DeletionSchedule> {
        Arc::clone(&self.deletions)
    }

    pub fn notifier(&self) -> Arc<dyn DeliveryNotifier> {
        Arc::clone(&self.notifier)
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    /// Start a delivery: create the job row and spawn the packager
    /// worker for the configured mode.
    pub fn start_delivery(&self, album_id: i64) -> Result<StartedDelivery, DeliveryError> {
        let album = self
            .catalog_store
            .get_album(album_id)
            .map_err(DeliveryError::Catalog)?
            .ok_or(DeliveryError::AlbumNotFound(album_id))?;

        let source = resolve_source_path(&album, &self.settings.music_library_root)?;
        let mode = self.settings.mode;
        // Validated at config resolution; a missing section here is a
        // wiring bug, not a user error
        let remote = match mode {
            DeliveryMode::Remote => Some(self.settings.remote.clone().ok_or_else(|| {
                DeliveryError::RemoteUnreachable(
                    "remote mode configured without remote settings".to_string(),
                )
            })?),
            DeliveryMode::Local => None,
        };
        let job_id = JobRegistry::new_job_id(album_id);
        let job = DeliveryJob::new(job_id.clone(), &album, mode);
        self.registry.insert(job);

        metrics::record_delivery_started(mode.as_str());
        metrics::set_active_jobs(self.registry.len());
        info!(
            "Starting {} delivery {} for '{}' by '{}' ({})",
            mode.as_str(),
            job_id,
            album.name,
            album.artist_name,
            source.display()
        );
        self.notifier.notify(DeliveryEvent::DownloadStarted {
            job_id: job_id.clone(),
            album_name: album.name.clone(),
            artist_name: album.artist_name.clone(),
            mode,
        });

        let started = StartedDelivery {
            job_id: job_id.clone(),
            status: DeliveryStatus::Starting,
            album_name: album.name.clone(),
            artist_name: album.artist_name.clone(),
            mode,
        };

        match remote {
            None => {
                let packager = LocalPackager::new(
                    self.registry(),
                    self.notifier(),
                    self.settings.downloads_dir.clone(),
                );
                tokio::task::spawn_blocking(move || packager.run(&job_id, &album, &source));
            }
            Some(remote) => {
                let packager = RemotePackager::new(
                    self.registry(),
                    self.notifier(),
                    self.settings.downloads_dir.clone(),
                    RemoteShell::new(&remote),
                );
                tokio::spawn(async move { packager.run(&job_id, &album, &source).await });
            }
        }

        Ok(started)
    }

    /// Look up a job (leniently) and derive the poller-facing fields.
    pub fn job_status(&self, requested: &str) -> Result<JobStatusView, DeliveryError> {
        let resolved = self
            .registry
            .resolve(requested)
            .ok_or_else(|| DeliveryError::JobNotFound(requested.to_string()))?;
        let job = resolved.job;
        let now = Utc::now().timestamp();

        let scheduled = self.deletions.get(&job.id);
        let file_exists = match job.status {
            DeliveryStatus::Completed => {
                Some(job.artifact_path.as_ref().map(|p| p.exists()).unwrap_or(false))
            }
            _ => None,
        };
        let reference = job.completed_at.or(job.error_at).unwrap_or(now);

        let (actual_job_id, note) = if resolved.exact {
            (None, None)
        } else {
            (
                Some(job.id.clone()),
                Some(format!(
                    "requested job '{}' matched completed job '{}'",
                    requested, job.id
                )),
            )
        };

        Ok(JobStatusView {
            time_running: (reference - job.started_at).max(0),
            auto_delete_scheduled: scheduled.is_some(),
            auto_delete_time_remaining: scheduled.map(|s| (s.delete_at - now).max(0)),
            file_exists,
            actual_job_id,
            note,
            job,
        })
    }

    /// Validate a fetch, bump the download counter, and schedule the
    /// timed deletion on the first fetch.
    pub fn prepare_fetch(&self, requested: &str) -> Result<FetchArtifact, DeliveryError> {
        let resolved = self
            .registry
            .resolve(requested)
            .ok_or_else(|| DeliveryError::JobNotFound(requested.to_string()))?;
        let job = resolved.job;

        if job.status != DeliveryStatus::Completed {
            return Err(DeliveryError::NotCompleted(job.id.clone()));
        }
        let Some(path) = job.artifact_path.clone() else {
            // Completed without an artifact is a truncated row
            return Err(DeliveryError::NotCompleted(job.id.clone()));
        };
        if !path.exists() {
            return Err(DeliveryError::ArtifactMissing(path));
        }

        let was_first = self
            .registry
            .update(&job.id, |j| {
                let first = j.download_count == 0;
                j.download_count += 1;
                first
            })
            .ok_or_else(|| DeliveryError::JobNotFound(job.id.clone()))?;

        if was_first {
            let delete_at =
                Utc::now().timestamp() + self.settings.retention.artifact_delay_seconds as i64;
            let inserted = self.deletions.schedule_once(ScheduledDeletion {
                job_id: job.id.clone(),
                artifact_path: path.clone(),
                delete_at,
                album_name: job.album_name.clone(),
                artist_name: job.artist_name.clone(),
            });
            if inserted {
                self.registry
                    .update(&job.id, |j| j.auto_delete_at = Some(delete_at));
                info!(
                    "Scheduled artifact deletion for {} in {}s",
                    job.id, self.settings.retention.artifact_delay_seconds
                );
            }
        }

        let download_name = job
            .artifact_name
            .clone()
            .unwrap_or_else(|| format!("{}.zip", job.album_name));
        Ok(FetchArtifact {
            path,
            download_name,
        })
    }

    /// Extract a completed job's archive next to it, then delete the
    /// archive and cancel any pending timed deletion.
    pub fn extract(&self, requested: &str) -> Result<ExtractSummary, DeliveryError> {
        let resolved = self
            .registry
            .resolve(requested)
            .ok_or_else(|| DeliveryError::JobNotFound(requested.to_string()))?;
        let job = resolved.job;

        if job.status != DeliveryStatus::Completed {
            return Err(DeliveryError::NotCompleted(job.id.clone()));
        }
        let Some(archive_path) = job.artifact_path.clone() else {
            return Err(DeliveryError::NotCompleted(job.id.clone()));
        };

        let outcome = extractor::extract_archive(
            &archive_path,
            &self.settings.downloads_dir,
            &job.artist_name,
            &job.album_name,
        )?;

        // The archive's content now lives unpacked on disk
        let zip_deleted = match fs::remove_file(&archive_path) {
            Ok(()) => {
                metrics::record_artifact_deleted("extracted");
                true
            }
            Err(e) => {
                debug!(
                    "Could not delete extracted archive {}: {}",
                    archive_path.display(),
                    e
                );
                false
            }
        };

        self.deletions.cancel(&job.id);
        self.registry.update(&job.id, |j| {
            j.extracted = true;
            j.extract_path = Some(outcome.extract_path.clone());
            j.extracted_file_count = Some(outcome.extracted_files);
            j.auto_delete_at = None;
        });

        info!(
            "Extracted {} file(s) for {} into {}",
            outcome.extracted_files,
            job.id,
            outcome.extract_path.display()
        );
        self.notifier.notify(DeliveryEvent::AlbumExtracted {
            job_id: job.id.clone(),
            album_name: job.album_name.clone(),
            artist_name: job.artist_name.clone(),
            extract_path: outcome.extract_path.display().to_string(),
            extracted_files: outcome.extracted_files,
        });

        Ok(ExtractSummary {
            extract_path: outcome.extract_path.display().to_string(),
            extracted_files: outcome.extracted_files,
            total_size: outcome.total_size,
            zip_deleted,
            extraction_errors: if outcome.errors.is_empty() {
                None
            } else {
                Some(outcome.errors)
            },
        })
    }

    /// Drop the pending timed deletion for a job, if any.
    pub fn cancel_scheduled_deletion(
        &self,
        requested: &str,
    ) -> Result<CancelledDeletion, DeliveryError> {
        let resolved = self
            .registry
            .resolve(requested)
            .ok_or_else(|| DeliveryError::JobNotFound(requested.to_string()))?;
        let entry = self
            .deletions
            .cancel(&resolved.job.id)
            .ok_or_else(|| DeliveryError::JobNotFound(requested.to_string()))?;

        self.registry
            .update(&resolved.job.id, |j| j.auto_delete_at = None);
        info!("Cancelled scheduled deletion for {}", resolved.job.id);

        Ok(CancelledDeletion {
            was_scheduled_for: entry.delete_at,
            time_remaining: (entry.delete_at - Utc::now().timestamp()).max(0),
        })
    }

    /// Snapshot of every live job row, keyed by job id.
    pub fn active_jobs(&self) -> HashMap<String, DeliveryJob> {
        self.registry.all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::{AlbumRecord, NullCatalogStore};
    use crate::delivery::notifier::NoopNotifier;
    use anyhow::Result;
    use std::io::Write;
    use tempfile::TempDir;

    struct OneAlbumStore(AlbumRecord);

    impl CatalogStore for OneAlbumStore {
        fn get_album(&self, id: i64) -> Result<Option<AlbumRecord>> {
            Ok((id == self.0.id).then(|| self.0.clone()))
        }
        fn list_albums(
            &self,
            _limit: usize,
            _offset: usize,
        ) -> Result<Vec<crate::catalog_store::AlbumSummary>> {
            Ok(Vec::new())
        }
        fn get_artist(&self, _id: i64) -> Result<Option<crate::catalog_store::ArtistRecord>> {
            Ok(None)
        }
        fn list_artist_albums(
            &self,
            _artist_id: i64,
        ) -> Result<Vec<crate::catalog_store::AlbumSummary>> {
            Ok(Vec::new())
        }
        fn artist_count(&self) -> usize {
            1
        }
        fn album_count(&self) -> usize {
            1
        }
        fn song_count(&self) -> usize {
            0
        }
    }

    fn local_settings(dir: &TempDir) -> DeliverySettings {
        DeliverySettings {
            mode: DeliveryMode::Local,
            music_library_root: dir.path().join("music"),
            downloads_dir: dir.path().join("downloads"),
            remote: None,
            retention: crate::config::RetentionSettings::default(),
        }
    }

    fn engine_with_album(dir: &TempDir, album: AlbumRecord) -> DeliveryEngine {
        DeliveryEngine::new(
            Arc::new(OneAlbumStore(album)),
            Arc::new(NoopNotifier),
            local_settings(dir),
        )
    }

    fn seeded_completed_job(engine: &DeliveryEngine, dir: &TempDir, id: &str) -> PathBuf {
        let downloads = dir.path().join("downloads");
        fs::create_dir_all(&downloads).unwrap();
        let artifact = downloads.join(format!("{}.zip", id));
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&artifact).unwrap());
        zip.start_file("01.mp3", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"audio").unwrap();
        zip.finish().unwrap();

        let album = AlbumRecord {
            id: 42,
            name: "Harvest Moon".to_string(),
            artist_name: "Silver Birch".to_string(),
            folder_path: None,
            year: None,
            genre: None,
            label: None,
        };
        let mut job = DeliveryJob::new(id.to_string(), &album, DeliveryMode::Local);
        job.status = DeliveryStatus::Completed;
        job.completed_at = Some(Utc::now().timestamp());
        job.artifact_path = Some(artifact.clone());
        job.artifact_name = Some(artifact.file_name().unwrap().to_string_lossy().into_owned());
        job.artifact_size_bytes = Some(fs::metadata(&artifact).unwrap().len());
        engine.registry.insert(job);
        artifact
    }

    #[tokio::test]
    async fn test_start_delivery_unknown_album() {
        let dir = TempDir::new().unwrap();
        let engine = DeliveryEngine::new(
            Arc::new(NullCatalogStore),
            Arc::new(NoopNotifier),
            local_settings(&dir),
        );

        let err = engine.start_delivery(7).unwrap_err();
        assert_eq!(err.kind(), "album_not_found");
        assert!(engine.registry.is_empty());
    }

    #[tokio::test]
    async fn test_status_of_unknown_job() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with_album(
            &dir,
            AlbumRecord {
                id: 42,
                name: "A".to_string(),
                artist_name: "B".to_string(),
                folder_path: None,
                year: None,
                genre: None,
                label: None,
            },
        );
        let err = engine.job_status("album_42_1_0001").unwrap_err();
        assert_eq!(err.kind(), "job_not_found");
    }

    #[tokio::test]
    async fn test_first_fetch_schedules_deletion_once() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with_album(
            &dir,
            AlbumRecord {
                id: 42,
                name: "Harvest Moon".to_string(),
                artist_name: "Silver Birch".to_string(),
                folder_path: None,
                year: None,
                genre: None,
                label: None,
            },
        );
        seeded_completed_job(&engine, &dir, "album_42_1700000000_1111");

        let fetch = engine.prepare_fetch("album_42_1700000000_1111").unwrap();
        assert!(fetch.path.exists());
        assert_eq!(engine.deletions.len(), 1);
        let first_delete_at = engine.deletions.get("album_42_1700000000_1111").unwrap().delete_at;

        // Second fetch bumps the counter but does not reschedule
        engine.prepare_fetch("album_42_1700000000_1111").unwrap();
        assert_eq!(engine.deletions.len(), 1);
        assert_eq!(
            engine.deletions.get("album_42_1700000000_1111").unwrap().delete_at,
            first_delete_at
        );

        let job = engine.registry.get("album_42_1700000000_1111").unwrap();
        assert_eq!(job.download_count, 2);
        assert!(job.auto_delete_at.is_some());
    }

    #[tokio::test]
    async fn test_fetch_requires_completed_job() {
        let dir = TempDir::new().unwrap();
        let album = AlbumRecord {
            id: 42,
            name: "A".to_string(),
            artist_name: "B".to_string(),
            folder_path: None,
            year: None,
            genre: None,
            label: None,
        };
        let engine = engine_with_album(&dir, album.clone());
        engine.registry.insert(DeliveryJob::new(
            "album_42_1_0001".to_string(),
            &album,
            DeliveryMode::Local,
        ));

        let err = engine.prepare_fetch("album_42_1_0001").unwrap_err();
        assert_eq!(err.kind(), "not_completed");
    }

    #[tokio::test]
    async fn test_extract_deletes_archive_and_cancels_deletion() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with_album(
            &dir,
            AlbumRecord {
                id: 42,
                name: "Harvest Moon".to_string(),
                artist_name: "Silver Birch".to_string(),
                folder_path: None,
                year: None,
                genre: None,
                label: None,
            },
        );
        let artifact = seeded_completed_job(&engine, &dir, "album_42_1700000000_1111");

        // Fetch first so a deletion is pending
        engine.prepare_fetch("album_42_1700000000_1111").unwrap();
        assert_eq!(engine.deletions.len(), 1);

        let summary = engine.extract("album_42_1700000000_1111").unwrap();
        assert_eq!(summary.extracted_files, 1);
        assert!(summary.zip_deleted);
        assert!(summary.extraction_errors.is_none());
        assert!(!artifact.exists());
        assert!(engine.deletions.is_empty());

        let job = engine.registry.get("album_42_1700000000_1111").unwrap();
        assert!(job.extracted);
        assert_eq!(job.extracted_file_count, Some(1));
        assert!(job.auto_delete_at.is_none());

        // The archive is gone now, so a second fetch 404s
        let err = engine.prepare_fetch("album_42_1700000000_1111").unwrap_err();
        assert_eq!(err.kind(), "artifact_missing");
    }

    #[tokio::test]
    async fn test_cancel_scheduled_deletion() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with_album(
            &dir,
            AlbumRecord {
                id: 42,
                name: "Harvest Moon".to_string(),
                artist_name: "Silver Birch".to_string(),
                folder_path: None,
                year: None,
                genre: None,
                label: None,
            },
        );
        seeded_completed_job(&engine, &dir, "album_42_1700000000_1111");

        // Nothing scheduled yet
        let err = engine
            .cancel_scheduled_deletion("album_42_1700000000_1111")
            .unwrap_err();
        assert_eq!(err.kind(), "job_not_found");

        engine.prepare_fetch("album_42_1700000000_1111").unwrap();
        let cancelled = engine
            .cancel_scheduled_deletion("album_42_1700000000_1111")
            .unwrap();
        assert!(cancelled.time_remaining > 0);
        assert!(engine.deletions.is_empty());
        assert!(engine
            .registry
            .get("album_42_1700000000_1111")
            .unwrap()
            .auto_delete_at
            .is_none());
    }

    #[tokio::test]
    async fn test_lenient_status_carries_note() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with_album(
            &dir,
            AlbumRecord {
                id: 42,
                name: "Harvest Moon".to_string(),
                artist_name: "Silver Birch".to_string(),
                folder_path: None,
                year: None,
                genre: None,
                label: None,
            },
        );
        seeded_completed_job(&engine, &dir, "album_42_1700000000_4321");

        let view = engine.job_status("album_42_1700000000_4322").unwrap();
        assert_eq!(view.actual_job_id.as_deref(), Some("album_42_1700000000_4321"));
        assert!(view.note.is_some());
        assert_eq!(view.file_exists, Some(true));
    }
}
