//! Local-mode packager: walks a source directory and zips the audio
//! files into the downloads directory, reporting progress through the
//! job registry.
//!
//! The worker owns no cancellation channel. It re-reads its job row every
//! few files; if retention purged the row, it deletes the partial archive
//! and exits silently.

use byte_unit::{Byte, UnitType};
use chrono::Utc;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::catalog_store::AlbumRecord;
use crate::server::metrics;

use super::error::DeliveryError;
use super::models::DeliveryStatus;
use super::notifier::{DeliveryEvent, DeliveryNotifier};
use super::registry::JobRegistry;
use super::resolver::artifact_basename;

/// Audio file extensions selected for packaging (lowercased match).
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "m4a", "wav", "wma", "aac"];

/// How many files may be processed between job-row liveness checks.
const CANCEL_CHECK_EVERY: usize = 5;

pub enum PackageOutcome {
    Completed {
        artifact_path: PathBuf,
        artifact_size: u64,
        files_archived: usize,
    },
    /// The job row disappeared mid-run; partial output was removed.
    Aborted,
}

struct SelectedFile {
    abs: PathBuf,
    rel: PathBuf,
}

pub struct LocalPackager {
    registry: Arc<JobRegistry>,
    notifier: Arc<dyn DeliveryNotifier>,
    downloads_dir: PathBuf,
}

impl LocalPackager {
    pub fn new(
        registry: Arc<JobRegistry>,
        notifier: Arc<dyn DeliveryNotifier>,
        downloads_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            notifier,
            downloads_dir,
        }
    }

    /// Run one delivery to completion. Called on a blocking thread.
    pub fn run(&self, job_id: &str, album: &AlbumRecord, source_dir: &Path) {
        match self.package(job_id, album, source_dir) {
            Ok(PackageOutcome::Completed {
                artifact_path,
                artifact_size,
                files_archived,
            }) => {
                metrics::record_delivery_completed(artifact_size);
                info!(
                    "Delivery {} completed: {} files in {} ({:.2})",
                    job_id,
                    files_archived,
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
            Ok(PackageOutcome::Aborted) => {
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

    fn package(
        &self,
        job_id: &str,
        album: &AlbumRecord,
        source_dir: &Path,
    ) -> Result<PackageOutcome, DeliveryError> {
        let alive = self.registry.update(job_id, |j| {
            j.status = DeliveryStatus::Processing;
            j.set_progress(5);
            j.current_item = Some("initializing".to_string());
        });
        if alive.is_none() {
            return Ok(PackageOutcome::Aborted);
        }

        if !source_dir.is_dir() {
            return Err(DeliveryError::SourceMissing(source_dir.to_path_buf()));
        }

        let files = collect_audio_files(source_dir);
        if files.is_empty() {
            return Err(DeliveryError::NoAudioFiles(source_dir.to_path_buf()));
        }

        info!(
            "Delivery {}: archiving {} audio files from {}",
            job_id,
            files.len(),
            source_dir.display()
        );

        if self
            .registry
            .update(job_id, |j| j.total_items = files.len() as u32)
            .is_none()
        {
            return Ok(PackageOutcome::Aborted);
        }

        fs::create_dir_all(&self.downloads_dir).map_err(|e| {
            DeliveryError::ArchiveWriteFailed(format!(
                "cannot create downloads directory {}: {}",
                self.downloads_dir.display(),
                e
            ))
        })?;

        let artifact_name = format!(
            "{}.zip",
            artifact_basename(&album.artist_name, &album.name)
        );
        let artifact_path = self.downloads_dir.join(&artifact_name);

        match self.write_archive(job_id, &files, &artifact_path) {
            Ok(Some(files_archived)) => {
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
                    return Ok(PackageOutcome::Aborted);
                }
                Ok(PackageOutcome::Completed {
                    artifact_path,
                    artifact_size,
                    files_archived,
                })
            }
            Ok(None) => Ok(PackageOutcome::Aborted),
            Err(e) => {
                let _ = fs::remove_file(&artifact_path);
                Err(e)
            }
        }
    }

    /// Write the archive, advancing progress linearly from 25 to 90.
    ///
    /// Returns `Ok(None)` if the job row vanished mid-write (partial
    /// archive already removed), otherwise the number of files archived.
    fn write_archive(
        &self,
        job_id: &str,
        files: &[SelectedFile],
        artifact_path: &Path,
    ) -> Result<Option<usize>, DeliveryError> {
        let file = File::create(artifact_path).map_err(|e| {
            DeliveryError::ArchiveWriteFailed(format!(
                "cannot create {}: {}",
                artifact_path.display(),
                e
            ))
        })?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        // Throughput over ratio: the inputs are already-compressed audio
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(1));

        let total = files.len();
        let mut archived = 0usize;

        for (i, selected) in files.iter().enumerate() {
            if i % CANCEL_CHECK_EVERY == 0 && !self.registry.contains(job_id) {
                drop(zip);
                let _ = fs::remove_file(artifact_path);
                return Ok(None);
            }

            match append_file(&mut zip, selected, options) {
                Ok(()) => archived += 1,
                Err(detail) => {
                    warn!("Delivery {}: skipping {}", job_id, detail);
                    self.registry
                        .update(job_id, |j| j.record_file_failure(detail));
                }
            }

            let progress = 25 + (((i + 1) * 65) / total) as u8;
            let basename = selected
                .rel
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let alive = self.registry.update(job_id, |j| {
                j.set_progress(progress);
                j.current_item = Some(basename);
                j.processed_items = (i + 1) as u32;
            });
            if alive.is_none() {
                drop(zip);
                let _ = fs::remove_file(artifact_path);
                return Ok(None);
            }
        }

        if archived == 0 {
            let _ = zip.finish();
            let _ = fs::remove_file(artifact_path);
            return Err(DeliveryError::ArchiveWriteFailed(
                "every selected file failed to archive".to_string(),
            ));
        }

        let mut inner = zip
            .finish()
            .map_err(|e| DeliveryError::ArchiveWriteFailed(e.to_string()))?;
        inner
            .flush()
            .map_err(|e| DeliveryError::ArchiveWriteFailed(e.to_string()))?;
        Ok(Some(archived))
    }
}

/// Recursively select regular files with an audio extension, ordered by
/// relative path (byte-wise) to stabilize track order.
fn collect_audio_files(source_dir: &Path) -> Vec<SelectedFile> {
    let mut files = Vec::new();
    for entry in WalkDir::new(source_dir) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", source_dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let has_audio_ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| AUDIO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false);
        if !has_audio_ext {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(source_dir)
            .unwrap_or(entry.path())
            .to_path_buf();
        files.push(SelectedFile {
            abs: entry.into_path(),
            rel,
        });
    }
    files.sort_by(|a, b| a.rel.cmp(&b.rel));
    files
}

fn append_file(
    zip: &mut ZipWriter<BufWriter<File>>,
    selected: &SelectedFile,
    options: SimpleFileOptions,
) -> Result<(), String> {
    let rel = selected.rel.display();
    let metadata =
        fs::metadata(&selected.abs).map_err(|e| format!("{}: {}", rel, e))?;
    if metadata.len() == 0 {
        return Err(format!("{}: file is empty", rel));
    }

    let entry_name = selected.rel.to_string_lossy().replace('\\', "/");
    zip.start_file(entry_name, options)
        .map_err(|e| format!("{}: {}", rel, e))?;

    let mut src = File::open(&selected.abs).map_err(|e| format!("{}: {}", rel, e))?;
    if let Err(e) = std::io::copy(&mut src, zip) {
        let _ = zip.abort_file();
        return Err(format!("{}: {}", rel, e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::models::{DeliveryJob, DeliveryMode};
    use crate::delivery::notifier::NoopNotifier;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn test_album() -> AlbumRecord {
        AlbumRecord {
            id: 42,
            name: "Harvest Moon".to_string(),
            artist_name: "Silver Birch".to_string(),
            folder_path: None,
            year: None,
            genre: None,
            label: None,
        }
    }

    fn setup(
        source_files: &[(&str, &[u8])],
    ) -> (TempDir, PathBuf, Arc<JobRegistry>, LocalPackager) {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        for (name, content) in source_files {
            let path = source.join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let downloads = dir.path().join("downloads");
        let registry = Arc::new(JobRegistry::new());
        let packager = LocalPackager::new(
            Arc::clone(&registry),
            Arc::new(NoopNotifier),
            downloads.clone(),
        );
        (dir, source, registry, packager)
    }

    fn insert_job(registry: &JobRegistry, id: &str) {
        registry.insert(DeliveryJob::new(
            id.to_string(),
            &test_album(),
            DeliveryMode::Local,
        ));
    }

    fn archive_entry_names(path: &Path) -> Vec<String> {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_happy_path_archives_sorted_tracks() {
        let (_dir, source, registry, packager) = setup(&[
            ("02.mp3", b"track two audio"),
            ("01.mp3", b"track one audio"),
            ("cover.jpg", b"not audio"),
        ]);
        insert_job(&registry, "j1");

        packager.run("j1", &test_album(), &source);

        let job = registry.get("j1").unwrap();
        assert_eq!(job.status, DeliveryStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.total_items, 2);
        assert_eq!(job.processed_items, 2);
        assert!(job.artifact_size_bytes.unwrap() > 0);
        assert!(job.completed_at.is_some());
        assert!(job.file_failures.is_empty());

        let artifact = job.artifact_path.unwrap();
        assert!(artifact.exists());
        assert_eq!(archive_entry_names(&artifact), vec!["01.mp3", "02.mp3"]);
    }

    #[test]
    fn test_multi_disc_subdirectories_keep_relative_paths() {
        let (_dir, source, registry, packager) = setup(&[
            ("Disc 1/01.flac", b"one"),
            ("Disc 2/01.flac", b"two"),
        ]);
        insert_job(&registry, "j1");

        packager.run("j1", &test_album(), &source);

        let job = registry.get("j1").unwrap();
        assert_eq!(job.status, DeliveryStatus::Completed);
        assert_eq!(
            archive_entry_names(&job.artifact_path.unwrap()),
            vec!["Disc 1/01.flac", "Disc 2/01.flac"]
        );
    }

    #[test]
    fn test_no_audio_files_fails_without_artifact() {
        let (dir, source, registry, packager) = setup(&[("cover.jpg", b"art")]);
        insert_job(&registry, "j1");

        packager.run("j1", &test_album(), &source);

        let job = registry.get("j1").unwrap();
        assert_eq!(job.status, DeliveryStatus::Error);
        assert_eq!(job.error_kind, Some("no_audio_files"));
        assert_eq!(job.progress, 0);
        assert!(job.artifact_path.is_none());
        assert!(!dir.path().join("downloads").exists()
            || fs::read_dir(dir.path().join("downloads")).unwrap().next().is_none());
    }

    #[test]
    fn test_missing_source_directory() {
        let (_dir, source, registry, packager) = setup(&[]);
        insert_job(&registry, "j1");

        packager.run("j1", &test_album(), &source.join("does-not-exist"));

        let job = registry.get("j1").unwrap();
        assert_eq!(job.status, DeliveryStatus::Error);
        assert_eq!(job.error_kind, Some("source_missing"));
    }

    #[test]
    fn test_empty_file_is_recorded_and_skipped() {
        let (_dir, source, registry, packager) =
            setup(&[("01.mp3", b"audio" as &[u8]), ("02.mp3", b"")]);
        insert_job(&registry, "j1");

        packager.run("j1", &test_album(), &source);

        let job = registry.get("j1").unwrap();
        assert_eq!(job.status, DeliveryStatus::Completed);
        assert_eq!(job.file_failures.len(), 1);
        assert!(job.file_failures[0].contains("02.mp3"));
        assert_eq!(
            archive_entry_names(&job.artifact_path.unwrap()),
            vec!["01.mp3"]
        );
    }

    #[test]
    fn test_all_files_failing_deletes_partial_archive() {
        let (dir, source, registry, packager) =
            setup(&[("01.mp3", b"" as &[u8]), ("02.mp3", b"")]);
        insert_job(&registry, "j1");

        packager.run("j1", &test_album(), &source);

        let job = registry.get("j1").unwrap();
        assert_eq!(job.status, DeliveryStatus::Error);
        assert_eq!(job.error_kind, Some("archive_write_failed"));
        let downloads = dir.path().join("downloads");
        assert!(fs::read_dir(&downloads).unwrap().next().is_none());
    }

    #[test]
    fn test_purged_row_aborts_silently() {
        let (dir, source, registry, packager) = setup(&[("01.mp3", b"audio")]);
        // Job never inserted: the first liveness check fails immediately

        packager.run("gone", &test_album(), &source);

        assert!(registry.is_empty());
        assert!(!dir.path().join("downloads").exists());
    }

    #[test]
    fn test_archive_content_round_trips() {
        let (_dir, source, registry, packager) = setup(&[("01.mp3", b"the audio payload")]);
        insert_job(&registry, "j1");

        packager.run("j1", &test_album(), &source);

        let job = registry.get("j1").unwrap();
        let mut archive =
            ZipArchive::new(File::open(job.artifact_path.unwrap()).unwrap()).unwrap();
        let mut entry = archive.by_index(0).unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"the audio payload");
    }
}
