//! Server-side archive extraction.
//!
//! Unpacks a delivered ZIP next to the artifact so the files can be
//! browsed over the network share instead of downloaded. Only ZIP is
//! handled here; tar.gz artifacts from remote mode are the client's
//! business.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::warn;
use zip::ZipArchive;

use super::error::DeliveryError;
use super::resolver::file_component;

#[derive(Debug)]
pub struct ExtractOutcome {
    pub extract_path: PathBuf,
    pub extracted_files: usize,
    pub total_size: u64,
    /// Per-entry failures; extraction continues past them.
    pub errors: Vec<String>,
}

/// Extract every safe entry of `archive_path` into a fresh directory
/// under `downloads_dir` named `Artist - Album`, suffixed `(n)` when the
/// name is taken. The archive itself is left in place; the caller
/// decides its fate.
pub fn extract_archive(
    archive_path: &Path,
    downloads_dir: &Path,
    artist: &str,
    album: &str,
) -> Result<ExtractOutcome, DeliveryError> {
    let file = File::open(archive_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            DeliveryError::ArtifactMissing(archive_path.to_path_buf())
        } else {
            DeliveryError::Io(e)
        }
    })?;

    // Opening the archive reads the central directory, which doubles as
    // the integrity test
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|e| DeliveryError::ArchiveCorrupt(e.to_string()))?;

    let extract_path = unique_extract_dir(downloads_dir, artist, album);
    fs::create_dir_all(&extract_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            DeliveryError::ExtractDenied(extract_path.clone())
        } else {
            DeliveryError::Io(e)
        }
    })?;

    let mut extracted_files = 0usize;
    let mut total_size = 0u64;
    let mut errors = Vec::new();

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(e) => e,
            Err(e) => {
                errors.push(format!("entry {}: {}", i, e));
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        if !is_safe_entry_name(&name) {
            warn!("Skipping unsafe archive entry: {}", name);
            errors.push(format!("skipped unsafe entry: {}", name));
            continue;
        }

        let dest = extract_path.join(&name);
        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                errors.push(format!("{}: {}", name, e));
                continue;
            }
        }

        match File::create(&dest).and_then(|mut out| std::io::copy(&mut entry, &mut out)) {
            Ok(bytes) => {
                extracted_files += 1;
                total_size += bytes;
            }
            Err(e) => errors.push(format!("{}: {}", name, e)),
        }
    }

    Ok(ExtractOutcome {
        extract_path,
        extracted_files,
        total_size,
        errors,
    })
}

/// Entry names must stay inside the extraction directory: no absolute
/// paths, no `..` segments (either separator flavor).
fn is_safe_entry_name(name: &str) -> bool {
    !name.starts_with('/') && !name.split(['/', '\\']).any(|segment| segment == "..")
}

fn unique_extract_dir(downloads_dir: &Path, artist: &str, album: &str) -> PathBuf {
    let base = format!("{} - {}", file_component(artist), file_component(album));
    let mut candidate = downloads_dir.join(&base);
    let mut n = 1;
    while candidate.exists() {
        candidate = downloads_dir.join(format!("{} ({})", base, n));
        n += 1;
    }
    candidate
}
