//! Mapping album records to source directories and artifact names.

use chrono::Utc;
use std::path::{Path, PathBuf};

use crate::catalog_store::AlbumRecord;

use super::error::DeliveryError;

/// Resolve the directory an album's files live in.
///
/// An absolute `folder_path` is taken as-is; a relative one is joined to
/// the library root; with no recorded path the directory is constructed
/// from artist and album names. A trailing `Disc N` segment collapses to
/// its parent so multi-disc releases are delivered whole.
///
/// In local mode the result must exist on this host; in remote mode it is
/// interpreted on the remote host and deliberately not checked here.
pub fn resolve_source_path(
    album: &AlbumRecord,
    library_root: &Path,
) -> Result<PathBuf, DeliveryError> {
    let path = match &album.folder_path {
        Some(folder) => {
            let p = PathBuf::from(folder);
            if p.is_absolute() {
                p
            } else {
                library_root.join(p)
            }
        }
        None => {
            if album.artist_name.is_empty() || album.name.is_empty() {
                return Err(DeliveryError::SourceMissing(library_root.to_path_buf()));
            }
            library_root
                .join(path_component(&album.artist_name))
                .join(path_component(&album.name))
        }
    };
    Ok(collapse_disc_dir(path))
}

/// Make a name safe to use as a single path segment.
fn path_component(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

fn collapse_disc_dir(path: PathBuf) -> PathBuf {
    let is_disc = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(is_disc_dir_name)
        .unwrap_or(false);
    if is_disc {
        if let Some(parent) = path.parent() {
            return parent.to_path_buf();
        }
    }
    path
}

/// Matches exactly `Disc ` followed by one or more ASCII digits,
/// case-sensitive.
fn is_disc_dir_name(name: &str) -> bool {
    match name.strip_prefix("Disc ") {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Artifact file stem: sanitized `artist - album` plus an epoch-seconds
/// suffix for uniqueness. The caller appends `.zip` or `.tar.gz`.
pub fn artifact_basename(artist: &str, album: &str) -> String {
    format!(
        "{} - {} [{}]",
        file_component(artist),
        file_component(album),
        Utc::now().timestamp()
    )
}

/// Name of the per-job scratch directory staged under `/tmp` on the
/// remote host.
pub fn scratch_dir_name(artist: &str, album: &str) -> String {
    format!(
        "phonotek_{}_{}_{}",
        file_component(artist).replace(' ', "_"),
        file_component(album).replace(' ', "_"),
        Utc::now().timestamp()
    )
}

/// Keep only alphanumerics, space, `-` and `_`.
pub fn file_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let trimmed = cleaned.trim().to_string();
    if trimmed.is_empty() {
        "album".to_string()
    } else {
        trimmed
    }
}
