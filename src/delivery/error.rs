//! Errors surfaced by the album delivery engine.

use axum::http::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while starting, running, or servicing a delivery.
///
/// Every variant maps to a stable machine-readable kind and an HTTP status
/// so handlers can answer with `{error, message}` bodies uniformly.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("album {0} not found in catalog")]
    AlbumNotFound(i64),

    #[error("source directory missing or not a directory: {0}")]
    SourceMissing(PathBuf),

    #[error("no audio files under {0}")]
    NoAudioFiles(PathBuf),

    #[error("remote host unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("remote authentication failed: {0}")]
    RemoteAuthFailed(String),

    #[error("remote command timed out after {0}s")]
    RemoteTimeout(u64),

    #[error("remote command failed: {0}")]
    RemoteCommandFailed(String),

    #[error("failed to write archive: {0}")]
    ArchiveWriteFailed(String),

    #[error("artifact is no longer on disk: {0}")]
    ArtifactMissing(PathBuf),

    #[error("archive failed integrity check: {0}")]
    ArchiveCorrupt(String),

    #[error("permission denied creating {0}")]
    ExtractDenied(PathBuf),

    #[error("no delivery job matches '{0}'")]
    JobNotFound(String),

    #[error("job '{0}' is not completed")]
    NotCompleted(String),

    #[error("catalog query failed: {0}")]
    Catalog(anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DeliveryError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::AlbumNotFound(_) => "album_not_found",
            DeliveryError::SourceMissing(_) => "source_missing",
            DeliveryError::NoAudioFiles(_) => "no_audio_files",
            DeliveryError::RemoteUnreachable(_) => "remote_unreachable",
            DeliveryError::RemoteAuthFailed(_) => "remote_auth_failed",
            DeliveryError::RemoteTimeout(_) => "remote_timeout",
            DeliveryError::RemoteCommandFailed(_) => "remote_command_failed",
            DeliveryError::ArchiveWriteFailed(_) => "archive_write_failed",
            DeliveryError::ArtifactMissing(_) => "artifact_missing",
            DeliveryError::ArchiveCorrupt(_) => "archive_corrupt",
            DeliveryError::ExtractDenied(_) => "extract_denied",
            DeliveryError::JobNotFound(_) => "job_not_found",
            DeliveryError::NotCompleted(_) => "not_completed",
            DeliveryError::Catalog(_) => "catalog_error",
            DeliveryError::Io(_) => "io_error",
        }
    }

    /// HTTP status for handler responses.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeliveryError::AlbumNotFound(_)
            | DeliveryError::JobNotFound(_)
            | DeliveryError::ArtifactMissing(_) => StatusCode::NOT_FOUND,
            DeliveryError::NotCompleted(_)
            | DeliveryError::ArchiveCorrupt(_)
            | DeliveryError::SourceMissing(_)
            | DeliveryError::NoAudioFiles(_) => StatusCode::BAD_REQUEST,
            DeliveryError::ExtractDenied(_) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
