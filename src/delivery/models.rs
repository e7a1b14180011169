//! Data models for the album delivery engine.
//!
//! A `DeliveryJob` is the single record a delivery run leaves behind: it is
//! created by the start endpoint, mutated by exactly one packager worker,
//! read by pollers, and eventually purged by retention.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog_store::AlbumRecord;

/// Where the album's source files live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Local,
    Remote,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Local => "local",
            DeliveryMode::Remote => "remote",
        }
    }
}

/// Job state machine.
///
/// `starting` → `processing` (local) or the `ssh_*` phases in order
/// (remote) → `completed` | `error`. Terminal states persist until
/// retention removes the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Starting,
    Processing,
    SshPreparing,
    SshTransferring,
    SshCompressing,
    SshCleaning,
    Completed,
    Error,
}

impl DeliveryStatus {
    /// Returns true if this is a terminal state (Completed or Error).
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Completed | DeliveryStatus::Error)
    }
}

/// Per-job cap on recorded per-file packaging failures.
pub const MAX_RECORDED_FILE_FAILURES: usize = 10;

/// One delivery run, from start request to retention purge.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryJob {
    /// Opaque key, unique for the process lifetime.
    pub id: String,
    pub album_id: i64,
    pub album_name: String,
    pub artist_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    pub mode: DeliveryMode,
    pub status: DeliveryStatus,
    /// 0..100, monotonically non-decreasing until an error resets it to 0.
    pub progress: u8,
    /// Filename or phase label currently being worked on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<String>,
    pub total_items: u32,
    pub processed_items: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_size_bytes: Option<u64>,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub download_count: u32,
    /// Epoch seconds of the pending scheduled deletion, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_delete_at: Option<i64>,
    pub zip_auto_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_deleted_at: Option<i64>,
    pub extracted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_file_count: Option<usize>,
    /// Recovered per-file packaging failures, capped at
    /// `MAX_RECORDED_FILE_FAILURES`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_failures: Vec<String>,
}

impl DeliveryJob {
    pub fn new(id: String, album: &AlbumRecord, mode: DeliveryMode) -> Self {
        Self {
            id,
            album_id: album.id,
            album_name: album.name.clone(),
            artist_name: album.artist_name.clone(),
            folder_path: album.folder_path.clone(),
            mode,
            status: DeliveryStatus::Starting,
            progress: 0,
            current_item: None,
            total_items: 0,
            processed_items: 0,
            artifact_path: None,
            artifact_name: None,
            artifact_size_bytes: None,
            started_at: Utc::now().timestamp(),
            completed_at: None,
            error_at: None,
            error_kind: None,
            error_message: None,
            download_count: 0,
            auto_delete_at: None,
            zip_auto_deleted: false,
            auto_deleted_at: None,
            extracted: false,
            extract_path: None,
            extracted_file_count: None,
            file_failures: Vec::new(),
        }
    }

    /// Raise progress to `value`, never lowering it.
    pub fn set_progress(&mut self, value: u8) {
        self.progress = self.progress.max(value.min(100));
    }

    /// Transition to the terminal error state. Progress resets to 0.
    pub fn mark_error(&mut self, kind: &'static str, message: impl Into<String>) {
        self.status = DeliveryStatus::Error;
        self.progress = 0;
        self.current_item = None;
        self.error_kind = Some(kind);
        self.error_message = Some(message.into());
        self.error_at = Some(Utc::now().timestamp());
    }

    /// Record a recovered per-file failure, respecting the cap.
    pub fn record_file_failure(&mut self, detail: String) {
        if self.file_failures.len() < MAX_RECORDED_FILE_FAILURES {
            self.file_failures.push(detail);
        }
    }
}

/// A pending timed artifact deletion, keyed by job id.
///
/// Created on the first archive fetch, removed when it fires, when the
/// archive is extracted (and therefore already gone), or on explicit
/// cancellation.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduledDeletion {
    pub job_id: String,
    pub artifact_path: PathBuf,
    pub delete_at: i64,
    pub album_name: String,
    pub artist_name: String,
}
