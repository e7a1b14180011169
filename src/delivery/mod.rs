//! Album delivery engine.
//!
//! Given an album id, locate its audio files on the local filesystem or
//! on a remote host reachable over ssh, produce a single archive in the
//! downloads directory, track progress for browser pollers, and enforce
//! the retention lifecycle (timed auto-deletion, server-side extraction,
//! stale-job sweeping).

mod engine;
mod error;
mod extractor;
mod local_packager;
mod models;
mod notifier;
mod registry;
mod remote_packager;
mod remote_shell;
mod resolver;
mod retention;

pub use engine::{
    CancelledDeletion, DeliveryEngine, ExtractSummary, FetchArtifact, JobStatusView,
    StartedDelivery,
};
pub use error::DeliveryError;
pub use local_packager::AUDIO_EXTENSIONS;
pub use models::{DeliveryJob, DeliveryMode, DeliveryStatus, ScheduledDeletion};
pub use notifier::{DeliveryEvent, DeliveryNotifier, NoopNotifier, WebhookNotifier};
pub use registry::{DeletionSchedule, JobRegistry};
pub use resolver::resolve_source_path;
pub use retention::{run_due_deletions, spawn_retention_tasks, sweep_stale_jobs};
