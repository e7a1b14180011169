//! Fire-and-forget delivery lifecycle notifications.
//!
//! Notifications are a side channel: a failure to deliver one is logged
//! and swallowed, and no call may block a packager worker.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::models::DeliveryMode;

/// Lifecycle events emitted by the delivery engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeliveryEvent {
    DownloadStarted {
        job_id: String,
        album_name: String,
        artist_name: String,
        mode: DeliveryMode,
    },
    DownloadCompleted {
        job_id: String,
        album_name: String,
        artist_name: String,
        artifact_name: String,
        artifact_size_bytes: u64,
    },
    DownloadError {
        job_id: String,
        album_name: String,
        artist_name: String,
        error: String,
    },
    FileAutoDeleted {
        job_id: String,
        album_name: String,
        artist_name: String,
    },
    AlbumExtracted {
        job_id: String,
        album_name: String,
        artist_name: String,
        extract_path: String,
        extracted_files: usize,
    },
}

/// Sink for delivery events. Implementations must not block the caller.
pub trait DeliveryNotifier: Send + Sync {
    fn notify(&self, event: DeliveryEvent);
}

/// POSTs each event as JSON to a configured URL (e.g. an ntfy topic or a
/// home-automation webhook) from a spawned task.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, url }
    }
}

impl DeliveryNotifier for WebhookNotifier {
    fn notify(&self, event: DeliveryEvent) {
        let client = self.client.clone();
        let url = self.url.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&event).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(
                        "Notifier endpoint answered {} for {:?}",
                        response.status(),
                        event
                    );
                }
                Ok(_) => debug!("Delivered notification: {:?}", event),
                Err(e) => warn!("Failed to deliver notification: {}", e),
            }
        });
    }
}

/// Used when no notifier URL is configured.
pub struct NoopNotifier;

impl DeliveryNotifier for NoopNotifier {
    fn notify(&self, event: DeliveryEvent) {
        debug!("Notification (no sink configured): {:?}", event);
    }
}
