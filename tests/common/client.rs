//! Thin reqwest wrapper over the server's HTTP surface.

use reqwest::Response;
use serde_json::Value;
use std::time::Duration;

pub struct TestClient {
    client: reqwest::Client,
    base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build client");
        Self { client, base_url }
    }

    pub async fn home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("request failed")
    }

    pub async fn get_album(&self, id: i64) -> Response {
        self.client
            .get(format!("{}/v1/catalog/albums/{}", self.base_url, id))
            .send()
            .await
            .expect("request failed")
    }

    pub async fn list_albums(&self) -> Response {
        self.client
            .get(format!("{}/v1/catalog/albums", self.base_url))
            .send()
            .await
            .expect("request failed")
    }

    pub async fn get_artist(&self, id: i64) -> Response {
        self.client
            .get(format!("{}/v1/catalog/artists/{}", self.base_url, id))
            .send()
            .await
            .expect("request failed")
    }

    pub async fn start_delivery(&self, album_id: i64) -> Response {
        self.client
            .post(format!("{}/v1/delivery/albums/{}", self.base_url, album_id))
            .send()
            .await
            .expect("request failed")
    }

    pub async fn job_status(&self, job_id: &str) -> Response {
        self.client
            .get(format!("{}/v1/delivery/jobs/{}", self.base_url, job_id))
            .send()
            .await
            .expect("request failed")
    }

    pub async fn list_jobs(&self) -> Response {
        self.client
            .get(format!("{}/v1/delivery/jobs", self.base_url))
            .send()
            .await
            .expect("request failed")
    }

    pub async fn fetch_archive(&self, job_id: &str) -> Response {
        self.client
            .get(format!(
                "{}/v1/delivery/jobs/{}/archive",
                self.base_url, job_id
            ))
            .send()
            .await
            .expect("request failed")
    }

    pub async fn extract(&self, job_id: &str) -> Response {
        self.client
            .post(format!(
                "{}/v1/delivery/jobs/{}/extract",
                self.base_url, job_id
            ))
            .send()
            .await
            .expect("request failed")
    }

    pub async fn cancel_deletion(&self, job_id: &str) -> Response {
        self.client
            .post(format!(
                "{}/v1/delivery/jobs/{}/cancel-deletion",
                self.base_url, job_id
            ))
            .send()
            .await
            .expect("request failed")
    }

    /// Start a delivery and return the job id from the response body.
    pub async fn start_delivery_job_id(&self, album_id: i64) -> String {
        let response = self.start_delivery(album_id).await;
        assert!(
            response.status().is_success(),
            "start failed: {}",
            response.status()
        );
        let body: Value = response.json().await.expect("invalid start body");
        body["job_id"]
            .as_str()
            .expect("start body missing job_id")
            .to_string()
    }

    /// Poll a job until its status is terminal, failing after `timeout`.
    /// Also asserts that progress never decreases while polling.
    pub async fn poll_until_terminal(&self, job_id: &str, timeout: Duration) -> Value {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_progress = 0i64;
        loop {
            let response = self.job_status(job_id).await;
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            let body: Value = response.json().await.expect("invalid status body");
            let status = body["status"].as_str().expect("missing status");

            if status == "error" {
                return body;
            }
            let progress = body["progress"].as_i64().unwrap_or(0);
            assert!(
                progress >= last_progress,
                "progress went backwards: {} -> {}",
                last_progress,
                progress
            );
            last_progress = progress;

            if status == "completed" {
                return body;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("job {} still {} after {:?}", job_id, status, timeout);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
