//! Common test utilities for in-process HTTP testing.
//!
//! This module provides a test fixture that builds the router over real
//! SQLite stores and a temporary artifact directory, plus a handle on the
//! consume loop so tests decide when queued jobs run.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use imgqueue_core::queue::{ConsumeLoop, ConsumeSettings, RetryPolicy, Step};
use imgqueue_core::{
    Config, FsArtifactStore, ImageEngine, ImageJobHandler, ImageQueue, ImageService,
    SqliteImageStore, SqliteQueue,
};
use imgqueue_server::api::create_router;
use imgqueue_server::state::AppState;

/// Re-export fixtures for test convenience
pub use imgqueue_core::testing::fixtures;

const BOUNDARY: &str = "imgqueue-test-boundary";

/// Test fixture for HTTP testing.
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub service: Arc<ImageService>,
    pub images: Arc<SqliteImageStore>,
    pub queue: Arc<SqliteQueue>,
    consume: tokio::sync::Mutex<ConsumeLoop>,
    /// Temporary directory for artifacts
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
    pub body: Value,
}

/// One part of a multipart body.
pub enum Part<'a> {
    File {
        name: &'a str,
        filename: &'a str,
        bytes: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

impl TestFixture {
    /// Create a new test fixture with default config.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a test fixture; storage is redirected to a temp dir.
    pub fn with_config(mut config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        config.storage.base_dir = temp_dir.path().join("images");

        let images = Arc::new(SqliteImageStore::in_memory().expect("Failed to create store"));
        let queue = Arc::new(SqliteQueue::in_memory("images").expect("Failed to create queue"));
        let artifacts = Arc::new(FsArtifactStore::new(&config.storage.base_dir));
        let policy = RetryPolicy::new(2, std::time::Duration::from_millis(1), 1.0);

        let service = Arc::new(
            ImageService::new(
                images.clone(),
                artifacts.clone(),
                Arc::new(ImageQueue::new(queue.clone(), policy.clone())),
                Arc::new(ImageEngine::new(artifacts, &config.transform)),
            )
            .with_dead_letters(queue.clone()),
        );

        let consume = ConsumeLoop::new(
            Arc::new(queue.consumer("test").expect("Failed to create consumer")),
            Arc::new(ImageJobHandler::new(service.clone())),
            policy,
            ConsumeSettings::default(),
        );

        let state = Arc::new(AppState::new(config, service.clone()));
        let router = create_router(state);

        Self {
            router,
            service,
            images,
            queue,
            consume: tokio::sync::Mutex::new(consume),
            temp_dir,
        }
    }

    /// Run queued jobs until the queue is empty.
    pub async fn drain_jobs(&self) -> Vec<Step> {
        let mut consume = self.consume.lock().await;
        let mut steps = Vec::new();
        loop {
            let step = consume.step().await;
            if step == Step::Idle {
                return steps;
            }
            steps.push(step);
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.send(Request::builder().method("GET").uri(path).body(Body::empty()).unwrap())
            .await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Send a multipart POST.
    pub async fn post_multipart(&self, path: &str, parts: &[Part<'_>]) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.send(request).await
    }

    /// Upload `bytes` with an `actions` JSON value.
    pub async fn upload(&self, filename: &str, bytes: &[u8], actions: Value) -> TestResponse {
        let actions = actions.to_string();
        self.post_multipart(
            "/api/upload",
            &[
                Part::File {
                    name: "image",
                    filename,
                    bytes,
                },
                Part::Text {
                    name: "actions",
                    value: &actions,
                },
            ],
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }
}

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                filename,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                body.extend_from_slice(bytes);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
