//! One operator-triggered publish cycle:
//! upload, wait for propagation, verify, then swap the video pointer.

use crate::config::StorageConfig;
use crate::object_store::{ObjectStore, UploadedObject};
use crate::state::VideoState;
use crate::verifier::Verifier;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument};

/// Failures of a publish cycle. All are recoverable; the operator retries.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Source file {0} not found")]
    SourceMissing(PathBuf),

    #[error("Failed to upload video: {0:#}")]
    Upload(anyhow::Error),

    #[error("Failed to send fetch request: {0:#}")]
    Verify(anyhow::Error),
}

impl PublishError {
    /// Stage label for metrics
    pub fn stage(&self) -> &'static str {
        match self {
            PublishError::SourceMissing(_) => "source",
            PublishError::Upload(_) => "upload",
            PublishError::Verify(_) => "verify",
        }
    }
}

/// A completed publish
#[derive(Debug, Clone)]
pub struct Published {
    pub object: UploadedObject,
    pub public_url: String,
    pub local_file: PathBuf,
}

pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    verifier: Verifier,
    state: VideoState,
    source_file: PathBuf,
    storage: StorageConfig,
    propagation_delay: Duration,
}

impl Publisher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        verifier: Verifier,
        state: VideoState,
        source_file: impl Into<PathBuf>,
        storage: StorageConfig,
        propagation_delay: Duration,
    ) -> Self {
        Self {
            store,
            verifier,
            state,
            source_file: source_file.into(),
            storage,
            propagation_delay,
        }
    }

    pub fn source_file(&self) -> &PathBuf {
        &self.source_file
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Run one publish cycle. The video pointer only changes when both the
    /// upload and the verification fetch succeed.
    #[instrument(skip(self), fields(source = %self.source_file.display()))]
    pub async fn publish(&self) -> Result<Published, PublishError> {
        metrics::counter!("publish_attempts_total").increment(1);

        let result = self.run_cycle().await;
        match &result {
            Ok(published) => {
                metrics::counter!("publish_success_total").increment(1);
                info!(
                    key = %published.object.key,
                    size_bytes = published.object.size_bytes,
                    url = %published.public_url,
                    "Publish cycle completed"
                );
            }
            Err(e) => {
                metrics::counter!("publish_failures_total", "stage" => e.stage()).increment(1);
                error!(error = %e, stage = e.stage(), "Publish cycle failed");
            }
        }
        result
    }

    async fn run_cycle(&self) -> Result<Published, PublishError> {
        match tokio::fs::metadata(&self.source_file).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PublishError::SourceMissing(self.source_file.clone()));
            }
            Err(e) => {
                return Err(PublishError::Upload(anyhow::Error::new(e).context(format!(
                    "Failed to read source file {}",
                    self.source_file.display()
                ))));
            }
        }

        info!(bucket = %self.storage.bucket, "Uploading video");
        let object = self
            .store
            .upload(&self.source_file)
            .await
            .map_err(PublishError::Upload)?;

        let public_url = self.storage.public_url(&object.key);

        tokio::time::sleep(self.propagation_delay).await;

        info!(url = %public_url, "Sending verification fetch");
        self.verifier
            .verify(&public_url)
            .await
            .map_err(PublishError::Verify)?;

        self.state.set(public_url.clone(), self.source_file.clone());

        Ok(Published {
            object,
            public_url,
            local_file: self.source_file.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_storage_config;
    use crate::object_store::{object_key_for, MockObjectStore};
    use crate::verifier::tests::{spawn_asset_server, spawn_tracking_asset_server};
    use std::path::Path;
    use tempfile::TempDir;
    use uuid::Uuid;

    const PLACEHOLDER: &str = "/video.mp4";

    fn write_source(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"fake mp4 payload").unwrap();
        path
    }

    fn succeeding_store() -> MockObjectStore {
        let mut store = MockObjectStore::new();
        store.expect_upload().returning(|path: &Path| {
            Ok(UploadedObject {
                key: object_key_for(path),
                size_bytes: 16,
            })
        });
        store
    }

    fn publisher(
        store: MockObjectStore,
        base: &str,
        source: PathBuf,
        close_body: bool,
    ) -> (Publisher, VideoState) {
        let state = VideoState::new(PLACEHOLDER);
        let publisher = Publisher::new(
            Arc::new(store),
            Verifier::new(close_body, None).unwrap(),
            state.clone(),
            source,
            test_storage_config(base),
            Duration::ZERO,
        );
        (publisher, state)
    }

    #[tokio::test]
    async fn test_successful_publish_updates_pointer() {
        let addr = spawn_asset_server().await;
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "clip.mp4");
        let base = format!("http://{addr}/");

        let (publisher, state) = publisher(succeeding_store(), &base, source.clone(), true);
        let published = publisher.publish().await.unwrap();

        let id = published
            .public_url
            .strip_prefix(&format!("{base}clip-"))
            .and_then(|rest| rest.strip_suffix(".mp4"))
            .unwrap();
        assert!(Uuid::parse_str(id).is_ok());

        let pointer = state.get();
        assert_eq!(pointer.public_url, published.public_url);
        assert_eq!(pointer.local_file, Some(source));
    }

    #[tokio::test]
    async fn test_repeated_publishes_use_distinct_keys() {
        let addr = spawn_asset_server().await;
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "clip.mp4");

        let (publisher, state) =
            publisher(succeeding_store(), &format!("http://{addr}/"), source, true);
        let first = publisher.publish().await.unwrap();
        let second = publisher.publish().await.unwrap();

        assert_ne!(first.object.key, second.object.key);
        assert_eq!(state.public_url(), second.public_url);
    }

    #[tokio::test]
    async fn test_missing_source_leaves_pointer_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut store = MockObjectStore::new();
        store.expect_upload().never();

        let (publisher, state) = publisher(
            store,
            "http://127.0.0.1:1/",
            dir.path().join("absent.mp4"),
            true,
        );

        let err = publisher.publish().await.unwrap_err();
        assert!(matches!(err, PublishError::SourceMissing(_)));
        assert!(err.to_string().contains("not found"));
        assert_eq!(state.public_url(), PLACEHOLDER);
        assert!(state.local_file().is_none());
    }

    #[tokio::test]
    async fn test_upload_failure_leaves_pointer_unchanged() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "clip.mp4");
        let mut store = MockObjectStore::new();
        store
            .expect_upload()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("access denied")));

        let (publisher, state) = publisher(store, "http://127.0.0.1:1/", source, true);

        let err = publisher.publish().await.unwrap_err();
        assert_eq!(err.stage(), "upload");
        assert!(err.to_string().contains("access denied"));
        assert_eq!(state.public_url(), PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_verify_failure_keeps_previous_publish() {
        let addr = spawn_asset_server().await;
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "clip.mp4");

        let (good, state) =
            publisher(succeeding_store(), &format!("http://{addr}/"), source.clone(), true);
        let published = good.publish().await.unwrap();

        // Same shared state, but the public base points at a closed port.
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let closed_addr = closed.local_addr().unwrap();
        drop(closed);

        let broken = Publisher::new(
            Arc::new(succeeding_store()),
            Verifier::new(true, None).unwrap(),
            state.clone(),
            source.clone(),
            test_storage_config(&format!("http://{closed_addr}/")),
            Duration::ZERO,
        );

        let err = broken.publish().await.unwrap_err();
        assert_eq!(err.stage(), "verify");
        assert_eq!(state.public_url(), published.public_url);
        assert_eq!(state.local_file(), Some(source));
    }

    #[tokio::test]
    async fn test_leak_mode_accumulates_open_connections() {
        let (addr, tracker) = spawn_tracking_asset_server().await;
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "clip.mp4");

        let (publisher, _) =
            publisher(succeeding_store(), &format!("http://{addr}/"), source, false);
        for cycle in 1..=3 {
            publisher.publish().await.unwrap();
            assert_eq!(tracker.wait_for_open(cycle).await, cycle);
        }

        assert!(!publisher.verifier().closes_response_body());
        assert_eq!(publisher.verifier().open_responses(), 3);
        assert_eq!(tracker.accepted(), 3);
    }

    #[tokio::test]
    async fn test_close_mode_leaves_no_open_connections() {
        let (addr, tracker) = spawn_tracking_asset_server().await;
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir, "clip.mp4");

        let (publisher, _) =
            publisher(succeeding_store(), &format!("http://{addr}/"), source, true);
        for _ in 0..3 {
            publisher.publish().await.unwrap();
        }

        assert_eq!(tracker.wait_for_open(0).await, 0);
        assert_eq!(publisher.verifier().open_responses(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_source_is_an_upload_failure() {
        let dir = TempDir::new().unwrap();
        let not_a_dir = write_source(&dir, "plain-file");
        let mut store = MockObjectStore::new();
        store.expect_upload().never();

        let (publisher, state) = publisher(
            store,
            "http://127.0.0.1:1/",
            not_a_dir.join("clip.mp4"),
            true,
        );

        let err = publisher.publish().await.unwrap_err();
        assert!(matches!(err, PublishError::Upload(_)));
        assert!(!err.to_string().contains("not found"));
        assert_eq!(state.public_url(), PLACEHOLDER);
        assert!(state.local_file().is_none());
    }
}
