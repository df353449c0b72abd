use crate::config::StorageConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Credentials, SharedHttpClient};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_smithy_runtime::client::http::hyper_014::HyperClientBuilder;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    /// Object key inside the bucket
    pub key: String,
    /// Bytes transferred
    pub size_bytes: u64,
}

/// Destination for published videos
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a local file under a freshly generated unique key
    async fn upload(&self, local_path: &Path) -> Result<UploadedObject>;
}

/// S3-compatible object store (Cloudflare R2, MinIO, AWS)
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    content_type: String,
}

impl S3ObjectStore {
    /// Create a new S3 object store client
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "publish-service",
        );

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config)
            .endpoint_url(config.endpoint_url())
            .force_path_style(config.force_path_style);

        if config.disable_connection_reuse {
            s3_config_builder = s3_config_builder.http_client(no_reuse_http_client());
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            endpoint = %config.endpoint_url(),
            connection_reuse = !config.disable_connection_reuse,
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            content_type: config.content_type.clone(),
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    async fn upload(&self, local_path: &Path) -> Result<UploadedObject> {
        let key = object_key_for(local_path);

        let size_bytes = tokio::fs::metadata(local_path)
            .await
            .with_context(|| format!("Failed to stat {}", local_path.display()))?
            .len();

        let body = ByteStream::from_path(local_path)
            .await
            .with_context(|| format!("Failed to open {}", local_path.display()))?;

        debug!(key = %key, size_bytes, "Uploading video to object store");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type(&self.content_type)
            .send()
            .await
            .context("Failed to upload video to object store")?;

        info!(key = %key, size_bytes, "Video uploaded successfully");

        Ok(UploadedObject { key, size_bytes })
    }
}

/// HTTP client for the SDK that keeps no idle connections, so every request
/// to the storage endpoint opens a fresh connection.
fn no_reuse_http_client() -> SharedHttpClient {
    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();

    let mut hyper_builder = hyper::Client::builder();
    hyper_builder
        .pool_max_idle_per_host(0)
        .pool_idle_timeout(Duration::ZERO);

    HyperClientBuilder::new()
        .hyper_builder(hyper_builder)
        .build(https_connector)
}

/// Unique object key for a local file: `<stem>-<uuid>.<ext>`
pub fn object_key_for(local_path: &Path) -> String {
    let stem = local_path
        .file_stem()
        .map(|s| sanitize_key_component(&s.to_string_lossy()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string());

    let extension = local_path
        .extension()
        .map(|e| sanitize_key_component(&e.to_string_lossy()).to_lowercase())
        .filter(|e| !e.is_empty())
        .unwrap_or_else(|| "mp4".to_string());

    format!("{stem}-{id}.{extension}", id = Uuid::new_v4())
}

/// Sanitize a key component so it stays a single URL path segment
fn sanitize_key_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
