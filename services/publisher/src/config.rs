use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Main configuration for the publish service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Object storage configuration
    pub storage: StorageConfig,
    /// Publish cycle configuration
    #[serde(default)]
    pub publish: PublishConfig,
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format: "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Prometheus exporter port, disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// Object storage configuration (S3 API, e.g. Cloudflare R2 or MinIO)
#[derive(Clone, Deserialize)]
pub struct StorageConfig {
    /// Endpoint host or URL. A bare host is reached over HTTPS.
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    /// Bucket receiving uploads
    pub bucket: String,
    /// Signing region; R2 accepts "auto"
    #[serde(default = "default_region")]
    pub region: String,
    /// Force path-style access
    #[serde(default = "default_true")]
    pub force_path_style: bool,
    /// Public base URL the bucket is reachable under
    pub public_url_base: String,
    /// Content type declared on every upload
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Build the S3 client on a transport that never keeps idle connections.
    /// Works around reused storage connections handing back stale state.
    #[serde(default = "default_true")]
    pub disable_connection_reuse: bool,
}

/// Publish cycle configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    /// Local video uploaded on each publish
    #[serde(default = "default_source_file")]
    pub source_file: String,
    /// Release verification response bodies. When false every response is
    /// retained for the process lifetime, reproducing the pool exhaustion defect.
    #[serde(default)]
    pub close_response_body: bool,
    /// Pause between upload and verification in milliseconds
    #[serde(default = "default_propagation_delay_ms")]
    pub propagation_delay_ms: u64,
    /// Verification request timeout in seconds (no timeout when unset)
    #[serde(default)]
    pub verify_timeout_secs: Option<u64>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Landing page served at "/"
    #[serde(default = "default_index_file")]
    pub index_file: String,
    /// URL reported before the first successful publish
    #[serde(default = "default_placeholder_url")]
    pub placeholder_url: String,
    /// Grace period for in-flight requests on shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "publish-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_content_type() -> String {
    "video/mp4".to_string()
}

fn default_true() -> bool {
    true
}

fn default_source_file() -> String {
    "BunnyShort.mp4".to_string()
}

fn default_propagation_delay_ms() -> u64 {
    1000
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_index_file() -> String {
    "index.html".to_string()
}

fn default_placeholder_url() -> String {
    "/video.mp4".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "publish-service")?
            .set_default("service.log_level", "info")?
            .add_source(config::File::with_name("config/publisher").required(false))
            .add_source(config::File::with_name("/etc/publisher/publisher").required(false))
            // PUBLISHER__STORAGE__SECRET_KEY -> storage.secret_key
            .add_source(
                config::Environment::with_prefix("PUBLISHER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Reject configurations that cannot complete a publish cycle
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("storage.endpoint", &self.storage.endpoint),
            ("storage.access_key", &self.storage.access_key),
            ("storage.secret_key", &self.storage.secret_key),
            ("storage.bucket", &self.storage.bucket),
            ("storage.public_url_base", &self.storage.public_url_base),
            ("publish.source_file", &self.publish.source_file),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingRequired(key.to_string()));
            }
        }

        self.listen_addr()?;

        if !self.storage.public_url_base.starts_with("http://")
            && !self.storage.public_url_base.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                key: "storage.public_url_base".to_string(),
                message: "must be an http(s) URL".to_string(),
            });
        }

        Ok(())
    }

    /// Parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .listen_address
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                key: "server.listen_address".to_string(),
                message: e.to_string(),
            })
    }

    /// Get propagation delay as Duration
    pub fn propagation_delay(&self) -> Duration {
        Duration::from_millis(self.publish.propagation_delay_ms)
    }

    /// Get verification timeout as Duration
    pub fn verify_timeout(&self) -> Option<Duration> {
        self.publish.verify_timeout_secs.map(Duration::from_secs)
    }

    /// Get shutdown grace period as Duration
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_grace_secs)
    }
}

impl StorageConfig {
    /// Endpoint as a URL, defaulting bare hosts to HTTPS
    pub fn endpoint_url(&self) -> String {
        let endpoint = self.endpoint.trim_end_matches('/');
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{endpoint}")
        }
    }

    /// Public URL of an uploaded object
    pub fn public_url(&self, object_key: &str) -> String {
        if self.public_url_base.ends_with('/') {
            format!("{}{}", self.public_url_base, object_key)
        } else {
            format!("{}/{}", self.public_url_base, object_key)
        }
    }
}

// Keep the secret key out of logs.
impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("force_path_style", &self.force_path_style)
            .field("public_url_base", &self.public_url_base)
            .field("content_type", &self.content_type)
            .field("disable_connection_reuse", &self.disable_connection_reuse)
            .finish()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            source_file: default_source_file(),
            close_response_body: false,
            propagation_delay_ms: default_propagation_delay_ms(),
            verify_timeout_secs: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            index_file: default_index_file(),
            placeholder_url: default_placeholder_url(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_storage_config(public_url_base: &str) -> StorageConfig {
    StorageConfig {
        endpoint: "account.r2.cloudflarestorage.com".to_string(),
        access_key: "access".to_string(),
        secret_key: "secret".to_string(),
        bucket: "videos".to_string(),
        region: default_region(),
        force_path_style: true,
        public_url_base: public_url_base.to_string(),
        content_type: default_content_type(),
        disable_connection_reuse: true,
    }
}
