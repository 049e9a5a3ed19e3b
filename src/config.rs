use crate::error::{LocusError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_request_body_mb")]
    pub max_request_body_mb: usize,
}

/// Which object-store backend the partitioned store and index live on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// S3 bucket name, or the root directory for the local backend.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    // S3 / MinIO / R2
    #[serde(default)]
    pub s3_region: Option<String>,
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    #[serde(default)]
    pub s3_access_key_id: Option<String>,
    #[serde(default)]
    pub s3_secret_access_key: Option<String>,
    #[serde(default)]
    pub s3_allow_http: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default = "default_max_filter_depth")]
    pub max_filter_depth: usize,
    #[serde(default = "default_max_facet_values")]
    pub max_facet_values: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_concurrent_partition_writes")]
    pub max_concurrent_partition_writes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_host() -> String {
    std::env::var("LOCUS_HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}
fn default_port() -> u16 {
    std::env::var("LOCUS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}
fn default_request_timeout() -> u64 {
    std::env::var("LOCUS_REQUEST_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(30)
}
fn default_max_request_body_mb() -> usize {
    std::env::var("LOCUS_MAX_REQUEST_BODY_MB")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(50)
}
fn default_backend() -> StorageBackend {
    match std::env::var("LOCUS_STORAGE_BACKEND").as_deref() {
        Ok("local") => StorageBackend::Local,
        _ => StorageBackend::S3,
    }
}
fn default_bucket() -> String {
    std::env::var("LOCUS_BUCKET").unwrap_or_else(|_| "locus".to_string())
}
fn default_page_size() -> usize {
    std::env::var("LOCUS_DEFAULT_PAGE_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(50)
}
fn default_max_page_size() -> usize {
    std::env::var("LOCUS_MAX_PAGE_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(200)
}
fn default_max_filter_depth() -> usize {
    std::env::var("LOCUS_MAX_FILTER_DEPTH")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8)
}
fn default_max_facet_values() -> usize {
    std::env::var("LOCUS_MAX_FACET_VALUES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100)
}
fn default_max_batch_size() -> usize {
    std::env::var("LOCUS_MAX_BATCH_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10_000)
}
fn default_max_concurrent_partition_writes() -> usize {
    std::env::var("LOCUS_MAX_CONCURRENT_PARTITION_WRITES")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8)
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    std::env::var("LOCUS_LOG_FORMAT").unwrap_or_else(|_| "json".to_string())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_request_body_mb: default_max_request_body_mb(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            bucket: default_bucket(),
            s3_region: std::env::var("AWS_REGION").ok(),
            s3_endpoint: std::env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()),
            s3_access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            s3_secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
            s3_allow_http: std::env::var("S3_ALLOW_HTTP")
                .ok()
                .map(|v| v == "true")
                .unwrap_or(false),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            max_filter_depth: default_max_filter_depth(),
            max_facet_values: default_max_facet_values(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_concurrent_partition_writes: default_max_concurrent_partition_writes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, falling back to defaults.
    /// After loading, env var overrides are applied so that:
    /// env var > TOML file > defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p).map_err(|e| {
                    LocusError::Config(format!("failed to read config file {p}: {e}"))
                })?;
                toml::from_str(&content)
                    .map_err(|e| LocusError::Config(format!("failed to parse config: {e}")))?
            }
            None => Config::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides on top of file/default values.
    /// This ensures env vars always take priority over TOML settings.
    fn apply_env_overrides(&mut self) {
        // Server
        if let Ok(v) = std::env::var("LOCUS_HOST") {
            self.server.host = v;
        }
        if let Some(v) = std::env::var("LOCUS_PORT").ok().and_then(|v| v.parse().ok()) {
            self.server.port = v;
        }
        if let Some(v) = std::env::var("LOCUS_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.server.request_timeout_secs = v;
        }
        if let Some(v) = std::env::var("LOCUS_MAX_REQUEST_BODY_MB")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.server.max_request_body_mb = v;
        }

        // Storage
        if let Ok(v) = std::env::var("LOCUS_STORAGE_BACKEND") {
            self.storage.backend = match v.as_str() {
                "local" => StorageBackend::Local,
                _ => StorageBackend::S3,
            };
        }
        if let Ok(v) = std::env::var("LOCUS_BUCKET") {
            self.storage.bucket = v;
        }
        if let Ok(v) = std::env::var("AWS_REGION") {
            self.storage.s3_region = Some(v);
        }
        if let Some(v) = std::env::var("S3_ENDPOINT").ok().filter(|s| !s.is_empty()) {
            self.storage.s3_endpoint = Some(v);
        }
        if let Ok(v) = std::env::var("AWS_ACCESS_KEY_ID") {
            self.storage.s3_access_key_id = Some(v);
        }
        if let Ok(v) = std::env::var("AWS_SECRET_ACCESS_KEY") {
            self.storage.s3_secret_access_key = Some(v);
        }
        if let Ok(v) = std::env::var("S3_ALLOW_HTTP") {
            self.storage.s3_allow_http = v == "true";
        }

        // Query
        if let Some(v) = std::env::var("LOCUS_DEFAULT_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.query.default_page_size = v;
        }
        if let Some(v) = std::env::var("LOCUS_MAX_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.query.max_page_size = v;
        }
        if let Some(v) = std::env::var("LOCUS_MAX_FILTER_DEPTH")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.query.max_filter_depth = v;
        }
        if let Some(v) = std::env::var("LOCUS_MAX_FACET_VALUES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.query.max_facet_values = v;
        }

        // Ingest
        if let Some(v) = std::env::var("LOCUS_MAX_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.ingest.max_batch_size = v;
        }
        if let Some(v) = std::env::var("LOCUS_MAX_CONCURRENT_PARTITION_WRITES")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.ingest.max_concurrent_partition_writes = v;
        }

        // Logging
        if let Ok(v) = std::env::var("LOCUS_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("LOCUS_LOG_FORMAT") {
            self.logging.format = v;
        }
    }
}
