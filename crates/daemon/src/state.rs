//! On-disk state: the km home directory and its `config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use common::service::{ServiceConfig, DEFAULT_MAX_APPEND_ATTEMPTS};

pub const KM_DIR_NAME: &str = ".km";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "km.db";
pub const BLOBS_DB_FILE_NAME: &str = "blobs.db";
pub const OBJECTS_DIR_NAME: &str = "objects";

const DEFAULT_LOG_LEVEL: &str = "warn";
const DEFAULT_S3_PORT: u16 = 9000;

/// Where document content lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BlobStoreConfig {
    /// SQLite + local directory; `None` means `<km_dir>/objects`
    Filesystem { path: Option<PathBuf> },
    /// S3-compatible object storage, `s3://access:secret@host:port/bucket`
    S3 { url: String },
    /// Process memory. Records are kept in memory too.
    Memory,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        BlobStoreConfig::Filesystem { path: None }
    }
}

/// Connection details parsed from an S3 URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

impl BlobStoreConfig {
    /// Parse `s3://access_key:secret_key@host[:port]/bucket`.
    ///
    /// The endpoint is plain http, defaulting to the MinIO port.
    pub fn parse_s3_url(url: &str) -> Result<S3Location, StateError> {
        let invalid = |reason: &str| StateError::InvalidS3Url(format!("{reason}: {url}"));

        let parsed = Url::parse(url).map_err(|_| invalid("not a url"))?;
        if parsed.scheme() != "s3" {
            return Err(invalid("scheme must be s3"));
        }

        let access_key = parsed.username();
        let secret_key = parsed.password().unwrap_or_default();
        if access_key.is_empty() || secret_key.is_empty() {
            return Err(invalid("missing credentials"));
        }

        let host = parsed.host_str().ok_or_else(|| invalid("missing host"))?;
        let port = parsed.port().unwrap_or(DEFAULT_S3_PORT);
        let bucket = parsed.path().trim_matches('/');
        if bucket.is_empty() || bucket.contains('/') {
            return Err(invalid("expected exactly one bucket path segment"));
        }

        Ok(S3Location {
            endpoint: format!("http://{host}:{port}"),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    /// Hide credentials for display.
    pub fn describe(&self, km_dir: &Path) -> String {
        match self {
            BlobStoreConfig::Filesystem { path } => {
                let path = path
                    .clone()
                    .unwrap_or_else(|| km_dir.join(OBJECTS_DIR_NAME));
                format!("filesystem ({})", path.display())
            }
            BlobStoreConfig::S3 { url } => format!("s3 ({})", mask_s3_url(url)),
            BlobStoreConfig::Memory => "memory (ephemeral)".to_string(),
        }
    }
}

fn mask_s3_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("s3://") {
        if let Some(at_pos) = rest.find('@') {
            return format!("s3://***:***{}", &rest[at_pos..]);
        }
    }
    url.to_string()
}

fn default_max_append_attempts() -> u32 {
    DEFAULT_MAX_APPEND_ATTEMPTS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Attempts for an optimistic version append before giving up
    #[serde(default = "default_max_append_attempts")]
    pub max_append_attempts: u32,
    /// Default log filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub blob_store: BlobStoreConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_append_attempts: default_max_append_attempts(),
            log_level: default_log_level(),
            blob_store: BlobStoreConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            max_append_attempts: self.max_append_attempts,
        }
    }
}

/// Resolved paths of a km home directory plus its loaded config.
#[derive(Debug, Clone)]
pub struct AppState {
    pub km_dir: PathBuf,
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub blobs_db_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// `custom` if given, else `~/.km`.
    pub fn km_dir(custom: Option<PathBuf>) -> Result<PathBuf, StateError> {
        match custom {
            Some(path) => Ok(path),
            None => dirs::home_dir()
                .map(|home| home.join(KM_DIR_NAME))
                .ok_or(StateError::NoHomeDirectory),
        }
    }

    /// Create the home directory and write its config.
    pub fn init(custom: Option<PathBuf>, config: Option<AppConfig>) -> Result<Self, StateError> {
        let km_dir = Self::km_dir(custom)?;
        let config_path = km_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized(km_dir));
        }

        let config = config.unwrap_or_default();
        if let BlobStoreConfig::S3 { url } = &config.blob_store {
            BlobStoreConfig::parse_s3_url(url)?;
        }

        fs::create_dir_all(&km_dir)?;
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;
        tracing::info!(km_dir = %km_dir.display(), "initialized km home");

        Ok(Self::from_parts(km_dir, config))
    }

    /// Load an initialized home directory.
    pub fn load(custom: Option<PathBuf>) -> Result<Self, StateError> {
        let km_dir = Self::km_dir(custom)?;
        let config_path = km_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized(km_dir));
        }

        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;
        Ok(Self::from_parts(km_dir, config))
    }

    fn from_parts(km_dir: PathBuf, config: AppConfig) -> Self {
        Self {
            config_path: km_dir.join(CONFIG_FILE_NAME),
            db_path: km_dir.join(DB_FILE_NAME),
            blobs_db_path: km_dir.join(BLOBS_DB_FILE_NAME),
            km_dir,
            config,
        }
    }

    /// Directory holding blob bytes for the filesystem backend.
    pub fn objects_path(&self) -> PathBuf {
        match &self.config.blob_store {
            BlobStoreConfig::Filesystem { path: Some(path) } => path.clone(),
            _ => self.km_dir.join(OBJECTS_DIR_NAME),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not determine the home directory")]
    NoHomeDirectory,
    #[error("km is not initialized at {} (run `km init`)", .0.display())]
    NotInitialized(PathBuf),
    #[error("km is already initialized at {}", .0.display())]
    AlreadyInitialized(PathBuf),
    #[error("invalid s3 url: {0}")]
    InvalidS3Url(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("failed to write config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let km_dir = temp_dir.path().join("km");

        let config = AppConfig {
            max_append_attempts: 9,
            ..AppConfig::default()
        };
        let state = AppState::init(Some(km_dir.clone()), Some(config.clone())).unwrap();
        assert!(state.config_path.exists());
        assert_eq!(state.db_path, km_dir.join(DB_FILE_NAME));
        assert_eq!(state.objects_path(), km_dir.join(OBJECTS_DIR_NAME));

        let loaded = AppState::load(Some(km_dir.clone())).unwrap();
        assert_eq!(loaded.config, config);
        assert_eq!(loaded.config.service_config().max_append_attempts, 9);

        assert!(matches!(
            AppState::init(Some(km_dir), None),
            Err(StateError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_load_uninitialized() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            AppState::load(Some(temp_dir.path().join("missing"))),
            Err(StateError::NotInitialized(_))
        ));
    }

    #[test]
    fn test_config_defaults_fill_missing_keys() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());

        let config: AppConfig = toml::from_str(
            r#"
            [blob_store]
            type = "s3"
            url = "s3://minio:secret@localhost:9000/km"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_append_attempts, DEFAULT_MAX_APPEND_ATTEMPTS);
        assert!(matches!(config.blob_store, BlobStoreConfig::S3 { .. }));
    }

    #[test]
    fn test_parse_s3_url() {
        let location =
            BlobStoreConfig::parse_s3_url("s3://minioadmin:hunter2@localhost:9100/km-docs")
                .unwrap();
        assert_eq!(
            location,
            S3Location {
                endpoint: "http://localhost:9100".to_string(),
                access_key: "minioadmin".to_string(),
                secret_key: "hunter2".to_string(),
                bucket: "km-docs".to_string(),
            }
        );

        let default_port = BlobStoreConfig::parse_s3_url("s3://a:b@minio/docs").unwrap();
        assert_eq!(default_port.endpoint, "http://minio:9000");

        for bad in [
            "http://a:b@host/bucket",
            "s3://host/bucket",
            "s3://a:b@host/",
            "s3://a:b@host/one/two",
        ] {
            assert!(BlobStoreConfig::parse_s3_url(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_describe_masks_credentials() {
        let config = BlobStoreConfig::S3 {
            url: "s3://minioadmin:hunter2@localhost:9000/km".to_string(),
        };
        let described = config.describe(Path::new("/tmp/km"));
        assert_eq!(described, "s3 (s3://***:***@localhost:9000/km)");
        assert!(!described.contains("hunter2"));
    }
}
