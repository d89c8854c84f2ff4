use std::fmt;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use owo_colors::OwoColorize;

use common::service::DEFAULT_MAX_APPEND_ATTEMPTS;
use km_daemon::state::{AppConfig, AppState, BlobStoreConfig};
use km_daemon::{ServiceState, StateSetupError};

/// Blob store backend type for CLI selection
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum BlobStoreType {
    /// SQLite + local filesystem (default)
    #[default]
    Filesystem,
    /// S3-compatible object storage
    S3,
    /// In memory, nothing persisted
    Memory,
}

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Blob store backend type
    #[arg(long, value_enum, default_value_t = BlobStoreType::Filesystem)]
    pub blob_store: BlobStoreType,

    /// S3/MinIO URL (required for --blob-store s3)
    /// Format: s3://access_key:secret_key@host:port/bucket
    /// Example: s3://minioadmin:minioadmin@localhost:9000/km-docs
    #[arg(long)]
    pub s3_url: Option<String>,

    /// Filesystem blob store path (default: <km dir>/objects)
    /// Must be an absolute path
    #[arg(long)]
    pub blobs_path: Option<PathBuf>,

    /// Attempts for a version upload that races another writer
    #[arg(long, default_value_t = DEFAULT_MAX_APPEND_ATTEMPTS)]
    pub max_append_attempts: u32,
}

#[derive(Debug)]
pub struct InitOutput {
    pub km_dir: PathBuf,
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub blob_store: String,
}

impl fmt::Display for InitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} km at {}",
            "Initialized".green().bold(),
            self.km_dir.display().to_string().bold()
        )?;
        writeln!(f, "  {} {}", "Database:".dimmed(), self.db_path.display())?;
        writeln!(f, "  {} {}", "Config:".dimmed(), self.config_path.display())?;
        write!(f, "  {} {}", "Blob store:".dimmed(), self.blob_store)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] km_daemon::state::StateError),

    #[error("failed to open stores: {0}")]
    Setup(#[from] StateSetupError),

    #[error("missing required config: {0}")]
    MissingConfig(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),
}

impl Init {
    fn build_blob_store_config(&self) -> Result<BlobStoreConfig, InitError> {
        match self.blob_store {
            BlobStoreType::Filesystem => {
                if let Some(path) = &self.blobs_path {
                    if !path.is_absolute() {
                        return Err(InitError::InvalidPath(
                            "--blobs-path must be an absolute path".to_string(),
                        ));
                    }
                }
                Ok(BlobStoreConfig::Filesystem {
                    path: self.blobs_path.clone(),
                })
            }

            BlobStoreType::S3 => {
                let url = self.s3_url.clone().ok_or_else(|| {
                    InitError::MissingConfig("--s3-url required for S3 backend".to_string())
                })?;

                BlobStoreConfig::parse_s3_url(&url)?;

                Ok(BlobStoreConfig::S3 { url })
            }

            BlobStoreType::Memory => Ok(BlobStoreConfig::Memory),
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = InitOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            max_append_attempts: self.max_append_attempts,
            blob_store: self.build_blob_store_config()?,
            ..AppConfig::default()
        };

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        // create the databases now rather than on first use
        let service = ServiceState::open(&state).await?;
        service.close().await;

        Ok(InitOutput {
            blob_store: state.config.blob_store.describe(&state.km_dir),
            km_dir: state.km_dir,
            db_path: state.db_path,
            config_path: state.config_path,
        })
    }
}
