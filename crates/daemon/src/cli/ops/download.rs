use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use common::service::DocumentError;

use super::format_size;
use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Download {
    /// Document code
    #[arg(short, long)]
    pub code: String,

    /// Version number (default: latest)
    #[arg(short, long)]
    pub version: Option<u32>,

    /// Output file or directory (default: stored file name in the current
    /// directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug)]
pub struct DownloadOutput {
    pub doc_code: String,
    pub version: u32,
    pub path: PathBuf,
    pub size: u64,
}

impl fmt::Display for DownloadOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} v{} to {} ({})",
            "Saved".green().bold(),
            self.doc_code.bold(),
            self.version,
            self.path.display(),
            format_size(self.size)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl Download {
    fn target_path(&self, file_name: &str) -> PathBuf {
        match &self.output {
            Some(path) if path.is_dir() => path.join(file_name),
            Some(path) => path.clone(),
            None => PathBuf::from(file_name),
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Download {
    type Error = DownloadError;
    type Output = DownloadOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open().await?;
        let file = state
            .documents()
            .download_file(&self.code, self.version)
            .await?;

        let path = self.target_path(&file.file_name);
        tokio::fs::write(&path, &file.content)
            .await
            .map_err(|source| DownloadError::Write {
                path: path.display().to_string(),
                source,
            })?;

        Ok(DownloadOutput {
            doc_code: self.code.clone(),
            version: file.version,
            size: file.content.len() as u64,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download(output: Option<PathBuf>) -> Download {
        Download {
            code: "HR-001".to_string(),
            version: None,
            output,
        }
    }

    #[test]
    fn test_target_path() {
        let temp_dir = tempfile::TempDir::new().unwrap();

        assert_eq!(
            download(None).target_path("leave.pdf"),
            PathBuf::from("leave.pdf")
        );
        assert_eq!(
            download(Some(temp_dir.path().to_path_buf())).target_path("leave.pdf"),
            temp_dir.path().join("leave.pdf")
        );
        let explicit = temp_dir.path().join("copy.pdf");
        assert_eq!(
            download(Some(explicit.clone())).target_path("leave.pdf"),
            explicit
        );
    }
}
