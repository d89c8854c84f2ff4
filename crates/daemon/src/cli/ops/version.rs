use std::fmt;
use std::path::PathBuf;

use clap::Args;
use owo_colors::OwoColorize;

use common::service::DocumentError;

use super::upload::read_file;
use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct NewVersion {
    /// Document code
    #[arg(short, long)]
    pub code: String,

    /// File holding the new version
    #[arg(short, long)]
    pub file: PathBuf,

    /// Who is uploading
    #[arg(short, long)]
    pub user: String,

    /// What changed in this version
    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Debug)]
pub struct NewVersionOutput {
    pub doc_code: String,
    pub version: u32,
    pub file_name: String,
}

impl fmt::Display for NewVersionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} is now at v{} ({})",
            "Uploaded".green().bold(),
            self.doc_code.bold(),
            self.version,
            self.file_name
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NewVersionError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for NewVersion {
    type Error = NewVersionError;
    type Output = NewVersionOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let content = read_file(&self.file)
            .await
            .map_err(|source| NewVersionError::Read {
                path: self.file.display().to_string(),
                source,
            })?;
        let file_name = content.file_name.clone();

        let state = ctx.open().await?;
        let doc = state
            .documents()
            .upload_new_version(&self.code, content, &self.user, &self.description)
            .await?;

        Ok(NewVersionOutput {
            doc_code: doc.doc_code,
            version: doc.current_version,
            file_name,
        })
    }
}
