use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use common::service::DocumentError;

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Delete {
    /// Document code
    #[arg(short, long)]
    pub code: String,

    /// Actually delete; without this nothing is removed
    #[arg(short, long)]
    pub force: bool,

    /// Keep the stored file content
    #[arg(long)]
    pub keep_files: bool,
}

#[derive(Debug)]
pub enum DeleteOutput {
    Deleted { doc_code: String, files_removed: bool },
    NotFound { doc_code: String },
    Cancelled { doc_code: String },
}

impl fmt::Display for DeleteOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteOutput::Deleted {
                doc_code,
                files_removed,
            } => {
                write!(f, "{} {}", "Deleted".red().bold(), doc_code.bold())?;
                if !files_removed {
                    write!(f, " {}", "(files kept)".dimmed())?;
                }
                Ok(())
            }
            DeleteOutput::NotFound { doc_code } => {
                write!(f, "{} {}", "Not found:".yellow(), doc_code)
            }
            DeleteOutput::Cancelled { doc_code } => write!(
                f,
                "{} would delete {}; pass --force to confirm",
                "Cancelled:".yellow(),
                doc_code.bold()
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Delete {
    type Error = DeleteError;
    type Output = DeleteOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let doc_code = self.code.clone();
        if !self.force {
            return Ok(DeleteOutput::Cancelled { doc_code });
        }

        let state = ctx.open().await?;
        let deleted = state
            .documents()
            .delete_document(&self.code, !self.keep_files)
            .await?;

        if deleted {
            Ok(DeleteOutput::Deleted {
                doc_code,
                files_removed: !self.keep_files,
            })
        } else {
            Ok(DeleteOutput::NotFound { doc_code })
        }
    }
}
