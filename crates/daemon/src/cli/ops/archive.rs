use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use common::document::Document;
use common::service::DocumentError;

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Archive {
    /// Document code
    #[arg(short, long)]
    pub code: String,
}

#[derive(Debug)]
pub struct ArchiveOutput {
    pub document: Document,
}

impl fmt::Display for ArchiveOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            "Archived".yellow().bold(),
            self.document.doc_code.bold(),
            self.document.title
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Archive {
    type Error = ArchiveError;
    type Output = ArchiveOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open().await?;
        let document = state.documents().archive_document(&self.code).await?;
        Ok(ArchiveOutput { document })
    }
}
