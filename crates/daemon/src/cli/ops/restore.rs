use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use common::document::Document;
use common::service::DocumentError;

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Restore {
    /// Document code
    #[arg(short, long)]
    pub code: String,
}

#[derive(Debug)]
pub struct RestoreOutput {
    pub document: Document,
}

impl fmt::Display for RestoreOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            "Restored".green().bold(),
            self.document.doc_code.bold(),
            self.document.status
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Restore {
    type Error = RestoreError;
    type Output = RestoreOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open().await?;
        let document = state.documents().restore_document(&self.code).await?;
        Ok(RestoreOutput { document })
    }
}
