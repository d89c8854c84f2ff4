use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use common::document::Version;
use common::service::DocumentError;

use super::info::version_table;
use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct History {
    /// Document code
    #[arg(short, long)]
    pub code: String,

    /// Show a single version
    #[arg(short, long)]
    pub version: Option<u32>,
}

#[derive(Debug)]
pub struct HistoryOutput {
    pub doc_code: String,
    pub versions: Vec<Version>,
}

impl fmt::Display for HistoryOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", "History of".dimmed(), self.doc_code.bold())?;
        write!(f, "{}", version_table(&self.versions))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for History {
    type Error = HistoryError;
    type Output = HistoryOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open().await?;
        let documents = state.documents();

        let versions = match self.version {
            Some(number) => documents
                .get_version(&self.code, number)
                .await?
                .map(|v| vec![v])
                .ok_or_else(|| DocumentError::VersionNotFound {
                    doc_code: self.code.clone(),
                    version: number,
                })?,
            None => documents.get_version_history(&self.code).await?,
        };

        Ok(HistoryOutput {
            doc_code: self.code.clone(),
            versions,
        })
    }
}
