use std::fmt;

use clap::Args;
use owo_colors::OwoColorize;

use common::metadata::{Metadata, MetadataValue};
use common::service::DocumentError;

use super::upload::parse_meta;
use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct UpdateMetadata {
    /// Document code
    #[arg(short, long)]
    pub code: String,

    /// Metadata entry as key=value; repeat for several
    #[arg(long = "set", value_parser = parse_meta, required = true)]
    pub entries: Vec<(String, MetadataValue)>,

    /// Replace all existing metadata instead of merging into it
    #[arg(long)]
    pub replace: bool,
}

#[derive(Debug)]
pub struct UpdateMetadataOutput {
    pub doc_code: String,
    pub metadata: Metadata,
}

impl fmt::Display for UpdateMetadataOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} metadata of {}",
            "Updated".green().bold(),
            self.doc_code.bold()
        )?;
        for (key, value) in self.metadata.iter() {
            write!(f, "\n  {} {}", format!("{key}:").dimmed(), value)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateMetadataError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for UpdateMetadata {
    type Error = UpdateMetadataError;
    type Output = UpdateMetadataOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let update: Metadata = self.entries.iter().cloned().collect();

        let state = ctx.open().await?;
        let doc = state
            .documents()
            .update_metadata(&self.code, update, !self.replace)
            .await?;

        Ok(UpdateMetadataOutput {
            doc_code: doc.doc_code,
            metadata: doc.metadata,
        })
    }
}
