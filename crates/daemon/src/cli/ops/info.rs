use std::fmt;

use clap::Args;
use comfy_table::Table;
use owo_colors::OwoColorize;

use common::document::{Document, Version};
use common::service::DocumentError;

use super::{format_date, format_size, truncate};
use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Info {
    /// Document code
    #[arg(short, long)]
    pub code: String,
}

#[derive(Debug)]
pub struct InfoOutput {
    pub document: Document,
}

pub(crate) fn version_table(versions: &[Version]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "VERSION",
        "FILE",
        "SIZE",
        "UPLOADED BY",
        "UPLOADED AT",
        "DESCRIPTION",
    ]);
    for v in versions {
        table.add_row(vec![
            format!("v{}", v.version),
            v.file_name.clone(),
            format_size(v.file_size),
            v.uploaded_by.clone(),
            format_date(&v.uploaded_at),
            truncate(&v.description, 20),
        ]);
    }
    table
}

impl fmt::Display for InfoOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let doc = &self.document;
        writeln!(f, "{} {}", doc.doc_code.bold(), doc.title)?;
        writeln!(f, "  {} {}", "department:".dimmed(), doc.department)?;
        writeln!(f, "  {} {}", "category:".dimmed(), doc.category)?;
        writeln!(f, "  {} {}", "status:".dimmed(), doc.status)?;
        writeln!(f, "  {} v{}", "version:".dimmed(), doc.current_version)?;
        writeln!(f, "  {} {}", "created:".dimmed(), format_date(&doc.created_at))?;
        writeln!(f, "  {} {}", "updated:".dimmed(), format_date(&doc.updated_at))?;

        if !doc.metadata.is_empty() {
            writeln!(f, "{}", "Metadata".bold())?;
            for (key, value) in doc.metadata.iter() {
                writeln!(f, "  {} {}", format!("{key}:").dimmed(), value)?;
            }
        }

        writeln!(f, "{}", "Versions".bold())?;
        write!(f, "{}", version_table(&doc.versions))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InfoError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Info {
    type Error = InfoError;
    type Output = InfoOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open().await?;
        let document = state
            .documents()
            .get_by_doc_code(&self.code)
            .await?
            .ok_or_else(|| InfoError::NotFound(self.code.clone()))?;

        Ok(InfoOutput { document })
    }
}
