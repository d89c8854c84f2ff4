use std::fmt;

use clap::Args;
use comfy_table::Table;

use common::document::{Category, Document, DocumentStatus};
use common::service::DocumentError;
use common::store::DocumentFilter;

use super::{format_date, truncate};
use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct List {
    /// Only documents of this department
    #[arg(short, long)]
    pub department: Option<String>,

    /// Only documents of this category
    #[arg(short = 'C', long)]
    pub category: Option<Category>,

    /// Match title or code (case-insensitive) or an exact keyword
    #[arg(short, long)]
    pub keyword: Option<String>,

    /// Only documents with this status
    #[arg(short, long)]
    pub status: Option<DocumentStatus>,

    /// Include archived documents
    #[arg(short, long)]
    pub archived: bool,
}

#[derive(Debug)]
pub struct ListOutput {
    pub documents: Vec<Document>,
}

impl fmt::Display for ListOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.documents.is_empty() {
            return write!(f, "No documents found");
        }

        let mut table = Table::new();
        table.set_header(vec![
            "CODE",
            "TITLE",
            "DEPARTMENT",
            "CATEGORY",
            "VERSION",
            "STATUS",
            "UPDATED",
        ]);
        for doc in &self.documents {
            table.add_row(vec![
                doc.doc_code.clone(),
                truncate(&doc.title, 30),
                doc.department.clone(),
                doc.category.to_string(),
                format!("v{}", doc.current_version),
                doc.status.to_string(),
                format_date(&doc.updated_at),
            ]);
        }
        writeln!(f, "{} document(s)", self.documents.len())?;
        write!(f, "{table}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Document(#[from] DocumentError),
}

impl List {
    fn filter(&self) -> DocumentFilter {
        DocumentFilter {
            department: self.department.clone(),
            category: self.category,
            keyword: self.keyword.clone(),
            status: self.status,
            include_archived: self.archived,
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for List {
    type Error = ListError;
    type Output = ListOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.open().await?;
        let documents = state.documents().search(&self.filter()).await?;

        Ok(ListOutput { documents })
    }
}
