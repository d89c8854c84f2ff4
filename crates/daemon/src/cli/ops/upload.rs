use std::fmt;
use std::path::{Path, PathBuf};

use clap::Args;
use owo_colors::OwoColorize;

use common::document::{Category, Document};
use common::metadata::{Metadata, MetadataValue, KEYWORDS_KEY};
use common::service::{DocumentError, FileContent, UploadRequest};

use crate::cli::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Upload {
    /// File to upload
    #[arg(short, long)]
    pub file: PathBuf,

    /// Unique document code, e.g. HR-001
    #[arg(short, long)]
    pub code: String,

    /// Document title
    #[arg(short, long)]
    pub title: String,

    /// Owning department
    #[arg(short, long)]
    pub department: String,

    /// regulation, sop, policy or training
    #[arg(short = 'C', long)]
    pub category: Category,

    /// Who is uploading
    #[arg(short, long)]
    pub user: String,

    /// Note for the first version
    #[arg(long)]
    pub description: Option<String>,

    /// Search keywords, comma separated
    #[arg(short, long, value_delimiter = ',')]
    pub keywords: Vec<String>,

    /// Person responsible for the document
    #[arg(short, long)]
    pub owner: Option<String>,

    /// Extra metadata as key=value; JSON values are parsed, anything else
    /// is kept as a string
    #[arg(long = "meta", value_parser = parse_meta)]
    pub meta: Vec<(String, MetadataValue)>,

    /// Create the document as a draft
    #[arg(long)]
    pub draft: bool,
}

/// Parse `key=value`, reading the value as JSON when it is valid JSON.
pub(crate) fn parse_meta(raw: &str) -> Result<(String, MetadataValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty metadata key in `{raw}`"));
    }
    let value = serde_json::from_str::<MetadataValue>(value)
        .unwrap_or_else(|_| MetadataValue::from(value));
    Ok((key.to_string(), value))
}

/// Read a file for upload, keeping only its base name.
pub(crate) async fn read_file(path: &Path) -> Result<FileContent, std::io::Error> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a file path: {}", path.display()),
            )
        })?;
    let data = tokio::fs::read(path).await?;
    Ok(FileContent::new(file_name, data))
}

#[derive(Debug)]
pub struct UploadOutput {
    pub document: Document,
}

impl fmt::Display for UploadOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let doc = &self.document;
        writeln!(
            f,
            "{} {} v{}",
            "Uploaded".green().bold(),
            doc.doc_code.bold(),
            doc.current_version
        )?;
        writeln!(f, "  {} {}", "title:".dimmed(), doc.title)?;
        writeln!(f, "  {} {}", "department:".dimmed(), doc.department)?;
        writeln!(f, "  {} {}", "category:".dimmed(), doc.category)?;
        write!(f, "  {} {}", "status:".dimmed(), doc.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
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

impl Upload {
    fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        let keywords: Vec<&str> = self
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .collect();
        if !keywords.is_empty() {
            metadata.insert(KEYWORDS_KEY, keywords);
        }
        if let Some(owner) = &self.owner {
            metadata.insert("owner", owner.as_str());
        }
        for (key, value) in &self.meta {
            metadata.insert(key.clone(), value.clone());
        }
        metadata
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Upload {
    type Error = UploadError;
    type Output = UploadOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let content = read_file(&self.file)
            .await
            .map_err(|source| UploadError::Read {
                path: self.file.display().to_string(),
                source,
            })?;

        let mut request = UploadRequest::new(
            content,
            self.code.clone(),
            self.title.clone(),
            self.department.clone(),
            self.category,
            self.user.clone(),
        )
        .metadata(self.metadata());
        if let Some(description) = &self.description {
            request = request.description(description.clone());
        }
        if self.draft {
            request = request.draft();
        }

        let state = ctx.open().await?;
        let document = state.documents().upload_document(request).await?;

        Ok(UploadOutput { document })
    }
}
