//! Document and version records.
//!
//! These are immutable snapshots: the `with_*` helpers return modified
//! copies and never touch persisted state. The document service is the only
//! writer of records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::Metadata;
use crate::store::BlobRef;

/// Document category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Regulation,
    Sop,
    Policy,
    Training,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Regulation,
        Category::Sop,
        Category::Policy,
        Category::Training,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Regulation => "regulation",
            Category::Sop => "sop",
            Category::Policy => "policy",
            Category::Training => "training",
        }
    }

    /// Human readable label
    pub fn label(&self) -> &'static str {
        match self {
            Category::Regulation => "Regulation",
            Category::Sop => "SOP",
            Category::Policy => "Policy",
            Category::Training => "Training",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Lifecycle status of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Active,
    Archived,
    Draft,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 3] = [
        DocumentStatus::Active,
        DocumentStatus::Archived,
        DocumentStatus::Draft,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Active => "active",
            DocumentStatus::Archived => "archived",
            DocumentStatus::Draft => "draft",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown document status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for DocumentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Store-assigned identity of a document record, distinct from its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for RecordId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File type derived from a file name: the text after the last `.`,
/// lower-cased. A name without a dot is its own type.
pub fn file_type_of(file_name: &str) -> String {
    file_name
        .rsplit('.')
        .next()
        .unwrap_or(file_name)
        .to_lowercase()
}

/// One immutable uploaded revision of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    /// 1-based version number
    pub version: u32,
    pub file_name: String,
    pub file_type: String,
    pub blob: BlobRef,
    pub file_size: u64,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
}

impl Version {
    pub fn new(
        version: u32,
        file_name: impl Into<String>,
        blob: BlobRef,
        file_size: u64,
        uploaded_by: impl Into<String>,
        uploaded_at: DateTime<Utc>,
        description: impl Into<String>,
    ) -> Self {
        let file_name = file_name.into();
        Self {
            version,
            file_type: file_type_of(&file_name),
            file_name,
            blob,
            file_size,
            uploaded_by: uploaded_by.into(),
            uploaded_at,
            description: description.into(),
        }
    }
}

/// Broken record invariants, reported by [`Document::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("document has no versions")]
    NoVersions,
    #[error("version at position {position} is numbered {found}")]
    NonContiguous { position: usize, found: u32 },
    #[error("current_version {current} does not match {count} versions")]
    CurrentVersionMismatch { current: u32, count: usize },
    #[error("updated_at precedes created_at")]
    TimestampOrder,
}

/// A versioned document record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: RecordId,
    pub doc_code: String,
    pub title: String,
    pub department: String,
    pub category: Category,
    pub status: DocumentStatus,
    pub current_version: u32,
    pub versions: Vec<Version>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// A fresh active document holding its first version.
    pub fn new(
        doc_code: impl Into<String>,
        title: impl Into<String>,
        department: impl Into<String>,
        category: Category,
        first: Version,
        metadata: Metadata,
    ) -> Self {
        let now = first.uploaded_at;
        Self {
            id: RecordId::generate(),
            doc_code: doc_code.into(),
            title: title.into(),
            department: department.into(),
            category,
            status: DocumentStatus::Active,
            current_version: first.version,
            versions: vec![first],
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// The version with the highest number.
    pub fn latest_version(&self) -> Option<&Version> {
        self.versions.iter().max_by_key(|v| v.version)
    }

    pub fn version(&self, number: u32) -> Option<&Version> {
        self.versions.iter().find(|v| v.version == number)
    }

    pub fn next_version_number(&self) -> u32 {
        self.current_version + 1
    }

    pub fn is_archived(&self) -> bool {
        self.status == DocumentStatus::Archived
    }

    /// Copy with `version` appended and `current_version` moved to it.
    pub fn with_version(&self, version: Version, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.current_version = version.version;
        next.versions.push(version);
        next.updated_at = at;
        next
    }

    pub fn with_status(&self, status: DocumentStatus, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.updated_at = at;
        next
    }

    pub fn with_metadata(&self, metadata: Metadata, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.metadata = metadata;
        next.updated_at = at;
        next
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.versions.is_empty() {
            return Err(InvariantViolation::NoVersions);
        }
        for (position, v) in self.versions.iter().enumerate() {
            if v.version as usize != position + 1 {
                return Err(InvariantViolation::NonContiguous {
                    position,
                    found: v.version,
                });
            }
        }
        if self.current_version as usize != self.versions.len() {
            return Err(InvariantViolation::CurrentVersionMismatch {
                current: self.current_version,
                count: self.versions.len(),
            });
        }
        if self.updated_at < self.created_at {
            return Err(InvariantViolation::TimestampOrder);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(n: u32) -> Version {
        Version::new(
            n,
            format!("leave-v{n}.PDF"),
            BlobRef::new(format!("blob-{n}")),
            10,
            "alice",
            Utc::now(),
            "",
        )
    }

    #[test]
    fn test_file_type_of() {
        assert_eq!(file_type_of("policy.PDF"), "pdf");
        assert_eq!(file_type_of("archive.tar.GZ"), "gz");
        assert_eq!(file_type_of("README"), "readme");
        assert_eq!(file_type_of("trailing."), "");
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("SOP".parse::<Category>().unwrap(), Category::Sop);
        assert_eq!("regulation".parse::<Category>().unwrap(), Category::Regulation);
        assert_eq!(" Training ".parse::<Category>().unwrap(), Category::Training);
        assert!("memo".parse::<Category>().is_err());
        assert_eq!(Category::Sop.to_string(), "SOP");
    }

    #[test]
    fn test_latest_and_lookup() {
        let doc = Document::new(
            "HR-001",
            "Leave Policy",
            "HR",
            Category::Regulation,
            version(1),
            Metadata::new(),
        );
        let doc = doc.with_version(version(2), Utc::now());

        assert_eq!(doc.latest_version().unwrap().version, 2);
        assert_eq!(doc.version(1).unwrap().file_name, "leave-v1.PDF");
        assert_eq!(doc.version(1).unwrap().file_type, "pdf");
        assert!(doc.version(3).is_none());
        assert_eq!(doc.current_version, 2);
        assert_eq!(doc.next_version_number(), 3);
        doc.check_invariants().unwrap();
    }

    #[test]
    fn test_invariant_violations() {
        let mut doc = Document::new(
            "HR-002",
            "Overtime",
            "HR",
            Category::Policy,
            version(1),
            Metadata::new(),
        );
        doc.current_version = 4;
        assert_eq!(
            doc.check_invariants(),
            Err(InvariantViolation::CurrentVersionMismatch {
                current: 4,
                count: 1
            })
        );

        doc.versions = vec![version(2)];
        assert!(matches!(
            doc.check_invariants(),
            Err(InvariantViolation::NonContiguous { position: 0, found: 2 })
        ));

        doc.versions.clear();
        assert_eq!(doc.check_invariants(), Err(InvariantViolation::NoVersions));
    }

    #[test]
    fn test_status_copy_keeps_created_at() {
        let doc = Document::new(
            "QA-001",
            "Inspection SOP",
            "QA",
            Category::Sop,
            version(1),
            Metadata::new(),
        );
        let later = doc.created_at + chrono::Duration::seconds(5);
        let archived = doc.with_status(DocumentStatus::Archived, later);

        assert_eq!(archived.created_at, doc.created_at);
        assert_eq!(archived.updated_at, later);
        assert!(archived.is_archived());
        assert!(!doc.is_archived());
    }
}
