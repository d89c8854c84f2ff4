use std::cmp::Ordering;

use crate::document::{Category, Document, DocumentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClause {
    Is(DocumentStatus),
    IsNot(DocumentStatus),
}

/// Search criteria for documents. All set criteria must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFilter {
    pub department: Option<String>,
    pub category: Option<Category>,
    /// Case-insensitive substring of title or doc_code, or an exact
    /// element of `metadata.keywords`
    pub keyword: Option<String>,
    /// Exact status; overrides `include_archived`
    pub status: Option<DocumentStatus>,
    pub include_archived: bool,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn status(mut self, status: DocumentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn include_archived(mut self, include: bool) -> Self {
        self.include_archived = include;
        self
    }

    /// The status restriction a store should push into its query, if any.
    pub fn status_clause(&self) -> Option<StatusClause> {
        match (self.status, self.include_archived) {
            (Some(status), _) => Some(StatusClause::Is(status)),
            (None, false) => Some(StatusClause::IsNot(DocumentStatus::Archived)),
            (None, true) => None,
        }
    }

    pub fn matches(&self, doc: &Document) -> bool {
        let status_ok = match self.status_clause() {
            Some(StatusClause::Is(status)) => doc.status == status,
            Some(StatusClause::IsNot(excluded)) => doc.status != excluded,
            None => true,
        };
        status_ok
            && self
                .department
                .as_ref()
                .map_or(true, |d| &doc.department == d)
            && self.category.map_or(true, |c| doc.category == c)
            && self.keyword.as_ref().map_or(true, |k| keyword_matches(doc, k))
    }
}

fn keyword_matches(doc: &Document, keyword: &str) -> bool {
    let needle = keyword.to_lowercase();
    doc.title.to_lowercase().contains(&needle)
        || doc.doc_code.to_lowercase().contains(&needle)
        || doc.metadata.keywords().any(|k| k == keyword)
}

fn by_recency(a: &Document, b: &Document) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| a.doc_code.cmp(&b.doc_code))
}

/// Result ordering: most recently updated first, doc_code breaks ties.
pub fn sort_by_recency(docs: &mut [Document]) {
    docs.sort_by(by_recency);
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::document::Version;
    use crate::metadata::{Metadata, MetadataValue, KEYWORDS_KEY};
    use crate::store::BlobRef;

    fn doc(code: &str, title: &str, status: DocumentStatus) -> Document {
        let v = Version::new(1, "a.pdf", BlobRef::new("x"), 1, "alice", Utc::now(), "");
        let metadata = Metadata::new().with(
            KEYWORDS_KEY,
            MetadataValue::List(vec!["Annual Leave".into()]),
        );
        let mut doc = Document::new(code, title, "HR", Category::Regulation, v, metadata);
        doc.status = status;
        doc
    }

    #[test]
    fn test_archived_excluded_by_default() {
        let archived = doc("HR-001", "Leave", DocumentStatus::Archived);
        let draft = doc("HR-002", "Leave", DocumentStatus::Draft);

        let filter = DocumentFilter::new();
        assert!(!filter.matches(&archived));
        assert!(filter.matches(&draft));

        let filter = DocumentFilter::new().include_archived(true);
        assert!(filter.matches(&archived));

        // explicit status wins over include_archived
        let filter = DocumentFilter::new().status(DocumentStatus::Archived);
        assert!(filter.matches(&archived));
        assert!(!filter.matches(&draft));
    }

    #[test]
    fn test_keyword_rules() {
        let d = doc("HR-001", "Leave Policy", DocumentStatus::Active);

        assert!(DocumentFilter::new().keyword("leave policy").matches(&d));
        assert!(DocumentFilter::new().keyword("hr-0").matches(&d));
        // metadata keywords match exactly, case included
        assert!(DocumentFilter::new().keyword("Annual Leave").matches(&d));
        assert!(!DocumentFilter::new().keyword("annual leave").matches(&d));
        assert!(!DocumentFilter::new().keyword("overtime").matches(&d));
    }

    #[test]
    fn test_department_and_category() {
        let d = doc("HR-001", "Leave", DocumentStatus::Active);
        assert!(DocumentFilter::new().department("HR").matches(&d));
        assert!(!DocumentFilter::new().department("hr").matches(&d));
        assert!(DocumentFilter::new()
            .category(Category::Regulation)
            .matches(&d));
        assert!(!DocumentFilter::new().category(Category::Sop).matches(&d));
    }
}
