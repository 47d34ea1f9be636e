//! Publication records and the rules for creating and editing them.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use pubtrack_core::{DomainError, DomainResult, PublicationId, SubjectId};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Earliest publication year accepted on input.
pub const EARLIEST_YEAR: i32 = 1900;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PublicationType {
    #[serde(rename = "Journal Paper")]
    JournalPaper,
    #[serde(rename = "Conference Paper")]
    ConferencePaper,
    #[serde(rename = "Patent")]
    Patent,
    #[serde(rename = "Book Chapter")]
    BookChapter,
}

impl PublicationType {
    pub const ALL: [PublicationType; 4] = [
        PublicationType::JournalPaper,
        PublicationType::ConferencePaper,
        PublicationType::Patent,
        PublicationType::BookChapter,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            PublicationType::JournalPaper => "Journal Paper",
            PublicationType::ConferencePaper => "Conference Paper",
            PublicationType::Patent => "Patent",
            PublicationType::BookChapter => "Book Chapter",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }
}

impl core::fmt::Display for PublicationType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    #[default]
    Pending,
    Verified,
}

/// A stored publication row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    pub id: PublicationId,
    pub profile_id: SubjectId,
    pub title: String,
    pub publication_type: PublicationType,
    #[serde(default)]
    pub publication_name: Option<String>,
    #[serde(default)]
    pub issn_isbn: Option<String>,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub doi_link: Option<String>,
    #[serde(default)]
    pub document_url: Option<String>,
    #[serde(default)]
    pub is_scopus_indexed: bool,
    #[serde(default)]
    pub is_ugc_care: bool,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Publication {
    pub fn is_verified(&self) -> bool {
        self.verification_status == VerificationStatus::Verified
    }
}

/// Category selector used by publication tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Category {
    #[default]
    All,
    Only(PublicationType),
}

impl Category {
    /// `"All"` or a type label; anything else is `None`.
    pub fn parse(label: &str) -> Option<Self> {
        if label == "All" {
            return Some(Category::All);
        }
        PublicationType::from_label(label).map(Category::Only)
    }

    pub fn includes(&self, publication: &Publication) -> bool {
        match self {
            Category::All => true,
            Category::Only(t) => publication.publication_type == *t,
        }
    }
}

pub fn filter_by_category(publications: &[Publication], category: Category) -> Vec<Publication> {
    publications
        .iter()
        .filter(|p| category.includes(p))
        .cloned()
        .collect()
}

/// Raw form input for creating or editing a publication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicationDraft {
    pub title: String,
    pub publication_type: Option<PublicationType>,
    pub publication_name: String,
    pub issn_isbn: String,
    pub publication_year: String,
    pub doi_link: String,
    pub is_scopus_indexed: bool,
    pub is_ugc_care: bool,
}

impl PublicationDraft {
    /// Pre-fill from an existing record for editing.
    pub fn from_publication(publication: &Publication) -> Self {
        Self {
            title: publication.title.clone(),
            publication_type: Some(publication.publication_type),
            publication_name: publication.publication_name.clone().unwrap_or_default(),
            issn_isbn: publication.issn_isbn.clone().unwrap_or_default(),
            publication_year: publication
                .publication_year
                .map(|y| y.to_string())
                .unwrap_or_default(),
            doi_link: publication.doi_link.clone().unwrap_or_default(),
            is_scopus_indexed: publication.is_scopus_indexed,
            is_ugc_care: publication.is_ugc_care,
        }
    }

    /// Check the draft and produce the fields to persist.
    ///
    /// Years must fall between [`EARLIEST_YEAR`] and next year.
    pub fn validate(&self, current_year: i32) -> DomainResult<ValidDraft> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("Title is required"));
        }
        let publication_type = self
            .publication_type
            .ok_or_else(|| DomainError::validation("Publication type is required"))?;

        let publication_year = match self.publication_year.trim() {
            "" => None,
            raw => {
                let year: i32 = raw
                    .parse()
                    .map_err(|_| DomainError::validation("Publication year must be a number"))?;
                if !(EARLIEST_YEAR..=current_year + 1).contains(&year) {
                    return Err(DomainError::validation(format!(
                        "Publication year must be between {EARLIEST_YEAR} and {}",
                        current_year + 1
                    )));
                }
                Some(year)
            }
        };

        let doi_link = non_empty(&self.doi_link);
        if let Some(link) = &doi_link {
            let valid = Url::parse(link).is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
            if !valid {
                return Err(DomainError::validation("DOI link must be an http(s) URL"));
            }
        }

        Ok(ValidDraft {
            title: title.to_string(),
            publication_type,
            publication_name: non_empty(&self.publication_name),
            issn_isbn: non_empty(&self.issn_isbn),
            publication_year,
            doi_link,
            is_scopus_indexed: self.is_scopus_indexed,
            is_ugc_care: self.is_ugc_care,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// A draft that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft {
    pub title: String,
    pub publication_type: PublicationType,
    pub publication_name: Option<String>,
    pub issn_isbn: Option<String>,
    pub publication_year: Option<i32>,
    pub doi_link: Option<String>,
    pub is_scopus_indexed: bool,
    pub is_ugc_care: bool,
}

/// Columns written on insert or update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicationRecord {
    pub profile_id: SubjectId,
    pub title: String,
    pub publication_type: PublicationType,
    pub publication_name: Option<String>,
    pub issn_isbn: Option<String>,
    pub publication_year: Option<i32>,
    pub doi_link: Option<String>,
    pub document_url: Option<String>,
    pub is_scopus_indexed: bool,
    pub is_ugc_care: bool,
    pub verification_status: VerificationStatus,
}

impl PublicationRecord {
    pub fn new(
        owner: SubjectId,
        draft: ValidDraft,
        document_url: Option<String>,
        verification_status: VerificationStatus,
    ) -> Self {
        Self {
            profile_id: owner,
            title: draft.title,
            publication_type: draft.publication_type,
            publication_name: draft.publication_name,
            issn_isbn: draft.issn_isbn,
            publication_year: draft.publication_year,
            doi_link: draft.doi_link,
            document_url,
            is_scopus_indexed: draft.is_scopus_indexed,
            is_ugc_care: draft.is_ugc_care,
            verification_status,
        }
    }
}

static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9.-]").expect("static regex"));

/// Replace everything but ASCII letters, digits, `.` and `-` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    UNSAFE_FILE_CHARS.replace_all(name, "_").into_owned()
}

/// A PDF picked for upload alongside a publication.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    file_name: String,
    bytes: Vec<u8>,
}

impl DocumentUpload {
    /// Accept only PDF documents.
    pub fn pdf(file_name: impl Into<String>, content_type: &str, bytes: Vec<u8>) -> DomainResult<Self> {
        let file_name = file_name.into();
        if !content_type.eq_ignore_ascii_case(PDF_CONTENT_TYPE) {
            return Err(DomainError::validation("Please select a valid PDF file."));
        }
        if bytes.is_empty() || file_name.trim().is_empty() {
            return Err(DomainError::validation("Please select a valid PDF file."));
        }
        Ok(Self { file_name, bytes })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// `{owner}/{epoch_ms}_{sanitized name}`.
    pub fn storage_path(&self, owner: SubjectId, at: DateTime<Utc>) -> String {
        format!(
            "{owner}/{}_{}",
            at.timestamp_millis(),
            sanitize_file_name(&self.file_name)
        )
    }
}

impl core::fmt::Debug for DocumentUpload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DocumentUpload")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn draft() -> PublicationDraft {
        PublicationDraft {
            title: "  Graph Sparsifiers  ".to_string(),
            publication_type: Some(PublicationType::JournalPaper),
            publication_year: "2023".to_string(),
            doi_link: "https://doi.org/10.1000/xyz".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn valid_draft_is_trimmed() {
        let valid = draft().validate(2025).unwrap();
        assert_eq!(valid.title, "Graph Sparsifiers");
        assert_eq!(valid.publication_year, Some(2023));
        assert_eq!(valid.publication_name, None);
    }

    #[test]
    fn title_and_type_are_required() {
        let mut d = draft();
        d.title = "   ".into();
        assert_eq!(d.validate(2025), Err(DomainError::validation("Title is required")));

        let mut d = draft();
        d.publication_type = None;
        assert_eq!(
            d.validate(2025),
            Err(DomainError::validation("Publication type is required"))
        );
    }

    #[test]
    fn year_must_be_plausible() {
        let mut d = draft();
        d.publication_year = "twenty".into();
        assert!(d.validate(2025).is_err());

        d.publication_year = "2027".into();
        assert!(d.validate(2025).is_err());

        d.publication_year = "2026".into();
        assert!(d.validate(2025).is_ok());

        d.publication_year = "".into();
        assert_eq!(d.validate(2025).unwrap().publication_year, None);
    }

    #[test]
    fn doi_link_must_be_http() {
        let mut d = draft();
        d.doi_link = "doi:10.1000/xyz".into();
        assert!(d.validate(2025).is_err());
    }

    #[test]
    fn type_labels_round_trip_through_serde() {
        assert_eq!(
            serde_json::to_value(PublicationType::BookChapter).unwrap(),
            json!("Book Chapter")
        );
        for t in PublicationType::ALL {
            assert_eq!(PublicationType::from_label(t.label()), Some(t));
        }
    }

    #[test]
    fn stored_row_decodes_with_defaults() {
        let p: Publication = serde_json::from_value(json!({
            "id": "0190f0c4-8a1e-7cc3-9a4b-3d2f1e0a9b8c",
            "profile_id": "0190f0c4-8a1e-7cc3-9a4b-3d2f1e0a9b8d",
            "title": "T",
            "publication_type": "Patent"
        }))
        .unwrap();
        assert_eq!(p.verification_status, VerificationStatus::Pending);
        assert!(!p.is_scopus_indexed);
    }

    #[test]
    fn only_pdfs_are_accepted() {
        assert!(DocumentUpload::pdf("a.pdf", "application/pdf", vec![1]).is_ok());
        assert_eq!(
            DocumentUpload::pdf("a.docx", "application/msword", vec![1]),
            Err(DomainError::validation("Please select a valid PDF file."))
        );
        assert!(DocumentUpload::pdf("a.pdf", "application/pdf", vec![]).is_err());
    }

    #[test]
    fn storage_path_is_sanitized_and_timestamped() {
        let owner = SubjectId::new();
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let upload = DocumentUpload::pdf("My Paper (final).pdf", "application/pdf", vec![1]).unwrap();
        assert_eq!(
            upload.storage_path(owner, at),
            format!("{owner}/1700000000123_My_Paper__final_.pdf")
        );
    }

    #[test]
    fn category_filter() {
        let mut p: Publication = serde_json::from_value(json!({
            "id": "0190f0c4-8a1e-7cc3-9a4b-3d2f1e0a9b8c",
            "profile_id": "0190f0c4-8a1e-7cc3-9a4b-3d2f1e0a9b8d",
            "title": "T",
            "publication_type": "Patent"
        }))
        .unwrap();
        let patent = p.clone();
        p.publication_type = PublicationType::JournalPaper;
        let all = vec![patent.clone(), p];

        assert_eq!(filter_by_category(&all, Category::All).len(), 2);
        assert_eq!(
            filter_by_category(&all, Category::parse("Patent").unwrap()),
            vec![patent]
        );
        assert_eq!(Category::parse("Poem"), None);
    }
}
