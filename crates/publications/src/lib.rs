//! Faculty publications: the record model, draft validation, document
//! uploads, persistence and per-year statistics.

pub mod error;
pub mod publication;
pub mod service;
pub mod stats;

pub use error::{ServiceError, ServiceResult};
pub use publication::{
    Category, DocumentUpload, EARLIEST_YEAR, PDF_CONTENT_TYPE, Publication, PublicationDraft,
    PublicationRecord, PublicationType, ValidDraft, VerificationStatus, filter_by_category,
    sanitize_file_name,
};
pub use service::{DEFAULT_DOCUMENT_BUCKET, PUBLICATIONS_TABLE, PublicationService};
pub use stats::{
    CHART_YEARS, PublicationChart, PublicationStats, VerificationSplit, publication_chart,
    publication_stats, split_by_status,
};
