//! Publication persistence over the backend contracts.

use std::sync::Arc;

use chrono::Datelike;
use serde_json::Value;

use pubtrack_backend::{
    BackendError, DataStore, ObjectStorage, Query, Row, decode_row, decode_rows, encode_row,
    object_path_from_public_url,
};
use pubtrack_core::{Clock, PublicationId, SubjectId};

use crate::error::ServiceResult;
use crate::publication::{
    DocumentUpload, PDF_CONTENT_TYPE, Publication, PublicationDraft, PublicationRecord,
    VerificationStatus,
};
use crate::stats::{PublicationStats, publication_stats};

pub const PUBLICATIONS_TABLE: &str = "publications";
pub const DEFAULT_DOCUMENT_BUCKET: &str = "publication-documents";

#[derive(Clone)]
pub struct PublicationService {
    store: Arc<dyn DataStore>,
    storage: Arc<dyn ObjectStorage>,
    clock: Arc<dyn Clock>,
    bucket: String,
}

impl PublicationService {
    pub fn new(store: Arc<dyn DataStore>, storage: Arc<dyn ObjectStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            storage,
            clock,
            bucket: DEFAULT_DOCUMENT_BUCKET.to_string(),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn list_for(&self, owner: SubjectId) -> ServiceResult<Vec<Publication>> {
        let rows = self
            .store
            .fetch_rows(PUBLICATIONS_TABLE, &Query::new().eq("profile_id", owner.to_string()))
            .await?;
        Ok(decode_rows(rows)?)
    }

    /// Publications of any of `owners`.
    pub async fn list_for_many(&self, owners: &[SubjectId]) -> ServiceResult<Vec<Publication>> {
        if owners.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::new().is_in("profile_id", owners.iter().map(|o| o.to_string()));
        let rows = self.store.fetch_rows(PUBLICATIONS_TABLE, &query).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn stats_for(&self, owner: SubjectId) -> ServiceResult<PublicationStats> {
        Ok(publication_stats(&self.list_for(owner).await?))
    }

    /// Create a publication, or update `existing` when editing.
    ///
    /// A new document is uploaded before the row is written. The replaced
    /// object is only removed once the row points at the new one; if the
    /// row write fails the fresh upload is removed instead. New records
    /// start pending; edits keep their verification status.
    pub async fn save(
        &self,
        owner: SubjectId,
        existing: Option<&Publication>,
        draft: &PublicationDraft,
        document: Option<DocumentUpload>,
    ) -> ServiceResult<Publication> {
        let now = self.clock.now();
        let valid = draft.validate(now.year())?;

        let previous_url = existing.and_then(|p| p.document_url.clone());
        let mut document_url = previous_url.clone();
        let mut uploaded = None;
        if let Some(upload) = document {
            let path = upload.storage_path(owner, now);
            tracing::info!(%owner, %path, size = upload.len(), "uploading publication document");
            self.storage
                .upload_file(&self.bucket, &path, upload.into_bytes(), PDF_CONTENT_TYPE)
                .await?;
            match self.storage.get_public_url(&self.bucket, &path) {
                Ok(url) => document_url = Some(url.to_string()),
                Err(err) => {
                    self.discard_upload(path).await;
                    return Err(err.into());
                }
            }
            uploaded = Some(path);
        }

        let status = existing.map_or(VerificationStatus::Pending, |p| p.verification_status);
        let written = match encode_row(&PublicationRecord::new(owner, valid, document_url, status)) {
            Ok(record) => self.write_row(existing, record).await,
            Err(err) => Err(err),
        };
        let row = match written {
            Ok(row) => row,
            Err(err) => {
                if let Some(path) = uploaded {
                    self.discard_upload(path).await;
                }
                return Err(err.into());
            }
        };

        if let (Some(_), Some(old)) = (&uploaded, previous_url.as_deref()) {
            let old_path = self.object_path(owner, old);
            if let Err(err) = self.storage.remove_files(&self.bucket, &[old_path]).await {
                tracing::warn!("failed to remove replaced document: {err}");
            }
        }

        let saved: Publication = decode_row(row)?;
        tracing::info!(id = %saved.id, %owner, edited = existing.is_some(), "publication saved");
        Ok(saved)
    }

    async fn write_row(&self, existing: Option<&Publication>, record: Row) -> Result<Row, BackendError> {
        match existing {
            Some(publication) => {
                let query = Query::new().eq("id", publication.id.to_string());
                let mut rows = self.store.update_rows(PUBLICATIONS_TABLE, &query, record).await?;
                if rows.is_empty() {
                    return Err(BackendError::NotFound);
                }
                Ok(rows.swap_remove(0))
            }
            None => self.store.insert_row(PUBLICATIONS_TABLE, record).await,
        }
    }

    async fn discard_upload(&self, path: String) {
        if let Err(err) = self.storage.remove_files(&self.bucket, &[path]).await {
            tracing::warn!("failed to remove orphaned upload: {err}");
        }
    }

    /// Remove the attached document (if any), then the row.
    pub async fn delete(&self, publication: &Publication) -> ServiceResult<()> {
        if let Some(url) = publication.document_url.as_deref() {
            let path = self.object_path(publication.profile_id, url);
            self.storage.remove_files(&self.bucket, &[path]).await?;
        }
        self.store
            .delete_rows(PUBLICATIONS_TABLE, &Query::new().eq("id", publication.id.to_string()))
            .await?;
        tracing::info!(id = %publication.id, "publication deleted");
        Ok(())
    }

    /// Mark a publication as verified.
    pub async fn verify(&self, id: PublicationId) -> ServiceResult<Publication> {
        let patch = status_patch(VerificationStatus::Verified);
        let mut rows = self
            .store
            .update_rows(PUBLICATIONS_TABLE, &Query::new().eq("id", id.to_string()), patch)
            .await?;
        if rows.is_empty() {
            return Err(BackendError::NotFound.into());
        }
        tracing::info!(%id, "publication verified");
        Ok(decode_row(rows.swap_remove(0))?)
    }

    /// Object path for a stored document URL. URLs from another host fall
    /// back to `{owner}/{last segment}`.
    fn object_path(&self, owner: SubjectId, url: &str) -> String {
        object_path_from_public_url(url, &self.bucket).unwrap_or_else(|| {
            let file = url.rsplit('/').next().unwrap_or(url);
            format!("{owner}/{file}")
        })
    }
}

impl core::fmt::Debug for PublicationService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PublicationService")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

fn status_patch(status: VerificationStatus) -> Row {
    let mut row = Row::new();
    row.insert(
        "verification_status".into(),
        serde_json::to_value(status).unwrap_or(Value::Null),
    );
    row
}
