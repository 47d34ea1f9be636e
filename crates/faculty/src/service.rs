//! Profile and faculty-management services.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Datelike;
use serde_json::Value;

use pubtrack_backend::{BackendError, DataStore, Query, Row, decode_row, decode_rows, encode_row};
use pubtrack_core::{Clock, DomainError, PublicationId, SubjectId};
use pubtrack_publications::{
    Publication, PublicationService, PublicationStats, ServiceError, ServiceResult, publication_stats,
    split_by_status,
};

use crate::profile::{Profile, ProfileChanges};
use crate::roster::{
    Department, JOIN_CHART_YEARS, MANAGED_ROLES, MemberDraft, RosterStats, YearCount,
    department_distribution, joined_in, joins_per_year, roster_stats,
};

pub const PROFILES_TABLE: &str = "profiles";
pub const DEPARTMENTS_TABLE: &str = "departments";

/// The signed-in user's own profile.
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn DataStore>,
    publications: PublicationService,
    clock: Arc<dyn Clock>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn DataStore>, publications: PublicationService, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            publications,
            clock,
        }
    }

    /// The stored profile, or `{id, email}` when none exists yet.
    pub async fn own_profile(&self, subject: SubjectId, email: Option<&str>) -> ServiceResult<Profile> {
        match self
            .store
            .fetch_row(PROFILES_TABLE, &Query::new().eq("id", subject.to_string()))
            .await
        {
            Ok(row) => Ok(decode_row(row)?),
            Err(BackendError::NotFound) => Ok(Profile::fallback(subject, email.map(str::to_string))),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn overview(&self, subject: SubjectId, email: Option<&str>) -> ServiceResult<(Profile, PublicationStats)> {
        let profile = self.own_profile(subject, email).await?;
        let stats = self.publications.stats_for(subject).await?;
        Ok((profile, stats))
    }

    /// Upsert on `id`, stamping `updated_at`.
    pub async fn save(&self, subject: SubjectId, changes: &ProfileChanges) -> ServiceResult<Profile> {
        let mut row = encode_row(changes)?;
        row.insert("id".into(), Value::String(subject.to_string()));
        row.insert("updated_at".into(), Value::String(self.clock.now().to_rfc3339()));

        let saved = self.store.upsert_row(PROFILES_TABLE, row, "id").await?;
        tracing::info!(%subject, "profile saved");
        Ok(decode_row(saved)?)
    }
}

/// Department view for a faculty coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorDashboard {
    pub department: String,
    pub faculty: Vec<Profile>,
    pub pending: Vec<Publication>,
    pub verified: Vec<Publication>,
    pub total_faculty: usize,
    pub new_this_year: usize,
    pub distribution: BTreeMap<String, usize>,
    pub joins: Vec<YearCount>,
    authors: HashMap<SubjectId, String>,
}

impl CoordinatorDashboard {
    pub fn pending_verifications(&self) -> usize {
        self.pending.len()
    }

    pub fn author_of(&self, publication: &Publication) -> &str {
        self.authors
            .get(&publication.profile_id)
            .map(String::as_str)
            .unwrap_or("Unknown")
    }

    pub fn publication_stats(&self) -> PublicationStats {
        let all: Vec<Publication> = self.pending.iter().chain(&self.verified).cloned().collect();
        publication_stats(&all)
    }
}

/// Roster management for heads of department and coordinators.
#[derive(Clone)]
pub struct FacultyService {
    store: Arc<dyn DataStore>,
    publications: PublicationService,
    clock: Arc<dyn Clock>,
}

impl FacultyService {
    pub fn new(store: Arc<dyn DataStore>, publications: PublicationService, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            publications,
            clock,
        }
    }

    /// Every profile holding one of the managed roles.
    pub async fn roster(&self) -> ServiceResult<Vec<Profile>> {
        let query = Query::new().is_in("role", MANAGED_ROLES.iter().map(|r| r.as_str().to_string()));
        let rows = self.store.fetch_rows(PROFILES_TABLE, &query).await?;
        Ok(decode_rows(rows)?)
    }

    pub async fn roster_with_stats(&self) -> ServiceResult<(Vec<Profile>, RosterStats)> {
        let roster = self.roster().await?;
        let stats = roster_stats(&roster);
        Ok((roster, stats))
    }

    pub async fn add_member(&self, draft: &MemberDraft) -> ServiceResult<Profile> {
        let record = draft.validate()?;
        let row = self.store.insert_row(PROFILES_TABLE, encode_row(&record)?).await?;
        tracing::info!(email = %record.email, role = %record.role, "faculty member added");
        Ok(decode_row(row)?)
    }

    pub async fn update_member(&self, id: SubjectId, draft: &MemberDraft) -> ServiceResult<Profile> {
        let record = draft.validate()?;
        let mut rows = self
            .store
            .update_rows(PROFILES_TABLE, &Query::new().eq("id", id.to_string()), encode_row(&record)?)
            .await?;
        if rows.is_empty() {
            return Err(BackendError::NotFound.into());
        }
        tracing::info!(%id, "faculty member updated");
        Ok(decode_row(rows.swap_remove(0))?)
    }

    /// Returns the number of removed profiles.
    pub async fn remove_by_email(&self, email: &str) -> ServiceResult<usize> {
        let email = email.trim().to_lowercase();
        let removed = self
            .store
            .delete_rows(PROFILES_TABLE, &Query::new().eq("email", email.clone()))
            .await?;
        tracing::info!(%email, count = removed.len(), "faculty member removed");
        Ok(removed.len())
    }

    /// Make `email` the only coordinator.
    pub async fn assign_coordinator(&self, email: &str) -> ServiceResult<()> {
        let email = email.trim().to_lowercase();
        let target = Query::new().eq("email", email.clone());
        if self.store.fetch_rows(PROFILES_TABLE, &target).await?.is_empty() {
            return Err(BackendError::NotFound.into());
        }

        self.store
            .update_rows(
                PROFILES_TABLE,
                &Query::new().neq("email", email.clone()),
                flag("is_coordinator", false),
            )
            .await?;
        self.store
            .update_rows(PROFILES_TABLE, &target, flag("is_coordinator", true))
            .await?;
        tracing::info!(%email, "coordinator assigned");
        Ok(())
    }

    /// Faculty and publications of the coordinator's department.
    pub async fn coordinator_dashboard(&self, coordinator: SubjectId) -> ServiceResult<CoordinatorDashboard> {
        let own: Profile = decode_row(
            self.store
                .fetch_row(PROFILES_TABLE, &Query::new().eq("id", coordinator.to_string()))
                .await?,
        )?;
        let department_id = own
            .department_id
            .ok_or_else(|| ServiceError::from(DomainError::validation("No department assigned")))?;

        let department: Department = decode_row(
            self.store
                .fetch_row(DEPARTMENTS_TABLE, &Query::new().eq("id", department_id.to_string()))
                .await?,
        )?;

        let faculty: Vec<Profile> = decode_rows(
            self.store
                .fetch_rows(
                    PROFILES_TABLE,
                    &Query::new().eq("department_id", department_id.to_string()),
                )
                .await?,
        )?;

        let ids: Vec<SubjectId> = faculty.iter().map(|p| p.id).collect();
        let split = split_by_status(self.publications.list_for_many(&ids).await?);

        let year = self.clock.now().year();
        let names = HashMap::from([(department.id, department.name.clone())]);
        let authors = faculty
            .iter()
            .map(|p| (p.id, p.display_name().to_string()))
            .collect();

        Ok(CoordinatorDashboard {
            department: department.name,
            total_faculty: faculty.len(),
            new_this_year: joined_in(&faculty, year),
            distribution: department_distribution(&faculty, &names),
            joins: joins_per_year(&faculty, year, JOIN_CHART_YEARS),
            pending: split.pending,
            verified: split.verified,
            faculty,
            authors,
        })
    }

    pub async fn verify_publication(&self, id: PublicationId) -> ServiceResult<Publication> {
        self.publications.verify(id).await
    }
}

fn flag(column: &str, value: bool) -> Row {
    let mut row = Row::new();
    row.insert(column.to_string(), Value::Bool(value));
    row
}

impl core::fmt::Debug for ProfileService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProfileService").finish_non_exhaustive()
    }
}

impl core::fmt::Debug for FacultyService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FacultyService").finish_non_exhaustive()
    }
}
