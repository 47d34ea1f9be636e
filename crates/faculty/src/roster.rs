//! Faculty roster aggregates and the add/edit member form.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use pubtrack_auth::Role;
use pubtrack_core::{DepartmentId, DomainError, DomainResult};

use crate::profile::{Profile, is_valid_email};

/// Roles listed on the faculty management screen.
pub const MANAGED_ROLES: [Role; 3] = [Role::FACULTY, Role::FACULTY_COORDINATOR, Role::HOD];

/// Years shown on the joins chart, ending at the current year.
pub const JOIN_CHART_YEARS: i32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    #[serde(rename = "dname")]
    pub name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RosterStats {
    pub total: usize,
    pub faculty: usize,
    pub coordinators: usize,
    pub hods: usize,
    pub departments: usize,
}

pub fn roster_stats(profiles: &[Profile]) -> RosterStats {
    let with_role = |role: &Role| profiles.iter().filter(|p| p.role().as_ref() == Some(role)).count();
    let departments: BTreeSet<&str> = profiles
        .iter()
        .filter_map(|p| p.department.as_deref())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .collect();

    RosterStats {
        total: profiles.len(),
        faculty: with_role(&Role::FACULTY),
        coordinators: with_role(&Role::FACULTY_COORDINATOR),
        hods: with_role(&Role::HOD),
        departments: departments.len(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub count: usize,
}

/// Profiles created per year for the last `span` years, oldest first.
pub fn joins_per_year(profiles: &[Profile], current_year: i32, span: i32) -> Vec<YearCount> {
    (current_year - span + 1..=current_year)
        .map(|year| YearCount {
            year,
            count: profiles
                .iter()
                .filter(|p| p.created_at.is_some_and(|t| t.year() == year))
                .count(),
        })
        .collect()
}

pub fn joined_in(profiles: &[Profile], year: i32) -> usize {
    profiles
        .iter()
        .filter(|p| p.created_at.is_some_and(|t| t.year() == year))
        .count()
}

/// Member count per department name. Unknown departments are grouped
/// under "Unassigned".
pub fn department_distribution(
    profiles: &[Profile],
    names: &HashMap<DepartmentId, String>,
) -> BTreeMap<String, usize> {
    let mut distribution = BTreeMap::new();
    for profile in profiles {
        let name = profile
            .department_id
            .and_then(|id| names.get(&id).cloned())
            .unwrap_or_else(|| "Unassigned".to_string());
        *distribution.entry(name).or_insert(0) += 1;
    }
    distribution
}

/// Add/edit form for a roster member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDraft {
    pub name: String,
    pub email: String,
    pub department: String,
    pub role: Role,
}

impl MemberDraft {
    pub fn new(name: impl Into<String>, email: impl Into<String>, department: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            department: department.into(),
            role: Role::FACULTY,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone().unwrap_or_default(),
            email: profile.email.clone().unwrap_or_default(),
            department: profile.department.clone().unwrap_or_default(),
            role: profile.role().unwrap_or(Role::FACULTY),
        }
    }

    pub fn validate(&self) -> DomainResult<MemberRecord> {
        let (name, email, department) = (self.name.trim(), self.email.trim(), self.department.trim());
        if name.is_empty() || email.is_empty() || department.is_empty() {
            return Err(DomainError::validation("All fields are required."));
        }
        if !is_valid_email(email) {
            return Err(DomainError::validation("Invalid email format"));
        }
        Ok(MemberRecord {
            name: name.to_string(),
            email: email.to_lowercase(),
            department: department.to_string(),
            role: self.role.clone(),
        })
    }
}

/// Columns written when adding or editing a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    pub name: String,
    pub email: String,
    pub department: String,
    pub role: Role,
}
