//! Faculty profiles and profile form validation.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pubtrack_auth::Role;
use pubtrack_core::{DepartmentId, SubjectId};

pub const MAX_BIO_CHARS: usize = 500;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex"));
static HTTP_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://.+").expect("static regex"));
static ORCID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{4}-\d{4}-\d{3}[\dX]$").expect("static regex"));

pub fn is_valid_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

/// A row of the `profiles` table. `id` equals the auth subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: SubjectId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub department_id: Option<DepartmentId>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_coordinator: bool,
    #[serde(default)]
    pub orcid_id: Option<String>,
    #[serde(default)]
    pub google_scholar_url: Option<String>,
    #[serde(default)]
    pub scopus_url: Option<String>,
    #[serde(default)]
    pub researchgate_url: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Stand-in shown before the user has saved a profile.
    pub fn fallback(id: SubjectId, email: Option<String>) -> Self {
        Self {
            id,
            name: None,
            email,
            institution: None,
            department: None,
            department_id: None,
            role: None,
            is_coordinator: false,
            orcid_id: None,
            google_scholar_url: None,
            scopus_url: None,
            researchgate_url: None,
            linkedin_url: None,
            bio: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.role.as_deref().and_then(Role::from_column)
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Name,
    Email,
    OrcidId,
    GoogleScholarUrl,
    ScopusUrl,
    ResearchgateUrl,
    LinkedinUrl,
    Bio,
}

/// Every invalid field with its message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("profile has {} invalid field(s)", .errors.len())]
pub struct ProfileValidationError {
    pub errors: BTreeMap<ProfileField, String>,
}

impl ProfileValidationError {
    pub fn message(&self, field: ProfileField) -> Option<&str> {
        self.errors.get(&field).map(String::as_str)
    }
}

/// Raw profile form input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileForm {
    pub name: String,
    pub email: String,
    pub institution: String,
    pub department: String,
    pub orcid_id: String,
    pub google_scholar_url: String,
    pub scopus_url: String,
    pub researchgate_url: String,
    pub linkedin_url: String,
    pub bio: String,
}

impl ProfileForm {
    pub fn from_profile(profile: &Profile) -> Self {
        let text = |v: &Option<String>| v.clone().unwrap_or_default();
        Self {
            name: text(&profile.name),
            email: text(&profile.email),
            institution: text(&profile.institution),
            department: text(&profile.department),
            orcid_id: text(&profile.orcid_id),
            google_scholar_url: text(&profile.google_scholar_url),
            scopus_url: text(&profile.scopus_url),
            researchgate_url: text(&profile.researchgate_url),
            linkedin_url: text(&profile.linkedin_url),
            bio: text(&profile.bio),
        }
    }

    /// Validate all fields at once, reporting every problem.
    pub fn validate(&self) -> Result<ProfileChanges, ProfileValidationError> {
        let mut errors = BTreeMap::new();

        if self.name.trim().is_empty() {
            errors.insert(ProfileField::Name, "Name is required".to_string());
        }
        if self.email.trim().is_empty() {
            errors.insert(ProfileField::Email, "Email is required".to_string());
        } else if !is_valid_email(&self.email) {
            errors.insert(ProfileField::Email, "Invalid email format".to_string());
        }

        let links = [
            (ProfileField::GoogleScholarUrl, &self.google_scholar_url, "Invalid Google Scholar URL"),
            (ProfileField::ScopusUrl, &self.scopus_url, "Invalid Scopus URL"),
            (ProfileField::ResearchgateUrl, &self.researchgate_url, "Invalid ResearchGate URL"),
            (ProfileField::LinkedinUrl, &self.linkedin_url, "Invalid LinkedIn URL"),
        ];
        for (field, value, message) in links {
            if !value.is_empty() && !HTTP_URL.is_match(value) {
                errors.insert(field, message.to_string());
            }
        }

        if !self.orcid_id.is_empty() && !ORCID.is_match(&self.orcid_id) {
            errors.insert(
                ProfileField::OrcidId,
                "Invalid ORCID ID format (e.g., 0000-0001-2345-678X)".to_string(),
            );
        }
        if self.bio.chars().count() > MAX_BIO_CHARS {
            errors.insert(ProfileField::Bio, "Bio cannot exceed 500 characters".to_string());
        }

        if !errors.is_empty() {
            return Err(ProfileValidationError { errors });
        }

        let opt = |v: &str| {
            let t = v.trim();
            (!t.is_empty()).then(|| t.to_string())
        };
        Ok(ProfileChanges {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            institution: opt(&self.institution),
            department: opt(&self.department),
            orcid_id: opt(&self.orcid_id),
            google_scholar_url: opt(&self.google_scholar_url),
            scopus_url: opt(&self.scopus_url),
            researchgate_url: opt(&self.researchgate_url),
            linkedin_url: opt(&self.linkedin_url),
            bio: opt(&self.bio),
        })
    }
}

/// Validated profile fields, ready to upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileChanges {
    pub name: String,
    pub email: String,
    pub institution: Option<String>,
    pub department: Option<String>,
    pub orcid_id: Option<String>,
    pub google_scholar_url: Option<String>,
    pub scopus_url: Option<String>,
    pub researchgate_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub bio: Option<String>,
}
