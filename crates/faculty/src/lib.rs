//! Faculty profiles and roster management.

pub mod profile;
pub mod roster;
pub mod service;

pub use profile::{
    MAX_BIO_CHARS, Profile, ProfileChanges, ProfileField, ProfileForm, ProfileValidationError,
    is_valid_email,
};
pub use roster::{
    Department, JOIN_CHART_YEARS, MANAGED_ROLES, MemberDraft, MemberRecord, RosterStats, YearCount,
    department_distribution, joined_in, joins_per_year, roster_stats,
};
pub use service::{CoordinatorDashboard, DEPARTMENTS_TABLE, FacultyService, PROFILES_TABLE, ProfileService};
