use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Authorization tier controlling which routes and menu entries are reachable.
///
/// Roles are opaque strings so new tiers can be added in the profile store
/// without a client release; the well-known ones are exposed as constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const FACULTY: Role = Role(Cow::Borrowed("faculty"));
    pub const FACULTY_COORDINATOR: Role = Role(Cow::Borrowed("faculty-coordinator"));
    pub const HOD: Role = Role(Cow::Borrowed("hod"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Interpret a raw `profiles.role` column value.
    ///
    /// Blank values mean "no role" and never map to a privileged tier.
    pub fn from_column(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self::new(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolution state of the current user's role.
///
/// `Loading` and `Absent` are deliberately distinct: the guard waits on the
/// former and denies role-gated routes on the latter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RoleState {
    /// No lookup has been attempted for the current session.
    #[default]
    Unknown,
    /// A lookup is in flight.
    Loading,
    /// The profile store returned a role.
    Resolved(Role),
    /// The profile exists without a role, or no profile exists.
    Absent,
    /// The last lookup failed transiently (network, timeout).
    Failed,
}

impl RoleState {
    /// The resolved role, if any.
    pub fn role(&self) -> Option<&Role> {
        match self {
            RoleState::Resolved(role) => Some(role),
            _ => None,
        }
    }

    /// True once a lookup produced an answer (a role or a definite absence).
    pub fn is_settled(&self) -> bool {
        matches!(self, RoleState::Resolved(_) | RoleState::Absent)
    }
}
