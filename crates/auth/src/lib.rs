//! `pubtrack-auth`: pure authorization boundary for the client.
//!
//! Sessions, roles, the route table, the route guard decision and the
//! navigation filter. No IO, no async: every decision here is a function of
//! its inputs, so callers can recompute it on any state change.

pub mod access;
pub mod guard;
pub mod location;
pub mod navigation;
pub mod recovery;
pub mod roles;
pub mod route;
pub mod session;

pub use access::{AccessContext, is_route_accessible, is_visible, role_satisfies};
pub use guard::{AuthorizationDecision, GuardConfig, GuardState, GuardVerdict, Redirect, RouteGuard};
pub use location::{Location, LocationError};
pub use navigation::{NavEntry, filter_navigation};
pub use recovery::{
    RecoveryLink, RecoveryLinkError, default_recovery_window, is_recovery_request, recovery_redirect_url,
    validate_recovery_link,
};
pub use roles::{Role, RoleState};
pub use route::{RouteDescriptor, RouteKind, RouteTable, View};
pub use session::{Session, SessionState, SessionValidationError, validate_session};
