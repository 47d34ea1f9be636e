//! The single accessibility rule shared by the route guard and the menu.

use crate::roles::{Role, RoleState};
use crate::route::RouteDescriptor;
use crate::session::SessionState;

/// What the current visitor can prove about themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessContext<'a> {
    pub is_authenticated: bool,
    /// `None` both when the role is absent and while it is unsettled.
    pub role: Option<&'a Role>,
}

impl<'a> AccessContext<'a> {
    pub fn anonymous() -> Self {
        Self {
            is_authenticated: false,
            role: None,
        }
    }

    pub fn authenticated(role: Option<&'a Role>) -> Self {
        Self {
            is_authenticated: true,
            role,
        }
    }

    pub fn from_states(session: &SessionState, role: &'a RoleState) -> Self {
        if session.is_authenticated() {
            Self::authenticated(role.role())
        } else {
            Self::anonymous()
        }
    }
}

/// A route without a role requirement admits everyone; otherwise the
/// current role must match exactly.
pub fn role_satisfies(required: Option<&Role>, current: Option<&Role>) -> bool {
    match required {
        None => true,
        Some(required) => current == Some(required),
    }
}

/// Whether `route` may be rendered under `ctx`.
///
/// - Leaf: its own `requires_auth` and `required_role` must both hold.
/// - Group: accessible iff any child is accessible; the group's own
///   requirement fields are presentation only.
pub fn is_route_accessible(route: &RouteDescriptor, ctx: AccessContext<'_>) -> bool {
    if route.is_group() {
        return route.collapse.iter().any(|child| is_route_accessible(child, ctx));
    }

    let auth_ok = !route.requires_auth || ctx.is_authenticated;
    auth_ok && role_satisfies(route.required_role.as_ref(), ctx.role)
}

/// Menu visibility for an authenticated visitor holding `role`.
pub fn is_visible(route: &RouteDescriptor, role: Option<&Role>) -> bool {
    is_route_accessible(route, AccessContext::authenticated(role))
}
