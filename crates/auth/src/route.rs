//! Static route table.
//!
//! Descriptors double as menu configuration: a descriptor with `collapse`
//! children is a collapsible menu group, the rest are leaves.

use serde::{Deserialize, Serialize};

use crate::location::normalize_path;
use crate::roles::Role;

/// The view a route renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    SignIn,
    ResetPassword,
    UpdatePassword,
    Dashboard,
    Notifications,
    Profile,
    CoordinatorDashboard,
    ManageFaculty,
    HodDashboard,
}

/// How a descriptor is presented in the navigation menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    Collapse,
    Title,
    Divider,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDescriptor {
    #[serde(rename = "type")]
    pub kind: RouteKind,
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default, rename = "component")]
    pub view: Option<View>,
    #[serde(default)]
    pub requires_auth: bool,
    /// Only reachable without a session (e.g. sign-in).
    #[serde(default)]
    pub public_only: bool,
    /// Accepts `type=recovery&ts=..` links without a session.
    #[serde(default)]
    pub recovery_flow: bool,
    #[serde(default)]
    pub required_role: Option<Role>,
    /// Where a group's own path forwards to.
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub collapse: Vec<RouteDescriptor>,
}

impl RouteDescriptor {
    fn base(kind: RouteKind, key: &str, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            key: key.to_string(),
            icon: None,
            route: None,
            view: None,
            requires_auth: false,
            public_only: false,
            recovery_flow: false,
            required_role: None,
            redirect: None,
            collapse: Vec::new(),
        }
    }

    pub fn collapse(key: &str, name: &str) -> Self {
        Self::base(RouteKind::Collapse, key, name)
    }

    pub fn title(key: &str, name: &str) -> Self {
        Self::base(RouteKind::Title, key, name)
    }

    pub fn divider(key: &str) -> Self {
        Self::base(RouteKind::Divider, key, "")
    }

    pub fn at(mut self, path: &str) -> Self {
        self.route = Some(path.to_string());
        self
    }

    pub fn view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }

    pub fn icon(mut self, icon: &str) -> Self {
        self.icon = Some(icon.to_string());
        self
    }

    pub fn requires_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn public_only(mut self) -> Self {
        self.public_only = true;
        self
    }

    pub fn recovery_flow(mut self) -> Self {
        self.recovery_flow = true;
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.required_role = Some(role);
        self
    }

    pub fn redirect(mut self, path: &str) -> Self {
        self.redirect = Some(path.to_string());
        self
    }

    pub fn children(mut self, children: Vec<RouteDescriptor>) -> Self {
        self.collapse = children;
        self
    }

    pub fn is_group(&self) -> bool {
        !self.collapse.is_empty()
    }

    /// Whether deciding access to this descriptor requires a resolved role.
    pub fn needs_role(&self) -> bool {
        if self.is_group() {
            self.collapse.iter().any(RouteDescriptor::needs_role)
        } else {
            self.required_role.is_some()
        }
    }

    fn matches(&self, path: &str) -> bool {
        self.route
            .as_deref()
            .is_some_and(|route| normalize_path(route) == path)
    }
}

/// The application's static route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteTable {
    entries: Vec<RouteDescriptor>,
}

impl RouteTable {
    pub fn new(entries: Vec<RouteDescriptor>) -> Self {
        Self { entries }
    }

    /// Load a table from its JSON form (the same schema the menu uses).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn entries(&self) -> &[RouteDescriptor] {
        &self.entries
    }

    /// Find the descriptor owning `path`, groups included (depth-first).
    pub fn find(&self, path: &str) -> Option<&RouteDescriptor> {
        let path = normalize_path(path);
        find_in(&self.entries, &path)
    }

    /// The publication tracker's routes.
    pub fn standard() -> Self {
        Self::new(vec![
            RouteDescriptor::collapse("faculty-coordinator", "Faculty Coordinator")
                .icon("supervisor_account")
                .at("/faculty-coordinator")
                .redirect("/faculty-coordinator/dashboard")
                .requires_auth()
                .role(Role::FACULTY_COORDINATOR)
                .children(vec![
                    RouteDescriptor::collapse("coordinator-dashboard", "Coordinator Dashboard")
                        .icon("widgets")
                        .at("/faculty-coordinator/dashboard")
                        .view(View::CoordinatorDashboard)
                        .requires_auth()
                        .role(Role::FACULTY_COORDINATOR),
                    RouteDescriptor::collapse("coordinator-manage-faculty", "Manage Faculty")
                        .icon("manage_accounts")
                        .at("/faculty-coordinator/manage-faculty")
                        .view(View::ManageFaculty)
                        .requires_auth()
                        .role(Role::FACULTY_COORDINATOR),
                ]),
            RouteDescriptor::collapse("hod", "HOD")
                .icon("supervisor_account")
                .at("/hod")
                .redirect("/hod/dashboard")
                .requires_auth()
                .role(Role::HOD)
                .children(vec![
                    RouteDescriptor::collapse("hod-dashboard", "HOD Dashboard")
                        .icon("widgets")
                        .at("/hod/dashboard")
                        .view(View::HodDashboard)
                        .requires_auth()
                        .role(Role::HOD),
                    RouteDescriptor::collapse("hod-manage-faculty", "Manage Faculty")
                        .icon("manage_accounts")
                        .at("/hod/manage-faculty")
                        .view(View::ManageFaculty)
                        .requires_auth()
                        .role(Role::HOD),
                ]),
            RouteDescriptor::collapse("dashboard", "Dashboard")
                .icon("dashboard")
                .at("/dashboard")
                .view(View::Dashboard)
                .requires_auth(),
            RouteDescriptor::collapse("notifications", "Notifications")
                .icon("notifications")
                .at("/notifications")
                .view(View::Notifications)
                .requires_auth(),
            RouteDescriptor::collapse("profile", "Profile")
                .icon("person")
                .at("/profile")
                .view(View::Profile)
                .requires_auth(),
            RouteDescriptor::collapse("update-password", "Change Password")
                .icon("lock")
                .at("/update-password")
                .view(View::UpdatePassword)
                .requires_auth(),
            RouteDescriptor::title("sign-in", "Sign In")
                .icon("login")
                .at("/login")
                .view(View::SignIn)
                .public_only(),
            RouteDescriptor::title("reset-password", "Reset Password")
                .icon("password")
                .at("/reset-password")
                .view(View::ResetPassword)
                .recovery_flow(),
        ])
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn find_in<'a>(entries: &'a [RouteDescriptor], path: &str) -> Option<&'a RouteDescriptor> {
    for entry in entries {
        if entry.matches(path) {
            return Some(entry);
        }
        if let Some(found) = find_in(&entry.collapse, path) {
            return Some(found);
        }
    }
    None
}
