//! Navigation filter: the menu tree visible to the current visitor.

use serde::Serialize;

use crate::access::{AccessContext, is_route_accessible};
use crate::route::{RouteDescriptor, RouteKind};

/// A rendered menu entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavEntry {
    pub key: String,
    pub name: String,
    pub kind: RouteKind,
    pub icon: Option<String>,
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NavEntry>,
}

impl NavEntry {
    /// Highlight state: a group is active when one of its children is.
    pub fn is_active(&self, path: &str) -> bool {
        if self.children.is_empty() {
            self.route.as_deref() == Some(path)
        } else {
            self.children.iter().any(|child| child.is_active(path))
        }
    }
}

/// Filter `entries` down to what `ctx` may see.
///
/// Groups keep only their visible children and vanish entirely when none
/// remain. An unsettled role is passed as `ctx.role == None`, which hides
/// every role-gated entry until the role resolves.
pub fn filter_navigation(entries: &[RouteDescriptor], ctx: AccessContext<'_>) -> Vec<NavEntry> {
    entries.iter().filter_map(|entry| filter_entry(entry, ctx)).collect()
}

fn filter_entry(entry: &RouteDescriptor, ctx: AccessContext<'_>) -> Option<NavEntry> {
    if entry.is_group() {
        let children = filter_navigation(&entry.collapse, ctx);
        if children.is_empty() {
            return None;
        }
        return Some(to_nav(entry, children));
    }

    is_route_accessible(entry, ctx).then(|| to_nav(entry, Vec::new()))
}

fn to_nav(entry: &RouteDescriptor, children: Vec<NavEntry>) -> NavEntry {
    NavEntry {
        key: entry.key.clone(),
        name: entry.name.clone(),
        kind: entry.kind,
        icon: entry.icon.clone(),
        route: entry.route.clone(),
        children,
    }
}
