//! Event plumbing for the client: a push-style callback registry and the
//! normalization of provider auth notifications.

pub mod auth_change;
pub mod listener;

pub use auth_change::{AuthChange, AuthChangeKind, AuthTransition, normalize};
pub use listener::{ListenerHandle, Listeners};
