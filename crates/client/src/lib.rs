//! `pubtrack-client`: the client runtime.
//!
//! Owns the live auth state (session store, role resolver, auth event bus),
//! exposes it to views through [`AuthContext`], and drives navigation
//! through the pure route guard in `pubtrack-auth`.

pub mod account;
pub mod app;
pub mod auth_bus;
pub mod auth_context;
pub mod config;
pub mod role_resolver;
pub mod session_store;

pub use account::{AccountService, FormError, MIN_PASSWORD_LEN, RESET_LINK_FAILED, RESET_LINK_SENT};
pub use app::{App, AppError, Backend, MAX_REDIRECTS, Screen};
pub use auth_bus::AuthEventBus;
pub use auth_context::{AuthContext, AuthSnapshot, ProtectedRoute};
pub use config::ClientConfig;
pub use role_resolver::{RoleLookup, RoleLookupError, RoleResolver};
pub use session_store::SessionStore;
