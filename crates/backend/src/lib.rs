//! Contracts for the hosted backend the client talks to (identity, rows,
//! objects) plus two implementations: an in-memory one for tests and local
//! development and a REST one over `reqwest`.

pub mod error;
pub mod memory;
pub mod provider;
pub mod rest;
pub mod storage;
pub mod store;

pub use error::{BackendError, BackendResult};
pub use memory::{InMemoryBackend, ResetRequest, StoredObject};
pub use provider::{AuthChangeCallback, AuthProvider, UserUpdate};
pub use rest::RestBackend;
pub use storage::{ObjectStorage, object_path_from_public_url};
pub use store::{DataStore, Filter, Query, Row, decode_row, decode_rows, encode_row};
