//! `pubtrack-core`: shared primitives for the publication tracker.
//!
//! Identifiers, the domain error model and an injectable clock. No IO.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{DepartmentId, PublicationId, SubjectId};
