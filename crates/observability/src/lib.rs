//! Process-wide tracing setup.

pub mod tracing;

pub use crate::tracing::{LogConfig, init, init_with};
