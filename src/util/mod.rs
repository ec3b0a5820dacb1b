//! Shared types used throughout the tracer:
//! - [`Error`] / [`Result`] - fatal errors
//! - [`Warning`] - non-fatal conditions surfaced to the caller

mod error;

pub use error::*;
