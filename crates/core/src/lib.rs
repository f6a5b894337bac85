//! Shared domain types for the workflow launcher.
//!
//! Pure data and validation only: no I/O, no database, no HTTP. Both the
//! server crates and the dashboard client depend on this crate so the wire
//! shapes stay in one place.

pub mod error;
pub mod launch;
pub mod run;
pub mod types;
pub mod workflow;
