//! Workflow dashboard: lists installed workflows as cards and launches them.
//!
//! [`client::WorkflowsClient`] talks to the workflow API, [`view::Dashboard`]
//! owns the per-card state, and [`render`] turns that state into text or
//! HTML.

pub mod client;
pub mod memo;
pub mod render;
pub mod view;
