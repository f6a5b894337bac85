//! ComfyUI run launcher.
//!
//! Starts one ComfyUI process per workflow run on its own port, waits for
//! it to answer HTTP, records the run in the database, and tears it down
//! on request, when its lifetime expires, or at shutdown.

pub mod api;
pub mod config;
pub mod events;
pub mod launcher;
pub mod manager;
pub mod ports;
pub mod runner;
