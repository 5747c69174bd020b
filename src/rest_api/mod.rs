//! REST API module for health, metrics and diagnostics
//!
//! Provides an HTTP API for inspecting MachineHealthChecks and dry-running their
//! evaluation.

pub mod dto;
mod handlers;
mod server;

pub use server::{router, run_server};
