//! Shared domain types for the ProcureFlow agent core.
//!
//! Everything the other crates agree on lives here: the error taxonomy,
//! configuration, the provider-agnostic chat message model, procurement
//! wire types and service seams, token counting, metrics, and structured
//! trace events.

pub mod chat;
pub mod config;
pub mod error;
pub mod metrics;
pub mod procurement;
pub mod tokens;
pub mod trace;
pub mod usage;

pub use error::{Error, Result};
