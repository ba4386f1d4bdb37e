//! The tool layer: declarative schemas for the procurement tools, argument
//! validation, and the executor that validates, authorizes, dispatches,
//! times out, and envelopes every call.

pub mod executor;
pub mod memory;
pub mod schema;
pub mod validate;

pub use executor::{ExecuteResult, ExecuteToolRequest, ToolExecutor};
pub use memory::{MemoryCartService, MemoryCatalog, MemoryCheckoutService};
pub use schema::{definitions, spec_for, ToolSpec};
