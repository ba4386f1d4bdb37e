//! LLM provider adapters and the reliability stack around them.
//!
//! Every backend is normalized behind [`ChatProvider`]; the registry picks
//! one per request and wraps it in [`reliability::ReliableProvider`], which
//! composes rate limiting, retry with backoff, a circuit breaker, and a
//! per-call timeout in that order.

pub mod gemini;
pub mod openai;
pub mod registry;
pub mod reliability;
pub mod traits;
pub mod usage;

pub use registry::{ProviderRegistry, ProviderInitError};
pub use reliability::{CircuitBreaker, CircuitState, RateLimiter, ReliableProvider, RetryPolicy};
pub use traits::{ChatProvider, ChatRequest, ChatResponse, ProviderCapabilities, ProviderInfo};
