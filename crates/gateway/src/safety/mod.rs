//! Input safety and log hygiene owned by the orchestrator: sanitation,
//! prompt-injection heuristics, content moderation, and redaction.

pub mod injection;
pub mod moderation;
pub mod redact;
pub mod sanitize;
