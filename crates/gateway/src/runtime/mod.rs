//! Turn runtime: the bounded orchestration loop and its supporting
//! pieces (metadata accumulation, per-conversation locking,
//! cancellation).

pub mod accumulator;
pub mod cancel;
pub mod conversation_lock;
pub mod prompt;
pub mod turn;

pub use cancel::{CancelMap, CancelToken};
pub use turn::{run_turn, TurnInput, TurnResult};
