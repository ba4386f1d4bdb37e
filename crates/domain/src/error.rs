/// Shared error type used across all ProcureFlow crates.
///
/// Every variant maps to a stable outward-facing code via [`Error::code`]
/// and a short, non-revealing default message via [`Error::user_message`].
/// Tool-level failures (timeouts, bad arguments, execution errors) are NOT
/// represented here — they are returned to the model as structured result
/// envelopes and never thrown.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("prompt injection rejected: {0}")]
    PromptInjectionRejected(String),

    #[error("content moderated: {0}")]
    ContentModerated(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited: provider '{provider}' admission queue is full")]
    RateLimited { provider: String },

    #[error("circuit open for provider '{provider}'")]
    CircuitOpen { provider: String },

    /// Transport-level provider failure. The optional HTTP status feeds
    /// the retry layer's transient/permanent classification.
    #[error("provider {provider}: HTTP {status:?} - {message}")]
    Http {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("token limit exceeded: {total_tokens} > {limit}")]
    TokenLimitExceeded { total_tokens: usize, limit: usize },

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("config: {0}")]
    Config(String),

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable outward-facing code for this error, suitable for API bodies
    /// and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) | Error::PersistenceFailed(_) => "persistence_failed",
            Error::Json(_) => "internal",
            Error::ValidationFailed(_) => "validation_failed",
            Error::PromptInjectionRejected(_) => "prompt_injection_rejected",
            Error::ContentModerated(_) => "content_moderated",
            Error::Unauthorized(_) => "unauthorized",
            Error::RateLimited { .. } => "rate_limited",
            Error::CircuitOpen { .. } => "circuit_open",
            Error::Http { .. } | Error::ProviderUnavailable(_) => "provider_unavailable",
            Error::Timeout(_) => "timeout",
            Error::TokenLimitExceeded { .. } => "token_limit_exceeded",
            Error::Config(_) => "config_invalid",
            Error::Internal(_) => "internal",
        }
    }

    /// Short, user-safe message. Never includes provider payloads, stack
    /// traces, or matched injection patterns.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::ValidationFailed(_) => "The request is invalid.",
            Error::PromptInjectionRejected(_) => {
                "Your message could not be processed. Please rephrase and try again."
            }
            Error::ContentModerated(_) => {
                "Your message was flagged by our content policy. Please rephrase."
            }
            Error::Unauthorized(_) => "You must be signed in to do that.",
            Error::RateLimited { .. } => "We're handling a lot of requests. Please retry shortly.",
            Error::CircuitOpen { .. } | Error::Http { .. } | Error::ProviderUnavailable(_) => {
                "The assistant is temporarily unavailable. Please try again soon."
            }
            Error::Timeout(_) => "The request took too long. Please try again.",
            Error::TokenLimitExceeded { .. } => {
                "The conversation is too long to process. Please start a new conversation."
            }
            Error::Io(_) | Error::PersistenceFailed(_) => {
                "We couldn't save your conversation. Please try again."
            }
            _ => "Something went wrong. Please try again.",
        }
    }

    /// Whether the retry layer may re-attempt the failed call.
    ///
    /// Transient: HTTP 429/500/502/503/504/529, connection-level failures
    /// (no status), and per-call timeouts. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Http { status, .. } => match status {
                Some(code) => matches!(code, 429 | 500 | 502 | 503 | 504 | 529),
                None => true,
            },
            _ => false,
        }
    }
}
