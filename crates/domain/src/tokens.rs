//! Model-aware token counting.
//!
//! Counts are advisory: the model's own billing is authoritative, but the
//! history builder needs a stable, deterministic estimate. Known model
//! families use real BPE tokenization via `tiktoken-rs`; unknown models
//! fall back to a conservative chars/4 estimator and are flagged so usage
//! reports can carry `estimated = true`.

use std::sync::OnceLock;

use tiktoken_rs::{cl100k_base, o200k_base, CoreBPE};

/// Fixed per-message overhead added on top of the content tokens
/// (role tag + message framing).
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    O200k,
    Cl100k,
    /// chars/4, rounded up.
    Approx,
}

/// Map a model name to its encoding.
///
/// The table is prefix-based: `gpt-4o`, `gpt-4.1`, and the o-series reason
/// models use o200k_base; older GPT-4/3.5 use cl100k_base. Gemini and
/// anything unrecognized use the conservative estimator.
fn encoding_for(model: &str) -> Encoding {
    let m = model.to_ascii_lowercase();
    if m.starts_with("gpt-4o")
        || m.starts_with("gpt-4.1")
        || m.starts_with("o1")
        || m.starts_with("o3")
        || m.starts_with("o4")
        || m.starts_with("chatgpt")
    {
        Encoding::O200k
    } else if m.starts_with("gpt-4") || m.starts_with("gpt-3.5") {
        Encoding::Cl100k
    } else {
        Encoding::Approx
    }
}

fn o200k() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| o200k_base().expect("failed to load o200k_base tokenizer"))
}

fn cl100k() -> &'static CoreBPE {
    static BPE: OnceLock<CoreBPE> = OnceLock::new();
    BPE.get_or_init(|| cl100k_base().expect("failed to load cl100k_base tokenizer"))
}

/// Count tokens in `text` for the given model.
pub fn count(model: &str, text: &str) -> usize {
    match encoding_for(model) {
        Encoding::O200k => o200k().encode_with_special_tokens(text).len(),
        Encoding::Cl100k => cl100k().encode_with_special_tokens(text).len(),
        Encoding::Approx => approx_count(text),
    }
}

/// Count tokens for one message including the per-message overhead.
pub fn count_message(model: &str, content: &str) -> usize {
    count(model, content) + MESSAGE_OVERHEAD_TOKENS
}

/// Whether the model resolves to a real BPE encoding (false = estimated).
pub fn is_exact(model: &str) -> bool {
    encoding_for(model) != Encoding::Approx
}

/// Conservative fallback: one token per 4 characters, rounded up, never
/// zero for non-empty text.
fn approx_count(text: &str) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_resolve_exact() {
        assert!(is_exact("gpt-4o-mini"));
        assert!(is_exact("gpt-4.1"));
        assert!(is_exact("gpt-3.5-turbo"));
        assert!(!is_exact("gemini-2.0-flash"));
        assert!(!is_exact("some-future-model"));
    }

    #[test]
    fn counting_is_idempotent() {
        let text = "Add a wireless mouse to my cart, please.";
        assert_eq!(count("gpt-4o", text), count("gpt-4o", text));
        assert_eq!(count("gemini-2.0-flash", text), count("gemini-2.0-flash", text));
    }

    #[test]
    fn empty_text_counts_zero() {
        assert_eq!(count("gpt-4o", ""), 0);
        assert_eq!(count("gemini-2.0-flash", ""), 0);
    }

    #[test]
    fn approx_rounds_up() {
        assert_eq!(approx_count("abc"), 1);
        assert_eq!(approx_count("abcd"), 1);
        assert_eq!(approx_count("abcde"), 2);
    }

    // Sanity, not exactness: concatenation never counts much less than the
    // sum of the parts.
    #[test]
    fn concat_is_nearly_additive() {
        let a = "The quick brown fox jumps over the lazy dog. ";
        let b = "Procurement requests need manager approval over $500.";
        for model in ["gpt-4o", "gpt-4", "gemini-2.0-flash"] {
            let joined = count(model, &format!("{a}{b}"));
            let parts = count(model, a) + count(model, b);
            assert!(
                joined + 2 >= parts,
                "{model}: concat {joined} vs parts {parts}"
            );
        }
    }

    #[test]
    fn message_overhead_applied() {
        let text = "hello";
        assert_eq!(
            count_message("gpt-4o", text),
            count("gpt-4o", text) + MESSAGE_OVERHEAD_TOKENS
        );
    }
}
