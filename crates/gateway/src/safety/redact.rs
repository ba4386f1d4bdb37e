//! Log redaction.
//!
//! Strips personally identifying values from content before it reaches
//! structured logs, and blanks configured sensitive keys in metadata
//! objects. Applied at emission time only — stored conversation content
//! is never rewritten.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex")
    })
}

fn ssn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn regex"))
}

fn card_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 13–16 digit runs with optional space/dash separators.
    RE.get_or_init(|| Regex::new(r"\b(?:\d[ -]?){12,15}\d\b").expect("card regex"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:\+?1[ .-]?)?\(?\d{3}\)?[ .-]?\d{3}[ .-]?\d{4}\b").expect("phone regex")
    })
}

fn ipv4_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("ipv4 regex"))
}

/// Redact emails, SSNs, card-shaped digit runs, phone numbers, and IPv4
/// addresses from free text.
pub fn redact_text(text: &str) -> String {
    let out = email_re().replace_all(text, "[redacted-email]");
    let out = ssn_re().replace_all(&out, "[redacted-ssn]");
    let out = card_re().replace_all(&out, "[redacted-number]");
    let out = phone_re().replace_all(&out, "[redacted-phone]");
    let out = ipv4_re().replace_all(&out, "[redacted-ip]");
    out.into_owned()
}

/// Blank the values of configured sensitive keys (case-insensitive),
/// recursively, in a metadata object.
pub fn redact_keys(value: &mut Value, keys: &[String]) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                let lowered = key.to_ascii_lowercase();
                if keys.iter().any(|k| lowered.contains(k.as_str())) {
                    *entry = Value::String("[redacted]".into());
                } else {
                    redact_keys(entry, keys);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_keys(item, keys);
            }
        }
        _ => {}
    }
}
