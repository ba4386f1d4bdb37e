use serde::{Deserialize, Serialize};

/// Input safety and log hygiene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Call the provider moderation endpoint before each turn.
    #[serde(default)]
    pub moderation_enabled: bool,
    /// Structured-log keys whose values are always redacted.
    #[serde(default = "d_redact_keys")]
    pub redact_keys: Vec<String>,
    /// Maximum user message length in characters (after trim).
    #[serde(default = "d_max_message_chars")]
    pub max_message_chars: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            moderation_enabled: false,
            redact_keys: d_redact_keys(),
            max_message_chars: d_max_message_chars(),
        }
    }
}

impl SafetyConfig {
    pub(super) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MODERATION_ENABLED") {
            self.moderation_enabled = matches!(v.as_str(), "1" | "true" | "yes");
        }
        if let Ok(v) = std::env::var("LOG_REDACT_KEYS") {
            let keys: Vec<String> = v
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !keys.is_empty() {
                self.redact_keys = keys;
            }
        }
    }
}

fn d_redact_keys() -> Vec<String> {
    ["password", "token", "authorization", "cookie", "secret"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn d_max_message_chars() -> usize {
    5000
}
