use serde::{Deserialize, Serialize};

use super::env_parse;

/// Which backend an entry in `llm.providers` talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Openai,
    Gemini,
}

/// Provider selection and per-provider tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Pin every turn to one provider id (`AI_PROVIDER`). Request-level
    /// overrides still win.
    #[serde(default)]
    pub forced_provider: Option<String>,
    /// Credential-presence fallback order.
    #[serde(default = "d_preference")]
    pub preference: Vec<String>,
    #[serde(default = "d_providers")]
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    /// Environment variable holding the API key. The key itself is never
    /// stored in config.
    pub api_key_env: String,
    pub default_model: String,
    /// Requests per minute admitted to this provider.
    #[serde(default = "d_rpm_limit")]
    pub rpm_limit: u32,
    /// Retries after the first attempt.
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    /// Per-invocation deadline in milliseconds.
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    /// Callers allowed to wait for rate-limit admission before new work is
    /// rejected outright.
    #[serde(default = "d_max_queue")]
    pub max_queue: usize,
    #[serde(default)]
    pub breaker: BreakerConfig,
}

/// Rolling error-ratio circuit breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Open when the error ratio over the window reaches this percentage.
    #[serde(default = "d_error_threshold_pct")]
    pub error_threshold_pct: u8,
    /// How long the breaker stays open before allowing a probe.
    #[serde(default = "d_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
    /// Length of the rolling sample window.
    #[serde(default = "d_window_secs")]
    pub window_secs: u64,
    /// Samples required in the window before the ratio is meaningful.
    #[serde(default = "d_min_requests")]
    pub min_requests: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            forced_provider: None,
            preference: d_preference(),
            providers: d_providers(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            error_threshold_pct: d_error_threshold_pct(),
            reset_timeout_ms: d_reset_timeout_ms(),
            window_secs: d_window_secs(),
            min_requests: d_min_requests(),
        }
    }
}

impl LlmConfig {
    pub(super) fn apply_env_overrides(&mut self) {
        if let Ok(forced) = std::env::var("AI_PROVIDER") {
            if !forced.trim().is_empty() {
                self.forced_provider = Some(forced.trim().to_ascii_lowercase());
            }
        }
        for provider in &mut self.providers {
            let prefix = provider.id.to_ascii_uppercase();
            if let Some(v) = env_parse(&format!("{prefix}_RPM_LIMIT")) {
                provider.rpm_limit = v;
            }
            if let Some(v) = env_parse(&format!("{prefix}_MAX_RETRIES")) {
                provider.max_retries = v;
            }
            if let Some(v) = env_parse(&format!("{prefix}_TIMEOUT_MS")) {
                provider.timeout_ms = v;
            }
            if let Some(v) = env_parse("CIRCUIT_BREAKER_ERROR_THRESHOLD") {
                provider.breaker.error_threshold_pct = v;
            }
            if let Some(v) = env_parse("CIRCUIT_BREAKER_RESET_TIMEOUT_MS") {
                provider.breaker.reset_timeout_ms = v;
            }
        }
    }

    /// Find a provider entry by id.
    pub fn provider(&self, id: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }
}

fn d_preference() -> Vec<String> {
    vec!["openai".into(), "gemini".into()]
}

fn d_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            id: "openai".into(),
            kind: ProviderKind::Openai,
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            default_model: "gpt-4o-mini".into(),
            rpm_limit: 60,
            max_retries: 3,
            timeout_ms: d_timeout_ms(),
            max_queue: d_max_queue(),
            breaker: BreakerConfig::default(),
        },
        ProviderConfig {
            id: "gemini".into(),
            kind: ProviderKind::Gemini,
            base_url: "https://generativelanguage.googleapis.com".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            default_model: "gemini-2.0-flash".into(),
            rpm_limit: 15,
            max_retries: 4,
            timeout_ms: d_timeout_ms(),
            max_queue: d_max_queue(),
            breaker: BreakerConfig::default(),
        },
    ]
}

fn d_rpm_limit() -> u32 {
    60
}
fn d_max_retries() -> u32 {
    3
}
fn d_timeout_ms() -> u64 {
    30_000
}
fn d_max_queue() -> usize {
    32
}
fn d_error_threshold_pct() -> u8 {
    50
}
fn d_reset_timeout_ms() -> u64 {
    30_000
}
fn d_window_secs() -> u64 {
    60
}
fn d_min_requests() -> usize {
    5
}
