//! Provider registry and selection.
//!
//! Constructs every configured provider whose credentials resolve, wraps
//! each in the reliability stack, and picks one per request. Selection
//! precedence: explicit request override → configured/env pin →
//! credential presence in preference order. When nothing is available the
//! error names the credential variables an operator must set.

use std::collections::HashMap;
use std::sync::Arc;

use pf_domain::config::{LlmConfig, ProviderKind};
use pf_domain::error::{Error, Result};
use pf_domain::metrics::Metrics;
use pf_domain::usage::UsageSink;

use crate::gemini::GeminiProvider;
use crate::openai::OpenAiProvider;
use crate::reliability::{CircuitBreaker, CircuitState, ReliableProvider};
use crate::traits::{ChatProvider, ProviderInfo};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ChatProvider>>,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    preference: Vec<String>,
    forced: Option<String>,
    /// `(provider id, credential env var)` for every configured provider,
    /// used to build actionable "no provider" errors.
    required_credentials: Vec<(String, String)>,
    init_errors: Vec<ProviderInitError>,
}

/// Records a provider that failed to initialize.
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    pub kind: String,
    /// Error message with any potential secrets masked.
    pub error: String,
}

impl ProviderRegistry {
    /// Build the registry from config. Providers whose credentials are
    /// missing are recorded and skipped rather than aborting startup.
    pub fn from_config(
        config: &LlmConfig,
        metrics: Arc<Metrics>,
        usage_sink: Arc<dyn UsageSink>,
    ) -> Self {
        let mut providers: HashMap<String, Arc<dyn ChatProvider>> = HashMap::new();
        let mut breakers = HashMap::new();
        let mut init_errors = Vec::new();
        let mut required_credentials = Vec::new();

        for pc in &config.providers {
            required_credentials.push((pc.id.clone(), pc.api_key_env.clone()));

            let adapter: Result<Arc<dyn ChatProvider>> = match pc.kind {
                ProviderKind::Openai => {
                    OpenAiProvider::from_config(pc).map(|p| Arc::new(p) as Arc<dyn ChatProvider>)
                }
                ProviderKind::Gemini => {
                    GeminiProvider::from_config(pc).map(|p| Arc::new(p) as Arc<dyn ChatProvider>)
                }
            };

            match adapter {
                Ok(inner) => {
                    let reliable =
                        ReliableProvider::new(inner, pc, metrics.clone(), usage_sink.clone());
                    breakers.insert(pc.id.clone(), reliable.breaker());
                    providers.insert(pc.id.clone(), Arc::new(reliable));
                    tracing::info!(provider_id = %pc.id, kind = ?pc.kind, "registered LLM provider");
                }
                Err(e) => {
                    let safe_error = mask_secrets(&e.to_string());
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = ?pc.kind,
                        error = %safe_error,
                        "failed to initialize LLM provider, skipping"
                    );
                    init_errors.push(ProviderInitError {
                        provider_id: pc.id.clone(),
                        kind: format!("{:?}", pc.kind),
                        error: safe_error,
                    });
                }
            }
        }

        Self {
            providers,
            breakers,
            preference: config.preference.clone(),
            forced: config.forced_provider.clone(),
            required_credentials,
            init_errors,
        }
    }

    /// Build from already-constructed providers (useful for testing).
    pub fn with_providers(
        providers: Vec<Arc<dyn ChatProvider>>,
        forced: Option<String>,
    ) -> Self {
        let preference: Vec<String> = providers
            .iter()
            .map(|p| p.provider_id().to_string())
            .collect();
        let map = providers
            .into_iter()
            .map(|p| (p.provider_id().to_string(), p))
            .collect();
        Self {
            providers: map,
            breakers: HashMap::new(),
            preference,
            forced,
            required_credentials: Vec::new(),
            init_errors: Vec::new(),
        }
    }

    // ── Selection ─────────────────────────────────────────────────

    /// Pick the provider for one request.
    ///
    /// Precedence: the request's explicit override, then the configured
    /// pin (`AI_PROVIDER`), then the first preference-order provider whose
    /// credentials resolved at startup.
    pub fn select(&self, override_id: Option<&str>) -> Result<Arc<dyn ChatProvider>> {
        if let Some(id) = override_id {
            return self.providers.get(id).cloned().ok_or_else(|| {
                Error::ProviderUnavailable(format!(
                    "requested provider '{id}' is not configured{}",
                    self.credential_hint(Some(id))
                ))
            });
        }

        if let Some(forced) = &self.forced {
            return self.providers.get(forced).cloned().ok_or_else(|| {
                Error::ProviderUnavailable(format!(
                    "pinned provider '{forced}' is not configured{}",
                    self.credential_hint(Some(forced))
                ))
            });
        }

        for id in &self.preference {
            if let Some(provider) = self.providers.get(id) {
                return Ok(provider.clone());
            }
        }

        // Any provider outside the preference list, in stable order.
        let mut remaining: Vec<_> = self.providers.keys().collect();
        remaining.sort();
        if let Some(id) = remaining.first() {
            return Ok(self.providers[*id].clone());
        }

        Err(Error::ProviderUnavailable(format!(
            "no LLM provider configured{}",
            self.credential_hint(None)
        )))
    }

    fn credential_hint(&self, id: Option<&str>) -> String {
        let vars: Vec<&str> = self
            .required_credentials
            .iter()
            .filter(|(pid, _)| id.is_none_or(|wanted| pid == wanted))
            .map(|(_, env)| env.as_str())
            .collect();
        if vars.is_empty() {
            String::new()
        } else {
            format!("; set {}", vars.join(" or "))
        }
    }

    // ── Introspection ─────────────────────────────────────────────

    pub fn provider_infos(&self) -> Vec<ProviderInfo> {
        let mut ids: Vec<_> = self.providers.keys().cloned().collect();
        ids.sort();
        ids.iter().map(|id| self.providers[id].info()).collect()
    }

    pub fn breaker(&self, provider_id: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(provider_id).cloned()
    }

    /// Breaker state per provider, for health reporting.
    pub fn breaker_states(&self) -> HashMap<String, CircuitState> {
        self.breakers
            .iter()
            .map(|(id, b)| (id.clone(), b.state()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider initialization errors (empty if all succeeded).
    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}

/// Mask substrings that look like API keys or bearer tokens in an error
/// message so raw secrets never reach logs or health endpoints.
fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..]);
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ChatRequest, ChatResponse, ProviderCapabilities};

    struct NamedProvider(&'static str);

    #[async_trait::async_trait]
    impl ChatProvider for NamedProvider {
        async fn invoke_chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: self.0.into(),
                tool_calls: Vec::new(),
                usage: None,
                provider: self.0.into(),
                model: "m".into(),
            })
        }
        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                provider: self.0.into(),
                model: "m".into(),
                capabilities: ProviderCapabilities {
                    supports_tools: true,
                    supports_parallel_tool_calls: true,
                    context_window_tokens: None,
                    max_output_tokens: None,
                },
            }
        }
        fn provider_id(&self) -> &str {
            self.0
        }
    }

    fn registry(forced: Option<&str>) -> ProviderRegistry {
        ProviderRegistry::with_providers(
            vec![Arc::new(NamedProvider("openai")), Arc::new(NamedProvider("gemini"))],
            forced.map(String::from),
        )
    }

    #[test]
    fn explicit_override_wins() {
        let r = registry(Some("openai"));
        let p = r.select(Some("gemini")).unwrap();
        assert_eq!(p.provider_id(), "gemini");
    }

    #[test]
    fn forced_pin_beats_preference() {
        let r = registry(Some("gemini"));
        let p = r.select(None).unwrap();
        assert_eq!(p.provider_id(), "gemini");
    }

    #[test]
    fn preference_order_used_by_default() {
        let r = registry(None);
        let p = r.select(None).unwrap();
        assert_eq!(p.provider_id(), "openai");
    }

    #[test]
    fn unknown_override_is_unavailable() {
        let r = registry(None);
        let err = r.select(Some("claude")).unwrap_err();
        assert_eq!(err.code(), "provider_unavailable");
    }

    #[test]
    fn empty_registry_names_required_credentials() {
        let metrics = Arc::new(Metrics::new());
        let mut config = LlmConfig::default();
        // Point both providers at env vars that are certainly unset.
        config.providers[0].api_key_env = "PF_TEST_MISSING_OPENAI_KEY".into();
        config.providers[1].api_key_env = "PF_TEST_MISSING_GEMINI_KEY".into();
        let r = ProviderRegistry::from_config(
            &config,
            metrics,
            Arc::new(pf_domain::usage::NullUsageSink),
        );
        assert!(r.is_empty());
        assert_eq!(r.init_errors().len(), 2);
        let err = r.select(None).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("PF_TEST_MISSING_OPENAI_KEY"));
        assert!(msg.contains("PF_TEST_MISSING_GEMINI_KEY"));
    }

    #[test]
    fn mask_secrets_hides_long_tokens() {
        let masked = mask_secrets("invalid key sk-proj-abcdefghijklmnopqrstuvwxyz for provider");
        assert!(!masked.contains("abcdefghijklmnopqrstuvwxyz"));
        assert!(masked.contains("..."));
    }
}
