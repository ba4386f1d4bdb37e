//! Optional content moderation.
//!
//! When enabled, user messages are checked against the OpenAI moderation
//! endpoint before the turn runs. A flagged message rejects the turn; a
//! moderation API failure is logged and lets the message through, since
//! availability beats strictness here.

use serde_json::Value;

use pf_domain::config::{Config, ProviderKind};

pub struct ModerationClient {
    enabled: bool,
    api_key: Option<String>,
    endpoint: String,
    client: reqwest::Client,
}

impl ModerationClient {
    /// Build from config. The key comes from the OpenAI provider's
    /// credential variable; moderation silently disables itself when no
    /// key is present.
    pub fn from_config(config: &Config) -> Self {
        let openai = config
            .llm
            .providers
            .iter()
            .find(|p| p.kind == ProviderKind::Openai);
        let api_key = openai.and_then(|p| std::env::var(&p.api_key_env).ok());
        let endpoint = openai
            .map(|p| format!("{}/moderations", p.base_url.trim_end_matches('/')))
            .unwrap_or_else(|| "https://api.openai.com/v1/moderations".into());

        let enabled = config.safety.moderation_enabled;
        if enabled && api_key.is_none() {
            tracing::warn!("moderation enabled but no OpenAI key available; moderation disabled");
        }

        Self {
            enabled: enabled && api_key.is_some(),
            api_key,
            endpoint,
            client: reqwest::Client::new(),
        }
    }

    /// For tests: a client that never moderates.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            api_key: None,
            endpoint: String::new(),
            client: reqwest::Client::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check a message. `Some(categories)` means the input was flagged;
    /// `None` means allowed — including when moderation is disabled or
    /// the API call failed (fail-open).
    pub async fn check(&self, text: &str) -> Option<Vec<String>> {
        if !self.enabled {
            return None;
        }
        let api_key = self.api_key.as_ref()?;

        let body = serde_json::json!({
            "model": "omni-moderation-latest",
            "input": text,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await;

        let payload: Value = match response {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "moderation response unreadable, allowing message");
                    return None;
                }
            },
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "moderation call failed, allowing message");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "moderation call failed, allowing message");
                return None;
            }
        };

        let result = payload.get("results").and_then(|r| r.as_array())?.first()?;
        if result.get("flagged").and_then(Value::as_bool) != Some(true) {
            return None;
        }

        let categories = result
            .get("categories")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter(|(_, flagged)| flagged.as_bool() == Some(true))
                    .map(|(name, _)| name.clone())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        Some(if categories.is_empty() {
            vec!["unspecified".into()]
        } else {
            categories
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_client_allows_everything() {
        let client = ModerationClient::disabled();
        assert!(!client.is_enabled());
        assert!(client.check("anything at all").await.is_none());
    }

    #[test]
    fn enabling_without_key_disables() {
        let mut config = Config::default();
        config.safety.moderation_enabled = true;
        config.llm.providers[0].api_key_env = "PF_TEST_NO_SUCH_KEY".into();
        let client = ModerationClient::from_config(&config);
        assert!(!client.is_enabled());
    }
}
