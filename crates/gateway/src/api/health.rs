//! Readiness probe, including per-provider circuit-breaker state.

use axum::extract::State;
use axum::response::Json;

use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let breakers = state.providers.breaker_states();
    let any_open = breakers.values().any(|s| *s == pf_providers::CircuitState::Open);
    let status = if state.providers.is_empty() {
        "no_providers"
    } else if any_open {
        "degraded"
    } else {
        "ok"
    };

    let provider_states: serde_json::Map<String, serde_json::Value> = breakers
        .into_iter()
        .map(|(id, s)| (id, serde_json::json!(s.as_str())))
        .collect();

    Json(serde_json::json!({
        "status": status,
        "providers": provider_states,
        "provider_count": state.providers.len(),
        "init_errors": state
            .providers
            .init_errors()
            .iter()
            .map(|e| serde_json::json!({
                "provider": e.provider_id,
                "kind": e.kind,
                "error": e.error,
            }))
            .collect::<Vec<_>>(),
    }))
}
