//! Error-to-response mapping.
//!
//! Handlers return [`ApiError`], which maps the domain taxonomy to HTTP
//! status codes and a `{code, message}` body. Internal detail stays in
//! the logs; clients only see the stable code and a short safe message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use pf_domain::error::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

fn status_for(code: &str) -> StatusCode {
    match code {
        "validation_failed" | "prompt_injection_rejected" | "content_moderated"
        | "token_limit_exceeded" => StatusCode::BAD_REQUEST,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
        "circuit_open" | "provider_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        "timeout" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let status = status_for(code);
        if status.is_server_error() {
            tracing::error!(code, error = %self.0, "request failed");
        } else {
            tracing::debug!(code, error = %self.0, "request rejected");
        }
        (
            status,
            Json(serde_json::json!({
                "code": code,
                "message": self.0.user_message(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_documented_statuses() {
        for (code, status) in [
            ("validation_failed", StatusCode::BAD_REQUEST),
            ("prompt_injection_rejected", StatusCode::BAD_REQUEST),
            ("content_moderated", StatusCode::BAD_REQUEST),
            ("token_limit_exceeded", StatusCode::BAD_REQUEST),
            ("unauthorized", StatusCode::UNAUTHORIZED),
            ("rate_limited", StatusCode::TOO_MANY_REQUESTS),
            ("circuit_open", StatusCode::SERVICE_UNAVAILABLE),
            ("provider_unavailable", StatusCode::SERVICE_UNAVAILABLE),
            ("timeout", StatusCode::GATEWAY_TIMEOUT),
            ("persistence_failed", StatusCode::INTERNAL_SERVER_ERROR),
            ("internal", StatusCode::INTERNAL_SERVER_ERROR),
        ] {
            assert_eq!(status_for(code), status, "{code}");
        }
    }
}
