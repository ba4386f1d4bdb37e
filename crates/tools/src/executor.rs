//! Tool executor: validate, authorize, dispatch, race against the
//! deadline, and envelope the outcome.
//!
//! Failures never propagate as errors. Every call — including bad
//! arguments, missing auth, and timeouts — produces a tool-result message
//! whose JSON payload tells the model what went wrong, so the loop can
//! continue and the model can self-correct.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use pf_domain::chat::ChatMessage;
use pf_domain::config::AgentConfig;
use pf_domain::metrics::Metrics;
use pf_domain::procurement::{
    CartService, CatalogService, CheckoutService, SearchQuery,
};
use pf_domain::trace::TraceEvent;

use crate::schema::spec_for;
use crate::validate::validate_args;

/// Default result cap for catalog searches when the model omits `limit`.
const DEFAULT_SEARCH_LIMIT: usize = 10;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / result types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct ExecuteToolRequest {
    pub tool_name: String,
    pub arguments: Value,
    pub tool_call_id: String,
    /// Backend-reported invalid-JSON arguments, surfaced as a structured
    /// failure instead of being executed.
    pub parse_error: Option<String>,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
}

/// Outcome of one tool execution.
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    /// The tool-result message to append to the working sequence.
    pub message: ChatMessage,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// Internal failure shape; becomes the error payload in the envelope.
struct ToolFailure {
    error_type: &'static str,
    message: String,
    details: Option<Value>,
}

impl ToolFailure {
    fn new(error_type: &'static str, message: impl Into<String>) -> Self {
        Self {
            error_type,
            message: message.into(),
            details: None,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ToolExecutor {
    catalog: Arc<dyn CatalogService>,
    cart: Arc<dyn CartService>,
    checkout: Arc<dyn CheckoutService>,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl ToolExecutor {
    pub fn new(
        catalog: Arc<dyn CatalogService>,
        cart: Arc<dyn CartService>,
        checkout: Arc<dyn CheckoutService>,
        agent: &AgentConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            catalog,
            cart,
            checkout,
            timeout: Duration::from_millis(agent.tool_timeout_ms),
            metrics,
        }
    }

    /// Execute one tool call and envelope the outcome.
    pub async fn execute(&self, req: ExecuteToolRequest) -> ExecuteResult {
        let started = Instant::now();
        let outcome = self.run(&req).await;
        let duration = started.elapsed();
        let duration_ms = duration.as_millis() as u64;

        let (content, success, error, status) = match outcome {
            Ok(value) => (value.to_string(), true, None, "success"),
            Err(failure) => {
                let mut payload = serde_json::json!({
                    "error": failure.message,
                    "errorType": failure.error_type,
                    "toolName": req.tool_name,
                });
                if let Some(details) = failure.details {
                    payload["details"] = details;
                }
                (
                    payload.to_string(),
                    false,
                    Some(failure.message),
                    failure.error_type,
                )
            }
        };

        self.metrics
            .agent_tool_calls_total
            .with_label_values(&[&req.tool_name, status])
            .inc();
        self.metrics
            .agent_tool_call_duration_seconds
            .with_label_values(&[&req.tool_name])
            .observe(duration.as_secs_f64());
        TraceEvent::ToolDispatched {
            tool: req.tool_name.clone(),
            duration_ms,
            success,
        }
        .emit();

        ExecuteResult {
            message: ChatMessage::tool_result(&req.tool_call_id, &req.tool_name, content),
            duration_ms,
            success,
            error,
        }
    }

    async fn run(&self, req: &ExecuteToolRequest) -> Result<Value, ToolFailure> {
        let Some(spec) = spec_for(&req.tool_name) else {
            return Err(ToolFailure::new(
                "unknown_tool",
                format!("tool '{}' is not registered", req.tool_name),
            ));
        };

        // Arguments the backend could not decode never reach dispatch.
        if let Some(parse_error) = &req.parse_error {
            return Err(ToolFailure::new(
                "tool_argument_parse_failed",
                format!("tool arguments were not valid JSON: {parse_error}"),
            ));
        }

        if let Err(issues) = validate_args(spec, &req.arguments) {
            let summary = issues
                .iter()
                .map(|i| {
                    if i.field.is_empty() {
                        i.message.clone()
                    } else {
                        format!("{}: {}", i.field, i.message)
                    }
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ToolFailure {
                error_type: "invalid_arguments",
                message: summary,
                details: serde_json::to_value(&issues).ok(),
            });
        }

        let user_id = if spec.requires_user {
            match req.user_id.as_deref() {
                Some(u) => Some(u),
                None => {
                    return Err(ToolFailure::new(
                        "unauthorized",
                        "You must be signed in to manage a cart or check out.",
                    ));
                }
            }
        } else {
            req.user_id.as_deref()
        };

        match tokio::time::timeout(self.timeout, self.dispatch(spec.name, &req.arguments, user_id))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ToolFailure::new(
                "tool_timeout",
                format!(
                    "tool '{}' exceeded its {}ms deadline",
                    spec.name,
                    self.timeout.as_millis()
                ),
            )),
        }
    }

    async fn dispatch(
        &self,
        tool: &str,
        args: &Value,
        user_id: Option<&str>,
    ) -> Result<Value, ToolFailure> {
        match tool {
            "search_catalog" => self.dispatch_search(args).await,
            "add_to_cart" => self.dispatch_add(args, user_id).await,
            "remove_from_cart" => self.dispatch_remove(args, user_id).await,
            "get_cart" => self.dispatch_get_cart(user_id).await,
            "checkout" => self.dispatch_checkout(args, user_id).await,
            other => Err(ToolFailure::new(
                "unknown_tool",
                format!("tool '{other}' is not registered"),
            )),
        }
    }

    async fn dispatch_search(&self, args: &Value) -> Result<Value, ToolFailure> {
        let query = SearchQuery {
            query: str_arg(args, "query").unwrap_or_default(),
            limit: args
                .get("limit")
                .and_then(Value::as_u64)
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_SEARCH_LIMIT),
            min_price: args.get("minPrice").and_then(Value::as_f64),
            max_price: args.get("maxPrice").and_then(Value::as_f64),
        };
        let items = self
            .catalog
            .search(&query)
            .await
            .map_err(execution_failed)?;
        Ok(serde_json::json!({
            "items": items,
            "count": items.len(),
        }))
    }

    async fn dispatch_add(&self, args: &Value, user_id: Option<&str>) -> Result<Value, ToolFailure> {
        let Some(user) = user_id else {
            return Err(ToolFailure::new("unauthorized", "a signed-in user is required"));
        };
        let item_id = str_arg(args, "itemId").unwrap_or_default();
        let quantity = args
            .get("quantity")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .unwrap_or(1);
        let cart = self
            .cart
            .add_item(user, &item_id, quantity)
            .await
            .map_err(execution_failed)?;
        Ok(serde_json::json!({
            "success": true,
            "cart": cart,
        }))
    }

    async fn dispatch_remove(
        &self,
        args: &Value,
        user_id: Option<&str>,
    ) -> Result<Value, ToolFailure> {
        let Some(user) = user_id else {
            return Err(ToolFailure::new("unauthorized", "a signed-in user is required"));
        };
        let item_id = str_arg(args, "itemId").unwrap_or_default();
        let cart = self
            .cart
            .remove_item(user, &item_id)
            .await
            .map_err(execution_failed)?;
        Ok(serde_json::json!({
            "success": true,
            "cart": cart,
        }))
    }

    async fn dispatch_get_cart(&self, user_id: Option<&str>) -> Result<Value, ToolFailure> {
        let Some(user) = user_id else {
            return Err(ToolFailure::new("unauthorized", "a signed-in user is required"));
        };
        let cart = self.cart.get_cart(user).await.map_err(execution_failed)?;
        if cart.is_empty() {
            return Ok(serde_json::json!({
                "items": [],
                "totalCost": 0,
                "itemCount": 0,
                "message": "Your cart is empty.",
            }));
        }
        serde_json::to_value(&cart).map_err(|e| execution_failed(e.into()))
    }

    async fn dispatch_checkout(
        &self,
        args: &Value,
        user_id: Option<&str>,
    ) -> Result<Value, ToolFailure> {
        let Some(user) = user_id else {
            return Err(ToolFailure::new("unauthorized", "a signed-in user is required"));
        };
        let notes = args.get("notes").and_then(Value::as_str);
        let request = self
            .checkout
            .checkout(user, notes)
            .await
            .map_err(execution_failed)?;
        Ok(serde_json::json!({
            "success": true,
            "purchaseRequest": request,
        }))
    }
}

fn str_arg(args: &Value, name: &str) -> Option<String> {
    args.get(name).and_then(Value::as_str).map(String::from)
}

fn execution_failed(e: pf_domain::Error) -> ToolFailure {
    ToolFailure::new("tool_execution_failed", e.to_string())
}
