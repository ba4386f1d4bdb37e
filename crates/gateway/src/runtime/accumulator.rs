//! Per-turn metadata accumulation.
//!
//! A reducer over tool-result payloads, keyed by tool name. The result is
//! attached to the turn's final agent message so the UI can render items,
//! the live cart, and checkout outcomes without re-parsing tool chatter.

use serde_json::Value;

use pf_conversations::TurnMetadata;

#[derive(Debug, Default)]
pub struct MetadataAccumulator {
    items: Vec<Value>,
    cart: Option<Value>,
    checkout_confirmation: Option<Value>,
    purchase_request: Option<Value>,
}

impl MetadataAccumulator {
    /// Fold one tool result into the turn metadata. Error envelopes and
    /// unparseable payloads contribute nothing; a parse failure is logged
    /// and never fails the turn.
    pub fn absorb(&mut self, tool_name: &str, content: &str) {
        let value: Value = match serde_json::from_str(content) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(tool = tool_name, error = %e, "unparseable tool result, skipping metadata");
                return;
            }
        };
        if value.get("error").is_some() {
            return;
        }

        match tool_name {
            "search_catalog" => {
                if let Some(items) = value.get("items").and_then(Value::as_array) {
                    self.items.extend(items.iter().cloned());
                }
            }
            "add_to_cart" | "remove_from_cart" => {
                if let Some(cart) = value.get("cart") {
                    self.cart = Some(cart.clone());
                }
            }
            "get_cart" => {
                // The whole payload is the cart snapshot.
                if value.get("items").is_some() {
                    self.cart = Some(value);
                }
            }
            "checkout" => {
                if let Some(request) = value.get("purchaseRequest") {
                    self.purchase_request = Some(request.clone());
                } else if value.get("success").and_then(Value::as_bool) == Some(true) {
                    self.checkout_confirmation = Some(value);
                }
            }
            _ => {}
        }
    }

    /// Produce the turn metadata, or `None` when nothing was gathered.
    pub fn finish(self) -> Option<TurnMetadata> {
        let metadata = TurnMetadata {
            items: (!self.items.is_empty()).then_some(self.items),
            cart: self.cart,
            checkout_confirmation: self.checkout_confirmation,
            purchase_request: self.purchase_request,
        };
        (!metadata.is_empty()).then_some(metadata)
    }
}
