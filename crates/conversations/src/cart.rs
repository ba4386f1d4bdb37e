//! Cart context injection.
//!
//! The formatted block is deterministic for a given snapshot: one line per
//! item plus a summary line. Only item names, quantities, and prices
//! appear — never user identifiers.

use pf_domain::procurement::CartSnapshot;

/// Render the live cart as a context block for the model.
pub fn format_cart_context(cart: &CartSnapshot) -> String {
    let mut out = String::from("Current cart:\n");
    for line in &cart.items {
        let subtotal = line.item_price * line.quantity as f64;
        out.push_str(&format!(
            "- {} x{} @ ${:.2} = ${:.2}\n",
            line.item_name, line.quantity, line.item_price, subtotal
        ));
    }
    out.push_str(&format!(
        "Total: ${:.2} ({} item{})",
        cart.total_cost,
        cart.item_count,
        if cart.item_count == 1 { "" } else { "s" }
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_domain::procurement::CartLine;

    fn snapshot() -> CartSnapshot {
        CartSnapshot {
            items: vec![
                CartLine {
                    item_id: "i1".into(),
                    item_name: "Wireless Mouse".into(),
                    item_price: 19.99,
                    quantity: 2,
                },
                CartLine {
                    item_id: "i2".into(),
                    item_name: "USB-C Hub".into(),
                    item_price: 45.0,
                    quantity: 1,
                },
            ],
            total_cost: 84.98,
            item_count: 3,
        }
    }

    #[test]
    fn formats_line_per_item_with_summary() {
        let block = format_cart_context(&snapshot());
        assert_eq!(
            block,
            "Current cart:\n\
             - Wireless Mouse x2 @ $19.99 = $39.98\n\
             - USB-C Hub x1 @ $45.00 = $45.00\n\
             Total: $84.98 (3 items)"
        );
    }

    #[test]
    fn formatting_is_deterministic() {
        let cart = snapshot();
        assert_eq!(format_cart_context(&cart), format_cart_context(&cart));
    }

    #[test]
    fn single_item_uses_singular() {
        let cart = CartSnapshot {
            items: vec![CartLine {
                item_id: "i1".into(),
                item_name: "Desk Lamp".into(),
                item_price: 20.0,
                quantity: 1,
            }],
            total_cost: 20.0,
            item_count: 1,
        };
        assert!(format_cart_context(&cart).ends_with("(1 item)"));
    }
}
