//! In-memory reference implementations of the procurement services.
//!
//! Used by tests and local development. Production deployments implement
//! the same traits against their own catalog and order systems.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use pf_domain::error::{Error, Result};
use pf_domain::procurement::{
    CartLine, CartService, CartSnapshot, CatalogItem, CatalogService, CheckoutService,
    PurchaseRequest, SearchQuery,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Substring-match catalog over a fixed item list.
pub struct MemoryCatalog {
    items: Vec<CatalogItem>,
}

impl MemoryCatalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self { items }
    }

    /// A small office-supplies catalog for demos and tests.
    pub fn with_sample_items() -> Self {
        let items = vec![
            item("i1", "Wireless Mouse", "electronics", "Ergonomic 2.4GHz wireless mouse", 19.99),
            item("i2", "USB-C Hub", "electronics", "7-in-1 USB-C hub with HDMI", 45.00),
            item("i3", "Mechanical Keyboard", "electronics", "Tenkeyless mechanical keyboard", 89.50),
            item("i4", "Standing Desk", "furniture", "Height-adjustable standing desk", 399.00),
            item("i5", "Desk Lamp", "furniture", "LED desk lamp with dimmer", 24.95),
            item("i6", "Notebook, A5", "stationery", "Dotted A5 notebook, 120 pages", 6.50),
        ];
        Self::new(items)
    }

    pub fn item(&self, id: &str) -> Option<&CatalogItem> {
        self.items.iter().find(|i| i.id == id)
    }
}

fn item(id: &str, name: &str, category: &str, description: &str, price: f64) -> CatalogItem {
    CatalogItem {
        id: id.into(),
        name: name.into(),
        category: category.into(),
        description: description.into(),
        price,
        availability: "in_stock".into(),
    }
}

#[async_trait::async_trait]
impl CatalogService for MemoryCatalog {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogItem>> {
        let needle = query.query.to_lowercase();
        let matches = self
            .items
            .iter()
            .filter(|i| {
                let haystack = format!("{} {} {}", i.name, i.description, i.category);
                needle
                    .split_whitespace()
                    .all(|term| haystack.to_lowercase().contains(term))
            })
            .filter(|i| query.min_price.is_none_or(|min| i.price >= min))
            .filter(|i| query.max_price.is_none_or(|max| i.price <= max))
            .take(query.limit)
            .cloned()
            .collect();
        Ok(matches)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Cart
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-user carts with prices snapshotted at add time.
pub struct MemoryCartService {
    catalog: Arc<MemoryCatalog>,
    carts: RwLock<HashMap<String, Vec<CartLine>>>,
}

impl MemoryCartService {
    pub fn new(catalog: Arc<MemoryCatalog>) -> Self {
        Self {
            catalog,
            carts: RwLock::new(HashMap::new()),
        }
    }

    fn snapshot(lines: &[CartLine]) -> CartSnapshot {
        let total_cost = lines
            .iter()
            .map(|l| l.item_price * l.quantity as f64)
            .sum::<f64>();
        let item_count = lines.iter().map(|l| l.quantity).sum();
        CartSnapshot {
            items: lines.to_vec(),
            total_cost,
            item_count,
        }
    }
}

#[async_trait::async_trait]
impl CartService for MemoryCartService {
    async fn add_item(&self, user_id: &str, item_id: &str, quantity: u32) -> Result<CartSnapshot> {
        let item = self
            .catalog
            .item(item_id)
            .ok_or_else(|| Error::ValidationFailed(format!("item '{item_id}' not found")))?;

        let mut carts = self.carts.write();
        let lines = carts.entry(user_id.to_string()).or_default();
        match lines.iter_mut().find(|l| l.item_id == item_id) {
            Some(line) => line.quantity += quantity,
            None => lines.push(CartLine {
                item_id: item.id.clone(),
                item_name: item.name.clone(),
                item_price: item.price,
                quantity,
            }),
        }
        Ok(Self::snapshot(lines))
    }

    async fn remove_item(&self, user_id: &str, item_id: &str) -> Result<CartSnapshot> {
        let mut carts = self.carts.write();
        let lines = carts.entry(user_id.to_string()).or_default();
        let before = lines.len();
        lines.retain(|l| l.item_id != item_id);
        if lines.len() == before {
            return Err(Error::ValidationFailed(format!(
                "item '{item_id}' is not in the cart"
            )));
        }
        Ok(Self::snapshot(lines))
    }

    async fn get_cart(&self, user_id: &str) -> Result<CartSnapshot> {
        let carts = self.carts.read();
        let lines = carts.get(user_id).map(Vec::as_slice).unwrap_or(&[]);
        Ok(Self::snapshot(lines))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Checkout
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Turns a cart into a pending purchase request and empties the cart.
pub struct MemoryCheckoutService {
    cart: Arc<MemoryCartService>,
    requests: RwLock<Vec<PurchaseRequest>>,
}

impl MemoryCheckoutService {
    pub fn new(cart: Arc<MemoryCartService>) -> Self {
        Self {
            cart,
            requests: RwLock::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<PurchaseRequest> {
        self.requests.read().clone()
    }
}

#[async_trait::async_trait]
impl CheckoutService for MemoryCheckoutService {
    async fn checkout(&self, user_id: &str, notes: Option<&str>) -> Result<PurchaseRequest> {
        let snapshot = self.cart.get_cart(user_id).await?;
        if snapshot.is_empty() {
            return Err(Error::ValidationFailed("the cart is empty".into()));
        }

        let request = PurchaseRequest {
            id: uuid::Uuid::new_v4().to_string(),
            total_cost: snapshot.total_cost,
            item_count: snapshot.item_count,
            status: "pending_approval".into(),
            created_at: Utc::now(),
        };
        if let Some(notes) = notes {
            tracing::debug!(user_id, notes, "checkout notes recorded");
        }

        self.cart.carts.write().remove(user_id);
        self.requests.write().push(request.clone());
        Ok(request)
    }
}
