//! Procurement wire types and the narrow seams to the domain services.
//!
//! The concrete catalog search algorithm, cart pricing, and purchase
//! request workflow live behind these traits; the agent core only
//! snapshots what they return.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Wire types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An item as returned by catalog search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub price: f64,
    pub availability: String,
}

/// One line of a user's cart with the price snapshotted at add time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub item_id: String,
    pub item_name: String,
    pub item_price: f64,
    pub quantity: u32,
}

/// Point-in-time view of a user's cart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    pub items: Vec<CartLine>,
    pub total_cost: f64,
    pub item_count: u32,
}

/// A purchase request created by checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequest {
    pub id: String,
    pub total_cost: f64,
    pub item_count: u32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Validated catalog search parameters.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub limit: usize,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Service seams
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Catalog search. Open to anonymous callers.
#[async_trait::async_trait]
pub trait CatalogService: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<CatalogItem>>;
}

/// Cart reads and mutations, always scoped to a user.
#[async_trait::async_trait]
pub trait CartService: Send + Sync {
    async fn add_item(&self, user_id: &str, item_id: &str, quantity: u32) -> Result<CartSnapshot>;
    async fn remove_item(&self, user_id: &str, item_id: &str) -> Result<CartSnapshot>;
    async fn get_cart(&self, user_id: &str) -> Result<CartSnapshot>;
}

/// Converts the user's cart into a purchase request.
#[async_trait::async_trait]
pub trait CheckoutService: Send + Sync {
    async fn checkout(&self, user_id: &str, notes: Option<&str>) -> Result<PurchaseRequest>;
}
