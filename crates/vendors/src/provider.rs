use async_trait::async_trait;
use serde::Serialize;

use basket_core::{reconcile, zero_items, Cart, CartItem, CartTransport, Product, VendorError};

/// The uniform four-operation contract every vendor provider implements.
///
/// Cart-mutating operations go through the reconciler (REST vendors) or the
/// per-item script loop (browser vendors). `authorize` is best-effort and
/// must never raise: the agent expects the call to complete even when a
/// human has to finish the login out-of-band.
#[async_trait]
pub trait Provider: Send + Sync {
    fn vendor(&self) -> &'static str;

    /// Stateless catalog lookup, normalized per vendor.
    async fn search(&self, query: &str) -> Result<Vec<Product>, VendorError>;

    /// Merge `items` into the existing cart (idempotent upsert; quantity 0
    /// marks removal) and return the resulting state.
    async fn add_items(&self, items: &[CartItem]) -> Result<CartUpdate, VendorError>;

    /// Remove the listed items. An empty list clears the entire cart,
    /// not a no-op.
    async fn remove_items(&self, items: &[CartItem]) -> Result<CartUpdate, VendorError>;

    /// Best-effort interactive login. Failures are logged and swallowed.
    async fn authorize(&self) {}
}

/// Result of a cart mutation.
///
/// REST vendors apply writes atomically and report the authoritative
/// post-state. Browser vendors mutate item by item and report per-item
/// outcomes instead, because partial success is expected and must be
/// surfaced rather than masked.
#[derive(Clone, Debug, PartialEq)]
pub enum CartUpdate {
    Cart(Cart),
    Outcomes(Vec<ItemOutcome>),
}

/// Outcome of one item in a browser-backed cart write.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ItemOutcome {
    pub id: String,
    pub quantity: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn added(item: &CartItem) -> Self {
        Self { id: item.id.clone(), quantity: item.quantity.clone(), ok: true, error: None }
    }

    pub fn failed(item: &CartItem, error: impl Into<String>) -> Self {
        Self {
            id: item.id.clone(),
            quantity: item.quantity.clone(),
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// Shared remove path for REST vendors: zero out the listed items, or the
/// whole current cart when the list is empty, then reconcile.
pub(crate) async fn remove_via_reconcile<T>(
    transport: &T,
    items: &[CartItem],
) -> Result<Cart, VendorError>
where
    T: CartTransport + ?Sized,
{
    if items.is_empty() {
        let current = transport.read_cart().await?;
        let zeroed: Vec<CartItem> =
            current.iter().map(|(id, _)| CartItem::new(id.clone(), "0")).collect();
        return reconcile(transport, &zeroed).await;
    }
    reconcile(transport, &zero_items(items)).await
}

/// Stringify a vendor JSON scalar that may be a string or a number.
pub(crate) fn json_scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
