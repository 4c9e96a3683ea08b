//! Tool-surface tests against an in-memory provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use serde_json::{json, Value};

use basket_core::{Cart, CartItem, Product, VendorError};
use basket_mcp::BasketMcpServer;
use basket_vendors::{CartUpdate, ItemOutcome, Provider};

#[derive(Default)]
struct FakeProvider {
    cart: Mutex<Cart>,
    outcome_mode: bool,
    authorized: AtomicBool,
    last_removal: Mutex<Option<Vec<CartItem>>>,
}

#[async_trait]
impl Provider for FakeProvider {
    fn vendor(&self) -> &'static str {
        "fake"
    }

    async fn search(&self, query: &str) -> Result<Vec<Product>, VendorError> {
        if query == "nothing" {
            return Ok(Vec::new());
        }
        Ok(vec![Product {
            id: "42".to_string(),
            name: format!("{query} result"),
            price: Some(9.9),
            quantity_evaluation: Value::Null,
            selling_method: None,
        }])
    }

    async fn add_items(&self, items: &[CartItem]) -> Result<CartUpdate, VendorError> {
        if self.outcome_mode {
            return Ok(CartUpdate::Outcomes(
                items.iter().map(ItemOutcome::added).collect(),
            ));
        }
        let mut cart = self.cart.lock().unwrap();
        for item in items {
            if item.is_zero() {
                cart.remove(&item.id);
            } else {
                cart.upsert(item.id.clone(), item.quantity.clone());
            }
        }
        Ok(CartUpdate::Cart(cart.clone()))
    }

    async fn remove_items(&self, items: &[CartItem]) -> Result<CartUpdate, VendorError> {
        *self.last_removal.lock().unwrap() = Some(items.to_vec());
        let mut cart = self.cart.lock().unwrap();
        if items.is_empty() {
            *cart = Cart::new();
        } else {
            for item in items {
                cart.remove(&item.id);
            }
        }
        Ok(CartUpdate::Cart(cart.clone()))
    }

    async fn authorize(&self) {
        self.authorized.store(true, Ordering::SeqCst);
    }
}

fn payload(result: &CallToolResult) -> Value {
    let text = result
        .content
        .first()
        .and_then(|content| content.as_text())
        .map(|text| text.text.clone())
        .unwrap_or_default();
    serde_json::from_str(&text).expect("tool results are JSON text")
}

fn args<T: serde::de::DeserializeOwned>(value: Value) -> Parameters<T> {
    Parameters(serde_json::from_value(value).unwrap())
}

#[tokio::test]
async fn search_returns_normalized_products() {
    let server = BasketMcpServer::new(Arc::new(FakeProvider::default()));

    let result = server.search(args(json!({ "item": "milk" }))).await.unwrap();
    let payload = payload(&result);

    assert_eq!(payload["products"][0]["id"], "42");
    assert_eq!(payload["products"][0]["name"], "milk result");
    assert_eq!(payload["products"][0]["price"], 9.9);
}

#[tokio::test]
async fn search_with_no_hits_returns_an_empty_list() {
    let server = BasketMcpServer::new(Arc::new(FakeProvider::default()));

    let result = server.search(args(json!({ "item": "nothing" }))).await.unwrap();
    assert_eq!(payload(&result)["products"], json!([]));
}

#[tokio::test]
async fn add_items_reports_the_resulting_cart() {
    let server = BasketMcpServer::new(Arc::new(FakeProvider::default()));

    let result = server
        .add_items_to_cart(args(json!({
            "items": [
                { "id": 111, "quantity": 2 },
                { "id": "222", "quantity": "1" }
            ]
        })))
        .await
        .unwrap();

    let cart = payload(&result)["cart"].clone();
    assert_eq!(cart.as_array().unwrap().len(), 2);
    assert_eq!(cart[0], json!({ "id": "111", "quantity": "2" }));
}

#[tokio::test]
async fn zero_quantity_removes_the_line() {
    let provider = Arc::new(FakeProvider::default());
    let server = BasketMcpServer::new(provider);

    server
        .add_items_to_cart(args(json!({ "items": [{ "id": "1", "quantity": "3" }] })))
        .await
        .unwrap();
    let result = server
        .add_items_to_cart(args(json!({ "items": [{ "id": "1", "quantity": "0" }] })))
        .await
        .unwrap();

    assert_eq!(payload(&result)["cart"], json!([]));
}

#[tokio::test]
async fn browser_vendors_report_per_item_outcomes() {
    let provider = Arc::new(FakeProvider { outcome_mode: true, ..FakeProvider::default() });
    let server = BasketMcpServer::new(provider);

    let result = server
        .add_items_to_cart(args(json!({ "items": [{ "id": "5", "quantity": "1" }] })))
        .await
        .unwrap();

    let items = payload(&result)["items"].clone();
    assert_eq!(items[0]["id"], "5");
    assert_eq!(items[0]["ok"], true);
}

#[tokio::test]
async fn omitted_remove_list_empties_the_cart() {
    let provider = Arc::new(FakeProvider::default());
    let server = BasketMcpServer::new(provider.clone());

    server
        .add_items_to_cart(args(json!({ "items": [{ "id": "1", "quantity": "3" }] })))
        .await
        .unwrap();
    let result = server.remove_items_from_cart(args(json!({}))).await.unwrap();

    assert_eq!(payload(&result)["cart"], json!([]));
    let seen = provider.last_removal.lock().unwrap().clone().unwrap();
    assert!(seen.is_empty(), "the provider receives the empty list, not a no-op");
}

#[tokio::test]
async fn user_authorization_reaches_the_provider() {
    let provider = Arc::new(FakeProvider::default());
    let server = BasketMcpServer::new(provider.clone());

    server.user_authorization().await.unwrap();
    assert!(provider.authorized.load(Ordering::SeqCst));
}
