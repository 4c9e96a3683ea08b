//! Rami Levy: REST-backed vendor.
//!
//! Search and cart writes go to the main API host; the authoritative cart
//! read lives on the club-customer host. The cart write carries the full
//! resulting line map in one call; removal is encoded by *omitting* the
//! line from the map (this vendor deletes by omission, unlike Keshet's
//! explicit delete flag; vendor-local policy, deliberately not unified).

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{header, Method};
use secrecy::ExposeSecret;
use serde_json::{json, Map, Value};
use tracing::debug;

use basket_core::config::RamiLevyConfig;
use basket_core::{reconcile, Cart, CartItem, CartTransport, Product, VendorError};

use crate::provider::{json_scalar_to_string, remove_via_reconcile, CartUpdate, Provider};

pub struct RamiLevyProvider {
    client: RamiLevyClient,
}

impl RamiLevyProvider {
    pub fn new(config: RamiLevyConfig) -> Result<Self, VendorError> {
        Ok(Self { client: RamiLevyClient::new(config)? })
    }
}

#[async_trait]
impl Provider for RamiLevyProvider {
    fn vendor(&self) -> &'static str {
        "rami_levy"
    }

    async fn search(&self, query: &str) -> Result<Vec<Product>, VendorError> {
        let response = self.client.search(query).await?;
        let products = response
            .get("data")
            .and_then(Value::as_array)
            .map(|data| data.iter().map(normalize_product).collect())
            .unwrap_or_default();
        Ok(products)
    }

    async fn add_items(&self, items: &[CartItem]) -> Result<CartUpdate, VendorError> {
        Ok(CartUpdate::Cart(reconcile(&self.client, items).await?))
    }

    async fn remove_items(&self, items: &[CartItem]) -> Result<CartUpdate, VendorError> {
        Ok(CartUpdate::Cart(remove_via_reconcile(&self.client, items).await?))
    }
}

struct RamiLevyClient {
    http: reqwest::Client,
    config: RamiLevyConfig,
}

impl RamiLevyClient {
    fn new(config: RamiLevyConfig) -> Result<Self, VendorError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| VendorError::Request(e.to_string()))?;
        Ok(Self { http, config })
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, VendorError> {
        let token = self.config.api_token.expose_secret();
        let mut request = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "application/json, text/plain, */*")
            .header(header::CONTENT_TYPE, "application/json;charset=UTF-8")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header("ecomtoken", token)
            .header("locale", "he");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response =
            request.send().await.map_err(|e| VendorError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VendorError::transport(status.as_u16(), message));
        }
        response.json().await.map_err(|e| VendorError::MalformedResponse(e.to_string()))
    }

    async fn search(&self, query: &str) -> Result<Value, VendorError> {
        let url = format!("{}/catalog", self.config.api_base);
        let body = json!({
            "q": query,
            "store": self.config.store_id,
            "aggs": 1,
        });
        self.request(Method::POST, &url, Some(&body)).await
    }
}

#[async_trait]
impl CartTransport for RamiLevyClient {
    async fn read_cart(&self) -> Result<Cart, VendorError> {
        let url = format!("{}/{}", self.config.cart_query_base, self.config.account_id);
        let response = self.request(Method::GET, &url, None).await?;
        Ok(parse_cart(&response))
    }

    async fn write_cart(&self, desired: &Cart) -> Result<(), VendorError> {
        let items = encode_cart_lines(desired)?;
        debug!(lines = items.len(), "writing rami levy cart");
        let url = format!("{}/v2/cart", self.config.api_base);
        let supply_at = (Utc::now() + Duration::days(1))
            .naive_utc()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        let body = json!({
            "store": self.config.store_id,
            "isClub": 0,
            "supplyAt": supply_at,
            "items": items,
            "meta": null,
        });
        self.request(Method::POST, &url, Some(&body)).await?;
        Ok(())
    }
}

/// Cart read shape: `{ "cart": { "items": { "<id>": <quantity>, ... } } }`.
fn parse_cart(response: &Value) -> Cart {
    response
        .pointer("/cart/items")
        .and_then(Value::as_object)
        .map(|items| {
            items
                .iter()
                .filter_map(|(id, quantity)| {
                    json_scalar_to_string(quantity).map(|q| (id.clone(), q))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Encode the outgoing line map. Quantity 0 means removal, and this vendor
/// removes by omission, so zero lines are dropped entirely. Lines read back
/// from the vendor may carry fractional quantities (weighed produce); those
/// pass through unchanged. Caller-supplied quantities were already validated
/// as integers before the cart was read.
fn encode_cart_lines(desired: &Cart) -> Result<Map<String, Value>, VendorError> {
    let mut lines = Map::new();
    for (id, quantity) in desired.iter() {
        let quantity = quantity.trim();
        let value = match quantity.parse::<u32>() {
            Ok(0) => continue,
            Ok(units) => json!(units),
            Err(_) => match quantity.parse::<f64>() {
                Ok(weight) if weight == 0.0 => continue,
                Ok(weight) if weight.is_finite() && weight > 0.0 => json!(weight),
                _ => return Err(VendorError::InvalidQuantity(quantity.to_string())),
            },
        };
        lines.insert(id.clone(), value);
    }
    Ok(lines)
}

/// Flatten the vendor's nested product JSON. The unit-size descriptor is
/// carried verbatim from `gs.Product_Dimensions.Net_Weight`.
fn normalize_product(product: &Value) -> Product {
    Product {
        id: product.get("id").and_then(json_scalar_to_string).unwrap_or_default(),
        name: product
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        price: product.pointer("/price/price").and_then(Value::as_f64),
        quantity_evaluation: product
            .pointer("/gs/Product_Dimensions/Net_Weight")
            .cloned()
            .unwrap_or(Value::Null),
        selling_method: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cart_reads_the_nested_item_map() {
        let response = json!({
            "cart": { "items": { "111": 2, "222": "1" } }
        });
        let cart = parse_cart(&response);
        assert_eq!(cart.quantity("111"), Some("2"));
        assert_eq!(cart.quantity("222"), Some("1"));
    }

    #[test]
    fn parse_cart_tolerates_missing_or_null_cart() {
        assert!(parse_cart(&json!({})).is_empty());
        assert!(parse_cart(&json!({"cart": null})).is_empty());
        assert!(parse_cart(&json!({"cart": {"items": null}})).is_empty());
    }

    #[test]
    fn zero_quantity_lines_are_omitted_from_the_write() {
        let cart: Cart = [
            ("111".to_string(), "2".to_string()),
            ("222".to_string(), "0".to_string()),
        ]
        .into_iter()
        .collect();

        let lines = encode_cart_lines(&cart).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines.get("111"), Some(&json!(2)));
        assert!(!lines.contains_key("222"));
    }

    #[test]
    fn fractional_quantities_from_the_vendor_pass_through_the_write() {
        // Weighed produce comes back from the cart read as a fraction;
        // reconciling an unrelated item must not reject it.
        let cart: Cart = [
            ("111".to_string(), "2".to_string()),
            ("222".to_string(), "0.5".to_string()),
        ]
        .into_iter()
        .collect();

        let lines = encode_cart_lines(&cart).unwrap();
        assert_eq!(lines.get("111"), Some(&json!(2)));
        assert_eq!(lines.get("222"), Some(&json!(0.5)));
    }

    #[test]
    fn fractional_zero_is_still_omitted() {
        let cart: Cart = [("111".to_string(), "0.0".to_string())].into_iter().collect();
        assert!(encode_cart_lines(&cart).unwrap().is_empty());
    }

    #[test]
    fn malformed_quantity_is_rejected_at_encoding() {
        let cart: Cart = [("111".to_string(), "lots".to_string())].into_iter().collect();
        assert!(matches!(
            encode_cart_lines(&cart),
            Err(VendorError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn products_flatten_from_the_catalog_shape() {
        let raw = json!({
            "id": 12345,
            "name": "חלב 3%",
            "price": { "price": 6.9 },
            "gs": { "Product_Dimensions": { "Net_Weight": { "value": 1, "unit": "l" } } }
        });
        let product = normalize_product(&raw);
        assert_eq!(product.id, "12345");
        assert_eq!(product.name, "חלב 3%");
        assert_eq!(product.price, Some(6.9));
        assert_eq!(product.quantity_evaluation, json!({"value": 1, "unit": "l"}));
        assert_eq!(product.selling_method, None);
    }
}
