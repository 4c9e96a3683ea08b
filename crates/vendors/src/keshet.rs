//! Keshet Teamim: REST-backed vendor.
//!
//! The vendor has no standalone cart-read endpoint; an update call with an
//! empty line list leaves the cart unchanged and echoes its current state,
//! so `read_cart` is expressed as an empty write. Removal is encoded as an
//! explicit zero line carrying `delete: true` (the other REST vendor omits
//! the line instead; vendor-local policy, deliberately not unified).

use async_trait::async_trait;
use reqwest::{header, Method};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::debug;

use basket_core::config::KeshetConfig;
use basket_core::{reconcile, Cart, CartItem, CartTransport, Product, VendorError};

use crate::provider::{json_scalar_to_string, remove_via_reconcile, CartUpdate, Provider};

/// Canned catalog filter the vendor's own storefront sends with every
/// autocomplete query. Opaque; carried verbatim.
const SEARCH_FILTERS: &str = "%7B%22must%22:%7B%22exists%22:%5B%22family.id%22,%22family.categoriesPaths.id%22,%22branch.regularPrice%22%5D,%22term%22:%7B%22branch.isActive%22:true,%22branch.isVisible%22:true%7D%7D,%22mustNot%22:%7B%22term%22:%7B%22branch.regularPrice%22:0%7D%7D,%22bool%22:%7B%22should%22:%5B%7B%22bool%22:%7B%22must_not%22:%7B%22exists%22:%7B%22field%22:%22branch.outOfStockShowUntilDate%22%7D%7D%7D%7D,%7B%22bool%22:%7B%22must%22:%5B%7B%22range%22:%7B%22branch.outOfStockShowUntilDate%22:%7B%22gt%22:%22now%22%7D%7D%7D,%7B%22term%22:%7B%22branch.isOutOfStock%22:true%7D%7D%5D%7D%7D,%7B%22bool%22:%7B%22must%22:%5B%7B%22term%22:%7B%22branch.isOutOfStock%22:false%7D%7D%5D%7D%7D%5D%7D%7D";

/// Fixed delivery fields the cart endpoint requires on every update.
const DELIVERY_PRODUCT_ID: i64 = 3_766_099;
const DELIVERY_TYPE: i64 = 1;
const UPDATE_SOURCE: &str = "Autocomplete Results";

pub struct KeshetProvider {
    client: KeshetClient,
}

impl KeshetProvider {
    pub fn new(config: KeshetConfig) -> Result<Self, VendorError> {
        Ok(Self { client: KeshetClient::new(config)? })
    }
}

#[async_trait]
impl Provider for KeshetProvider {
    fn vendor(&self) -> &'static str {
        "keshet"
    }

    async fn search(&self, query: &str) -> Result<Vec<Product>, VendorError> {
        let response = self.client.search(query).await?;
        let products = response
            .pointer("/suggestions/suggestProducts/products")
            .and_then(Value::as_array)
            .map(|products| products.iter().map(normalize_product).collect())
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

struct KeshetClient {
    http: reqwest::Client,
    config: KeshetConfig,
}

impl KeshetClient {
    fn new(config: KeshetConfig) -> Result<Self, VendorError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| VendorError::Request(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn branch_base(&self) -> String {
        format!(
            "{}/retailers/{}/branches/{}",
            self.config.api_base, self.config.retailer_id, self.config.branch_id
        )
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        method_override: Option<&str>,
    ) -> Result<Value, VendorError> {
        let token = self.config.api_token.expose_secret();
        let mut request = self
            .http
            .request(method, url)
            .header(header::ACCEPT, "*/*")
            .header(header::CONTENT_TYPE, "application/json;charset=UTF-8")
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        if let Some(override_method) = method_override {
            request = request.header("x-http-method-override", override_method);
        }
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
        let url = format!(
            "{}/products/autocomplete?appId=4&filters={}&from=0&isSearch=true&languageId=1&size=10&query={}",
            self.branch_base(),
            SEARCH_FILTERS,
            urlencoding::encode(query),
        );
        self.request(Method::GET, &url, None, None).await
    }

    /// One PATCH-override call serves both read (empty delta) and write.
    async fn update(&self, lines: Vec<Value>) -> Result<Value, VendorError> {
        let url = format!("{}/carts/{}?appId=4", self.branch_base(), self.config.cart_id);
        let body = json!({
            "lines": lines,
            "deliveryProduct_Id": DELIVERY_PRODUCT_ID,
            "deliveryType": DELIVERY_TYPE,
            "source": UPDATE_SOURCE,
        });
        self.request(Method::POST, &url, Some(&body), Some("PATCH")).await
    }
}

#[async_trait]
impl CartTransport for KeshetClient {
    async fn read_cart(&self) -> Result<Cart, VendorError> {
        // An empty delta leaves the cart unchanged and echoes it back.
        let response = self.update(Vec::new()).await?;
        Ok(parse_cart(&response))
    }

    async fn write_cart(&self, desired: &Cart) -> Result<(), VendorError> {
        let lines = encode_cart_lines(desired)?;
        debug!(lines = lines.len(), "writing keshet cart");
        self.update(lines).await?;
        Ok(())
    }
}

/// Cart echo shape: `{ "cart": { "lines": [ { "id": .., "quantity": .. } ] } }`.
fn parse_cart(response: &Value) -> Cart {
    response
        .pointer("/cart/lines")
        .and_then(Value::as_array)
        .map(|lines| {
            lines
                .iter()
                .filter_map(|line| {
                    let id = line.get("id").and_then(json_scalar_to_string)?;
                    let quantity = line.get("quantity").and_then(json_scalar_to_string)?;
                    Some((id, quantity))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Encode outgoing lines. Quantity 0 stays in the list but carries the
/// vendor's explicit delete marker.
fn encode_cart_lines(desired: &Cart) -> Result<Vec<Value>, VendorError> {
    desired
        .iter()
        .map(|(id, quantity)| {
            let product_id: i64 = id.trim().parse().map_err(|_| {
                VendorError::MalformedResponse(format!("non-numeric keshet item id `{id}`"))
            })?;
            let quantity: u32 = quantity
                .trim()
                .parse()
                .map_err(|_| VendorError::InvalidQuantity(quantity.clone()))?;

            let mut line = json!({
                "quantity": quantity,
                "soldBy": null,
                "retailerProductId": product_id,
                "type": 1,
            });
            if quantity == 0 {
                line["delete"] = json!(true);
                line["isCase"] = json!(false);
            }
            Ok(line)
        })
        .collect()
}

/// Flatten the autocomplete product shape; the unit descriptor comes from
/// `original.unitOfMeasure`, the price from `branch.regularPrice`.
fn normalize_product(product: &Value) -> Product {
    Product {
        id: product.get("id").and_then(json_scalar_to_string).unwrap_or_default(),
        name: product
            .get("localName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        price: product.pointer("/branch/regularPrice").and_then(Value::as_f64),
        quantity_evaluation: product
            .pointer("/original/unitOfMeasure")
            .cloned()
            .unwrap_or(Value::Null),
        selling_method: None,
    }
}
