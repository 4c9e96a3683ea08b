//! Shufersal: browser-backed vendor.
//!
//! The vendor exposes no cart API. Search is still plain HTTP against the
//! public catalog, but every cart mutation runs the vendor's own in-page
//! cart code through the shared browser session, one item at a time, with
//! a page reload after each success so the front end's lazily-fetched state
//! is fresh before the next mutation. A thrown script fails that item only;
//! the loop continues and partial success is surfaced per item.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use basket_core::config::{BrowserConfig, ShufersalConfig};
use basket_core::errors::{AuthError, SessionError};
use basket_core::{Cart, CartItem, Product, SellingMethod, VendorError};
use basket_session::page::{current_url, wait_for_selector, wait_for_url_prefix};
use basket_session::{SessionManager, DEFAULT_USER_AGENT};

use crate::provider::{CartUpdate, ItemOutcome, Provider};

/// Invokes the vendor site's own add-to-cart entry point, exactly as the
/// storefront does. `window.ajaxCall` and `miglog` are the vendor's
/// globals; they only exist on a real page.
const ADD_TO_CART_JS: &str = r#"
async (args) => {
    const response = await window.ajaxCall("/cart/add", JSON.stringify({
        productCodePost: args.productId,
        productCode: args.productId,
        sellingMethod: args.sellingMethod,
        qty: args.qty,
        frontQuantity: args.qty,
        comment: "",
        affiliateCode: ""
    }), (rsltScript) => {
        miglog.cart.cartRefresh(rsltScript);
        miglog.eventEmitter.emit("cart:addtocartcallback");
    }, null, {
        openFrom: "SEARCH",
        recommendationType: "AUTOCOMPLETE_LIST"
    });
    console.log('add to cart response:', response);
    return response;
}
"#;

/// Server-side cart wipe via a same-origin fetch from within the page.
const CLEAR_CART_JS: &str = r#"
async () => {
    const response = await fetch('/cart/remove', {
        method: 'POST',
        headers: { 'Content-Type': 'application/json' },
        body: JSON.stringify({})
    });
    const result = await response.json();
    console.log('clear cart response:', result);
    return result;
}
"#;

const LOGIN_USERNAME_SELECTOR: &str = "#j_username";
const LOGIN_PASSWORD_SELECTOR: &str = "#j_password";
const LOGIN_BUTTON_SELECTOR: &str = ".btn-login";

pub struct ShufersalProvider {
    http: reqwest::Client,
    config: ShufersalConfig,
    session: Arc<SessionManager>,
    login_form_timeout: Duration,
    login_redirect_timeout: Duration,
}

impl ShufersalProvider {
    pub fn new(
        config: ShufersalConfig,
        browser: &BrowserConfig,
        session: Arc<SessionManager>,
    ) -> Result<Self, VendorError> {
        let http = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .default_headers(browser_headers(&config.base_url))
            .build()
            .map_err(|e| VendorError::Request(e.to_string()))?;
        Ok(Self {
            http,
            config,
            session,
            login_form_timeout: Duration::from_secs(browser.login_form_timeout_secs),
            login_redirect_timeout: Duration::from_secs(browser.login_redirect_timeout_secs),
        })
    }

    async fn clear_cart(&self) -> Result<(), VendorError> {
        let result = self.session.run_script(CLEAR_CART_JS, &json!({})).await?;
        debug!(?result, "cart cleared");
        Ok(())
    }

    async fn try_authorize(&self) -> Result<(), AuthError> {
        let auth_url = format!("{}/login", self.config.base_url);
        let logged_in_prefixes = vec![format!("{}/A", self.config.base_url)];
        let username = self.config.username.clone();
        let password =
            self.config.password.as_ref().map(|secret| secret.expose_secret().to_string());
        let form_timeout = self.login_form_timeout;
        let redirect_timeout = self.login_redirect_timeout;

        self.session
            .with_page(move |page| async move {
                info!(url = %auth_url, "navigating to login page");
                page.goto(auth_url.as_str())
                    .await
                    .map_err(|e| SessionError::Engine(e.to_string()))?;

                match wait_for_selector(&page, LOGIN_USERNAME_SELECTOR, form_timeout).await {
                    Ok(_) => {}
                    Err(_) => {
                        // No form: either already logged in (redirected away)
                        // or the page is blocked.
                        let url = current_url(&page).await?;
                        if url == auth_url {
                            return Err(SessionError::Script(
                                "login form did not appear".to_string(),
                            ));
                        }
                        debug!(%url, "no login form; assuming existing session");
                        return Ok(());
                    }
                }

                if let (Some(username), Some(password)) = (username, password) {
                    debug!("filling login credentials");
                    let user_field = page
                        .find_element(LOGIN_USERNAME_SELECTOR)
                        .await
                        .map_err(|e| SessionError::Script(e.to_string()))?;
                    user_field.click().await.map_err(|e| SessionError::Script(e.to_string()))?;
                    user_field
                        .type_str(&username)
                        .await
                        .map_err(|e| SessionError::Script(e.to_string()))?;

                    let password_field = page
                        .find_element(LOGIN_PASSWORD_SELECTOR)
                        .await
                        .map_err(|e| SessionError::Script(e.to_string()))?;
                    password_field
                        .click()
                        .await
                        .map_err(|e| SessionError::Script(e.to_string()))?;
                    password_field
                        .type_str(&password)
                        .await
                        .map_err(|e| SessionError::Script(e.to_string()))?;

                    match page.find_element(LOGIN_BUTTON_SELECTOR).await {
                        Ok(button) => {
                            button
                                .click()
                                .await
                                .map_err(|e| SessionError::Script(e.to_string()))?;
                            debug!("login submitted");
                        }
                        Err(_) => warn!("login button not found"),
                    }
                } else {
                    warn!("no shufersal credentials configured; leaving form for the user");
                }

                match wait_for_url_prefix(&page, &logged_in_prefixes, redirect_timeout).await? {
                    Some(url) => info!(%url, "login redirect completed"),
                    None => warn!("timed out waiting for login redirection"),
                }
                Ok(())
            })
            .await
            .map_err(|error| AuthError(error.to_string()))
    }
}

#[async_trait]
impl Provider for ShufersalProvider {
    fn vendor(&self) -> &'static str {
        "shufersal"
    }

    async fn search(&self, query: &str) -> Result<Vec<Product>, VendorError> {
        let url = format!(
            "{}/search/results?limit=10&q={}:relevance",
            self.config.base_url,
            urlencoding::encode(query),
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| VendorError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(VendorError::transport(status.as_u16(), message));
        }
        let body: Value =
            response.json().await.map_err(|e| VendorError::MalformedResponse(e.to_string()))?;

        Ok(body
            .get("results")
            .and_then(Value::as_array)
            .map(|results| results.iter().map(normalize_product).collect())
            .unwrap_or_default())
    }

    async fn add_items(&self, items: &[CartItem]) -> Result<CartUpdate, VendorError> {
        Ok(CartUpdate::Outcomes(run_cart_updates(self.session.as_ref(), items).await))
    }

    async fn remove_items(&self, items: &[CartItem]) -> Result<CartUpdate, VendorError> {
        if items.is_empty() {
            self.clear_cart().await?;
            return Ok(CartUpdate::Cart(Cart::new()));
        }
        let zeroed = basket_core::zero_items(items);
        Ok(CartUpdate::Outcomes(run_cart_updates(self.session.as_ref(), &zeroed).await))
    }

    async fn authorize(&self) {
        if let Err(error) = self.try_authorize().await {
            warn!(vendor = "shufersal", %error, "authorization failed; continuing unauthenticated");
            if let Err(error) = self.session.screenshot("shufersal_auth_failed").await {
                debug!(%error, "could not capture auth-failure screenshot");
            }
        }
    }
}

/// The two session operations the per-item loop needs. Seam for tests.
#[async_trait]
pub(crate) trait CartScripts: Send + Sync {
    async fn run_script(&self, script: &str, args: &Value) -> Result<Value, SessionError>;
    async fn reload(&self) -> Result<(), SessionError>;
}

#[async_trait]
impl CartScripts for SessionManager {
    async fn run_script(&self, script: &str, args: &Value) -> Result<Value, SessionError> {
        SessionManager::run_script(self, script, args).await
    }

    async fn reload(&self) -> Result<(), SessionError> {
        SessionManager::reload(self).await
    }
}

/// Run the add-to-cart script once per item, sequentially. Each item's
/// outcome stands alone: a thrown script is logged and recorded as that
/// item's failure, and the loop moves on. After every success the page is
/// reloaded before the next script runs.
pub(crate) async fn run_cart_updates<S>(scripts: &S, items: &[CartItem]) -> Vec<ItemOutcome>
where
    S: CartScripts + ?Sized,
{
    let mut outcomes = Vec::with_capacity(items.len());
    for item in items {
        let quantity = match item.parsed_quantity() {
            Ok(quantity) => quantity,
            Err(error) => {
                warn!(id = %item.id, %error, "skipping item with invalid quantity");
                outcomes.push(ItemOutcome::failed(item, error.to_string()));
                continue;
            }
        };

        let args = json!({
            "productId": item.id,
            "sellingMethod": in_page_selling_method(item.selling_method),
            "qty": quantity,
        });

        match scripts.run_script(ADD_TO_CART_JS, &args).await {
            Ok(_) => {
                if let Err(error) = scripts.reload().await {
                    warn!(id = %item.id, %error, "post-add reload failed");
                }
                info!(id = %item.id, quantity, "cart line written");
                outcomes.push(ItemOutcome::added(item));
            }
            Err(error) => {
                warn!(id = %item.id, %error, "cart script failed; continuing with next item");
                outcomes.push(ItemOutcome::failed(item, error.to_string()));
            }
        }
    }
    outcomes
}

/// The header set a real Chrome tab sends with same-origin fetches. The
/// user agent itself is set on the client and matches what the browser
/// session advertises; without these the vendor flags the request as a bot.
fn browser_headers(base_url: &str) -> header::HeaderMap {
    use header::HeaderValue;

    let mut headers = header::HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9,he-IL;q=0.8,he;q=0.7"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(
        "sec-ch-ua",
        HeaderValue::from_static(
            "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
        ),
    );
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert("sec-ch-ua-platform", HeaderValue::from_static("macOS"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("empty"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("cors"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("same-origin"));
    if let Ok(referer) = HeaderValue::from_str(&format!("{base_url}/")) {
        headers.insert(header::REFERER, referer);
    }
    headers
}

/// The vendor's in-page API speaks `BY_UNIT`/`BY_WEIGHT`.
fn in_page_selling_method(method: Option<SellingMethod>) -> &'static str {
    match method {
        Some(SellingMethod::Weight) => "BY_WEIGHT",
        Some(SellingMethod::Unit) | None => "BY_UNIT",
    }
}

/// Flatten the public search shape. `pricePerUnit` is the vendor's unit
/// descriptor and is carried whole.
fn normalize_product(product: &Value) -> Product {
    Product {
        id: product
            .get("baseProduct")
            .and_then(crate::provider::json_scalar_to_string)
            .unwrap_or_default(),
        name: product
            .get("baseProductDescription")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        price: product.pointer("/price/value").and_then(Value::as_f64),
        quantity_evaluation: product.get("pricePerUnit").cloned().unwrap_or(Value::Null),
        selling_method: product
            .get("sellingMethod")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct FakeScripts {
        fail_on_call: Option<usize>,
        calls: Mutex<Vec<Value>>,
        reloads: Mutex<usize>,
    }

    #[async_trait]
    impl CartScripts for FakeScripts {
        async fn run_script(&self, _script: &str, args: &Value) -> Result<Value, SessionError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(args.clone());
            if self.fail_on_call == Some(calls.len()) {
                return Err(SessionError::Script("ajaxCall is not defined".to_string()));
            }
            Ok(Value::Null)
        }

        async fn reload(&self) -> Result<(), SessionError> {
            *self.reloads.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[tokio::test]
    async fn failure_of_one_item_does_not_abort_the_rest() {
        let scripts = FakeScripts { fail_on_call: Some(2), ..FakeScripts::default() };
        let items =
            vec![CartItem::new("1", "1"), CartItem::new("2", "1"), CartItem::new("3", "1")];

        let outcomes = run_cart_updates(&scripts, &items).await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].ok);
        assert!(!outcomes[1].ok);
        assert!(outcomes[1].error.as_deref().unwrap().contains("ajaxCall"));
        assert!(outcomes[2].ok);
    }

    #[tokio::test]
    async fn page_reloads_after_each_success_only() {
        let scripts = FakeScripts { fail_on_call: Some(1), ..FakeScripts::default() };
        let items = vec![CartItem::new("1", "1"), CartItem::new("2", "2")];

        let outcomes = run_cart_updates(&scripts, &items).await;

        assert!(!outcomes[0].ok);
        assert!(outcomes[1].ok);
        assert_eq!(*scripts.reloads.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn invalid_quantity_fails_the_item_without_running_a_script() {
        let scripts = FakeScripts::default();
        let items = vec![CartItem::new("1", "a lot"), CartItem::new("2", "1")];

        let outcomes = run_cart_updates(&scripts, &items).await;

        assert!(!outcomes[0].ok);
        assert!(outcomes[1].ok);
        assert_eq!(scripts.calls.lock().unwrap().len(), 1, "only the valid item ran");
    }

    #[tokio::test]
    async fn script_arguments_carry_the_normalized_selling_method() {
        let scripts = FakeScripts::default();
        let items = vec![
            CartItem::new("10", "2").with_selling_method(SellingMethod::Weight),
            CartItem::new("11", "1"),
        ];

        run_cart_updates(&scripts, &items).await;

        let calls = scripts.calls.lock().unwrap();
        assert_eq!(calls[0]["sellingMethod"], "BY_WEIGHT");
        assert_eq!(calls[0]["qty"], 2);
        assert_eq!(calls[1]["sellingMethod"], "BY_UNIT");
    }

    #[test]
    fn search_requests_carry_the_full_browser_header_set() {
        let headers = browser_headers("https://www.shufersal.co.il/online/he");

        assert_eq!(headers.get("sec-ch-ua-mobile").unwrap(), "?0");
        assert_eq!(headers.get("sec-fetch-site").unwrap(), "same-origin");
        assert!(headers.get("sec-ch-ua").unwrap().to_str().unwrap().contains("Chromium"));
        assert_eq!(
            headers.get(reqwest::header::REFERER).unwrap(),
            "https://www.shufersal.co.il/online/he/"
        );
        assert!(DEFAULT_USER_AGENT.contains("Chrome/120"), "client UA tracks the session UA");
    }

    #[test]
    fn products_flatten_from_the_search_shape() {
        let raw = serde_json::json!({
            "baseProduct": "P_7290000000001",
            "baseProductDescription": "מלפפון",
            "price": { "value": 3.4 },
            "pricePerUnit": { "value": 3.4, "unit": "kg" },
            "sellingMethod": "BY_WEIGHT"
        });
        let product = normalize_product(&raw);
        assert_eq!(product.id, "P_7290000000001");
        assert_eq!(product.price, Some(3.4));
        assert_eq!(product.selling_method.as_deref(), Some("BY_WEIGHT"));
        assert_eq!(product.quantity_evaluation["unit"], "kg");
    }
}
