use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        AnnotateAble, CallToolResult, Content, ListResourceTemplatesResult, PaginatedRequestParam,
        RawResourceTemplate, ReadResourceRequestParam, ReadResourceResult, ResourceContents,
        ServerCapabilities, ServerInfo,
    },
    schemars,
    service::RequestContext,
    tool, tool_handler, tool_router, ErrorData as McpError, RoleServer, ServerHandler,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use basket_core::{CartItem, SellingMethod, VendorError};
use basket_vendors::{CartUpdate, Provider};

const SEARCH_RESOURCE_PREFIX: &str = "groceries://search/";

/// The MCP tool surface over a single vendor provider.
///
/// The server is vendor-agnostic; everything vendor-specific lives behind
/// the [`Provider`] it is constructed with.
#[derive(Clone)]
pub struct BasketMcpServer {
    provider: Arc<dyn Provider>,
    tool_router: ToolRouter<Self>,
}

/// Arguments for catalog search.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchArgs {
    /// Free-text product query, in the vendor catalog's language.
    pub item: String,
}

/// One item/quantity pair. Ids and quantities are strings; bare JSON
/// numbers are accepted and coerced.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CartItemArg {
    /// Vendor-native product id, as returned by `search`.
    #[serde(deserialize_with = "basket_core::domain::cart::coerce_to_string")]
    pub id: String,
    /// Desired absolute quantity. "0" marks the item for removal.
    #[serde(deserialize_with = "basket_core::domain::cart::coerce_to_string")]
    pub quantity: String,
    /// "unit" (default) or "weight". Weighed produce needs it on
    /// browser-backed vendors.
    #[serde(default)]
    pub selling_method: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct AddItemsArgs {
    /// Items to merge into the cart.
    pub items: Vec<CartItemArg>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RemoveItemsArgs {
    /// Items to remove. Omit or leave empty to empty the entire cart.
    #[serde(default)]
    pub items: Vec<CartItemArg>,
}

impl CartItemArg {
    fn into_item(self) -> CartItem {
        let item = CartItem::new(self.id, self.quantity);
        match self.selling_method.as_deref() {
            Some(method) if method.eq_ignore_ascii_case("weight") => {
                item.with_selling_method(SellingMethod::Weight)
            }
            Some(_) => item.with_selling_method(SellingMethod::Unit),
            None => item,
        }
    }
}

#[tool_router]
impl BasketMcpServer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Search the grocery vendor's catalog. Returns normalized products with vendor-native ids usable in cart operations."
    )]
    pub async fn search(
        &self,
        Parameters(args): Parameters<SearchArgs>,
    ) -> Result<CallToolResult, McpError> {
        info!(vendor = self.provider.vendor(), item = %args.item, "search");
        let products = self.provider.search(&args.item).await.map_err(vendor_error)?;
        json_result(&json!({ "products": products }))
    }

    #[tool(
        description = "Merge items into the vendor cart. Quantities are absolute (an existing line is replaced, not incremented); quantity 0 removes the line."
    )]
    pub async fn add_items_to_cart(
        &self,
        Parameters(args): Parameters<AddItemsArgs>,
    ) -> Result<CallToolResult, McpError> {
        let items: Vec<CartItem> = args.items.into_iter().map(CartItemArg::into_item).collect();
        info!(vendor = self.provider.vendor(), items = items.len(), "add_items_to_cart");
        let update = self.provider.add_items(&items).await.map_err(vendor_error)?;
        cart_update_result(update)
    }

    #[tool(
        description = "Remove items from the vendor cart. An empty item list empties the whole cart."
    )]
    pub async fn remove_items_from_cart(
        &self,
        Parameters(args): Parameters<RemoveItemsArgs>,
    ) -> Result<CallToolResult, McpError> {
        let items: Vec<CartItem> = args.items.into_iter().map(CartItemArg::into_item).collect();
        info!(vendor = self.provider.vendor(), items = items.len(), "remove_items_from_cart");
        let update = self.provider.remove_items(&items).await.map_err(vendor_error)?;
        cart_update_result(update)
    }

    #[tool(
        description = "Run the vendor's interactive login flow. Best-effort: completes even when the login could not be finished, leaving the browser window for the user."
    )]
    pub async fn user_authorization(&self) -> Result<CallToolResult, McpError> {
        info!(vendor = self.provider.vendor(), "user_authorization");
        self.provider.authorize().await;
        Ok(CallToolResult::success(vec![Content::text(
            "authorization flow completed; if a browser window is open, finish any remaining steps there",
        )]))
    }
}

#[tool_handler]
impl ServerHandler for BasketMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(format!(
                "Grocery cart automation for the `{}` vendor. Use `search` to find vendor product ids, `add_items_to_cart` and `remove_items_from_cart` to change the cart (quantities are absolute; 0 removes a line; an empty remove list empties the cart), and `user_authorization` when the vendor needs an interactive login.",
                self.provider.vendor()
            )),
            capabilities: ServerCapabilities::builder().enable_tools().enable_resources().build(),
            ..Default::default()
        }
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        Ok(ListResourceTemplatesResult {
            next_cursor: None,
            resource_templates: vec![RawResourceTemplate {
                uri_template: format!("{SEARCH_RESOURCE_PREFIX}{{item}}"),
                name: "product-search".to_string(),
                title: None,
                description: Some("Search the vendor catalog for an item".to_string()),
                mime_type: Some("application/json".to_string()),
            }
            .no_annotation()],
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParam { uri }: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let Some(raw_item) = uri.strip_prefix(SEARCH_RESOURCE_PREFIX) else {
            return Err(McpError::resource_not_found(
                "unknown resource",
                Some(json!({ "uri": uri })),
            ));
        };
        let item = urlencoding::decode(raw_item)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| raw_item.to_string());

        let products = self.provider.search(&item).await.map_err(vendor_error)?;
        let text = serde_json::to_string_pretty(&json!({ "products": products }))
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(ReadResourceResult { contents: vec![ResourceContents::text(text, uri)] })
    }
}

fn json_result(payload: &Value) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(payload)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// Render a mutation result. REST vendors report the authoritative cart;
/// browser vendors report per-item outcomes, including partial failures.
fn cart_update_result(update: CartUpdate) -> Result<CallToolResult, McpError> {
    match update {
        CartUpdate::Cart(cart) => json_result(&json!({ "cart": cart.to_items() })),
        CartUpdate::Outcomes(outcomes) => json_result(&json!({ "items": outcomes })),
    }
}

fn vendor_error(error: VendorError) -> McpError {
    match &error {
        VendorError::InvalidQuantity(_) => McpError::invalid_params(error.to_string(), None),
        VendorError::Transport { status, .. } => {
            McpError::internal_error(error.to_string(), Some(json!({ "status": status })))
        }
        _ => McpError::internal_error(error.to_string(), None),
    }
}
