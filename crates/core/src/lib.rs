pub mod config;
pub mod domain;
pub mod errors;
pub mod reconcile;

pub use config::{AppConfig, BrowserConfig, ConfigError, LoadOptions, VendorKind};
pub use domain::cart::{Cart, CartItem, SellingMethod};
pub use domain::product::Product;
pub use errors::{AuthError, SessionError, VendorError};
pub use reconcile::{merge_items, reconcile, zero_items, CartTransport};
