//! Vendor providers: the uniform cart/search facade over each grocery
//! backend.
//!
//! Two vendors (Rami Levy, Keshet Teamim) expose JSON REST APIs and share
//! the reconciliation path in `basket_core::reconcile`. Shufersal has no
//! write API; its cart is mutated by driving the vendor's own in-page cart
//! code through the shared browser session.
//!
//! Vendor endpoints and in-page entry points are proprietary, unversioned
//! contracts. Everything here wraps them; nothing assumes forward
//! compatibility.

pub mod keshet;
pub mod provider;
pub mod rami_levy;
pub mod shufersal;

pub use keshet::KeshetProvider;
pub use provider::{CartUpdate, ItemOutcome, Provider};
pub use rami_levy::RamiLevyProvider;
pub use shufersal::ShufersalProvider;
