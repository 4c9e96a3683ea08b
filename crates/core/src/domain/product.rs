use serde::{Deserialize, Serialize};

/// A normalized search result.
///
/// Every vendor exposes its own nested product JSON; providers flatten it
/// into this shape and nothing more. `quantity_evaluation` carries the
/// vendor's unit-size descriptor verbatim; it is flattened, never
/// interpreted or canonicalized across vendors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Option<f64>,
    pub quantity_evaluation: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selling_method: Option<String>,
}
