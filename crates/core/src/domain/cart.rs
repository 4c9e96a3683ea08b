use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::VendorError;

/// How a vendor sells a product. Weighed produce needs a different
/// in-page add-to-cart call than unit goods.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SellingMethod {
    Unit,
    Weight,
}

/// A single item/quantity pair as supplied by the agent layer.
///
/// `id` is vendor-native and opaque; it is never transformed. `quantity`
/// stays a string end-to-end and is parsed to an integer only where a
/// vendor payload requires a numeric. Callers sometimes send bare JSON
/// numbers for either field, so both are coerced to strings on the way in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(deserialize_with = "coerce_to_string")]
    pub id: String,
    #[serde(deserialize_with = "coerce_to_string")]
    pub quantity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selling_method: Option<SellingMethod>,
}

impl CartItem {
    pub fn new(id: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self { id: id.into(), quantity: quantity.into(), selling_method: None }
    }

    pub fn with_selling_method(mut self, method: SellingMethod) -> Self {
        self.selling_method = Some(method);
        self
    }

    /// Parse the quantity to a non-negative integer.
    pub fn parsed_quantity(&self) -> Result<u32, VendorError> {
        self.quantity
            .trim()
            .parse::<u32>()
            .map_err(|_| VendorError::InvalidQuantity(self.quantity.clone()))
    }

    /// True when the item is marked for removal.
    pub fn is_zero(&self) -> bool {
        matches!(self.parsed_quantity(), Ok(0))
    }
}

/// A vendor cart as a mapping from item id to string quantity.
///
/// Produced by `read_cart`; lives only for the duration of a single
/// operation and is never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart(pub BTreeMap<String, String>);

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, id: impl Into<String>, quantity: impl Into<String>) {
        self.0.insert(id.into(), quantity.into());
    }

    pub fn remove(&mut self, id: &str) -> Option<String> {
        self.0.remove(id)
    }

    pub fn quantity(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Flatten into the item list shape the tool contract returns.
    pub fn to_items(&self) -> Vec<CartItem> {
        self.0.iter().map(|(id, quantity)| CartItem::new(id.clone(), quantity.clone())).collect()
    }
}

impl FromIterator<(String, String)> for Cart {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Accept either a JSON string or a bare number, yielding a string. Agent
/// frameworks are inconsistent about quoting ids and quantities.
pub fn coerce_to_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(serde_json::Number),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(value) => value,
        StringOrNumber::Number(value) => value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_id_and_quantity_are_coerced_to_strings() {
        let item: CartItem = serde_json::from_str(r#"{"id": 123456, "quantity": 2}"#).unwrap();
        assert_eq!(item.id, "123456");
        assert_eq!(item.quantity, "2");
        assert_eq!(item.selling_method, None);
    }

    #[test]
    fn selling_method_parses_lowercase_names() {
        let item: CartItem =
            serde_json::from_str(r#"{"id": "7", "quantity": "1", "selling_method": "weight"}"#)
                .unwrap();
        assert_eq!(item.selling_method, Some(SellingMethod::Weight));
    }

    #[test]
    fn quantity_must_be_a_non_negative_integer() {
        assert_eq!(CartItem::new("1", "3").parsed_quantity().unwrap(), 3);
        assert_eq!(CartItem::new("1", " 0 ").parsed_quantity().unwrap(), 0);
        assert!(CartItem::new("1", "-1").parsed_quantity().is_err());
        assert!(CartItem::new("1", "two").parsed_quantity().is_err());
    }

    #[test]
    fn cart_upsert_replaces_existing_quantity() {
        let mut cart = Cart::new();
        cart.upsert("a", "2");
        cart.upsert("a", "5");
        assert_eq!(cart.quantity("a"), Some("5"));
        assert_eq!(cart.len(), 1);
    }
}
