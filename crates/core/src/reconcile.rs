//! Vendor-agnostic cart reconciliation.
//!
//! Merges a desired set of item/quantity pairs into the cart a vendor
//! currently holds and issues one write with the full resulting line set.
//! A quantity of 0 marks an item for removal; how a zero is encoded on the
//! wire (delete flag vs. omission) is vendor policy inside `write_cart`,
//! not a concern here.

use async_trait::async_trait;

use crate::domain::cart::{Cart, CartItem};
use crate::errors::VendorError;

/// The two cart primitives a REST-backed vendor client must provide.
#[async_trait]
pub trait CartTransport: Send + Sync {
    /// Fetch the vendor's current cart state.
    async fn read_cart(&self) -> Result<Cart, VendorError>;

    /// Replace the vendor cart with `desired` in a single call. Every id in
    /// `desired` is carried, including unchanged lines; a quantity of 0 is
    /// encoded per vendor policy as a deletion.
    async fn write_cart(&self, desired: &Cart) -> Result<(), VendorError>;
}

/// Upsert `items` into a copy of `current`. Replaces quantities rather than
/// adding to them; an id absent from `current` is inserted, including ids
/// with quantity 0 (pruned later on the vendor's delete path).
pub fn merge_items(current: &Cart, items: &[CartItem]) -> Cart {
    let mut merged = current.clone();
    for item in items {
        merged.upsert(item.id.clone(), item.quantity.clone());
    }
    merged
}

/// Force every item's quantity to 0, turning an add list into a remove list.
pub fn zero_items(items: &[CartItem]) -> Vec<CartItem> {
    items
        .iter()
        .map(|item| CartItem {
            id: item.id.clone(),
            quantity: "0".to_string(),
            selling_method: item.selling_method,
        })
        .collect()
}

/// Read-merge-write, then re-read for the authoritative post-state.
pub async fn reconcile<T>(transport: &T, items: &[CartItem]) -> Result<Cart, VendorError>
where
    T: CartTransport + ?Sized,
{
    for item in items {
        item.parsed_quantity()?;
    }
    let current = transport.read_cart().await?;
    let merged = merge_items(&current, items);
    transport.write_cart(&merged).await?;
    transport.read_cart().await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// In-memory transport with vendor-like write semantics: zero-quantity
    /// lines are pruned on write.
    #[derive(Default)]
    struct FakeTransport {
        cart: Mutex<Cart>,
        reads: Mutex<u32>,
        writes: Mutex<u32>,
    }

    impl FakeTransport {
        fn with_cart(pairs: &[(&str, &str)]) -> Self {
            let cart = pairs.iter().map(|(id, q)| (id.to_string(), q.to_string())).collect();
            Self { cart: Mutex::new(cart), ..Self::default() }
        }
    }

    #[async_trait]
    impl CartTransport for FakeTransport {
        async fn read_cart(&self) -> Result<Cart, VendorError> {
            *self.reads.lock().unwrap() += 1;
            Ok(self.cart.lock().unwrap().clone())
        }

        async fn write_cart(&self, desired: &Cart) -> Result<(), VendorError> {
            *self.writes.lock().unwrap() += 1;
            let pruned: Cart = desired
                .iter()
                .filter(|(_, quantity)| quantity.as_str() != "0")
                .map(|(id, quantity)| (id.clone(), quantity.clone()))
                .collect();
            *self.cart.lock().unwrap() = pruned;
            Ok(())
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_not_additive() {
        let transport = FakeTransport::default();
        let items = vec![CartItem::new("a", "3")];

        let first = reconcile(&transport, &items).await.unwrap();
        assert_eq!(first.quantity("a"), Some("3"));

        let second = reconcile(&transport, &items).await.unwrap();
        assert_eq!(second.quantity("a"), Some("3"), "re-adding must replace, not increment");
    }

    #[tokio::test]
    async fn zero_quantity_removes_the_line() {
        let transport = FakeTransport::with_cart(&[("a", "2"), ("b", "1")]);

        let result = reconcile(&transport, &[CartItem::new("a", "0")]).await.unwrap();
        assert_eq!(result.quantity("a"), None);
        assert_eq!(result.quantity("b"), Some("1"));
    }

    #[tokio::test]
    async fn removing_an_absent_id_is_a_no_op() {
        let transport = FakeTransport::with_cart(&[("b", "1")]);

        let result = reconcile(&transport, &[CartItem::new("ghost", "0")]).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.quantity("b"), Some("1"));
    }

    #[tokio::test]
    async fn add_then_remove_scenario() {
        // {A:2} + add B:1 => {A:2, B:1}; then remove A => {B:1}
        let transport = FakeTransport::with_cart(&[("A", "2")]);

        let after_add = reconcile(&transport, &[CartItem::new("B", "1")]).await.unwrap();
        assert_eq!(after_add.quantity("A"), Some("2"));
        assert_eq!(after_add.quantity("B"), Some("1"));

        let removals = zero_items(&[CartItem::new("A", "2")]);
        let after_remove = reconcile(&transport, &removals).await.unwrap();
        assert_eq!(after_remove.quantity("A"), None);
        assert_eq!(after_remove.quantity("B"), Some("1"));
    }

    #[tokio::test]
    async fn write_carries_full_line_set() {
        let transport = FakeTransport::with_cart(&[("a", "2"), ("b", "1")]);

        reconcile(&transport, &[CartItem::new("c", "4")]).await.unwrap();

        let cart = transport.cart.lock().unwrap().clone();
        assert_eq!(cart.len(), 3, "unchanged lines must be carried through the write");
        assert_eq!(*transport.writes.lock().unwrap(), 1, "exactly one write per reconcile");
        assert_eq!(*transport.reads.lock().unwrap(), 2, "read before and after the write");
    }

    #[tokio::test]
    async fn invalid_quantity_fails_before_any_vendor_call() {
        let transport = FakeTransport::default();

        let err = reconcile(&transport, &[CartItem::new("a", "many")]).await.unwrap_err();
        assert!(matches!(err, VendorError::InvalidQuantity(_)));
        assert_eq!(*transport.reads.lock().unwrap(), 0);
        assert_eq!(*transport.writes.lock().unwrap(), 0);
    }

    #[test]
    fn zero_items_preserves_ids_and_selling_method() {
        let items =
            vec![CartItem::new("a", "2").with_selling_method(crate::SellingMethod::Weight)];
        let zeroed = zero_items(&items);
        assert_eq!(zeroed[0].quantity, "0");
        assert_eq!(zeroed[0].id, "a");
        assert_eq!(zeroed[0].selling_method, Some(crate::SellingMethod::Weight));
    }
}
