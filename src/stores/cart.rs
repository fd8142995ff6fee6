//! Session carts.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::aggregates::cart::{cart_total, CartItem, NewCartItem};
use crate::storage::{keys, KvStore};
use crate::{Result, StoreError};

pub struct CartStore {
    kv: Arc<KvStore>,
}

impl CartStore {
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    /// Current line items. An unreadable cart degrades to empty rather than
    /// blocking the storefront.
    pub fn items(&self, session: &str) -> Vec<CartItem> {
        match self.kv.get(&keys::cart(session)) {
            Ok(Some(items)) => items,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, session, "cart unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    /// Append a line item, refusing an exact duplicate of an existing tier.
    pub fn add_item(&self, session: &str, new: NewCartItem) -> Result<CartItem> {
        if new.quantity == 0 {
            return Err(StoreError::Validation("quantity must be positive".into()));
        }
        if new.price <= Decimal::ZERO {
            return Err(StoreError::Validation("price must be positive".into()));
        }
        let item = CartItem::new(new);
        self.kv.with(|txn| {
            let key = keys::cart(session);
            let mut items: Vec<CartItem> = txn.get(&key)?.unwrap_or_default();
            if items.iter().any(|existing| existing.id == item.id) {
                return Err(StoreError::Conflict("item is already in the cart".into()));
            }
            items.push(item.clone());
            txn.put(&key, &items)
        })?;
        Ok(item)
    }

    pub fn remove_item(&self, session: &str, id: &str) -> Result<()> {
        self.kv.with(|txn| {
            let key = keys::cart(session);
            let mut items: Vec<CartItem> = txn.get(&key)?.unwrap_or_default();
            let before = items.len();
            items.retain(|item| item.id != id);
            if items.len() == before {
                return Err(StoreError::NotFound(format!("cart item {id}")));
            }
            txn.put(&key, &items)
        })
    }

    pub fn clear(&self, session: &str) -> Result<()> {
        self.kv.remove(&keys::cart(session))
    }

    pub fn total(&self, session: &str) -> Decimal {
        cart_total(&self.items(session))
    }

    pub fn count(&self, session: &str) -> usize {
        self.items(session).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, CartStore) {
        let dir = tempfile::tempdir().unwrap();
        let kv = Arc::new(KvStore::open(dir.path()).unwrap());
        (dir, CartStore::new(kv))
    }

    fn takipci(quantity: u32, price: i64) -> NewCartItem {
        NewCartItem {
            platform: "Instagram".into(),
            service_name: "Takipçi".into(),
            category: "Takipçi".into(),
            quantity,
            price: Decimal::new(price, 0),
        }
    }

    #[test]
    fn test_duplicate_tier_is_one_line_item() {
        let (_dir, cart) = open();
        cart.add_item("s1", takipci(100, 15)).unwrap();
        let dup = cart.add_item("s1", takipci(100, 15));
        assert!(matches!(dup, Err(StoreError::Conflict(_))));
        assert_eq!(cart.count("s1"), 1);
    }

    #[test]
    fn test_other_quantity_is_second_line_item() {
        let (_dir, cart) = open();
        cart.add_item("s1", takipci(100, 15)).unwrap();
        cart.add_item("s1", takipci(200, 25)).unwrap();
        assert_eq!(cart.count("s1"), 2);
        assert_eq!(cart.total("s1"), Decimal::new(40, 0));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let (_dir, cart) = open();
        cart.add_item("s1", takipci(100, 15)).unwrap();
        assert_eq!(cart.count("s2"), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let (_dir, cart) = open();
        let item = cart.add_item("s1", takipci(100, 15)).unwrap();
        cart.add_item("s1", takipci(250, 35)).unwrap();

        cart.remove_item("s1", &item.id).unwrap();
        assert_eq!(cart.count("s1"), 1);
        assert!(cart.remove_item("s1", &item.id).is_err());

        cart.clear("s1").unwrap();
        assert_eq!(cart.count("s1"), 0);
        assert_eq!(cart.total("s1"), Decimal::ZERO);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let (_dir, cart) = open();
        assert!(matches!(
            cart.add_item("s1", takipci(0, 15)),
            Err(StoreError::Validation(_))
        ));
    }
}
