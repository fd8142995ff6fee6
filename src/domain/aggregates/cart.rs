//! Cart line items.
//!
//! The item id is derived from platform + service + quantity. Adding the same
//! tier twice is a duplicate; the same service at a different quantity is a
//! separate line item (distinct tiers stay distinct, never merged).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: String,
    pub platform: String,
    pub service_name: String,
    pub category: String,
    pub quantity: u32,
    pub price: Decimal,
    pub total_price: Decimal,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewCartItem {
    pub platform: String,
    pub service_name: String,
    pub category: String,
    pub quantity: u32,
    pub price: Decimal,
}

impl CartItem {
    pub fn new(item: NewCartItem) -> Self {
        let id = dedup_key(&item.platform, &item.service_name, item.quantity);
        Self {
            id,
            platform: item.platform,
            service_name: item.service_name,
            category: item.category,
            quantity: item.quantity,
            price: item.price,
            total_price: item.price,
        }
    }
}

/// Deterministic de-dup key, not a true identity.
pub fn dedup_key(platform: &str, service_name: &str, quantity: u32) -> String {
    format!("{platform}-{service_name}-{quantity}")
}

/// Sum of line totals.
pub fn cart_total(items: &[CartItem]) -> Decimal {
    items.iter().map(|i| i.total_price).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(platform: &str, service: &str, quantity: u32, price: i64) -> NewCartItem {
        NewCartItem {
            platform: platform.into(),
            service_name: service.into(),
            category: "Takipçi".into(),
            quantity,
            price: Decimal::new(price, 0),
        }
    }

    #[test]
    fn test_same_tier_same_key() {
        let a = CartItem::new(item("Instagram", "Takipçi", 100, 15));
        let b = CartItem::new(item("Instagram", "Takipçi", 100, 15));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_different_quantity_different_key() {
        let a = CartItem::new(item("Instagram", "Takipçi", 100, 15));
        let b = CartItem::new(item("Instagram", "Takipçi", 200, 25));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_cart_total_folds_line_totals() {
        let items = vec![
            CartItem::new(item("Instagram", "Takipçi", 100, 15)),
            CartItem::new(item("YouTube", "İzlenme", 1000, 15)),
        ];
        assert_eq!(cart_total(&items), Decimal::new(30, 0));
        assert_eq!(cart_total(&[]), Decimal::ZERO);
    }
}
