//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::cart::{cart_total, CartItem};
use crate::domain::value_objects::OrderId;
use crate::{Result, StoreError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Valid transitions: pending→processing, processing→completed,
    /// pending|processing→cancelled. Completed and cancelled are terminal.
    pub fn can_transition(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Processing, Completed) | (Pending, Cancelled) | (Processing, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

/// Handle returned by the fulfillment collaborator when an order is
/// submitted. Persisted with the order so progression survives a restart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentTicket {
    pub reference: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub target_url: Option<String>,
    pub ticket: Option<FulfillmentTicket>,
}

impl Order {
    pub fn create(user_id: Uuid, items: Vec<CartItem>, target_url: Option<String>) -> Result<Self> {
        if items.is_empty() {
            return Err(StoreError::Validation("order has no items".into()));
        }
        let total_amount = cart_total(&items);
        Ok(Self {
            id: OrderId::new(),
            user_id,
            items,
            total_amount,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            target_url,
            ticket: None,
        })
    }

    /// Move to `next`, rejecting anything outside the state machine.
    pub fn transition(&mut self, next: OrderStatus) -> Result<()> {
        if !self.status.can_transition(next) {
            return Err(StoreError::Conflict(format!(
                "order {} cannot move {:?} -> {:?}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        match next {
            OrderStatus::Completed => self.completed_at = Some(Utc::now()),
            // A cancelled order is no longer tracked by fulfillment.
            OrderStatus::Cancelled => self.ticket = None,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::NewCartItem;

    fn items() -> Vec<CartItem> {
        vec![CartItem::new(NewCartItem {
            platform: "Instagram".into(),
            service_name: "Takipçi".into(),
            category: "Takipçi".into(),
            quantity: 100,
            price: Decimal::new(15, 0),
        })]
    }

    #[test]
    fn test_empty_order_rejected() {
        assert!(Order::create(Uuid::now_v7(), vec![], None).is_err());
    }

    #[test]
    fn test_forward_progression() {
        let mut order = Order::create(Uuid::now_v7(), items(), None).unwrap();
        order.transition(OrderStatus::Processing).unwrap();
        order.transition(OrderStatus::Completed).unwrap();
        assert!(order.completed_at.is_some());
    }

    #[test]
    fn test_no_backward_transition() {
        let mut order = Order::create(Uuid::now_v7(), items(), None).unwrap();
        order.transition(OrderStatus::Processing).unwrap();
        order.transition(OrderStatus::Completed).unwrap();
        assert!(order.transition(OrderStatus::Pending).is_err());
        assert!(order.transition(OrderStatus::Processing).is_err());
    }

    #[test]
    fn test_cancel_only_before_completion() {
        let mut order = Order::create(Uuid::now_v7(), items(), None).unwrap();
        order.ticket = Some(FulfillmentTicket {
            reference: "tick".into(),
            submitted_at: Utc::now(),
        });
        order.transition(OrderStatus::Cancelled).unwrap();
        assert!(order.ticket.is_none());

        let mut done = Order::create(Uuid::now_v7(), items(), None).unwrap();
        done.transition(OrderStatus::Processing).unwrap();
        done.transition(OrderStatus::Completed).unwrap();
        assert!(done.transition(OrderStatus::Cancelled).is_err());
    }

    #[test]
    fn test_total_is_item_fold() {
        let order = Order::create(Uuid::now_v7(), items(), Some("https://instagram.com/x".into()))
            .unwrap();
        assert_eq!(order.total_amount, Decimal::new(15, 0));
    }
}
