//! Domain events, published best-effort over NATS for back-office tooling.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{OrderStatus, PaymentMethod};
use crate::domain::value_objects::{OrderId, PaymentId};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Payment(PaymentEvent),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created {
        order_id: OrderId,
        user_id: Uuid,
        total: Decimal,
    },
    StatusChanged {
        order_id: OrderId,
        status: OrderStatus,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    RequestCreated {
        payment_id: PaymentId,
        user_id: Uuid,
        amount: Decimal,
        method: PaymentMethod,
    },
    Approved {
        payment_id: PaymentId,
        amount: Decimal,
    },
    Rejected {
        payment_id: PaymentId,
    },
}
