//! Orders and fulfillment progression.
//!
//! Progression is pull-based: a driver loop polls the fulfillment
//! collaborator for every open order and advances the status machine with
//! the same transition rules the admin path uses. The ticket (including its
//! submit instant) is persisted with the order, so a restart resumes
//! progression instead of losing it the way one-shot timers would.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::domain::aggregates::cart::CartItem;
use crate::domain::aggregates::order::{FulfillmentTicket, Order, OrderStatus};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::OrderId;
use crate::storage::{keys, KvStore};
use crate::stores::{ledger, publish_event};
use crate::{Result, StoreError};

const ORDER_EVENT_SUBJECT: &str = "smm.events.order";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FulfillmentPhase {
    Received,
    InProgress,
    Delivered,
}

/// External fulfillment collaborator. The storefront never invents
/// progression on its own; it submits and then polls.
#[async_trait]
pub trait FulfillmentService: Send + Sync {
    async fn submit(&self, order: &Order) -> Result<FulfillmentTicket>;
    async fn poll(&self, ticket: &FulfillmentTicket) -> Result<FulfillmentPhase>;
}

/// Stand-in fulfillment that derives the phase from ticket age. Explicitly
/// simulated: no real delivery happens, but because the phase is a function
/// of the persisted submit instant it behaves identically across restarts.
pub struct SimulatedFulfillment {
    processing_after: Duration,
    completed_after: Duration,
}

impl Default for SimulatedFulfillment {
    fn default() -> Self {
        Self {
            processing_after: Duration::from_secs(2),
            completed_after: Duration::from_secs(32),
        }
    }
}

impl SimulatedFulfillment {
    pub fn new(processing_after: Duration, completed_after: Duration) -> Self {
        Self {
            processing_after,
            completed_after,
        }
    }
}

#[async_trait]
impl FulfillmentService for SimulatedFulfillment {
    async fn submit(&self, _order: &Order) -> Result<FulfillmentTicket> {
        Ok(FulfillmentTicket {
            reference: format!("SIM-{}", Uuid::now_v7().simple()),
            submitted_at: Utc::now(),
        })
    }

    async fn poll(&self, ticket: &FulfillmentTicket) -> Result<FulfillmentPhase> {
        let age = Utc::now()
            .signed_duration_since(ticket.submitted_at)
            .to_std()
            .unwrap_or_default();
        Ok(if age >= self.completed_after {
            FulfillmentPhase::Delivered
        } else if age >= self.processing_after {
            FulfillmentPhase::InProgress
        } else {
            FulfillmentPhase::Received
        })
    }
}

pub struct OrderStore {
    kv: Arc<KvStore>,
    fulfillment: Arc<dyn FulfillmentService>,
    events: Option<async_nats::Client>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl OrderStore {
    pub fn new(
        kv: Arc<KvStore>,
        fulfillment: Arc<dyn FulfillmentService>,
        events: Option<async_nats::Client>,
    ) -> Arc<Self> {
        Arc::new(Self {
            kv,
            fulfillment,
            events,
            driver: Mutex::new(None),
        })
    }

    /// Create an order from cart items, debiting the wallet in the same
    /// storage transaction that persists the order. The fulfillment submit
    /// happens first; a failed transaction leaves only an unused ticket
    /// behind, never a charged wallet without an order.
    pub async fn checkout(
        &self,
        user_id: Uuid,
        items: Vec<CartItem>,
        target_url: Option<String>,
    ) -> Result<Order> {
        let mut order = Order::create(user_id, items, target_url)?;
        order.ticket = Some(self.fulfillment.submit(&order).await?);

        self.kv.with(|txn| {
            ledger::debit_checked(txn, user_id, order.total_amount, order.id.clone())?;
            let mut orders: Vec<Order> = txn.get(keys::ORDERS)?.unwrap_or_default();
            orders.push(order.clone());
            txn.put(keys::ORDERS, &orders)
        })?;

        self.announce_created(&order);
        Ok(order)
    }

    /// Checkout a session cart. The debit, the order insert and the cart
    /// wipe share one storage transaction, and the cart is re-read and
    /// compared inside it, so two concurrent checkouts of the same session
    /// cannot both turn the same items into orders.
    pub async fn checkout_session(
        &self,
        user_id: Uuid,
        session: &str,
        target_url: Option<String>,
    ) -> Result<Order> {
        let cart_key = keys::cart(session);
        let items: Vec<CartItem> = self.kv.get(&cart_key)?.unwrap_or_default();
        let mut order = Order::create(user_id, items, target_url)?;
        order.ticket = Some(self.fulfillment.submit(&order).await?);

        self.kv.with(|txn| {
            let current: Vec<CartItem> = txn.get(&cart_key)?.unwrap_or_default();
            if current != order.items {
                return Err(StoreError::Conflict(
                    "cart changed during checkout".into(),
                ));
            }
            ledger::debit_checked(txn, user_id, order.total_amount, order.id.clone())?;
            let mut orders: Vec<Order> = txn.get(keys::ORDERS)?.unwrap_or_default();
            orders.push(order.clone());
            txn.put(keys::ORDERS, &orders)?;
            txn.remove(&cart_key);
            Ok(())
        })?;

        self.announce_created(&order);
        Ok(order)
    }

    fn announce_created(&self, order: &Order) {
        tracing::info!(order = %order.id, total = %order.total_amount, "order created");
        publish_event(
            &self.events,
            ORDER_EVENT_SUBJECT,
            &DomainEvent::Order(OrderEvent::Created {
                order_id: order.id.clone(),
                user_id: order.user_id,
                total: order.total_amount,
            }),
        );
    }

    pub fn get(&self, id: &OrderId) -> Result<Order> {
        self.all_orders()
            .into_iter()
            .find(|o| o.id == *id)
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))
    }

    pub fn user_orders(&self, user_id: Uuid) -> Vec<Order> {
        self.all_orders()
            .into_iter()
            .filter(|o| o.user_id == user_id)
            .collect()
    }

    pub fn all_orders(&self) -> Vec<Order> {
        match self.kv.get(keys::ORDERS) {
            Ok(Some(orders)) => orders,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "orders unreadable, treating as empty");
                Vec::new()
            }
        }
    }

    /// Admin override, bound by the same transition rules as progression.
    pub fn update_order_status(&self, id: &OrderId, status: OrderStatus) -> Result<Order> {
        let order = self.apply_transition(id, status)?;
        publish_event(
            &self.events,
            ORDER_EVENT_SUBJECT,
            &DomainEvent::Order(OrderEvent::StatusChanged {
                order_id: order.id.clone(),
                status: order.status,
            }),
        );
        Ok(order)
    }

    pub fn cancel_order(&self, id: &OrderId) -> Result<Order> {
        self.update_order_status(id, OrderStatus::Cancelled)
    }

    fn apply_transition(&self, id: &OrderId, status: OrderStatus) -> Result<Order> {
        self.kv.with(|txn| {
            let mut orders: Vec<Order> = txn.get(keys::ORDERS)?.unwrap_or_default();
            let order = orders
                .iter_mut()
                .find(|o| o.id == *id)
                .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;
            order.transition(status)?;
            let snapshot = order.clone();
            txn.put(keys::ORDERS, &orders)?;
            Ok(snapshot)
        })
    }

    /// One progression pass: poll fulfillment for every open order and step
    /// the status machine toward the reported phase.
    pub async fn tick(&self) -> Result<()> {
        let open: Vec<Order> = self
            .all_orders()
            .into_iter()
            .filter(|o| !o.status.is_terminal() && o.ticket.is_some())
            .collect();

        for order in open {
            let Some(ticket) = &order.ticket else {
                continue;
            };
            let phase = match self.fulfillment.poll(ticket).await {
                Ok(phase) => phase,
                Err(e) => {
                    tracing::warn!(order = %order.id, error = %e, "fulfillment poll failed");
                    continue;
                }
            };
            let desired = match phase {
                FulfillmentPhase::Received => OrderStatus::Pending,
                FulfillmentPhase::InProgress => OrderStatus::Processing,
                FulfillmentPhase::Delivered => OrderStatus::Completed,
            };
            // Step through intermediate states so a restart that lands past
            // the processing window still takes the pending→processing edge.
            loop {
                let current = self.get(&order.id)?;
                if current.status == desired || current.status.is_terminal() {
                    break;
                }
                let next = match current.status {
                    OrderStatus::Pending => OrderStatus::Processing,
                    OrderStatus::Processing => OrderStatus::Completed,
                    _ => break,
                };
                if !current.status.can_transition(next) {
                    break;
                }
                self.update_order_status(&order.id, next)?;
                tracing::info!(order = %order.id, status = ?next, "order progressed");
            }
        }
        Ok(())
    }

    /// Run progression until `stop_progression` (or drop of the runtime).
    pub fn run_progression(self: &Arc<Self>, interval: Duration) {
        let store = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = store.tick().await {
                    tracing::warn!(error = %e, "order progression pass failed");
                }
            }
        });
        let mut driver = self.driver.lock().expect("driver lock poisoned");
        if let Some(old) = driver.replace(handle) {
            old.abort();
        }
    }

    pub fn stop_progression(&self) {
        let mut driver = self.driver.lock().expect("driver lock poisoned");
        if let Some(handle) = driver.take() {
            handle.abort();
        }
    }
}

impl Drop for OrderStore {
    fn drop(&mut self) {
        self.stop_progression();
    }
}
