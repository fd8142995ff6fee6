//! Payment requests: manual top-up approval.
//!
//! Users request a top-up after sending money out of band (bank transfer or
//! Papara); an admin approves or rejects. Approval flips the request status
//! and credits the wallet ledger in one storage transaction, so a double
//! approve can neither double-credit nor half-apply.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::domain::aggregates::payment::{PaymentMethod, PaymentRequest, PaymentStatus};
use crate::domain::aggregates::user::User;
use crate::domain::events::{DomainEvent, PaymentEvent};
use crate::domain::value_objects::PaymentId;
use crate::storage::{keys, KvStore};
use crate::stores::{ledger, publish_event};
use crate::{Result, StoreError};

const PAYMENT_EVENT_SUBJECT: &str = "smm.events.payment";

pub struct PaymentStore {
    kv: Arc<KvStore>,
    events: Option<async_nats::Client>,
    min_topup: Decimal,
    max_topup: Decimal,
}

impl PaymentStore {
    pub fn new(
        kv: Arc<KvStore>,
        events: Option<async_nats::Client>,
        min_topup: Decimal,
        max_topup: Decimal,
    ) -> Self {
        Self {
            kv,
            events,
            min_topup,
            max_topup,
        }
    }

    pub fn create_request(
        &self,
        user: &User,
        amount: Decimal,
        method: PaymentMethod,
    ) -> Result<PaymentRequest> {
        if amount <= Decimal::ZERO {
            return Err(StoreError::Validation("amount must be positive".into()));
        }
        if amount < self.min_topup || amount > self.max_topup {
            return Err(StoreError::Validation(format!(
                "amount must be between {} and {}",
                self.min_topup, self.max_topup
            )));
        }

        let request = PaymentRequest::create(
            user.id,
            user.name.clone(),
            user.email.clone(),
            amount,
            method,
        );
        self.kv.with(|txn| {
            let mut all: Vec<PaymentRequest> = txn.get(keys::PAYMENT_REQUESTS)?.unwrap_or_default();
            all.push(request.clone());
            txn.put(keys::PAYMENT_REQUESTS, &all)
        })?;

        tracing::info!(
            payment = %request.id,
            amount = %amount,
            method = ?method,
            "top-up request created, awaiting manual approval"
        );
        publish_event(
            &self.events,
            PAYMENT_EVENT_SUBJECT,
            &DomainEvent::Payment(PaymentEvent::RequestCreated {
                payment_id: request.id.clone(),
                user_id: user.id,
                amount,
                method,
            }),
        );
        Ok(request)
    }

    /// Approve a pending request and credit the wallet. Idempotency is held
    /// twice: the pending-status check on the request, and the per-payment
    /// duplicate guard in the ledger. Both live in the same transaction.
    pub fn approve(&self, id: &PaymentId, admin_note: Option<String>) -> Result<PaymentRequest> {
        let approved = self.kv.with(|txn| {
            let mut all: Vec<PaymentRequest> = txn.get(keys::PAYMENT_REQUESTS)?.unwrap_or_default();
            let request = all
                .iter_mut()
                .find(|r| r.id == *id)
                .ok_or_else(|| StoreError::NotFound(format!("payment request {id}")))?;
            request.approve(admin_note)?;
            let snapshot = request.clone();
            ledger::credit(txn, snapshot.user_id, snapshot.amount, snapshot.id.clone())?;
            txn.put(keys::PAYMENT_REQUESTS, &all)?;
            Ok(snapshot)
        })?;

        tracing::info!(payment = %approved.id, amount = %approved.amount, "top-up approved");
        publish_event(
            &self.events,
            PAYMENT_EVENT_SUBJECT,
            &DomainEvent::Payment(PaymentEvent::Approved {
                payment_id: approved.id.clone(),
                amount: approved.amount,
            }),
        );
        Ok(approved)
    }

    pub fn reject(&self, id: &PaymentId, admin_note: Option<String>) -> Result<PaymentRequest> {
        let rejected = self.kv.with(|txn| {
            let mut all: Vec<PaymentRequest> = txn.get(keys::PAYMENT_REQUESTS)?.unwrap_or_default();
            let request = all
                .iter_mut()
                .find(|r| r.id == *id)
                .ok_or_else(|| StoreError::NotFound(format!("payment request {id}")))?;
            request.reject(admin_note)?;
            let snapshot = request.clone();
            txn.put(keys::PAYMENT_REQUESTS, &all)?;
            Ok(snapshot)
        })?;

        tracing::info!(payment = %rejected.id, "top-up rejected");
        publish_event(
            &self.events,
            PAYMENT_EVENT_SUBJECT,
            &DomainEvent::Payment(PaymentEvent::Rejected {
                payment_id: rejected.id.clone(),
            }),
        );
        Ok(rejected)
    }

    pub fn get(&self, id: &PaymentId) -> Result<PaymentRequest> {
        self.all_requests()
            .into_iter()
            .find(|r| r.id == *id)
            .ok_or_else(|| StoreError::NotFound(format!("payment request {id}")))
    }

    pub fn user_requests(&self, user_id: uuid::Uuid) -> Vec<PaymentRequest> {
        self.all_requests()
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect()
    }

    pub fn pending_requests(&self) -> Vec<PaymentRequest> {
        self.all_requests()
            .into_iter()
            .filter(|r| r.status == PaymentStatus::Pending)
            .collect()
    }

    pub fn all_requests(&self) -> Vec<PaymentRequest> {
        match self.kv.get(keys::PAYMENT_REQUESTS) {
            Ok(Some(all)) => all,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "payment requests unreadable, treating as empty");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::user::UserRole;
    use crate::domain::value_objects::Email;
    use chrono::Utc;
    use uuid::Uuid;

    fn user() -> User {
        User {
            id: Uuid::now_v7(),
            name: "Ayşe Yılmaz".into(),
            email: Email::parse("ayse@example.com").unwrap(),
            password_hash: String::new(),
            role: UserRole::User,
            created_at: Utc::now(),
            last_login: None,
            is_active: true,
        }
    }

    fn open() -> (tempfile::TempDir, Arc<KvStore>, PaymentStore) {
        let dir = tempfile::tempdir().unwrap();
        let kv = Arc::new(KvStore::open(dir.path()).unwrap());
        let store = PaymentStore::new(
            Arc::clone(&kv),
            None,
            Decimal::new(10, 0),
            Decimal::new(10_000, 0),
        );
        (dir, kv, store)
    }

    fn balance(kv: &Arc<KvStore>, user_id: Uuid) -> Decimal {
        kv.with(|txn| ledger::balance(txn, user_id)).unwrap()
    }

    #[test]
    fn test_approve_credits_exactly_once() {
        let (_dir, kv, store) = open();
        let u = user();

        let req = store
            .create_request(&u, Decimal::new(100, 0), PaymentMethod::Bank)
            .unwrap();
        assert_eq!(req.status, PaymentStatus::Pending);
        assert_eq!(balance(&kv, u.id), Decimal::ZERO);

        let approved = store.approve(&req.id, Some("dekont ok".into())).unwrap();
        assert_eq!(approved.status, PaymentStatus::Approved);
        assert_eq!(balance(&kv, u.id), Decimal::new(100, 0));

        let second = store.approve(&req.id, None);
        assert!(matches!(second, Err(StoreError::Conflict(_))));
        assert_eq!(balance(&kv, u.id), Decimal::new(100, 0));
    }

    #[test]
    fn test_reject_leaves_balance_untouched() {
        let (_dir, kv, store) = open();
        let u = user();

        let req = store
            .create_request(&u, Decimal::new(250, 0), PaymentMethod::Papara)
            .unwrap();
        let rejected = store.reject(&req.id, Some("dekont eksik".into())).unwrap();
        assert_eq!(rejected.status, PaymentStatus::Rejected);
        assert_eq!(balance(&kv, u.id), Decimal::ZERO);

        // A rejected request cannot be approved afterwards.
        assert!(store.approve(&req.id, None).is_err());
    }

    #[test]
    fn test_amount_bounds() {
        let (_dir, _kv, store) = open();
        let u = user();

        for bad in [Decimal::ZERO, Decimal::new(-5, 0), Decimal::new(5, 0), Decimal::new(50_000, 0)] {
            assert!(matches!(
                store.create_request(&u, bad, PaymentMethod::Bank),
                Err(StoreError::Validation(_))
            ));
        }
        assert!(store
            .create_request(&u, Decimal::new(10, 0), PaymentMethod::Bank)
            .is_ok());
    }

    #[test]
    fn test_pending_listing_for_admin() {
        let (_dir, _kv, store) = open();
        let u = user();

        let a = store
            .create_request(&u, Decimal::new(100, 0), PaymentMethod::Bank)
            .unwrap();
        let b = store
            .create_request(&u, Decimal::new(200, 0), PaymentMethod::Papara)
            .unwrap();
        store.approve(&a.id, None).unwrap();

        let pending = store.pending_requests();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
        assert_eq!(store.user_requests(u.id).len(), 2);
    }

    #[test]
    fn test_unknown_request_is_not_found() {
        let (_dir, _kv, store) = open();
        let missing = PaymentId::new();
        assert!(matches!(
            store.approve(&missing, None),
            Err(StoreError::NotFound(_))
        ));
    }
}
