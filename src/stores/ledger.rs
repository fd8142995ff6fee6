//! Transaction-scoped helpers over the append-only balance ledger.
//!
//! All money movement funnels through these two writers, always inside a
//! caller-owned storage transaction so the balance check, the ledger append
//! and whatever status change motivated them commit or roll back together.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::aggregates::user::{balance_of, LedgerEntry, LedgerReason};
use crate::domain::value_objects::{OrderId, PaymentId};
use crate::storage::{keys, KvTxn};
use crate::{Result, StoreError};

pub(crate) fn entries(txn: &KvTxn<'_>) -> Result<Vec<LedgerEntry>> {
    Ok(txn.get(keys::LEDGER)?.unwrap_or_default())
}

pub(crate) fn balance(txn: &KvTxn<'_>, user_id: Uuid) -> Result<Decimal> {
    Ok(balance_of(&entries(txn)?, user_id))
}

/// Credit `amount` against a payment request. Appending a second credit for
/// the same payment id is refused; this backs up the status CAS as the
/// second idempotency guard.
pub(crate) fn credit(
    txn: &mut KvTxn<'_>,
    user_id: Uuid,
    amount: Decimal,
    payment_id: PaymentId,
) -> Result<()> {
    let mut all = entries(txn)?;
    let duplicate = all.iter().any(|e| match &e.reason {
        LedgerReason::Credit { payment_id: existing } => *existing == payment_id,
        LedgerReason::Debit { .. } => false,
    });
    if duplicate {
        return Err(StoreError::Conflict(format!(
            "payment {payment_id} was already credited"
        )));
    }
    all.push(LedgerEntry::credit(user_id, amount, payment_id));
    txn.put(keys::LEDGER, &all)
}

/// Debit `amount` for an order, refusing to take the balance negative.
pub(crate) fn debit_checked(
    txn: &mut KvTxn<'_>,
    user_id: Uuid,
    amount: Decimal,
    order_id: OrderId,
) -> Result<()> {
    let mut all = entries(txn)?;
    if balance_of(&all, user_id) < amount {
        return Err(StoreError::InsufficientBalance);
    }
    all.push(LedgerEntry::debit(user_id, amount, order_id));
    txn.put(keys::LEDGER, &all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KvStore;

    #[test]
    fn test_duplicate_credit_refused() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path()).unwrap();
        let user = Uuid::now_v7();
        let payment = PaymentId::new();

        kv.with(|txn| credit(txn, user, Decimal::new(100, 0), payment.clone()))
            .unwrap();
        let second = kv.with(|txn| credit(txn, user, Decimal::new(100, 0), payment.clone()));
        assert!(matches!(second, Err(StoreError::Conflict(_))));

        let balance = kv.with(|txn| balance(txn, user)).unwrap();
        assert_eq!(balance, Decimal::new(100, 0));
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path()).unwrap();
        let user = Uuid::now_v7();

        kv.with(|txn| credit(txn, user, Decimal::new(50, 0), PaymentId::new()))
            .unwrap();
        let over = kv.with(|txn| debit_checked(txn, user, Decimal::new(80, 0), OrderId::new()));
        assert!(matches!(over, Err(StoreError::InsufficientBalance)));

        let after_refusal = kv.with(|txn| balance(txn, user)).unwrap();
        assert_eq!(after_refusal, Decimal::new(50, 0));

        kv.with(|txn| debit_checked(txn, user, Decimal::new(50, 0), OrderId::new()))
            .unwrap();
        assert_eq!(kv.with(|txn| balance(txn, user)).unwrap(), Decimal::ZERO);
    }
}
