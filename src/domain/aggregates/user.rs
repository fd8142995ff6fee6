//! User Aggregate and the balance ledger.
//!
//! There is exactly one authoritative user record per id. The wallet balance
//! is not a stored field: it is the fold of the user's append-only ledger
//! entries, so no code path can mutate it directly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Email, OrderId, PaymentId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    User,
    Admin,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: Email,
    /// Argon2id PHC string. Never exposed through the API layer.
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Why a balance delta exists. Each reason ties the entry to the operation
/// that produced it, which doubles as an idempotency key for credits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LedgerReason {
    Credit { payment_id: PaymentId },
    Debit { order_id: OrderId },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub delta: Decimal,
    pub reason: LedgerReason,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn credit(user_id: Uuid, amount: Decimal, payment_id: PaymentId) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            delta: amount,
            reason: LedgerReason::Credit { payment_id },
            created_at: Utc::now(),
        }
    }

    pub fn debit(user_id: Uuid, amount: Decimal, order_id: OrderId) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            delta: -amount,
            reason: LedgerReason::Debit { order_id },
            created_at: Utc::now(),
        }
    }
}

/// Fold a user's deltas into the current balance.
pub fn balance_of(entries: &[LedgerEntry], user_id: Uuid) -> Decimal {
    entries
        .iter()
        .filter(|e| e.user_id == user_id)
        .map(|e| e.delta)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_is_ledger_fold() {
        let user = Uuid::now_v7();
        let other = Uuid::now_v7();
        let entries = vec![
            LedgerEntry::credit(user, Decimal::new(100, 0), PaymentId::new()),
            LedgerEntry::debit(user, Decimal::new(35, 0), OrderId::new()),
            LedgerEntry::credit(other, Decimal::new(500, 0), PaymentId::new()),
        ];
        assert_eq!(balance_of(&entries, user), Decimal::new(65, 0));
        assert_eq!(balance_of(&entries, other), Decimal::new(500, 0));
        assert_eq!(balance_of(&entries, Uuid::now_v7()), Decimal::ZERO);
    }
}
