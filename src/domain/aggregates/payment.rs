//! Payment Request Aggregate
//!
//! A top-up request leaves `pending` exactly once. The balance credit is
//! applied by the payment store in the same storage transaction as the
//! status change; this type only guards the transition itself.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::{Email, PaymentId};
use crate::{Result, StoreError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Papara,
    Bank,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: PaymentId,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: Email,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub admin_note: Option<String>,
}

impl PaymentRequest {
    pub fn create(
        user_id: Uuid,
        user_name: String,
        user_email: Email,
        amount: Decimal,
        payment_method: PaymentMethod,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            user_id,
            user_name,
            user_email,
            amount,
            payment_method,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
            approved_at: None,
            rejected_at: None,
            admin_note: None,
        }
    }

    fn require_pending(&self) -> Result<()> {
        if self.status != PaymentStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "payment request {} is already {:?}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    pub fn approve(&mut self, admin_note: Option<String>) -> Result<()> {
        self.require_pending()?;
        self.status = PaymentStatus::Approved;
        self.approved_at = Some(Utc::now());
        self.admin_note = admin_note;
        Ok(())
    }

    pub fn reject(&mut self, admin_note: Option<String>) -> Result<()> {
        self.require_pending()?;
        self.status = PaymentStatus::Rejected;
        self.rejected_at = Some(Utc::now());
        self.admin_note = admin_note;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PaymentRequest {
        PaymentRequest::create(
            Uuid::now_v7(),
            "Ayşe Yılmaz".into(),
            Email::parse("ayse@example.com").unwrap(),
            Decimal::new(100, 0),
            PaymentMethod::Bank,
        )
    }

    #[test]
    fn test_approve_once() {
        let mut req = request();
        req.approve(Some("ok".into())).unwrap();
        assert_eq!(req.status, PaymentStatus::Approved);
        assert!(req.approved_at.is_some());
        assert!(matches!(
            req.approve(Some("again".into())),
            Err(StoreError::Conflict(_))
        ));
    }

    #[test]
    fn test_no_approve_after_reject() {
        let mut req = request();
        req.reject(None).unwrap();
        assert!(req.approve(None).is_err());
        assert!(req.rejected_at.is_some());
        assert!(req.approved_at.is_none());
    }
}
