//! Value objects shared across the storefront domain.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::StoreError;

/// Order identifier, `ORD-` followed by a UUIDv7.
///
/// Time-ordered and collision-proof, unlike a bare creation timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new() -> Self {
        Self(format!("ORD-{}", Uuid::now_v7().simple()))
    }

    pub fn parse(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        if !value.starts_with("ORD-") || value.len() <= 4 {
            return Err(StoreError::Validation(format!("invalid order id: {value}")));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payment-request identifier, `PAY-` followed by a UUIDv7.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new() -> Self {
        Self(format!("PAY-{}", Uuid::now_v7().simple()))
    }

    pub fn parse(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        if !value.starts_with("PAY-") || value.len() <= 4 {
            return Err(StoreError::Validation(format!("invalid payment id: {value}")));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized email address: trimmed, lower-cased, format-checked.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into().trim().to_lowercase();
        if !validator::validate_email(&value) {
            return Err(StoreError::Validation(format!(
                "invalid email address: {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
