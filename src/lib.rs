//! SMM Storefront
//!
//! Self-hosted social-media-marketing storefront: catalog, cart, checkout,
//! wallet top-ups confirmed by manual bank/Papara transfer, and an admin
//! back office for payment approvals.
//!
//! ## Features
//! - Platform and service catalog with multi-context change notification
//! - Session carts with deterministic de-dup keys
//! - Orders driven by a pluggable fulfillment collaborator
//! - Wallet balances derived from an append-only ledger
//! - Exactly-once payment-request approval

use thiserror::Error;

pub mod api;
pub mod config;
pub mod contact;
pub mod domain;
pub mod storage;
pub mod stores;
pub mod sync;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("insufficient balance")]
    InsufficientBalance,

    // One indistinguishable error for every credential failure.
    #[error("invalid credentials")]
    Auth,
}

pub type Result<T> = std::result::Result<T, StoreError>;
