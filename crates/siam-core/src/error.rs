//! # Error Types
//!
//! Domain-specific error types for siam-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  siam-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule failures, grouped by ErrorKind   │
//! │  └── ValidationError  - Field-level input failures                     │
//! │                                                                         │
//! │  siam-db errors (separate crate)                                       │
//! │  └── DbError          - Wraps CoreError + storage failures             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Kinds
//! | Kind       | Variants                                                  |
//! |------------|-----------------------------------------------------------|
//! | Validation | InvalidQuantity, InvalidAmount, InvalidTerm, InvalidRate, |
//! |            | DownPaymentExceedsTotal, EmptyCart, Validation            |
//! | Conflict   | InsufficientStock, Contention, DuplicatePayment           |
//! | NotFound   | Product/Contract/Customer/Installment/SaleNotFound        |
//! | State      | EditAfterPayment, AlreadyCompleted, AlreadyCancelled      |

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification used by callers to decide what to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input. Nothing was written.
    Validation,
    /// Lost a race for a shared record. Retrying may succeed.
    Conflict,
    /// A referenced record does not exist.
    NotFound,
    /// The record is in a state that forbids the operation.
    State,
}

impl ErrorKind {
    /// Only conflicts are worth retrying; state errors need a different action.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Conflict)
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    // ---------------------------------------------------------------- validation
    /// A line quantity or stock delta is zero or negative.
    #[error("Invalid quantity {quantity} for {field}")]
    InvalidQuantity { field: String, quantity: i64 },

    /// A monetary input is negative, zero where it must be positive, or
    /// would overpay.
    #[error("Invalid amount for {field}: {reason}")]
    InvalidAmount { field: String, reason: String },

    /// Contract term must be at least one month.
    #[error("Invalid term: {0} months")]
    InvalidTerm(i64),

    /// Interest rate must not be negative.
    #[error("Invalid interest rate: {0} bps")]
    InvalidRate(i64),

    /// Down payment larger than the financed total.
    #[error("Down payment {down_payment} exceeds total {total}")]
    DownPaymentExceedsTotal { total: Money, down_payment: Money },

    /// Sale submitted without any lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Field-level validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // ------------------------------------------------------------------ conflict
    /// Not enough stock at commit time.
    ///
    /// ## User Workflow
    /// ```text
    /// submit_cash_sale (qty: 5)
    ///      │
    ///      ▼
    /// guarded decrement: available=3
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, available: 3, requested: 5 }
    ///      │
    ///      ▼
    /// whole sale rolled back, UI shows "Only 3 left"
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Could not get exclusive access within the bounded retry budget.
    #[error("Contention on {resource} after {attempts} attempts")]
    Contention { resource: String, attempts: u32 },

    /// The installment is already fully paid.
    #[error("Installment {seq} of contract {contract_id} is already paid")]
    DuplicatePayment { contract_id: String, seq: i64 },

    // ----------------------------------------------------------------- not found
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Installment {seq} not found on contract {contract_id}")]
    InstallmentNotFound { contract_id: String, seq: i64 },

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    // --------------------------------------------------------------------- state
    /// Terms are frozen once any installment has money against it.
    #[error("Contract {0} has payments recorded and can no longer be edited")]
    EditAfterPayment(String),

    #[error("{0} is already completed")]
    AlreadyCompleted(String),

    #[error("{0} is already cancelled")]
    AlreadyCancelled(String),
}

impl CoreError {
    /// Returns the error's kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidQuantity { .. }
            | CoreError::InvalidAmount { .. }
            | CoreError::InvalidTerm(_)
            | CoreError::InvalidRate(_)
            | CoreError::DownPaymentExceedsTotal { .. }
            | CoreError::EmptyCart
            | CoreError::Validation(_) => ErrorKind::Validation,

            CoreError::InsufficientStock { .. }
            | CoreError::Contention { .. }
            | CoreError::DuplicatePayment { .. } => ErrorKind::Conflict,

            CoreError::ProductNotFound(_)
            | CoreError::ContractNotFound(_)
            | CoreError::CustomerNotFound(_)
            | CoreError::InstallmentNotFound { .. }
            | CoreError::SaleNotFound(_) => ErrorKind::NotFound,

            CoreError::EditAfterPayment(_)
            | CoreError::AlreadyCompleted(_)
            | CoreError::AlreadyCancelled(_) => ErrorKind::State,
        }
    }

    /// Shorthand for [`CoreError::InvalidAmount`].
    pub fn invalid_amount(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidAmount {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
