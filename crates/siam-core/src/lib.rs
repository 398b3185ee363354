//! # siam-core: Pure Business Logic for Siam POS
//!
//! This crate holds the rules of the Siam POS back office as pure functions
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Siam POS Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Presentation (outside this workspace)              │   │
//! │  │   Cash sale form ── Contract form ── Payments ── Accounting     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ command payloads                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                siam-db (Coordinators + SQLite)                  │   │
//! │  │   SaleCoordinator, ContractManager, InventoryLedger, Ledger     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                ★ siam-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌──────────┐ ┌────────┐ │   │
//! │  │   │  money  │ │  types  │ │financing │ │lifecycle │ │ ledger │ │   │
//! │  │   │  Money  │ │ records │ │ schedule │ │  rules   │ │ totals │ │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └──────────┘ └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records and command payloads
//! - [`money`] - Money type with integer arithmetic
//! - [`financing`] - Amortization schedules
//! - [`lifecycle`] - Contract state rules and payment checks
//! - [`ledger`] - Income/expense summation
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Input rules applied before any write
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::NaiveDate;
//! use siam_core::financing::compute_schedule;
//! use siam_core::Money;
//!
//! let signed = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
//! let schedule = compute_schedule(Money::from_major(9000), Money::zero(), 1500, 12, signed).unwrap();
//!
//! assert_eq!(schedule.monthly_payment.cents(), 81232);
//! assert_eq!(schedule.total_principal(), Money::from_major(9000));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod financing;
pub mod ledger;
pub mod lifecycle;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use ledger::{DateRange, LedgerFilter, LedgerSummary};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Low-stock level given to new products when none is supplied.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 10;

/// Maximum distinct products in a single sale.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of one product in a single sale.
///
/// Catches typos such as 1000 instead of 10 at the till.
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// Largest amount in cents accepted for any single price, adjustment,
/// payment or contract total (ten billion baht).
///
/// With this cap and [`MAX_ITEM_QUANTITY`] a line total times
/// [`MAX_CART_LINES`] stays far below `i64::MAX`.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000;

/// Longest accepted contract term (ten years).
pub const MAX_TERM_MONTHS: i64 = 120;
