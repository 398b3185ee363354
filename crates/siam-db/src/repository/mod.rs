//! # Repository Module
//!
//! Coordinators and repositories for Siam POS.
//!
//! ## Who Writes What
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SaleCoordinator ──┬──► cash_sales, sale_items, sale_reversals         │
//! │                    └──► InventoryLedger ──► products.stock_quantity    │
//! │                                             stock_movements            │
//! │                                                                         │
//! │  ContractManager ─────► hire_purchase_contracts, contract_items,       │
//! │                         installments                                    │
//! │                                                                         │
//! │  LedgerAggregator ────► ledger_entries (manual + contra)               │
//! │                         reads everything above for summaries           │
//! │                                                                         │
//! │  ProductRepository / CustomerRepository ──► catalog records            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every multi-record write is a single SQL transaction. Dropping the
//! transaction on an error path is the rollback.
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Product CRUD, low stock
//! - [`CustomerRepository`](customer::CustomerRepository) - Customer CRUD
//! - [`InventoryLedger`](inventory::InventoryLedger) - Stock CAS and movements
//! - [`SaleCoordinator`](sale::SaleCoordinator) - Atomic cash sales, reversals
//! - [`ContractManager`](contract::ContractManager) - Hire-purchase lifecycle
//! - [`LedgerAggregator`](ledger::LedgerAggregator) - Accounting summary

pub mod contract;
pub mod customer;
pub mod inventory;
pub mod ledger;
pub mod product;
pub mod sale;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use siam_core::CoreError;
use tracing::warn;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Generates a new record ID.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Six uppercase hex characters for human-facing numbers.
fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_uppercase()
}

/// Receipt number in format `PREFIX-YYYYMMDD-HHMMSS-XXXXXX`.
///
/// ## Example
/// `RCP-20260501-101500-3F9A1C`
pub(crate) fn generate_receipt_number(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}-{}", prefix, at.format("%Y%m%d-%H%M%S"), random_suffix())
}

/// Contract number in format `PREFIX-YYYYMMDD-XXXXXX`.
pub(crate) fn generate_contract_number(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}-{}", prefix, at.format("%Y%m%d"), random_suffix())
}

/// Runs a whole commit, retrying while SQLite reports the database busy.
///
/// ```text
/// attempt 1 ── Busy ──► sleep 20ms ──► attempt 2 ── Busy ──► ... ──► Contention
///     │                                    │
///     └── Ok / other error: returned as is ┘
/// ```
///
/// Each attempt must open its own transaction so a failed attempt leaves
/// nothing behind.
pub(crate) async fn with_busy_retry<T, F, Fut>(
    resource: &str,
    max_attempts: u32,
    mut attempt: F,
) -> DbResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut n = 1;
    loop {
        match attempt(n).await {
            Err(err) if err.is_busy() => {
                if n >= max_attempts {
                    warn!(resource, attempts = n, "Giving up on busy database");
                    return Err(DbError::Domain(CoreError::Contention {
                        resource: resource.to_string(),
                        attempts: n,
                    }));
                }
                warn!(resource, attempt = n, error = %err, "Database busy, retrying commit");
                tokio::time::sleep(Duration::from_millis(20 * n as u64)).await;
                n += 1;
            }
            other => return other,
        }
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_number_formats() {
        let at = DateTime::parse_from_rfc3339("2026-05-01T10:15:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let receipt = generate_receipt_number("RCP", at);
        assert!(receipt.starts_with("RCP-20260501-101500-"));
        assert_eq!(receipt.len(), "RCP-20260501-101500-".len() + 6);

        let contract = generate_contract_number("HP", at);
        assert!(contract.starts_with("HP-20260501-"));
        assert_ne!(generate_contract_number("HP", at), contract);
    }

    #[tokio::test]
    async fn test_busy_retry_gives_up_with_contention() {
        let calls = AtomicU32::new(0);
        let result: DbResult<()> = with_busy_retry("stock", 3, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbError::Busy("database is locked".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            result,
            Err(DbError::Domain(CoreError::Contention { attempts: 3, .. }))
        ));
    }

    #[tokio::test]
    async fn test_busy_retry_passes_other_errors_through() {
        let result: DbResult<i32> = with_busy_retry("stock", 3, |n| async move {
            if n == 1 {
                Err(DbError::Busy("locked".into()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);

        let result: DbResult<()> =
            with_busy_retry("stock", 3, |_| async { Err(DbError::Domain(CoreError::EmptyCart)) })
                .await;
        assert!(matches!(result, Err(DbError::Domain(CoreError::EmptyCart))));
    }
}
