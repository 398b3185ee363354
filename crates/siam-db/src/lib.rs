//! # siam-db: Database Layer for Siam POS
//!
//! This crate provides database access for the Siam POS back office.
//! It uses SQLite for local storage with sqlx for async operations, and
//! owns every multi-record commit: cash sales, contract signing, payments.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Siam POS Data Flow                               │
//! │                                                                         │
//! │  Caller (POS screen, back office, seed binary)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     siam-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌─────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Coordinators   │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                 │   │  (embedded)  │  │   │
//! │  │   │               │    │ SaleCoordinator │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ ContractManager │   │ 001_initial  │  │   │
//! │  │   │ EngineConfig  │    │ InventoryLedger │   │              │  │   │
//! │  │   │               │    │ LedgerAggregator│   │              │  │   │
//! │  │   └───────────────┘    └─────────────────┘   └──────────────┘  │   │
//! │  │            ▲                    │                               │   │
//! │  │            │                    ▼                               │   │
//! │  │            │         siam-core (money, schedule, rules)         │   │
//! │  └────────────┼────────────────────────────────────────────────────┘   │
//! │               ▼                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`config`] - Business settings (grace period, late fee, retries)
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Coordinators and repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use siam_core::{CartLine, SaleRequest};
//! use siam_db::{Database, DbConfig, EngineConfig};
//!
//! let config = DbConfig::new("path/to/siam.db").engine(EngineConfig::from_env());
//! let db = Database::new(config).await?;
//!
//! let sale = db
//!     .sales()
//!     .submit_cash_sale(SaleRequest::cash(vec![CartLine::new(product_id, 2)]))
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::EngineConfig;
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::contract::ContractManager;
pub use repository::customer::CustomerRepository;
pub use repository::inventory::{InventoryLedger, ReservedLine};
pub use repository::ledger::LedgerAggregator;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleCoordinator;
