//! # Domain Types
//!
//! Core domain records and command payloads used throughout Siam POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    CashSale     │   │ StockMovement   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  unit_price     │   │  receipt_number │   │  delta (signed) │       │
//! │  │  stock_quantity │◄──│  items[]        │──►│  reason         │       │
//! │  │  low_stock_...  │   │  total_cents    │   │  reference_id   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │FinancingContract│   │  Installment    │   │  LedgerEntry    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  total / down   │──►│  seq, due_date  │   │  income/expense │       │
//! │  │  rate_bps, term │   │  principal      │   │  category, date │       │
//! │  │  outstanding    │   │  paid_amount    │   │  amount_cents   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage Shape
//! Every persisted record keeps its money in `*_cents: i64` columns and
//! exposes `Money` accessors. With the `sqlx` feature the records derive
//! `FromRow` so siam-db can load them without row adapters.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product available for cash sale or hire purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Current selling price in the smallest currency unit.
    pub unit_price_cents: i64,

    /// Units on hand. Never negative.
    pub stock_quantity: i64,

    /// At or below this level the product shows up in low-stock reports.
    pub low_stock_threshold: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Checks if the product is at or below the given threshold, or its own
    /// threshold when none is given.
    pub fn is_low_stock(&self, threshold: Option<i64>) -> bool {
        self.stock_quantity <= threshold.unwrap_or(self.low_stock_threshold)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// A customer that can be attached to sales and must back every contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on an external terminal.
    Card,
    /// Bank transfer / QR payment.
    Transfer,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

// =============================================================================
// Cash Sale
// =============================================================================

/// A committed cash sale. Append-only once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashSale {
    pub id: String,
    pub customer_id: Option<String>,
    /// Unique human-facing number printed on the receipt.
    pub receipt_number: String,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    /// subtotal − discount + tax.
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    #[ts(as = "String")]
    pub sold_at: DateTime<Utc>,
    /// Line items, loaded separately from `sale_items`.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<SaleItem>,
}

impl CashSale {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line item in a cash sale.
///
/// The unit price is the product price at commit time (frozen).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// unit_price × quantity.
    pub line_total_cents: i64,
}

impl SaleItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

/// Record that a sale was cancelled by reversing its stock movements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleReversal {
    pub id: String,
    pub sale_id: String,
    pub reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Stock Movements
// =============================================================================

/// Why stock moved.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    Sale,
    Adjustment,
    Reversal,
}

/// What kind of record a movement points back to.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    CashSale,
    Manual,
    SaleReversal,
}

/// Immutable audit record of one signed stock change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub product_id: String,
    /// Negative for sales, positive for restock and reversals.
    pub delta: i64,
    pub reason: MovementReason,
    /// Id of the committing transaction (sale, reversal, manual adjustment).
    pub reference_id: String,
    pub reference_type: ReferenceType,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Financing Contracts
// =============================================================================

/// Hire-purchase contract status.
///
/// ```text
/// draft ──► active ──┬──► completed   (balance reaches zero)
///             ▲  │   ├──► overdue     (classification, reversible)
///             └──┘   └──► cancelled   (explicit, before any payment)
/// ```
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Active,
    Completed,
    Overdue,
    Cancelled,
}

impl ContractStatus {
    /// Completed and cancelled contracts accept no further changes.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, ContractStatus::Completed | ContractStatus::Cancelled)
    }
}

impl Default for ContractStatus {
    fn default() -> Self {
        ContractStatus::Draft
    }
}

/// A hire-purchase (installment) contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct FinancingContract {
    pub id: String,
    pub contract_number: String,
    pub customer_id: String,
    pub total_amount_cents: i64,
    pub down_payment_cents: i64,
    /// Annual interest rate in basis points (1500 = 15%).
    pub interest_rate_bps: i64,
    pub term_months: i64,
    pub monthly_payment_cents: i64,
    /// Principal still owed. Starts at total − down payment, never grows.
    pub outstanding_balance_cents: i64,
    pub status: ContractStatus,
    #[ts(as = "String")]
    pub contract_date: NaiveDate,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl FinancingContract {
    #[inline]
    pub fn total_amount(&self) -> Money {
        Money::from_cents(self.total_amount_cents)
    }

    #[inline]
    pub fn down_payment(&self) -> Money {
        Money::from_cents(self.down_payment_cents)
    }

    /// Amount financed.
    #[inline]
    pub fn loan_amount(&self) -> Money {
        self.total_amount() - self.down_payment()
    }

    #[inline]
    pub fn outstanding_balance(&self) -> Money {
        Money::from_cents(self.outstanding_balance_cents)
    }
}

/// A product line on a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ContractItem {
    pub id: String,
    pub contract_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

/// Installment status.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Paid,
    Late,
}

/// One period of a contract's amortization schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Installment {
    pub id: String,
    pub contract_id: String,
    /// 1-based period number.
    pub seq: i64,
    #[ts(as = "String")]
    pub due_date: NaiveDate,
    /// principal + interest for this period.
    pub amount_due_cents: i64,
    pub principal_cents: i64,
    pub interest_cents: i64,
    /// Charged once when the installment turns late.
    pub late_fee_cents: i64,
    pub paid_amount_cents: i64,
    #[ts(as = "Option<String>")]
    pub paid_date: Option<NaiveDate>,
    pub status: InstallmentStatus,
}

impl Installment {
    #[inline]
    pub fn principal(&self) -> Money {
        Money::from_cents(self.principal_cents)
    }

    /// Amount due including any late fee.
    #[inline]
    pub fn total_due(&self) -> Money {
        Money::from_cents(self.amount_due_cents + self.late_fee_cents)
    }

    /// What is still owed on this installment (never negative).
    pub fn balance_due(&self) -> Money {
        let rest = self.total_due() - Money::from_cents(self.paid_amount_cents);
        if rest.is_negative() {
            Money::zero()
        } else {
            rest
        }
    }

    #[inline]
    pub fn is_fully_paid(&self) -> bool {
        self.status == InstallmentStatus::Paid
    }

    #[inline]
    pub fn has_payment(&self) -> bool {
        self.paid_amount_cents > 0
    }
}

// =============================================================================
// Ledger
// =============================================================================

/// Income or expense.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Income,
    Expense,
}

/// Category of income derived from committed cash sales.
pub const CATEGORY_CASH_SALE: &str = "cash_sale";
/// Category of income recognized when a contract is signed.
pub const CATEGORY_HIRE_PURCHASE: &str = "hire_purchase";
/// Contra entry written when a sale is reversed.
pub const CATEGORY_SALE_REVERSAL: &str = "sale_reversal";
/// Contra entry written when a contract is cancelled.
pub const CATEGORY_CONTRACT_CANCELLATION: &str = "contract_cancellation";

/// An income or expense line used for summary reporting.
///
/// Manual and contra entries are persisted; sale and contract income is
/// derived on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerEntry {
    pub id: String,
    pub entry_type: EntryType,
    pub amount_cents: i64,
    pub category: String,
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    pub reference_id: Option<String>,
    pub description: Option<String>,
}

impl LedgerEntry {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Command Payloads
// =============================================================================
// The core keeps no caller-session state: carts and forms arrive whole.

/// One requested cart line. Price is taken from the product at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        CartLine {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Payload for `submit_cash_sale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRequest {
    pub lines: Vec<CartLine>,
    pub customer_id: Option<String>,
    pub payment_method: PaymentMethod,
    pub discount_cents: i64,
    pub tax_cents: i64,
}

impl SaleRequest {
    /// A plain cash sale with no discount or tax.
    pub fn cash(lines: Vec<CartLine>) -> Self {
        SaleRequest {
            lines,
            customer_id: None,
            payment_method: PaymentMethod::Cash,
            discount_cents: 0,
            tax_cents: 0,
        }
    }
}

/// Product line requested on a new contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ContractLine {
    pub product_id: String,
    pub quantity: i64,
    /// Agreed price; defaults to the product's current price.
    pub unit_price_cents: Option<i64>,
}

/// Payload for `create_contract`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewContract {
    pub customer_id: String,
    pub total_amount_cents: i64,
    pub down_payment_cents: i64,
    pub interest_rate_bps: i64,
    pub term_months: i64,
    /// Signing date; defaults to today.
    #[ts(as = "Option<String>")]
    pub contract_date: Option<NaiveDate>,
    pub items: Vec<ContractLine>,
}

/// Payload for `edit_contract`. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ContractEdit {
    pub customer_id: Option<String>,
    pub total_amount_cents: Option<i64>,
    pub down_payment_cents: Option<i64>,
    pub interest_rate_bps: Option<i64>,
    pub term_months: Option<i64>,
}

impl ContractEdit {
    /// True when the edit touches the financed terms.
    pub fn changes_terms(&self) -> bool {
        self.total_amount_cents.is_some()
            || self.down_payment_cents.is_some()
            || self.interest_rate_bps.is_some()
            || self.term_months.is_some()
    }
}

/// Payload for a manual ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewLedgerEntry {
    pub entry_type: EntryType,
    pub amount_cents: i64,
    pub category: String,
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    pub reference_id: Option<String>,
    pub description: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================
