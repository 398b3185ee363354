//! # Ledger Aggregation
//!
//! Pure summation over ledger entries. siam-db gathers the entries (derived
//! sale and contract income plus persisted rows) and hands them here.
//!
//! ```text
//! cash_sales.total ─────────┐
//! contracts.total_amount ───┼──► Vec<LedgerEntry> ──► filter ──► LedgerSummary
//! ledger_entries (manual) ──┘                                    income / expenses
//!                                                                net / per-category
//! ```

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{EntryType, LedgerEntry};

// =============================================================================
// Date Range
// =============================================================================

/// Reporting window, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DateRange {
    #[ts(as = "String")]
    pub start: NaiveDate,
    #[ts(as = "String")]
    pub end: NaiveDate,
}

impl DateRange {
    /// Creates a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> CoreResult<Self> {
        if start > end {
            return Err(ValidationError::InvalidFormat {
                field: "date range".to_string(),
                reason: format!("start {} is after end {}", start, end),
            }
            .into());
        }
        Ok(DateRange { start, end })
    }

    /// A single-day window.
    pub fn day(date: NaiveDate) -> Self {
        DateRange {
            start: date,
            end: date,
        }
    }

    #[inline]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// ISO bounds for text comparison against stored dates.
    pub fn iso_bounds(&self) -> (String, String) {
        (
            self.start.format("%Y-%m-%d").to_string(),
            self.end.format("%Y-%m-%d").to_string(),
        )
    }
}

// =============================================================================
// Filter
// =============================================================================

/// Optional narrowing of a ledger query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerFilter {
    /// Keep only these categories. `None` keeps all.
    pub categories: Option<Vec<String>>,
    /// Keep only income or only expenses.
    pub entry_type: Option<EntryType>,
}

impl LedgerFilter {
    pub fn income_only() -> Self {
        LedgerFilter {
            categories: None,
            entry_type: Some(EntryType::Income),
        }
    }

    pub fn categories<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        LedgerFilter {
            categories: Some(categories.into_iter().map(Into::into).collect()),
            entry_type: None,
        }
    }

    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        if let Some(kind) = self.entry_type {
            if entry.entry_type != kind {
                return false;
            }
        }
        match &self.categories {
            Some(cats) => cats.iter().any(|c| c == &entry.category),
            None => true,
        }
    }
}

// =============================================================================
// Summary
// =============================================================================

/// Totals over a reporting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerSummary {
    pub range: DateRange,
    pub income: Money,
    pub expenses: Money,
    /// income − expenses.
    pub net: Money,
    /// Income per category.
    pub income_by_category: BTreeMap<String, Money>,
    /// Expenses per category. A name can appear in both maps only if
    /// entries were written around the ledger's category checks.
    pub expense_by_category: BTreeMap<String, Money>,
    pub entry_count: usize,
}

impl LedgerSummary {
    /// Sums entries that fall inside `range` and pass `filter`.
    ///
    /// ## Example
    /// ```rust
    /// use chrono::NaiveDate;
    /// use siam_core::ledger::{DateRange, LedgerFilter, LedgerSummary};
    ///
    /// let d = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
    /// let summary = LedgerSummary::from_entries(&[], DateRange::day(d), &LedgerFilter::default());
    /// assert!(summary.net.is_zero());
    /// ```
    pub fn from_entries(entries: &[LedgerEntry], range: DateRange, filter: &LedgerFilter) -> Self {
        let mut income = Money::zero();
        let mut expenses = Money::zero();
        let mut income_by_category: BTreeMap<String, Money> = BTreeMap::new();
        let mut expense_by_category: BTreeMap<String, Money> = BTreeMap::new();
        let mut entry_count = 0;

        for entry in entries
            .iter()
            .filter(|e| range.contains(e.entry_date) && filter.matches(e))
        {
            let (total, per_category) = match entry.entry_type {
                EntryType::Income => (&mut income, &mut income_by_category),
                EntryType::Expense => (&mut expenses, &mut expense_by_category),
            };
            *total += entry.amount();
            *per_category.entry(entry.category.clone()).or_default() += entry.amount();
            entry_count += 1;
        }

        LedgerSummary {
            range,
            income,
            expenses,
            net: income - expenses,
            income_by_category,
            expense_by_category,
            entry_count,
        }
    }
}

// =============================================================================
// Dashboard
// =============================================================================

/// A product ranked by quantity sold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TopProduct {
    pub product_id: String,
    pub name: String,
    pub quantity_sold: i64,
    pub revenue_cents: i64,
}

/// Headline counts for the reports page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DashboardStats {
    pub sale_count: i64,
    pub active_contract_count: i64,
    pub overdue_contract_count: i64,
    pub product_count: i64,
    pub customer_count: i64,
    pub low_stock_count: i64,
    pub top_products: Vec<TopProduct>,
    pub summary: LedgerSummary,
}

// =============================================================================
// Unit Tests
// =============================================================================
