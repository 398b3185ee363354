//! # Financing Module
//!
//! Amortization schedules for hire-purchase contracts.
//!
//! ## Schedule Computation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  total ฿9,000  down ฿0  rate 15% p.a.  term 12                          │
//! │                                                                         │
//! │  loan L = total − down                    = 900000 satang               │
//! │  r      = bps / 10000 / 12                = 0.0125                      │
//! │  pay    = round(L·r·(1+r)^n / ((1+r)^n−1)) = 81232                      │
//! │                                                                         │
//! │  seq │ interest = round(rem·r) │ principal = pay − interest │ rem after │
//! │  ────┼─────────────────────────┼────────────────────────────┼────────── │
//! │    1 │   11250                 │   69982                    │  830018   │
//! │    2 │   10375                 │   70857                    │  759161   │
//! │   .. │                         │                            │           │
//! │   12 │    1003                 │   80236  ◄── = rem, so the │       0   │
//! │      │                         │        final line absorbs  │           │
//! │      │                         │        the rounding residue│           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The only floating point step is the annuity factor and the per-period
//! interest rounding; everything that is summed stays in integer satang, so
//! Σ principal equals the loan exactly.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::{MAX_AMOUNT_CENTS, MAX_TERM_MONTHS};

/// Highest accepted annual rate (100% p.a.).
pub const MAX_RATE_BPS: i64 = 10_000;

// =============================================================================
// Schedule Types
// =============================================================================

/// One period of a computed schedule, before it is persisted as an
/// [`Installment`](crate::types::Installment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ScheduleLine {
    pub seq: i64,
    #[ts(as = "String")]
    pub due_date: NaiveDate,
    pub amount_due: Money,
    pub principal: Money,
    pub interest: Money,
    /// Balance left after this period is paid.
    pub remaining: Money,
}

/// A full amortization schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Schedule {
    pub loan_amount: Money,
    pub monthly_payment: Money,
    pub lines: Vec<ScheduleLine>,
}

impl Schedule {
    pub fn total_interest(&self) -> Money {
        self.lines.iter().map(|l| l.interest).sum()
    }

    pub fn total_principal(&self) -> Money {
        self.lines.iter().map(|l| l.principal).sum()
    }

    /// What the customer pays over the term, excluding the down payment.
    pub fn total_payable(&self) -> Money {
        self.lines.iter().map(|l| l.amount_due).sum()
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Checks contract terms without computing anything.
///
/// Order matters for callers that surface the first problem: amounts, then
/// the down payment relation, then term, then rate.
pub fn validate_terms(
    total: Money,
    down_payment: Money,
    annual_rate_bps: i64,
    term_months: i64,
) -> CoreResult<()> {
    if total.is_negative() {
        return Err(CoreError::invalid_amount("total_amount", "must not be negative"));
    }
    if total.cents() > MAX_AMOUNT_CENTS {
        return Err(CoreError::invalid_amount(
            "total_amount",
            "exceeds the largest accepted amount",
        ));
    }
    if down_payment.is_negative() {
        return Err(CoreError::invalid_amount("down_payment", "must not be negative"));
    }
    if down_payment > total {
        return Err(CoreError::DownPaymentExceedsTotal {
            total,
            down_payment,
        });
    }
    if term_months <= 0 || term_months > MAX_TERM_MONTHS {
        return Err(CoreError::InvalidTerm(term_months));
    }
    if !(0..=MAX_RATE_BPS).contains(&annual_rate_bps) {
        return Err(CoreError::InvalidRate(annual_rate_bps));
    }
    Ok(())
}

// =============================================================================
// Computation
// =============================================================================

/// Converts an annual rate in basis points to a monthly fraction.
#[inline]
pub fn monthly_rate(annual_rate_bps: i64) -> f64 {
    annual_rate_bps as f64 / 10_000.0 / 12.0
}

/// Level monthly payment for a loan.
///
/// ## Example
/// ```rust
/// use siam_core::financing::monthly_payment;
/// use siam_core::money::Money;
///
/// assert_eq!(monthly_payment(Money::from_major(9000), 1500, 12).cents(), 81232);
/// assert_eq!(monthly_payment(Money::from_major(6000), 0, 6).cents(), 100000);
/// ```
pub fn monthly_payment(loan: Money, annual_rate_bps: i64, term_months: i64) -> Money {
    if term_months <= 0 || loan.is_zero() {
        return Money::zero();
    }
    if annual_rate_bps == 0 {
        return loan.split_evenly(term_months).0;
    }

    let r = monthly_rate(annual_rate_bps);
    let factor = (1.0 + r).powi(term_months as i32);
    loan.apply_rate(r * factor / (factor - 1.0))
}

/// Computes the amortization schedule for a contract.
///
/// ## Arguments
/// * `total` - Financed total (price of the goods)
/// * `down_payment` - Paid at signing, not financed
/// * `annual_rate_bps` - Annual rate in basis points (1500 = 15%)
/// * `term_months` - Number of monthly installments
/// * `contract_date` - Signing date; installment `i` is due `i` months later
///
/// ## Returns
/// * `Ok(Schedule)` - Lines whose principal sums to `total − down_payment`
/// * `Err(CoreError)` - Invalid amounts, term or rate
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use siam_core::financing::compute_schedule;
/// use siam_core::money::Money;
///
/// let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
/// let schedule = compute_schedule(Money::from_major(9000), Money::zero(), 1500, 12, date).unwrap();
/// assert_eq!(schedule.lines.len(), 12);
/// assert_eq!(schedule.total_principal(), Money::from_major(9000));
/// ```
pub fn compute_schedule(
    total: Money,
    down_payment: Money,
    annual_rate_bps: i64,
    term_months: i64,
    contract_date: NaiveDate,
) -> CoreResult<Schedule> {
    validate_terms(total, down_payment, annual_rate_bps, term_months)?;

    let loan = total - down_payment;
    let payment = monthly_payment(loan, annual_rate_bps, term_months);
    let r = monthly_rate(annual_rate_bps);

    let mut lines = Vec::with_capacity(term_months as usize);
    let mut remaining = loan;

    for seq in 1..=term_months {
        let due_date = contract_date
            .checked_add_months(Months::new(seq as u32))
            .ok_or(CoreError::InvalidTerm(term_months))?;

        let interest = if annual_rate_bps == 0 {
            Money::zero()
        } else {
            remaining.apply_rate(r)
        };

        let principal = if seq == term_months {
            remaining
        } else {
            (payment - interest).min(remaining)
        };

        remaining -= principal;
        lines.push(ScheduleLine {
            seq,
            due_date,
            amount_due: principal + interest,
            principal,
            interest,
            remaining,
        });
    }

    Ok(Schedule {
        loan_amount: loan,
        monthly_payment: payment,
        lines,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
