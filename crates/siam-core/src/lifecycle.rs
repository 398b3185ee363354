//! # Contract Lifecycle Rules
//!
//! Pure state rules for hire-purchase contracts. The database layer calls
//! these inside its transactions; nothing here reads a clock or a table.
//!
//! ## State Machine
//! ```text
//!                ┌──────────── classify ────────────┐
//!                ▼                                  │
//!   draft ──► active ◄──────────────────────────► overdue
//!                │ │                                │
//!   last payment │ └─ cancel (no payments) ─┐       │ last payment
//!                ▼                          ▼       ▼
//!            completed                  cancelled  completed
//! ```

use chrono::{Duration, NaiveDate};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{ContractStatus, FinancingContract, Installment, InstallmentStatus};
use crate::MAX_AMOUNT_CENTS;

// =============================================================================
// Classification
// =============================================================================

/// True when the installment is unpaid and past its due date plus grace.
pub fn is_overdue(installment: &Installment, as_of: NaiveDate, grace_days: i64) -> bool {
    installment.status != InstallmentStatus::Paid
        && installment.due_date + Duration::days(grace_days) < as_of
}

/// Classifies a live contract as active or overdue.
///
/// Terminal statuses are not this function's concern; callers skip
/// completed and cancelled contracts.
pub fn classify(installments: &[Installment], as_of: NaiveDate, grace_days: i64) -> ContractStatus {
    if installments
        .iter()
        .any(|i| is_overdue(i, as_of, grace_days))
    {
        ContractStatus::Overdue
    } else {
        ContractStatus::Active
    }
}

/// Sequence numbers of installments that should be marked late.
///
/// Already-late installments are excluded so a late fee is assessed once.
pub fn newly_late(installments: &[Installment], as_of: NaiveDate, grace_days: i64) -> Vec<i64> {
    installments
        .iter()
        .filter(|i| i.status == InstallmentStatus::Pending && is_overdue(i, as_of, grace_days))
        .map(|i| i.seq)
        .collect()
}

// =============================================================================
// Guards
// =============================================================================

fn ensure_live(contract: &FinancingContract) -> CoreResult<()> {
    match contract.status {
        ContractStatus::Completed => Err(CoreError::AlreadyCompleted(contract.id.clone())),
        ContractStatus::Cancelled => Err(CoreError::AlreadyCancelled(contract.id.clone())),
        _ => Ok(()),
    }
}

/// Terms may change only on a live contract with no money received.
pub fn ensure_editable(contract: &FinancingContract, installments: &[Installment]) -> CoreResult<()> {
    ensure_live(contract)?;
    if installments.iter().any(Installment::has_payment) {
        return Err(CoreError::EditAfterPayment(contract.id.clone()));
    }
    Ok(())
}

/// Cancellation follows the same rule as editing.
pub fn ensure_cancellable(
    contract: &FinancingContract,
    installments: &[Installment],
) -> CoreResult<()> {
    ensure_editable(contract, installments)
}

/// Result of checking a payment against an installment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentOutcome {
    /// Cumulative paid amount after this payment.
    pub paid_amount: Money,
    /// Whether this payment settles the installment.
    pub settles: bool,
}

/// Validates a payment and computes its effect.
///
/// ## Rules
/// - Contract must not be completed or cancelled
/// - Installment must not already be paid → `DuplicatePayment`
/// - Amount must be positive → `InvalidAmount`
/// - Amount above the balance due needs `allow_overpayment` → `InvalidAmount`
pub fn check_payment(
    contract: &FinancingContract,
    installment: &Installment,
    amount: Money,
    allow_overpayment: bool,
) -> CoreResult<PaymentOutcome> {
    ensure_live(contract)?;

    if installment.is_fully_paid() {
        return Err(CoreError::DuplicatePayment {
            contract_id: contract.id.clone(),
            seq: installment.seq,
        });
    }
    if !amount.is_positive() {
        return Err(CoreError::invalid_amount("amount", "must be greater than zero"));
    }
    if amount.cents() > MAX_AMOUNT_CENTS {
        return Err(CoreError::invalid_amount("amount", "exceeds the largest accepted amount"));
    }

    let balance = installment.balance_due();
    if amount > balance && !allow_overpayment {
        return Err(CoreError::invalid_amount(
            "amount",
            format!("{} exceeds balance due {}", amount, balance),
        ));
    }

    let paid_amount = Money::from_cents(installment.paid_amount_cents) + amount;
    Ok(PaymentOutcome {
        paid_amount,
        settles: paid_amount >= installment.total_due(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn contract(status: ContractStatus) -> FinancingContract {
        let now = Utc::now();
        FinancingContract {
            id: "c-1".to_string(),
            contract_number: "HP-20260101-AAAAAA".to_string(),
            customer_id: "cust-1".to_string(),
            total_amount_cents: 600_000,
            down_payment_cents: 0,
            interest_rate_bps: 0,
            term_months: 6,
            monthly_payment_cents: 100_000,
            outstanding_balance_cents: 600_000,
            status,
            contract_date: date(2026, 1, 1),
            created_at: now,
            updated_at: now,
        }
    }

    fn installment(seq: i64, due: NaiveDate, paid: i64, status: InstallmentStatus) -> Installment {
        Installment {
            id: format!("i-{}", seq),
            contract_id: "c-1".to_string(),
            seq,
            due_date: due,
            amount_due_cents: 100_000,
            principal_cents: 100_000,
            interest_cents: 0,
            late_fee_cents: 0,
            paid_amount_cents: paid,
            paid_date: None,
            status,
        }
    }

    #[test]
    fn test_classify_respects_grace() {
        let due = date(2026, 2, 1);
        let items = vec![installment(1, due, 0, InstallmentStatus::Pending)];

        assert_eq!(classify(&items, date(2026, 2, 8), 7), ContractStatus::Active);
        assert_eq!(classify(&items, date(2026, 2, 9), 7), ContractStatus::Overdue);
        assert_eq!(classify(&items, date(2026, 2, 2), 0), ContractStatus::Overdue);
    }

    #[test]
    fn test_classify_ignores_paid() {
        let items = vec![installment(1, date(2026, 2, 1), 100_000, InstallmentStatus::Paid)];
        assert_eq!(classify(&items, date(2026, 6, 1), 7), ContractStatus::Active);
    }

    #[test]
    fn test_newly_late_skips_already_late() {
        let items = vec![
            installment(1, date(2026, 2, 1), 0, InstallmentStatus::Late),
            installment(2, date(2026, 3, 1), 0, InstallmentStatus::Pending),
            installment(3, date(2026, 4, 1), 0, InstallmentStatus::Pending),
        ];
        assert_eq!(newly_late(&items, date(2026, 3, 20), 7), vec![2]);
    }

    #[test]
    fn test_edit_blocked_after_payment() {
        let c = contract(ContractStatus::Active);
        let clean = vec![installment(1, date(2026, 2, 1), 0, InstallmentStatus::Pending)];
        assert!(ensure_editable(&c, &clean).is_ok());

        let partial = vec![installment(1, date(2026, 2, 1), 1, InstallmentStatus::Pending)];
        assert!(matches!(
            ensure_editable(&c, &partial),
            Err(CoreError::EditAfterPayment(_))
        ));
        assert!(matches!(
            ensure_cancellable(&contract(ContractStatus::Cancelled), &clean),
            Err(CoreError::AlreadyCancelled(_))
        ));
    }

    #[test]
    fn test_check_payment_rules() {
        let c = contract(ContractStatus::Active);
        let pending = installment(1, date(2026, 2, 1), 40_000, InstallmentStatus::Pending);

        let outcome = check_payment(&c, &pending, Money::from_cents(60_000), false).unwrap();
        assert!(outcome.settles);
        assert_eq!(outcome.paid_amount.cents(), 100_000);

        let outcome = check_payment(&c, &pending, Money::from_cents(10_000), false).unwrap();
        assert!(!outcome.settles);

        assert!(matches!(
            check_payment(&c, &pending, Money::from_cents(70_000), false),
            Err(CoreError::InvalidAmount { .. })
        ));
        assert!(check_payment(&c, &pending, Money::from_cents(70_000), true).is_ok());
        assert!(matches!(
            check_payment(&c, &pending, Money::zero(), false),
            Err(CoreError::InvalidAmount { .. })
        ));
        assert!(matches!(
            check_payment(&c, &pending, Money::from_cents(i64::MAX), true),
            Err(CoreError::InvalidAmount { .. })
        ));

        let paid = installment(1, date(2026, 2, 1), 100_000, InstallmentStatus::Paid);
        assert!(matches!(
            check_payment(&c, &paid, Money::from_cents(1), true),
            Err(CoreError::DuplicatePayment { seq: 1, .. })
        ));

        assert!(matches!(
            check_payment(&contract(ContractStatus::Completed), &pending, Money::from_cents(1), false),
            Err(CoreError::AlreadyCompleted(_))
        ));
    }
}
