//! # Contract Manager
//!
//! Persistence and lifecycle of hire-purchase contracts.
//!
//! ## Lifecycle
//! ```text
//! create_contract ──► active ──┬── apply_installment_payment ──► completed
//!                       ▲  │   │        (balance reaches zero)
//!        refresh_status │  ▼   │
//!                     overdue  └── cancel_contract ──► cancelled
//!                                   (only before any payment)
//! ```
//!
//! The schedule itself comes from [`siam_core::financing::compute_schedule`];
//! the guard rules from [`siam_core::lifecycle`]. This module turns both into
//! guarded SQL so two callers racing on the same contract cannot both win.
//!
//! Contract items describe the goods. They do not move stock.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use siam_core::financing::{compute_schedule, Schedule};
use siam_core::lifecycle::{check_payment, classify, ensure_cancellable, ensure_editable, newly_late};
use siam_core::validation::{validate_non_negative, validate_quantity};
use siam_core::{
    ContractEdit, ContractItem, ContractStatus, CoreError, EntryType, FinancingContract,
    Installment, InstallmentStatus, LedgerEntry, Money, NewContract, CATEGORY_CONTRACT_CANCELLATION,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use super::customer::ensure_customer_exists;
use super::ledger::insert_entry;
use super::{generate_contract_number, generate_id, with_busy_retry};
use crate::config::EngineConfig;
use crate::error::{DbError, DbResult};

const CONTRACT_COLUMNS: &str = r#"
    id, contract_number, customer_id, total_amount_cents, down_payment_cents,
    interest_rate_bps, term_months, monthly_payment_cents, outstanding_balance_cents,
    status, contract_date, created_at, updated_at
"#;

const INSTALLMENT_COLUMNS: &str = r#"
    id, contract_id, seq, due_date, amount_due_cents, principal_cents,
    interest_cents, late_fee_cents, paid_amount_cents, paid_date, status
"#;

const ITEM_COLUMNS: &str =
    "id, contract_id, product_id, quantity, unit_price_cents, line_total_cents";

/// Attempts at a unique contract number within one commit.
const CONTRACT_NUMBER_ATTEMPTS: u32 = 2;

/// Manager for hire-purchase contracts. Sole writer of contracts,
/// contract items and installments.
#[derive(Debug, Clone)]
pub struct ContractManager {
    pool: SqlitePool,
    engine: Arc<EngineConfig>,
}

impl ContractManager {
    /// Creates a new ContractManager.
    pub fn new(pool: SqlitePool, engine: Arc<EngineConfig>) -> Self {
        ContractManager { pool, engine }
    }

    // =========================================================================
    // Creation and Edits
    // =========================================================================

    /// Signs a new contract.
    ///
    /// ## What This Does
    /// 1. Validates terms, items and the customer (no writes)
    /// 2. Computes the amortization schedule
    /// 3. Inserts contract, items and installments in one transaction
    ///
    /// A contract whose down payment covers the total has nothing to finance:
    /// it is stored as `completed` with no installments.
    ///
    /// ## Returns
    /// * `Ok(FinancingContract)` - The signed contract
    /// * `Err(InvalidAmount | DownPaymentExceedsTotal | InvalidTerm | InvalidRate)`
    /// * `Err(CustomerNotFound | ProductNotFound)`
    pub async fn create_contract(&self, new: NewContract) -> DbResult<FinancingContract> {
        let contract_date = new.contract_date.unwrap_or_else(|| Utc::now().date_naive());

        let schedule = compute_schedule(
            Money::from_cents(new.total_amount_cents),
            Money::from_cents(new.down_payment_cents),
            new.interest_rate_bps,
            new.term_months,
            contract_date,
        )?;

        for line in &new.items {
            validate_quantity("quantity", line.quantity)?;
            if let Some(price) = line.unit_price_cents {
                validate_non_negative("unit_price", price)?;
            }
        }
        ensure_customer_exists(&self.pool, &new.customer_id).await?;

        let contract_id = generate_id();
        let items = self.resolve_items(&contract_id, &new).await?;

        let now = Utc::now();
        let loan = schedule.loan_amount;
        let contract = FinancingContract {
            id: contract_id,
            contract_number: String::new(),
            customer_id: new.customer_id.clone(),
            total_amount_cents: new.total_amount_cents,
            down_payment_cents: new.down_payment_cents,
            interest_rate_bps: new.interest_rate_bps,
            term_months: new.term_months,
            monthly_payment_cents: schedule.monthly_payment.cents(),
            outstanding_balance_cents: loan.cents(),
            status: if loan.is_zero() {
                ContractStatus::Completed
            } else {
                ContractStatus::Active
            },
            contract_date,
            created_at: now,
            updated_at: now,
        };
        let installments = installments_from(&contract.id, &schedule);

        debug!(
            id = %contract.id,
            loan_cents = loan.cents(),
            term_months = contract.term_months,
            "Creating contract"
        );

        let (contract, items, installments) = (&contract, &items, &installments);
        let created = with_busy_retry("contract", self.engine.max_commit_attempts, |_| {
            self.try_create(contract.clone(), items, installments)
        })
        .await?;

        info!(
            id = %created.id,
            contract_number = %created.contract_number,
            monthly_payment_cents = created.monthly_payment_cents,
            "Contract signed"
        );
        Ok(created)
    }

    /// Turns requested lines into priced items. Missing prices come from
    /// the product's current price.
    async fn resolve_items(
        &self,
        contract_id: &str,
        new: &NewContract,
    ) -> DbResult<Vec<ContractItem>> {
        let mut items = Vec::with_capacity(new.items.len());
        for line in &new.items {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT unit_price_cents FROM products WHERE id = ?1")
                    .bind(&line.product_id)
                    .fetch_optional(&self.pool)
                    .await?;
            let current = current
                .ok_or_else(|| DbError::Domain(CoreError::ProductNotFound(line.product_id.clone())))?;

            let unit_price_cents = line.unit_price_cents.unwrap_or(current);
            let line_total_cents = unit_price_cents
                .checked_mul(line.quantity)
                .ok_or_else(|| CoreError::invalid_amount("line_total", "amount out of range"))?;
            items.push(ContractItem {
                id: generate_id(),
                contract_id: contract_id.to_string(),
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                unit_price_cents,
                line_total_cents,
            });
        }
        Ok(items)
    }

    async fn try_create(
        &self,
        mut contract: FinancingContract,
        items: &[ContractItem],
        installments: &[Installment],
    ) -> DbResult<FinancingContract> {
        let mut tx = self.pool.begin().await?;

        let (prefix, created_at) = (&self.engine.contract_prefix, contract.created_at);
        insert_header(&mut tx, &mut contract, || generate_contract_number(prefix, created_at))
            .await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO contract_items (
                    id, contract_id, product_id, quantity, unit_price_cents, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&item.id)
            .bind(&item.contract_id)
            .bind(&item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.line_total_cents)
            .execute(&mut *tx)
            .await?;
        }
        insert_installments(&mut tx, installments).await?;

        tx.commit().await?;
        Ok(contract)
    }

    /// Changes the customer or the financed terms of a contract.
    ///
    /// Allowed only while no installment has received money. Term changes
    /// recompute the schedule from the original contract date and replace
    /// every installment.
    ///
    /// ## Returns
    /// * `Ok(FinancingContract)` - The contract after the edit
    /// * `Err(EditAfterPayment)` - Some installment has a payment; nothing changed
    /// * `Err(AlreadyCompleted | AlreadyCancelled)` - Terminal contract
    pub async fn edit_contract(&self, id: &str, edit: ContractEdit) -> DbResult<FinancingContract> {
        let current = self.get_contract(id).await?;
        let installments = self.get_installments(id).await?;
        ensure_editable(&current, &installments)?;

        if let Some(customer_id) = &edit.customer_id {
            ensure_customer_exists(&self.pool, customer_id).await?;
        }

        let mut updated = current.clone();
        if let Some(customer_id) = &edit.customer_id {
            updated.customer_id = customer_id.clone();
        }
        updated.total_amount_cents = edit.total_amount_cents.unwrap_or(current.total_amount_cents);
        updated.down_payment_cents = edit.down_payment_cents.unwrap_or(current.down_payment_cents);
        updated.interest_rate_bps = edit.interest_rate_bps.unwrap_or(current.interest_rate_bps);
        updated.term_months = edit.term_months.unwrap_or(current.term_months);

        let schedule = if edit.changes_terms() {
            let schedule = compute_schedule(
                updated.total_amount(),
                updated.down_payment(),
                updated.interest_rate_bps,
                updated.term_months,
                updated.contract_date,
            )?;
            updated.monthly_payment_cents = schedule.monthly_payment.cents();
            updated.outstanding_balance_cents = schedule.loan_amount.cents();
            updated.status = if schedule.loan_amount.is_zero() {
                ContractStatus::Completed
            } else {
                ContractStatus::Active
            };
            Some(schedule)
        } else {
            None
        };
        updated.updated_at = Utc::now();

        let replacement = schedule.as_ref().map(|s| installments_from(id, s));
        let (updated, replacement) = (&updated, &replacement);
        let contract = with_busy_retry("contract", self.engine.max_commit_attempts, |_| {
            self.try_edit(updated, replacement.as_deref())
        })
        .await?;

        info!(id, terms_changed = replacement.is_some(), "Contract edited");
        Ok(contract)
    }

    async fn try_edit(
        &self,
        updated: &FinancingContract,
        replacement: Option<&[Installment]>,
    ) -> DbResult<FinancingContract> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE hire_purchase_contracts SET
                customer_id = ?2,
                total_amount_cents = ?3,
                down_payment_cents = ?4,
                interest_rate_bps = ?5,
                term_months = ?6,
                monthly_payment_cents = ?7,
                outstanding_balance_cents = ?8,
                status = ?9,
                updated_at = ?10
            WHERE id = ?1
              AND status NOT IN ('completed', 'cancelled')
              AND NOT EXISTS (
                  SELECT 1 FROM installments
                  WHERE contract_id = ?1 AND paid_amount_cents > 0
              )
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        );
        let contract = sqlx::query_as::<_, FinancingContract>(&sql)
            .bind(&updated.id)
            .bind(&updated.customer_id)
            .bind(updated.total_amount_cents)
            .bind(updated.down_payment_cents)
            .bind(updated.interest_rate_bps)
            .bind(updated.term_months)
            .bind(updated.monthly_payment_cents)
            .bind(updated.outstanding_balance_cents)
            .bind(updated.status)
            .bind(updated.updated_at)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(contract) = contract else {
            drop(tx);
            return Err(self.explain_rejected_write(&updated.id, ensure_editable).await);
        };

        if let Some(installments) = replacement {
            sqlx::query("DELETE FROM installments WHERE contract_id = ?1")
                .bind(&contract.id)
                .execute(&mut *tx)
                .await?;
            insert_installments(&mut tx, installments).await?;
        }

        tx.commit().await?;
        Ok(contract)
    }

    /// Cancels a contract that has not received any payment.
    ///
    /// Books an expense of the contract total under `contract_cancellation`
    /// so the income recognized at signing is offset.
    pub async fn cancel_contract(
        &self,
        id: &str,
        reason: Option<&str>,
    ) -> DbResult<FinancingContract> {
        let contract = with_busy_retry("contract", self.engine.max_commit_attempts, |_| {
            self.try_cancel(id, reason)
        })
        .await?;

        info!(id, contract_number = %contract.contract_number, "Contract cancelled");
        Ok(contract)
    }

    async fn try_cancel(&self, id: &str, reason: Option<&str>) -> DbResult<FinancingContract> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE hire_purchase_contracts SET status = 'cancelled', updated_at = ?2
            WHERE id = ?1
              AND status NOT IN ('completed', 'cancelled')
              AND NOT EXISTS (
                  SELECT 1 FROM installments
                  WHERE contract_id = ?1 AND paid_amount_cents > 0
              )
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        );
        let contract = sqlx::query_as::<_, FinancingContract>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(contract) = contract else {
            drop(tx);
            return Err(self.explain_rejected_write(id, ensure_cancellable).await);
        };

        if contract.total_amount_cents > 0 {
            let entry = LedgerEntry {
                id: generate_id(),
                entry_type: EntryType::Expense,
                amount_cents: contract.total_amount_cents,
                category: CATEGORY_CONTRACT_CANCELLATION.to_string(),
                entry_date: now.date_naive(),
                reference_id: Some(contract.id.clone()),
                description: reason.map(str::to_string),
            };
            insert_entry(&mut tx, &entry).await?;
        }

        tx.commit().await?;
        Ok(contract)
    }

    /// Re-reads a contract whose guarded update matched no row and returns
    /// the error the guard stands for.
    async fn explain_rejected_write(
        &self,
        id: &str,
        guard: fn(&FinancingContract, &[Installment]) -> siam_core::CoreResult<()>,
    ) -> DbError {
        let contract = match self.get_contract(id).await {
            Ok(contract) => contract,
            Err(err) => return err,
        };
        let installments = match self.get_installments(id).await {
            Ok(installments) => installments,
            Err(err) => return err,
        };

        match guard(&contract, &installments) {
            Err(err) => err.into(),
            // The state changed back between the update and the re-read.
            Ok(()) => CoreError::Contention {
                resource: format!("contract {}", id),
                attempts: 1,
            }
            .into(),
        }
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Applies a payment to one installment.
    ///
    /// ## Rules
    /// - Payments accumulate; the installment is paid once the total received
    ///   covers amount due plus late fee
    /// - Settling reduces the outstanding balance by the installment's
    ///   principal; the contract completes when it reaches zero
    /// - The write is a compare-and-set on the previously read paid amount,
    ///   so two payers racing on one installment cannot both succeed
    ///
    /// ## Returns
    /// * `Ok(Installment)` - The installment after the payment
    /// * `Err(DuplicatePayment)` - Installment already fully paid
    /// * `Err(InvalidAmount)` - Non-positive, or over the balance without `allow_overpayment`
    /// * `Err(Contention)` - Lost the race on every attempt
    pub async fn apply_installment_payment(
        &self,
        contract_id: &str,
        seq: i64,
        amount_cents: i64,
        allow_overpayment: bool,
    ) -> DbResult<Installment> {
        let max_attempts = self.engine.max_commit_attempts.max(1);

        for attempt in 1..=max_attempts {
            let paid = with_busy_retry("installment", max_attempts, |_| {
                self.try_pay(contract_id, seq, amount_cents, allow_overpayment)
            })
            .await?;

            match paid {
                Some(installment) => {
                    info!(
                        contract_id,
                        seq,
                        amount_cents,
                        status = ?installment.status,
                        "Installment payment applied"
                    );
                    return Ok(installment);
                }
                None => {
                    debug!(contract_id, seq, attempt, "Installment changed underneath payment");
                }
            }
        }

        warn!(contract_id, seq, "Giving up on installment payment");
        Err(CoreError::Contention {
            resource: format!("installment {}#{}", contract_id, seq),
            attempts: max_attempts,
        }
        .into())
    }

    /// One payment attempt. `Ok(None)` means the compare-and-set lost.
    async fn try_pay(
        &self,
        contract_id: &str,
        seq: i64,
        amount_cents: i64,
        allow_overpayment: bool,
    ) -> DbResult<Option<Installment>> {
        let contract = self.get_contract(contract_id).await?;
        let current = self.get_installment(contract_id, seq).await?;
        let outcome = check_payment(
            &contract,
            &current,
            Money::from_cents(amount_cents),
            allow_overpayment,
        )?;

        let today = Utc::now().date_naive();
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE installments SET
                paid_amount_cents = ?3,
                status = CASE WHEN ?4 THEN 'paid' ELSE status END,
                paid_date = CASE WHEN ?4 THEN ?5 ELSE paid_date END
            WHERE id = ?1 AND paid_amount_cents = ?2 AND status != 'paid'
            RETURNING {}
            "#,
            INSTALLMENT_COLUMNS
        );
        let installment = sqlx::query_as::<_, Installment>(&sql)
            .bind(&current.id)
            .bind(current.paid_amount_cents)
            .bind(outcome.paid_amount.cents())
            .bind(outcome.settles)
            .bind(today)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(installment) = installment else {
            return Ok(None);
        };

        let principal = if outcome.settles {
            installment.principal_cents
        } else {
            0
        };
        let balance: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE hire_purchase_contracts SET
                outstanding_balance_cents = MAX(outstanding_balance_cents - ?2, 0),
                status = CASE
                    WHEN outstanding_balance_cents - ?2 <= 0 THEN 'completed'
                    ELSE status
                END,
                updated_at = ?3
            WHERE id = ?1 AND status NOT IN ('completed', 'cancelled')
            RETURNING outstanding_balance_cents
            "#,
        )
        .bind(contract_id)
        .bind(principal)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(balance) = balance else {
            drop(tx);
            let contract = self.get_contract(contract_id).await?;
            return Err(match contract.status {
                ContractStatus::Cancelled => CoreError::AlreadyCancelled(contract.id),
                _ => CoreError::AlreadyCompleted(contract.id),
            }
            .into());
        };

        tx.commit().await?;

        if balance == 0 {
            info!(contract_id, "Contract completed");
        }
        Ok(Some(installment))
    }

    // =========================================================================
    // Status Refresh
    // =========================================================================

    /// Reclassifies a contract as of a date.
    ///
    /// Pending installments past due date plus grace turn `late` and are
    /// charged `EngineConfig::late_fee` once. Terminal contracts are returned
    /// untouched.
    pub async fn refresh_status(&self, id: &str, as_of: NaiveDate) -> DbResult<FinancingContract> {
        let contract = self.get_contract(id).await?;
        if contract.status.is_terminal() {
            return Ok(contract);
        }

        let installments = self.get_installments(id).await?;
        let grace_days = self.engine.grace_days;
        let late = newly_late(&installments, as_of, grace_days);
        let status = classify(&installments, as_of, grace_days);

        if late.is_empty() && status == contract.status {
            return Ok(contract);
        }

        let late = &late;
        let refreshed = with_busy_retry("contract", self.engine.max_commit_attempts, |_| {
            self.try_refresh(id, status, late)
        })
        .await?;

        match refreshed {
            Some(contract) => {
                info!(id, status = ?contract.status, newly_late = late.len(), "Contract status refreshed");
                Ok(contract)
            }
            // Became terminal in the meantime.
            None => self.get_contract(id).await,
        }
    }

    async fn try_refresh(
        &self,
        id: &str,
        status: ContractStatus,
        late: &[i64],
    ) -> DbResult<Option<FinancingContract>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            UPDATE hire_purchase_contracts SET status = ?2, updated_at = ?3
            WHERE id = ?1 AND status NOT IN ('completed', 'cancelled')
            RETURNING {}
            "#,
            CONTRACT_COLUMNS
        );
        let contract = sqlx::query_as::<_, FinancingContract>(&sql)
            .bind(id)
            .bind(status)
            .bind(Utc::now())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(contract) = contract else {
            return Ok(None);
        };

        for seq in late {
            sqlx::query(
                r#"
                UPDATE installments SET
                    status = 'late',
                    late_fee_cents = late_fee_cents + ?3
                WHERE contract_id = ?1 AND seq = ?2 AND status = 'pending'
                "#,
            )
            .bind(id)
            .bind(seq)
            .bind(self.engine.late_fee_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(contract))
    }

    /// Refreshes every live contract. Returns how many changed status.
    pub async fn refresh_all(&self, as_of: NaiveDate) -> DbResult<usize> {
        let live = self.list_live().await?;

        let mut changed = 0;
        for contract in live {
            let refreshed = self.refresh_status(&contract.id, as_of).await?;
            if refreshed.status != contract.status {
                changed += 1;
            }
        }

        info!(%as_of, changed, "Refreshed contract statuses");
        Ok(changed)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Gets a contract or fails with `ContractNotFound`.
    pub async fn get_contract(&self, id: &str) -> DbResult<FinancingContract> {
        let sql = format!(
            "SELECT {} FROM hire_purchase_contracts WHERE id = ?1",
            CONTRACT_COLUMNS
        );
        sqlx::query_as::<_, FinancingContract>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::Domain(CoreError::ContractNotFound(id.to_string())))
    }

    /// Gets a contract by its number.
    pub async fn get_by_number(&self, contract_number: &str) -> DbResult<Option<FinancingContract>> {
        let sql = format!(
            "SELECT {} FROM hire_purchase_contracts WHERE contract_number = ?1",
            CONTRACT_COLUMNS
        );
        let contract = sqlx::query_as::<_, FinancingContract>(&sql)
            .bind(contract_number)
            .fetch_optional(&self.pool)
            .await?;

        Ok(contract)
    }

    /// Gets the schedule of a contract in period order.
    pub async fn get_installments(&self, contract_id: &str) -> DbResult<Vec<Installment>> {
        let sql = format!(
            "SELECT {} FROM installments WHERE contract_id = ?1 ORDER BY seq",
            INSTALLMENT_COLUMNS
        );
        let installments = sqlx::query_as::<_, Installment>(&sql)
            .bind(contract_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(installments)
    }

    /// Gets one installment or fails with `InstallmentNotFound`.
    pub async fn get_installment(&self, contract_id: &str, seq: i64) -> DbResult<Installment> {
        let sql = format!(
            "SELECT {} FROM installments WHERE contract_id = ?1 AND seq = ?2",
            INSTALLMENT_COLUMNS
        );
        sqlx::query_as::<_, Installment>(&sql)
            .bind(contract_id)
            .bind(seq)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                DbError::Domain(CoreError::InstallmentNotFound {
                    contract_id: contract_id.to_string(),
                    seq,
                })
            })
    }

    /// Gets the product lines of a contract.
    pub async fn get_items(&self, contract_id: &str) -> DbResult<Vec<ContractItem>> {
        let sql = format!(
            "SELECT {} FROM contract_items WHERE contract_id = ?1 ORDER BY rowid",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, ContractItem>(&sql)
            .bind(contract_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// Lists contracts, newest first, optionally by status.
    pub async fn list_contracts(
        &self,
        status: Option<ContractStatus>,
    ) -> DbResult<Vec<FinancingContract>> {
        let sql = format!(
            r#"
            SELECT {} FROM hire_purchase_contracts
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY contract_date DESC, created_at DESC
            "#,
            CONTRACT_COLUMNS
        );
        let contracts = sqlx::query_as::<_, FinancingContract>(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        Ok(contracts)
    }

    async fn list_live(&self) -> DbResult<Vec<FinancingContract>> {
        let sql = format!(
            r#"
            SELECT {} FROM hire_purchase_contracts
            WHERE status NOT IN ('completed', 'cancelled')
            ORDER BY contract_date
            "#,
            CONTRACT_COLUMNS
        );
        let contracts = sqlx::query_as::<_, FinancingContract>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(contracts)
    }

    /// Counts contracts in a status (for the dashboard).
    pub async fn count_by_status(&self, status: ContractStatus) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM hire_purchase_contracts WHERE status = ?1")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

/// Inserts the header, asking `next_number` for a fresh contract number
/// after each clash.
async fn insert_header(
    tx: &mut Transaction<'_, Sqlite>,
    contract: &mut FinancingContract,
    mut next_number: impl FnMut() -> String,
) -> DbResult<()> {
    for attempt in 1..=CONTRACT_NUMBER_ATTEMPTS {
        contract.contract_number = next_number();

        let result = sqlx::query(
            r#"
            INSERT INTO hire_purchase_contracts (
                id, contract_number, customer_id, total_amount_cents, down_payment_cents,
                interest_rate_bps, term_months, monthly_payment_cents,
                outstanding_balance_cents, status, contract_date, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&contract.id)
        .bind(&contract.contract_number)
        .bind(&contract.customer_id)
        .bind(contract.total_amount_cents)
        .bind(contract.down_payment_cents)
        .bind(contract.interest_rate_bps)
        .bind(contract.term_months)
        .bind(contract.monthly_payment_cents)
        .bind(contract.outstanding_balance_cents)
        .bind(contract.status)
        .bind(contract.contract_date)
        .bind(contract.created_at)
        .bind(contract.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(DbError::from);

        match result {
            Ok(_) => return Ok(()),
            Err(err) if err.is_unique_violation_on("contract_number") => {
                warn!(contract_number = %contract.contract_number, attempt, "Contract number clash");
            }
            Err(err) => return Err(err),
        }
    }

    Err(CoreError::Contention {
        resource: "contract_number".to_string(),
        attempts: CONTRACT_NUMBER_ATTEMPTS,
    }
    .into())
}

/// Builds unpaid installments from a computed schedule.
fn installments_from(contract_id: &str, schedule: &Schedule) -> Vec<Installment> {
    if schedule.loan_amount.is_zero() {
        return Vec::new();
    }

    schedule
        .lines
        .iter()
        .map(|line| Installment {
            id: generate_id(),
            contract_id: contract_id.to_string(),
            seq: line.seq,
            due_date: line.due_date,
            amount_due_cents: line.amount_due.cents(),
            principal_cents: line.principal.cents(),
            interest_cents: line.interest.cents(),
            late_fee_cents: 0,
            paid_amount_cents: 0,
            paid_date: None,
            status: InstallmentStatus::Pending,
        })
        .collect()
}

async fn insert_installments(
    tx: &mut Transaction<'_, Sqlite>,
    installments: &[Installment],
) -> DbResult<()> {
    for installment in installments {
        sqlx::query(
            r#"
            INSERT INTO installments (
                id, contract_id, seq, due_date, amount_due_cents, principal_cents,
                interest_cents, late_fee_cents, paid_amount_cents, paid_date, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&installment.id)
        .bind(&installment.contract_id)
        .bind(installment.seq)
        .bind(installment.due_date)
        .bind(installment.amount_due_cents)
        .bind(installment.principal_cents)
        .bind(installment.interest_cents)
        .bind(installment.late_fee_cents)
        .bind(installment.paid_amount_cents)
        .bind(installment.paid_date)
        .bind(installment.status)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::{Database, DbConfig};
    use siam_core::ContractLine;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn sign(db: &Database, total_major: i64, down_major: i64, bps: i64, term: i64) -> FinancingContract {
        let buyer = fixtures::customer(db, "Malee").await;
        let fridge = fixtures::product(db, "Fridge", total_major * 100, 2).await;

        db.contracts()
            .create_contract(NewContract {
                customer_id: buyer.id,
                total_amount_cents: total_major * 100,
                down_payment_cents: down_major * 100,
                interest_rate_bps: bps,
                term_months: term,
                contract_date: Some(date(2026, 1, 15)),
                items: vec![ContractLine {
                    product_id: fridge.id,
                    quantity: 1,
                    unit_price_cents: None,
                }],
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_contract_persists_schedule() {
        let db = fixtures::test_db().await;
        let contract = sign(&db, 9_000, 0, 1500, 12).await;

        assert_eq!(contract.status, ContractStatus::Active);
        assert_eq!(contract.monthly_payment_cents, 81_232);
        assert_eq!(contract.outstanding_balance_cents, 900_000);
        assert!(contract.contract_number.starts_with("HP-"));
        assert_eq!(contract.contract_number.len(), "HP-20260101-".len() + 6);

        let installments = db.contracts().get_installments(&contract.id).await.unwrap();
        assert_eq!(installments.len(), 12);
        assert_eq!(
            installments.iter().map(|i| i.principal_cents).sum::<i64>(),
            900_000
        );
        assert_eq!(installments[0].due_date, date(2026, 2, 15));
        assert_eq!(installments[0].interest_cents, 11_250);
        assert!(installments.iter().all(|i| i.status == InstallmentStatus::Pending));

        let items = db.contracts().get_items(&contract.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].unit_price_cents, 900_000);

        // contract goods do not move stock
        assert_eq!(db.inventory().stock_of(&items[0].product_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_create_contract_rejects_bad_terms() {
        let db = fixtures::test_db().await;
        let buyer = fixtures::customer(&db, "Malee").await;
        let base = NewContract {
            customer_id: buyer.id.clone(),
            total_amount_cents: 100_000,
            down_payment_cents: 0,
            interest_rate_bps: 1500,
            term_months: 12,
            contract_date: None,
            items: vec![],
        };

        let mut bad = base.clone();
        bad.down_payment_cents = 200_000;
        assert!(matches!(
            db.contracts().create_contract(bad).await,
            Err(DbError::Domain(CoreError::DownPaymentExceedsTotal { .. }))
        ));

        let mut bad = base.clone();
        bad.term_months = 0;
        assert!(matches!(
            db.contracts().create_contract(bad).await,
            Err(DbError::Domain(CoreError::InvalidTerm(0)))
        ));

        let mut bad = base.clone();
        bad.customer_id = "nobody".to_string();
        assert!(matches!(
            db.contracts().create_contract(bad).await,
            Err(DbError::Domain(CoreError::CustomerNotFound(_)))
        ));

        let mut bad = base;
        bad.items = vec![ContractLine {
            product_id: "missing".to_string(),
            quantity: 1,
            unit_price_cents: None,
        }];
        assert!(matches!(
            db.contracts().create_contract(bad).await,
            Err(DbError::Domain(CoreError::ProductNotFound(_)))
        ));

        assert!(db.contracts().list_contracts(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fully_paid_upfront_is_completed() {
        let db = fixtures::test_db().await;
        let contract = sign(&db, 500, 500, 1500, 6).await;

        assert_eq!(contract.status, ContractStatus::Completed);
        assert_eq!(contract.outstanding_balance_cents, 0);
        assert!(db.contracts().get_installments(&contract.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_before_payment_replaces_schedule() {
        let db = fixtures::test_db().await;
        let contract = sign(&db, 6_000, 0, 0, 6).await;

        let edited = db
            .contracts()
            .edit_contract(
                &contract.id,
                ContractEdit {
                    down_payment_cents: Some(120_000),
                    term_months: Some(4),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(edited.term_months, 4);
        assert_eq!(edited.outstanding_balance_cents, 480_000);
        assert_eq!(edited.monthly_payment_cents, 120_000);

        let installments = db.contracts().get_installments(&contract.id).await.unwrap();
        assert_eq!(installments.len(), 4);
        assert_eq!(installments[3].seq, 4);
    }

    #[tokio::test]
    async fn test_edit_after_payment_is_rejected() {
        let db = fixtures::test_db().await;
        let contract = sign(&db, 6_000, 0, 0, 6).await;
        db.contracts()
            .apply_installment_payment(&contract.id, 1, 10_000, false)
            .await
            .unwrap();

        let err = db
            .contracts()
            .edit_contract(
                &contract.id,
                ContractEdit {
                    term_months: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::EditAfterPayment(_))));

        let unchanged = db.contracts().get_contract(&contract.id).await.unwrap();
        assert_eq!(unchanged.term_months, 6);
        assert_eq!(db.contracts().get_installments(&contract.id).await.unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_partial_then_settling_payment() {
        let db = fixtures::test_db().await;
        let contract = sign(&db, 6_000, 0, 0, 6).await;
        let contracts = db.contracts();

        let partial = contracts
            .apply_installment_payment(&contract.id, 1, 40_000, false)
            .await
            .unwrap();
        assert_eq!(partial.status, InstallmentStatus::Pending);
        assert_eq!(partial.paid_amount_cents, 40_000);
        assert_eq!(
            contracts.get_contract(&contract.id).await.unwrap().outstanding_balance_cents,
            600_000
        );

        let settled = contracts
            .apply_installment_payment(&contract.id, 1, 60_000, false)
            .await
            .unwrap();
        assert_eq!(settled.status, InstallmentStatus::Paid);
        assert!(settled.paid_date.is_some());
        assert_eq!(
            contracts.get_contract(&contract.id).await.unwrap().outstanding_balance_cents,
            500_000
        );

        let err = contracts
            .apply_installment_payment(&contract.id, 1, 1, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::DuplicatePayment { seq: 1, .. })
        ));
        assert_eq!(
            contracts.get_installment(&contract.id, 1).await.unwrap().paid_amount_cents,
            100_000
        );
    }

    #[tokio::test]
    async fn test_overpayment_needs_flag() {
        let db = fixtures::test_db().await;
        let contract = sign(&db, 6_000, 0, 0, 6).await;

        assert!(matches!(
            db.contracts()
                .apply_installment_payment(&contract.id, 2, 150_000, false)
                .await,
            Err(DbError::Domain(CoreError::InvalidAmount { .. }))
        ));
        assert!(matches!(
            db.contracts()
                .apply_installment_payment(&contract.id, 2, 0, false)
                .await,
            Err(DbError::Domain(CoreError::InvalidAmount { .. }))
        ));
        assert!(matches!(
            db.contracts()
                .apply_installment_payment(&contract.id, 99, 1, false)
                .await,
            Err(DbError::Domain(CoreError::InstallmentNotFound { seq: 99, .. }))
        ));

        let paid = db
            .contracts()
            .apply_installment_payment(&contract.id, 2, 150_000, true)
            .await
            .unwrap();
        assert_eq!(paid.status, InstallmentStatus::Paid);
        assert_eq!(paid.paid_amount_cents, 150_000);
    }

    #[tokio::test]
    async fn test_paying_every_installment_completes_contract() {
        let db = fixtures::test_db().await;
        let contract = sign(&db, 9_000, 0, 1500, 12).await;
        let contracts = db.contracts();

        for installment in contracts.get_installments(&contract.id).await.unwrap() {
            contracts
                .apply_installment_payment(&contract.id, installment.seq, installment.amount_due_cents, false)
                .await
                .unwrap();
        }

        let done = contracts.get_contract(&contract.id).await.unwrap();
        assert_eq!(done.status, ContractStatus::Completed);
        assert_eq!(done.outstanding_balance_cents, 0);
        assert!(matches!(
            contracts.cancel_contract(&contract.id, None).await,
            Err(DbError::Domain(CoreError::AlreadyCompleted(_)))
        ));
    }

    #[tokio::test]
    async fn test_cancel_contract() {
        let db = fixtures::test_db().await;
        let contract = sign(&db, 6_000, 0, 0, 6).await;

        let cancelled = db
            .contracts()
            .cancel_contract(&contract.id, Some("customer changed mind"))
            .await
            .unwrap();
        assert_eq!(cancelled.status, ContractStatus::Cancelled);

        assert!(matches!(
            db.contracts()
                .apply_installment_payment(&contract.id, 1, 100_000, false)
                .await,
            Err(DbError::Domain(CoreError::AlreadyCancelled(_)))
        ));
        assert!(matches!(
            db.contracts().cancel_contract(&contract.id, None).await,
            Err(DbError::Domain(CoreError::AlreadyCancelled(_)))
        ));
        assert_eq!(
            db.contracts()
                .list_contracts(Some(ContractStatus::Cancelled))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_cancel_after_payment_is_rejected() {
        let db = fixtures::test_db().await;
        let contract = sign(&db, 6_000, 0, 0, 6).await;
        db.contracts()
            .apply_installment_payment(&contract.id, 1, 100_000, false)
            .await
            .unwrap();

        assert!(matches!(
            db.contracts().cancel_contract(&contract.id, None).await,
            Err(DbError::Domain(CoreError::EditAfterPayment(_)))
        ));
    }

    #[tokio::test]
    async fn test_refresh_status_marks_late_once() {
        let engine = EngineConfig::default()
            .grace_days(7)
            .late_fee(Money::from_major(50));
        let db = Database::new(DbConfig::in_memory().engine(engine)).await.unwrap();
        let contract = sign(&db, 6_000, 0, 0, 6).await;
        let contracts = db.contracts();

        // first due 2026-02-15, grace ends 2026-02-22
        let still_active = contracts.refresh_status(&contract.id, date(2026, 2, 22)).await.unwrap();
        assert_eq!(still_active.status, ContractStatus::Active);

        let overdue = contracts.refresh_status(&contract.id, date(2026, 3, 1)).await.unwrap();
        assert_eq!(overdue.status, ContractStatus::Overdue);

        contracts.refresh_status(&contract.id, date(2026, 3, 2)).await.unwrap();
        let first = contracts.get_installment(&contract.id, 1).await.unwrap();
        assert_eq!(first.status, InstallmentStatus::Late);
        assert_eq!(first.late_fee_cents, 5_000);
        assert_eq!(
            contracts.get_installment(&contract.id, 2).await.unwrap().status,
            InstallmentStatus::Pending
        );

        // paying amount due plus fee settles and the contract is current again
        contracts
            .apply_installment_payment(&contract.id, 1, 105_000, false)
            .await
            .unwrap();
        let current = contracts.refresh_status(&contract.id, date(2026, 3, 2)).await.unwrap();
        assert_eq!(current.status, ContractStatus::Active);
    }

    #[tokio::test]
    async fn test_refresh_all() {
        let db = fixtures::test_db().await;
        sign(&db, 6_000, 0, 0, 6).await;
        sign(&db, 3_000, 0, 0, 3).await;

        let changed = db.contracts().refresh_all(date(2026, 4, 1)).await.unwrap();
        assert_eq!(changed, 2);
        assert_eq!(db.contracts().count_by_status(ContractStatus::Overdue).await.unwrap(), 2);
        assert_eq!(db.contracts().refresh_all(date(2026, 4, 1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_contract_number_clash_regenerates_once() {
        let db = fixtures::test_db().await;
        let existing = sign(&db, 9_000, 0, 1500, 12).await;

        let mut contract = existing.clone();
        contract.id = generate_id();
        let mut numbers =
            vec![existing.contract_number.clone(), "HP-FRESH-0001".to_string()].into_iter();
        let mut calls = 0;

        let mut tx = db.pool().begin().await.unwrap();
        insert_header(&mut tx, &mut contract, || {
            calls += 1;
            numbers.next().unwrap()
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(calls, 2);
        assert_eq!(contract.contract_number, "HP-FRESH-0001");
        let stored = db.contracts().get_contract(&contract.id).await.unwrap();
        assert_eq!(stored.contract_number, "HP-FRESH-0001");
    }

    #[tokio::test]
    async fn test_contract_number_clash_gives_up_with_contention() {
        let db = fixtures::test_db().await;
        let existing = sign(&db, 9_000, 0, 1500, 12).await;

        let mut contract = existing.clone();
        contract.id = generate_id();
        let mut calls = 0;

        let mut tx = db.pool().begin().await.unwrap();
        let result = insert_header(&mut tx, &mut contract, || {
            calls += 1;
            existing.contract_number.clone()
        })
        .await;
        drop(tx);

        assert_eq!(calls, CONTRACT_NUMBER_ATTEMPTS);
        assert!(matches!(
            result,
            Err(DbError::Domain(CoreError::Contention { attempts: 2, .. }))
        ));
        let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hire_purchase_contracts")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(stored, 1);
    }
}
