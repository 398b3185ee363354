//! # Ledger Aggregator
//!
//! Income and expense reporting over a date window.
//!
//! ## Where Entries Come From
//! ```text
//! cash_sales.total_cents              ──► income  'cash_sale'      (sale date, UTC)
//! hire_purchase_contracts.total_amount ──► income  'hire_purchase'  (contract date)
//! ledger_entries                      ──► manual entries, plus contra
//!                                         expenses written by reversals
//!                                         and cancellations
//! ```
//!
//! Sale and contract income is derived on read, so it can never drift from
//! the records it describes. Summation is exact integer arithmetic in
//! [`LedgerSummary::from_entries`].

use chrono::Utc;
use siam_core::ledger::{DashboardStats, TopProduct};
use siam_core::validation::{validate_category, validate_positive_amount};
use siam_core::{
    ContractStatus, CoreError, DateRange, EntryType, LedgerEntry, LedgerFilter, LedgerSummary,
    NewLedgerEntry, ValidationError, CATEGORY_CASH_SALE, CATEGORY_CONTRACT_CANCELLATION,
    CATEGORY_HIRE_PURCHASE, CATEGORY_SALE_REVERSAL,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use super::generate_id;
use crate::error::{DbError, DbResult};

/// Number of products on the dashboard's top sellers list.
const TOP_PRODUCTS_LIMIT: i64 = 5;

/// Read side of accounting, plus manual entries.
#[derive(Debug, Clone)]
pub struct LedgerAggregator {
    pool: SqlitePool,
}

impl LedgerAggregator {
    /// Creates a new LedgerAggregator.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerAggregator { pool }
    }

    /// Summarizes income and expenses in a window.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let may = DateRange::new(may_1, may_31)?;
    /// let summary = db.ledger().get_ledger_summary(may, &LedgerFilter::default()).await?;
    /// println!("net {}", summary.net);
    /// ```
    pub async fn get_ledger_summary(
        &self,
        range: DateRange,
        filter: &LedgerFilter,
    ) -> DbResult<LedgerSummary> {
        let entries = self.collect_entries(range).await?;
        let summary = LedgerSummary::from_entries(&entries, range, filter);

        debug!(
            start = %range.start,
            end = %range.end,
            entries = summary.entry_count,
            net_cents = summary.net.cents(),
            "Ledger summary"
        );
        Ok(summary)
    }

    /// Lists the merged entries in a window, oldest first.
    pub async fn list_entries(
        &self,
        range: DateRange,
        filter: &LedgerFilter,
    ) -> DbResult<Vec<LedgerEntry>> {
        let entries = self.collect_entries(range).await?;
        Ok(entries.into_iter().filter(|e| filter.matches(e)).collect())
    }

    /// Records a manual income or expense entry.
    ///
    /// Sale and contract income categories are derived and cannot be
    /// recorded by hand. Reversal and cancellation categories are expenses
    /// only. Any other category keeps the entry type it was first used with.
    pub async fn record_entry(&self, new: NewLedgerEntry) -> DbResult<LedgerEntry> {
        validate_positive_amount("amount", new.amount_cents)?;
        let category = new.category.trim();
        validate_category(category).map_err(CoreError::from)?;
        if category == CATEGORY_CASH_SALE || category == CATEGORY_HIRE_PURCHASE {
            return Err(category_error(format!(
                "'{}' is derived from sales and contracts",
                category
            )));
        }
        if new.entry_type == EntryType::Income
            && (category == CATEGORY_SALE_REVERSAL || category == CATEGORY_CONTRACT_CANCELLATION)
        {
            return Err(category_error(format!("'{}' is an expense category", category)));
        }

        let entry = LedgerEntry {
            id: generate_id(),
            entry_type: new.entry_type,
            amount_cents: new.amount_cents,
            category: category.to_string(),
            entry_date: new.entry_date,
            reference_id: new.reference_id,
            description: new.description,
        };

        let mut tx = self.pool.begin().await?;
        insert_entry(&mut tx, &entry).await?;

        // Checked after the insert so the write lock is already held.
        let clash: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM ledger_entries WHERE category = ?1 AND entry_type <> ?2)",
        )
        .bind(&entry.category)
        .bind(entry.entry_type)
        .fetch_one(&mut *tx)
        .await?;
        if clash {
            return Err(category_error(format!(
                "'{}' is already used for the other entry type",
                entry.category
            )));
        }

        tx.commit().await?;

        info!(
            id = %entry.id,
            entry_type = ?entry.entry_type,
            category = %entry.category,
            amount_cents = entry.amount_cents,
            "Ledger entry recorded"
        );
        Ok(entry)
    }

    /// Headline numbers for the reports page.
    pub async fn dashboard_stats(&self, range: DateRange) -> DbResult<DashboardStats> {
        let (start, end) = range.iso_bounds();

        let sale_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM cash_sales WHERE substr(sold_at, 1, 10) BETWEEN ?1 AND ?2",
        )
        .bind(&start)
        .bind(&end)
        .fetch_one(&self.pool)
        .await?;

        let active_contract_count = self.count_contracts(ContractStatus::Active).await?;
        let overdue_contract_count = self.count_contracts(ContractStatus::Overdue).await?;

        let product_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        let customer_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        let low_stock_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE stock_quantity <= low_stock_threshold",
        )
        .fetch_one(&self.pool)
        .await?;

        // Reversed sales do not count as sold.
        let top_products = sqlx::query_as::<_, TopProduct>(
            r#"
            SELECT
                p.id AS product_id,
                p.name AS name,
                SUM(si.quantity) AS quantity_sold,
                SUM(si.line_total_cents) AS revenue_cents
            FROM sale_items si
            JOIN cash_sales s ON s.id = si.sale_id
            JOIN products p ON p.id = si.product_id
            WHERE substr(s.sold_at, 1, 10) BETWEEN ?1 AND ?2
              AND NOT EXISTS (SELECT 1 FROM sale_reversals r WHERE r.sale_id = s.id)
            GROUP BY p.id, p.name
            ORDER BY quantity_sold DESC, revenue_cents DESC
            LIMIT ?3
            "#,
        )
        .bind(&start)
        .bind(&end)
        .bind(TOP_PRODUCTS_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        let summary = self.get_ledger_summary(range, &LedgerFilter::default()).await?;

        Ok(DashboardStats {
            sale_count,
            active_contract_count,
            overdue_contract_count,
            product_count,
            customer_count,
            low_stock_count,
            top_products,
            summary,
        })
    }

    async fn count_contracts(&self, status: ContractStatus) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM hire_purchase_contracts WHERE status = ?1")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Derived and persisted entries whose date falls in the window.
    async fn collect_entries(&self, range: DateRange) -> DbResult<Vec<LedgerEntry>> {
        let (start, end) = range.iso_bounds();

        let entries = sqlx::query_as::<_, LedgerEntry>(
            r#"
            SELECT
                id,
                'income' AS entry_type,
                total_cents AS amount_cents,
                ?3 AS category,
                substr(sold_at, 1, 10) AS entry_date,
                id AS reference_id,
                receipt_number AS description
            FROM cash_sales
            WHERE substr(sold_at, 1, 10) BETWEEN ?1 AND ?2

            UNION ALL

            SELECT
                id,
                'income',
                total_amount_cents,
                ?4,
                contract_date,
                id,
                contract_number
            FROM hire_purchase_contracts
            WHERE contract_date BETWEEN ?1 AND ?2

            UNION ALL

            SELECT id, entry_type, amount_cents, category, entry_date, reference_id, description
            FROM ledger_entries
            WHERE entry_date BETWEEN ?1 AND ?2

            ORDER BY entry_date, entry_type
            "#,
        )
        .bind(&start)
        .bind(&end)
        .bind(CATEGORY_CASH_SALE)
        .bind(CATEGORY_HIRE_PURCHASE)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

fn category_error(reason: String) -> DbError {
    CoreError::from(ValidationError::InvalidFormat {
        field: "category".to_string(),
        reason,
    })
    .into()
}

/// Inserts a ledger entry inside a caller's transaction.
pub(crate) async fn insert_entry(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &LedgerEntry,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            id, entry_type, amount_cents, category, entry_date,
            reference_id, description, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&entry.id)
    .bind(entry.entry_type)
    .bind(entry.amount_cents)
    .bind(&entry.category)
    .bind(entry.entry_date)
    .bind(&entry.reference_id)
    .bind(&entry.description)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use chrono::NaiveDate;
    use siam_core::{CartLine, Money, NewContract, SaleRequest};

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn manual(entry_type: EntryType, cents: i64, category: &str) -> NewLedgerEntry {
        NewLedgerEntry {
            entry_type,
            amount_cents: cents,
            category: category.to_string(),
            entry_date: today(),
            reference_id: None,
            description: None,
        }
    }

    async fn contract(db: &crate::Database, total_cents: i64) -> siam_core::FinancingContract {
        let buyer = fixtures::customer(db, "Somsak").await;
        db.contracts()
            .create_contract(NewContract {
                customer_id: buyer.id,
                total_amount_cents: total_cents,
                down_payment_cents: 0,
                interest_rate_bps: 0,
                term_months: 6,
                contract_date: None,
                items: vec![],
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_income_is_sales_plus_contracts_plus_manual() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 10).await;

        let first = db
            .sales()
            .submit_cash_sale(SaleRequest::cash(vec![CartLine::new(&fan.id, 1)]))
            .await
            .unwrap();
        let second = db
            .sales()
            .submit_cash_sale(SaleRequest::cash(vec![CartLine::new(&fan.id, 2)]))
            .await
            .unwrap();
        contract(&db, 600_000).await;
        db.ledger()
            .record_entry(manual(EntryType::Income, 25_000, "repair_service"))
            .await
            .unwrap();
        db.ledger()
            .record_entry(manual(EntryType::Expense, 40_000, "rent"))
            .await
            .unwrap();

        let summary = db
            .ledger()
            .get_ledger_summary(DateRange::day(today()), &LedgerFilter::default())
            .await
            .unwrap();

        let expected_income = first.total_cents + second.total_cents + 600_000 + 25_000;
        assert_eq!(summary.income.cents(), expected_income);
        assert_eq!(summary.expenses.cents(), 40_000);
        assert_eq!(summary.net.cents(), expected_income - 40_000);
        assert_eq!(summary.entry_count, 5);
        assert_eq!(
            summary.income_by_category.get(CATEGORY_CASH_SALE),
            Some(&Money::from_cents(first.total_cents + second.total_cents))
        );
        assert_eq!(
            summary.income_by_category.get(CATEGORY_HIRE_PURCHASE),
            Some(&Money::from_cents(600_000))
        );
    }

    #[tokio::test]
    async fn test_window_and_filters() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 10).await;
        db.sales()
            .submit_cash_sale(SaleRequest::cash(vec![CartLine::new(&fan.id, 1)]))
            .await
            .unwrap();
        contract(&db, 600_000).await;

        let yesterday = today().pred_opt().unwrap();
        let empty = db
            .ledger()
            .get_ledger_summary(DateRange::day(yesterday), &LedgerFilter::default())
            .await
            .unwrap();
        assert_eq!(empty.entry_count, 0);

        let only_sales = db
            .ledger()
            .get_ledger_summary(
                DateRange::day(today()),
                &LedgerFilter::categories([CATEGORY_CASH_SALE]),
            )
            .await
            .unwrap();
        assert_eq!(only_sales.income.cents(), 89_000);

        let entries = db
            .ledger()
            .list_entries(DateRange::day(today()), &LedgerFilter::income_only())
            .await
            .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_reversal_and_cancellation_offset_income() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 10).await;
        let sale = db
            .sales()
            .submit_cash_sale(SaleRequest::cash(vec![CartLine::new(&fan.id, 1)]))
            .await
            .unwrap();
        db.sales().reverse_sale(&sale.id, Some("wrong item")).await.unwrap();

        let signed = contract(&db, 600_000).await;
        db.contracts().cancel_contract(&signed.id, None).await.unwrap();

        let summary = db
            .ledger()
            .get_ledger_summary(DateRange::day(today()), &LedgerFilter::default())
            .await
            .unwrap();
        assert!(summary.net.is_zero());
        assert_eq!(
            summary.expense_by_category.get(CATEGORY_SALE_REVERSAL),
            Some(&Money::from_cents(89_000))
        );
        assert_eq!(
            summary.expense_by_category.get(CATEGORY_CONTRACT_CANCELLATION),
            Some(&Money::from_cents(600_000))
        );
    }

    #[tokio::test]
    async fn test_record_entry_validates() {
        let db = fixtures::test_db().await;
        let ledger = db.ledger();

        assert!(matches!(
            ledger.record_entry(manual(EntryType::Expense, 0, "rent")).await,
            Err(DbError::Domain(CoreError::InvalidAmount { .. }))
        ));
        assert!(matches!(
            ledger.record_entry(manual(EntryType::Expense, 100, "  ")).await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));
        assert!(matches!(
            ledger
                .record_entry(manual(EntryType::Income, 100, CATEGORY_CASH_SALE))
                .await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));
        assert!(matches!(
            ledger
                .record_entry(manual(EntryType::Income, 100, CATEGORY_SALE_REVERSAL))
                .await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));
    }

    #[tokio::test]
    async fn test_category_keeps_its_entry_type() {
        let db = fixtures::test_db().await;
        let ledger = db.ledger();

        ledger
            .record_entry(manual(EntryType::Income, 1_000_000, "rent"))
            .await
            .unwrap();
        assert!(matches!(
            ledger.record_entry(manual(EntryType::Expense, 400_000, "rent")).await,
            Err(DbError::Domain(CoreError::Validation(ValidationError::InvalidFormat { .. })))
        ));
        ledger
            .record_entry(manual(EntryType::Income, 500_000, " rent "))
            .await
            .unwrap();

        let summary = ledger
            .get_ledger_summary(DateRange::day(today()), &LedgerFilter::default())
            .await
            .unwrap();
        assert_eq!(summary.entry_count, 2);
        assert_eq!(
            summary.income_by_category.get("rent"),
            Some(&Money::from_cents(1_500_000))
        );
        assert!(summary.expense_by_category.is_empty());
        assert!(summary.expenses.is_zero());
    }

    #[tokio::test]
    async fn test_dashboard_stats() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 12).await;
        let kettle = fixtures::product(&db, "Kettle", 45_000, 3).await;

        db.sales()
            .submit_cash_sale(SaleRequest::cash(vec![
                CartLine::new(&fan.id, 1),
                CartLine::new(&kettle.id, 2),
            ]))
            .await
            .unwrap();
        let reversed = db
            .sales()
            .submit_cash_sale(SaleRequest::cash(vec![CartLine::new(&fan.id, 5)]))
            .await
            .unwrap();
        db.sales().reverse_sale(&reversed.id, None).await.unwrap();
        contract(&db, 600_000).await;

        let stats = db.ledger().dashboard_stats(DateRange::day(today())).await.unwrap();
        assert_eq!(stats.sale_count, 2);
        assert_eq!(stats.active_contract_count, 1);
        assert_eq!(stats.overdue_contract_count, 0);
        assert_eq!(stats.product_count, 2);
        assert_eq!(stats.customer_count, 1);
        // kettle 1 left, fan 11 left, threshold 10
        assert_eq!(stats.low_stock_count, 1);

        assert_eq!(stats.top_products.len(), 2);
        assert_eq!(stats.top_products[0].product_id, kettle.id);
        assert_eq!(stats.top_products[0].quantity_sold, 2);
        assert_eq!(stats.top_products[1].quantity_sold, 1);
    }
}
