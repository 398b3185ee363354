//! # Sale Coordinator
//!
//! Atomic cash sales against the shared stock ledger.
//!
//! ## Commit Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       submit_cash_sale                                  │
//! │                                                                         │
//! │  1. VALIDATE (no writes)                                               │
//! │     └── normalize_cart, discount/tax ≥ 0, customer exists              │
//! │                                                                         │
//! │  2. BEGIN                                                              │
//! │     ├── InventoryLedger::reserve_and_commit  (guarded decrements,      │
//! │     │                                          one movement per line)  │
//! │     ├── subtotal from prices read under the write lock                 │
//! │     ├── INSERT cash_sales   (receipt number, unique)                   │
//! │     └── INSERT sale_items                                              │
//! │                                                                         │
//! │  3. COMMIT                                                             │
//! │     └── any error before this point drops the transaction:             │
//! │         no header, no items, no movements, stock untouched             │
//! │                                                                         │
//! │  Busy database → whole sequence retried (EngineConfig) → Contention    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Reversal
//! A committed sale is never edited or deleted. `reverse_sale` writes a
//! `sale_reversals` row, puts the stock back with `reversal` movements and
//! books an expense contra entry, all in one transaction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use siam_core::validation::{normalize_cart, validate_non_negative};
use siam_core::{
    CartLine, CashSale, CoreError, DateRange, EntryType, LedgerEntry, SaleItem, SaleRequest,
    SaleReversal, StockMovement, CATEGORY_SALE_REVERSAL,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use super::customer::ensure_customer_exists;
use super::inventory::InventoryLedger;
use super::ledger::insert_entry;
use super::{generate_id, generate_receipt_number, with_busy_retry};
use crate::config::EngineConfig;
use crate::error::{DbError, DbResult};

const SALE_COLUMNS: &str = r#"
    id, customer_id, receipt_number, subtotal_cents, discount_cents, tax_cents,
    total_cents, payment_method, sold_at
"#;

const ITEM_COLUMNS: &str =
    "id, sale_id, product_id, quantity, unit_price_cents, line_total_cents";

/// Attempts at a unique receipt number within one commit.
const RECEIPT_NUMBER_ATTEMPTS: u32 = 2;

/// Coordinator for cash sales. Sole writer of sales and sale items.
#[derive(Debug, Clone)]
pub struct SaleCoordinator {
    pool: SqlitePool,
    engine: Arc<EngineConfig>,
    inventory: InventoryLedger,
}

impl SaleCoordinator {
    /// Creates a new SaleCoordinator.
    pub fn new(pool: SqlitePool, engine: Arc<EngineConfig>) -> Self {
        let inventory = InventoryLedger::new(pool.clone(), engine.clone());
        SaleCoordinator {
            pool,
            engine,
            inventory,
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Commits a cash sale atomically.
    ///
    /// ## Arguments
    /// * `request` - Cart lines, optional customer, payment method,
    ///   discount and tax amounts
    ///
    /// ## Returns
    /// * `Ok(CashSale)` - The committed sale with its items
    /// * `Err(EmptyCart | InvalidQuantity | InvalidAmount)` - Rejected before any write
    /// * `Err(CustomerNotFound | ProductNotFound)` - Unknown reference
    /// * `Err(InsufficientStock)` - Some line could not be covered; nothing written
    /// * `Err(Contention)` - Database stayed busy through every attempt
    pub async fn submit_cash_sale(&self, request: SaleRequest) -> DbResult<CashSale> {
        let lines = normalize_cart(&request.lines)?;
        validate_non_negative("discount", request.discount_cents)?;
        validate_non_negative("tax", request.tax_cents)?;

        if let Some(customer_id) = &request.customer_id {
            ensure_customer_exists(&self.pool, customer_id).await?;
        }

        debug!(lines = lines.len(), "Submitting cash sale");

        let request = &request;
        let lines = &lines;
        let sale = with_busy_retry("stock", self.engine.max_commit_attempts, |attempt| {
            self.try_submit(request, lines, attempt)
        })
        .await
        .map_err(|err| {
            if let DbError::Domain(CoreError::InsufficientStock { product_id, .. }) = &err {
                warn!(product_id = %product_id, "Sale rejected: insufficient stock");
            }
            err
        })?;

        info!(
            id = %sale.id,
            receipt_number = %sale.receipt_number,
            total_cents = sale.total_cents,
            "Cash sale committed"
        );
        Ok(sale)
    }

    async fn try_submit(
        &self,
        request: &SaleRequest,
        lines: &[CartLine],
        attempt: u32,
    ) -> DbResult<CashSale> {
        let sale_id = generate_id();
        let sold_at = Utc::now();

        let mut tx = self.pool.begin().await?;

        let reserved = self
            .inventory
            .reserve_and_commit(&mut tx, lines, &sale_id)
            .await?;

        let mut subtotal_cents: i64 = 0;
        for line in &reserved {
            subtotal_cents = subtotal_cents
                .checked_add(line.line_total_cents()?)
                .ok_or_else(|| CoreError::invalid_amount("subtotal", "amount out of range"))?;
        }
        if request.discount_cents > subtotal_cents {
            return Err(CoreError::invalid_amount(
                "discount",
                format!(
                    "{} exceeds subtotal {}",
                    request.discount_cents, subtotal_cents
                ),
            )
            .into());
        }
        let total_cents = (subtotal_cents - request.discount_cents)
            .checked_add(request.tax_cents)
            .ok_or_else(|| CoreError::invalid_amount("total", "amount out of range"))?;

        let items = reserved
            .iter()
            .map(|r| {
                Ok(SaleItem {
                    id: generate_id(),
                    sale_id: sale_id.clone(),
                    product_id: r.product_id.clone(),
                    quantity: r.quantity,
                    unit_price_cents: r.unit_price_cents,
                    line_total_cents: r.line_total_cents()?,
                })
            })
            .collect::<DbResult<Vec<SaleItem>>>()?;

        let mut sale = CashSale {
            id: sale_id,
            customer_id: request.customer_id.clone(),
            receipt_number: String::new(),
            subtotal_cents,
            discount_cents: request.discount_cents,
            tax_cents: request.tax_cents,
            total_cents,
            payment_method: request.payment_method,
            sold_at,
            items: Vec::new(),
        };

        let prefix = &self.engine.receipt_prefix;
        insert_header(&mut tx, &mut sale, || generate_receipt_number(prefix, sold_at)).await?;
        for item in &items {
            insert_item(&mut tx, item).await?;
        }

        tx.commit().await?;

        debug!(id = %sale.id, attempt, "Sale transaction committed");
        sale.items = items;
        Ok(sale)
    }

    /// Reverses a committed sale.
    ///
    /// ## What This Does
    /// 1. Records a `sale_reversals` row (unique per sale)
    /// 2. Restores every line's stock with a `reversal` movement
    /// 3. Books an expense of the sale total under `sale_reversal`
    ///
    /// ## Returns
    /// * `Ok(Vec<StockMovement>)` - The restoring movements
    /// * `Err(SaleNotFound)` - Unknown sale
    /// * `Err(AlreadyCancelled)` - Sale was reversed before
    pub async fn reverse_sale(
        &self,
        sale_id: &str,
        reason: Option<&str>,
    ) -> DbResult<Vec<StockMovement>> {
        let sale = self.get_sale(sale_id).await?;

        let sale = &sale;
        let movements = with_busy_retry("stock", self.engine.max_commit_attempts, |_| {
            self.try_reverse(sale, reason)
        })
        .await?;

        info!(sale_id, receipt_number = %sale.receipt_number, "Sale reversed");
        Ok(movements)
    }

    async fn try_reverse(
        &self,
        sale: &CashSale,
        reason: Option<&str>,
    ) -> DbResult<Vec<StockMovement>> {
        let now = Utc::now();
        let reversal = SaleReversal {
            id: generate_id(),
            sale_id: sale.id.clone(),
            reason: reason.map(str::to_string),
            created_at: now,
        };

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO sale_reversals (id, sale_id, reason, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&reversal.id)
        .bind(&reversal.sale_id)
        .bind(&reversal.reason)
        .bind(reversal.created_at)
        .execute(&mut *tx)
        .await
        .map_err(DbError::from);

        match inserted {
            Err(err) if err.is_unique_violation_on("sale_id") => {
                return Err(CoreError::AlreadyCancelled(sale.id.clone()).into());
            }
            other => {
                other?;
            }
        }

        let note = Some(format!("reversal of {}", sale.receipt_number));
        let mut movements = Vec::with_capacity(sale.items.len());
        for item in &sale.items {
            let movement = self
                .inventory
                .restore(&mut tx, &item.product_id, item.quantity, &reversal.id, note.clone())
                .await?;
            movements.push(movement);
        }

        if sale.total_cents > 0 {
            let entry = LedgerEntry {
                id: generate_id(),
                entry_type: EntryType::Expense,
                amount_cents: sale.total_cents,
                category: CATEGORY_SALE_REVERSAL.to_string(),
                entry_date: now.date_naive(),
                reference_id: Some(sale.id.clone()),
                description: reversal.reason.clone(),
            };
            insert_entry(&mut tx, &entry).await?;
        }

        tx.commit().await?;
        Ok(movements)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Gets a sale with its items.
    pub async fn get_sale(&self, sale_id: &str) -> DbResult<CashSale> {
        let sql = format!("SELECT {} FROM cash_sales WHERE id = ?1", SALE_COLUMNS);
        let mut sale = sqlx::query_as::<_, CashSale>(&sql)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::Domain(CoreError::SaleNotFound(sale_id.to_string())))?;

        sale.items = self.get_items(sale_id).await?;
        Ok(sale)
    }

    /// Gets a sale by its receipt number.
    pub async fn get_by_receipt(&self, receipt_number: &str) -> DbResult<Option<CashSale>> {
        let id: Option<String> =
            sqlx::query_scalar("SELECT id FROM cash_sales WHERE receipt_number = ?1")
                .bind(receipt_number)
                .fetch_optional(&self.pool)
                .await?;

        match id {
            Some(id) => Ok(Some(self.get_sale(&id).await?)),
            None => Ok(None),
        }
    }

    /// Gets all items for a sale.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let sql = format!(
            "SELECT {} FROM sale_items WHERE sale_id = ?1 ORDER BY rowid",
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// Lists sales whose date (UTC) falls in the range, newest first.
    pub async fn list_sales(&self, range: DateRange) -> DbResult<Vec<CashSale>> {
        let (start, end) = range.iso_bounds();

        let sql = format!(
            r#"
            SELECT {} FROM cash_sales
            WHERE substr(sold_at, 1, 10) BETWEEN ?1 AND ?2
            ORDER BY sold_at DESC
            "#,
            SALE_COLUMNS
        );
        let mut sales = sqlx::query_as::<_, CashSale>(&sql)
            .bind(&start)
            .bind(&end)
            .fetch_all(&self.pool)
            .await?;

        let item_sql = format!(
            r#"
            SELECT {} FROM sale_items
            WHERE sale_id IN (
                SELECT id FROM cash_sales WHERE substr(sold_at, 1, 10) BETWEEN ?1 AND ?2
            )
            ORDER BY rowid
            "#,
            ITEM_COLUMNS
        );
        let items = sqlx::query_as::<_, SaleItem>(&item_sql)
            .bind(&start)
            .bind(&end)
            .fetch_all(&self.pool)
            .await?;

        let mut by_sale: HashMap<String, Vec<SaleItem>> = HashMap::new();
        for item in items {
            by_sale.entry(item.sale_id.clone()).or_default().push(item);
        }
        for sale in &mut sales {
            sale.items = by_sale.remove(&sale.id).unwrap_or_default();
        }

        Ok(sales)
    }

    /// Returns the reversal record of a sale, if it was reversed.
    pub async fn get_reversal(&self, sale_id: &str) -> DbResult<Option<SaleReversal>> {
        let reversal = sqlx::query_as::<_, SaleReversal>(
            "SELECT id, sale_id, reason, created_at FROM sale_reversals WHERE sale_id = ?1",
        )
        .bind(sale_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(reversal)
    }

    /// Counts sales (for the dashboard).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cash_sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Inserts the header, asking `next_number` for a fresh receipt number
/// after each clash.
async fn insert_header(
    tx: &mut Transaction<'_, Sqlite>,
    sale: &mut CashSale,
    mut next_number: impl FnMut() -> String,
) -> DbResult<()> {
    for attempt in 1..=RECEIPT_NUMBER_ATTEMPTS {
        sale.receipt_number = next_number();

        let result = sqlx::query(
            r#"
            INSERT INTO cash_sales (
                id, customer_id, receipt_number,
                subtotal_cents, discount_cents, tax_cents, total_cents,
                payment_method, sold_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.customer_id)
        .bind(&sale.receipt_number)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.tax_cents)
        .bind(sale.total_cents)
        .bind(sale.payment_method)
        .bind(sale.sold_at)
        .execute(&mut **tx)
        .await
        .map_err(DbError::from);

        match result {
            Ok(_) => return Ok(()),
            Err(err) if err.is_unique_violation_on("receipt_number") => {
                warn!(receipt_number = %sale.receipt_number, attempt, "Receipt number clash");
            }
            Err(err) => return Err(err),
        }
    }

    Err(CoreError::Contention {
        resource: "receipt_number".to_string(),
        attempts: RECEIPT_NUMBER_ATTEMPTS,
    }
    .into())
}

async fn insert_item(tx: &mut Transaction<'_, Sqlite>, item: &SaleItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, product_id, quantity, unit_price_cents, line_total_cents
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(&item.product_id)
    .bind(item.quantity)
    .bind(item.unit_price_cents)
    .bind(item.line_total_cents)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use crate::Database;
    use siam_core::{
        MovementReason, PaymentMethod, ReferenceType, MAX_AMOUNT_CENTS, MAX_ITEM_QUANTITY,
    };

    async fn count(db: &Database, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_submit_cash_sale() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 5).await;
        let kettle = fixtures::product(&db, "Kettle", 45_000, 4).await;
        let buyer = fixtures::customer(&db, "Somchai").await;

        let request = SaleRequest {
            lines: vec![
                CartLine::new(&fan.id, 1),
                CartLine::new(&kettle.id, 2),
                CartLine::new(&fan.id, 1),
            ],
            customer_id: Some(buyer.id.clone()),
            payment_method: PaymentMethod::Transfer,
            discount_cents: 5_000,
            tax_cents: 1_200,
        };
        let sale = db.sales().submit_cash_sale(request).await.unwrap();

        assert_eq!(sale.items.len(), 2);
        assert_eq!(sale.subtotal_cents, 2 * 89_000 + 2 * 45_000);
        assert_eq!(
            sale.items.iter().map(|i| i.line_total_cents).sum::<i64>(),
            sale.subtotal_cents
        );
        assert_eq!(sale.total_cents, sale.subtotal_cents - 5_000 + 1_200);
        assert!(sale.receipt_number.starts_with("RCP-"));

        assert_eq!(db.inventory().stock_of(&fan.id).await.unwrap(), 3);
        assert_eq!(db.inventory().stock_of(&kettle.id).await.unwrap(), 2);

        let movements = db.inventory().movements_for_reference(&sale.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements
            .iter()
            .all(|m| m.reason == MovementReason::Sale && m.reference_type == ReferenceType::CashSale));

        let loaded = db.sales().get_sale(&sale.id).await.unwrap();
        assert_eq!(loaded.items, sale.items);
        assert_eq!(loaded.payment_method, PaymentMethod::Transfer);
        let by_receipt = db.sales().get_by_receipt(&sale.receipt_number).await.unwrap();
        assert_eq!(by_receipt.map(|s| s.id), Some(sale.id.clone()));
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_no_rows() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 5).await;
        let kettle = fixtures::product(&db, "Kettle", 45_000, 1).await;
        let movements_before = count(&db, "stock_movements").await;

        let request = SaleRequest::cash(vec![CartLine::new(&fan.id, 2), CartLine::new(&kettle.id, 3)]);
        let err = db.sales().submit_cash_sale(request).await.unwrap_err();

        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock { available: 1, requested: 3, .. })
        ));
        assert_eq!(count(&db, "cash_sales").await, 0);
        assert_eq!(count(&db, "sale_items").await, 0);
        assert_eq!(count(&db, "stock_movements").await, movements_before);
        assert_eq!(db.inventory().stock_of(&fan.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_merged_lines_checked_against_stock() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 3).await;

        let request = SaleRequest::cash(vec![CartLine::new(&fan.id, 2), CartLine::new(&fan.id, 2)]);
        assert!(matches!(
            db.sales().submit_cash_sale(request).await,
            Err(DbError::Domain(CoreError::InsufficientStock { requested: 4, .. }))
        ));
    }

    #[tokio::test]
    async fn test_validation_happens_before_writes() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 3).await;
        let sales = db.sales();

        assert!(matches!(
            sales.submit_cash_sale(SaleRequest::cash(vec![])).await,
            Err(DbError::Domain(CoreError::EmptyCart))
        ));
        assert!(matches!(
            sales
                .submit_cash_sale(SaleRequest::cash(vec![CartLine::new(&fan.id, 0)]))
                .await,
            Err(DbError::Domain(CoreError::InvalidQuantity { .. }))
        ));

        let mut request = SaleRequest::cash(vec![CartLine::new(&fan.id, 1)]);
        request.discount_cents = -1;
        assert!(matches!(
            sales.submit_cash_sale(request).await,
            Err(DbError::Domain(CoreError::InvalidAmount { .. }))
        ));

        let mut request = SaleRequest::cash(vec![CartLine::new(&fan.id, 1)]);
        request.discount_cents = 90_000;
        assert!(matches!(
            sales.submit_cash_sale(request).await,
            Err(DbError::Domain(CoreError::InvalidAmount { .. }))
        ));

        let mut request = SaleRequest::cash(vec![CartLine::new(&fan.id, 1)]);
        request.customer_id = Some("nobody".to_string());
        assert!(matches!(
            sales.submit_cash_sale(request).await,
            Err(DbError::Domain(CoreError::CustomerNotFound(_)))
        ));

        assert_eq!(db.inventory().stock_of(&fan.id).await.unwrap(), 3);
        assert_eq!(count(&db, "cash_sales").await, 0);
    }

    #[tokio::test]
    async fn test_oversized_amounts_rejected_without_writes() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 3).await;
        let movements_before = count(&db, "stock_movements").await;

        let mut request = SaleRequest::cash(vec![CartLine::new(&fan.id, 1)]);
        request.tax_cents = i64::MAX;
        assert!(matches!(
            db.sales().submit_cash_sale(request).await,
            Err(DbError::Domain(CoreError::InvalidAmount { .. }))
        ));

        // a price written around the product checks still cannot overflow the line total
        sqlx::query("UPDATE products SET unit_price_cents = ?1 WHERE id = ?2")
            .bind(i64::MAX / 2)
            .bind(&fan.id)
            .execute(db.pool())
            .await
            .unwrap();
        let request = SaleRequest::cash(vec![CartLine::new(&fan.id, 3)]);
        assert!(matches!(
            db.sales().submit_cash_sale(request).await,
            Err(DbError::Domain(CoreError::InvalidAmount { .. }))
        ));

        assert_eq!(db.inventory().stock_of(&fan.id).await.unwrap(), 3);
        assert_eq!(count(&db, "cash_sales").await, 0);
        assert_eq!(count(&db, "stock_movements").await, movements_before);
    }

    #[tokio::test]
    async fn test_largest_accepted_sale_fits() {
        let db = fixtures::test_db().await;
        let gold = fixtures::product(&db, "Gold bar", MAX_AMOUNT_CENTS, MAX_ITEM_QUANTITY).await;

        let mut request = SaleRequest::cash(vec![CartLine::new(&gold.id, MAX_ITEM_QUANTITY)]);
        request.tax_cents = MAX_AMOUNT_CENTS;
        let sale = db.sales().submit_cash_sale(request).await.unwrap();

        assert_eq!(sale.subtotal_cents, MAX_AMOUNT_CENTS * MAX_ITEM_QUANTITY);
        assert_eq!(sale.total_cents, sale.subtotal_cents + MAX_AMOUNT_CENTS);
    }

    #[tokio::test]
    async fn test_stock_never_goes_negative() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 7).await;

        let mut committed = 0;
        for _ in 0..5 {
            let request = SaleRequest::cash(vec![CartLine::new(&fan.id, 2)]);
            if db.sales().submit_cash_sale(request).await.is_ok() {
                committed += 1;
            }
        }

        assert_eq!(committed, 3);
        assert_eq!(db.inventory().stock_of(&fan.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reverse_sale() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 5).await;
        let sale = db
            .sales()
            .submit_cash_sale(SaleRequest::cash(vec![CartLine::new(&fan.id, 2)]))
            .await
            .unwrap();

        let movements = db
            .sales()
            .reverse_sale(&sale.id, Some("customer returned goods"))
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].delta, 2);
        assert_eq!(movements[0].reason, MovementReason::Reversal);
        assert_eq!(db.inventory().stock_of(&fan.id).await.unwrap(), 5);

        // sale row is untouched
        let loaded = db.sales().get_sale(&sale.id).await.unwrap();
        assert_eq!(loaded.total_cents, sale.total_cents);
        assert!(db.sales().get_reversal(&sale.id).await.unwrap().is_some());

        assert!(matches!(
            db.sales().reverse_sale(&sale.id, None).await,
            Err(DbError::Domain(CoreError::AlreadyCancelled(_)))
        ));
        assert_eq!(db.inventory().stock_of(&fan.id).await.unwrap(), 5);

        assert!(matches!(
            db.sales().reverse_sale("missing", None).await,
            Err(DbError::Domain(CoreError::SaleNotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_list_sales_in_range() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 5).await;
        for _ in 0..2 {
            db.sales()
                .submit_cash_sale(SaleRequest::cash(vec![CartLine::new(&fan.id, 1)]))
                .await
                .unwrap();
        }

        let today = Utc::now().date_naive();
        let sales = db.sales().list_sales(DateRange::day(today)).await.unwrap();
        assert_eq!(sales.len(), 2);
        assert!(sales.iter().all(|s| s.items.len() == 1));

        let yesterday = today.pred_opt().unwrap();
        assert!(db.sales().list_sales(DateRange::day(yesterday)).await.unwrap().is_empty());
        assert_eq!(db.sales().count().await.unwrap(), 2);
    }

    async fn committed_sale(db: &Database) -> CashSale {
        let fan = fixtures::product(db, "Fan", 89_000, 5).await;
        db.sales()
            .submit_cash_sale(SaleRequest::cash(vec![CartLine::new(&fan.id, 1)]))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_receipt_clash_regenerates_once() {
        let db = fixtures::test_db().await;
        let existing = committed_sale(&db).await;

        let mut sale = existing.clone();
        sale.id = generate_id();
        let mut numbers = vec![existing.receipt_number.clone(), "RCP-FRESH-0001".to_string()].into_iter();
        let mut calls = 0;

        let mut tx = db.pool().begin().await.unwrap();
        insert_header(&mut tx, &mut sale, || {
            calls += 1;
            numbers.next().unwrap()
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(calls, 2);
        assert_eq!(sale.receipt_number, "RCP-FRESH-0001");
        let stored = db.sales().get_by_receipt("RCP-FRESH-0001").await.unwrap();
        assert_eq!(stored.map(|s| s.id), Some(sale.id));
    }

    #[tokio::test]
    async fn test_receipt_clash_gives_up_with_contention() {
        let db = fixtures::test_db().await;
        let existing = committed_sale(&db).await;

        let mut sale = existing.clone();
        sale.id = generate_id();
        let mut calls = 0;

        let mut tx = db.pool().begin().await.unwrap();
        let result = insert_header(&mut tx, &mut sale, || {
            calls += 1;
            existing.receipt_number.clone()
        })
        .await;
        drop(tx);

        assert_eq!(calls, RECEIPT_NUMBER_ATTEMPTS);
        assert!(matches!(
            result,
            Err(DbError::Domain(CoreError::Contention { attempts: 2, .. }))
        ));
        assert_eq!(count(&db, "cash_sales").await, 1);
    }
}
