//! # Inventory Ledger
//!
//! The only writer of `products.stock_quantity` after creation, and of
//! `stock_movements`.
//!
//! ## Guarded Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                Compare-and-set inside the sale transaction              │
//! │                                                                         │
//! │  UPDATE products                                                       │
//! │     SET stock_quantity = stock_quantity - :qty                         │
//! │   WHERE id = :id AND stock_quantity >= :qty                            │
//! │  RETURNING unit_price_cents                                            │
//! │       │                                                                 │
//! │       ├── 1 row  → decremented; price read under the write lock        │
//! │       │                                                                 │
//! │       └── 0 rows → SELECT stock_quantity                               │
//! │                    ├── no row → ProductNotFound                        │
//! │                    └── row    → InsufficientStock { available }        │
//! │                                                                         │
//! │  The caller drops the transaction on any error, so earlier lines of    │
//! │  the same cart are rolled back with it.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The write comes first in every transaction so SQLite takes the write
//! lock before anything is read; a concurrent seller waits on
//! `busy_timeout` instead of working from a stale snapshot.

use std::sync::Arc;

use chrono::Utc;
use siam_core::{
    CartLine, CoreError, CoreResult, MovementReason, ReferenceType, StockMovement, ValidationError,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use super::{generate_id, with_busy_retry};
use crate::config::EngineConfig;
use crate::error::DbResult;

const MOVEMENT_COLUMNS: &str = r#"
    id, product_id, delta, reason, reference_id, reference_type, note, created_at
"#;

/// A cart line after its stock has been taken.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservedLine {
    pub product_id: String,
    pub quantity: i64,
    /// Product price at commit time.
    pub unit_price_cents: i64,
    pub movement: StockMovement,
}

impl ReservedLine {
    /// Price times quantity, or `InvalidAmount` if it does not fit.
    #[inline]
    pub fn line_total_cents(&self) -> CoreResult<i64> {
        self.unit_price_cents
            .checked_mul(self.quantity)
            .ok_or_else(|| CoreError::invalid_amount("line_total", "amount out of range"))
    }
}

/// Stock ledger: guarded stock changes plus their audit trail.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
    engine: Arc<EngineConfig>,
}

impl InventoryLedger {
    /// Creates a new InventoryLedger.
    pub fn new(pool: SqlitePool, engine: Arc<EngineConfig>) -> Self {
        InventoryLedger { pool, engine }
    }

    /// Takes stock for every line inside the caller's transaction.
    ///
    /// ## Arguments
    /// * `tx` - Open write transaction owned by the coordinator
    /// * `lines` - Merged cart lines (one per product)
    /// * `reference_id` - ID of the sale being committed
    ///
    /// ## Returns
    /// * `Ok(Vec<ReservedLine>)` - One movement per line, in cart order
    /// * `Err(InsufficientStock | ProductNotFound)` - Nothing should be
    ///   committed; the caller drops `tx`
    pub async fn reserve_and_commit(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        lines: &[CartLine],
        reference_id: &str,
    ) -> DbResult<Vec<ReservedLine>> {
        let now = Utc::now();
        let mut reserved = Vec::with_capacity(lines.len());

        for line in lines {
            let price: Option<i64> = sqlx::query_scalar(
                r#"
                UPDATE products
                SET stock_quantity = stock_quantity - ?2, updated_at = ?3
                WHERE id = ?1 AND stock_quantity >= ?2
                RETURNING unit_price_cents
                "#,
            )
            .bind(&line.product_id)
            .bind(line.quantity)
            .bind(now)
            .fetch_optional(&mut **tx)
            .await?;

            let unit_price_cents = match price {
                Some(price) => price,
                None => {
                    return Err(self
                        .shortage(tx, &line.product_id, line.quantity)
                        .await?
                        .into())
                }
            };

            let movement = StockMovement {
                id: generate_id(),
                product_id: line.product_id.clone(),
                delta: -line.quantity,
                reason: MovementReason::Sale,
                reference_id: reference_id.to_string(),
                reference_type: ReferenceType::CashSale,
                note: None,
                created_at: now,
            };
            insert_movement(tx, &movement).await?;

            debug!(
                product_id = %line.product_id,
                quantity = line.quantity,
                reference_id,
                "Stock reserved"
            );

            reserved.push(ReservedLine {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                unit_price_cents,
                movement,
            });
        }

        Ok(reserved)
    }

    /// Explains why a guarded decrement matched no row.
    async fn shortage(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        product_id: &str,
        requested: i64,
    ) -> DbResult<CoreError> {
        let available: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ?1")
                .bind(product_id)
                .fetch_optional(&mut **tx)
                .await?;

        Ok(match available {
            None => CoreError::ProductNotFound(product_id.to_string()),
            Some(available) => CoreError::InsufficientStock {
                product_id: product_id.to_string(),
                available,
                requested,
            },
        })
    }

    /// Puts stock back inside the caller's transaction (sale reversal).
    pub(crate) async fn restore(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        product_id: &str,
        quantity: i64,
        reference_id: &str,
        note: Option<String>,
    ) -> DbResult<StockMovement> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity + ?2, updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ProductNotFound(product_id.to_string()).into());
        }

        let movement = StockMovement {
            id: generate_id(),
            product_id: product_id.to_string(),
            delta: quantity,
            reason: MovementReason::Reversal,
            reference_id: reference_id.to_string(),
            reference_type: ReferenceType::SaleReversal,
            note,
            created_at: now,
        };
        insert_movement(tx, &movement).await?;
        Ok(movement)
    }

    /// Applies a single signed stock correction.
    ///
    /// ## Arguments
    /// * `product_id` - Product to correct
    /// * `delta` - Positive to restock, negative to write off; never zero
    /// * `reason` - Must be `Adjustment`; sale and reversal movements are
    ///   only written by the commits that own them
    /// * `note` - Free text kept on the movement
    ///
    /// ## Returns
    /// * `Ok(StockMovement)` - The recorded movement
    /// * `Err(InvalidQuantity)` - `delta` is zero
    /// * `Err(Validation)` - `reason` is not `Adjustment`
    /// * `Err(InsufficientStock)` - Result would be negative
    /// * `Err(ProductNotFound)` - Unknown product
    pub async fn adjust(
        &self,
        product_id: &str,
        delta: i64,
        reason: MovementReason,
        note: Option<&str>,
    ) -> DbResult<StockMovement> {
        if delta == 0 {
            return Err(CoreError::InvalidQuantity {
                field: "delta".to_string(),
                quantity: 0,
            }
            .into());
        }
        if reason != MovementReason::Adjustment {
            return Err(CoreError::from(ValidationError::InvalidFormat {
                field: "reason".to_string(),
                reason: format!("{:?} movements cannot be recorded by hand", reason),
            })
            .into());
        }

        let movement = with_busy_retry("stock", self.engine.max_commit_attempts, |_| {
            self.try_adjust(product_id, delta, reason, note)
        })
        .await?;

        info!(product_id, delta, ?reason, "Stock adjusted");
        Ok(movement)
    }

    async fn try_adjust(
        &self,
        product_id: &str,
        delta: i64,
        reason: MovementReason,
        note: Option<&str>,
    ) -> DbResult<StockMovement> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock_quantity = stock_quantity + ?2, updated_at = ?3
            WHERE id = ?1 AND stock_quantity + ?2 >= 0
            RETURNING stock_quantity
            "#,
        )
        .bind(product_id)
        .bind(delta)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            return Err(self.shortage(&mut tx, product_id, delta.saturating_neg()).await?.into());
        }

        let movement = StockMovement {
            id: generate_id(),
            product_id: product_id.to_string(),
            delta,
            reason,
            reference_id: generate_id(),
            reference_type: ReferenceType::Manual,
            note: note.map(str::to_string),
            created_at: now,
        };
        insert_movement(&mut tx, &movement).await?;

        tx.commit().await?;
        Ok(movement)
    }

    /// Current stock level of a product.
    pub async fn stock_of(&self, product_id: &str) -> DbResult<i64> {
        let stock: Option<i64> =
            sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = ?1")
                .bind(product_id)
                .fetch_optional(&self.pool)
                .await?;

        stock.ok_or_else(|| CoreError::ProductNotFound(product_id.to_string()).into())
    }

    /// Movement history of one product, oldest first.
    pub async fn movements_for_product(&self, product_id: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements WHERE product_id = ?1 ORDER BY created_at, rowid",
            MOVEMENT_COLUMNS
        );
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// Movements written by one committing transaction.
    pub async fn movements_for_reference(
        &self,
        reference_id: &str,
    ) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements WHERE reference_id = ?1 ORDER BY rowid",
            MOVEMENT_COLUMNS
        );
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(reference_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }
}

/// Appends one movement row inside an open transaction.
pub(crate) async fn insert_movement(
    tx: &mut Transaction<'_, Sqlite>,
    movement: &StockMovement,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, product_id, delta, reason, reference_id, reference_type, note, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.product_id)
    .bind(movement.delta)
    .bind(movement.reason)
    .bind(&movement.reference_id)
    .bind(movement.reference_type)
    .bind(&movement.note)
    .bind(movement.created_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
