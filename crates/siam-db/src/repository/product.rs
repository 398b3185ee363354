//! # Product Repository
//!
//! Database operations for the product catalog.
//!
//! ## Key Operations
//! - Create products (initial stock recorded as a movement)
//! - Lookup, search and listing
//! - Low-stock report
//!
//! Stock levels are never written here after creation. Every later change
//! goes through [`InventoryLedger`](super::inventory::InventoryLedger) so it
//! leaves a movement behind.

use std::sync::Arc;

use chrono::Utc;
use siam_core::validation::{validate_price_cents, validate_product_name, validate_stock_level};
use siam_core::{CoreError, MovementReason, Product, ReferenceType, StockMovement};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::generate_id;
use super::inventory::insert_movement;
use crate::config::EngineConfig;
use crate::error::{DbError, DbResult};

const PRODUCT_COLUMNS: &str = r#"
    id, name, unit_price_cents, stock_quantity, low_stock_threshold,
    created_at, updated_at
"#;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
    engine: Arc<EngineConfig>,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool, engine: Arc<EngineConfig>) -> Self {
        ProductRepository { pool, engine }
    }

    /// Creates a product.
    ///
    /// ## Arguments
    /// * `name` - Display name
    /// * `unit_price_cents` - Selling price, zero allowed
    /// * `initial_stock` - Opening stock; recorded as a manual adjustment
    /// * `low_stock_threshold` - Defaults to `EngineConfig::low_stock_threshold`
    pub async fn create(
        &self,
        name: &str,
        unit_price_cents: i64,
        initial_stock: i64,
        low_stock_threshold: Option<i64>,
    ) -> DbResult<Product> {
        validate_product_name(name).map_err(CoreError::from)?;
        validate_price_cents(unit_price_cents).map_err(CoreError::from)?;
        validate_stock_level("stock_quantity", initial_stock).map_err(CoreError::from)?;
        let threshold = low_stock_threshold.unwrap_or(self.engine.low_stock_threshold);
        validate_stock_level("low_stock_threshold", threshold).map_err(CoreError::from)?;

        let now = Utc::now();
        let product = Product {
            id: generate_id(),
            name: name.trim().to_string(),
            unit_price_cents,
            stock_quantity: initial_stock,
            low_stock_threshold: threshold,
            created_at: now,
            updated_at: now,
        };

        debug!(id = %product.id, name = %product.name, "Inserting product");

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, name, unit_price_cents, stock_quantity, low_stock_threshold,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.unit_price_cents)
        .bind(product.stock_quantity)
        .bind(product.low_stock_threshold)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;

        if initial_stock > 0 {
            let movement = StockMovement {
                id: generate_id(),
                product_id: product.id.clone(),
                delta: initial_stock,
                reason: MovementReason::Adjustment,
                reference_id: product.id.clone(),
                reference_type: ReferenceType::Manual,
                note: Some("opening stock".to_string()),
                created_at: now,
            };
            insert_movement(&mut tx, &movement).await?;
        }

        tx.commit().await?;

        info!(id = %product.id, stock = initial_stock, "Product created");
        Ok(product)
    }

    /// Gets a product by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by ID or fails with `ProductNotFound`.
    pub async fn get(&self, id: &str) -> DbResult<Product> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::ProductNotFound(id.to_string()).into())
    }

    /// Searches products by name (case-insensitive substring).
    ///
    /// An empty query lists products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = query.trim();
        debug!(query = %query, limit = %limit, "Searching products");

        let sql = format!(
            "SELECT {} FROM products WHERE name LIKE ?1 ORDER BY name LIMIT ?2",
            PRODUCT_COLUMNS
        );
        let pattern = format!("%{}%", query);
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(pattern)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    /// Lists products at or below a stock threshold.
    ///
    /// ## Arguments
    /// * `threshold` - Fixed level for every product; `None` uses each
    ///   product's own `low_stock_threshold`
    ///
    /// ## Returns
    /// Products ordered by stock ascending (most urgent first).
    pub async fn list_low_stock(&self, threshold: Option<i64>) -> DbResult<Vec<Product>> {
        let sql = format!(
            r#"
            SELECT {} FROM products
            WHERE stock_quantity <= COALESCE(?1, low_stock_threshold)
            ORDER BY stock_quantity ASC, name ASC
            "#,
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(threshold)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), ?threshold, "Low stock products");
        Ok(products)
    }

    /// Updates name, price and threshold. Stock is not touched.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Product after the update
    /// * `Err(DbError::Domain(ProductNotFound))` - Product doesn't exist
    pub async fn update_details(
        &self,
        id: &str,
        name: &str,
        unit_price_cents: i64,
        low_stock_threshold: i64,
    ) -> DbResult<Product> {
        validate_product_name(name).map_err(CoreError::from)?;
        validate_price_cents(unit_price_cents).map_err(CoreError::from)?;
        validate_stock_level("low_stock_threshold", low_stock_threshold)
            .map_err(CoreError::from)?;

        debug!(id = %id, "Updating product");

        let sql = format!(
            r#"
            UPDATE products SET
                name = ?2,
                unit_price_cents = ?3,
                low_stock_threshold = ?4,
                updated_at = ?5
            WHERE id = ?1
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(name.trim())
            .bind(unit_price_cents)
            .bind(low_stock_threshold)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        product.ok_or_else(|| DbError::Domain(CoreError::ProductNotFound(id.to_string())))
    }

    /// Counts products (for diagnostics and the dashboard).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::fixtures;
    use siam_core::{CoreError, MovementReason};

    use crate::error::DbError;

    #[tokio::test]
    async fn test_create_records_opening_stock() {
        let db = fixtures::test_db().await;
        let product = fixtures::product(&db, "Rice cooker", 129_000, 12).await;

        assert_eq!(product.low_stock_threshold, 10);
        let loaded = db.products().get(&product.id).await.unwrap();
        assert_eq!(loaded, product);

        let movements = db.inventory().movements_for_product(&product.id).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].delta, 12);
        assert_eq!(movements[0].reason, MovementReason::Adjustment);
    }

    #[tokio::test]
    async fn test_create_validates() {
        let db = fixtures::test_db().await;
        assert!(matches!(
            db.products().create("", 100, 1, None).await,
            Err(DbError::Domain(CoreError::Validation(_)))
        ));
        assert!(db.products().create("Fan", -1, 1, None).await.is_err());
        assert!(db
            .products()
            .create("Fan", siam_core::MAX_AMOUNT_CENTS + 1, 1, None)
            .await
            .is_err());
        assert!(db.products().create("Fan", 100, -1, None).await.is_err());
        assert_eq!(db.products().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_low_stock() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Fan", 89_000, 3).await;
        let _tv = fixtures::product(&db, "TV", 1_290_000, 25).await;
        let kettle = db.products().create("Kettle", 45_000, 6, Some(5)).await.unwrap();

        let low = db.products().list_low_stock(None).await.unwrap();
        let ids: Vec<_> = low.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec![fan.id.clone()]);

        let low = db.products().list_low_stock(Some(6)).await.unwrap();
        assert_eq!(low.len(), 2);
        assert_eq!(low[1].id, kettle.id);
    }

    #[tokio::test]
    async fn test_update_details_and_search() {
        let db = fixtures::test_db().await;
        let fan = fixtures::product(&db, "Desk fan", 89_000, 3).await;

        let updated = db
            .products()
            .update_details(&fan.id, "Desk fan 16in", 95_000, 2)
            .await
            .unwrap();
        assert_eq!(updated.unit_price_cents, 95_000);
        assert_eq!(updated.stock_quantity, 3);

        let found = db.products().search("16in", 10).await.unwrap();
        assert_eq!(found.len(), 1);

        assert!(matches!(
            db.products().update_details("missing", "X", 1, 1).await,
            Err(DbError::Domain(CoreError::ProductNotFound(_)))
        ));
    }
}
