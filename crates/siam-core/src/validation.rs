//! # Validation Module
//!
//! Input validation for Siam POS commands.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Presentation (outside this workspace)                        │
//! │  └── Form checks, immediate user feedback                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Field rules (ValidationError)                                     │
//! │  └── Command rules (CoreError: EmptyCart, InvalidQuantity, ...)        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock_quantity >= 0)                                       │
//! │  ├── UNIQUE receipt / contract numbers                                 │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything here runs before the first write of a command.
//!
//! ## Usage
//! ```rust
//! use siam_core::types::CartLine;
//! use siam_core::validation::{normalize_cart, validate_product_name};
//!
//! validate_product_name("Rice cooker 1.8L").unwrap();
//!
//! let lines = normalize_cart(&[CartLine::new("p-1", 2), CartLine::new("p-1", 1)]).unwrap();
//! assert_eq!(lines.len(), 1);
//! assert_eq!(lines[0].quantity, 3);
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::CartLine;
use crate::{MAX_AMOUNT_CENTS, MAX_CART_LINES, MAX_ITEM_QUANTITY};

/// Result type for field validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a product name.
///
/// ## Rules
/// - Must not be empty
/// - At most 200 characters (Thai names count by character, not byte)
///
/// ## Example
/// ```rust
/// use siam_core::validation::validate_product_name;
///
/// assert!(validate_product_name("หม้อหุงข้าว").is_ok());
/// assert!(validate_product_name("").is_err());
/// ```
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_text("name", name, 200)
}

/// Validates a customer name.
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    validate_text("customer name", name, 200)
}

/// Validates a ledger category.
pub fn validate_category(category: &str) -> ValidationResult<()> {
    validate_text("category", category, 64)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a price in cents. Zero is allowed (free items).
///
/// ## Example
/// ```rust
/// use siam_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(129_000).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_AMOUNT_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }

    Ok(())
}

/// Validates an initial stock level or low-stock threshold.
pub fn validate_stock_level(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates one line quantity.
///
/// ## Rules
/// - Must be positive (> 0) → [`CoreError::InvalidQuantity`]
/// - Must not exceed MAX_ITEM_QUANTITY → [`ValidationError::OutOfRange`]
pub fn validate_quantity(field: &str, qty: i64) -> CoreResult<()> {
    if qty <= 0 {
        return Err(CoreError::InvalidQuantity {
            field: field.to_string(),
            quantity: qty,
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        }
        .into());
    }

    Ok(())
}

/// Validates a non-negative adjustment such as a discount or tax amount.
pub fn validate_non_negative(field: &str, cents: i64) -> CoreResult<()> {
    if cents < 0 {
        return Err(CoreError::invalid_amount(field, "must not be negative"));
    }
    check_amount_cap(field, cents)
}

/// Validates a payment or entry amount. Must be strictly positive.
pub fn validate_positive_amount(field: &str, cents: i64) -> CoreResult<()> {
    if cents <= 0 {
        return Err(CoreError::invalid_amount(field, "must be greater than zero"));
    }
    check_amount_cap(field, cents)
}

/// Rejects amounts above [`MAX_AMOUNT_CENTS`].
pub fn check_amount_cap(field: &str, cents: i64) -> CoreResult<()> {
    if cents > MAX_AMOUNT_CENTS {
        return Err(CoreError::invalid_amount(field, "exceeds the largest accepted amount"));
    }
    Ok(())
}

// =============================================================================
// Cart Validation
// =============================================================================

/// Validates a cart and merges repeated products into one line.
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Cart submitted: [p-1 ×2, p-2 ×1, p-1 ×1]                              │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  normalize_cart ← THIS FUNCTION                                        │
/// │       │                                                                 │
/// │       ├── empty?          → EmptyCart                                  │
/// │       ├── qty <= 0?       → InvalidQuantity                            │
/// │       ├── merged qty cap? → OutOfRange                                 │
/// │       │                                                                 │
/// │       └── OK → [p-1 ×3, p-2 ×1] (first-seen order)                     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
///
/// Merging means one guarded stock decrement per product, so a cart can
/// never pass a per-line check that the combined quantity would fail.
pub fn normalize_cart(lines: &[CartLine]) -> CoreResult<Vec<CartLine>> {
    if lines.is_empty() {
        return Err(CoreError::EmptyCart);
    }

    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "product_id".to_string(),
            }
            .into());
        }
        validate_quantity("quantity", line.quantity)?;

        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(line.clone()),
        }
    }

    if merged.len() > MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 1,
            max: MAX_CART_LINES as i64,
        }
        .into());
    }

    for line in &merged {
        validate_quantity("quantity", line.quantity)?;
    }

    Ok(merged)
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use siam_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
