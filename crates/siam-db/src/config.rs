//! # Engine Configuration
//!
//! Business knobs for the coordinators, loaded once at startup.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`SIAM_*`)
//! 2. Defaults (this file)
//!
//! Read-only after construction; each `Database` handle carries a copy.

use serde::{Deserialize, Serialize};
use siam_core::{Money, DEFAULT_LOW_STOCK_THRESHOLD};
use tracing::warn;

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Days after the due date before an unpaid installment counts as late.
    pub grace_days: i64,

    /// Fee added to an installment when it first turns late (satang).
    pub late_fee_cents: i64,

    /// Threshold used by `list_low_stock` when the caller passes none.
    pub low_stock_threshold: i64,

    /// Whole-commit attempts on a busy database before reporting Contention.
    pub max_commit_attempts: u32,

    /// Receipt number prefix, e.g. `RCP-20260501-101500-3F9A1C`.
    pub receipt_prefix: String,

    /// Contract number prefix, e.g. `HP-20260501-7D2E0B`.
    pub contract_prefix: String,
}

impl Default for EngineConfig {
    /// ## Default Values
    /// - Grace period: 7 days
    /// - Late fee: none
    /// - Low stock: 10 units
    /// - Commit attempts: 3
    fn default() -> Self {
        EngineConfig {
            grace_days: 7,
            late_fee_cents: 0,
            low_stock_threshold: DEFAULT_LOW_STOCK_THRESHOLD,
            max_commit_attempts: 3,
            receipt_prefix: "RCP".to_string(),
            contract_prefix: "HP".to_string(),
        }
    }
}

impl EngineConfig {
    /// Creates an EngineConfig from environment variables and defaults.
    ///
    /// ## Environment Variables
    /// - `SIAM_GRACE_DAYS`: Grace period in days (e.g. "7")
    /// - `SIAM_LATE_FEE`: Late fee in baht (e.g. "50.00")
    /// - `SIAM_LOW_STOCK_THRESHOLD`: Default low-stock level
    /// - `SIAM_MAX_COMMIT_ATTEMPTS`: Retry budget for busy commits (min 1)
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = EngineConfig::default();

        if let Some(days) = parse_var::<i64>("SIAM_GRACE_DAYS") {
            config.grace_days = days.max(0);
        }

        if let Some(fee) = parse_var::<f64>("SIAM_LATE_FEE") {
            config.late_fee_cents = ((fee * 100.0).round() as i64).max(0);
        }

        if let Some(threshold) = parse_var::<i64>("SIAM_LOW_STOCK_THRESHOLD") {
            config.low_stock_threshold = threshold.max(0);
        }

        if let Some(attempts) = parse_var::<u32>("SIAM_MAX_COMMIT_ATTEMPTS") {
            config.max_commit_attempts = attempts.max(1);
        }

        config
    }

    pub fn grace_days(mut self, days: i64) -> Self {
        self.grace_days = days;
        self
    }

    pub fn late_fee(mut self, fee: Money) -> Self {
        self.late_fee_cents = fee.cents();
        self
    }

    pub fn max_commit_attempts(mut self, attempts: u32) -> Self {
        self.max_commit_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn late_fee_amount(&self) -> Money {
        Money::from_cents(self.late_fee_cents)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var = name, value = %raw, "Ignoring unparseable configuration value");
            None
        }
    }
}
