//! # Seed Data Generator
//!
//! Populates the database with a small appliance store for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./siam_dev.db
//! cargo run -p siam-db --bin seed
//!
//! # Specify database path (or set SIAM_DB_PATH)
//! cargo run -p siam-db --bin seed -- --db ./data/siam.db
//!
//! # Skip the sample hire-purchase contract
//! cargo run -p siam-db --bin seed -- --no-contract
//! ```
//!
//! ## Generated Data
//! - Products across a few appliance categories, with opening stock
//! - Customers
//! - One cash sale and, unless disabled, one hire-purchase contract
//!
//! Business settings come from the environment (`SIAM_GRACE_DAYS`,
//! `SIAM_LATE_FEE`, ...), see [`EngineConfig::from_env`].

use std::env;

use siam_core::{CartLine, ContractLine, NewContract, PaymentMethod, SaleRequest};
use siam_db::{Database, DbConfig, EngineConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Products by category: (name, price in baht, opening stock)
const CATALOG: &[(&str, &[(&str, i64, i64)])] = &[
    (
        "Kitchen",
        &[
            ("Rice cooker 1.8L", 1_290, 15),
            ("Electric kettle", 450, 30),
            ("Microwave oven 20L", 2_990, 8),
            ("Blender", 890, 12),
            ("Refrigerator 2-door", 9_000, 4),
        ],
    ),
    (
        "Cooling",
        &[
            ("Desk fan 16in", 890, 25),
            ("Stand fan 18in", 1_190, 18),
            ("Air conditioner 12000 BTU", 14_900, 3),
            ("Air cooler", 3_490, 6),
        ],
    ),
    (
        "Entertainment",
        &[
            ("LED TV 43in", 8_990, 5),
            ("LED TV 55in", 15_990, 2),
            ("Bluetooth speaker", 1_590, 20),
        ],
    ),
    (
        "Laundry",
        &[
            ("Washing machine 8kg", 7_490, 4),
            ("Steam iron", 690, 22),
        ],
    ),
];

const CUSTOMERS: &[(&str, Option<&str>)] = &[
    ("Somchai Jaidee", Some("081-234-5678")),
    ("Malee Srisuk", Some("089-876-5432")),
    ("Anan Wongsa", None),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,siam=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path = env::var("SIAM_DB_PATH").unwrap_or_else(|_| String::from("./siam_dev.db"));
    let mut with_contract = true;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--no-contract" => with_contract = false,
            "--help" | "-h" => {
                println!("Siam POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./siam_dev.db)");
                println!("      --no-contract  Do not create the sample contract");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let engine = EngineConfig::from_env();
    info!(path = %db_path, ?engine, "Seeding database");

    let db = Database::new(DbConfig::new(&db_path).engine(engine)).await?;

    // Check existing products
    let existing = db.products().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        return Ok(());
    }

    let start = std::time::Instant::now();

    let mut products = Vec::new();
    for (category, items) in CATALOG {
        for (name, price_baht, stock) in items.iter() {
            let product = db.products().create(name, price_baht * 100, *stock, None).await?;
            products.push(product);
        }
        info!(category, count = items.len(), "Seeded category");
    }

    let mut customers = Vec::new();
    for (name, phone) in CUSTOMERS {
        customers.push(db.customers().create(name, *phone).await?);
    }

    // One cash sale so reports have something to show.
    if products.len() >= 2 {
        let sale = db
            .sales()
            .submit_cash_sale(SaleRequest {
                lines: vec![
                    CartLine::new(&products[0].id, 1),
                    CartLine::new(&products[1].id, 2),
                ],
                customer_id: customers.first().map(|c| c.id.clone()),
                payment_method: PaymentMethod::Cash,
                discount_cents: 0,
                tax_cents: 0,
            })
            .await?;
        info!(receipt_number = %sale.receipt_number, total = sale.total_cents, "Seeded sale");
    }

    if with_contract {
        let fridge = products.iter().find(|p| p.name.starts_with("Refrigerator"));
        if let (Some(fridge), Some(customer)) = (fridge, customers.get(1)) {
            let contract = db
                .contracts()
                .create_contract(NewContract {
                    customer_id: customer.id.clone(),
                    total_amount_cents: fridge.unit_price_cents,
                    down_payment_cents: 0,
                    interest_rate_bps: 1500,
                    term_months: 12,
                    contract_date: None,
                    items: vec![ContractLine {
                        product_id: fridge.id.clone(),
                        quantity: 1,
                        unit_price_cents: None,
                    }],
                })
                .await?;
            info!(
                contract_number = %contract.contract_number,
                monthly_payment = contract.monthly_payment_cents,
                "Seeded contract"
            );
        }
    }

    info!(
        products = products.len(),
        customers = customers.len(),
        elapsed = ?start.elapsed(),
        "Seed complete"
    );
    Ok(())
}
