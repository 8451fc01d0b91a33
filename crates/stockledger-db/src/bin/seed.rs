//! # Seed Data Generator
//!
//! Populates the ledger with items and batches for development.
//!
//! ## Usage
//! ```bash
//! # Generate 100 items (default)
//! cargo run -p stockledger-db --bin seed
//!
//! # Generate custom amount
//! cargo run -p stockledger-db --bin seed -- --count 160
//!
//! # Specify database path or config file
//! cargo run -p stockledger-db --bin seed -- --db ./data/ledger.db
//! cargo run -p stockledger-db --bin seed -- --config ./stockledger.toml
//! ```
//!
//! ## What Gets Generated
//! Everything goes through the ledger itself, so every seeded item satisfies
//! the batch/aggregate invariant:
//! - a stock-in import with one to three dated lots per item, plus an
//!   indefinite lot for every third item
//! - a stock-out import for every other item
//! - a maintenance pass (`reconcile_all`) that must find nothing to fix

use chrono::{Duration, Utc};
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stockledger_core::{StockInRow, StockOutRow};
use stockledger_db::{Database, LedgerConfig};

/// Item families and their category references.
const FAMILIES: &[(&str, &[&str])] = &[
    (
        "Analgesics",
        &[
            "Paracetamol",
            "Ibuprofen",
            "Naproxen",
            "Aspirin",
            "Diclofenac Gel",
        ],
    ),
    (
        "Antibiotics",
        &[
            "Amoxicillin",
            "Azithromycin",
            "Cephalexin",
            "Doxycycline",
            "Ciprofloxacin",
        ],
    ),
    (
        "Allergy",
        &[
            "Cetirizine",
            "Loratadine",
            "Fexofenadine",
            "Diphenhydramine",
            "Chlorphenamine",
        ],
    ),
    (
        "First Aid",
        &[
            "Gauze Pads",
            "Adhesive Bandages",
            "Medical Tape",
            "Saline Solution",
            "Antiseptic Wipes",
        ],
    ),
];

/// Strength or pack variants.
const VARIANTS: &[&str] = &[
    "100mg", "200mg", "250mg", "500mg", "10-Pack", "20-Pack", "50ml", "100ml",
];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockledger=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 100;
    let mut db_path: Option<String> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(100);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stock Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>      Number of items to generate (default: 100, at most 160)");
                println!("  -d, --db <PATH>      Database file path (overrides config)");
                println!("      --config <PATH>  Config file (default: platform config dir)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = LedgerConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = PathBuf::from(path);
    }

    println!("Stock Ledger Seed Data Generator");
    println!("================================");
    println!("Database: {}", config.database.path.display());
    println!("Items:    {}", count);
    println!();

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.inventory().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} items", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let ledger = db.ledger(config.ledger_settings());

    // Stock-in
    println!();
    println!("Importing stock-in sheet...");
    let stock_in = stock_in_rows(count);
    let summary = ledger.import_stock_in(&stock_in).await;
    println!(
        "✓ Stock-in: {} rows, {} processed, {} errors in {} ms",
        summary.total_rows,
        summary.processed_count,
        summary.errors.len(),
        summary.elapsed_ms
    );
    for error in &summary.errors {
        eprintln!("  row {}: {} ({})", error.row, error.message, error.code);
    }

    // Stock-out
    println!();
    println!("Importing stock-out sheet...");
    let stock_out = stock_out_rows(&summary.succeeded_names);
    let summary = ledger.import_stock_out(&stock_out).await;
    println!(
        "✓ Stock-out: {} rows, {} processed, {} errors in {} ms",
        summary.total_rows,
        summary.processed_count,
        summary.errors.len(),
        summary.elapsed_ms
    );

    // Maintenance
    println!();
    println!("Verifying ledger consistency...");
    let report = ledger.reconcile_all().await?;
    println!(
        "  Reconciled {} items, {} failures",
        report.receipts.len(),
        report.failures.len()
    );

    let expired = ledger.expire_batches(Utc::now()).await?;
    println!(
        "  Expired {} batches ({} units)",
        expired.expired_batches, expired.expired_quantity
    );

    info!(items = db.inventory().count().await?, "Seed complete");
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Builds the stock-in sheet: one or more lots per item name.
fn stock_in_rows(count: usize) -> Vec<StockInRow> {
    let now = Utc::now();
    let mut rows = Vec::new();
    let mut generated = 0;

    'outer: for (category, names) in FAMILIES {
        for name in names.iter() {
            for variant in VARIANTS {
                if generated >= count {
                    break 'outer;
                }
                let seed = generated;
                let product_name = format!("{} {}", name, variant);

                let lots = 1 + seed % 3;
                for lot in 0..lots {
                    let days = 20 + ((seed * 37 + lot * 90) % 700) as i64;
                    rows.push(StockInRow {
                        product_name: product_name.clone(),
                        quantity: 5 + ((seed * 13 + lot * 7) % 60) as i64,
                        expiry: Some(now + Duration::days(days)),
                        category_hint: Some((*category).to_string()),
                    });
                }

                if seed % 3 == 0 {
                    rows.push(StockInRow {
                        product_name: product_name.clone(),
                        quantity: 3 + (seed % 10) as i64,
                        expiry: None,
                        category_hint: None,
                    });
                }

                generated += 1;
            }
        }
    }

    rows
}

/// Builds the stock-out sheet for every other received item: a sale of five
/// units, then a declared remaining count of 0 or 10 that the ledger
/// reconciles the batches to.
fn stock_out_rows(names: &[String]) -> Vec<StockOutRow> {
    let mut unique: Vec<&String> = Vec::new();
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }

    unique
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| idx % 2 == 0)
        .map(|(idx, name)| StockOutRow {
            product_name: name.to_string(),
            declared_remaining: (idx % 4) as i64 * 5,
            sold: Some(5),
        })
        .collect()
}
