//! OMS Runtime
//!
//! - Opens the SQLite database and runs schema migrations
//! - Seeds empty statistics tables and recomputes the summary
//! - Serves JSON-lines requests from stdin, one response per line on stdout
//!
//! Usage:
//!   cargo run --release --bin oms_runtime < requests.jsonl
//!
//! Environment variables: see `OmsConfig::from_env`.

use dotenv::dotenv;
use env_logger::{Env, Target};
use log::{error, info};
use omsmini::aggregates::Seeder;
use omsmini::config::OmsConfig;
use omsmini::runtime::RuntimeContext;
use omsmini::store::schema::{apply_embedded_schema, run_schema_migrations};
use omsmini::store::Database;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stderr)
        .init();

    let config = OmsConfig::from_env();

    info!("🚀 OMS Runtime");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Schema dir: {}", config.schema_dir);
    info!("   ├─ Busy timeout: {}ms", config.busy_timeout_ms);
    info!(
        "   ├─ Retries: {} ({}ms..{}ms)",
        config.retry_attempts, config.retry_initial_ms, config.retry_max_ms
    );
    info!("   ├─ Retract on delete: {}", config.retract_on_delete);
    info!("   ├─ Refresh summary: {}", config.refresh_summary);
    info!("   └─ Seed on start: {}", config.seed_on_start);

    info!("🔧 Initializing database...");
    let db = Database::open(&config.db_path, config.busy_timeout())?;
    db.with_connection(|conn| {
        if Path::new(&config.schema_dir).is_dir() {
            run_schema_migrations(conn, &config.schema_dir)
        } else {
            info!("   └─ {} not found, using embedded schema", config.schema_dir);
            apply_embedded_schema(conn)
        }
    })?;
    info!("✅ Database initialized");

    if config.seed_on_start {
        Seeder::new(db.clone()).run().await?;
    }

    let ctx = RuntimeContext::new(db, &config);
    info!("📥 Reading requests from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut served = 0u64;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = ctx.handle_line(&line).await;
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        if let Err(e) = stdout.write_all(&out).await {
            error!("❌ Failed to write response: {}", e);
            break;
        }
        stdout.flush().await?;
        served += 1;
    }

    info!("✅ OMS runtime stopped after {} requests", served);
    Ok(())
}
