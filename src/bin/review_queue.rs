// src/bin/review_queue.rs
// Operator tool: dump the pending review queue, recent parsing errors and
// intake statistics as JSON.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use mailorder_lib::config::RECENT_ERRORS_WINDOW_DAYS;
use mailorder_lib::db::{connect, load_env_from_file};
use mailorder_lib::models::{
    IntakeStats, OrderStatus, ParsingErrorRecord, ReviewQueueEntry, ReviewQueueFilter,
};
use mailorder_lib::store::postgres::PgOrderStore;
use mailorder_lib::store::OrderStore;

#[derive(Serialize)]
struct ReviewReport {
    queue: Vec<ReviewQueueEntry>,
    recent_errors: Vec<ParsingErrorRecord>,
    stats: IntakeStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env_from_file(".env")?;

    // Optional status filter, e.g. `review_queue PENDING_REVIEW`.
    let filter = ReviewQueueFilter {
        status: std::env::args().nth(1).and_then(|s| OrderStatus::from_str(&s)),
        min_confidence: None,
        max_confidence: None,
    };

    let pool = connect().await.context("Failed to connect to database")?;
    let store = PgOrderStore::new(pool);

    let since = Utc::now() - chrono::Duration::days(RECENT_ERRORS_WINDOW_DAYS);
    let report = ReviewReport {
        queue: store.list_review_queue(&filter).await?,
        recent_errors: store.recent_parsing_errors(since).await?,
        stats: store.intake_stats().await?,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
