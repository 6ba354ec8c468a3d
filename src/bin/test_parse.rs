// src/bin/test_parse.rs
// Operator tool: run a body through parse + match + score against the live
// catalog. Nothing is persisted.

use anyhow::{Context, Result};

use mailorder_lib::db::{connect, load_env_from_file};
use mailorder_lib::intake::test_parse;
use mailorder_lib::store::postgres::PgOrderStore;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let body = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if body.trim().is_empty() {
        eprintln!("Usage: test_parse <email body>");
        std::process::exit(2);
    }

    load_env_from_file(".env")?;
    let pool = connect().await.context("Failed to connect to database")?;
    let store = PgOrderStore::new(pool);

    let outcome = test_parse(&store, &body).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
