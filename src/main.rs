// src/main.rs
use anyhow::{bail, Context, Result};
use log::info;
use std::sync::Arc;
use std::time::Duration;

use mailorder_lib::config::{MailConfig, DEFAULT_POLL_INTERVAL_MINUTES};
use mailorder_lib::db::{connect, load_env_from_file};
use mailorder_lib::intake::poller::{spawn_polling, MailPoller};
use mailorder_lib::mail::connector::ImapConnector;
use mailorder_lib::mail::notify::{Notifier, SmtpNotifier};
use mailorder_lib::store::postgres::PgOrderStore;
use mailorder_lib::store::OrderStore;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting email-to-order intake service");
    load_env_from_file(".env")?;

    let mail_config = MailConfig::from_env();
    mail_config.log_config();
    let imap = match mail_config.imap.clone() {
        Some(imap) => imap,
        None => bail!("IMAP is not configured - set MAILORDER_IMAP_HOST/_USER/_PASSWORD"),
    };

    let pool = connect().await.context("Failed to connect to database")?;
    let pg_store = PgOrderStore::new(pool);
    pg_store.init_schema().await?;
    let store: Arc<dyn OrderStore> = Arc::new(pg_store);

    let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::new(mail_config.smtp.clone())?);

    let interval_minutes = std::env::var("MAILORDER_POLL_INTERVAL_MINUTES")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_POLL_INTERVAL_MINUTES);

    let poller = Arc::new(MailPoller::new(Box::new(ImapConnector::new(imap))));
    let handle = spawn_polling(
        Arc::clone(&poller),
        store,
        notifier,
        Duration::from_secs(interval_minutes * 60),
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, stopping poller");
    handle.abort();
    Ok(())
}
