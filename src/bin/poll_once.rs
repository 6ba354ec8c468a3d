// src/bin/poll_once.rs
// Operator tool: trigger a single mailbox poll cycle and print the summary.

use anyhow::{bail, Context, Result};

use mailorder_lib::config::MailConfig;
use mailorder_lib::db::{connect, load_env_from_file};
use mailorder_lib::intake::poller::MailPoller;
use mailorder_lib::mail::connector::ImapConnector;
use mailorder_lib::mail::notify::SmtpNotifier;
use mailorder_lib::store::postgres::PgOrderStore;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env_from_file(".env")?;

    let mail_config = MailConfig::from_env();
    mail_config.log_config();
    let imap = match mail_config.imap.clone() {
        Some(imap) => imap,
        None => bail!("IMAP is not configured - set MAILORDER_IMAP_HOST/_USER/_PASSWORD"),
    };

    let pool = connect().await.context("Failed to connect to database")?;
    let store = PgOrderStore::new(pool);
    store.init_schema().await?;
    let notifier = SmtpNotifier::new(mail_config.smtp.clone())?;

    let poller = MailPoller::new(Box::new(ImapConnector::new(imap)));
    let outcome = poller.poll_once(&store, &notifier).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
