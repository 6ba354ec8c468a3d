// src/intake/poller.rs
// Mailbox poll cycles. A cycle fetches unseen messages and runs each one
// through the intake pipeline; a single in-flight guard makes a poll
// request arriving during an active cycle a skipped no-op (not queued).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::config::MailConfig;
use crate::intake::{notify_best_effort, process_incoming_order_email};
use crate::mail::connector::MailConnector;
use crate::mail::notify::{Notification, Notifier};
use crate::mail::parse::parse_incoming;
use crate::models::{OrderIntakeResult, OrderStatus, RejectReason};
use crate::store::OrderStore;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PollSummary {
    pub processed: usize,
    pub auto_approved: usize,
    pub pending_review: usize,
    pub duplicates: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollOutcome {
    pub skipped: bool,
    pub summary: PollSummary,
}

/// Status query surface for operators.
#[derive(Debug, Clone, Serialize)]
pub struct PollingStatus {
    pub cycle_in_flight: bool,
    pub imap_configured: bool,
    pub smtp_configured: bool,
}

pub struct MailPoller {
    connector: Arc<Mutex<Box<dyn MailConnector>>>,
    in_flight: AtomicBool,
}

impl MailPoller {
    pub fn new(connector: Box<dyn MailConnector>) -> Self {
        Self {
            connector: Arc::new(Mutex::new(connector)),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn status(&self, config: &MailConfig) -> PollingStatus {
        PollingStatus {
            cycle_in_flight: self.in_flight.load(Ordering::SeqCst),
            imap_configured: config.imap_configured(),
            smtp_configured: config.smtp_configured(),
        }
    }

    /// Run one poll cycle. Re-entry while a cycle is active returns
    /// `skipped: true` without touching the mailbox.
    pub async fn poll_once(
        &self,
        store: &dyn OrderStore,
        notifier: &dyn Notifier,
    ) -> Result<PollOutcome> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Poll cycle already running, skipping");
            return Ok(PollOutcome {
                skipped: true,
                summary: PollSummary::default(),
            });
        }

        let result = self.run_cycle(store, notifier).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result.map(|summary| PollOutcome {
            skipped: false,
            summary,
        })
    }

    async fn run_cycle(
        &self,
        store: &dyn OrderStore,
        notifier: &dyn Notifier,
    ) -> Result<PollSummary> {
        let connector = Arc::clone(&self.connector);
        let mails = tokio::task::spawn_blocking(move || {
            let mut guard = connector
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.fetch_unread()
        })
        .await
        .context("Mail fetch task panicked")?
        .context("Failed to fetch unread mail")?;

        let mut summary = PollSummary::default();
        if mails.is_empty() {
            return Ok(summary);
        }
        info!("Found {} unread emails", mails.len());

        for raw in mails {
            let mail = match parse_incoming(&raw) {
                Ok(mail) => mail,
                Err(e) => {
                    warn!("Skipping message {}: {:#}", raw.uid, e);
                    summary.errors += 1;
                    continue;
                }
            };

            let sender = mail.sender_email.clone();
            summary.processed += 1;
            match process_incoming_order_email(store, notifier, &mail).await {
                OrderIntakeResult::Accepted(accepted) => match accepted.status {
                    OrderStatus::AutoApproved => summary.auto_approved += 1,
                    OrderStatus::DuplicateWarning => summary.duplicates += 1,
                    _ => summary.pending_review += 1,
                },
                OrderIntakeResult::Rejected { reason, message } => {
                    summary.errors += 1;
                    if reason == RejectReason::Unparseable {
                        notify_best_effort(
                            notifier,
                            &sender,
                            &Notification::Clarification { reason: message },
                        )
                        .await;
                    }
                }
            }
        }

        Ok(summary)
    }
}

/// Spawn the periodic polling loop: an immediate first cycle, then one per
/// interval. Abort the returned handle to stop polling.
pub fn spawn_polling(
    poller: Arc<MailPoller>,
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting email polling every {:?}", interval);
        loop {
            match poller.poll_once(store.as_ref(), notifier.as_ref()).await {
                Ok(outcome) if !outcome.skipped => info!("Poll result: {:?}", outcome.summary),
                Ok(_) => {}
                Err(e) => warn!("Poll cycle failed: {:#}", e),
            }
            tokio::time::sleep(interval).await;
        }
    })
}
