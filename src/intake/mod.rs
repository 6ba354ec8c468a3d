// src/intake/mod.rs
// Order intake orchestration: one email in, one terminal outcome out.
// Per-email steps run strictly in sequence: normalize -> pattern-match ->
// fuzzy-match -> score -> rate-limit/duplicate guard -> persist -> route.

pub mod poller;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::config::{AUTO_APPROVE_THRESHOLD, ERROR_DEDUP_WINDOW_HOURS};
use crate::guard::{check_duplicate, check_rate_limit, RateLimitDecision};
use crate::mail::notify::{Notification, Notifier};
use crate::matching::find_product_match;
use crate::models::{
    AcceptedIntake, CreatedOrder, EmailStatus, IncomingOrderEmail, NewParsedEmail,
    NewPendingOrder, OrderIntakeResult, OrderStatus, ParseCandidate, PendingOrderId, ProductMatch,
    RejectReason,
};
use crate::parsing::parse_body;
use crate::scoring::final_confidence;
use crate::store::OrderStore;

/// Process one incoming order email to a terminal outcome. Internal
/// failures (catalog or storage I/O) surface as PROCESSING_ERROR without
/// partial pending-order state; the parsed-email + pending-order pair is
/// written atomically by the store.
pub async fn process_incoming_order_email(
    store: &dyn OrderStore,
    notifier: &dyn Notifier,
    email: &IncomingOrderEmail,
) -> OrderIntakeResult {
    match process_inner(store, notifier, email).await {
        Ok(result) => result,
        Err(e) => {
            warn!(
                "Processing error for email from {}: {:#}",
                email.sender_email, e
            );
            OrderIntakeResult::rejected(RejectReason::ProcessingError, format!("{:#}", e))
        }
    }
}

async fn process_inner(
    store: &dyn OrderStore,
    notifier: &dyn Notifier,
    email: &IncomingOrderEmail,
) -> Result<OrderIntakeResult> {
    let now = Utc::now();

    let candidate = match parse_body(&email.body) {
        Ok(candidate) => candidate,
        Err(failure) => {
            let since = now - Duration::hours(ERROR_DEDUP_WINDOW_HOURS);
            store
                .record_parsing_error(
                    &email.sender_email,
                    &email.body,
                    failure.kind.as_str(),
                    &failure.message,
                    since,
                )
                .await
                .context("Failed to record parsing error")?;
            store
                .persist_email(&NewParsedEmail {
                    sender_email: email.sender_email.clone(),
                    subject: email.subject.clone(),
                    raw_body: email.body.clone(),
                    status: EmailStatus::Error,
                    error_message: Some(failure.message.clone()),
                    external_message_id: email.external_message_id.clone(),
                    duplicate_of: None,
                })
                .await
                .context("Failed to store unparseable email")?;
            return Ok(OrderIntakeResult::rejected(
                RejectReason::Unparseable,
                failure.message,
            ));
        }
    };

    let catalog = store
        .product_catalog()
        .await
        .context("Failed to fetch product catalog")?;
    let product_match = find_product_match(&candidate.raw_phrase, &catalog);
    let confidence = final_confidence(candidate.base_confidence, &product_match);

    match check_rate_limit(store, &email.sender_email, now).await? {
        RateLimitDecision::Allowed { .. } => {}
        RateLimitDecision::Limited { message, .. } => {
            return Ok(OrderIntakeResult::rejected(
                RejectReason::RateLimited,
                message,
            ));
        }
    }

    let product_id = product_match.product().map(|p| p.id.clone());
    let duplicate = check_duplicate(
        store,
        &email.sender_email,
        product_id.as_ref(),
        candidate.quantity,
        now,
    )
    .await
    .context("Failed to check for duplicate orders")?;

    let (email_status, duplicate_of) = match &duplicate {
        Some(hit) => (EmailStatus::Duplicate, Some(hit.order_id.clone())),
        None => (EmailStatus::Parsed, None),
    };

    // Duplicates are surfaced for human judgment regardless of confidence.
    let status = if duplicate.is_some() {
        OrderStatus::DuplicateWarning
    } else if confidence >= AUTO_APPROVE_THRESHOLD {
        OrderStatus::AutoApproved
    } else {
        OrderStatus::PendingReview
    };

    let product_name = product_match
        .product()
        .map(|p| p.name.clone())
        .unwrap_or_else(|| candidate.raw_phrase.clone());

    let (email_id, order_id) = store
        .persist_intake(
            &NewParsedEmail {
                sender_email: email.sender_email.clone(),
                subject: email.subject.clone(),
                raw_body: email.body.clone(),
                status: email_status,
                error_message: None,
                external_message_id: email.external_message_id.clone(),
                duplicate_of: duplicate_of.clone(),
            },
            &NewPendingOrder {
                sender_email: email.sender_email.clone(),
                quantity: candidate.quantity,
                product_name: product_name.clone(),
                product_id: product_id.clone(),
                confidence,
                status,
            },
        )
        .await
        .context("Failed to persist parsed email and pending order")?;

    info!(
        "Intake {} from {}: {} x '{}' via {} -> confidence {:.2}, status {}",
        order_id, email.sender_email, candidate.quantity, product_name, candidate.pattern,
        confidence, status
    );

    if status == OrderStatus::AutoApproved {
        // Same path as a manual approval; a failure here is logged and left
        // for the review queue, the intake itself already succeeded.
        if let Err(e) = approve_pending_order(store, notifier, &order_id, None, None).await {
            warn!(
                "Auto-approval processing failed for order {}: {:#}",
                order_id, e
            );
        }
    }

    Ok(OrderIntakeResult::Accepted(AcceptedIntake {
        pending_order_id: order_id,
        email_id,
        quantity: candidate.quantity,
        product_name,
        product_id,
        confidence,
        status,
        is_duplicate: duplicate.is_some(),
        duplicate_of,
    }))
}

/// Approve a pending order: forward-only status guard, APPROVED stamp,
/// order + invoice creation (which marks it PROCESSED), confirmation mail.
/// Safe against re-processing: an already APPROVED/PROCESSED/REJECTED
/// order is refused.
pub async fn approve_pending_order(
    store: &dyn OrderStore,
    notifier: &dyn Notifier,
    id: &PendingOrderId,
    notes: Option<&str>,
    actor: Option<&str>,
) -> Result<CreatedOrder> {
    let order = store
        .fetch_pending_order(id)
        .await?
        .with_context(|| format!("Pending order {} not found", id))?;
    if !order.status.can_transition_to(OrderStatus::Approved) {
        bail!(
            "Order {} cannot be approved from status {}",
            id,
            order.status
        );
    }

    store
        .update_order_review(id, OrderStatus::Approved, notes, actor)
        .await
        .context("Failed to mark pending order approved")?;
    let created = store
        .create_order_from_pending(id)
        .await
        .context("Failed to create order from approved pending order")?;

    notify_best_effort(
        notifier,
        &order.sender_email,
        &Notification::Approval {
            order_id: created.order_id.clone(),
            product_name: order.product_name.clone(),
            quantity: order.quantity,
        },
    )
    .await;

    info!(
        "Pending order {} approved -> order {}, invoice {}",
        id, created.order_id, created.invoice_number
    );
    Ok(created)
}

/// Reject a pending order. Terminal orders (PROCESSED, REJECTED) and
/// orders already on the approval path are refused.
pub async fn reject_pending_order(
    store: &dyn OrderStore,
    notifier: &dyn Notifier,
    id: &PendingOrderId,
    reason: Option<&str>,
    notes: Option<&str>,
    send_notification: bool,
) -> Result<()> {
    let order = store
        .fetch_pending_order(id)
        .await?
        .with_context(|| format!("Pending order {} not found", id))?;
    if !order.status.can_transition_to(OrderStatus::Rejected) {
        bail!(
            "Order {} cannot be rejected from status {}",
            id,
            order.status
        );
    }

    let note = notes.or(reason).unwrap_or("Rejected by admin");
    store
        .update_order_review(id, OrderStatus::Rejected, Some(note), None)
        .await
        .context("Failed to mark pending order rejected")?;

    if send_notification {
        notify_best_effort(
            notifier,
            &order.sender_email,
            &Notification::Rejection {
                reason: reason.unwrap_or("Order rejected").to_string(),
            },
        )
        .await;
    }

    info!("Pending order {} rejected", id);
    Ok(())
}

/// Send a notification, logging and swallowing failures: the order outcome
/// is already final by the time anything goes out.
pub async fn notify_best_effort(
    notifier: &dyn Notifier,
    recipient: &str,
    notification: &Notification,
) {
    if let Err(e) = notifier.notify(recipient, notification).await {
        warn!(
            "Failed to send {} notification to {}: {:#}",
            notification.kind(),
            recipient,
            e
        );
    }
}

/// Outcome of the operator test-parse entry point. Pure and repeatable:
/// nothing is persisted, no guard state is touched.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TestParseOutcome {
    Parsed {
        candidate: ParseCandidate,
        product_match: ProductMatch,
        confidence: f64,
    },
    Failed {
        message: String,
    },
}

/// Run a body through parse + match + score without side effects.
pub async fn test_parse(store: &dyn OrderStore, body: &str) -> Result<TestParseOutcome> {
    let candidate = match parse_body(body) {
        Ok(candidate) => candidate,
        Err(failure) => {
            return Ok(TestParseOutcome::Failed {
                message: failure.message,
            })
        }
    };
    let catalog = store
        .product_catalog()
        .await
        .context("Failed to fetch product catalog")?;
    let product_match = find_product_match(&candidate.raw_phrase, &catalog);
    let confidence = final_confidence(candidate.base_confidence, &product_match);
    Ok(TestParseOutcome::Parsed {
        candidate,
        product_match,
        confidence,
    })
}
