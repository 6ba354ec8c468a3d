// src/store/memory.rs
// In-memory OrderStore used by tests and local simulation. Mirrors the
// Postgres implementation's observable semantics, including catalog
// iteration order and the duplicate/rate-limit window arithmetic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    CatalogProduct, CreatedOrder, DuplicateHit, IntakeStats, NewParsedEmail, NewPendingOrder,
    OrderStatus, ParsedEmailId, ParsingErrorRecord, PendingOrder, PendingOrderId, ProductId,
    RateLimitCounter, ReviewQueueEntry, ReviewQueueFilter,
};
use crate::store::OrderStore;

#[derive(Debug, Clone)]
pub struct StoredEmail {
    pub id: ParsedEmailId,
    pub email: NewParsedEmail,
    pub created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    catalog: Vec<CatalogProduct>,
    emails: Vec<StoredEmail>,
    orders: Vec<PendingOrder>,
    errors: Vec<ParsingErrorRecord>,
    rate_limits: HashMap<String, RateLimitCounter>,
    created_orders: Vec<CreatedOrder>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn with_catalog(catalog: Vec<CatalogProduct>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                catalog,
                ..Inner::default()
            }),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent email/order writes fail, to exercise the
    /// PROCESSING_ERROR path.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Rewrites an order's creation timestamp (duplicate-window tests).
    pub async fn backdate_order(&self, id: &PendingOrderId, created_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        if let Some(order) = inner.orders.iter_mut().find(|o| &o.id == id) {
            order.created_at = created_at;
        }
    }

    pub async fn stored_emails(&self) -> Vec<StoredEmail> {
        self.inner.lock().await.emails.clone()
    }

    pub async fn stored_orders(&self) -> Vec<PendingOrder> {
        self.inner.lock().await.orders.clone()
    }

    pub async fn stored_errors(&self) -> Vec<ParsingErrorRecord> {
        self.inner.lock().await.errors.clone()
    }

    pub async fn materialized_orders(&self) -> Vec<CreatedOrder> {
        self.inner.lock().await.created_orders.clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn product_catalog(&self) -> Result<Vec<CatalogProduct>> {
        Ok(self.inner.lock().await.catalog.clone())
    }

    async fn fetch_rate_limit(&self, sender_email: &str) -> Result<Option<RateLimitCounter>> {
        Ok(self.inner.lock().await.rate_limits.get(sender_email).cloned())
    }

    async fn store_rate_limit(&self, counter: &RateLimitCounter) -> Result<()> {
        self.inner
            .lock()
            .await
            .rate_limits
            .insert(counter.sender_email.clone(), counter.clone());
        Ok(())
    }

    async fn find_recent_duplicate(
        &self,
        sender_email: &str,
        product_id: &ProductId,
        quantity: i32,
        since: DateTime<Utc>,
    ) -> Result<Option<DuplicateHit>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .orders
            .iter()
            .filter(|o| {
                o.sender_email == sender_email
                    && o.product_id.as_ref() == Some(product_id)
                    && o.quantity == quantity
                    && o.created_at > since
                    && o.status != OrderStatus::Rejected
            })
            .max_by_key(|o| o.created_at)
            .map(|o| DuplicateHit {
                order_id: o.id.clone(),
                created_at: o.created_at,
            }))
    }

    async fn record_parsing_error(
        &self,
        sender_email: &str,
        _raw_body: &str,
        error_type: &str,
        error_message: &str,
        since: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let existing = inner.errors.iter_mut().find(|e| {
            e.sender_email == sender_email && e.error_type == error_type && e.created_at > since
        });
        match existing {
            Some(error) => error.attempt_count += 1,
            None => {
                let now = Utc::now();
                inner.errors.push(ParsingErrorRecord {
                    id: Uuid::new_v4().to_string(),
                    sender_email: sender_email.to_string(),
                    error_type: error_type.to_string(),
                    error_message: error_message.to_string(),
                    attempt_count: 1,
                    first_attempt_at: now,
                    created_at: now,
                });
            }
        }
        Ok(())
    }

    async fn persist_email(&self, email: &NewParsedEmail) -> Result<ParsedEmailId> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated storage failure");
        }
        let id = ParsedEmailId(Uuid::new_v4().to_string());
        self.inner.lock().await.emails.push(StoredEmail {
            id: id.clone(),
            email: email.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn persist_intake(
        &self,
        email: &NewParsedEmail,
        order: &NewPendingOrder,
    ) -> Result<(ParsedEmailId, PendingOrderId)> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated storage failure");
        }
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let email_id = ParsedEmailId(Uuid::new_v4().to_string());
        inner.emails.push(StoredEmail {
            id: email_id.clone(),
            email: email.clone(),
            created_at: now,
        });
        let order_id = PendingOrderId(Uuid::new_v4().to_string());
        inner.orders.push(PendingOrder {
            id: order_id.clone(),
            parsed_email_id: email_id.clone(),
            sender_email: order.sender_email.clone(),
            quantity: order.quantity,
            product_name: order.product_name.clone(),
            product_id: order.product_id.clone(),
            confidence: order.confidence,
            status: order.status,
            admin_notes: None,
            approved_at: None,
            approved_by: None,
            created_at: now,
        });
        Ok((email_id, order_id))
    }

    async fn fetch_pending_order(&self, id: &PendingOrderId) -> Result<Option<PendingOrder>> {
        Ok(self
            .inner
            .lock()
            .await
            .orders
            .iter()
            .find(|o| &o.id == id)
            .cloned())
    }

    async fn update_order_review(
        &self,
        id: &PendingOrderId,
        status: OrderStatus,
        notes: Option<&str>,
        actor: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let order = match inner.orders.iter_mut().find(|o| &o.id == id) {
            Some(order) => order,
            None => bail!("Pending order {} not found", id),
        };
        order.status = status;
        if status == OrderStatus::Approved {
            order.admin_notes = notes.map(|n| n.to_string());
            order.approved_at = Some(Utc::now());
            order.approved_by = actor.map(|a| a.to_string());
        } else if let Some(notes) = notes {
            order.admin_notes = Some(notes.to_string());
        }
        Ok(())
    }

    async fn create_order_from_pending(&self, id: &PendingOrderId) -> Result<CreatedOrder> {
        let mut inner = self.inner.lock().await;
        let catalog = inner.catalog.clone();
        let order = match inner.orders.iter_mut().find(|o| &o.id == id) {
            Some(order) => order,
            None => bail!("Pending order {} not found", id),
        };
        let price = order
            .product_id
            .as_ref()
            .and_then(|pid| catalog.iter().find(|p| &p.id == pid))
            .map(|p| p.price)
            .unwrap_or(0.0);
        order.status = OrderStatus::Processed;
        if order.approved_at.is_none() {
            order.approved_at = Some(Utc::now());
        }
        let total_amount = price * f64::from(order.quantity);

        let created = CreatedOrder {
            order_id: Uuid::new_v4().to_string(),
            invoice_id: Uuid::new_v4().to_string(),
            invoice_number: format!("INV-{}", Utc::now().timestamp_millis()),
            total_amount,
        };
        inner.created_orders.push(created.clone());
        Ok(created)
    }

    async fn list_review_queue(&self, filter: &ReviewQueueFilter) -> Result<Vec<ReviewQueueEntry>> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<ReviewQueueEntry> = inner
            .orders
            .iter()
            .filter(|o| match filter.status {
                Some(status) => o.status == status,
                None => matches!(
                    o.status,
                    OrderStatus::PendingReview | OrderStatus::DuplicateWarning
                ),
            })
            .filter(|o| filter.min_confidence.map_or(true, |min| o.confidence >= min))
            .filter(|o| filter.max_confidence.map_or(true, |max| o.confidence <= max))
            .map(|o| {
                let email = inner.emails.iter().find(|e| e.id == o.parsed_email_id);
                let product = o
                    .product_id
                    .as_ref()
                    .and_then(|pid| inner.catalog.iter().find(|p| &p.id == pid));
                ReviewQueueEntry {
                    order: o.clone(),
                    email_subject: email.map(|e| e.email.subject.clone()),
                    email_body: email.map(|e| e.email.raw_body.clone()),
                    catalog_name: product.map(|p| p.name.clone()),
                    catalog_price: product.map(|p| p.price),
                }
            })
            .collect();
        entries.sort_by(|a, b| {
            a.order
                .confidence
                .partial_cmp(&b.order.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.order.created_at.cmp(&a.order.created_at))
        });
        Ok(entries)
    }

    async fn recent_parsing_errors(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ParsingErrorRecord>> {
        let inner = self.inner.lock().await;
        let mut errors: Vec<ParsingErrorRecord> = inner
            .errors
            .iter()
            .filter(|e| e.created_at > since)
            .cloned()
            .collect();
        errors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        errors.truncate(100);
        Ok(errors)
    }

    async fn intake_stats(&self) -> Result<IntakeStats> {
        let inner = self.inner.lock().await;
        let count = |status: OrderStatus| -> i64 {
            inner.orders.iter().filter(|o| o.status == status).count() as i64
        };
        let since = Utc::now() - chrono::Duration::days(crate::config::RECENT_ERRORS_WINDOW_DAYS);
        let recent: Vec<&PendingOrder> =
            inner.orders.iter().filter(|o| o.created_at > since).collect();
        let avg_confidence = if recent.is_empty() {
            0.0
        } else {
            recent.iter().map(|o| o.confidence).sum::<f64>() / recent.len() as f64
        };
        Ok(IntakeStats {
            total_orders: inner.orders.len() as i64,
            pending_review: count(OrderStatus::PendingReview),
            auto_approved: count(OrderStatus::AutoApproved),
            approved: count(OrderStatus::Approved),
            rejected: count(OrderStatus::Rejected),
            duplicate_warnings: count(OrderStatus::DuplicateWarning),
            processed: count(OrderStatus::Processed),
            recent_errors: inner.errors.iter().filter(|e| e.created_at > since).count() as i64,
            avg_confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailStatus;

    fn order_fixture(sender: &str, product: &str, quantity: i32) -> NewPendingOrder {
        NewPendingOrder {
            sender_email: sender.to_string(),
            quantity,
            product_name: product.to_string(),
            product_id: Some(ProductId("p1".to_string())),
            confidence: 0.9,
            status: OrderStatus::PendingReview,
        }
    }

    fn email_fixture(sender: &str) -> NewParsedEmail {
        NewParsedEmail {
            sender_email: sender.to_string(),
            subject: "Bestellung".to_string(),
            raw_body: "Ich möchte 3 Laptop bestellen".to_string(),
            status: EmailStatus::Parsed,
            error_message: None,
            external_message_id: None,
            duplicate_of: None,
        }
    }

    #[tokio::test]
    async fn intake_pair_is_stored_together() {
        let store = MemoryStore::new();
        let (email_id, order_id) = store
            .persist_intake(&email_fixture("kunde@example.com"), &order_fixture("kunde@example.com", "Laptop", 3))
            .await
            .unwrap();
        let orders = store.stored_orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, order_id);
        assert_eq!(orders[0].parsed_email_id, email_id);
    }

    #[tokio::test]
    async fn failed_writes_leave_no_state() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        let result = store
            .persist_intake(&email_fixture("kunde@example.com"), &order_fixture("kunde@example.com", "Laptop", 3))
            .await;
        assert!(result.is_err());
        assert!(store.stored_orders().await.is_empty());
        assert!(store.stored_emails().await.is_empty());
    }

    #[tokio::test]
    async fn parsing_errors_are_aggregated_within_window() {
        let store = MemoryStore::new();
        let since = Utc::now() - chrono::Duration::hours(24);
        for _ in 0..3 {
            store
                .record_parsing_error("kunde@example.com", "junk", "UNPARSEABLE", "no pattern", since)
                .await
                .unwrap();
        }
        let errors = store.stored_errors().await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].attempt_count, 3);
    }

    #[tokio::test]
    async fn review_queue_shows_least_confident_first() {
        let store = MemoryStore::with_catalog(vec![CatalogProduct {
            id: ProductId("p1".to_string()),
            name: "Laptop".to_string(),
            price: 999.0,
        }]);

        let mut shaky = order_fixture("a@example.com", "Laptop", 1);
        shaky.confidence = 0.45;
        shaky.status = OrderStatus::DuplicateWarning;
        store
            .persist_intake(&email_fixture("a@example.com"), &shaky)
            .await
            .unwrap();

        let mut solid = order_fixture("b@example.com", "Laptop", 2);
        solid.confidence = 0.75;
        store
            .persist_intake(&email_fixture("b@example.com"), &solid)
            .await
            .unwrap();

        let mut done = order_fixture("c@example.com", "Laptop", 3);
        done.confidence = 0.95;
        let (_, done_id) = store
            .persist_intake(&email_fixture("c@example.com"), &done)
            .await
            .unwrap();
        store.create_order_from_pending(&done_id).await.unwrap();

        let queue = store
            .list_review_queue(&ReviewQueueFilter::default())
            .await
            .unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].order.confidence, 0.45);
        assert_eq!(queue[1].order.confidence, 0.75);
        assert_eq!(queue[0].email_subject.as_deref(), Some("Bestellung"));
        assert_eq!(queue[0].catalog_name.as_deref(), Some("Laptop"));

        let stats = store.intake_stats().await.unwrap();
        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.pending_review, 1);
        assert_eq!(stats.duplicate_warnings, 1);
        assert_eq!(stats.processed, 1);
    }

    #[tokio::test]
    async fn duplicate_lookup_ignores_rejected_and_old_orders() {
        let store = MemoryStore::new();
        let sender = "kunde@example.com";
        let (_, first) = store
            .persist_intake(&email_fixture(sender), &order_fixture(sender, "Laptop", 3))
            .await
            .unwrap();

        let since = Utc::now() - chrono::Duration::hours(24);
        let hit = store
            .find_recent_duplicate(sender, &ProductId("p1".to_string()), 3, since)
            .await
            .unwrap();
        assert_eq!(hit.unwrap().order_id, first);

        // Outside the window it is no longer a duplicate.
        store
            .backdate_order(&first, Utc::now() - chrono::Duration::hours(25))
            .await;
        let hit = store
            .find_recent_duplicate(sender, &ProductId("p1".to_string()), 3, since)
            .await
            .unwrap();
        assert!(hit.is_none());
    }
}
