// src/store/mod.rs
// Persistence seam for the intake pipeline. The orchestrator only talks to
// `OrderStore`; the Postgres implementation backs production, the in-memory
// implementation backs tests and the simulate/test-parse tooling.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    CatalogProduct, CreatedOrder, DuplicateHit, IntakeStats, NewParsedEmail, NewPendingOrder,
    OrderStatus, ParsedEmailId, ParsingErrorRecord, PendingOrder, PendingOrderId, ProductId,
    RateLimitCounter, ReviewQueueEntry, ReviewQueueFilter,
};

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Full product catalog snapshot for matching.
    async fn product_catalog(&self) -> Result<Vec<CatalogProduct>>;

    async fn fetch_rate_limit(&self, sender_email: &str) -> Result<Option<RateLimitCounter>>;

    /// Write back a rate-limit counter (insert or replace by sender).
    async fn store_rate_limit(&self, counter: &RateLimitCounter) -> Result<()>;

    /// Most recent non-rejected pending order with the same
    /// (sender, product, quantity) triple created after `since`.
    async fn find_recent_duplicate(
        &self,
        sender_email: &str,
        product_id: &ProductId,
        quantity: i32,
        since: DateTime<Utc>,
    ) -> Result<Option<DuplicateHit>>;

    /// Record a parse failure. An existing row for the same sender + error
    /// type created after `since` has its attempt counter incremented
    /// instead of inserting a new row.
    async fn record_parsing_error(
        &self,
        sender_email: &str,
        raw_body: &str,
        error_type: &str,
        error_message: &str,
        since: DateTime<Utc>,
    ) -> Result<()>;

    /// Store an email that produced no order (error path).
    async fn persist_email(&self, email: &NewParsedEmail) -> Result<ParsedEmailId>;

    /// Store the parsed email and its pending order as one atomic write.
    async fn persist_intake(
        &self,
        email: &NewParsedEmail,
        order: &NewPendingOrder,
    ) -> Result<(ParsedEmailId, PendingOrderId)>;

    async fn fetch_pending_order(&self, id: &PendingOrderId) -> Result<Option<PendingOrder>>;

    /// Review-time status update. Approval stamps `approved_at`/`approved_by`.
    async fn update_order_review(
        &self,
        id: &PendingOrderId,
        status: OrderStatus,
        notes: Option<&str>,
        actor: Option<&str>,
    ) -> Result<()>;

    /// Materialize a sales order + invoice from an approved pending order
    /// and mark the pending order PROCESSED. The status guard lives in the
    /// orchestrator, not here.
    async fn create_order_from_pending(&self, id: &PendingOrderId) -> Result<CreatedOrder>;

    async fn list_review_queue(&self, filter: &ReviewQueueFilter) -> Result<Vec<ReviewQueueEntry>>;

    async fn recent_parsing_errors(&self, since: DateTime<Utc>)
        -> Result<Vec<ParsingErrorRecord>>;

    async fn intake_stats(&self) -> Result<IntakeStats>;
}
