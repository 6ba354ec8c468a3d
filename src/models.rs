// src/models.rs
// Core data model for the email-to-order intake pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedEmailId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingOrderId(pub String);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ParsedEmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PendingOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of the product catalog snapshot the matcher runs against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    pub price: f64,
}

/// An order email as handed to the intake pipeline.
#[derive(Debug, Clone)]
pub struct IncomingOrderEmail {
    pub sender_email: String,
    pub subject: String,
    pub body: String,
    /// Upstream message id (IMAP Message-ID), used as a re-ingestion dedup key.
    pub external_message_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Statuses
// ---------------------------------------------------------------------------

/// Lifecycle status of a stored parsed email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmailStatus {
    Parsed,
    Duplicate,
    Error,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Parsed => "PARSED",
            EmailStatus::Duplicate => "DUPLICATE",
            EmailStatus::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PARSED" => Some(EmailStatus::Parsed),
            "DUPLICATE" => Some(EmailStatus::Duplicate),
            "ERROR" => Some(EmailStatus::Error),
            _ => None,
        }
    }
}

/// Status of a pending order. Transitions are forward-only: REJECTED and
/// PROCESSED are terminal, and APPROVED always precedes PROCESSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    PendingReview,
    AutoApproved,
    DuplicateWarning,
    Approved,
    Rejected,
    Processed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingReview => "PENDING_REVIEW",
            OrderStatus::AutoApproved => "AUTO_APPROVED",
            OrderStatus::DuplicateWarning => "DUPLICATE_WARNING",
            OrderStatus::Approved => "APPROVED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Processed => "PROCESSED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING_REVIEW" => Some(OrderStatus::PendingReview),
            "AUTO_APPROVED" => Some(OrderStatus::AutoApproved),
            "DUPLICATE_WARNING" => Some(OrderStatus::DuplicateWarning),
            "APPROVED" => Some(OrderStatus::Approved),
            "REJECTED" => Some(OrderStatus::Rejected),
            "PROCESSED" => Some(OrderStatus::Processed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Rejected | OrderStatus::Processed)
    }

    /// Whether a review-time transition to `next` is allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match (self, next) {
            (OrderStatus::PendingReview, OrderStatus::Approved)
            | (OrderStatus::PendingReview, OrderStatus::Rejected)
            | (OrderStatus::AutoApproved, OrderStatus::Approved)
            | (OrderStatus::AutoApproved, OrderStatus::Rejected)
            | (OrderStatus::DuplicateWarning, OrderStatus::Approved)
            | (OrderStatus::DuplicateWarning, OrderStatus::Rejected)
            | (OrderStatus::Approved, OrderStatus::Processed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Parse + match results (ephemeral, never persisted)
// ---------------------------------------------------------------------------

/// Output of the pattern engine: one extraction candidate from the email body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseCandidate {
    pub quantity: i32,
    /// Product phrase exactly as captured by the pattern, trimmed.
    pub raw_phrase: String,
    pub pattern: &'static str,
    pub base_confidence: f64,
}

/// Why the pattern engine produced no candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub kind: ParseFailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailureKind {
    Unparseable,
}

impl ParseFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseFailureKind::Unparseable => "UNPARSEABLE",
        }
    }
}

/// Catalog match tier, in decreasing quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Contains,
    Fuzzy,
}

/// Outcome of resolving an extracted phrase against the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "match_type", rename_all = "snake_case")]
pub enum ProductMatch {
    Matched {
        product: CatalogProduct,
        tier: MatchTier,
    },
    /// Normalization stripped the phrase down to nothing.
    InvalidName,
    /// The catalog snapshot was empty.
    NoProducts,
    NoMatch,
}

impl ProductMatch {
    pub fn product(&self) -> Option<&CatalogProduct> {
        match self {
            ProductMatch::Matched { product, .. } => Some(product),
            _ => None,
        }
    }

    pub fn tier(&self) -> Option<MatchTier> {
        match self {
            ProductMatch::Matched { tier, .. } => Some(*tier),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// A parsed email row to insert.
#[derive(Debug, Clone)]
pub struct NewParsedEmail {
    pub sender_email: String,
    pub subject: String,
    pub raw_body: String,
    pub status: EmailStatus,
    pub error_message: Option<String>,
    pub external_message_id: Option<String>,
    pub duplicate_of: Option<PendingOrderId>,
}

/// A pending order row to insert alongside its parsed email.
#[derive(Debug, Clone)]
pub struct NewPendingOrder {
    pub sender_email: String,
    pub quantity: i32,
    pub product_name: String,
    pub product_id: Option<ProductId>,
    pub confidence: f64,
    pub status: OrderStatus,
}

/// A stored pending order, as read back for review or processing.
#[derive(Debug, Clone, Serialize)]
pub struct PendingOrder {
    pub id: PendingOrderId,
    pub parsed_email_id: ParsedEmailId,
    pub sender_email: String,
    pub quantity: i32,
    pub product_name: String,
    pub product_id: Option<ProductId>,
    pub confidence: f64,
    pub status: OrderStatus,
    pub admin_notes: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-sender parse attempt counter for the fixed 60-second window.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitCounter {
    pub sender_email: String,
    pub count: i32,
    pub window_started_at: DateTime<Utc>,
    /// Advisory only: set when a sender hits the cap, cleared on window reset.
    pub throttled: bool,
}

/// The most recent earlier order matching a (sender, product, quantity) triple.
#[derive(Debug, Clone)]
pub struct DuplicateHit {
    pub order_id: PendingOrderId,
    pub created_at: DateTime<Utc>,
}

/// Aggregated parsing error row (deduplicated per sender + kind per 24 h).
#[derive(Debug, Clone, Serialize)]
pub struct ParsingErrorRecord {
    pub id: String,
    pub sender_email: String,
    pub error_type: String,
    pub error_message: String,
    pub attempt_count: i32,
    pub first_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of materializing a sales order + invoice from an approved pending order.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    pub order_id: String,
    pub invoice_id: String,
    pub invoice_number: String,
    pub total_amount: f64,
}

// ---------------------------------------------------------------------------
// Intake result
// ---------------------------------------------------------------------------

/// Rejection reasons surfaced to the caller of the intake operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    RateLimited,
    Unparseable,
    ProcessingError,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::RateLimited => "RATE_LIMITED",
            RejectReason::Unparseable => "UNPARSEABLE",
            RejectReason::ProcessingError => "PROCESSING_ERROR",
        }
    }
}

/// Everything the caller learns about an accepted intake.
#[derive(Debug, Clone, Serialize)]
pub struct AcceptedIntake {
    pub pending_order_id: PendingOrderId,
    pub email_id: ParsedEmailId,
    pub quantity: i32,
    pub product_name: String,
    pub product_id: Option<ProductId>,
    pub confidence: f64,
    pub status: OrderStatus,
    pub is_duplicate: bool,
    pub duplicate_of: Option<PendingOrderId>,
}

/// Terminal outcome of `process_incoming_order_email`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OrderIntakeResult {
    Accepted(AcceptedIntake),
    Rejected {
        reason: RejectReason,
        message: String,
    },
}

impl OrderIntakeResult {
    pub fn rejected(reason: RejectReason, message: impl Into<String>) -> Self {
        OrderIntakeResult::Rejected {
            reason,
            message: message.into(),
        }
    }

    pub fn accepted(&self) -> Option<&AcceptedIntake> {
        match self {
            OrderIntakeResult::Accepted(a) => Some(a),
            OrderIntakeResult::Rejected { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Review queue + statistics
// ---------------------------------------------------------------------------

/// Filter for the operator review queue.
#[derive(Debug, Clone, Default)]
pub struct ReviewQueueFilter {
    /// Specific status; `None` means the default review set
    /// (PENDING_REVIEW + DUPLICATE_WARNING).
    pub status: Option<OrderStatus>,
    pub min_confidence: Option<f64>,
    pub max_confidence: Option<f64>,
}

/// One review queue row with full provenance for the reviewer.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewQueueEntry {
    pub order: PendingOrder,
    pub email_subject: Option<String>,
    pub email_body: Option<String>,
    pub catalog_name: Option<String>,
    pub catalog_price: Option<f64>,
}

/// Aggregate intake statistics for the operator dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IntakeStats {
    pub total_orders: i64,
    pub pending_review: i64,
    pub auto_approved: i64,
    pub approved: i64,
    pub rejected: i64,
    pub duplicate_warnings: i64,
    pub processed: i64,
    pub recent_errors: i64,
    pub avg_confidence: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrip() {
        for status in [
            OrderStatus::PendingReview,
            OrderStatus::AutoApproved,
            OrderStatus::DuplicateWarning,
            OrderStatus::Approved,
            OrderStatus::Rejected,
            OrderStatus::Processed,
        ] {
            assert_eq!(OrderStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::from_str("NOPE"), None);
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Processed.is_terminal());
        assert!(!OrderStatus::Approved.is_terminal());
        assert!(!OrderStatus::PendingReview.is_terminal());
    }

    #[test]
    fn transitions_are_forward_only() {
        assert!(OrderStatus::PendingReview.can_transition_to(OrderStatus::Approved));
        assert!(OrderStatus::AutoApproved.can_transition_to(OrderStatus::Approved));
        assert!(OrderStatus::DuplicateWarning.can_transition_to(OrderStatus::Rejected));
        assert!(OrderStatus::Approved.can_transition_to(OrderStatus::Processed));

        // APPROVED precedes PROCESSED, never the reverse.
        assert!(!OrderStatus::PendingReview.can_transition_to(OrderStatus::Processed));
        assert!(!OrderStatus::Processed.can_transition_to(OrderStatus::Approved));

        // Terminal states never advance.
        assert!(!OrderStatus::Rejected.can_transition_to(OrderStatus::Approved));
        assert!(!OrderStatus::Processed.can_transition_to(OrderStatus::Rejected));

        // An approved order is already on the processing path.
        assert!(!OrderStatus::Approved.can_transition_to(OrderStatus::Rejected));
    }

    #[test]
    fn email_status_roundtrip() {
        for status in [EmailStatus::Parsed, EmailStatus::Duplicate, EmailStatus::Error] {
            assert_eq!(EmailStatus::from_str(status.as_str()), Some(status));
        }
    }
}
