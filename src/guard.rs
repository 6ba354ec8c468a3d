// src/guard.rs
// Per-sender rate limiting and duplicate-order detection. The window
// arithmetic is pure; the store round-trips are sequential reads followed
// by a write-back, with no cross-request locking (two near-simultaneous
// emails from one sender may both read a stale counter - accepted).

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::config::{DUPLICATE_WINDOW_HOURS, RATE_LIMIT_MAX_ATTEMPTS, RATE_LIMIT_WINDOW_SECS};
use crate::models::{DuplicateHit, ProductId, RateLimitCounter};
use crate::store::OrderStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { count: i32 },
    Limited { count: i32, message: String },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Applies one parse attempt to a sender's counter. Returns the decision
/// and the counter state to write back.
///
/// Window semantics are fixed, not rolling: the window starts at the first
/// attempt after a reset, and once it is older than the window length the
/// next attempt resets the count to 1 (not 0) and clears the throttled flag.
pub fn evaluate_rate_limit(
    existing: Option<&RateLimitCounter>,
    sender_email: &str,
    now: DateTime<Utc>,
) -> (RateLimitDecision, RateLimitCounter) {
    let fresh = |count: i32| RateLimitCounter {
        sender_email: sender_email.to_string(),
        count,
        window_started_at: now,
        throttled: false,
    };

    let counter = match existing {
        None => return (RateLimitDecision::Allowed { count: 1 }, fresh(1)),
        Some(counter) => counter,
    };

    if now - counter.window_started_at > Duration::seconds(RATE_LIMIT_WINDOW_SECS) {
        return (RateLimitDecision::Allowed { count: 1 }, fresh(1));
    }

    if counter.count >= RATE_LIMIT_MAX_ATTEMPTS {
        let flagged = RateLimitCounter {
            throttled: true,
            ..counter.clone()
        };
        return (
            RateLimitDecision::Limited {
                count: counter.count,
                message: format!(
                    "Rate limit exceeded (max {} per minute)",
                    RATE_LIMIT_MAX_ATTEMPTS
                ),
            },
            flagged,
        );
    }

    let incremented = RateLimitCounter {
        count: counter.count + 1,
        ..counter.clone()
    };
    (
        RateLimitDecision::Allowed {
            count: incremented.count,
        },
        incremented,
    )
}

/// Read-evaluate-write rate limit check against the store.
pub async fn check_rate_limit(
    store: &dyn OrderStore,
    sender_email: &str,
    now: DateTime<Utc>,
) -> Result<RateLimitDecision> {
    let existing = store.fetch_rate_limit(sender_email).await?;
    let (decision, updated) = evaluate_rate_limit(existing.as_ref(), sender_email, now);
    store.store_rate_limit(&updated).await?;
    if let RateLimitDecision::Limited { count, .. } = &decision {
        debug!("Sender {} throttled at {} attempts", sender_email, count);
    }
    Ok(decision)
}

/// Duplicate lookup over the 24-hour window. Skipped entirely when no
/// product resolved.
pub async fn check_duplicate(
    store: &dyn OrderStore,
    sender_email: &str,
    product_id: Option<&ProductId>,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<Option<DuplicateHit>> {
    let product_id = match product_id {
        Some(id) => id,
        None => return Ok(None),
    };
    let since = now - Duration::hours(DUPLICATE_WINDOW_HOURS);
    store
        .find_recent_duplicate(sender_email, product_id, quantity, since)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENDER: &str = "kunde@example.com";

    #[test]
    fn first_attempt_opens_window() {
        let now = Utc::now();
        let (decision, counter) = evaluate_rate_limit(None, SENDER, now);
        assert_eq!(decision, RateLimitDecision::Allowed { count: 1 });
        assert_eq!(counter.count, 1);
        assert_eq!(counter.window_started_at, now);
        assert!(!counter.throttled);
    }

    #[test]
    fn five_attempts_allowed_sixth_limited() {
        let now = Utc::now();
        let mut state: Option<RateLimitCounter> = None;
        for expected in 1..=5 {
            let (decision, updated) = evaluate_rate_limit(state.as_ref(), SENDER, now);
            assert_eq!(decision, RateLimitDecision::Allowed { count: expected });
            state = Some(updated);
        }

        let (decision, updated) = evaluate_rate_limit(state.as_ref(), SENDER, now);
        assert!(!decision.is_allowed());
        assert!(updated.throttled);
        // The count stays at the cap; only the flag changes.
        assert_eq!(updated.count, 5);
    }

    #[test]
    fn expired_window_resets_to_one() {
        let now = Utc::now();
        let stale = RateLimitCounter {
            sender_email: SENDER.to_string(),
            count: 5,
            window_started_at: now - Duration::seconds(61),
            throttled: true,
        };
        let (decision, updated) = evaluate_rate_limit(Some(&stale), SENDER, now);
        assert_eq!(decision, RateLimitDecision::Allowed { count: 1 });
        assert_eq!(updated.count, 1);
        assert_eq!(updated.window_started_at, now);
        assert!(!updated.throttled);
    }

    #[test]
    fn window_boundary_is_exclusive() {
        // Exactly 60 seconds old: still inside the window.
        let now = Utc::now();
        let counter = RateLimitCounter {
            sender_email: SENDER.to_string(),
            count: 5,
            window_started_at: now - Duration::seconds(60),
            throttled: false,
        };
        let (decision, _) = evaluate_rate_limit(Some(&counter), SENDER, now);
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn store_backed_check_persists_counter() {
        use crate::store::memory::MemoryStore;
        use crate::store::OrderStore;

        let store = MemoryStore::new();
        let now = Utc::now();
        for _ in 0..5 {
            let decision = check_rate_limit(&store, SENDER, now).await.unwrap();
            assert!(decision.is_allowed());
        }
        let decision = check_rate_limit(&store, SENDER, now).await.unwrap();
        assert!(!decision.is_allowed());

        let counter = store.fetch_rate_limit(SENDER).await.unwrap().unwrap();
        assert!(counter.throttled);
        assert_eq!(counter.count, 5);
    }
}
