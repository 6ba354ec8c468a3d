// src/store/postgres.rs
// Postgres-backed OrderStore on the shared bb8 pool.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use postgres_types::ToSql;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::{
    CatalogProduct, CreatedOrder, DuplicateHit, IntakeStats, NewParsedEmail, NewPendingOrder,
    OrderStatus, ParsedEmailId, ParsingErrorRecord, PendingOrder, PendingOrderId, ProductId,
    RateLimitCounter, ReviewQueueEntry, ReviewQueueFilter,
};
use crate::store::OrderStore;

/// Intake tables plus the sales-side tables the order-creation path writes.
const SCHEMA_SQL: &str = "
    CREATE TABLE IF NOT EXISTS products (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        price DOUBLE PRECISION NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE TABLE IF NOT EXISTS customers (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE TABLE IF NOT EXISTS orders (
        id TEXT PRIMARY KEY,
        customer_id TEXT NOT NULL REFERENCES customers(id),
        order_date DATE NOT NULL DEFAULT CURRENT_DATE,
        status TEXT NOT NULL DEFAULT 'created',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE TABLE IF NOT EXISTS order_items (
        id TEXT PRIMARY KEY,
        order_id TEXT NOT NULL REFERENCES orders(id),
        product_id TEXT REFERENCES products(id),
        quantity INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS invoices (
        id TEXT PRIMARY KEY,
        order_id TEXT NOT NULL REFERENCES orders(id),
        invoice_number TEXT NOT NULL,
        invoice_date DATE NOT NULL DEFAULT CURRENT_DATE,
        due_date DATE NOT NULL,
        total_amount DOUBLE PRECISION NOT NULL,
        status TEXT NOT NULL DEFAULT 'sent'
    );
    CREATE TABLE IF NOT EXISTS parsed_emails (
        id TEXT PRIMARY KEY,
        sender_email TEXT NOT NULL,
        subject TEXT,
        raw_body TEXT,
        status TEXT NOT NULL,
        error_message TEXT,
        external_message_id TEXT,
        duplicate_of TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE TABLE IF NOT EXISTS pending_orders (
        id TEXT PRIMARY KEY,
        parsed_email_id TEXT NOT NULL REFERENCES parsed_emails(id),
        sender_email TEXT NOT NULL,
        extracted_quantity INTEGER NOT NULL,
        extracted_product_name TEXT NOT NULL,
        product_id TEXT REFERENCES products(id),
        confidence_score DOUBLE PRECISION NOT NULL,
        status TEXT NOT NULL,
        admin_notes TEXT,
        approved_at TIMESTAMPTZ,
        approved_by TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE TABLE IF NOT EXISTS email_parsing_errors (
        id TEXT PRIMARY KEY,
        sender_email TEXT NOT NULL,
        raw_body TEXT,
        error_type TEXT NOT NULL,
        error_message TEXT,
        parse_attempt_count INTEGER NOT NULL DEFAULT 1,
        first_attempt_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
    CREATE TABLE IF NOT EXISTS email_rate_limits (
        sender_email TEXT PRIMARY KEY,
        parse_count INTEGER NOT NULL,
        window_started_at TIMESTAMPTZ NOT NULL,
        is_throttled BOOLEAN NOT NULL DEFAULT FALSE
    );
";

const INSERT_PARSED_EMAIL_SQL: &str = "
    INSERT INTO parsed_emails
        (id, sender_email, subject, raw_body, status, error_message, external_message_id, duplicate_of)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const INSERT_PENDING_ORDER_SQL: &str = "
    INSERT INTO pending_orders
        (id, parsed_email_id, sender_email, extracted_quantity, extracted_product_name,
         product_id, confidence_score, status)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const UPSERT_RATE_LIMIT_SQL: &str = "
    INSERT INTO email_rate_limits (sender_email, parse_count, window_started_at, is_throttled)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (sender_email) DO UPDATE SET
        parse_count = EXCLUDED.parse_count,
        window_started_at = EXCLUDED.window_started_at,
        is_throttled = EXCLUDED.is_throttled";

const FIND_DUPLICATE_SQL: &str = "
    SELECT id, created_at FROM pending_orders
    WHERE sender_email = $1
      AND product_id = $2
      AND extracted_quantity = $3
      AND created_at > $4
      AND status <> 'REJECTED'
    ORDER BY created_at DESC
    LIMIT 1";

const PENDING_ORDER_COLUMNS: &str = "
    id, parsed_email_id, sender_email, extracted_quantity, extracted_product_name,
    product_id, confidence_score, status, admin_notes, approved_at, approved_by, created_at";

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the intake tables if they do not exist yet.
    pub async fn init_schema(&self) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for schema init")?;
        conn.batch_execute(SCHEMA_SQL)
            .await
            .context("Failed to create intake schema")?;
        info!("Intake schema is in place");
        Ok(())
    }
}

fn row_to_pending_order(row: &Row) -> Result<PendingOrder> {
    let status_str: String = row.get("status");
    let status = OrderStatus::from_str(&status_str)
        .with_context(|| format!("Unknown pending order status '{}'", status_str))?;
    Ok(PendingOrder {
        id: PendingOrderId(row.get("id")),
        parsed_email_id: ParsedEmailId(row.get("parsed_email_id")),
        sender_email: row.get("sender_email"),
        quantity: row.get("extracted_quantity"),
        product_name: row.get("extracted_product_name"),
        product_id: row.get::<_, Option<String>>("product_id").map(ProductId),
        confidence: row.get("confidence_score"),
        status,
        admin_notes: row.get("admin_notes"),
        approved_at: row.get("approved_at"),
        approved_by: row.get("approved_by"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn product_catalog(&self) -> Result<Vec<CatalogProduct>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for catalog lookup")?;
        // No ORDER BY: match tie-breaks follow storage iteration order.
        let rows = conn
            .query("SELECT id, name, price FROM products", &[])
            .await
            .context("Failed to query product catalog")?;
        Ok(rows
            .iter()
            .map(|row| CatalogProduct {
                id: ProductId(row.get("id")),
                name: row.get("name"),
                price: row.get("price"),
            })
            .collect())
    }

    async fn fetch_rate_limit(&self, sender_email: &str) -> Result<Option<RateLimitCounter>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for rate limit read")?;
        let row = conn
            .query_opt(
                "SELECT sender_email, parse_count, window_started_at, is_throttled
                 FROM email_rate_limits WHERE sender_email = $1",
                &[&sender_email],
            )
            .await
            .context("Failed to query rate limit state")?;
        Ok(row.map(|row| RateLimitCounter {
            sender_email: row.get("sender_email"),
            count: row.get("parse_count"),
            window_started_at: row.get("window_started_at"),
            throttled: row.get("is_throttled"),
        }))
    }

    async fn store_rate_limit(&self, counter: &RateLimitCounter) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for rate limit write")?;
        conn.execute(
            UPSERT_RATE_LIMIT_SQL,
            &[
                &counter.sender_email,
                &counter.count,
                &counter.window_started_at,
                &counter.throttled,
            ],
        )
        .await
        .context("Failed to upsert rate limit state")?;
        Ok(())
    }

    async fn find_recent_duplicate(
        &self,
        sender_email: &str,
        product_id: &ProductId,
        quantity: i32,
        since: DateTime<Utc>,
    ) -> Result<Option<DuplicateHit>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for duplicate check")?;
        let row = conn
            .query_opt(
                FIND_DUPLICATE_SQL,
                &[&sender_email, &product_id.0, &quantity, &since],
            )
            .await
            .context("Failed to query duplicate orders")?;
        Ok(row.map(|row| DuplicateHit {
            order_id: PendingOrderId(row.get("id")),
            created_at: row.get("created_at"),
        }))
    }

    async fn record_parsing_error(
        &self,
        sender_email: &str,
        raw_body: &str,
        error_type: &str,
        error_message: &str,
        since: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for parsing error write")?;
        let tx = conn
            .transaction()
            .await
            .context("Failed to start transaction for parsing error")?;

        let existing = tx
            .query_opt(
                "SELECT id FROM email_parsing_errors
                 WHERE sender_email = $1 AND error_type = $2 AND created_at > $3
                 ORDER BY created_at DESC LIMIT 1",
                &[&sender_email, &error_type, &since],
            )
            .await
            .context("Failed to query existing parsing errors")?;

        match existing {
            Some(row) => {
                let id: String = row.get("id");
                tx.execute(
                    "UPDATE email_parsing_errors
                     SET parse_attempt_count = parse_attempt_count + 1
                     WHERE id = $1",
                    &[&id],
                )
                .await
                .context("Failed to increment parsing error attempt count")?;
            }
            None => {
                let id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO email_parsing_errors
                        (id, sender_email, raw_body, error_type, error_message)
                     VALUES ($1, $2, $3, $4, $5)",
                    &[&id, &sender_email, &raw_body, &error_type, &error_message],
                )
                .await
                .context("Failed to insert parsing error")?;
            }
        }

        tx.commit()
            .await
            .context("Failed to commit parsing error transaction")?;
        Ok(())
    }

    async fn persist_email(&self, email: &NewParsedEmail) -> Result<ParsedEmailId> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for email insert")?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            INSERT_PARSED_EMAIL_SQL,
            &[
                &id,
                &email.sender_email,
                &email.subject,
                &email.raw_body,
                &email.status.as_str(),
                &email.error_message,
                &email.external_message_id,
                &email.duplicate_of.as_ref().map(|d| d.0.clone()),
            ],
        )
        .await
        .context("Failed to insert parsed email")?;
        Ok(ParsedEmailId(id))
    }

    async fn persist_intake(
        &self,
        email: &NewParsedEmail,
        order: &NewPendingOrder,
    ) -> Result<(ParsedEmailId, PendingOrderId)> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for intake write")?;
        let tx = conn
            .transaction()
            .await
            .context("Failed to start intake transaction")?;

        let email_id = Uuid::new_v4().to_string();
        tx.execute(
            INSERT_PARSED_EMAIL_SQL,
            &[
                &email_id,
                &email.sender_email,
                &email.subject,
                &email.raw_body,
                &email.status.as_str(),
                &email.error_message,
                &email.external_message_id,
                &email.duplicate_of.as_ref().map(|d| d.0.clone()),
            ],
        )
        .await
        .context("Failed to insert parsed email")?;

        let order_id = Uuid::new_v4().to_string();
        tx.execute(
            INSERT_PENDING_ORDER_SQL,
            &[
                &order_id,
                &email_id,
                &order.sender_email,
                &order.quantity,
                &order.product_name,
                &order.product_id.as_ref().map(|p| p.0.clone()),
                &order.confidence,
                &order.status.as_str(),
            ],
        )
        .await
        .context("Failed to insert pending order")?;

        tx.commit()
            .await
            .context("Failed to commit intake transaction")?;
        Ok((ParsedEmailId(email_id), PendingOrderId(order_id)))
    }

    async fn fetch_pending_order(&self, id: &PendingOrderId) -> Result<Option<PendingOrder>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for pending order read")?;
        let sql = format!("SELECT {} FROM pending_orders WHERE id = $1", PENDING_ORDER_COLUMNS);
        let row = conn
            .query_opt(sql.as_str(), &[&id.0])
            .await
            .context("Failed to query pending order")?;
        row.map(|r| row_to_pending_order(&r)).transpose()
    }

    async fn update_order_review(
        &self,
        id: &PendingOrderId,
        status: OrderStatus,
        notes: Option<&str>,
        actor: Option<&str>,
    ) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for review update")?;
        let updated = if status == OrderStatus::Approved {
            conn.execute(
                "UPDATE pending_orders
                 SET status = $2, admin_notes = $3, approved_at = now(), approved_by = $4
                 WHERE id = $1",
                &[&id.0, &status.as_str(), &notes, &actor],
            )
            .await
            .context("Failed to update pending order to approved")?
        } else {
            conn.execute(
                "UPDATE pending_orders
                 SET status = $2, admin_notes = COALESCE($3, admin_notes)
                 WHERE id = $1",
                &[&id.0, &status.as_str(), &notes],
            )
            .await
            .context("Failed to update pending order status")?
        };
        if updated == 0 {
            bail!("Pending order {} not found", id);
        }
        Ok(())
    }

    async fn create_order_from_pending(&self, id: &PendingOrderId) -> Result<CreatedOrder> {
        let mut conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for order creation")?;
        let tx = conn
            .transaction()
            .await
            .context("Failed to start order creation transaction")?;

        let pending = tx
            .query_opt(
                "SELECT po.sender_email, po.extracted_quantity, po.product_id, p.price
                 FROM pending_orders po
                 LEFT JOIN products p ON po.product_id = p.id
                 WHERE po.id = $1",
                &[&id.0],
            )
            .await
            .context("Failed to load pending order for order creation")?;
        let pending = match pending {
            Some(row) => row,
            None => bail!("Pending order {} not found", id),
        };

        let sender_email: String = pending.get("sender_email");
        let quantity: i32 = pending.get("extracted_quantity");
        let product_id: Option<String> = pending.get("product_id");
        let price: Option<f64> = pending.get("price");

        let customer_row = tx
            .query_opt(
                "SELECT id FROM customers WHERE email = $1 LIMIT 1",
                &[&sender_email],
            )
            .await
            .context("Failed to look up customer")?;
        let customer_id = match customer_row {
            Some(row) => row.get::<_, String>("id"),
            None => {
                let customer_id = Uuid::new_v4().to_string();
                let name = sender_email
                    .split('@')
                    .next()
                    .unwrap_or(sender_email.as_str())
                    .to_string();
                tx.execute(
                    "INSERT INTO customers (id, name, email) VALUES ($1, $2, $3)",
                    &[&customer_id, &name, &sender_email],
                )
                .await
                .context("Failed to create customer")?;
                customer_id
            }
        };

        let order_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO orders (id, customer_id, status) VALUES ($1, $2, 'created')",
            &[&order_id, &customer_id],
        )
        .await
        .context("Failed to insert order")?;

        let item_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO order_items (id, order_id, product_id, quantity) VALUES ($1, $2, $3, $4)",
            &[&item_id, &order_id, &product_id, &quantity],
        )
        .await
        .context("Failed to insert order item")?;

        tx.execute(
            "UPDATE pending_orders
             SET status = 'PROCESSED', approved_at = COALESCE(approved_at, now())
             WHERE id = $1",
            &[&id.0],
        )
        .await
        .context("Failed to mark pending order processed")?;

        let invoice_id = Uuid::new_v4().to_string();
        let invoice_number = format!("INV-{}", Utc::now().timestamp_millis());
        let total_amount = price.unwrap_or(0.0) * f64::from(quantity);
        tx.execute(
            "INSERT INTO invoices (id, order_id, invoice_number, due_date, total_amount, status)
             VALUES ($1, $2, $3, CURRENT_DATE + 30, $4, 'sent')",
            &[&invoice_id, &order_id, &invoice_number, &total_amount],
        )
        .await
        .context("Failed to insert invoice")?;

        tx.commit()
            .await
            .context("Failed to commit order creation transaction")?;

        Ok(CreatedOrder {
            order_id,
            invoice_id,
            invoice_number,
            total_amount,
        })
    }

    async fn list_review_queue(&self, filter: &ReviewQueueFilter) -> Result<Vec<ReviewQueueEntry>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for review queue")?;

        let mut sql = format!(
            "SELECT po.id, po.parsed_email_id, po.sender_email, po.extracted_quantity,
                    po.extracted_product_name, po.product_id, po.confidence_score, po.status,
                    po.admin_notes, po.approved_at, po.approved_by, po.created_at,
                    p.name AS catalog_name, p.price AS catalog_price,
                    pe.subject AS email_subject, pe.raw_body AS email_body
             FROM pending_orders po
             LEFT JOIN products p ON po.product_id = p.id
             LEFT JOIN parsed_emails pe ON po.parsed_email_id = pe.id
             WHERE 1=1"
        );
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();

        let status_str = filter.status.map(|s| s.as_str());
        if let Some(ref status) = status_str {
            sql.push_str(&format!(" AND po.status = ${}", params.len() + 1));
            params.push(status);
        } else {
            sql.push_str(" AND po.status IN ('PENDING_REVIEW', 'DUPLICATE_WARNING')");
        }

        let min_confidence = filter.min_confidence;
        if let Some(ref min) = min_confidence {
            sql.push_str(&format!(" AND po.confidence_score >= ${}", params.len() + 1));
            params.push(min);
        }
        let max_confidence = filter.max_confidence;
        if let Some(ref max) = max_confidence {
            sql.push_str(&format!(" AND po.confidence_score <= ${}", params.len() + 1));
            params.push(max);
        }

        // Least confident, newest first: the rows a reviewer should see first.
        sql.push_str(" ORDER BY po.confidence_score ASC, po.created_at DESC");

        let rows = conn
            .query(sql.as_str(), &params)
            .await
            .context("Failed to query review queue")?;

        rows.iter()
            .map(|row| {
                Ok(ReviewQueueEntry {
                    order: row_to_pending_order(row)?,
                    email_subject: row.get("email_subject"),
                    email_body: row.get("email_body"),
                    catalog_name: row.get("catalog_name"),
                    catalog_price: row.get("catalog_price"),
                })
            })
            .collect()
    }

    async fn recent_parsing_errors(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<ParsingErrorRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for error listing")?;
        let rows = conn
            .query(
                "SELECT id, sender_email, error_type, error_message, parse_attempt_count,
                        first_attempt_at, created_at
                 FROM email_parsing_errors
                 WHERE created_at > $1
                 ORDER BY created_at DESC
                 LIMIT 100",
                &[&since],
            )
            .await
            .context("Failed to query parsing errors")?;
        Ok(rows
            .iter()
            .map(|row| ParsingErrorRecord {
                id: row.get("id"),
                sender_email: row.get("sender_email"),
                error_type: row.get("error_type"),
                error_message: row.get::<_, Option<String>>("error_message").unwrap_or_default(),
                attempt_count: row.get("parse_attempt_count"),
                first_attempt_at: row.get("first_attempt_at"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn intake_stats(&self) -> Result<IntakeStats> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for stats")?;

        let counts = conn
            .query_one(
                "SELECT COUNT(*) AS total,
                        COALESCE(SUM(CASE WHEN status = 'PENDING_REVIEW' THEN 1 ELSE 0 END), 0) AS pending,
                        COALESCE(SUM(CASE WHEN status = 'AUTO_APPROVED' THEN 1 ELSE 0 END), 0) AS auto_approved,
                        COALESCE(SUM(CASE WHEN status = 'APPROVED' THEN 1 ELSE 0 END), 0) AS approved,
                        COALESCE(SUM(CASE WHEN status = 'REJECTED' THEN 1 ELSE 0 END), 0) AS rejected,
                        COALESCE(SUM(CASE WHEN status = 'DUPLICATE_WARNING' THEN 1 ELSE 0 END), 0) AS duplicates,
                        COALESCE(SUM(CASE WHEN status = 'PROCESSED' THEN 1 ELSE 0 END), 0) AS processed
                 FROM pending_orders",
                &[],
            )
            .await
            .context("Failed to query order counts")?;

        let since = Utc::now() - chrono::Duration::days(crate::config::RECENT_ERRORS_WINDOW_DAYS);
        let errors = conn
            .query_one(
                "SELECT COUNT(*) AS recent FROM email_parsing_errors WHERE created_at > $1",
                &[&since],
            )
            .await
            .context("Failed to query recent error count")?;
        let avg = conn
            .query_one(
                "SELECT COALESCE(AVG(confidence_score), 0) AS avg_confidence
                 FROM pending_orders WHERE created_at > $1",
                &[&since],
            )
            .await
            .context("Failed to query average confidence")?;

        Ok(IntakeStats {
            total_orders: counts.get("total"),
            pending_review: counts.get("pending"),
            auto_approved: counts.get("auto_approved"),
            approved: counts.get("approved"),
            rejected: counts.get("rejected"),
            duplicate_warnings: counts.get("duplicates"),
            processed: counts.get("processed"),
            recent_errors: errors.get("recent"),
            avg_confidence: avg.get("avg_confidence"),
        })
    }
}
