// src/mail/notify.rs
// Outbound sender notifications. Sends are best-effort: callers log and
// swallow failures, the intake outcome is already final by the time any
// notification goes out.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::info;
use tokio::sync::Mutex;

use crate::config::SmtpConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Order confirmed and processed.
    Approval {
        order_id: String,
        product_name: String,
        quantity: i32,
    },
    /// The email could not be parsed; ask the sender to rephrase.
    Clarification { reason: String },
    /// The order was rejected by a reviewer.
    Rejection { reason: String },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Approval { .. } => "approval",
            Notification::Clarification { .. } => "clarification",
            Notification::Rejection { .. } => "rejection",
        }
    }

    /// Subject line and HTML body for this notification.
    pub fn render(&self) -> (String, String) {
        match self {
            Notification::Approval {
                order_id,
                product_name,
                quantity,
            } => (
                format!("Bestellung bestaetigt #{}", order_id),
                format!(
                    "<h2>Bestellung bestaetigt</h2>\
                     <p>Vielen Dank fuer Ihre Email-Bestellung!</p>\
                     <table border=\"1\" cellpadding=\"10\" style=\"border-collapse: collapse;\">\
                     <tr><td><strong>Bestellnummer:</strong></td><td>#{}</td></tr>\
                     <tr><td><strong>Produkt:</strong></td><td>{}</td></tr>\
                     <tr><td><strong>Menge:</strong></td><td>{}</td></tr>\
                     <tr><td><strong>Status:</strong></td><td>Genehmigt und verarbeitet</td></tr>\
                     </table>\
                     <p>Falls Sie Fragen haben, antworten Sie auf diese E-Mail.</p>\
                     <p>Beste Gruesse,<br>ERP System</p>",
                    order_id, product_name, quantity
                ),
            ),
            Notification::Clarification { reason } => (
                "Re: Bestellung - Manuelle Bearbeitung erforderlich".to_string(),
                format!(
                    "<h2>Bestellung konnte nicht verarbeitet werden</h2>\
                     <p>Vielen Dank fuer Ihre Bestellung!</p>\
                     <p>Leider konnte Ihre Email nicht automatisch verarbeitet werden:</p>\
                     <p><strong>Grund:</strong> {}</p>\
                     <h3>Naechste Schritte:</h3>\
                     <ol>\
                     <li>Bitte antworten Sie auf diese Email mit den genauen Produktdetails</li>\
                     <li>Verwenden Sie das Format: \"Ich moechte [Anzahl] [Produktname] bestellen\"</li>\
                     </ol>\
                     <p>Beispiel: \"Ich moechte 2 HP Laptop bestellen\"</p>\
                     <p>Beste Gruesse,<br>ERP System</p>",
                    reason
                ),
            ),
            Notification::Rejection { reason } => (
                "Bestellung abgelehnt".to_string(),
                format!(
                    "<h2>Bestellung abgelehnt</h2>\
                     <p>Ihre Bestellung konnte leider nicht bearbeitet werden.</p>\
                     <p><strong>Grund:</strong> {}</p>\
                     <p>Bitte kontaktieren Sie uns bei Fragen.</p>\
                     <p>Beste Gruesse,<br>ERP System</p>",
                    reason
                ),
            ),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: &str, notification: &Notification) -> Result<()>;
}

/// SMTP notifier via lettre. Without SMTP configuration every send is a
/// logged no-op, mirroring the polling side's "not configured" semantics.
pub struct SmtpNotifier {
    inner: Option<(SmtpConfig, AsyncSmtpTransport<Tokio1Executor>)>,
}

impl SmtpNotifier {
    pub fn new(config: Option<SmtpConfig>) -> Result<Self> {
        let inner = match config {
            Some(config) => {
                let transport =
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                        .context("Failed to build SMTP transport")?
                        .port(config.port)
                        .credentials(Credentials::new(
                            config.user.clone(),
                            config.password.clone(),
                        ))
                        .build();
                Some((config, transport))
            }
            None => None,
        };
        Ok(Self { inner })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, recipient: &str, notification: &Notification) -> Result<()> {
        let (config, transport) = match &self.inner {
            Some(inner) => inner,
            None => {
                info!(
                    "SMTP not configured, skipping {} notification to {}",
                    notification.kind(),
                    recipient
                );
                return Ok(());
            }
        };

        let (subject, html) = notification.render();
        let message = Message::builder()
            .from(
                config
                    .from_address
                    .parse()
                    .context("Invalid SMTP from address")?,
            )
            .to(recipient.parse().context("Invalid recipient address")?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .context("Failed to build notification message")?;

        transport
            .send(message)
            .await
            .with_context(|| format!("Failed to send {} notification", notification.kind()))?;
        info!("Sent {} notification to {}", notification.kind(), recipient);
        Ok(())
    }
}

/// Test notifier that records every send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: &str, notification: &Notification) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), notification.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_render_carries_order_details() {
        let notification = Notification::Approval {
            order_id: "o-42".to_string(),
            product_name: "Laptop".to_string(),
            quantity: 3,
        };
        let (subject, body) = notification.render();
        assert_eq!(subject, "Bestellung bestaetigt #o-42");
        assert!(body.contains("Laptop"));
        assert!(body.contains("<td>3</td>"));
    }

    #[test]
    fn clarification_render_includes_reason() {
        let notification = Notification::Clarification {
            reason: "No matching pattern found in email".to_string(),
        };
        let (subject, body) = notification.render();
        assert!(subject.contains("Manuelle Bearbeitung"));
        assert!(body.contains("No matching pattern found in email"));
    }

    #[tokio::test]
    async fn unconfigured_smtp_is_a_noop() {
        let notifier = SmtpNotifier::new(None).unwrap();
        let result = notifier
            .notify(
                "kunde@example.com",
                &Notification::Rejection {
                    reason: "out of stock".to_string(),
                },
            )
            .await;
        assert!(result.is_ok());
    }
}
