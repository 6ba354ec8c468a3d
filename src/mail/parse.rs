// src/mail/parse.rs
// RFC 5322 -> IncomingOrderEmail via mail-parser.

use anyhow::{anyhow, Result};
use mail_parser::MessageParser;

use crate::mail::connector::RawMail;
use crate::models::IncomingOrderEmail;

/// Parse a raw message into the intake pipeline's input. Fails when the
/// message is not valid MIME or carries no sender address; the poller
/// counts such messages as errors and moves on.
pub fn parse_incoming(raw: &RawMail) -> Result<IncomingOrderEmail> {
    let message = MessageParser::default()
        .parse(&raw.data)
        .ok_or_else(|| anyhow!("failed to parse MIME message (uid {})", raw.uid))?;

    let sender_email = message
        .from()
        .and_then(|address| address.first())
        .and_then(|addr| addr.address())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("message {} has no sender address", raw.uid))?;

    let subject = message.subject().unwrap_or("").to_string();

    // Prefer the plain text body; the lexical normalizer strips HTML anyway.
    let body = message
        .body_text(0)
        .map(|s| s.to_string())
        .or_else(|| message.body_html(0).map(|s| s.to_string()))
        .unwrap_or_default();

    let external_message_id = message.message_id().map(|s| s.to_string());

    Ok(IncomingOrderEmail {
        sender_email,
        subject,
        body,
        external_message_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(data: &[u8]) -> RawMail {
        RawMail {
            uid: "7".to_string(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn parses_plain_text_message() {
        let data = b"From: Kunde <kunde@example.com>\r\n\
                     Subject: Bestellung\r\n\
                     Message-ID: <abc-123@example.com>\r\n\
                     \r\n\
                     Ich moechte 3 Laptop bestellen\r\n";
        let mail = parse_incoming(&raw(data)).unwrap();
        assert_eq!(mail.sender_email, "kunde@example.com");
        assert_eq!(mail.subject, "Bestellung");
        assert!(mail.body.contains("3 Laptop"));
        assert_eq!(
            mail.external_message_id.as_deref(),
            Some("abc-123@example.com")
        );
    }

    #[test]
    fn missing_sender_is_an_error() {
        let data = b"Subject: Bestellung\r\n\r\nIch moechte 3 Laptop bestellen\r\n";
        assert!(parse_incoming(&raw(data)).is_err());
    }
}
