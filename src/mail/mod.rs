// src/mail/mod.rs

pub mod connector;
pub mod notify;
pub mod parse;

pub use connector::{ImapConnector, MailConnector, MockConnector, RawMail};
pub use notify::{Notification, Notifier, RecordingNotifier, SmtpNotifier};
pub use parse::parse_incoming;
