// src/mail/connector.rs
// Mailbox access behind a sync trait: IMAP for production, an in-memory
// queue for tests. The poller drives this from a blocking task.

use std::collections::VecDeque;

use anyhow::{anyhow, Context, Result};

/// A raw RFC 5322 message as fetched from the mailbox.
#[derive(Debug, Clone)]
pub struct RawMail {
    pub uid: String,
    pub data: Vec<u8>,
}

pub trait MailConnector: Send {
    /// Fetch unseen messages. Fetched messages are marked seen so a later
    /// cycle does not re-deliver them.
    fn fetch_unread(&mut self) -> Result<Vec<RawMail>>;
}

/// IMAP connector over TLS. Connects, drains UNSEEN, and logs out again
/// every cycle; no long-lived session state is kept.
pub struct ImapConnector {
    config: crate::config::ImapConfig,
}

impl ImapConnector {
    pub fn new(config: crate::config::ImapConfig) -> Self {
        Self { config }
    }
}

impl MailConnector for ImapConnector {
    fn fetch_unread(&mut self) -> Result<Vec<RawMail>> {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .context("TLS connector build failed")?;
        let client = imap::connect(
            (self.config.host.as_str(), self.config.port),
            &self.config.host,
            &tls,
        )
        .with_context(|| format!("IMAP connection to {} failed", self.config.host))?;

        let mut session = client
            .login(&self.config.user, &self.config.password)
            .map_err(|e| anyhow!("IMAP login failed: {}", e.0))?;

        // SELECT (not EXAMINE): the BODY[] fetch below must mark messages seen.
        session
            .select(&self.config.mailbox)
            .with_context(|| format!("IMAP SELECT {} failed", self.config.mailbox))?;

        let uids = session.uid_search("UNSEEN").context("IMAP UID SEARCH failed")?;
        if uids.is_empty() {
            session.logout().ok();
            return Ok(Vec::new());
        }

        let uid_set: String = uids
            .iter()
            .map(|u: &u32| u.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let fetches = session
            .uid_fetch(&uid_set, "BODY[]")
            .context("IMAP UID FETCH failed")?;

        let mut mails = Vec::new();
        for fetch in fetches.iter() {
            if let Some(body) = fetch.body() {
                mails.push(RawMail {
                    uid: fetch.uid.unwrap_or(0).to_string(),
                    data: body.to_vec(),
                });
            }
        }

        session.logout().ok();
        Ok(mails)
    }
}

/// In-memory connector for tests: push raw messages, fetch drains them.
#[derive(Default)]
pub struct MockConnector {
    inbox: VecDeque<RawMail>,
    /// Artificial fetch delay, for exercising the poller's in-flight guard.
    pub fetch_delay: Option<std::time::Duration>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_raw(&mut self, uid: &str, data: &[u8]) {
        self.inbox.push_back(RawMail {
            uid: uid.to_string(),
            data: data.to_vec(),
        });
    }
}

impl MailConnector for MockConnector {
    fn fetch_unread(&mut self) -> Result<Vec<RawMail>> {
        if let Some(delay) = self.fetch_delay {
            std::thread::sleep(delay);
        }
        Ok(self.inbox.drain(..).collect())
    }
}
