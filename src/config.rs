// src/config.rs
// Pipeline thresholds and environment-driven mail configuration.

use log::info;

/// Orders at or above this confidence are approved without human review.
pub const AUTO_APPROVE_THRESHOLD: f64 = 0.80;

/// Admitted parse attempts per sender within one rate-limit window.
pub const RATE_LIMIT_MAX_ATTEMPTS: i32 = 5;

/// Length of the fixed (reset-based) rate-limit window, in seconds.
pub const RATE_LIMIT_WINDOW_SECS: i64 = 60;

/// Lookback for (sender, product, quantity) duplicate detection, in hours.
pub const DUPLICATE_WINDOW_HOURS: i64 = 24;

/// Window within which repeated parse failures from one sender are
/// aggregated into a single error row, in hours.
pub const ERROR_DEDUP_WINDOW_HOURS: i64 = 24;

/// Minimum Levenshtein similarity for a fuzzy catalog match.
pub const MIN_FUZZY_SIMILARITY: f64 = 0.6;

/// Confidence modifier for a substring (contains) catalog match.
pub const CONTAINS_MATCH_MODIFIER: f64 = -0.05;

/// Confidence modifier for a fuzzy catalog match.
pub const FUZZY_MATCH_MODIFIER: f64 = -0.15;

/// Confidence penalty when no catalog product resolves at all.
pub const NO_MATCH_PENALTY: f64 = 0.30;

/// Largest quantity a single email order may carry.
pub const MAX_ORDER_QUANTITY: i32 = 9999;

/// Lookback for error listings and stats, in days.
pub const RECENT_ERRORS_WINDOW_DAYS: i64 = 7;

/// Default mailbox polling interval, in minutes.
pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 5;

/// IMAP endpoint + credentials, read from the environment.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub mailbox: String,
}

/// SMTP endpoint + credentials, read from the environment.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Sender address for outbound notifications; defaults to the SMTP user.
    pub from_address: String,
}

/// Mail configuration as loaded at startup. Either half may be absent:
/// without IMAP the poller refuses to run, without SMTP notifications are
/// skipped (and logged) instead of sent.
#[derive(Debug, Clone, Default)]
pub struct MailConfig {
    pub imap: Option<ImapConfig>,
    pub smtp: Option<SmtpConfig>,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_port(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(default)
}

impl MailConfig {
    /// Reads MAILORDER_IMAP_* / MAILORDER_SMTP_* variables. A half is only
    /// considered configured when its host, user and password are all set.
    pub fn from_env() -> Self {
        let imap = match (
            env_opt("MAILORDER_IMAP_HOST"),
            env_opt("MAILORDER_IMAP_USER"),
            env_opt("MAILORDER_IMAP_PASSWORD"),
        ) {
            (Some(host), Some(user), Some(password)) => Some(ImapConfig {
                host,
                port: env_port("MAILORDER_IMAP_PORT", 993),
                user,
                password,
                mailbox: env_opt("MAILORDER_IMAP_MAILBOX").unwrap_or_else(|| "INBOX".to_string()),
            }),
            _ => None,
        };

        let smtp = match (
            env_opt("MAILORDER_SMTP_HOST"),
            env_opt("MAILORDER_SMTP_USER"),
            env_opt("MAILORDER_SMTP_PASSWORD"),
        ) {
            (Some(host), Some(user), Some(password)) => {
                let from_address =
                    env_opt("MAILORDER_SMTP_FROM").unwrap_or_else(|| user.clone());
                Some(SmtpConfig {
                    host,
                    port: env_port("MAILORDER_SMTP_PORT", 587),
                    user,
                    password,
                    from_address,
                })
            }
            _ => None,
        };

        MailConfig { imap, smtp }
    }

    pub fn imap_configured(&self) -> bool {
        self.imap.is_some()
    }

    pub fn smtp_configured(&self) -> bool {
        self.smtp.is_some()
    }

    pub fn log_config(&self) {
        match &self.imap {
            Some(c) => info!(
                "IMAP configured: {}:{} mailbox {} (user {})",
                c.host, c.port, c.mailbox, c.user
            ),
            None => info!("IMAP not configured - mailbox polling disabled"),
        }
        match &self.smtp {
            Some(c) => info!("SMTP configured: {}:{} (from {})", c.host, c.port, c.from_address),
            None => info!("SMTP not configured - outbound notifications disabled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_env_yields_unconfigured_halves() {
        std::env::remove_var("MAILORDER_IMAP_HOST");
        std::env::remove_var("MAILORDER_SMTP_HOST");
        let config = MailConfig::from_env();
        assert!(!config.imap_configured());
        assert!(!config.smtp_configured());
    }

    #[test]
    fn no_match_penalty_pushes_strongest_pattern_below_threshold() {
        assert!(0.95 - NO_MATCH_PENALTY < AUTO_APPROVE_THRESHOLD);
    }
}
