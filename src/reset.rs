//! Single-use password reset tokens with a time-to-live.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResetTokenError {
    #[error("Unknown reset token")]
    Unknown,

    #[error("Reset token expired")]
    Expired,
}

#[derive(Debug, Clone)]
struct ResetEntry {
    email: String,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ResetTokens {
    entries: Arc<DashMap<String, ResetEntry>>,
    ttl: Duration,
}

impl ResetTokens {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn issue(&self, email: &str) -> String {
        self.issue_at(email, Utc::now())
    }

    fn issue_at(&self, email: &str, now: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.entries.insert(
            token.clone(),
            ResetEntry {
                email: email.to_string(),
                expires_at: now + self.ttl,
            },
        );
        debug!("Issued reset token for {}", email);
        token
    }

    /// Consumes the token. A token can be redeemed at most once, expired or not.
    pub fn redeem(&self, token: &str) -> Result<String, ResetTokenError> {
        self.redeem_at(token, Utc::now())
    }

    fn redeem_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, ResetTokenError> {
        let (_, entry) = self
            .entries
            .remove(token)
            .ok_or(ResetTokenError::Unknown)?;
        if now >= entry.expires_at {
            return Err(ResetTokenError::Expired);
        }
        Ok(entry.email)
    }

    /// Drops expired entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn spawn_sweeper(&self, every: std::time::Duration) -> JoinHandle<()> {
        let tokens = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let removed = tokens.sweep();
                if removed > 0 {
                    info!("Swept {} expired reset tokens", removed);
                }
            }
        })
    }
}
