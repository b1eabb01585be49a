//! Burn-eligibility rules.
//!
//! A message must burn when it is a tombstone, when its read-gated delay has
//! passed since `read_at`, or when its absolute TTL has passed since
//! `created_at`. Boundaries are strict: at exactly the deadline the message
//! is still visible.

use crate::models::Message;
use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_BURN_DELAY_SECS: i64 = 30;

// TTLs are clamped to a century.
const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub burn_delay: Duration,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            burn_delay: Duration::seconds(DEFAULT_BURN_DELAY_SECS),
        }
    }
}

impl ExpiryPolicy {
    pub fn new(burn_delay: Duration) -> Self {
        Self { burn_delay }
    }

    pub fn should_burn(&self, message: &Message, now: DateTime<Utc>) -> bool {
        if message.is_deleted {
            return true;
        }
        self.rule_deadlines(message).any(|deadline| now > deadline)
    }

    /// Earliest instant after which the message is eligible, if any rule
    /// applies yet. Tombstones have no deadline; they burn unconditionally.
    pub fn burn_deadline(&self, message: &Message) -> Option<DateTime<Utc>> {
        self.rule_deadlines(message).min()
    }

    /// Remaining time before the message becomes eligible. Zero once it is.
    pub fn time_until_burn(&self, message: &Message, now: DateTime<Utc>) -> Option<Duration> {
        if message.is_deleted {
            return Some(Duration::zero());
        }
        let deadline = self.burn_deadline(message)?;
        Some((deadline - now).max(Duration::zero()))
    }

    fn rule_deadlines(&self, message: &Message) -> impl Iterator<Item = DateTime<Utc>> {
        let after_read = match (message.expire_after_read, message.is_read, message.read_at) {
            (true, true, Some(read_at)) => read_at.checked_add_signed(self.burn_delay),
            _ => None,
        };
        let ttl = match (message.expire_after, message.created_at) {
            (Some(secs), Some(created_at)) => created_at
                .checked_add_signed(Duration::seconds(secs.min(MAX_TTL_SECS) as i64)),
            _ => None,
        };
        after_read.into_iter().chain(ttl)
    }
}

/// [`ExpiryPolicy::should_burn`] with the default 30 second delay.
pub fn should_burn(message: &Message, now: DateTime<Utc>) -> bool {
    ExpiryPolicy::default().should_burn(message, now)
}
