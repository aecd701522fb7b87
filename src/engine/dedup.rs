//! Same-day action deduplication.
//!
//! Keys are `kind|pool|YYYY-MM-DD` (UTC), so an action executes at most
//! once per pool per calendar day, while a missed reminder gets a fresh
//! chance the next day. Entries carry an explicit expiry timestamp and are
//! purged lazily on lookup - no timers.

use alloy::primitives::Address;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;

const ENTRY_TTL_HOURS: i64 = 24;

#[derive(Debug, Default)]
pub struct DedupLedger {
    entries: HashMap<String, DateTime<Utc>>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the key for one action on one pool today.
    pub fn key(kind: &str, pool: Address, now: DateTime<Utc>) -> String {
        format!("{kind}|{pool}|{}", now.format("%Y-%m-%d"))
    }

    /// True if this key was already marked and has not expired.
    pub fn is_marked(&mut self, key: &str, now: DateTime<Utc>) -> bool {
        self.purge_expired(now);
        self.entries.contains_key(key)
    }

    /// Record a completed dispatch attempt for this key.
    pub fn mark(&mut self, key: String, now: DateTime<Utc>) {
        self.entries
            .insert(key, now + ChronoDuration::hours(ENTRY_TTL_HOURS));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.entries.retain(|_, expiry| *expiry > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
    }

    #[test]
    fn mark_then_seen_same_day() {
        let mut ledger = DedupLedger::new();
        let now = at(9);
        let key = DedupLedger::key("PAYOUT_READY", Address::ZERO, now);

        assert!(!ledger.is_marked(&key, now));
        ledger.mark(key.clone(), now);
        assert!(ledger.is_marked(&key, now));
        assert!(ledger.is_marked(&key, at(23)));
    }

    #[test]
    fn entry_expires_after_24_hours() {
        let mut ledger = DedupLedger::new();
        let now = at(9);
        let key = DedupLedger::key("REMINDER_DUE", Address::ZERO, now);
        ledger.mark(key.clone(), now);

        let next_day = now + ChronoDuration::hours(25);
        assert!(!ledger.is_marked(&key, next_day));
        assert!(ledger.is_empty());
    }

    #[test]
    fn next_day_key_differs() {
        let today = at(9);
        let tomorrow = today + ChronoDuration::days(1);
        let a = DedupLedger::key("REMINDER_DUE", Address::ZERO, today);
        let b = DedupLedger::key("REMINDER_DUE", Address::ZERO, tomorrow);
        assert_ne!(a, b);
    }

    #[test]
    fn keys_separate_kinds_and_pools() {
        let now = at(9);
        let a = DedupLedger::key("PAYOUT_READY", Address::ZERO, now);
        let b = DedupLedger::key("POOL_STALLED", Address::ZERO, now);
        let c = DedupLedger::key("PAYOUT_READY", Address::with_last_byte(1), now);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
