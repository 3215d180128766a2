// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-bounded cache of warehouse results keyed by query text.

use crate::warehouse::RawRow;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// How long results are reused when no TTL is configured.
pub const DEFAULT_TTL_HOURS: u32 = 24;

#[derive(Debug, Clone)]
struct CacheEntry {
    rows: Vec<RawRow>,
    expires_at: DateTime<Utc>,
}

/// Query results cached by exact query text.
///
/// A disabled cache never stores anything, so every lookup misses.
#[derive(Debug, Clone)]
pub struct QueryCache {
    ttl: Option<Duration>,
    entries: HashMap<String, CacheEntry>,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: (ttl > Duration::zero()).then_some(ttl),
            entries: HashMap::new(),
        }
    }

    /// Build a cache from a TTL in hours, where 0 disables caching.
    pub fn with_ttl_hours(hours: u32) -> Self {
        Self::new(Duration::hours(hours as i64))
    }

    pub fn disabled() -> Self {
        Self {
            ttl: None,
            entries: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.ttl.is_some()
    }

    /// Look up the rows for a query, evicting the entry if it has expired.
    pub fn get(&mut self, sql: &str, now: DateTime<Utc>) -> Option<Vec<RawRow>> {
        let entry = self.entries.get(sql)?;
        if entry.expires_at <= now {
            self.entries.remove(sql);
            return None;
        }
        Some(entry.rows.clone())
    }

    pub fn insert(&mut self, sql: String, rows: Vec<RawRow>, now: DateTime<Utc>) {
        if let Some(ttl) = self.ttl {
            self.entries.insert(
                sql,
                CacheEntry {
                    rows,
                    expires_at: now + ttl,
                },
            );
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::with_ttl_hours(DEFAULT_TTL_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::RawDate;
    use chrono::TimeZone;

    fn rows() -> Vec<RawRow> {
        vec![RawRow {
            period_start: RawDate::Text("2024-01-01".to_string()),
            project: "pandas".to_string(),
            downloads: 100,
        }]
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_hit_within_ttl() {
        let mut cache = QueryCache::default();
        cache.insert("SELECT 1".to_string(), rows(), noon());

        let hit = cache.get("SELECT 1", noon() + Duration::hours(23));
        assert_eq!(hit, Some(rows()));
        assert_eq!(cache.get("SELECT 2", noon()), None);
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let mut cache = QueryCache::with_ttl_hours(24);
        cache.insert("SELECT 1".to_string(), rows(), noon());

        assert_eq!(cache.get("SELECT 1", noon() + Duration::hours(24)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        for mut cache in [QueryCache::disabled(), QueryCache::with_ttl_hours(0)] {
            assert!(!cache.is_enabled());
            cache.insert("SELECT 1".to_string(), rows(), noon());
            assert_eq!(cache.get("SELECT 1", noon()), None);
            assert_eq!(cache.len(), 0);
        }
    }

    #[test]
    fn test_purge_expired() {
        let mut cache = QueryCache::with_ttl_hours(1);
        cache.insert("old".to_string(), rows(), noon());
        cache.insert("new".to_string(), rows(), noon() + Duration::hours(2));

        assert_eq!(cache.purge_expired(noon() + Duration::minutes(150)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("new", noon() + Duration::minutes(150)).is_some());
    }
}
