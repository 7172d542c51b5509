//! Analysis cache.
//!
//! Explicitly owned, in-memory cache for [`MarketAnalysis`] results keyed by
//! symbol, as-of date, a content digest of the price window and the analyzer
//! fingerprint, so a hit is always what the same window would produce. An
//! entry is valid while its age is below `max_age_minutes`. Share it between
//! analyzers with an `Arc`; there is no process-wide instance.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::analysis::MarketAnalysis;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    symbol: String,
    as_of: NaiveDate,
    window: u64,
    fingerprint: u64,
}

/// Cache entry with insertion time
#[derive(Debug, Clone)]
struct CacheEntry {
    analysis: MarketAnalysis,
    inserted_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_valid_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.inserted_at) < max_age
    }
}

/// TTL cache for market analyses
#[derive(Debug)]
pub struct AnalysisCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    max_age: Duration,
}

impl AnalysisCache {
    /// Create a cache whose entries expire after `max_age_minutes`
    pub fn new(max_age_minutes: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_age: Duration::minutes(max_age_minutes.max(0)),
        }
    }

    /// Get a cached analysis if still valid
    pub fn get(
        &self,
        symbol: &str,
        as_of: NaiveDate,
        window: u64,
        fingerprint: u64,
    ) -> Option<MarketAnalysis> {
        let key = CacheKey {
            symbol: symbol.to_string(),
            as_of,
            window,
            fingerprint,
        };
        let cache = self.entries.read().ok()?;
        let now = Utc::now();

        cache
            .get(&key)
            .filter(|entry| entry.is_valid_at(now, self.max_age))
            .map(|entry| entry.analysis.clone())
    }

    /// Store an analysis of the window with digest `window`
    pub fn insert(&self, window: u64, fingerprint: u64, analysis: MarketAnalysis) {
        let key = CacheKey {
            symbol: analysis.symbol.clone(),
            as_of: analysis.as_of,
            window,
            fingerprint,
        };
        let entry = CacheEntry {
            analysis,
            inserted_at: Utc::now(),
        };

        if let Ok(mut cache) = self.entries.write() {
            cache.insert(key, entry);
        }
    }

    /// Drop every entry for a symbol
    pub fn invalidate(&self, symbol: &str) {
        if let Ok(mut cache) = self.entries.write() {
            cache.retain(|k, _| k.symbol != symbol);
        }
    }

    /// Clear all expired entries
    pub fn clear_expired(&self) {
        let now = Utc::now();
        let max_age = self.max_age;
        if let Ok(mut cache) = self.entries.write() {
            let before = cache.len();
            cache.retain(|_, entry| entry.is_valid_at(now, max_age));
            tracing::debug!(removed = before - cache.len(), "Cleared expired analyses");
        }
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::sample_analysis;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
    }

    #[test]
    fn test_hit_requires_matching_key() {
        let cache = AnalysisCache::new(30);
        cache.insert(20, 7, sample_analysis("600519.SH", date()));

        assert!(cache.get("600519.SH", date(), 20, 7).is_some());
        assert!(cache.get("600519.SH", date(), 21, 7).is_none());
        assert!(cache.get("600519.SH", date(), 20, 8).is_none());
        assert!(cache.get("000001.SZ", date(), 20, 7).is_none());
    }

    #[test]
    fn test_zero_max_age_never_hits() {
        let cache = AnalysisCache::new(0);
        cache.insert(20, 1, sample_analysis("600519.SH", date()));

        assert_eq!(cache.len(), 1);
        assert!(cache.get("600519.SH", date(), 20, 1).is_none());

        cache.clear_expired();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_symbol() {
        let cache = AnalysisCache::new(30);
        cache.insert(20, 1, sample_analysis("600519.SH", date()));
        cache.insert(20, 1, sample_analysis("000001.SZ", date()));

        cache.invalidate("600519.SH");

        assert_eq!(cache.len(), 1);
        assert!(cache.get("000001.SZ", date(), 20, 1).is_some());
    }
}
