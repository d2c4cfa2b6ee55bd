use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use tracing::debug;

use crate::clock::Clock;
use crate::kpi::{DataPoint, DateRange};

/// Default lifetime of a cached series.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Identifies one cached series by KPI, time window and aggregation bucket.
///
/// Equality covers all four fields, so keys never collide even when a KPI id
/// contains the separator used by the rendered form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kpi_id: String,
    from: String,
    to: String,
    aggregation: String,
}

impl CacheKey {
    pub fn new(
        kpi_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        aggregation: impl Into<String>,
    ) -> Self {
        Self {
            kpi_id: kpi_id.into(),
            from: from.into(),
            to: to.into(),
            aggregation: aggregation.into(),
        }
    }

    pub fn for_range(kpi_id: &str, range: &DateRange, aggregation: &str) -> Self {
        Self::new(kpi_id, range.from_key(), range.to_key(), aggregation)
    }

    pub fn kpi_id(&self) -> &str {
        &self.kpi_id
    }

    pub fn aggregation(&self) -> &str {
        &self.aggregation
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.kpi_id, self.from, self.to, self.aggregation
        )
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub data: Arc<[DataPoint]>,
    pub cached_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// TTL cache of per-KPI series shared by every chart.
pub struct SeriesCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SeriesCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached series while it is live. An expired entry is
    /// evicted and reported as absent.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<[DataPoint]>> {
        let now = self.clock.now();

        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.data.clone());
                }
                Some(_) => {}
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
            }
        }

        let mut entries = self.entries.write();
        // the entry may have been replaced between dropping the read lock and
        // taking the write lock
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
            debug!("evicted expired cache entry: {key}");
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or overwrite a series. Also sweeps any expired entries.
    pub fn put(&self, key: CacheKey, data: Arc<[DataPoint]>) {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut entries = self.entries.write();
        entries.retain(|_, e| e.is_live(now));
        entries.insert(
            key,
            CacheEntry {
                data,
                cached_at: now,
                expires_at,
            },
        );
    }

    /// Remove every entry whose rendered key contains `pattern`, or all
    /// entries when no pattern is given. Returns the number removed.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();

        match pattern {
            Some(pattern) => entries.retain(|key, _| !key.to_string().contains(pattern)),
            None => entries.clear(),
        }

        let removed = before - entries.len();
        if removed > 0 {
            debug!("invalidated {removed} cache entries (pattern: {pattern:?})");
        }
        removed
    }

    /// Remove every entry for one KPI, across all windows and aggregations.
    pub fn invalidate_kpi(&self, kpi_id: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| key.kpi_id != kpi_id);
        before - entries.len()
    }

    /// Remove expired entries. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = self.entries.read();
        let expired = entries.values().filter(|e| !e.is_live(now)).count();

        CacheStats {
            total: entries.len(),
            expired,
            active: entries.len() - expired,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub total: usize,
    pub expired: usize,
    pub active: usize,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn make_cache() -> (SeriesCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        (SeriesCache::new(DEFAULT_TTL, clock.clone()), clock)
    }

    fn series(kpi: &str, n: usize) -> Arc<[DataPoint]> {
        (0..n)
            .map(|i| DataPoint {
                date: format!("2024-01-01T{i:02}:00:00"),
                category: kpi.to_string(),
                value: i as f64,
            })
            .collect()
    }

    fn key(kpi: &str) -> CacheKey {
        CacheKey::new(kpi, "2024-01-01T00:00:00", "2024-01-02T00:00:00", "60s")
    }

    #[test]
    fn key_is_deterministic() {
        assert_eq!(key("cpu_usage"), key("cpu_usage"));
        assert_eq!(key("cpu_usage").to_string(), key("cpu_usage").to_string());

        let base = key("cpu_usage");
        let variants = [
            CacheKey::new("mem_usage", "2024-01-01T00:00:00", "2024-01-02T00:00:00", "60s"),
            CacheKey::new("cpu_usage", "2024-01-01T00:00:01", "2024-01-02T00:00:00", "60s"),
            CacheKey::new("cpu_usage", "2024-01-01T00:00:00", "2024-01-03T00:00:00", "60s"),
            CacheKey::new("cpu_usage", "2024-01-01T00:00:00", "2024-01-02T00:00:00", "10m"),
        ];
        for variant in variants {
            assert_ne!(base, variant);
            assert_ne!(base.to_string(), variant.to_string());
        }
    }

    #[test]
    fn key_fields_do_not_bleed() {
        // same rendered text, different fields
        let a = CacheKey::new("a|b", "c", "d", "e");
        let b = CacheKey::new("a", "b|c", "d", "e");
        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(a, b);
    }

    #[test]
    fn get_respects_ttl_boundary() {
        let (cache, clock) = make_cache();
        cache.put(key("cpu_usage"), series("cpu_usage", 3));

        clock.advance(TimeDelta::from_std(DEFAULT_TTL).unwrap() - TimeDelta::milliseconds(1));
        assert_eq!(cache.get(&key("cpu_usage")).unwrap().len(), 3);

        clock.advance(TimeDelta::milliseconds(2));
        assert!(cache.get(&key("cpu_usage")).is_none());
        // evicted on read
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_after_five_minutes_and_a_second() {
        let (cache, clock) = make_cache();
        cache.put(key("cpu_usage"), series("cpu_usage", 1));

        clock.advance(TimeDelta::minutes(5) + TimeDelta::seconds(1));
        assert!(cache.get(&key("cpu_usage")).is_none());
    }

    #[test]
    fn put_overwrites_and_sweeps() {
        let (cache, clock) = make_cache();
        cache.put(key("cpu_usage"), series("cpu_usage", 1));
        cache.put(key("cpu_usage"), series("cpu_usage", 4));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key("cpu_usage")).unwrap().len(), 4);

        clock.advance(TimeDelta::minutes(6));
        cache.put(key("mem_usage"), series("mem_usage", 1));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("cpu_usage")).is_none());
    }

    #[test]
    fn invalidate_by_pattern() {
        let (cache, _) = make_cache();
        cache.put(key("cpu_usage"), series("cpu_usage", 1));
        cache.put(key("cpu_idle"), series("cpu_idle", 1));
        cache.put(key("mem_usage"), series("mem_usage", 1));

        assert_eq!(cache.invalidate(Some("cpu_")), 2);
        assert!(cache.get(&key("mem_usage")).is_some());
        assert!(cache.get(&key("cpu_usage")).is_none());

        assert_eq!(cache.invalidate(None), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn invalidate_single_kpi() {
        let (cache, _) = make_cache();
        cache.put(key("cpu_usage"), series("cpu_usage", 1));
        cache.put(
            CacheKey::new("cpu_usage", "2024-02-01T00:00:00", "2024-02-02T00:00:00", "10m"),
            series("cpu_usage", 1),
        );
        cache.put(key("cpu_usage_peak"), series("cpu_usage_peak", 1));

        assert_eq!(cache.invalidate_kpi("cpu_usage"), 2);
        assert!(cache.get(&key("cpu_usage_peak")).is_some());
    }

    #[test]
    fn stats_and_purge() {
        let (cache, clock) = make_cache();
        cache.put(key("cpu_usage"), series("cpu_usage", 1));
        clock.advance(TimeDelta::minutes(4));
        cache.put(key("mem_usage"), series("mem_usage", 1));
        clock.advance(TimeDelta::minutes(2));

        let stats = cache.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.active, 1);

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_ttl_never_hits() {
        let clock = Arc::new(ManualClock::new(start()));
        let cache = SeriesCache::new(Duration::ZERO, clock);
        cache.put(key("cpu_usage"), series("cpu_usage", 1));
        assert!(cache.get(&key("cpu_usage")).is_none());
        assert_eq!(cache.stats().misses, 1);
    }
}
