use std::{fmt, time::Duration};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheEventKind {
    Hit,
    Miss,
    Evicted,
    Cleared,
}

impl fmt::Display for CacheEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheEventKind::Hit => "hit",
            CacheEventKind::Miss => "miss",
            CacheEventKind::Evicted => "evicted",
            CacheEventKind::Cleared => "cleared",
        })
    }
}

/// The most recent interaction with a cache. `subject` names the evicted key
/// and is empty for every other kind, so lookups never allocate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEvent {
    pub kind: CacheEventKind,
    pub subject: String,
}

impl fmt::Display for CacheEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subject.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{} {}", self.kind, self.subject)
        }
    }
}

/// Point-in-time snapshot of one bounded cache.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheMetrics {
    pub cache: &'static str,
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to stay within capacity. Clears are counted separately.
    pub evictions: u64,
    pub cleared: u64,
    pub latest: Option<CacheEvent>,
    pub oldest_age: Option<Duration>,
    /// Highest hit count of any live entry.
    pub most_reused: Option<u64>,
}

impl CacheMetrics {
    pub fn hit_rate(&self) -> Option<f64> {
        let lookups = self.hits + self.misses;
        (lookups > 0).then(|| self.hits as f64 / lookups as f64)
    }

    pub fn is_full(&self) -> bool {
        self.entries >= self.capacity
    }
}

impl fmt::Display for CacheMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} hits={} misses={} evictions={}",
            self.cache, self.entries, self.capacity, self.hits, self.misses, self.evictions
        )
    }
}
