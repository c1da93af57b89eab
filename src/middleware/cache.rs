use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::middleware::clock::{Clock, SystemClock};

/// Small TTL cache in front of hot list endpoints. Purely a read shortcut
/// for the UI's duplicate fetches; writes invalidate the affected keys, and
/// a stale read is never a correctness problem.
pub struct TtlCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, (DateTime<Utc>, Value)>>,
}

impl TtlCache {
    pub fn new(ttl_seconds: i64) -> Self {
        Self::with_clock(ttl_seconds, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl_seconds: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: Duration::seconds(ttl_seconds),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        // Plain data behind the lock; recover from poisoning rather than
        // panicking on every later request.
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match entries.get(key) {
            Some((stored, value)) if now - *stored < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, value: Value) {
        let now = self.clock.now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Expired entries piggyback on writes; the key space here is a
        // handful of list URLs, so a full sweep is fine.
        entries.retain(|_, (stored, _)| now - *stored < self.ttl);
        entries.insert(key.to_string(), (now, value));
    }

    /// Drop every key starting with `prefix` (e.g. after a milestone write,
    /// drop all /milestones variants).
    pub fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.retain(|k, _| !k.starts_with(prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::clock::test_support::ManualClock;
    use chrono::TimeZone;
    use serde_json::json;

    fn cache(ttl: i64) -> (Arc<ManualClock>, TtlCache) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
        ));
        let c = TtlCache::with_clock(ttl, clock.clone());
        (clock, c)
    }

    #[test]
    fn serves_within_ttl_and_expires_after() {
        let (clock, c) = cache(15);
        c.put("/milestones", json!([{"stage_number": 1}]));
        assert!(c.get("/milestones").is_some());

        clock.advance(Duration::seconds(14));
        assert!(c.get("/milestones").is_some());

        clock.advance(Duration::seconds(2));
        assert!(c.get("/milestones").is_none());
    }

    #[test]
    fn survives_a_poisoned_lock() {
        let (_, c) = cache(30);
        let c = Arc::new(c);
        c.put("/milestones", json!(1));

        let held = c.clone();
        let _ = std::thread::spawn(move || {
            let _guard = held.entries.lock().unwrap();
            panic!("poison the entry lock");
        })
        .join();

        assert_eq!(c.get("/milestones"), Some(json!(1)));
    }

    #[test]
    fn prefix_invalidation() {
        let (_, c) = cache(30);
        c.put("/milestones", json!(1));
        c.put("/milestones?all=true", json!(2));
        c.put("/groups", json!(3));

        c.invalidate_prefix("/milestones");
        assert!(c.get("/milestones").is_none());
        assert!(c.get("/milestones?all=true").is_none());
        assert!(c.get("/groups").is_some());
    }
}
