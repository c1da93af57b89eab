use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::PgPool;

use crate::error::ApiError;
use crate::middleware::clock::{Clock, SystemClock};

/// Keys older than this many expired windows get pruned from the map.
const PRUNE_THRESHOLD: usize = 1024;

/// Fixed-window counter: attempts are counted per (key, window_start) and
/// rejected once they exceed `max_attempts` inside one window.
///
/// The in-memory map is per-process; for a global limit across instances use
/// [`check_persistent`], which counts in the rate_limit_records table.
pub struct FixedWindowLimiter {
    max_attempts: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    counters: Mutex<HashMap<String, (DateTime<Utc>, u32)>>,
}

impl FixedWindowLimiter {
    pub fn new(max_attempts: u32, window_seconds: i64) -> Self {
        Self::with_clock(max_attempts, window_seconds, Arc::new(SystemClock))
    }

    pub fn with_clock(max_attempts: u32, window_seconds: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_attempts,
            window: Duration::seconds(window_seconds),
            clock,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Counts one attempt for `key`; Err(RateLimited) once over the limit.
    pub fn check(&self, key: &str) -> Result<(), ApiError> {
        let now = self.clock.now();
        let window_start = floor_to_window(now, self.window);

        // The map holds plain counters; a poisoned lock cannot leave it
        // inconsistent, so recover instead of panicking forever.
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if counters.len() > PRUNE_THRESHOLD {
            counters.retain(|_, (start, _)| *start == window_start);
        }

        let entry = counters
            .entry(key.to_string())
            .or_insert((window_start, 0));
        if entry.0 != window_start {
            // New window: the old count no longer applies.
            *entry = (window_start, 0);
        }
        entry.1 += 1;

        if entry.1 > self.max_attempts {
            return Err(ApiError::RateLimited);
        }
        Ok(())
    }
}

/// Align a timestamp to the start of its fixed window.
fn floor_to_window(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    let secs = window.num_seconds().max(1);
    let floored = (now.timestamp() / secs) * secs;
    Utc.timestamp_opt(floored, 0).single().unwrap_or(now)
}

/// DB-backed variant of the same fixed window, keyed
/// (identifier, endpoint, window_start). Correct under horizontal scaling.
pub async fn check_persistent(
    pool: &PgPool,
    identifier: &str,
    endpoint: &str,
    max_attempts: u32,
    window_seconds: i64,
) -> Result<(), ApiError> {
    let window_start = floor_to_window(Utc::now(), Duration::seconds(window_seconds));

    let count: i32 = sqlx::query_scalar(
        "INSERT INTO rate_limit_records (identifier, endpoint, window_start)
         VALUES ($1, $2, $3)
         ON CONFLICT (identifier, endpoint, window_start)
         DO UPDATE SET count = rate_limit_records.count + 1
         RETURNING count",
    )
    .bind(identifier)
    .bind(endpoint)
    .bind(window_start)
    .fetch_one(pool)
    .await?;

    if count > max_attempts as i32 {
        return Err(ApiError::RateLimited);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::clock::test_support::ManualClock;

    fn limiter(max: u32, window_secs: i64) -> (Arc<ManualClock>, FixedWindowLimiter) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
        ));
        let l = FixedWindowLimiter::with_clock(max, window_secs, clock.clone());
        (clock, l)
    }

    #[test]
    fn allows_up_to_max_attempts() {
        let (_, l) = limiter(3, 900);
        for _ in 0..3 {
            assert!(l.check("login:kwame").is_ok());
        }
        assert!(matches!(l.check("login:kwame"), Err(ApiError::RateLimited)));
    }

    #[test]
    fn keys_are_independent() {
        let (_, l) = limiter(1, 900);
        assert!(l.check("login:a").is_ok());
        assert!(l.check("login:b").is_ok());
        assert!(l.check("login:a").is_err());
    }

    #[test]
    fn window_rollover_resets_the_count() {
        let (clock, l) = limiter(2, 900);
        assert!(l.check("k").is_ok());
        assert!(l.check("k").is_ok());
        assert!(l.check("k").is_err());

        clock.advance(Duration::seconds(901));
        assert!(l.check("k").is_ok());
    }

    #[test]
    fn survives_a_poisoned_lock() {
        let (_, l) = limiter(5, 900);
        let l = Arc::new(l);
        let held = l.clone();
        let _ = std::thread::spawn(move || {
            let _guard = held.counters.lock().unwrap();
            panic!("poison the counter lock");
        })
        .join();

        assert!(l.check("login:ama").is_ok());
    }

    #[test]
    fn floor_is_stable_within_a_window() {
        let t1 = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 5).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 6, 1, 10, 14, 59).unwrap();
        let w = Duration::seconds(900);
        assert_eq!(floor_to_window(t1, w), floor_to_window(t2, w));
    }
}
