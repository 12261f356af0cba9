use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crate::backend::{Backend, BackendMetrics};

/// Backends scoring within this factor of the best one share traffic.
pub const NEAR_BEST_BAND: f64 = 1.2;

/// Lower is better: `time_quanta * (1 + active_connections) + avg_latency`,
/// all in nanoseconds.
pub fn score(metrics: &BackendMetrics) -> f64 {
    let time_quanta = metrics.time_quanta.as_nanos() as f64;
    let connections = metrics.active_connections as f64;
    let avg_latency = metrics.avg_latency.as_nanos() as f64;

    time_quanta * (1.0 + connections) + avg_latency
}

/// Load-aware round robin.
///
/// Alive backends are scored, everything within [`NEAR_BEST_BAND`] of the
/// best score becomes a candidate, and a shared cursor rotates through the
/// candidates. The cursor advances on every draw, including draws from the
/// dead-backend fallback.
#[derive(Debug, Default)]
pub struct Scheduler {
    cursor: AtomicU64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` only for an empty backend list. With nothing alive it
    /// still answers, falling back to the first registered backend; callers
    /// must check `is_alive` on the result.
    pub fn pick(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        let scored: Vec<(&Arc<Backend>, f64)> = backends
            .iter()
            .filter(|backend| backend.is_alive())
            .map(|backend| (backend, score(&backend.metrics())))
            .collect();

        let best = scored
            .iter()
            .map(|(_, score)| *score)
            .fold(f64::INFINITY, f64::min);
        let threshold = best * NEAR_BEST_BAND;

        let candidates: Vec<&Arc<Backend>> = scored
            .iter()
            .filter(|(_, score)| *score <= threshold)
            .map(|(backend, _)| *backend)
            .collect();

        if !candidates.is_empty() {
            let idx = self.advance() % candidates.len() as u64;
            return Some(Arc::clone(candidates[idx as usize]));
        }

        // nothing alive at scoring time: one pass over the full list
        for _ in 0..backends.len() {
            let idx = (self.advance() % backends.len() as u64) as usize;
            if backends[idx].is_alive() {
                return Some(Arc::clone(&backends[idx]));
            }
        }

        Some(Arc::clone(&backends[0]))
    }

    fn advance(&self) -> u64 {
        self.cursor.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, time::Duration};

    use super::*;

    fn backends(addresses: &[&str]) -> Vec<Arc<Backend>> {
        addresses
            .iter()
            .map(|address| Arc::new(Backend::new(address).unwrap()))
            .collect()
    }

    fn distribution(
        scheduler: &Scheduler,
        pool: &[Arc<Backend>],
        rounds: usize,
    ) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for _ in 0..rounds {
            let backend = scheduler.pick(pool).unwrap();
            *counts.entry(backend.address().to_string()).or_default() += 1;
        }
        counts
    }

    #[test]
    fn score_combines_quanta_connections_and_latency() {
        let backend = Backend::new("http://a:1").unwrap();
        backend.record_request(Duration::from_millis(10));
        backend.increment_connections();
        backend.increment_connections();

        // 10ms * (1 + 2) + 10ms
        assert_eq!(score(&backend.metrics()), 40_000_000.0);
    }

    #[test]
    fn empty_pool_has_no_backend() {
        let scheduler = Scheduler::new();
        assert!(scheduler.pick(&[]).is_none());
    }

    #[test]
    fn equal_scores_are_spread_evenly() {
        let pool = backends(&["http://a:1", "http://b:1", "http://c:1"]);
        let scheduler = Scheduler::new();

        let counts = distribution(&scheduler, &pool, 300);
        for backend in &pool {
            assert_eq!(counts[backend.address()], 100);
        }
    }

    #[test]
    fn two_backends_ten_requests_split_five_five() {
        let pool = backends(&["http://a:1", "http://b:1"]);
        let scheduler = Scheduler::new();

        let counts = distribution(&scheduler, &pool, 10);
        assert_eq!(counts["http://a:1"], 5);
        assert_eq!(counts["http://b:1"], 5);
    }

    #[test]
    fn dead_backends_are_never_picked() {
        let pool = backends(&["http://a:1", "http://b:1", "http://c:1"]);
        let scheduler = Scheduler::new();
        pool[0].set_alive(false);

        let counts = distribution(&scheduler, &pool, 50);
        assert!(!counts.contains_key("http://a:1"));
        assert_eq!(counts["http://b:1"] + counts["http://c:1"], 50);

        pool[0].set_alive(true);
        let counts = distribution(&scheduler, &pool, 30);
        assert_eq!(counts["http://a:1"], 10);
    }

    #[test]
    fn clearly_better_backend_takes_all_traffic() {
        let pool = backends(&["http://slow:1", "http://fast:1"]);
        pool[0].record_request(Duration::from_millis(100));
        pool[1].record_request(Duration::from_millis(10));
        let scheduler = Scheduler::new();

        let counts = distribution(&scheduler, &pool, 40);
        assert_eq!(counts["http://fast:1"], 40);
        assert!(!counts.contains_key("http://slow:1"));
    }

    #[test]
    fn near_ties_share_traffic() {
        let pool = backends(&["http://a:1", "http://b:1"]);
        // scores 200ms and 220ms: within the band
        pool[0].record_request(Duration::from_millis(100));
        pool[1].record_request(Duration::from_millis(110));
        let scheduler = Scheduler::new();

        let counts = distribution(&scheduler, &pool, 40);
        assert!(counts["http://a:1"] > 0);
        assert!(counts["http://b:1"] > 0);
    }

    #[test]
    fn in_flight_load_moves_traffic_away() {
        let pool = backends(&["http://busy:1", "http://idle:1"]);
        let _held: Vec<_> = (0..3).map(|_| pool[0].track_connection()).collect();
        let scheduler = Scheduler::new();

        let counts = distribution(&scheduler, &pool, 20);
        assert_eq!(counts["http://idle:1"], 20);
    }

    #[test]
    fn all_dead_falls_back_to_first_registered() {
        let pool = backends(&["http://a:1", "http://b:1", "http://c:1"]);
        for backend in &pool {
            backend.set_alive(false);
        }
        let scheduler = Scheduler::new();

        for _ in 0..5 {
            let picked = scheduler.pick(&pool).unwrap();
            assert_eq!(picked.address(), "http://a:1");
            assert!(!picked.is_alive());
        }
    }
}
