use std::{
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use serde::{Serialize, Serializer};
use url::Url;

use crate::{HealthTransition, LbError};

/// Time quanta reported before the first request has been observed.
pub const DEFAULT_TIME_QUANTA: Duration = Duration::from_millis(100);

// weight of the latest observation in the time quanta average
const EMA_ALPHA: f64 = 0.3;

/// Canonical identity of a backend address: surrounding whitespace and
/// trailing slashes are not significant.
pub fn normalize_address(address: &str) -> &str {
    address.trim().trim_end_matches('/')
}

#[derive(Debug, Default)]
struct Stats {
    request_count: u64,
    total_latency: Duration,
    time_quanta: Option<Duration>,
    last_request: Option<Instant>,
}

/// A single upstream target together with its health flag and load counters.
///
/// `alive` and `active_connections` are lock-free; the request counters and
/// the latency average sit behind one short mutex so a snapshot never pairs a
/// `request_count` with a `total_latency` from a different update.
#[derive(Debug)]
pub struct Backend {
    address: String,
    url: Url,
    alive: AtomicBool,
    active_connections: AtomicU64,
    stats: Mutex<Stats>,
    started: Instant,
}

impl Backend {
    pub fn new(address: &str) -> Result<Self, LbError> {
        let address = normalize_address(address);
        let invalid = |reason: String| LbError::InvalidAddress {
            address: address.to_string(),
            reason,
        };

        let url = Url::parse(address).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() == "file" {
            return Err(invalid("scheme 'file' is not allowed".to_string()));
        }
        if url.host_str().is_none() {
            return Err(invalid("missing host".to_string()));
        }

        Ok(Self {
            address: address.to_string(),
            url,
            alive: AtomicBool::new(true),
            active_connections: AtomicU64::new(0),
            stats: Mutex::new(Stats::default()),
            started: Instant::now(),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Stores the health flag, reporting a transition only when it flipped.
    pub fn set_alive(&self, alive: bool) -> Option<HealthTransition> {
        let was_alive = self.alive.swap(alive, Ordering::AcqRel);
        match (was_alive, alive) {
            (false, true) => Some(HealthTransition::BecameHealthy),
            (true, false) => Some(HealthTransition::BecameUnhealthy),
            _ => None,
        }
    }

    pub fn record_request(&self, latency: Duration) {
        let mut stats = self.stats();
        stats.request_count += 1;
        stats.total_latency = stats.total_latency.saturating_add(latency);
        stats.time_quanta = Some(match stats.time_quanta {
            Some(previous) => previous.mul_f64(1.0 - EMA_ALPHA) + latency.mul_f64(EMA_ALPHA),
            None => latency,
        });
        stats.last_request = Some(Instant::now());
    }

    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the in-flight count; a no-op at zero.
    pub fn decrement_connections(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Counts one in-flight request until the returned guard is dropped.
    pub fn track_connection(&self) -> ConnectionGuard<'_> {
        self.increment_connections();
        ConnectionGuard { backend: self }
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Acquire)
    }

    pub fn time_quanta(&self) -> Duration {
        self.stats().time_quanta.unwrap_or(DEFAULT_TIME_QUANTA)
    }

    pub fn total_latency(&self) -> Duration {
        self.stats().total_latency
    }

    pub fn last_request(&self) -> Option<Instant> {
        self.stats().last_request
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn metrics(&self) -> BackendMetrics {
        let stats = self.stats();
        let uptime = self.uptime();

        let avg_latency = match stats.request_count {
            0 => Duration::ZERO,
            n => nanos_to_duration(stats.total_latency.as_nanos() / u128::from(n)),
        };

        let uptime_secs = uptime.as_secs_f64();
        let requests_per_second = if uptime_secs > 0.0 {
            stats.request_count as f64 / uptime_secs
        } else {
            0.0
        };

        BackendMetrics {
            url: self.address.clone(),
            alive: self.is_alive(),
            request_count: stats.request_count,
            avg_latency,
            uptime,
            active_connections: self.active_connections(),
            requests_per_second,
            time_quanta: stats.time_quanta.unwrap_or(DEFAULT_TIME_QUANTA),
        }
    }

    fn stats(&self) -> MutexGuard<'_, Stats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ConnectionGuard<'a> {
    backend: &'a Backend,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.backend.decrement_connections();
    }
}

/// Point-in-time copy of a backend's counters, serialised with durations in
/// nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendMetrics {
    pub url: String,
    pub alive: bool,
    pub request_count: u64,
    #[serde(rename = "avg_latency_ns", serialize_with = "as_nanos")]
    pub avg_latency: Duration,
    #[serde(rename = "uptime_ns", serialize_with = "as_nanos")]
    pub uptime: Duration,
    pub active_connections: u64,
    pub requests_per_second: f64,
    #[serde(rename = "time_quanta_ns", serialize_with = "as_nanos")]
    pub time_quanta: Duration,
}

fn as_nanos<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
}

fn nanos_to_duration(nanos: u128) -> Duration {
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}
