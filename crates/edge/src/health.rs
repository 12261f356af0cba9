use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use log::{debug, error, info};
use tokio::{runtime::Handle, task::JoinSet, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use flux_lb::{Backend, HealthTransition, Registry};
use flux_transport::client::HttpClient;

/// Background prober that keeps every registered backend's `alive` flag current.
///
/// Each cycle works from a fresh registry snapshot, so backends added or
/// removed between cycles are picked up without restarting the loop. A probe
/// that outlives its backend's removal only writes to the detached `Backend`.
///
/// Cycles never wait for each other. A backend whose previous check is still
/// running is skipped for that tick, so at most one check per backend is in
/// flight and a hung backend only delays its own next check.
#[derive(Clone)]
pub struct HealthMonitor {
    registry: Arc<Registry>,
    client: HttpClient,
    path: Arc<str>,
    interval: Duration,
    timeout: Duration,
    checking: Arc<Mutex<HashSet<String>>>,
}

/// Marks one backend as having a check in flight until dropped.
struct CheckSlot {
    checking: Arc<Mutex<HashSet<String>>>,
    address: String,
}

impl Drop for CheckSlot {
    fn drop(&mut self) {
        self.checking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.address);
    }
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<Registry>,
        client: HttpClient,
        path: &str,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            client,
            path: Arc::from(path),
            interval: interval.max(Duration::from_millis(1)),
            timeout: timeout.max(Duration::from_millis(1)),
            checking: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Checks immediately, then once per interval until `cancel` fires.
    ///
    /// Checks still running at cancellation are left to finish on their own;
    /// each is bounded by the probe timeout.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Health monitor started (path {}, interval {:?}, timeout {:?})",
            self.path, self.interval, self.timeout
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut checks = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            while let Some(result) = checks.try_join_next() {
                if let Err(err) = result {
                    error!("Health check task failed: {}", err);
                }
            }
            self.spawn_cycle(&mut checks);
        }

        checks.detach_all();
        info!("Health monitor stopped");
    }

    /// Runs one full check cycle and waits for every check it started.
    pub async fn check_all(&self) {
        let mut checks = JoinSet::new();
        self.spawn_cycle(&mut checks);
        while let Some(result) = checks.join_next().await {
            if let Err(err) = result {
                error!("Health check task failed: {}", err);
            }
        }
    }

    /// Schedules a single out-of-cycle probe, used right after registration.
    pub fn probe_now(&self, backend: Arc<Backend>) {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                error!(
                    "Immediate health check for {} skipped: no Tokio runtime available",
                    backend.address()
                );
                return;
            }
        };

        let Some(slot) = self.claim(&backend) else {
            debug!("Health check for {} already running", backend.address());
            return;
        };
        let monitor = self.clone();
        handle.spawn(async move {
            monitor.check(&backend).await;
            drop(slot);
        });
    }

    /// Probes `backend` and stores the outcome in its `alive` flag.
    pub async fn check(&self, backend: &Backend) {
        let healthy = self.probe(backend).await;
        if let Some(transition) = backend.set_alive(healthy) {
            log_health_transition(backend.address(), transition);
        }
    }

    /// A backend is healthy when `GET {address}{path}` answers 2xx within the
    /// timeout. Schemes other than http and https are never contacted.
    pub async fn probe(&self, backend: &Backend) -> bool {
        let scheme = backend.url().scheme();
        if scheme != "http" && scheme != "https" {
            debug!(
                "Backend {} has invalid scheme: {}",
                backend.address(),
                scheme
            );
            return false;
        }

        let uri = format!("{}{}", backend.address(), self.path);
        match self.client.probe(&uri, self.timeout).await {
            Ok(status) if status.is_success() => {
                debug!("Backend {} is UP", backend.address());
                true
            }
            Ok(status) => {
                debug!("Backend {} is DOWN (status {})", backend.address(), status);
                false
            }
            Err(err) => {
                debug!("Backend {} is DOWN: {}", backend.address(), err);
                false
            }
        }
    }

    fn spawn_cycle(&self, checks: &mut JoinSet<()>) {
        for backend in self.registry.snapshot() {
            let Some(slot) = self.claim(&backend) else {
                debug!(
                    "Health check for {} still running, skipping this cycle",
                    backend.address()
                );
                continue;
            };
            let monitor = self.clone();
            checks.spawn(async move {
                monitor.check(&backend).await;
                drop(slot);
            });
        }
    }

    fn claim(&self, backend: &Backend) -> Option<CheckSlot> {
        let mut checking = self.checking.lock().unwrap_or_else(PoisonError::into_inner);
        if !checking.insert(backend.address().to_string()) {
            return None;
        }
        Some(CheckSlot {
            checking: Arc::clone(&self.checking),
            address: backend.address().to_string(),
        })
    }
}

pub(crate) fn log_health_transition(addr: &str, transition: HealthTransition) {
    match transition {
        HealthTransition::BecameHealthy => {
            info!("Backend {} became healthy", addr);
        }
        HealthTransition::BecameUnhealthy => {
            error!("Backend {} became unhealthy", addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(addresses: &[&str]) -> HealthMonitor {
        let registry = Arc::new(Registry::new(addresses).unwrap());
        HealthMonitor::new(
            registry,
            HttpClient::new(),
            "/health",
            Duration::from_secs(60),
            Duration::from_millis(500),
        )
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn unsupported_scheme_is_down_without_contact() {
        let monitor = monitor(&["ftp://127.0.0.1:21"]);
        let backend = monitor.registry.get("ftp://127.0.0.1:21").unwrap();

        assert!(!monitor.probe(&backend).await);
        monitor.check(&backend).await;
        assert!(!backend.is_alive());
    }

    #[tokio::test]
    async fn refused_connection_marks_backend_down() {
        let address = format!("http://127.0.0.1:{}", closed_port());
        let monitor = monitor(&[address.as_str()]);

        monitor.check_all().await;
        assert!(!monitor.registry.get(&address).unwrap().is_alive());
    }

    #[test]
    fn one_check_in_flight_per_backend() {
        let monitor = monitor(&["http://127.0.0.1:1", "http://127.0.0.1:2"]);
        let first = monitor.registry.get("http://127.0.0.1:1").unwrap();
        let second = monitor.registry.get("http://127.0.0.1:2").unwrap();

        let slot = monitor.claim(&first).unwrap();
        assert!(monitor.claim(&first).is_none());
        assert!(monitor.claim(&second).is_some());

        drop(slot);
        assert!(monitor.claim(&first).is_some());
    }

    #[tokio::test]
    async fn run_exits_promptly_on_cancel() {
        let address = format!("http://127.0.0.1:{}", closed_port());
        let monitor = monitor(&[address.as_str()]);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(monitor.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
