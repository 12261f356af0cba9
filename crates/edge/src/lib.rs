use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use log::{error, info, warn};
use thiserror::Error;
use tokio::{runtime::Handle, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use flux_config::config::Config;
use flux_lb::{Backend, BackendMetrics, LbError, Registry, Scheduler};
use flux_transport::client::HttpClient;

use crate::health::HealthMonitor;

pub mod health;
pub mod proxy;
pub mod server;

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error(transparent)]
    Lb(#[from] LbError),

    #[error("health monitor already started")]
    AlreadyStarted,

    #[error("no Tokio runtime available to run the health monitor")]
    NoRuntime,

    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Request dispatcher and administrative surface over one backend registry.
///
/// The registry is shared with the health monitor; everything here can be
/// called concurrently with request dispatch and probing.
pub struct LoadBalancer {
    registry: Arc<Registry>,
    scheduler: Scheduler,
    monitor: HealthMonitor,
    client: HttpClient,
    started: AtomicBool,
}

impl LoadBalancer {
    pub fn new(config: &Config) -> Result<Self, LbError> {
        let registry = Arc::new(Registry::new(&config.backends)?);
        let client = HttpClient::new();
        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            client.clone(),
            &config.health_check.path,
            Duration::from_millis(config.health_check.interval_ms),
            Duration::from_millis(config.health_check.timeout_ms),
        );

        info!("Load balancer ready with {} backends", registry.len());

        Ok(Self {
            registry,
            scheduler: Scheduler::new(),
            monitor,
            client,
            started: AtomicBool::new(false),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Spawns the health monitor on the current Tokio runtime. Only the first
    /// successful call starts it.
    pub fn start(&self, cancel: CancellationToken) -> Result<JoinHandle<()>, EdgeError> {
        let handle = Handle::try_current().map_err(|_| EdgeError::NoRuntime)?;
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(EdgeError::AlreadyStarted);
        }
        Ok(handle.spawn(self.monitor.clone().run(cancel)))
    }

    pub fn get_next_backend(&self) -> Option<Arc<Backend>> {
        self.scheduler.pick(&self.registry.snapshot())
    }

    /// Forwards one request to the scheduled backend.
    ///
    /// Single attempt: a missing or dead backend yields 503 and an upstream
    /// failure yields 502, without trying another backend.
    pub async fn serve<B>(&self, req: Request<B>, peer: Option<SocketAddr>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: std::fmt::Display,
    {
        let backend = match self.get_next_backend() {
            Some(backend) if backend.is_alive() => backend,
            _ => {
                error!("No healthy backends available");
                return proxy::simple_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service unavailable\n",
                );
            }
        };

        let (parts, body) = req.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                warn!("Failed to read request body: {}", err);
                return proxy::simple_response(StatusCode::BAD_REQUEST, "Invalid request\n");
            }
        };

        let request = match proxy::build_upstream_request(&backend, parts, body, peer) {
            Ok(request) => request,
            Err(err) => {
                error!("Cannot build request for {}: {}", backend.address(), err);
                return proxy::simple_response(StatusCode::BAD_GATEWAY, "Bad gateway\n");
            }
        };

        let start = Instant::now();
        let result = {
            let _in_flight = backend.track_connection();
            self.client.send(request).await
        };
        let latency = start.elapsed();
        backend.record_request(latency);

        match result {
            Ok((status, headers, body)) => {
                info!(
                    "Proxied request to {} status {} latency_ms {}",
                    backend.address(),
                    status.as_u16(),
                    latency.as_millis()
                );
                proxy::backend_response(status, &headers, body)
            }
            Err(err) => {
                error!(
                    "Upstream {} failed after {} ms: {}",
                    backend.address(),
                    latency.as_millis(),
                    err
                );
                proxy::simple_response(StatusCode::BAD_GATEWAY, "Bad gateway\n")
            }
        }
    }

    /// Registers a backend and probes it right away.
    pub fn add_backend(&self, address: &str) -> Result<(), LbError> {
        let backend = self.registry.add(address)?;
        self.monitor.probe_now(backend);
        Ok(())
    }

    pub fn remove_backend(&self, address: &str) -> Result<(), LbError> {
        self.registry.remove(address).map(|_| ())
    }

    pub fn backends(&self) -> Vec<String> {
        self.registry.addresses()
    }

    pub fn metrics(&self) -> Vec<BackendMetrics> {
        self.registry.metrics()
    }
}
