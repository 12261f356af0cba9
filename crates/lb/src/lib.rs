pub mod backend;
pub mod error;
pub mod registry;
pub mod scheduler;

pub use backend::{Backend, BackendMetrics, ConnectionGuard};
pub use error::LbError;
pub use registry::Registry;
pub use scheduler::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    BecameHealthy,
    BecameUnhealthy,
}
