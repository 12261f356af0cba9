use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::info;

use crate::{
    LbError,
    backend::{Backend, BackendMetrics, normalize_address},
};

/// Ordered, concurrently readable set of backends.
///
/// The lock only guards membership. Readers take a snapshot of the `Arc`s and
/// release it before touching per-backend state, so scoring and probing never
/// hold up an add or remove.
#[derive(Debug, Default)]
pub struct Registry {
    backends: RwLock<Vec<Arc<Backend>>>,
}

impl Registry {
    pub fn new<I, S>(addresses: I) -> Result<Self, LbError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let registry = Self::default();
        for address in addresses {
            registry.add(address.as_ref())?;
        }

        if registry.is_empty() {
            return Err(LbError::NoBackends);
        }
        Ok(registry)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<Backend>> {
        self.read().clone()
    }

    pub fn get(&self, address: &str) -> Option<Arc<Backend>> {
        let address = normalize_address(address);
        self.read()
            .iter()
            .find(|backend| backend.address() == address)
            .cloned()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.read()
            .iter()
            .map(|backend| backend.address().to_string())
            .collect()
    }

    pub fn metrics(&self) -> Vec<BackendMetrics> {
        self.snapshot()
            .iter()
            .map(|backend| backend.metrics())
            .collect()
    }

    /// Appends a backend; its position fixes its place in the round-robin order.
    pub fn add(&self, address: &str) -> Result<Arc<Backend>, LbError> {
        let backend = Arc::new(Backend::new(address)?);

        let mut backends = self.write();
        if backends.iter().any(|b| b.address() == backend.address()) {
            return Err(LbError::Duplicate(backend.address().to_string()));
        }
        backends.push(Arc::clone(&backend));
        drop(backends);

        info!("Added backend: {}", backend.address());
        Ok(backend)
    }

    pub fn remove(&self, address: &str) -> Result<Arc<Backend>, LbError> {
        let address = normalize_address(address);

        let mut backends = self.write();
        let index = backends
            .iter()
            .position(|backend| backend.address() == address)
            .ok_or_else(|| LbError::NotFound(address.to_string()))?;
        let backend = backends.remove(index);
        drop(backends);

        info!("Removed backend: {}", address);
        Ok(backend)
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<Backend>>> {
        self.backends.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<Backend>>> {
        self.backends.write().unwrap_or_else(PoisonError::into_inner)
    }
}
