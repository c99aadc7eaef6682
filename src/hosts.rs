use crate::error::RegistryError;
use crate::forward::Forwarder;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A backend target of the proxy
#[derive(Debug)]
pub struct Host {
    /// Server name the host is registered under
    pub sni: String,
    /// Backend URL, e.g. "http://localhost:9001"
    pub address: String,
    /// Forwarder bound to `address`, built once and shared across requests
    pub forwarder: Forwarder,
}

/// Host-management functionality required of a multiple-host proxy.
///
/// `get` returning `Ok(None)` is the normal "unknown host" outcome; `Err` is
/// reserved for internal failures of the registry itself.
#[async_trait]
pub trait HostManager: Send + Sync {
    /// Insert or replace the host for `sni`
    async fn put_host(
        &self,
        sni: &str,
        address: &str,
        forwarder: Forwarder,
    ) -> Result<(), RegistryError>;

    /// Look up the host for `sni`
    async fn get_host(&self, sni: &str) -> Result<Option<Arc<Host>>, RegistryError>;

    /// Remove the host for `sni`; unknown names are not an error
    async fn remove_host(&self, sni: &str) -> Result<(), RegistryError>;
}

/// In-memory host registry guarded by a read/write lock.
///
/// Entries are stored as `Arc<Host>` and swapped whole, so readers observe
/// either the previous entry or the new one.
#[derive(Debug, Default)]
pub struct InMemoryHostManager {
    hosts: RwLock<HashMap<String, Arc<Host>>>,
}

impl InMemoryHostManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered hosts
    pub fn len(&self) -> Result<usize, RegistryError> {
        let hosts = self.hosts.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(hosts.len())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl HostManager for InMemoryHostManager {
    async fn put_host(
        &self,
        sni: &str,
        address: &str,
        forwarder: Forwarder,
    ) -> Result<(), RegistryError> {
        let host = Arc::new(Host {
            sni: sni.to_string(),
            address: address.to_string(),
            forwarder,
        });

        let mut hosts = self.hosts.write().map_err(|_| RegistryError::Poisoned)?;
        if hosts.insert(sni.to_string(), host).is_some() {
            debug!("Replaced target host for SNI {}", sni);
        }
        Ok(())
    }

    async fn get_host(&self, sni: &str) -> Result<Option<Arc<Host>>, RegistryError> {
        let hosts = self.hosts.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(hosts.get(sni).cloned())
    }

    async fn remove_host(&self, sni: &str) -> Result<(), RegistryError> {
        let mut hosts = self.hosts.write().map_err(|_| RegistryError::Poisoned)?;
        hosts.remove(sni);
        Ok(())
    }
}
