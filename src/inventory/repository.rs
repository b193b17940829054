//! Read-only repository access to the device inventory.
//!
//! The engine does not mandate a physical store. Callers pass any
//! implementation of [`InventoryRepository`]; the bundled [`MemoryRepository`]
//! backs the YAML loader and the test suites.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::{Credential, Device, DeviceId, Layer, Region, Tenant};

/// Errors from inventory lookups.
#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    /// No device with the given id or name.
    #[error("Device '{0}' not found in inventory")]
    NotFound(String),

    /// The backing store is unreachable. Transient; callers may retry.
    #[error("Inventory backend unavailable: {0}")]
    Unavailable(String),
}

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Composable predicate over device classification fields.
///
/// An unset field matches everything, so filters combine by narrowing:
///
/// ```rust
/// use fleetconf::inventory::{DeviceFilter, Region, Layer};
///
/// let filter = DeviceFilter::new().region(Region::R1).layer(Layer::Access);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    region: Option<Region>,
    tenant: Option<Tenant>,
    layer: Option<Layer>,
}

impl DeviceFilter {
    /// A filter matching every device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Narrows to one region.
    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// Narrows to one tenant scope.
    pub fn tenant(mut self, tenant: Tenant) -> Self {
        self.tenant = Some(tenant);
        self
    }

    /// Narrows to one topology layer.
    pub fn layer(mut self, layer: Layer) -> Self {
        self.layer = Some(layer);
        self
    }

    /// Whether the device passes every set predicate.
    pub fn matches(&self, device: &Device) -> bool {
        self.region.map_or(true, |r| device.region == r)
            && self.tenant.map_or(true, |t| device.tenant == t)
            && self.layer.map_or(true, |l| device.layer == l)
    }
}

/// Read-only lookup into the persistent device store.
///
/// Implementations must be idempotent and safe for concurrent readers.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Fetches a device by stable id.
    async fn lookup(&self, id: &DeviceId) -> RepositoryResult<Device>;

    /// Fetches a device by operator-facing display name.
    async fn find_by_name(&self, name: &str) -> RepositoryResult<Device>;

    /// Lists devices passing the filter.
    async fn list(&self, filter: &DeviceFilter) -> RepositoryResult<Vec<Device>>;

    /// Resolves a display name to its management endpoint and credential.
    async fn resolve_address(&self, name: &str) -> RepositoryResult<(SocketAddr, Credential)> {
        let device = self.find_by_name(name).await?;
        Ok((device.endpoint(), device.credentials))
    }
}

/// In-memory repository over a fixed set of devices.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    by_id: HashMap<DeviceId, Arc<Device>>,
    by_name: HashMap<String, Arc<Device>>,
}

impl MemoryRepository {
    /// Builds a repository from a device list. Later duplicates win, matching
    /// last-writer-wins semantics of the external provisioning tooling.
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for device in devices {
            let device = Arc::new(device);
            by_id.insert(device.id.clone(), Arc::clone(&device));
            by_name.insert(device.name.clone(), device);
        }
        Self { by_id, by_name }
    }

    /// Number of devices held.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when the repository holds no devices.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[async_trait]
impl InventoryRepository for MemoryRepository {
    async fn lookup(&self, id: &DeviceId) -> RepositoryResult<Device> {
        self.by_id
            .get(id)
            .map(|d| (**d).clone())
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn find_by_name(&self, name: &str) -> RepositoryResult<Device> {
        self.by_name
            .get(name)
            .map(|d| (**d).clone())
            .ok_or_else(|| RepositoryError::NotFound(name.to_string()))
    }

    async fn list(&self, filter: &DeviceFilter) -> RepositoryResult<Vec<Device>> {
        let mut devices: Vec<Device> = self
            .by_id
            .values()
            .filter(|d| filter.matches(d))
            .map(|d| (**d).clone())
            .collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }
}
