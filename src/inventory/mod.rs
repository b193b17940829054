//! Inventory model for the managed fleet.
//!
//! Devices are created and updated by external tooling; the engine reads them
//! through the narrow [`InventoryRepository`] interface and treats every record
//! as immutable. The classification enums (region, tenant, layer) describe the
//! fixed dual-region, dual-tenant topology the fleet is arranged in.

mod repository;
mod yaml;

pub use repository::{
    DeviceFilter, InventoryRepository, MemoryRepository, RepositoryError, RepositoryResult,
};
pub use yaml::load_yaml_inventory;

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Stable identifier for a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    /// Creates a device id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Vendor tag. A single dialect is supported in scope, but the field is
/// modeled as an enum so another vendor can be added behind the dialect trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// VRP-style command-line dialect (the supported vendor).
    #[default]
    Vrp,
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Vendor::Vrp => write!(f, "vrp"),
        }
    }
}

/// One of the two regions the fleet spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    /// First region.
    R1,
    /// Second region.
    R2,
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::R1 => write!(f, "R1"),
            Region::R2 => write!(f, "R2"),
        }
    }
}

/// Tenant scope of a device or topology edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tenant {
    /// Tenant A.
    A,
    /// Tenant B.
    B,
    /// Shared infrastructure, not scoped to a tenant.
    #[default]
    None,
}

impl std::fmt::Display for Tenant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tenant::A => write!(f, "A"),
            Tenant::B => write!(f, "B"),
            Tenant::None => write!(f, "none"),
        }
    }
}

/// Role of a device within the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    /// Access switch.
    Access,
    /// Aggregation switch.
    Aggregation,
    /// Core router.
    Core,
    /// Border router.
    Border,
    /// Peer border router in the partner region.
    Peer,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Layer::Access => "access",
            Layer::Aggregation => "aggregation",
            Layer::Core => "core",
            Layer::Border => "border",
            Layer::Peer => "peer",
        };
        f.write_str(name)
    }
}

/// Login credential for a device's management session.
///
/// The secret is held as opaque bytes and is never logged, serialized into
/// events, or echoed in error messages.
#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    /// Login user id.
    pub username: String,
    /// Login secret. `Debug` prints a redaction marker.
    pub secret: SecretString,
}

impl Credential {
    /// Creates a credential from plain strings.
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: SecretString::new(secret.into()),
        }
    }
}

/// One managed device.
#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    /// Stable id.
    pub id: DeviceId,
    /// Operator-facing display name; topology edges reference these.
    pub name: String,
    /// Vendor dialect tag.
    #[serde(default)]
    pub vendor: Vendor,
    /// Management address.
    pub address: IpAddr,
    /// Management port for the interactive line protocol.
    #[serde(default = "default_management_port")]
    pub port: u16,
    /// Login credential.
    pub credentials: Credential,
    /// Region the device lives in.
    pub region: Region,
    /// Tenant scope, `none` for shared infrastructure.
    #[serde(default)]
    pub tenant: Tenant,
    /// Topology layer.
    pub layer: Layer,
}

fn default_management_port() -> u16 {
    23
}

impl Device {
    /// Management endpoint as a socket address.
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}
