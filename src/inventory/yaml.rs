//! YAML inventory loading.
//!
//! The on-disk format is a flat document with a `devices` list:
//!
//! ```yaml
//! devices:
//!   - id: r1
//!     name: R1
//!     address: 10.1.200.1
//!     credentials: { username: "1", secret: "1" }
//!     region: R1
//!     tenant: a
//!     layer: core
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::{Device, MemoryRepository, RepositoryError, RepositoryResult};

#[derive(Debug, Deserialize)]
struct InventoryDocument {
    devices: Vec<Device>,
}

/// Loads a YAML inventory file into an in-memory repository.
///
/// I/O and parse failures surface as [`RepositoryError::Unavailable`] so
/// callers treat a broken inventory file the same as an unreachable backend.
pub fn load_yaml_inventory(path: impl AsRef<Path>) -> RepositoryResult<MemoryRepository> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| RepositoryError::Unavailable(format!("read {}: {}", path.display(), e)))?;
    let doc: InventoryDocument = serde_yaml::from_str(&raw)
        .map_err(|e| RepositoryError::Unavailable(format!("parse {}: {}", path.display(), e)))?;
    info!(path = %path.display(), devices = doc.devices.len(), "loaded inventory");
    Ok(MemoryRepository::new(doc.devices))
}
