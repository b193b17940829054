//! Device leases and the global session ceiling.
//!
//! Every intent holds exactly one lease for its device for the whole
//! dialogue, so a device never carries two concurrent telnet sessions.
//! Waiters on the same device are served in request order. On top of the
//! per-device locks a global semaphore caps how many sessions the whole
//! process keeps open at once.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{EngineError, Result};
use crate::inventory::DeviceId;

/// Holds the device lock and the global session permit until dropped.
pub struct LeaseGuard {
    device_id: DeviceId,
    _device: OwnedMutexGuard<()>,
    _permit: OwnedSemaphorePermit,
}

impl LeaseGuard {
    /// The leased device.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        debug!(device = %self.device_id, "device lease released");
    }
}

/// Hands out per-device leases under a global session ceiling.
pub struct DeviceLeases {
    ceiling: Arc<Semaphore>,
    devices: Mutex<HashMap<DeviceId, Arc<tokio::sync::Mutex<()>>>>,
}

impl DeviceLeases {
    /// Creates the lease table with the given global session ceiling.
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: Arc::new(Semaphore::new(ceiling.max(1))),
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the lease for `device_id`, waiting behind earlier requests
    /// for the same device and behind the global ceiling. Fails with a
    /// timeout error once `deadline` passes.
    pub async fn acquire(&self, device_id: &DeviceId, deadline: Instant) -> Result<LeaseGuard> {
        let started = Instant::now();
        let device_lock = {
            let mut devices = self.devices.lock();
            Arc::clone(
                devices
                    .entry(device_id.clone())
                    .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
            )
        };

        trace!(device = %device_id, "waiting for device lease");
        let device = tokio::time::timeout_at(deadline, device_lock.lock_owned())
            .await
            .map_err(|_| lease_timeout(deadline, started))?;

        let permit = tokio::time::timeout_at(
            deadline,
            Arc::clone(&self.ceiling).acquire_owned(),
        )
        .await
        .map_err(|_| lease_timeout(deadline, started))?
        .map_err(|_| EngineError::Internal("session ceiling semaphore closed".into()))?;

        debug!(device = %device_id, "device lease acquired");
        Ok(LeaseGuard {
            device_id: device_id.clone(),
            _device: device,
            _permit: permit,
        })
    }

    /// Number of global session permits currently free.
    pub fn available_sessions(&self) -> usize {
        self.ceiling.available_permits()
    }
}

fn lease_timeout(deadline: Instant, started: Instant) -> EngineError {
    EngineError::Timeout {
        phase: "device_lease",
        timeout_secs: deadline.saturating_duration_since(started).as_secs(),
    }
}
