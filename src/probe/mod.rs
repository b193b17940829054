//! Concurrent reachability prober and the snapshot store.
//!
//! The prober walks the static topology on a fixed interval, pings each
//! edge's target endpoint with bounded fanout, and publishes one immutable
//! [`ReachabilitySnapshot`] per completed cycle. Readers always see either
//! the previous complete snapshot or the new one, never a half-written mix.
//! An unreachable inventory backend skips the whole cycle and keeps the last
//! snapshot current.

mod ping;

pub use ping::{Pinger, SystemPinger};

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::inventory::{InventoryRepository, RepositoryError};
use crate::topology::{EdgeId, Topology};

/// Observed reachability of one logical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// At least one probe attempt answered.
    Up,
    /// Every attempt in the cycle went unanswered.
    Down,
    /// Not measured: never probed yet, or the endpoint is not in inventory.
    Unknown,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LinkState::Up => "up",
            LinkState::Down => "down",
            LinkState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// One complete, immutable reachability measurement.
#[derive(Debug, Clone, Serialize)]
pub struct ReachabilitySnapshot {
    /// Monotonic cycle counter; the initial all-unknown snapshot is 0.
    pub generation: u64,
    /// When the cycle finished.
    pub completed_at: DateTime<Utc>,
    states: IndexMap<EdgeId, LinkState>,
}

impl ReachabilitySnapshot {
    /// The generation-zero snapshot: every edge unknown.
    pub fn initial(topology: &Topology) -> Self {
        Self {
            generation: 0,
            completed_at: Utc::now(),
            states: topology
                .edges()
                .iter()
                .map(|e| (e.id.clone(), LinkState::Unknown))
                .collect(),
        }
    }

    /// State of one edge; edges outside the snapshot read as unknown.
    pub fn state(&self, edge: &EdgeId) -> LinkState {
        self.states.get(edge).copied().unwrap_or(LinkState::Unknown)
    }

    /// All edge states in topology declaration order.
    pub fn states(&self) -> impl Iterator<Item = (&EdgeId, LinkState)> {
        self.states.iter().map(|(id, state)| (id, *state))
    }

    /// Number of edges measured as up.
    pub fn up_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == LinkState::Up)
            .count()
    }
}

/// Holds the current snapshot behind a swap; readers clone an `Arc` and keep
/// a consistent view for as long as they like.
pub struct SnapshotStore {
    current: RwLock<Arc<ReachabilitySnapshot>>,
}

impl SnapshotStore {
    /// Creates the store seeded with the all-unknown snapshot.
    pub fn new(topology: &Topology) -> Self {
        Self {
            current: RwLock::new(Arc::new(ReachabilitySnapshot::initial(topology))),
        }
    }

    /// The current complete snapshot.
    pub fn current(&self) -> Arc<ReachabilitySnapshot> {
        Arc::clone(&self.current.read())
    }

    fn publish(&self, snapshot: ReachabilitySnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }
}

/// Where the prober is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProberPhase {
    /// Waiting for the next tick.
    Idle,
    /// Measuring edges.
    Cycling,
    /// Swapping the finished snapshot in.
    Publishing,
    /// Shut down; no further snapshots will appear.
    Stopped,
}

/// Periodic topology prober.
pub struct Prober {
    topology: Topology,
    repository: Arc<dyn InventoryRepository>,
    pinger: Arc<dyn Pinger>,
    store: Arc<SnapshotStore>,
    config: EngineConfig,
    phase: Mutex<ProberPhase>,
}

impl Prober {
    /// Creates a prober publishing into `store`.
    pub fn new(
        topology: Topology,
        repository: Arc<dyn InventoryRepository>,
        pinger: Arc<dyn Pinger>,
        store: Arc<SnapshotStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            topology,
            repository,
            pinger,
            store,
            config,
            phase: Mutex::new(ProberPhase::Idle),
        }
    }

    /// Current phase, for observability.
    pub fn phase(&self) -> ProberPhase {
        *self.phase.lock()
    }

    /// Runs cycles on the configured interval until cancelled. The first
    /// cycle starts immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.prober_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.run_cycle_now().await,
            }
        }
        *self.phase.lock() = ProberPhase::Stopped;
        info!("prober stopped");
    }

    /// Runs one full measure-and-publish cycle. Also the manual trigger for
    /// callers that want a fresh snapshot outside the schedule.
    pub async fn run_cycle_now(&self) {
        *self.phase.lock() = ProberPhase::Cycling;
        match self.measure().await {
            Some(states) => {
                *self.phase.lock() = ProberPhase::Publishing;
                let generation = self.store.current().generation + 1;
                let snapshot = ReachabilitySnapshot {
                    generation,
                    completed_at: Utc::now(),
                    states,
                };
                debug!(
                    generation,
                    up = snapshot.up_count(),
                    edges = snapshot.states.len(),
                    "publishing reachability snapshot"
                );
                self.store.publish(snapshot);
            }
            None => {
                warn!("inventory backend unavailable; probe cycle skipped, keeping last snapshot");
            }
        }
        *self.phase.lock() = ProberPhase::Idle;
    }

    /// Measures every edge. `None` means the cycle was abandoned because the
    /// inventory backend was unreachable.
    async fn measure(&self) -> Option<IndexMap<EdgeId, LinkState>> {
        // Resolve each distinct endpoint name once per cycle.
        let mut resolved: HashMap<String, Option<IpAddr>> = HashMap::new();
        for edge in self.topology.edges() {
            for name in [&edge.source, &edge.target] {
                if resolved.contains_key(name.as_str()) {
                    continue;
                }
                let entry = match self.repository.find_by_name(name).await {
                    Ok(device) => Some(device.address),
                    Err(RepositoryError::NotFound(missing)) => {
                        debug!(name = %missing, "edge endpoint not in inventory; edge degrades to unknown");
                        None
                    }
                    Err(RepositoryError::Unavailable(message)) => {
                        warn!(%message, "inventory lookup failed");
                        return None;
                    }
                };
                resolved.insert(name.clone(), entry);
            }
        }

        // An edge is measurable only when both endpoints resolved; the probe
        // itself goes to the target address. Owned pairs keep the fanned-out
        // futures free of borrows into the topology.
        let probes: Vec<(EdgeId, Option<IpAddr>)> = self
            .topology
            .edges()
            .iter()
            .map(|edge| {
                let source = resolved.get(&edge.source).copied().flatten();
                let target = resolved.get(&edge.target).copied().flatten();
                (edge.id.clone(), source.and(target))
            })
            .collect();

        let measured: HashMap<EdgeId, LinkState> = stream::iter(probes)
            .map(|(id, addr)| async move {
                let state = match addr {
                    Some(addr) => {
                        if self.ping_with_retries(addr).await {
                            LinkState::Up
                        } else {
                            LinkState::Down
                        }
                    }
                    None => LinkState::Unknown,
                };
                (id, state)
            })
            .buffer_unordered(self.config.prober_fanout.max(1))
            .collect()
            .await;

        // Fanout completes out of order; re-key in declaration order.
        Some(
            self.topology
                .edges()
                .iter()
                .map(|edge| {
                    let state = measured
                        .get(&edge.id)
                        .copied()
                        .unwrap_or(LinkState::Unknown);
                    (edge.id.clone(), state)
                })
                .collect(),
        )
    }

    /// Up as soon as one attempt answers; down only after all attempts fail.
    async fn ping_with_retries(&self, addr: IpAddr) -> bool {
        let timeout = self.config.prober_attempt_timeout();
        for _ in 0..self.config.prober_attempts.max(1) {
            if self.pinger.ping(addr, timeout).await {
                return true;
            }
        }
        false
    }
}
