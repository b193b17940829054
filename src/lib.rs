//! # Fleetconf - Network Fleet Configuration Engine
//!
//! Fleetconf drives interactive command-line sessions against a small, fixed
//! fleet of network devices arranged in a dual-region, dual-tenant topology.
//! Callers submit typed configuration intents (DHCP pools, ACL rules and
//! bindings, NAT, spanning tree); the engine validates them, leases the
//! target device, logs in over telnet, walks the device's mode hierarchy,
//! issues the vendor command sequence, and verifies the result with read-only
//! probes. A background prober measures reachability of every topology edge
//! and publishes immutable snapshots.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     ConfigEngine                       │
//! │   (intent lifecycle, leases, prober, event streams)    │
//! └────────────────────────────────────────────────────────┘
//!        │                  │                     │
//!        ▼                  ▼                     ▼
//! ┌─────────────┐   ┌───────────────┐   ┌─────────────────┐
//! │  Inventory  │   │    Dialect    │   │     Prober      │
//! │ (repository │   │ (intent into  │   │ (edge pings +   │
//! │  + filters) │   │ command plan) │   │   snapshots)    │
//! └─────────────┘   └───────────────┘   └─────────────────┘
//!        │                  │
//!        │                  ▼
//!        │          ┌───────────────┐
//!        │          │ DialogueDriver│
//!        │          │ (mode machine,│
//!        │          │  prompts)     │
//!        │          └───────────────┘
//!        │                  │
//!        └──────────────────▼
//!                   ┌───────────────┐
//!                   │   Transport   │
//!                   │ (telnet/TCP)  │
//!                   └───────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fleetconf::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let repository = Arc::new(load_yaml_inventory("inventory.yml")?);
//!     let engine = ConfigEngine::new(
//!         repository,
//!         Arc::new(TelnetTransport::new()),
//!         EngineConfig::from_env(),
//!     );
//!
//!     let stream = engine.submit_intent("R1-A-ACC", Intent::DhcpPool(pool_params));
//!     let mut events = engine.events(stream);
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event.kind);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dialect;
pub mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod inventory;
pub mod probe;
pub mod scheduler;
pub mod topology;
pub mod transport;

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::dialect::{
        AclAction, AclBindParams, AclRuleParams, DhcpPoolParams, Direction, ExcludedRange, Intent,
        MstInstance, NatOutboundParams, NatStaticParams, Protocol, StpInterfaceParams, StpMode,
        StpParams, VrpDialect,
    };
    pub use crate::engine::ConfigEngine;
    pub use crate::error::{EngineError, Result};
    pub use crate::events::{Event, EventKind, StreamId};
    pub use crate::inventory::{
        load_yaml_inventory, Device, DeviceFilter, DeviceId, InventoryRepository, Layer,
        MemoryRepository, Region, Tenant,
    };
    pub use crate::probe::{LinkState, ReachabilitySnapshot};
    pub use crate::topology::{EdgeId, EdgeKind, LogicalEdge, Topology};
    pub use crate::transport::{TelnetTransport, Transport};
}
