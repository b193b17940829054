//! Static topology model.
//!
//! The fleet is arranged in a fixed graph of logical links: access feeds
//! aggregation, aggregation feeds the regional core, the core hands off to a
//! border router which peers with the partner region's border. Edges are
//! expressed in terms of operator-facing device names; the prober resolves
//! each name against the inventory exactly once per cycle, and names unknown
//! to the inventory degrade that edge to `unknown` rather than erroring.

use serde::{Deserialize, Serialize};

use crate::inventory::{Region, Tenant};

/// Stable identifier for a topology edge, derived from its endpoint names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub String);

impl EdgeId {
    fn derive(source: &str, target: &str) -> Self {
        Self(format!("{}->{}", source, target))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of a logical link, named by the layers it joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Access switch to aggregation switch.
    AccessToAggregation,
    /// Aggregation switch to regional core.
    AggregationToCore,
    /// Regional core to border router.
    CoreToBorder,
    /// Border router to peer border router.
    BorderToPeer,
    /// Peer border routers across regions.
    PeerBorderToPeerBorder,
}

/// A typed logical link between two devices, identified by display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalEdge {
    /// Stable id, `"{source}->{target}"`.
    pub id: EdgeId,
    /// Source device display name.
    pub source: String,
    /// Target device display name; the prober pings this endpoint.
    pub target: String,
    /// Tenant the link is scoped to, `none` for shared infrastructure.
    pub tenant: Tenant,
    /// Which layers the link joins.
    pub kind: EdgeKind,
}

impl LogicalEdge {
    /// Creates an edge between two named devices.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        tenant: Tenant,
        kind: EdgeKind,
    ) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: EdgeId::derive(&source, &target),
            source,
            target,
            tenant,
            kind,
        }
    }
}

/// The static graph of logical links. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Topology {
    edges: Vec<LogicalEdge>,
}

impl Topology {
    /// Builds a topology from an explicit edge list.
    pub fn new(edges: Vec<LogicalEdge>) -> Self {
        Self { edges }
    }

    /// The standard dual-region, dual-tenant graph.
    ///
    /// Device names follow the operator convention: `R1-A-ACC`, `R1-A-AGG`,
    /// `R1-CORE`, `R1-BORDER`, `R1-PEER`, and the R2 equivalents. Core and
    /// outward links are shared between tenants.
    pub fn dual_region() -> Self {
        let mut edges = Vec::new();
        for region in [Region::R1, Region::R2] {
            for tenant in [Tenant::A, Tenant::B] {
                edges.push(LogicalEdge::new(
                    format!("{}-{}-ACC", region, tenant),
                    format!("{}-{}-AGG", region, tenant),
                    tenant,
                    EdgeKind::AccessToAggregation,
                ));
                edges.push(LogicalEdge::new(
                    format!("{}-{}-AGG", region, tenant),
                    format!("{}-CORE", region),
                    tenant,
                    EdgeKind::AggregationToCore,
                ));
            }
            edges.push(LogicalEdge::new(
                format!("{}-CORE", region),
                format!("{}-BORDER", region),
                Tenant::None,
                EdgeKind::CoreToBorder,
            ));
            edges.push(LogicalEdge::new(
                format!("{}-BORDER", region),
                format!("{}-PEER", region),
                Tenant::None,
                EdgeKind::BorderToPeer,
            ));
        }
        edges.push(LogicalEdge::new(
            "R1-PEER",
            "R2-PEER",
            Tenant::None,
            EdgeKind::PeerBorderToPeerBorder,
        ));
        Self { edges }
    }

    /// All edges, in declaration order.
    pub fn edges(&self) -> &[LogicalEdge] {
        &self.edges
    }

    /// Edges scoped to the given tenant. Shared (`none`) edges are included
    /// for every tenant, since a tenant's traffic traverses them.
    pub fn edges_for(&self, tenant: Tenant) -> Vec<&LogicalEdge> {
        self.edges
            .iter()
            .filter(|e| e.tenant == tenant || e.tenant == Tenant::None)
            .collect()
    }
}
