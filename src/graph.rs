//! In-memory road graph, weightings and edge filters
//!
//! The graph is stored as an undirected edge list with per-direction access
//! flags plus a CSR index of incident edges per node. Traversal always yields
//! [`EdgeState`]s oriented away from the base node, so weightings and filters
//! never need to know how an edge was stored.

use serde::{Deserialize, Serialize};

use butterfly_common::{Error, Result};

pub type NodeId = u32;
pub type EdgeId = u32;

/// A stored road segment between `base` and `adj`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoadEdge {
    pub base: NodeId,
    pub adj: NodeId,
    /// Length in meters
    pub distance: f64,
    /// Free-flow speed in km/h
    pub speed_kmh: f64,
    /// Traversable base → adj
    pub access_fwd: bool,
    /// Traversable adj → base
    pub access_bwd: bool,
}

/// An edge as seen while traversing from `base` to `adj`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeState {
    pub edge: EdgeId,
    /// Original edge id, used to correlate turn costs; equals `edge` for road edges
    pub orig_edge: EdgeId,
    pub base: NodeId,
    pub adj: NodeId,
    /// True when traversal runs against the stored orientation
    pub reverse: bool,
    pub distance: f64,
    pub speed_kmh: f64,
    /// Access flag for this traversal direction
    pub accessible: bool,
}

/// Road graph with CSR incident-edge index
#[derive(Debug, Clone)]
pub struct RoadGraph {
    n_nodes: u32,
    edges: Vec<RoadEdge>,
    // incident edges of node u: incident[offsets[u]..offsets[u+1]]
    offsets: Vec<u64>,
    incident: Vec<EdgeId>,
}

impl RoadGraph {
    pub fn new(n_nodes: u32, edges: Vec<RoadEdge>) -> Result<Self> {
        for (i, e) in edges.iter().enumerate() {
            if e.base >= n_nodes || e.adj >= n_nodes {
                return Err(Error::InvalidInput(format!(
                    "edge {} references node outside 0..{}: {} -> {}",
                    i, n_nodes, e.base, e.adj
                )));
            }
            if !e.distance.is_finite() || e.distance < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "edge {} has invalid distance {}",
                    i, e.distance
                )));
            }
        }
        if edges.len() >= u32::MAX as usize {
            return Err(Error::InvalidInput(format!(
                "too many edges: {}",
                edges.len()
            )));
        }

        let n = n_nodes as usize;
        let mut degree = vec![0u64; n];
        for e in &edges {
            degree[e.base as usize] += 1;
            if e.adj != e.base {
                degree[e.adj as usize] += 1;
            }
        }

        let mut offsets = Vec::with_capacity(n + 1);
        let mut offset = 0u64;
        for d in &degree {
            offsets.push(offset);
            offset += d;
        }
        offsets.push(offset);

        let mut fill: Vec<u64> = offsets[..n].to_vec();
        let mut incident = vec![0u32; offset as usize];
        for (i, e) in edges.iter().enumerate() {
            incident[fill[e.base as usize] as usize] = i as EdgeId;
            fill[e.base as usize] += 1;
            if e.adj != e.base {
                incident[fill[e.adj as usize] as usize] = i as EdgeId;
                fill[e.adj as usize] += 1;
            }
        }

        Ok(Self {
            n_nodes,
            edges,
            offsets,
            incident,
        })
    }

    pub fn n_nodes(&self) -> u32 {
        self.n_nodes
    }

    pub fn n_edges(&self) -> u32 {
        self.edges.len() as u32
    }

    pub fn edge(&self, edge: EdgeId) -> &RoadEdge {
        &self.edges[edge as usize]
    }

    pub fn edges(&self) -> &[RoadEdge] {
        &self.edges
    }

    pub fn degree(&self, node: NodeId) -> usize {
        let u = node as usize;
        (self.offsets[u + 1] - self.offsets[u]) as usize
    }

    /// Orient `edge` so that traversal starts at `from`.
    ///
    /// `from` must be one of the edge's endpoints.
    pub fn edge_state(&self, edge: EdgeId, from: NodeId) -> EdgeState {
        let e = &self.edges[edge as usize];
        let reverse = e.base != from;
        let (base, adj, accessible) = if reverse {
            (e.adj, e.base, e.access_bwd)
        } else {
            (e.base, e.adj, e.access_fwd)
        };
        EdgeState {
            edge,
            orig_edge: edge,
            base,
            adj,
            reverse,
            distance: e.distance,
            speed_kmh: e.speed_kmh,
            accessible,
        }
    }

    /// All incident edges of `node`, oriented away from it.
    pub fn edges_from(&self, node: NodeId) -> impl Iterator<Item = EdgeState> + '_ {
        let u = node as usize;
        let start = self.offsets[u] as usize;
        let end = self.offsets[u + 1] as usize;
        self.incident[start..end]
            .iter()
            .map(move |&e| self.edge_state(e, node))
    }

    /// All incident edges of `node`, oriented towards it.
    pub fn edges_into(&self, node: NodeId) -> impl Iterator<Item = EdgeState> + '_ {
        self.edges_from(node).map(move |out| {
            let e = &self.edges[out.edge as usize];
            // flip orientation: traversal adj -> node
            let from = if out.reverse { e.base } else { e.adj };
            if e.base == e.adj {
                out
            } else {
                self.edge_state(out.edge, from)
            }
        })
    }
}

/// Opaque edge weighting.
///
/// Returns `f64::INFINITY` for edges that cannot be traversed in the given
/// direction. The name keys every per-weighting store.
pub trait Weighting: Send + Sync {
    fn name(&self) -> &str;
    fn calc_weight(&self, edge: &EdgeState) -> f64;
}

/// Weight = distance in meters
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortestWeighting;

impl Weighting for ShortestWeighting {
    fn name(&self) -> &str {
        "shortest"
    }

    fn calc_weight(&self, edge: &EdgeState) -> f64 {
        if !edge.accessible {
            return f64::INFINITY;
        }
        edge.distance
    }
}

/// Weight = travel time in seconds at the edge's free-flow speed
#[derive(Debug, Clone, Copy, Default)]
pub struct FastestWeighting;

impl Weighting for FastestWeighting {
    fn name(&self) -> &str {
        "fastest"
    }

    fn calc_weight(&self, edge: &EdgeState) -> f64 {
        if !edge.accessible || edge.speed_kmh <= 0.0 {
            return f64::INFINITY;
        }
        edge.distance / (edge.speed_kmh / 3.6)
    }
}

/// Resolve a weighting by its store name
pub fn weighting_by_name(name: &str) -> Result<Box<dyn Weighting>> {
    match name {
        "shortest" => Ok(Box::new(ShortestWeighting)),
        "fastest" => Ok(Box::new(FastestWeighting)),
        other => Err(Error::InvalidInput(format!(
            "unknown weighting '{other}' (expected 'shortest' or 'fastest')"
        ))),
    }
}

/// Edge predicate used to confine searches
pub trait EdgeFilter: Send + Sync {
    fn accept(&self, edge: &EdgeState) -> bool;
}

impl<F> EdgeFilter for F
where
    F: Fn(&EdgeState) -> bool + Send + Sync,
{
    fn accept(&self, edge: &EdgeState) -> bool {
        self(edge)
    }
}

/// Accepts every edge
#[derive(Debug, Clone, Copy, Default)]
pub struct AllEdgesFilter;

impl EdgeFilter for AllEdgesFilter {
    fn accept(&self, _edge: &EdgeState) -> bool {
        true
    }
}

/// AND-composition of filters; an empty sequence accepts everything.
#[derive(Default)]
pub struct EdgeFilterSequence<'a> {
    filters: Vec<&'a dyn EdgeFilter>,
}

impl<'a> EdgeFilterSequence<'a> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn add(&mut self, filter: &'a dyn EdgeFilter) -> &mut Self {
        self.filters.push(filter);
        self
    }

    pub fn with(mut self, filter: &'a dyn EdgeFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl EdgeFilter for EdgeFilterSequence<'_> {
    fn accept(&self, edge: &EdgeState) -> bool {
        self.filters.iter().all(|f| f.accept(edge))
    }
}
