//! Partition-aware isochrone query
//!
//! Three phases over the prepared data:
//!
//! 1. Core range sweep: Dijkstra from the origin over the start cell's edges
//!    plus core-to-core CH arcs. Weights are exact for every start-cell node
//!    and every core node within budget. Each settled border node either
//!    saturates its cell (`weight + eccentricity < budget` and the node
//!    reaches its whole cell) or marks the cell active.
//! 2. Folded into 1.
//! 3. Active-cell expansion: per active cell, a multi-source Dijkstra over
//!    the cell's own edges seeded with the phase-1 weights of its nodes.
//!    Seeds were already counted in phase 1 and do not count again.
//!
//! Eccentricities only skip expansion; nodes enter the result only by being
//! settled or by membership of a saturated cell.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub mod dijkstra;
pub mod filters;
pub mod result;
pub mod tree;

pub use dijkstra::{BoundedDijkstra, Relaxation, VisitBudget};
pub use filters::{ActiveCellEdgeFilter, StartCellEdgeFilter};
pub use result::{IsochroneResult, VisitedCounts};
pub use tree::{SearchTree, SearchTreeEntry};

use crate::config::QueryConfig;
use crate::core_ch::{unpack, CoreChGraph};
use crate::eccentricity::EccentricityStorage;
use crate::graph::{EdgeFilter, NodeId, RoadGraph, Weighting};
use crate::partition::{CellId, PartitionCatalog};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("isochrone query instance already ran")]
    AlreadyRun,

    #[error("isochrone query cancelled")]
    Cancelled,

    #[error("invalid budget {0}: must be a non-negative number")]
    InvalidBudget(f64),

    #[error("origin {origin} is not a node of the graph ({n_nodes} nodes)")]
    UnknownOrigin { origin: NodeId, n_nodes: u32 },

    #[error("weighting mismatch: query uses '{query}' but the {store} was built for '{stored}'")]
    WeightingMismatch {
        query: String,
        store: &'static str,
        stored: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryPhase {
    Init,
    StartCell,
    ActiveCells,
    Done,
}

/// Per-query bookkeeping, reset on every run
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub origin: NodeId,
    pub budget: f64,
    pub start_cell: Option<CellId>,
    pub active_cells: BTreeSet<CellId>,
    pub active_border_nodes: BTreeSet<NodeId>,
    /// Border nodes that saturated their cell, or were reached after it was
    pub inactive_border_nodes: BTreeSet<NodeId>,
    pub fully_reachable_cells: BTreeSet<CellId>,
    /// Phase-1 weight of every settled node outside the start cell
    pub phase3_seeds: BTreeMap<NodeId, f64>,
}

impl QueryState {
    fn new(origin: NodeId, budget: f64) -> Self {
        Self {
            origin,
            budget,
            ..Default::default()
        }
    }

    fn on_settled_outside_start_cell(
        &mut self,
        catalog: &dyn PartitionCatalog,
        eccentricities: &EccentricityStorage,
        entry: &SearchTreeEntry,
        cell: CellId,
    ) {
        self.phase3_seeds.insert(entry.node, entry.weight);
        if self.fully_reachable_cells.contains(&cell) {
            if catalog.is_border(entry.node) {
                self.inactive_border_nodes.insert(entry.node);
            }
            return;
        }
        if !catalog.is_border(entry.node) {
            // restriction node of another cell: exact weight, seeds the sweep
            self.active_cells.insert(cell);
            return;
        }

        let saturates = eccentricities
            .eccentricity(entry.node)
            .is_some_and(|ecc| entry.weight + ecc < self.budget)
            && eccentricities.is_fully_reachable(entry.node);

        if saturates {
            trace!(node = entry.node, cell, weight = entry.weight, "cell fully reachable");
            self.fully_reachable_cells.insert(cell);
            self.active_cells.remove(&cell);
            self.inactive_border_nodes.insert(entry.node);
        } else {
            self.active_cells.insert(cell);
            self.active_border_nodes.insert(entry.node);
        }
    }
}

/// Single-use isochrone query over shared, read-only prepared data
pub struct IsochroneQuery<'a> {
    graph: &'a RoadGraph,
    catalog: &'a dyn PartitionCatalog,
    core: &'a CoreChGraph,
    eccentricities: &'a EccentricityStorage,
    weighting: &'a dyn Weighting,
    filter: Option<&'a dyn EdgeFilter>,
    config: QueryConfig,
    cancel: Option<CancellationToken>,
    phase: QueryPhase,
    state: QueryState,
}

impl<'a> IsochroneQuery<'a> {
    pub fn new(
        graph: &'a RoadGraph,
        catalog: &'a dyn PartitionCatalog,
        core: &'a CoreChGraph,
        eccentricities: &'a EccentricityStorage,
        weighting: &'a dyn Weighting,
    ) -> Self {
        Self {
            graph,
            catalog,
            core,
            eccentricities,
            weighting,
            filter: None,
            config: QueryConfig::default(),
            cancel: None,
            phase: QueryPhase::Init,
            state: QueryState::default(),
        }
    }

    /// AND an extra filter (e.g. access restrictions) into both phases.
    ///
    /// Results are exact only if the core and the eccentricities were
    /// prepared with the same filter, see `CorePreparation::with_filter` and
    /// `EccentricityPrecomputation::with_filter`.
    pub fn with_filter(mut self, filter: &'a dyn EdgeFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn phase(&self) -> QueryPhase {
        self.phase
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    fn check_inputs(&self, origin: NodeId, budget: f64) -> Result<(), QueryError> {
        if budget.is_nan() || budget < 0.0 {
            return Err(QueryError::InvalidBudget(budget));
        }
        if origin >= self.graph.n_nodes() {
            return Err(QueryError::UnknownOrigin {
                origin,
                n_nodes: self.graph.n_nodes(),
            });
        }
        let query = self.weighting.name();
        if self.core.weighting() != query {
            return Err(QueryError::WeightingMismatch {
                query: query.to_string(),
                store: "core graph",
                stored: self.core.weighting().to_string(),
            });
        }
        if self.eccentricities.weighting() != query {
            return Err(QueryError::WeightingMismatch {
                query: query.to_string(),
                store: "eccentricity store",
                stored: self.eccentricities.weighting().to_string(),
            });
        }
        Ok(())
    }

    /// Compute every node reachable from `origin` within `budget`.
    ///
    /// Invalid arguments are rejected without consuming the instance; any
    /// other outcome, cancellation included, leaves it in `Done`.
    pub fn compute_isochrone(
        &mut self,
        origin: NodeId,
        budget: f64,
    ) -> Result<IsochroneResult, QueryError> {
        if self.phase != QueryPhase::Init {
            return Err(QueryError::AlreadyRun);
        }
        self.check_inputs(origin, budget)?;

        let started = Instant::now();
        self.state = QueryState::new(origin, budget);

        let Some(start_cell) = self.catalog.cell_id(origin) else {
            debug!(origin, "origin has no cell");
            self.phase = QueryPhase::Done;
            return Ok(IsochroneResult::origin_only(origin, budget));
        };
        self.state.start_cell = Some(start_cell);

        let outcome = self.run_phases(start_cell);
        self.phase = QueryPhase::Done;
        let result = outcome?;

        debug!(
            origin,
            budget,
            nodes = result.reachable_nodes.len(),
            fully_reachable_cells = result.fully_reachable_cells.len(),
            active_cells = result.active_cells.len(),
            phase1 = result.visited_counts.phase1,
            phase3 = result.visited_counts.phase3,
            partial = result.partial,
            elapsed_us = started.elapsed().as_micros() as u64,
            "isochrone computed"
        );
        Ok(result)
    }

    fn run_phases(&mut self, start_cell: CellId) -> Result<IsochroneResult, QueryError> {
        let origin = self.state.origin;
        let budget = self.state.budget;
        let mut visits = VisitBudget::new(self.config.max_visited_nodes);
        let mut result = IsochroneResult {
            origin,
            budget,
            reachable_nodes: BTreeMap::new(),
            reachable_edges: BTreeSet::new(),
            fully_reachable_cells: BTreeSet::new(),
            active_cells: BTreeSet::new(),
            visited_counts: VisitedCounts::default(),
            partial: false,
        };

        // phase 1: start cell + core
        self.phase = QueryPhase::StartCell;
        let phase1 = self.sweep_start_cell_and_core(start_cell, &mut visits)?;
        result.visited_counts.phase1 = visits.visited;
        self.collect(&phase1, &mut result);

        // phase 3: active cells
        self.phase = QueryPhase::ActiveCells;
        if !visits.exceeded {
            let active: Vec<CellId> = self.state.active_cells.iter().copied().collect();
            for cell in active {
                let sweep = self.sweep_active_cell(cell, &mut visits)?;
                self.collect(&sweep, &mut result);
                if visits.exceeded {
                    break;
                }
            }
        }
        result.visited_counts.phase3 = visits.visited - result.visited_counts.phase1;

        result.partial = visits.exceeded;
        result.fully_reachable_cells = self.state.fully_reachable_cells.clone();
        result.active_cells = self.state.active_cells.clone();
        Ok(result)
    }

    fn sweep_start_cell_and_core(
        &mut self,
        start_cell: CellId,
        visits: &mut VisitBudget,
    ) -> Result<BoundedDijkstra, QueryError> {
        let graph = self.graph;
        let catalog = self.catalog;
        let core = self.core;
        let weighting = self.weighting;
        let eccentricities = self.eccentricities;
        let origin = self.state.origin;
        let budget = self.state.budget;
        let filter = StartCellEdgeFilter::new(catalog, start_cell, self.filter);

        let expand = |node: NodeId, out: &mut Vec<Relaxation>| {
            if filter.covers(node) {
                for edge in graph.edges_from(node) {
                    if filter.accept(&edge) {
                        out.push(Relaxation {
                            adj: edge.adj,
                            arc: edge.edge,
                            orig_edge: edge.orig_edge,
                            weight: weighting.calc_weight(&edge),
                        });
                    }
                }
            }
            for arc in core.core_out_arcs(node) {
                out.push(Relaxation {
                    adj: arc.node,
                    arc: arc.id,
                    orig_edge: core.last_original_edge(arc.id),
                    weight: arc.weight,
                });
            }
        };

        let state = &mut self.state;
        let on_settle = |entry: &SearchTreeEntry| match catalog.cell_id(entry.node) {
            Some(cell) if cell != start_cell => {
                state.on_settled_outside_start_cell(catalog, eccentricities, entry, cell)
            }
            _ => {}
        };

        let mut search = BoundedDijkstra::new(budget);
        search.seed(origin, 0.0);
        search.run(expand, on_settle, visits, self.cancel.as_ref())?;
        Ok(search)
    }

    fn sweep_active_cell(
        &self,
        cell: CellId,
        visits: &mut VisitBudget,
    ) -> Result<BoundedDijkstra, QueryError> {
        let graph = self.graph;
        let weighting = self.weighting;
        let filter = ActiveCellEdgeFilter::new(self.catalog, cell, self.filter);

        let mut search = BoundedDijkstra::new(self.state.budget);
        for (&node, &weight) in &self.state.phase3_seeds {
            if self.catalog.cell_id(node) == Some(cell) {
                search.seed_precharged(node, weight);
            }
        }

        let expand = |node: NodeId, out: &mut Vec<Relaxation>| {
            for edge in graph.edges_from(node) {
                if filter.accept(&edge) {
                    out.push(Relaxation {
                        adj: edge.adj,
                        arc: edge.edge,
                        orig_edge: edge.orig_edge,
                        weight: weighting.calc_weight(&edge),
                    });
                }
            }
        };

        let settled = search.run(expand, |_| {}, visits, self.cancel.as_ref())?;
        trace!(cell, settled, "active cell swept");
        Ok(search)
    }

    /// Merge settled entries of one sweep into the result
    fn collect(&self, search: &BoundedDijkstra, result: &mut IsochroneResult) {
        for entry in search.settled_entries() {
            let weight = result
                .reachable_nodes
                .entry(entry.node)
                .or_insert(entry.weight);
            *weight = weight.min(entry.weight);
            if let Some(arc) = entry.edge {
                if self.core.is_shortcut(arc) {
                    let mut edges = Vec::new();
                    unpack::unpack_into(self.core, arc, &mut edges);
                    result.reachable_edges.extend(edges);
                } else {
                    result.reachable_edges.insert(arc);
                }
            }
        }
    }
}
