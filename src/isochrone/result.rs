//! Isochrone query result

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::graph::{EdgeId, NodeId};
use crate::partition::{CellId, PartitionCatalog};

/// Distinct nodes settled per phase; phase-3 seeds count in phase 1 only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisitedCounts {
    pub phase1: usize,
    pub phase3: usize,
}

impl VisitedCounts {
    pub fn total(&self) -> usize {
        self.phase1 + self.phase3
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsochroneResult {
    pub origin: NodeId,
    pub budget: f64,
    /// Nodes settled in phases 1 and 3, with their exact weight
    pub reachable_nodes: BTreeMap<NodeId, f64>,
    /// Tree edge of every settled node, shortcuts unpacked to base edges
    pub reachable_edges: BTreeSet<EdgeId>,
    /// Cells whose every member is within budget without being expanded
    pub fully_reachable_cells: BTreeSet<CellId>,
    /// Cells expanded in phase 3
    pub active_cells: BTreeSet<CellId>,
    pub visited_counts: VisitedCounts,
    /// True if the visited-node cap cut the search short
    pub partial: bool,
}

impl IsochroneResult {
    pub(crate) fn origin_only(origin: NodeId, budget: f64) -> Self {
        Self {
            origin,
            budget,
            reachable_nodes: BTreeMap::from([(origin, 0.0)]),
            reachable_edges: BTreeSet::new(),
            fully_reachable_cells: BTreeSet::new(),
            active_cells: BTreeSet::new(),
            visited_counts: VisitedCounts {
                phase1: 1,
                phase3: 0,
            },
            partial: false,
        }
    }

    /// Exact weight of a settled node
    pub fn weight(&self, node: NodeId) -> Option<f64> {
        self.reachable_nodes.get(&node).copied()
    }

    /// Membership test including fully reachable cells
    pub fn contains(&self, node: NodeId, catalog: &dyn PartitionCatalog) -> bool {
        self.reachable_nodes.contains_key(&node)
            || catalog
                .cell_id(node)
                .is_some_and(|c| self.fully_reachable_cells.contains(&c))
    }

    /// Settled nodes plus every member of every fully reachable cell
    pub fn expand_fully_reachable(&self, catalog: &dyn PartitionCatalog) -> BTreeSet<NodeId> {
        let mut nodes: BTreeSet<NodeId> = self.reachable_nodes.keys().copied().collect();
        for &cell in &self.fully_reachable_cells {
            nodes.extend(catalog.nodes_of_cell(cell).iter().copied());
        }
        nodes
    }

    /// Promote every active cell whose settled share of members is above
    /// `fraction` to fully reachable; returns the promoted cells.
    ///
    /// Trades exactness for a smaller result: members of a promoted cell that
    /// were not settled may lie beyond the budget. `1.0` or more never
    /// promotes, `0.0` promotes every cell with at least one settled node.
    pub fn approximate_active_cells(
        &mut self,
        catalog: &dyn PartitionCatalog,
        fraction: f64,
    ) -> Vec<CellId> {
        let mut settled: BTreeMap<CellId, usize> = BTreeMap::new();
        for &node in self.reachable_nodes.keys() {
            if let Some(cell) = catalog.cell_id(node) {
                *settled.entry(cell).or_default() += 1;
            }
        }

        let promoted: Vec<CellId> = self
            .active_cells
            .iter()
            .copied()
            .filter(|cell| {
                let size = catalog.nodes_of_cell(*cell).len();
                let found = settled.get(cell).copied().unwrap_or(0);
                size > 0 && found as f64 / size as f64 > fraction
            })
            .collect();
        for cell in &promoted {
            self.active_cells.remove(cell);
            self.fully_reachable_cells.insert(*cell);
        }
        promoted
    }
}
