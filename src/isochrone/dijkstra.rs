//! Budget-bounded Dijkstra shared by the query phases
//!
//! The caller supplies the edge set through an expansion callback, which keeps
//! the phase-specific rules (start cell + core, or a single active cell) out
//! of the search loop.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashSet;
use tokio_util::sync::CancellationToken;

use super::tree::{SearchTree, SearchTreeEntry};
use super::QueryError;
use crate::eccentricity::range_dijkstra::HeapWeight;
use crate::graph::{EdgeId, NodeId};

/// Candidate arc produced by an expansion callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Relaxation {
    pub adj: NodeId,
    pub arc: u32,
    pub orig_edge: EdgeId,
    pub weight: f64,
}

/// Settled-node cap shared across all phases of one query
#[derive(Debug, Clone, Copy)]
pub struct VisitBudget {
    pub max_visited: usize,
    pub visited: usize,
    pub exceeded: bool,
}

impl VisitBudget {
    pub fn new(max_visited: usize) -> Self {
        Self {
            max_visited,
            visited: 0,
            exceeded: false,
        }
    }
}

pub struct BoundedDijkstra {
    limit: f64,
    tree: SearchTree,
    heap: BinaryHeap<Reverse<(HeapWeight, usize)>>,
    settled: FxHashSet<NodeId>,
    /// Nodes an earlier search already charged to the visit budget
    precharged: FxHashSet<NodeId>,
    settle_order: Vec<usize>,
}

impl BoundedDijkstra {
    pub fn new(limit: f64) -> Self {
        Self {
            limit,
            tree: SearchTree::new(),
            heap: BinaryHeap::new(),
            settled: FxHashSet::default(),
            precharged: FxHashSet::default(),
            settle_order: Vec::new(),
        }
    }

    /// Add a search root at `weight`; ignored above the limit or if the node
    /// is already known at a lower weight.
    pub fn seed(&mut self, node: NodeId, weight: f64) {
        if weight > self.limit || self.settled.contains(&node) {
            return;
        }
        if self.tree.best(node).is_some_and(|b| b.weight <= weight) {
            return;
        }
        let index = self.tree.root(node, weight);
        self.heap.push(Reverse((HeapWeight(weight), index)));
    }

    /// Like [`seed`](Self::seed) for a node some earlier search settled and
    /// counted; settling it again does not touch the visit budget.
    pub fn seed_precharged(&mut self, node: NodeId, weight: f64) {
        self.precharged.insert(node);
        self.seed(node, weight);
    }

    /// Run until the frontier exceeds the limit, the visit budget runs out,
    /// or the token is cancelled. Returns the number of nodes settled,
    /// precharged seeds included.
    pub fn run<E, S>(
        &mut self,
        mut expand: E,
        mut on_settle: S,
        budget: &mut VisitBudget,
        cancel: Option<&CancellationToken>,
    ) -> Result<usize, QueryError>
    where
        E: FnMut(NodeId, &mut Vec<Relaxation>),
        S: FnMut(&SearchTreeEntry),
    {
        let mut settled_here = 0;
        let mut arcs = Vec::new();

        while let Some(Reverse((HeapWeight(weight), index))) = self.heap.pop() {
            let entry = *self.tree.entry(index);
            if self.settled.contains(&entry.node) || self.tree.best_index(entry.node) != Some(index)
            {
                continue; // stale
            }
            if weight > self.limit {
                break;
            }
            if cancel.is_some_and(|t| t.is_cancelled()) {
                return Err(QueryError::Cancelled);
            }
            if !self.precharged.contains(&entry.node) {
                if budget.visited >= budget.max_visited {
                    budget.exceeded = true;
                    break;
                }
                budget.visited += 1;
            }

            settled_here += 1;
            self.settled.insert(entry.node);
            self.settle_order.push(index);
            on_settle(&entry);

            arcs.clear();
            expand(entry.node, &mut arcs);
            for r in &arcs {
                if !r.weight.is_finite() || self.settled.contains(&r.adj) {
                    continue;
                }
                let next = weight + r.weight;
                if next > self.limit {
                    continue;
                }
                if self.tree.best(r.adj).is_some_and(|b| b.weight <= next) {
                    continue;
                }
                let child = self.tree.push(SearchTreeEntry {
                    node: r.adj,
                    edge: Some(r.arc),
                    orig_edge: Some(r.orig_edge),
                    weight: next,
                    parent: Some(index),
                });
                self.heap.push(Reverse((HeapWeight(next), child)));
            }
        }

        Ok(settled_here)
    }

    pub fn is_settled(&self, node: NodeId) -> bool {
        self.settled.contains(&node)
    }

    /// Settled entries in settle order
    pub fn settled_entries(&self) -> impl Iterator<Item = &SearchTreeEntry> + '_ {
        self.settle_order.iter().map(|&i| self.tree.entry(i))
    }

    pub fn tree(&self) -> &SearchTree {
        &self.tree
    }
}
