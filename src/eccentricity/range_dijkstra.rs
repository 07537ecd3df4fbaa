//! Bounded single-source Dijkstra confined by an edge filter
//!
//! No target: the search settles everything the filter lets it reach, up to
//! a visited-node cap. Weights and counts can be restricted to a member set
//! (the cell of the source) while the search itself roams further.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::graph::{EdgeFilter, NodeId, RoadGraph, Weighting};

/// Total-order wrapper so `f64` weights can live in a `BinaryHeap`
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HeapWeight(pub f64);

impl Eq for HeapWeight {}

impl PartialOrd for HeapWeight {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapWeight {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Outcome of one range search
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RangeOutcome {
    /// Largest settled weight among member nodes
    pub max_weight: f64,
    /// Settled member nodes, the source included if it is one
    pub settled: usize,
    /// True if the visited-node cap stopped the search early
    pub capped: bool,
}

pub struct RangeDijkstra<'a> {
    graph: &'a RoadGraph,
    weighting: &'a dyn Weighting,
    filter: &'a dyn EdgeFilter,
    max_visited: usize,
}

impl<'a> RangeDijkstra<'a> {
    pub fn new(
        graph: &'a RoadGraph,
        weighting: &'a dyn Weighting,
        filter: &'a dyn EdgeFilter,
        max_visited: usize,
    ) -> Self {
        Self {
            graph,
            weighting,
            filter,
            max_visited,
        }
    }

    /// Every settled node counts
    pub fn run(&self, source: NodeId) -> RangeOutcome {
        self.run_over(source, |_| true)
    }

    /// Only nodes accepted by `is_member` count towards `settled` and
    /// `max_weight`; the visited cap applies to all settled nodes.
    pub fn run_over<M>(&self, source: NodeId, is_member: M) -> RangeOutcome
    where
        M: Fn(NodeId) -> bool,
    {
        let mut dist: FxHashMap<NodeId, f64> = FxHashMap::default();
        let mut pq: BinaryHeap<Reverse<(HeapWeight, NodeId)>> = BinaryHeap::new();
        let mut outcome = RangeOutcome::default();
        let mut visited = 0;

        dist.insert(source, 0.0);
        pq.push(Reverse((HeapWeight(0.0), source)));

        while let Some(Reverse((HeapWeight(d), u))) = pq.pop() {
            // Skip stale entries
            if d > dist.get(&u).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            if visited >= self.max_visited {
                outcome.capped = true;
                break;
            }
            visited += 1;
            if is_member(u) {
                outcome.settled += 1;
                outcome.max_weight = outcome.max_weight.max(d);
            }

            for edge in self.graph.edges_from(u) {
                if !self.filter.accept(&edge) {
                    continue;
                }
                let w = self.weighting.calc_weight(&edge);
                if !w.is_finite() {
                    continue;
                }
                let next = d + w;
                let best = dist.entry(edge.adj).or_insert(f64::INFINITY);
                if next < *best {
                    *best = next;
                    pq.push(Reverse((HeapWeight(next), edge.adj)));
                }
            }
        }

        outcome
    }
}
