//! Node contraction with bounded witness search

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use super::graph::{CoreChGraph, Shortcut};
use crate::graph::NodeId;

/// Heap entry for the witness Dijkstra (min-heap by weight, then node)
#[derive(Debug, Clone, Copy, PartialEq)]
struct WitnessState {
    weight: f64,
    node: NodeId,
}

impl Eq for WitnessState {}

impl Ord for WitnessState {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap
        other
            .weight
            .total_cmp(&self.weight)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for WitnessState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dry-run outcome used by the priority function
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShortcutCount {
    pub shortcuts: usize,
    pub original_edges: usize,
}

/// Contracts single nodes of a [`CoreChGraph`].
///
/// The witness search is a local Dijkstra over uncontracted nodes that skips
/// the node being contracted. It stops once the frontier exceeds the most
/// expensive candidate shortcut or `max_visited` nodes were settled; a cap of
/// zero disables the search and every candidate shortcut is inserted.
#[derive(Debug, Default)]
pub struct NodeContractor {
    max_visited: usize,
    dist: FxHashMap<NodeId, f64>,
    heap: BinaryHeap<WitnessState>,
}

impl NodeContractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_max_visited(&mut self, max_visited: usize) {
        self.max_visited = max_visited;
    }

    pub fn max_visited(&self) -> usize {
        self.max_visited
    }

    /// Shortcuts that contracting `node` would add, without adding them
    pub fn calc_shortcut_count(&mut self, ch: &CoreChGraph, node: NodeId) -> ShortcutCount {
        let mut count = ShortcutCount::default();
        for s in self.find_shortcuts(ch, node) {
            count.shortcuts += 1;
            count.original_edges += s.original_edges as usize;
        }
        count
    }

    /// Insert the shortcuts needed to bypass `node`.
    ///
    /// Returns the node's degree at contraction time. The caller assigns the
    /// level and disconnects the node from its neighbours.
    pub fn contract_node(&mut self, ch: &mut CoreChGraph, node: NodeId) -> (usize, usize) {
        let degree = ch.degree(node);
        let mut added = 0;
        for shortcut in self.find_shortcuts(ch, node) {
            if ch.add_shortcut(shortcut).is_some() {
                added += 1;
            }
        }
        (degree, added)
    }

    fn find_shortcuts(&mut self, ch: &CoreChGraph, node: NodeId) -> Vec<Shortcut> {
        let mut shortcuts = Vec::new();
        let in_arcs = ch.in_arcs(node);
        let out_arcs = ch.out_arcs(node);
        if in_arcs.is_empty() || out_arcs.is_empty() {
            return shortcuts;
        }

        for incoming in in_arcs {
            let from = incoming.node;
            if from == node {
                continue;
            }

            let max_weight = out_arcs
                .iter()
                .filter(|o| o.node != from && o.node != node)
                .map(|o| incoming.weight + o.weight)
                .fold(f64::NEG_INFINITY, f64::max);
            if max_weight == f64::NEG_INFINITY {
                continue;
            }

            if self.max_visited > 0 {
                self.witness_search(ch, from, node, max_weight);
            } else {
                self.dist.clear();
            }

            for outgoing in out_arcs {
                let to = outgoing.node;
                if to == from || to == node {
                    continue;
                }
                let via = incoming.weight + outgoing.weight;
                if let Some(&witness) = self.dist.get(&to) {
                    if witness <= via {
                        continue;
                    }
                }
                shortcuts.push(Shortcut {
                    from,
                    to,
                    weight: via,
                    skipped: [incoming.id, outgoing.id],
                    original_edges: incoming.original_edges + outgoing.original_edges,
                });
            }
        }
        shortcuts
    }

    /// Bounded Dijkstra from `source` avoiding `ignore`; fills `self.dist`.
    fn witness_search(&mut self, ch: &CoreChGraph, source: NodeId, ignore: NodeId, max_weight: f64) {
        self.dist.clear();
        self.heap.clear();

        self.dist.insert(source, 0.0);
        self.heap.push(WitnessState {
            weight: 0.0,
            node: source,
        });

        let mut visited = 0usize;
        while let Some(WitnessState { weight, node }) = self.heap.pop() {
            if weight > self.dist.get(&node).copied().unwrap_or(f64::INFINITY) {
                continue;
            }
            if weight > max_weight {
                break;
            }
            visited += 1;
            if visited > self.max_visited {
                break;
            }

            for arc in ch.out_arcs(node) {
                if arc.node == ignore {
                    continue;
                }
                let next = weight + arc.weight;
                let best = self.dist.entry(arc.node).or_insert(f64::INFINITY);
                if next < *best {
                    *best = next;
                    self.heap.push(WitnessState {
                        weight: next,
                        node: arc.node,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{RoadEdge, RoadGraph, ShortestWeighting};

    fn edge(base: NodeId, adj: NodeId, distance: f64) -> RoadEdge {
        RoadEdge {
            base,
            adj,
            distance,
            speed_kmh: 50.0,
            access_fwd: true,
            access_bwd: true,
        }
    }

    #[test]
    fn test_path_center_needs_shortcuts_both_ways() {
        // 0 - 1 - 2
        let graph = RoadGraph::new(3, vec![edge(0, 1, 1.0), edge(1, 2, 2.0)]).unwrap();
        let mut ch = CoreChGraph::from_graph(&graph, &ShortestWeighting);
        let mut contractor = NodeContractor::new();
        contractor.set_max_visited(100);

        let count = contractor.calc_shortcut_count(&ch, 1);
        assert_eq!(
            count,
            ShortcutCount {
                shortcuts: 2,
                original_edges: 4
            }
        );

        let (degree, added) = contractor.contract_node(&mut ch, 1);
        assert_eq!(degree, 4);
        assert_eq!(added, 2);
        assert_eq!(ch.shortcuts().len(), 2);
        assert!(ch.shortcuts().iter().all(|s| s.weight == 3.0));
    }

    #[test]
    fn test_witness_suppresses_shortcut() {
        // 0 - 1 - 2 with a direct 0 - 2 of equal weight
        let graph = RoadGraph::new(
            3,
            vec![edge(0, 1, 1.0), edge(1, 2, 1.0), edge(0, 2, 2.0)],
        )
        .unwrap();
        let ch = CoreChGraph::from_graph(&graph, &ShortestWeighting);
        let mut contractor = NodeContractor::new();
        contractor.set_max_visited(100);
        assert_eq!(contractor.calc_shortcut_count(&ch, 1).shortcuts, 0);

        // without a witness search every pair gets a shortcut
        contractor.set_max_visited(0);
        assert_eq!(contractor.calc_shortcut_count(&ch, 1).shortcuts, 2);
    }

    #[test]
    fn test_leaf_needs_no_shortcut() {
        let graph = RoadGraph::new(2, vec![edge(0, 1, 1.0)]).unwrap();
        let ch = CoreChGraph::from_graph(&graph, &ShortestWeighting);
        let mut contractor = NodeContractor::new();
        contractor.set_max_visited(10);
        assert_eq!(contractor.calc_shortcut_count(&ch, 0).shortcuts, 0);
    }
}
