//! Core CH storage: levels, shortcuts and per-node arc lists
//!
//! During preparation this is the mutable "prepare graph": every uncontracted
//! node's lists only reference other uncontracted nodes. After preparation a
//! contracted node keeps its upward arcs and a core node keeps its arcs to
//! other core nodes.

use crate::graph::{AllEdgesFilter, EdgeFilter, EdgeId, NodeId, RoadGraph, Weighting};

/// Directed arc in the CH overlay.
///
/// In `out_arcs[u]`, `node` is the head; in `in_arcs[u]`, `node` is the tail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChArc {
    /// Base edge id (`< n_base_edges`) or `n_base_edges + shortcut index`
    pub id: u32,
    pub node: NodeId,
    pub weight: f64,
    /// Number of base edges this arc stands for
    pub original_edges: u32,
}

/// Shortcut: a suppressed two-arc path `from → via → to`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shortcut {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
    /// Arc ids of the two skipped arcs, in path order
    pub skipped: [u32; 2],
    pub original_edges: u32,
}

#[derive(Debug, Clone)]
pub struct CoreChGraph {
    weighting: String,
    n_base_edges: u32,
    max_level: u32,
    levels: Vec<u32>,
    core_node_count: u32,
    prepared: bool,
    shortcuts: Vec<Shortcut>,
    out_arcs: Vec<Vec<ChArc>>,
    in_arcs: Vec<Vec<ChArc>>,
}

impl CoreChGraph {
    /// Initial prepare graph: one arc per traversable edge direction, every
    /// node at `max_level`.
    pub fn from_graph(graph: &RoadGraph, weighting: &dyn Weighting) -> Self {
        Self::from_filtered_graph(graph, weighting, &AllEdgesFilter)
    }

    /// Like [`from_graph`](Self::from_graph), leaving out every edge
    /// direction `filter` rejects.
    pub fn from_filtered_graph(
        graph: &RoadGraph,
        weighting: &dyn Weighting,
        filter: &dyn EdgeFilter,
    ) -> Self {
        let n = graph.n_nodes() as usize;
        let mut out_arcs: Vec<Vec<ChArc>> = vec![Vec::new(); n];
        let mut in_arcs: Vec<Vec<ChArc>> = vec![Vec::new(); n];

        for edge in 0..graph.n_edges() {
            let e = graph.edge(edge);
            if e.base == e.adj {
                continue; // loops never lie on shortest paths
            }
            for from in [e.base, e.adj] {
                let state = graph.edge_state(edge, from);
                let weight = weighting.calc_weight(&state);
                if !weight.is_finite() || !filter.accept(&state) {
                    continue;
                }
                out_arcs[state.base as usize].push(ChArc {
                    id: edge,
                    node: state.adj,
                    weight,
                    original_edges: 1,
                });
                in_arcs[state.adj as usize].push(ChArc {
                    id: edge,
                    node: state.base,
                    weight,
                    original_edges: 1,
                });
            }
        }

        let max_level = graph.n_nodes() + 1;
        Self {
            weighting: weighting.name().to_string(),
            n_base_edges: graph.n_edges(),
            max_level,
            levels: vec![max_level; n],
            core_node_count: graph.n_nodes(),
            prepared: false,
            shortcuts: Vec::new(),
            out_arcs,
            in_arcs,
        }
    }

    /// Reassemble a prepared graph from its persisted parts
    pub(crate) fn from_parts(
        weighting: String,
        n_base_edges: u32,
        levels: Vec<u32>,
        core_node_count: u32,
        shortcuts: Vec<Shortcut>,
        out_arcs: Vec<Vec<ChArc>>,
        in_arcs: Vec<Vec<ChArc>>,
    ) -> Self {
        let max_level = levels.len() as u32 + 1;
        Self {
            weighting,
            n_base_edges,
            max_level,
            levels,
            core_node_count,
            prepared: true,
            shortcuts,
            out_arcs,
            in_arcs,
        }
    }

    pub fn weighting(&self) -> &str {
        &self.weighting
    }

    pub fn n_nodes(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn n_base_edges(&self) -> u32 {
        self.n_base_edges
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    pub fn level(&self, node: NodeId) -> u32 {
        self.levels[node as usize]
    }

    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    pub(crate) fn set_level(&mut self, node: NodeId, level: u32) {
        self.levels[node as usize] = level;
    }

    /// True while `node` is uncontracted
    pub fn is_core(&self, node: NodeId) -> bool {
        self.levels[node as usize] == self.max_level
    }

    pub fn core_node_count(&self) -> u32 {
        self.core_node_count
    }

    /// Freeze the core after contraction halted
    pub(crate) fn finish(&mut self, core_node_count: u32) {
        self.core_node_count = core_node_count;
        self.prepared = true;
    }

    /// True once a preparation has run to completion on this graph
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn shortcuts(&self) -> &[Shortcut] {
        &self.shortcuts
    }

    pub fn is_shortcut(&self, arc: u32) -> bool {
        arc >= self.n_base_edges
    }

    pub fn shortcut(&self, arc: u32) -> Option<&Shortcut> {
        arc.checked_sub(self.n_base_edges)
            .and_then(|i| self.shortcuts.get(i as usize))
    }

    pub fn out_arcs(&self, node: NodeId) -> &[ChArc] {
        &self.out_arcs[node as usize]
    }

    pub fn in_arcs(&self, node: NodeId) -> &[ChArc] {
        &self.in_arcs[node as usize]
    }

    /// Arcs from core node `node` to other core nodes
    pub fn core_out_arcs(&self, node: NodeId) -> impl Iterator<Item = &ChArc> + '_ {
        let is_core = self.is_core(node);
        self.out_arcs[node as usize]
            .iter()
            .filter(move |a| is_core && self.is_core(a.node))
    }

    /// Number of arcs still attached to `node`
    pub fn degree(&self, node: NodeId) -> usize {
        self.out_arcs[node as usize].len() + self.in_arcs[node as usize].len()
    }

    /// Distinct neighbours over both arc directions, ascending
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.out_arcs[node as usize]
            .iter()
            .chain(self.in_arcs[node as usize].iter())
            .map(|a| a.node)
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }

    /// Add shortcut `from → to`, or lower the weight of an existing shortcut
    /// between the same nodes. Returns the arc id, or `None` when an existing
    /// arc is already at least as cheap.
    pub(crate) fn add_shortcut(&mut self, shortcut: Shortcut) -> Option<u32> {
        let existing = self.out_arcs[shortcut.from as usize]
            .iter()
            .filter(|a| a.node == shortcut.to)
            .min_by(|a, b| a.weight.total_cmp(&b.weight))
            .copied();

        if let Some(arc) = existing {
            if arc.weight <= shortcut.weight {
                return None;
            }
            if let Some(index) = arc.id.checked_sub(self.n_base_edges) {
                self.shortcuts[index as usize] = shortcut;
                let update = |a: &mut ChArc| {
                    if a.id == arc.id {
                        a.weight = shortcut.weight;
                        a.original_edges = shortcut.original_edges;
                    }
                };
                self.out_arcs[shortcut.from as usize].iter_mut().for_each(update);
                self.in_arcs[shortcut.to as usize].iter_mut().for_each(update);
                return Some(arc.id);
            }
        }

        let id = self.n_base_edges + self.shortcuts.len() as u32;
        self.shortcuts.push(shortcut);
        self.out_arcs[shortcut.from as usize].push(ChArc {
            id,
            node: shortcut.to,
            weight: shortcut.weight,
            original_edges: shortcut.original_edges,
        });
        self.in_arcs[shortcut.to as usize].push(ChArc {
            id,
            node: shortcut.from,
            weight: shortcut.weight,
            original_edges: shortcut.original_edges,
        });
        Some(id)
    }

    /// Drop every arc of `node` (both directions) that touches `neighbor`
    pub(crate) fn disconnect(&mut self, node: NodeId, neighbor: NodeId) {
        self.out_arcs[node as usize].retain(|a| a.node != neighbor);
        self.in_arcs[node as usize].retain(|a| a.node != neighbor);
    }

    /// Drop every arc of `node` that leads to a contracted node
    pub(crate) fn disconnect_contracted(&mut self, node: NodeId) {
        let levels = &self.levels;
        let max_level = self.max_level;
        self.out_arcs[node as usize].retain(|a| levels[a.node as usize] == max_level);
        self.in_arcs[node as usize].retain(|a| levels[a.node as usize] == max_level);
    }

    /// Base edge id of the last original edge an arc covers
    pub fn last_original_edge(&self, arc: u32) -> EdgeId {
        let mut current = arc;
        while let Some(s) = self.shortcut(current) {
            current = s.skipped[1];
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeState, RoadEdge, ShortestWeighting};

    fn path_graph() -> RoadGraph {
        let edge = |base, adj, distance| RoadEdge {
            base,
            adj,
            distance,
            speed_kmh: 50.0,
            access_fwd: true,
            access_bwd: base != 1, // 1 -> 2 is oneway
        };
        RoadGraph::new(3, vec![edge(0, 1, 2.0), edge(1, 2, 3.0)]).unwrap()
    }

    #[test]
    fn test_initial_arcs_respect_access() {
        let ch = CoreChGraph::from_graph(&path_graph(), &ShortestWeighting);
        assert_eq!(ch.max_level(), 4);
        assert!(ch.is_core(0) && ch.is_core(2));
        assert!(!ch.is_prepared());

        let out_1: Vec<NodeId> = ch.out_arcs(1).iter().map(|a| a.node).collect();
        assert_eq!(out_1, vec![0, 2]);
        let out_2: Vec<NodeId> = ch.out_arcs(2).iter().map(|a| a.node).collect();
        assert!(out_2.is_empty());
        assert_eq!(ch.in_arcs(2).len(), 1);
        assert_eq!(ch.neighbors(1), vec![0, 2]);
    }

    #[test]
    fn test_filtered_directions_are_left_out() {
        // drop 1 -> 0, keep 0 -> 1
        let filter = |e: &EdgeState| !(e.edge == 0 && e.reverse);
        let ch = CoreChGraph::from_filtered_graph(&path_graph(), &ShortestWeighting, &filter);
        let out_1: Vec<NodeId> = ch.out_arcs(1).iter().map(|a| a.node).collect();
        assert_eq!(out_1, vec![2]);
        let out_0: Vec<NodeId> = ch.out_arcs(0).iter().map(|a| a.node).collect();
        assert_eq!(out_0, vec![1]);
        assert_eq!(ch.in_arcs(0).len(), 0);
    }

    #[test]
    fn test_add_shortcut_keeps_cheapest() {
        let mut ch = CoreChGraph::from_graph(&path_graph(), &ShortestWeighting);
        let shortcut = Shortcut {
            from: 0,
            to: 2,
            weight: 5.0,
            skipped: [0, 1],
            original_edges: 2,
        };
        let id = ch.add_shortcut(shortcut).unwrap();
        assert_eq!(id, 2);
        assert!(ch.is_shortcut(id));
        assert_eq!(ch.last_original_edge(id), 1);

        // more expensive duplicate is dropped
        assert!(ch.add_shortcut(Shortcut { weight: 6.0, ..shortcut }).is_none());
        // cheaper one replaces in place
        assert_eq!(ch.add_shortcut(Shortcut { weight: 4.0, ..shortcut }), Some(id));
        assert_eq!(ch.shortcuts().len(), 1);
        assert_eq!(ch.out_arcs(0).iter().find(|a| a.id == id).unwrap().weight, 4.0);
        assert_eq!(ch.in_arcs(2).iter().find(|a| a.id == id).unwrap().weight, 4.0);
    }

    #[test]
    fn test_core_out_arcs_only_between_core_nodes() {
        let mut ch = CoreChGraph::from_graph(&path_graph(), &ShortestWeighting);
        ch.set_level(0, 1);
        assert_eq!(ch.core_out_arcs(1).map(|a| a.node).collect::<Vec<_>>(), vec![2]);
        assert_eq!(ch.core_out_arcs(0).count(), 0);

        ch.disconnect_contracted(1);
        assert_eq!(ch.neighbors(1), vec![2]);
    }
}
