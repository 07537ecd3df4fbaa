//! Shortcut unpacking - expand CH arcs to base edge ids

use super::graph::CoreChGraph;
use crate::graph::EdgeId;

/// Expand `arc` into the base edges it stands for, in path order.
///
/// Base arcs unpack to themselves. Unknown arc ids unpack to nothing.
pub fn unpack_arc(ch: &CoreChGraph, arc: u32) -> Vec<EdgeId> {
    let mut edges = Vec::new();
    unpack_into(ch, arc, &mut edges);
    edges
}

/// Append the base edges of `arc` to `out`
pub fn unpack_into(ch: &CoreChGraph, arc: u32, out: &mut Vec<EdgeId>) {
    // explicit stack, second half pushed first so the first half pops first
    let mut stack = vec![arc];
    while let Some(current) = stack.pop() {
        if !ch.is_shortcut(current) {
            out.push(current);
            continue;
        }
        match ch.shortcut(current) {
            Some(s) => {
                stack.push(s.skipped[1]);
                stack.push(s.skipped[0]);
            }
            None => {
                tracing::trace!(arc = current, "unpack: unknown shortcut id");
            }
        }
    }
}

impl CoreChGraph {
    /// Base edge ids covered by `arc`
    pub fn unpack(&self, arc: u32) -> Vec<EdgeId> {
        unpack_arc(self, arc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorePreparationConfig;
    use crate::core_ch::CorePreparation;
    use crate::graph::{EdgeState, NodeId, RoadEdge, RoadGraph, ShortestWeighting, Weighting};

    #[test]
    fn test_unpacked_shortcuts_are_contiguous_paths_of_equal_weight() {
        // path 0-1-2-3-4 with the end edges restricted: only node 2 is contracted
        let edge = |base: NodeId, adj: NodeId, distance: f64| RoadEdge {
            base,
            adj,
            distance,
            speed_kmh: 50.0,
            access_fwd: true,
            access_bwd: true,
        };
        let graph = RoadGraph::new(
            5,
            vec![edge(0, 1, 1.0), edge(1, 2, 2.0), edge(2, 3, 3.0), edge(3, 4, 4.0)],
        )
        .unwrap();
        let restriction = |e: &EdgeState| e.edge != 0 && e.edge != 3;
        let (ch, _) = CorePreparation::new(
            &graph,
            &ShortestWeighting,
            &restriction,
            CorePreparationConfig::default(),
        )
        .run()
        .unwrap();

        assert!(!ch.shortcuts().is_empty());
        for (i, s) in ch.shortcuts().iter().enumerate() {
            let arc = ch.n_base_edges() + i as u32;
            let edges = ch.unpack(arc);
            assert!(edges.iter().all(|&e| e < ch.n_base_edges()));
            assert_eq!(edges.len() as u32, s.original_edges);

            // walk the path from `from` and check it ends at `to` with equal weight
            let mut at = s.from;
            let mut weight = 0.0;
            for e in edges {
                let state = graph.edge_state(e, at);
                assert_eq!(state.base, at, "edge {e} does not continue the path");
                weight += ShortestWeighting.calc_weight(&state);
                at = state.adj;
            }
            assert_eq!(at, s.to);
            assert!((weight - s.weight).abs() < 1e-9);
        }

        // base arcs unpack to themselves
        assert_eq!(ch.unpack(2), vec![2]);
    }
}
