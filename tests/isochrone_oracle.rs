//! Isochrones on synthetic grids checked against a plain Dijkstra

mod common;

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

use rayon::prelude::*;

use butterfly_isochrone::config::QueryConfig;
use butterfly_isochrone::graph::{
    EdgeFilter, FastestWeighting, NodeId, ShortestWeighting, Weighting,
};
use butterfly_isochrone::isochrone::{
    ActiveCellEdgeFilter, BoundedDijkstra, Relaxation, VisitBudget,
};
use butterfly_isochrone::partition::PartitionCatalog;
use butterfly_isochrone::synthetic::GridSpec;
use butterfly_isochrone::validate::{dijkstra_all, validate_isochrone};

use common::{grid, Prepared};

fn assert_matches_oracle(p: &Prepared, weighting: &dyn Weighting, origin: NodeId, budget: f64) {
    let result = p
        .query(weighting)
        .compute_isochrone(origin, budget)
        .expect("query");
    assert!(!result.partial);
    let check = validate_isochrone(&p.graph, &p.cells, weighting, &result);
    assert!(
        check.is_valid(),
        "origin {origin} budget {budget}: missing {:?}, spurious {:?}, weights {:?}",
        check.missing,
        check.spurious,
        check.weight_mismatch
    );
}

#[test]
fn test_grid_isochrones_match_dijkstra() {
    let p = Prepared::from_fixture(&grid(12, 12, 4, 1), &ShortestWeighting);
    for origin in [0, 5, 26, 77, 143] {
        for budget in [0.0, 300.0, 800.0, 1500.0, 3000.0] {
            assert_matches_oracle(&p, &ShortestWeighting, origin, budget);
        }
    }
}

#[test]
fn test_one_way_grid_with_gaps() {
    let fixture = GridSpec {
        width: 10,
        height: 10,
        cell_width: 3,
        cell_height: 4,
        oneway_ratio: 0.25,
        drop_ratio: 0.1,
        seed: 9,
        ..Default::default()
    }
    .generate()
    .unwrap();
    for weighting in [&ShortestWeighting as &dyn Weighting, &FastestWeighting] {
        let p = Prepared::from_fixture(&fixture, weighting);
        for origin in (0..100).step_by(7) {
            for budget in [50.0, 400.0, 1200.0, 5000.0] {
                assert_matches_oracle(&p, weighting, origin, budget);
            }
        }
    }
}

#[test]
fn test_unbounded_budget_saturates_remote_cells() {
    let p = Prepared::from_fixture(&grid(12, 12, 4, 2), &ShortestWeighting);
    let result = p
        .query(&ShortestWeighting)
        .compute_isochrone(0, 1e9)
        .unwrap();

    // every cell but the start cell is skipped
    assert_eq!(result.fully_reachable_cells.len(), 8);
    assert!(!result.fully_reachable_cells.contains(&0));
    assert!(result.active_cells.is_empty());
    assert_eq!(result.visited_counts.phase3, 0);
    assert_eq!(
        result.expand_fully_reachable(&p.cells),
        (0..144).collect::<BTreeSet<_>>()
    );
    // only the start cell and the core were swept
    assert!(result.reachable_nodes.len() < 144);
}

#[test]
fn test_fresh_instances_agree() {
    let p = Prepared::from_fixture(&grid(10, 10, 5, 3), &FastestWeighting);
    let a = p.query(&FastestWeighting).compute_isochrone(44, 60.0).unwrap();
    let b = p.query(&FastestWeighting).compute_isochrone(44, 60.0).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_concurrent_queries_share_prepared_data() {
    let p = Prepared::from_fixture(&grid(10, 10, 5, 4), &ShortestWeighting);
    let sequential: Vec<_> = (0..100)
        .map(|o| p.query(&ShortestWeighting).compute_isochrone(o, 900.0).unwrap())
        .collect();
    let parallel: Vec<_> = (0..100u32)
        .into_par_iter()
        .map(|o| p.query(&ShortestWeighting).compute_isochrone(o, 900.0).unwrap())
        .collect();
    assert_eq!(sequential, parallel);
}

#[test]
fn test_visited_cap_on_grid() {
    let p = Prepared::from_fixture(&grid(10, 10, 5, 5), &ShortestWeighting);
    let result = p
        .query(&ShortestWeighting)
        .with_config(QueryConfig {
            max_visited_nodes: 10,
        })
        .compute_isochrone(55, 1e9)
        .unwrap();
    assert!(result.partial);
    assert_eq!(result.visited_counts.total(), 10);
    assert!(result.reachable_nodes.len() <= 10);
}

/// Within-cell Dijkstra on integer weights: (eccentricity, settled nodes)
fn cell_eccentricity(p: &Prepared, source: NodeId) -> (f64, usize) {
    let cell = p.cells.cell_id(source).unwrap();
    let mut dist = vec![u64::MAX; p.graph.n_nodes() as usize];
    let mut heap = BinaryHeap::new();
    dist[source as usize] = 0;
    heap.push(Reverse((0u64, source)));
    let mut settled = 0;
    let mut max = 0;
    while let Some(Reverse((d, u))) = heap.pop() {
        if d > dist[u as usize] {
            continue;
        }
        settled += 1;
        max = max.max(d);
        for e in p.graph.edges_from(u) {
            if !e.accessible || p.cells.cell_id(e.adj) != Some(cell) {
                continue;
            }
            let next = d + e.distance as u64;
            if next < dist[e.adj as usize] {
                dist[e.adj as usize] = next;
                heap.push(Reverse((next, e.adj)));
            }
        }
    }
    (max as f64, settled)
}

#[test]
fn test_eccentricity_matches_brute_force() {
    let fixture = GridSpec {
        width: 9,
        height: 9,
        cell_width: 3,
        cell_height: 3,
        oneway_ratio: 0.2,
        seed: 11,
        ..Default::default()
    }
    .generate()
    .unwrap();
    let p = Prepared::from_fixture(&fixture, &ShortestWeighting);

    let border = p.cells.border_nodes();
    assert_eq!(p.eccentricities.len(), border.len());
    for node in border {
        let members = p.cells.nodes_of_cell(p.cells.cell_id(node).unwrap());
        let (ecc, settled) = cell_eccentricity(&p, node);
        if settled == members.len() {
            assert_eq!(p.eccentricities.eccentricity(node), Some(ecc), "node {node}");
            assert!(p.eccentricities.is_fully_reachable(node), "node {node}");
            continue;
        }

        // part of the cell is only reachable through other cells
        let dist = dijkstra_all(&p.graph, &ShortestWeighting, node, f64::INFINITY);
        let found: Vec<f64> = members.iter().filter_map(|m| dist.get(m).copied()).collect();
        let expected = found.iter().copied().fold(0.0, f64::max);
        assert_eq!(p.eccentricities.eccentricity(node), Some(expected), "node {node}");
        assert_eq!(
            p.eccentricities.is_fully_reachable(node),
            found.len() == members.len(),
            "node {node}"
        );
    }
}

#[test]
fn test_active_cell_sweep_stays_in_cell() {
    let p = Prepared::from_fixture(&grid(8, 8, 4, 6), &ShortestWeighting);
    let cell = 3;
    let filter = ActiveCellEdgeFilter::new(&p.cells, cell, None);
    let members = p.cells.nodes_of_cell(cell);

    let mut search = BoundedDijkstra::new(1e9);
    for &node in members.iter().filter(|&&n| p.cells.is_border(n)) {
        search.seed(node, 0.0);
    }
    let expand = |node: NodeId, out: &mut Vec<Relaxation>| {
        for e in p.graph.edges_from(node) {
            if filter.accept(&e) {
                out.push(Relaxation {
                    adj: e.adj,
                    arc: e.edge,
                    orig_edge: e.orig_edge,
                    weight: ShortestWeighting.calc_weight(&e),
                });
            }
        }
    };
    let mut budget = VisitBudget::new(usize::MAX);
    let settled = search.run(expand, |_| {}, &mut budget, None).unwrap();

    assert_eq!(settled, members.len());
    assert!(search
        .settled_entries()
        .all(|e| p.cells.cell_id(e.node) == Some(cell)));
}

#[test]
fn test_reachable_edges_are_base_edges_inside_isochrone() {
    let p = Prepared::from_fixture(&grid(10, 10, 5, 7), &ShortestWeighting);
    let result = p
        .query(&ShortestWeighting)
        .compute_isochrone(12, 1500.0)
        .unwrap();
    let nodes = result.expand_fully_reachable(&p.cells);
    for &edge in &result.reachable_edges {
        assert!(edge < p.graph.n_edges(), "edge {edge} is not a base edge");
        let e = p.graph.edge(edge);
        assert!(nodes.contains(&e.base) && nodes.contains(&e.adj));
    }
}
