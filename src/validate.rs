//! Validation of isochrone correctness
//!
//! Compares isochrone results against a plain Dijkstra on the full road graph.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::core_ch::CoreChGraph;
use crate::eccentricity::range_dijkstra::HeapWeight;
use crate::eccentricity::EccentricityStorage;
use crate::graph::{NodeId, RoadGraph, Weighting};
use crate::isochrone::{IsochroneQuery, IsochroneResult, QueryError};
use crate::partition::PartitionCatalog;

/// Tolerance for weights summed in a different order (shortcuts vs. paths)
const WEIGHT_EPSILON: f64 = 1e-6;

/// Run Dijkstra on the full graph (ground truth), keeping nodes within `limit`
pub fn dijkstra_all(
    graph: &RoadGraph,
    weighting: &dyn Weighting,
    source: NodeId,
    limit: f64,
) -> BTreeMap<NodeId, f64> {
    let mut dist = vec![f64::INFINITY; graph.n_nodes() as usize];
    let mut heap: BinaryHeap<Reverse<(HeapWeight, NodeId)>> = BinaryHeap::new();
    let mut settled = BTreeMap::new();

    dist[source as usize] = 0.0;
    heap.push(Reverse((HeapWeight(0.0), source)));

    while let Some(Reverse((HeapWeight(d), u))) = heap.pop() {
        if d > dist[u as usize] || settled.contains_key(&u) {
            continue;
        }
        if d > limit {
            break;
        }
        settled.insert(u, d);

        for edge in graph.edges_from(u) {
            let w = weighting.calc_weight(&edge);
            if !w.is_finite() {
                continue;
            }
            let next = d + w;
            if next < dist[edge.adj as usize] {
                dist[edge.adj as usize] = next;
                heap.push(Reverse((HeapWeight(next), edge.adj)));
            }
        }
    }

    settled
}

/// Differences between one isochrone and the oracle
#[derive(Debug, Clone, Default, Serialize)]
pub struct IsochroneValidation {
    pub origin: NodeId,
    pub budget: f64,
    /// Within budget per the oracle but absent from the result
    pub missing: Vec<NodeId>,
    /// In the result but beyond budget per the oracle
    pub spurious: Vec<NodeId>,
    /// `(node, result weight, oracle weight)` for settled nodes
    pub weight_mismatch: Vec<(NodeId, f64, f64)>,
}

impl IsochroneValidation {
    pub fn is_valid(&self) -> bool {
        self.missing.is_empty() && self.spurious.is_empty() && self.weight_mismatch.is_empty()
    }
}

/// Check one result against the oracle.
///
/// Nodes whose true weight lies within rounding distance of the budget are
/// accepted either way.
pub fn validate_isochrone(
    graph: &RoadGraph,
    catalog: &dyn PartitionCatalog,
    weighting: &dyn Weighting,
    result: &IsochroneResult,
) -> IsochroneValidation {
    let budget = result.budget;
    let eps = WEIGHT_EPSILON * budget.max(1.0);
    let oracle = dijkstra_all(graph, weighting, result.origin, budget + eps);
    let actual = result.expand_fully_reachable(catalog);

    let borderline = |node: &NodeId| oracle.get(node).is_some_and(|&d| (d - budget).abs() <= eps);

    let expected: BTreeSet<NodeId> = oracle.keys().copied().collect();
    let missing = expected
        .difference(&actual)
        .filter(|n| !borderline(n))
        .copied()
        .collect();
    let spurious = actual
        .difference(&expected)
        .filter(|n| !borderline(n))
        .copied()
        .collect();

    let weight_mismatch = result
        .reachable_nodes
        .iter()
        .filter_map(|(&node, &weight)| {
            let truth = *oracle.get(&node)?;
            ((weight - truth).abs() > eps).then_some((node, weight, truth))
        })
        .collect();

    IsochroneValidation {
        origin: result.origin,
        budget,
        missing,
        spurious,
        weight_mismatch,
    }
}

/// Outcome of a random-origin validation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub n_tests: usize,
    pub correct: usize,
    pub incorrect: usize,
    /// Queries cut short by the visited-node cap; not compared
    pub partial: usize,
    /// First few failing queries
    pub errors: Vec<IsochroneValidation>,
}

impl ValidationResult {
    pub fn print(&self) {
        println!("Isochrone validation");
        println!("  queries:   {}", self.n_tests);
        println!("  correct:   {}", self.correct);
        println!("  incorrect: {}", self.incorrect);
        println!("  partial:   {}", self.partial);
        for e in &self.errors {
            println!(
                "  origin {} budget {}: {} missing, {} spurious, {} weight mismatches",
                e.origin,
                e.budget,
                e.missing.len(),
                e.spurious.len(),
                e.weight_mismatch.len()
            );
        }
    }

    pub fn is_valid(&self) -> bool {
        self.incorrect == 0
    }
}

/// Validate `n_tests` isochrones from random origins against the oracle
pub fn validate_random_queries(
    graph: &RoadGraph,
    catalog: &dyn PartitionCatalog,
    core: &CoreChGraph,
    eccentricities: &EccentricityStorage,
    weighting: &dyn Weighting,
    budget: f64,
    n_tests: usize,
    seed: u64,
) -> Result<ValidationResult, QueryError> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut summary = ValidationResult {
        n_tests,
        ..Default::default()
    };
    if graph.n_nodes() == 0 {
        return Ok(summary);
    }

    println!("Validating {n_tests} random isochrones (budget {budget})...");

    for i in 0..n_tests {
        let origin = rng.random_range(0..graph.n_nodes());
        let result = IsochroneQuery::new(graph, catalog, core, eccentricities, weighting)
            .compute_isochrone(origin, budget)?;

        if result.partial {
            summary.partial += 1;
        } else {
            let check = validate_isochrone(graph, catalog, weighting, &result);
            if check.is_valid() {
                summary.correct += 1;
            } else {
                summary.incorrect += 1;
                if summary.errors.len() < 10 {
                    summary.errors.push(check);
                }
            }
        }

        if (i + 1) % 100 == 0 {
            println!(
                "  {}/{} queries, {} correct, {} incorrect",
                i + 1,
                n_tests,
                summary.correct,
                summary.incorrect
            );
        }
    }

    Ok(summary)
}
