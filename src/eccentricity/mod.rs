//! Parallel eccentricity precomputation
//!
//! For every border node: a range Dijkstra confined to the node's cell gives
//! the largest within-cell shortest-path weight (the eccentricity) and whether
//! the search covered enough of the cell to call it fully reachable.
//! Cells whose parts are only connected through a neighbouring cell fall
//! short of that; for those the search is repeated without the cell filter
//! and measured over the cell's members only.
//!
//! One task per border node runs on a caller-owned rayon pool. Tasks only
//! read shared state and return their result; the storage is filled after all
//! tasks succeeded, so a failed run writes nothing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

pub mod range_dijkstra;
pub mod storage;

pub use range_dijkstra::{RangeDijkstra, RangeOutcome};
pub use storage::EccentricityStorage;

use crate::config::EccentricityConfig;
use crate::graph::{AllEdgesFilter, EdgeFilter, EdgeFilterSequence, NodeId, RoadGraph, Weighting};
use crate::partition::{FixedCellEdgeFilter, PartitionCatalog};

#[derive(Debug, Error)]
pub enum EccentricityError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("eccentricity task for border node {node} failed: {reason}")]
    TaskFailed { node: NodeId, reason: String },

    #[error("invalid eccentricity config: {0}")]
    Config(butterfly_common::Error),

    #[error("eccentricity storage error: {0}")]
    Storage(#[from] butterfly_common::Error),
}

/// Result of one border node task
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderNodeEccentricity {
    pub node: NodeId,
    pub eccentricity: f64,
    pub fully_reachable: bool,
    pub capped: bool,
    /// Result of the search without the cell filter
    pub out_of_cell: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EccentricityReport {
    pub weighting: String,
    pub border_nodes: usize,
    pub fully_reachable: usize,
    pub capped: usize,
    pub out_of_cell: usize,
    pub threads: usize,
    pub elapsed_ms: u64,
}

impl EccentricityReport {
    pub fn print(&self) {
        println!("Eccentricity ({})", self.weighting);
        println!("  border nodes:     {}", self.border_nodes);
        println!("  fully reachable:  {}", self.fully_reachable);
        println!("  capped searches:  {}", self.capped);
        println!("  out of cell:      {}", self.out_of_cell);
        println!("  threads:          {}", self.threads);
        println!("  time:             {} ms", self.elapsed_ms);
    }
}

pub struct EccentricityPrecomputation<'a> {
    graph: &'a RoadGraph,
    catalog: &'a dyn PartitionCatalog,
    weighting: &'a dyn Weighting,
    config: EccentricityConfig,
    additional_filter: Option<&'a dyn EdgeFilter>,
    cancel: CancellationToken,
}

impl<'a> EccentricityPrecomputation<'a> {
    pub fn new(
        graph: &'a RoadGraph,
        catalog: &'a dyn PartitionCatalog,
        weighting: &'a dyn Weighting,
        config: EccentricityConfig,
    ) -> Self {
        Self {
            graph,
            catalog,
            weighting,
            config,
            additional_filter: None,
            cancel: CancellationToken::new(),
        }
    }

    /// AND an extra filter (e.g. access restrictions) into every cell search
    pub fn with_filter(mut self, filter: &'a dyn EdgeFilter) -> Self {
        self.additional_filter = Some(filter);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Compute eccentricities for every border node of the catalog
    pub fn run(&self) -> Result<(EccentricityStorage, EccentricityReport), EccentricityError> {
        self.config.validate().map_err(EccentricityError::Config)?;
        let started = Instant::now();

        let border_nodes = self.catalog.border_nodes();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("eccentricity-{i}"))
            .build()
            .map_err(|e| EccentricityError::ThreadPool(e.to_string()))?;

        info!(
            weighting = self.weighting.name(),
            border_nodes = border_nodes.len(),
            threads = pool.current_num_threads(),
            "computing border node eccentricities"
        );

        let done = AtomicUsize::new(0);
        let total = border_nodes.len();
        let log_every = (total / 10).max(1);

        let results: Vec<BorderNodeEccentricity> = pool.install(|| {
            border_nodes
                .par_iter()
                .map(|&node| {
                    let result = self.compute_node(node);
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if n % log_every == 0 {
                        debug!(done = n, total, "eccentricity progress");
                    }
                    result
                })
                .collect::<Result<Vec<_>, _>>()
        })?;

        let mut storage = EccentricityStorage::create(self.weighting.name(), border_nodes);
        let mut report = EccentricityReport {
            weighting: self.weighting.name().to_string(),
            border_nodes: total,
            threads: pool.current_num_threads(),
            ..Default::default()
        };
        for r in &results {
            storage.set(r.node, r.eccentricity, r.fully_reachable)?;
            report.fully_reachable += r.fully_reachable as usize;
            report.capped += r.capped as usize;
            report.out_of_cell += r.out_of_cell as usize;
        }
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            fully_reachable = report.fully_reachable,
            capped = report.capped,
            out_of_cell = report.out_of_cell,
            elapsed_ms = report.elapsed_ms,
            "eccentricities computed"
        );

        Ok((storage, report))
    }

    /// Eccentricity task for one border node
    pub fn compute_node(&self, node: NodeId) -> Result<BorderNodeEccentricity, EccentricityError> {
        if self.cancel.is_cancelled() {
            return Err(EccentricityError::TaskFailed {
                node,
                reason: "cancelled".to_string(),
            });
        }
        let cell = self
            .catalog
            .cell_id(node)
            .ok_or_else(|| EccentricityError::TaskFailed {
                node,
                reason: "border node has no cell".to_string(),
            })?;
        let cell_size = self.catalog.nodes_of_cell(cell).len();
        if cell_size == 0 {
            return Err(EccentricityError::TaskFailed {
                node,
                reason: format!("cell {cell} has no members"),
            });
        }

        let cell_filter = FixedCellEdgeFilter::new(self.catalog, cell);
        let mut filter = EdgeFilterSequence::new().with(&cell_filter);
        if let Some(extra) = self.additional_filter {
            filter.add(extra);
        }

        let cap = self.config.max_visited_nodes();
        let threshold = self.config.fully_reachable_threshold;
        let mut outcome = RangeDijkstra::new(self.graph, self.weighting, &filter, cap).run(node);
        let mut out_of_cell = false;

        if self.config.out_of_cell_fallback
            && (outcome.settled as f64 / cell_size as f64) < threshold
        {
            let open: &dyn EdgeFilter = match self.additional_filter {
                Some(extra) => extra,
                None => &AllEdgesFilter,
            };
            outcome = RangeDijkstra::new(self.graph, self.weighting, open, cap)
                .run_over(node, |n| self.catalog.cell_id(n) == Some(cell));
            out_of_cell = true;
        }

        let coverage = outcome.settled as f64 / cell_size as f64;
        let fully_reachable = coverage >= threshold;

        trace!(
            node,
            cell,
            eccentricity = outcome.max_weight,
            settled = outcome.settled,
            cell_size,
            fully_reachable,
            out_of_cell,
            "border node eccentricity"
        );

        Ok(BorderNodeEccentricity {
            node,
            eccentricity: outcome.max_weight,
            fully_reachable,
            capped: outcome.capped,
            out_of_cell,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeState, RoadEdge, ShortestWeighting};
    use crate::partition::CellStorage;

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

    // ring 0-1-2-3-0 in cell 0, node 4 in cell 1 hanging off node 0
    fn ring_with_neighbor() -> (RoadGraph, CellStorage) {
        let graph = RoadGraph::new(
            5,
            vec![
                edge(0, 1, 1.0),
                edge(1, 2, 1.0),
                edge(2, 3, 1.0),
                edge(3, 0, 1.0),
                edge(0, 4, 10.0),
            ],
        )
        .unwrap();
        let cells = CellStorage::from_cell_ids(&graph, vec![0, 0, 0, 0, 1]).unwrap();
        (graph, cells)
    }

    #[test]
    fn test_ring_border_node() {
        let (graph, cells) = ring_with_neighbor();
        let config = EccentricityConfig {
            threads: 2,
            ..Default::default()
        };
        let (storage, report) =
            EccentricityPrecomputation::new(&graph, &cells, &ShortestWeighting, config)
                .run()
                .unwrap();

        assert_eq!(report.border_nodes, 2);
        assert_eq!(storage.eccentricity(0), Some(2.0));
        assert!(storage.is_fully_reachable(0));
        // single-node cell
        assert_eq!(storage.eccentricity(4), Some(0.0));
        assert!(storage.is_fully_reachable(4));
        assert_eq!(storage.weighting(), "shortest");
    }

    #[test]
    fn test_additional_filter_breaks_full_reachability() {
        let (graph, cells) = ring_with_neighbor();
        let no_2_3 = |e: &EdgeState| e.edge != 1 && e.edge != 2;
        let (storage, _) = EccentricityPrecomputation::new(
            &graph,
            &cells,
            &ShortestWeighting,
            EccentricityConfig::default(),
        )
        .with_filter(&no_2_3)
        .run()
        .unwrap();

        // node 2 is unreachable from 0 inside the cell
        assert_eq!(storage.eccentricity(0), Some(1.0));
        assert!(!storage.is_fully_reachable(0));
    }

    // cell 0 = {0, 1} + {2, 3}, the halves joined only through node 4 of cell 1
    fn split_cell() -> (RoadGraph, CellStorage) {
        let graph = RoadGraph::new(
            5,
            vec![
                edge(0, 1, 1.0),
                edge(2, 3, 1.0),
                edge(1, 4, 1.0),
                edge(4, 2, 1.0),
            ],
        )
        .unwrap();
        let cells = CellStorage::from_cell_ids(&graph, vec![0, 0, 0, 0, 1]).unwrap();
        (graph, cells)
    }

    #[test]
    fn test_split_cell_reached_through_neighbor() {
        let (graph, cells) = split_cell();
        let (storage, report) = EccentricityPrecomputation::new(
            &graph,
            &cells,
            &ShortestWeighting,
            EccentricityConfig::default(),
        )
        .run()
        .unwrap();

        // 1 -> 4 -> 2 -> 3
        assert_eq!(storage.eccentricity(1), Some(3.0));
        assert!(storage.is_fully_reachable(1));
        assert_eq!(storage.eccentricity(2), Some(3.0));
        assert!(storage.is_fully_reachable(2));
        assert_eq!(report.out_of_cell, 2);
    }

    #[test]
    fn test_split_cell_without_fallback() {
        let (graph, cells) = split_cell();
        let config = EccentricityConfig {
            out_of_cell_fallback: false,
            ..Default::default()
        };
        let (storage, report) =
            EccentricityPrecomputation::new(&graph, &cells, &ShortestWeighting, config)
                .run()
                .unwrap();

        assert_eq!(storage.eccentricity(1), Some(1.0));
        assert!(!storage.is_fully_reachable(1));
        assert_eq!(report.out_of_cell, 0);
    }

    #[test]
    fn test_threshold_below_one() {
        let (graph, cells) = ring_with_neighbor();
        let no_2_3 = |e: &EdgeState| e.edge != 1 && e.edge != 2;
        let config = EccentricityConfig {
            fully_reachable_threshold: 0.75,
            ..Default::default()
        };
        let (storage, _) =
            EccentricityPrecomputation::new(&graph, &cells, &ShortestWeighting, config)
                .with_filter(&no_2_3)
                .run()
                .unwrap();
        assert!(storage.is_fully_reachable(0));
    }

    #[test]
    fn test_cancelled_run_fails_whole_precomputation() {
        let (graph, cells) = ring_with_neighbor();
        let token = CancellationToken::new();
        token.cancel();
        let result = EccentricityPrecomputation::new(
            &graph,
            &cells,
            &ShortestWeighting,
            EccentricityConfig::default(),
        )
        .with_cancellation(token)
        .run();
        assert!(matches!(result, Err(EccentricityError::TaskFailed { .. })));
    }

    #[test]
    fn test_border_node_without_cell_fails() {
        let (graph, _) = ring_with_neighbor();
        let cells = CellStorage::with_borders(
            vec![0, 0, 0, 0, crate::partition::NO_CELL],
            vec![false, false, false, false, true],
        )
        .unwrap();
        let result = EccentricityPrecomputation::new(
            &graph,
            &cells,
            &ShortestWeighting,
            EccentricityConfig::default(),
        )
        .run();
        assert!(matches!(
            result,
            Err(EccentricityError::TaskFailed { node: 4, .. })
        ));
    }

    #[test]
    fn test_invalid_config() {
        let (graph, cells) = ring_with_neighbor();
        let config = EccentricityConfig {
            fully_reachable_threshold: 0.0,
            ..Default::default()
        };
        let result =
            EccentricityPrecomputation::new(&graph, &cells, &ShortestWeighting, config).run();
        assert!(matches!(result, Err(EccentricityError::Config(_))));
    }
}
