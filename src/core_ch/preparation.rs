//! Core contraction driver
//!
//! Contracts nodes in priority order until only restriction nodes remain.
//! Nodes touching an edge rejected by the restriction filter get
//! [`RESTRICTION_PRIORITY`] and are never contracted; together with the
//! configured trailing percentage they form the core.

use std::time::{Duration, Instant};

use priority_queue::DoublePriorityQueue;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::contractor::NodeContractor;
use super::graph::CoreChGraph;
use super::{PrepareError, PreparationReport};
use crate::config::CorePreparationConfig;
use crate::graph::{EdgeFilter, NodeId, RoadGraph, Weighting};

/// Sentinel priority of nodes that must stay in the core
pub const RESTRICTION_PRIORITY: i64 = i64::MAX;

/// Min-queue of nodes keyed by `(priority, node)` so ties pop the lowest id
#[derive(Debug, Default)]
struct NodeQueue {
    inner: DoublePriorityQueue<NodeId, (i64, NodeId)>,
}

impl NodeQueue {
    fn insert(&mut self, node: NodeId, priority: i64) {
        self.inner.push(node, (priority, node));
    }

    fn update(&mut self, node: NodeId, priority: i64) {
        self.inner.change_priority(&node, (priority, node));
    }

    fn poll(&mut self) -> Option<NodeId> {
        self.inner.pop_min().map(|(node, _)| node)
    }

    fn peek_priority(&self) -> Option<i64> {
        self.inner.peek_min().map(|(_, p)| p.0)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn clear(&mut self) {
        self.inner.clear();
    }

    fn drain(&mut self) -> Vec<NodeId> {
        let mut nodes = Vec::with_capacity(self.len());
        while let Some(node) = self.poll() {
            nodes.push(node);
        }
        nodes
    }
}

#[derive(Debug, Default)]
struct Timers {
    periodic: Duration,
    lazy: Duration,
    neighbor: Duration,
    contraction: Duration,
}

/// Core contraction over one graph and weighting
pub struct CorePreparation<'a> {
    graph: &'a RoadGraph,
    weighting: &'a dyn Weighting,
    restriction: &'a dyn EdgeFilter,
    filter: Option<&'a dyn EdgeFilter>,
    config: CorePreparationConfig,
    cancel: CancellationToken,
}

impl<'a> CorePreparation<'a> {
    pub fn new(
        graph: &'a RoadGraph,
        weighting: &'a dyn Weighting,
        restriction: &'a dyn EdgeFilter,
        config: CorePreparationConfig,
    ) -> Self {
        Self {
            graph,
            weighting,
            restriction,
            filter: None,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Leave edge directions rejected by `filter` out of the hierarchy.
    ///
    /// Queries that AND the same filter in stay exact, since no shortcut or
    /// witness path runs over a rejected edge.
    pub fn with_filter(mut self, filter: &'a dyn EdgeFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Build a fresh prepare graph and contract it
    pub fn run(&self) -> Result<(CoreChGraph, PreparationReport), PrepareError> {
        let ch = match self.filter {
            Some(filter) => CoreChGraph::from_filtered_graph(self.graph, self.weighting, filter),
            None => CoreChGraph::from_graph(self.graph, self.weighting),
        };
        self.prepare(ch)
    }

    /// Contract `ch`. On error the graph is dropped; it is never reusable.
    pub fn prepare(
        &self,
        mut ch: CoreChGraph,
    ) -> Result<(CoreChGraph, PreparationReport), PrepareError> {
        self.config.validate()?;
        if ch.is_prepared() {
            return Err(PrepareError::AlreadyPrepared);
        }
        let n_nodes = ch.n_nodes();
        if n_nodes == 0 {
            return Err(PrepareError::EmptyGraph);
        }

        let started = Instant::now();
        let mut timers = Timers::default();
        let mut report = PreparationReport {
            weighting: self.weighting.name().to_string(),
            n_nodes: n_nodes as usize,
            ..Default::default()
        };

        info!(
            weighting = self.weighting.name(),
            nodes = n_nodes,
            edges = self.graph.n_edges(),
            "starting core contraction"
        );

        let restricted: Vec<bool> = (0..n_nodes)
            .map(|n| self.graph.edges_from(n).any(|e| !self.restriction.accept(&e)))
            .collect();
        report.n_restricted = restricted.iter().filter(|&&r| r).count();

        let mut contractor = NodeContractor::new();
        let total_degree: usize = (0..n_nodes).map(|n| ch.degree(n)).sum();
        let mut mean_degree = (total_degree / n_nodes as usize) as f64;
        contractor.set_max_visited(max_visited_estimate(mean_degree));

        // prepare nodes
        let mut queue = NodeQueue::default();
        let mut priorities = vec![0i64; n_nodes as usize];
        for node in 0..n_nodes {
            let priority = self.calc_priority(&ch, &mut contractor, &restricted, node);
            priorities[node as usize] = priority;
            queue.insert(node, priority);
        }

        let cfg = &self.config;
        let queue_size = queue.len() as f64;
        let periodic_update = cfg.periodic_updates > 0;
        let periodic_updates_count =
            (queue_size / 100.0 * cfg.periodic_updates as f64).max(10.0).round() as usize;
        let last_nodes_lazy_updates =
            (queue_size / 100.0 * cfg.lazy_updates as f64).round() as usize;
        let nodes_to_avoid_contract = ((100.0 - cfg.contracted_nodes as f64) / 100.0
            * (queue_size - report.n_restricted as f64))
            .round() as usize
            + report.n_restricted;
        let neighbor_update = cfg.neighbor_updates > 0;
        let log_every = if cfg.log_messages > 0 {
            ((queue_size * cfg.log_messages as f64 / 100.0).round() as usize).max(1)
        } else {
            usize::MAX
        };

        debug!(
            periodic_updates_count,
            last_nodes_lazy_updates,
            nodes_to_avoid_contract,
            restricted = report.n_restricted,
            "contraction schedule"
        );

        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut level: u32 = 1;
        let mut counter: usize = 0;
        let mut core_node_count: u32 = 0;

        while !queue.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(PrepareError::Interrupted {
                    contracted: report.n_contracted,
                    nodes: report.n_nodes,
                });
            }

            if periodic_update && counter > 0 && counter % periodic_updates_count == 0 {
                let t = Instant::now();
                queue.clear();
                for node in 0..n_nodes {
                    if !ch.is_core(node) {
                        continue;
                    }
                    let mut priority = priorities[node as usize];
                    if priority != RESTRICTION_PRIORITY {
                        priority = self.calc_priority(&ch, &mut contractor, &restricted, node);
                        priorities[node as usize] = priority;
                    }
                    queue.insert(node, priority);
                }
                report.periodic_updates += 1;
                timers.periodic += t.elapsed();
            }

            counter += 1;
            let Some(polled) = queue.poll() else {
                break;
            };

            if priorities[polled as usize] == RESTRICTION_PRIORITY
                || queue.len() < nodes_to_avoid_contract
            {
                core_node_count = halt_core(&mut ch, polled, &mut queue);
                break;
            }

            if !queue.is_empty() && queue.len() < last_nodes_lazy_updates {
                let t = Instant::now();
                let priority = self.calc_priority(&ch, &mut contractor, &restricted, polled);
                priorities[polled as usize] = priority;
                let reinsert = queue.peek_priority().is_some_and(|min| priority > min);
                timers.lazy += t.elapsed();
                if reinsert {
                    queue.insert(polled, priority);
                    report.lazy_reinserts += 1;
                    continue;
                }
            }

            let t = Instant::now();
            contractor.set_max_visited(max_visited_estimate(mean_degree));
            let (degree, added) = contractor.contract_node(&mut ch, polled);
            report.n_shortcuts += added;
            mean_degree = (mean_degree * 2.0 + degree as f64) / 3.0;
            ch.set_level(polled, level);
            level += 1;
            report.n_contracted += 1;
            timers.contraction += t.elapsed();

            for neighbor in ch.neighbors(polled) {
                if !ch.is_core(neighbor) {
                    continue;
                }
                ch.disconnect(neighbor, polled);
                if neighbor_update && rng.random_range(0..100u32) < cfg.neighbor_updates {
                    let t = Instant::now();
                    let old = priorities[neighbor as usize];
                    if old != RESTRICTION_PRIORITY {
                        let priority =
                            self.calc_priority(&ch, &mut contractor, &restricted, neighbor);
                        if priority != old {
                            priorities[neighbor as usize] = priority;
                            queue.update(neighbor, priority);
                        }
                    }
                    report.neighbor_updates += 1;
                    timers.neighbor += t.elapsed();
                }
            }

            if counter % log_every == 0 {
                info!(
                    contracted = report.n_contracted,
                    remaining = queue.len(),
                    shortcuts = report.n_shortcuts,
                    mean_degree,
                    "core contraction progress"
                );
            }
        }

        ch.finish(core_node_count);

        report.n_core_nodes = core_node_count as usize;
        report.contraction_ms = timers.contraction.as_millis() as u64;
        report.periodic_ms = timers.periodic.as_millis() as u64;
        report.lazy_ms = timers.lazy.as_millis() as u64;
        report.neighbor_ms = timers.neighbor.as_millis() as u64;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            weighting = %report.weighting,
            contracted = report.n_contracted,
            core_nodes = report.n_core_nodes,
            shortcuts = report.n_shortcuts,
            elapsed_ms = report.elapsed_ms,
            "core contraction finished"
        );

        Ok((ch, report))
    }

    fn calc_priority(
        &self,
        ch: &CoreChGraph,
        contractor: &mut NodeContractor,
        restricted: &[bool],
        node: NodeId,
    ) -> i64 {
        if restricted[node as usize] {
            return RESTRICTION_PRIORITY;
        }

        // priority = 10 * edge difference + original edges + contracted neighbours
        let count = contractor.calc_shortcut_count(ch, node);
        let degree = ch.degree(node) as i64;
        let contracted_neighbors = ch
            .out_arcs(node)
            .iter()
            .chain(ch.in_arcs(node).iter())
            .filter(|a| ch.is_shortcut(a.id))
            .count() as i64;

        10 * (count.shortcuts as i64 - degree) + count.original_edges as i64 + contracted_neighbors
    }
}

fn max_visited_estimate(mean_degree: f64) -> usize {
    mean_degree.trunc().max(0.0) as usize * 100
}

/// Freeze `polled` and every node still queued as the core.
///
/// Returns the core node count (remaining queue size + 1).
fn halt_core(ch: &mut CoreChGraph, polled: NodeId, queue: &mut NodeQueue) -> u32 {
    let mut core_nodes = vec![polled];
    core_nodes.extend(queue.drain());
    for &node in &core_nodes {
        ch.disconnect_contracted(node);
    }
    core_nodes.len() as u32
}
