//! Core contraction hierarchy
//!
//! A contraction hierarchy that deliberately leaves a core uncontracted:
//! every node touching an edge rejected by the restriction filter (for
//! isochrones: every cell border node) keeps `max_level`. Shortcuts among
//! core nodes preserve shortest-path weights, so the core plus one cell's
//! interior is enough to compute exact weights to all border nodes.

use serde::Serialize;
use thiserror::Error;

pub mod contractor;
pub mod graph;
pub mod preparation;
pub mod unpack;

pub use contractor::{NodeContractor, ShortcutCount};
pub use graph::{ChArc, CoreChGraph, Shortcut};
pub use preparation::{CorePreparation, RESTRICTION_PRIORITY};
pub use unpack::unpack_arc;

#[derive(Debug, Error)]
pub enum PrepareError {
    /// The hierarchy is inconsistent and must be rebuilt from scratch
    #[error("core contraction interrupted after {contracted} of {nodes} nodes")]
    Interrupted { contracted: usize, nodes: usize },

    #[error("core preparation already ran on this graph")]
    AlreadyPrepared,

    #[error("cannot prepare an empty graph")]
    EmptyGraph,

    #[error("invalid preparation config: {0}")]
    Config(#[from] butterfly_common::Error),
}

/// Counts and timings of one core preparation
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreparationReport {
    pub weighting: String,
    pub n_nodes: usize,
    pub n_restricted: usize,
    pub n_contracted: usize,
    pub n_core_nodes: usize,
    pub n_shortcuts: usize,
    pub periodic_updates: usize,
    pub lazy_reinserts: usize,
    pub neighbor_updates: usize,
    pub contraction_ms: u64,
    pub periodic_ms: u64,
    pub lazy_ms: u64,
    pub neighbor_ms: u64,
    pub elapsed_ms: u64,
}

impl PreparationReport {
    pub fn print(&self) {
        println!("Core contraction ({})", self.weighting);
        println!("  nodes:          {}", self.n_nodes);
        println!("  restricted:     {}", self.n_restricted);
        println!("  contracted:     {}", self.n_contracted);
        println!("  core nodes:     {}", self.n_core_nodes);
        println!("  shortcuts:      {}", self.n_shortcuts);
        println!(
            "  time:           {} ms (contract {} / periodic {} / lazy {} / neighbor {})",
            self.elapsed_ms, self.contraction_ms, self.periodic_ms, self.lazy_ms, self.neighbor_ms
        );
    }
}
