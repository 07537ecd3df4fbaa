//! # Butterfly-isochrone
//!
//! Partition-aware isochrones over a core contraction hierarchy.
//!
//! Preparation runs once per graph and weighting:
//! 1. [`core_ch::CorePreparation`] contracts every node except cell border
//!    nodes, leaving an uncontracted core with weight-preserving shortcuts.
//! 2. [`eccentricity::EccentricityPrecomputation`] bounds, for each border
//!    node, how far its cell extends from it.
//!
//! Each request then runs a single-use [`isochrone::IsochroneQuery`]: a sweep
//! of the start cell and the core, followed by a per-cell expansion of only
//! those cells the eccentricity bounds cannot prove fully reachable.

pub mod config;
pub mod core_ch;
pub mod eccentricity;
pub mod formats;
pub mod graph;
pub mod isochrone;
pub mod partition;
pub mod synthetic;
pub mod validate;

pub use config::Config;
pub use core_ch::{CoreChGraph, CorePreparation, PrepareError};
pub use eccentricity::{EccentricityPrecomputation, EccentricityStorage};
pub use graph::{RoadGraph, Weighting};
pub use isochrone::{IsochroneQuery, IsochroneResult, QueryError};
pub use partition::{CellStorage, PartitionCatalog};
