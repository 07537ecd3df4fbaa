//! TOML configuration for preparation and queries
//!
//! Every section is optional; missing keys fall back to the defaults below.
//!
//! ```toml
//! [core]
//! periodic_updates = 10
//! contracted_nodes = 100
//!
//! [eccentricity]
//! fully_reachable_threshold = 1.0
//! out_of_cell_fallback = true
//! threads = 4
//!
//! [query]
//! max_visited_nodes = 1000000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use butterfly_common::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CorePreparationConfig,
    #[serde(default)]
    pub eccentricity: EccentricityConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| Error::InvalidInput(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| Error::InvalidInput(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.core.validate()?;
        self.eccentricity.validate()?;
        self.query.validate()
    }
}

/// Core contraction knobs; all percentages in `[0, 100]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorePreparationConfig {
    /// Full priority recomputation every N% of contractions (0 disables)
    #[serde(default = "default_periodic_updates")]
    pub periodic_updates: u32,

    /// Lazy priority check for the last N% of queued nodes
    #[serde(default = "default_lazy_updates")]
    pub lazy_updates: u32,

    /// Probability (%) of recomputing a neighbour's priority after a contraction
    #[serde(default = "default_neighbor_updates")]
    pub neighbor_updates: u32,

    /// Share (%) of unrestricted nodes to contract before halting
    #[serde(default = "default_contracted_nodes")]
    pub contracted_nodes: u32,

    /// Progress log every N% of contractions (0 disables)
    #[serde(default = "default_log_messages")]
    pub log_messages: u32,

    /// Seed for neighbour-update sampling
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_periodic_updates() -> u32 {
    10
}

fn default_lazy_updates() -> u32 {
    10
}

fn default_neighbor_updates() -> u32 {
    90
}

fn default_contracted_nodes() -> u32 {
    100
}

fn default_log_messages() -> u32 {
    20
}

fn default_seed() -> u64 {
    123
}

impl Default for CorePreparationConfig {
    fn default() -> Self {
        Self {
            periodic_updates: default_periodic_updates(),
            lazy_updates: default_lazy_updates(),
            neighbor_updates: default_neighbor_updates(),
            contracted_nodes: default_contracted_nodes(),
            log_messages: default_log_messages(),
            seed: default_seed(),
        }
    }
}

impl CorePreparationConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("periodic_updates", self.periodic_updates),
            ("lazy_updates", self.lazy_updates),
            ("neighbor_updates", self.neighbor_updates),
            ("contracted_nodes", self.contracted_nodes),
            ("log_messages", self.log_messages),
        ] {
            if value > 100 {
                return Err(Error::InvalidInput(format!(
                    "core.{name} must be a percentage in [0, 100], got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EccentricityConfig {
    /// Fraction of a cell a border node must reach to be fully reachable
    #[serde(default = "default_threshold")]
    pub fully_reachable_threshold: f64,

    /// Cell size budget used for the visited-node cap
    #[serde(default = "default_max_cell_nodes")]
    pub max_cell_nodes: usize,

    /// Visited-node cap = max_cell_nodes * safety_factor
    #[serde(default = "default_safety_factor")]
    pub safety_factor: usize,

    /// Worker threads (0 = number of logical CPUs)
    #[serde(default)]
    pub threads: usize,

    /// Rerun a border node search without the cell filter when the cell
    /// search leaves part of the cell unreached
    #[serde(default = "default_out_of_cell_fallback")]
    pub out_of_cell_fallback: bool,
}

fn default_threshold() -> f64 {
    1.0
}

fn default_max_cell_nodes() -> usize {
    5000
}

fn default_safety_factor() -> usize {
    10
}

fn default_out_of_cell_fallback() -> bool {
    true
}

impl Default for EccentricityConfig {
    fn default() -> Self {
        Self {
            fully_reachable_threshold: default_threshold(),
            max_cell_nodes: default_max_cell_nodes(),
            safety_factor: default_safety_factor(),
            threads: 0,
            out_of_cell_fallback: default_out_of_cell_fallback(),
        }
    }
}

impl EccentricityConfig {
    pub fn validate(&self) -> Result<()> {
        let t = self.fully_reachable_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(Error::InvalidInput(format!(
                "eccentricity.fully_reachable_threshold must be in (0, 1], got {t}"
            )));
        }
        if self.max_cell_nodes == 0 || self.safety_factor == 0 {
            return Err(Error::InvalidInput(
                "eccentricity.max_cell_nodes and safety_factor must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn max_visited_nodes(&self) -> usize {
        self.max_cell_nodes.saturating_mul(self.safety_factor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Settled-node cap shared by all phases of one query
    #[serde(default = "default_max_visited_nodes")]
    pub max_visited_nodes: usize,
}

fn default_max_visited_nodes() -> usize {
    1_000_000
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_visited_nodes: default_max_visited_nodes(),
        }
    }
}

impl QueryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_visited_nodes == 0 {
            return Err(Error::InvalidInput(
                "query.max_visited_nodes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
