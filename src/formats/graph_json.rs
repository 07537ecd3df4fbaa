//! JSON graph fixture consumed by the CLI
//!
//! ```json
//! {
//!   "nodes": 4,
//!   "edges": [{ "from": 0, "to": 1, "distance": 120.0, "speed_kmh": 30.0, "oneway": false }],
//!   "cells": [0, 0, 1, null],
//!   "restricted_edges": []
//! }
//! ```
//!
//! `cells` holds one entry per node (`null` = no cell). `restricted_edges`
//! lists extra edge ids whose endpoints must stay in the core.

use std::path::Path;

use serde::{Deserialize, Serialize};

use butterfly_common::{Error, Result};

use crate::graph::{EdgeId, RoadEdge, RoadGraph};
use crate::partition::{CellId, CellStorage, NO_CELL};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureEdge {
    pub from: u32,
    pub to: u32,
    pub distance: f64,
    #[serde(default = "default_speed")]
    pub speed_kmh: f64,
    #[serde(default)]
    pub oneway: bool,
}

fn default_speed() -> f64 {
    50.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphFixture {
    pub nodes: u32,
    pub edges: Vec<FixtureEdge>,
    pub cells: Vec<Option<CellId>>,
    #[serde(default)]
    pub restricted_edges: Vec<EdgeId>,
}

impl GraphFixture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let fixture: GraphFixture = serde_json::from_str(text)?;
        fixture.validate()?;
        Ok(fixture)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Snapshot an in-memory graph and partition as a fixture
    pub fn from_graph(graph: &RoadGraph, cells: &CellStorage) -> Self {
        let edges = graph
            .edges()
            .iter()
            .map(|e| FixtureEdge {
                from: e.base,
                to: e.adj,
                distance: e.distance,
                speed_kmh: e.speed_kmh,
                oneway: !e.access_bwd,
            })
            .collect();
        let cells = cells
            .cell_array()
            .iter()
            .map(|&c| (c != NO_CELL).then_some(c))
            .collect();
        Self {
            nodes: graph.n_nodes(),
            edges,
            cells,
            restricted_edges: Vec::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.cells.len() != self.nodes as usize {
            return Err(Error::InvalidInput(format!(
                "fixture has {} nodes but {} cell entries",
                self.nodes,
                self.cells.len()
            )));
        }
        if self.cells.iter().any(|c| *c == Some(NO_CELL)) {
            return Err(Error::InvalidInput(format!(
                "cell id {NO_CELL} is reserved"
            )));
        }
        if let Some(&e) = self
            .restricted_edges
            .iter()
            .find(|&&e| e as usize >= self.edges.len())
        {
            return Err(Error::InvalidInput(format!(
                "restricted edge {e} does not exist"
            )));
        }
        Ok(())
    }

    pub fn build_graph(&self) -> Result<RoadGraph> {
        let edges = self
            .edges
            .iter()
            .map(|e| RoadEdge {
                base: e.from,
                adj: e.to,
                distance: e.distance,
                speed_kmh: e.speed_kmh,
                access_fwd: true,
                access_bwd: !e.oneway,
            })
            .collect();
        RoadGraph::new(self.nodes, edges)
    }

    pub fn build_cells(&self, graph: &RoadGraph) -> Result<CellStorage> {
        let ids = self.cells.iter().map(|c| c.unwrap_or(NO_CELL)).collect();
        CellStorage::from_cell_ids(graph, ids)
    }
}
