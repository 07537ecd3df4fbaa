//! Shared setup for integration tests

#![allow(dead_code)]

use butterfly_isochrone::config::{CorePreparationConfig, EccentricityConfig};
use butterfly_isochrone::core_ch::{CoreChGraph, CorePreparation};
use butterfly_isochrone::eccentricity::{EccentricityPrecomputation, EccentricityStorage};
use butterfly_isochrone::formats::GraphFixture;
use butterfly_isochrone::graph::{RoadGraph, Weighting};
use butterfly_isochrone::isochrone::IsochroneQuery;
use butterfly_isochrone::partition::{CellBorderRestrictionFilter, CellStorage};
use butterfly_isochrone::synthetic::GridSpec;

/// Graph, partition and both prepared stores for one weighting
pub struct Prepared {
    pub graph: RoadGraph,
    pub cells: CellStorage,
    pub core: CoreChGraph,
    pub eccentricities: EccentricityStorage,
}

impl Prepared {
    pub fn from_fixture(fixture: &GraphFixture, weighting: &dyn Weighting) -> Self {
        let graph = fixture.build_graph().expect("fixture graph");
        let cells = fixture.build_cells(&graph).expect("fixture cells");
        Self::build(graph, cells, weighting)
    }

    pub fn build(graph: RoadGraph, cells: CellStorage, weighting: &dyn Weighting) -> Self {
        let restriction = CellBorderRestrictionFilter::new(&cells);
        let (core, _) = CorePreparation::new(
            &graph,
            weighting,
            &restriction,
            CorePreparationConfig::default(),
        )
        .run()
        .expect("core preparation");
        let (eccentricities, _) = EccentricityPrecomputation::new(
            &graph,
            &cells,
            weighting,
            EccentricityConfig {
                threads: 2,
                ..Default::default()
            },
        )
        .run()
        .expect("eccentricity precomputation");
        Self {
            graph,
            cells,
            core,
            eccentricities,
        }
    }

    pub fn query<'a>(&'a self, weighting: &'a dyn Weighting) -> IsochroneQuery<'a> {
        IsochroneQuery::new(
            &self.graph,
            &self.cells,
            &self.core,
            &self.eccentricities,
            weighting,
        )
    }
}

pub fn grid(width: u32, height: u32, cell: u32, seed: u64) -> GraphFixture {
    GridSpec {
        width,
        height,
        cell_width: cell,
        cell_height: cell,
        seed,
        ..Default::default()
    }
    .generate()
    .expect("grid spec")
}
