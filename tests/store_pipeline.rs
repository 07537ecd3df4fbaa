//! Prepare, persist, reload and query without the CLI

mod common;

use tempfile::TempDir;

use butterfly_isochrone::eccentricity::EccentricityStorage;
use butterfly_isochrone::formats::{cells, CellsFile, CoreLevelsFile, GraphFixture};
use butterfly_isochrone::graph::{FastestWeighting, Weighting};
use butterfly_isochrone::isochrone::IsochroneQuery;

use common::{grid, Prepared};

#[test]
fn test_reloaded_stores_answer_like_in_memory() {
    let dir = TempDir::new().unwrap();
    let fixture_path = dir.path().join("graph.json");
    grid(10, 10, 5, 21).save(&fixture_path).unwrap();

    let fixture = GraphFixture::load(&fixture_path).unwrap();
    let weighting = FastestWeighting;
    let p = Prepared::from_fixture(&fixture, &weighting);

    let core_path = CoreLevelsFile::path(dir.path(), weighting.name());
    CoreLevelsFile::write(&core_path, &p.core).unwrap();
    CellsFile::write(&dir.path().join(cells::FILE_NAME), &p.cells).unwrap();
    let ecc_path = p.eccentricities.flush(dir.path()).unwrap();
    assert!(ecc_path.ends_with("eccentricity.fastest.bin"));

    let core = CoreLevelsFile::read(&core_path).unwrap();
    let cells = CellsFile::read(&dir.path().join(cells::FILE_NAME)).unwrap();
    let eccentricities = EccentricityStorage::load_existing(dir.path(), "fastest")
        .unwrap()
        .unwrap();
    assert_eq!(core.levels(), p.core.levels());
    assert_eq!(core.core_node_count(), p.core.core_node_count());
    assert_eq!(cells.cell_array(), p.cells.cell_array());
    assert_eq!(cells.border_array(), p.cells.border_array());

    for origin in [0, 37, 99] {
        let expected = p
            .query(&weighting)
            .compute_isochrone(origin, 90.0)
            .unwrap();
        let reloaded = IsochroneQuery::new(&p.graph, &cells, &core, &eccentricities, &weighting)
            .compute_isochrone(origin, 90.0)
            .unwrap();
        assert_eq!(expected, reloaded);
    }
}

#[test]
fn test_missing_weighting_store_is_none() {
    let dir = TempDir::new().unwrap();
    let p = Prepared::from_fixture(&grid(4, 4, 2, 1), &FastestWeighting);
    p.eccentricities.flush(dir.path()).unwrap();

    assert!(EccentricityStorage::load_existing(dir.path(), "shortest")
        .unwrap()
        .is_none());
    assert!(EccentricityStorage::load_existing(dir.path(), "fastest")
        .unwrap()
        .is_some());
}

#[test]
fn test_corrupted_core_store_is_rejected() {
    let dir = TempDir::new().unwrap();
    let p = Prepared::from_fixture(&grid(6, 6, 3, 2), &FastestWeighting);
    let path = CoreLevelsFile::path(dir.path(), "fastest");
    CoreLevelsFile::write(&path, &p.core).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] ^= 0x40;
    std::fs::write(&path, &bytes).unwrap();

    let err = CoreLevelsFile::read(&path).unwrap_err();
    assert!(err.is_corruption(), "unexpected error: {err}");
}

#[test]
fn test_fixture_json_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("graph.json");
    let mut fixture = grid(5, 3, 2, 8);
    fixture.cells[14] = None;
    fixture.restricted_edges = vec![0, 3];
    fixture.save(&path).unwrap();

    let loaded = GraphFixture::load(&path).unwrap();
    assert_eq!(loaded, fixture);
    let graph = loaded.build_graph().unwrap();
    let cells = loaded.build_cells(&graph).unwrap();
    assert_eq!(GraphFixture::from_graph(&graph, &cells).cells, fixture.cells);
}
