//! CLI commands for butterfly-isochrone

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use butterfly_isochrone::config::Config;
use butterfly_isochrone::core_ch::{CoreChGraph, CorePreparation};
use butterfly_isochrone::eccentricity::{EccentricityPrecomputation, EccentricityStorage};
use butterfly_isochrone::formats::{cells, CellsFile, CoreLevelsFile, GraphFixture};
use butterfly_isochrone::graph::{
    weighting_by_name, EdgeFilterSequence, EdgeState, NodeId, RoadGraph, Weighting,
};
use butterfly_isochrone::isochrone::{IsochroneQuery, IsochroneResult};
use butterfly_isochrone::partition::{CellBorderRestrictionFilter, CellStorage, PartitionCatalog};
use butterfly_isochrone::synthetic::GridSpec;
use butterfly_isochrone::validate::validate_random_queries;

#[derive(Parser)]
#[command(name = "butterfly-isochrone")]
#[command(about = "Partition-aware isochrones over a core contraction hierarchy", long_about = None)]
#[command(version = env!("BUTTERFLY_VERSION"))]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a synthetic grid graph fixture with rectangular cells
    GenerateGrid {
        /// Output JSON fixture
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "20")]
        width: u32,

        #[arg(long, default_value = "20")]
        height: u32,

        /// Cell width in nodes
        #[arg(long, default_value = "5")]
        cell_width: u32,

        /// Cell height in nodes
        #[arg(long, default_value = "5")]
        cell_height: u32,

        /// Share of one-way edges
        #[arg(long, default_value = "0.0")]
        oneway_ratio: f64,

        #[arg(long, default_value = "123")]
        seed: u64,
    },

    /// Contract everything but the cell border core; writes core.<weighting>.bin and cells.bin
    PrepareCore {
        /// JSON graph fixture
        #[arg(short, long)]
        graph: PathBuf,

        /// Output directory for the stores
        #[arg(short, long)]
        outdir: PathBuf,

        /// Weighting: fastest or shortest
        #[arg(short, long, default_value = "fastest")]
        weighting: String,
    },

    /// Compute border node eccentricities; writes eccentricity.<weighting>.bin
    Eccentricity {
        /// JSON graph fixture
        #[arg(short, long)]
        graph: PathBuf,

        /// Directory holding cells.bin; the store is written here
        #[arg(short, long)]
        outdir: PathBuf,

        /// Weighting: fastest or shortest
        #[arg(short, long, default_value = "fastest")]
        weighting: String,

        /// Worker threads (overrides the config; 0 = all cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },

    /// Compute one isochrone and print it as JSON
    Isochrone {
        /// JSON graph fixture
        #[arg(short, long)]
        graph: PathBuf,

        /// Directory holding the prepared stores
        #[arg(short, long)]
        data: PathBuf,

        /// Weighting: fastest or shortest
        #[arg(short, long, default_value = "fastest")]
        weighting: String,

        /// Origin node id
        #[arg(long)]
        origin: NodeId,

        /// Budget in weighting units (seconds for fastest, meters for shortest)
        #[arg(long)]
        budget: f64,

        /// Also list every member of fully reachable cells
        #[arg(long)]
        expand: bool,

        /// Treat active cells with more than this share of settled nodes as
        /// fully reachable (lossy)
        #[arg(long)]
        approximate: Option<f64>,

        /// Write JSON here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Compare random isochrones against a plain Dijkstra
    Validate {
        /// JSON graph fixture
        #[arg(short, long)]
        graph: PathBuf,

        /// Directory holding the prepared stores
        #[arg(short, long)]
        data: PathBuf,

        /// Weighting: fastest or shortest
        #[arg(short, long, default_value = "fastest")]
        weighting: String,

        #[arg(long)]
        budget: f64,

        /// Number of random origins
        #[arg(short = 'n', long, default_value = "100")]
        n_tests: usize,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

/// Graph, partition and stores needed to answer queries
struct PreparedData {
    graph: RoadGraph,
    cells: CellStorage,
    core: CoreChGraph,
    eccentricities: EccentricityStorage,
    weighting: Box<dyn Weighting>,
}

#[derive(Serialize)]
struct IsochroneOutput<'a> {
    #[serde(flatten)]
    result: &'a IsochroneResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    expanded_nodes: Option<BTreeSet<NodeId>>,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => Config::default(),
        };

        match self.command {
            Commands::GenerateGrid {
                output,
                width,
                height,
                cell_width,
                cell_height,
                oneway_ratio,
                seed,
            } => {
                let spec = GridSpec {
                    width,
                    height,
                    cell_width,
                    cell_height,
                    oneway_ratio,
                    seed,
                    ..Default::default()
                };
                let fixture = spec.generate()?;
                fixture
                    .save(&output)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                println!(
                    "✓ Wrote {} nodes, {} edges to {}",
                    fixture.nodes,
                    fixture.edges.len(),
                    output.display()
                );
            }

            Commands::PrepareCore {
                graph,
                outdir,
                weighting,
            } => {
                let start = Instant::now();
                let fixture = load_fixture(&graph)?;
                let road_graph = fixture.build_graph()?;
                let cell_storage = fixture.build_cells(&road_graph)?;
                let weighting = weighting_by_name(&weighting)?;

                let border = CellBorderRestrictionFilter::new(&cell_storage);
                let restricted: BTreeSet<u32> = fixture.restricted_edges.iter().copied().collect();
                let extra = |e: &EdgeState| !restricted.contains(&e.edge);
                let restriction = EdgeFilterSequence::new().with(&border).with(&extra);

                println!(
                    "Contracting {} nodes ({} cells, {} border nodes)...",
                    road_graph.n_nodes(),
                    cell_storage.cell_ids().len(),
                    cell_storage.border_nodes().len()
                );
                let (core, report) =
                    CorePreparation::new(&road_graph, weighting.as_ref(), &restriction, config.core)
                        .run()?;
                report.print();

                std::fs::create_dir_all(&outdir)
                    .with_context(|| format!("Failed to create {}", outdir.display()))?;
                let core_path = CoreLevelsFile::path(&outdir, weighting.name());
                CoreLevelsFile::write(&core_path, &core)?;
                let cells_path = outdir.join(cells::FILE_NAME);
                CellsFile::write(&cells_path, &cell_storage)?;

                println!("✓ Wrote {}", core_path.display());
                println!("✓ Wrote {}", cells_path.display());
                println!("Total time: {:.2}s", start.elapsed().as_secs_f64());
            }

            Commands::Eccentricity {
                graph,
                outdir,
                weighting,
                threads,
            } => {
                let start = Instant::now();
                let road_graph = load_fixture(&graph)?.build_graph()?;
                let cell_storage = load_cells(&outdir, &road_graph)?;
                let weighting = weighting_by_name(&weighting)?;

                let mut ecc_config = config.eccentricity;
                if let Some(threads) = threads {
                    ecc_config.threads = threads;
                }

                let (storage, report) = EccentricityPrecomputation::new(
                    &road_graph,
                    &cell_storage,
                    weighting.as_ref(),
                    ecc_config,
                )
                .run()?;
                report.print();

                let path = storage.flush(&outdir)?;
                println!("✓ Wrote {}", path.display());
                println!("Total time: {:.2}s", start.elapsed().as_secs_f64());
            }

            Commands::Isochrone {
                graph,
                data,
                weighting,
                origin,
                budget,
                expand,
                approximate,
                output,
            } => {
                if let Some(fraction) = approximate {
                    if !(0.0..=1.0).contains(&fraction) {
                        bail!("--approximate must be in [0, 1], got {fraction}");
                    }
                }
                let prepared = load_prepared(&graph, &data, &weighting)?;
                let start = Instant::now();
                let mut result = IsochroneQuery::new(
                    &prepared.graph,
                    &prepared.cells,
                    &prepared.core,
                    &prepared.eccentricities,
                    prepared.weighting.as_ref(),
                )
                .with_config(config.query)
                .compute_isochrone(origin, budget)?;
                if let Some(fraction) = approximate {
                    let promoted = result.approximate_active_cells(&prepared.cells, fraction);
                    info!(fraction, promoted = promoted.len(), "approximated active cells");
                }
                info!(
                    origin,
                    budget,
                    nodes = result.reachable_nodes.len(),
                    partial = result.partial,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "isochrone done"
                );

                let out = IsochroneOutput {
                    result: &result,
                    expanded_nodes: expand.then(|| result.expand_fully_reachable(&prepared.cells)),
                };
                let json = serde_json::to_string_pretty(&out)?;
                match output {
                    Some(path) => std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?,
                    None => println!("{json}"),
                }
            }

            Commands::Validate {
                graph,
                data,
                weighting,
                budget,
                n_tests,
                seed,
            } => {
                let prepared = load_prepared(&graph, &data, &weighting)?;
                let summary = validate_random_queries(
                    &prepared.graph,
                    &prepared.cells,
                    &prepared.core,
                    &prepared.eccentricities,
                    prepared.weighting.as_ref(),
                    budget,
                    n_tests,
                    seed,
                )?;
                summary.print();
                if !summary.is_valid() {
                    bail!("{} of {} isochrones differ from Dijkstra", summary.incorrect, n_tests);
                }
                println!("✓ All isochrones match");
            }
        }

        Ok(())
    }
}

fn load_fixture(path: &Path) -> Result<GraphFixture> {
    GraphFixture::load(path).with_context(|| format!("Failed to load graph {}", path.display()))
}

fn load_cells(dir: &Path, graph: &RoadGraph) -> Result<CellStorage> {
    let path = dir.join(cells::FILE_NAME);
    let cells = CellsFile::read(&path)
        .with_context(|| format!("Failed to load {} (run prepare-core first)", path.display()))?;
    if cells.n_nodes() != graph.n_nodes() {
        bail!(
            "{} covers {} nodes, graph has {}",
            path.display(),
            cells.n_nodes(),
            graph.n_nodes()
        );
    }
    Ok(cells)
}

fn load_prepared(graph_path: &Path, dir: &Path, weighting: &str) -> Result<PreparedData> {
    let start = Instant::now();
    let weighting = weighting_by_name(weighting)?;
    let graph = load_fixture(graph_path)?.build_graph()?;
    let cells = load_cells(dir, &graph)?;

    let core_path = CoreLevelsFile::path(dir, weighting.name());
    let core = CoreLevelsFile::read(&core_path)
        .with_context(|| format!("Failed to load {}", core_path.display()))?;
    if core.n_nodes() != graph.n_nodes() || core.n_base_edges() != graph.n_edges() {
        bail!("{} was prepared for a different graph", core_path.display());
    }

    let eccentricities = EccentricityStorage::load_existing(dir, weighting.name())?
        .with_context(|| {
            format!(
                "No eccentricity store for '{}' in {} (run eccentricity first)",
                weighting.name(),
                dir.display()
            )
        })?;

    info!(
        nodes = graph.n_nodes(),
        core_nodes = core.core_node_count(),
        border_nodes = eccentricities.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "prepared data loaded"
    );

    Ok(PreparedData {
        graph,
        cells,
        core,
        eccentricities,
        weighting,
    })
}
