//! CLI entry point: loads a run configuration, wires up logging, runs the
//! infill and merge pipeline, and exits with the error taxonomy's process
//! exit code on failure. Parses args, builds a `tracing-subscriber` filter
//! from the config, and delegates to a `run` function that returns
//! `Result<(), tileagg::Error>` instead of ever unwrapping inline.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tileagg::config::RunConfig;
use tileagg::driver::{CancelToken, MergeDriver};
use tileagg::graph::TileGraph;
use tileagg::parcel::ParcelTable;
use tileagg::tile::TileKey;

#[derive(Debug, Parser)]
#[command(name = "tileagg", about = "Agglomerative spatial tiling by R² maximization")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run the infill and merge pipeline against a YAML run configuration.
    Run {
        /// path to a YAML run configuration file
        config: PathBuf,

        /// overrides the configuration's desired_ending_tile_count
        #[arg(long)]
        desired_ending_tile_count: Option<usize>,

        /// overrides the configuration's adjacency_buffer_feet
        #[arg(long)]
        adjacency_buffer_feet: Option<f64>,
    },
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(
    config_path: &PathBuf,
    desired_ending_tile_count: Option<usize>,
    adjacency_buffer_feet: Option<f64>,
    cancel: CancelToken,
) -> Result<(), tileagg::Error> {
    let contents = std::fs::read_to_string(config_path)
        .map_err(|e| tileagg::Error::InvalidConfig(e.to_string()))?;
    let mut config = RunConfig::from_yaml_str(&contents)?;
    if let Some(value) = desired_ending_tile_count {
        config.desired_ending_tile_count = value;
    }
    if let Some(value) = adjacency_buffer_feet {
        config.adjacency_buffer_feet = value;
    }
    config.validate()?;

    init_tracing(&config.log_level);
    tracing::info!(path = %config_path.display(), "loaded run configuration");

    let parcel_rows = tileagg::io::parquet::load_parcels(&config.parcels_path)?;
    let tile_rows = tileagg::io::parquet::load_tiles(&config.tiles_path)?;

    let mut parcels = ParcelTable::from_rows(parcel_rows, TileKey(0))?;

    let spatial_index = tileagg::spatial_index::ParcelIndex::build(parcels.keys().map(|k| {
        let idx = parcels.index_of(k).expect("key came from parcels.keys()");
        let c = parcels.centroid(idx);
        (k, [c.x(), c.y()])
    }));
    tileagg::infill::run(&mut parcels, &spatial_index, config.infill_k)?;

    let graph = TileGraph::init(tile_rows, &mut parcels, config.adjacency_buffer_feet)?;
    tracing::info!(tile_count = graph.tile_count(), "tile graph initialized");

    let mut driver = MergeDriver::new(
        graph,
        parcels,
        config.min_sales_for_ols,
        config.desired_ending_tile_count,
        config.output_directory.clone(),
        cancel,
    );
    let outcome = driver.run()?;
    tracing::info!(
        iterations = outcome.iterations_run,
        final_tile_count = outcome.final_tile_count,
        stop_reason = ?outcome.stop_reason,
        "run complete"
    );
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let cancel = CancelToken::new();
    let handler_cancel = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_cancel.cancel()) {
        eprintln!("warning: failed to install ctrl-c handler: {err}");
    }

    let Command::Run {
        config,
        desired_ending_tile_count,
        adjacency_buffer_feet,
    } = cli.command;

    match run(&config, desired_ending_tile_count, adjacency_buffer_feet, cancel) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}
