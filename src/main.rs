//! Ragged Tiles CLI
//!
//! Read regions of a tiled polygon layer and report what they contain.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ragged_tiles::{
    build_runtime, init_rayon, read_whole_file, read_whole_store, AxisRange, Config, LayerReader, StoreConfig,
};

#[derive(Parser)]
#[command(name = "ragged-tiles")]
#[command(about = "Read regions of a tiled polygon layer", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Override fetch concurrency
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a region (default if no command specified)
    Query {
        /// Cell range along x, e.g. `25:45`, `:45` or `:`
        #[arg(long, default_value = ":")]
        x: AxisRange,

        /// Cell range along y
        #[arg(long, default_value = ":")]
        y: AxisRange,

        /// Read the un-tiled store (array store group or `whole_file`) instead
        #[arg(long)]
        whole: bool,
    },

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.yaml")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        None => {
            query_command(cli.config, cli.concurrency, AxisRange::Entire, AxisRange::Entire, false)?;
        }

        Some(Commands::Query { x, y, whole }) => {
            query_command(cli.config, cli.concurrency, x, y, whole)?;
        }

        Some(Commands::Validate) => {
            validate_command(cli.config)?;
        }

        Some(Commands::GenerateConfig { output }) => {
            generate_config_command(output)?;
        }
    }

    Ok(())
}

fn query_command(
    config_path: PathBuf,
    concurrency: Option<usize>,
    x: AxisRange,
    y: AxisRange,
    whole: bool,
) -> Result<()> {
    let mut config = Config::from_file(&config_path)?;

    // Apply overrides
    if let Some(c) = concurrency {
        config.fetch.concurrency = c;
    }

    config.validate()?;

    init_rayon(config.fetch.rayon_threads)?;
    let runtime = build_runtime(config.fetch.worker_threads)?;
    runtime.block_on(async {
        let start = Instant::now();

        let (tiles, polygons) = if whole {
            let polygons = match &config.store {
                StoreConfig::ArrayStore { path, region } => read_whole_store(path, region.as_deref()).await?,
                StoreConfig::Columnar {
                    whole_file: Some(file),
                    encoding,
                    ..
                } => read_whole_file(Path::new(file), *encoding).await?,
                StoreConfig::Columnar { .. } => anyhow::bail!("--whole on a columnar store needs `whole_file`"),
            };
            (None, polygons)
        } else {
            let reader = LayerReader::open(&config).await?;
            let tiles = reader.resolve((x, y))?;
            (Some(tiles.len()), reader.read((x, y)).await?)
        };

        let elapsed = start.elapsed();
        let coords: usize = polygons
            .iter()
            .map(|p| p.exterior().0.len() + p.interiors().iter().map(|r| r.0.len()).sum::<usize>())
            .sum();

        println!("\n=== Query ===");
        println!("Store: {}", config.store.location());
        if let Some(tiles) = tiles {
            println!("Region: x={} y={}", x, y);
            println!("Tiles touched: {}", tiles);
        }
        println!("Polygons: {}", polygons.len());
        println!("Coordinates: {}", coords);
        println!("Elapsed: {:.3}s", elapsed.as_secs_f64());
        println!("=============\n");

        Ok(())
    })
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}

fn generate_config_command(output: PathBuf) -> Result<()> {
    let yaml = r#"# Ragged Tiles Configuration

# === LAYER: Grid geometry ===
layer:
  # Cell extent along (x, y)
  shape: [100, 100]

  # Cells per tile edge; tiles per axis = ceil(shape / tile_size)
  tile_size: 10

# === STORE: Where the tiles live ===
# Choose ONE of: array_store (Zarr group per tile) OR columnar (Parquet file per tile)
store:
  # Option 1: Zarr, local directory or s3://bucket/prefix
  kind: array_store
  path: "data/tiled.zarr"
  # region: "us-west-2"

  # Option 2: GeoParquet (comment out the above and uncomment these)
  # kind: columnar
  # path_template: "data/cell_tile_{x}_{y}.parquet"
  # encoding: wkb   # or geoarrow
  # whole_file: "data/cells.parquet"   # read by `query --whole`

# === FETCH: Performance tuning ===
fetch:
  # Maximum tile fetches in flight
  concurrency: 16

  # Tokio async worker threads (null = num CPUs)
  # worker_threads: 8

  # Rayon thread pool size for polygon decoding (null = num CPUs)
  # rayon_threads: 8
"#;

    std::fs::write(&output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}
