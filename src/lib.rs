//! Ragged Tiles
//!
//! Read rectangular regions of a tiled polygon layer. The layer is a 2-D grid
//! of cells cut into square tiles; each tile is stored either as a GeoParquet
//! file or as a Zarr group holding a ragged coordinate array.
//!
//! # Architecture
//!
//! - **Index**: query normalization and tile id resolution
//! - **I/O**: columnar and array-store tile fetchers over `object_store`
//! - **Ragged**: stitching per-tile ragged arrays and decoding polygons
//! - **Reader**: the region read that ties them together
//!
//! # Usage
//!
//! ```no_run
//! use ragged_tiles::{AxisRange, Config, LayerReader};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml".as_ref())?;
//!     let reader = LayerReader::open(&config).await?;
//!     let polygons = reader.read((AxisRange::new(25, 45), AxisRange::Entire)).await?;
//!     println!("{} polygons", polygons.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod ragged;
pub mod reader;

pub use config::{Config, StoreConfig};
pub use error::{Result, TileError};
pub use index::{AxisRange, IndexItem, QueryIndex, TileGrid, TileId};
pub use io::{GeometryEncoding, ParquetTileFetcher, TileFetcher, ZarrTileFetcher};
pub use ragged::{MergedRagged, RaggedFragment};
pub use reader::TileReader;

use anyhow::Context;
use geo_types::Polygon;
use std::path::Path;

/// A tile reader over whichever backend the configuration names.
pub enum LayerReader {
    Columnar(TileReader<ParquetTileFetcher>),
    ArrayStore(TileReader<ZarrTileFetcher>),
}

impl LayerReader {
    /// Build the grid and open the configured store.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        let grid = config.layer.grid()?;

        let reader = match &config.store {
            StoreConfig::Columnar {
                path_template,
                encoding,
                ..
            } => {
                tracing::info!("Reading columnar tiles from {}", path_template);
                Self::Columnar(TileReader::new(
                    grid,
                    ParquetTileFetcher::new(path_template.clone(), *encoding),
                ))
            }
            StoreConfig::ArrayStore { path, region } => {
                let (store, prefix) = io::create_store(path, region.as_deref())?;
                let fetcher = ZarrTileFetcher::open(store, &prefix)
                    .await
                    .with_context(|| format!("Failed to open tile store {}", path))?;
                Self::ArrayStore(TileReader::new(grid, fetcher).with_concurrency(config.fetch.concurrency))
            }
        };
        Ok(reader)
    }

    pub fn grid(&self) -> &TileGrid {
        match self {
            Self::Columnar(reader) => reader.grid(),
            Self::ArrayStore(reader) => reader.grid(),
        }
    }

    /// Tile ids a query touches.
    pub fn resolve(&self, index: impl Into<QueryIndex>) -> Result<Vec<TileId>> {
        self.grid().tile_ids(&index.into())
    }

    /// Read a region as polygons.
    pub async fn read(&self, index: impl Into<QueryIndex>) -> Result<Vec<Polygon<f64>>> {
        match self {
            Self::Columnar(reader) => {
                // File reads and decoding block
                let reader = reader.clone();
                let index: QueryIndex = index.into();
                tokio::task::spawn_blocking(move || reader.read_polygons(index))
                    .await
                    .map_err(|e| TileError::Task(e.to_string()))?
            }
            Self::ArrayStore(reader) => reader.read(index).await,
        }
    }
}

/// Read a whole un-tiled array store as polygons.
pub async fn read_whole_store(location: &str, region: Option<&str>) -> anyhow::Result<Vec<Polygon<f64>>> {
    let (store, prefix) = io::create_store(location, region)?;
    let merged = ZarrTileFetcher::read_whole_store(store, &prefix).await?;
    let polygons = tokio::task::spawn_blocking(move || ragged::reconstruct(&merged)).await??;
    Ok(polygons)
}

/// Read a whole un-tiled GeoParquet file as polygons.
pub async fn read_whole_file(path: &Path, encoding: GeometryEncoding) -> anyhow::Result<Vec<Polygon<f64>>> {
    let path = path.to_path_buf();
    let polygons = tokio::task::spawn_blocking(move || -> Result<Vec<Polygon<f64>>> {
        let mut polygons = Vec::new();
        for batch in io::read_parquet_file(&path)? {
            polygons.extend(io::decode_polygons(&batch, encoding)?);
        }
        Ok(polygons)
    })
    .await??;
    Ok(polygons)
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> anyhow::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}

/// Initialize the Rayon thread pool.
pub fn init_rayon(threads: Option<usize>) -> anyhow::Result<()> {
    if let Some(threads) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }
    Ok(())
}
