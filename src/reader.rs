//! Region reads over a tiled layer.
//!
//! A [`TileReader`] pairs a [`TileGrid`] with one backend. A query index is
//! normalized, resolved to a sorted list of tile ids, filtered down to tiles
//! that hold data, fetched, and combined.

use crate::error::{Result, TileError};
use crate::index::{QueryIndex, TileGrid, TileId};
use crate::io::{
    decode_polygons, fetch_all, present_tiles, GeometryEncoding, ParquetTileFetcher, TileFetcher,
};
use crate::ragged::{reconstruct, stitch, MergedRagged, RaggedFragment};
use arrow::record_batch::RecordBatch;
use geo_types::Polygon;

/// Maximum tile fetches in flight unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Reads rectangular regions of a tiled layer from one backend.
#[derive(Debug, Clone)]
pub struct TileReader<F> {
    grid: TileGrid,
    fetcher: F,
    concurrency: usize,
}

impl<F> TileReader<F> {
    pub fn new(grid: TileGrid, fetcher: F) -> Self {
        Self {
            grid,
            fetcher,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set the maximum number of tile fetches in flight.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Tile ids a query touches, sorted, whether or not they hold data.
    pub fn resolve(&self, index: impl Into<QueryIndex>) -> Result<Vec<TileId>> {
        self.grid.tile_ids(&index.into())
    }
}

impl<F: TileFetcher> TileReader<F> {
    /// Fetch every tile with data that the query touches, in tile id order.
    pub async fn fetch_tiles(&self, index: impl Into<QueryIndex>) -> Result<Vec<(TileId, F::Tile)>> {
        let wanted = self.resolve(index)?;
        let present = present_tiles(&self.fetcher, &wanted).await?;
        tracing::debug!(
            "Query touches {} tiles, {} hold data",
            wanted.len(),
            present.len()
        );
        fetch_all(&self.fetcher, &present, self.concurrency).await
    }
}

impl<F: TileFetcher<Tile = RaggedFragment>> TileReader<F> {
    /// Fetch the tiles a query touches and stitch them into one ragged array.
    pub async fn read_ragged(&self, index: impl Into<QueryIndex>) -> Result<MergedRagged> {
        let tiles = self.fetch_tiles(index).await?;
        let num_tiles = tiles.len();
        let merged = stitch(tiles.into_iter().map(|(_, fragment)| fragment));

        tracing::info!(
            "Stitched {} tiles: {} coordinates, {} geometries",
            num_tiles,
            merged.num_coords(),
            merged.num_geometries()
        );
        Ok(merged)
    }

    /// Read a region as polygons.
    pub async fn read(&self, index: impl Into<QueryIndex>) -> Result<Vec<Polygon<f64>>> {
        let merged = self.read_ragged(index).await?;

        // Decoding is CPU-bound
        tokio::task::spawn_blocking(move || reconstruct(&merged))
            .await
            .map_err(|e| TileError::Task(e.to_string()))?
    }
}

impl TileReader<ParquetTileFetcher> {
    /// Read the record batches of every tile file the query touches.
    ///
    /// Tiles without a file are skipped. Runs synchronously.
    pub fn read_batches(&self, index: impl Into<QueryIndex>) -> Result<Vec<RecordBatch>> {
        let wanted = self.resolve(index)?;

        let mut batches = Vec::new();
        let mut read = 0;
        for tile in wanted {
            if !self.fetcher.tile_exists(tile) {
                tracing::debug!("Tile {} has no file, skipping", tile);
                continue;
            }
            batches.extend(self.fetcher.read_tile(tile)?);
            read += 1;
        }

        tracing::info!(
            "Read {} tile files, {} rows",
            read,
            batches.iter().map(|b| b.num_rows()).sum::<usize>()
        );
        Ok(batches)
    }

    /// Read a region as polygons decoded from the `geometry` column.
    pub fn read_polygons(&self, index: impl Into<QueryIndex>) -> Result<Vec<Polygon<f64>>> {
        let encoding: GeometryEncoding = self.fetcher.encoding();
        let mut polygons = Vec::new();
        for batch in self.read_batches(index)? {
            polygons.extend(decode_polygons(&batch, encoding)?);
        }
        Ok(polygons)
    }
}
