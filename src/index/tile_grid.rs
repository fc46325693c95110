//! Fixed tile grid over the layer and query → tile id resolution.

use super::query::{normalize, AxisRange, QueryIndex};
use crate::error::{Result, TileError};
use regex::Regex;
use std::fmt;
use std::ops::Range;
use std::sync::LazyLock;

static INTEGER_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static pattern is valid"));

/// One cell of the tile grid.
///
/// Ordering is lexicographic on `(x, y)`, which is the order tiles are
/// fetched and stitched in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    /// Tile index along axis 0
    pub x: u64,

    /// Tile index along axis 1
    pub y: u64,
}

impl TileId {
    pub fn new(x: u64, y: u64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Extract a tile id from a store member or file name.
///
/// The first two runs of digits are taken as `x` and `y`, so `"3_4.zarr"`,
/// `"cell_tile_3_4.parquet"` and `"geo_parquet_3_4"` all map to `(3, 4)`.
pub fn parse_tile_name(name: &str) -> Result<TileId> {
    let mut runs = INTEGER_RUN.find_iter(name).map(|m| m.as_str().parse::<u64>());

    match (runs.next(), runs.next()) {
        (Some(Ok(x)), Some(Ok(y))) => Ok(TileId::new(x, y)),
        _ => Err(TileError::MalformedTileName(name.to_string())),
    }
}

/// The layer's overall shape and the fixed tile size partitioning it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    /// Layer extent per axis, in layer units
    pub shape: [u64; 2],

    /// Edge length of every tile, in layer units
    pub tile_size: u64,
}

impl TileGrid {
    /// Create a grid. A zero tile size cannot partition anything.
    pub fn new(shape: [u64; 2], tile_size: u64) -> Result<Self> {
        if tile_size == 0 {
            return Err(TileError::InvalidGrid("tile_size must be > 0".to_string()));
        }
        Ok(Self { shape, tile_size })
    }

    /// Number of tiles along each axis.
    pub fn tile_counts(&self) -> [u64; 2] {
        [
            self.shape[0].div_ceil(self.tile_size),
            self.shape[1].div_ceil(self.tile_size),
        ]
    }

    /// Total number of cells in the grid.
    pub fn num_tiles(&self) -> u64 {
        self.tile_counts().iter().product()
    }

    /// Whether `tile` lies inside the grid.
    pub fn contains(&self, tile: TileId) -> bool {
        let [nx, ny] = self.tile_counts();
        tile.x < nx && tile.y < ny
    }

    /// Tile index range covered by `range` along `axis`, clipped to the grid.
    ///
    /// `stop` is rounded up, so a stop exactly on a tile boundary does not
    /// include the following tile.
    pub fn axis_tile_range(&self, range: &AxisRange, axis: usize) -> Range<u64> {
        let count = self.tile_counts()[axis];
        match range {
            AxisRange::Entire => 0..count,
            AxisRange::Bounded { .. } => {
                let (start, stop) = range.resolve(self.shape[axis]);
                let start_tile = (start / self.tile_size).min(count);
                let stop_tile = stop.div_ceil(self.tile_size).min(count);
                start_tile..stop_tile.max(start_tile)
            }
        }
    }

    /// Resolve a query index to the sorted tile ids it touches.
    pub fn tile_ids(&self, index: &QueryIndex) -> Result<Vec<TileId>> {
        let (x, y) = normalize(index)?;
        Ok(resolve_tile_ids(&x, &y, self))
    }
}

/// Cartesian product of both axes' tile ranges, sorted by `(x, y)`.
///
/// Every id lies inside the grid; tiles with no backing data are dropped by
/// the fetch stage.
pub fn resolve_tile_ids(x: &AxisRange, y: &AxisRange, grid: &TileGrid) -> Vec<TileId> {
    let xs = grid.axis_tile_range(x, 0);
    let ys = grid.axis_tile_range(y, 1);

    // Nested ascending ranges already yield lexicographic order without duplicates.
    let ids: Vec<TileId> = xs
        .flat_map(|tx| ys.clone().map(move |ty| TileId::new(tx, ty)))
        .collect();
    debug_assert!(ids.iter().all(|&tile| grid.contains(tile)));
    ids
}
