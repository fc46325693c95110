//! Query normalization and tile grid resolution.

mod query;
mod tile_grid;

pub use query::{normalize, AxisRange, IndexItem, QueryIndex};
pub use tile_grid::{parse_tile_name, resolve_tile_ids, TileGrid, TileId};
