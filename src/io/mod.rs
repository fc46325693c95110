//! Tile backends: columnar GeoParquet files and Zarr array stores.

pub(crate) mod fetcher;
pub(crate) mod geometry_column;
pub(crate) mod parquet_reader;
mod store;
pub(crate) mod zarr_reader;

pub use fetcher::{fetch_all, present_tiles, TileFetcher};
pub use geometry_column::{decode_polygons, read_wkb, GeometryEncoding};
pub use parquet_reader::{read_parquet_file, ParquetTileFetcher};
pub use store::{create_store, parse_s3_uri};
pub use zarr_reader::ZarrTileFetcher;
