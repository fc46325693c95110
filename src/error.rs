//! Error taxonomy for tile resolution, fetching and ragged-array handling.

use crate::index::TileId;

/// Result alias used throughout the library.
pub type Result<T, E = TileError> = std::result::Result<T, E>;

/// Errors surfaced by the tile reader.
///
/// Missing columnar tile files are not represented here: they mean "no data
/// for this cell" and are skipped before any fetch is issued.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    /// The query index has a shape or element type the normalizer rejects.
    #[error("malformed index: cannot recognize index of type {0}")]
    MalformedIndex(String),

    /// A store member or file name does not embed two integer runs.
    #[error("malformed tile name: {0:?}")]
    MalformedTileName(String),

    /// An array-store tile group is absent or lacks its `buffer`/`offsets` arrays.
    #[error("corrupt tile layout for tile {tile}: {reason}")]
    CorruptTileLayout { tile: TileId, reason: String },

    /// A whole-layer array store lacks its `buffer`/`offsets` arrays.
    #[error("corrupt store layout at {path}: {reason}")]
    CorruptStoreLayout { path: String, reason: String },

    /// Offsets violate the ragged-array invariants.
    #[error("malformed ragged array: {0}")]
    MalformedRaggedArray(String),

    /// A columnar geometry column could not be decoded.
    #[error("malformed geometry: {0}")]
    MalformedGeometry(String),

    /// Grid construction with unusable parameters.
    #[error("invalid tile grid: {0}")]
    InvalidGrid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    ObjectStore(#[from] object_store::Error),

    /// Failure reported by the Zarr layer while opening or reading `path`.
    #[error("array store error at {path}: {source}")]
    ArrayStore {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    Task(String),
}

impl TileError {
    pub(crate) fn corrupt(tile: TileId, reason: impl Into<String>) -> Self {
        Self::CorruptTileLayout {
            tile,
            reason: reason.into(),
        }
    }

    pub(crate) fn array_store<E>(path: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ArrayStore {
            path: path.into(),
            source: Box::new(source),
        }
    }
}
