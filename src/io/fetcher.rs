//! Backend-neutral tile fetching.

use crate::error::Result;
use crate::index::TileId;
use futures::stream::{self, StreamExt, TryStreamExt};

/// Capability set of a tile backend.
///
/// `Tile` is what one tile decodes to: a ragged fragment for array stores,
/// record batches for columnar files.
#[allow(async_fn_in_trait)]
pub trait TileFetcher {
    type Tile;

    /// Whether the store holds data for `tile`.
    async fn exists(&self, tile: TileId) -> Result<bool>;

    /// Fetch one tile. Only called for tiles that exist.
    async fn fetch(&self, tile: TileId) -> Result<Self::Tile>;
}

/// Drop tiles without backing data, keeping the order of `tiles`.
pub async fn present_tiles<F: TileFetcher>(fetcher: &F, tiles: &[TileId]) -> Result<Vec<TileId>> {
    let mut present = Vec::with_capacity(tiles.len());
    for &tile in tiles {
        if fetcher.exists(tile).await? {
            present.push(tile);
        } else {
            tracing::debug!("Tile {} has no data, skipping", tile);
        }
    }
    Ok(present)
}

/// Fetch `tiles` with at most `concurrency` requests in flight.
///
/// Results come back in the order of `tiles` regardless of completion order.
/// The first failure aborts the remaining fetches.
pub async fn fetch_all<F: TileFetcher>(
    fetcher: &F,
    tiles: &[TileId],
    concurrency: usize,
) -> Result<Vec<(TileId, F::Tile)>> {
    stream::iter(tiles.iter().copied())
        .map(|tile| async move { fetcher.fetch(tile).await.map(|data| (tile, data)) })
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}
