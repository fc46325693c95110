//! Array-store tiles: one Zarr group per tile under a parent group.
//!
//! Each tile group holds two arrays:
//!
//! - `buffer`: `(n, 2)` float64 coordinate pairs
//! - `offsets`: int64 ring offsets, either 1-D or the `(2, k)` stack of ring
//!   and geometry offsets written by the conversion tooling (row 0 is used)
//!
//! The parent group's hierarchy is listed once on open. Tile names are
//! parsed from member names, so `3_4.zarr` holds tile `(3, 4)`.

use super::fetcher::TileFetcher;
use crate::error::{Result, TileError};
use crate::index::{parse_tile_name, TileId};
use crate::ragged::{MergedRagged, RaggedFragment};
use ndarray::Array2;
use object_store::ObjectStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use zarrs::array::Array;
use zarrs::node::{Node, NodeMetadata};
use zarrs_object_store::AsyncObjectStore;

type ZarrStorage = AsyncObjectStore<Arc<dyn ObjectStore>>;

const BUFFER: &str = "buffer";
const OFFSETS: &str = "offsets";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Array,
    Group,
}

impl NodeKind {
    fn of(node: &Node) -> Self {
        match node.metadata() {
            NodeMetadata::Array(_) => Self::Array,
            NodeMetadata::Group(_) => Self::Group,
        }
    }
}

/// A group as seen in the hierarchy listing.
#[derive(Debug, Clone)]
struct Member {
    path: String,
    children: BTreeMap<String, NodeKind>,
}

impl Member {
    fn from_node(node: &Node) -> Self {
        Self {
            path: node.path().as_str().to_string(),
            children: node
                .children()
                .iter()
                .map(|child| (node_name(child).to_string(), NodeKind::of(child)))
                .collect(),
        }
    }

    /// Path of the child array `name`, or why it cannot be read.
    fn array_path(&self, name: &str) -> std::result::Result<String, String> {
        match self.children.get(name) {
            Some(NodeKind::Array) => Ok(join_path(&self.path, name)),
            Some(NodeKind::Group) => Err(format!("{} member is a group, expected an array", name)),
            None => Err(format!("{} member is missing", name)),
        }
    }
}

fn node_name(node: &Node) -> &str {
    let path = node.path().as_str();
    path.rsplit('/').next().unwrap_or(path)
}

fn join_path(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

/// Node path for a store prefix: `""` → `"/"`, `"a/b"` → `"/a/b"`.
fn node_path(prefix: &str) -> String {
    format!("/{}", prefix.trim_matches('/'))
}

/// Fetches tiles from a parent Zarr group.
pub struct ZarrTileFetcher {
    storage: Arc<ZarrStorage>,

    /// Parent group members keyed by the tile id parsed from their name
    tiles: BTreeMap<TileId, Member>,
}

impl ZarrTileFetcher {
    /// Open the parent group at `prefix` within `store` and list its tiles.
    ///
    /// Fails with `MalformedTileName` if any member name lacks two integer runs,
    /// and with `CorruptTileLayout` if a member is an array rather than a group.
    pub async fn open(store: Arc<dyn ObjectStore>, prefix: &str) -> Result<Self> {
        let storage = Arc::new(AsyncObjectStore::new(store));
        let root_path = node_path(prefix);

        let root = Node::async_open(storage.clone(), &root_path)
            .await
            .map_err(|e| TileError::array_store(&root_path, e))?;

        let mut tiles = BTreeMap::new();
        for child in root.children() {
            let tile = parse_tile_name(node_name(child))?;
            if NodeKind::of(child) != NodeKind::Group {
                return Err(TileError::corrupt(
                    tile,
                    format!("{} is an array, expected a group", child.path().as_str()),
                ));
            }
            tiles.insert(tile, Member::from_node(child));
        }

        tracing::info!("Opened tile store at {} with {} tiles", root_path, tiles.len());

        Ok(Self { storage, tiles })
    }

    /// Number of tiles listed in the parent group.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Tile ids present in the store, sorted.
    pub fn tile_ids(&self) -> impl Iterator<Item = TileId> + '_ {
        self.tiles.keys().copied()
    }

    /// Read a single un-tiled group holding `buffer` and `offsets` for the whole layer.
    ///
    /// With a 2-row `offsets` array the second row supplies the geometry
    /// offsets, so multi-ring polygons survive; a 1-D array means one ring per
    /// geometry.
    pub async fn read_whole_store(store: Arc<dyn ObjectStore>, prefix: &str) -> Result<MergedRagged> {
        let storage = Arc::new(AsyncObjectStore::new(store));
        let group_path = node_path(prefix);

        let node = Node::async_open(storage.clone(), &group_path)
            .await
            .map_err(|e| TileError::array_store(&group_path, e))?;
        let member = Member::from_node(&node);

        let corrupt = |reason: String| TileError::CorruptStoreLayout {
            path: group_path.clone(),
            reason,
        };
        let buffer_path = member.array_path(BUFFER).map_err(corrupt)?;
        let offsets_path = member.array_path(OFFSETS).map_err(corrupt)?;

        let (coordinates, (rows, offsets)) = futures::try_join!(
            read_coordinates(&storage, &buffer_path),
            read_offsets(&storage, &offsets_path),
        )?;

        let merged = if rows == 2 {
            let width = offsets.len() / 2;
            let ring_offsets = offsets[..width].to_vec();
            // Geometry offsets are stored with a closing entry; keep one start per geometry
            let geometry_offsets = offsets[width..]
                .split_last()
                .map(|(_, starts)| starts.to_vec())
                .unwrap_or_default();
            MergedRagged::from_parts(coordinates, ring_offsets, geometry_offsets)?
        } else {
            MergedRagged::from(RaggedFragment::new(coordinates, offsets)?)
        };

        tracing::info!(
            "Read whole store {}: {} coordinates, {} geometries",
            group_path,
            merged.num_coords(),
            merged.num_geometries()
        );
        Ok(merged)
    }
}

impl TileFetcher for ZarrTileFetcher {
    type Tile = RaggedFragment;

    async fn exists(&self, tile: TileId) -> Result<bool> {
        Ok(self.tiles.contains_key(&tile))
    }

    /// Read the tile's `buffer` and `offsets` arrays together.
    async fn fetch(&self, tile: TileId) -> Result<RaggedFragment> {
        let member = self
            .tiles
            .get(&tile)
            .ok_or_else(|| TileError::corrupt(tile, "no tile group in store"))?;

        let buffer_path = member
            .array_path(BUFFER)
            .map_err(|reason| TileError::corrupt(tile, reason))?;
        let offsets_path = member
            .array_path(OFFSETS)
            .map_err(|reason| TileError::corrupt(tile, reason))?;

        let (coordinates, (rows, offsets)) = futures::try_join!(
            read_coordinates(&self.storage, &buffer_path),
            read_offsets(&self.storage, &offsets_path),
        )?;

        let ring_offsets = if rows == 2 {
            offsets[..offsets.len() / 2].to_vec()
        } else {
            offsets
        };

        tracing::debug!(
            "Fetched tile {}: {} coordinates, {} rings",
            tile,
            coordinates.nrows(),
            ring_offsets.len().saturating_sub(1)
        );

        RaggedFragment::new(coordinates, ring_offsets)
    }
}

/// Read an `(n, 2)` float64 coordinate array.
async fn read_coordinates(storage: &Arc<ZarrStorage>, path: &str) -> Result<Array2<f64>> {
    let array = Array::async_open(storage.clone(), path)
        .await
        .map_err(|e| TileError::array_store(path, e))?;

    let shape = array.shape().to_vec();
    let [rows, 2] = shape[..] else {
        return Err(TileError::MalformedRaggedArray(format!(
            "{} must have shape (n, 2), got {:?}",
            path, shape
        )));
    };

    let values = array
        .async_retrieve_array_subset_elements::<f64>(&array.subset_all())
        .await
        .map_err(|e| TileError::array_store(path, e))?;

    Array2::from_shape_vec((rows as usize, 2), values)
        .map_err(|e| TileError::MalformedRaggedArray(format!("{}: {}", path, e)))
}

/// Read an int64 offsets array, returning its row count (1 for 1-D) and values.
async fn read_offsets(storage: &Arc<ZarrStorage>, path: &str) -> Result<(u64, Vec<i64>)> {
    let array = Array::async_open(storage.clone(), path)
        .await
        .map_err(|e| TileError::array_store(path, e))?;

    let rows = match array.shape() {
        [_] => 1,
        [rows @ (1 | 2), _] => *rows,
        shape => {
            return Err(TileError::MalformedRaggedArray(format!(
                "{} must be 1-D or have 1 or 2 rows, got shape {:?}",
                path, shape
            )))
        }
    };

    let values = array
        .async_retrieve_array_subset_elements::<i64>(&array.subset_all())
        .await
        .map_err(|e| TileError::array_store(path, e))?;

    Ok((rows, values))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use object_store::local::LocalFileSystem;
    use tempfile::TempDir;
    use zarrs::array::ArrayBuilder;
    use zarrs::group::GroupBuilder;

    /// Which members to write for a fixture tile.
    #[derive(Clone, Copy, PartialEq)]
    pub(crate) enum Layout {
        Complete,
        MissingOffsets,
        OffsetsAsGroup,
        BareArray,
    }

    pub(crate) fn local_store(dir: &TempDir) -> Arc<dyn ObjectStore> {
        Arc::new(LocalFileSystem::new_with_prefix(dir.path()).unwrap())
    }

    pub(crate) async fn write_group(storage: &Arc<ZarrStorage>, path: &str) {
        let group = GroupBuilder::new().build(storage.clone(), path).unwrap();
        group.async_store_metadata().await.unwrap();
    }

    async fn write_f64(storage: &Arc<ZarrStorage>, path: &str, shape: Vec<u64>, values: &[f64]) {
        let array = ArrayBuilder::new(shape.clone(), shape, "float64", 0.0f64)
            .build(storage.clone(), path)
            .unwrap();
        array.async_store_metadata().await.unwrap();
        array.async_store_chunk_elements(&[0, 0], values).await.unwrap();
    }

    async fn write_i64(storage: &Arc<ZarrStorage>, path: &str, shape: Vec<u64>, values: &[i64]) {
        let chunk_indices = vec![0u64; shape.len()];
        let array = ArrayBuilder::new(shape.clone(), shape, "int64", 0i64)
            .build(storage.clone(), path)
            .unwrap();
        array.async_store_metadata().await.unwrap();
        array.async_store_chunk_elements(&chunk_indices, values).await.unwrap();
    }

    /// Write one tile group holding single-ring polygons, offsets stacked as (2, k).
    pub(crate) async fn write_tile(
        store: &Arc<dyn ObjectStore>,
        group_path: &str,
        rings: &[Vec<[f64; 2]>],
        layout: Layout,
    ) {
        let storage = Arc::new(AsyncObjectStore::new(store.clone()));
        let coords: Vec<f64> = rings.iter().flatten().flatten().copied().collect();
        let num_coords = coords.len() as u64 / 2;

        if layout == Layout::BareArray {
            write_f64(&storage, group_path, vec![num_coords, 2], &coords).await;
            return;
        }
        write_group(&storage, group_path).await;
        write_f64(&storage, &join_path(group_path, BUFFER), vec![num_coords, 2], &coords).await;

        let mut ring_offsets = vec![0i64];
        for ring in rings {
            ring_offsets.push(ring_offsets.last().unwrap() + ring.len() as i64);
        }
        let geometry_offsets: Vec<i64> = (0..ring_offsets.len() as i64).collect();
        let k = ring_offsets.len() as u64;
        let stacked: Vec<i64> = ring_offsets.into_iter().chain(geometry_offsets).collect();

        let offsets_path = join_path(group_path, OFFSETS);
        match layout {
            Layout::Complete => write_i64(&storage, &offsets_path, vec![2, k], &stacked).await,
            Layout::MissingOffsets => {}
            Layout::OffsetsAsGroup => write_group(&storage, &offsets_path).await,
            Layout::BareArray => unreachable!(),
        }
    }

    pub(crate) fn triangle(at: f64) -> Vec<[f64; 2]> {
        vec![[at, at], [at + 1.0, at], [at, at + 1.0]]
    }

    async fn tiled_store(layouts: &[(&str, Layout)]) -> (TempDir, Arc<dyn ObjectStore>) {
        let temp_dir = TempDir::new().unwrap();
        let store = local_store(&temp_dir);
        let storage = Arc::new(AsyncObjectStore::new(store.clone()));
        write_group(&storage, "/").await;
        for (i, (name, layout)) in layouts.iter().enumerate() {
            write_tile(&store, &format!("/{}", name), &[triangle(i as f64)], *layout).await;
        }
        (temp_dir, store)
    }

    #[test]
    fn test_node_path() {
        assert_eq!(node_path(""), "/");
        assert_eq!(node_path("/"), "/");
        assert_eq!(node_path("shapes/sample/"), "/shapes/sample");
        assert_eq!(join_path("/", "0_1.zarr"), "/0_1.zarr");
        assert_eq!(join_path("/a", "buffer"), "/a/buffer");
    }

    #[tokio::test]
    async fn test_open_lists_tiles() {
        let (_dir, store) =
            tiled_store(&[("0_0.zarr", Layout::Complete), ("1_0.zarr", Layout::Complete)]).await;

        let fetcher = ZarrTileFetcher::open(store, "").await.unwrap();
        assert_eq!(fetcher.len(), 2);
        assert!(fetcher.exists(TileId::new(1, 0)).await.unwrap());
        assert!(!fetcher.exists(TileId::new(0, 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_tile_fragment() {
        let (_dir, store) = tiled_store(&[("2_3.zarr", Layout::Complete)]).await;
        let fetcher = ZarrTileFetcher::open(store, "/").await.unwrap();

        let fragment = fetcher.fetch(TileId::new(2, 3)).await.unwrap();
        assert_eq!(fragment.num_coords(), 3);
        assert_eq!(fragment.ring_offsets(), &[0, 3]);
        assert_eq!(fragment.coordinates()[[1, 0]], 1.0);
    }

    #[tokio::test]
    async fn test_missing_offsets_is_corrupt() {
        let (_dir, store) = tiled_store(&[("4_5.zarr", Layout::MissingOffsets)]).await;
        let fetcher = ZarrTileFetcher::open(store, "").await.unwrap();

        let err = fetcher.fetch(TileId::new(4, 5)).await.unwrap_err();
        match err {
            TileError::CorruptTileLayout { tile, reason } => {
                assert_eq!(tile, TileId::new(4, 5));
                assert!(reason.contains("offsets"), "{}", reason);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_offsets_of_wrong_kind_is_corrupt() {
        let (_dir, store) = tiled_store(&[("0_0.zarr", Layout::OffsetsAsGroup)]).await;
        let fetcher = ZarrTileFetcher::open(store, "").await.unwrap();

        let err = fetcher.fetch(TileId::new(0, 0)).await.unwrap_err();
        assert!(matches!(err, TileError::CorruptTileLayout { .. }));
    }

    #[tokio::test]
    async fn test_absent_group_is_corrupt() {
        let (_dir, store) = tiled_store(&[("0_0.zarr", Layout::Complete)]).await;
        let fetcher = ZarrTileFetcher::open(store, "").await.unwrap();

        let err = fetcher.fetch(TileId::new(7, 7)).await.unwrap_err();
        assert!(matches!(err, TileError::CorruptTileLayout { tile, .. } if tile == TileId::new(7, 7)));
    }

    #[tokio::test]
    async fn test_array_member_is_corrupt() {
        let (_dir, store) = tiled_store(&[("0_0.zarr", Layout::Complete), ("1_1.zarr", Layout::BareArray)]).await;

        let err = ZarrTileFetcher::open(store, "").await.err().unwrap();
        assert!(matches!(err, TileError::CorruptTileLayout { tile, .. } if tile == TileId::new(1, 1)));
    }

    #[tokio::test]
    async fn test_malformed_member_name() {
        let (_dir, store) = tiled_store(&[("0_0.zarr", Layout::Complete), ("extra", Layout::Complete)]).await;

        let err = ZarrTileFetcher::open(store, "").await.err().unwrap();
        assert!(matches!(err, TileError::MalformedTileName(ref name) if name == "extra"));
    }

    #[tokio::test]
    async fn test_read_whole_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = local_store(&temp_dir);
        write_tile(&store, "/", &[triangle(0.0), triangle(5.0)], Layout::Complete).await;

        let merged = ZarrTileFetcher::read_whole_store(store, "").await.unwrap();
        assert_eq!(merged.num_coords(), 6);
        assert_eq!(merged.ring_offsets(), &[0, 3, 6]);
        assert_eq!(merged.geometry_offsets(), &[0, 1]);
    }
}
