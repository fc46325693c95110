//! Ragged polygon arrays: one tile's fragment and the merged result of a query.

use crate::error::{Result, TileError};
use geo_types::{Coord, LineString, Polygon};
use ndarray::{s, Array2, ArrayView2};

/// One tile's partial geometry encoding.
///
/// `coordinates` is an `(n, 2)` buffer of `(x, y)` pairs; `ring_offsets`
/// delimits rings within it. Offsets start at 0, never decrease and end at
/// `n`. Each ring is one polygon.
#[derive(Debug, Clone, PartialEq)]
pub struct RaggedFragment {
    coordinates: Array2<f64>,
    ring_offsets: Vec<i64>,
}

impl RaggedFragment {
    /// Build a fragment, checking the offsets against the buffer.
    pub fn new(coordinates: Array2<f64>, ring_offsets: Vec<i64>) -> Result<Self> {
        check_pair_columns(coordinates.view())?;
        validate_offsets(&ring_offsets, coordinates.nrows())?;
        Ok(Self {
            coordinates,
            ring_offsets,
        })
    }

    /// Build a fragment from coordinate pairs.
    pub fn from_pairs(pairs: &[[f64; 2]], ring_offsets: Vec<i64>) -> Result<Self> {
        let flat: Vec<f64> = pairs.iter().flatten().copied().collect();
        let coordinates = Array2::from_shape_vec((pairs.len(), 2), flat)
            .map_err(|e| TileError::MalformedRaggedArray(e.to_string()))?;
        Self::new(coordinates, ring_offsets)
    }

    /// The `(n, 2)` coordinate buffer.
    pub fn coordinates(&self) -> ArrayView2<'_, f64> {
        self.coordinates.view()
    }

    pub fn ring_offsets(&self) -> &[i64] {
        &self.ring_offsets
    }

    /// Number of coordinate pairs.
    pub fn num_coords(&self) -> usize {
        self.coordinates.nrows()
    }

    /// Number of rings (and so polygons) in this fragment.
    pub fn num_rings(&self) -> usize {
        self.ring_offsets.len().saturating_sub(1)
    }

    /// Decode this fragment alone, one single-ring polygon per ring.
    pub fn polygons(&self) -> Vec<Polygon<f64>> {
        self.ring_offsets
            .windows(2)
            .map(|w| {
                let ring = ring_slice(self.coordinates.view(), w[0] as usize, w[1] as usize);
                Polygon::new(ring, Vec::new())
            })
            .collect()
    }
}

/// Ragged array spanning every tile selected by a query.
///
/// `geometry_offsets[g]` is the index of geometry `g`'s first ring; its rings
/// run up to the next geometry's first ring (or the last ring).
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRagged {
    pub(crate) coordinates: Array2<f64>,
    pub(crate) ring_offsets: Vec<i64>,
    pub(crate) geometry_offsets: Vec<i64>,
}

impl MergedRagged {
    /// The result of a query that matched no tiles.
    pub fn empty() -> Self {
        Self {
            coordinates: Array2::zeros((0, 2)),
            ring_offsets: Vec::new(),
            geometry_offsets: Vec::new(),
        }
    }

    /// Assemble from raw parts.
    ///
    /// Only the buffer shape is checked here;
    /// [`reconstruct`](crate::ragged::reconstruct) checks the offsets.
    pub fn from_parts(
        coordinates: Array2<f64>,
        ring_offsets: Vec<i64>,
        geometry_offsets: Vec<i64>,
    ) -> Result<Self> {
        check_pair_columns(coordinates.view())?;
        Ok(Self {
            coordinates,
            ring_offsets,
            geometry_offsets,
        })
    }

    pub fn coordinates(&self) -> ArrayView2<'_, f64> {
        self.coordinates.view()
    }

    pub fn ring_offsets(&self) -> &[i64] {
        &self.ring_offsets
    }

    pub fn geometry_offsets(&self) -> &[i64] {
        &self.geometry_offsets
    }

    pub fn num_coords(&self) -> usize {
        self.coordinates.nrows()
    }

    pub fn num_geometries(&self) -> usize {
        self.geometry_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometry_offsets.is_empty() && self.coordinates.nrows() == 0
    }
}

impl From<RaggedFragment> for MergedRagged {
    fn from(fragment: RaggedFragment) -> Self {
        let geometry_offsets = (0..fragment.num_rings() as i64).collect();
        Self {
            coordinates: fragment.coordinates,
            ring_offsets: fragment.ring_offsets,
            geometry_offsets,
        }
    }
}

/// Check fragment offsets: start at 0, non-decreasing, end at `len`.
///
/// An empty buffer may carry no offsets at all.
fn validate_offsets(offsets: &[i64], len: usize) -> Result<()> {
    let (Some(&first), Some(&last)) = (offsets.first(), offsets.last()) else {
        if len == 0 {
            return Ok(());
        }
        return Err(TileError::MalformedRaggedArray(format!(
            "no ring offsets for {} coordinates",
            len
        )));
    };

    if first != 0 {
        return Err(TileError::MalformedRaggedArray(format!(
            "ring offsets must start at 0, got {}",
            first
        )));
    }
    if let Some(w) = offsets.windows(2).find(|w| w[1] < w[0]) {
        return Err(TileError::MalformedRaggedArray(format!(
            "ring offsets decrease from {} to {}",
            w[0], w[1]
        )));
    }
    if last != len as i64 {
        return Err(TileError::MalformedRaggedArray(format!(
            "last ring offset {} does not match {} coordinates",
            last, len
        )));
    }
    Ok(())
}

/// Coordinate buffers hold `(x, y)` pairs, one per row.
pub(crate) fn check_pair_columns(coordinates: ArrayView2<'_, f64>) -> Result<()> {
    if coordinates.ncols() != 2 {
        return Err(TileError::MalformedRaggedArray(format!(
            "coordinate buffer must have 2 columns, got shape {:?}",
            coordinates.shape()
        )));
    }
    Ok(())
}

pub(crate) fn ring_slice(coordinates: ArrayView2<'_, f64>, start: usize, end: usize) -> LineString<f64> {
    coordinates
        .slice(s![start..end, ..])
        .rows()
        .into_iter()
        .map(|row| Coord { x: row[0], y: row[1] })
        .collect()
}
