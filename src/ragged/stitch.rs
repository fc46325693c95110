//! Merge per-tile ragged fragments into one rebased ragged array.

use super::array::{MergedRagged, RaggedFragment};
use ndarray::Array2;

/// Running state of the stitch fold.
#[derive(Debug, Default)]
struct Stitch {
    /// Flattened `(x, y)` pairs merged so far
    buffer: Vec<f64>,

    /// Ring offsets rebased onto `buffer`
    ring_offsets: Vec<i64>,

    /// Coordinate pairs merged so far
    count: i64,
}

impl Stitch {
    fn from_merged(merged: MergedRagged) -> Self {
        let count = merged.coordinates.nrows() as i64;
        Self {
            buffer: merged.coordinates.iter().copied().collect(),
            ring_offsets: merged.ring_offsets,
            count,
        }
    }

    /// Append one fragment, shifting its offsets by the coordinates already merged.
    fn push(mut self, fragment: &RaggedFragment) -> Self {
        self.buffer.extend(fragment.coordinates().iter().copied());

        // The leading zero of every fragment after the first coincides with
        // the previous fragment's closing offset.
        let skip = usize::from(!self.ring_offsets.is_empty());
        let shift = self.count;
        self.ring_offsets
            .extend(fragment.ring_offsets().iter().skip(skip).map(|o| o + shift));

        self.count += fragment.num_coords() as i64;
        self
    }

    fn finish(self) -> MergedRagged {
        let rows = self.count as usize;
        let coordinates = Array2::from_shape_vec((rows, 2), self.buffer)
            .expect("buffer holds exactly two values per merged coordinate");

        // One ring per geometry.
        let ring_count = self.ring_offsets.len().saturating_sub(1) as i64;
        let geometry_offsets = (0..ring_count).collect();

        MergedRagged {
            coordinates,
            ring_offsets: self.ring_offsets,
            geometry_offsets,
        }
    }
}

/// Stitch fragments in the order given.
///
/// The merged geometry order follows the fragment order, so callers wanting
/// stable output must pass fragments in a stable order (the readers sort by
/// tile id). No fragments yields [`MergedRagged::empty`].
pub fn stitch<I>(fragments: I) -> MergedRagged
where
    I: IntoIterator<Item = RaggedFragment>,
{
    fragments
        .into_iter()
        .fold(Stitch::default(), |acc, fragment| acc.push(&fragment))
        .finish()
}

impl MergedRagged {
    /// Append one more fragment, rebasing it after the current contents.
    ///
    /// `stitch([a, b]).append(c)` equals `stitch([a, b, c])`.
    pub fn append(self, fragment: &RaggedFragment) -> MergedRagged {
        Stitch::from_merged(self).push(fragment).finish()
    }
}
