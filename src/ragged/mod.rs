//! Ragged polygon arrays: per-tile fragments, stitching and decoding.
//!
//! A ragged array is a flat `(n, 2)` coordinate buffer plus offset arrays
//! delimiting rings and geometries. Tiles each hold one fragment; a query
//! stitches the fragments of its tiles into a [`MergedRagged`] whose ring
//! offsets are rebased onto the merged buffer.
//!
//! Stitching assumes one ring per geometry: fragments carry ring offsets
//! only, so the merged geometry offsets are `0..ring_count`. Multi-ring
//! polygons only survive through [`MergedRagged::from_parts`].

mod array;
mod reconstruct;
mod stitch;

pub use array::{MergedRagged, RaggedFragment};
pub use reconstruct::reconstruct;
pub use stitch::stitch;
