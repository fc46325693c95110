//! Decode a merged ragged array into polygons.

use super::array::{check_pair_columns, ring_slice, MergedRagged};
use crate::error::{Result, TileError};
use geo_types::Polygon;
use rayon::prelude::*;

/// Decode `merged` into one polygon per geometry offset.
///
/// A geometry's first ring is its exterior; any further rings in its range
/// become interiors.
pub fn reconstruct(merged: &MergedRagged) -> Result<Vec<Polygon<f64>>> {
    check_pair_columns(merged.coordinates())?;
    let num_coords = merged.num_coords();
    let ring_offsets = checked_offsets(merged.ring_offsets(), num_coords, "ring")?;
    let ring_count = ring_offsets.len().saturating_sub(1);
    let geometry_offsets = checked_offsets(merged.geometry_offsets(), ring_count, "geometry")?;

    if let Some(w) = geometry_offsets.windows(2).find(|w| w[1] <= w[0]) {
        return Err(TileError::MalformedRaggedArray(format!(
            "geometry offsets must be strictly increasing, got {} then {}",
            w[0], w[1]
        )));
    }
    match geometry_offsets.first() {
        Some(&first) if first != 0 => {
            return Err(TileError::MalformedRaggedArray(format!(
                "geometry offsets must start at 0, got {}",
                first
            )));
        }
        Some(_) if geometry_offsets.last() == Some(&ring_count) => {
            return Err(TileError::MalformedRaggedArray(format!(
                "last geometry starts past the final ring ({})",
                ring_count
            )));
        }
        _ => {}
    }

    let coordinates = merged.coordinates();
    let polygons = (0..geometry_offsets.len())
        .into_par_iter()
        .map(|g| {
            let first_ring = geometry_offsets[g];
            let end_ring = geometry_offsets.get(g + 1).copied().unwrap_or(ring_count);
            let ring = |r: usize| ring_slice(coordinates, ring_offsets[r], ring_offsets[r + 1]);

            // Strictly increasing offsets guarantee first_ring < end_ring.
            let exterior = ring(first_ring);
            let interiors = (first_ring + 1..end_ring).map(ring).collect();
            Polygon::new(exterior, interiors)
        })
        .collect();

    Ok(polygons)
}

/// Convert offsets to indices, checking bounds and monotonicity.
fn checked_offsets(offsets: &[i64], bound: usize, kind: &str) -> Result<Vec<usize>> {
    let mut previous = 0usize;
    offsets
        .iter()
        .map(|&offset| {
            let index = usize::try_from(offset)
                .ok()
                .filter(|&i| i <= bound)
                .ok_or_else(|| {
                    TileError::MalformedRaggedArray(format!(
                        "{} offset {} out of bounds 0..={}",
                        kind, offset, bound
                    ))
                })?;
            if index < previous {
                return Err(TileError::MalformedRaggedArray(format!(
                    "{} offsets decrease from {} to {}",
                    kind, previous, index
                )));
            }
            previous = index;
            Ok(index)
        })
        .collect()
}
