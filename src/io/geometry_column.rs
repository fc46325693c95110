//! Decode the `geometry` column of columnar tiles into polygons.
//!
//! Two encodings are understood:
//!
//! - **WKB**: a binary column of well-known-binary Polygon or MultiPolygon
//!   values (ISO Z/M variants are read, extra dimensions dropped).
//! - **GeoArrow**: the native polygon layout, `List<List<coordinate>>` where a
//!   coordinate is either `Struct<x, y>` (separated) or
//!   `FixedSizeList<f64, 2..4>` (interleaved).

use crate::error::{Result, TileError};
use arrow::array::{
    Array, ArrayRef, BinaryArray, FixedSizeListArray, Float64Array, LargeBinaryArray,
    LargeListArray, ListArray, StructArray,
};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use geo_types::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// How the `geometry` column of a columnar tile is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryEncoding {
    #[serde(alias = "WKB")]
    Wkb,
    #[serde(alias = "GeoArrow")]
    Geoarrow,
}

const WKB_POLYGON: u32 = 3;
const WKB_MULTI_POLYGON: u32 = 6;

/// Decode every non-null row of the batch's geometry column.
pub fn decode_polygons(batch: &RecordBatch, encoding: GeometryEncoding) -> Result<Vec<Polygon<f64>>> {
    let column = batch.column(find_geometry_column(&batch.schema())?);

    match encoding {
        GeometryEncoding::Wkb => decode_wkb_column(column),
        GeometryEncoding::Geoarrow => decode_geoarrow_column(column),
    }
}

fn find_geometry_column(schema: &SchemaRef) -> Result<usize> {
    for name in ["geometry", "GEOMETRY", "geom"] {
        if let Some((idx, _)) = schema.column_with_name(name) {
            return Ok(idx);
        }
    }
    Err(TileError::MalformedGeometry(
        "no geometry column in batch".to_string(),
    ))
}

fn decode_wkb_column(column: &ArrayRef) -> Result<Vec<Polygon<f64>>> {
    let values: Vec<Option<&[u8]>> = if let Some(arr) = column.as_any().downcast_ref::<BinaryArray>() {
        arr.iter().collect()
    } else if let Some(arr) = column.as_any().downcast_ref::<LargeBinaryArray>() {
        arr.iter().collect()
    } else {
        return Err(TileError::MalformedGeometry(format!(
            "WKB geometry column must be binary, got {}",
            column.data_type()
        )));
    };

    let mut polygons = Vec::with_capacity(values.len());
    for wkb in values.into_iter().flatten() {
        read_wkb(wkb, &mut polygons)?;
    }
    Ok(polygons)
}

/// Append the polygons of one WKB value to `out`.
pub fn read_wkb(wkb: &[u8], out: &mut Vec<Polygon<f64>>) -> Result<()> {
    let mut cursor = Cursor::new(wkb);
    read_wkb_geometry(&mut cursor, out).map_err(|e| match e {
        WkbError::Io(e) => TileError::MalformedGeometry(format!("truncated WKB: {}", e)),
        WkbError::Unsupported(msg) => TileError::MalformedGeometry(msg),
    })
}

enum WkbError {
    Io(std::io::Error),
    Unsupported(String),
}

impl From<std::io::Error> for WkbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

fn read_wkb_geometry(cursor: &mut Cursor<&[u8]>, out: &mut Vec<Polygon<f64>>) -> Result<(), WkbError> {
    match cursor.read_u8()? {
        0 => read_wkb_body::<BigEndian>(cursor, out),
        1 => read_wkb_body::<LittleEndian>(cursor, out),
        other => Err(WkbError::Unsupported(format!("invalid WKB byte order {}", other))),
    }
}

fn read_wkb_body<B: ByteOrder>(cursor: &mut Cursor<&[u8]>, out: &mut Vec<Polygon<f64>>) -> Result<(), WkbError> {
    let code = cursor.read_u32::<B>()?;
    let (kind, dims) = match code / 1000 {
        0 => (code, 2),
        1 | 2 => (code % 1000, 3),
        3 => (code % 1000, 4),
        _ => return Err(WkbError::Unsupported(format!("unsupported WKB type {}", code))),
    };

    match kind {
        WKB_POLYGON => {
            out.push(read_wkb_polygon::<B>(cursor, dims)?);
            Ok(())
        }
        WKB_MULTI_POLYGON => {
            let count = cursor.read_u32::<B>()?;
            for _ in 0..count {
                // Each part carries its own byte order and type header
                read_wkb_geometry(cursor, out)?;
            }
            Ok(())
        }
        _ => Err(WkbError::Unsupported(format!(
            "expected WKB Polygon or MultiPolygon, got type {}",
            code
        ))),
    }
}

fn read_wkb_polygon<B: ByteOrder>(cursor: &mut Cursor<&[u8]>, dims: usize) -> Result<Polygon<f64>, WkbError> {
    let num_rings = cursor.read_u32::<B>()?;
    let mut rings = Vec::with_capacity(num_rings.min(64) as usize);
    for _ in 0..num_rings {
        let num_points = cursor.read_u32::<B>()?;
        let mut coords = Vec::with_capacity(num_points.min(1 << 16) as usize);
        for _ in 0..num_points {
            let x = cursor.read_f64::<B>()?;
            let y = cursor.read_f64::<B>()?;
            for _ in 2..dims {
                cursor.read_f64::<B>()?;
            }
            coords.push(Coord { x, y });
        }
        rings.push(LineString::new(coords));
    }

    let mut rings = rings.into_iter();
    let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
    Ok(Polygon::new(exterior, rings.collect()))
}

fn decode_geoarrow_column(column: &ArrayRef) -> Result<Vec<Polygon<f64>>> {
    let mut polygons = Vec::with_capacity(column.len());
    for rings in list_items(column.as_ref())?.into_iter().flatten() {
        let mut rings = list_items(rings.as_ref())?
            .into_iter()
            .flatten()
            .map(|coords| line_string(coords.as_ref()));

        let exterior = match rings.next() {
            Some(ring) => ring?,
            None => continue,
        };
        polygons.push(Polygon::new(exterior, rings.collect::<Result<Vec<_>>>()?));
    }
    Ok(polygons)
}

/// Per-row child arrays of a list column; `None` for null rows.
fn list_items(array: &dyn Array) -> Result<Vec<Option<ArrayRef>>> {
    if let Some(list) = array.as_any().downcast_ref::<ListArray>() {
        Ok((0..list.len()).map(|i| list.is_valid(i).then(|| list.value(i))).collect())
    } else if let Some(list) = array.as_any().downcast_ref::<LargeListArray>() {
        Ok((0..list.len()).map(|i| list.is_valid(i).then(|| list.value(i))).collect())
    } else {
        Err(TileError::MalformedGeometry(format!(
            "expected a GeoArrow list array, got {}",
            array.data_type()
        )))
    }
}

fn line_string(coords: &dyn Array) -> Result<LineString<f64>> {
    if let Some(separated) = coords.as_any().downcast_ref::<StructArray>() {
        let x = f64_child(separated.column_by_name("x"))?;
        let y = f64_child(separated.column_by_name("y"))?;
        Ok(x.values()
            .iter()
            .zip(y.values().iter())
            .map(|(&x, &y)| Coord { x, y })
            .collect())
    } else if let Some(interleaved) = coords.as_any().downcast_ref::<FixedSizeListArray>() {
        if interleaved.value_length() < 2 {
            return Err(TileError::MalformedGeometry(format!(
                "coordinate list of size {}",
                interleaved.value_length()
            )));
        }
        (0..interleaved.len())
            .map(|i| {
                let xy = interleaved.value(i);
                let xy = f64_child(Some(&xy))?;
                Ok(Coord {
                    x: xy.value(0),
                    y: xy.value(1),
                })
            })
            .collect()
    } else {
        Err(TileError::MalformedGeometry(format!(
            "unsupported GeoArrow coordinate type {}",
            coords.data_type()
        )))
    }
}

fn f64_child(array: Option<&ArrayRef>) -> Result<&Float64Array> {
    array
        .and_then(|a| a.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| TileError::MalformedGeometry("coordinates must be float64".to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use arrow::array::{BinaryArray, Int64Array};
    use arrow::buffer::{OffsetBuffer, ScalarBuffer};
    use arrow::datatypes::{DataType, Field, Schema};
    use byteorder::WriteBytesExt;
    use std::sync::Arc;

    /// Little-endian WKB for a single-ring polygon.
    pub(crate) fn wkb_polygon(ring: &[[f64; 2]]) -> Vec<u8> {
        let mut out = vec![1u8];
        out.write_u32::<LittleEndian>(WKB_POLYGON).unwrap();
        out.write_u32::<LittleEndian>(1).unwrap();
        out.write_u32::<LittleEndian>(ring.len() as u32).unwrap();
        for [x, y] in ring {
            out.write_f64::<LittleEndian>(*x).unwrap();
            out.write_f64::<LittleEndian>(*y).unwrap();
        }
        out
    }

    pub(crate) fn wkb_batch(rings: &[Vec<[f64; 2]>]) -> RecordBatch {
        let wkbs: Vec<Vec<u8>> = rings.iter().map(|r| wkb_polygon(r)).collect();
        let geometry = BinaryArray::from_iter_values(wkbs.iter());
        let ids = Int64Array::from_iter_values(0..rings.len() as i64);
        let schema = Schema::new(vec![
            Field::new("cell_id", DataType::Int64, false),
            Field::new("geometry", DataType::Binary, false),
        ]);
        RecordBatch::try_new(Arc::new(schema), vec![Arc::new(ids), Arc::new(geometry)]).unwrap()
    }

    /// Separated-coordinate GeoArrow polygons, one ring each.
    pub(crate) fn geoarrow_batch(rings: &[Vec<[f64; 2]>]) -> RecordBatch {
        let xs: Vec<f64> = rings.iter().flatten().map(|c| c[0]).collect();
        let ys: Vec<f64> = rings.iter().flatten().map(|c| c[1]).collect();
        let coords = StructArray::from(vec![
            (
                Arc::new(Field::new("x", DataType::Float64, false)),
                Arc::new(Float64Array::from(xs)) as ArrayRef,
            ),
            (
                Arc::new(Field::new("y", DataType::Float64, false)),
                Arc::new(Float64Array::from(ys)) as ArrayRef,
            ),
        ]);

        let mut vertex_offsets = vec![0i32];
        for ring in rings {
            vertex_offsets.push(vertex_offsets.last().unwrap() + ring.len() as i32);
        }
        let ring_list = ListArray::new(
            Arc::new(Field::new("vertices", coords.data_type().clone(), false)),
            OffsetBuffer::new(ScalarBuffer::from(vertex_offsets)),
            Arc::new(coords),
            None,
        );
        let polygon_offsets: Vec<i32> = (0..=rings.len() as i32).collect();
        let polygons = ListArray::new(
            Arc::new(Field::new("rings", ring_list.data_type().clone(), false)),
            OffsetBuffer::new(ScalarBuffer::from(polygon_offsets)),
            Arc::new(ring_list),
            None,
        );

        let schema = Schema::new(vec![Field::new(
            "geometry",
            polygons.data_type().clone(),
            false,
        )]);
        RecordBatch::try_new(Arc::new(schema), vec![Arc::new(polygons)]).unwrap()
    }

    fn square(at: f64) -> Vec<[f64; 2]> {
        vec![[at, at], [at + 1.0, at], [at + 1.0, at + 1.0], [at, at + 1.0], [at, at]]
    }

    #[test]
    fn test_decode_wkb() {
        let batch = wkb_batch(&[square(0.0), square(3.0)]);
        let polygons = decode_polygons(&batch, GeometryEncoding::Wkb).unwrap();

        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[1].exterior().0[0], Coord { x: 3.0, y: 3.0 });
        assert_eq!(polygons[0].exterior().0.len(), 5);
    }

    #[test]
    fn test_decode_big_endian_multipolygon_with_z() {
        let mut wkb = vec![0u8];
        wkb.write_u32::<BigEndian>(WKB_MULTI_POLYGON).unwrap();
        wkb.write_u32::<BigEndian>(2).unwrap();
        for at in [0.0, 10.0] {
            wkb.push(0);
            wkb.write_u32::<BigEndian>(1000 + WKB_POLYGON).unwrap();
            wkb.write_u32::<BigEndian>(1).unwrap();
            wkb.write_u32::<BigEndian>(4).unwrap();
            for [x, y] in [[at, at], [at + 1.0, at], [at, at + 1.0], [at, at]] {
                wkb.write_f64::<BigEndian>(x).unwrap();
                wkb.write_f64::<BigEndian>(y).unwrap();
                wkb.write_f64::<BigEndian>(99.0).unwrap();
            }
        }

        let mut polygons = Vec::new();
        read_wkb(&wkb, &mut polygons).unwrap();
        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[1].exterior().0[1], Coord { x: 11.0, y: 10.0 });
    }

    #[test]
    fn test_truncated_wkb() {
        let wkb = wkb_polygon(&square(0.0));
        let mut polygons = Vec::new();
        let err = read_wkb(&wkb[..wkb.len() - 4], &mut polygons).unwrap_err();
        assert!(matches!(err, TileError::MalformedGeometry(ref m) if m.contains("truncated")));
    }

    #[test]
    fn test_wkb_point_rejected() {
        let mut wkb = vec![1u8];
        wkb.write_u32::<LittleEndian>(1).unwrap();
        wkb.write_f64::<LittleEndian>(0.0).unwrap();
        wkb.write_f64::<LittleEndian>(0.0).unwrap();
        assert!(read_wkb(&wkb, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_decode_geoarrow() {
        let batch = geoarrow_batch(&[square(0.0), square(5.0)]);
        let polygons = decode_polygons(&batch, GeometryEncoding::Geoarrow).unwrap();

        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[1].exterior().0[2], Coord { x: 6.0, y: 6.0 });
    }

    #[test]
    fn test_encoding_mismatch() {
        let batch = geoarrow_batch(&[square(0.0)]);
        assert!(decode_polygons(&batch, GeometryEncoding::Wkb).is_err());

        let batch = wkb_batch(&[square(0.0)]);
        assert!(decode_polygons(&batch, GeometryEncoding::Geoarrow).is_err());
    }

    #[test]
    fn test_missing_geometry_column() {
        let schema = Schema::new(vec![Field::new("id", DataType::Int64, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(Int64Array::from(vec![1, 2]))],
        )
        .unwrap();
        assert!(matches!(
            decode_polygons(&batch, GeometryEncoding::Wkb),
            Err(TileError::MalformedGeometry(_))
        ));
    }

    #[test]
    fn test_encoding_serde() {
        let enc: GeometryEncoding = serde_json::from_str("\"WKB\"").unwrap();
        assert_eq!(enc, GeometryEncoding::Wkb);
        let enc: GeometryEncoding = serde_json::from_str("\"geoarrow\"").unwrap();
        assert_eq!(enc, GeometryEncoding::Geoarrow);
    }
}
