//! Normalize user-supplied 2-axis query indices.

use crate::error::{Result, TileError};
use std::fmt;
use std::str::FromStr;

/// Range selection over one axis of the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AxisRange {
    /// No restriction on this axis.
    #[default]
    Entire,

    /// Half-open interval `[start, stop)` in layer units.
    ///
    /// A missing start means 0, a missing stop means the axis extent.
    Bounded {
        start: Option<u64>,
        stop: Option<u64>,
    },
}

impl AxisRange {
    /// `[start, stop)` with both ends given.
    pub fn new(start: u64, stop: u64) -> Self {
        Self::Bounded {
            start: Some(start),
            stop: Some(stop),
        }
    }

    /// `[0, stop)`.
    pub fn to(stop: u64) -> Self {
        Self::Bounded {
            start: None,
            stop: Some(stop),
        }
    }

    /// `[start, extent)`.
    pub fn starting_at(start: u64) -> Self {
        Self::Bounded {
            start: Some(start),
            stop: None,
        }
    }

    /// Resolve defaults against the axis extent, returning `(start, stop)`.
    pub fn resolve(&self, extent: u64) -> (u64, u64) {
        match *self {
            Self::Entire => (0, extent),
            Self::Bounded { start, stop } => (start.unwrap_or(0), stop.unwrap_or(extent)),
        }
    }
}

impl fmt::Display for AxisRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entire => write!(f, "..."),
            Self::Bounded { start, stop } => {
                if let Some(start) = start {
                    write!(f, "{}", start)?;
                }
                write!(f, ":")?;
                if let Some(stop) = stop {
                    write!(f, "{}", stop)?;
                }
                Ok(())
            }
        }
    }
}

/// Parses slice notation: `"25:45"`, `":45"`, `"25:"`, `":"` or `"..."`.
impl FromStr for AxisRange {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "..." {
            return Ok(Self::Entire);
        }

        let (start, stop) = s
            .split_once(':')
            .ok_or_else(|| TileError::MalformedIndex(format!("str {:?}", s)))?;

        let parse = |part: &str| -> Result<Option<u64>> {
            let part = part.trim();
            if part.is_empty() {
                return Ok(None);
            }
            part.parse::<u64>()
                .map(Some)
                .map_err(|_| TileError::MalformedIndex(format!("str {:?}", s)))
        };

        Ok(Self::Bounded {
            start: parse(start)?,
            stop: parse(stop)?,
        })
    }
}

/// One element of a tuple index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexItem {
    Range(AxisRange),
    Ellipsis,
    /// A single integer position; tiles are only addressable by range.
    Scalar(i64),
}

impl IndexItem {
    fn into_axis_range(self) -> Result<AxisRange> {
        match self {
            Self::Range(range) => Ok(range),
            Self::Ellipsis => Ok(AxisRange::Entire),
            Self::Scalar(_) => Err(TileError::MalformedIndex("int".to_string())),
        }
    }
}

impl From<AxisRange> for IndexItem {
    fn from(range: AxisRange) -> Self {
        Self::Range(range)
    }
}

/// A query index as accepted at the public boundary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryIndex {
    /// No index at all: the whole layer.
    #[default]
    None,

    /// The whole-axis sentinel on its own.
    Ellipsis,

    /// A bare range, applied to axis 0.
    Axis(AxisRange),

    /// A tuple of per-axis elements.
    Tuple(Vec<IndexItem>),
}

impl From<()> for QueryIndex {
    fn from(_: ()) -> Self {
        Self::Tuple(Vec::new())
    }
}

impl From<AxisRange> for QueryIndex {
    fn from(range: AxisRange) -> Self {
        Self::Axis(range)
    }
}

impl From<(AxisRange,)> for QueryIndex {
    fn from((x,): (AxisRange,)) -> Self {
        Self::Tuple(vec![x.into()])
    }
}

impl From<(AxisRange, AxisRange)> for QueryIndex {
    fn from((x, y): (AxisRange, AxisRange)) -> Self {
        Self::Tuple(vec![x.into(), y.into()])
    }
}

impl<T: Into<QueryIndex>> From<Option<T>> for QueryIndex {
    fn from(index: Option<T>) -> Self {
        index.map(Into::into).unwrap_or(Self::None)
    }
}

/// Turn a query index into one canonical range per axis.
pub fn normalize(index: &QueryIndex) -> Result<(AxisRange, AxisRange)> {
    match index {
        QueryIndex::Tuple(items) => match items.as_slice() {
            [x, y] => Ok((x.into_axis_range()?, y.into_axis_range()?)),
            [x] => Ok((x.into_axis_range()?, AxisRange::Entire)),
            [] => Ok((AxisRange::Entire, AxisRange::Entire)),
            _ => Err(TileError::MalformedIndex(format!(
                "tuple of length {}",
                items.len()
            ))),
        },
        QueryIndex::Axis(range) => Ok((*range, AxisRange::Entire)),
        QueryIndex::None | QueryIndex::Ellipsis => Ok((AxisRange::Entire, AxisRange::Entire)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_passthrough() {
        let index = QueryIndex::from((AxisRange::new(25, 45), AxisRange::to(10)));
        let (x, y) = normalize(&index).unwrap();
        assert_eq!(x, AxisRange::new(25, 45));
        assert_eq!(y, AxisRange::to(10));
    }

    #[test]
    fn test_single_pads_second_axis() {
        let (x, y) = normalize(&(AxisRange::starting_at(5),).into()).unwrap();
        assert_eq!(x, AxisRange::starting_at(5));
        assert_eq!(y, AxisRange::Entire);

        let (x, y) = normalize(&AxisRange::new(1, 2).into()).unwrap();
        assert_eq!(x, AxisRange::new(1, 2));
        assert_eq!(y, AxisRange::Entire);
    }

    #[test]
    fn test_empty_none_and_ellipsis_select_everything() {
        for index in [QueryIndex::from(()), QueryIndex::None, QueryIndex::Ellipsis] {
            assert_eq!(
                normalize(&index).unwrap(),
                (AxisRange::Entire, AxisRange::Entire)
            );
        }
        let absent: Option<AxisRange> = None;
        assert_eq!(QueryIndex::from(absent), QueryIndex::None);
    }

    #[test]
    fn test_ellipsis_inside_tuple() {
        let index = QueryIndex::Tuple(vec![IndexItem::Range(AxisRange::to(50)), IndexItem::Ellipsis]);
        let (x, y) = normalize(&index).unwrap();
        assert_eq!(x, AxisRange::to(50));
        assert_eq!(y, AxisRange::Entire);
    }

    #[test]
    fn test_malformed_indices() {
        let too_long = QueryIndex::Tuple(vec![IndexItem::Ellipsis; 3]);
        let err = normalize(&too_long).unwrap_err();
        assert!(matches!(err, TileError::MalformedIndex(ref m) if m.contains("length 3")));

        let scalar = QueryIndex::Tuple(vec![IndexItem::Scalar(4), IndexItem::Ellipsis]);
        let err = normalize(&scalar).unwrap_err();
        assert!(matches!(err, TileError::MalformedIndex(ref m) if m == "int"));
    }

    #[test]
    fn test_parse_slice_notation() {
        assert_eq!("25:45".parse::<AxisRange>().unwrap(), AxisRange::new(25, 45));
        assert_eq!(":45".parse::<AxisRange>().unwrap(), AxisRange::to(45));
        assert_eq!("25:".parse::<AxisRange>().unwrap(), AxisRange::starting_at(25));
        assert_eq!(
            ":".parse::<AxisRange>().unwrap(),
            AxisRange::Bounded { start: None, stop: None }
        );
        assert_eq!("...".parse::<AxisRange>().unwrap(), AxisRange::Entire);

        assert!("25".parse::<AxisRange>().is_err());
        assert!("a:b".parse::<AxisRange>().is_err());
        assert!("-1:4".parse::<AxisRange>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for range in [AxisRange::new(3, 9), AxisRange::to(9), AxisRange::starting_at(3), AxisRange::Entire] {
            assert_eq!(range.to_string().parse::<AxisRange>().unwrap(), range);
        }
    }

    #[test]
    fn test_resolve_defaults() {
        assert_eq!(AxisRange::Entire.resolve(100), (0, 100));
        assert_eq!(AxisRange::to(40).resolve(100), (0, 40));
        assert_eq!(AxisRange::starting_at(40).resolve(100), (40, 100));
    }
}
