//! Acquisition level statistics derived from a whole series.

use crate::{
    error::SeriesError,
    header::{Header, TagMap, TagValue},
};

use std::{collections::BTreeSet, fmt};
use tracing::{debug, warn};

pub const DEFAULT_TIMESTEP_TAG: &str = crate::header::TRIGGER_TIME;

/// Distance between the first two sorted slices.
///
/// Uses the z component of ImagePositionPatient when both slices carry it,
/// otherwise the difference of their SliceLocation values.
///
/// # Errors
///
/// [`SeriesError::NotEnoughSlices`] with fewer than two headers,
/// [`SeriesError::MissingSpacing`] when neither attribute is usable
pub fn slice_spacing(headers: &[Header]) -> Result<f64, SeriesError> {
    let [first, second, ..] = headers else {
        return Err(SeriesError::NotEnoughSlices {
            found: headers.len(),
        });
    };

    if let (Some(a), Some(b)) = (first.image_position(), second.image_position()) {
        let spacing = (a[2] - b[2]).abs();
        debug!(spacing, "slice spacing from image position");
        return Ok(spacing);
    }

    match (first.slice_location(), second.slice_location()) {
        (Some(a), Some(b)) => {
            let spacing = (a - b).abs();
            debug!(spacing, "slice spacing from slice location");
            Ok(spacing)
        }
        _ => Err(SeriesError::MissingSpacing),
    }
}

/// Temporal sampling of a dynamic series.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimestepSpec {
    pub start: i64,
    pub interval: f64,
    pub count: usize,
}

impl fmt::Display for TimestepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "start: {}, interval: {}, # Steps: {}",
            self.start, self.interval as i64, self.count
        )
    }
}

/// Derive the timestep spec from the `tag` values of every tag map.
///
/// A map without the tag counts as time 0. Values are truncated to
/// integers and deduplicated; the interval is the mean gap between
/// consecutive distinct times.
///
/// A single distinct nonzero time yields interval 0 and count 1. Counting
/// that time twice (count 2) is the other reading; the distinct count is
/// reported here.
pub fn timestep_spec(tag_maps: &[TagMap], tag: &str) -> TimestepSpec {
    let times: BTreeSet<i64> = tag_maps
        .iter()
        .map(|tags| match tags.get(tag) {
            None => 0,
            Some(value) => value.as_int().unwrap_or_else(|| {
                warn!(tag, %value, "ignoring non-numeric timestep value");
                0
            }),
        })
        .collect();

    let times: Vec<i64> = times.into_iter().collect();
    match times.as_slice() {
        [] | [0] => TimestepSpec::default(),
        [only] => TimestepSpec {
            start: *only,
            interval: 0.0,
            count: 1,
        },
        [first, .., last] => TimestepSpec {
            start: *first,
            interval: (*last as f64 - *first as f64) / (times.len() - 1) as f64,
            count: times.len(),
        },
    }
}

/// Fallback values for tag names a slice header lacks.
pub fn extra_tag_values(registered: usize, spec: TimestepSpec) -> TagMap {
    TagMap::from([
        ("NumImages".to_owned(), TagValue::from(registered)),
        ("TimestepSpec".to_owned(), TagValue::Text(spec.to_string())),
        ("StartTime".to_owned(), TagValue::Int(spec.start)),
        ("NumTimesteps".to_owned(), TagValue::from(spec.count)),
        ("TimeInterval".to_owned(), TagValue::Float(spec.interval)),
    ])
}
