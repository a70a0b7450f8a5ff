//! Key/value headers as produced by a [`HeaderSource`].
//!
//! Both the abbreviated tag maps handed to [`crate::series::Series::register`]
//! and the full per-file headers read while sorting are plain maps from a
//! DICOM keyword (e.g. `"SliceLocation"`) to a [`TagValue`]. A missing field
//! is an ordinary condition, never an error.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::Array3;

use crate::error::SeriesError;

pub const SLICE_LOCATION: &str = "SliceLocation";
pub const IMAGE_POSITION_PATIENT: &str = "ImagePositionPatient";
pub const TRIGGER_TIME: &str = "TriggerTime";
pub const RESCALE_SLOPE: &str = "RescaleSlope";
pub const RESCALE_INTERCEPT: &str = "RescaleIntercept";
pub const SLICE_THICKNESS: &str = "SliceThickness";

pub type TagMap = BTreeMap<String, TagValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Int(i64),
    Float(f64),
    Floats(Vec<f64>),
    Text(String),
}

impl TagValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TagValue::Int(value) => Some(*value as f64),
            TagValue::Float(value) => Some(*value),
            TagValue::Floats(values) if values.len() == 1 => Some(values[0]),
            TagValue::Floats(_) => None,
            TagValue::Text(text) => text.trim().parse().ok(),
        }
    }

    /// Integer coercion, truncating fractional values toward zero
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(value) => Some(*value),
            TagValue::Text(text) => {
                let text = text.trim();
                text.parse()
                    .ok()
                    .or_else(|| text.parse::<f64>().ok().map(|v| v as i64))
            }
            _ => self.as_f64().map(|v| v as i64),
        }
    }

    /// Multi-valued coercion; DICOM text values use `\` as separator
    pub fn as_floats(&self) -> Option<Vec<f64>> {
        match self {
            TagValue::Floats(values) => Some(values.clone()),
            TagValue::Text(text) => text
                .split('\\')
                .map(|part| part.trim().parse().ok())
                .collect(),
            TagValue::Int(_) | TagValue::Float(_) => self.as_f64().map(|v| vec![v]),
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Int(value) => write!(f, "{value}"),
            TagValue::Float(value) => write!(f, "{value}"),
            TagValue::Floats(values) => {
                let parts: Vec<String> = values.iter().map(f64::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            TagValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::Int(value)
    }
}

impl From<i32> for TagValue {
    fn from(value: i32) -> Self {
        TagValue::Int(value.into())
    }
}

impl From<usize> for TagValue {
    fn from(value: usize) -> Self {
        TagValue::Int(value as i64)
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::Float(value)
    }
}

impl From<Vec<f64>> for TagValue {
    fn from(values: Vec<f64>) -> Self {
        TagValue::Floats(values)
    }
}

impl From<&str> for TagValue {
    fn from(text: &str) -> Self {
        TagValue::Text(text.to_owned())
    }
}

impl From<String> for TagValue {
    fn from(text: String) -> Self {
        TagValue::Text(text)
    }
}

/// Full header of one file: its tags plus the stored (un-rescaled) frames.
#[derive(Debug, Clone, Default)]
pub struct Header {
    tags: TagMap,
    pixels: Option<Arc<Array3<i16>>>,
}

impl Header {
    pub fn new(tags: TagMap) -> Self {
        Self { tags, pixels: None }
    }

    /// Attach stored pixel data, frame-first `(frames, rows, columns)`
    pub fn with_pixels(mut self, pixels: Array3<i16>) -> Self {
        self.pixels = Some(Arc::new(pixels));
        self
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.tags.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<TagValue>) {
        self.tags.insert(name.into(), value.into());
    }

    pub fn pixels(&self) -> Option<&Arc<Array3<i16>>> {
        self.pixels.as_ref()
    }

    pub fn slice_location(&self) -> Option<f64> {
        self.get(SLICE_LOCATION)?.as_f64()
    }

    pub fn image_position(&self) -> Option<[f64; 3]> {
        let position = self.get(IMAGE_POSITION_PATIENT)?.as_floats()?;
        match position.as_slice() {
            [x, y, z] => Some([*x, *y, *z]),
            _ => None,
        }
    }

    pub fn rescale_slope(&self) -> f64 {
        self.get(RESCALE_SLOPE)
            .and_then(TagValue::as_f64)
            .unwrap_or(1.0)
    }

    pub fn rescale_intercept(&self) -> f64 {
        self.get(RESCALE_INTERCEPT)
            .and_then(TagValue::as_f64)
            .unwrap_or(0.0)
    }
}

/// Reads the full header of a registered file.
pub trait HeaderSource {
    fn read_header(&self, path: &Path) -> Result<Header, SeriesError>;
}

impl<S: HeaderSource + ?Sized> HeaderSource for &S {
    fn read_header(&self, path: &Path) -> Result<Header, SeriesError> {
        (**self).read_header(path)
    }
}

impl<S: HeaderSource + ?Sized> HeaderSource for Arc<S> {
    fn read_header(&self, path: &Path) -> Result<Header, SeriesError> {
        (**self).read_header(path)
    }
}

/// Headers held in memory, keyed by path.
impl HeaderSource for HashMap<PathBuf, Header> {
    fn read_header(&self, path: &Path) -> Result<Header, SeriesError> {
        self.get(path)
            .cloned()
            .ok_or_else(|| SeriesError::InvalidPath(path.to_path_buf()))
    }
}
