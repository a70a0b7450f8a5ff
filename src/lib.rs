//! # DICOM-series library
//!
//! This crate organizes the files of one DICOM series into display order
//! and serves cached, lazily computed access to their headers, calibrated
//! intensities and derived pixel views.
//!
//! A directory scanner registers files one at a time together with a small
//! map of already extracted tags. Once every file is registered the series
//! is sorted exactly once: each full header is read through a
//! [`HeaderSource`], files without a SliceLocation (scout views and the like)
//! are dropped and the rest are ordered by descending SliceLocation. From
//! then on the series is read mostly:
//!  - slice views are built on first access and cached per index
//!  - the slice spacing is derived once from the first two slices
//!  - the whole series can be calibrated once into Hounsfield units
//!
//! Pixel views are selected with [`ViewMode`]; the masks and segmentations
//! behind the non-original modes come from an injected [`PixelTransform`].
//!
//! Sorting and calibrating block until done. [`background`] moves both onto
//! tokio's blocking pool for callers that must stay responsive.
//!
//! # Examples
//!
//! ## Sorting a series and reading a slice
//!
//! ```no_run
//! # use dicom_series::{DicomHeaderSource, RescaleCalibrator, Series, ViewMode};
//! let mut series = Series::new("1.2.840.1", "dicom");
//! for path in ["dicom/1.dcm", "dicom/2.dcm", "dicom/3.dcm"] {
//!     let tags = DicomHeaderSource::abbreviated_tags(path).expect("should have read tags");
//!     series.register(path, tags);
//! }
//! series
//!     .sort(&DicomHeaderSource::new())
//!     .expect("should have sorted series");
//! series
//!     .load_calibrated_volume(&RescaleCalibrator::default())
//!     .expect("should have calibrated series");
//! let pixels = series
//!     .pixel_data(series.size() / 2, ViewMode::SegmentedLungs)
//!     .expect("should have found slice");
//! ```

pub mod acquisition;
pub mod background;
pub mod calibrator;
pub mod dicom_source;
pub mod enums;
pub mod error;
pub mod header;
pub mod series;
pub mod slice_view;
pub mod sorter;
pub mod transform;
pub mod view_cache;

pub use acquisition::TimestepSpec;
pub use calibrator::{IntensityCalibrator, RescaleCalibrator};
pub use dicom_source::DicomHeaderSource;
pub use enums::ViewMode;
pub use error::SeriesError;
pub use header::{Header, HeaderSource, TagMap, TagValue};
pub use series::Series;
pub use slice_view::SliceView;
pub use transform::{PixelTransform, ThresholdSegmenter};
