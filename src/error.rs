use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("Series has not been sorted yet")]
    NotSorted,

    #[error("Slice index {index} out of range for series of size {size}")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("Slice spacing needs at least two sorted slices, found {found}")]
    NotEnoughSlices { found: usize },

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("No pixel data for slice {index}")]
    MissingPixelData { index: usize },

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Invalid path: {0:?}")]
    InvalidPath(PathBuf),

    #[error("Failed to read header of {path:?}: {source}")]
    Header {
        path: PathBuf,
        #[source]
        source: Box<SeriesError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Pixel decode error: {0}")]
    PixelDecode(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
