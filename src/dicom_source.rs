use crate::{
    error::SeriesError,
    header::{self, Header, HeaderSource, TagMap, TagValue},
};

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, OpenFileOptions, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder},
};
use dicom_dictionary_std::tags;
use ndarray::{Array3, s};
use std::path::Path;
use tracing::debug;

#[derive(Clone, Copy)]
enum ValueKind {
    Float,
    Floats,
    Int,
    Text,
}

/// Attributes copied into every [`Header`]
const HEADER_TAGS: &[(&str, Tag, ValueKind)] = &[
    (header::SLICE_LOCATION, tags::SLICE_LOCATION, ValueKind::Float),
    (
        header::IMAGE_POSITION_PATIENT,
        tags::IMAGE_POSITION_PATIENT,
        ValueKind::Floats,
    ),
    (header::TRIGGER_TIME, tags::TRIGGER_TIME, ValueKind::Float),
    (header::RESCALE_SLOPE, tags::RESCALE_SLOPE, ValueKind::Float),
    (header::RESCALE_INTERCEPT, tags::RESCALE_INTERCEPT, ValueKind::Float),
    (header::SLICE_THICKNESS, tags::SLICE_THICKNESS, ValueKind::Float),
    ("PixelSpacing", tags::PIXEL_SPACING, ValueKind::Floats),
    ("InstanceNumber", tags::INSTANCE_NUMBER, ValueKind::Int),
    ("Rows", tags::ROWS, ValueKind::Int),
    ("Columns", tags::COLUMNS, ValueKind::Int),
    ("SeriesInstanceUID", tags::SERIES_INSTANCE_UID, ValueKind::Text),
    ("SeriesDescription", tags::SERIES_DESCRIPTION, ValueKind::Text),
    ("PatientName", tags::PATIENT_NAME, ValueKind::Text),
    ("Modality", tags::MODALITY, ValueKind::Text),
];

/// Attributes a directory scanner passes along with each registered file
const ABBREVIATED_TAGS: &[(&str, Tag, ValueKind)] = &[
    ("SeriesInstanceUID", tags::SERIES_INSTANCE_UID, ValueKind::Text),
    ("SeriesDescription", tags::SERIES_DESCRIPTION, ValueKind::Text),
    (header::TRIGGER_TIME, tags::TRIGGER_TIME, ValueKind::Float),
    ("InstanceNumber", tags::INSTANCE_NUMBER, ValueKind::Int),
];

/// [`HeaderSource`] reading DICOM files from disk.
pub struct DicomHeaderSource {
    decode_pixels: bool,
}

impl Default for DicomHeaderSource {
    fn default() -> Self {
        Self::new()
    }
}

impl DicomHeaderSource {
    /// Source that also decodes the stored pixel data of each file
    pub fn new() -> Self {
        Self {
            decode_pixels: true,
        }
    }

    /// Source that stops reading at the pixel data element
    pub fn headers_only() -> Self {
        Self {
            decode_pixels: false,
        }
    }

    /// Read the abbreviated tag map for `path`, without touching pixel data
    pub fn abbreviated_tags(path: impl AsRef<Path>) -> Result<TagMap, SeriesError> {
        let dicom_object = OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path.as_ref())?;
        Ok(Self::extract_tags(&dicom_object, ABBREVIATED_TAGS))
    }

    fn extract_tags(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        wanted: &[(&str, Tag, ValueKind)],
    ) -> TagMap {
        wanted
            .iter()
            .filter_map(|(name, tag, kind)| {
                Self::extract_value(dicom_object, *tag, *kind)
                    .map(|value| ((*name).to_owned(), value))
            })
            .collect()
    }

    fn extract_value(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: Tag,
        kind: ValueKind,
    ) -> Option<TagValue> {
        let element = dicom_object.element(tag).ok()?;
        match kind {
            ValueKind::Float => element.to_float64().ok().map(TagValue::Float),
            ValueKind::Floats => element.to_multi_float64().ok().map(TagValue::Floats),
            ValueKind::Int => element.to_int::<i64>().ok().map(TagValue::Int),
            ValueKind::Text => element
                .to_str()
                .ok()
                .map(|text| TagValue::Text(text.trim().to_owned())),
        }
    }

    fn decode_stored_pixels(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<Option<Array3<i16>>, SeriesError> {
        if dicom_object.element(tags::PIXEL_DATA).is_err() {
            return Ok(None);
        }
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| SeriesError::PixelDecode(e.to_string()))?;
        // Rescaling is left to the calibrator
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let frames = pixel_data
            .to_ndarray_with_options::<i16>(&options)
            .map_err(|e| SeriesError::PixelDecode(e.to_string()))?;
        Ok(Some(frames.slice_move(s![.., .., .., 0])))
    }
}

impl HeaderSource for DicomHeaderSource {
    fn read_header(&self, path: &Path) -> Result<Header, SeriesError> {
        let dicom_object = if self.decode_pixels {
            open_file(path)?
        } else {
            OpenFileOptions::new()
                .read_until(tags::PIXEL_DATA)
                .open_file(path)?
        };

        let header = Header::new(Self::extract_tags(&dicom_object, HEADER_TAGS));
        if !self.decode_pixels {
            return Ok(header);
        }
        match Self::decode_stored_pixels(&dicom_object)? {
            Some(frames) => Ok(header.with_pixels(frames)),
            None => {
                debug!(path = %path.display(), "file has no pixel data");
                Ok(header)
            }
        }
    }
}
