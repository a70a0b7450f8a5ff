use crate::{error::SeriesError, header::Header};

use ndarray::{Array3, ArrayView2, Axis, s};
use tracing::debug;

/// Turns the ordered headers of a series into one calibrated volume,
/// one frame per header.
pub trait IntensityCalibrator {
    fn calibrate(&self, headers: &[Header]) -> Result<Array3<i16>, SeriesError>;
}

/// Applies RescaleSlope and RescaleIntercept to the first stored frame of
/// every header, producing Hounsfield units for CT data.
pub struct RescaleCalibrator {
    /// Stored value marking pixels outside the scanned field, set to 0
    /// before rescaling
    pub padding_value: i16,
}

impl Default for RescaleCalibrator {
    fn default() -> Self {
        Self {
            padding_value: -2000,
        }
    }
}

impl RescaleCalibrator {
    fn first_frames(headers: &[Header]) -> Result<Vec<ArrayView2<'_, i16>>, SeriesError> {
        headers
            .iter()
            .enumerate()
            .map(|(index, header)| {
                header
                    .pixels()
                    .filter(|pixels| pixels.dim().0 > 0)
                    .map(|pixels| pixels.index_axis(Axis(0), 0))
                    .ok_or(SeriesError::MissingPixelData { index })
            })
            .collect()
    }

    fn validate_dimensions(frames: &[ArrayView2<'_, i16>]) -> Result<(), SeriesError> {
        let first_dim = frames[0].dim();
        if frames.iter().any(|frame| frame.dim() != first_dim) {
            return Err(SeriesError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(frames: &[ArrayView2<'_, i16>]) -> Array3<i16> {
        let (height, width) = frames[0].dim();
        let mut volume = Array3::<i16>::zeros((frames.len(), height, width));

        for (i, frame) in frames.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(frame);
        }

        volume
    }

    #[inline]
    fn rescale(value: i16, slope: f64, intercept: i16) -> i16 {
        let value = if slope != 1.0 {
            (slope * value as f64) as i16
        } else {
            value
        };
        value.saturating_add(intercept)
    }
}

impl IntensityCalibrator for RescaleCalibrator {
    fn calibrate(&self, headers: &[Header]) -> Result<Array3<i16>, SeriesError> {
        if headers.is_empty() {
            return Ok(Array3::zeros((0, 0, 0)));
        }

        let frames = Self::first_frames(headers)?;
        Self::validate_dimensions(&frames)?;
        let mut volume = Self::build_volume_array(&frames);

        let padding = self.padding_value;
        for (mut frame, header) in volume.outer_iter_mut().zip(headers) {
            let slope = header.rescale_slope();
            let intercept = header.rescale_intercept() as i16;
            frame.mapv_inplace(|v| {
                let v = if v == padding { 0 } else { v };
                Self::rescale(v, slope, intercept)
            });
        }

        debug!(dim = ?volume.dim(), "calibrated volume");
        Ok(volume)
    }
}
