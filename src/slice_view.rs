use crate::{
    enums::ViewMode,
    header::{Header, TagMap},
    transform::PixelTransform,
};

use image::{GrayImage, ImageBuffer};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

/// One slice of a series: its header, stored and calibrated pixels, and
/// the pixel views derived from them, each computed on first request.
pub struct SliceView {
    path: PathBuf,
    header: Header,
    calibrated: Option<Array3<i16>>,
    transform: Arc<dyn PixelTransform>,
    views: [OnceLock<Option<Arc<Array3<i16>>>>; 4],
}

impl SliceView {
    pub fn new(
        path: impl Into<PathBuf>,
        header: Header,
        calibrated: Option<Array2<i16>>,
        transform: Arc<dyn PixelTransform>,
    ) -> Self {
        Self {
            path: path.into(),
            header,
            calibrated: calibrated.map(|frame| frame.insert_axis(Axis(0))),
            transform,
            views: Default::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn tags(&self) -> &TagMap {
        self.header.tags()
    }

    /// Stored frames as read from the file
    pub fn raw_pixels(&self) -> Option<ArrayView3<'_, i16>> {
        self.header.pixels().map(|pixels| pixels.view())
    }

    pub fn calibrated_pixels(&self) -> Option<ArrayView2<'_, i16>> {
        self.calibrated
            .as_ref()
            .map(|frames| frames.index_axis(Axis(0), 0))
    }

    /// Frames for `mode`, derived from the calibrated frame when present and
    /// from the stored frames otherwise. `None` if the slice has no pixels.
    pub fn pixel_data(&self, mode: ViewMode) -> Option<Arc<Array3<i16>>> {
        self.views[mode.slot()]
            .get_or_init(|| {
                let source = match &self.calibrated {
                    Some(frames) => frames.view(),
                    None => self.raw_pixels()?,
                };
                Some(Arc::new(self.transform.apply(mode, source)))
            })
            .clone()
    }

    #[inline]
    fn normalize_to_u8(value: i16, min: i16, range: f32) -> u8 {
        (((value as f32 - min as f32) / range) * 255.0).clamp(0.0, 255.0) as u8
    }

    /// First frame of `mode` as an 8-bit image, stretched over its own range
    pub fn thumbnail(&self, mode: ViewMode) -> Option<GrayImage> {
        let frames = self.pixel_data(mode)?;
        if frames.dim().0 == 0 {
            return None;
        }
        let frame = frames.index_axis(Axis(0), 0);
        let (height, width) = frame.dim();

        let min = frame.iter().copied().min()?;
        let max = frame.iter().copied().max()?;
        let range = (max as f32 - min as f32).max(1.0);

        let pixel_data: Vec<u8> = frame
            .iter()
            .map(|&v| Self::normalize_to_u8(v, min, range))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ThresholdSegmenter;
    use ndarray::array;

    fn view(raw: Option<Array3<i16>>, calibrated: Option<Array2<i16>>) -> SliceView {
        let header = match raw {
            Some(raw) => Header::default().with_pixels(raw),
            None => Header::default(),
        };
        SliceView::new(
            "slice.dcm",
            header,
            calibrated,
            Arc::new(ThresholdSegmenter::default()),
        )
    }

    #[test]
    fn test_prefers_calibrated_frame() {
        let slice = view(
            Some(array![[[1_i16, 2]], [[3, 4]]]),
            Some(array![[-1000_i16, 40]]),
        );

        let pixels = slice.pixel_data(ViewMode::Original).unwrap();

        assert_eq!(*pixels, array![[[-1000_i16, 40]]]);
        assert_eq!(slice.raw_pixels().unwrap().dim(), (2, 1, 2));
    }

    #[test]
    fn test_falls_back_to_stored_frames() {
        let slice = view(Some(array![[[1_i16, 2]], [[3, 4]]]), None);
        let pixels = slice.pixel_data(ViewMode::Original).unwrap();
        assert_eq!(pixels.dim(), (2, 1, 2));
    }

    #[test]
    fn test_no_pixels() {
        let slice = view(None, None);
        assert!(slice.pixel_data(ViewMode::Original).is_none());
        assert!(slice.thumbnail(ViewMode::Original).is_none());
    }

    #[test]
    fn test_views_are_computed_once() {
        let slice = view(None, Some(array![[0_i16, 1], [2, 3]]));
        let first = slice.pixel_data(ViewMode::LungsMask).unwrap();
        let second = slice.pixel_data(ViewMode::LungsMask).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_thumbnail_stretches_range() {
        let slice = view(None, Some(array![[-1000_i16, 0], [500, 1000]]));
        let image = slice.thumbnail(ViewMode::Original).unwrap();

        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(1, 1).0, [255]);
    }
}
