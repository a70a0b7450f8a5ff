//! Mode specific pixel views of a slice.
//!
//! A [`PixelTransform`] is injected into every [`crate::slice_view::SliceView`],
//! so the series cache never needs to know how masks are produced.

use crate::enums::ViewMode;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Zip};
use std::collections::VecDeque;

pub trait PixelTransform: Send + Sync {
    /// Derive the frames for `mode` from calibrated or stored frames
    fn apply(&self, mode: ViewMode, frames: ArrayView3<'_, i16>) -> Array3<i16>;
}

/// Lung segmentation by intensity threshold.
///
/// Samples below `threshold` that are not connected to the frame border form
/// the lung mask; outside air touches the border and is dropped.
pub struct ThresholdSegmenter {
    pub threshold: i16,
    /// Value written outside the mask in the segmented views
    pub background: i16,
}

impl Default for ThresholdSegmenter {
    fn default() -> Self {
        Self {
            threshold: -320,
            background: -1000,
        }
    }
}

impl ThresholdSegmenter {
    fn lungs_mask(&self, frame: ArrayView2<'_, i16>) -> Array2<bool> {
        let candidate = frame.mapv(|v| v < self.threshold);
        let outside = Self::border_connected(&candidate);
        Zip::from(&candidate)
            .and(&outside)
            .map_collect(|&c, &o| c && !o)
    }

    /// Add enclosed holes (vessels, airways) to the mask
    fn fill_holes(mask: &Array2<bool>) -> Array2<bool> {
        let reachable = Self::border_connected(&mask.mapv(|m| !m));
        reachable.mapv(|r| !r)
    }

    /// Cells of `mask` reachable from the border through 4-connected set cells
    fn border_connected(mask: &Array2<bool>) -> Array2<bool> {
        let (height, width) = mask.dim();
        let mut seen = Array2::from_elem((height, width), false);
        let mut queue = VecDeque::new();

        for y in 0..height {
            for x in 0..width {
                let on_border = y == 0 || x == 0 || y + 1 == height || x + 1 == width;
                if on_border && mask[[y, x]] {
                    seen[[y, x]] = true;
                    queue.push_back((y, x));
                }
            }
        }

        while let Some((y, x)) = queue.pop_front() {
            let neighbours = [
                (y.wrapping_sub(1), x),
                (y + 1, x),
                (y, x.wrapping_sub(1)),
                (y, x + 1),
            ];
            for (ny, nx) in neighbours {
                if ny < height && nx < width && mask[[ny, nx]] && !seen[[ny, nx]] {
                    seen[[ny, nx]] = true;
                    queue.push_back((ny, nx));
                }
            }
        }

        seen
    }

    fn select(frame: ArrayView2<'_, i16>, mask: &Array2<bool>, background: i16) -> Array2<i16> {
        Zip::from(&frame)
            .and(mask)
            .map_collect(|&v, &inside| if inside { v } else { background })
    }

    fn apply_frame(&self, mode: ViewMode, frame: ArrayView2<'_, i16>) -> Array2<i16> {
        match mode {
            ViewMode::Original => frame.to_owned(),
            ViewMode::LungsMask => self.lungs_mask(frame).mapv(i16::from),
            ViewMode::SegmentedLungs => {
                let mask = self.lungs_mask(frame);
                Self::select(frame, &mask, self.background)
            }
            ViewMode::SegmentedLungsWithInternal => {
                let mask = Self::fill_holes(&self.lungs_mask(frame));
                Self::select(frame, &mask, self.background)
            }
        }
    }
}

impl PixelTransform for ThresholdSegmenter {
    fn apply(&self, mode: ViewMode, frames: ArrayView3<'_, i16>) -> Array3<i16> {
        if mode == ViewMode::Original {
            return frames.to_owned();
        }
        let mut out = Array3::zeros(frames.raw_dim());
        for (mut target, frame) in out.outer_iter_mut().zip(frames.outer_iter()) {
            target.assign(&self.apply_frame(mode, frame));
        }
        out
    }
}
