use crate::{
    acquisition::{self, DEFAULT_TIMESTEP_TAG, TimestepSpec},
    calibrator::IntensityCalibrator,
    enums::ViewMode,
    error::SeriesError,
    header::{Header, HeaderSource, SLICE_THICKNESS, TagMap},
    slice_view::SliceView,
    sorter::SortedSlices,
    transform::{PixelTransform, ThresholdSegmenter},
    view_cache::ViewCache,
};

use ndarray::{Array2, Array3, Axis};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Files sharing one series identifier, registered one at a time and then
/// sorted once into display order.
///
/// After [`Series::sort`] the ordering is fixed; later calls only fill the
/// per slice view cache, the slice spacing and the calibrated volume.
pub struct Series {
    series_id: String,
    root_dir: PathBuf,
    paths: Vec<PathBuf>,
    tags: Vec<TagMap>,
    sorted: Option<SortedSlices>,
    calibrated: Option<Array3<i16>>,
    slice_spacing: Option<f64>,
    views: ViewCache,
    transform: Arc<dyn PixelTransform>,
}

impl Series {
    pub fn new(series_id: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            series_id: series_id.into(),
            root_dir: root_dir.into(),
            paths: Vec::new(),
            tags: Vec::new(),
            sorted: None,
            calibrated: None,
            slice_spacing: None,
            views: ViewCache::default(),
            transform: Arc::new(ThresholdSegmenter::default()),
        }
    }

    /// Replace the transform used for the non-original view modes
    pub fn with_transform(mut self, transform: Arc<dyn PixelTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn series_id(&self) -> &str {
        &self.series_id
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn registered_paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn registered_tags(&self) -> &[TagMap] {
        &self.tags
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted.is_some()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated.is_some()
    }

    /// Number of sorted slices; 0 until [`Series::sort`] has run
    pub fn size(&self) -> usize {
        self.sorted.as_ref().map_or(0, SortedSlices::len)
    }

    pub fn sorted_paths(&self) -> &[PathBuf] {
        self.sorted
            .as_ref()
            .map(SortedSlices::paths)
            .unwrap_or_default()
    }

    pub fn calibrated_volume(&self) -> Option<&Array3<i16>> {
        self.calibrated.as_ref()
    }

    pub fn register(&mut self, path: impl Into<PathBuf>, tags: TagMap) {
        let path = path.into();
        debug!(series = %self.series_id, path = %path.display(), "registered file");
        self.paths.push(path);
        self.tags.push(tags);
    }

    /// Append the registrations of `other` after this series' own.
    ///
    /// Meant for use before [`Series::sort`]; an existing ordering is left
    /// as it is until the next sort.
    pub fn merge(&mut self, other: &Series) {
        debug!(
            series = %self.series_id,
            from = %other.series_id,
            files = other.paths.len(),
            "merging series"
        );
        self.paths.extend(other.paths.iter().cloned());
        self.tags.extend(other.tags.iter().cloned());
    }

    /// Read every registered header and order the slices by descending
    /// SliceLocation, skipping files without one.
    ///
    /// Sorting again re-reads everything and replaces the previous ordering,
    /// the view cache and the calibrated volume.
    pub fn sort<S: HeaderSource + ?Sized>(&mut self, source: &S) -> Result<(), SeriesError> {
        let sorted = SortedSlices::sort(&self.paths, source)?;
        info!(
            series = %self.series_id,
            registered = self.paths.len(),
            size = sorted.len(),
            "sorted series"
        );
        self.views = ViewCache::with_size(sorted.len());
        self.calibrated = None;
        self.sorted = Some(sorted);
        Ok(())
    }

    fn sorted(&self) -> Result<&SortedSlices, SeriesError> {
        self.sorted.as_ref().ok_or(SeriesError::NotSorted)
    }

    fn checked(&self, index: usize) -> Result<&SortedSlices, SeriesError> {
        let sorted = self.sorted()?;
        if index >= sorted.len() {
            return Err(SeriesError::IndexOutOfRange {
                index,
                size: sorted.len(),
            });
        }
        Ok(sorted)
    }

    /// Owned path and header of the sorted slice at `index`
    fn slice_parts(&self, index: usize) -> Result<(PathBuf, Header), SeriesError> {
        let sorted = self.checked(index)?;
        match (sorted.path(index), sorted.header(index)) {
            (Some(path), Some(header)) => Ok((path.to_path_buf(), header.clone())),
            _ => Err(SeriesError::IndexOutOfRange {
                index,
                size: sorted.len(),
            }),
        }
    }

    /// Spacing between the first two sorted slices, computed on first call
    /// and fixed afterwards.
    ///
    /// # Errors
    ///
    /// Fails if the series is unsorted, has fewer than two slices, or the
    /// first two slices carry neither ImagePositionPatient nor SliceLocation
    pub fn slice_spacing(&mut self) -> Result<f64, SeriesError> {
        if let Some(spacing) = self.slice_spacing {
            return Ok(spacing);
        }
        let spacing = acquisition::slice_spacing(self.sorted()?.headers())?;
        self.slice_spacing = Some(spacing);
        Ok(spacing)
    }

    /// Timestep spec over the TriggerTime of every registered file
    pub fn timestep_spec(&self) -> TimestepSpec {
        self.timestep_spec_for_tag(DEFAULT_TIMESTEP_TAG)
    }

    pub fn timestep_spec_for_tag(&self, tag: &str) -> TimestepSpec {
        acquisition::timestep_spec(&self.tags, tag)
    }

    /// Series level values used when a slice header lacks a requested name
    pub fn extra_tag_values(&self) -> TagMap {
        acquisition::extra_tag_values(self.paths.len(), self.timestep_spec())
    }

    /// Text values of `names` for the slice at `index`, taken from its header,
    /// then from [`Series::extra_tag_values`], else empty.
    ///
    /// Returns no values at all if nothing has been registered.
    pub fn tag_values(&mut self, names: &[&str], index: usize) -> Result<Vec<String>, SeriesError> {
        if self.paths.is_empty() {
            return Ok(Vec::new());
        }

        let view = if self.calibrated.is_none() {
            self.raw_view(index)?
        } else {
            self.slice_view(index)?
        };
        let extra = self.extra_tag_values();

        Ok(names
            .iter()
            .map(|name| {
                view.header()
                    .get(name)
                    .or_else(|| extra.get(*name))
                    .map(ToString::to_string)
                    .unwrap_or_default()
            })
            .collect())
    }

    fn spacing_for_view(&mut self) -> Option<f64> {
        match self.slice_spacing() {
            Ok(spacing) => Some(spacing),
            Err(err) => {
                warn!(series = %self.series_id, %err, "slice spacing unavailable");
                None
            }
        }
    }

    /// Cached view of the slice at `index`, built on first access with the
    /// slice spacing written into its SliceThickness and, once the volume is
    /// calibrated, its calibrated frame.
    pub fn slice_view(&mut self, index: usize) -> Result<Arc<SliceView>, SeriesError> {
        self.checked(index)?;
        if let Some(view) = self.views.get(index) {
            return Ok(Arc::clone(view));
        }

        let spacing = self.spacing_for_view();
        let (path, mut header) = self.slice_parts(index)?;
        if let Some(spacing) = spacing {
            header.insert(SLICE_THICKNESS, spacing);
        }
        let calibrated = self
            .calibrated
            .as_ref()
            .map(|volume| volume.index_axis(Axis(0), index).to_owned());
        let transform = Arc::clone(&self.transform);

        let size = self.size();
        self.views
            .get_or_insert_with(index, || {
                SliceView::new(path, header, calibrated, transform)
            })
            .ok_or(SeriesError::IndexOutOfRange { index, size })
    }

    /// Uncached view of the stored slice at `index` while the volume is not
    /// calibrated.
    ///
    /// Once it is calibrated this returns the cached view of slice 0 whatever
    /// `index` is.
    pub fn raw_view(&mut self, index: usize) -> Result<Arc<SliceView>, SeriesError> {
        if self.calibrated.is_some() {
            return self.slice_view(0);
        }
        let (path, header) = self.slice_parts(index)?;
        Ok(Arc::new(SliceView::new(
            path,
            header,
            None,
            Arc::clone(&self.transform),
        )))
    }

    pub fn pixel_data(
        &mut self,
        index: usize,
        mode: ViewMode,
    ) -> Result<Option<Arc<Array3<i16>>>, SeriesError> {
        Ok(self.slice_view(index)?.pixel_data(mode))
    }

    /// First frame of every sorted slice as 8-bit samples, for thumbnails.
    /// Values are truncated to their low byte.
    pub fn pixel_data_list(&mut self, mode: ViewMode) -> Result<Vec<Array2<u8>>, SeriesError> {
        (0..self.size())
            .map(|index| {
                let frames = self
                    .pixel_data(index, mode)?
                    .filter(|frames| frames.dim().0 > 0)
                    .ok_or(SeriesError::MissingPixelData { index })?;
                Ok(frames.index_axis(Axis(0), 0).mapv(|v| v as u8))
            })
            .collect()
    }

    /// Calibrate the whole series once; later calls do nothing.
    ///
    /// Views cached before calibration are dropped so every slice is served
    /// from its calibrated frame afterwards.
    pub fn load_calibrated_volume<C: IntensityCalibrator + ?Sized>(
        &mut self,
        calibrator: &C,
    ) -> Result<(), SeriesError> {
        if self.calibrated.is_some() {
            return Ok(());
        }
        let volume = calibrator.calibrate(self.sorted()?.headers())?;
        info!(series = %self.series_id, dim = ?volume.dim(), "loaded calibrated volume");
        self.calibrated = Some(volume);
        self.views = ViewCache::with_size(self.size());
        Ok(())
    }

    /// Sorted index of `path`; `Ok(None)` if the path is not part of the
    /// sorted series.
    ///
    /// # Errors
    ///
    /// [`SeriesError::InvalidPath`] for an empty path,
    /// [`SeriesError::NotSorted`] before [`Series::sort`]
    pub fn index_from_path(&self, path: impl AsRef<Path>) -> Result<Option<usize>, SeriesError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(SeriesError::InvalidPath(path.to_path_buf()));
        }
        Ok(self.sorted()?.index_of(path))
    }

    pub fn pixel_data_from_path(
        &mut self,
        path: impl AsRef<Path>,
        mode: ViewMode,
    ) -> Result<Option<Arc<Array3<i16>>>, SeriesError> {
        match self.index_from_path(path)? {
            Some(index) => self.pixel_data(index, mode),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calibrator::RescaleCalibrator,
        header::{
            Header, IMAGE_POSITION_PATIENT, RESCALE_INTERCEPT, SLICE_LOCATION, TRIGGER_TIME, TagValue,
        },
    };
    use std::{cell::Cell, collections::HashMap};

    type Source = HashMap<PathBuf, Header>;

    fn slice_header(location: Option<f64>, fill: i16) -> Header {
        let mut header = Header::default();
        if let Some(location) = location {
            header.insert(SLICE_LOCATION, location);
            header.insert(IMAGE_POSITION_PATIENT, vec![0.0, 0.0, location]);
        }
        header.insert(RESCALE_INTERCEPT, -1024.0);
        header.insert("SeriesDescription", "CHEST");
        header.with_pixels(Array3::from_elem((1, 2, 2), fill))
    }

    /// Series registering `slices` in order, plus a source holding their headers
    fn fixture(slices: &[(&str, Option<f64>, i16)]) -> (Series, Source) {
        let mut series = Series::new("1.2.3", "/data");
        let mut source = Source::new();
        for (name, location, fill) in slices {
            series.register(*name, TagMap::new());
            source.insert(PathBuf::from(name), slice_header(*location, *fill));
        }
        (series, source)
    }

    fn trigger_tags(time: i64) -> TagMap {
        TagMap::from([(TRIGGER_TIME.to_owned(), TagValue::Int(time))])
    }

    #[test]
    fn test_sorts_descending_and_skips_scouts() {
        let (mut series, source) = fixture(&[
            ("mid.dcm", Some(5.0), 0),
            ("scout.dcm", None, 0),
            ("low.dcm", Some(0.0), 0),
            ("high.dcm", Some(10.0), 0),
        ]);
        assert_eq!(series.size(), 0);

        series.sort(&source).unwrap();

        assert_eq!(series.size(), 3);
        assert_eq!(series.registered_paths().len(), 4);
        assert_eq!(
            series.sorted_paths(),
            [
                PathBuf::from("high.dcm"),
                PathBuf::from("mid.dcm"),
                PathBuf::from("low.dcm")
            ]
        );
    }

    #[test]
    fn test_slice_view_is_cached() {
        let (mut series, source) = fixture(&[("a", Some(1.0), 0), ("b", Some(2.0), 0)]);
        series.sort(&source).unwrap();

        let first = series.slice_view(1).unwrap();
        let second = series.slice_view(1).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.path(), Path::new("a"));
    }

    #[test]
    fn test_slice_view_gets_spacing() {
        let (mut series, source) = fixture(&[("a", Some(0.0), 0), ("b", Some(2.5), 0)]);
        series.sort(&source).unwrap();

        let view = series.slice_view(0).unwrap();

        assert_eq!(view.header().get(SLICE_THICKNESS), Some(&TagValue::Float(2.5)));
    }

    #[test]
    fn test_single_slice_view_without_spacing() {
        let (mut series, source) = fixture(&[("a", Some(0.0), 0)]);
        series.sort(&source).unwrap();

        assert!(matches!(
            series.slice_spacing(),
            Err(SeriesError::NotEnoughSlices { found: 1 })
        ));
        let view = series.slice_view(0).unwrap();
        assert!(view.header().get(SLICE_THICKNESS).is_none());
    }

    #[test]
    fn test_index_errors() {
        let (mut series, source) = fixture(&[("a", Some(0.0), 0)]);
        assert!(matches!(series.slice_view(0), Err(SeriesError::NotSorted)));

        series.sort(&source).unwrap();
        assert!(matches!(
            series.slice_view(3),
            Err(SeriesError::IndexOutOfRange { index: 3, size: 1 })
        ));
    }

    #[test]
    fn test_slice_spacing_is_memoized() {
        let (mut series, source) = fixture(&[("a", Some(0.0), 0), ("b", Some(3.0), 0)]);
        series.sort(&source).unwrap();
        assert_eq!(series.slice_spacing().unwrap(), 3.0);

        let headers = series.sorted.as_mut().unwrap().headers_mut();
        headers[1].insert(IMAGE_POSITION_PATIENT, vec![0.0, 0.0, -50.0]);

        assert_eq!(series.slice_spacing().unwrap(), 3.0);
    }

    #[test]
    fn test_timestep_spec_over_registered_tags() {
        let mut series = Series::new("1.2.3", "/data");
        assert_eq!(series.timestep_spec(), TimestepSpec::default());

        for (name, time) in [("a", 2000), ("b", 0), ("c", 1000)] {
            series.register(name, trigger_tags(time));
        }
        let spec = series.timestep_spec();

        assert_eq!((spec.start, spec.interval, spec.count), (0, 1000.0, 3));
    }

    #[test]
    fn test_merge_appends_in_order() {
        let mut first = Series::new("1", "/data");
        first.register("a", trigger_tags(1));
        first.register("b", trigger_tags(2));
        let mut second = Series::new("2", "/other");
        second.register("c", trigger_tags(3));

        first.merge(&second);

        assert_eq!(
            first.registered_paths(),
            [PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
        assert_eq!(first.registered_tags()[2], trigger_tags(3));
        assert_eq!(second.registered_paths().len(), 1);
    }

    #[test]
    fn test_index_from_path() {
        let (mut series, source) = fixture(&[("a", Some(0.0), 0), ("b", Some(1.0), 0)]);
        assert!(matches!(
            series.index_from_path("a"),
            Err(SeriesError::NotSorted)
        ));

        series.sort(&source).unwrap();

        assert_eq!(series.index_from_path("a").unwrap(), Some(1));
        assert_eq!(series.index_from_path("never-registered").unwrap(), None);
        assert!(matches!(
            series.index_from_path(""),
            Err(SeriesError::InvalidPath(_))
        ));
        assert!(
            series
                .pixel_data_from_path("never-registered", ViewMode::Original)
                .unwrap()
                .is_none()
        );
        assert!(
            series
                .pixel_data_from_path("b", ViewMode::Original)
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn test_tag_values() {
        let mut empty = Series::new("1.2.3", "/data");
        assert!(empty.tag_values(&["SeriesDescription"], 0).unwrap().is_empty());

        let (mut series, source) = fixture(&[("a", Some(0.0), 0), ("b", Some(1.0), 0)]);
        series.sort(&source).unwrap();

        let values = series
            .tag_values(&["SeriesDescription", "NumImages", "Unknown"], 0)
            .unwrap();

        assert_eq!(values, vec!["CHEST", "2", ""]);
    }

    #[test]
    fn test_calibration_feeds_views() {
        let (mut series, source) = fixture(&[("a", Some(0.0), 1024), ("b", Some(1.0), 1034)]);
        series.sort(&source).unwrap();
        series
            .load_calibrated_volume(&RescaleCalibrator::default())
            .unwrap();

        assert_eq!(series.calibrated_volume().unwrap().dim(), (2, 2, 2));
        let first = series.pixel_data(0, ViewMode::Original).unwrap().unwrap();
        assert_eq!(first[[0, 0, 0]], 10);

        let thumbnails = series.pixel_data_list(ViewMode::Original).unwrap();
        assert_eq!(thumbnails.len(), 2);
        assert_eq!(thumbnails[0][[0, 0]], 10);
        assert_eq!(thumbnails[1][[1, 1]], 0);
    }

    #[test]
    fn test_views_read_before_calibration_are_rebuilt() {
        let (mut series, source) = fixture(&[("a", Some(0.0), 1024), ("b", Some(1.0), 1024)]);
        series.sort(&source).unwrap();

        let stored = series.pixel_data(0, ViewMode::Original).unwrap().unwrap();
        assert_eq!(stored[[0, 0, 0]], 1024);
        let before = series.slice_view(0).unwrap();

        series
            .load_calibrated_volume(&RescaleCalibrator::default())
            .unwrap();

        let after = series.slice_view(0).unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        for index in 0..series.size() {
            let pixels = series.pixel_data(index, ViewMode::Original).unwrap().unwrap();
            assert_eq!(pixels[[0, 0, 0]], 0);
        }
        assert!(Arc::ptr_eq(&after, &series.slice_view(0).unwrap()));
    }

    #[test]
    fn test_pixel_data_list_truncates_to_low_byte() {
        let (mut series, source) = fixture(&[("a", Some(0.0), 300)]);
        series.sort(&source).unwrap();

        let thumbnails = series.pixel_data_list(ViewMode::Original).unwrap();

        assert_eq!(thumbnails[0][[0, 0]], 44);
    }

    struct CountingCalibrator {
        calls: Cell<usize>,
    }

    impl IntensityCalibrator for CountingCalibrator {
        fn calibrate(&self, headers: &[Header]) -> Result<Array3<i16>, SeriesError> {
            self.calls.set(self.calls.get() + 1);
            Ok(Array3::zeros((headers.len(), 2, 2)))
        }
    }

    #[test]
    fn test_calibration_runs_once() {
        let (mut series, source) = fixture(&[("a", Some(0.0), 0)]);
        series.sort(&source).unwrap();
        let calibrator = CountingCalibrator {
            calls: Cell::new(0),
        };

        series.load_calibrated_volume(&calibrator).unwrap();
        series.load_calibrated_volume(&calibrator).unwrap();

        assert_eq!(calibrator.calls.get(), 1);
        assert!(series.is_calibrated());
    }

    #[test]
    fn test_raw_view_before_and_after_calibration() {
        let (mut series, source) = fixture(&[
            ("a", Some(2.0), 0),
            ("b", Some(1.0), 0),
            ("c", Some(0.0), 0),
        ]);
        series.sort(&source).unwrap();

        let raw = series.raw_view(2).unwrap();
        assert_eq!(raw.path(), Path::new("c"));
        assert!(raw.calibrated_pixels().is_none());
        assert!(!Arc::ptr_eq(&raw, &series.raw_view(2).unwrap()));

        series
            .load_calibrated_volume(&RescaleCalibrator::default())
            .unwrap();
        let raw = series.raw_view(2).unwrap();

        assert_eq!(raw.path(), Path::new("a"));
        assert!(Arc::ptr_eq(&raw, &series.slice_view(0).unwrap()));
    }

    #[test]
    fn test_sorting_again_replaces_state() {
        let (mut series, mut source) = fixture(&[("a", Some(0.0), 0), ("b", Some(1.0), 0)]);
        series.sort(&source).unwrap();
        let before = series.slice_view(0).unwrap();

        source.insert(PathBuf::from("a"), slice_header(Some(5.0), 0));
        series.sort(&source).unwrap();
        let after = series.slice_view(0).unwrap();

        assert_eq!(after.path(), Path::new("a"));
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(series.index_from_path("b").unwrap(), Some(1));
    }
}
