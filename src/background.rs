//! Run the blocking series operations off the calling thread.
//!
//! [`Series::sort`] reads every file and [`Series::load_calibrated_volume`]
//! walks every pixel; a UI thread hands the series over and gets it back
//! once the work is done. Neither operation can be cancelled.

use crate::{
    calibrator::IntensityCalibrator, error::SeriesError, header::HeaderSource, series::Series,
};

use tokio::task;

pub async fn sort_in_background<S>(mut series: Series, source: S) -> Result<Series, SeriesError>
where
    S: HeaderSource + Send + 'static,
{
    task::spawn_blocking(move || {
        series.sort(&source)?;
        Ok::<_, SeriesError>(series)
    })
    .await?
}

pub async fn calibrate_in_background<C>(
    mut series: Series,
    calibrator: C,
) -> Result<Series, SeriesError>
where
    C: IntensityCalibrator + Send + 'static,
{
    task::spawn_blocking(move || {
        series.load_calibrated_volume(&calibrator)?;
        Ok::<_, SeriesError>(series)
    })
    .await?
}
