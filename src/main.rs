use std::{fs, path::PathBuf};

use dicom_series::{
    DicomHeaderSource, RescaleCalibrator, Series, SeriesError, TagValue, ViewMode,
    background::{calibrate_in_background, sort_in_background},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), SeriesError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let root = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from("dicom"), PathBuf::from);

    let mut paths: Vec<_> = fs::read_dir(&root)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
        })
        .collect();
    paths.sort();

    let mut series: Option<Series> = None;
    for path in paths {
        let tags = match DicomHeaderSource::abbreviated_tags(&path) {
            Ok(tags) => tags,
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping unreadable file");
                continue;
            }
        };
        let series = series.get_or_insert_with(|| {
            let id = tags
                .get("SeriesInstanceUID")
                .map(TagValue::to_string)
                .unwrap_or_default();
            Series::new(id, &root)
        });
        series.register(path, tags);
    }
    let Some(series) = series else {
        warn!(root = %root.display(), "no DICOM files found");
        return Ok(());
    };

    let mut series = sort_in_background(series, DicomHeaderSource::new()).await?;
    info!(
        series = series.series_id(),
        size = series.size(),
        timesteps = %series.timestep_spec(),
        "series ready"
    );
    match series.slice_spacing() {
        Ok(spacing) => info!(spacing, "slice spacing"),
        Err(err) => warn!(%err, "no slice spacing"),
    }

    let mut series = calibrate_in_background(series, RescaleCalibrator::default()).await?;
    if series.size() == 0 {
        return Ok(());
    }
    let view = series.slice_view(series.size() / 2)?;
    if let Some(image) = view.thumbnail(ViewMode::Original) {
        image.save("result.png")?;
        info!(path = %view.path().display(), "saved result.png");
    }
    Ok(())
}
