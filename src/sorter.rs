use crate::{
    error::SeriesError,
    header::{Header, HeaderSource},
};

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// Registered files that carry a slice location, ordered by it.
#[derive(Debug, Default)]
pub struct SortedSlices {
    paths: Vec<PathBuf>,
    headers: Vec<Header>,
    index_by_path: HashMap<PathBuf, usize>,
}

impl SortedSlices {
    /// Read the header of every path, drop the ones without a slice location
    /// (scout views and the like) or with a non-finite one, and order the
    /// rest by descending location.
    ///
    /// Slices with equal locations keep their registration order.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Header`] if the source fails to read any path
    pub fn sort<S: HeaderSource + ?Sized>(
        paths: &[PathBuf],
        source: &S,
    ) -> Result<Self, SeriesError> {
        let mut with_location = Vec::with_capacity(paths.len());
        for path in paths {
            let header = source
                .read_header(path)
                .map_err(|err| SeriesError::Header {
                    path: path.clone(),
                    source: Box::new(err),
                })?;
            match header.slice_location() {
                Some(location) if location.is_finite() => {
                    with_location.push((location, header, path.clone()));
                }
                Some(location) => {
                    warn!(path = %path.display(), location, "skipping non-finite slice location");
                }
                None => {}
            }
        }

        with_location.sort_by(|a, b| b.0.total_cmp(&a.0));

        debug!(
            retained = with_location.len(),
            excluded = paths.len() - with_location.len(),
            "sorted slices by location"
        );

        let (paths, headers): (Vec<_>, Vec<_>) = with_location
            .into_iter()
            .map(|(_, header, path)| (path, header))
            .unzip();
        let index_by_path = paths
            .iter()
            .enumerate()
            .map(|(index, path)| (path.clone(), index))
            .collect();

        Ok(Self {
            paths,
            headers,
            index_by_path,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    #[cfg(test)]
    pub(crate) fn headers_mut(&mut self) -> &mut [Header] {
        &mut self.headers
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(PathBuf::as_path)
    }

    pub fn header(&self, index: usize) -> Option<&Header> {
        self.headers.get(index)
    }

    pub fn index_of(&self, path: &Path) -> Option<usize> {
        self.index_by_path.get(path).copied()
    }
}
