use crate::slice_view::SliceView;

use std::sync::Arc;
use tracing::debug;

/// Per index cache of [`SliceView`]s, one slot per sorted slice.
#[derive(Default)]
pub struct ViewCache {
    entries: Vec<Option<Arc<SliceView>>>,
}

impl ViewCache {
    pub fn with_size(size: usize) -> Self {
        Self {
            entries: vec![None; size],
        }
    }

    pub fn get(&self, index: usize) -> Option<&Arc<SliceView>> {
        self.entries.get(index)?.as_ref()
    }

    /// Return the view at `index`, building it with `build` on first access.
    /// `None` if `index` has no slot.
    pub fn get_or_insert_with(
        &mut self,
        index: usize,
        build: impl FnOnce() -> SliceView,
    ) -> Option<Arc<SliceView>> {
        let slot = self.entries.get_mut(index)?;
        let view = slot.get_or_insert_with(|| {
            debug!(index, "building slice view");
            Arc::new(build())
        });
        Some(Arc::clone(view))
    }
}
