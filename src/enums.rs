/// Pixel view a presentation layer can request for a slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ViewMode {
    #[default]
    Original,
    LungsMask,
    SegmentedLungs,
    SegmentedLungsWithInternal,
}

impl ViewMode {
    pub const ALL: [ViewMode; 4] = [
        ViewMode::Original,
        ViewMode::LungsMask,
        ViewMode::SegmentedLungs,
        ViewMode::SegmentedLungsWithInternal,
    ];

    /// Position of the mode in [`ViewMode::ALL`], used for per-mode caches
    pub(crate) fn slot(self) -> usize {
        match self {
            ViewMode::Original => 0,
            ViewMode::LungsMask => 1,
            ViewMode::SegmentedLungs => 2,
            ViewMode::SegmentedLungsWithInternal => 3,
        }
    }
}
