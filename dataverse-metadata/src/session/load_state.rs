//! Per-table load-state machines.

/// Which dependent resource a fetch covers. Attributes and forms/views load
/// independently and carry independent load states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Attributes,
    FormsAndViews,
}

impl ResourceKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Attributes => "attributes",
            Self::FormsAndViews => "forms/views",
        }
    }
}

/// Load progression for one resource kind of one table.
///
/// Transitions are strictly `NotLoaded -> Loading -> Loaded | Failed`.
/// Entering `Loading` while already `Loading` is rejected by
/// [`SessionStore::begin_fetch`](super::SessionStore::begin_fetch); entering
/// from `Loaded` is allowed and treated as a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
    Failed,
}

impl LoadState {
    pub fn is_loading(self) -> bool {
        self == Self::Loading
    }

    pub fn is_loaded(self) -> bool {
        self == Self::Loaded
    }

    pub fn is_failed(self) -> bool {
        self == Self::Failed
    }
}

/// Load states for both resource kinds of one table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableLoadState {
    pub attributes: LoadState,
    pub forms_and_views: LoadState,
}

impl TableLoadState {
    pub fn get(&self, kind: ResourceKind) -> LoadState {
        match kind {
            ResourceKind::Attributes => self.attributes,
            ResourceKind::FormsAndViews => self.forms_and_views,
        }
    }

    pub fn set(&mut self, kind: ResourceKind, state: LoadState) {
        match kind {
            ResourceKind::Attributes => self.attributes = state,
            ResourceKind::FormsAndViews => self.forms_and_views = state,
        }
    }
}
