use crate::ids::NodeId;
use crate::sync::InsertPosition;
use crate::view::SubtreeCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Focus {
    Tree,
    Search,
}

#[derive(Debug, Clone)]
pub(crate) enum PendingAction {
    None,
    Delete {
        target: NodeId,
        label: String,
        counts: SubtreeCounts,
    },
}

/// Where a new item goes, relative to the row it was requested on.
#[derive(Debug, Clone)]
pub(crate) struct Placement {
    pub(crate) reference: NodeId,
    pub(crate) position: InsertPosition,
}

#[derive(Debug, Clone)]
pub(crate) enum PromptMode {
    NewBookmarkUrl { placement: Placement },
    NewBookmarkTitle { placement: Placement, url: String },
    NewFolder { placement: Placement },
    Rename { target: NodeId },
    EditUrl { target: NodeId },
}

#[derive(Debug, Clone)]
pub(crate) struct PromptState {
    pub(crate) title: String,
    pub(crate) value: String,
    pub(crate) cursor: usize,
    pub(crate) mode: PromptMode,
}

impl PromptState {
    pub(crate) fn new(title: impl Into<String>, value: impl Into<String>, mode: PromptMode) -> Self {
        let value = value.into();
        Self {
            title: title.into(),
            cursor: value.chars().count(),
            value,
            mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextAction {
    Open,
    OpenAll,
    NewBookmark,
    NewFolder,
    NewSeparator,
    Rename,
    EditUrl,
    CopyUrl,
    Delete,
    Cancel,
}
