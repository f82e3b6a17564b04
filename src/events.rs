use crate::error::StoreError;
use crate::ids::NodeId;
use crate::store::{Node, RequestId};

/// Notifications for surfaces outside the tree (status line, menus, toolbars).
#[derive(Debug)]
pub enum TreeEvent {
    Loaded,
    Created(Node),
    Updated(Node),
    Removed(NodeId),
    Moved {
        node: Node,
        old_parent: NodeId,
    },
    FolderFocused(NodeId),
    SearchEntered,
    SearchExited,
    SearchResults(usize),
    Rejected {
        request: RequestId,
        op: &'static str,
        error: StoreError,
    },
}

impl TreeEvent {
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TreeEvent::Created(_)
                | TreeEvent::Updated(_)
                | TreeEvent::Removed(_)
                | TreeEvent::Moved { .. }
        )
    }
}
