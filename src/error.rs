use std::io;

use thiserror::Error;

use crate::ids::NodeId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no bookmark with id {0}")]
    NotFound(NodeId),
    #[error("{0} is not a folder")]
    NotAFolder(NodeId),
    #[error("{0} is a protected root folder")]
    ImmutableRoot(NodeId),
    #[error("index {index} out of range for {parent} ({len} children)")]
    InvalidIndex {
        parent: NodeId,
        index: usize,
        len: usize,
    },
    #[error("folder {0} is not empty")]
    FolderNotEmpty(NodeId),
    #[error("cannot move {0} into itself or a descendant")]
    MoveIntoSelf(NodeId),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("store worker disconnected")]
    Disconnected,
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("malformed id list: {0:?}")]
    MalformedIdList(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Failures the synchronizer reports before anything is sent to the store.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0} is no longer in the view")]
    StaleReference(NodeId),
    #[error("{0} is not a folder")]
    NotAFolder(NodeId),
    #[error("{0} is a protected root folder")]
    ProtectedRoot(NodeId),
    #[error("cannot move {0} into its own subtree")]
    IntoOwnSubtree(NodeId),
    #[error(transparent)]
    Store(#[from] StoreError),
}
