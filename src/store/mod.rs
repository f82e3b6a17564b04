//! The authoritative bookmark tree and the asynchronous channel used to reach it.

mod client;
mod memory;

pub use client::{
    InlineHandle, InlineTransport, RequestId, StoreClient, StoreReply, StoreTransport,
    ThreadedTransport,
};
pub use memory::{JsonFileStore, MemoryStore};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::ids::NodeId;

pub const ROOT_ID: &str = "0";

/// A folder or bookmark as the store reports it. Folders never carry a url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Milliseconds since the epoch.
    #[serde(default)]
    pub date_added: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Node>>,
}

impl Node {
    pub fn is_folder(&self) -> bool {
        self.url.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateDetails {
    pub parent_id: NodeId,
    /// `None` appends.
    pub index: Option<usize>,
    pub title: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateChanges {
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub parent_id: NodeId,
    /// Position in the destination's child list as it is before the node is taken out.
    /// `None` appends.
    pub index: Option<usize>,
}

pub trait BookmarkStore {
    fn get(&self, id: &NodeId) -> Result<Node, StoreError>;
    fn get_children(&self, id: &NodeId) -> Result<Vec<Node>, StoreError>;
    fn get_tree(&self) -> Result<Node, StoreError>;
    fn create(&mut self, details: CreateDetails) -> Result<Node, StoreError>;
    fn update(&mut self, id: &NodeId, changes: UpdateChanges) -> Result<Node, StoreError>;
    fn move_node(&mut self, id: &NodeId, destination: Destination) -> Result<Node, StoreError>;
    fn remove(&mut self, id: &NodeId) -> Result<(), StoreError>;
    fn remove_tree(&mut self, id: &NodeId) -> Result<(), StoreError>;
    fn search(&self, query: &str) -> Result<Vec<Node>, StoreError>;

    /// Picks up changes made behind the store's back. Returns whether anything was reloaded.
    fn reload(&mut self) -> Result<bool, StoreError> {
        Ok(false)
    }
}

impl<S: BookmarkStore + ?Sized> BookmarkStore for Box<S> {
    fn get(&self, id: &NodeId) -> Result<Node, StoreError> {
        (**self).get(id)
    }
    fn get_children(&self, id: &NodeId) -> Result<Vec<Node>, StoreError> {
        (**self).get_children(id)
    }
    fn get_tree(&self) -> Result<Node, StoreError> {
        (**self).get_tree()
    }
    fn create(&mut self, details: CreateDetails) -> Result<Node, StoreError> {
        (**self).create(details)
    }
    fn update(&mut self, id: &NodeId, changes: UpdateChanges) -> Result<Node, StoreError> {
        (**self).update(id, changes)
    }
    fn move_node(&mut self, id: &NodeId, destination: Destination) -> Result<Node, StoreError> {
        (**self).move_node(id, destination)
    }
    fn remove(&mut self, id: &NodeId) -> Result<(), StoreError> {
        (**self).remove(id)
    }
    fn remove_tree(&mut self, id: &NodeId) -> Result<(), StoreError> {
        (**self).remove_tree(id)
    }
    fn search(&self, query: &str) -> Result<Vec<Node>, StoreError> {
        (**self).search(query)
    }
    fn reload(&mut self) -> Result<bool, StoreError> {
        (**self).reload()
    }
}

/// One store call, in the form it travels to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Get(NodeId),
    GetChildren(NodeId),
    GetTree,
    Create(CreateDetails),
    Update(NodeId, UpdateChanges),
    Move(NodeId, Destination),
    Remove(NodeId),
    RemoveTree(NodeId),
    Search(String),
}

impl StoreOp {
    pub fn name(&self) -> &'static str {
        match self {
            StoreOp::Get(_) => "get",
            StoreOp::GetChildren(_) => "getChildren",
            StoreOp::GetTree => "getTree",
            StoreOp::Create(_) => "create",
            StoreOp::Update(..) => "update",
            StoreOp::Move(..) => "move",
            StoreOp::Remove(_) => "remove",
            StoreOp::RemoveTree(_) => "removeTree",
            StoreOp::Search(_) => "search",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutput {
    Node(Node),
    Nodes(Vec<Node>),
    Done,
}

/// A full-tree read re-syncs with the backing storage first.
pub fn execute<S: BookmarkStore + ?Sized>(
    store: &mut S,
    op: StoreOp,
) -> Result<StoreOutput, StoreError> {
    match op {
        StoreOp::Get(id) => store.get(&id).map(StoreOutput::Node),
        StoreOp::GetChildren(id) => store.get_children(&id).map(StoreOutput::Nodes),
        StoreOp::GetTree => {
            store.reload()?;
            store.get_tree().map(StoreOutput::Node)
        }
        StoreOp::Create(details) => store.create(details).map(StoreOutput::Node),
        StoreOp::Update(id, changes) => store.update(&id, changes).map(StoreOutput::Node),
        StoreOp::Move(id, destination) => store.move_node(&id, destination).map(StoreOutput::Node),
        StoreOp::Remove(id) => store.remove(&id).map(|()| StoreOutput::Done),
        StoreOp::RemoveTree(id) => store.remove_tree(&id).map(|()| StoreOutput::Done),
        StoreOp::Search(query) => store.search(&query).map(StoreOutput::Nodes),
    }
}
