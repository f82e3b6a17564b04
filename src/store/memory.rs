use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use url::Url;

use super::{BookmarkStore, CreateDetails, Destination, Node, ROOT_ID, UpdateChanges};
use crate::error::StoreError;
use crate::ids::NodeId;

#[derive(Debug, Clone)]
struct Entry {
    parent: Option<NodeId>,
    title: String,
    url: Option<String>,
    date_added: u64,
    children: Vec<NodeId>,
}

/// In-memory bookmark tree with the immutable root `0` and two protected folders below it.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: HashMap<NodeId, Entry>,
    next_id: u64,
    last_stamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    next_id: u64,
    root: Node,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut store = Self {
            entries: HashMap::new(),
            next_id: 3,
            last_stamp: 0,
        };
        let stamp = store.stamp();
        store.entries.insert(
            NodeId::from(ROOT_ID),
            Entry {
                parent: None,
                title: String::new(),
                url: None,
                date_added: stamp,
                children: vec![NodeId::from("1"), NodeId::from("2")],
            },
        );
        for (id, title) in [("1", "Bookmarks Bar"), ("2", "Other Bookmarks")] {
            store.entries.insert(
                NodeId::from(id),
                Entry {
                    parent: Some(NodeId::from(ROOT_ID)),
                    title: title.to_string(),
                    url: None,
                    date_added: stamp,
                    children: Vec::new(),
                },
            );
        }
        store
    }

    /// The root and its direct children cannot be edited, moved or removed.
    pub fn is_protected(&self, id: &NodeId) -> bool {
        id.as_str() == ROOT_ID
            || self
                .entries
                .get(id)
                .and_then(|e| e.parent.as_ref())
                .is_some_and(|p| p.as_str() == ROOT_ID)
    }

    fn stamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        // Strictly increasing so creation order is always recoverable.
        self.last_stamp = now.max(self.last_stamp + 1);
        self.last_stamp
    }

    fn entry(&self, id: &NodeId) -> Result<&Entry, StoreError> {
        self.entries
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn folder(&self, id: &NodeId) -> Result<&Entry, StoreError> {
        let entry = self.entry(id)?;
        if entry.url.is_some() {
            return Err(StoreError::NotAFolder(id.clone()));
        }
        Ok(entry)
    }

    fn index_of(&self, id: &NodeId) -> usize {
        self.entries
            .get(id)
            .and_then(|e| e.parent.as_ref())
            .and_then(|p| self.entries.get(p))
            .and_then(|p| p.children.iter().position(|c| c == id))
            .unwrap_or(0)
    }

    fn node(&self, id: &NodeId, with_children: bool) -> Result<Node, StoreError> {
        let entry = self.entry(id)?;
        let children = if with_children && entry.url.is_none() {
            Some(
                entry
                    .children
                    .iter()
                    .map(|c| self.node(c, true))
                    .collect::<Result<Vec<_>, _>>()?,
            )
        } else {
            None
        };
        Ok(Node {
            id: id.clone(),
            parent_id: entry.parent.clone(),
            index: self.index_of(id),
            title: entry.title.clone(),
            url: entry.url.clone(),
            date_added: entry.date_added,
            children,
        })
    }

    fn is_same_or_ancestor(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        let mut cursor = Some(id.clone());
        while let Some(current) = cursor {
            if &current == ancestor {
                return true;
            }
            cursor = self.entries.get(&current).and_then(|e| e.parent.clone());
        }
        false
    }

    fn detach(&mut self, id: &NodeId) {
        let parent = self.entries.get(id).and_then(|e| e.parent.clone());
        if let Some(parent) = parent
            && let Some(entry) = self.entries.get_mut(&parent)
        {
            entry.children.retain(|c| c != id);
        }
    }

    fn drop_subtree(&mut self, id: &NodeId) {
        if let Some(entry) = self.entries.remove(id) {
            for child in entry.children {
                self.drop_subtree(&child);
            }
        }
    }

    fn insert_loaded(&mut self, node: &Node, parent: Option<NodeId>) {
        let children = node.children.clone().unwrap_or_default();
        self.entries.insert(
            node.id.clone(),
            Entry {
                parent,
                title: node.title.clone(),
                url: node.url.clone(),
                date_added: node.date_added,
                children: children.iter().map(|c| c.id.clone()).collect(),
            },
        );
        self.last_stamp = self.last_stamp.max(node.date_added);
        for child in &children {
            self.insert_loaded(child, Some(node.id.clone()));
        }
    }

    fn from_file(file: StoreFile) -> Self {
        let mut store = Self {
            entries: HashMap::new(),
            next_id: file.next_id,
            last_stamp: 0,
        };
        store.insert_loaded(&file.root, None);
        store
    }

    fn to_file(&self) -> Result<StoreFile, StoreError> {
        Ok(StoreFile {
            next_id: self.next_id,
            root: self.get_tree()?,
        })
    }
}

fn validate_url(raw: &str) -> Result<(), StoreError> {
    Url::parse(raw)
        .map(|_| ())
        .map_err(|_| StoreError::InvalidUrl(raw.to_string()))
}

impl BookmarkStore for MemoryStore {
    fn get(&self, id: &NodeId) -> Result<Node, StoreError> {
        self.node(id, false)
    }

    fn get_children(&self, id: &NodeId) -> Result<Vec<Node>, StoreError> {
        self.folder(id)?
            .children
            .iter()
            .map(|c| self.node(c, false))
            .collect()
    }

    fn get_tree(&self) -> Result<Node, StoreError> {
        self.node(&NodeId::from(ROOT_ID), true)
    }

    fn create(&mut self, details: CreateDetails) -> Result<Node, StoreError> {
        if details.parent_id.as_str() == ROOT_ID {
            return Err(StoreError::ImmutableRoot(details.parent_id));
        }
        let len = self.folder(&details.parent_id)?.children.len();
        let index = details.index.unwrap_or(len);
        if index > len {
            return Err(StoreError::InvalidIndex {
                parent: details.parent_id,
                index,
                len,
            });
        }
        if let Some(url) = details.url.as_deref() {
            validate_url(url)?;
        }
        let id = NodeId::new(self.next_id.to_string());
        self.next_id += 1;
        let date_added = self.stamp();
        self.entries.insert(
            id.clone(),
            Entry {
                parent: Some(details.parent_id.clone()),
                title: details.title,
                url: details.url,
                date_added,
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.entries.get_mut(&details.parent_id) {
            parent.children.insert(index, id.clone());
        }
        self.node(&id, false)
    }

    fn update(&mut self, id: &NodeId, changes: UpdateChanges) -> Result<Node, StoreError> {
        if self.is_protected(id) {
            return Err(StoreError::ImmutableRoot(id.clone()));
        }
        let is_folder = self.entry(id)?.url.is_none();
        let url = match changes.url {
            Some(url) if !is_folder && !url.is_empty() => {
                validate_url(&url)?;
                Some(url)
            }
            _ => None,
        };
        if let Some(entry) = self.entries.get_mut(id) {
            if let Some(title) = changes.title {
                entry.title = title;
            }
            if url.is_some() {
                entry.url = url;
            }
        }
        self.node(id, false)
    }

    fn move_node(&mut self, id: &NodeId, destination: Destination) -> Result<Node, StoreError> {
        if self.is_protected(id) {
            return Err(StoreError::ImmutableRoot(id.clone()));
        }
        self.entry(id)?;
        if destination.parent_id.as_str() == ROOT_ID {
            return Err(StoreError::ImmutableRoot(destination.parent_id));
        }
        let len = self.folder(&destination.parent_id)?.children.len();
        if self.is_same_or_ancestor(id, &destination.parent_id) {
            return Err(StoreError::MoveIntoSelf(id.clone()));
        }
        let mut index = destination.index.unwrap_or(len);
        if index > len {
            return Err(StoreError::InvalidIndex {
                parent: destination.parent_id,
                index,
                len,
            });
        }
        let old_parent = self.entry(id)?.parent.clone();
        let old_index = self.index_of(id);
        if old_parent.as_ref() == Some(&destination.parent_id) && old_index < index {
            index -= 1;
        }
        self.detach(id);
        if let Some(parent) = self.entries.get_mut(&destination.parent_id) {
            let index = index.min(parent.children.len());
            parent.children.insert(index, id.clone());
        }
        if let Some(entry) = self.entries.get_mut(id) {
            entry.parent = Some(destination.parent_id);
        }
        self.node(id, false)
    }

    fn remove(&mut self, id: &NodeId) -> Result<(), StoreError> {
        if self.is_protected(id) {
            return Err(StoreError::ImmutableRoot(id.clone()));
        }
        if !self.entry(id)?.children.is_empty() {
            return Err(StoreError::FolderNotEmpty(id.clone()));
        }
        self.detach(id);
        self.entries.remove(id);
        Ok(())
    }

    fn remove_tree(&mut self, id: &NodeId) -> Result<(), StoreError> {
        if self.is_protected(id) {
            return Err(StoreError::ImmutableRoot(id.clone()));
        }
        self.folder(id)?;
        self.detach(id);
        self.drop_subtree(id);
        Ok(())
    }

    fn search(&self, query: &str) -> Result<Vec<Node>, StoreError> {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits = Vec::new();
        for (id, entry) in &self.entries {
            if self.is_protected(id) {
                continue;
            }
            let title = entry.title.to_lowercase();
            let url = entry.url.as_deref().unwrap_or_default().to_lowercase();
            if tokens
                .iter()
                .all(|t| title.contains(t.as_str()) || url.contains(t.as_str()))
            {
                hits.push(self.node(id, false)?);
            }
        }
        hits.sort_by(|a, b| a.date_added.cmp(&b.date_added));
        Ok(hits)
    }
}

/// [`MemoryStore`] that writes itself to a JSON file after every mutation.
pub struct JsonFileStore {
    inner: MemoryStore,
    path: PathBuf,
    /// Modification time and length of the file as last read or written.
    seen: Option<(SystemTime, u64)>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let inner = match fs::read_to_string(&path) {
            Ok(raw) => MemoryStore::from_file(serde_json::from_str::<StoreFile>(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => MemoryStore::new(),
            Err(err) => return Err(err.into()),
        };
        let mut store = Self {
            inner,
            path,
            seen: None,
        };
        if store.path.exists() {
            store.seen = store.file_stamp();
        } else {
            store.save()?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_stamp(&self) -> Option<(SystemTime, u64)> {
        let meta = fs::metadata(&self.path).ok()?;
        Some((meta.modified().ok()?, meta.len()))
    }

    fn save(&mut self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(&self.inner.to_file()?)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;
        self.seen = self.file_stamp();
        Ok(())
    }
}

impl BookmarkStore for JsonFileStore {
    fn get(&self, id: &NodeId) -> Result<Node, StoreError> {
        self.inner.get(id)
    }

    fn get_children(&self, id: &NodeId) -> Result<Vec<Node>, StoreError> {
        self.inner.get_children(id)
    }

    fn get_tree(&self) -> Result<Node, StoreError> {
        self.inner.get_tree()
    }

    fn create(&mut self, details: CreateDetails) -> Result<Node, StoreError> {
        let node = self.inner.create(details)?;
        self.save()?;
        Ok(node)
    }

    fn update(&mut self, id: &NodeId, changes: UpdateChanges) -> Result<Node, StoreError> {
        let node = self.inner.update(id, changes)?;
        self.save()?;
        Ok(node)
    }

    fn move_node(&mut self, id: &NodeId, destination: Destination) -> Result<Node, StoreError> {
        let node = self.inner.move_node(id, destination)?;
        self.save()?;
        Ok(node)
    }

    fn remove(&mut self, id: &NodeId) -> Result<(), StoreError> {
        self.inner.remove(id)?;
        self.save()
    }

    fn remove_tree(&mut self, id: &NodeId) -> Result<(), StoreError> {
        self.inner.remove_tree(id)?;
        self.save()
    }

    fn search(&self, query: &str) -> Result<Vec<Node>, StoreError> {
        self.inner.search(query)
    }

    fn reload(&mut self) -> Result<bool, StoreError> {
        let stamp = self.file_stamp();
        if stamp.is_none() || stamp == self.seen {
            return Ok(false);
        }
        let raw = fs::read_to_string(&self.path)?;
        self.inner = MemoryStore::from_file(serde_json::from_str::<StoreFile>(&raw)?);
        self.seen = stamp;
        tracing::info!(path = %self.path.display(), "bookmark file changed on disk, reloaded");
        Ok(true)
    }
}
