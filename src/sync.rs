//! Keeps the retained view consistent with the store.
//!
//! Every structural operation is submitted to the store and recorded as a continuation keyed by
//! request id. Replies are applied in [`TreeSynchronizer::poll`]; nothing in the view changes
//! before the store confirms. Continuations look their target up by id again when they run, so a
//! reply for something that has since left the view is dropped.

use std::collections::{HashMap, HashSet};

use crate::error::{StoreError, SyncError};
use crate::events::TreeEvent;
use crate::ids::{IdSet, NodeId};
use crate::persistence::KeyValueStore;
use crate::render::{Labels, RenderContext, Rendered, display_label, render, render_item};
use crate::search::{SearchOverlay, ViewSnapshot};
use crate::separator::{SeparatorRegistry, SeparatorSet};
use crate::settings::{
    KEY_FOCUS_ID, KEY_LEGACY_SEPARATORS, KEY_OPENS, KEY_SCROLL_TOP, Settings, load_expanded,
};
use crate::store::{
    CreateDetails, Destination, Node, ROOT_ID, RequestId, StoreClient, StoreOp, StoreOutput,
    StoreReply, UpdateChanges,
};
use crate::view::{Children, Fragment, ItemKind, SubtreeCounts, ViewTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// First child of the reference folder.
    Top,
    /// Last child of the reference folder.
    Bottom,
    Before,
    After,
}

#[derive(Debug)]
enum Pending {
    Load,
    FetchChildren(NodeId),
    OpenAll(NodeId),
    Create { is_separator: bool },
    Update(NodeId),
    Move { id: NodeId, old_parent: NodeId },
    Remove(NodeId),
    Search,
    LegacyLookup(NodeId),
    LegacyMigrate(NodeId),
}

impl Pending {
    fn op_name(&self) -> &'static str {
        match self {
            Pending::Load => "getTree",
            Pending::FetchChildren(_) | Pending::OpenAll(_) => "getChildren",
            Pending::Create { .. } => "create",
            Pending::Update(_) => "update",
            Pending::Move { .. } => "move",
            Pending::Remove(_) => "remove",
            Pending::Search => "search",
            Pending::LegacyLookup(_) => "get",
            Pending::LegacyMigrate(_) => "update",
        }
    }
}

pub struct TreeSynchronizer {
    client: StoreClient,
    view: ViewTree,
    expanded: IdSet,
    registry: SeparatorRegistry,
    separators: SeparatorSet,
    labels: Labels,
    /// Children that arrived with `getTree` for folders that were collapsed at the time.
    cache: HashMap<NodeId, Vec<Node>>,
    /// Folders whose children changed while their fetch was in flight.
    refetch: HashSet<NodeId>,
    pending: HashMap<RequestId, Pending>,
    search: SearchOverlay,
    kv: Box<dyn KeyValueStore>,
    events: Vec<TreeEvent>,
    restore: Option<ViewSnapshot>,
    opens: Vec<String>,
    /// Ids from the old separator list still waiting to be rewritten in the store.
    legacy: IdSet,
    legacy_started: bool,
}

impl TreeSynchronizer {
    pub fn new(client: StoreClient, mut kv: Box<dyn KeyValueStore>, settings: &Settings) -> Self {
        let expanded = load_expanded(kv.as_ref());
        let mut separators = SeparatorSet::new();
        let mut legacy = IdSet::new();
        if let Some(raw) = kv.get(KEY_LEGACY_SEPARATORS) {
            let imported = separators.import_legacy(&raw);
            tracing::info!(imported, "imported legacy separator list");
            legacy = IdSet::parse_legacy(&raw).unwrap_or_default();
            if legacy.is_empty()
                && let Err(err) = kv.remove(KEY_LEGACY_SEPARATORS)
            {
                tracing::warn!(%err, "failed to drop legacy separator list");
            }
        }
        Self {
            client,
            view: ViewTree::new(NodeId::from(ROOT_ID)),
            expanded,
            registry: SeparatorRegistry::new(settings.separator.clone()),
            separators,
            labels: Labels::default(),
            cache: HashMap::new(),
            refetch: HashSet::new(),
            pending: HashMap::new(),
            search: SearchOverlay::new(),
            kv,
            events: Vec::new(),
            restore: Some(ViewSnapshot {
                scroll: settings.scroll_top,
                focus: settings.focus_id.clone(),
            }),
            opens: Vec::new(),
            legacy,
            legacy_started: false,
        }
    }

    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn view(&self) -> &ViewTree {
        &self.view
    }

    pub fn expanded(&self) -> &IdSet {
        &self.expanded
    }

    pub fn separators(&self) -> &SeparatorSet {
        &self.separators
    }

    pub fn registry(&self) -> &SeparatorRegistry {
        &self.registry
    }

    pub fn search_overlay(&self) -> &SearchOverlay {
        &self.search
    }

    pub fn search_overlay_mut(&mut self) -> &mut SearchOverlay {
        &mut self.search
    }

    pub fn kv(&self) -> &dyn KeyValueStore {
        self.kv.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn submit(&mut self, op: StoreOp, pending: Pending) -> Result<RequestId, SyncError> {
        let id = self.client.submit(op)?;
        self.pending.insert(id, pending);
        Ok(id)
    }

    fn render_nodes(&self, nodes: &[Node], level: usize, parent: &NodeId) -> Rendered {
        let ctx = RenderContext {
            expanded: &self.expanded,
            registry: &self.registry,
            separators: &self.separators,
            labels: &self.labels,
        };
        render(nodes, level, parent, &ctx)
    }

    /// Records the side effects of a render pass and hands back the fragment to splice.
    fn absorb(&mut self, rendered: Rendered) -> (Fragment, Vec<NodeId>) {
        for id in rendered.separators {
            self.separators.add(id);
        }
        for (folder, children) in rendered.cached {
            self.cache.insert(folder, children);
        }
        (rendered.fragment, rendered.fetches)
    }

    fn start_fetches(&mut self, folders: Vec<NodeId>) {
        for folder in folders {
            let op = StoreOp::GetChildren(folder.clone());
            if let Err(err) = self.submit(op, Pending::FetchChildren(folder.clone())) {
                tracing::warn!(folder = %folder, %err, "child fetch not sent");
                self.view.set_children(&folder, Children::Unfetched);
            }
        }
    }

    fn persist_expanded(&mut self) {
        if let Err(err) = self.kv.set(KEY_OPENS, &self.expanded.serialize()) {
            tracing::warn!(%err, "failed to persist open folders");
        }
    }

    /// Fetches the whole tree and renders it from scratch.
    pub fn load(&mut self) -> Result<RequestId, SyncError> {
        self.submit(StoreOp::GetTree, Pending::Load)
    }

    /// Like [`load`](Self::load) but keeps the current scroll offset and focus.
    pub fn refresh(&mut self) -> Result<RequestId, SyncError> {
        if self.restore.is_none() {
            self.restore = Some(ViewSnapshot {
                scroll: self.view.scroll(),
                focus: self.view.focused().cloned(),
            });
        }
        self.load()
    }

    pub fn insert(
        &mut self,
        reference: &NodeId,
        position: InsertPosition,
        title: &str,
        url: Option<&str>,
        is_separator: bool,
    ) -> Result<RequestId, SyncError> {
        let item = self
            .view
            .get(reference)
            .ok_or_else(|| SyncError::StaleReference(reference.clone()))?;
        let (parent_id, index) = match position {
            InsertPosition::Top | InsertPosition::Bottom => {
                if !item.is_folder() {
                    return Err(SyncError::NotAFolder(reference.clone()));
                }
                let index = (position == InsertPosition::Top).then_some(0);
                (reference.clone(), index)
            }
            InsertPosition::Before | InsertPosition::After => {
                if self.view.is_protected(reference) {
                    return Err(SyncError::ProtectedRoot(reference.clone()));
                }
                let own = self
                    .view
                    .position_in_parent(reference)
                    .ok_or_else(|| SyncError::StaleReference(reference.clone()))?;
                let index = if position == InsertPosition::Before { own } else { own + 1 };
                (item.parent_id.clone(), Some(index))
            }
        };
        let config = self.registry.config();
        let (title, url) = if is_separator {
            let title = if title.is_empty() { config.title.clone() } else { title.to_string() };
            (title, Some(url.map_or_else(|| config.url.clone(), str::to_string)))
        } else {
            (title.to_string(), url.map(str::to_string))
        };
        self.submit(
            StoreOp::Create(CreateDetails {
                parent_id,
                index,
                title,
                url,
            }),
            Pending::Create { is_separator },
        )
    }

    /// Removes a bookmark, or a folder with everything in it.
    pub fn remove(&mut self, id: &NodeId) -> Result<RequestId, SyncError> {
        let item = self
            .view
            .get(id)
            .ok_or_else(|| SyncError::StaleReference(id.clone()))?;
        if self.view.is_protected(id) {
            return Err(SyncError::ProtectedRoot(id.clone()));
        }
        let op = if item.is_folder() {
            StoreOp::RemoveTree(id.clone())
        } else {
            StoreOp::Remove(id.clone())
        };
        self.submit(op, Pending::Remove(id.clone()))
    }

    /// Counts for a delete confirmation. `None` when the node is not in the view.
    pub fn removal_summary(&self, id: &NodeId) -> Option<SubtreeCounts> {
        self.view.contains(id).then(|| self.view.counts(id))
    }

    pub fn rename(&mut self, id: &NodeId, title: &str) -> Result<RequestId, SyncError> {
        self.edit(id, Some(title), None)
    }

    pub fn edit_url(&mut self, id: &NodeId, url: &str) -> Result<RequestId, SyncError> {
        self.edit(id, None, Some(url))
    }

    /// Folder urls are always dropped.
    pub fn edit(&mut self, id: &NodeId, title: Option<&str>, url: Option<&str>) -> Result<RequestId, SyncError> {
        let item = self
            .view
            .get(id)
            .ok_or_else(|| SyncError::StaleReference(id.clone()))?;
        if self.view.is_protected(id) {
            return Err(SyncError::ProtectedRoot(id.clone()));
        }
        let url = if item.is_folder() { None } else { url.map(str::to_string) };
        self.submit(
            StoreOp::Update(
                id.clone(),
                UpdateChanges {
                    title: title.map(str::to_string),
                    url,
                },
            ),
            Pending::Update(id.clone()),
        )
    }

    pub fn move_node(&mut self, id: &NodeId, destination: Destination) -> Result<RequestId, SyncError> {
        let item = self
            .view
            .get(id)
            .ok_or_else(|| SyncError::StaleReference(id.clone()))?;
        if self.view.is_protected(id) {
            return Err(SyncError::ProtectedRoot(id.clone()));
        }
        if destination.parent_id.as_str() == ROOT_ID {
            return Err(SyncError::ProtectedRoot(destination.parent_id));
        }
        if &destination.parent_id == id || self.view.is_ancestor(id, &destination.parent_id) {
            return Err(SyncError::IntoOwnSubtree(id.clone()));
        }
        let old_parent = item.parent_id.clone();
        self.submit(
            StoreOp::Move(id.clone(), destination),
            Pending::Move {
                id: id.clone(),
                old_parent,
            },
        )
    }

    /// Flips a folder open or closed. Opening a folder whose children were never fetched
    /// renders them from the cache or starts one fetch; a fetch already in flight is reused.
    pub fn toggle_expand(&mut self, folder: &NodeId) -> Result<bool, SyncError> {
        let open = !self
            .view
            .get(folder)
            .ok_or_else(|| SyncError::StaleReference(folder.clone()))?
            .is_expanded();
        self.set_expanded(folder, open)?;
        Ok(open)
    }

    pub fn set_expanded(&mut self, folder: &NodeId, open: bool) -> Result<(), SyncError> {
        let item = self
            .view
            .get(folder)
            .ok_or_else(|| SyncError::StaleReference(folder.clone()))?;
        let Some(children) = item.children().cloned() else {
            return Err(SyncError::NotAFolder(folder.clone()));
        };
        let level = item.level + 1;
        let changed = if open {
            self.expanded.insert(folder.clone())
        } else {
            self.expanded.remove(folder)
        };
        if changed {
            self.persist_expanded();
        }
        self.view.set_expanded(folder, open);
        if open && children == Children::Unfetched {
            match self.cache.remove(folder) {
                Some(cached) => {
                    let rendered = self.render_nodes(&cached, level, folder);
                    let (fragment, fetches) = self.absorb(rendered);
                    self.view.set_children(folder, Children::Loading);
                    self.view.fill_placeholder(folder, fragment);
                    self.start_fetches(fetches);
                }
                None => {
                    self.view.set_children(folder, Children::Loading);
                    self.start_fetches(vec![folder.clone()]);
                }
            }
        }
        Ok(())
    }

    /// Moves keyboard focus and reports folders to listeners.
    pub fn focus(&mut self, id: Option<NodeId>) {
        self.view.set_focus(id);
        if let Some(focused) = self.view.focused()
            && self.view.get(focused).is_some_and(|item| item.is_folder())
        {
            self.events.push(TreeEvent::FolderFocused(focused.clone()));
        }
    }

    pub fn set_active(&mut self, id: Option<NodeId>) {
        self.view.set_active(id);
    }

    pub fn set_scroll(&mut self, offset: usize) {
        self.view.set_scroll(offset);
    }

    /// Queues every bookmark directly inside `folder` for opening; see [`take_opens`](Self::take_opens).
    pub fn open_all(&mut self, folder: &NodeId) -> Result<(), SyncError> {
        let item = self
            .view
            .get(folder)
            .ok_or_else(|| SyncError::StaleReference(folder.clone()))?;
        match item.children().cloned() {
            None => Err(SyncError::NotAFolder(folder.clone())),
            Some(Children::Loaded(ids)) => {
                let urls: Vec<String> = ids
                    .iter()
                    .filter_map(|id| self.view.get(id))
                    .filter_map(|child| match &child.kind {
                        ItemKind::Bookmark { url } => Some(url.clone()),
                        _ => None,
                    })
                    .collect();
                self.opens.extend(urls);
                Ok(())
            }
            Some(_) => {
                let op = StoreOp::GetChildren(folder.clone());
                self.submit(op, Pending::OpenAll(folder.clone()))?;
                Ok(())
            }
        }
    }

    pub fn take_opens(&mut self) -> Vec<String> {
        std::mem::take(&mut self.opens)
    }

    /// An empty query leaves search and restores the tree position.
    pub fn search(&mut self, query: &str) -> Result<Option<RequestId>, SyncError> {
        if query.trim().is_empty() {
            self.exit_search();
            return Ok(None);
        }
        let snapshot = ViewSnapshot {
            scroll: self.view.scroll(),
            focus: self.view.focused().cloned(),
        };
        if self.search.enter(snapshot) {
            self.events.push(TreeEvent::SearchEntered);
        }
        let id = self.submit(StoreOp::Search(query.to_string()), Pending::Search)?;
        self.search.set_query(query, id);
        Ok(Some(id))
    }

    pub fn exit_search(&mut self) {
        if let Some(snapshot) = self.search.exit() {
            self.view.set_scroll(snapshot.scroll);
            self.view.set_focus(snapshot.focus);
            self.events.push(TreeEvent::SearchExited);
        }
    }

    /// Scroll offset and focus for the next session. An open search is closed first so the
    /// saved position is the tree's.
    pub fn save_view_state(&mut self) {
        self.exit_search();
        let scroll = self.view.scroll().to_string();
        let focus = self.view.focused().map(NodeId::to_string).unwrap_or_default();
        for (key, value) in [(KEY_SCROLL_TOP, scroll), (KEY_FOCUS_ID, focus)] {
            if let Err(err) = self.kv.set(key, &value) {
                tracing::warn!(key, %err, "failed to persist view state");
            }
        }
    }

    /// Applies every reply that has arrived and returns the events they produced.
    pub fn poll(&mut self) -> Vec<TreeEvent> {
        while let Some(reply) = self.client.try_recv() {
            self.handle_reply(reply);
        }
        self.take_events()
    }

    pub fn take_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn handle_reply(&mut self, reply: StoreReply) {
        let Some(pending) = self.pending.remove(&reply.id) else {
            tracing::debug!(request = reply.id, "reply for unknown request");
            return;
        };
        let op = pending.op_name();
        match (pending, reply.result) {
            (Pending::FetchChildren(folder), Err(error)) => {
                if self.view.get(&folder).and_then(|i| i.children()) == Some(&Children::Loading) {
                    self.view.set_children(&folder, Children::Unfetched);
                }
                self.reject(reply.id, op, error);
            }
            (Pending::Search, Err(error)) => {
                self.search.clear_pending(reply.id);
                self.reject(reply.id, op, error);
            }
            (Pending::LegacyLookup(id), Err(StoreError::NotFound(_))) => self.finish_legacy(&id),
            (_, Err(error)) => self.reject(reply.id, op, error),
            (Pending::Load, Ok(StoreOutput::Node(root))) => self.apply_load(root),
            (Pending::FetchChildren(folder), Ok(StoreOutput::Nodes(nodes))) => {
                self.apply_children(folder, nodes)
            }
            (Pending::OpenAll(_), Ok(StoreOutput::Nodes(nodes))) => {
                let urls = nodes
                    .into_iter()
                    .filter_map(|n| n.url.filter(|url| !self.registry.is_separator(&n.title, url)));
                self.opens.extend(urls);
            }
            (Pending::Create { is_separator }, Ok(StoreOutput::Node(node))) => {
                self.apply_create(node, is_separator)
            }
            (Pending::Update(_), Ok(StoreOutput::Node(node))) => self.apply_update(node),
            (Pending::Move { id, old_parent }, Ok(StoreOutput::Node(node))) => {
                self.apply_move(id, old_parent, node)
            }
            (Pending::Remove(id), Ok(StoreOutput::Done)) => self.apply_remove(id),
            (Pending::LegacyLookup(id), Ok(StoreOutput::Node(node))) => self.migrate_legacy(id, node),
            (Pending::LegacyMigrate(id), Ok(StoreOutput::Node(node))) => {
                self.apply_update(node);
                self.finish_legacy(&id);
            }
            (Pending::Search, Ok(StoreOutput::Nodes(nodes))) => {
                if let Some(count) = self.search.apply(reply.id, nodes, &self.registry, &self.labels) {
                    self.events.push(TreeEvent::SearchResults(count));
                } else {
                    tracing::debug!(request = reply.id, "superseded search reply");
                }
            }
            (pending, Ok(output)) => {
                tracing::warn!(request = reply.id, ?pending, ?output, "reply shape does not match request");
            }
        }
    }

    fn reject(&mut self, request: RequestId, op: &'static str, error: StoreError) {
        tracing::warn!(request, op, %error, "store rejected request");
        self.events.push(TreeEvent::Rejected { request, op, error });
    }

    fn apply_load(&mut self, root: Node) {
        let top = root.children.unwrap_or_default();
        let root_id = self.view.root_id().clone();
        let rendered = self.render_nodes(&top, 0, &root_id);
        self.cache.clear();
        self.refetch.clear();
        let (fragment, fetches) = self.absorb(rendered);
        self.view.replace_all(fragment);
        self.start_fetches(fetches);
        if let Some(snapshot) = self.restore.take() {
            self.view.set_scroll(snapshot.scroll);
            self.view.set_focus(snapshot.focus);
        }
        if self.view.focused().is_none() {
            let first = self.view.visible().into_iter().next();
            self.view.set_focus(first);
        }
        self.events.push(TreeEvent::Loaded);
        if !self.legacy_started {
            self.legacy_started = true;
            self.start_legacy_migration();
        }
    }

    /// Bookmarks named by the old separator list get the marker url in the store, so they stay
    /// separators once the list is gone. The list is dropped when every entry is settled.
    fn start_legacy_migration(&mut self) {
        let ids: Vec<NodeId> = self.legacy.iter().cloned().collect();
        for id in ids {
            if let Err(err) = self.submit(StoreOp::Get(id.clone()), Pending::LegacyLookup(id)) {
                tracing::warn!(%err, "failed to look up legacy separator");
            }
        }
    }

    fn migrate_legacy(&mut self, id: NodeId, node: Node) {
        match node.url.as_deref() {
            Some(url) if !self.registry.is_separator(&node.title, url) => {
                let changes = UpdateChanges {
                    title: None,
                    url: Some(self.registry.config().url.clone()),
                };
                let op = StoreOp::Update(id.clone(), changes);
                if let Err(err) = self.submit(op, Pending::LegacyMigrate(id)) {
                    tracing::warn!(%err, "failed to migrate legacy separator");
                }
            }
            // Folders and bookmarks the rules already match need no rewrite.
            _ => self.finish_legacy(&id),
        }
    }

    fn finish_legacy(&mut self, id: &NodeId) {
        if !self.legacy.remove(id) {
            return;
        }
        let result = if self.legacy.is_empty() {
            tracing::info!("legacy separator list migrated");
            self.kv.remove(KEY_LEGACY_SEPARATORS)
        } else {
            self.kv.set(KEY_LEGACY_SEPARATORS, &self.legacy.serialize())
        };
        if let Err(err) = result {
            tracing::warn!(%err, "failed to update legacy separator list");
        }
    }

    fn apply_children(&mut self, folder: NodeId, nodes: Vec<Node>) {
        let Some(level) = self.view.child_level(&folder) else {
            tracing::debug!(folder = %folder, "children for a folder no longer in view");
            return;
        };
        if self.view.get(&folder).and_then(|i| i.children()) != Some(&Children::Loading) {
            tracing::debug!(folder = %folder, "children already materialized");
            return;
        }
        if self.refetch.remove(&folder) {
            self.start_fetches(vec![folder]);
            return;
        }
        let rendered = self.render_nodes(&nodes, level, &folder);
        let (fragment, fetches) = self.absorb(rendered);
        self.view.fill_placeholder(&folder, fragment);
        self.start_fetches(fetches);
    }

    /// Marks a container whose child list changed in the store.
    fn invalidate(&mut self, parent: &NodeId) {
        self.cache.remove(parent);
        if self.view.get(parent).and_then(|i| i.children()) == Some(&Children::Loading) {
            self.refetch.insert(parent.clone());
        }
    }

    fn apply_create(&mut self, node: Node, is_separator: bool) {
        let Some(parent) = node.parent_id.clone() else {
            return;
        };
        self.invalidate(&parent);
        let url = node.url.as_deref().unwrap_or_default();
        if node.url.is_some() && (is_separator || self.registry.is_separator(&node.title, url)) {
            self.separators.add(node.id.clone());
        }
        if let Some(level) = self.view.child_level(&parent)
            && self.view.children_of(&parent).is_some()
        {
            let ctx = RenderContext {
                expanded: &self.expanded,
                registry: &self.registry,
                separators: &self.separators,
                labels: &self.labels,
            };
            let mut item = render_item(&node, level, &parent, &ctx);
            if let ItemKind::Folder { children, .. } = &mut item.kind {
                *children = Children::Loaded(Vec::new());
            }
            let fragment = Fragment {
                top: vec![node.id.clone()],
                items: vec![item],
            };
            self.view.insert_fragment(&parent, node.index, fragment);
            if self.view.visible().contains(&node.id) {
                self.view.set_focus(Some(node.id.clone()));
            }
        }
        self.events.push(TreeEvent::Created(node));
    }

    fn apply_update(&mut self, node: Node) {
        let registry = &self.registry;
        let separators = &mut self.separators;
        let labels = &self.labels;
        match self.view.get_mut(&node.id) {
            Some(item) => {
                item.title = node.title.clone();
                match (&mut item.kind, node.url.as_deref()) {
                    (ItemKind::Folder { .. }, _) | (_, None) => {
                        item.label = display_label(&node.title, None, labels);
                    }
                    (kind, Some(url)) => {
                        if registry.is_separator(&node.title, url) {
                            separators.add(node.id.clone());
                            *kind = ItemKind::Separator { url: url.to_string() };
                            item.label = registry.config().title.clone();
                        } else {
                            separators.remove(&node.id);
                            *kind = ItemKind::Bookmark { url: url.to_string() };
                            item.label = display_label(&node.title, Some(url), labels);
                        }
                    }
                }
            }
            None => tracing::debug!(id = %node.id, "update for a node no longer in view"),
        }
        self.events.push(TreeEvent::Updated(node));
    }

    fn apply_move(&mut self, id: NodeId, old_parent: NodeId, node: Node) {
        let Some(new_parent) = node.parent_id.clone() else {
            return;
        };
        self.invalidate(&old_parent);
        self.invalidate(&new_parent);
        if self.view.contains(&id) {
            let attached = match self.view.child_level(&new_parent) {
                Some(level) if self.view.children_of(&new_parent).is_some() => {
                    self.view.detach(&id);
                    self.view.attach(&id, &new_parent, node.index);
                    self.view.set_level(&id, level);
                    true
                }
                _ => false,
            };
            if !attached {
                // Destination is not materialized; the node leaves the view until it is.
                self.drop_from_view(&id);
            }
        } else {
            tracing::debug!(id = %id, "move for a node no longer in view");
        }
        self.events.push(TreeEvent::Moved { node, old_parent });
    }

    fn apply_remove(&mut self, id: NodeId) {
        let Some(parent) = self.view.get(&id).map(|i| i.parent_id.clone()) else {
            tracing::debug!(id = %id, "remove for a node no longer in view");
            self.events.push(TreeEvent::Removed(id));
            return;
        };
        self.invalidate(&parent);
        self.drop_from_view(&id);
        self.events.push(TreeEvent::Removed(id));
    }

    /// Takes `id` and its subtree out of the view. Focus inside it moves to the next sibling,
    /// else the previous one, else the parent.
    fn drop_from_view(&mut self, id: &NodeId) {
        let Some(parent) = self.view.get(id).map(|i| i.parent_id.clone()) else {
            return;
        };
        let neighbor = self
            .view
            .next_sibling(id)
            .or_else(|| self.view.prev_sibling(id))
            .cloned()
            .or_else(|| (parent.as_str() != ROOT_ID).then(|| parent.clone()));
        let focus_inside = self
            .view
            .focused()
            .is_none_or(|f| f == id || self.view.is_ancestor(id, f));
        for gone in self.view.remove_subtree(id) {
            self.separators.remove(&gone);
            self.cache.remove(&gone);
        }
        if focus_inside {
            self.view.set_focus(neighbor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryKv;
    use crate::store::{BookmarkStore, InlineHandle, InlineTransport, MemoryStore};

    fn setup(store: MemoryStore, kv: MemoryKv) -> (TreeSynchronizer, InlineHandle<MemoryStore>) {
        let (transport, handle) = InlineTransport::new(store);
        let settings = Settings::load(&kv);
        let mut sync = TreeSynchronizer::new(StoreClient::new(transport), Box::new(kv), &settings);
        sync.load().expect("load");
        sync.poll();
        (sync, handle)
    }

    fn create(store: &mut MemoryStore, parent: &NodeId, title: &str, url: Option<&str>) -> NodeId {
        store
            .create(CreateDetails {
                parent_id: parent.clone(),
                index: None,
                title: title.to_string(),
                url: url.map(str::to_string),
            })
            .expect("create")
            .id
    }

    fn bar() -> NodeId {
        NodeId::from("1")
    }

    fn children(sync: &TreeSynchronizer, parent: &NodeId) -> Vec<NodeId> {
        sync.view().children_of(parent).map(<[NodeId]>::to_vec).unwrap_or_default()
    }

    /// Bookmarks bar open with three bookmarks a, b, c.
    fn three_bookmarks() -> (TreeSynchronizer, InlineHandle<MemoryStore>, [NodeId; 3]) {
        let mut store = MemoryStore::new();
        let a = create(&mut store, &bar(), "a", Some("https://a.example/"));
        let b = create(&mut store, &bar(), "b", Some("https://b.example/"));
        let c = create(&mut store, &bar(), "c", Some("https://c.example/"));
        let (sync, handle) = setup(store, MemoryKv::new().with(KEY_OPENS, "1"));
        (sync, handle, [a, b, c])
    }

    #[test]
    fn load_renders_protected_folders_and_open_children() {
        let (sync, _handle, [a, b, c]) = three_bookmarks();
        assert_eq!(children(&sync, &NodeId::from(ROOT_ID)), vec![NodeId::from("1"), NodeId::from("2")]);
        assert_eq!(children(&sync, &bar()), vec![a.clone(), b, c]);
        assert_eq!(sync.view().get(&a).map(|i| i.level), Some(1));
        assert_eq!(sync.view().focused(), Some(&bar()));
    }

    #[test]
    fn insert_before_splices_at_reference_index() {
        let (mut sync, handle, [a, b, c]) = three_bookmarks();
        sync.insert(&b, InsertPosition::Before, "new", Some("https://new.example/"), false)
            .expect("insert");
        let events = sync.poll();
        let created = match events.as_slice() {
            [TreeEvent::Created(node)] => node.clone(),
            other => panic!("unexpected events {other:?}"),
        };
        assert_eq!(created.index, 1);
        assert_eq!(children(&sync, &bar()), vec![a, created.id.clone(), b.clone(), c.clone()]);
        let indices: Vec<usize> = handle
            .with_store(|s| s.get_children(&bar()))
            .expect("children")
            .iter()
            .map(|n| n.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert_eq!(handle.with_store(|s| s.get(&b)).expect("b").index, 2);
        assert_eq!(handle.with_store(|s| s.get(&c)).expect("c").index, 3);
        assert_eq!(sync.view().focused(), Some(&created.id));
    }

    #[test]
    fn insert_beside_protected_folder_is_refused() {
        let (mut sync, handle, _) = three_bookmarks();
        let err = sync
            .insert(&bar(), InsertPosition::After, "x", None, false)
            .unwrap_err();
        assert!(matches!(err, SyncError::ProtectedRoot(_)));
        assert_eq!(handle.count("create"), 0);
    }

    #[test]
    fn separator_insert_uses_marker_url_and_registers() {
        let (mut sync, _handle, [a, ..]) = three_bookmarks();
        sync.insert(&a, InsertPosition::After, "", None, true).expect("insert");
        let events = sync.poll();
        let Some(TreeEvent::Created(node)) = events.first() else {
            panic!("no create event");
        };
        assert_eq!(node.url.as_deref(), Some(crate::separator::DEFAULT_SEPARATOR_URL));
        assert!(sync.separators().contains(&node.id));
        assert!(matches!(
            sync.view().get(&node.id).map(|i| &i.kind),
            Some(ItemKind::Separator { .. })
        ));
    }

    #[test]
    fn failed_store_call_leaves_view_untouched() {
        let (mut sync, _handle, [a, ..]) = three_bookmarks();
        let before = sync.view().visible();
        sync.edit_url(&a, "not a url").expect("submit");
        let events = sync.poll();
        assert!(matches!(events.as_slice(), [TreeEvent::Rejected { op: "update", .. }]));
        assert_eq!(sync.view().visible(), before);
        assert_eq!(sync.view().get(&a).and_then(|i| i.url()), Some("https://a.example/"));
    }

    #[test]
    fn remove_moves_focus_to_next_then_previous_sibling() {
        let (mut sync, _handle, [a, b, c]) = three_bookmarks();
        sync.focus(Some(b.clone()));
        sync.remove(&b).expect("remove");
        sync.poll();
        assert_eq!(sync.view().focused(), Some(&c));
        sync.remove(&c).expect("remove");
        sync.poll();
        assert_eq!(sync.view().focused(), Some(&a));
        sync.remove(&a).expect("remove");
        sync.poll();
        assert_eq!(sync.view().focused(), Some(&bar()));
    }

    #[test]
    fn removing_folder_drops_descendants_and_reports_counts() {
        let mut store = MemoryStore::new();
        let folder = create(&mut store, &bar(), "f", None);
        create(&mut store, &folder, "x", Some("https://x.example/"));
        let inner = create(&mut store, &folder, "inner", None);
        create(&mut store, &inner, "y", Some("https://y.example/"));
        let kv = MemoryKv::new().with(KEY_OPENS, &format!("1,{folder}"));
        let (mut sync, handle) = setup(store, kv);

        let summary = sync.removal_summary(&folder).expect("summary");
        assert_eq!((summary.folders, summary.bookmarks, summary.complete), (1, 1, false));

        sync.remove(&folder).expect("remove");
        sync.poll();
        assert_eq!(handle.count("removeTree"), 1);
        assert!(!sync.view().contains(&inner));
        assert!(children(&sync, &bar()).is_empty());
    }

    #[test]
    fn rename_patches_title_in_place() {
        let (mut sync, _handle, [a, ..]) = three_bookmarks();
        sync.rename(&a, "renamed").expect("rename");
        sync.poll();
        let item = sync.view().get(&a).expect("item");
        assert_eq!(item.label, "renamed");
        assert_eq!(item.url(), Some("https://a.example/"));
    }

    #[test]
    fn editing_url_reclassifies_separator() {
        let mut store = MemoryStore::new();
        let sep = create(&mut store, &bar(), "", Some("http://separator.invalid/#x"));
        let (mut sync, _handle) = setup(store, MemoryKv::new().with(KEY_OPENS, "1"));
        assert!(sync.separators().contains(&sep));

        sync.edit_url(&sep, "https://real.example/").expect("edit");
        sync.poll();
        assert!(!sync.separators().contains(&sep));
        let item = sync.view().get(&sep).expect("item");
        assert!(matches!(item.kind, ItemKind::Bookmark { .. }));
        assert_eq!(item.label, "real.example/");
    }

    #[test]
    fn move_to_current_position_keeps_shape() {
        let (mut sync, handle, [a, b, c]) = three_bookmarks();
        let before = sync.view().visible();
        sync.move_node(
            &b,
            Destination {
                parent_id: bar(),
                index: Some(1),
            },
        )
        .expect("move");
        assert_eq!(
            handle.history().last(),
            Some(&StoreOp::Move(
                b.clone(),
                Destination {
                    parent_id: bar(),
                    index: Some(1)
                }
            ))
        );
        sync.poll();
        assert_eq!(sync.view().visible(), before);
        assert_eq!(children(&sync, &bar()), vec![a, b, c]);
    }

    #[test]
    fn create_inside_collapsed_folder_keeps_focus_visible() {
        let mut store = MemoryStore::new();
        let folder = create(&mut store, &bar(), "f", None);
        let (mut sync, _handle) = setup(store, MemoryKv::new().with(KEY_OPENS, "1"));
        sync.toggle_expand(&folder).expect("open");
        sync.toggle_expand(&folder).expect("close");
        sync.focus(Some(folder.clone()));

        sync.insert(&folder, InsertPosition::Bottom, "hidden", Some("https://hidden.example/"), false)
            .expect("insert");
        let events = sync.poll();
        let Some(TreeEvent::Created(node)) = events.first() else {
            panic!("no create event");
        };
        assert_eq!(children(&sync, &folder), vec![node.id.clone()]);
        assert!(!sync.view().visible().contains(&node.id));
        assert_eq!(sync.view().focused(), Some(&folder));
    }

    #[test]
    fn move_into_unloaded_folder_drops_row_and_refocuses() {
        let mut store = MemoryStore::new();
        let sep = create(&mut store, &bar(), "", Some("http://separator.invalid/#"));
        let next = create(&mut store, &bar(), "next", Some("https://next.example/"));
        let folder = create(&mut store, &bar(), "f", None);
        let (mut sync, handle) = setup(store, MemoryKv::new().with(KEY_OPENS, "1"));
        sync.cache.clear();
        assert!(sync.separators().contains(&sep));
        sync.focus(Some(sep.clone()));

        sync.move_node(
            &sep,
            Destination {
                parent_id: folder.clone(),
                index: None,
            },
        )
        .expect("move");
        sync.poll();
        assert_eq!(handle.with_store(|s| s.get(&sep)).expect("sep").parent_id, Some(folder.clone()));
        assert!(!sync.view().contains(&sep));
        assert!(!sync.separators().contains(&sep));
        assert_eq!(sync.view().focused(), Some(&next));
        assert_eq!(children(&sync, &bar()), vec![next, folder]);
    }

    #[test]
    fn move_into_folder_relevels_subtree() {
        let mut store = MemoryStore::new();
        let outer = create(&mut store, &bar(), "outer", None);
        let inner = create(&mut store, &bar(), "inner", None);
        let leaf = create(&mut store, &inner, "leaf", Some("https://leaf.example/"));
        let kv = MemoryKv::new().with(KEY_OPENS, &format!("1,{outer},{inner}"));
        let (mut sync, _handle) = setup(store, kv);

        sync.move_node(
            &inner,
            Destination {
                parent_id: outer.clone(),
                index: None,
            },
        )
        .expect("move");
        let events = sync.poll();
        assert!(matches!(events.as_slice(), [TreeEvent::Moved { .. }]));
        assert_eq!(children(&sync, &outer), vec![inner.clone()]);
        assert_eq!(sync.view().get(&inner).map(|i| i.level), Some(2));
        assert_eq!(sync.view().get(&leaf).map(|i| i.level), Some(3));
    }

    #[test]
    fn move_into_own_subtree_is_refused_before_the_store() {
        let mut store = MemoryStore::new();
        let outer = create(&mut store, &bar(), "outer", None);
        let inner = create(&mut store, &outer, "inner", None);
        let kv = MemoryKv::new().with(KEY_OPENS, &format!("1,{outer}"));
        let (mut sync, handle) = setup(store, kv);
        let err = sync
            .move_node(
                &outer,
                Destination {
                    parent_id: inner,
                    index: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, SyncError::IntoOwnSubtree(_)));
        assert_eq!(handle.count("move"), 0);
    }

    #[test]
    fn expanding_twice_issues_one_fetch() {
        let mut store = MemoryStore::new();
        let folder = create(&mut store, &bar(), "f", None);
        create(&mut store, &folder, "x", Some("https://x.example/"));
        let (mut sync, handle) = setup(store, MemoryKv::new().with(KEY_OPENS, "1"));
        // Drop the children that came with getTree so the folder has to be fetched.
        sync.cache.clear();
        handle.set_auto(false);

        assert!(sync.toggle_expand(&folder).expect("open"));
        assert!(!sync.toggle_expand(&folder).expect("close"));
        assert!(sync.toggle_expand(&folder).expect("reopen"));
        assert_eq!(handle.count("getChildren"), 1);

        handle.set_auto(true);
        sync.poll();
        assert_eq!(children(&sync, &folder).len(), 1);
    }

    #[test]
    fn cached_children_render_without_fetch() {
        let mut store = MemoryStore::new();
        let folder = create(&mut store, &bar(), "f", None);
        let x = create(&mut store, &folder, "x", Some("https://x.example/"));
        let (mut sync, handle) = setup(store, MemoryKv::new().with(KEY_OPENS, "1"));
        sync.toggle_expand(&folder).expect("open");
        assert_eq!(handle.count("getChildren"), 0);
        assert_eq!(children(&sync, &folder), vec![x]);
        assert_eq!(sync.kv().get(KEY_OPENS).as_deref(), Some(&*format!("1,{folder}")));
    }

    #[test]
    fn fetch_racing_a_create_is_refetched() {
        let mut store = MemoryStore::new();
        let folder = create(&mut store, &bar(), "f", None);
        let (mut sync, handle) = setup(store, MemoryKv::new().with(KEY_OPENS, "1"));
        sync.cache.clear();
        handle.set_auto(false);
        sync.toggle_expand(&folder).expect("open");
        let fetch = handle.queued()[0];
        let fetched_early = handle.execute(fetch).expect("fetch runs");

        sync.insert(&folder, InsertPosition::Bottom, "late", Some("https://late.example/"), false)
            .expect("insert");
        handle.set_auto(true);
        sync.poll();
        sync.handle_reply(fetched_early);
        sync.poll();
        assert_eq!(handle.count("getChildren"), 2);
        assert_eq!(children(&sync, &folder).len(), 1);
    }

    #[test]
    fn stale_rename_after_remove_is_ignored() {
        let (mut sync, handle, [a, b, c]) = three_bookmarks();
        handle.set_auto(false);
        let rename = sync.rename(&b, "late").expect("rename");
        let remove = sync.remove(&b).expect("remove");
        let rename_reply = handle.execute(rename).expect("rename runs");
        let remove_reply = handle.execute(remove).expect("remove runs");

        sync.handle_reply(remove_reply);
        let after_remove = sync.view().visible();
        sync.handle_reply(rename_reply);
        assert_eq!(sync.view().visible(), after_remove);
        assert!(!sync.view().contains(&b));
        assert_eq!(children(&sync, &bar()), vec![a, c]);
    }

    #[test]
    fn legacy_ids_missing_from_store_are_dropped() {
        let kv = MemoryKv::new().with(KEY_LEGACY_SEPARATORS, r#"["7","8"]"#);
        let (sync, handle) = setup(MemoryStore::new(), kv);
        assert_eq!(sync.separators().len(), 2);
        assert_eq!(handle.count("update"), 0);
        assert_eq!(sync.kv().get(KEY_LEGACY_SEPARATORS), None);
    }

    #[test]
    fn legacy_separators_survive_into_the_next_session() {
        let mut store = MemoryStore::new();
        let old = create(&mut store, &bar(), "", Some("https://old-sep.example/"));
        let plain = create(&mut store, &bar(), "plain", Some("https://plain.example/"));
        let folder = create(&mut store, &bar(), "f", None);
        let kv = MemoryKv::new()
            .with(KEY_OPENS, "1")
            .with(KEY_LEGACY_SEPARATORS, &format!(r#"["{old}","{folder}"]"#));
        let (sync, handle) = setup(store, kv);

        let marker = sync.registry().config().url.clone();
        assert_eq!(handle.count("update"), 1);
        assert_eq!(handle.with_store(|s| s.get(&old)).expect("old").url, Some(marker));
        assert_eq!(
            handle.with_store(|s| s.get(&plain)).expect("plain").url.as_deref(),
            Some("https://plain.example/")
        );
        assert!(matches!(sync.view().get(&old).map(|i| &i.kind), Some(ItemKind::Separator { .. })));
        assert_eq!(sync.kv().get(KEY_LEGACY_SEPARATORS), None);

        // Second session: same store, saved settings carried over, no legacy list left.
        let mut next_kv = MemoryKv::new();
        if let Some(opens) = sync.kv().get(KEY_OPENS) {
            next_kv = next_kv.with(KEY_OPENS, &opens);
        }
        let (next, _next_handle) = setup(handle.with_store(|s| s.clone()), next_kv);
        assert!(next.separators().contains(&old));
        assert!(!next.separators().contains(&plain));
        assert!(matches!(next.view().get(&old).map(|i| &i.kind), Some(ItemKind::Separator { .. })));
    }

    #[test]
    fn unfinished_legacy_migration_keeps_the_rest_of_the_list() {
        let mut store = MemoryStore::new();
        let first = create(&mut store, &bar(), "", Some("https://one.example/"));
        let second = create(&mut store, &bar(), "", Some("https://two.example/"));
        let kv = MemoryKv::new().with(KEY_LEGACY_SEPARATORS, &format!("{first},{second}"));
        let (transport, handle) = InlineTransport::new(store);
        let settings = Settings::load(&kv);
        let mut sync = TreeSynchronizer::new(StoreClient::new(transport), Box::new(kv), &settings);
        sync.load().expect("load");
        handle.set_auto(false);
        let load = handle.queued()[0];
        let reply = handle.execute(load).expect("load runs");
        sync.handle_reply(reply);

        // Only the first lookup and its rewrite get answered.
        let lookup = handle.queued()[0];
        let reply = handle.execute(lookup).expect("lookup runs");
        sync.handle_reply(reply);
        let queued = handle.queued();
        let rewrite = *queued.last().expect("rewrite queued");
        let reply = handle.execute(rewrite).expect("rewrite runs");
        sync.handle_reply(reply);

        assert_eq!(sync.kv().get(KEY_LEGACY_SEPARATORS), Some(second.to_string()));
    }

    #[test]
    fn search_round_trip_restores_focus_and_scroll() {
        let (mut sync, _handle, [a, b, _]) = three_bookmarks();
        sync.focus(Some(b.clone()));
        sync.set_scroll(2);
        sync.search("a.example").expect("search");
        let events = sync.poll();
        assert!(matches!(events.as_slice(), [TreeEvent::SearchEntered, TreeEvent::SearchResults(1)]));
        assert_eq!(sync.search_overlay().results()[0].node_id, a);

        sync.set_scroll(0);
        sync.search("").expect("exit");
        assert!(matches!(sync.take_events().as_slice(), [TreeEvent::SearchExited]));
        assert_eq!(sync.view().focused(), Some(&b));
        assert_eq!(sync.view().scroll(), 2);
    }

    #[test]
    fn refresh_keeps_focus_and_picks_up_external_changes() {
        let (mut sync, handle, [_, b, _]) = three_bookmarks();
        sync.focus(Some(b.clone()));
        let added = handle.with_store(|s| create(s, &bar(), "external", Some("https://ext.example/")));
        sync.refresh().expect("refresh");
        sync.poll();
        assert!(sync.view().contains(&added));
        assert_eq!(sync.view().focused(), Some(&b));
    }

    #[test]
    fn open_all_collects_direct_bookmarks() {
        let mut store = MemoryStore::new();
        create(&mut store, &bar(), "a", Some("https://a.example/"));
        create(&mut store, &bar(), "", Some("http://separator.invalid/#"));
        let nested = create(&mut store, &bar(), "nested", None);
        create(&mut store, &nested, "deep", Some("https://deep.example/"));
        let (mut sync, _handle) = setup(store, MemoryKv::new());

        // Collapsed and unfetched: goes through the store.
        sync.open_all(&bar()).expect("open all");
        sync.poll();
        assert_eq!(sync.take_opens(), vec!["https://a.example/".to_string()]);
    }

    #[test]
    fn view_state_is_saved_and_restored() {
        let (mut sync, _handle, [_, b, _]) = three_bookmarks();
        sync.focus(Some(b.clone()));
        sync.set_scroll(1);
        sync.save_view_state();
        assert_eq!(sync.kv().get(KEY_FOCUS_ID), Some(b.to_string()));
        assert_eq!(sync.kv().get(KEY_SCROLL_TOP).as_deref(), Some("1"));
    }
}
