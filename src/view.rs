//! Retained rendering surface: rows keyed by node id, patched in place.

use std::collections::HashMap;

use crate::ids::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Children {
    Unfetched,
    /// Placeholder while a child fetch is in flight.
    Loading,
    Loaded(Vec<NodeId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    Folder { expanded: bool, children: Children },
    Bookmark { url: String },
    Separator { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedItem {
    pub node_id: NodeId,
    pub parent_id: NodeId,
    pub level: usize,
    pub title: String,
    pub label: String,
    pub date_added: u64,
    pub kind: ItemKind,
}

impl RenderedItem {
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, ItemKind::Folder { .. })
    }

    pub fn is_expanded(&self) -> bool {
        matches!(self.kind, ItemKind::Folder { expanded: true, .. })
    }

    pub fn url(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::Bookmark { url } | ItemKind::Separator { url } => Some(url),
            ItemKind::Folder { .. } => None,
        }
    }

    pub fn children(&self) -> Option<&Children> {
        match &self.kind {
            ItemKind::Folder { children, .. } => Some(children),
            _ => None,
        }
    }

    pub fn loaded_children(&self) -> Option<&[NodeId]> {
        match self.children() {
            Some(Children::Loaded(ids)) => Some(ids),
            _ => None,
        }
    }
}

/// Detached rows ready to be spliced into a container. `top` lists the rows that go directly
/// into the container, in order; `items` holds those rows and all their rendered descendants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub top: Vec<NodeId>,
    pub items: Vec<RenderedItem>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubtreeCounts {
    pub folders: usize,
    pub bookmarks: usize,
    /// False when some folder below was never fetched.
    pub complete: bool,
}

#[derive(Debug, Clone)]
pub struct ViewTree {
    root_id: NodeId,
    top: Vec<NodeId>,
    items: HashMap<NodeId, RenderedItem>,
    focused: Option<NodeId>,
    active: Option<NodeId>,
    scroll: usize,
}

impl ViewTree {
    pub fn new(root_id: NodeId) -> Self {
        Self {
            root_id,
            top: Vec::new(),
            items: HashMap::new(),
            focused: None,
            active: None,
            scroll: 0,
        }
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root_id
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn get(&self, id: &NodeId) -> Option<&RenderedItem> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut RenderedItem> {
        self.items.get_mut(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.items.contains_key(id)
    }

    /// Direct children of the store root, i.e. the protected folders.
    pub fn is_protected(&self, id: &NodeId) -> bool {
        self.items
            .get(id)
            .is_some_and(|item| item.parent_id == self.root_id)
    }

    pub fn children_of(&self, parent: &NodeId) -> Option<&[NodeId]> {
        if parent == &self.root_id {
            return Some(&self.top);
        }
        self.items.get(parent).and_then(RenderedItem::loaded_children)
    }

    fn children_mut(&mut self, parent: &NodeId) -> Option<&mut Vec<NodeId>> {
        if parent == &self.root_id {
            return Some(&mut self.top);
        }
        match self.items.get_mut(parent).map(|item| &mut item.kind) {
            Some(ItemKind::Folder {
                children: Children::Loaded(ids),
                ..
            }) => Some(ids),
            _ => None,
        }
    }

    pub fn child_level(&self, parent: &NodeId) -> Option<usize> {
        if parent == &self.root_id {
            return Some(0);
        }
        self.items.get(parent).map(|item| item.level + 1)
    }

    pub fn replace_all(&mut self, fragment: Fragment) {
        self.items.clear();
        self.top = fragment.top;
        for item in fragment.items {
            self.items.insert(item.node_id.clone(), item);
        }
        if self.focused.as_ref().is_some_and(|f| !self.items.contains_key(f)) {
            self.focused = None;
        }
        if self.active.as_ref().is_some_and(|a| !self.items.contains_key(a)) {
            self.active = None;
        }
    }

    /// Fails (returns false) when the container is not materialized.
    pub fn insert_fragment(&mut self, parent: &NodeId, position: usize, fragment: Fragment) -> bool {
        let Some(children) = self.children_mut(parent) else {
            return false;
        };
        let position = position.min(children.len());
        for (offset, id) in fragment.top.into_iter().enumerate() {
            children.insert(position + offset, id);
        }
        for item in fragment.items {
            self.items.insert(item.node_id.clone(), item);
        }
        true
    }

    pub fn set_children(&mut self, folder: &NodeId, state: Children) -> bool {
        match self.items.get_mut(folder).map(|item| &mut item.kind) {
            Some(ItemKind::Folder { children, .. }) => {
                *children = state;
                true
            }
            _ => false,
        }
    }

    /// Splices a fetched subtree into the folder's placeholder. No-op unless the folder is
    /// still in the view and still waiting.
    pub fn fill_placeholder(&mut self, folder: &NodeId, fragment: Fragment) -> bool {
        let waiting = matches!(
            self.items.get(folder).and_then(RenderedItem::children),
            Some(Children::Loading)
        );
        if !waiting {
            return false;
        }
        self.set_children(folder, Children::Loaded(fragment.top));
        for item in fragment.items {
            self.items.insert(item.node_id.clone(), item);
        }
        true
    }

    pub fn set_expanded(&mut self, folder: &NodeId, open: bool) -> bool {
        match self.items.get_mut(folder).map(|item| &mut item.kind) {
            Some(ItemKind::Folder { expanded, .. }) => {
                *expanded = open;
                true
            }
            _ => false,
        }
    }

    /// Detaches the row and drops it with every rendered descendant. Returns the dropped ids.
    pub fn remove_subtree(&mut self, id: &NodeId) -> Vec<NodeId> {
        let Some(parent) = self.items.get(id).map(|item| item.parent_id.clone()) else {
            return Vec::new();
        };
        if let Some(siblings) = self.children_mut(&parent) {
            siblings.retain(|s| s != id);
        }
        let removed = self.subtree_ids(id);
        for gone in &removed {
            self.items.remove(gone);
        }
        if self.focused.as_ref().is_some_and(|f| removed.contains(f)) {
            self.focused = None;
        }
        if self.active.as_ref().is_some_and(|a| removed.contains(a)) {
            self.active = None;
        }
        removed
    }

    /// The row itself followed by its rendered descendants, depth first.
    pub fn subtree_ids(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(item) = self.items.get(&current) {
                if let Some(children) = item.loaded_children() {
                    stack.extend(children.iter().rev().cloned());
                }
                out.push(current);
            }
        }
        out
    }

    pub fn position_in_parent(&self, id: &NodeId) -> Option<usize> {
        let parent = &self.items.get(id)?.parent_id;
        self.children_of(parent)?.iter().position(|c| c == id)
    }

    pub fn next_sibling(&self, id: &NodeId) -> Option<&NodeId> {
        let parent = &self.items.get(id)?.parent_id;
        let siblings = self.children_of(parent)?;
        let pos = siblings.iter().position(|c| c == id)?;
        siblings.get(pos + 1)
    }

    pub fn prev_sibling(&self, id: &NodeId) -> Option<&NodeId> {
        let parent = &self.items.get(id)?.parent_id;
        let siblings = self.children_of(parent)?;
        let pos = siblings.iter().position(|c| c == id)?;
        pos.checked_sub(1).and_then(|p| siblings.get(p))
    }

    /// Unlinks the row from its container but keeps it and its descendants registered.
    pub fn detach(&mut self, id: &NodeId) -> bool {
        let Some(parent) = self.items.get(id).map(|item| item.parent_id.clone()) else {
            return false;
        };
        match self.children_mut(&parent) {
            Some(siblings) => {
                siblings.retain(|s| s != id);
                true
            }
            None => false,
        }
    }

    /// Links a registered row into a materialized container.
    pub fn attach(&mut self, id: &NodeId, parent: &NodeId, position: usize) -> bool {
        if !self.items.contains_key(id) {
            return false;
        }
        let Some(children) = self.children_mut(parent) else {
            return false;
        };
        let position = position.min(children.len());
        children.insert(position, id.clone());
        if let Some(item) = self.items.get_mut(id) {
            item.parent_id = parent.clone();
        }
        true
    }

    /// Rewrites `level` for the row and everything rendered below it.
    pub fn set_level(&mut self, id: &NodeId, level: usize) {
        let mut stack = vec![(id.clone(), level)];
        while let Some((current, level)) = stack.pop() {
            let Some(item) = self.items.get_mut(&current) else {
                continue;
            };
            item.level = level;
            if let Some(children) = item.loaded_children() {
                stack.extend(children.iter().map(|c| (c.clone(), level + 1)));
            }
        }
    }

    pub fn is_ancestor(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        let mut cursor = self.items.get(id).map(|item| &item.parent_id);
        while let Some(parent) = cursor {
            if parent == ancestor {
                return true;
            }
            cursor = self.items.get(parent).map(|item| &item.parent_id);
        }
        false
    }

    /// Rows under expanded ancestors, in display order.
    pub fn visible(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<&NodeId> = self.top.iter().rev().collect();
        while let Some(current) = stack.pop() {
            let Some(item) = self.items.get(current) else {
                continue;
            };
            out.push(current.clone());
            if item.is_expanded()
                && let Some(children) = item.loaded_children()
            {
                stack.extend(children.iter().rev());
            }
        }
        out
    }

    pub fn counts(&self, id: &NodeId) -> SubtreeCounts {
        let mut counts = SubtreeCounts {
            complete: true,
            ..SubtreeCounts::default()
        };
        for current in self.subtree_ids(id).iter().skip(1) {
            let Some(item) = self.items.get(current) else {
                continue;
            };
            match &item.kind {
                ItemKind::Folder { children, .. } => {
                    counts.folders += 1;
                    if !matches!(children, Children::Loaded(_)) {
                        counts.complete = false;
                    }
                }
                ItemKind::Bookmark { .. } | ItemKind::Separator { .. } => counts.bookmarks += 1,
            }
        }
        if self
            .items
            .get(id)
            .and_then(RenderedItem::children)
            .is_some_and(|c| !matches!(c, Children::Loaded(_)))
        {
            counts.complete = false;
        }
        counts
    }

    pub fn focused(&self) -> Option<&NodeId> {
        self.focused.as_ref()
    }

    pub fn set_focus(&mut self, id: Option<NodeId>) {
        self.focused = id.filter(|id| self.items.contains_key(id));
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn set_scroll(&mut self, offset: usize) {
        self.scroll = offset;
    }

    pub fn active(&self) -> Option<&NodeId> {
        self.active.as_ref()
    }

    pub fn set_active(&mut self, id: Option<NodeId>) {
        self.active = id.filter(|id| self.items.contains_key(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: &str, parent: &str, level: usize, children: Children) -> RenderedItem {
        RenderedItem {
            node_id: NodeId::from(id),
            parent_id: NodeId::from(parent),
            level,
            title: id.to_string(),
            label: id.to_string(),
            date_added: 0,
            kind: ItemKind::Folder {
                expanded: true,
                children,
            },
        }
    }

    fn leaf(id: &str, parent: &str, level: usize) -> RenderedItem {
        RenderedItem {
            node_id: NodeId::from(id),
            parent_id: NodeId::from(parent),
            level,
            title: id.to_string(),
            label: id.to_string(),
            date_added: 0,
            kind: ItemKind::Bookmark {
                url: format!("https://{id}.example/"),
            },
        }
    }

    fn ids(raw: &[&str]) -> Vec<NodeId> {
        raw.iter().map(|s| NodeId::from(*s)).collect()
    }

    fn sample() -> ViewTree {
        let mut view = ViewTree::new(NodeId::from("0"));
        view.replace_all(Fragment {
            top: ids(&["1", "2"]),
            items: vec![
                folder("1", "0", 0, Children::Loaded(ids(&["a", "f"]))),
                folder("2", "0", 0, Children::Unfetched),
                leaf("a", "1", 1),
                folder("f", "1", 1, Children::Loaded(ids(&["b"]))),
                leaf("b", "f", 2),
            ],
        });
        view
    }

    #[test]
    fn visible_walks_expanded_folders_in_order() {
        let view = sample();
        assert_eq!(view.visible(), ids(&["1", "a", "f", "b", "2"]));
    }

    #[test]
    fn collapsed_folder_hides_descendants() {
        let mut view = sample();
        view.set_expanded(&NodeId::from("f"), false);
        assert_eq!(view.visible(), ids(&["1", "a", "f", "2"]));
    }

    #[test]
    fn remove_subtree_drops_descendants_and_focus() {
        let mut view = sample();
        view.set_focus(Some(NodeId::from("b")));
        let removed = view.remove_subtree(&NodeId::from("f"));
        assert_eq!(removed, ids(&["f", "b"]));
        assert!(!view.contains(&NodeId::from("b")));
        assert!(view.focused().is_none());
        assert_eq!(view.children_of(&NodeId::from("1")), Some(&ids(&["a"])[..]));
    }

    #[test]
    fn insert_requires_materialized_container() {
        let mut view = sample();
        let fragment = Fragment {
            top: ids(&["c"]),
            items: vec![leaf("c", "2", 1)],
        };
        assert!(!view.insert_fragment(&NodeId::from("2"), 0, fragment.clone()));
        assert!(view.insert_fragment(&NodeId::from("1"), 1, Fragment {
            top: ids(&["c"]),
            items: vec![leaf("c", "1", 1)],
        }));
        assert_eq!(view.position_in_parent(&NodeId::from("c")), Some(1));
        assert_eq!(view.next_sibling(&NodeId::from("c")), Some(&NodeId::from("f")));
    }

    #[test]
    fn placeholder_fill_only_while_loading() {
        let mut view = sample();
        let fragment = Fragment {
            top: ids(&["x"]),
            items: vec![leaf("x", "2", 1)],
        };
        assert!(!view.fill_placeholder(&NodeId::from("2"), fragment.clone()));
        view.set_children(&NodeId::from("2"), Children::Loading);
        assert!(view.fill_placeholder(&NodeId::from("2"), fragment));
        assert_eq!(view.children_of(&NodeId::from("2")), Some(&ids(&["x"])[..]));
    }

    #[test]
    fn detach_and_attach_relocate_a_subtree() {
        let mut view = sample();
        view.set_children(&NodeId::from("2"), Children::Loaded(Vec::new()));
        assert!(view.detach(&NodeId::from("f")));
        assert!(view.attach(&NodeId::from("f"), &NodeId::from("2"), 0));
        assert_eq!(view.get(&NodeId::from("f")).map(|i| i.parent_id.clone()), Some(NodeId::from("2")));
        assert!(view.contains(&NodeId::from("b")));
        assert_eq!(view.visible(), ids(&["1", "a", "2", "f", "b"]));
    }

    #[test]
    fn set_level_propagates_to_descendants() {
        let mut view = sample();
        view.set_level(&NodeId::from("f"), 4);
        assert_eq!(view.get(&NodeId::from("b")).map(|i| i.level), Some(5));
    }

    #[test]
    fn ancestry_and_counts() {
        let view = sample();
        assert!(view.is_ancestor(&NodeId::from("1"), &NodeId::from("b")));
        assert!(!view.is_ancestor(&NodeId::from("b"), &NodeId::from("1")));
        let counts = view.counts(&NodeId::from("1"));
        assert_eq!((counts.folders, counts.bookmarks, counts.complete), (1, 2, true));
        assert!(!view.counts(&NodeId::from("2")).complete);
    }
}
