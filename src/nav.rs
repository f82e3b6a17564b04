//! Keyboard movement over whatever list is showing: the visible tree or search results.

use std::time::{Duration, Instant};

use crate::ids::NodeId;
use crate::view::{ItemKind, ViewTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavAction {
    Focus(NodeId),
    Expand(NodeId),
    Collapse(NodeId),
    OpenContextMenu(NodeId),
    None,
}

/// The visible window of a scrolled list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub top: usize,
    pub rows: usize,
}

/// Vertical movement over `len` rows. Left and Right have no meaning here.
pub fn step(len: usize, current: Option<usize>, key: NavKey, window: Window) -> Option<usize> {
    if len == 0 {
        return None;
    }
    let last = len - 1;
    let page = window.rows.max(1) - 1;
    let Some(cur) = current.filter(|c| *c < len) else {
        return match key {
            NavKey::Up | NavKey::End => Some(last),
            NavKey::Left | NavKey::Right => None,
            _ => Some(0),
        };
    };
    let target = match key {
        NavKey::Up => cur.saturating_sub(1),
        NavKey::Down => (cur + 1).min(last),
        NavKey::Home => 0,
        NavKey::End => last,
        NavKey::PageUp => {
            // First to the top edge of the window, then a page at a time.
            if cur > window.top {
                window.top
            } else {
                cur.saturating_sub(page)
            }
        }
        NavKey::PageDown => {
            let bottom = window.top + page;
            if cur < bottom {
                bottom.min(last)
            } else {
                (cur + page).min(last)
            }
        }
        NavKey::Left | NavKey::Right => return None,
    };
    Some(target)
}

pub fn navigate_tree(view: &ViewTree, key: NavKey, window: Window, rtl: bool) -> NavAction {
    let key = match (key, rtl) {
        (NavKey::Left, true) => NavKey::Right,
        (NavKey::Right, true) => NavKey::Left,
        (key, _) => key,
    };
    let visible = view.visible();
    let current = view
        .focused()
        .and_then(|f| visible.iter().position(|v| v == f));

    match key {
        NavKey::Left | NavKey::Right => {
            let Some(id) = current.map(|c| visible[c].clone()) else {
                return NavAction::None;
            };
            let Some(item) = view.get(&id) else {
                return NavAction::None;
            };
            match (key, item.is_folder(), item.is_expanded()) {
                (NavKey::Left, true, true) => NavAction::Collapse(id),
                (NavKey::Left, _, _) if &item.parent_id != view.root_id() => {
                    NavAction::Focus(item.parent_id.clone())
                }
                (NavKey::Left, _, _) => NavAction::None,
                (_, true, false) => NavAction::Expand(id),
                _ => NavAction::OpenContextMenu(id),
            }
        }
        _ => match step(visible.len(), current, key, window) {
            Some(target) if Some(target) != current => NavAction::Focus(visible[target].clone()),
            _ => NavAction::None,
        },
    }
}

/// Characters typed in quick succession, matched against row labels.
#[derive(Debug, Clone)]
pub struct TypeAhead {
    buffer: String,
    last: Option<Instant>,
    timeout: Duration,
}

impl TypeAhead {
    pub fn new(timeout: Duration) -> Self {
        Self {
            buffer: String::new(),
            last: None,
            timeout,
        }
    }

    /// Appends `ch`, starting over if the previous key is older than the timeout.
    pub fn push(&mut self, ch: char, now: Instant) -> &str {
        let idle = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) > self.timeout);
        if idle {
            self.buffer.clear();
        }
        self.buffer.extend(ch.to_lowercase());
        self.last = Some(now);
        &self.buffer
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last = None;
    }
}

/// Searches forward from `current` for a label starting with `prefix`, wrapping once. A
/// single-character prefix starts after the current row so repeated presses cycle.
pub fn find_prefix(labels: &[String], current: Option<usize>, prefix: &str) -> Option<usize> {
    if labels.is_empty() || prefix.is_empty() {
        return None;
    }
    let prefix = prefix.to_lowercase();
    let start = match current {
        Some(c) if prefix.chars().count() == 1 => c + 1,
        Some(c) => c,
        None => 0,
    };
    (0..labels.len())
        .map(|offset| (start + offset) % labels.len())
        .find(|&i| labels[i].to_lowercase().starts_with(&prefix))
}

pub fn type_ahead_tree(view: &ViewTree, prefix: &str) -> Option<NodeId> {
    let visible = view.visible();
    let labels: Vec<String> = visible
        .iter()
        .map(|id| match view.get(id) {
            Some(item) if !matches!(item.kind, ItemKind::Separator { .. }) => item.label.clone(),
            _ => String::new(),
        })
        .collect();
    let current = view
        .focused()
        .and_then(|f| visible.iter().position(|v| v == f));
    find_prefix(&labels, current, prefix).map(|i| visible[i].clone())
}
