//! Node descriptors to view rows. Pure: nothing here talks to the store or mutates the view.

use crate::ids::{IdSet, NodeId};
use crate::separator::{SeparatorRegistry, SeparatorSet};
use crate::store::Node;
use crate::util::strip_scheme;
use crate::view::{Children, Fragment, ItemKind, RenderedItem};

/// Display strings the host can localize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    pub no_title: String,
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            no_title: "(no title)".to_string(),
        }
    }
}

pub struct RenderContext<'a> {
    pub expanded: &'a IdSet,
    pub registry: &'a SeparatorRegistry,
    /// Ids already known to be separators, e.g. imported from an older state file.
    pub separators: &'a SeparatorSet,
    pub labels: &'a Labels,
}

#[derive(Debug, Clone, Default)]
pub struct Rendered {
    pub fragment: Fragment,
    /// Expanded folders whose children were not supplied; each got a loading placeholder.
    pub fetches: Vec<NodeId>,
    /// Bookmarks classified as separators on this pass.
    pub separators: Vec<NodeId>,
    /// Children supplied for collapsed folders, kept for their first expansion.
    pub cached: Vec<(NodeId, Vec<Node>)>,
}

/// Title first, then the url without its scheme, then the placeholder.
pub fn display_label(title: &str, url: Option<&str>, labels: &Labels) -> String {
    if !title.is_empty() {
        return title.to_string();
    }
    match url.map(strip_scheme) {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => labels.no_title.clone(),
    }
}

pub fn classify(node: &Node, ctx: &RenderContext<'_>) -> ItemKind {
    match node.url.as_deref() {
        None => ItemKind::Folder {
            expanded: ctx.expanded.contains(&node.id),
            children: Children::Unfetched,
        },
        Some(url)
            if ctx.separators.contains(&node.id) || ctx.registry.is_separator(&node.title, url) =>
        {
            ItemKind::Separator {
                url: url.to_string(),
            }
        }
        Some(url) => ItemKind::Bookmark {
            url: url.to_string(),
        },
    }
}

/// One row for `node`, without descending. Folders come out unfetched.
pub fn render_item(node: &Node, level: usize, parent: &NodeId, ctx: &RenderContext<'_>) -> RenderedItem {
    let kind = classify(node, ctx);
    let label = match &kind {
        ItemKind::Separator { .. } => ctx.registry.config().title.clone(),
        _ => display_label(&node.title, node.url.as_deref(), ctx.labels),
    };
    RenderedItem {
        node_id: node.id.clone(),
        parent_id: parent.clone(),
        level,
        title: node.title.clone(),
        label,
        date_added: node.date_added,
        kind,
    }
}

pub fn render(nodes: &[Node], level: usize, parent: &NodeId, ctx: &RenderContext<'_>) -> Rendered {
    let mut out = Rendered::default();
    for node in nodes {
        out.fragment.top.push(node.id.clone());
        render_into(node, level, parent, ctx, &mut out);
    }
    out
}

fn render_into(
    node: &Node,
    level: usize,
    parent: &NodeId,
    ctx: &RenderContext<'_>,
    out: &mut Rendered,
) {
    let mut item = render_item(node, level, parent, ctx);
    match &mut item.kind {
        ItemKind::Separator { .. } => out.separators.push(node.id.clone()),
        ItemKind::Bookmark { .. } => {}
        ItemKind::Folder { expanded, children } => match (&node.children, *expanded) {
            (Some(kids), true) => {
                *children = Children::Loaded(kids.iter().map(|k| k.id.clone()).collect());
                out.fragment.items.push(item);
                for kid in kids {
                    render_into(kid, level + 1, &node.id, ctx, out);
                }
                return;
            }
            (None, true) => {
                *children = Children::Loading;
                out.fetches.push(node.id.clone());
            }
            (Some(kids), false) => out.cached.push((node.id.clone(), kids.clone())),
            (None, false) => {}
        },
    }
    out.fragment.items.push(item);
}
