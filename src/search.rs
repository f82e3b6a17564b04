//! Ranked result list that temporarily replaces the tree.

use std::cmp::Reverse;

use regex::{Regex, RegexBuilder};

use crate::ids::NodeId;
use crate::render::{Labels, display_label};
use crate::separator::SeparatorRegistry;
use crate::store::{Node, RequestId};
use crate::util::escape_html;

pub const RESULT_CAP: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub matched: bool,
}

/// Text split into matched and unmatched runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Highlight {
    pub segments: Vec<Segment>,
}

impl Highlight {
    pub fn plain(text: &str) -> Self {
        Self {
            segments: vec![Segment {
                text: text.to_string(),
                matched: false,
            }],
        }
    }

    pub fn has_match(&self) -> bool {
        self.segments.iter().any(|s| s.matched)
    }

    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            let escaped = escape_html(&segment.text);
            if segment.matched {
                out.push_str("<mark>");
                out.push_str(&escaped);
                out.push_str("</mark>");
            } else {
                out.push_str(&escaped);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub node_id: NodeId,
    pub title: Highlight,
    /// Only highlighted when the title had no match.
    pub url: Option<Highlight>,
    /// Folder results are shown but cannot be opened from the list.
    pub activatable: bool,
}

fn token_pattern(query: &str) -> Option<Regex> {
    let alternatives: Vec<String> = query.split_whitespace().map(regex::escape).collect();
    if alternatives.is_empty() {
        return None;
    }
    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .ok()
}

/// `^` plus the query, with runs of whitespace allowed to span words.
fn anchored_pattern(query: &str) -> Option<Regex> {
    let parts: Vec<String> = query.split_whitespace().map(regex::escape).collect();
    if parts.is_empty() {
        return None;
    }
    RegexBuilder::new(&format!("^{}", parts.join(r"(.*\s)?")))
        .case_insensitive(true)
        .build()
        .ok()
}

pub fn highlight_with(pattern: Option<&Regex>, text: &str) -> Highlight {
    let Some(pattern) = pattern else {
        return Highlight::plain(text);
    };
    let mut segments = Vec::new();
    let mut last = 0;
    for found in pattern.find_iter(text) {
        if found.start() == found.end() {
            continue;
        }
        if found.start() > last {
            segments.push(Segment {
                text: text[last..found.start()].to_string(),
                matched: false,
            });
        }
        segments.push(Segment {
            text: found.as_str().to_string(),
            matched: true,
        });
        last = found.end();
    }
    if last < text.len() || segments.is_empty() {
        segments.push(Segment {
            text: text[last..].to_string(),
            matched: false,
        });
    }
    Highlight { segments }
}

pub fn highlight(query: &str, text: &str) -> Highlight {
    highlight_with(token_pattern(query).as_ref(), text)
}

/// Orders store hits: bookmarks before folders, earlier title occurrence, title prefix match,
/// then newest first. Truncates to [`RESULT_CAP`].
pub fn rank(query: &str, nodes: Vec<Node>) -> Vec<Node> {
    let needle = query.trim().to_lowercase();
    let anchored = anchored_pattern(query);
    let mut keyed: Vec<_> = nodes
        .into_iter()
        .map(|node| {
            let occurrence = if needle.is_empty() {
                usize::MAX
            } else {
                node.title.to_lowercase().find(&needle).unwrap_or(usize::MAX)
            };
            let prefix = anchored.as_ref().is_some_and(|re| re.is_match(&node.title));
            let key = (node.is_folder(), occurrence, !prefix, Reverse(node.date_added));
            (key, node)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().take(RESULT_CAP).map(|(_, node)| node).collect()
}

pub fn build_results(
    query: &str,
    nodes: Vec<Node>,
    registry: &SeparatorRegistry,
    labels: &Labels,
) -> Vec<SearchResult> {
    let pattern = token_pattern(query);
    let visible: Vec<Node> = nodes
        .into_iter()
        .filter(|n| {
            n.url
                .as_deref()
                .is_none_or(|url| !registry.is_separator(&n.title, url))
        })
        .collect();
    rank(query, visible)
        .into_iter()
        .map(|node| {
            let label = display_label(&node.title, node.url.as_deref(), labels);
            let title = highlight_with(pattern.as_ref(), &label);
            let url = match node.url.as_deref() {
                Some(url) if !title.has_match() => Some(highlight_with(pattern.as_ref(), url)),
                Some(url) => Some(Highlight::plain(url)),
                None => None,
            };
            SearchResult {
                activatable: !node.is_folder(),
                node_id: node.id,
                title,
                url,
            }
        })
        .collect()
}

/// Tree position to return to when search ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub scroll: usize,
    pub focus: Option<NodeId>,
}

#[derive(Debug, Default)]
pub struct SearchOverlay {
    query: String,
    results: Vec<SearchResult>,
    selected: usize,
    scroll: usize,
    pending: Option<RequestId>,
    saved: Option<ViewSnapshot>,
}

impl SearchOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.saved.is_some()
    }

    /// Returns true when search was not already showing.
    pub fn enter(&mut self, snapshot: ViewSnapshot) -> bool {
        if self.saved.is_some() {
            return false;
        }
        self.saved = Some(snapshot);
        true
    }

    pub fn exit(&mut self) -> Option<ViewSnapshot> {
        self.query.clear();
        self.results.clear();
        self.selected = 0;
        self.scroll = 0;
        self.pending = None;
        self.saved.take()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: &str, request: RequestId) {
        self.query = query.to_string();
        self.pending = Some(request);
    }

    pub fn clear_pending(&mut self, request: RequestId) {
        if self.pending == Some(request) {
            self.pending = None;
        }
    }

    /// Replies for superseded queries return `None` and change nothing.
    pub fn apply(
        &mut self,
        request: RequestId,
        nodes: Vec<Node>,
        registry: &SeparatorRegistry,
        labels: &Labels,
    ) -> Option<usize> {
        if self.pending != Some(request) {
            return None;
        }
        self.pending = None;
        self.results = build_results(&self.query, nodes, registry, labels);
        self.selected = 0;
        self.scroll = 0;
        Some(self.results.len())
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn select(&mut self, index: usize) {
        if index < self.results.len() {
            self.selected = index;
        }
    }

    pub fn selected_result(&self) -> Option<&SearchResult> {
        self.results.get(self.selected)
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn set_scroll(&mut self, offset: usize) {
        self.scroll = offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, title: &str, url: Option<&str>, date_added: u64) -> Node {
        Node {
            id: NodeId::from(id),
            parent_id: Some(NodeId::from("1")),
            index: 0,
            title: title.to_string(),
            url: url.map(str::to_string),
            date_added,
            children: None,
        }
    }

    fn titles(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.title.as_str()).collect()
    }

    #[test]
    fn earlier_occurrence_ranks_first() {
        let nodes = vec![
            node("3", "Bing Search", Some("https://bing.com"), 3),
            node("4", "My Search", Some("https://my.example"), 2),
            node("5", "Search Engine", Some("https://engine.example"), 1),
        ];
        let ranked = rank("search", nodes);
        assert_eq!(titles(&ranked), vec!["Search Engine", "My Search", "Bing Search"]);
    }

    #[test]
    fn bookmarks_before_folders_and_newest_breaks_ties() {
        let nodes = vec![
            node("3", "rust", None, 9),
            node("4", "rust old", Some("https://a.example"), 1),
            node("5", "rust new", Some("https://b.example"), 5),
        ];
        let ranked = rank("rust", nodes);
        assert_eq!(titles(&ranked), vec!["rust new", "rust old", "rust"]);
    }

    #[test]
    fn anchored_match_breaks_occurrence_ties() {
        // Neither title contains "my notes" verbatim; only one starts with "my".
        let nodes = vec![
            node("3", "notes on my day", Some("https://a.example"), 5),
            node("4", "my daily notes", Some("https://b.example"), 1),
        ];
        let ranked = rank("my notes", nodes);
        assert_eq!(ranked[0].title, "my daily notes");
    }

    #[test]
    fn results_are_capped() {
        let nodes = (0..150)
            .map(|i| node(&format!("{}", i + 3), "hit", Some("https://x.example"), i))
            .collect();
        assert_eq!(rank("hit", nodes).len(), RESULT_CAP);
    }

    #[test]
    fn url_highlighted_only_when_title_misses() {
        let registry = SeparatorRegistry::default();
        let labels = Labels::default();
        let nodes = vec![
            node("3", "Docs", Some("https://rust-lang.org"), 1),
            node("4", "Rust book", Some("https://doc.rust-lang.org/book"), 2),
        ];
        let results = build_results("rust", nodes, &registry, &labels);
        let book = results.iter().find(|r| r.node_id.as_str() == "4").expect("book");
        assert!(book.title.has_match());
        assert!(!book.url.as_ref().is_some_and(Highlight::has_match));
        let docs = results.iter().find(|r| r.node_id.as_str() == "3").expect("docs");
        assert!(!docs.title.has_match());
        assert!(docs.url.as_ref().is_some_and(Highlight::has_match));
    }

    #[test]
    fn folders_are_inert_and_separators_hidden() {
        let registry = SeparatorRegistry::default();
        let labels = Labels::default();
        let nodes = vec![
            node("3", "work", None, 1),
            node("4", "work sep", Some("http://separator.invalid/#work"), 2),
        ];
        let results = build_results("work", nodes, &registry, &labels);
        assert_eq!(results.len(), 1);
        assert!(!results[0].activatable);
    }

    #[test]
    fn markup_escapes_and_marks() {
        let hl = highlight("b", "a<b>&c");
        assert_eq!(hl.to_markup(), "a&lt;<mark>b</mark>&gt;&amp;c");
    }

    #[test]
    fn highlight_is_case_insensitive() {
        let hl = highlight("SEARCH", "My search");
        assert_eq!(hl.segments.len(), 2);
        assert_eq!(hl.segments[1].text, "search");
        assert!(hl.segments[1].matched);
    }

    #[test]
    fn overlay_drops_superseded_replies_and_restores_snapshot() {
        let registry = SeparatorRegistry::default();
        let labels = Labels::default();
        let mut overlay = SearchOverlay::new();
        let snapshot = ViewSnapshot {
            scroll: 4,
            focus: Some(NodeId::from("9")),
        };
        assert!(overlay.enter(snapshot.clone()));
        assert!(!overlay.enter(ViewSnapshot { scroll: 0, focus: None }));
        overlay.set_query("a", 1);
        overlay.set_query("ab", 2);
        let hits = vec![node("3", "ab", Some("https://ab.example"), 1)];
        assert_eq!(overlay.apply(1, hits.clone(), &registry, &labels), None);
        assert_eq!(overlay.apply(2, hits, &registry, &labels), Some(1));
        assert_eq!(overlay.exit(), Some(snapshot));
        assert!(!overlay.is_active());
    }
}
