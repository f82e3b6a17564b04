//! Divider rows stored as ordinary bookmarks.
//!
//! The bookmark tree has no separator concept, so a bookmark counts as one when its url starts
//! with the configured marker url or contains one of the configured substrings.

use serde::{Deserialize, Serialize};

use crate::ids::{IdSet, NodeId};

pub const DEFAULT_SEPARATOR_TITLE: &str = "────────────";
pub const DEFAULT_SEPARATOR_URL: &str = "http://separator.invalid/#";
pub const DEFAULT_SEPARATOR_SUBSTRINGS: &str = "separatethis.com;separator.mozdev.org";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparatorConfig {
    pub title: String,
    pub url: String,
    /// Semicolon-delimited.
    pub substrings: String,
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_SEPARATOR_TITLE.to_string(),
            url: DEFAULT_SEPARATOR_URL.to_string(),
            substrings: DEFAULT_SEPARATOR_SUBSTRINGS.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SeparatorRegistry {
    config: SeparatorConfig,
    markers: Vec<String>,
}

impl SeparatorRegistry {
    pub fn new(config: SeparatorConfig) -> Self {
        let markers = config
            .substrings
            .split(';')
            .map(str::trim)
            // One-character markers would match nearly every url.
            .filter(|m| m.chars().count() > 1)
            .map(str::to_string)
            .collect();
        Self { config, markers }
    }

    pub fn config(&self) -> &SeparatorConfig {
        &self.config
    }

    pub fn is_separator(&self, _title: &str, url: &str) -> bool {
        if url.is_empty() {
            return false;
        }
        if !self.config.url.is_empty() && url.starts_with(&self.config.url) {
            return true;
        }
        self.markers.iter().any(|m| url.contains(m.as_str()))
    }
}

impl Default for SeparatorRegistry {
    fn default() -> Self {
        Self::new(SeparatorConfig::default())
    }
}

/// Ids currently rendered as separators.
#[derive(Debug, Clone, Default)]
pub struct SeparatorSet {
    ids: IdSet,
}

impl SeparatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.ids.contains(id)
    }

    pub fn add(&mut self, id: NodeId) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: &NodeId) -> bool {
        self.ids.remove(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Seeds membership from the list older builds persisted.
    pub fn import_legacy(&mut self, raw: &str) -> usize {
        match IdSet::parse_legacy(raw) {
            Ok(legacy) => legacy
                .iter()
                .filter(|id| self.ids.insert((*id).clone()))
                .count(),
            Err(err) => {
                tracing::warn!(%err, "ignoring malformed legacy separator list");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_url_prefix_matches_regardless_of_title() {
        let registry = SeparatorRegistry::new(SeparatorConfig {
            url: "http://example.com/sep#".to_string(),
            ..SeparatorConfig::default()
        });
        assert!(registry.is_separator("anything", "http://example.com/sep#abc"));
        assert!(registry.is_separator("", "http://example.com/sep#abc"));
    }

    #[test]
    fn unrelated_url_is_not_a_separator_by_default() {
        let registry = SeparatorRegistry::default();
        assert!(!registry.is_separator("x", "http://unrelated.com/"));
        assert!(registry.is_separator("x", DEFAULT_SEPARATOR_URL));
    }

    #[test]
    fn substring_markers_match_anywhere_in_url() {
        let registry = SeparatorRegistry::default();
        assert!(registry.is_separator("", "https://www.separatethis.com/?x=1"));
    }

    #[test]
    fn short_markers_are_ignored() {
        let registry = SeparatorRegistry::new(SeparatorConfig {
            title: "-".to_string(),
            url: String::new(),
            substrings: "a; ;sep-marker".to_string(),
        });
        assert!(!registry.is_separator("", "https://a.example/"));
        assert!(registry.is_separator("", "https://x.example/sep-marker"));
    }

    #[test]
    fn legacy_import_skips_existing_ids() {
        let mut set = SeparatorSet::new();
        set.add(NodeId::from("4"));
        assert_eq!(set.import_legacy(r#"["4","5"]"#), 1);
        assert_eq!(set.len(), 2);
        assert_eq!(set.import_legacy("[4,"), 0);
    }
}
