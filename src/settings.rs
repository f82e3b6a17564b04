//! Typed view of the key-value state. Missing or unparsable values fall back to defaults.

use std::str::FromStr;
use std::time::Duration;

use crate::dnd::DropZones;
use crate::ids::{IdSet, NodeId};
use crate::persistence::KeyValueStore;
use crate::separator::SeparatorConfig;

pub const KEY_OPENS: &str = "opens";
pub const KEY_LEGACY_SEPARATORS: &str = "separators";
pub const KEY_SEPARATOR_TITLE: &str = "separator_title";
pub const KEY_SEPARATOR_URL: &str = "separator_url";
pub const KEY_SEPARATOR_SUBSTRINGS: &str = "separator_substrings";
pub const KEY_SCROLL_TOP: &str = "scroll_top";
pub const KEY_FOCUS_ID: &str = "focus_id";
pub const KEY_DROP_ZONE_SPLIT: &str = "drop_zone_split";
pub const KEY_DROP_ZONE_FOLDER_EDGE: &str = "drop_zone_folder_edge";
pub const KEY_AUTOSCROLL_MARGIN: &str = "autoscroll_margin";
pub const KEY_AUTOSCROLL_INTERVAL_MS: &str = "autoscroll_interval_ms";
pub const KEY_TYPEAHEAD_TIMEOUT_MS: &str = "typeahead_timeout_ms";
pub const KEY_RTL: &str = "rtl";

const DEFAULT_AUTOSCROLL_MARGIN: u16 = 1;
const DEFAULT_AUTOSCROLL_INTERVAL_MS: u64 = 60;
const DEFAULT_TYPEAHEAD_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub separator: SeparatorConfig,
    pub drop_zones: DropZones,
    /// Rows from the viewport edge where dragging starts to scroll.
    pub autoscroll_margin: u16,
    pub autoscroll_interval: Duration,
    pub typeahead_timeout: Duration,
    pub rtl: bool,
    pub scroll_top: usize,
    pub focus_id: Option<NodeId>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            separator: SeparatorConfig::default(),
            drop_zones: DropZones::default(),
            autoscroll_margin: DEFAULT_AUTOSCROLL_MARGIN,
            autoscroll_interval: Duration::from_millis(DEFAULT_AUTOSCROLL_INTERVAL_MS),
            typeahead_timeout: Duration::from_millis(DEFAULT_TYPEAHEAD_TIMEOUT_MS),
            rtl: false,
            scroll_top: 0,
            focus_id: None,
        }
    }
}

fn parsed<T: FromStr>(kv: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = kv.get(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}

fn fraction(kv: &dyn KeyValueStore, key: &str, range: (f32, f32), fallback: f32) -> f32 {
    parsed::<f32>(kv, key)
        .filter(|v| (range.0..=range.1).contains(v))
        .unwrap_or(fallback)
}

impl Settings {
    pub fn load(kv: &dyn KeyValueStore) -> Self {
        let defaults = Self::default();
        let separator = SeparatorConfig {
            title: kv.get(KEY_SEPARATOR_TITLE).unwrap_or(defaults.separator.title),
            url: kv.get(KEY_SEPARATOR_URL).unwrap_or(defaults.separator.url),
            substrings: kv
                .get(KEY_SEPARATOR_SUBSTRINGS)
                .unwrap_or(defaults.separator.substrings),
        };
        let drop_zones = DropZones {
            leaf_split: fraction(kv, KEY_DROP_ZONE_SPLIT, (0.05, 0.95), defaults.drop_zones.leaf_split),
            folder_edge: fraction(
                kv,
                KEY_DROP_ZONE_FOLDER_EDGE,
                (0.0, 0.5),
                defaults.drop_zones.folder_edge,
            ),
        };
        Self {
            separator,
            drop_zones,
            autoscroll_margin: parsed(kv, KEY_AUTOSCROLL_MARGIN).unwrap_or(defaults.autoscroll_margin),
            autoscroll_interval: parsed(kv, KEY_AUTOSCROLL_INTERVAL_MS)
                .map(Duration::from_millis)
                .unwrap_or(defaults.autoscroll_interval),
            typeahead_timeout: parsed(kv, KEY_TYPEAHEAD_TIMEOUT_MS)
                .map(Duration::from_millis)
                .unwrap_or(defaults.typeahead_timeout),
            rtl: parsed(kv, KEY_RTL).unwrap_or(defaults.rtl),
            scroll_top: parsed(kv, KEY_SCROLL_TOP).unwrap_or(defaults.scroll_top),
            focus_id: kv
                .get(KEY_FOCUS_ID)
                .filter(|id| !id.is_empty())
                .map(NodeId::new),
        }
    }
}

pub fn load_expanded(kv: &dyn KeyValueStore) -> IdSet {
    kv.get(KEY_OPENS)
        .map(|raw| IdSet::parse_or_empty(&raw, KEY_OPENS))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryKv;

    #[test]
    fn empty_store_yields_defaults() {
        assert_eq!(Settings::load(&MemoryKv::new()), Settings::default());
    }

    #[test]
    fn values_override_defaults_and_garbage_is_ignored() {
        let kv = MemoryKv::new()
            .with(KEY_SEPARATOR_URL, "http://example.com/sep#")
            .with(KEY_DROP_ZONE_FOLDER_EDGE, "0.25")
            .with(KEY_DROP_ZONE_SPLIT, "1.5")
            .with(KEY_TYPEAHEAD_TIMEOUT_MS, "soon")
            .with(KEY_RTL, "true")
            .with(KEY_FOCUS_ID, "42");
        let settings = Settings::load(&kv);
        assert_eq!(settings.separator.url, "http://example.com/sep#");
        assert_eq!(settings.drop_zones.folder_edge, 0.25);
        assert_eq!(settings.drop_zones.leaf_split, DropZones::default().leaf_split);
        assert_eq!(settings.typeahead_timeout, Duration::from_millis(1000));
        assert!(settings.rtl);
        assert_eq!(settings.focus_id, Some(NodeId::from("42")));
    }

    #[test]
    fn malformed_open_list_is_empty() {
        let kv = MemoryKv::new().with(KEY_OPENS, "1,\u{7}x");
        assert!(load_expanded(&kv).is_empty());
    }
}
