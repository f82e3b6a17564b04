use ratatui::layout::Rect;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};
use url::Url;

use crate::types::{ContextAction, PendingAction};
use crate::view::{ItemKind, RenderedItem};

/// `https://docs.rs/x` → `docs.rs/x`. Input that does not parse as a URL is returned as is.
pub fn strip_scheme(url: &str) -> &str {
    let Ok(parsed) = Url::parse(url) else {
        return url;
    };
    let scheme_len = parsed.scheme().len();
    match url.get(scheme_len..) {
        Some(rest) if rest.starts_with(':') => rest[1..].trim_start_matches('/'),
        _ => url,
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Cuts `text` to at most `width` terminal columns, ending in `…` when something was dropped.
pub(crate) fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > width - 1 {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

pub(crate) fn inside(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

pub(crate) fn to_u16_saturating(v: usize) -> u16 {
    u16::try_from(v).unwrap_or(u16::MAX)
}

/// Byte offset of the `char_idx`-th character, or the end of the string.
pub(crate) fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map_or(text.len(), |(offset, _)| offset)
}

pub(crate) fn pending_hint(pending: &PendingAction) -> String {
    match pending {
        PendingAction::None => String::new(),
        PendingAction::Delete { label, counts, .. } if counts.folders + counts.bookmarks > 0 => {
            let more = if counts.complete { "" } else { "+" };
            format!(
                "Delete '{label}' with {} folders and {} bookmarks{more}? Enter/Y confirm, Esc cancel",
                counts.folders, counts.bookmarks
            )
        }
        PendingAction::Delete { label, .. } => {
            format!("Delete '{label}'? Enter/Y confirm, Esc cancel")
        }
    }
}

/// Actions offered for a row. `None` is the empty area below the last row.
pub(crate) fn context_actions(target: Option<&RenderedItem>, protected: bool) -> Vec<ContextAction> {
    use ContextAction::*;
    let Some(item) = target else {
        return vec![NewBookmark, NewFolder, NewSeparator, Cancel];
    };
    match &item.kind {
        ItemKind::Folder { .. } if protected => {
            vec![OpenAll, NewBookmark, NewFolder, NewSeparator, Cancel]
        }
        ItemKind::Folder { .. } => vec![
            OpenAll,
            NewBookmark,
            NewFolder,
            NewSeparator,
            Rename,
            Delete,
            Cancel,
        ],
        ItemKind::Bookmark { .. } => vec![
            Open,
            NewBookmark,
            NewFolder,
            NewSeparator,
            Rename,
            EditUrl,
            CopyUrl,
            Delete,
            Cancel,
        ],
        ItemKind::Separator { .. } => vec![NewBookmark, NewFolder, NewSeparator, Delete, Cancel],
    }
}

pub(crate) fn context_label(action: ContextAction) -> &'static str {
    match action {
        ContextAction::Open => "Open",
        ContextAction::OpenAll => "Open All",
        ContextAction::NewBookmark => "New Bookmark",
        ContextAction::NewFolder => "New Folder",
        ContextAction::NewSeparator => "New Separator",
        ContextAction::Rename => "Rename",
        ContextAction::EditUrl => "Edit URL",
        ContextAction::CopyUrl => "Copy URL",
        ContextAction::Delete => "Delete",
        ContextAction::Cancel => "Cancel",
    }
}

/// Program and arguments that hand a URL to the desktop's default handler.
pub(crate) fn opener_command(url: &str) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "macos") {
        ("open", vec![url.to_string()])
    } else if cfg!(target_os = "windows") {
        (
            "cmd",
            vec!["/C".to_string(), "start".to_string(), String::new(), url.to_string()],
        )
    } else {
        ("xdg-open", vec![url.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::NodeId;
    use crate::view::{Children, SubtreeCounts};

    fn item(kind: ItemKind) -> RenderedItem {
        RenderedItem {
            node_id: NodeId::from("7"),
            parent_id: NodeId::from("1"),
            level: 1,
            title: "t".to_string(),
            label: "t".to_string(),
            date_added: 0,
            kind,
        }
    }

    #[test]
    fn strip_scheme_drops_scheme_and_slashes() {
        assert_eq!(strip_scheme("https://real.example/"), "real.example/");
        assert_eq!(strip_scheme("https://docs.rs/x?y=1"), "docs.rs/x?y=1");
        assert_eq!(strip_scheme("javascript:void(0)"), "void(0)");
        assert_eq!(strip_scheme("not a url"), "not a url");
        assert_eq!(strip_scheme(""), "");
    }

    #[test]
    fn escape_html_covers_markup_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#39;s&lt;/a&gt;"
        );
    }

    #[test]
    fn truncate_respects_display_width() {
        assert_eq!(truncate_to_width("bookmarks", 20), "bookmarks");
        assert_eq!(truncate_to_width("bookmarks", 5), "book…");
        assert_eq!(truncate_to_width("日本語の本", 5), "日本…");
        assert_eq!(truncate_to_width("abc", 0), "");
    }

    #[test]
    fn byte_offset_counts_characters() {
        assert_eq!(byte_offset("añb", 2), 3);
        assert_eq!(byte_offset("añb", 9), 4);
    }

    #[test]
    fn context_actions_depend_on_kind() {
        let folder = item(ItemKind::Folder {
            expanded: false,
            children: Children::Unfetched,
        });
        assert!(context_actions(Some(&folder), false).contains(&ContextAction::Delete));
        assert!(!context_actions(Some(&folder), true).contains(&ContextAction::Delete));
        assert!(!context_actions(Some(&folder), true).contains(&ContextAction::Rename));

        let separator = item(ItemKind::Separator {
            url: "http://separator.invalid/#".to_string(),
        });
        let actions = context_actions(Some(&separator), false);
        assert!(!actions.contains(&ContextAction::Open));
        assert!(!actions.contains(&ContextAction::CopyUrl));

        let bookmark = item(ItemKind::Bookmark {
            url: "https://x.example/".to_string(),
        });
        assert_eq!(context_actions(Some(&bookmark), false)[0], ContextAction::Open);
        assert_eq!(context_actions(None, false).last(), Some(&ContextAction::Cancel));
    }

    #[test]
    fn pending_hint_mentions_descendants() {
        let pending = PendingAction::Delete {
            target: NodeId::from("9"),
            label: "Work".to_string(),
            counts: SubtreeCounts {
                folders: 1,
                bookmarks: 4,
                complete: false,
            },
        };
        let hint = pending_hint(&pending);
        assert!(hint.contains("1 folders and 4 bookmarks+"));
        assert!(pending_hint(&PendingAction::None).is_empty());
    }
}
