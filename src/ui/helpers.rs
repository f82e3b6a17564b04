use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders};

use crate::dnd::Disposition;
use crate::search::Highlight;
use crate::theme::Theme;
use crate::view::{Children, ItemKind, RenderedItem};

pub(crate) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

pub(crate) fn help_keybind_line<'a>(
    entries: &[(&str, &str)],
    key_style: Style,
    desc_style: Style,
    sep_style: Style,
) -> Line<'a> {
    let mut spans = Vec::new();
    for (i, (key, desc)) in entries.iter().enumerate() {
        if i > 0 {
            spans.push(Span::styled("  |  ", sep_style));
        }
        spans.push(Span::styled(key.to_string(), key_style));
        spans.push(Span::styled(format!(" {desc}"), desc_style));
    }
    Line::from(spans)
}

pub(crate) fn list_item_style(selected: bool, theme: &Theme) -> Style {
    if selected {
        Style::default()
            .fg(theme.bg)
            .bg(theme.accent)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme.fg)
    }
}

pub(crate) fn themed_block(theme: &Theme) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .style(Style::default().bg(theme.bg_alt))
        .border_style(Style::default().fg(theme.accent))
}

/// Expander or bullet in front of a row's label.
pub(crate) fn row_icon(item: &RenderedItem) -> &'static str {
    match &item.kind {
        ItemKind::Folder {
            children: Children::Loading,
            ..
        } => "◌ ",
        ItemKind::Folder { expanded: true, .. } => "▾ ",
        ItemKind::Folder { .. } => "▸ ",
        ItemKind::Bookmark { .. } => "· ",
        ItemKind::Separator { .. } => "  ",
    }
}

/// Gutter glyph previewing where a drop would land relative to the row.
pub(crate) fn drop_marker(disposition: Disposition) -> &'static str {
    match disposition {
        Disposition::Before => "▲",
        Disposition::After => "▼",
        Disposition::Into => "▶",
        Disposition::None => " ",
    }
}

/// Matched runs get `matched` on top of `base`.
pub(crate) fn highlight_spans(highlight: &Highlight, base: Style, matched: Style) -> Vec<Span<'static>> {
    highlight
        .segments
        .iter()
        .filter(|s| !s.text.is_empty())
        .map(|s| {
            let style = if s.matched { base.patch(matched) } else { base };
            Span::styled(s.text.clone(), style)
        })
        .collect()
}
