mod helpers;
mod overlays;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::dnd::Disposition;
use crate::theme::Theme;
use crate::types::{Focus, PendingAction};
use crate::util::{pending_hint, to_u16_saturating, truncate_to_width};
use crate::view::{ItemKind, RenderedItem};
use helpers::{drop_marker, highlight_spans, list_item_style, row_icon, themed_block};
use overlays::*;

const HINTS: &str = "F1 help | Ctrl+F search | Ctrl+N new | F2 rename | Ctrl+Q quit";

pub(crate) fn draw(app: &mut App, frame: &mut Frame<'_>) {
    let theme = app.theme.clone();
    let size = frame.area();
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(size);

    render_search_line(app, frame, vertical[0], &theme);

    if app.sync.search_overlay().is_active() {
        app.tree_rect = Rect::default();
        app.search_rect = vertical[1];
        render_search_results(app, frame, vertical[1], &theme);
    } else {
        app.search_rect = Rect::default();
        app.tree_rect = vertical[1];
        render_tree(app, frame, vertical[1], &theme);
    }

    let status = match &app.pending {
        PendingAction::None if app.status.is_empty() => HINTS.to_string(),
        PendingAction::None => app.status.clone(),
        pending => pending_hint(pending),
    };
    let status_widget = Paragraph::new(status)
        .style(Style::default().fg(theme.fg).bg(theme.bg_alt))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border)),
        );
    frame.render_widget(status_widget, vertical[2]);

    if app.context_menu.open {
        render_context_menu(app, frame);
    }
    if app.prompt.is_some() {
        render_prompt(app, frame);
    }
    if !matches!(app.pending, PendingAction::None) {
        render_delete_prompt(app, frame);
    }
    if app.help_open {
        render_help(app, frame);
    }
}

fn render_search_line(app: &App, frame: &mut Frame<'_>, area: Rect, theme: &Theme) {
    let focused = app.focus == Focus::Search;
    let border = if focused { theme.accent } else { theme.border };
    let text = if app.search_input.query.is_empty() && !focused {
        Line::from(Span::styled(
            "Ctrl+F to search titles and URLs",
            Style::default().fg(theme.fg_muted),
        ))
    } else {
        Line::from(Span::styled(
            app.search_input.query.clone(),
            Style::default().fg(theme.fg),
        ))
    };
    let widget = Paragraph::new(text)
        .style(Style::default().bg(theme.bg_alt))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Search")
                .border_style(Style::default().fg(border)),
        );
    frame.render_widget(widget, area);

    let modal = app.prompt.is_some()
        || app.context_menu.open
        || app.help_open
        || !matches!(app.pending, PendingAction::None);
    if focused && !modal {
        let before: String = app
            .search_input
            .query
            .chars()
            .take(app.search_input.cursor)
            .collect();
        let x = area.x + 1 + to_u16_saturating(before.width());
        if x < area.right().saturating_sub(1) {
            frame.set_cursor_position((x, area.y + 1));
        }
    }
}

fn render_tree(app: &mut App, frame: &mut Frame<'_>, area: Rect, theme: &Theme) {
    let rows = usize::from(area.height.saturating_sub(2)).max(1);
    let inner_width = usize::from(area.width.saturating_sub(2));
    let visible = app.sync.view().visible();
    let max_top = visible.len().saturating_sub(rows);
    if app.sync.view().scroll() > max_top {
        app.sync.set_scroll(max_top);
    }

    let view = app.sync.view();
    let top = view.scroll();
    let focused = view.focused();
    let active = view.active();
    let indicator = app.drag.indicator();
    let dragged = app.drag.dragged();
    let tree_focused = app.focus == Focus::Tree;

    let items: Vec<ListItem> = visible
        .iter()
        .skip(top)
        .take(rows)
        .filter_map(|id| view.get(id))
        .map(|item| {
            let disposition = indicator
                .filter(|(target, _)| *target == &item.node_id)
                .map_or(Disposition::None, |(_, d)| d);
            let mut style = row_style(item, theme);
            if active == Some(&item.node_id) {
                style = style
                    .fg(theme.accent_secondary)
                    .add_modifier(Modifier::UNDERLINED);
            }
            if dragged == Some(&item.node_id) {
                style = style.add_modifier(Modifier::DIM | Modifier::ITALIC);
            }
            if focused == Some(&item.node_id) {
                style = style.bg(theme.selection);
                if tree_focused {
                    style = style.add_modifier(Modifier::BOLD);
                }
            }
            if disposition == Disposition::Into {
                style = style.fg(theme.bg).bg(theme.drop_indicator);
            }
            let indent = "  ".repeat(item.level);
            let icon = row_icon(item);
            let room = inner_width.saturating_sub(1 + indent.width() + icon.width());
            let text = match &item.kind {
                ItemKind::Separator { .. } => separator_rule(&item.label, room),
                _ => truncate_to_width(&item.label, room),
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    drop_marker(disposition),
                    Style::default().fg(theme.drop_indicator),
                ),
                Span::styled(format!("{indent}{icon}{text}"), style),
            ]))
        })
        .collect();

    let items = if items.is_empty() {
        let message = if app.sync.has_pending() {
            "Loading…"
        } else {
            "No bookmarks"
        };
        vec![ListItem::new(Line::from(Span::styled(
            message,
            Style::default().fg(theme.fg_muted),
        )))]
    } else {
        items
    };

    let border = if tree_focused { theme.accent } else { theme.border };
    let title = if app.drag.is_dragging() {
        "Bookmarks (dragging)"
    } else {
        "Bookmarks"
    };
    let list = List::new(items).style(Style::default().bg(theme.bg)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(border)),
    );
    frame.render_widget(list, area);
}

fn row_style(item: &RenderedItem, theme: &Theme) -> Style {
    match item.kind {
        ItemKind::Folder { .. } => Style::default()
            .fg(theme.folder)
            .add_modifier(Modifier::BOLD),
        ItemKind::Bookmark { .. } => Style::default().fg(theme.fg),
        ItemKind::Separator { .. } => Style::default().fg(theme.separator),
    }
}

/// A horizontal rule, with the separator's label inset when it has one.
fn separator_rule(label: &str, width: usize) -> String {
    let head = if label.is_empty() {
        String::new()
    } else {
        truncate_to_width(&format!("── {label} "), width)
    };
    let fill = width.saturating_sub(head.width());
    format!("{head}{}", "─".repeat(fill))
}

fn render_search_results(app: &mut App, frame: &mut Frame<'_>, area: Rect, theme: &Theme) {
    let rows = usize::from(area.height.saturating_sub(2)).max(1);
    let overlay = app.sync.search_overlay_mut();
    let max_top = overlay.results().len().saturating_sub(rows);
    if overlay.scroll() > max_top {
        overlay.set_scroll(max_top);
    }

    let overlay = app.sync.search_overlay();
    let matched = Style::default()
        .fg(theme.matched)
        .add_modifier(Modifier::BOLD);
    let list_items: Vec<ListItem> = if overlay.results().is_empty() {
        let message = if app.sync.has_pending() {
            "Searching…"
        } else {
            "No results"
        };
        vec![ListItem::new(Line::from(Span::styled(
            message,
            Style::default().fg(theme.fg_muted),
        )))]
    } else {
        overlay
            .results()
            .iter()
            .enumerate()
            .skip(overlay.scroll())
            .take(rows)
            .map(|(idx, result)| {
                let selected = idx == overlay.selected();
                let base = if result.activatable {
                    list_item_style(selected, theme)
                } else {
                    list_item_style(selected, theme).add_modifier(Modifier::DIM)
                };
                let icon = if result.activatable { "· " } else { "▸ " };
                let mut spans = vec![Span::styled(icon, base)];
                spans.extend(highlight_spans(&result.title, base, matched));
                if let Some(url) = result.url.as_ref() {
                    spans.push(Span::styled("  ", base));
                    let url_base = if selected {
                        base
                    } else {
                        Style::default().fg(theme.fg_muted)
                    };
                    spans.extend(highlight_spans(url, url_base, matched));
                }
                ListItem::new(Line::from(spans))
            })
            .collect()
    };
    let title = format!("Results: {}", overlay.query());
    let list = List::new(list_items).block(themed_block(theme).title(title));
    frame.render_widget(list, area);
}
