use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Clear, List, ListItem, Paragraph, Wrap};
use unicode_width::UnicodeWidthStr;

use crate::app::App;
use crate::theme::Theme;
use crate::types::PendingAction;
use crate::util::{context_label, pending_hint, to_u16_saturating, truncate_to_width};

use super::helpers::{centered_rect, help_keybind_line, list_item_style, themed_block};

pub(crate) fn render_context_menu(app: &mut App, frame: &mut Frame<'_>) {
    let theme = app.theme.clone();
    let width = 22;
    let height = to_u16_saturating(app.context_menu.actions.len()) + 2;
    let max_x = frame.area().width.saturating_sub(width);
    let max_y = frame.area().height.saturating_sub(height);
    let x = app.context_menu.pos.0.min(max_x);
    let y = app.context_menu.pos.1.min(max_y);
    let area = Rect::new(x, y, width, height);
    app.context_menu.rect = area;
    frame.render_widget(Clear, area);
    let list_items: Vec<ListItem> = app
        .context_menu
        .actions
        .iter()
        .enumerate()
        .map(|(idx, action)| {
            let style = list_item_style(idx == app.context_menu.index, &theme);
            ListItem::new(Line::from(Span::styled(context_label(*action), style)))
        })
        .collect();
    let title = app
        .context_menu
        .target
        .as_ref()
        .and_then(|id| app.sync.view().get(id))
        .map(|item| truncate_to_width(&item.label, usize::from(width).saturating_sub(4)))
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| "Actions".to_string());
    let list = List::new(list_items).block(themed_block(&theme).title(title));
    frame.render_widget(list, area);
}

pub(crate) fn render_prompt(app: &mut App, frame: &mut Frame<'_>) {
    let Some(prompt) = app.prompt.as_ref() else {
        return;
    };
    let title = prompt.title.clone();
    let value = prompt.value.clone();
    let before_cursor: String = prompt.value.chars().take(prompt.cursor).collect();
    let theme = app.theme.clone();
    let area = centered_rect(60, 20, frame.area());
    let area = Rect {
        height: area.height.min(3),
        ..area
    };
    app.prompt_rect = area;
    frame.render_widget(Clear, area);
    let input = Paragraph::new(value).block(
        themed_block(&theme)
            .title(title.as_str())
            .style(Style::default().bg(theme.bg_alt).fg(theme.fg)),
    );
    frame.render_widget(input, area);
    let cursor_x = area.x + 1 + to_u16_saturating(before_cursor.width());
    let cursor_y = area.y + 1;
    if cursor_x < area.right().saturating_sub(1) {
        frame.set_cursor_position((cursor_x, cursor_y));
    }
}

fn render_dialog(area: Rect, title: &str, text: String, theme: &Theme, frame: &mut Frame<'_>) {
    frame.render_widget(Clear, area);
    let body = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(theme.fg).bg(theme.bg_alt))
        .block(themed_block(theme).title(title));
    frame.render_widget(body, area);
}

pub(crate) fn render_delete_prompt(app: &App, frame: &mut Frame<'_>) {
    let PendingAction::Delete { counts, .. } = &app.pending else {
        return;
    };
    let area = centered_rect(64, 28, frame.area());
    let mut text = vec![pending_hint(&app.pending), String::new()];
    if !counts.complete {
        text.push("Some folders were never opened; their contents are deleted too.".to_string());
    }
    text.push("Enter or Y: Confirm delete".to_string());
    text.push("Esc or N: Cancel".to_string());
    render_dialog(area, "Confirm Delete", text.join("\n"), &app.theme, frame);
}

pub(crate) fn render_help(app: &App, frame: &mut Frame<'_>) {
    let theme = &app.theme;
    let area = centered_rect(78, 80, frame.area());
    frame.render_widget(Clear, area);

    let heading = Style::default()
        .fg(theme.accent)
        .add_modifier(Modifier::BOLD);
    let key_s = Style::default().fg(theme.accent_secondary);
    let desc_s = Style::default().fg(theme.fg);
    let sep_s = Style::default().fg(theme.fg_muted);
    let muted = Style::default().fg(theme.fg_muted);
    let line = |entries: &[(&str, &str)]| help_keybind_line(entries, key_s, desc_s, sep_s);

    let (expand_key, collapse_key) = if app.settings.rtl {
        ("Left", "Right")
    } else {
        ("Right", "Left")
    };

    let lines: Vec<Line> = vec![
        Line::from(Span::styled("Tree", heading)),
        Line::from(""),
        line(&[
            ("Up/Down", "move"),
            ("PgUp/PgDn", "page"),
            ("Home/End", "first/last"),
        ]),
        line(&[
            (expand_key, "open folder / first child"),
            (collapse_key, "close folder / parent"),
        ]),
        line(&[
            ("Enter", "open bookmark or toggle folder"),
            ("Ctrl+O", "open all in folder"),
        ]),
        line(&[("letters", "jump to matching title")]),
        Line::from(""),
        Line::from(Span::styled("Editing", heading)),
        Line::from(""),
        line(&[
            ("Ctrl+N/Insert", "new bookmark"),
            ("F2", "rename"),
            ("Delete", "delete"),
        ]),
        line(&[
            ("Ctrl+C", "copy URL"),
            ("Menu/Shift+F10", "context menu"),
        ]),
        Line::from(""),
        Line::from(Span::styled("General", heading)),
        Line::from(""),
        line(&[
            ("Ctrl+F", "search"),
            ("Tab", "switch focus"),
            ("Ctrl+R/F5", "reload"),
        ]),
        line(&[("F1", "help"), ("Ctrl+Q", "quit")]),
        Line::from(""),
        Line::from(Span::styled("Mouse", heading)),
        Line::from(""),
        Line::from(vec![
            Span::styled("Click", key_s),
            Span::styled(" row: open or toggle", desc_s),
            Span::styled("  |  ", sep_s),
            Span::styled("Right-click", key_s),
            Span::styled(" context menu", desc_s),
        ]),
        Line::from(vec![
            Span::styled("Drag", key_s),
            Span::styled(" rows to move them", desc_s),
            Span::styled("  |  ", sep_s),
            Span::styled("Shift", key_s),
            Span::styled(" drop before", desc_s),
            Span::styled("  |  ", sep_s),
            Span::styled("Ctrl/Alt", key_s),
            Span::styled(" drop after", desc_s),
        ]),
        Line::from(Span::styled(
            "Hovering near the top or bottom edge while dragging scrolls the tree",
            muted,
        )),
        Line::from(""),
    ];

    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(theme.fg).bg(theme.bg_alt))
        .block(
            themed_block(theme)
                .title(" Help ")
                .style(Style::default().bg(theme.bg_alt)),
        );
    frame.render_widget(paragraph, area);
}
