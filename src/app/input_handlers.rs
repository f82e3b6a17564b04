use super::App;
use std::io;

use ratatui::crossterm::event::{
    KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use ratatui::layout::Rect;

use crate::nav::{NavKey, Window, step};
use crate::types::{Focus, PendingAction, PromptMode};
use crate::util::{byte_offset, context_actions, inside, to_u16_saturating};

impl App {
    pub(crate) fn open_context_menu_at(&mut self, column: u16, row: u16) {
        let target = self.node_at_row(row);
        if let Some(id) = target.clone() {
            self.sync.focus(Some(id));
        }
        self.show_context_menu(target, (column, row));
    }

    /// Keyboard variant: anchors the menu next to the focused row.
    pub(crate) fn open_context_menu_for_focus(&mut self) {
        let visible = self.sync.view().visible();
        let Some(idx) = self.focused_index(&visible) else {
            self.show_context_menu(None, (self.tree_rect.x + 2, self.tree_rect.y + 1));
            return;
        };
        let offset = idx.saturating_sub(self.sync.view().scroll());
        let level = self
            .sync
            .view()
            .get(&visible[idx])
            .map_or(0, |item| item.level);
        let pos = (
            self.tree_rect.x + 2 + to_u16_saturating(level * 2),
            self.tree_rect.y + 2 + to_u16_saturating(offset),
        );
        self.show_context_menu(Some(visible[idx].clone()), pos);
    }

    fn show_context_menu(&mut self, target: Option<crate::ids::NodeId>, pos: (u16, u16)) {
        let view = self.sync.view();
        let item = target.as_ref().and_then(|id| view.get(id));
        let protected = target.as_ref().is_some_and(|id| view.is_protected(id));
        self.context_menu.actions = context_actions(item, protected);
        self.context_menu.target = target;
        self.context_menu.index = 0;
        self.context_menu.pos = pos;
        self.context_menu.open = true;
    }

    pub(crate) fn left_click_outside(mouse: MouseEvent, rect: Rect) -> bool {
        matches!(mouse.kind, MouseEventKind::Down(MouseButton::Left))
            && !inside(mouse.column, mouse.row, rect)
    }

    pub(crate) fn handle_prompt_key(&mut self, key: KeyEvent) -> io::Result<()> {
        let Some(prompt) = self.prompt.as_mut() else {
            return Ok(());
        };
        match (key.modifiers, key.code) {
            (_, KeyCode::Esc) => {
                self.prompt = None;
                self.set_status("Canceled");
            }
            (_, KeyCode::Enter) => {
                let value = prompt.value.trim().to_string();
                let may_be_empty = matches!(
                    prompt.mode,
                    PromptMode::Rename { .. } | PromptMode::NewBookmarkTitle { .. }
                );
                if value.is_empty() && !may_be_empty {
                    self.set_status("Value cannot be empty");
                    return Ok(());
                }
                let mode = prompt.mode.clone();
                self.prompt = None;
                self.apply_prompt(mode, value);
            }
            (_, KeyCode::Backspace) => {
                if prompt.cursor > 0 {
                    prompt.cursor -= 1;
                    let at = byte_offset(&prompt.value, prompt.cursor);
                    prompt.value.remove(at);
                }
            }
            (_, KeyCode::Delete) => {
                if prompt.cursor < prompt.value.chars().count() {
                    let at = byte_offset(&prompt.value, prompt.cursor);
                    prompt.value.remove(at);
                }
            }
            (_, KeyCode::Left) => {
                prompt.cursor = prompt.cursor.saturating_sub(1);
            }
            (_, KeyCode::Right) => {
                if prompt.cursor < prompt.value.chars().count() {
                    prompt.cursor += 1;
                }
            }
            (_, KeyCode::Home) => {
                prompt.cursor = 0;
            }
            (_, KeyCode::End) => {
                prompt.cursor = prompt.value.chars().count();
            }
            (_, KeyCode::Char(c)) => {
                if !key.modifiers.contains(KeyModifiers::CONTROL) {
                    let at = byte_offset(&prompt.value, prompt.cursor);
                    prompt.value.insert(at, c);
                    prompt.cursor += 1;
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn handle_context_menu_key(&mut self, key: KeyEvent) -> io::Result<()> {
        let len = self.context_menu.actions.len();
        match key.code {
            KeyCode::Esc => {
                self.context_menu.open = false;
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.context_menu.index = self.context_menu.index.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.context_menu.index + 1 < len {
                    self.context_menu.index += 1;
                }
            }
            KeyCode::Enter => self.run_selected_context_action(),
            _ => {}
        }
        Ok(())
    }

    fn run_selected_context_action(&mut self) {
        self.context_menu.open = false;
        let Some(action) = self.context_menu.actions.get(self.context_menu.index).copied() else {
            return;
        };
        let target = self.context_menu.target.take();
        self.run_context_action(action, target);
    }

    pub(crate) fn handle_context_menu_mouse(&mut self, mouse: MouseEvent) -> io::Result<()> {
        if Self::left_click_outside(mouse, self.context_menu.rect) {
            self.context_menu.open = false;
            return Ok(());
        }
        if matches!(mouse.kind, MouseEventKind::Down(MouseButton::Left)) {
            let rect = self.context_menu.rect;
            if mouse.row > rect.y && mouse.row < rect.y + rect.height.saturating_sub(1) {
                self.context_menu.index = usize::from(mouse.row - rect.y - 1);
                self.run_selected_context_action();
            }
        }
        Ok(())
    }

    /// Consumes every key while a confirmation is showing.
    pub(crate) fn handle_pending_key(&mut self, key: KeyEvent) -> io::Result<bool> {
        let PendingAction::Delete { target, .. } = &self.pending else {
            return Ok(false);
        };
        let target = target.clone();
        match key.code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.pending = PendingAction::None;
                self.confirm_delete(&target);
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.pending = PendingAction::None;
                self.set_status("Delete canceled");
            }
            _ => {}
        }
        Ok(true)
    }

    pub(crate) fn search_rows(&self) -> usize {
        usize::from(self.search_rect.height.saturating_sub(2)).max(1)
    }

    fn run_search(&mut self) {
        let query = self.search_input.query.clone();
        if let Err(err) = self.sync.search(&query) {
            self.set_status(format!("Search failed: {err}"));
        }
    }

    pub(crate) fn leave_search(&mut self) {
        self.search_input.query.clear();
        self.search_input.cursor = 0;
        self.sync.exit_search();
        self.focus = Focus::Tree;
        self.ensure_focus_visible();
    }

    /// Opens the selected result. Folders are listed but cannot be opened from here.
    pub(crate) fn activate_search_result(&mut self, index: usize) {
        let overlay = self.sync.search_overlay();
        let Some(result) = overlay.results().get(index) else {
            return;
        };
        if !result.activatable {
            self.set_status("Folders cannot be opened from search");
            return;
        }
        let id = result.node_id.clone();
        let url = result.url.as_ref().map(|h| h.text());
        self.leave_search();
        if let Some(url) = url {
            self.sync.set_active(Some(id));
            self.open_url(&url);
        }
    }

    fn select_result(&mut self, key: NavKey) {
        let rows = self.search_rows();
        let overlay = self.sync.search_overlay_mut();
        let len = overlay.results().len();
        let window = Window {
            top: overlay.scroll(),
            rows,
        };
        let Some(next) = step(len, Some(overlay.selected()), key, window) else {
            return;
        };
        overlay.select(next);
        if next < overlay.scroll() {
            overlay.set_scroll(next);
        } else if next >= overlay.scroll() + rows {
            overlay.set_scroll(next + 1 - rows);
        }
    }

    pub(crate) fn handle_search_key(&mut self, key: KeyEvent) -> io::Result<()> {
        let input = &mut self.search_input;
        match (key.modifiers, key.code) {
            (_, KeyCode::Esc) => self.leave_search(),
            (_, KeyCode::Enter) => {
                let selected = self.sync.search_overlay().selected();
                self.activate_search_result(selected);
            }
            (_, KeyCode::Up) => self.select_result(NavKey::Up),
            (_, KeyCode::Down) => self.select_result(NavKey::Down),
            (_, KeyCode::PageUp) => self.select_result(NavKey::PageUp),
            (_, KeyCode::PageDown) => self.select_result(NavKey::PageDown),
            (_, KeyCode::Left) => input.cursor = input.cursor.saturating_sub(1),
            (_, KeyCode::Right) => {
                if input.cursor < input.query.chars().count() {
                    input.cursor += 1;
                }
            }
            (_, KeyCode::Home) => input.cursor = 0,
            (_, KeyCode::End) => input.cursor = input.query.chars().count(),
            (_, KeyCode::Backspace) => {
                if input.cursor > 0 {
                    input.cursor -= 1;
                    let at = byte_offset(&input.query, input.cursor);
                    input.query.remove(at);
                    self.run_search();
                }
            }
            (m, KeyCode::Char(c)) if !m.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
                let at = byte_offset(&input.query, input.cursor);
                input.query.insert(at, c);
                input.cursor += 1;
                self.run_search();
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn handle_search_results_mouse(&mut self, mouse: MouseEvent) -> io::Result<()> {
        let rect = self.search_rect;
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) if inside(mouse.column, mouse.row, rect) => {
                self.focus = Focus::Search;
                if mouse.row > rect.y {
                    let overlay = self.sync.search_overlay_mut();
                    let idx = overlay.scroll() + usize::from(mouse.row - rect.y - 1);
                    if idx < overlay.results().len() {
                        overlay.select(idx);
                        self.activate_search_result(idx);
                    }
                }
            }
            MouseEventKind::ScrollDown => self.select_result(NavKey::Down),
            MouseEventKind::ScrollUp => self.select_result(NavKey::Up),
            _ => {}
        }
        Ok(())
    }
}
