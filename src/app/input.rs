use super::App;
use std::io;
use std::time::Instant;

use ratatui::crossterm::event::{
    KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};

use crate::ids::NodeId;
use crate::nav::{NavAction, NavKey, navigate_tree, type_ahead_tree};
use crate::types::{Focus, PendingAction};
use crate::util::inside;

fn nav_key(code: KeyCode) -> Option<NavKey> {
    match code {
        KeyCode::Up => Some(NavKey::Up),
        KeyCode::Down => Some(NavKey::Down),
        KeyCode::Left => Some(NavKey::Left),
        KeyCode::Right => Some(NavKey::Right),
        KeyCode::Home => Some(NavKey::Home),
        KeyCode::End => Some(NavKey::End),
        KeyCode::PageUp => Some(NavKey::PageUp),
        KeyCode::PageDown => Some(NavKey::PageDown),
        _ => None,
    }
}

impl App {
    pub(crate) fn handle_key(&mut self, key: KeyEvent) -> io::Result<()> {
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }

        if self.drag.is_dragging() {
            if key.code == KeyCode::Esc {
                self.drag.cancel();
                self.press = None;
                self.set_status("Drag cancelled");
            }
            return Ok(());
        }
        if self.prompt.is_some() {
            return self.handle_prompt_key(key);
        }
        if self.context_menu.open {
            return self.handle_context_menu_key(key);
        }
        if self.help_open {
            if matches!(key.code, KeyCode::Esc | KeyCode::F(1) | KeyCode::Enter) {
                self.help_open = false;
            }
            return Ok(());
        }
        if self.handle_pending_key(key)? {
            return Ok(());
        }

        match (key.modifiers, key.code) {
            (m, KeyCode::Char('q')) if m.contains(KeyModifiers::CONTROL) => {
                self.quit = true;
                return Ok(());
            }
            (m, KeyCode::Char('f')) if m.contains(KeyModifiers::CONTROL) => {
                self.focus = Focus::Search;
                self.set_status("Search: type to filter, Esc to return");
                return Ok(());
            }
            (m, KeyCode::Char('r')) if m.contains(KeyModifiers::CONTROL) => {
                self.refresh();
                return Ok(());
            }
            (_, KeyCode::F(5)) => {
                self.refresh();
                return Ok(());
            }
            (_, KeyCode::F(1)) => {
                self.help_open = true;
                return Ok(());
            }
            (KeyModifiers::NONE, KeyCode::Tab) => {
                self.focus = match self.focus {
                    Focus::Tree => Focus::Search,
                    Focus::Search => Focus::Tree,
                };
                return Ok(());
            }
            _ => {}
        }

        match self.focus {
            Focus::Tree => self.handle_tree_key(key),
            Focus::Search => self.handle_search_key(key),
        }
    }

    pub(crate) fn handle_tree_key(&mut self, key: KeyEvent) -> io::Result<()> {
        if self.sync.search_overlay().is_active() {
            // Results replace the tree; only the search line takes keys.
            self.focus = Focus::Search;
            return self.handle_search_key(key);
        }
        if let Some(nav) = nav_key(key.code)
            && !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
        {
            self.typeahead.reset();
            let action = navigate_tree(self.sync.view(), nav, self.tree_window(), self.settings.rtl);
            self.apply_nav_action(action);
            return Ok(());
        }
        let focused = self.sync.view().focused().cloned();
        match (key.modifiers, key.code) {
            (_, KeyCode::Enter) => {
                if let Some(id) = focused {
                    self.activate(&id);
                }
            }
            (m, KeyCode::Char('o')) if m.contains(KeyModifiers::CONTROL) => {
                if let Some(id) = focused {
                    self.open_all(&id);
                }
            }
            (m, KeyCode::Char('c')) if m.contains(KeyModifiers::CONTROL) => {
                if let Some(url) = focused
                    .and_then(|id| self.sync.view().get(&id))
                    .and_then(|item| item.url().map(str::to_string))
                {
                    self.copy_to_clipboard(&url);
                }
            }
            (m, KeyCode::Char('n')) if m.contains(KeyModifiers::CONTROL) => {
                self.begin_new_bookmark(focused);
            }
            (_, KeyCode::Insert) => self.begin_new_bookmark(focused),
            (_, KeyCode::F(2)) => {
                if let Some(id) = focused {
                    self.begin_rename(&id);
                }
            }
            (_, KeyCode::Delete) => {
                if let Some(id) = focused {
                    self.request_delete(&id);
                }
            }
            (_, KeyCode::Menu) => self.open_context_menu_for_focus(),
            (m, KeyCode::F(10)) if m.contains(KeyModifiers::SHIFT) => {
                self.open_context_menu_for_focus()
            }
            (_, KeyCode::Esc) => self.typeahead.reset(),
            (m, KeyCode::Char(c)) if !m.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) => {
                let prefix = self.typeahead.push(c, Instant::now()).to_string();
                match type_ahead_tree(self.sync.view(), &prefix) {
                    Some(id) => {
                        self.sync.focus(Some(id));
                        self.ensure_focus_visible();
                    }
                    None => self.set_status(format!("No row starts with '{prefix}'")),
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn apply_nav_action(&mut self, action: NavAction) {
        match action {
            NavAction::Focus(id) => {
                self.sync.focus(Some(id));
                self.ensure_focus_visible();
            }
            NavAction::Expand(id) => self.set_folder_open(&id, true),
            NavAction::Collapse(id) => self.set_folder_open(&id, false),
            NavAction::OpenContextMenu(_) => self.open_context_menu_for_focus(),
            NavAction::None => {}
        }
    }

    pub(crate) fn set_folder_open(&mut self, id: &NodeId, open: bool) {
        if let Err(err) = self.sync.set_expanded(id, open) {
            self.set_status(format!("Cannot toggle folder: {err}"));
        }
    }

    pub(crate) fn refresh(&mut self) {
        match self.sync.refresh() {
            Ok(_) => self.set_status("Reloading bookmarks"),
            Err(err) => self.set_status(format!("Reload failed: {err}")),
        }
    }

    pub(crate) fn handle_mouse(&mut self, mouse: MouseEvent) -> io::Result<()> {
        if self.help_open {
            if matches!(mouse.kind, MouseEventKind::Down(MouseButton::Left)) {
                self.help_open = false;
            }
            return Ok(());
        }
        if self.prompt.is_some() {
            if Self::left_click_outside(mouse, self.prompt_rect) {
                self.prompt = None;
                self.set_status("Canceled");
            }
            return Ok(());
        }
        if self.context_menu.open {
            return self.handle_context_menu_mouse(mouse);
        }
        if !matches!(self.pending, PendingAction::None) {
            return Ok(());
        }

        if self.sync.search_overlay().is_active() {
            return self.handle_search_results_mouse(mouse);
        }

        // A drag keeps receiving events after the pointer leaves the tree.
        if self.drag.is_dragging() || self.press.is_some() {
            return self.handle_drag_mouse(mouse);
        }

        if inside(mouse.column, mouse.row, self.tree_rect) {
            self.focus = Focus::Tree;
            match mouse.kind {
                MouseEventKind::Down(MouseButton::Left) => self.press_row(mouse),
                MouseEventKind::Down(MouseButton::Right) => {
                    self.open_context_menu_at(mouse.column, mouse.row);
                }
                MouseEventKind::ScrollDown => self.scroll_tree(true, Self::SCROLL_LINES),
                MouseEventKind::ScrollUp => self.scroll_tree(false, Self::SCROLL_LINES),
                _ => {}
            }
        }
        Ok(())
    }
}
