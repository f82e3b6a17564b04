use super::{App, PressState};
use std::io;
use std::time::Instant;

use ratatui::crossterm::event::{KeyModifiers, MouseButton, MouseEvent, MouseEventKind};

use crate::dnd::{DropOutcome, Pointer, RowHit, ScrollDirection, Viewport};
use crate::util::inside;

/// Terminal rows are one cell tall, so the position within a row comes from modifiers:
/// Shift aims at the top edge, Ctrl or Alt at the bottom edge, nothing at the middle.
fn row_fraction(modifiers: KeyModifiers) -> f32 {
    if modifiers.contains(KeyModifiers::SHIFT) {
        0.1
    } else if modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
        0.9
    } else {
        0.5
    }
}

impl App {
    fn tree_viewport(&self) -> Viewport {
        let r = self.tree_rect;
        Viewport {
            x: r.x.saturating_add(1),
            y: r.y.saturating_add(1),
            width: r.width.saturating_sub(2),
            height: r.height.saturating_sub(2),
        }
    }

    pub(crate) fn press_row(&mut self, mouse: MouseEvent) {
        let Some(node) = self.node_at_row(mouse.row) else {
            return;
        };
        self.sync.focus(Some(node.clone()));
        self.press = Some(PressState {
            node,
            pointer: Pointer {
                x: mouse.column,
                y: mouse.row,
            },
        });
    }

    /// A press becomes a drag once the pointer reaches another row; a release without that is
    /// a click.
    pub(crate) fn handle_drag_mouse(&mut self, mouse: MouseEvent) -> io::Result<()> {
        let pointer = Pointer {
            x: mouse.column,
            y: mouse.row,
        };
        match mouse.kind {
            MouseEventKind::Drag(MouseButton::Left) => {
                if !self.drag.is_dragging() {
                    let Some(press) = self.press.as_ref() else {
                        return Ok(());
                    };
                    if press.pointer.y == pointer.y {
                        return Ok(());
                    }
                    let node = press.node.clone();
                    if !self.drag.begin(&mut self.sync, &node, pointer) {
                        self.press = None;
                        self.set_status("This folder cannot be moved");
                        return Ok(());
                    }
                    self.set_status("Drop: Shift = before, Ctrl/Alt = after, Esc cancels");
                }
                self.update_drag(pointer, row_fraction(mouse.modifiers));
            }
            MouseEventKind::Up(MouseButton::Left) => {
                let press = self.press.take();
                self.last_pointer = None;
                if self.drag.is_dragging() {
                    self.finish_drag();
                } else if let Some(press) = press
                    && self.node_at_row(mouse.row).as_ref() == Some(&press.node)
                    && inside(mouse.column, mouse.row, self.tree_rect)
                {
                    self.activate(&press.node);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn update_drag(&mut self, pointer: Pointer, fraction: f32) {
        self.last_pointer = Some((pointer, fraction));
        let hit = if inside(pointer.x, pointer.y, self.tree_rect) {
            self.node_at_row(pointer.y)
                .map(|node| RowHit { node, fraction })
        } else {
            None
        };
        let viewport = self.tree_viewport();
        self.drag
            .pointer_moved(self.sync.view(), pointer, viewport, hit, Instant::now());
    }

    fn finish_drag(&mut self) {
        match self.drag.release(&mut self.sync) {
            Ok(DropOutcome::Moved(_)) => self.set_status("Moving…"),
            Ok(DropOutcome::Cancelled { suppress_click }) => {
                if suppress_click {
                    self.set_status("Dropped outside the tree, nothing moved");
                } else {
                    self.set_status("Nothing moved");
                }
            }
            Err(err) => self.set_status(format!("Cannot move: {err}")),
        }
    }

    /// Scrolls one row per auto-scroll interval while a drag hovers near an edge.
    pub(crate) fn tick_drag(&mut self) {
        let Some(direction) = self.drag.tick_auto_scroll(Instant::now()) else {
            return;
        };
        self.scroll_tree(direction == ScrollDirection::Down, 1);
        if let Some((pointer, fraction)) = self.last_pointer {
            self.update_drag(pointer, fraction);
        }
    }
}
