use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::Instant;

use arboard::Clipboard;
use notify::RecommendedWatcher;
use ratatui::layout::Rect;

use crate::dnd::{DragController, Pointer};
use crate::ids::NodeId;
use crate::nav::TypeAhead;
use crate::settings::Settings;
use crate::sync::TreeSynchronizer;

use crate::theme::Theme;
use crate::types::{ContextAction, Focus, PendingAction, PromptState};

mod actions;
mod core;
mod drag;
mod input;
mod input_handlers;

pub(crate) struct ContextMenuState {
    pub(crate) open: bool,
    pub(crate) index: usize,
    /// `None` when opened on the empty area below the rows.
    pub(crate) target: Option<NodeId>,
    pub(crate) actions: Vec<ContextAction>,
    pub(crate) pos: (u16, u16),
    pub(crate) rect: Rect,
}

/// Text typed into the search line. The results themselves live in the synchronizer.
pub(crate) struct SearchInputState {
    pub(crate) query: String,
    pub(crate) cursor: usize,
}

/// A left press on a row that has not yet turned into a drag or a click.
pub(crate) struct PressState {
    pub(crate) node: NodeId,
    pub(crate) pointer: Pointer,
}

pub(crate) struct App {
    pub(crate) sync: TreeSynchronizer,
    pub(crate) drag: DragController,
    pub(crate) typeahead: TypeAhead,
    pub(crate) settings: Settings,
    pub(crate) theme: Theme,
    pub(crate) store_path: PathBuf,
    pub(crate) focus: Focus,
    pub(crate) status: String,
    pub(crate) pending: PendingAction,
    pub(crate) quit: bool,
    pub(crate) help_open: bool,
    pub(crate) tree_rect: Rect,
    pub(crate) search_rect: Rect,
    pub(crate) prompt_rect: Rect,
    pub(crate) search_input: SearchInputState,
    pub(crate) context_menu: ContextMenuState,
    pub(crate) prompt: Option<PromptState>,
    pub(crate) clipboard: Option<Clipboard>,
    pub(crate) press: Option<PressState>,
    /// Pointer and row fraction of the last drag update, replayed after an auto-scroll step.
    pub(crate) last_pointer: Option<(Pointer, f32)>,
    pub(crate) fs_watcher: Option<RecommendedWatcher>,
    pub(crate) fs_rx: Option<Receiver<()>>,
    pub(crate) fs_refresh_pending: bool,
    pub(crate) last_fs_event: Instant,
    /// Last time one of our own edits was confirmed; the store rewrites its file then.
    pub(crate) last_local_write: Option<Instant>,
}
