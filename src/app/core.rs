use super::{App, ContextMenuState, SearchInputState};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use arboard::Clipboard;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use ratatui::layout::Rect;

use crate::dnd::DragController;
use crate::events::TreeEvent;
use crate::ids::NodeId;
use crate::nav::{TypeAhead, Window};
use crate::settings::Settings;
use crate::sync::TreeSynchronizer;
use crate::theme::Theme;
use crate::types::{Focus, PendingAction};
use crate::util::opener_command;

impl App {
    pub(crate) const SCROLL_LINES: usize = 3;
    pub(crate) const FS_REFRESH_DEBOUNCE_MS: u64 = 150;
    pub(crate) const SELF_WRITE_GRACE_MS: u64 = 750;

    pub(crate) fn new(
        sync: TreeSynchronizer,
        settings: Settings,
        theme: Theme,
        store_path: PathBuf,
    ) -> Self {
        let drag = DragController::new(
            settings.drop_zones,
            settings.autoscroll_margin,
            settings.autoscroll_interval,
        );
        let typeahead = TypeAhead::new(settings.typeahead_timeout);
        let mut app = Self {
            sync,
            drag,
            typeahead,
            settings,
            theme,
            store_path,
            focus: Focus::Tree,
            status: String::new(),
            pending: PendingAction::None,
            quit: false,
            help_open: false,
            tree_rect: Rect::default(),
            search_rect: Rect::default(),
            prompt_rect: Rect::default(),
            search_input: SearchInputState {
                query: String::new(),
                cursor: 0,
            },
            context_menu: ContextMenuState {
                open: false,
                index: 0,
                target: None,
                actions: Vec::new(),
                pos: (0, 0),
                rect: Rect::default(),
            },
            prompt: None,
            clipboard: Clipboard::new().ok(),
            press: None,
            last_pointer: None,
            fs_watcher: None,
            fs_rx: None,
            fs_refresh_pending: false,
            last_fs_event: Instant::now(),
            last_local_write: None,
        };
        if let Err(err) = app.sync.load() {
            app.set_status(format!("Cannot load bookmarks: {err}"));
        }
        app.start_store_watcher();
        app
    }

    pub(crate) fn set_status<S: Into<String>>(&mut self, status: S) {
        self.status = status.into();
    }

    /// Watches the directory holding the bookmark file; editors often replace files instead
    /// of writing them in place.
    pub(crate) fn start_store_watcher(&mut self) {
        let Some(dir) = self.store_path.parent().map(PathBuf::from) else {
            return;
        };
        let target = self.store_path.clone();
        let (tx, rx) = mpsc::channel::<()>();
        let mut watcher = match RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res
                    && event.paths.iter().any(|p| p == &target)
                {
                    let _ = tx.send(());
                }
            },
            Config::default().with_poll_interval(Duration::from_millis(250)),
        ) {
            Ok(w) => w,
            Err(err) => {
                tracing::warn!(%err, "bookmark file watch unavailable");
                self.set_status(format!("Bookmark file watch unavailable: {err}"));
                return;
            }
        };
        if let Err(err) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            tracing::warn!(%err, dir = %dir.display(), "bookmark file watch unavailable");
            self.set_status(format!("Bookmark file watch unavailable: {err}"));
            return;
        }
        self.fs_rx = Some(rx);
        self.fs_watcher = Some(watcher);
        self.fs_refresh_pending = false;
    }

    /// Reloads the tree after the bookmark file changed on disk. Changes that follow one of our
    /// own confirmed edits are the store saving itself and are skipped.
    pub(crate) fn poll_store_changes(&mut self) {
        let mut saw_event = false;
        if let Some(rx) = self.fs_rx.as_ref() {
            while rx.try_recv().is_ok() {
                saw_event = true;
            }
        }
        if saw_event {
            self.fs_refresh_pending = true;
            self.last_fs_event = Instant::now();
        }
        if !self.fs_refresh_pending
            || self.last_fs_event.elapsed() < Duration::from_millis(Self::FS_REFRESH_DEBOUNCE_MS)
            || self.sync.has_pending()
        {
            return;
        }
        self.fs_refresh_pending = false;
        let own_write = self
            .last_local_write
            .is_some_and(|t| t.elapsed() < Duration::from_millis(Self::SELF_WRITE_GRACE_MS));
        if own_write {
            return;
        }
        tracing::debug!(path = %self.store_path.display(), "bookmark file changed, refreshing");
        match self.sync.refresh() {
            Ok(_) => self.set_status("Bookmarks changed on disk, reloaded"),
            Err(err) => self.set_status(format!("Reload failed: {err}")),
        }
    }

    /// Applies store replies and reflects their outcome in the status line.
    pub(crate) fn poll_store(&mut self) {
        for event in self.sync.poll() {
            if event.is_structural() {
                self.last_local_write = Some(Instant::now());
            }
            match event {
                TreeEvent::Loaded => {
                    let rows = self.sync.view().visible().len();
                    tracing::debug!(rows, "tree loaded");
                }
                TreeEvent::Created(node) => {
                    let kind = if node.is_folder() { "folder" } else { "bookmark" };
                    self.set_status(format!("Created {kind} '{}'", node.title));
                    self.ensure_focus_visible();
                }
                TreeEvent::Updated(node) => self.set_status(format!("Saved '{}'", node.title)),
                TreeEvent::Removed(_) => {
                    self.set_status("Deleted");
                    self.ensure_focus_visible();
                }
                TreeEvent::Moved { node, .. } => {
                    self.set_status(format!("Moved '{}'", node.title));
                }
                TreeEvent::SearchResults(count) => self.set_status(format!("{count} results")),
                TreeEvent::Rejected { op, error, .. } => {
                    self.set_status(format!("{op} failed: {error}"));
                }
                TreeEvent::FolderFocused(_) | TreeEvent::SearchEntered | TreeEvent::SearchExited => {}
            }
        }
        let opens = self.sync.take_opens();
        if !opens.is_empty() {
            let count = opens.len();
            for url in opens {
                self.open_url(&url);
            }
            self.set_status(format!("Opened {count} bookmarks"));
        }
    }

    pub(crate) fn open_url(&mut self, url: &str) {
        let (program, args) = opener_command(url);
        let spawned = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(_) => {
                tracing::debug!(url, "opened");
                self.set_status(format!("Opened {url}"));
            }
            Err(err) => {
                tracing::warn!(url, %err, "opener failed");
                self.set_status(format!("Cannot open {url}: {err}"));
            }
        }
    }

    pub(crate) fn copy_to_clipboard(&mut self, text: &str) {
        let copied = self
            .clipboard
            .as_mut()
            .is_some_and(|cb| cb.set_text(text.to_string()).is_ok());
        if copied {
            self.set_status("Copied URL");
        } else {
            self.set_status("Clipboard unavailable");
        }
    }

    /// Rows that fit inside the tree pane's border.
    pub(crate) fn tree_rows(&self) -> usize {
        usize::from(self.tree_rect.height.saturating_sub(2)).max(1)
    }

    pub(crate) fn tree_window(&self) -> Window {
        Window {
            top: self.sync.view().scroll(),
            rows: self.tree_rows(),
        }
    }

    pub(crate) fn focused_index(&self, visible: &[NodeId]) -> Option<usize> {
        let focused = self.sync.view().focused()?;
        visible.iter().position(|id| id == focused)
    }

    /// Scrolls just enough to bring the focused row on screen.
    pub(crate) fn ensure_focus_visible(&mut self) {
        let visible = self.sync.view().visible();
        let Some(idx) = self.focused_index(&visible) else {
            return;
        };
        let rows = self.tree_rows();
        let top = self.sync.view().scroll();
        if idx < top {
            self.sync.set_scroll(idx);
        } else if idx >= top + rows {
            self.sync.set_scroll(idx + 1 - rows);
        }
    }

    pub(crate) fn scroll_tree(&mut self, down: bool, lines: usize) {
        let len = self.sync.view().visible().len();
        let max_top = len.saturating_sub(self.tree_rows());
        let top = self.sync.view().scroll();
        let next = if down {
            (top + lines).min(max_top)
        } else {
            top.saturating_sub(lines)
        };
        self.sync.set_scroll(next);
    }

    /// The tree row drawn at screen line `y`, if any.
    pub(crate) fn node_at_row(&self, y: u16) -> Option<NodeId> {
        let inner_top = self.tree_rect.y.saturating_add(1);
        let inner_bottom = self.tree_rect.y.saturating_add(self.tree_rect.height.saturating_sub(1));
        if y < inner_top || y >= inner_bottom {
            return None;
        }
        let idx = self.sync.view().scroll() + usize::from(y - inner_top);
        self.sync.view().visible().get(idx).cloned()
    }

    /// Saves scroll and focus before the terminal is torn down.
    pub(crate) fn persist_state(&mut self) {
        self.sync.save_view_state();
        tracing::info!("view state saved");
    }
}
