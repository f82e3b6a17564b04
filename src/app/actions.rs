use super::App;

use crate::ids::NodeId;
use crate::sync::InsertPosition;
use crate::types::{ContextAction, PendingAction, Placement, PromptMode, PromptState};
use crate::view::ItemKind;

impl App {
    /// Folders open and close; bookmarks open in the browser; separators do nothing.
    pub(crate) fn activate(&mut self, id: &NodeId) {
        let url = match self.sync.view().get(id).map(|item| &item.kind) {
            Some(ItemKind::Folder { .. }) => None,
            Some(ItemKind::Bookmark { url }) => Some(url.clone()),
            Some(ItemKind::Separator { .. }) | None => return,
        };
        match url {
            Some(url) => {
                self.sync.set_active(Some(id.clone()));
                self.open_url(&url);
            }
            None => match self.sync.toggle_expand(id) {
                Ok(_) => self.ensure_focus_visible(),
                Err(err) => self.set_status(format!("Cannot toggle folder: {err}")),
            },
        }
    }

    pub(crate) fn open_all(&mut self, id: &NodeId) {
        let target = match self.sync.view().get(id) {
            Some(item) if item.is_folder() => id.clone(),
            Some(item) => item.parent_id.clone(),
            None => return,
        };
        if let Err(err) = self.sync.open_all(&target) {
            self.set_status(format!("Cannot open folder: {err}"));
        }
    }

    /// New items go inside a folder (last) or right after a bookmark. Without a row they go
    /// to the end of the last top-level folder.
    pub(crate) fn placement_for(&self, target: Option<&NodeId>) -> Option<Placement> {
        let view = self.sync.view();
        match target.and_then(|id| view.get(id)) {
            Some(item) if item.is_folder() => Some(Placement {
                reference: item.node_id.clone(),
                position: InsertPosition::Bottom,
            }),
            Some(item) => Some(Placement {
                reference: item.node_id.clone(),
                position: InsertPosition::After,
            }),
            None => view
                .children_of(view.root_id())
                .and_then(|top| top.last())
                .map(|last| Placement {
                    reference: last.clone(),
                    position: InsertPosition::Bottom,
                }),
        }
    }

    pub(crate) fn begin_new_bookmark(&mut self, target: Option<NodeId>) {
        let Some(placement) = self.placement_for(target.as_ref()) else {
            self.set_status("Nowhere to add a bookmark yet");
            return;
        };
        self.prompt = Some(PromptState::new(
            "New bookmark: URL",
            "https://",
            PromptMode::NewBookmarkUrl { placement },
        ));
    }

    pub(crate) fn begin_new_folder(&mut self, target: Option<NodeId>) {
        let Some(placement) = self.placement_for(target.as_ref()) else {
            self.set_status("Nowhere to add a folder yet");
            return;
        };
        self.prompt = Some(PromptState::new(
            "New folder: name",
            "",
            PromptMode::NewFolder { placement },
        ));
    }

    pub(crate) fn insert_separator(&mut self, target: Option<NodeId>) {
        let Some(placement) = self.placement_for(target.as_ref()) else {
            return;
        };
        if let Err(err) =
            self.sync
                .insert(&placement.reference, placement.position, "", None, true)
        {
            self.set_status(format!("Cannot add separator: {err}"));
        }
    }

    pub(crate) fn begin_rename(&mut self, id: &NodeId) {
        if self.sync.view().is_protected(id) {
            self.set_status("This folder cannot be renamed");
            return;
        }
        let Some(item) = self.sync.view().get(id) else {
            return;
        };
        let title = item.title.clone();
        self.prompt = Some(PromptState::new(
            "Rename",
            title,
            PromptMode::Rename { target: id.clone() },
        ));
    }

    pub(crate) fn begin_edit_url(&mut self, id: &NodeId) {
        let Some(url) = self
            .sync
            .view()
            .get(id)
            .and_then(|item| item.url().map(str::to_string))
        else {
            self.set_status("Folders have no URL");
            return;
        };
        self.prompt = Some(PromptState::new(
            "Edit URL",
            url,
            PromptMode::EditUrl { target: id.clone() },
        ));
    }

    /// Empty folders and bookmarks go right away; anything with contents asks first.
    pub(crate) fn request_delete(&mut self, id: &NodeId) {
        if self.sync.view().is_protected(id) {
            self.set_status("This folder cannot be deleted");
            return;
        }
        let Some(item) = self.sync.view().get(id) else {
            return;
        };
        let label = item.label.clone();
        let is_folder = item.is_folder();
        let counts = self.sync.removal_summary(id).unwrap_or_default();
        let empty = counts.complete && counts.folders + counts.bookmarks == 0;
        if is_folder && !empty {
            self.pending = PendingAction::Delete {
                target: id.clone(),
                label,
                counts,
            };
            return;
        }
        self.confirm_delete(id);
    }

    pub(crate) fn confirm_delete(&mut self, id: &NodeId) {
        if let Err(err) = self.sync.remove(id) {
            self.set_status(format!("Cannot delete: {err}"));
        }
    }

    pub(crate) fn run_context_action(&mut self, action: ContextAction, target: Option<NodeId>) {
        match action {
            ContextAction::Open => {
                if let Some(id) = target {
                    self.activate(&id);
                }
            }
            ContextAction::OpenAll => {
                if let Some(id) = target {
                    self.open_all(&id);
                }
            }
            ContextAction::NewBookmark => self.begin_new_bookmark(target),
            ContextAction::NewFolder => self.begin_new_folder(target),
            ContextAction::NewSeparator => self.insert_separator(target),
            ContextAction::Rename => {
                if let Some(id) = target {
                    self.begin_rename(&id);
                }
            }
            ContextAction::EditUrl => {
                if let Some(id) = target {
                    self.begin_edit_url(&id);
                }
            }
            ContextAction::CopyUrl => {
                if let Some(url) = target
                    .and_then(|id| self.sync.view().get(&id))
                    .and_then(|item| item.url().map(str::to_string))
                {
                    self.copy_to_clipboard(&url);
                }
            }
            ContextAction::Delete => {
                if let Some(id) = target {
                    self.request_delete(&id);
                }
            }
            ContextAction::Cancel => {}
        }
    }

    pub(crate) fn apply_prompt(&mut self, mode: PromptMode, value: String) {
        let result = match mode {
            PromptMode::NewBookmarkUrl { placement } => {
                self.prompt = Some(PromptState::new(
                    "New bookmark: title",
                    "",
                    PromptMode::NewBookmarkTitle {
                        placement,
                        url: value,
                    },
                ));
                return;
            }
            PromptMode::NewBookmarkTitle { placement, url } => self.sync.insert(
                &placement.reference,
                placement.position,
                &value,
                Some(&url),
                false,
            ),
            PromptMode::NewFolder { placement } => {
                self.sync
                    .insert(&placement.reference, placement.position, &value, None, false)
            }
            PromptMode::Rename { target } => self.sync.rename(&target, &value),
            PromptMode::EditUrl { target } => self.sync.edit_url(&target, &value),
        };
        if let Err(err) = result {
            self.set_status(format!("Action failed: {err}"));
        }
    }
}
