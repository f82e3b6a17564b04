//! Pointer drag over the tree: drop target resolution, auto-scroll and the final move.

use std::time::{Duration, Instant};

use crate::error::SyncError;
use crate::ids::NodeId;
use crate::store::{Destination, RequestId};
use crate::sync::TreeSynchronizer;
use crate::view::ViewTree;

/// Fractions of a row's height. Leaf rows split once at `leaf_split`; folder rows use
/// `folder_edge` at the top and bottom and treat the middle as "into".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropZones {
    pub leaf_split: f32,
    pub folder_edge: f32,
}

impl Default for DropZones {
    fn default() -> Self {
        Self {
            leaf_split: 0.5,
            folder_edge: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Before,
    After,
    Into,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointer {
    pub x: u16,
    pub y: u16,
}

/// Screen area of the scrollable tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Viewport {
    fn contains(&self, p: Pointer) -> bool {
        p.x >= self.x
            && p.x < self.x.saturating_add(self.width)
            && p.y >= self.y
            && p.y < self.y.saturating_add(self.height)
    }
}

/// Row under the pointer and how far down that row the pointer sits, 0.0 to 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct RowHit {
    pub node: NodeId,
    pub fraction: f32,
}

pub fn compute_disposition(
    view: &ViewTree,
    dragged: &NodeId,
    target: Option<&NodeId>,
    fraction: f32,
    zones: &DropZones,
) -> Disposition {
    let Some(target) = target else {
        return Disposition::None;
    };
    if target == dragged || view.is_ancestor(dragged, target) || view.is_ancestor(target, dragged) {
        return Disposition::None;
    }
    let Some(item) = view.get(target) else {
        return Disposition::None;
    };
    if !item.is_folder() {
        return if fraction < zones.leaf_split {
            Disposition::Before
        } else {
            Disposition::After
        };
    }
    if view.is_protected(target) {
        return Disposition::Into;
    }
    if fraction < zones.folder_edge {
        Disposition::Before
    } else if fraction > 1.0 - zones.folder_edge && !item.is_expanded() {
        Disposition::After
    } else {
        Disposition::Into
    }
}

/// Where a drop lands in store terms. Sibling indexes refer to the list before the dragged
/// node is taken out.
pub fn resolve_move(view: &ViewTree, target: &NodeId, disposition: Disposition) -> Option<Destination> {
    let item = view.get(target)?;
    match disposition {
        Disposition::Before | Disposition::After => {
            let own = view.position_in_parent(target)?;
            let index = if disposition == Disposition::Before { own } else { own + 1 };
            Some(Destination {
                parent_id: item.parent_id.clone(),
                index: Some(index),
            })
        }
        Disposition::Into => Some(Destination {
            parent_id: target.clone(),
            index: None,
        }),
        Disposition::None => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    pub dragged: NodeId,
    pub pointer: Pointer,
    pub candidate: Option<NodeId>,
    pub disposition: Disposition,
    left_tree: bool,
    auto_scroll: Option<(ScrollDirection, Instant)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DragPhase {
    Idle,
    Dragging(DragState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Moved(RequestId),
    /// No store call was made. `suppress_click` is set when the pointer left the tree.
    Cancelled { suppress_click: bool },
}

#[derive(Debug)]
pub struct DragController {
    phase: DragPhase,
    zones: DropZones,
    margin: u16,
    interval: Duration,
}

impl DragController {
    pub fn new(zones: DropZones, margin: u16, interval: Duration) -> Self {
        Self {
            phase: DragPhase::Idle,
            zones,
            margin,
            interval,
        }
    }

    pub fn phase(&self) -> &DragPhase {
        &self.phase
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, DragPhase::Dragging(_))
    }

    /// The row and disposition the drop indicator should preview.
    pub fn indicator(&self) -> Option<(&NodeId, Disposition)> {
        match &self.phase {
            DragPhase::Dragging(state) if state.disposition != Disposition::None => {
                state.candidate.as_ref().map(|c| (c, state.disposition))
            }
            _ => None,
        }
    }

    pub fn dragged(&self) -> Option<&NodeId> {
        match &self.phase {
            DragPhase::Dragging(state) => Some(&state.dragged),
            DragPhase::Idle => None,
        }
    }

    /// Protected folders cannot be dragged. A dragged folder is collapsed first.
    pub fn begin(&mut self, sync: &mut TreeSynchronizer, id: &NodeId, pointer: Pointer) -> bool {
        let view = sync.view();
        if !view.contains(id) || view.is_protected(id) {
            return false;
        }
        if view.get(id).is_some_and(|item| item.is_expanded())
            && let Err(err) = sync.set_expanded(id, false)
        {
            tracing::debug!(id = %id, %err, "could not collapse dragged folder");
        }
        tracing::debug!(id = %id, "drag started");
        self.phase = DragPhase::Dragging(DragState {
            dragged: id.clone(),
            pointer,
            candidate: None,
            disposition: Disposition::None,
            left_tree: false,
            auto_scroll: None,
        });
        true
    }

    pub fn pointer_moved(
        &mut self,
        view: &ViewTree,
        pointer: Pointer,
        viewport: Viewport,
        hit: Option<RowHit>,
        now: Instant,
    ) {
        let DragPhase::Dragging(state) = &mut self.phase else {
            return;
        };
        state.pointer = pointer;
        if !viewport.contains(pointer) {
            state.left_tree = true;
        }

        let within_columns = pointer.x >= viewport.x && pointer.x < viewport.x.saturating_add(viewport.width);
        let direction = if !within_columns {
            None
        } else if pointer.y < viewport.y.saturating_add(self.margin) {
            Some(ScrollDirection::Up)
        } else if pointer.y.saturating_add(self.margin) >= viewport.y.saturating_add(viewport.height) {
            Some(ScrollDirection::Down)
        } else {
            None
        };
        state.auto_scroll = match (direction, state.auto_scroll) {
            (Some(d), Some((current, due))) if d == current => Some((current, due)),
            (Some(d), _) => Some((d, now + self.interval)),
            (None, _) => None,
        };

        let (candidate, fraction) = match hit {
            Some(hit) => (Some(hit.node), hit.fraction),
            None => (None, 0.5),
        };
        state.disposition =
            compute_disposition(view, &state.dragged, candidate.as_ref(), fraction, &self.zones);
        state.candidate = candidate;
    }

    /// One scroll step per elapsed interval while the pointer sits near an edge.
    pub fn tick_auto_scroll(&mut self, now: Instant) -> Option<ScrollDirection> {
        let DragPhase::Dragging(state) = &mut self.phase else {
            return None;
        };
        let (direction, due) = state.auto_scroll?;
        if now < due {
            return None;
        }
        state.auto_scroll = Some((direction, now + self.interval));
        Some(direction)
    }

    pub fn is_auto_scrolling(&self) -> bool {
        matches!(&self.phase, DragPhase::Dragging(state) if state.auto_scroll.is_some())
    }

    pub fn release(&mut self, sync: &mut TreeSynchronizer) -> Result<DropOutcome, SyncError> {
        let DragPhase::Dragging(state) = std::mem::replace(&mut self.phase, DragPhase::Idle) else {
            return Ok(DropOutcome::Cancelled {
                suppress_click: false,
            });
        };
        let destination = state
            .candidate
            .as_ref()
            .and_then(|target| resolve_move(sync.view(), target, state.disposition));
        match destination {
            Some(destination) => {
                tracing::debug!(id = %state.dragged, parent = %destination.parent_id, "drop");
                sync.move_node(&state.dragged, destination).map(DropOutcome::Moved)
            }
            None => Ok(DropOutcome::Cancelled {
                suppress_click: state.left_tree,
            }),
        }
    }

    pub fn cancel(&mut self) -> DropOutcome {
        match std::mem::replace(&mut self.phase, DragPhase::Idle) {
            DragPhase::Dragging(state) => DropOutcome::Cancelled {
                suppress_click: state.left_tree,
            },
            DragPhase::Idle => DropOutcome::Cancelled {
                suppress_click: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryKv;
    use crate::settings::{KEY_OPENS, Settings};
    use crate::store::{BookmarkStore, CreateDetails, InlineHandle, InlineTransport, MemoryStore, StoreClient, StoreOp};

    struct Fixture {
        sync: TreeSynchronizer,
        handle: InlineHandle<MemoryStore>,
        folder: NodeId,
        inner: NodeId,
        a: NodeId,
        b: NodeId,
    }

    fn create(store: &mut MemoryStore, parent: &NodeId, title: &str, url: Option<&str>) -> NodeId {
        store
            .create(CreateDetails {
                parent_id: parent.clone(),
                index: None,
                title: title.to_string(),
                url: url.map(str::to_string),
            })
            .expect("create")
            .id
    }

    /// Bar: folder (open, containing inner), a, b.
    fn fixture() -> Fixture {
        let bar = NodeId::from("1");
        let mut store = MemoryStore::new();
        let folder = create(&mut store, &bar, "folder", None);
        let inner = create(&mut store, &folder, "inner", None);
        let a = create(&mut store, &bar, "a", Some("https://a.example/"));
        let b = create(&mut store, &bar, "b", Some("https://b.example/"));
        let kv = MemoryKv::new().with(KEY_OPENS, &format!("1,{folder}"));
        let settings = Settings::load(&kv);
        let (transport, handle) = InlineTransport::new(store);
        let mut sync = TreeSynchronizer::new(StoreClient::new(transport), Box::new(kv), &settings);
        sync.load().expect("load");
        sync.poll();
        Fixture {
            sync,
            handle,
            folder,
            inner,
            a,
            b,
        }
    }

    fn viewport() -> Viewport {
        Viewport {
            x: 0,
            y: 2,
            width: 40,
            height: 10,
        }
    }

    fn controller() -> DragController {
        DragController::new(DropZones::default(), 1, Duration::from_millis(50))
    }

    #[test]
    fn leaf_rows_split_at_half() {
        let fx = fixture();
        let view = fx.sync.view();
        let zones = DropZones::default();
        assert_eq!(compute_disposition(view, &fx.a, Some(&fx.b), 0.2, &zones), Disposition::Before);
        assert_eq!(compute_disposition(view, &fx.a, Some(&fx.b), 0.7, &zones), Disposition::After);
    }

    #[test]
    fn folder_rows_have_three_zones_and_expanded_after_is_suppressed() {
        let mut fx = fixture();
        let zones = DropZones::default();
        let view = fx.sync.view();
        assert_eq!(compute_disposition(view, &fx.a, Some(&fx.folder), 0.1, &zones), Disposition::Before);
        assert_eq!(compute_disposition(view, &fx.a, Some(&fx.folder), 0.5, &zones), Disposition::Into);
        assert_eq!(compute_disposition(view, &fx.a, Some(&fx.folder), 0.9, &zones), Disposition::Into);
        fx.sync.set_expanded(&fx.folder, false).expect("collapse");
        let view = fx.sync.view();
        assert_eq!(compute_disposition(view, &fx.a, Some(&fx.folder), 0.9, &zones), Disposition::After);
    }

    #[test]
    fn protected_folder_only_accepts_into() {
        let fx = fixture();
        let zones = DropZones::default();
        let other = NodeId::from("2");
        for fraction in [0.05, 0.5, 0.95] {
            assert_eq!(
                compute_disposition(fx.sync.view(), &fx.a, Some(&other), fraction, &zones),
                Disposition::Into
            );
        }
    }

    #[test]
    fn self_ancestor_and_descendant_targets_are_rejected() {
        let fx = fixture();
        let zones = DropZones::default();
        let view = fx.sync.view();
        for fraction in [0.1, 0.5, 0.9] {
            assert_eq!(compute_disposition(view, &fx.folder, Some(&fx.inner), fraction, &zones), Disposition::None);
            assert_eq!(compute_disposition(view, &fx.inner, Some(&fx.folder), fraction, &zones), Disposition::None);
            assert_eq!(compute_disposition(view, &fx.a, Some(&fx.a), fraction, &zones), Disposition::None);
        }
        assert_eq!(compute_disposition(view, &fx.a, None, 0.5, &zones), Disposition::None);
    }

    #[test]
    fn resolve_uses_sibling_math() {
        let fx = fixture();
        let view = fx.sync.view();
        let before_b = resolve_move(view, &fx.b, Disposition::Before).expect("before");
        assert_eq!(before_b.index, Some(2));
        let after_b = resolve_move(view, &fx.b, Disposition::After).expect("after");
        assert_eq!(after_b.index, Some(3));
        let into = resolve_move(view, &fx.folder, Disposition::Into).expect("into");
        assert_eq!(into.parent_id, fx.folder);
        assert_eq!(into.index, None);
    }

    #[test]
    fn begin_refuses_protected_and_collapses_folders() {
        let mut fx = fixture();
        let mut drag = controller();
        assert!(!drag.begin(&mut fx.sync, &NodeId::from("1"), Pointer { x: 1, y: 3 }));
        assert!(drag.begin(&mut fx.sync, &fx.folder, Pointer { x: 1, y: 3 }));
        assert!(!fx.sync.view().get(&fx.folder).expect("folder").is_expanded());
        assert!(!fx.sync.expanded().contains(&fx.folder));
    }

    #[test]
    fn drop_after_sibling_issues_move() {
        let mut fx = fixture();
        let mut drag = controller();
        let now = Instant::now();
        assert!(drag.begin(&mut fx.sync, &fx.a, Pointer { x: 1, y: 4 }));
        drag.pointer_moved(
            fx.sync.view(),
            Pointer { x: 1, y: 6 },
            viewport(),
            Some(RowHit {
                node: fx.b.clone(),
                fraction: 0.8,
            }),
            now,
        );
        assert_eq!(drag.indicator(), Some((&fx.b, Disposition::After)));
        let outcome = drag.release(&mut fx.sync).expect("release");
        assert!(matches!(outcome, DropOutcome::Moved(_)));
        assert_eq!(
            fx.handle.history().last(),
            Some(&StoreOp::Move(
                fx.a.clone(),
                Destination {
                    parent_id: NodeId::from("1"),
                    index: Some(3)
                }
            ))
        );
        fx.sync.poll();
        let order = fx.sync.view().children_of(&NodeId::from("1")).map(<[NodeId]>::to_vec);
        assert_eq!(order, Some(vec![fx.folder.clone(), fx.b.clone(), fx.a.clone()]));
        assert!(!drag.is_dragging());
    }

    #[test]
    fn drop_onto_own_position_keeps_order() {
        let mut fx = fixture();
        let mut drag = controller();
        let before = fx.sync.view().visible();
        assert!(drag.begin(&mut fx.sync, &fx.b, Pointer { x: 1, y: 6 }));
        drag.pointer_moved(
            fx.sync.view(),
            Pointer { x: 1, y: 5 },
            viewport(),
            Some(RowHit {
                node: fx.a.clone(),
                fraction: 0.8,
            }),
            Instant::now(),
        );
        assert_eq!(drag.indicator(), Some((&fx.a, Disposition::After)));
        let outcome = drag.release(&mut fx.sync).expect("release");
        assert!(matches!(outcome, DropOutcome::Moved(_)));
        // b already sits right after a, at index 2 under the bar.
        assert_eq!(
            fx.handle.history().last(),
            Some(&StoreOp::Move(
                fx.b.clone(),
                Destination {
                    parent_id: NodeId::from("1"),
                    index: Some(2)
                }
            ))
        );
        fx.sync.poll();
        assert_eq!(fx.sync.view().visible(), before);
        assert_eq!(fx.handle.with_store(|s| s.get(&fx.b)).expect("b").index, 2);
    }

    #[test]
    fn release_without_target_outside_tree_suppresses_click() {
        let mut fx = fixture();
        let mut drag = controller();
        assert!(drag.begin(&mut fx.sync, &fx.a, Pointer { x: 1, y: 4 }));
        drag.pointer_moved(fx.sync.view(), Pointer { x: 60, y: 4 }, viewport(), None, Instant::now());
        let outcome = drag.release(&mut fx.sync).expect("release");
        assert_eq!(outcome, DropOutcome::Cancelled { suppress_click: true });
        assert_eq!(fx.handle.count("move"), 0);
    }

    #[test]
    fn auto_scroll_ticks_near_edge_and_stops_on_cancel() {
        let mut fx = fixture();
        let mut drag = controller();
        let start = Instant::now();
        assert!(drag.begin(&mut fx.sync, &fx.a, Pointer { x: 1, y: 4 }));
        drag.pointer_moved(fx.sync.view(), Pointer { x: 1, y: 11 }, viewport(), None, start);
        assert!(drag.is_auto_scrolling());
        assert_eq!(drag.tick_auto_scroll(start), None);
        let later = start + Duration::from_millis(60);
        assert_eq!(drag.tick_auto_scroll(later), Some(ScrollDirection::Down));

        drag.cancel();
        assert!(!drag.is_auto_scrolling());
        assert_eq!(drag.tick_auto_scroll(later + Duration::from_secs(1)), None);
    }
}
