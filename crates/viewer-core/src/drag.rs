use doc_model::{FieldId, FieldStore, Point, Rect, SignatureKind};

use crate::{adjust_for_scroll, ListenerId, ViewportAdapter};

/// Pointer input, positioned relative to the viewport's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up(Point),
    Click(Point),
}

/// What a placement click creates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacementContext {
    pub page: u32,
    pub kind: SignatureKind,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub field_id: FieldId,
    /// Grab pointer minus the field origin. The pointer is viewport-relative,
    /// so the grab-time scroll is folded into this offset.
    pub pointer_offset: Point,
    pub initial_scroll: Point,
    listener: ListenerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Placing,
    Dragging(DragSession),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    Ignored,
    /// Placement click landed on an existing field and was dropped.
    Swallowed,
    Created(FieldId),
    Selected(FieldId),
    SelectionCleared,
    DragStarted(FieldId),
    Moved(FieldId),
    DragEnded(FieldId),
}

/// Turns pointer input into field creation, selection and moves.
#[derive(Debug, Default)]
pub struct DragController {
    state: DragState,
}

impl DragController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_placing(&self) -> bool {
        self.state == DragState::Placing
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    /// Arms placement. Returns `false` while a drag is in progress.
    pub fn enter_placement_mode(&mut self) -> bool {
        match self.state {
            DragState::Dragging(_) => false,
            _ => {
                self.state = DragState::Placing;
                true
            }
        }
    }

    pub fn exit_placement_mode(&mut self) {
        if self.state == DragState::Placing {
            self.state = DragState::Idle;
        }
    }

    pub fn handle(
        &mut self,
        event: PointerEvent,
        context: &PlacementContext,
        adapter: &mut dyn ViewportAdapter,
        store: &mut FieldStore,
    ) -> DragOutcome {
        let state = std::mem::take(&mut self.state);
        let (next, outcome) = match (state, event) {
            (DragState::Placing, PointerEvent::Click(pointer)) => {
                let point = document_point(pointer, adapter);
                if store.hit_test(context.page, point).is_some() {
                    (DragState::Placing, DragOutcome::Swallowed)
                } else {
                    let geometry = Rect::new(point.x, point.y, context.width, context.height);
                    let id = store.create(context.kind, context.page, geometry);
                    store.select(Some(id));
                    log::debug!("placed field {id} on page {}", context.page);
                    (DragState::Idle, DragOutcome::Created(id))
                }
            }
            (DragState::Placing, _) => (DragState::Placing, DragOutcome::Ignored),

            (DragState::Idle, PointerEvent::Down(pointer)) => {
                let scroll = adapter.scroll_offset().unwrap_or_default();
                let point = adjust_for_scroll(pointer, scroll);
                match store.hit_test(context.page, point).and_then(|id| store.get(id)) {
                    Some(field) => {
                        let session = DragSession {
                            field_id: field.id,
                            pointer_offset: pointer - field.geometry.origin(),
                            initial_scroll: scroll,
                            listener: adapter.attach_document_listeners(),
                        };
                        (DragState::Dragging(session), DragOutcome::DragStarted(session.field_id))
                    }
                    None => (DragState::Idle, DragOutcome::Ignored),
                }
            }
            (DragState::Idle, PointerEvent::Click(pointer)) => {
                let point = document_point(pointer, adapter);
                match store.hit_test(context.page, point) {
                    Some(id) => {
                        store.select(Some(id));
                        (DragState::Idle, DragOutcome::Selected(id))
                    }
                    None => {
                        store.select(None);
                        (DragState::Idle, DragOutcome::SelectionCleared)
                    }
                }
            }
            (DragState::Idle, _) => (DragState::Idle, DragOutcome::Ignored),

            (DragState::Dragging(session), PointerEvent::Move(pointer)) => {
                let scroll = adapter.scroll_offset().unwrap_or(session.initial_scroll);
                let target =
                    pointer - session.pointer_offset + (scroll - session.initial_scroll);
                store.move_to(session.field_id, target.x, target.y);
                (DragState::Dragging(session), DragOutcome::Moved(session.field_id))
            }
            (DragState::Dragging(session), PointerEvent::Up(_)) => {
                adapter.detach_document_listeners(session.listener);
                (DragState::Idle, DragOutcome::DragEnded(session.field_id))
            }
            (dragging @ DragState::Dragging(_), _) => (dragging, DragOutcome::Ignored),
        };

        self.state = next;
        outcome
    }

    /// Leaves any mode, releasing drag listeners. Must be called before the
    /// controller is discarded mid-drag.
    pub fn cancel(&mut self, adapter: &mut dyn ViewportAdapter) -> Option<FieldId> {
        match std::mem::take(&mut self.state) {
            DragState::Dragging(session) => {
                adapter.detach_document_listeners(session.listener);
                log::debug!("drag of field {} cancelled", session.field_id);
                Some(session.field_id)
            }
            _ => None,
        }
    }
}

impl Drop for DragController {
    fn drop(&mut self) {
        if let DragState::Dragging(session) = self.state {
            log::warn!(
                "drag controller dropped mid-drag; listener {} still attached",
                session.listener.raw()
            );
        }
    }
}

fn document_point(pointer: Point, adapter: &dyn ViewportAdapter) -> Point {
    adjust_for_scroll(pointer, adapter.scroll_offset().unwrap_or_default())
}
