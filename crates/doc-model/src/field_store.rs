//! Owned collection of signature fields plus the current selection.
//!
//! The store is the single source of truth for field data. Every effective
//! mutation bumps [`FieldStore::version`] and notifies subscribers
//! synchronously, before the mutating call returns. Operations that target
//! an unknown id are silent no-ops so a late pointer event can never take
//! down the interaction loop.

use crate::{
    FieldId, Point, Rect, SignatureContent, SignatureField, SignatureKind, MIN_FIELD_EXTENT,
};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Created { id: FieldId, page: u32 },
    Moved { id: FieldId },
    ContentSet { id: FieldId },
    SelectionChanged { selected: Option<FieldId> },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvent {
    pub version: u64,
    pub change: StoreChange,
}

/// Field completeness summary used for the pre-signing warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub total: usize,
    pub incomplete: usize,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.total > 0 && self.incomplete == 0
    }
}

type Subscriber = Box<dyn FnMut(&StoreEvent)>;

pub struct FieldStore {
    fields: Vec<SignatureField>,
    selected: Option<FieldId>,
    page_count: u32,
    version: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl Default for FieldStore {
    fn default() -> Self {
        Self::new(1)
    }
}

impl fmt::Debug for FieldStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldStore")
            .field("fields", &self.fields)
            .field("selected", &self.selected)
            .field("page_count", &self.page_count)
            .field("version", &self.version)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl FieldStore {
    pub fn new(page_count: u32) -> Self {
        Self {
            fields: Vec::new(),
            selected: None,
            page_count: page_count.max(1),
            version: 0,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Updates the valid page range used to clamp newly created fields.
    pub fn set_page_count(&mut self, page_count: u32) {
        self.page_count = page_count.max(1);
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&StoreEvent) + 'static) -> SubscriptionId {
        self.next_subscription += 1;
        let id = SubscriptionId(self.next_subscription);
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    /// Adds an empty field. Out-of-range pages are clamped and degenerate
    /// sizes are widened to [`MIN_FIELD_EXTENT`] rather than rejected.
    pub fn create(&mut self, kind: SignatureKind, page: u32, geometry: Rect) -> FieldId {
        let clamped_page = page.clamp(1, self.page_count);
        if clamped_page != page {
            log::debug!("clamped field page {page} to {clamped_page}");
        }

        let geometry = Rect {
            width: positive_extent(geometry.width),
            height: positive_extent(geometry.height),
            ..geometry
        };

        let id = FieldId::new_v4();
        self.fields.push(SignatureField { id, kind, geometry, page: clamped_page, content: None });
        self.notify(StoreChange::Created { id, page: clamped_page });
        id
    }

    /// Moves the field's top-left corner. Size is fixed at creation.
    pub fn move_to(&mut self, id: FieldId, x: f64, y: f64) -> bool {
        let Some(field) = self.fields.iter_mut().find(|field| field.id == id) else {
            return false;
        };

        if field.geometry.x == x && field.geometry.y == y {
            return true;
        }

        field.geometry.x = x;
        field.geometry.y = y;
        self.notify(StoreChange::Moved { id });
        true
    }

    /// Fills the field. The field's kind follows the content's tag.
    pub fn set_content(&mut self, id: FieldId, content: SignatureContent) -> bool {
        let Some(field) = self.fields.iter_mut().find(|field| field.id == id) else {
            return false;
        };

        field.kind = content.kind();
        field.content = Some(content);
        self.notify(StoreChange::ContentSet { id });
        true
    }

    /// Selects `id`; an unknown id clears the selection.
    pub fn select(&mut self, id: Option<FieldId>) {
        let next = id.filter(|candidate| self.fields.iter().any(|field| field.id == *candidate));
        if next == self.selected {
            return;
        }

        self.selected = next;
        self.notify(StoreChange::SelectionChanged { selected: next });
    }

    pub fn selected(&self) -> Option<FieldId> {
        self.selected
    }

    pub fn get(&self, id: FieldId) -> Option<&SignatureField> {
        self.fields.iter().find(|field| field.id == id)
    }

    /// All fields in creation order.
    pub fn fields(&self) -> &[SignatureField] {
        &self.fields
    }

    pub fn list_for_page(&self, page: u32) -> Vec<&SignatureField> {
        self.fields.iter().filter(|field| field.page == page).collect()
    }

    /// Topmost field on `page` under `point`. Later fields draw above
    /// earlier ones, so the search runs newest first.
    pub fn hit_test(&self, page: u32, point: Point) -> Option<FieldId> {
        self.fields
            .iter()
            .rev()
            .find(|field| field.page == page && field.geometry.contains(point))
            .map(|field| field.id)
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            total: self.fields.len(),
            incomplete: self.fields.iter().filter(|field| !field.is_complete()).count(),
        }
    }

    /// Owned copy of every field, for consumers that outlive a borrow.
    pub fn snapshot(&self) -> Vec<SignatureField> {
        self.fields.clone()
    }

    /// Drops every field and the selection.
    pub fn reset(&mut self) {
        self.fields.clear();
        self.selected = None;
        self.notify(StoreChange::Reset);
    }

    fn notify(&mut self, change: StoreChange) {
        self.version += 1;
        let event = StoreEvent { version: self.version, change };
        for (_, callback) in &mut self.subscribers {
            callback(&event);
        }
    }
}

fn positive_extent(value: f64) -> f64 {
    if value.is_finite() {
        value.max(MIN_FIELD_EXTENT)
    } else {
        MIN_FIELD_EXTENT
    }
}
