use doc_model::{Point, ViewportMetrics};

/// Token for a set of document-level pointer listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Host surface that displays the document.
///
/// Hosts that cannot see into the rendered document (a cross-origin frame,
/// for instance) return `None` from these queries and the callers degrade.
pub trait ViewportAdapter {
    /// Current surface size, `None` until it has been measured.
    fn metrics(&self) -> Option<ViewportMetrics>;
    /// Scroll offset of the hosted document.
    fn scroll_offset(&self) -> Option<Point>;
    /// Location of the hosted document, e.g. `blob:...#page=3`.
    fn location(&self) -> Option<String>;
    /// Starts routing pointer move/up events from the whole document.
    fn attach_document_listeners(&mut self) -> ListenerId;
    fn detach_document_listeners(&mut self, id: ListenerId);
}

/// In-memory adapter for headless hosts and tests.
#[derive(Debug, Default)]
pub struct HeadlessViewport {
    metrics: Option<ViewportMetrics>,
    scroll: Option<Point>,
    location: Option<String>,
    next_listener: u64,
    attached: Vec<ListenerId>,
}

impl HeadlessViewport {
    pub fn new(metrics: Option<ViewportMetrics>) -> Self {
        Self { metrics, scroll: Some(Point::default()), ..Self::default() }
    }

    pub fn set_metrics(&mut self, metrics: Option<ViewportMetrics>) {
        self.metrics = metrics;
    }

    /// `None` simulates a document whose scroll position cannot be read.
    pub fn set_scroll(&mut self, scroll: Option<Point>) {
        self.scroll = scroll;
    }

    pub fn set_location(&mut self, location: Option<String>) {
        self.location = location;
    }

    pub fn attached_listeners(&self) -> usize {
        self.attached.len()
    }
}

impl ViewportAdapter for HeadlessViewport {
    fn metrics(&self) -> Option<ViewportMetrics> {
        self.metrics
    }

    fn scroll_offset(&self) -> Option<Point> {
        self.scroll
    }

    fn location(&self) -> Option<String> {
        self.location.clone()
    }

    fn attach_document_listeners(&mut self) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.attached.push(id);
        id
    }

    fn detach_document_listeners(&mut self, id: ListenerId) {
        self.attached.retain(|attached| *attached != id);
    }
}
