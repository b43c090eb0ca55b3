use std::fmt;

use doc_model::{PageMetrics, ViewportMetrics};
use pdf_engine::{DocumentHandle, LopdfEngine, OpenSource, PdfEngine, PdfEngineError};

use crate::ViewportAdapter;

#[derive(Debug, thiserror::Error)]
pub enum ViewportError {
    #[error(transparent)]
    Engine(#[from] PdfEngineError),
    #[error("first page has no usable size ({width}x{height})")]
    InvalidPageSize { width: f32, height: f32 },
    #[error("no document loaded")]
    NotLoaded,
}

/// Both halves of the geometry, delivered once per load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportReady {
    pub viewport: ViewportMetrics,
    pub page: PageMetrics,
}

type ReadyCallback = Box<dyn FnMut(&ViewportReady)>;
type PageCallback = Box<dyn FnMut(u32)>;
type ResizeCallback = Box<dyn FnMut(&ViewportMetrics)>;

/// Hosts one loaded document and tracks the surface it is shown on.
pub struct DocumentViewport {
    engine: LopdfEngine,
    handle: Option<DocumentHandle>,
    page_metrics: Option<PageMetrics>,
    viewport_metrics: Option<ViewportMetrics>,
    current_page: u32,
    ready_pending: bool,
    ready_callbacks: Vec<ReadyCallback>,
    page_callbacks: Vec<PageCallback>,
    resize_callbacks: Vec<ResizeCallback>,
}

impl Default for DocumentViewport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DocumentViewport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentViewport")
            .field("handle", &self.handle)
            .field("page_metrics", &self.page_metrics)
            .field("viewport_metrics", &self.viewport_metrics)
            .field("current_page", &self.current_page)
            .finish_non_exhaustive()
    }
}

impl DocumentViewport {
    pub fn new() -> Self {
        Self {
            engine: LopdfEngine::new(),
            handle: None,
            page_metrics: None,
            viewport_metrics: None,
            current_page: 1,
            ready_pending: false,
            ready_callbacks: Vec::new(),
            page_callbacks: Vec::new(),
            resize_callbacks: Vec::new(),
        }
    }

    pub fn on_ready(&mut self, callback: impl FnMut(&ViewportReady) + 'static) {
        self.ready_callbacks.push(Box::new(callback));
    }

    pub fn on_page_change(&mut self, callback: impl FnMut(u32) + 'static) {
        self.page_callbacks.push(Box::new(callback));
    }

    pub fn on_resize(&mut self, callback: impl FnMut(&ViewportMetrics) + 'static) {
        self.resize_callbacks.push(Box::new(callback));
    }

    /// Replaces the hosted document. Metrics come from the first page.
    pub fn load(&mut self, bytes: Vec<u8>) -> Result<PageMetrics, ViewportError> {
        self.unload();

        let handle = self.engine.open(OpenSource::Bytes(bytes))?;
        let metrics = match self.first_page_metrics(handle) {
            Ok(metrics) => metrics,
            Err(err) => {
                self.engine.close(handle)?;
                return Err(err);
            }
        };

        log::debug!(
            "document loaded: {}x{} pt, {} pages",
            metrics.width(),
            metrics.height(),
            metrics.page_count()
        );

        self.handle = Some(handle);
        self.page_metrics = Some(metrics);
        self.set_current_page(1);
        self.ready_pending = true;
        self.fire_ready_if_complete();

        Ok(metrics)
    }

    /// Drops the hosted document, if any, and returns to page 1.
    pub fn unload(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.engine.close(handle) {
                log::warn!("closing document {} failed: {err}", handle.raw());
            }
        }
        self.page_metrics = None;
        self.ready_pending = false;
        self.set_current_page(1);
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    pub fn document_bytes(&self) -> Result<&[u8], ViewportError> {
        let handle = self.handle.ok_or(ViewportError::NotLoaded)?;
        Ok(self.engine.bytes(handle)?)
    }

    pub fn page_metrics(&self) -> Option<PageMetrics> {
        self.page_metrics
    }

    pub fn viewport_metrics(&self) -> Option<ViewportMetrics> {
        self.viewport_metrics
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Records a new surface size. Unchanged sizes are ignored.
    pub fn resize(&mut self, metrics: ViewportMetrics) {
        if self.viewport_metrics == Some(metrics) {
            return;
        }

        self.viewport_metrics = Some(metrics);
        for callback in &mut self.resize_callbacks {
            callback(&metrics);
        }
        self.fire_ready_if_complete();
    }

    /// Updates the current page from a viewer location. Returns the page
    /// that is current afterwards.
    pub fn sync_page(&mut self, location: Option<&str>) -> u32 {
        if let Some(page) = location.and_then(page_from_location) {
            self.go_to_page(page);
        }
        self.current_page
    }

    /// Sets the current page, clamped to the loaded document.
    pub fn go_to_page(&mut self, page: u32) {
        let page_count = self.page_metrics.map_or(1, |metrics| metrics.page_count());
        self.set_current_page(page.clamp(1, page_count));
    }

    fn set_current_page(&mut self, page: u32) {
        if page == self.current_page {
            return;
        }

        log::debug!("current page {} -> {page}", self.current_page);
        self.current_page = page;
        for callback in &mut self.page_callbacks {
            callback(page);
        }
    }

    /// Pulls size and location from the host surface.
    pub fn poll(&mut self, adapter: &dyn ViewportAdapter) {
        if let Some(metrics) = adapter.metrics() {
            self.resize(metrics);
        }
        self.sync_page(adapter.location().as_deref());
    }

    fn first_page_metrics(&self, handle: DocumentHandle) -> Result<PageMetrics, ViewportError> {
        let page_count = self.engine.page_count(handle)?;
        let size = self.engine.page_size(handle, 0)?;

        PageMetrics::new(f64::from(size.width_pt), f64::from(size.height_pt), page_count)
            .ok_or(ViewportError::InvalidPageSize { width: size.width_pt, height: size.height_pt })
    }

    fn fire_ready_if_complete(&mut self) {
        if !self.ready_pending {
            return;
        }
        let (Some(viewport), Some(page)) = (self.viewport_metrics, self.page_metrics) else {
            return;
        };

        self.ready_pending = false;
        let ready = ViewportReady { viewport, page };
        for callback in &mut self.ready_callbacks {
            callback(&ready);
        }
    }
}

/// Reads the page number out of a `#page=N` location fragment.
pub fn page_from_location(location: &str) -> Option<u32> {
    let (_, fragment) = location.split_once('#')?;

    fragment
        .split('&')
        .find_map(|param| param.strip_prefix("page="))
        .and_then(|value| {
            let digits: &str =
                value.split(|ch: char| !ch.is_ascii_digit()).next().unwrap_or_default();
            digits.parse::<u32>().ok()
        })
        .filter(|page| *page > 0)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pdf_engine::{blank_document, PageSize};

    use super::*;

    fn three_page_pdf() -> Vec<u8> {
        blank_document(3, PageSize { width_pt: 600.0, height_pt: 800.0 })
            .expect("blank document should build")
    }

    fn surface() -> ViewportMetrics {
        ViewportMetrics::new(300.0, 400.0).expect("positive size")
    }

    #[test]
    fn load_reports_first_page_metrics() {
        let mut viewport = DocumentViewport::new();

        let metrics = viewport.load(three_page_pdf()).expect("load should succeed");

        assert_eq!(metrics.width(), 600.0);
        assert_eq!(metrics.height(), 800.0);
        assert_eq!(metrics.page_count(), 3);
        assert!(viewport.is_loaded());
    }

    #[test]
    fn malformed_bytes_fail_to_load() {
        let mut viewport = DocumentViewport::new();

        let err = viewport.load(b"not a pdf".to_vec()).expect_err("garbage should not load");

        assert!(matches!(err, ViewportError::Engine(PdfEngineError::Parse(_))));
        assert!(!viewport.is_loaded());
        assert!(matches!(viewport.document_bytes(), Err(ViewportError::NotLoaded)));
    }

    #[test]
    fn ready_waits_for_both_metrics_and_fires_once_per_load() {
        let fired = Rc::new(RefCell::new(Vec::new()));
        let mut viewport = DocumentViewport::new();
        {
            let fired = Rc::clone(&fired);
            viewport.on_ready(move |ready| fired.borrow_mut().push(*ready));
        }

        viewport.load(three_page_pdf()).expect("load should succeed");
        assert!(fired.borrow().is_empty());

        viewport.resize(surface());
        viewport.resize(ViewportMetrics::new(320.0, 400.0).expect("positive size"));
        assert_eq!(fired.borrow().len(), 1);
        assert_eq!(fired.borrow()[0].viewport, surface());

        viewport.load(three_page_pdf()).expect("reload should succeed");
        assert_eq!(fired.borrow().len(), 2);
    }

    #[test]
    fn reloading_returns_to_the_first_page() {
        let pages = Rc::new(RefCell::new(Vec::new()));
        let mut viewport = DocumentViewport::new();
        {
            let pages = Rc::clone(&pages);
            viewport.on_page_change(move |page| pages.borrow_mut().push(page));
        }

        viewport.load(three_page_pdf()).expect("load should succeed");
        viewport.go_to_page(3);
        viewport.load(three_page_pdf()).expect("reload should succeed");
        assert_eq!(viewport.current_page(), 1);

        viewport.go_to_page(2);
        viewport.load(b"not a pdf".to_vec()).expect_err("garbage should not load");
        assert_eq!(viewport.current_page(), 1);
        assert_eq!(*pages.borrow(), vec![3, 1, 2, 1]);
    }

    #[test]
    fn resize_fires_only_on_change() {
        let sizes = Rc::new(RefCell::new(Vec::new()));
        let mut viewport = DocumentViewport::new();
        {
            let sizes = Rc::clone(&sizes);
            viewport.on_resize(move |metrics| sizes.borrow_mut().push(metrics.width()));
        }

        viewport.resize(surface());
        viewport.resize(surface());
        viewport.resize(ViewportMetrics::new(500.0, 400.0).expect("positive size"));

        assert_eq!(*sizes.borrow(), vec![300.0, 500.0]);
    }

    #[test]
    fn page_changes_follow_fragment_and_keep_last_known_page() {
        let pages = Rc::new(RefCell::new(Vec::new()));
        let mut viewport = DocumentViewport::new();
        {
            let pages = Rc::clone(&pages);
            viewport.on_page_change(move |page| pages.borrow_mut().push(page));
        }
        viewport.load(three_page_pdf()).expect("load should succeed");

        assert_eq!(viewport.sync_page(Some("blob:abc#page=2")), 2);
        assert_eq!(viewport.sync_page(None), 2);
        assert_eq!(viewport.sync_page(Some("blob:abc")), 2);
        assert_eq!(viewport.sync_page(Some("blob:abc#page=2")), 2);
        assert_eq!(viewport.sync_page(Some("blob:abc#page=99")), 3);

        assert_eq!(*pages.borrow(), vec![2, 3]);
    }

    #[test]
    fn poll_reads_adapter_state() {
        let mut adapter = crate::HeadlessViewport::new(Some(surface()));
        adapter.set_location(Some("file.pdf#page=3".to_owned()));
        let mut viewport = DocumentViewport::new();
        viewport.load(three_page_pdf()).expect("load should succeed");

        viewport.poll(&adapter);

        assert_eq!(viewport.viewport_metrics(), Some(surface()));
        assert_eq!(viewport.current_page(), 3);
    }

    #[test]
    fn parses_page_fragments() {
        assert_eq!(page_from_location("blob:x#page=4"), Some(4));
        assert_eq!(page_from_location("doc.pdf#zoom=100&page=7"), Some(7));
        assert_eq!(page_from_location("doc.pdf#page=12&zoom=50"), Some(12));
        assert_eq!(page_from_location("doc.pdf#page=0"), None);
        assert_eq!(page_from_location("doc.pdf#page="), None);
        assert_eq!(page_from_location("doc.pdf?page=2"), None);
    }
}
