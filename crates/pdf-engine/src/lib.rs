use lopdf::{Document, Object, ObjectId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

mod edit;
mod fonts;

pub use edit::{
    add_resource, append_page_content, blank_document, page_id, save_document,
    single_image_document, ImageXObject, ResourceKind,
};
pub use fonts::{encode_win_ansi, StandardFont};

/// US Letter, used when a page carries no usable MediaBox.
const FALLBACK_PAGE_SIZE: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

/// Guards against cyclic `Parent` chains in malformed page trees.
const MAX_INHERITANCE_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl Default for PageSize {
    fn default() -> Self {
        FALLBACK_PAGE_SIZE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentInfo {
    pub page_sizes: Vec<PageSize>,
}

impl DocumentInfo {
    pub fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    /// Natural size of page 1. The signing workflow assumes uniform pages.
    pub fn first_page_size(&self) -> PageSize {
        self.page_sizes.first().copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

/// The byte stream is not a document this engine can work with.
#[derive(Debug, thiserror::Error)]
pub enum DocumentParseError {
    #[error("malformed PDF: {0}")]
    Malformed(#[from] lopdf::Error),
    #[error("encrypted PDFs are not supported")]
    Encrypted,
    #[error("document has no pages")]
    NoPages,
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] DocumentParseError),
    #[error("PDF object error: {0}")]
    Object(#[from] lopdf::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to serialize PDF: {0}")]
    Save(String),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
}

pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;
    fn bytes(&self, handle: DocumentHandle) -> Result<&[u8], PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    bytes: Vec<u8>,
    info: DocumentInfo,
}

#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, handle: DocumentHandle) -> Result<&DocumentInfo, PdfEngineError> {
        Ok(&self.record(handle)?.info)
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let info = inspect(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        log::debug!("opened document {} ({} pages)", handle.raw(), info.page_count());
        self.docs.insert(handle, DocumentRecord { bytes, info });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.info.page_count())
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let info = &self.record(handle)?.info;
        info.page_sizes.get(page_index as usize).copied().ok_or(
            PdfEngineError::PageOutOfRange { page: page_index, page_count: info.page_count() },
        )
    }

    fn bytes(&self, handle: DocumentHandle) -> Result<&[u8], PdfEngineError> {
        Ok(&self.record(handle)?.bytes)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

/// Parses `bytes` into an editable object graph.
///
/// Encrypted and page-less documents are rejected up front so callers never
/// start mutating something they cannot save back.
pub fn parse_document(bytes: &[u8]) -> Result<Document, DocumentParseError> {
    if bytes.windows(b"/Encrypt".len()).any(|window| window == b"/Encrypt") {
        return Err(DocumentParseError::Encrypted);
    }

    let doc = Document::load_mem(bytes)?;
    if doc.get_pages().is_empty() {
        return Err(DocumentParseError::NoPages);
    }

    Ok(doc)
}

/// Reads page count and natural page sizes without keeping the document.
pub fn inspect(bytes: &[u8]) -> Result<DocumentInfo, DocumentParseError> {
    let doc = parse_document(bytes)?;
    let page_sizes = doc
        .get_pages()
        .into_values()
        .map(|page_id| media_box_size(&doc, page_id).unwrap_or(FALLBACK_PAGE_SIZE))
        .collect();

    Ok(DocumentInfo { page_sizes })
}

fn media_box_size(doc: &Document, page_id: ObjectId) -> Option<PageSize> {
    let object = inherited_attribute(doc, page_id, b"MediaBox")?;
    let array = match &object {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?.clone(),
        other => other.as_array().ok()?.clone(),
    };

    if array.len() != 4 {
        return None;
    }

    let x0 = array[0].as_float().ok()?;
    let y0 = array[1].as_float().ok()?;
    let x1 = array[2].as_float().ok()?;
    let y1 = array[3].as_float().ok()?;

    let size = PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() };
    (size.width_pt > 0.0 && size.height_pt > 0.0).then_some(size)
}

/// Looks up a page attribute, following the `Parent` chain for inheritable keys.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = Some(page_id);

    for _ in 0..MAX_INHERITANCE_DEPTH {
        let dict = doc.get_dictionary(current?).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(|parent| parent.as_reference()).ok();
    }

    None
}
