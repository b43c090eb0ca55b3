use doc_model::FieldId;
use pdf_engine::{DocumentParseError, PdfEngineError};

/// A signature payload could not be turned into an image XObject.
#[derive(Debug, thiserror::Error)]
pub enum ImageDecodeError {
    #[error("signature image is empty")]
    Empty,
    #[error("unsupported or corrupt signature image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to compress signature image: {0}")]
    Compress(#[from] std::io::Error),
}

/// The preferred font cannot set the text; a standard font is used instead.
#[derive(Debug, thiserror::Error)]
pub enum FontEmbedError {
    #[error("no metrics for {0:?} in the preferred font")]
    UnmeasurableGlyph(char),
}

/// One field could not be embedded. Never aborts the other fields.
#[derive(Debug, thiserror::Error)]
pub enum FieldEmbedError {
    #[error(transparent)]
    ImageDecode(#[from] ImageDecodeError),
    #[error("page {0} is missing from the document")]
    MissingPage(u32),
    #[error("PDF object error: {0}")]
    Pdf(#[from] lopdf::Error),
}

/// The whole document could not be edited in place.
#[derive(Debug, thiserror::Error)]
pub enum StructuralError {
    #[error(transparent)]
    Parse(#[from] DocumentParseError),
    #[error(transparent)]
    Save(#[from] PdfEngineError),
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("nothing to capture: {0}")]
    Unavailable(String),
    #[error("capture surface is {width}x{height}")]
    EmptySurface { width: u32, height: u32 },
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("no signature fields have been placed")]
    NoFields,
    #[error("{incomplete} of {total} signature fields are empty")]
    IncompleteFields { incomplete: usize, total: usize },
    #[error("no document loaded")]
    NoDocument,
    #[error("viewport has not been measured")]
    NoViewport,
    #[error("no field selected")]
    NoSelection,
    #[error("field {0} does not exist")]
    UnknownField(FieldId),
    #[error("rasterized fallback failed: {source} (after structural failure: {structural})")]
    Rasterize { structural: StructuralError, source: RasterizeError },
}

#[derive(Debug, thiserror::Error)]
pub enum RasterizeError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("failed to encode capture: {0}")]
    Encode(#[from] image::ImageError),
    #[error(transparent)]
    Pdf(#[from] PdfEngineError),
}
