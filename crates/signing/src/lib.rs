//! Turns placed signature fields into a signed document.
//!
//! [`SigningEngine`] tries to embed every field into the original document
//! first. When the document cannot be edited at all it captures the rendered
//! view instead and produces a single flattened page.

mod artifact;
mod engine;
mod error;
mod raster;
mod session;
mod structural;

pub use artifact::{ArtifactHandle, ArtifactRegistry, PublishedArtifact};
pub use engine::{
    signed_filename, Notice, Severity, SignedArtifact, SigningEngine, SigningInput, Strategy,
};
pub use error::{
    CaptureError, FieldEmbedError, FontEmbedError, ImageDecodeError, RasterizeError,
    SigningError, StructuralError,
};
pub use raster::{
    rasterize_fallback, CaptureOverlay, CaptureRequest, CapturedView, FrameCapture, OverlayContent,
    RasterOutput, ViewportCapture, CAPTURE_TEXT_PX,
};
pub use session::SigningSession;
pub use structural::{embed_structural, SigningReport, StructuralOutput};
