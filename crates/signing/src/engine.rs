use doc_model::{FieldId, PageMetrics, Point, SignatureField, SignerConfig, ViewportMetrics};

use crate::raster::{rasterize_fallback, CaptureRequest, RasterOutput, ViewportCapture};
use crate::structural::{embed_structural, SigningReport};
use crate::SigningError;

const DEFAULT_STEM: &str = "document";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Destructive,
}

/// User-facing status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Info, title: title.into(), message: message.into() }
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, title: title.into(), message: message.into() }
    }

    pub fn destructive(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: Severity::Destructive, title: title.into(), message: message.into() }
    }
}

/// Everything a signing run reads.
#[derive(Debug, Clone, Copy)]
pub struct SigningInput<'a> {
    pub bytes: &'a [u8],
    pub fields: &'a [SignatureField],
    pub viewport: ViewportMetrics,
    pub page: PageMetrics,
    /// Page shown in the viewport, used by the flattened fallback.
    pub current_page: u32,
    pub scroll: Point,
    pub original_name: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Structural(SigningReport),
    /// `omitted` lists fields whose content could not be drawn.
    Rasterized { width: u32, height: u32, omitted: Vec<FieldId> },
}

#[derive(Debug)]
pub struct SignedArtifact {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub strategy: Strategy,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigningEngine {
    capture_scale: f32,
    jpeg_quality: u8,
}

impl Default for SigningEngine {
    fn default() -> Self {
        Self::from_config(&SignerConfig::default())
    }
}

impl SigningEngine {
    pub fn from_config(config: &SignerConfig) -> Self {
        Self { capture_scale: config.capture_scale, jpeg_quality: config.jpeg_quality() }
    }

    /// Embeds the fields into the document, or flattens the rendered view
    /// into a new single-page document when the original cannot be edited.
    pub fn sign(
        &self,
        input: &SigningInput<'_>,
        capture: &mut dyn ViewportCapture,
    ) -> Result<SignedArtifact, SigningError> {
        let filename = signed_filename(input.original_name);

        let embedded = embed_structural(input.bytes, input.fields, input.viewport, input.page);
        let structural = match embedded {
            Ok(output) => {
                log::info!(
                    "signed {filename}: {} embedded, {} placeholders, {} failed",
                    output.report.embedded.len(),
                    output.report.placeholders.len(),
                    output.report.failed.len()
                );
                return Ok(SignedArtifact {
                    bytes: output.bytes,
                    filename,
                    notices: structural_notices(&output.report),
                    strategy: Strategy::Structural(output.report),
                });
            }
            Err(err) => err,
        };

        log::warn!("structural signing failed, flattening the view instead: {structural}");
        let request = CaptureRequest::for_page(
            input.fields,
            input.current_page,
            input.scroll,
            input.viewport,
            self.capture_scale,
        );

        match rasterize_fallback(capture, &request, self.jpeg_quality) {
            Ok(raster) => {
                let notices = raster_notices(&raster);
                Ok(SignedArtifact {
                    bytes: raster.bytes,
                    filename,
                    strategy: Strategy::Rasterized {
                        width: raster.width,
                        height: raster.height,
                        omitted: raster.omitted,
                    },
                    notices,
                })
            }
            Err(source) => {
                log::error!("flattened fallback failed: {source}");
                Err(SigningError::Rasterize { structural, source })
            }
        }
    }
}

fn raster_notices(raster: &RasterOutput) -> Vec<Notice> {
    if raster.omitted.is_empty() {
        return vec![Notice::warning(
            "Saved as flattened copy",
            "The document could not be edited directly, so the visible page was saved \
             as an image with your signatures.",
        )];
    }

    log::warn!("{} field(s) missing from the flattened copy", raster.omitted.len());
    vec![
        Notice::warning(
            "Saved as flattened copy",
            "The document could not be edited directly, so the visible page was saved \
             as an image.",
        ),
        Notice::warning(
            "Some signatures were left out",
            format!(
                "{} signature(s) could not be drawn into the flattened copy.",
                raster.omitted.len()
            ),
        ),
    ]
}

fn structural_notices(report: &SigningReport) -> Vec<Notice> {
    let mut notices = vec![Notice::info(
        "Document signed",
        format!("{} signature(s) added to the document.", report.drawn()),
    )];
    if !report.placeholders.is_empty() {
        notices.push(Notice::warning(
            "Signature image unreadable",
            format!(
                "{} signature image(s) could not be read and were replaced by a text label.",
                report.placeholders.len()
            ),
        ));
    }
    if !report.failed.is_empty() {
        notices.push(Notice::warning(
            "Some signatures were left out",
            format!("{} signature field(s) could not be added.", report.failed.len()),
        ));
    }
    notices
}

/// `signed_<name>.pdf`, where `<name>` is the original file name without a
/// trailing `.pdf`.
pub fn signed_filename(original: Option<&str>) -> String {
    let stem = original
        .map(|name| {
            let name = name.trim();
            strip_pdf_extension(name.rsplit(['/', '\\']).next().unwrap_or(name))
        })
        .filter(|stem| !stem.is_empty())
        .unwrap_or(DEFAULT_STEM);

    format!("signed_{stem}.pdf")
}

fn strip_pdf_extension(name: &str) -> &str {
    let split = name.len().saturating_sub(4);
    match name.get(split..) {
        Some(extension) if extension.eq_ignore_ascii_case(".pdf") => &name[..split],
        _ => name,
    }
}
