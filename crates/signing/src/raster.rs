//! Flattened fallback: capture the rendered view with the field contents
//! drawn in, then wrap the picture as the only page of a new document.

use std::fmt;

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use doc_model::{FieldId, Point, Rect, SignatureContent, SignatureField, ViewportMetrics};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use pdf_engine::{single_image_document, ImageXObject};

use crate::{CaptureError, RasterizeError};

/// Pixel size of typed text in the captured view, before capture scaling.
pub const CAPTURE_TEXT_PX: f32 = 16.0;

const PAGE_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Field content to draw over the captured view. Field borders and
/// backgrounds are never part of a capture.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayContent {
    Text { text: String, font_px: f32 },
    Image { bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOverlay {
    pub field_id: FieldId,
    /// Visible position in viewport pixels.
    pub rect: Rect,
    pub content: OverlayContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    /// Output pixels per viewport pixel.
    pub scale: f32,
    pub viewport: ViewportMetrics,
    pub overlays: Vec<CaptureOverlay>,
}

impl CaptureRequest {
    /// Overlays for the filled fields visible on `page`, shifted from
    /// document space to the visible viewport by `scroll`.
    pub fn for_page(
        fields: &[SignatureField],
        page: u32,
        scroll: Point,
        viewport: ViewportMetrics,
        scale: f32,
    ) -> Self {
        let overlays = fields
            .iter()
            .filter(|field| field.page == page && field.is_complete())
            .filter_map(|field| {
                let content = match field.content.as_ref()? {
                    SignatureContent::Type { text } => {
                        OverlayContent::Text { text: text.clone(), font_px: CAPTURE_TEXT_PX }
                    }
                    SignatureContent::Draw { image } | SignatureContent::Image { image } => {
                        OverlayContent::Image { bytes: image.clone() }
                    }
                };
                let rect = Rect {
                    x: field.geometry.x - scroll.x,
                    y: field.geometry.y - scroll.y,
                    ..field.geometry
                };
                Some(CaptureOverlay { field_id: field.id, rect, content })
            })
            .collect();

        Self { scale, viewport, overlays }
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        let scale = f64::from(self.scale.max(0.0));
        (
            (self.viewport.width() * scale).round() as u32,
            (self.viewport.height() * scale).round() as u32,
        )
    }
}

/// Typed-signature font used when the host supplies none.
const DEFAULT_FONT: &[u8] = include_bytes!("../../../assets/DejaVuSans.ttf");

/// A captured view plus the overlays that could not be drawn into it.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedView {
    pub image: RgbaImage,
    pub omitted: Vec<FieldId>,
}

impl From<RgbaImage> for CapturedView {
    fn from(image: RgbaImage) -> Self {
        Self { image, omitted: Vec::new() }
    }
}

/// Produces a raster of the rendered view.
pub trait ViewportCapture {
    fn capture(&mut self, request: &CaptureRequest) -> Result<CapturedView, CaptureError>;
}

/// Capture built from a host-supplied frame of the rendered document,
/// or a blank page when no frame is available. Typed text is drawn with
/// the bundled DejaVu Sans unless another font is configured.
#[derive(Clone)]
pub struct FrameCapture {
    frame: Option<RgbaImage>,
    font: Option<FontArc>,
}

impl Default for FrameCapture {
    fn default() -> Self {
        Self { frame: None, font: default_font() }
    }
}

impl fmt::Debug for FrameCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameCapture")
            .field("frame", &self.frame.as_ref().map(RgbaImage::dimensions))
            .field("font", &self.font.is_some())
            .finish()
    }
}

fn default_font() -> Option<FontArc> {
    match FontArc::try_from_slice(DEFAULT_FONT) {
        Ok(font) => Some(font),
        Err(err) => {
            log::error!("bundled capture font is unusable: {err}");
            None
        }
    }
}

impl FrameCapture {
    pub fn new(frame: RgbaImage) -> Self {
        Self { frame: Some(frame), ..Self::default() }
    }

    pub fn blank() -> Self {
        Self::default()
    }

    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    pub fn with_font_bytes(self, bytes: Vec<u8>) -> Result<Self, CaptureError> {
        let font = FontArc::try_from_vec(bytes)
            .map_err(|err| CaptureError::Unavailable(format!("unusable font: {err}")))?;
        Ok(self.with_font(font))
    }

    /// Drops the font, so typed overlays are reported as omitted.
    pub fn without_font(mut self) -> Self {
        self.font = None;
        self
    }
}

impl ViewportCapture for FrameCapture {
    fn capture(&mut self, request: &CaptureRequest) -> Result<CapturedView, CaptureError> {
        let (width, height) = request.pixel_size();
        if width == 0 || height == 0 {
            return Err(CaptureError::EmptySurface { width, height });
        }

        let mut canvas = match &self.frame {
            Some(frame) if frame.dimensions() == (width, height) => frame.clone(),
            Some(frame) => imageops::resize(frame, width, height, FilterType::Triangle),
            None => RgbaImage::from_pixel(width, height, PAGE_BACKGROUND),
        };

        let scale = f64::from(request.scale);
        let mut omitted = Vec::new();
        for overlay in &request.overlays {
            let rect = Rect {
                x: overlay.rect.x * scale,
                y: overlay.rect.y * scale,
                width: overlay.rect.width * scale,
                height: overlay.rect.height * scale,
            };
            let drawn = match &overlay.content {
                OverlayContent::Image { bytes } => match composite_image(&mut canvas, rect, bytes) {
                    Ok(()) => true,
                    Err(err) => {
                        log::warn!("field {} image left out of capture: {err}", overlay.field_id);
                        false
                    }
                },
                OverlayContent::Text { text, font_px } => match &self.font {
                    Some(font) => draw_text(&mut canvas, font, rect, text, font_px * request.scale),
                    None => {
                        log::warn!("no capture font; text of field {} left out", overlay.field_id);
                        false
                    }
                },
            };
            if !drawn {
                omitted.push(overlay.field_id);
            }
        }

        Ok(CapturedView { image: canvas, omitted })
    }
}

/// Scales `bytes` to fit inside `rect`, keeping its aspect ratio, and
/// centres it there.
fn composite_image(canvas: &mut RgbaImage, rect: Rect, bytes: &[u8]) -> Result<(), CaptureError> {
    let image = image::load_from_memory(bytes)?.to_rgba8();
    let (image_width, image_height) = image.dimensions();
    if image_width == 0 || image_height == 0 || rect.width < 1.0 || rect.height < 1.0 {
        return Ok(());
    }

    let fit = (rect.width / f64::from(image_width)).min(rect.height / f64::from(image_height));
    let width = (f64::from(image_width) * fit).round().max(1.0) as u32;
    let height = (f64::from(image_height) * fit).round().max(1.0) as u32;
    let fitted = imageops::resize(&image, width, height, FilterType::Triangle);

    let x = rect.x + (rect.width - f64::from(width)) / 2.0;
    let y = rect.y + (rect.height - f64::from(height)) / 2.0;
    imageops::overlay(canvas, &fitted, x.round() as i64, y.round() as i64);
    Ok(())
}

/// Draws `text` in black, centred in `rect`. Returns false when no glyph
/// produced an outline.
fn draw_text(canvas: &mut RgbaImage, font: &FontArc, rect: Rect, text: &str, px: f32) -> bool {
    let scale = PxScale::from(px);
    let scaled = font.as_scaled(scale);

    let mut caret = 0.0f32;
    let mut previous = None;
    let mut glyphs = Vec::new();
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(previous) = previous {
            caret += scaled.kern(previous, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(caret, 0.0)));
        caret += scaled.h_advance(id);
        previous = Some(id);
    }

    let text_height = scaled.ascent() - scaled.descent();
    let left = rect.x as f32 + (rect.width as f32 - caret) / 2.0;
    let baseline = rect.y as f32 + (rect.height as f32 - text_height) / 2.0 + scaled.ascent();
    let (canvas_width, canvas_height) = canvas.dimensions();

    let mut inked = false;
    for mut glyph in glyphs {
        glyph.position = point(glyph.position.x + left, baseline);
        let Some(outline) = font.outline_glyph(glyph) else {
            continue;
        };
        inked = true;
        let bounds = outline.px_bounds();
        outline.draw(|gx, gy, coverage| {
            let x = bounds.min.x as i64 + i64::from(gx);
            let y = bounds.min.y as i64 + i64::from(gy);
            if x < 0 || y < 0 || x >= i64::from(canvas_width) || y >= i64::from(canvas_height) {
                return;
            }
            let pixel = canvas.get_pixel_mut(x as u32, y as u32);
            let keep = 1.0 - coverage.clamp(0.0, 1.0);
            for channel in pixel.0.iter_mut().take(3) {
                *channel = (f32::from(*channel) * keep).round() as u8;
            }
        });
    }

    inked
}

/// A flattened, single-page document.
#[derive(Debug)]
pub struct RasterOutput {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Fields whose content is missing from the page.
    pub omitted: Vec<FieldId>,
}

/// Captures the view and wraps it as a JPEG page sized to the capture in
/// pixels.
pub fn rasterize_fallback(
    capture: &mut dyn ViewportCapture,
    request: &CaptureRequest,
    jpeg_quality: u8,
) -> Result<RasterOutput, RasterizeError> {
    let CapturedView { image: raster, omitted } = capture.capture(request)?;
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return Err(CaptureError::EmptySurface { width, height }.into());
    }

    let rgb = DynamicImage::ImageRgba8(raster).to_rgb8();
    let mut jpeg = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, jpeg_quality.clamp(1, 100)))?;
    log::debug!("captured view {width}x{height}, {} bytes as JPEG", jpeg.len());

    let bytes = single_image_document(ImageXObject::from_jpeg(jpeg, width, height))?;
    Ok(RasterOutput { bytes, width, height, omitted })
}
