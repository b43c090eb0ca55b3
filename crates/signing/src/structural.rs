//! In-place embedding: each filled field becomes drawing operations appended
//! to its page, leaving the rest of the document's object graph intact.

use doc_model::{FieldId, PageMetrics, Rect, SignatureContent, SignatureField, ViewportMetrics};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, StringFormat};
use pdf_engine::{
    add_resource, append_page_content, encode_win_ansi, page_id, parse_document, save_document,
    ImageXObject, ResourceKind, StandardFont,
};
use viewer_core::to_page_space;

use crate::{FieldEmbedError, FontEmbedError, ImageDecodeError, StructuralError};

const MAX_TEXT_SIZE: f64 = 18.0;
const TEXT_HEIGHT_RATIO: f64 = 0.7;
/// Per-character advance, in ems, assumed when the font has no metrics.
const ESTIMATED_ADVANCE: f64 = 0.3;
const PLACEHOLDER_LABEL: &str = "Signature";
const PLACEHOLDER_SIZE: f64 = 16.0;
const PLACEHOLDER_INSET: f64 = 30.0;

/// Per-field outcome of a signing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SigningReport {
    pub embedded: Vec<FieldId>,
    /// Image fields whose payload could not be decoded.
    pub placeholders: Vec<FieldId>,
    /// Typed fields set in the standard font instead of the preferred one.
    pub font_fallbacks: Vec<FieldId>,
    pub skipped_incomplete: Vec<FieldId>,
    pub failed: Vec<FieldId>,
}

impl SigningReport {
    /// Fields that left a mark on the document, placeholders included.
    pub fn drawn(&self) -> usize {
        self.embedded.len() + self.placeholders.len()
    }
}

#[derive(Debug)]
pub struct StructuralOutput {
    pub bytes: Vec<u8>,
    pub report: SigningReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Embedded {
    Image,
    Placeholder,
    Text { font_fallback: bool },
}

/// Embeds every filled field into `bytes`.
///
/// Only document-level problems (unparseable input, failure to save) are
/// errors; a field that cannot be embedded is logged and recorded in the
/// report.
pub fn embed_structural(
    bytes: &[u8],
    fields: &[SignatureField],
    viewport: ViewportMetrics,
    page: PageMetrics,
) -> Result<StructuralOutput, StructuralError> {
    let mut doc = parse_document(bytes)?;
    let page_count = doc.get_pages().len() as u32;
    let mut report = SigningReport::default();

    for field in fields {
        let Some(content) = field.content.as_ref().filter(|content| !content.is_empty()) else {
            report.skipped_incomplete.push(field.id);
            continue;
        };

        let target_page = field.page.clamp(1, page_count.max(1));
        let rect = to_page_space(field.geometry, viewport, page);
        log::debug!(
            "embedding {:?} field {} on page {target_page} at ({:.1}, {:.1}) {:.1}x{:.1}",
            field.kind,
            field.id,
            rect.x,
            rect.y,
            rect.width,
            rect.height
        );

        match embed_field(&mut doc, target_page, rect, content) {
            Ok(Embedded::Image) => report.embedded.push(field.id),
            Ok(Embedded::Placeholder) => report.placeholders.push(field.id),
            Ok(Embedded::Text { font_fallback }) => {
                if font_fallback {
                    report.font_fallbacks.push(field.id);
                }
                report.embedded.push(field.id);
            }
            Err(err) => {
                log::warn!("field {} could not be embedded: {err}", field.id);
                report.failed.push(field.id);
            }
        }
    }

    let bytes = save_document(&mut doc)?;
    Ok(StructuralOutput { bytes, report })
}

fn embed_field(
    doc: &mut Document,
    page_number: u32,
    rect: Rect,
    content: &SignatureContent,
) -> Result<Embedded, FieldEmbedError> {
    let page_id = page_id(doc, page_number).ok_or(FieldEmbedError::MissingPage(page_number))?;

    match content {
        SignatureContent::Draw { image } | SignatureContent::Image { image } => {
            match decode_image(image) {
                Ok(xobject) => {
                    draw_image(doc, page_id, xobject, rect)?;
                    Ok(Embedded::Image)
                }
                Err(err) => {
                    log::warn!("signature image unusable, drawing placeholder: {err}");
                    draw_placeholder(doc, page_id, rect)?;
                    Ok(Embedded::Placeholder)
                }
            }
        }
        SignatureContent::Type { text } => {
            let font_fallback = draw_text(doc, page_id, rect, text)?;
            Ok(Embedded::Text { font_fallback })
        }
    }
}

fn decode_image(bytes: &[u8]) -> Result<ImageXObject, ImageDecodeError> {
    if bytes.is_empty() {
        return Err(ImageDecodeError::Empty);
    }
    match ImageXObject::from_encoded(bytes) {
        Ok(xobject) => Ok(xobject),
        Err(image::ImageError::IoError(err)) => Err(ImageDecodeError::Compress(err)),
        Err(err) => Err(ImageDecodeError::Decode(err)),
    }
}

fn draw_image(
    doc: &mut Document,
    page_id: ObjectId,
    xobject: ImageXObject,
    rect: Rect,
) -> Result<(), FieldEmbedError> {
    let image_id = xobject.insert(doc);
    let name = add_resource(doc, page_id, ResourceKind::XObject, Object::Reference(image_id))?;

    let operations = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                real(rect.width),
                real(0.0),
                real(0.0),
                real(rect.height),
                real(rect.x),
                real(rect.y),
            ],
        ),
        Operation::new("Do", vec![Object::Name(name.into_bytes())]),
        Operation::new("Q", vec![]),
    ];
    append_operations(doc, page_id, operations)
}

/// Sets `text` centred in `rect`. Returns whether the standard-font fallback
/// was used.
fn draw_text(
    doc: &mut Document,
    page_id: ObjectId,
    rect: Rect,
    text: &str,
) -> Result<bool, FieldEmbedError> {
    let font_size = MAX_TEXT_SIZE.min(rect.height * TEXT_HEIGHT_RATIO);
    let y = rect.y + rect.height / 2.0 - font_size / 3.0;

    let (font, x) = match preferred_text_width(text, font_size) {
        Ok(width) => (StandardFont::HelveticaBold, rect.x + (rect.width - width) / 2.0),
        Err(err) => {
            log::warn!("{err}; falling back to {}", StandardFont::Helvetica.base_font());
            let estimate = text.chars().count() as f64 * font_size * ESTIMATED_ADVANCE;
            (StandardFont::Helvetica, rect.x + rect.width / 2.0 - estimate)
        }
    };

    show_text(doc, page_id, font, font_size, x, y, text)?;
    Ok(font != StandardFont::HelveticaBold)
}

fn preferred_text_width(text: &str, font_size: f64) -> Result<f64, FontEmbedError> {
    let font = StandardFont::HelveticaBold;
    if let Some(ch) = font.first_unmeasurable(text) {
        return Err(FontEmbedError::UnmeasurableGlyph(ch));
    }
    // Every glyph is measurable at this point.
    Ok(font.measure(text, font_size as f32).map_or(0.0, f64::from))
}

fn draw_placeholder(
    doc: &mut Document,
    page_id: ObjectId,
    rect: Rect,
) -> Result<(), FieldEmbedError> {
    let x = rect.x + rect.width / 2.0 - PLACEHOLDER_INSET;
    let y = rect.y + rect.height / 2.0;
    show_text(doc, page_id, StandardFont::Helvetica, PLACEHOLDER_SIZE, x, y, PLACEHOLDER_LABEL)
}

fn show_text(
    doc: &mut Document,
    page_id: ObjectId,
    font: StandardFont,
    font_size: f64,
    x: f64,
    y: f64,
    text: &str,
) -> Result<(), FieldEmbedError> {
    let font_id = doc.add_object(font.dictionary());
    let name = add_resource(doc, page_id, ResourceKind::Font, Object::Reference(font_id))?;

    let operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(name.into_bytes()), real(font_size)]),
        Operation::new("rg", vec![real(0.0), real(0.0), real(0.0)]),
        Operation::new("Td", vec![real(x), real(y)]),
        Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        ),
        Operation::new("ET", vec![]),
    ];
    append_operations(doc, page_id, operations)
}

fn append_operations(
    doc: &mut Document,
    page_id: ObjectId,
    operations: Vec<Operation>,
) -> Result<(), FieldEmbedError> {
    let encoded = Content { operations }.encode()?;
    append_page_content(doc, page_id, encoded)?;
    Ok(())
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use doc_model::SignatureKind;
    use image::{ImageFormat, Rgba, RgbaImage};
    use pdf_engine::{blank_document, PageSize};
    use uuid::Uuid;

    use super::*;

    fn document(pages: u32) -> Vec<u8> {
        blank_document(pages, PageSize { width_pt: 600.0, height_pt: 800.0 })
            .expect("blank document should build")
    }

    fn metrics() -> (ViewportMetrics, PageMetrics) {
        (
            ViewportMetrics::new(300.0, 400.0).expect("positive size"),
            PageMetrics::new(600.0, 800.0, 2).expect("positive size"),
        )
    }

    fn png() -> Vec<u8> {
        let image = RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 128]));
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).expect("png encodes");
        bytes
    }

    fn field(page: u32, content: Option<SignatureContent>) -> SignatureField {
        SignatureField {
            id: Uuid::new_v4(),
            kind: content.as_ref().map_or(SignatureKind::Draw, SignatureContent::kind),
            geometry: Rect::new(10.0, 10.0, 50.0, 20.0),
            page,
            content,
        }
    }

    fn page_operations(bytes: &[u8], page_number: u32) -> Vec<Operation> {
        let doc = Document::load_mem(bytes).expect("output should parse");
        let id = page_id(&doc, page_number).expect("page exists");
        let content = doc.get_page_content(id).expect("page content");
        Content::decode(&content).expect("content should decode").operations
    }

    fn operands<'a>(operations: &'a [Operation], operator: &str) -> Vec<&'a [Object]> {
        operations
            .iter()
            .filter(|operation| operation.operator == operator)
            .map(|operation| operation.operands.as_slice())
            .collect()
    }

    fn shown_text(operations: &[Operation]) -> Vec<Vec<u8>> {
        operands(operations, "Tj")
            .into_iter()
            .filter_map(|operands| match operands.first() {
                Some(Object::String(bytes, _)) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    fn floats(operands: &[Object]) -> Vec<f32> {
        operands.iter().map(|operand| operand.as_float().expect("numeric operand")).collect()
    }

    #[test]
    fn many_fields_on_one_page_keep_graphics_state_shallow() {
        let (viewport, page) = metrics();
        let fields: Vec<SignatureField> = (0..32)
            .map(|index| {
                let content = if index % 2 == 0 {
                    SignatureContent::Type { text: format!("Signer {index}") }
                } else {
                    SignatureContent::Image { image: png() }
                };
                field(1, Some(content))
            })
            .collect();

        let output = embed_structural(&document(2), &fields, viewport, page)
            .expect("well-formed document should embed");
        assert_eq!(output.report.embedded.len(), 32);

        let mut depth = 0i32;
        let mut deepest = 0;
        for operation in page_operations(&output.bytes, 1) {
            match operation.operator.as_str() {
                "q" => depth += 1,
                "Q" => depth -= 1,
                _ => {}
            }
            deepest = deepest.max(depth);
        }
        assert_eq!(depth, 0);
        assert!(deepest <= 2, "q nesting reached {deepest}");
    }

    #[test]
    fn embeds_complete_fields_and_skips_incomplete_ones() {
        let (viewport, page) = metrics();
        let fields = vec![
            field(1, Some(SignatureContent::Type { text: "Ada Lovelace".to_owned() })),
            field(2, Some(SignatureContent::Image { image: png() })),
            field(1, None),
        ];

        let output = embed_structural(&document(2), &fields, viewport, page)
            .expect("well-formed document should embed");

        assert_eq!(output.report.embedded, vec![fields[0].id, fields[1].id]);
        assert_eq!(output.report.skipped_incomplete, vec![fields[2].id]);
        assert!(output.report.placeholders.is_empty());
        assert!(output.report.failed.is_empty());

        let first = page_operations(&output.bytes, 1);
        assert_eq!(shown_text(&first), vec![b"Ada Lovelace".to_vec()]);
        assert!(operands(&first, "Do").is_empty());

        let second = page_operations(&output.bytes, 2);
        assert_eq!(operands(&second, "Do").len(), 1);
        let placement = operands(&second, "cm");
        assert_eq!(floats(placement[0]), vec![100.0, 0.0, 0.0, 40.0, 20.0, 740.0]);
    }

    #[test]
    fn undecodable_image_becomes_placeholder_label() {
        let (viewport, page) = metrics();
        let garbage = SignatureContent::Draw { image: b"not an image".to_vec() };
        let fields = vec![field(1, Some(garbage))];

        let output = embed_structural(&document(1), &fields, viewport, page)
            .expect("document should still embed");

        assert_eq!(output.report.placeholders, vec![fields[0].id]);
        assert_eq!(output.report.drawn(), 1);
        let operations = page_operations(&output.bytes, 1);
        assert_eq!(shown_text(&operations), vec![b"Signature".to_vec()]);
        let font = operands(&operations, "Tf");
        assert_eq!(font[0][1].as_float().expect("font size"), 16.0);
        let position = floats(operands(&operations, "Td")[0]);
        assert_eq!(position, vec![20.0 + 50.0 - 30.0, 740.0 + 20.0]);
    }

    #[test]
    fn pages_beyond_the_document_are_clamped() {
        let (viewport, page) = metrics();
        let fields = vec![field(9, Some(SignatureContent::Type { text: "Ada".to_owned() }))];

        let output = embed_structural(&document(2), &fields, viewport, page)
            .expect("document should embed");

        assert_eq!(output.report.embedded.len(), 1);
        assert_eq!(shown_text(&page_operations(&output.bytes, 2)), vec![b"Ada".to_vec()]);
    }

    #[test]
    fn text_without_metrics_falls_back_to_standard_font() {
        let (viewport, page) = metrics();
        let fields = vec![field(1, Some(SignatureContent::Type { text: "Zoë".to_owned() }))];

        let output = embed_structural(&document(1), &fields, viewport, page)
            .expect("document should embed");

        assert_eq!(output.report.font_fallbacks, vec![fields[0].id]);
        assert_eq!(output.report.embedded, vec![fields[0].id]);
        let operations = page_operations(&output.bytes, 1);
        assert_eq!(shown_text(&operations), vec![vec![b'Z', b'o', 0xeb]]);
    }

    #[test]
    fn unparseable_input_is_a_document_error() {
        let (viewport, page) = metrics();

        let err = embed_structural(b"%PDF-garbage", &[], viewport, page)
            .expect_err("garbage should not parse");

        assert!(matches!(err, StructuralError::Parse(_)));
    }

    #[test]
    fn text_is_centred_with_measured_width() {
        let rect = Rect::new(0.0, 0.0, 100.0, 40.0);
        let font_size = MAX_TEXT_SIZE.min(rect.height * TEXT_HEIGHT_RATIO);
        assert_eq!(font_size, 18.0);

        let width = preferred_text_width("AA", font_size).expect("ascii is measurable");
        assert!((width - 2.0 * 0.722 * 18.0).abs() < 1e-3);
        assert!(matches!(
            preferred_text_width("ü", font_size),
            Err(FontEmbedError::UnmeasurableGlyph('ü'))
        ));
    }
}
