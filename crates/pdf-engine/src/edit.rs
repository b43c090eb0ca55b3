//! Object-graph edits used when stamping content onto existing pages.
//!
//! Everything here works on a parsed [`lopdf::Document`] and leaves page
//! content streams that were already present untouched: new drawing is
//! appended as an extra content stream, and the original streams are wrapped
//! once in a `q`/`Q` pair so a dangling transformation cannot leak into ours.

use crate::{inherited_attribute, PageSize, PdfEngineError};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::{ColorType, ImageFormat, RgbaImage};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Font,
    XObject,
}

impl ResourceKind {
    fn key(self) -> &'static [u8] {
        match self {
            Self::Font => b"Font",
            Self::XObject => b"XObject",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            Self::Font => "CsF",
            Self::XObject => "CsIm",
        }
    }
}

/// Object id of the 1-based `page_number`, if the document has it.
pub fn page_id(doc: &Document, page_number: u32) -> Option<ObjectId> {
    doc.get_pages().get(&page_number).copied()
}

/// Registers `object` in the page's resource dictionary under a name that
/// does not collide with existing entries, returning that name.
///
/// Inherited or shared resource dictionaries are copied onto the page first,
/// so sibling pages never see the new entry.
pub fn add_resource(
    doc: &mut Document,
    page_id: ObjectId,
    kind: ResourceKind,
    object: Object,
) -> Result<String, lopdf::Error> {
    let mut resources = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|object| dereference_dictionary(doc, &object))
        .unwrap_or_default();

    let mut category = resources
        .get(kind.key())
        .ok()
        .and_then(|object| dereference_dictionary(doc, object))
        .unwrap_or_default();

    let name = (1..)
        .map(|index| format!("{}{index}", kind.prefix()))
        .find(|candidate| !category.has(candidate.as_bytes()))
        .unwrap_or_else(|| kind.prefix().to_owned());

    category.set(name.as_bytes(), object);
    resources.set(kind.key(), Object::Dictionary(category));

    doc.get_object_mut(page_id)?.as_dict_mut()?.set("Resources", Object::Dictionary(resources));

    Ok(name)
}

/// Marks the `q`/`Q` streams that guard a page's original content.
const GUARD_KEY: &[u8] = b"CsGuard";

/// Appends `content` as a new content stream at the end of the page.
///
/// The page's original streams are wrapped in `q`/`Q` on the first append
/// only, so graphics-state nesting does not grow with every call.
pub fn append_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    content: Vec<u8>,
) -> Result<(), lopdf::Error> {
    let existing = existing_contents(doc, page_id)?;

    let mut contents = Vec::with_capacity(existing.len() + 3);
    if existing.is_empty() || is_guarded(doc, &existing) {
        contents.extend(existing);
    } else {
        let save = doc.add_object(guard_stream("Open", b"q\n"));
        let restore = doc.add_object(guard_stream("Close", b"\nQ\n"));
        contents.push(Object::Reference(save));
        contents.extend(existing);
        contents.push(Object::Reference(restore));
    }

    let added = doc.add_object(Stream::new(Dictionary::new(), content));
    contents.push(Object::Reference(added));

    doc.get_object_mut(page_id)?.as_dict_mut()?.set("Contents", Object::Array(contents));
    Ok(())
}

fn guard_stream(role: &str, operators: &[u8]) -> Stream {
    let dict = dictionary! { GUARD_KEY => Object::Name(role.as_bytes().to_vec()) };
    Stream::new(dict, operators.to_vec())
}

fn is_guarded(doc: &Document, contents: &[Object]) -> bool {
    let Some(Object::Reference(first)) = contents.first() else {
        return false;
    };
    doc.get_object(*first)
        .and_then(Object::as_stream)
        .and_then(|stream| stream.dict.get(GUARD_KEY))
        .and_then(Object::as_name)
        .is_ok_and(|role| role == b"Open")
}

fn existing_contents(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, lopdf::Error> {
    let page = doc.get_dictionary(page_id)?;

    let contents = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    Ok(contents)
}

fn dereference_dictionary(doc: &Document, object: &Object) -> Option<Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

/// An image ready to be inserted as an XObject.
///
/// JPEG payloads in RGB or grayscale are passed through untouched
/// (`DCTDecode`); everything else is decoded to RGBA and stored as a
/// Flate-compressed RGB stream with an optional soft mask for transparency.
#[derive(Debug, Clone)]
pub struct ImageXObject {
    pub width: u32,
    pub height: u32,
    stream: Stream,
    soft_mask: Option<Stream>,
}

impl ImageXObject {
    /// Decodes a PNG or JPEG container.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let format = image::guess_format(bytes)?;
        let decoded = image::load_from_memory_with_format(bytes, format)?;

        if format == ImageFormat::Jpeg {
            let color_space: Option<&[u8]> = match decoded.color() {
                ColorType::Rgb8 => Some(b"DeviceRGB"),
                ColorType::L8 => Some(b"DeviceGray"),
                _ => None,
            };

            if let Some(color_space) = color_space {
                let (width, height) = (decoded.width(), decoded.height());
                return Ok(Self::dct(bytes.to_vec(), width, height, color_space));
            }
        }

        Ok(Self::from_rgba(&decoded.to_rgba8())?)
    }

    /// Wraps an already-encoded baseline JPEG in RGB.
    pub fn from_jpeg(bytes: Vec<u8>, width: u32, height: u32) -> Self {
        Self::dct(bytes, width, height, b"DeviceRGB")
    }

    pub fn from_rgba(image: &RgbaImage) -> std::io::Result<Self> {
        let (width, height) = image.dimensions();
        let pixel_count = (width as usize) * (height as usize);

        let mut rgb = Vec::with_capacity(pixel_count * 3);
        let mut alpha = Vec::with_capacity(pixel_count);
        for pixel in image.pixels() {
            rgb.extend_from_slice(&pixel.0[..3]);
            alpha.push(pixel.0[3]);
        }

        let stream = flate_image_stream(width, height, b"DeviceRGB", &rgb)?;
        let soft_mask = if alpha.iter().any(|value| *value < u8::MAX) {
            Some(flate_image_stream(width, height, b"DeviceGray", &alpha)?)
        } else {
            None
        };

        Ok(Self { width, height, stream, soft_mask })
    }

    pub fn has_soft_mask(&self) -> bool {
        self.soft_mask.is_some()
    }

    /// Adds the image (and its mask) to the document.
    pub fn insert(self, doc: &mut Document) -> ObjectId {
        let mut stream = self.stream;
        if let Some(mask) = self.soft_mask {
            let mask_id = doc.add_object(mask);
            stream.dict.set("SMask", Object::Reference(mask_id));
        }
        doc.add_object(stream)
    }

    fn dct(bytes: Vec<u8>, width: u32, height: u32, color_space: &[u8]) -> Self {
        let dict = image_dictionary(width, height, color_space, b"DCTDecode");
        let stream = Stream::new(dict, bytes).with_compression(false);
        Self { width, height, stream, soft_mask: None }
    }
}

fn image_dictionary(width: u32, height: u32, color_space: &[u8], filter: &[u8]) -> Dictionary {
    dictionary! {
        "Type" => Object::Name(b"XObject".to_vec()),
        "Subtype" => Object::Name(b"Image".to_vec()),
        "Width" => Object::Integer(i64::from(width)),
        "Height" => Object::Integer(i64::from(height)),
        "ColorSpace" => Object::Name(color_space.to_vec()),
        "BitsPerComponent" => Object::Integer(8),
        "Filter" => Object::Name(filter.to_vec()),
    }
}

fn flate_image_stream(
    width: u32,
    height: u32,
    color_space: &[u8],
    samples: &[u8],
) -> std::io::Result<Stream> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(samples)?;
    let compressed = encoder.finish()?;

    let dict = image_dictionary(width, height, color_space, b"FlateDecode");
    Ok(Stream::new(dict, compressed).with_compression(false))
}

pub fn save_document(doc: &mut Document) -> Result<Vec<u8>, PdfEngineError> {
    let mut output = Vec::new();
    doc.save_to(&mut output).map_err(|err| PdfEngineError::Save(err.to_string()))?;
    Ok(output)
}

/// Builds a document of `page_count` empty pages of the given size.
pub fn blank_document(page_count: u32, size: PageSize) -> Result<Vec<u8>, PdfEngineError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..page_count.max(1))
        .map(|_| {
            let content_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => media_box(size),
                "Resources" => Dictionary::new(),
                "Contents" => content_id,
            });
            Object::Reference(page_id)
        })
        .collect();

    finish_page_tree(&mut doc, pages_id, kids);
    save_document(&mut doc)
}

/// Builds a one-page document whose page is exactly covered by `image`,
/// one page unit per image pixel.
pub fn single_image_document(image: ImageXObject) -> Result<Vec<u8>, PdfEngineError> {
    let size = PageSize { width_pt: image.width as f32, height_pt: image.height as f32 };

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let image_id = image.insert(&mut doc);

    let content = format!(
        "q\n{} 0 0 {} 0 0 cm\n/Im0 Do\nQ\n",
        format_number(size.width_pt),
        format_number(size.height_pt)
    );
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box(size),
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "Contents" => content_id,
    });

    finish_page_tree(&mut doc, pages_id, vec![Object::Reference(page_id)]);
    save_document(&mut doc)
}

fn media_box(size: PageSize) -> Vec<Object> {
    vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Real(size.width_pt),
        Object::Real(size.height_pt),
    ]
}

fn finish_page_tree(doc: &mut Document, pages_id: ObjectId, kids: Vec<Object>) {
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
}

/// Formats a content-stream operand without exponent notation.
pub(crate) fn format_number(value: f32) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == rounded.trunc() {
        format!("{}", rounded as i64)
    } else {
        format!("{rounded:.3}")
    }
}
