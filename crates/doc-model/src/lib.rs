use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

mod config;
mod field_store;

pub use config::{
    ConfigError, SignerConfig, SignerProfile, ENV_CAPTURE_SCALE, ENV_FIELD_HEIGHT, ENV_FIELD_WIDTH,
    ENV_RELEASE_MS, ENV_SIGNER_NAME,
};
pub use field_store::{FieldStore, Readiness, StoreChange, StoreEvent, SubscriptionId};

/// Unique identifier for a signature field, assigned once at creation.
pub type FieldId = uuid::Uuid;

/// Smallest width/height a field may have, in viewport pixels.
pub const MIN_FIELD_EXTENT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::ops::Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Axis-aligned rectangle. The meaning of `y` depends on the space: top edge
/// in viewport space, bottom edge in page space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// Size of the rendering surface in pixels. Both sides are positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMetrics {
    width: f64,
    height: f64,
}

impl ViewportMetrics {
    /// Returns `None` until the surface has been measured with a real size.
    pub fn new(width: f64, height: f64) -> Option<Self> {
        (width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite())
            .then_some(Self { width, height })
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }
}

/// Natural page size in page units plus the document's page count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMetrics {
    width: f64,
    height: f64,
    page_count: u32,
}

impl PageMetrics {
    pub fn new(width: f64, height: f64, page_count: u32) -> Option<Self> {
        (width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite())
            .then_some(Self { width, height, page_count: page_count.max(1) })
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }
}

/// Tool used to fill a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKind {
    #[default]
    Draw,
    Type,
    Image,
}

/// What a filled field carries. Draw and Image hold encoded raster bytes
/// (PNG or JPEG); Type holds the plain text to set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignatureContent {
    Draw { image: Vec<u8> },
    Type { text: String },
    Image { image: Vec<u8> },
}

impl SignatureContent {
    pub fn kind(&self) -> SignatureKind {
        match self {
            Self::Draw { .. } => SignatureKind::Draw,
            Self::Type { .. } => SignatureKind::Type,
            Self::Image { .. } => SignatureKind::Image,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Draw { image } | Self::Image { image } => image.is_empty(),
            Self::Type { text } => text.trim().is_empty(),
        }
    }

    /// Builds raster content from a `data:image/...;base64,` URL.
    pub fn from_data_url(kind: SignatureKind, url: &str) -> Result<Self, DataUrlError> {
        let image = decode_data_url(url)?;
        match kind {
            SignatureKind::Draw => Ok(Self::Draw { image }),
            SignatureKind::Image => Ok(Self::Image { image }),
            SignatureKind::Type => Err(DataUrlError::NotAnImageKind),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DataUrlError {
    #[error("not an image data URL")]
    NotImage,
    #[error("only base64 data URLs are supported")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("typed signatures cannot carry image data")]
    NotAnImageKind,
}

/// Decodes the payload of a base64 image data URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, DataUrlError> {
    let rest = url.strip_prefix("data:image/").ok_or(DataUrlError::NotImage)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUrlError::NotBase64)?;
    if !header.ends_with(";base64") {
        return Err(DataUrlError::NotBase64);
    }

    Ok(STANDARD.decode(payload.trim())?)
}

/// One placeable, fillable signature field.
///
/// `geometry` is in viewport pixel space (top-left origin, scroll-adjusted)
/// and `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureField {
    pub id: FieldId,
    pub kind: SignatureKind,
    pub geometry: Rect,
    pub page: u32,
    pub content: Option<SignatureContent>,
}

impl SignatureField {
    pub fn is_complete(&self) -> bool {
        self.content.as_ref().is_some_and(|content| !content.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_metrics_reject_unmeasured_surfaces() {
        assert!(ViewportMetrics::new(0.0, 400.0).is_none());
        assert!(ViewportMetrics::new(300.0, -1.0).is_none());
        assert!(ViewportMetrics::new(f64::NAN, 1.0).is_none());
        assert!(ViewportMetrics::new(300.0, 400.0).is_some());
    }

    #[test]
    fn page_metrics_have_at_least_one_page() {
        let metrics = PageMetrics::new(600.0, 800.0, 0).expect("positive size");
        assert_eq!(metrics.page_count(), 1);
    }

    #[test]
    fn whitespace_text_is_incomplete() {
        let field = SignatureField {
            id: FieldId::new_v4(),
            kind: SignatureKind::Type,
            geometry: Rect::new(0.0, 0.0, 10.0, 10.0),
            page: 1,
            content: Some(SignatureContent::Type { text: "   ".to_owned() }),
        };
        assert!(!field.is_complete());

        let filled = SignatureField {
            content: Some(SignatureContent::Type { text: "Ada".to_owned() }),
            ..field
        };
        assert!(filled.is_complete());
    }

    #[test]
    fn decodes_png_data_url() {
        let content =
            SignatureContent::from_data_url(SignatureKind::Draw, "data:image/png;base64,iVBORw==")
                .expect("data url should decode");

        assert_eq!(content.kind(), SignatureKind::Draw);
        assert_eq!(content, SignatureContent::Draw { image: vec![0x89, b'P', b'N', b'G'] });
    }

    #[test]
    fn rejects_non_image_data_urls() {
        assert!(matches!(
            decode_data_url("data:text/plain;base64,aGk="),
            Err(DataUrlError::NotImage)
        ));
        assert!(matches!(
            decode_data_url("data:image/svg+xml,<svg/>"),
            Err(DataUrlError::NotBase64)
        ));
        assert!(matches!(
            SignatureContent::from_data_url(SignatureKind::Type, "data:image/png;base64,AA=="),
            Err(DataUrlError::NotAnImageKind)
        ));
    }

    #[test]
    fn rect_contains_its_edges() {
        let rect = Rect::new(10.0, 10.0, 50.0, 20.0);
        assert!(rect.contains(Point::new(10.0, 10.0)));
        assert!(rect.contains(Point::new(60.0, 30.0)));
        assert!(!rect.contains(Point::new(61.0, 30.0)));
    }
}
