use std::io::Cursor;

use doc_model::{Point, SignatureContent};
use image::{ImageFormat, Rgba, RgbaImage};

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Freehand drawing surface for Draw signatures.
#[derive(Debug, Clone)]
pub struct SignaturePad {
    width: u32,
    height: u32,
    pen_width: f64,
    strokes: Vec<Vec<Point>>,
    drawing: bool,
}

impl SignaturePad {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            pen_width: 2.0,
            strokes: Vec::new(),
            drawing: false,
        }
    }

    pub fn with_pen_width(mut self, pen_width: f64) -> Self {
        self.pen_width = pen_width.max(0.5);
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn begin_stroke(&mut self, at: Point) {
        self.strokes.push(vec![at]);
        self.drawing = true;
    }

    /// Extends the open stroke. Ignored between strokes.
    pub fn line_to(&mut self, to: Point) {
        if !self.drawing {
            return;
        }
        if let Some(stroke) = self.strokes.last_mut() {
            stroke.push(to);
        }
    }

    pub fn end_stroke(&mut self) {
        self.drawing = false;
    }

    pub fn stroke_count(&self) -> usize {
        self.strokes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.drawing = false;
    }

    /// Black ink on a white background.
    pub fn render(&self) -> RgbaImage {
        let mut canvas = RgbaImage::from_pixel(self.width, self.height, BACKGROUND);
        let radius = self.pen_width / 2.0;

        for stroke in &self.strokes {
            match stroke.as_slice() {
                [] => {}
                [dot] => stamp(&mut canvas, *dot, radius),
                points => {
                    for segment in points.windows(2) {
                        draw_segment(&mut canvas, segment[0], segment[1], radius);
                    }
                }
            }
        }

        canvas
    }

    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut bytes = Vec::new();
        self.render().write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    /// Draw content for the pad, or `None` when nothing has been drawn.
    pub fn to_content(&self) -> Result<Option<SignatureContent>, image::ImageError> {
        if self.is_empty() {
            return Ok(None);
        }
        Ok(Some(SignatureContent::Draw { image: self.to_png()? }))
    }
}

fn draw_segment(canvas: &mut RgbaImage, from: Point, to: Point, radius: f64) {
    let delta = to - from;
    let length = delta.x.hypot(delta.y);
    let steps = (length / 0.5).ceil().max(1.0) as u32;

    for step in 0..=steps {
        let t = f64::from(step) / f64::from(steps);
        stamp(canvas, Point::new(from.x + delta.x * t, from.y + delta.y * t), radius);
    }
}

fn stamp(canvas: &mut RgbaImage, center: Point, radius: f64) {
    let (width, height) = canvas.dimensions();
    let min_x = (center.x - radius).floor().max(0.0) as u32;
    let min_y = (center.y - radius).floor().max(0.0) as u32;
    let max_x = (center.x + radius).ceil().min(f64::from(width) - 1.0);
    let max_y = (center.y + radius).ceil().min(f64::from(height) - 1.0);
    if max_x < 0.0 || max_y < 0.0 {
        return;
    }

    for y in min_y..=max_y as u32 {
        for x in min_x..=max_x as u32 {
            let dx = f64::from(x) + 0.5 - center.x;
            let dy = f64::from(y) + 0.5 - center.y;
            if dx * dx + dy * dy <= radius * radius + 0.25 {
                canvas.put_pixel(x, y, INK);
            }
        }
    }
}
