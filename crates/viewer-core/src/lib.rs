use doc_model::{PageMetrics, Point, Rect, ViewportMetrics};

mod adapter;
mod drag;
mod pad;
mod viewport;

pub use adapter::{HeadlessViewport, ListenerId, ViewportAdapter};
pub use drag::{DragController, DragOutcome, DragSession, DragState, PlacementContext, PointerEvent};
pub use pad::SignaturePad;
pub use viewport::{page_from_location, DocumentViewport, ViewportError, ViewportReady};

/// Page units per viewport pixel along each axis.
pub fn scale_factors(viewport: ViewportMetrics, page: PageMetrics) -> (f64, f64) {
    (page.width() / viewport.width(), page.height() / viewport.height())
}

/// Maps a viewport rect (top-left origin, Y down) to page space
/// (bottom-left origin, Y up).
pub fn to_page_space(rect: Rect, viewport: ViewportMetrics, page: PageMetrics) -> Rect {
    let (scale_x, scale_y) = scale_factors(viewport, page);

    Rect {
        x: rect.x * scale_x,
        y: page.height() - (rect.y + rect.height) * scale_y,
        width: rect.width * scale_x,
        height: rect.height * scale_y,
    }
}

/// Inverse of [`to_page_space`].
pub fn to_viewport_space(rect: Rect, viewport: ViewportMetrics, page: PageMetrics) -> Rect {
    let scale_x = viewport.width() / page.width();
    let scale_y = viewport.height() / page.height();

    Rect {
        x: rect.x * scale_x,
        y: (page.height() - rect.y - rect.height) * scale_y,
        width: rect.width * scale_x,
        height: rect.height * scale_y,
    }
}

/// Turns a pointer position relative to the viewport into a position
/// relative to the scrolled document.
pub fn adjust_for_scroll(point: Point, scroll: Point) -> Point {
    point + scroll
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(vw: f64, vh: f64, pw: f64, ph: f64) -> (ViewportMetrics, PageMetrics) {
        (
            ViewportMetrics::new(vw, vh).expect("viewport size is positive"),
            PageMetrics::new(pw, ph, 1).expect("page size is positive"),
        )
    }

    fn assert_rect_eq(actual: Rect, expected: Rect) {
        for (a, e) in [
            (actual.x, expected.x),
            (actual.y, expected.y),
            (actual.width, expected.width),
            (actual.height, expected.height),
        ] {
            assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn flips_y_axis_at_double_scale() {
        let (viewport, page) = metrics(300.0, 400.0, 600.0, 800.0);

        let mapped = to_page_space(Rect::new(10.0, 10.0, 50.0, 20.0), viewport, page);

        assert_rect_eq(mapped, Rect::new(20.0, 740.0, 100.0, 40.0));
    }

    #[test]
    fn round_trips_across_scales() {
        let cases = [
            (300.0, 400.0, 600.0, 800.0),
            (1280.0, 720.0, 612.0, 792.0),
            (333.3, 97.1, 841.89, 595.28),
            (1.0, 1.0, 10_000.0, 10_000.0),
        ];
        let rects = [
            Rect::new(0.0, 0.0, 1.0, 1.0),
            Rect::new(10.0, 10.0, 50.0, 20.0),
            Rect::new(123.456, 789.012, 200.0, 100.0),
            Rect::new(-15.0, 2_000.0, 0.5, 3.25),
        ];

        for (vw, vh, pw, ph) in cases {
            let (viewport, page) = metrics(vw, vh, pw, ph);
            for rect in rects {
                let back = to_viewport_space(to_page_space(rect, viewport, page), viewport, page);
                assert_rect_eq(back, rect);
            }
        }
    }

    #[test]
    fn rect_at_top_of_viewport_lands_at_top_of_page() {
        let (viewport, page) = metrics(612.0, 792.0, 612.0, 792.0);

        let mapped = to_page_space(Rect::new(0.0, 0.0, 100.0, 50.0), viewport, page);

        assert_rect_eq(mapped, Rect::new(0.0, 742.0, 100.0, 50.0));
    }

    #[test]
    fn scale_factors_are_page_over_viewport() {
        let (viewport, page) = metrics(300.0, 400.0, 600.0, 1200.0);
        assert_eq!(scale_factors(viewport, page), (2.0, 3.0));
    }

    #[test]
    fn scroll_adjustment_adds_offset() {
        let adjusted = adjust_for_scroll(Point::new(5.0, 10.0), Point::new(0.0, 250.0));
        assert_eq!(adjusted, Point::new(5.0, 260.0));
    }
}
