//! Transparent text overlay laid over the rendered surface
//!
//! Spans are positioned in surface pixels so a selection made on the overlay
//! can be fed straight into the coordinate mapper.

use crate::document::{TextLayout, Viewport};
use crate::geometry::{ScreenRect, rect_to_screen_space};

#[derive(Clone, Debug, PartialEq)]
pub struct OverlaySpan {
    pub text: String,
    pub rect: ScreenRect,
}

/// Selectable text layer sized to the viewport
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextOverlay {
    pub width: f32,
    pub height: f32,
    pub spans: Vec<OverlaySpan>,
}

impl TextOverlay {
    #[must_use]
    pub fn build(layout: &TextLayout, viewport: &Viewport) -> Self {
        let spans = layout
            .lines
            .iter()
            .filter_map(|line| {
                rect_to_screen_space(&line.bounds, viewport.scale)
                    .ok()
                    .map(|rect| OverlaySpan {
                        text: line.text.clone(),
                        rect,
                    })
            })
            .collect();

        Self {
            width: viewport.width(),
            height: viewport.height(),
            spans,
        }
    }

    /// Text and bounding rect of spans `start..=end` (in either order)
    #[must_use]
    pub fn selection(&self, start: usize, end: usize) -> Option<(String, ScreenRect)> {
        let (lo, hi) = if start <= end {
            (start, end)
        } else {
            (end, start)
        };
        let spans = self.spans.get(lo..=hi)?;
        let first = spans.first()?;

        let rect = spans
            .iter()
            .skip(1)
            .fold(first.rect, |acc, span| acc.union(&span.rect));
        let text = spans
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ");

        Some((text, rect))
    }

    /// Index of the first span at or below `y` pixels
    #[must_use]
    pub fn span_at_or_below(&self, y: f32) -> Option<usize> {
        self.spans
            .iter()
            .position(|span| span.rect.bottom() > y)
            .or_else(|| self.spans.len().checked_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TextLine;
    use crate::geometry::PageRect;

    fn layout() -> TextLayout {
        TextLayout {
            lines: vec![
                TextLine {
                    text: "First line".to_string(),
                    bounds: PageRect {
                        x0: 10.0,
                        y0: 10.0,
                        x1: 110.0,
                        y1: 20.0,
                    },
                },
                TextLine {
                    text: "Second".to_string(),
                    bounds: PageRect {
                        x0: 10.0,
                        y0: 30.0,
                        x1: 60.0,
                        y1: 40.0,
                    },
                },
            ],
        }
    }

    #[test]
    fn overlay_is_sized_to_viewport() {
        let overlay = TextOverlay::build(&layout(), &Viewport::new(200.0, 100.0, 2.0));
        assert_eq!(overlay.width, 400.0);
        assert_eq!(overlay.height, 200.0);
        assert_eq!(overlay.spans[1].rect, ScreenRect::new(20.0, 60.0, 100.0, 20.0));
    }

    #[test]
    fn selection_joins_text_and_unions_rects() {
        let overlay = TextOverlay::build(&layout(), &Viewport::new(200.0, 100.0, 1.0));
        let (text, rect) = overlay.selection(1, 0).unwrap();
        assert_eq!(text, "First line Second");
        assert_eq!(rect, ScreenRect::new(10.0, 10.0, 100.0, 30.0));
        assert!(overlay.selection(0, 5).is_none());
    }

    #[test]
    fn span_lookup_by_offset() {
        let overlay = TextOverlay::build(&layout(), &Viewport::new(200.0, 100.0, 1.0));
        assert_eq!(overlay.span_at_or_below(0.0), Some(0));
        assert_eq!(overlay.span_at_or_below(25.0), Some(1));
        assert_eq!(overlay.span_at_or_below(500.0), Some(1));
        assert_eq!(TextOverlay::default().span_at_or_below(0.0), None);
    }
}
