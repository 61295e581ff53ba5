//! Screen-space <-> page-space coordinate mapping
//!
//! Page-space is the document's native unit (pixels at scale 1.0). Screen-space
//! is pixels on the rendered surface and depends on the current zoom scale.

use serde::{Deserialize, Serialize};

/// Errors from coordinate mapping
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("scale must be finite and positive, got {0}")]
    InvalidScale(f32),
}

/// A point in screen pixels
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A rectangle in screen pixels
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScreenRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    #[must_use]
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// Smallest rectangle covering both
    #[must_use]
    pub fn union(&self, other: &ScreenRect) -> ScreenRect {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        ScreenRect {
            left,
            top,
            width: self.right().max(other.right()) - left,
            height: self.bottom().max(other.bottom()) - top,
        }
    }
}

/// A point in page-space
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PagePoint {
    pub x: f32,
    pub y: f32,
}

/// A rectangle in page-space
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PageRect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl PageRect {
    #[must_use]
    pub fn intersects(&self, other: &PageRect) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }
}

fn check_scale(scale: f32) -> Result<f32, GeometryError> {
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(GeometryError::InvalidScale(scale))
    }
}

/// Map the top-left corner of a selection rectangle into page-space.
///
/// `rect` and `surface` are both in the same screen coordinate system; the
/// result is relative to the surface's top-left corner.
pub fn to_page_space(
    rect: &ScreenRect,
    surface: ScreenPoint,
    scale: f32,
) -> Result<PagePoint, GeometryError> {
    let scale = check_scale(scale)?;
    Ok(PagePoint {
        x: (rect.left - surface.x) / scale,
        y: (rect.top - surface.y) / scale,
    })
}

/// Map a page-space point to surface pixels
pub fn to_screen_space(point: PagePoint, scale: f32) -> Result<ScreenPoint, GeometryError> {
    let scale = check_scale(scale)?;
    Ok(ScreenPoint {
        x: point.x * scale,
        y: point.y * scale,
    })
}

/// Map a full surface rectangle to page-space
pub fn rect_to_page_space(rect: &ScreenRect, scale: f32) -> Result<PageRect, GeometryError> {
    let scale = check_scale(scale)?;
    Ok(PageRect {
        x0: rect.left / scale,
        y0: rect.top / scale,
        x1: rect.right() / scale,
        y1: rect.bottom() / scale,
    })
}

/// Map a page-space rectangle to surface pixels
pub fn rect_to_screen_space(rect: &PageRect, scale: f32) -> Result<ScreenRect, GeometryError> {
    let scale = check_scale(scale)?;
    Ok(ScreenRect {
        left: rect.x0 * scale,
        top: rect.y0 * scale,
        width: (rect.x1 - rect.x0) * scale,
        height: (rect.y1 - rect.y0) * scale,
    })
}
