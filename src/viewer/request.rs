//! Render request and response types

use crate::document::{RenderError, RenderedPage};

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Request sent to the render worker
#[derive(Debug)]
pub enum RenderRequest {
    /// Render a page at a scale
    Page {
        id: RequestId,
        page: usize,
        scale: f32,
    },

    /// Shutdown the worker
    Shutdown,
}

/// Response from the render worker
#[derive(Debug)]
pub enum RenderResponse {
    /// Rendered page data
    Page {
        id: RequestId,
        rendered: Box<RenderedPage>,
    },

    /// Error during rendering
    Error {
        id: RequestId,
        page: usize,
        error: RenderError,
    },
}
