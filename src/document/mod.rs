//! Rendering capability consumed by the viewer
//!
//! The engine is a black box: given a document and a page number it yields a
//! viewport, a drawn surface and the page's text layout. The viewer never
//! talks to MuPDF directly.

#[cfg(feature = "pdf")]
mod mupdf_engine;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;

use crate::geometry::PageRect;

#[cfg(feature = "pdf")]
pub use mupdf_engine::MupdfEngine;

/// Errors while opening a document
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("not a valid document: {0}")]
    Invalid(String),

    #[error("document has no pages")]
    Empty,

    #[error("failed to stage document: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while rendering a page
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("page {page} is out of range (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("PDF engine: {0}")]
    Engine(String),

    #[error("render worker disconnected")]
    Disconnected,
}

impl RenderError {
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }
}

/// Where a document comes from.
///
/// In-memory documents are staged to a temporary file that lives as long as
/// any clone of the source.
#[derive(Clone, Debug)]
pub struct DocumentSource {
    path: PathBuf,
    staged: Option<Arc<NamedTempFile>>,
}

impl DocumentSource {
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staged: None,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        let mut file = tempfile::Builder::new()
            .prefix("marginalia-")
            .suffix(".pdf")
            .tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;

        Ok(Self {
            path: file.path().to_path_buf(),
            staged: Some(Arc::new(file)),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_staged(&self) -> bool {
        self.staged.is_some()
    }
}

/// Document metadata obtained when probing a source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub title: Option<String>,
}

/// Page geometry at a given scale
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Page width in page-space units
    pub page_width: f32,
    /// Page height in page-space units
    pub page_height: f32,
    pub scale: f32,
}

impl Viewport {
    #[must_use]
    pub const fn new(page_width: f32, page_height: f32, scale: f32) -> Self {
        Self {
            page_width,
            page_height,
            scale,
        }
    }

    /// Surface width in pixels
    #[must_use]
    pub fn width(&self) -> f32 {
        self.page_width * self.scale
    }

    /// Surface height in pixels
    #[must_use]
    pub fn height(&self) -> f32 {
        self.page_height * self.scale
    }
}

/// Drawn page pixels (RGB, 3 bytes per pixel)
#[derive(Clone, Default)]
pub struct Surface {
    pub width_px: u32,
    pub height_px: u32,
    pub pixels: Vec<u8>,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl Surface {
    /// Encode the surface as an 8-bit RGB PNG
    pub fn write_png(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let mut encoder = png::Encoder::new(BufWriter::new(file), self.width_px, self.height_px);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&self.pixels)?;
        Ok(())
    }
}

/// One line of text with its page-space bounds
#[derive(Clone, Debug, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub bounds: PageRect,
}

/// Text layout of a page, in reading order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<TextLine>,
}

/// Result of rendering one page
#[derive(Clone, Debug)]
pub struct RenderedPage {
    pub page: usize,
    pub viewport: Viewport,
    pub surface: Surface,
    pub text: TextLayout,
}

/// An opened document. Page numbers are 1-based.
///
/// Implementations need not be `Send`; the render worker opens its own
/// instance on its thread.
pub trait PageRenderer {
    fn page_count(&self) -> usize;

    /// Page geometry at `scale`
    fn viewport(&mut self, page: usize, scale: f32) -> Result<Viewport, RenderError>;

    /// Draw the page into a fresh surface sized to `viewport`
    fn draw(&mut self, page: usize, viewport: &Viewport) -> Result<Surface, RenderError>;

    /// Text layout in page-space
    fn text_layout(&mut self, page: usize) -> Result<TextLayout, RenderError>;
}

/// Factory for page renderers
pub trait RenderEngine: Send + Sync {
    /// Validate a source and read its metadata without keeping it open
    fn probe(&self, source: &DocumentSource) -> Result<DocumentInfo, LoadError>;

    fn open(&self, source: &DocumentSource) -> Result<Box<dyn PageRenderer>, LoadError>;
}

/// Render a page the way the pipeline does: layout, draw, then text
pub fn render_page(
    renderer: &mut dyn PageRenderer,
    page: usize,
    scale: f32,
) -> Result<RenderedPage, RenderError> {
    let page_count = renderer.page_count();
    if page == 0 || page > page_count {
        return Err(RenderError::PageOutOfRange { page, page_count });
    }

    let viewport = renderer.viewport(page, scale)?;
    let surface = renderer.draw(page, &viewport)?;
    let text = renderer.text_layout(page)?;

    Ok(RenderedPage {
        page,
        viewport,
        surface,
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_bytes_outlive_the_original_buffer() {
        let source = {
            let bytes = b"%PDF-1.7 fake".to_vec();
            DocumentSource::from_bytes(&bytes).unwrap()
        };
        assert!(source.is_staged());
        let read = std::fs::read(source.path()).unwrap();
        assert_eq!(read, b"%PDF-1.7 fake");

        let clone = source.clone();
        drop(source);
        assert!(clone.path().exists());
    }

    #[test]
    fn viewport_scales_page_size() {
        let viewport = Viewport::new(612.0, 792.0, 1.5);
        assert!((viewport.width() - 918.0).abs() < 1e-3);
        assert!((viewport.height() - 1188.0).abs() < 1e-3);
    }

    #[test]
    fn surface_png_has_signature() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("page.png");
        let surface = Surface {
            width_px: 2,
            height_px: 2,
            pixels: vec![255; 12],
        };
        surface.write_png(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
