//! MuPDF-backed rendering engine

use mupdf::text_page::TextBlockType;
use mupdf::{Colorspace, Document, Matrix, Page, Pixmap, TextPageFlags};

use super::{
    DocumentInfo, DocumentSource, LoadError, PageRenderer, RenderEngine, RenderError, Surface,
    TextLayout, TextLine, Viewport,
};
use crate::geometry::PageRect;

/// Opens documents with MuPDF
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfEngine;

fn open_document(source: &DocumentSource) -> Result<(Document, usize), LoadError> {
    let doc = Document::open(source.path().to_string_lossy().as_ref())
        .map_err(|e| LoadError::Invalid(e.to_string()))?;
    let page_count = doc
        .page_count()
        .map_err(|e| LoadError::Invalid(e.to_string()))?;

    if page_count <= 0 {
        return Err(LoadError::Empty);
    }

    Ok((doc, page_count as usize))
}

impl RenderEngine for MupdfEngine {
    fn probe(&self, source: &DocumentSource) -> Result<DocumentInfo, LoadError> {
        let (doc, page_count) = open_document(source)?;

        let title = doc
            .metadata(mupdf::MetadataName::Title)
            .ok()
            .filter(|t| !t.is_empty());

        Ok(DocumentInfo { page_count, title })
    }

    fn open(&self, source: &DocumentSource) -> Result<Box<dyn PageRenderer>, LoadError> {
        let (doc, page_count) = open_document(source)?;
        Ok(Box::new(MupdfRenderer {
            doc,
            page_count,
            loaded: None,
        }))
    }
}

struct MupdfRenderer {
    doc: Document,
    page_count: usize,
    // layout, draw and text all hit the same page back to back
    loaded: Option<(usize, Page)>,
}

impl MupdfRenderer {
    fn page(&mut self, page: usize) -> Result<&Page, RenderError> {
        let reuse = matches!(&self.loaded, Some((num, _)) if *num == page);
        if !reuse {
            let loaded = self
                .doc
                .load_page((page - 1) as i32)
                .map_err(|e| RenderError::engine(e.to_string()))?;
            self.loaded = Some((page, loaded));
        }

        match &self.loaded {
            Some((_, loaded)) => Ok(loaded),
            None => Err(RenderError::engine("page cache empty after load")),
        }
    }
}

impl PageRenderer for MupdfRenderer {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn viewport(&mut self, page: usize, scale: f32) -> Result<Viewport, RenderError> {
        let bounds = self
            .page(page)?
            .bounds()
            .map_err(|e| RenderError::engine(e.to_string()))?;
        Ok(Viewport::new(
            bounds.x1 - bounds.x0,
            bounds.y1 - bounds.y0,
            scale,
        ))
    }

    fn draw(&mut self, page: usize, viewport: &Viewport) -> Result<Surface, RenderError> {
        let transform = Matrix::new_scale(viewport.scale, viewport.scale);
        let rgb = Colorspace::device_rgb();
        let pixmap = self
            .page(page)?
            .to_pixmap(&transform, &rgb, false, false)
            .map_err(|e| RenderError::engine(e.to_string()))?;

        Ok(Surface {
            width_px: pixmap.width(),
            height_px: pixmap.height(),
            pixels: pixmap_to_rgb(&pixmap)?,
        })
    }

    fn text_layout(&mut self, page: usize) -> Result<TextLayout, RenderError> {
        let text_page = self
            .page(page)?
            .to_text_page(TextPageFlags::empty())
            .map_err(|e| RenderError::engine(e.to_string()))?;

        let mut lines = Vec::new();
        for block in text_page.blocks() {
            if block.r#type() != TextBlockType::Text {
                continue;
            }
            for line in block.lines() {
                let text: String = line.chars().filter_map(|ch| ch.char()).collect();
                if text.trim().is_empty() {
                    continue;
                }
                let bbox = line.bounds();
                lines.push(TextLine {
                    text,
                    bounds: PageRect {
                        x0: bbox.x0,
                        y0: bbox.y0,
                        x1: bbox.x1,
                        y1: bbox.y1,
                    },
                });
            }
        }

        Ok(TextLayout { lines })
    }
}

fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, RenderError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(RenderError::engine(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(RenderError::engine("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row = &samples[y * stride..y * stride + row_bytes];
        if n == 3 {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
            }
        }
    }

    Ok(out)
}
