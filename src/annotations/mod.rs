//! Annotation store: positioned notes created from text selections

mod highlight;

use log::info;

use crate::geometry::{
    GeometryError, PagePoint, ScreenPoint, ScreenRect, rect_to_page_space, to_page_space,
};

pub use highlight::{HighlightId, HighlightLayer, HighlightMarker, HighlightMatching};

/// Placeholder text for annotations added without a selection
pub const BLANK_ANNOTATION_TEXT: &str = "New bullet point";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationId(pub u64);

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Page-space position of an annotation
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    /// 1-based page number
    pub page: usize,
}

impl Position {
    #[must_use]
    pub fn point(&self) -> PagePoint {
        PagePoint {
            x: self.x,
            y: self.y,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub id: AnnotationId,
    pub text: String,
    pub comment: String,
    pub position: Position,
    pub highlight: Option<HighlightId>,
}

/// A finished text selection on the render surface
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub text: String,
    /// Bounding rect of the selected range, screen pixels
    pub rect: ScreenRect,
    /// Top-left of the render surface in the same coordinates as `rect`
    pub surface: ScreenPoint,
}

#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("annotation {0} not found")]
    NotFound(AnnotationId),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// Outcome of a delete
#[derive(Debug)]
pub struct Deleted {
    pub annotation: Annotation,
    pub stripped: Vec<HighlightMarker>,
}

/// Ordered annotations plus their highlight markers
#[derive(Debug)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    highlights: HighlightLayer,
    matching: HighlightMatching,
    next_id: u64,
}

impl AnnotationStore {
    #[must_use]
    pub fn new(matching: HighlightMatching) -> Self {
        Self {
            annotations: Vec::new(),
            highlights: HighlightLayer::default(),
            matching,
            next_id: 0,
        }
    }

    /// Create an annotation from a selection on `page` rendered at `scale`.
    ///
    /// Returns `Ok(None)` when the selected text is blank.
    pub fn create_from_selection(
        &mut self,
        selection: &Selection,
        page: usize,
        scale: f32,
    ) -> Result<Option<AnnotationId>, AnnotationError> {
        let text = selection.text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let origin = to_page_space(&selection.rect, selection.surface, scale)?;
        let local = ScreenRect {
            left: selection.rect.left - selection.surface.x,
            top: selection.rect.top - selection.surface.y,
            ..selection.rect
        };
        let marker_rect = rect_to_page_space(&local, scale)?;

        let id = self.next_annotation_id();
        let highlight = self.highlights.add(id, page, text, marker_rect);
        self.annotations.push(Annotation {
            id,
            text: text.to_string(),
            comment: String::new(),
            position: Position {
                x: origin.x,
                y: origin.y,
                page,
            },
            highlight: Some(highlight),
        });

        info!("Annotation {id} created on page {page} at ({:.1}, {:.1})", origin.x, origin.y);
        Ok(Some(id))
    }

    /// Append a placeholder annotation at the top-left of `page`
    pub fn create_blank(&mut self, page: usize) -> AnnotationId {
        let id = self.next_annotation_id();
        self.annotations.push(Annotation {
            id,
            text: BLANK_ANNOTATION_TEXT.to_string(),
            comment: String::new(),
            position: Position { x: 0.0, y: 0.0, page },
            highlight: None,
        });
        info!("Blank annotation {id} created on page {page}");
        id
    }

    pub fn edit_text(&mut self, id: AnnotationId, text: String) -> Result<(), AnnotationError> {
        self.get_mut(id)?.text = text;
        Ok(())
    }

    pub fn edit_comment(&mut self, id: AnnotationId, comment: String) -> Result<(), AnnotationError> {
        self.get_mut(id)?.comment = comment;
        Ok(())
    }

    /// Remove an annotation and strip its highlights.
    ///
    /// With text matching, markers of other annotations carrying the same text
    /// are stripped as well.
    pub fn delete(&mut self, id: AnnotationId) -> Result<Deleted, AnnotationError> {
        let idx = self
            .annotations
            .iter()
            .position(|a| a.id == id)
            .ok_or(AnnotationError::NotFound(id))?;
        let annotation = self.annotations.remove(idx);

        let stripped = match self.matching {
            HighlightMatching::Text => self.highlights.strip_matching_text(&annotation.text),
            HighlightMatching::Owner => self.highlights.strip_owned_by(id),
        };

        info!(
            "Annotation {id} deleted, {} highlight(s) stripped",
            stripped.len()
        );
        Ok(Deleted {
            annotation,
            stripped,
        })
    }

    #[must_use]
    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    fn get_mut(&mut self, id: AnnotationId) -> Result<&mut Annotation, AnnotationError> {
        self.annotations
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(AnnotationError::NotFound(id))
    }

    /// Annotations in creation order
    #[must_use]
    pub fn all(&self) -> &[Annotation] {
        &self.annotations
    }

    #[must_use]
    pub fn highlights(&self) -> &HighlightLayer {
        &self.highlights
    }

    #[must_use]
    pub fn matching(&self) -> HighlightMatching {
        self.matching
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    fn next_annotation_id(&mut self) -> AnnotationId {
        self.next_id += 1;
        AnnotationId(self.next_id)
    }
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::new(HighlightMatching::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(text: &str, left: f32, top: f32) -> Selection {
        Selection {
            text: text.to_string(),
            rect: ScreenRect::new(left, top, 60.0, 14.0),
            surface: ScreenPoint::new(0.0, 0.0),
        }
    }

    #[test]
    fn selection_position_is_scale_independent() {
        let mut store = AnnotationStore::default();
        let id = store
            .create_from_selection(&selection("Foo", 100.0, 50.0), 1, 2.0)
            .unwrap()
            .unwrap();

        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.text, "Foo");
        assert_eq!(annotation.comment, "");
        assert_eq!(
            annotation.position,
            Position {
                x: 50.0,
                y: 25.0,
                page: 1
            }
        );
        assert!(annotation.highlight.is_some());
        assert_eq!(store.highlights().len(), 1);
    }

    #[test]
    fn blank_selection_is_ignored() {
        let mut store = AnnotationStore::default();
        for text in ["", "   ", "\n\t "] {
            let created = store
                .create_from_selection(&selection(text, 1.0, 1.0), 1, 1.0)
                .unwrap();
            assert!(created.is_none());
        }
        assert!(store.is_empty());
        assert!(store.highlights().is_empty());
    }

    #[test]
    fn selection_text_is_trimmed() {
        let mut store = AnnotationStore::default();
        let id = store
            .create_from_selection(&selection("  spaced out \n", 0.0, 0.0), 2, 1.0)
            .unwrap()
            .unwrap();
        assert_eq!(store.get(id).unwrap().text, "spaced out");
    }

    #[test]
    fn blank_annotation_has_placeholder_and_no_highlight() {
        let mut store = AnnotationStore::default();
        let id = store.create_blank(3);
        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.text, BLANK_ANNOTATION_TEXT);
        assert_eq!(
            annotation.position,
            Position {
                x: 0.0,
                y: 0.0,
                page: 3
            }
        );
        assert!(annotation.highlight.is_none());
    }

    #[test]
    fn insertion_order_is_kept() {
        let mut store = AnnotationStore::default();
        let a = store.create_blank(2);
        let b = store
            .create_from_selection(&selection("x", 5.0, 5.0), 1, 1.0)
            .unwrap()
            .unwrap();
        let c = store.create_blank(1);
        let ids: Vec<_> = store.all().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[test]
    fn edits_are_in_place() {
        let mut store = AnnotationStore::default();
        let id = store.create_blank(1);
        store.edit_text(id, "Renamed".to_string()).unwrap();
        store.edit_comment(id, "".to_string()).unwrap();
        store.edit_comment(id, "why not".to_string()).unwrap();
        let annotation = store.get(id).unwrap();
        assert_eq!(annotation.text, "Renamed");
        assert_eq!(annotation.comment, "why not");

        assert!(matches!(
            store.edit_text(AnnotationId(999), String::new()),
            Err(AnnotationError::NotFound(AnnotationId(999)))
        ));
    }

    #[test]
    fn delete_strips_highlights_sharing_text() {
        let mut store = AnnotationStore::new(HighlightMatching::Text);
        let first = store
            .create_from_selection(&selection("Same", 10.0, 10.0), 1, 1.0)
            .unwrap()
            .unwrap();
        let second = store
            .create_from_selection(&selection("Same", 10.0, 80.0), 2, 1.0)
            .unwrap()
            .unwrap();
        let other = store
            .create_from_selection(&selection("Other", 10.0, 40.0), 1, 1.0)
            .unwrap()
            .unwrap();

        let deleted = store.delete(first).unwrap();
        assert_eq!(deleted.annotation.id, first);
        assert_eq!(deleted.stripped.len(), 2);

        let ids: Vec<_> = store.all().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![second, other]);
        assert_eq!(store.highlights().len(), 1);
        assert_eq!(store.highlights().on_page(1).count(), 1);
        assert_eq!(store.highlights().on_page(2).count(), 0);
    }

    #[test]
    fn owner_matching_keeps_twin_highlight() {
        let mut store = AnnotationStore::new(HighlightMatching::Owner);
        let first = store
            .create_from_selection(&selection("Same", 10.0, 10.0), 1, 1.0)
            .unwrap()
            .unwrap();
        let second = store
            .create_from_selection(&selection("Same", 10.0, 80.0), 1, 1.0)
            .unwrap()
            .unwrap();

        let deleted = store.delete(first).unwrap();
        assert_eq!(deleted.stripped.len(), 1);

        let remaining = store.get(second).unwrap().highlight.unwrap();
        assert!(store.highlights().get(remaining).is_some());
    }

    #[test]
    fn delete_unknown_is_an_error() {
        let mut store = AnnotationStore::default();
        assert!(matches!(
            store.delete(AnnotationId(1)),
            Err(AnnotationError::NotFound(_))
        ));
    }

    #[test]
    fn marker_rect_is_in_page_space() {
        let mut store = AnnotationStore::default();
        let selection = Selection {
            text: "Bar".to_string(),
            rect: ScreenRect::new(60.0, 40.0, 30.0, 20.0),
            surface: ScreenPoint::new(20.0, 20.0),
        };
        let id = store.create_from_selection(&selection, 4, 2.0).unwrap().unwrap();
        let marker_id = store.get(id).unwrap().highlight.unwrap();
        let marker = store.highlights().get(marker_id).unwrap();
        assert_eq!(marker.page, 4);
        assert_eq!(
            marker.rect,
            crate::geometry::PageRect {
                x0: 20.0,
                y0: 10.0,
                x1: 35.0,
                y1: 20.0
            }
        );
    }
}
