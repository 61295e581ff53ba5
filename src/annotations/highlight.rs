//! Highlight markers drawn over selected text

use serde::{Deserialize, Serialize};

use super::AnnotationId;
use crate::geometry::PageRect;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HighlightId(pub u64);

/// How `delete` decides which highlights to strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HighlightMatching {
    /// Every marker whose text equals the deleted annotation's text
    #[default]
    Text,
    /// Only markers created together with the deleted annotation
    Owner,
}

impl HighlightMatching {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightMatching::Text => "text",
            HighlightMatching::Owner => "owner",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HighlightMarker {
    pub id: HighlightId,
    pub owner: AnnotationId,
    pub page: usize,
    pub text: String,
    pub rect: PageRect,
}

/// All highlight markers in the document
#[derive(Debug, Default)]
pub struct HighlightLayer {
    markers: Vec<HighlightMarker>,
    next_id: u64,
}

impl HighlightLayer {
    pub fn add(&mut self, owner: AnnotationId, page: usize, text: &str, rect: PageRect) -> HighlightId {
        self.next_id += 1;
        let id = HighlightId(self.next_id);
        self.markers.push(HighlightMarker {
            id,
            owner,
            page,
            text: text.to_string(),
            rect,
        });
        id
    }

    /// Remove markers with exactly this text, returning them
    pub fn strip_matching_text(&mut self, text: &str) -> Vec<HighlightMarker> {
        self.strip_where(|m| m.text == text)
    }

    /// Remove markers belonging to `owner`, returning them
    pub fn strip_owned_by(&mut self, owner: AnnotationId) -> Vec<HighlightMarker> {
        self.strip_where(|m| m.owner == owner)
    }

    fn strip_where(&mut self, pred: impl Fn(&HighlightMarker) -> bool) -> Vec<HighlightMarker> {
        let (stripped, kept) = std::mem::take(&mut self.markers)
            .into_iter()
            .partition(|m| pred(m));
        self.markers = kept;
        stripped
    }

    pub fn on_page(&self, page: usize) -> impl Iterator<Item = &HighlightMarker> {
        self.markers.iter().filter(move |m| m.page == page)
    }

    pub fn get(&self, id: HighlightId) -> Option<&HighlightMarker> {
        self.markers.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}
