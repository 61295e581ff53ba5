//! A viewing session: one document pipeline, its annotations and the backend

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::annotations::{
    AnnotationError, AnnotationId, AnnotationStore, Deleted, HighlightMatching, Selection,
};
use crate::backend::{Backend, BackendError, SaveAnnotationsRequest, UploadFile, UploadReceipt};
use crate::document::{DocumentInfo, DocumentSource, LoadError, RenderEngine};
use crate::viewer::{PipelineEvent, RenderPipeline, ZoomPolicy};

/// 16 MiB, the backend's request size limit
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionConfig {
    pub initial_scale: f32,
    pub zoom: ZoomPolicy,
    pub highlight_matching: HighlightMatching,
    pub max_upload_bytes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_scale: 1.5,
            zoom: ZoomPolicy::default(),
            highlight_matching: HighlightMatching::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("could not load document: {0}")]
    Load(#[from] LoadError),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueryEntry {
    pub query: String,
    pub response: String,
    pub asked_at: DateTime<Utc>,
}

/// Answered queries, oldest first
#[derive(Debug, Default)]
pub struct QueryLog {
    entries: Vec<QueryEntry>,
}

impl QueryLog {
    pub fn record(&mut self, query: impl Into<String>, response: impl Into<String>) -> &QueryEntry {
        self.entries.push(QueryEntry {
            query: query.into(),
            response: response.into(),
            asked_at: Utc::now(),
        });
        let idx = self.entries.len() - 1;
        &self.entries[idx]
    }

    #[must_use]
    pub fn entries(&self) -> &[QueryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn last(&self) -> Option<&QueryEntry> {
        self.entries.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Upload a checked file and fetch it back from the backend session
pub fn upload_and_fetch(
    backend: &dyn Backend,
    file: &UploadFile,
) -> Result<(UploadReceipt, Vec<u8>), BackendError> {
    let receipt = backend.upload(file)?;
    info!(
        "Upload accepted as {}",
        receipt.filename.as_deref().unwrap_or(&file.name)
    );
    let bytes = backend.fetch_document()?;
    Ok((receipt, bytes))
}

pub struct Session {
    pipeline: RenderPipeline,
    store: AnnotationStore,
    backend: Arc<dyn Backend>,
    log: QueryLog,
    config: SessionConfig,
}

impl Session {
    #[must_use]
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        backend: Arc<dyn Backend>,
        config: SessionConfig,
    ) -> Self {
        Self {
            pipeline: RenderPipeline::new(engine, config.initial_scale, config.zoom),
            store: AnnotationStore::new(config.highlight_matching),
            backend,
            log: QueryLog::default(),
            config,
        }
    }

    pub fn load(&mut self, path: &Path) -> Result<DocumentInfo, LoadError> {
        self.pipeline.load(DocumentSource::from_path(path))
    }

    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<DocumentInfo, LoadError> {
        let source = DocumentSource::from_bytes(bytes)?;
        self.pipeline.load(source)
    }

    /// Upload `path`, then view the copy the backend serves back.
    ///
    /// Type and size are checked before anything goes over the network.
    pub fn upload_and_load(&mut self, path: &Path) -> Result<DocumentInfo, SessionError> {
        let file = UploadFile::from_path(path, self.config.max_upload_bytes)?;
        let (_, bytes) = upload_and_fetch(self.backend.as_ref(), &file)?;
        Ok(self.load_bytes(&bytes)?)
    }

    /// Annotate a selection made on the page view on screen.
    ///
    /// Page and scale come from that view, since a newer render may already
    /// be dispatched. Without a view the current values are used.
    pub fn select(&mut self, selection: &Selection) -> Result<Option<AnnotationId>, AnnotationError> {
        let (page, scale) = self.pipeline.view().map_or_else(
            || (self.pipeline.current_page(), self.pipeline.scale()),
            |view| (view.page, view.viewport.scale),
        );
        self.store.create_from_selection(selection, page, scale)
    }

    pub fn add_blank(&mut self) -> AnnotationId {
        self.store.create_blank(self.pipeline.current_page())
    }

    pub fn edit_text(&mut self, id: AnnotationId, text: String) -> Result<(), AnnotationError> {
        self.store.edit_text(id, text)
    }

    pub fn edit_comment(&mut self, id: AnnotationId, comment: String) -> Result<(), AnnotationError> {
        self.store.edit_comment(id, comment)
    }

    pub fn delete(&mut self, id: AnnotationId) -> Result<Deleted, AnnotationError> {
        self.store.delete(id)
    }

    /// Bring an annotation's page on screen and scroll to it
    pub fn navigate_to(&mut self, id: AnnotationId) -> Result<Vec<PipelineEvent>, AnnotationError> {
        let position = self
            .store
            .get(id)
            .map(|a| a.position)
            .ok_or(AnnotationError::NotFound(id))?;
        Ok(self.pipeline.navigate_to(position.page, position.point()))
    }

    #[must_use]
    pub fn payload(&self) -> SaveAnnotationsRequest {
        SaveAnnotationsRequest::from(&self.store)
    }

    /// Send every annotation to the backend. Nothing is marked as saved.
    pub fn persist(&self) -> Result<usize, BackendError> {
        let payload = self.payload();
        let count = payload.annotations.len();
        match self.backend.save_annotations(&payload) {
            Ok(()) => {
                info!("Saved {count} annotation(s)");
                Ok(count)
            }
            Err(e) => {
                warn!("Saving annotations failed: {e}");
                Err(e)
            }
        }
    }

    pub fn ask(&mut self, query: &str) -> Result<&QueryEntry, BackendError> {
        let response = self.backend.ask(query)?;
        Ok(self.log.record(query, response))
    }

    pub fn poll(&mut self) -> Vec<PipelineEvent> {
        self.pipeline.poll()
    }

    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<PipelineEvent> {
        self.pipeline.wait_idle(timeout)
    }

    #[must_use]
    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut RenderPipeline {
        &mut self.pipeline
    }

    #[must_use]
    pub fn annotations(&self) -> &AnnotationStore {
        &self.store
    }

    #[must_use]
    pub fn query_log(&self) -> &QueryLog {
        &self.log
    }

    pub fn query_log_mut(&mut self) -> &mut QueryLog {
        &mut self.log
    }

    #[must_use]
    pub fn backend(&self) -> Arc<dyn Backend> {
        Arc::clone(&self.backend)
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
