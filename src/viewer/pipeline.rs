//! Render pipeline - owns the viewer state, the render worker and the surface

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};
use log::{debug, info, warn};

use super::overlay::TextOverlay;
use super::request::{RenderRequest, RenderResponse, RequestId};
use super::state::{Command, Effect, ViewerState, ZoomPolicy};
use super::worker::render_worker;
use crate::document::{
    DocumentInfo, DocumentSource, LoadError, RenderEngine, RenderError, RenderedPage, Surface,
    Viewport,
};
use crate::geometry::{
    GeometryError, PagePoint, ScreenPoint, ScreenRect, to_page_space, to_screen_space,
};

/// The page currently shown on the surface
#[derive(Clone, Debug)]
pub struct PageView {
    pub page: usize,
    pub viewport: Viewport,
    pub surface: Surface,
    pub overlay: TextOverlay,
}

/// Things that happened while the pipeline processed completions
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    /// A render was installed on the surface
    Presented { page: usize },
    /// A render finished but a newer request replaced it
    Superseded { page: usize },
    /// A render could not be produced
    Failed { page: usize, error: String },
    /// The surface scroll offset changed
    Scrolled { offset: ScreenPoint },
    /// A navigation target is not a page of the loaded document
    OutOfRange { page: usize, page_count: usize },
}

#[derive(Clone, Copy, Debug)]
struct PendingScroll {
    page: usize,
    target: PagePoint,
}

struct WorkerHandle {
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
}

impl WorkerHandle {
    fn shutdown(&self) {
        let _ = self.request_tx.send(RenderRequest::Shutdown);
    }
}

struct LoadedDocument {
    info: DocumentInfo,
    // keeps staged bytes alive while the worker reads them
    _source: DocumentSource,
}

/// Serializes page renders for one document and owns the visible surface
pub struct RenderPipeline {
    engine: Arc<dyn RenderEngine>,
    state: ViewerState,
    worker: Option<WorkerHandle>,
    document: Option<LoadedDocument>,
    next_request_id: u64,
    in_flight: Option<(RequestId, usize)>,
    completed: Option<Box<RenderedPage>>,
    view: Option<PageView>,
    page_indicator: String,
    scroll_offset: ScreenPoint,
    pending_scroll: Option<PendingScroll>,
}

impl RenderPipeline {
    #[must_use]
    pub fn new(engine: Arc<dyn RenderEngine>, initial_scale: f32, zoom: ZoomPolicy) -> Self {
        Self {
            engine,
            state: ViewerState::new(initial_scale, zoom),
            worker: None,
            document: None,
            next_request_id: 1,
            in_flight: None,
            completed: None,
            view: None,
            page_indicator: String::from("No document"),
            scroll_offset: ScreenPoint::default(),
            pending_scroll: None,
        }
    }

    /// Open a document and start rendering its first page.
    ///
    /// On failure the previous document, if any, stays loaded.
    pub fn load(&mut self, source: DocumentSource) -> Result<DocumentInfo, LoadError> {
        let info = self.engine.probe(&source)?;
        info!(
            "Opened {:?}: {} pages, title {:?}",
            source.path(),
            info.page_count,
            info.title
        );

        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();
        let engine = Arc::clone(&self.engine);
        let worker_source = source.clone();
        std::thread::Builder::new()
            .name("render-worker".to_string())
            .spawn(move || render_worker(engine, worker_source, request_rx, response_tx))?;

        if let Some(old) = self.worker.replace(WorkerHandle {
            request_tx,
            response_rx,
        }) {
            old.shutdown();
        }

        self.document = Some(LoadedDocument {
            info: info.clone(),
            _source: source,
        });
        self.in_flight = None;
        self.completed = None;
        self.view = None;
        self.scroll_offset = ScreenPoint::default();
        self.pending_scroll = None;

        let effects = self.state.apply(Command::Reset {
            page_count: info.page_count,
        });
        let events = self.execute(effects);
        for event in events {
            debug!("Load event: {event:?}");
        }

        Ok(info)
    }

    /// Apply a viewer command and run its effects
    pub fn apply_command(&mut self, cmd: Command) -> Vec<PipelineEvent> {
        let effects = self.state.apply(cmd);
        self.execute(effects)
    }

    pub fn request_render(&mut self, page: usize) -> Vec<PipelineEvent> {
        self.apply_command(Command::RequestRender(page))
    }

    pub fn next_page(&mut self) -> Vec<PipelineEvent> {
        self.apply_command(Command::NextPage)
    }

    pub fn prev_page(&mut self) -> Vec<PipelineEvent> {
        self.apply_command(Command::PrevPage)
    }

    pub fn go_to_page(&mut self, page: usize) -> Vec<PipelineEvent> {
        self.apply_command(Command::GoToPage(page))
    }

    pub fn zoom_in(&mut self) -> Vec<PipelineEvent> {
        self.apply_command(Command::ZoomIn)
    }

    pub fn zoom_out(&mut self) -> Vec<PipelineEvent> {
        self.apply_command(Command::ZoomOut)
    }

    /// Show `page` and scroll to `target` once that page is on the surface
    pub fn navigate_to(&mut self, page: usize, target: PagePoint) -> Vec<PipelineEvent> {
        if !self.state.has_document() {
            return vec![];
        }

        let page_count = self.state.page_count;
        if page == 0 || page > page_count {
            warn!("Cannot navigate to page {page}, document has {page_count}");
            self.pending_scroll = None;
            return vec![PipelineEvent::OutOfRange { page, page_count }];
        }

        let pending = PendingScroll { page, target };

        if page != self.state.current_page {
            self.pending_scroll = Some(pending);
            return self.apply_command(Command::GoToPage(page));
        }

        let presented = self.view.as_ref().is_some_and(|v| v.page == page);
        if presented && !self.state.render_in_flight {
            self.pending_scroll = None;
            return self.scroll_to(pending).into_iter().collect();
        }

        self.pending_scroll = Some(pending);
        vec![]
    }

    /// Map a selection on the surface into page-space at the current scale
    pub fn selection_origin(
        &self,
        rect: &ScreenRect,
        surface: ScreenPoint,
    ) -> Result<PagePoint, GeometryError> {
        to_page_space(rect, surface, self.state.scale)
    }

    /// Drain completed renders without blocking
    pub fn poll(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        loop {
            let response = match &self.worker {
                Some(worker) => worker.response_rx.try_recv().ok(),
                None => None,
            };
            let Some(response) = response else {
                break;
            };
            events.extend(self.handle_response(response));
        }
        events
    }

    /// Block until no render is in flight or `timeout` elapses
    pub fn wait_idle(&mut self, timeout: Duration) -> Vec<PipelineEvent> {
        let deadline = Instant::now() + timeout;
        let mut events = self.poll();

        while self.state.render_in_flight {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("Timed out waiting for render of {:?}", self.in_flight);
                break;
            }
            let received = match &self.worker {
                Some(worker) => worker.response_rx.recv_timeout(remaining).ok(),
                None => None,
            };
            match received {
                Some(response) => events.extend(self.handle_response(response)),
                None => break,
            }
        }

        events
    }

    fn handle_response(&mut self, response: RenderResponse) -> Vec<PipelineEvent> {
        match response {
            RenderResponse::Page { id, rendered } => {
                if !self.is_in_flight(id) {
                    debug!("Ignoring stale render response {id:?}");
                    return vec![];
                }
                self.in_flight = None;
                let page = rendered.page;
                debug!("Render of page {page} finished");
                self.completed = Some(rendered);
                let effects = self.state.apply(Command::RenderFinished { page });
                self.execute(effects)
            }

            RenderResponse::Error { id, page, error } => {
                if !self.is_in_flight(id) {
                    return vec![];
                }
                self.in_flight = None;
                warn!("Render of page {page} failed: {error}");
                let mut events = vec![PipelineEvent::Failed {
                    page,
                    error: error.to_string(),
                }];
                let effects = self.state.apply(Command::RenderFailed { page });
                events.extend(self.execute(effects));
                events
            }
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) -> Vec<PipelineEvent> {
        let mut queue: VecDeque<Effect> = effects.into();
        let mut events = Vec::new();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Dispatch { page, scale } => {
                    // optimistic: reflects the requested page before it is drawn
                    self.page_indicator = format!("Page {page} of {}", self.state.page_count);
                    if let Err(error) = self.dispatch(page, scale) {
                        warn!("Could not dispatch render of page {page}: {error}");
                        events.push(PipelineEvent::Failed {
                            page,
                            error: error.to_string(),
                        });
                        queue.extend(self.state.apply(Command::RenderFailed { page }));
                    }
                }

                Effect::Present { page } => {
                    if let Some(rendered) = self.completed.take() {
                        self.install(*rendered);
                        events.push(PipelineEvent::Presented { page });
                        if let Some(event) = self.apply_pending_scroll(page) {
                            events.push(event);
                        }
                    }
                }

                Effect::Superseded { page } => {
                    self.completed = None;
                    debug!("Render of page {page} superseded by a pending request");
                    events.push(PipelineEvent::Superseded { page });
                }
            }
        }

        events
    }

    fn dispatch(&mut self, page: usize, scale: f32) -> Result<(), RenderError> {
        let worker = self.worker.as_ref().ok_or(RenderError::Disconnected)?;
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;

        worker
            .request_tx
            .send(RenderRequest::Page { id, page, scale })
            .map_err(|_| RenderError::Disconnected)?;

        debug!("Dispatched render {id:?} for page {page} at scale {scale:.3}");
        self.in_flight = Some((id, page));
        Ok(())
    }

    fn install(&mut self, rendered: RenderedPage) {
        let overlay = TextOverlay::build(&rendered.text, &rendered.viewport);
        if self.view.as_ref().is_none_or(|v| v.page != rendered.page) {
            self.scroll_offset = ScreenPoint::default();
        }
        self.view = Some(PageView {
            page: rendered.page,
            viewport: rendered.viewport,
            surface: rendered.surface,
            overlay,
        });
    }

    fn apply_pending_scroll(&mut self, page: usize) -> Option<PipelineEvent> {
        let pending = self.pending_scroll?;
        if pending.page != page {
            return None;
        }
        self.pending_scroll = None;
        self.scroll_to(pending)
    }

    fn scroll_to(&mut self, pending: PendingScroll) -> Option<PipelineEvent> {
        let scale = self.view.as_ref()?.viewport.scale;
        match to_screen_space(pending.target, scale) {
            Ok(offset) => {
                self.scroll_offset = offset;
                Some(PipelineEvent::Scrolled { offset })
            }
            Err(e) => {
                warn!("Cannot scroll to {:?}: {e}", pending.target);
                None
            }
        }
    }

    fn is_in_flight(&self, id: RequestId) -> bool {
        matches!(self.in_flight, Some((current, _)) if current == id)
    }

    #[must_use]
    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    #[must_use]
    pub fn document_info(&self) -> Option<&DocumentInfo> {
        self.document.as_ref().map(|d| &d.info)
    }

    #[must_use]
    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.state.current_page
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.state.scale
    }

    #[must_use]
    pub fn page_indicator(&self) -> &str {
        &self.page_indicator
    }

    #[must_use]
    pub fn view(&self) -> Option<&PageView> {
        self.view.as_ref()
    }

    #[must_use]
    pub fn scroll_offset(&self) -> ScreenPoint {
        self.scroll_offset
    }

    /// Scroll by whole pixels, clamped to the surface
    pub fn scroll_by(&mut self, dy: f32) {
        let max_y = self.view.as_ref().map_or(0.0, |v| v.viewport.height());
        self.scroll_offset.y = (self.scroll_offset.y + dy).clamp(0.0, max_y.max(0.0));
    }

    pub fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
