//! Terminal application: tabs, input modes and the main loop

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use flume::{Receiver, Sender};
use log::{debug, info, warn};
use ratatui::Terminal;

use crate::annotations::{AnnotationId, Selection};
use crate::backend::{Backend, BackendError, SaveAnnotationsRequest, UploadFile, UploadReceipt};
use crate::event_source::EventSource;
use crate::geometry::{ScreenPoint, ScreenRect};
use crate::notification::AlertQueue;
use crate::session::{Session, upload_and_fetch};
use crate::ui;
use crate::viewer::PipelineEvent;

/// Rows taken by the tab bar, borders and footer
const CHROME_ROWS: u16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Query,
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerFocus {
    Document,
    Annotations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    OpenPath,
    EditText(AnnotationId),
    EditComment(AnnotationId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
}

#[derive(Debug)]
enum NetworkJob {
    Ask(String),
    Upload(UploadFile),
    Save(SaveAnnotationsRequest),
}

/// Result of a backend call made off the UI thread
#[derive(Debug)]
pub enum NetworkOutcome {
    Answer {
        query: String,
        result: Result<String, BackendError>,
    },
    Uploaded {
        name: String,
        result: Result<(UploadReceipt, Vec<u8>), BackendError>,
    },
    Saved(Result<usize, BackendError>),
}

fn run_job(backend: &dyn Backend, job: NetworkJob) -> NetworkOutcome {
    match job {
        NetworkJob::Ask(query) => {
            let result = backend.ask(&query);
            NetworkOutcome::Answer { query, result }
        }
        NetworkJob::Upload(file) => NetworkOutcome::Uploaded {
            result: upload_and_fetch(backend, &file),
            name: file.name,
        },
        NetworkJob::Save(payload) => NetworkOutcome::Saved(
            backend
                .save_annotations(&payload)
                .map(|()| payload.annotations.len()),
        ),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AppOptions {
    /// After each input, wait up to this long for the render it triggered
    pub render_wait: Option<Duration>,
    /// Run backend calls on the UI thread instead of a background thread
    pub inline_network: bool,
}

/// Turn dropped or typed text into a path: first line, quotes and `file://`
/// stripped
#[must_use]
pub fn parse_dropped_path(text: &str) -> Option<PathBuf> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let unquoted = line
        .strip_prefix('"')
        .and_then(|l| l.strip_suffix('"'))
        .or_else(|| line.strip_prefix('\'').and_then(|l| l.strip_suffix('\'')))
        .unwrap_or(line);
    let path = unquoted.strip_prefix("file://").unwrap_or(unquoted);
    let path = path.replace("\\ ", " ");
    if path.is_empty() {
        None
    } else {
        Some(PathBuf::from(path))
    }
}

pub struct App {
    pub(crate) session: Session,
    pub(crate) tab: Tab,
    pub(crate) focus: ViewerFocus,
    pub(crate) mode: InputMode,
    /// Buffer of the path prompt or annotation editor
    pub(crate) input: String,
    pub(crate) query_input: String,
    /// Overlay line under the cursor
    pub(crate) cursor: usize,
    pub(crate) anchor: Option<usize>,
    pub(crate) list_selected: usize,
    pub(crate) alerts: AlertQueue,
    pub(crate) status: String,
    pub(crate) pending_jobs: usize,
    pub(crate) visible_rows: usize,
    shown_page: Option<usize>,
    outcome_tx: Sender<NetworkOutcome>,
    outcome_rx: Receiver<NetworkOutcome>,
    options: AppOptions,
}

impl App {
    pub fn new(session: Session, options: AppOptions) -> Self {
        let (outcome_tx, outcome_rx) = flume::unbounded();
        Self {
            session,
            tab: Tab::Viewer,
            focus: ViewerFocus::Document,
            mode: InputMode::Normal,
            input: String::new(),
            query_input: String::new(),
            cursor: 0,
            anchor: None,
            list_selected: 0,
            alerts: AlertQueue::new(),
            status: String::new(),
            pending_jobs: 0,
            visible_rows: 20,
            shown_page: None,
            outcome_tx,
            outcome_rx,
            options,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn alerts(&self) -> &AlertQueue {
        &self.alerts
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn focus(&self) -> ViewerFocus {
        self.focus
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn pending_jobs(&self) -> usize {
        self.pending_jobs
    }

    /// Open a local document without going through the backend
    pub fn open_local(&mut self, path: &Path) {
        match self.session.load(path) {
            Ok(info) => {
                self.document_opened(&path.display().to_string(), info.page_count);
                self.settle_renders(vec![]);
            }
            Err(e) => {
                warn!("Could not open {path:?}: {e}");
                self.alerts.error(format!("Could not load document: {e}"));
            }
        }
    }

    fn document_opened(&mut self, name: &str, page_count: usize) {
        info!("Viewing {name} ({page_count} pages)");
        self.status = format!("Opened {name} ({page_count} pages)");
        self.tab = Tab::Viewer;
        self.focus = ViewerFocus::Document;
        self.cursor = 0;
        self.anchor = None;
        self.shown_page = None;
    }

    pub fn handle_event(&mut self, event: &Event) -> Option<AppAction> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(*key),
            Event::Paste(text) => {
                self.handle_paste(text);
                None
            }
            _ => None,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<AppAction> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('q') {
            return Some(AppAction::Quit);
        }

        if self.alerts.is_blocking() {
            self.alerts.dismiss_current();
            return None;
        }

        if self.mode != InputMode::Normal {
            self.handle_input_key(key);
            return None;
        }

        match key.code {
            KeyCode::F(1) => {
                self.tab = Tab::Query;
                return None;
            }
            KeyCode::F(2) => {
                self.tab = Tab::Viewer;
                return None;
            }
            KeyCode::Tab => {
                self.tab = match self.tab {
                    Tab::Query => Tab::Viewer,
                    Tab::Viewer => Tab::Query,
                };
                return None;
            }
            _ => {}
        }

        match self.tab {
            Tab::Query => {
                self.handle_query_key(key);
                None
            }
            Tab::Viewer => match self.focus {
                ViewerFocus::Document => self.handle_document_key(key),
                ViewerFocus::Annotations => self.handle_list_key(key),
            },
        }
    }

    fn handle_paste(&mut self, text: &str) {
        if self.alerts.is_blocking() {
            return;
        }
        if self.mode != InputMode::Normal {
            self.input.push_str(text.trim_end_matches(['\r', '\n']));
            return;
        }
        match self.tab {
            Tab::Query => self.query_input.push_str(text),
            Tab::Viewer => match parse_dropped_path(text) {
                Some(path) => {
                    debug!("File dropped: {path:?}");
                    self.submit_upload(&path);
                }
                None => self.status = "Nothing to open in the dropped text".to_string(),
            },
        }
    }

    fn handle_query_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Enter => self.submit_query(),
            KeyCode::Backspace => {
                self.query_input.pop();
            }
            KeyCode::Esc => self.query_input.clear(),
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.query_input.push(c);
            }
            _ => {}
        }
    }

    fn handle_document_key(&mut self, key: KeyEvent) -> Option<AppAction> {
        let events = match key.code {
            KeyCode::Char('q') => return Some(AppAction::Quit),
            KeyCode::Char('n') | KeyCode::Right | KeyCode::PageDown => {
                self.session.pipeline_mut().next_page()
            }
            KeyCode::Char('p') | KeyCode::Left | KeyCode::PageUp => {
                self.session.pipeline_mut().prev_page()
            }
            KeyCode::Char('+' | '=') => self.session.pipeline_mut().zoom_in(),
            KeyCode::Char('-') => self.session.pipeline_mut().zoom_out(),
            KeyCode::Char('j') | KeyCode::Down => {
                self.move_cursor(1);
                vec![]
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.move_cursor(-1);
                vec![]
            }
            KeyCode::Char('v') => {
                self.anchor = match self.anchor {
                    Some(_) => None,
                    None => Some(self.cursor),
                };
                vec![]
            }
            KeyCode::Esc => {
                self.anchor = None;
                vec![]
            }
            KeyCode::Char('a') => {
                self.annotate_selection();
                vec![]
            }
            KeyCode::Char('b') => {
                self.add_blank();
                vec![]
            }
            KeyCode::Char('s') => {
                self.save();
                vec![]
            }
            KeyCode::Char('l') => {
                self.focus = ViewerFocus::Annotations;
                vec![]
            }
            KeyCode::Char('o') => {
                self.mode = InputMode::OpenPath;
                self.input.clear();
                vec![]
            }
            _ => return None,
        };
        self.settle_renders(events);
        None
    }

    fn handle_list_key(&mut self, key: KeyEvent) -> Option<AppAction> {
        let count = self.session.annotations().len();
        let selected = self
            .session
            .annotations()
            .all()
            .get(self.list_selected)
            .map(|a| (a.id, a.text.clone(), a.comment.clone()));

        match key.code {
            KeyCode::Char('q') => return Some(AppAction::Quit),
            KeyCode::Char('j') | KeyCode::Down => {
                if self.list_selected + 1 < count {
                    self.list_selected += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.list_selected = self.list_selected.saturating_sub(1);
            }
            KeyCode::Char('l') | KeyCode::Esc => self.focus = ViewerFocus::Document,
            KeyCode::Char('b') => self.add_blank(),
            KeyCode::Char('s') => self.save(),
            KeyCode::Enter => {
                if let Some((id, _, _)) = selected {
                    match self.session.navigate_to(id) {
                        Ok(events) => self.settle_renders(events),
                        Err(e) => self.alerts.error(e.to_string()),
                    }
                }
            }
            KeyCode::Char('e') => {
                if let Some((id, text, _)) = selected {
                    self.mode = InputMode::EditText(id);
                    self.input = text;
                }
            }
            KeyCode::Char('c') => {
                if let Some((id, _, comment)) = selected {
                    self.mode = InputMode::EditComment(id);
                    self.input = comment;
                }
            }
            KeyCode::Char('d') => {
                if let Some((id, _, _)) = selected {
                    match self.session.delete(id) {
                        Ok(deleted) => {
                            self.status = format!(
                                "Deleted \"{}\", {} highlight(s) removed",
                                deleted.annotation.text,
                                deleted.stripped.len()
                            );
                            let remaining = self.session.annotations().len();
                            self.list_selected =
                                self.list_selected.min(remaining.saturating_sub(1));
                        }
                        Err(e) => self.alerts.error(e.to_string()),
                    }
                }
            }
            _ => {}
        }
        None
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.mode = InputMode::Normal;
                self.input.clear();
            }
            KeyCode::Enter => self.commit_input(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.input.push(c);
            }
            _ => {}
        }
    }

    fn commit_input(&mut self) {
        let mode = std::mem::replace(&mut self.mode, InputMode::Normal);
        let value = std::mem::take(&mut self.input);
        let result = match mode {
            InputMode::Normal => Ok(()),
            InputMode::OpenPath => {
                match parse_dropped_path(&value) {
                    Some(path) => self.submit_upload(&path),
                    None => self.status = "No file given".to_string(),
                }
                Ok(())
            }
            InputMode::EditText(id) => self.session.edit_text(id, value),
            InputMode::EditComment(id) => self.session.edit_comment(id, value),
        };
        if let Err(e) = result {
            self.alerts.error(e.to_string());
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let Some(view) = self.session.pipeline().view() else {
            return;
        };
        let count = view.overlay.spans.len();
        if count == 0 {
            return;
        }
        self.cursor = self.cursor.saturating_add_signed(delta).min(count - 1);
        self.ensure_cursor_visible();
    }

    /// Index of the first overlay line shown, derived from the scroll offset
    pub(crate) fn top_line(&self) -> usize {
        let offset = self.session.pipeline().scroll_offset();
        self.session
            .pipeline()
            .view()
            .and_then(|v| v.overlay.span_at_or_below(offset.y))
            .unwrap_or(0)
    }

    fn ensure_cursor_visible(&mut self) {
        let rows = self.visible_rows.max(1);
        let top = self.top_line();
        let new_top = if self.cursor < top {
            self.cursor
        } else if self.cursor >= top + rows {
            self.cursor + 1 - rows
        } else {
            return;
        };

        let pipeline = self.session.pipeline_mut();
        let target = pipeline
            .view()
            .and_then(|v| v.overlay.spans.get(new_top))
            .map(|span| span.rect.top);
        if let Some(target) = target {
            let dy = target - pipeline.scroll_offset().y;
            pipeline.scroll_by(dy);
        }
    }

    /// The selected overlay lines, in visible-viewport coordinates
    fn current_selection(&self) -> Option<Selection> {
        let view = self.session.pipeline().view()?;
        let start = self.anchor.unwrap_or(self.cursor);
        let (text, rect) = view.overlay.selection(start, self.cursor)?;

        let scroll = self.session.pipeline().scroll_offset();
        Some(Selection {
            text,
            rect: ScreenRect {
                left: rect.left - scroll.x,
                top: rect.top - scroll.y,
                ..rect
            },
            surface: ScreenPoint::new(-scroll.x, -scroll.y),
        })
    }

    fn annotate_selection(&mut self) {
        let Some(selection) = self.current_selection() else {
            self.status = "No page text to select".to_string();
            return;
        };
        match self.session.select(&selection) {
            Ok(Some(id)) => {
                self.anchor = None;
                self.list_selected = self.session.annotations().len().saturating_sub(1);
                self.status = format!("Annotation {id} added");
            }
            Ok(None) => self.status = "Selection is empty".to_string(),
            Err(e) => self.alerts.error(e.to_string()),
        }
    }

    fn add_blank(&mut self) {
        let id = self.session.add_blank();
        self.list_selected = self.session.annotations().len().saturating_sub(1);
        self.status = format!("Annotation {id} added");
    }

    fn save(&mut self) {
        let payload = self.session.payload();
        self.status = format!("Saving {} annotation(s)...", payload.annotations.len());
        self.spawn(NetworkJob::Save(payload));
    }

    fn submit_query(&mut self) {
        let query = std::mem::take(&mut self.query_input);
        self.status = "Waiting for answer...".to_string();
        self.spawn(NetworkJob::Ask(query));
    }

    /// Check type and size, then upload in the background
    fn submit_upload(&mut self, path: &Path) {
        let max = self.session.config().max_upload_bytes;
        match UploadFile::from_path(path, max) {
            Ok(file) => {
                self.status = format!("Uploading {}...", file.name);
                self.spawn(NetworkJob::Upload(file));
            }
            Err(e) => {
                warn!("Rejected {path:?}: {e}");
                self.alerts.error(e.to_string());
            }
        }
    }

    fn spawn(&mut self, job: NetworkJob) {
        let backend = self.session.backend();
        self.pending_jobs += 1;

        if self.options.inline_network {
            let outcome = run_job(backend.as_ref(), job);
            self.pending_jobs -= 1;
            self.apply_outcome(outcome);
            return;
        }

        let tx = self.outcome_tx.clone();
        let spawned = std::thread::Builder::new()
            .name("backend-call".to_string())
            .spawn(move || {
                let _ = tx.send(run_job(backend.as_ref(), job));
            });
        if let Err(e) = spawned {
            self.pending_jobs -= 1;
            self.alerts.error(format!("Could not start request: {e}"));
        }
    }

    fn apply_outcome(&mut self, outcome: NetworkOutcome) {
        match outcome {
            NetworkOutcome::Answer { query, result } => match result {
                Ok(response) => {
                    self.session.query_log_mut().record(query, response);
                    self.status = "Answer received".to_string();
                }
                Err(e) => {
                    warn!("Query failed: {e}");
                    self.status.clear();
                    self.alerts.error(e.to_string());
                }
            },

            NetworkOutcome::Uploaded { name, result } => match result {
                Ok((receipt, bytes)) => match self.session.load_bytes(&bytes) {
                    Ok(info) => {
                        let shown = receipt.filename.unwrap_or(name);
                        self.document_opened(&shown, info.page_count);
                        self.settle_renders(vec![]);
                    }
                    Err(e) => {
                        self.status.clear();
                        self.alerts.error(format!("Could not load document: {e}"));
                    }
                },
                Err(e) => {
                    self.status.clear();
                    self.alerts.error(e.to_string());
                }
            },

            NetworkOutcome::Saved(result) => match result {
                Ok(count) => {
                    self.status = format!("Saved {count} annotation(s)");
                    self.alerts.info("Annotations saved successfully!");
                }
                Err(e) => {
                    self.status.clear();
                    self.alerts.error(e.to_string());
                }
            },
        }
    }

    /// Apply finished backend calls; true if any arrived
    pub fn poll_network(&mut self) -> bool {
        let mut any = false;
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.pending_jobs = self.pending_jobs.saturating_sub(1);
            self.apply_outcome(outcome);
            any = true;
        }
        any
    }

    /// Block until background calls finish or `timeout` elapses
    pub fn wait_for_network(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while self.pending_jobs > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.outcome_rx.recv_timeout(remaining) {
                Ok(outcome) => {
                    self.pending_jobs -= 1;
                    self.apply_outcome(outcome);
                }
                Err(_) => {
                    warn!("Gave up waiting for {} backend call(s)", self.pending_jobs);
                    break;
                }
            }
        }
    }

    /// Apply finished renders; true if any arrived
    pub fn poll_renders(&mut self) -> bool {
        let events = self.session.poll();
        let any = !events.is_empty();
        self.handle_pipeline_events(events);
        any
    }

    fn settle_renders(&mut self, events: Vec<PipelineEvent>) {
        self.handle_pipeline_events(events);
        if let Some(wait) = self.options.render_wait {
            let events = self.session.wait_idle(wait);
            self.handle_pipeline_events(events);
        }
    }

    fn handle_pipeline_events(&mut self, events: Vec<PipelineEvent>) {
        for event in events {
            match event {
                PipelineEvent::Presented { page } => {
                    let lines = self
                        .session
                        .pipeline()
                        .view()
                        .map_or(0, |v| v.overlay.spans.len());
                    if self.shown_page != Some(page) {
                        self.cursor = 0;
                        self.anchor = None;
                        self.shown_page = Some(page);
                    }
                    self.cursor = self.cursor.min(lines.saturating_sub(1));
                    debug!("Page {page} on screen with {lines} text lines");
                }
                PipelineEvent::Scrolled { offset } => {
                    self.cursor = self
                        .session
                        .pipeline()
                        .view()
                        .and_then(|v| v.overlay.span_at_or_below(offset.y))
                        .unwrap_or(0);
                }
                PipelineEvent::Failed { page, error } => {
                    self.alerts
                        .error(format!("Could not render page {page}: {error}"));
                }
                PipelineEvent::OutOfRange { page, page_count } => {
                    self.alerts.error(format!(
                        "Page {page} is not in this document ({page_count} pages)"
                    ));
                }
                PipelineEvent::Superseded { page } => {
                    debug!("Render of page {page} was superseded");
                }
            }
        }
    }
}

pub fn run_app_with_event_source<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    event_source: &mut dyn EventSource,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    let tick_rate = Duration::from_millis(50);
    let mut first_render = true;
    loop {
        let mut events_processed = 0;
        let mut should_quit = false;
        app.visible_rows = usize::from(terminal.size()?.height.saturating_sub(CHROME_ROWS));

        while event_source.poll(Duration::from_millis(0))? && events_processed < 50 {
            let event = event_source.read()?;
            events_processed += 1;
            if app.handle_event(&event) == Some(AppAction::Quit) {
                should_quit = true;
                break;
            }
        }

        let mut needs_redraw = events_processed > 0;
        if first_render {
            needs_redraw = true;
            first_render = false;
        }
        if app.poll_renders() {
            needs_redraw = true;
        }
        if app.poll_network() {
            needs_redraw = true;
        }

        if needs_redraw {
            terminal.draw(|f| ui::draw(f, app))?;
        }

        if should_quit {
            return Ok(());
        }

        if events_processed == 0 {
            let _ = event_source.poll(tick_rate);
        }
    }
}
