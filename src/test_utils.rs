pub mod test_helpers {
    use std::collections::{HashSet, VecDeque};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    use crate::app::{App, AppOptions};
    use crate::backend::{
        Backend, BackendError, SaveAnnotationsRequest, UploadFile, UploadReceipt,
    };
    use crate::document::{
        DocumentInfo, DocumentSource, LoadError, PageRenderer, RenderEngine, RenderError,
        Surface, TextLayout, TextLine, Viewport,
    };
    use crate::event_source::{Event, KeyCode, KeyModifiers, SimulatedEventSource};
    use crate::geometry::PageRect;
    use crate::session::{Session, SessionConfig};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    /// Bytes the fake engine accepts as a document
    pub const FAKE_PDF: &[u8] = b"%PDF-1.7\n% marginalia test fixture\n";

    pub const PAGE_WIDTH: f32 = 300.0;
    pub const PAGE_HEIGHT: f32 = 400.0;
    pub const LINE_HEIGHT: f32 = 14.0;

    /// Write a file the fake engine accepts
    pub fn write_fake_pdf(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, FAKE_PDF).unwrap();
        path
    }

    /// One page draw observed by the fake engine
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct RenderCall {
        pub page: usize,
        pub scale: f32,
    }

    #[derive(Clone, Debug)]
    struct FakeDocument {
        pages: Vec<Vec<TextLine>>,
        failing_pages: HashSet<usize>,
        fail_open: bool,
        render_delay: Option<Duration>,
    }

    /// Scripted render engine.
    ///
    /// Accepts any source starting with `%PDF`. Every page is 300x400 with
    /// text lines `Page N line i` unless overridden.
    #[derive(Clone)]
    pub struct FakeEngine {
        document: FakeDocument,
        calls: Arc<Mutex<Vec<RenderCall>>>,
    }

    impl FakeEngine {
        pub fn new(page_count: usize) -> Self {
            let pages = (1..=page_count)
                .map(|page| default_lines(page, 5))
                .collect();
            Self {
                document: FakeDocument {
                    pages,
                    failing_pages: HashSet::new(),
                    fail_open: false,
                    render_delay: None,
                },
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// Replace the text of `page` (1-based) with lines at the given bounds
        pub fn with_page_text(mut self, page: usize, lines: Vec<(&str, PageRect)>) -> Self {
            self.document.pages[page - 1] = lines
                .into_iter()
                .map(|(text, bounds)| TextLine {
                    text: text.to_string(),
                    bounds,
                })
                .collect();
            self
        }

        pub fn with_lines_per_page(mut self, count: usize) -> Self {
            for (idx, page) in self.document.pages.iter_mut().enumerate() {
                *page = default_lines(idx + 1, count);
            }
            self
        }

        pub fn failing_page(mut self, page: usize) -> Self {
            self.document.failing_pages.insert(page);
            self
        }

        /// Probing succeeds but the worker cannot open the document
        pub fn failing_open(mut self) -> Self {
            self.document.fail_open = true;
            self
        }

        pub fn with_render_delay(mut self, delay: Duration) -> Self {
            self.document.render_delay = Some(delay);
            self
        }

        pub fn calls(&self) -> Vec<RenderCall> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn rendered_pages(&self) -> Vec<usize> {
            self.calls().iter().map(|c| c.page).collect()
        }
    }

    fn default_lines(page: usize, count: usize) -> Vec<TextLine> {
        (0..count)
            .map(|i| {
                let y0 = 20.0 + i as f32 * LINE_HEIGHT * 2.0;
                TextLine {
                    text: format!("Page {page} line {i}"),
                    bounds: PageRect {
                        x0: 20.0,
                        y0,
                        x1: 220.0,
                        y1: y0 + LINE_HEIGHT,
                    },
                }
            })
            .collect()
    }

    impl RenderEngine for FakeEngine {
        fn probe(&self, source: &DocumentSource) -> Result<DocumentInfo, LoadError> {
            let bytes = std::fs::read(source.path())?;
            if !bytes.starts_with(b"%PDF") {
                return Err(LoadError::Invalid("missing %PDF header".to_string()));
            }
            if self.document.pages.is_empty() {
                return Err(LoadError::Empty);
            }
            Ok(DocumentInfo {
                page_count: self.document.pages.len(),
                title: Some("Fake document".to_string()),
            })
        }

        fn open(&self, source: &DocumentSource) -> Result<Box<dyn PageRenderer>, LoadError> {
            if self.document.fail_open {
                return Err(LoadError::Invalid(format!(
                    "cannot open {}",
                    source.path().display()
                )));
            }
            Ok(Box::new(FakeRenderer {
                document: self.document.clone(),
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    struct FakeRenderer {
        document: FakeDocument,
        calls: Arc<Mutex<Vec<RenderCall>>>,
    }

    impl PageRenderer for FakeRenderer {
        fn page_count(&self) -> usize {
            self.document.pages.len()
        }

        fn viewport(&mut self, _page: usize, scale: f32) -> Result<Viewport, RenderError> {
            Ok(Viewport::new(PAGE_WIDTH, PAGE_HEIGHT, scale))
        }

        fn draw(&mut self, page: usize, viewport: &Viewport) -> Result<Surface, RenderError> {
            if let Some(delay) = self.document.render_delay {
                std::thread::sleep(delay);
            }
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(RenderCall {
                    page,
                    scale: viewport.scale,
                });
            if self.document.failing_pages.contains(&page) {
                return Err(RenderError::engine(format!("page {page} is damaged")));
            }
            let width_px = viewport.width().round() as u32;
            let height_px = viewport.height().round() as u32;
            Ok(Surface {
                width_px,
                height_px,
                pixels: vec![255; (width_px * height_px * 3) as usize],
            })
        }

        fn text_layout(&mut self, page: usize) -> Result<TextLayout, RenderError> {
            Ok(TextLayout {
                lines: self.document.pages[page - 1].clone(),
            })
        }
    }

    /// A backend call observed by `RecordingBackend`
    #[derive(Clone, Debug, PartialEq)]
    pub enum BackendCall {
        Ask(String),
        Upload { name: String, mime: String, size: usize },
        FetchDocument,
        Save(SaveAnnotationsRequest),
    }

    /// In-memory backend that records every call.
    ///
    /// Uploaded bytes are served back by `fetch_document`, like the real
    /// backend session does.
    #[derive(Default)]
    pub struct RecordingBackend {
        calls: Mutex<Vec<BackendCall>>,
        answers: Mutex<VecDeque<Result<String, String>>>,
        document: Mutex<Option<Vec<u8>>>,
        save_error: Option<String>,
        upload_error: Option<String>,
    }

    impl RecordingBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the answer to the next query
        pub fn with_answer(self, answer: &str) -> Self {
            self.answers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(Ok(answer.to_string()));
            self
        }

        /// Queue a server error for the next query
        pub fn with_query_error(self, message: &str) -> Self {
            self.answers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(Err(message.to_string()));
            self
        }

        pub fn failing_saves(mut self, message: &str) -> Self {
            self.save_error = Some(message.to_string());
            self
        }

        pub fn failing_uploads(mut self, message: &str) -> Self {
            self.upload_error = Some(message.to_string());
            self
        }

        pub fn calls(&self) -> Vec<BackendCall> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn saved_payloads(&self) -> Vec<SaveAnnotationsRequest> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    BackendCall::Save(payload) => Some(payload),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: BackendCall) {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call);
        }
    }

    impl Backend for RecordingBackend {
        fn ask(&self, query: &str) -> Result<String, BackendError> {
            self.record(BackendCall::Ask(query.to_string()));
            let scripted = self
                .answers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match scripted {
                Some(Ok(answer)) => Ok(answer),
                Some(Err(message)) => Err(BackendError::Server(message)),
                None => Ok(format!("Answer to: {query}")),
            }
        }

        fn upload(&self, file: &UploadFile) -> Result<UploadReceipt, BackendError> {
            self.record(BackendCall::Upload {
                name: file.name.clone(),
                mime: file.mime.clone(),
                size: file.bytes.len(),
            });
            if let Some(message) = &self.upload_error {
                return Err(BackendError::Server(message.clone()));
            }
            *self.document.lock().unwrap_or_else(PoisonError::into_inner) =
                Some(file.bytes.clone());
            Ok(UploadReceipt {
                filename: Some(file.name.clone()),
            })
        }

        fn fetch_document(&self) -> Result<Vec<u8>, BackendError> {
            self.record(BackendCall::FetchDocument);
            self.document
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
                .ok_or_else(|| BackendError::Server("No file uploaded".to_string()))
        }

        fn save_annotations(&self, payload: &SaveAnnotationsRequest) -> Result<(), BackendError> {
            self.record(BackendCall::Save(payload.clone()));
            match &self.save_error {
                Some(message) => Err(BackendError::Server(message.clone())),
                None => Ok(()),
            }
        }
    }

    pub fn test_session(engine: &FakeEngine, backend: &Arc<RecordingBackend>) -> Session {
        test_session_with(engine, backend, SessionConfig::default())
    }

    pub fn test_session_with(
        engine: &FakeEngine,
        backend: &Arc<RecordingBackend>,
        config: SessionConfig,
    ) -> Session {
        let backend: Arc<dyn Backend> = backend.clone();
        Session::new(Arc::new(engine.clone()), backend, config)
    }

    /// App that waits for renders and runs backend calls inline, so scripted
    /// key sequences see their results immediately
    pub fn test_app(engine: &FakeEngine, backend: &Arc<RecordingBackend>) -> App {
        App::new(
            test_session(engine, backend),
            AppOptions {
                render_wait: Some(Duration::from_secs(5)),
                inline_network: true,
            },
        )
    }

    /// Builder for creating test scenarios with simulated user input
    pub struct TestScenarioBuilder {
        events: Vec<Event>,
    }

    impl Default for TestScenarioBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestScenarioBuilder {
        pub fn new() -> Self {
            Self { events: Vec::new() }
        }

        pub fn press_char(mut self, c: char) -> Self {
            self.events.push(SimulatedEventSource::char_key(c));
            self
        }

        pub fn press_key(mut self, code: KeyCode) -> Self {
            self.events
                .push(SimulatedEventSource::key_event(code, KeyModifiers::empty()));
            self
        }

        pub fn press_enter(self) -> Self {
            self.press_key(KeyCode::Enter)
        }

        pub fn press_esc(self) -> Self {
            self.press_key(KeyCode::Esc)
        }

        pub fn press_tab(self) -> Self {
            self.press_key(KeyCode::Tab)
        }

        /// Type each character of `text`
        pub fn type_text(mut self, text: &str) -> Self {
            for c in text.chars() {
                self.events.push(SimulatedEventSource::char_key(c));
            }
            self
        }

        /// Bracketed paste, as a terminal sends for a dropped file
        pub fn paste(mut self, text: &str) -> Self {
            self.events.push(SimulatedEventSource::paste(text));
            self
        }

        pub fn next_page(self) -> Self {
            self.press_char('n')
        }

        pub fn prev_page(self) -> Self {
            self.press_char('p')
        }

        pub fn zoom_in(self) -> Self {
            self.press_char('+')
        }

        pub fn zoom_out(self) -> Self {
            self.press_char('-')
        }

        /// Move the line cursor down n times (press 'j' n times)
        pub fn cursor_down(mut self, times: usize) -> Self {
            for _ in 0..times {
                self.events.push(SimulatedEventSource::char_key('j'));
            }
            self
        }

        /// Quit the application (Ctrl+q)
        pub fn quit(mut self) -> Self {
            self.events.push(SimulatedEventSource::ctrl_char_key('q'));
            self
        }

        pub fn build(self) -> SimulatedEventSource {
            SimulatedEventSource::new(self.events)
        }
    }

    /// Create a test terminal for snapshot testing
    pub fn create_test_terminal(width: u16, height: u16) -> Terminal<TestBackend> {
        let backend = TestBackend::new(width, height);
        Terminal::new(backend).unwrap()
    }

    /// Capture the current terminal buffer as a string
    pub fn capture_terminal_state(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut lines = Vec::new();

        for y in 0..buffer.area.height {
            let mut line = String::new();
            for x in 0..buffer.area.width {
                line.push_str(buffer[(x, y)].symbol());
            }
            lines.push(line.trim_end().to_string());
        }

        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::*;

    #[test]
    fn test_scenario_builder() {
        let scenario = TestScenarioBuilder::new()
            .cursor_down(2)
            .press_char('v')
            .type_text("ab")
            .paste("/tmp/x.pdf")
            .press_tab()
            .quit()
            .build();

        assert_eq!(scenario.events.len(), 8);
    }

    #[test]
    fn fake_engine_rejects_non_pdf() {
        use crate::document::{DocumentSource, RenderEngine};

        let engine = FakeEngine::new(2);
        let ok = DocumentSource::from_bytes(FAKE_PDF).unwrap();
        assert_eq!(engine.probe(&ok).unwrap().page_count, 2);

        let bad = DocumentSource::from_bytes(b"hello").unwrap();
        assert!(engine.probe(&bad).is_err());
    }
}
