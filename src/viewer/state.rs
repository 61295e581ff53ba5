//! Viewer state management
//!
//! Pure state machine: commands go in, effects come out. The pipeline owns an
//! instance and executes the effects against the render worker.

/// Zoom step and bounds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZoomPolicy {
    /// Multiplier per zoom-in step (divisor per zoom-out step)
    pub step: f32,
    pub min_scale: f32,
    pub max_scale: f32,
}

impl ZoomPolicy {
    pub const DEFAULT_STEP: f32 = 1.2;
    pub const DEFAULT_MIN_SCALE: f32 = 0.25;
    pub const DEFAULT_MAX_SCALE: f32 = 8.0;

    /// Clamp factor to valid range, handling NaN/Inf
    #[must_use]
    pub fn clamp(&self, scale: f32) -> f32 {
        if !scale.is_finite() {
            1.0_f32.clamp(self.min_scale, self.max_scale)
        } else {
            scale.clamp(self.min_scale, self.max_scale)
        }
    }
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self {
            step: Self::DEFAULT_STEP,
            min_scale: Self::DEFAULT_MIN_SCALE,
            max_scale: Self::DEFAULT_MAX_SCALE,
        }
    }
}

/// Current viewer state for a document
#[derive(Clone, Debug)]
pub struct ViewerState {
    /// Current page (1-based)
    pub current_page: usize,

    /// Total page count, 0 when no document is loaded
    pub page_count: usize,

    /// Zoom scale (1.0 = page-space pixels)
    pub scale: f32,

    /// A render is running on the worker
    pub render_in_flight: bool,

    /// Latest page requested while a render was in flight
    pub pending_page: Option<usize>,

    zoom: ZoomPolicy,
}

/// Commands that modify viewer state
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// A new document was opened
    Reset { page_count: usize },
    /// Render a page, coalescing with any in-flight render
    RequestRender(usize),
    /// The worker finished rendering a page
    RenderFinished { page: usize },
    /// The worker failed to render a page
    RenderFailed { page: usize },
    NextPage,
    PrevPage,
    GoToPage(usize),
    ZoomIn,
    ZoomOut,
}

/// Side effects the pipeline must perform
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Send a render request to the worker
    Dispatch { page: usize, scale: f32 },
    /// Install the finished render as the visible surface
    Present { page: usize },
    /// A finished render was overtaken by a pending request
    Superseded { page: usize },
}

impl ViewerState {
    #[must_use]
    pub fn new(scale: f32, zoom: ZoomPolicy) -> Self {
        Self {
            current_page: 1,
            page_count: 0,
            scale: zoom.clamp(scale),
            render_in_flight: false,
            pending_page: None,
            zoom,
        }
    }

    #[must_use]
    pub fn zoom_policy(&self) -> ZoomPolicy {
        self.zoom
    }

    #[must_use]
    pub fn has_document(&self) -> bool {
        self.page_count > 0
    }

    /// "Page {current} of {total}"
    #[must_use]
    pub fn page_indicator(&self) -> String {
        format!("Page {} of {}", self.current_page, self.page_count)
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::Reset { page_count } => {
                self.page_count = page_count;
                self.current_page = 1;
                self.pending_page = None;
                self.render_in_flight = false;
                self.request_render(1)
            }

            Command::RequestRender(page) => self.request_render(page),

            Command::RenderFinished { page } => {
                self.render_in_flight = false;
                match self.pending_page.take() {
                    Some(next) => {
                        let mut effects = vec![Effect::Superseded { page }];
                        effects.extend(self.request_render(next));
                        effects
                    }
                    None => vec![Effect::Present { page }],
                }
            }

            Command::RenderFailed { .. } => {
                self.render_in_flight = false;
                match self.pending_page.take() {
                    Some(next) => self.request_render(next),
                    None => vec![],
                }
            }

            Command::NextPage => {
                if !self.has_document() || self.current_page >= self.page_count {
                    return vec![];
                }
                self.current_page += 1;
                self.request_render(self.current_page)
            }

            Command::PrevPage => {
                if !self.has_document() || self.current_page <= 1 {
                    return vec![];
                }
                self.current_page -= 1;
                self.request_render(self.current_page)
            }

            Command::GoToPage(page) => {
                if !self.has_document() {
                    return vec![];
                }
                let clamped = page.clamp(1, self.page_count);
                if clamped == self.current_page {
                    return vec![];
                }
                self.current_page = clamped;
                self.request_render(clamped)
            }

            Command::ZoomIn => self.set_scale(self.scale * self.zoom.step),

            Command::ZoomOut => self.set_scale(self.scale / self.zoom.step),
        }
    }

    fn set_scale(&mut self, scale: f32) -> Vec<Effect> {
        let clamped = self.zoom.clamp(scale);
        if (self.scale - clamped).abs() <= f32::EPSILON {
            return vec![];
        }
        self.scale = clamped;
        if !self.has_document() {
            return vec![];
        }
        self.request_render(self.current_page)
    }

    fn request_render(&mut self, page: usize) -> Vec<Effect> {
        if self.render_in_flight {
            self.pending_page = Some(page);
            vec![]
        } else {
            self.render_in_flight = true;
            vec![Effect::Dispatch {
                page,
                scale: self.scale,
            }]
        }
    }
}
