//! Page viewer: state, render worker and surface

mod overlay;
mod pipeline;
mod request;
mod state;
mod worker;

pub use overlay::{OverlaySpan, TextOverlay};
pub use pipeline::{PageView, PipelineEvent, RenderPipeline};
pub use request::{RenderRequest, RenderResponse, RequestId};
pub use state::{Command, Effect, ViewerState, ZoomPolicy};
