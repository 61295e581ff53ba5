//! Render worker - runs in a dedicated thread

use std::sync::Arc;

use flume::{Receiver, Sender};
use log::{debug, error};

use super::request::{RenderRequest, RenderResponse};
use crate::document::{DocumentSource, RenderEngine, RenderError, render_page};

/// Main worker function.
///
/// Opens its own document handle, then serves requests in order until it is
/// told to shut down or the request channel closes.
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn render_worker(
    engine: Arc<dyn RenderEngine>,
    source: DocumentSource,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
) {
    let mut renderer = match engine.open(&source) {
        Ok(r) => r,
        Err(e) => {
            error!("Render worker failed to open {:?}: {e}", source.path());
            fail_all(&requests, &responses, &e.to_string());
            return;
        }
    };

    for request in requests {
        match request {
            RenderRequest::Page { id, page, scale } => {
                debug!("Worker rendering page {page} at scale {scale:.3}");
                let response = match render_page(renderer.as_mut(), page, scale) {
                    Ok(rendered) => RenderResponse::Page {
                        id,
                        rendered: Box::new(rendered),
                    },
                    Err(error) => RenderResponse::Error { id, page, error },
                };
                if responses.send(response).is_err() {
                    break;
                }
            }

            RenderRequest::Shutdown => break,
        }
    }
}

/// Answer every request with the open error until shutdown
fn fail_all(requests: &Receiver<RenderRequest>, responses: &Sender<RenderResponse>, reason: &str) {
    for request in requests.iter() {
        match request {
            RenderRequest::Page { id, page, .. } => {
                let error = RenderError::engine(format!("could not open document: {reason}"));
                if responses.send(RenderResponse::Error { id, page, error }).is_err() {
                    break;
                }
            }
            RenderRequest::Shutdown => break,
        }
    }
}
