pub mod annotations;
pub mod app;
pub mod backend;
pub mod document;
pub mod event_source;
pub mod geometry;
pub mod notification;
pub mod panic_handler;
pub mod session;
pub mod settings;
pub mod ui;
pub mod viewer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export main app components
pub use app::{App, AppAction, AppOptions, run_app_with_event_source};
pub use session::{Session, SessionConfig};
