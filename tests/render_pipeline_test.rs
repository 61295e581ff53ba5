use std::sync::Arc;
use std::time::Duration;

use marginalia::document::{DocumentSource, LoadError};
use marginalia::geometry::{PagePoint, ScreenPoint};
use marginalia::test_utils::test_helpers::{FAKE_PDF, FakeEngine, RenderCall};
use marginalia::viewer::{PipelineEvent, RenderPipeline, ZoomPolicy};

const WAIT: Duration = Duration::from_secs(5);

fn pipeline(engine: &FakeEngine, scale: f32) -> RenderPipeline {
    RenderPipeline::new(Arc::new(engine.clone()), scale, ZoomPolicy::default())
}

fn load(pipeline: &mut RenderPipeline) {
    let source = DocumentSource::from_bytes(FAKE_PDF).unwrap();
    pipeline.load(source).unwrap();
}

#[test]
fn rapid_requests_render_first_then_last() {
    let engine = FakeEngine::new(10).with_render_delay(Duration::from_millis(30));
    let mut pipeline = pipeline(&engine, 1.0);
    load(&mut pipeline);
    assert!(pipeline.state().render_in_flight);

    for page in [3, 4, 9, 2, 6] {
        assert!(pipeline.request_render(page).is_empty());
    }

    let events = pipeline.wait_idle(WAIT);

    assert_eq!(engine.rendered_pages(), vec![1, 6]);
    assert_eq!(
        events,
        vec![
            PipelineEvent::Superseded { page: 1 },
            PipelineEvent::Presented { page: 6 },
        ]
    );
    assert_eq!(pipeline.view().unwrap().page, 6);
    assert!(!pipeline.state().render_in_flight);
    assert_eq!(pipeline.state().pending_page, None);
}

#[test]
fn page_boundaries_are_noops() {
    let engine = FakeEngine::new(3);
    let mut pipeline = pipeline(&engine, 1.0);
    load(&mut pipeline);
    pipeline.wait_idle(WAIT);

    assert!(pipeline.prev_page().is_empty());
    assert_eq!(pipeline.current_page(), 1);

    pipeline.go_to_page(3);
    pipeline.wait_idle(WAIT);
    assert!(pipeline.next_page().is_empty());
    assert!(!pipeline.state().render_in_flight);
    assert_eq!(pipeline.current_page(), 3);

    assert_eq!(engine.rendered_pages(), vec![1, 3]);
}

#[test]
fn zoomed_scale_carries_to_next_page() {
    let engine = FakeEngine::new(3);
    let mut pipeline = pipeline(&engine, 1.5);
    load(&mut pipeline);
    pipeline.wait_idle(WAIT);

    pipeline.zoom_in();
    pipeline.wait_idle(WAIT);
    assert!((pipeline.scale() - 1.8).abs() < 1e-4);

    pipeline.go_to_page(2);
    pipeline.wait_idle(WAIT);

    let view = pipeline.view().unwrap();
    assert_eq!(view.page, 2);
    assert!((view.viewport.scale - 1.8).abs() < 1e-4);

    let calls = engine.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], RenderCall { page: 1, scale: 1.5 });
    assert_eq!(calls[1].page, 1);
    assert_eq!(calls[2].page, 2);
    assert!((calls[2].scale - 1.8).abs() < 1e-4);
}

#[test]
fn zoom_is_clamped() {
    let engine = FakeEngine::new(1);
    let zoom = ZoomPolicy {
        step: 2.0,
        min_scale: 0.5,
        max_scale: 2.0,
    };
    let mut pipeline = RenderPipeline::new(Arc::new(engine.clone()), 1.0, zoom);
    load(&mut pipeline);
    pipeline.wait_idle(WAIT);

    pipeline.zoom_in();
    pipeline.wait_idle(WAIT);
    assert_eq!(pipeline.scale(), 2.0);
    assert!(pipeline.zoom_in().is_empty());

    pipeline.zoom_out();
    pipeline.zoom_out();
    pipeline.wait_idle(WAIT);
    assert_eq!(pipeline.scale(), 0.5);
}

#[test]
fn indicator_updates_when_render_is_dispatched() {
    let engine = FakeEngine::new(3).with_render_delay(Duration::from_millis(20));
    let mut pipeline = pipeline(&engine, 1.0);
    assert_eq!(pipeline.page_indicator(), "No document");

    load(&mut pipeline);
    assert_eq!(pipeline.page_indicator(), "Page 1 of 3");
    pipeline.wait_idle(WAIT);

    pipeline.go_to_page(2);
    assert_eq!(pipeline.page_indicator(), "Page 2 of 3");
    assert_eq!(pipeline.view().unwrap().page, 1);

    pipeline.wait_idle(WAIT);
    assert_eq!(pipeline.view().unwrap().page, 2);
}

#[test]
fn failed_load_keeps_current_document() {
    let engine = FakeEngine::new(2);
    let mut pipeline = pipeline(&engine, 1.0);
    load(&mut pipeline);
    pipeline.wait_idle(WAIT);
    pipeline.next_page();
    pipeline.wait_idle(WAIT);

    let bogus = DocumentSource::from_bytes(b"<html>not a pdf</html>").unwrap();
    assert!(matches!(pipeline.load(bogus), Err(LoadError::Invalid(_))));

    assert_eq!(pipeline.current_page(), 2);
    assert_eq!(pipeline.document_info().unwrap().page_count, 2);
    assert_eq!(pipeline.view().unwrap().page, 2);

    // the old worker is still serving requests
    pipeline.prev_page();
    pipeline.wait_idle(WAIT);
    assert_eq!(pipeline.view().unwrap().page, 1);
}

#[test]
fn render_failure_clears_in_flight_and_runs_pending() {
    let engine = FakeEngine::new(4)
        .failing_page(2)
        .with_render_delay(Duration::from_millis(20));
    let mut pipeline = pipeline(&engine, 1.0);
    load(&mut pipeline);
    pipeline.wait_idle(WAIT);

    pipeline.go_to_page(2);
    pipeline.request_render(4);
    let events = pipeline.wait_idle(WAIT);

    assert!(matches!(
        events.first(),
        Some(PipelineEvent::Failed { page: 2, .. })
    ));
    assert_eq!(events.last(), Some(&PipelineEvent::Presented { page: 4 }));
    assert!(!pipeline.state().render_in_flight);
    assert_eq!(engine.rendered_pages(), vec![1, 2, 4]);
}

#[test]
fn worker_open_failure_is_reported() {
    let engine = FakeEngine::new(2).failing_open();
    let mut pipeline = pipeline(&engine, 1.0);
    load(&mut pipeline);

    let events = pipeline.wait_idle(WAIT);
    assert!(matches!(
        events.as_slice(),
        [PipelineEvent::Failed { page: 1, .. }]
    ));
    assert!(!pipeline.state().render_in_flight);
    assert!(pipeline.view().is_none());
}

#[test]
fn overlay_matches_viewport() {
    let engine = FakeEngine::new(1).with_lines_per_page(3);
    let mut pipeline = pipeline(&engine, 2.0);
    load(&mut pipeline);
    pipeline.wait_idle(WAIT);

    let view = pipeline.view().unwrap();
    assert_eq!(view.overlay.width, 600.0);
    assert_eq!(view.overlay.height, 800.0);
    assert_eq!(view.overlay.spans.len(), 3);
    assert_eq!(view.overlay.spans[0].text, "Page 1 line 0");
    assert_eq!(view.overlay.spans[0].rect.left, 40.0);
    assert_eq!(view.surface.width_px, 600);
}

#[test]
fn navigating_past_last_page_is_reported() {
    let engine = FakeEngine::new(3);
    let mut pipeline = pipeline(&engine, 1.0);
    load(&mut pipeline);
    pipeline.wait_idle(WAIT);

    let target = PagePoint { x: 10.0, y: 40.0 };
    assert_eq!(
        pipeline.navigate_to(7, target),
        vec![PipelineEvent::OutOfRange {
            page: 7,
            page_count: 3
        }]
    );
    assert_eq!(pipeline.current_page(), 1);
    assert!(!pipeline.state().render_in_flight);

    // no scroll is left behind for a later render
    pipeline.go_to_page(3);
    let events = pipeline.wait_idle(WAIT);
    assert_eq!(events, vec![PipelineEvent::Presented { page: 3 }]);
    assert_eq!(pipeline.scroll_offset(), ScreenPoint::default());
    assert_eq!(engine.rendered_pages(), vec![1, 3]);
}
