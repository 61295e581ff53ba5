use std::sync::Arc;
use std::time::Duration;

use marginalia::app::{InputMode, Tab, ViewerFocus};
use marginalia::geometry::ScreenPoint;
use marginalia::notification::AlertLevel;
use marginalia::test_utils::test_helpers::{
    BackendCall, FakeEngine, RecordingBackend, TestScenarioBuilder, capture_terminal_state,
    create_test_terminal, test_app, test_session, write_fake_pdf,
};
use marginalia::{App, AppOptions, run_app_with_event_source};
use crossterm::event::KeyCode;
use tempfile::TempDir;

#[test]
fn annotate_selected_lines_and_save() {
    let dir = TempDir::new().unwrap();
    let path = write_fake_pdf(dir.path(), "contract.pdf");
    let engine = FakeEngine::new(3);
    let backend = Arc::new(RecordingBackend::new());
    let mut app = test_app(&engine, &backend);
    app.open_local(&path);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .cursor_down(1)
        .press_char('v')
        .cursor_down(1)
        .press_char('a')
        .press_char('b')
        .press_char('s')
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    let payloads = backend.saved_payloads();
    assert_eq!(payloads.len(), 1);
    let saved = &payloads[0].annotations;
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].text, "Page 1 line 1 Page 1 line 2");
    assert_eq!((saved[0].position.x, saved[0].position.y), (20.0, 48.0));
    assert_eq!(saved[0].position.page_num, 1);
    assert_eq!(saved[1].text, "New bullet point");

    let alert = app.alerts().current().unwrap();
    assert_eq!(alert.level, AlertLevel::Info);
    assert_eq!(alert.message, "Annotations saved successfully!");

    let screen = capture_terminal_state(&terminal);
    assert!(screen.contains("Annotations saved successfully!"));
    assert!(screen.contains("New bullet point"));
}

#[test]
fn failed_save_raises_error_alert_and_keeps_annotations() {
    let dir = TempDir::new().unwrap();
    let path = write_fake_pdf(dir.path(), "a.pdf");
    let engine = FakeEngine::new(1);
    let backend = Arc::new(RecordingBackend::new().failing_saves("Error saving annotations."));
    let mut app = test_app(&engine, &backend);
    app.open_local(&path);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .press_char('b')
        .press_char('s')
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    let alert = app.alerts().current().unwrap();
    assert_eq!(alert.level, AlertLevel::Error);
    assert_eq!(alert.message, "Error saving annotations.");
    assert_eq!(app.session().annotations().len(), 1);
}

#[test]
fn any_key_dismisses_alert() {
    let dir = TempDir::new().unwrap();
    let path = write_fake_pdf(dir.path(), "a.pdf");
    let engine = FakeEngine::new(2);
    let backend = Arc::new(RecordingBackend::new());
    let mut app = test_app(&engine, &backend);
    app.open_local(&path);

    let mut terminal = create_test_terminal(100, 30);
    // the first 'n' only dismisses, the second turns the page
    let mut events = TestScenarioBuilder::new()
        .press_char('s')
        .next_page()
        .next_page()
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert!(!app.alerts().is_blocking());
    assert_eq!(app.session().pipeline().current_page(), 2);
}

#[test]
fn dropped_non_pdf_is_rejected_before_upload() {
    let dir = TempDir::new().unwrap();
    let notes = dir.path().join("notes.docx");
    std::fs::write(&notes, "not a pdf").unwrap();

    let engine = FakeEngine::new(1);
    let backend = Arc::new(RecordingBackend::new());
    let mut app = test_app(&engine, &backend);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .paste(&notes.display().to_string())
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert!(backend.calls().is_empty());
    let alert = app.alerts().current().unwrap();
    assert_eq!(alert.level, AlertLevel::Error);
    assert!(alert.message.contains("Please upload a PDF file"));
    assert!(!app.session().pipeline().has_document());
}

#[test]
fn dropped_pdf_is_uploaded_and_viewed() {
    let dir = TempDir::new().unwrap();
    let path = write_fake_pdf(dir.path(), "judgment.pdf");

    let engine = FakeEngine::new(4);
    let backend = Arc::new(RecordingBackend::new());
    let mut app = test_app(&engine, &backend);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .paste(&format!("'{}'\n", path.display()))
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(
        &calls[0],
        BackendCall::Upload { name, mime, .. } if name == "judgment.pdf" && mime == "application/pdf"
    ));
    assert_eq!(calls[1], BackendCall::FetchDocument);

    assert!(app.status().contains("judgment.pdf"));
    let screen = capture_terminal_state(&terminal);
    assert!(screen.contains("Page 1 of 4"));
    assert!(screen.contains("Page 1 line 0"));
}

#[test]
fn open_prompt_uploads_typed_path() {
    let dir = TempDir::new().unwrap();
    let path = write_fake_pdf(dir.path(), "typed.pdf");

    let engine = FakeEngine::new(2);
    let backend = Arc::new(RecordingBackend::new());
    let mut app = test_app(&engine, &backend);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .press_char('o')
        .type_text(&path.display().to_string())
        .press_enter()
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert_eq!(app.mode(), InputMode::Normal);
    assert_eq!(backend.calls().len(), 2);
    assert_eq!(app.session().pipeline().page_indicator(), "Page 1 of 2");
}

#[test]
fn query_tab_records_answer() {
    let engine = FakeEngine::new(1);
    let backend = Arc::new(RecordingBackend::new().with_answer("A tort is a civil wrong."));
    let mut app = test_app(&engine, &backend);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .press_key(KeyCode::F(1))
        .type_text("What is a tort?")
        .press_enter()
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert_eq!(app.tab(), Tab::Query);
    assert_eq!(
        backend.calls(),
        vec![BackendCall::Ask("What is a tort?".to_string())]
    );
    let entry = app.session().query_log().last().unwrap();
    assert_eq!(entry.response, "A tort is a civil wrong.");

    let screen = capture_terminal_state(&terminal);
    assert!(screen.contains("A tort is a civil wrong."));
    assert!(screen.contains("What is a tort?"));
}

#[test]
fn failed_query_leaves_log_unchanged() {
    let engine = FakeEngine::new(1);
    let backend = Arc::new(
        RecordingBackend::new().with_query_error("An error occurred while processing your request"),
    );
    let mut app = test_app(&engine, &backend);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .press_tab()
        .type_text("anything")
        .press_enter()
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert!(app.session().query_log().is_empty());
    let alert = app.alerts().current().unwrap();
    assert_eq!(
        alert.message,
        "An error occurred while processing your request"
    );
}

#[test]
fn edit_comment_and_text_from_list() {
    let dir = TempDir::new().unwrap();
    let path = write_fake_pdf(dir.path(), "a.pdf");
    let engine = FakeEngine::new(1);
    let backend = Arc::new(RecordingBackend::new());
    let mut app = test_app(&engine, &backend);
    app.open_local(&path);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .press_char('b')
        .press_char('l')
        .press_char('c')
        .type_text("see p.4")
        .press_enter()
        .press_char('e')
        .press_key(KeyCode::Backspace)
        .press_key(KeyCode::Backspace)
        .press_key(KeyCode::Backspace)
        .press_key(KeyCode::Backspace)
        .press_key(KeyCode::Backspace)
        .press_key(KeyCode::Backspace)
        .type_text(" note")
        .press_enter()
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert_eq!(app.focus(), ViewerFocus::Annotations);
    let annotation = &app.session().annotations().all()[0];
    assert_eq!(annotation.comment, "see p.4");
    assert_eq!(annotation.text, "New bullet note");

    let screen = capture_terminal_state(&terminal);
    assert!(screen.contains("see p.4"));
}

#[test]
fn escape_cancels_edit() {
    let engine = FakeEngine::new(1);
    let backend = Arc::new(RecordingBackend::new());
    let mut app = test_app(&engine, &backend);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .press_char('b')
        .press_char('l')
        .press_char('e')
        .type_text("discarded")
        .press_esc()
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert_eq!(app.mode(), InputMode::Normal);
    assert_eq!(
        app.session().annotations().all()[0].text,
        "New bullet point"
    );
}

#[test]
fn delete_strips_matching_highlights() {
    let dir = TempDir::new().unwrap();
    let path = write_fake_pdf(dir.path(), "a.pdf");
    let engine = FakeEngine::new(1);
    let backend = Arc::new(RecordingBackend::new());
    let mut app = test_app(&engine, &backend);
    app.open_local(&path);

    let mut terminal = create_test_terminal(100, 30);
    // same line annotated twice, then the second one deleted
    let mut events = TestScenarioBuilder::new()
        .press_char('a')
        .press_char('a')
        .press_char('l')
        .press_char('d')
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    let store = app.session().annotations();
    assert_eq!(store.len(), 1);
    assert!(store.highlights().is_empty());
    assert_eq!(app.status(), "Deleted \"Page 1 line 0\", 2 highlight(s) removed");
}

#[test]
fn navigate_from_list_lands_on_annotated_line() {
    let dir = TempDir::new().unwrap();
    let path = write_fake_pdf(dir.path(), "a.pdf");
    let engine = FakeEngine::new(3);
    let backend = Arc::new(RecordingBackend::new());
    let mut app = test_app(&engine, &backend);
    app.open_local(&path);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .cursor_down(3)
        .press_char('a')
        .next_page()
        .next_page()
        .press_char('l')
        .press_enter()
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    let pipeline = app.session().pipeline();
    assert_eq!(pipeline.current_page(), 1);
    assert_eq!(pipeline.view().unwrap().page, 1);
    // line 3 starts at (20, 104) on the page, drawn at 1.5x
    assert_eq!(pipeline.scroll_offset(), ScreenPoint::new(30.0, 156.0));
    assert_eq!(app.cursor(), 3);
}

#[test]
fn page_keys_and_zoom_update_indicator() {
    let dir = TempDir::new().unwrap();
    let path = write_fake_pdf(dir.path(), "a.pdf");
    let engine = FakeEngine::new(3);
    let backend = Arc::new(RecordingBackend::new());
    let mut app = test_app(&engine, &backend);
    app.open_local(&path);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .next_page()
        .next_page()
        .next_page()
        .prev_page()
        .zoom_in()
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    assert_eq!(engine.rendered_pages(), vec![1, 2, 3, 2, 2]);
    let screen = capture_terminal_state(&terminal);
    assert!(screen.contains("Page 2 of 3 | 180%"));
}

/// App that does not wait for renders, so keys can land while one is running
fn app_with_slow_renders(engine: &FakeEngine, backend: &Arc<RecordingBackend>) -> (App, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = write_fake_pdf(dir.path(), "slow.pdf");
    let mut app = App::new(test_session(engine, backend), AppOptions::default());
    app.open_local(&path);
    app.session_mut().wait_idle(Duration::from_secs(5));
    (app, dir)
}

#[test]
fn annotating_during_page_change_uses_page_on_screen() {
    let engine = FakeEngine::new(3).with_render_delay(Duration::from_millis(300));
    let backend = Arc::new(RecordingBackend::new());
    let (mut app, _dir) = app_with_slow_renders(&engine, &backend);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .next_page()
        .press_char('a')
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    let store = app.session().annotations();
    let annotation = &store.all()[0];
    assert_eq!(annotation.text, "Page 1 line 0");
    assert_eq!(annotation.position.page, 1);
    assert_eq!(store.highlights().on_page(1).count(), 1);
    assert_eq!(store.highlights().on_page(2).count(), 0);
}

#[test]
fn annotating_during_zoom_uses_scale_on_screen() {
    let engine = FakeEngine::new(1).with_render_delay(Duration::from_millis(300));
    let backend = Arc::new(RecordingBackend::new());
    let (mut app, _dir) = app_with_slow_renders(&engine, &backend);

    let mut terminal = create_test_terminal(100, 30);
    let mut events = TestScenarioBuilder::new()
        .zoom_in()
        .press_char('a')
        .quit()
        .build();
    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    // line 0 starts at (20, 20) on the page
    let position = app.session().annotations().all()[0].position;
    assert!((position.x - 20.0).abs() < 1e-4);
    assert!((position.y - 20.0).abs() < 1e-4);
    assert_eq!(position.page, 1);
}
