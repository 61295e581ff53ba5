//! Drawing for the terminal app

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};

use crate::app::{App, InputMode, Tab, ViewerFocus};
use crate::geometry::rect_to_page_space;
use crate::notification::AlertLevel;

// Oceanic Next
const BASE_00: Color = Color::Rgb(0x1B, 0x2B, 0x34);
const BASE_02: Color = Color::Rgb(0x4F, 0x5B, 0x66);
const BASE_03: Color = Color::Rgb(0x65, 0x73, 0x7E);
const BASE_05: Color = Color::Rgb(0xC0, 0xC5, 0xCE);
const BASE_08: Color = Color::Rgb(0xEC, 0x5F, 0x67);
const BASE_0A: Color = Color::Rgb(0xFA, 0xC8, 0x63);
const BASE_0B: Color = Color::Rgb(0x99, 0xC7, 0x94);
const BASE_0C: Color = Color::Rgb(0x5F, 0xB3, 0xB3);

pub fn draw(f: &mut Frame, app: &App) {
    let prompt_rows = if matches!(app.mode, InputMode::Normal) {
        0
    } else {
        3
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(prompt_rows),
            Constraint::Length(1),
        ])
        .split(f.area());

    draw_tabs(f, app, chunks[0]);
    match app.tab {
        Tab::Query => draw_query_tab(f, app, chunks[1]),
        Tab::Viewer => draw_viewer_tab(f, app, chunks[1]),
    }
    if prompt_rows > 0 {
        draw_prompt(f, app, chunks[2]);
    }
    draw_footer(f, app, chunks[3]);

    if app.alerts.is_blocking() {
        draw_alert(f, app, f.area());
    }
}

fn draw_tabs(f: &mut Frame, app: &App, area: Rect) {
    let selected = match app.tab {
        Tab::Query => 0,
        Tab::Viewer => 1,
    };
    let tabs = Tabs::new(vec![" Query [F1] ", " Viewer [F2] "])
        .select(selected)
        .block(
            Block::default()
                .title(" marginalia ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(BASE_03)),
        )
        .style(Style::default().fg(BASE_05))
        .highlight_style(
            Style::default()
                .fg(BASE_0A)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, area);
}

fn draw_query_tab(f: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);
    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(columns[0]);

    let input = Paragraph::new(format!("{}_", app.query_input)).block(
        Block::default()
            .title(" Ask ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(BASE_0C)),
    );
    f.render_widget(input, left[0]);

    let answer = app
        .session
        .query_log()
        .last()
        .map_or_else(String::new, |entry| entry.response.clone());
    let response = Paragraph::new(answer)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(" Response ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(BASE_03)),
        )
        .style(Style::default().fg(BASE_05));
    f.render_widget(response, left[1]);

    let items: Vec<ListItem> = app
        .session
        .query_log()
        .entries()
        .iter()
        .map(|entry| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    entry.asked_at.format("%H:%M").to_string(),
                    Style::default().fg(BASE_03),
                ),
                Span::raw(" "),
                Span::styled(entry.query.clone(), Style::default().fg(BASE_05)),
            ]))
        })
        .collect();
    let history = List::new(items).block(
        Block::default()
            .title(" History ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(BASE_03)),
    );
    f.render_widget(history, columns[1]);
}

fn draw_viewer_tab(f: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    draw_document(f, app, columns[0]);
    draw_annotation_list(f, app, columns[1]);
}

fn border_color(focused: bool) -> Color {
    if focused { BASE_0C } else { BASE_03 }
}

fn draw_document(f: &mut Frame, app: &App, area: Rect) {
    let pipeline = app.session.pipeline();
    let focused = app.focus == ViewerFocus::Document;
    let title = if pipeline.has_document() {
        format!(
            " {} | {:.0}% ",
            pipeline.page_indicator(),
            pipeline.scale() * 100.0
        )
    } else {
        format!(" {} ", pipeline.page_indicator())
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color(focused)));

    let Some(view) = pipeline.view() else {
        let hint = if pipeline.has_document() {
            "Rendering..."
        } else {
            "No document. Press o to open a PDF, or drop one on the terminal."
        };
        let paragraph = Paragraph::new(hint)
            .style(Style::default().fg(BASE_03))
            .block(block);
        f.render_widget(paragraph, area);
        return;
    };

    let markers: Vec<_> = app
        .session
        .annotations()
        .highlights()
        .on_page(view.page)
        .map(|m| m.rect)
        .collect();
    let selected = app.anchor.map(|anchor| {
        if anchor <= app.cursor {
            (anchor, app.cursor)
        } else {
            (app.cursor, anchor)
        }
    });

    let top = app.top_line();
    let rows = usize::from(area.height.saturating_sub(2));
    let lines: Vec<Line> = view
        .overlay
        .spans
        .iter()
        .enumerate()
        .skip(top)
        .take(rows)
        .map(|(idx, span)| {
            let highlighted = rect_to_page_space(&span.rect, view.viewport.scale)
                .is_ok_and(|page_rect| markers.iter().any(|m| m.intersects(&page_rect)));
            let in_selection = selected.is_some_and(|(lo, hi)| idx >= lo && idx <= hi);

            let mut style = Style::default().fg(BASE_05);
            if highlighted {
                style = style.bg(BASE_0A).fg(BASE_00);
            }
            if in_selection {
                style = style.bg(BASE_02);
            }
            if idx == app.cursor && focused {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Line::from(Span::styled(span.text.clone(), style))
        })
        .collect();

    let body = if lines.is_empty() {
        Paragraph::new("(no text on this page)").style(Style::default().fg(BASE_03))
    } else {
        Paragraph::new(lines)
    };
    f.render_widget(body.block(block), area);
}

fn draw_annotation_list(f: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == ViewerFocus::Annotations;
    let items: Vec<ListItem> = app
        .session
        .annotations()
        .all()
        .iter()
        .map(|annotation| {
            let mut lines = vec![Line::from(vec![
                Span::styled(
                    format!("p{} ", annotation.position.page),
                    Style::default().fg(BASE_03),
                ),
                Span::styled(annotation.text.clone(), Style::default().fg(BASE_05)),
            ])];
            if !annotation.comment.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("   {}", annotation.comment),
                    Style::default().fg(BASE_0B),
                )));
            }
            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .title(" Annotations ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border_color(focused))),
        )
        .highlight_style(
            Style::default()
                .bg(BASE_02)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    if focused && !app.session.annotations().is_empty() {
        state.select(Some(app.list_selected));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_prompt(f: &mut Frame, app: &App, area: Rect) {
    let title = match app.mode {
        InputMode::OpenPath => " Open PDF (path) ",
        InputMode::EditText(_) => " Edit annotation text ",
        InputMode::EditComment(_) => " Edit comment ",
        InputMode::Normal => "",
    };
    let prompt = Paragraph::new(format!("{}_", app.input)).block(
        Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(BASE_0A)),
    );
    f.render_widget(prompt, area);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let help = match (app.mode, app.tab, app.focus) {
        (InputMode::Normal, Tab::Query, _) => "Enter: ask | Tab: viewer | C-q: quit",
        (InputMode::Normal, Tab::Viewer, ViewerFocus::Document) => {
            "o: open | n/p: page | +/-: zoom | j/k: line | v: select | a: annotate | b: blank | s: save | l: list"
        }
        (InputMode::Normal, Tab::Viewer, ViewerFocus::Annotations) => {
            "j/k: move | Enter: go to | e: text | c: comment | d: delete | l: document"
        }
        _ => "Enter: confirm | Esc: cancel",
    };

    let mut spans = Vec::new();
    if app.pending_jobs > 0 {
        spans.push(Span::styled("[busy] ", Style::default().fg(BASE_0A)));
    }
    if !app.status.is_empty() {
        spans.push(Span::styled(
            format!("{} | ", app.status),
            Style::default().fg(BASE_0B),
        ));
    }
    spans.push(Span::styled(help, Style::default().fg(BASE_03)));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_alert(f: &mut Frame, app: &App, area: Rect) {
    let Some(alert) = app.alerts.current() else {
        return;
    };
    let popup_area = centered_rect(50, 30, area);
    f.render_widget(Clear, popup_area);

    let color = match alert.level {
        AlertLevel::Info => BASE_0B,
        AlertLevel::Error => BASE_08,
    };
    let text = vec![
        Line::from(alert.message.clone()),
        Line::from(""),
        Line::from(Span::styled(
            "Press any key",
            Style::default().fg(BASE_03),
        )),
    ];
    let popup = Paragraph::new(text).wrap(Wrap { trim: true }).block(
        Block::default()
            .title(alert.title())
            .borders(Borders::ALL)
            .border_style(Style::default().fg(color))
            .style(Style::default().bg(BASE_00)),
    );
    f.render_widget(popup, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
