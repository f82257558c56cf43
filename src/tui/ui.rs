//! UI rendering for the chat screen.

use chrono::Utc;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget},
    Frame,
};

use super::app::{App, Pane};
use super::compose;
use super::help;
use super::log_pane;
use super::messages;

/// Height of the log pane when shown.
const LOG_PANE_HEIGHT: u16 = 10;

/// Live/cached marker for the message rows.
fn source_indicator(is_live: bool) -> (&'static str, Color) {
    if is_live {
        ("* live", Color::Green)
    } else {
        ("o cached", Color::Yellow)
    }
}

/// Main render function
pub fn render(frame: &mut Frame, app: &mut App) {
    let area = frame.area();
    let log_height = if app.log.visible { LOG_PANE_HEIGHT } else { 0 };

    let [header_area, messages_area, compose_area, log_area, status_area] = Layout::vertical([
        Constraint::Length(2),
        Constraint::Fill(1),
        Constraint::Length(compose::COMPOSE_HEIGHT),
        Constraint::Length(log_height),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), app);

    let rows = app.screen.rows();
    let me = app.screen.me().sender_id().to_string();
    messages::render(
        messages_area,
        frame.buffer_mut(),
        &rows,
        &me,
        &mut app.messages,
        app.focus == Pane::Messages,
    );

    compose::render(
        compose_area,
        frame,
        &app.screen.draft,
        app.screen.can_send(),
        app.focus == Pane::Compose,
    );

    if app.log.visible {
        log_pane::render(log_area, frame.buffer_mut(), &app.log);
    }

    render_status(status_area, frame.buffer_mut(), app);

    if app.show_help {
        help::render_help_popup(frame);
    }
}

/// Two header lines: who we talk to, and when they were last active.
fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let screen = &app.screen;
    let title = screen
        .recipient_email()
        .unwrap_or(screen.chat().id.as_str())
        .to_string();

    let (symbol, color) = source_indicator(screen.is_live());
    let right = format!(" {} ", symbol);
    let padding = (area.width as usize).saturating_sub(title.chars().count() + 1 + right.len());

    let first = Line::from(vec![
        Span::styled(
            format!(" {}", title),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ".repeat(padding)),
        Span::styled(right, Style::default().fg(color)),
    ]);
    let second = Line::from(Span::styled(
        format!(" {}", screen.last_active().label(Utc::now())),
        Style::default().fg(Color::Gray),
    ));

    Paragraph::new(vec![first, second])
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

/// Render the status bar
fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    if let Some(ref msg) = app.status_message {
        let line = Line::from(Span::styled(
            format!(" {} ", msg),
            Style::default().fg(Color::Green).bg(Color::DarkGray),
        ));
        Paragraph::new(line)
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    let sep_style = Style::default().fg(Color::Black);
    let status_line = Line::from(vec![
        Span::styled(
            format!(" {} ", app.screen.chat().id),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled("|", sep_style),
        Span::styled(
            format!(" Tab: {} ", app.focus.as_str()),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled("|", sep_style),
        Span::styled(" F1: help ", Style::default().fg(Color::Gray)),
        Span::styled("|", sep_style),
        Span::styled(" F12: log ", Style::default().fg(Color::Gray)),
        Span::styled("|", sep_style),
        Span::styled(" C-c: quit", Style::default().fg(Color::Gray)),
    ]);

    Paragraph::new(status_line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}
