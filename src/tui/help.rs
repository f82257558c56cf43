//! Help popup: keyboard shortcuts.

use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const POPUP_WIDTH: u16 = 48;

/// (key, description) pairs per section.
const SECTIONS: &[(&str, &[(&str, &str)])] = &[
    (
        "COMPOSE",
        &[
            ("Enter", "Send message"),
            ("Alt+Enter", "New line"),
            ("Ctrl+U", "Clear draft"),
            ("Left/Right", "Move cursor"),
            ("Home/End", "Start/end of draft"),
        ],
    ),
    (
        "MESSAGES",
        &[
            ("Up/Down", "Scroll one line"),
            ("PgUp/PgDn", "Scroll one page"),
            ("g / G", "Oldest / newest"),
            ("i / Enter", "Back to compose"),
        ],
    ),
    (
        "GENERAL",
        &[
            ("Tab", "Switch compose/messages"),
            ("F1", "Show this help"),
            ("?", "Show help (messages pane)"),
            ("F12", "Toggle debug log"),
            ("Ctrl+Up/Dn", "Scroll debug log"),
            ("Esc", "Hide log / leave compose"),
            ("Ctrl+C", "Quit"),
            ("Ctrl+Q", "Quit"),
        ],
    ),
];

fn help_lines() -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (idx, (title, shortcuts)) in SECTIONS.iter().enumerate() {
        if idx > 0 {
            lines.push(Line::from(""));
        }
        lines.push(Line::from(Span::styled(
            *title,
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )));
        for (key, desc) in shortcuts.iter() {
            lines.push(Line::from(vec![
                Span::styled(format!("  {:<12}", key), Style::default().fg(Color::Yellow)),
                Span::styled(*desc, Style::default().fg(Color::Gray)),
            ]));
        }
    }
    lines
}

/// Render the help popup centered over everything else.
pub fn render_help_popup(frame: &mut Frame) {
    let area = frame.area();
    let lines = help_lines();

    // Content plus borders.
    let height = (lines.len() as u16 + 2).min(area.height);
    let width = POPUP_WIDTH.min(area.width);
    let popup = Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    );

    frame.render_widget(Clear, popup);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(
            " HELP ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ))
        .title_bottom(Line::from(Span::styled(
            " any key closes ",
            Style::default().fg(Color::Gray),
        )));
    frame.render_widget(Paragraph::new(lines).block(block), popup);
}
