//! Compose box: the draft input line and the send/mic indicator.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::screen::Draft;

/// Height of the compose box: border + input + border.
pub const COMPOSE_HEIGHT: u16 = 3;

const PLACEHOLDER: &str = " Type a message";

/// Width reserved at the right edge for the indicator.
const INDICATOR_WIDTH: u16 = 4;

/// Render the compose box. Uses `Frame` directly so the cursor can be placed.
pub fn render(area: Rect, frame: &mut Frame, draft: &Draft, can_send: bool, focused: bool) {
    let (border_style, border_type) = if focused {
        (Style::default().fg(Color::Yellow), BorderType::Double)
    } else {
        (Style::default().fg(Color::DarkGray), BorderType::Plain)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width <= INDICATOR_WIDTH {
        return;
    }

    let input_area = Rect::new(inner.x, inner.y, inner.width - INDICATOR_WIDTH, 1);
    let indicator_area = Rect::new(
        inner.x + inner.width - INDICATOR_WIDTH,
        inner.y,
        INDICATOR_WIDTH,
        1,
    );

    let display = compose_display_text(&draft.input, draft.cursor_pos, input_area.width as usize);
    render_input(input_area, frame.buffer_mut(), draft, &display);
    render_indicator(indicator_area, frame.buffer_mut(), can_send, focused);

    if focused {
        frame.set_cursor_position((input_area.x + 1 + display.cursor_offset as u16, input_area.y));
    }
}

fn render_input(area: Rect, buf: &mut Buffer, draft: &Draft, display: &DisplayText) {
    let line = if draft.is_empty() {
        let shown: String = PLACEHOLDER.chars().take(area.width as usize).collect();
        Line::from(Span::styled(shown, Style::default().fg(Color::DarkGray)))
    } else {
        Line::from(Span::styled(
            format!(" {}", display.visible),
            Style::default().fg(Color::White),
        ))
    };
    Paragraph::new(line).render(area, buf);
}

/// Send arrow when there is something to send, microphone otherwise.
fn render_indicator(area: Rect, buf: &mut Buffer, can_send: bool, focused: bool) {
    let (symbol, style) = if can_send {
        (
            " \u{27A4} ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        )
    } else {
        (" \u{1F3A4}", Style::default().fg(Color::DarkGray))
    };
    let style = if focused { style } else { style.fg(Color::DarkGray) };
    Paragraph::new(Line::from(Span::styled(symbol, style))).render(area, buf);
}

/// What to show on the single input line and where the cursor sits.
struct DisplayText {
    visible: String,
    /// Cursor column within `visible`.
    cursor_offset: usize,
}

/// Flatten newlines to " | " and scroll horizontally to keep the cursor in view.
fn compose_display_text(input: &str, cursor_pos: usize, width: usize) -> DisplayText {
    let avail = width.saturating_sub(2);
    if avail == 0 {
        return DisplayText {
            visible: String::new(),
            cursor_offset: 0,
        };
    }

    let mut cols: Vec<(String, usize)> = Vec::new();
    let mut cursor_col = 0;
    for (idx, ch) in input.chars().enumerate() {
        let piece = if ch == '\n' {
            " | ".to_string()
        } else {
            ch.to_string()
        };
        let w = UnicodeWidthStr::width(piece.as_str());
        if idx < cursor_pos {
            cursor_col += w;
        }
        cols.push((piece, w));
    }

    let total: usize = cols.iter().map(|(_, w)| w).sum();
    let start_col = if total <= avail || cursor_col < avail {
        0
    } else {
        cursor_col + 1 - avail
    };

    let mut visible = String::new();
    let mut col = 0;
    for (piece, w) in &cols {
        if col >= start_col && col + w <= start_col + avail {
            visible.push_str(piece);
        }
        col += w;
    }

    DisplayText {
        visible,
        cursor_offset: cursor_col - start_col,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_short_input() {
        let d = compose_display_text("hello", 5, 20);
        assert_eq!(d.visible, "hello");
        assert_eq!(d.cursor_offset, 5);
    }

    #[test]
    fn test_display_newline_expansion() {
        let d = compose_display_text("a\nb", 3, 20);
        assert_eq!(d.visible, "a | b");
        assert_eq!(d.cursor_offset, 5);
    }

    #[test]
    fn test_display_scrolls_to_cursor() {
        let d = compose_display_text("abcdefghij", 10, 7);
        // 5 usable columns; cursor after 'j' stays visible.
        assert_eq!(d.visible, "ghij");
        assert_eq!(d.cursor_offset, 4);
    }

    #[test]
    fn test_display_too_narrow() {
        let d = compose_display_text("abc", 1, 2);
        assert!(d.visible.is_empty());
        assert_eq!(d.cursor_offset, 0);
    }
}
