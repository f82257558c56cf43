//! Messages pane: one card per message row, newest at the bottom.

use chrono::{DateTime, Local, Utc};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Widget},
};

use crate::models::Message;

/// Scroll state for the messages pane.
pub struct MessagesState {
    /// First visible line (0 = top).
    pub scroll_offset: usize,
    /// Keep the newest message in view as rows arrive.
    pub follow_tail: bool,
    /// Largest valid offset as of the last render.
    max_scroll: usize,
}

impl Default for MessagesState {
    fn default() -> Self {
        Self {
            scroll_offset: 0,
            follow_tail: true,
            max_scroll: 0,
        }
    }
}

impl MessagesState {
    pub fn scroll_up(&mut self, n: usize) {
        if self.follow_tail {
            self.scroll_offset = self.max_scroll;
            self.follow_tail = false;
        }
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(n);
        if self.scroll_offset >= self.max_scroll {
            self.scroll_to_end();
        }
    }

    pub fn scroll_to_top(&mut self) {
        self.follow_tail = false;
        self.scroll_offset = 0;
    }

    pub fn scroll_to_end(&mut self) {
        self.follow_tail = true;
        self.scroll_offset = self.max_scroll;
    }

    /// Resolve the offset for a viewport showing `visible` of `total` lines.
    fn resolve(&mut self, total: usize, visible: usize) -> usize {
        self.max_scroll = total.saturating_sub(visible);
        if self.follow_tail {
            self.scroll_offset = self.max_scroll;
        }
        self.scroll_offset = self.scroll_offset.min(self.max_scroll);
        self.scroll_offset
    }
}

/// Render the messages pane into the given area.
///
/// `me` is the sender identifier of the signed-in user; their rows are
/// right-aligned.
pub fn render(
    area: Rect,
    buf: &mut Buffer,
    rows: &[Message],
    me: &str,
    state: &mut MessagesState,
    focused: bool,
) {
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
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let all_lines = build_lines(rows, me, inner.width as usize);
    let total_lines = all_lines.len();
    let visible_height = inner.height as usize;
    let scroll = state.resolve(total_lines, visible_height);

    for (row, line) in all_lines.iter().skip(scroll).take(visible_height).enumerate() {
        let line_area = Rect::new(inner.x, inner.y + row as u16, inner.width, 1);
        Paragraph::new(line.clone()).render(line_area, buf);
    }

    if total_lines > visible_height {
        let indicator_x = inner.x + inner.width.saturating_sub(1);
        if scroll > 0 {
            let cell = &mut buf[(indicator_x, inner.y)];
            cell.set_char('^');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
        if scroll + visible_height < total_lines {
            let cell = &mut buf[(indicator_x, inner.y + inner.height - 1)];
            cell.set_char('v');
            cell.set_style(Style::default().fg(Color::DarkGray));
        }
    }

    // Nothing to show yet (no fallback, no snapshot).
    if rows.is_empty() {
        let hint = Line::from(Span::styled(
            " No messages yet. Say hello!",
            Style::default().fg(Color::DarkGray),
        ));
        Paragraph::new(hint).render(Rect::new(inner.x, inner.y, inner.width, 1), buf);
    }
}

/// Flatten all rows into display lines.
fn build_lines(rows: &[Message], me: &str, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for msg in rows {
        let own = msg.user.as_deref() == Some(me);
        render_message_card(&mut lines, msg.user.as_deref(), msg, width, own);
        lines.push(Line::from(""));
    }
    lines
}

/// Local wall-clock time of a message, or a marker while the server has not
/// assigned one.
fn format_time(ts: Option<DateTime<Utc>>) -> String {
    match ts {
        Some(ts) => ts.with_timezone(&Local).format("%H:%M").to_string(),
        None => "...".to_string(),
    }
}

/// Render one message row as a bordered card.
fn render_message_card(
    lines: &mut Vec<Line<'static>>,
    user: Option<&str>,
    msg: &Message,
    width: usize,
    own: bool,
) {
    // Cards take at most three quarters of the pane; own cards hug the right.
    let card_width = (width.saturating_mul(3) / 4).max(width.min(24));
    let content_width = card_width.saturating_sub(4);
    if content_width < 6 {
        return;
    }

    let indent = if own {
        " ".repeat(width.saturating_sub(card_width + 1))
    } else {
        " ".to_string()
    };

    let border_style = if own {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::Gray)
    };
    let sender_style = Style::default()
        .fg(if own { Color::Green } else { Color::Cyan })
        .add_modifier(Modifier::BOLD);
    let time_style = Style::default().fg(Color::DarkGray);

    let sender = if own { "You" } else { user.unwrap_or("?") };
    let time = format_time(msg.timestamp);

    lines.push(Line::from(Span::styled(
        format!("{}+{}+", indent, "-".repeat(card_width.saturating_sub(2))),
        border_style,
    )));

    let sender_shown: String = sender.chars().take(content_width.saturating_sub(time.len() + 1)).collect();
    let pad = content_width
        .saturating_sub(sender_shown.chars().count())
        .saturating_sub(time.len());
    lines.push(Line::from(vec![
        Span::raw(indent.clone()),
        Span::styled("| ", border_style),
        Span::styled(sender_shown, sender_style),
        Span::raw(" ".repeat(pad)),
        Span::styled(time, time_style),
        Span::styled(" |", border_style),
    ]));

    for text in wrap_text(&msg.message, content_width) {
        let pad = content_width.saturating_sub(unicode_width::UnicodeWidthStr::width(text.as_str()));
        lines.push(Line::from(vec![
            Span::raw(indent.clone()),
            Span::styled("| ", border_style),
            Span::raw(format!("{}{}", text, " ".repeat(pad))),
            Span::styled(" |", border_style),
        ]));
    }

    lines.push(Line::from(Span::styled(
        format!("{}+{}+", indent, "-".repeat(card_width.saturating_sub(2))),
        border_style,
    )));
}

/// Word-wrap by display width; words longer than a line are split.
pub fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    use unicode_width::UnicodeWidthChar;

    if max_width == 0 {
        return vec![];
    }

    let mut result = Vec::new();
    for raw_line in text.split('\n') {
        let mut current = String::new();
        let mut current_w = 0;

        for word in raw_line.split(' ') {
            let word_w = unicode_width::UnicodeWidthStr::width(word);
            let sep = usize::from(!current.is_empty());

            if current_w + sep + word_w <= max_width {
                if sep == 1 {
                    current.push(' ');
                }
                current.push_str(word);
                current_w += sep + word_w;
                continue;
            }

            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
                current_w = 0;
            }

            for ch in word.chars() {
                let ch_w = ch.width().unwrap_or(0);
                if current_w + ch_w > max_width {
                    result.push(std::mem::take(&mut current));
                    current_w = 0;
                }
                current.push(ch);
                current_w += ch_w;
            }
        }

        result.push(current);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(user: &str, text: &str) -> Message {
        Message {
            id: "m".into(),
            user: Some(user.into()),
            message: text.into(),
            photo_url: None,
            timestamp: None,
        }
    }

    #[test]
    fn test_wrap_text_words() {
        assert_eq!(wrap_text("hello world foo", 11), vec!["hello world", "foo"]);
        assert_eq!(wrap_text("a\nb", 10), vec!["a", "b"]);
        assert_eq!(wrap_text("", 10), vec![""]);
    }

    #[test]
    fn test_wrap_text_long_word() {
        assert_eq!(wrap_text("abcdefgh", 3), vec!["abc", "def", "gh"]);
    }

    #[test]
    fn test_build_lines_card_height() {
        let rows = vec![msg("+1", "hi"), msg("+2", "there")];
        let lines = build_lines(&rows, "+1", 60);
        // top, sender, one content line, bottom, spacer per message
        assert_eq!(lines.len(), 10);
    }

    #[test]
    fn test_own_rows_right_aligned() {
        let rows = vec![msg("+1", "mine")];
        let own = build_lines(&rows, "+1", 60);
        let other = build_lines(&rows, "+2", 60);
        let lead = |l: &Line| l.spans[0].content.len() - l.spans[0].content.trim_start().len();
        assert!(lead(&own[0]) > lead(&other[0]));
    }

    #[test]
    fn test_follow_tail_until_scrolled_up() {
        let mut state = MessagesState::default();
        assert_eq!(state.resolve(100, 10), 90);

        state.scroll_up(5);
        assert!(!state.follow_tail);
        assert_eq!(state.resolve(120, 10), 85);

        state.scroll_down(1000);
        assert!(state.follow_tail);
        assert_eq!(state.resolve(130, 10), 120);
    }

    #[test]
    fn test_scroll_short_content() {
        let mut state = MessagesState::default();
        state.scroll_to_top();
        assert_eq!(state.resolve(3, 10), 0);
        state.scroll_to_end();
        assert_eq!(state.resolve(3, 10), 0);
    }
}
