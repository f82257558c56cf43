//! In-TUI log capture.
//!
//! While the alternate screen is active, tracing output must not reach the
//! terminal. `LogBuffer` is a `MakeWriter` collecting formatted lines in a
//! bounded queue; `LogPane` drains it into scrollable history shown in a
//! toggleable pane.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use tracing_subscriber::fmt::MakeWriter;

/// Undrained lines kept before the oldest are dropped.
const BUFFER_CAPACITY: usize = 500;

/// Lines of history kept by the pane.
const HISTORY_LIMIT: usize = 1000;

/// Shared queue of log lines written by tracing.
#[derive(Clone, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        // Logging must keep working after a panic elsewhere.
        let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= BUFFER_CAPACITY {
            queue.pop_front();
        }
        queue.push_back(line);
    }

    /// Remove and return all queued lines, oldest first.
    pub fn drain(&self) -> Vec<String> {
        let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        queue.drain(..).collect()
    }
}

/// Per-event writer; splits output on newlines.
pub struct LineWriter {
    buffer: LogBuffer,
    pending: Vec<u8>,
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.buffer
                .push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.buffer.push(String::from_utf8_lossy(&rest).into_owned());
        }
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            buffer: self.clone(),
            pending: Vec::new(),
        }
    }
}

/// Scrollback state for the log pane.
pub struct LogPane {
    buffer: LogBuffer,
    lines: Vec<String>,
    pub visible: bool,
    /// Lines scrolled back from the newest (0 = pinned to newest).
    scroll_back: usize,
}

impl LogPane {
    pub fn new(buffer: LogBuffer) -> Self {
        Self {
            buffer,
            lines: Vec::new(),
            visible: false,
            scroll_back: 0,
        }
    }

    /// Move newly written lines into the history.
    pub fn refresh(&mut self) {
        self.lines.extend(self.buffer.drain());
        if self.lines.len() > HISTORY_LIMIT {
            let excess = self.lines.len() - HISTORY_LIMIT;
            self.lines.drain(..excess);
            self.scroll_back = self.scroll_back.min(self.lines.len().saturating_sub(1));
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
        if self.visible {
            self.scroll_back = 0;
        }
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.scroll_back = (self.scroll_back + n).min(self.lines.len().saturating_sub(1));
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.scroll_back = self.scroll_back.saturating_sub(n);
    }
}

/// Color a line by its level token.
fn level_color(line: &str) -> Color {
    if line.contains("ERROR") {
        Color::Red
    } else if line.contains(" WARN") {
        Color::Yellow
    } else if line.contains(" INFO") {
        Color::Green
    } else if line.contains("DEBUG") || line.contains("TRACE") {
        Color::DarkGray
    } else {
        Color::White
    }
}

pub fn render(area: Rect, buf: &mut Buffer, pane: &LogPane) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Log ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ));
    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 {
        return;
    }

    let end = pane.lines.len().saturating_sub(pane.scroll_back);
    let start = end.saturating_sub(inner.height as usize);
    let shown: Vec<Line> = pane.lines[start..end]
        .iter()
        .map(|l| Line::from(Span::styled(l.clone(), Style::default().fg(level_color(l)))))
        .collect();
    Paragraph::new(shown).render(inner, buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_drops_oldest() {
        let buf = LogBuffer::new();
        for i in 0..(BUFFER_CAPACITY + 10) {
            buf.push(format!("line {}", i));
        }
        let lines = buf.drain();
        assert_eq!(lines.len(), BUFFER_CAPACITY);
        assert_eq!(lines[0], "line 10");
        assert!(buf.drain().is_empty());
    }

    #[test]
    fn test_writer_splits_lines_and_flushes_tail() {
        let buf = LogBuffer::new();
        {
            let mut w = buf.make_writer();
            write!(w, "first\nsecond\npart").unwrap();
            assert_eq!(buf.drain(), vec!["first", "second"]);
        }
        assert_eq!(buf.drain(), vec!["part"]);
    }

    #[test]
    fn test_pane_scroll_clamps() {
        let buf = LogBuffer::new();
        for i in 0..5 {
            buf.push(format!("line {}", i));
        }
        let mut pane = LogPane::new(buf);
        pane.refresh();
        pane.scroll_up(100);
        assert_eq!(pane.scroll_back, 4);
        pane.scroll_down(100);
        assert_eq!(pane.scroll_back, 0);
    }

    #[test]
    fn test_toggle_pins_to_newest() {
        let mut pane = LogPane::new(LogBuffer::new());
        pane.scroll_back = 3;
        pane.toggle();
        assert!(pane.visible);
        assert_eq!(pane.scroll_back, 0);
    }

    #[test]
    fn test_level_color() {
        assert_eq!(level_color("2024-01-15T10:30:00Z ERROR boom"), Color::Red);
        assert_eq!(level_color("2024-01-15T10:30:00Z  WARN slow"), Color::Yellow);
        assert_eq!(level_color("plain"), Color::White);
    }
}
