//! TUI application state and main event loop

use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio::time::MissedTickBehavior;

use super::log_pane::{LogBuffer, LogPane};
use super::messages::MessagesState;
use super::ui;
use crate::screen::{ChatScreen, PendingWrites};

/// Redraw interval so relative times stay current.
const TICK: Duration = Duration::from_secs(1);

/// How long quitting waits for sends still in flight.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(3);

/// Lines moved by PgUp/PgDn.
const PAGE: usize = 10;

/// Pane receiving keyboard input
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Pane {
    Messages,
    #[default]
    Compose,
}

impl Pane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pane::Messages => "messages",
            Pane::Compose => "compose",
        }
    }

    fn toggled(self) -> Self {
        match self {
            Pane::Messages => Pane::Compose,
            Pane::Compose => Pane::Messages,
        }
    }
}

/// What woke the loop up.
enum Step {
    Key(KeyEvent),
    Redraw,
    Quit,
}

pub struct App {
    pub screen: ChatScreen,
    pub messages: MessagesState,
    pub focus: Pane,
    pub show_help: bool,
    pub log: LogPane,
    /// One-shot notice shown in the status bar until the next key.
    pub status_message: Option<String>,
    pub should_exit: bool,
    /// Writes of recent sends that have not finished yet.
    in_flight: Vec<PendingWrites>,
}

impl App {
    pub fn new(screen: ChatScreen, log_buffer: LogBuffer) -> Self {
        Self {
            screen,
            messages: MessagesState::default(),
            focus: Pane::default(),
            show_help: false,
            log: LogPane::new(log_buffer),
            status_message: None,
            should_exit: false,
            in_flight: Vec::new(),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.status_message = None;

        if self.show_help {
            self.show_help = false;
            return;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('q') if ctrl => {
                self.should_exit = true;
                return;
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = self.focus.toggled();
                return;
            }
            KeyCode::F(1) => {
                self.show_help = true;
                return;
            }
            KeyCode::F(12) => {
                self.log.toggle();
                return;
            }
            KeyCode::Up if ctrl && self.log.visible => {
                self.log.scroll_up(1);
                return;
            }
            KeyCode::Down if ctrl && self.log.visible => {
                self.log.scroll_down(1);
                return;
            }
            KeyCode::Esc => {
                if self.log.visible {
                    self.log.toggle();
                } else {
                    self.focus = Pane::Messages;
                }
                return;
            }
            _ => {}
        }

        match self.focus {
            Pane::Compose => self.handle_compose_key(key),
            Pane::Messages => self.handle_messages_key(key),
        }
    }

    fn handle_compose_key(&mut self, key: KeyEvent) {
        let draft = &mut self.screen.draft;
        match key.code {
            KeyCode::Enter
                if key
                    .modifiers
                    .intersects(KeyModifiers::ALT | KeyModifiers::SHIFT) =>
            {
                draft.insert_newline()
            }
            KeyCode::Enter => match self.screen.send() {
                Some(writes) => {
                    self.in_flight.retain(|w| !w.is_finished());
                    self.in_flight.push(writes);
                }
                None => self.status_message = Some("Nothing to send".to_string()),
            },
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => draft.clear(),
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                draft.insert_char(c)
            }
            KeyCode::Backspace => draft.backspace(),
            KeyCode::Delete => draft.delete(),
            KeyCode::Left => draft.move_left(),
            KeyCode::Right => draft.move_right(),
            KeyCode::Home => draft.move_home(),
            KeyCode::End => draft.move_end(),
            KeyCode::Up | KeyCode::PageUp => {
                self.focus = Pane::Messages;
                self.handle_messages_key(key);
            }
            _ => {}
        }
    }

    fn handle_messages_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.messages.scroll_up(1),
            KeyCode::Down | KeyCode::Char('j') => self.messages.scroll_down(1),
            KeyCode::PageUp => self.messages.scroll_up(PAGE),
            KeyCode::PageDown => self.messages.scroll_down(PAGE),
            KeyCode::Char('g') | KeyCode::Home => self.messages.scroll_to_top(),
            KeyCode::Char('G') | KeyCode::End => self.messages.scroll_to_end(),
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Enter | KeyCode::Char('i') => self.focus = Pane::Compose,
            _ => {}
        }
    }
}

/// Run the chat screen until the user quits. The terminal is restored on
/// exit and on panic.
pub async fn run(screen: ChatScreen, log_buffer: LogBuffer) -> Result<()> {
    let mut terminal = ratatui::init();
    let result = run_app(&mut terminal, App::new(screen, log_buffer)).await;
    ratatui::restore();
    result
}

async fn run_app(terminal: &mut DefaultTerminal, mut app: App) -> Result<()> {
    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while !app.should_exit {
        app.log.refresh();
        if app.screen.take_scroll_request() {
            app.messages.scroll_to_end();
        }
        terminal.draw(|frame| ui::render(frame, &mut app))?;

        let step = tokio::select! {
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => Step::Key(key),
                Some(Ok(_)) => Step::Redraw,
                Some(Err(e)) => return Err(e.into()),
                None => Step::Quit,
            },
            _ = app.screen.updated() => Step::Redraw,
            _ = tick.tick() => Step::Redraw,
        };

        match step {
            Step::Key(key) => app.handle_key(key),
            Step::Redraw => {}
            Step::Quit => app.should_exit = true,
        }
    }

    let pending: Vec<_> = app.in_flight.into_iter().filter(|w| !w.is_finished()).collect();
    if !pending.is_empty() {
        tracing::debug!("Waiting for {} send(s) to finish", pending.len());
        let flush = futures::future::join_all(pending.into_iter().map(PendingWrites::settled));
        if tokio::time::timeout(FLUSH_TIMEOUT, flush).await.is_err() {
            tracing::warn!("Quit before all sends finished");
        }
    }

    tracing::debug!("Chat screen closed");
    Ok(())
}
