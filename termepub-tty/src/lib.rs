use std::io::{self, Stdout, Write};
use std::panic;

use anyhow::Result;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    style::{Attribute, Print, SetAttribute},
    terminal::{self, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use termepub_core::{Command, Frontend, ReaderError, View};
use tracing::trace;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Raw mode plus alternate screen for as long as the guard lives.
pub struct RawModeGuard;

impl RawModeGuard {
    pub fn new() -> Result<Self> {
        terminal::enable_raw_mode()?;
        let guard = Self;
        crossterm::execute!(io::stdout(), EnterAlternateScreen, cursor::Hide)?;
        Ok(guard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        restore_terminal();
    }
}

fn restore_terminal() {
    let mut stdout = io::stdout();
    let _ = crossterm::execute!(stdout, LeaveAlternateScreen, cursor::Show);
    let _ = terminal::disable_raw_mode();
}

/// Restores the terminal before the default hook prints, so panic messages
/// are not swallowed by the alternate screen.
pub fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        restore_terminal();
        default_hook(info);
    }));
}

/// Splits a terminal of `columns` x `rows` into the text area, leaving the
/// last row for the status line.
pub fn text_area(columns: u16, rows: u16) -> (usize, usize) {
    let width = usize::from(columns).max(1);
    let height = usize::from(rows).saturating_sub(1).max(1);
    (width, height)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawParams {
    pub columns: usize,
    pub rows: usize,
}

impl DrawParams {
    pub fn clamped(columns: u16, rows: u16) -> Self {
        Self {
            columns: usize::from(columns).max(1),
            rows: usize::from(rows).max(1),
        }
    }
}

pub struct TextRenderer<W: Write> {
    writer: W,
}

impl<W: Write> TextRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn draw(&mut self, view: &View<'_>, params: DrawParams) -> io::Result<()> {
        self.begin_sync_update()?;
        crossterm::queue!(self.writer, Clear(ClearType::All))?;

        let text_rows = params.rows.saturating_sub(1).max(1);
        let visible = view
            .document
            .lines()
            .iter()
            .skip(view.scroll_y)
            .take(text_rows);
        for (row, line) in visible.enumerate() {
            crossterm::queue!(
                self.writer,
                cursor::MoveTo(0, row as u16),
                Print(slice_columns(line, view.scroll_x, params.columns))
            )?;
        }

        if params.rows > 1 {
            let mut status = slice_columns(&format_status(view), 0, params.columns);
            let padding = params.columns.saturating_sub(UnicodeWidthStr::width(status.as_str()));
            status.extend(std::iter::repeat(' ').take(padding));
            crossterm::queue!(
                self.writer,
                cursor::MoveTo(0, text_rows as u16),
                SetAttribute(Attribute::Reverse),
                Print(status),
                SetAttribute(Attribute::Reset)
            )?;
        }

        self.end_sync_update()
    }

    pub fn begin_sync_update(&mut self) -> io::Result<()> {
        write!(self.writer, "\u{1b}[?2026h")
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> io::Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()
    }
}

/// Cuts `line` to the display columns `[start, start + width)`. Wide
/// characters that straddle either edge are dropped.
pub fn slice_columns(line: &str, start: usize, width: usize) -> String {
    let end = start.saturating_add(width);
    let mut column = 0;
    let mut out = String::new();
    for ch in line.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if column >= end {
            break;
        }
        if column >= start && column + ch_width <= end {
            out.push(ch);
        }
        column += ch_width;
    }
    out
}

pub fn format_status(view: &View<'_>) -> String {
    let percent = if view.max_scroll_y == 0 {
        100
    } else {
        view.scroll_y * 100 / view.max_scroll_y
    };
    let title = if view.title.is_empty() {
        "<untitled>"
    } else {
        view.title
    };
    format!(
        "{} — chapter {}/{} — {}%",
        title,
        view.chapter + 1,
        view.chapter_count,
        percent
    )
}

#[derive(Debug, Default)]
pub struct EventMapper;

impl EventMapper {
    pub fn new() -> Self {
        Self
    }

    pub fn map_event(&mut self, event: Event) -> Option<Command> {
        match event {
            Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) if kind != KeyEventKind::Release => self.map_key(code, modifiers),
            Event::Resize(columns, rows) => {
                let (width, height) = text_area(columns, rows);
                Some(Command::Resize { width, height })
            }
            _ => None,
        }
    }

    /// Like [`map_event`](Self::map_event), but unmapped input still asks
    /// for a repaint.
    pub fn command_for(&mut self, event: Event) -> Command {
        self.map_event(event).unwrap_or(Command::Redraw)
    }

    fn map_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Option<Command> {
        if modifiers.contains(KeyModifiers::CONTROL) {
            return match code {
                KeyCode::Char('c') => Some(Command::Quit),
                _ => None,
            };
        }
        let command = match code {
            KeyCode::Esc | KeyCode::Char('q') => Command::Quit,
            KeyCode::Down | KeyCode::Char('j') => Command::LineDown,
            KeyCode::Up | KeyCode::Char('k') => Command::LineUp,
            KeyCode::Left | KeyCode::Char('h') => Command::ColumnLeft,
            KeyCode::Right | KeyCode::Char('l') => Command::ColumnRight,
            KeyCode::PageDown | KeyCode::Char('f') | KeyCode::Char(' ') => Command::PageForward,
            KeyCode::PageUp | KeyCode::Char('b') => Command::PageBackward,
            KeyCode::Home | KeyCode::Char('g') => Command::Top,
            KeyCode::End | KeyCode::Char('G') => Command::Bottom,
            KeyCode::Char('L') => Command::NextChapter,
            KeyCode::Char('H') => Command::PrevChapter,
            _ => return None,
        };
        Some(command)
    }
}

pub struct TerminalFrontend {
    renderer: TextRenderer<Stdout>,
    mapper: EventMapper,
}

impl TerminalFrontend {
    pub fn new() -> Self {
        Self {
            renderer: TextRenderer::new(io::stdout()),
            mapper: EventMapper::new(),
        }
    }

    /// Text area of the current terminal.
    pub fn viewport_size() -> io::Result<(usize, usize)> {
        let (columns, rows) = terminal::size()?;
        Ok(text_area(columns, rows))
    }
}

impl Default for TerminalFrontend {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontend for TerminalFrontend {
    fn next_command(&mut self) -> Result<Command, ReaderError> {
        let event = event::read()?;
        trace!(?event, "terminal event");
        Ok(self.mapper.command_for(event))
    }

    fn draw(&mut self, view: &View<'_>) -> Result<(), ReaderError> {
        let (columns, rows) = terminal::size()?;
        self.renderer.draw(view, DrawParams::clamped(columns, rows))?;
        Ok(())
    }
}
