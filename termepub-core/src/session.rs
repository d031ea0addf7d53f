use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::{
    ChapterRenderer, DocumentKey, DocumentSource, LaidOutDocument, Position, PositionStore,
    ReaderError, Viewport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    LineDown,
    LineUp,
    ColumnLeft,
    ColumnRight,
    PageForward,
    PageBackward,
    Top,
    Bottom,
    NextChapter,
    PrevChapter,
    Resize { width: usize, height: usize },
    GotoChapter { index: usize },
    /// Repaints the current frame. Frontends send it for input they do not
    /// map to anything else.
    Redraw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Everything a frontend needs to paint one frame.
#[derive(Debug, Clone, Copy)]
pub struct View<'a> {
    pub document: &'a LaidOutDocument,
    pub title: &'a str,
    pub chapter: usize,
    pub chapter_count: usize,
    pub scroll_x: usize,
    pub scroll_y: usize,
    pub max_scroll_y: usize,
}

pub trait Frontend {
    /// Blocks until the user produces a command.
    fn next_command(&mut self) -> Result<Command, ReaderError>;
    fn draw(&mut self, view: &View<'_>) -> Result<(), ReaderError>;
}

pub struct Session {
    source: Box<dyn DocumentSource>,
    renderer: Arc<dyn ChapterRenderer>,
    store: Arc<dyn PositionStore>,
    key: DocumentKey,
    chapter: usize,
    document: LaidOutDocument,
    viewport: Viewport,
}

impl Session {
    /// Opens the book at its stored position.
    ///
    /// A stored chapter past the end of the book is clamped to the last
    /// chapter; the stored line is clamped once the chapter is laid out.
    pub fn open(
        source: Box<dyn DocumentSource>,
        renderer: Arc<dyn ChapterRenderer>,
        store: Arc<dyn PositionStore>,
        viewport: Viewport,
    ) -> Result<Self, ReaderError> {
        let count = source.chapter_count();
        if count == 0 {
            return Err(ReaderError::EmptyDocument);
        }
        let key = source.metadata().key();
        let restored = store.load(&key);
        info!(%key, chapter = restored.chapter, line = restored.scroll_y, "restoring position");

        let mut session = Self {
            source,
            renderer,
            store,
            key,
            chapter: 0,
            document: LaidOutDocument::default(),
            viewport,
        };
        session.load_chapter(restored.chapter.min(count - 1))?;
        session.viewport.scroll_to(restored.scroll_y);
        Ok(session)
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn chapter(&self) -> usize {
        self.chapter
    }

    pub fn chapter_count(&self) -> usize {
        self.source.chapter_count()
    }

    pub fn document(&self) -> &LaidOutDocument {
        &self.document
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn position(&self) -> Position {
        Position::new(self.chapter, self.viewport.scroll_y())
    }

    pub fn view(&self) -> View<'_> {
        View {
            document: &self.document,
            title: &self.source.metadata().title,
            chapter: self.chapter,
            chapter_count: self.chapter_count(),
            scroll_x: self.viewport.scroll_x(),
            scroll_y: self.viewport.scroll_y(),
            max_scroll_y: self.viewport.max_scroll_y(),
        }
    }

    pub fn apply(&mut self, command: Command) -> Result<Flow, ReaderError> {
        let persist = match command {
            Command::Quit => return Ok(Flow::Quit),
            Command::LineDown => {
                self.viewport.scroll_down();
                true
            }
            Command::LineUp => {
                self.viewport.scroll_up();
                true
            }
            Command::ColumnLeft => {
                self.viewport.scroll_left();
                false
            }
            Command::ColumnRight => {
                self.viewport.scroll_right();
                false
            }
            Command::PageForward => {
                if !self.viewport.page_down() || self.is_last_chapter() {
                    false
                } else {
                    self.load_chapter(self.chapter + 1)?;
                    self.viewport.to_top();
                    true
                }
            }
            Command::PageBackward => {
                if !self.viewport.page_up() || self.chapter == 0 {
                    false
                } else {
                    self.load_chapter(self.chapter - 1)?;
                    self.viewport.to_bottom();
                    true
                }
            }
            Command::Top => {
                self.viewport.to_top();
                true
            }
            Command::Bottom => {
                self.viewport.to_bottom();
                true
            }
            Command::NextChapter => {
                if self.is_last_chapter() {
                    false
                } else {
                    self.load_chapter(self.chapter + 1)?;
                    self.viewport.to_top();
                    true
                }
            }
            Command::PrevChapter => {
                if self.chapter == 0 {
                    false
                } else {
                    self.load_chapter(self.chapter - 1)?;
                    self.viewport.to_top();
                    true
                }
            }
            Command::Resize { width, height } => {
                self.viewport.resize(width, height);
                false
            }
            Command::Redraw => false,
            Command::GotoChapter { index } => {
                let target = index.min(self.chapter_count() - 1);
                self.load_chapter(target)?;
                self.viewport.to_top();
                true
            }
        };

        debug!(?command, position = %self.position(), persist, "applied command");
        if persist {
            self.persist();
        }
        Ok(Flow::Continue)
    }

    fn is_last_chapter(&self) -> bool {
        self.chapter + 1 >= self.chapter_count()
    }

    fn persist(&self) {
        let position = self.position();
        if let Err(err) = self.store.save(&self.key, position) {
            warn!(%err, key = %self.key, "failed to save reading position");
        }
    }

    /// Replaces the current chapter. The index only moves once the new
    /// chapter has rendered.
    #[instrument(skip(self))]
    fn load_chapter(&mut self, index: usize) -> Result<(), ReaderError> {
        let count = self.chapter_count();
        if index >= count {
            return Err(ReaderError::ChapterOutOfRange { index, count });
        }
        let stream = self
            .source
            .open_chapter(index)
            .map_err(|source| ReaderError::Source { index, source })?;
        let document = self
            .renderer
            .render(&stream)
            .map_err(|source| ReaderError::Render { index, source })?;

        info!(
            chapter = index,
            lines = document.height(),
            width = document.width(),
            "loaded chapter"
        );
        self.viewport.set_extent(document.height(), document.width());
        self.document = document;
        self.chapter = index;
        Ok(())
    }
}

/// Drives a session until the user quits or a fatal error occurs.
///
/// The frontend redraws after every command, including ones that change
/// nothing.
pub fn run<F: Frontend>(session: &mut Session, frontend: &mut F) -> Result<(), ReaderError> {
    frontend.draw(&session.view())?;
    loop {
        let command = frontend.next_command()?;
        if session.apply(command)? == Flow::Quit {
            return Ok(());
        }
        frontend.draw(&session.view())?;
    }
}
