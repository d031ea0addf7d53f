use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use epub::doc::EpubDoc;
use termepub_core::{
    ChapterRenderer, ChapterStream, DocumentMetadata, DocumentProvider, DocumentSource,
    LaidOutDocument,
};
use tracing::{debug, info, instrument};

pub const DEFAULT_WRAP_WIDTH: usize = 80;
const MIN_WRAP_WIDTH: usize = 10;

#[derive(Debug, Default)]
pub struct EpubProvider;

impl EpubProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentProvider for EpubProvider {
    #[instrument(skip(self))]
    async fn open(&self, path: &Path) -> Result<Box<dyn DocumentSource>> {
        let book = EpubBook::open(path)?;
        Ok(Box::new(book))
    }
}

pub struct EpubBook {
    path: PathBuf,
    doc: EpubDoc<BufReader<File>>,
    metadata: DocumentMetadata,
    chapter_count: usize,
}

impl EpubBook {
    pub fn open(path: &Path) -> Result<Self> {
        let doc = EpubDoc::new(path).with_context(|| format!("failed to open EPUB {:?}", path))?;
        let chapter_count = doc.get_num_pages();
        if chapter_count == 0 {
            return Err(anyhow!("{:?} has an empty spine", path));
        }
        let metadata = DocumentMetadata {
            publisher: doc.mdata("publisher").unwrap_or_default(),
            creator: doc.mdata("creator").unwrap_or_default(),
            title: doc.mdata("title").unwrap_or_default(),
        };
        info!(
            ?path,
            title = %metadata.title,
            creator = %metadata.creator,
            chapters = chapter_count,
            "opened book"
        );
        Ok(Self {
            path: path.to_path_buf(),
            doc,
            metadata,
            chapter_count,
        })
    }
}

impl DocumentSource for EpubBook {
    fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    fn chapter_count(&self) -> usize {
        self.chapter_count
    }

    fn open_chapter(&mut self, index: usize) -> Result<ChapterStream> {
        if !self.doc.set_current_page(index) {
            return Err(anyhow!(
                "chapter {} out of range ({} chapters)",
                index,
                self.chapter_count
            ));
        }
        let (bytes, media_type) = self
            .doc
            .get_current()
            .ok_or_else(|| anyhow!("spine item {} missing from {:?}", index, self.path))?;
        debug!(index, %media_type, bytes = bytes.len(), "read chapter");
        Ok(ChapterStream {
            index,
            media_type,
            bytes,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to convert markup")]
    Html(#[from] html2text::Error),
    #[error("chapter is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("unsupported media type {media_type:?}")]
    UnsupportedMedia { media_type: String },
}

/// Lays chapters out as plain text wrapped at a fixed column.
#[derive(Debug, Clone, Copy)]
pub struct HtmlRenderer {
    wrap_width: usize,
}

impl HtmlRenderer {
    pub fn new(wrap_width: usize) -> Self {
        Self {
            wrap_width: wrap_width.max(MIN_WRAP_WIDTH),
        }
    }

    pub fn wrap_width(&self) -> usize {
        self.wrap_width
    }

    pub fn render_markup(&self, chapter: &ChapterStream) -> Result<LaidOutDocument, RenderError> {
        let text = match media_essence(&chapter.media_type).as_str() {
            "application/xhtml+xml" | "text/html" => {
                html2text::from_read(chapter.bytes.as_slice(), self.wrap_width)?
            }
            "text/plain" => std::str::from_utf8(&chapter.bytes)?.to_owned(),
            _ => {
                return Err(RenderError::UnsupportedMedia {
                    media_type: chapter.media_type.clone(),
                })
            }
        };

        let mut lines: Vec<String> = text.lines().map(|line| line.trim_end().to_owned()).collect();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        if lines.is_empty() {
            lines.push(String::new());
        }
        Ok(LaidOutDocument::new(lines))
    }
}

impl Default for HtmlRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_WRAP_WIDTH)
    }
}

impl ChapterRenderer for HtmlRenderer {
    fn render(&self, chapter: &ChapterStream) -> Result<LaidOutDocument> {
        self.render_markup(chapter)
            .with_context(|| format!("failed to lay out chapter {}", chapter.index))
    }
}

fn media_essence(media_type: &str) -> String {
    media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
