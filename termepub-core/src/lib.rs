use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::debug;
use unicode_width::UnicodeWidthStr;

mod session;
mod viewport;

pub use session::{run, Command, Flow, Frontend, Session, View};
pub use viewport::Viewport;

/// Lookup key for a persisted reading position.
///
/// Derived from book metadata only, so two books with identical publisher,
/// creator and title share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn derive(publisher: &str, creator: &str, title: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}-{}-{}", publisher, creator, title).as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub publisher: String,
    pub creator: String,
    pub title: String,
}

impl DocumentMetadata {
    pub fn key(&self) -> DocumentKey {
        DocumentKey::derive(&self.publisher, &self.creator, &self.title)
    }
}

/// Chapter and vertical offset. The horizontal offset is never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub chapter: usize,
    pub scroll_y: usize,
}

impl Position {
    pub fn new(chapter: usize, scroll_y: usize) -> Self {
        Self { chapter, scroll_y }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.chapter, self.scroll_y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected `<chapter>,<line>`")]
pub struct MalformedPosition;

impl FromStr for Position {
    type Err = MalformedPosition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chapter, scroll_y) = s.trim().split_once(',').ok_or(MalformedPosition)?;
        let chapter = chapter.trim().parse().map_err(|_| MalformedPosition)?;
        let scroll_y = scroll_y.trim().parse().map_err(|_| MalformedPosition)?;
        Ok(Self { chapter, scroll_y })
    }
}

/// Raw bytes of one spine item as handed out by a [`DocumentSource`].
#[derive(Debug, Clone)]
pub struct ChapterStream {
    pub index: usize,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

/// A chapter after layout: plain lines plus the display width of the widest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaidOutDocument {
    lines: Vec<String>,
    width: usize,
}

impl LaidOutDocument {
    pub fn new(lines: Vec<String>) -> Self {
        let width = lines
            .iter()
            .map(|line| UnicodeWidthStr::width(line.as_str()))
            .max()
            .unwrap_or(0);
        Self { lines, width }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(text.lines().map(str::to_owned).collect())
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn height(&self) -> usize {
        self.lines.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("document has no chapters")]
    EmptyDocument,
    #[error("chapter {index} out of range ({count} chapters)")]
    ChapterOutOfRange { index: usize, count: usize },
    #[error("failed to open chapter {index}")]
    Source {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to render chapter {index}")]
    Render {
        index: usize,
        #[source]
        source: anyhow::Error,
    },
    #[error("terminal i/o failed")]
    Terminal(#[from] io::Error),
}

pub trait DocumentSource: Send {
    fn metadata(&self) -> &DocumentMetadata;
    fn chapter_count(&self) -> usize;
    fn open_chapter(&mut self, index: usize) -> Result<ChapterStream>;
}

pub trait ChapterRenderer: Send + Sync {
    fn render(&self, chapter: &ChapterStream) -> Result<LaidOutDocument>;
}

#[async_trait::async_trait]
pub trait DocumentProvider: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn DocumentSource>>;
}

/// Persisted reading positions.
///
/// `load` never fails: a missing or unreadable record means "start at the
/// beginning". `save` reports errors, but callers are expected to log and
/// carry on.
pub trait PositionStore: Send + Sync {
    fn load(&self, key: &DocumentKey) -> Position;
    fn save(&self, key: &DocumentKey, position: Position) -> io::Result<()>;
}

const RECORD_EXTENSION: &str = "bm";

pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn record_path(&self, key: &DocumentKey) -> PathBuf {
        self.root.join(format!("{}.{}", key, RECORD_EXTENSION))
    }
}

impl PositionStore for FileStateStore {
    fn load(&self, key: &DocumentKey) -> Position {
        let path = self.record_path(key);
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) => {
                debug!(?path, %err, "no stored position");
                return Position::default();
            }
        };
        match data.parse() {
            Ok(position) => position,
            Err(err) => {
                debug!(?path, %err, "ignoring malformed position record");
                Position::default()
            }
        }
    }

    fn save(&self, key: &DocumentKey, position: Position) -> io::Result<()> {
        let path = self.record_path(key);
        let tmp = path.with_extension("bm.tmp");
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp)?;
        let written = file
            .write_all(position.to_string().as_bytes())
            .and_then(|()| file.flush())
            .and_then(|()| fs::rename(&tmp, &path));
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }
        Ok(())
    }
}

pub struct MemoryStateStore {
    inner: Mutex<HashMap<DocumentKey, Position>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionStore for MemoryStateStore {
    fn load(&self, key: &DocumentKey) -> Position {
        self.inner.lock().get(key).copied().unwrap_or_default()
    }

    fn save(&self, key: &DocumentKey, position: Position) -> io::Result<()> {
        self.inner.lock().insert(key.clone(), position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use tempfile::tempdir;

    #[test]
    fn document_key_is_stable_for_same_metadata() {
        let first = DocumentKey::derive("Penguin", "Austen", "Emma");
        let second = DocumentKey::derive("Penguin", "Austen", "Emma");

        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 64);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn document_keys_do_not_collide_across_corpus() {
        let corpus = [
            ("Penguin", "Austen", "Emma"),
            ("Penguin", "Austen", "Persuasion"),
            ("Vintage", "Austen", "Emma"),
            ("Penguin", "Bronte", "Emma"),
            ("", "", ""),
            ("", "", "Emma"),
            ("Penguin", "", ""),
            ("Penguin Classics", "Jane Austen", "Emma"),
        ];

        let keys: HashSet<_> = corpus
            .iter()
            .map(|(p, c, t)| DocumentKey::derive(p, c, t))
            .collect();
        assert_eq!(keys.len(), corpus.len());
    }

    #[test]
    fn metadata_key_matches_derived_key() {
        let metadata = DocumentMetadata {
            publisher: "Penguin".into(),
            creator: "Austen".into(),
            title: "Emma".into(),
        };
        assert_eq!(metadata.key(), DocumentKey::derive("Penguin", "Austen", "Emma"));
    }

    #[test]
    fn position_parses_two_integers() {
        assert_eq!("3,42".parse::<Position>(), Ok(Position::new(3, 42)));
        assert_eq!(" 1 , 7\n".parse::<Position>(), Ok(Position::new(1, 7)));
        assert_eq!(Position::new(3, 42).to_string(), "3,42");
    }

    #[test]
    fn position_rejects_malformed_records() {
        assert!("".parse::<Position>().is_err());
        assert!("abc".parse::<Position>().is_err());
        assert!("3".parse::<Position>().is_err());
        assert!("3,x".parse::<Position>().is_err());
        assert!("-1,4".parse::<Position>().is_err());
    }

    #[test]
    fn file_state_store_round_trips_position() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("bookmarks")).unwrap();
        let key = DocumentKey::derive("Penguin", "Austen", "Emma");

        store.save(&key, Position::new(4, 17)).unwrap();
        assert_eq!(store.load(&key), Position::new(4, 17));

        store.save(&key, Position::new(5, 0)).unwrap();
        assert_eq!(store.load(&key), Position::new(5, 0));

        let on_disk = std::fs::read_to_string(store.record_path(&key)).unwrap();
        assert_eq!(on_disk, "5,0");
    }

    #[test]
    fn file_state_store_names_records_by_key() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();
        let key = DocumentKey::derive("a", "b", "c");

        let path = store.record_path(&key);
        assert_eq!(
            path.file_name().and_then(|s| s.to_str()),
            Some(format!("{}.bm", key).as_str())
        );
    }

    #[test]
    fn file_state_store_defaults_for_absent_key() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();
        let key = DocumentKey::derive("nobody", "nowhere", "nothing");

        assert_eq!(store.load(&key), Position::default());
    }

    #[test]
    fn file_state_store_defaults_for_corrupted_record() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();
        let key = DocumentKey::derive("Penguin", "Austen", "Emma");

        std::fs::write(store.record_path(&key), "garbage").unwrap();
        assert_eq!(store.load(&key), Position::new(0, 0));
    }

    #[cfg(unix)]
    #[test]
    fn file_state_store_reports_unwritable_directory() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("bookmarks")).unwrap();
        std::fs::remove_dir_all(store.root()).unwrap();
        let key = DocumentKey::derive("Penguin", "Austen", "Emma");

        assert!(store.save(&key, Position::new(1, 1)).is_err());
        assert_eq!(store.load(&key), Position::default());
    }

    #[test]
    fn file_state_store_removes_temp_file_when_rename_fails() {
        let dir = tempdir().unwrap();
        let store = FileStateStore::new(dir.path().to_path_buf()).unwrap();
        let key = DocumentKey::derive("Penguin", "Austen", "Emma");
        let record = store.record_path(&key);
        std::fs::create_dir(&record).unwrap();
        std::fs::write(record.join("occupied"), "x").unwrap();

        assert!(store.save(&key, Position::new(2, 3)).is_err());
        assert!(!record.with_extension("bm.tmp").exists());
        assert_eq!(store.load(&key), Position::default());
    }

    #[test]
    fn memory_state_store_round_trips_position() {
        let store = MemoryStateStore::new();
        let key = DocumentKey::derive("Penguin", "Austen", "Emma");

        assert_eq!(store.load(&key), Position::default());
        store.save(&key, Position::new(2, 9)).unwrap();
        assert_eq!(store.load(&key), Position::new(2, 9));
    }

    #[test]
    fn laid_out_document_measures_widest_line() {
        let doc = LaidOutDocument::from_text("short\na much longer line\n\nmid");
        assert_eq!(doc.height(), 4);
        assert_eq!(doc.width(), "a much longer line".len());
        assert_eq!(LaidOutDocument::default().width(), 0);
    }

    #[test]
    fn laid_out_document_measures_wide_characters_in_columns() {
        let doc = LaidOutDocument::new(vec!["日本語".to_string()]);
        assert_eq!(doc.width(), 6);
    }
}
