use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use termepub_render::DEFAULT_WRAP_WIDTH;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReaderConfig {
    /// Where `*.bm` position records live. Defaults to the platform data dir.
    pub state_dir: Option<PathBuf>,
    pub wrap_width: usize,
    pub log_filter: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            wrap_width: DEFAULT_WRAP_WIDTH,
            log_filter: "info".to_string(),
        }
    }
}

impl ReaderConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read config {:?}", path))
            }
        };
        toml::from_str(&raw).with_context(|| format!("failed to parse config {:?}", path))
    }
}
