use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use directories::ProjectDirs;
use termepub_core::{
    run, Command, DocumentProvider, FileStateStore, MemoryStateStore, PositionStore, Session,
    Viewport,
};
use termepub_render::{EpubProvider, HtmlRenderer};
use termepub_tty::{install_panic_hook, RawModeGuard, TerminalFrontend};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod config;

use config::ReaderConfig;

#[derive(Debug, Parser)]
#[command(name = "termepub", version, about = "terminal EPUB reader")]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Directory for saved reading positions
    #[arg(long = "state-dir")]
    state_dir: Option<PathBuf>,

    /// Column at which chapters are wrapped
    #[arg(short = 'w', long = "wrap-width")]
    wrap_width: Option<usize>,

    /// Chapter to open instead of the saved one (0-based)
    #[arg(long = "chapter")]
    chapter: Option<usize>,

    /// Path to the EPUB file
    file: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "termepub", "termepub")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let mut config = ReaderConfig::load(&config_path)?;
    if let Some(state_dir) = args.state_dir.clone() {
        config.state_dir = Some(state_dir);
    }
    if let Some(wrap_width) = args.wrap_width {
        config.wrap_width = wrap_width;
    }

    let _log_guard = init_logging(&project_dirs, &config.log_filter)?;
    let state_dir = config
        .state_dir
        .clone()
        .unwrap_or_else(|| project_dirs.data_local_dir().join("bookmarks"));
    let store: Arc<dyn PositionStore> = match FileStateStore::new(state_dir.clone()) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            warn!(?state_dir, %err, "positions will not be saved across sessions");
            Arc::new(MemoryStateStore::new())
        }
    };

    let source = EpubProvider::new()
        .open(&args.file)
        .await
        .with_context(|| format!("failed to open {:?}", args.file))?;
    let renderer = Arc::new(HtmlRenderer::new(config.wrap_width));
    let (width, height) = TerminalFrontend::viewport_size()?;
    let mut session = Session::open(source, renderer, store, Viewport::new(width, height))
        .with_context(|| format!("failed to load {:?}", args.file))?;
    if let Some(index) = args.chapter {
        session.apply(Command::GotoChapter { index })?;
    }

    install_panic_hook();
    let _raw = RawModeGuard::new()?;
    let mut frontend = TerminalFrontend::new();
    run(&mut session, &mut frontend)?;

    info!(key = %session.key(), position = %session.position(), "closing book");
    Ok(())
}

fn init_logging(project_dirs: &ProjectDirs, filter: &str) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "termepub.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // The terminal belongs to the reader, so logs only go to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn args_parse_overrides() {
        let args = Args::try_parse_from([
            "termepub",
            "--state-dir",
            "/tmp/marks",
            "-w",
            "100",
            "--chapter",
            "3",
            "book.epub",
        ])
        .unwrap();

        assert_eq!(args.state_dir, Some(PathBuf::from("/tmp/marks")));
        assert_eq!(args.wrap_width, Some(100));
        assert_eq!(args.chapter, Some(3));
        assert_eq!(args.file, PathBuf::from("book.epub"));
    }

    #[test]
    fn args_require_a_file() {
        assert!(Args::try_parse_from(["termepub"]).is_err());
    }
}
