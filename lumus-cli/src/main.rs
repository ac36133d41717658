use std::env;
use std::fs;
use std::io;
use std::panic;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser};
use crossterm::cursor;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use directories::ProjectDirs;
use lumus_core::{
    panic_message, DocumentFilter, Effect, ExtractionPipeline, ExtractionResult, LumusConfig,
    NavigationError, Navigator, PageRequest, RequestId, Session, StartupError, TextRecognizer,
};
use lumus_ocr::TesseractService;
use lumus_render::{PdfExtractConverter, PdfiumProvider};
use lumus_tty::{EventMapper, TextRenderer, UiEvent};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "lumus",
    version,
    disable_version_flag = true,
    about = "Read the text of PDF files in the terminal"
)]
struct Args {
    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: (),

    /// Directory to start browsing in (defaults to the working directory)
    dir: Option<PathBuf>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(
            io::stdout(),
            EnterAlternateScreen,
            EnableMouseCapture,
            cursor::Hide
        )?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(
            io::stdout(),
            cursor::Show,
            DisableMouseCapture,
            LeaveAlternateScreen
        );
        let _ = terminal::disable_raw_mode();
    }
}

struct Completion {
    id: RequestId,
    result: ExtractionResult,
}

enum LoopAction {
    Continue,
    ContinueRedraw,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("io", "lumus", "lumus")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs)?;
    install_panic_hook();
    let config = LumusConfig::load(&project_dirs)?;

    let start_dir = match args.dir {
        Some(dir) => dir,
        None => env::current_dir().map_err(StartupError::WorkingDirectory)?,
    };
    let navigator = Navigator::open(&start_dir, DocumentFilter::from(&config.browser))
        .map_err(initial_listing_error)?;

    let provider = PdfiumProvider::new().context("the PDF library is unavailable")?;
    let ocr = match TesseractService::open(&config.ocr) {
        Ok(service) => Some(Arc::new(service)),
        Err(err) => {
            warn!(error = %err, "text recognition disabled");
            None
        }
    };
    let recognizer = ocr
        .as_ref()
        .map(|service| Arc::clone(service) as Arc<dyn TextRecognizer>);
    let pipeline = Arc::new(ExtractionPipeline::from_config(
        Arc::new(provider),
        Arc::new(PdfExtractConverter::new()),
        recognizer,
        &config.extraction,
        &config.similarity,
    ));
    info!(dir = %navigator.current_dir().display(), "session starting");

    let (columns, _) = terminal::size()?;
    let mut session = Session::new(navigator, usize::from(columns));
    let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();

    let _raw = RawModeGuard::new()?;
    let mut renderer = TextRenderer::new(io::stdout());
    let mapper = EventMapper::new();
    let mut dirty = true;

    loop {
        while let Ok(done) = rx.try_recv() {
            if session.complete(done.id, done.result) {
                dirty = true;
            }
        }

        if dirty {
            let (columns, rows) = terminal::size()?;
            renderer.draw(&session, columns, rows)?;
            dirty = false;
        }

        if event::poll(Duration::from_millis(100))? {
            let ui_event = mapper.map_event(event::read()?, session.mode());
            match handle_event(ui_event, &mut session, &pipeline, &tx) {
                LoopAction::ContinueRedraw => dirty = true,
                LoopAction::Continue => {}
                LoopAction::Quit => break,
            }
        }
    }

    renderer.clear_all()?;
    if let Some(service) = ocr {
        service.close();
    }
    info!("session finished");
    Ok(())
}

fn handle_event(
    event: UiEvent,
    session: &mut Session,
    pipeline: &Arc<ExtractionPipeline>,
    tx: &UnboundedSender<Completion>,
) -> LoopAction {
    match event {
        UiEvent::None => LoopAction::Continue,
        UiEvent::Interrupt => LoopAction::Quit,
        UiEvent::Command(command) => match session.apply(command) {
            Effect::None => LoopAction::Continue,
            Effect::Redraw => LoopAction::ContinueRedraw,
            Effect::Extract(request) => {
                dispatch(pipeline, request, tx);
                LoopAction::ContinueRedraw
            }
            Effect::Quit => LoopAction::Quit,
        },
    }
}

fn dispatch(
    pipeline: &Arc<ExtractionPipeline>,
    request: PageRequest,
    tx: &UnboundedSender<Completion>,
) {
    let pipeline = Arc::clone(pipeline);
    let tx = tx.clone();
    tokio::spawn(async move {
        let id = request.id;
        let fallback = request.clone();
        let result = match tokio::task::spawn_blocking(move || pipeline.extract(&request)).await {
            Ok(result) => result,
            Err(err) => {
                error!(%id, error = %err, "extraction task failed");
                ExtractionResult::unreadable_document(&fallback, &err)
            }
        };
        // the receiver is gone once the session has ended
        let _ = tx.send(Completion { id, result });
    });
}

fn initial_listing_error(err: NavigationError) -> anyhow::Error {
    match err {
        NavigationError::ReadDirectory { path, source } => {
            StartupError::InitialListing { path, source }.into()
        }
        other => other.into(),
    }
}

fn init_logging(project_dirs: &ProjectDirs) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "lumus.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // no console layer: the terminal belongs to the UI
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

/// Sends panic reports to the log; stderr belongs to the full-screen UI.
fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let message = panic_message(info.payload());
        match info.location() {
            Some(location) => error!(%location, panic = %message, "panic"),
            None => error!(panic = %message, "panic"),
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use clap::error::ErrorKind;
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn panics_are_written_to_the_log() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        install_panic_hook();
        let outcome = tracing::subscriber::with_default(subscriber, || {
            panic::catch_unwind(|| panic!("lopdf: malformed xref"))
        });
        let _ = panic::take_hook();

        assert!(outcome.is_err());
        let log = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(log.contains("lopdf: malformed xref"), "{log}");
        assert!(log.contains("main.rs"), "{log}");
    }

    #[test]
    fn short_version_flag_is_recognized() {
        let err = Args::try_parse_from(["lumus", "-v"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn directory_argument_is_optional() {
        let args = Args::try_parse_from(["lumus"]).unwrap();
        assert!(args.dir.is_none());

        let args = Args::try_parse_from(["lumus", "/srv/library"]).unwrap();
        assert_eq!(args.dir, Some(PathBuf::from("/srv/library")));
    }

    #[test]
    fn unreadable_start_directory_is_a_startup_error() {
        let dir = tempdir().unwrap();
        let err = Navigator::open(dir.path().join("missing"), DocumentFilter::default())
            .map_err(initial_listing_error)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StartupError>(),
            Some(StartupError::InitialListing { .. })
        ));
    }
}
