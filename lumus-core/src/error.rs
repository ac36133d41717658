use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort the process before the interactive session starts.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("unable to resolve the working directory")]
    WorkingDirectory(#[source] io::Error),
    #[error("unable to read the initial directory {}", path.display())]
    InitialListing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Directory navigation failures. These never end the session; the previous
/// listing stays on screen and the message is shown as a banner.
#[derive(Debug, Error)]
pub enum NavigationError {
    #[error("cannot open {}: {source}", path.display())]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} has no parent directory", path.display())]
    NoParent { path: PathBuf },
}

impl NavigationError {
    pub(crate) fn read_directory(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::ReadDirectory {
            path: path.into(),
            source,
        }
    }
}

/// Strategy failures inside the extraction pipeline. They are logged and
/// folded into a degraded result; nothing outside the pipeline sees them.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to open document: {0}")]
    Open(#[source] anyhow::Error),
    #[error("page {page} is outside 1..={total}")]
    PageOutOfRange { page: usize, total: usize },
    #[error("text layer unavailable: {0}")]
    TextLayer(#[source] anyhow::Error),
    #[error("conversion failed: {0}")]
    Conversion(#[source] anyhow::Error),
    #[error("image export failed: {0}")]
    ImageExport(#[source] anyhow::Error),
    #[error("recognition failed: {0}")]
    Recognition(#[source] anyhow::Error),
    #[error("failed to create scratch workspace: {0}")]
    Workspace(#[source] io::Error),
}

/// Rejected page-jump input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PageInputError {
    #[error("{0:?} is not a page number")]
    NotANumber(String),
    #[error("page {page} does not exist (1..={total})")]
    OutOfRange { page: i64, total: usize },
}
