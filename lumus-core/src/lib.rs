use std::any::Any;
use std::path::{Path, PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use uuid::Uuid;

pub mod config;
pub mod error;
pub mod navigator;
pub mod pipeline;
pub mod session;
pub mod similarity;
pub mod wrap;

pub use config::LumusConfig;
pub use error::{ExtractionError, NavigationError, PageInputError, StartupError};
pub use navigator::{DocumentFilter, Entry, EntryKind, Navigator};
pub use pipeline::{
    ExtractionPipeline, ExtractionResult, ExtractionStatus, PageRequest, Provenance, RequestId,
};
pub use session::{Command, Effect, Mode, Session};
pub use similarity::{Agreement, Arbiter, Threshold};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> =
    Lazy::new(|| Uuid::new_v5(&Uuid::NAMESPACE_URL, b"https://lumus.invalid/documents"));

/// Stable id for a document, derived from its canonical path.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    Uuid::new_v5(&DOCUMENT_NAMESPACE, resolved.to_string_lossy().as_bytes())
}

/// Text carried by a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
}

/// Share of the page covered by an embedded image, per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageCoverage {
    pub width_ratio: f32,
    pub height_ratio: f32,
}

impl ImageCoverage {
    pub fn dominates(&self, ratio: f32) -> bool {
        self.width_ratio >= ratio && self.height_ratio >= ratio
    }
}

#[derive(Debug, Clone, Default)]
pub struct Conversion {
    pub body: String,
    pub metadata: Vec<(String, String)>,
}

/// An opened document. Page indices are 0-based.
pub trait DocumentBackend {
    fn info(&self) -> &DocumentInfo;
    fn page_text(&self, page_index: usize) -> Result<String>;
    /// Coverage of the largest embedded raster image, if the page has any.
    fn largest_image(&self, page_index: usize) -> Result<Option<ImageCoverage>>;
    fn export_largest_image(&self, page_index: usize, dest: &Path) -> Result<Option<PathBuf>>;
    /// Writes the page as a standalone single-page document inside `dest`.
    fn isolate_page(&self, page_index: usize, dest: &Path) -> Result<PathBuf>;
}

pub trait DocumentProvider: Send + Sync {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn DocumentBackend + 'a>>;
}

pub trait DocumentConverter: Send + Sync {
    fn convert(&self, path: &Path) -> Result<Conversion>;
}

pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &Path) -> Result<String>;
}
