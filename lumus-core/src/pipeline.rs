use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::anyhow;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

use crate::config::{ExtractionConfig, SimilarityConfig};
use crate::error::ExtractionError;
use crate::similarity::{Agreement, Arbiter};
use crate::{
    panic_message, DocumentBackend, DocumentConverter, DocumentId, DocumentProvider, TextRecognizer,
};

pub const DEFAULT_CACHE_CAPACITY: usize = 10;
pub const DEFAULT_DOMINANT_IMAGE_RATIO: f32 = 0.8;

const UNREADABLE_PAGE_MESSAGE: &str =
    "Sorry, Lumus cannot read this page of the PDF file. But don't worry, it's doing its best!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single page to extract. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub id: RequestId,
    pub path: PathBuf,
    pub page: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    TextLayer,
    Conversion,
    Recognition,
    /// Recognized text followed by the conversion, both kept for the reader.
    Merged,
    /// Every strategy ran cleanly and none found text.
    Blank,
    Placeholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    Ok,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub page: usize,
    pub text: String,
    /// 0 when the document could not be opened.
    pub total_pages: usize,
    pub provenance: Provenance,
    pub status: ExtractionStatus,
}

impl ExtractionResult {
    pub fn unreadable_document(request: &PageRequest, reason: &dyn fmt::Display) -> Self {
        Self {
            page: request.page,
            text: format!("Error reading file {}: {}", request.path.display(), reason),
            total_pages: 0,
            provenance: Provenance::Placeholder,
            status: ExtractionStatus::Failed,
        }
    }

    fn unreadable_page(page: usize, total_pages: usize) -> Self {
        Self {
            page,
            text: UNREADABLE_PAGE_MESSAGE.to_owned(),
            total_pages,
            provenance: Provenance::Placeholder,
            status: ExtractionStatus::Failed,
        }
    }

    fn page_out_of_range(page: usize, total_pages: usize) -> Self {
        Self {
            page,
            text: format!("Page {page} does not exist; this document has {total_pages} pages."),
            total_pages,
            provenance: Provenance::Placeholder,
            status: ExtractionStatus::Failed,
        }
    }
}

/// Runs the text layer, conversion and recognition strategies for one page
/// and arbitrates between their candidates. Never fails: every error ends up
/// as a degraded status or placeholder text.
pub struct ExtractionPipeline {
    provider: Arc<dyn DocumentProvider>,
    converter: Arc<dyn DocumentConverter>,
    recognizer: Option<Arc<dyn TextRecognizer>>,
    arbiter: Arbiter,
    dominant_image_ratio: f32,
    cache_capacity: usize,
    cache: Mutex<HashMap<CacheKey, ExtractionResult>>,
}

impl ExtractionPipeline {
    pub fn new(provider: Arc<dyn DocumentProvider>, converter: Arc<dyn DocumentConverter>) -> Self {
        Self {
            provider,
            converter,
            recognizer: None,
            arbiter: Arbiter::default(),
            dominant_image_ratio: DEFAULT_DOMINANT_IMAGE_RATIO,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(
        provider: Arc<dyn DocumentProvider>,
        converter: Arc<dyn DocumentConverter>,
        recognizer: Option<Arc<dyn TextRecognizer>>,
        extraction: &ExtractionConfig,
        similarity: &SimilarityConfig,
    ) -> Self {
        let pipeline = Self::new(provider, converter)
            .with_arbiter(Arbiter::new(similarity.threshold))
            .with_dominant_image_ratio(extraction.dominant_image_ratio)
            .with_cache_capacity(extraction.cache_capacity);
        match recognizer {
            Some(recognizer) => pipeline.with_recognizer(recognizer),
            None => pipeline,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Arc<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn with_arbiter(mut self, arbiter: Arbiter) -> Self {
        self.arbiter = arbiter;
        self
    }

    pub fn with_dominant_image_ratio(mut self, ratio: f32) -> Self {
        self.dominant_image_ratio = ratio;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    #[instrument(skip(self, request), fields(id = %request.id, page = request.page, path = %request.path.display()))]
    pub fn extract(&self, request: &PageRequest) -> ExtractionResult {
        let backend = match contained(|| self.provider.open(&request.path)) {
            Ok(backend) => backend,
            Err(err) => {
                let err = ExtractionError::Open(err);
                warn!(error = %err, "document could not be opened");
                return ExtractionResult::unreadable_document(request, &err);
            }
        };

        let total_pages = backend.info().page_count;
        if request.page == 0 || request.page > total_pages {
            let err = ExtractionError::PageOutOfRange {
                page: request.page,
                total: total_pages,
            };
            warn!(error = %err, "rejected page request");
            return ExtractionResult::page_out_of_range(request.page, total_pages);
        }

        let key = CacheKey::new(backend.info().id, &backend.info().path, request.page);
        if let Some(hit) = self.cached(&key) {
            debug!("served from cache");
            return hit;
        }

        let result = self.run_strategies(backend.as_ref(), request, total_pages);
        if result.status != ExtractionStatus::Failed {
            self.store(key, &result);
        }
        result
    }

    fn run_strategies(
        &self,
        backend: &dyn DocumentBackend,
        request: &PageRequest,
        total_pages: usize,
    ) -> ExtractionResult {
        let page_index = request.page - 1;
        let mut trace = StrategyTrace::default();

        let native = match contained(|| backend.page_text(page_index)) {
            Ok(text) => text.trim().to_owned(),
            Err(err) => {
                trace.record(ExtractionError::TextLayer(err));
                String::new()
            }
        };
        if !native.is_empty() {
            return trace.finish(request.page, native, total_pages, Provenance::TextLayer);
        }

        // Dropped at the end of this function on every path.
        let workspace = match tempfile::Builder::new()
            .prefix(&format!("lumus-{}-", request.id))
            .tempdir()
        {
            Ok(dir) => Some(dir),
            Err(err) => {
                trace.record(ExtractionError::Workspace(err));
                None
            }
        };
        let scratch = workspace.as_ref().map(|dir| dir.path());

        let conversion = match scratch {
            Some(dir) => self.convert_page(backend, page_index, dir, &mut trace),
            None => String::new(),
        };

        let dominant = match contained(|| backend.largest_image(page_index)) {
            Ok(Some(coverage)) => coverage.dominates(self.dominant_image_ratio),
            Ok(None) => false,
            Err(err) => {
                trace.record(ExtractionError::ImageExport(err));
                false
            }
        };
        let divergent = self.arbiter.classify(&native, &conversion) == Agreement::Divergent;

        let recognized = if conversion.is_empty() || dominant || divergent {
            debug!(
                empty = conversion.is_empty(),
                dominant, divergent, "running recognition"
            );
            match scratch {
                Some(dir) => self.recognize_page(backend, page_index, dir, &mut trace),
                None => String::new(),
            }
        } else {
            String::new()
        };

        self.arbitrate(
            request.page,
            total_pages,
            conversion,
            recognized,
            dominant,
            trace,
        )
    }

    fn convert_page(
        &self,
        backend: &dyn DocumentBackend,
        page_index: usize,
        scratch: &Path,
        trace: &mut StrategyTrace,
    ) -> String {
        let isolated = match contained(|| backend.isolate_page(page_index, scratch)) {
            Ok(path) => path,
            Err(err) => {
                trace.record(ExtractionError::Conversion(err));
                return String::new();
            }
        };

        match contained(|| self.converter.convert(&isolated)) {
            Ok(conversion) => {
                debug!(metadata = ?conversion.metadata, "converted isolated page");
                conversion.body.trim().to_owned()
            }
            Err(err) => {
                trace.record(ExtractionError::Conversion(err));
                String::new()
            }
        }
    }

    fn recognize_page(
        &self,
        backend: &dyn DocumentBackend,
        page_index: usize,
        scratch: &Path,
        trace: &mut StrategyTrace,
    ) -> String {
        let image = match contained(|| backend.export_largest_image(page_index, scratch)) {
            Ok(Some(path)) => path,
            Ok(None) => {
                debug!("page has no embedded image to recognize");
                return String::new();
            }
            Err(err) => {
                trace.record(ExtractionError::ImageExport(err));
                return String::new();
            }
        };

        let Some(recognizer) = self.recognizer.as_ref() else {
            trace.record(ExtractionError::Recognition(anyhow!(
                "no text recognizer is available"
            )));
            return String::new();
        };

        match contained(|| recognizer.recognize(&image)) {
            Ok(text) => text.trim().to_owned(),
            Err(err) => {
                trace.record(ExtractionError::Recognition(err));
                String::new()
            }
        }
    }

    fn arbitrate(
        &self,
        page: usize,
        total_pages: usize,
        conversion: String,
        recognized: String,
        dominant: bool,
        trace: StrategyTrace,
    ) -> ExtractionResult {
        match (conversion.is_empty(), recognized.is_empty()) {
            (true, true) if trace.degraded() => ExtractionResult::unreadable_page(page, total_pages),
            (true, true) => trace.finish(page, String::new(), total_pages, Provenance::Blank),
            (false, true) => trace.finish(page, conversion, total_pages, Provenance::Conversion),
            (true, false) => trace.finish(page, recognized, total_pages, Provenance::Recognition),
            (false, false) if dominant => {
                trace.finish(page, recognized, total_pages, Provenance::Recognition)
            }
            (false, false) => match self.arbiter.classify(&conversion, &recognized) {
                Agreement::Consistent => {
                    trace.finish(page, recognized, total_pages, Provenance::Recognition)
                }
                Agreement::Divergent => trace.finish(
                    page,
                    format!("{recognized}\n{conversion}"),
                    total_pages,
                    Provenance::Merged,
                ),
            },
        }
    }

    fn cached(&self, key: &CacheKey) -> Option<ExtractionResult> {
        if self.cache_capacity == 0 {
            return None;
        }
        self.cache.lock().get(key).cloned()
    }

    fn store(&self, key: CacheKey, result: &ExtractionResult) {
        if self.cache_capacity == 0 {
            return;
        }
        let reference = key.clone();
        let mut cache = self.cache.lock();
        cache.insert(key, result.clone());

        if cache.len() > self.cache_capacity {
            let mut keys: Vec<_> = cache.keys().cloned().collect();
            keys.sort_by_key(|k| k.distance(&reference));
            for stale in keys.into_iter().skip(self.cache_capacity) {
                cache.remove(&stale);
            }
        }
    }
}

/// Runs one adapter call, turning a panic inside it into an error so the
/// strategy degrades instead of unwinding through `extract`.
fn contained<T>(call: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))))
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct CacheKey {
    document: DocumentId,
    modified: Option<SystemTime>,
    page: usize,
}

impl CacheKey {
    fn new(document: DocumentId, path: &Path, page: usize) -> Self {
        let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok();
        Self {
            document,
            modified,
            page,
        }
    }

    /// Pages of other documents are always the first to go.
    fn distance(&self, reference: &CacheKey) -> usize {
        if self.document == reference.document && self.modified == reference.modified {
            self.page.abs_diff(reference.page)
        } else {
            usize::MAX
        }
    }
}

#[derive(Default)]
struct StrategyTrace {
    failures: usize,
}

impl StrategyTrace {
    fn record(&mut self, err: ExtractionError) {
        warn!(error = %err, "extraction strategy degraded");
        self.failures += 1;
    }

    fn degraded(&self) -> bool {
        self.failures > 0
    }

    fn finish(
        self,
        page: usize,
        text: String,
        total_pages: usize,
        provenance: Provenance,
    ) -> ExtractionResult {
        ExtractionResult {
            page,
            text,
            total_pages,
            provenance,
            status: if self.degraded() {
                ExtractionStatus::Degraded
            } else {
                ExtractionStatus::Ok
            },
        }
    }
}
