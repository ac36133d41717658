use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use lopdf::Document;
use lumus_core::{panic_message, Conversion, DocumentConverter};
use tracing::{debug, instrument};

use crate::isolate::document_info;

/// Generic document-to-text conversion backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractConverter;

impl PdfExtractConverter {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentConverter for PdfExtractConverter {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn convert(&self, path: &Path) -> Result<Conversion> {
        let bytes = std::fs::read(path).with_context(|| format!("failed to read {:?}", path))?;

        // pdf-extract panics on some malformed inputs
        let body = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem(&bytes)
        }))
        .map_err(|payload| anyhow!("converter panicked: {}", panic_message(payload.as_ref())))?
        .with_context(|| format!("failed to convert {:?}", path))?;

        let metadata = match Document::load_mem(&bytes) {
            Ok(document) => document_info(&document),
            Err(err) => {
                debug!(%err, "no document info available");
                Vec::new()
            }
        };

        Ok(Conversion { body, metadata })
    }
}
