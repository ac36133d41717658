use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, RgbaImage};
use lumus_core::{document_id_for_path, DocumentBackend, DocumentInfo, DocumentProvider, ImageCoverage};
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

mod convert;
mod isolate;

pub use convert::PdfExtractConverter;
pub use isolate::isolate_page;

/// Opens PDFs through a single set of pdfium bindings shared by every
/// document.
pub struct PdfiumProvider {
    pdfium: Pdfium,
}

impl PdfiumProvider {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_build_hint() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self { pdfium })
    }
}

impl DocumentProvider for PdfiumProvider {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn DocumentBackend + 'a>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let document = self
            .pdfium
            .load_pdf_from_file(&absolute, None)
            .with_context(|| format!("failed to open {:?}", absolute))?;
        let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
        debug!(page_count, "opened document");

        Ok(Box::new(PdfiumDocument {
            info: DocumentInfo {
                id: document_id_for_path(&absolute),
                path: absolute,
                page_count,
            },
            document,
        }))
    }
}

struct PdfiumDocument<'a> {
    info: DocumentInfo,
    document: PdfDocument<'a>,
}

impl<'a> PdfiumDocument<'a> {
    fn page(&self, page_index: usize) -> Result<PdfPage<'_>> {
        let index: PdfPageIndex = page_index
            .try_into()
            .map_err(|_| anyhow!("page {} is out of supported range", page_index))?;
        self.document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range", page_index))
    }
}

impl DocumentBackend for PdfiumDocument<'_> {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    #[instrument(skip(self))]
    fn page_text(&self, page_index: usize) -> Result<String> {
        let page = self.page(page_index)?;
        let text = page
            .text()
            .with_context(|| format!("failed to extract text for page {}", page_index))?;
        Ok(text.all())
    }

    fn largest_image(&self, page_index: usize) -> Result<Option<ImageCoverage>> {
        let page = self.page(page_index)?;
        let Some((_, width, height)) = largest_image_object(&page) else {
            return Ok(None);
        };
        Ok(coverage(width, height, page.width().value, page.height().value))
    }

    #[instrument(skip(self, dest))]
    fn export_largest_image(&self, page_index: usize, dest: &Path) -> Result<Option<PathBuf>> {
        let page = self.page(page_index)?;
        let Some((object, _, _)) = largest_image_object(&page) else {
            return Ok(None);
        };
        let Some(image_object) = object.as_image_object() else {
            return Ok(None);
        };

        let raw = image_object
            .get_raw_image()
            .with_context(|| format!("failed to decode image on page {}", page_index))?
            .to_rgba8();
        let (width, height) = raw.dimensions();
        let buffer = RgbaImage::from_raw(width, height, raw.into_raw())
            .ok_or_else(|| anyhow!("image on page {} has an invalid buffer", page_index))?;

        let target = dest.join(format!("page-{}.png", page_index + 1));
        buffer
            .save_with_format(&target, ImageFormat::Png)
            .with_context(|| format!("failed to write {:?}", target))?;
        Ok(Some(target))
    }

    #[instrument(skip(self, dest))]
    fn isolate_page(&self, page_index: usize, dest: &Path) -> Result<PathBuf> {
        isolate::isolate_page(&self.info.path, page_index, dest)
    }
}

/// The embedded raster image with the largest area, with its size in points.
fn largest_image_object<'p>(page: &'p PdfPage<'_>) -> Option<(PdfPageObject<'p>, f32, f32)> {
    page.objects()
        .iter()
        .filter(|object| object.as_image_object().is_some())
        .filter_map(|object| {
            let width = object.width().ok()?.value;
            let height = object.height().ok()?.value;
            Some((object, width, height))
        })
        .max_by(|a, b| (a.1 * a.2).total_cmp(&(b.1 * b.2)))
}

fn coverage(width: f32, height: f32, page_width: f32, page_height: f32) -> Option<ImageCoverage> {
    if page_width <= 0.0 || page_height <= 0.0 {
        return None;
    }
    Some(ImageCoverage {
        width_ratio: (width / page_width).max(0.0),
        height_ratio: (height / page_height).max(0.0),
    })
}

fn bind_pdfium_from_build_hint() -> Option<Pdfium> {
    match option_env!("LUMUS_PDFIUM_LIBRARY_PATH") {
        Some(path) if !path.is_empty() => match Pdfium::bind_to_library(path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!(%path, %err, "failed to load pdfium from build-provided path");
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    let local_err = match Pdfium::bind_to_library(&local) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => err,
    };

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|err| {
            anyhow!(
                "failed to bind to a pdfium library; ensure it is installed ({}: {}, system: {})",
                local.display(),
                local_err,
                err
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_page_scan_dominates() {
        let scan = coverage(580.0, 760.0, 612.0, 792.0).unwrap();
        assert!(scan.dominates(0.8));
    }

    #[test]
    fn banner_image_does_not_dominate() {
        let banner = coverage(612.0, 120.0, 612.0, 792.0).unwrap();
        assert!(!banner.dominates(0.8));
    }

    #[test]
    fn degenerate_page_has_no_coverage() {
        assert!(coverage(10.0, 10.0, 0.0, 792.0).is_none());
    }
}
