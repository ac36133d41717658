use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use lopdf::{Dictionary, Document, Object};

/// Copies page `page_index` (0-based) of `source` into a standalone
/// single-page PDF inside `dest`.
pub fn isolate_page(source: &Path, page_index: usize, dest: &Path) -> Result<PathBuf> {
    let mut document =
        Document::load(source).with_context(|| format!("failed to load {:?}", source))?;

    let keep = u32::try_from(page_index + 1)
        .with_context(|| format!("page {} is out of supported range", page_index))?;
    let pages = document.get_pages();
    if !pages.contains_key(&keep) {
        bail!("page {} out of range ({} pages)", keep, pages.len());
    }

    let others: Vec<u32> = pages.keys().copied().filter(|number| *number != keep).collect();
    document.delete_pages(&others);
    document.prune_objects();

    let target = dest.join(format!("page-{}.pdf", keep));
    document
        .save(&target)
        .with_context(|| format!("failed to write isolated page to {:?}", target))?;
    Ok(target)
}

/// Entries of the document information dictionary, if the file has one.
pub fn document_info(document: &Document) -> Vec<(String, String)> {
    let Some(info) = info_dictionary(document) else {
        return Vec::new();
    };

    info.iter()
        .filter_map(|(key, value)| match value {
            Object::String(bytes, _) => Some((
                String::from_utf8_lossy(key).into_owned(),
                decode_text(bytes),
            )),
            Object::Name(name) => Some((
                String::from_utf8_lossy(key).into_owned(),
                String::from_utf8_lossy(name).into_owned(),
            )),
            _ => None,
        })
        .collect()
}

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    match document.trailer.get(b"Info").ok()? {
        Object::Reference(id) => document.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

// text strings are either PDFDocEncoding (close enough to latin-1) or UTF-16BE with a BOM
fn decode_text(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    use super::fixtures::write_text_pdf;

    #[test]
    fn isolated_page_is_a_single_page_document() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("book.pdf");
        write_text_pdf(&source, &["Page one", "Page two", "Page three"]);

        let isolated = isolate_page(&source, 1, dir.path()).unwrap();
        assert_eq!(isolated, dir.path().join("page-2.pdf"));

        let document = Document::load(&isolated).unwrap();
        assert_eq!(document.get_pages().len(), 1);
    }

    #[test]
    fn out_of_range_page_is_rejected() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("book.pdf");
        write_text_pdf(&source, &["only page"]);

        assert!(isolate_page(&source, 3, dir.path()).is_err());
        assert!(!dir.path().join("page-4.pdf").exists());
    }

    #[test]
    fn info_dictionary_is_decoded() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("book.pdf");
        write_text_pdf(&source, &["text"]);

        let document = Document::load(&source).unwrap();
        let info = document_info(&document);
        assert!(info.contains(&("Title".to_owned(), "Field Notes".to_owned())));
        assert!(info.contains(&("Author".to_owned(), "A. Reader".to_owned())));
    }

    #[test]
    fn utf16_strings_are_decoded() {
        let bytes = [0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE7];
        assert_eq!(decode_text(&bytes), "Aç");
        assert_eq!(decode_text(b"plain"), "plain");
    }
}
