// src/pdf_text.rs

use lopdf::{Dictionary, Document};
use std::path::{Path, PathBuf};
use std::{fs, io};
use thiserror::Error as ThisError;
use tracing::{debug, info};

/// A text layer with fewer non-whitespace characters than this does not
/// carry an order; the file is most likely a scan.
const MIN_TEXT_CHARS: usize = 30;

/// Share of image-only pages from which a PDF counts as scanned.
const SCANNED_PAGE_RATIO: f64 = 0.8;

///
/// OrderTextError
///

#[derive(Debug, ThisError)]
pub enum OrderTextError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a readable PDF: {reason}", .path.display())]
    UnreadablePdf { path: PathBuf, reason: String },

    #[error("{} is a scanned PDF without a text layer", .path.display())]
    Scanned { path: PathBuf },
}

/// Read purchase-order text from a file. PDFs must carry a text layer;
/// anything else is read as UTF-8.
pub fn read_order_text(path: impl AsRef<Path>) -> Result<String, OrderTextError> {
    let path = path.as_ref();
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    let text = if is_pdf {
        read_pdf(path)?
    } else {
        fs::read_to_string(path).map_err(|source| OrderTextError::Io {
            path: path.to_path_buf(),
            source,
        })?
    };

    info!(path = %path.display(), chars = text.len(), pdf = is_pdf, "Read order text");
    Ok(text)
}

fn read_pdf(path: &Path) -> Result<String, OrderTextError> {
    let bytes = fs::read(path).map_err(|source| OrderTextError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc = Document::load_mem(&bytes).map_err(|e| OrderTextError::UnreadablePdf {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let scanned = || OrderTextError::Scanned {
        path: path.to_path_buf(),
    };

    let pages = PageScan::of(&doc);
    debug!(
        total_pages = pages.total,
        image_only = pages.image_only,
        "Scanned-page analysis"
    );
    if pages.mostly_images() {
        return Err(scanned());
    }

    // pdf-extract gives up on some image-heavy files; treat that like a scan.
    let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|e| {
        debug!(error = %e, "No text layer could be extracted");
        scanned()
    })?;

    let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
    if meaningful < MIN_TEXT_CHARS {
        debug!(chars = meaningful, "Text layer too thin");
        return Err(scanned());
    }
    Ok(text)
}

/// Page counts used to decide whether a PDF is image-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageScan {
    total: usize,
    /// Pages whose resources carry XObjects but no fonts.
    image_only: usize,
}

impl PageScan {
    fn of(doc: &Document) -> Self {
        let pages = doc.get_pages();
        let image_only = pages
            .values()
            .filter_map(|id| doc.get_object(*id).ok())
            .filter_map(|obj| obj.as_dict().ok())
            .filter(|page| has_resource(doc, page, b"XObject") && !has_resource(doc, page, b"Font"))
            .count();
        Self {
            total: pages.len(),
            image_only,
        }
    }

    fn mostly_images(&self) -> bool {
        self.total > 0 && self.image_only as f64 / self.total as f64 >= SCANNED_PAGE_RATIO
    }
}

/// Whether the page's `Resources` carry a non-empty `key` dictionary.
fn has_resource(doc: &Document, page: &Dictionary, key: &[u8]) -> bool {
    page.get(b"Resources")
        .ok()
        .and_then(|r| doc.dereference(r).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .and_then(|res| res.get(key).ok())
        .and_then(|o| doc.dereference(o).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .is_some_and(|d| !d.is_empty())
}
