//! Source document loading.
//!
//! PDFs are read with `lopdf` and reduced to one text string per page. Nothing
//! about the document outlives chunking.


use std::path::Path;

use tracing::{debug, info, warn};

use crate::{AssistantError, Result};

/// A loaded source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Where the document came from (path or caller supplied label)
    pub source: String,
    /// Pages in reading order
    pub pages: Vec<Page>,
}

/// Raw text of one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    pub text: String,
}

impl Document {
    /// Build a document from in-memory page texts, numbering pages from 1
    #[inline]
    pub fn from_pages<I, S>(source: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = pages
            .into_iter()
            .zip(1..)
            .map(|(text, number)| Page {
                number,
                text: text.into(),
            })
            .collect();

        Self {
            source: source.into(),
            pages,
        }
    }

    /// Total extractable text length in characters
    #[inline]
    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|page| page.text.chars().count()).sum()
    }
}

/// Load a PDF and extract the text of every page
#[inline]
pub fn load_pdf(path: &Path) -> Result<Document> {
    debug!("Loading document from {}", path.display());

    if !path.is_file() {
        return Err(AssistantError::DocumentLoad(format!(
            "{} does not exist or is not a file",
            path.display()
        )));
    }

    let is_pdf = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(AssistantError::DocumentLoad(format!(
            "{} is not a supported document type (expected .pdf)",
            path.display()
        )));
    }

    let pdf = lopdf::Document::load(path).map_err(|e| {
        AssistantError::DocumentLoad(format!("Failed to read {}: {}", path.display(), e))
    })?;

    let page_numbers: Vec<u32> = pdf.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(AssistantError::DocumentLoad(format!(
            "{} contains no pages",
            path.display()
        )));
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    for number in page_numbers {
        let text = pdf.extract_text(&[number]).map_err(|e| {
            AssistantError::DocumentLoad(format!(
                "Failed to extract text from page {} of {}: {}",
                number,
                path.display(),
                e
            ))
        })?;

        if text.trim().is_empty() {
            warn!("Page {} of {} has no extractable text", number, path.display());
        }

        pages.push(Page { number, text });
    }

    let document = Document {
        source: path.display().to_string(),
        pages,
    };

    info!(
        "Loaded {} ({} pages, {} characters)",
        document.source,
        document.pages.len(),
        document.total_chars()
    );

    Ok(document)
}
