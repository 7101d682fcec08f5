
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{Document, Page};
use crate::{AssistantError, Result};

/// A contiguous slice of one page's text, the unit of embedding and retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text
    pub text: String,
    /// Page the chunk was cut from
    pub page: u32,
    /// Index of this chunk within its page
    pub chunk_index: usize,
    /// Offset of the first character within the page text, in characters
    pub start_offset: usize,
    /// Length in characters
    pub char_len: usize,
}

impl Chunk {
    /// Character offset one past the last character of the chunk
    #[inline]
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.char_len
    }
}

/// Sliding window parameters, measured in characters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 100,
        }
    }
}

impl ChunkingConfig {
    /// Distance between the starts of adjacent chunks
    #[inline]
    pub fn stride(&self) -> Result<usize> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(AssistantError::Config(format!(
                "chunk overlap ({}) must be smaller than a non-zero chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(self.chunk_size - self.chunk_overlap)
    }

    /// Number of chunks a text of `char_len` characters splits into
    #[inline]
    pub fn expected_chunk_count(&self, char_len: usize) -> Result<usize> {
        let stride = self.stride()?;
        Ok(match char_len {
            0 => 0,
            len if len <= self.chunk_size => 1,
            len => (len - self.chunk_size).div_ceil(stride) + 1,
        })
    }
}

/// Split every page of a document, page by page; chunks never span pages
#[inline]
pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();

    for page in &document.pages {
        chunks.extend(chunk_page(page, config)?);
    }

    debug!(
        "Chunked '{}' into {} chunks across {} pages",
        document.source,
        chunks.len(),
        document.pages.len()
    );

    Ok(chunks)
}

#[inline]
pub fn chunk_page(page: &Page, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    chunk_text(&page.text, page.number, config)
}

/// Split text into fixed-size overlapping windows.
///
/// The last window always ends at the end of the text, so nothing is dropped.
/// Text that is empty or only whitespace yields no chunks.
#[inline]
#[expect(
    clippy::string_slice,
    reason = "slice offsets are taken from char_indices"
)]
pub fn chunk_text(text: &str, page: u32, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let stride = config.stride()?;

    // Byte offset of every character start, plus the end of the string
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;
    let count = config.expected_chunk_count(char_len)?;

    let chunks = (0..count)
        .map(|chunk_index| {
            let start = chunk_index * stride;
            let end = (start + config.chunk_size).min(char_len);
            Chunk {
                text: text[boundaries[start]..boundaries[end]].to_string(),
                page,
                chunk_index,
                start_offset: start,
                char_len: end - start,
            }
        })
        .collect();

    Ok(chunks)
}
