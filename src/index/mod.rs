// Vector index module
// Exhaustive nearest-neighbour search over embedded chunks, plus on-disk snapshots


pub mod store;

pub use store::{IndexManifest, Snapshot, load_snapshot, save_snapshot};

use tracing::debug;
use uuid::Uuid;

use crate::embeddings::Chunk;
use crate::{AssistantError, Result};

/// One embedded chunk as stored in the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Unique identifier for this entry
    pub id: String,
    /// The chunk text returned to callers
    pub text: String,
    /// 1-based page number the chunk was cut from
    pub page: u32,
    /// Position of the chunk within its page
    pub chunk_index: usize,
    /// Character offset of the chunk within its page
    pub start_offset: usize,
    pub vector: Vec<f32>,
}

impl IndexEntry {
    #[inline]
    pub fn from_chunk(chunk: &Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: chunk.text.clone(),
            page: chunk.page,
            chunk_index: chunk.chunk_index,
            start_offset: chunk.start_offset,
            vector,
        }
    }
}

/// A chunk returned by a nearest-neighbour query
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub text: String,
    pub page: u32,
    pub chunk_index: usize,
    /// Euclidean distance to the query vector (smaller is closer)
    pub distance: f32,
}

/// Read-only nearest-neighbour lookup shared by every request of the query service
pub trait VectorIndex: Send + Sync {
    /// Length of every vector held by the index
    fn dimension(&self) -> usize;

    /// Number of stored entries
    fn len(&self) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return up to `k` entries ordered by ascending distance to `vector`.
    ///
    /// Entries at equal distance keep their insertion order.
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// Flat (brute force) L2 index held entirely in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }

    /// Build an index from entries, rejecting any vector whose length is not `dimension`
    #[inline]
    pub fn from_entries(dimension: usize, entries: Vec<IndexEntry>) -> Result<Self> {
        let mut index = Self::new(dimension);
        index.entries.reserve(entries.len());
        for entry in entries {
            index.push(entry)?;
        }
        Ok(index)
    }

    #[inline]
    pub fn push(&mut self, entry: IndexEntry) -> Result<()> {
        if entry.vector.len() != self.dimension {
            return Err(AssistantError::IndexLoad(format!(
                "entry {} has {} dimensions, index expects {}",
                entry.id,
                entry.vector.len(),
                self.dimension
            )));
        }
        self.entries.push(entry);
        Ok(())
    }

    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}

impl VectorIndex for FlatIndex {
    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        if vector.len() != self.dimension {
            return Err(AssistantError::Query(format!(
                "query vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimension
            )));
        }

        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let distance = l2_distance(vector, &entry.vector);
                // `total_cmp` places negative NaN first; positive NaN sorts after every number
                (position, if distance.is_nan() { f32::NAN } else { distance })
            })
            .collect();

        // `sort_by` is stable, so equal distances stay in insertion order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);

        debug!(
            "Flat index query returned {} of {} entries",
            scored.len(),
            self.entries.len()
        );

        Ok(scored
            .into_iter()
            .filter_map(|(position, distance)| {
                self.entries.get(position).map(|entry| RetrievedChunk {
                    text: entry.text.clone(),
                    page: entry.page,
                    chunk_index: entry.chunk_index,
                    distance,
                })
            })
            .collect())
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f32>()
        .sqrt()
}
