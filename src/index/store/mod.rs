#[cfg(test)]
mod tests;

use anyhow::Context;
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{FlatIndex, IndexEntry};
use crate::embeddings::ChunkingConfig;
use crate::{AssistantError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const TABLE_NAME: &str = "chunks";
pub const FORMAT_VERSION: u32 = 1;

/// Describes how a snapshot was produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexManifest {
    pub format_version: u32,
    /// Embedding model the vectors came from
    pub model: String,
    pub dimension: usize,
    pub entry_count: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Path of the ingested document
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl IndexManifest {
    #[inline]
    pub fn new(
        model: impl Into<String>,
        dimension: usize,
        entry_count: usize,
        chunking: &ChunkingConfig,
        source: impl Into<String>,
    ) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            model: model.into(),
            dimension,
            entry_count,
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
            source: source.into(),
            created_at: Utc::now(),
        }
    }
}

/// A loaded snapshot: its manifest and the entries in insertion order
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub manifest: IndexManifest,
    pub index: FlatIndex,
}

/// Persist `entries` as a snapshot directory at `path`.
///
/// The snapshot is written to a sibling staging directory and renamed into place
/// once complete. An existing snapshot at `path` is only removed after the new
/// one has replaced it.
#[inline]
pub async fn save_snapshot(
    path: &Path,
    manifest: &IndexManifest,
    entries: &[IndexEntry],
) -> Result<()> {
    check_consistency(manifest, entries)?;

    let staging = sibling_path(path, "staging").map_err(write_error)?;
    debug!("Staging index snapshot at {:?}", staging);

    if let Err(e) = write_snapshot_dir(&staging, manifest, entries).await {
        error!("Failed to write index snapshot: {:#}", e);
        if staging.exists() {
            if let Err(cleanup) = fs::remove_dir_all(&staging) {
                warn!("Failed to remove staging directory {:?}: {}", staging, cleanup);
            }
        }
        return Err(write_error(e));
    }

    swap_into_place(&staging, path).map_err(write_error)?;

    info!(
        "Saved index snapshot with {} entries ({} dimensions) to {:?}",
        entries.len(),
        manifest.dimension,
        path
    );
    Ok(())
}

/// Load the snapshot at `path`, requiring vectors of `expected_dimension`
#[inline]
pub async fn load_snapshot(path: &Path, expected_dimension: usize) -> Result<Snapshot> {
    if !path.is_dir() {
        return Err(AssistantError::IndexLoad(format!(
            "no index found at {} (run ingestion first)",
            path.display()
        )));
    }

    let manifest = read_manifest(path).map_err(load_error)?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(AssistantError::IndexLoad(format!(
            "unsupported index format version {} (expected {})",
            manifest.format_version, FORMAT_VERSION
        )));
    }

    if manifest.dimension != expected_dimension {
        return Err(AssistantError::IndexLoad(format!(
            "index at {} holds {}-dimensional vectors but the embedding model produces {}",
            path.display(),
            manifest.dimension,
            expected_dimension
        )));
    }

    let entries = read_entries(path).await.map_err(load_error)?;

    if entries.len() != manifest.entry_count {
        return Err(AssistantError::IndexLoad(format!(
            "manifest lists {} entries but the table holds {}",
            manifest.entry_count,
            entries.len()
        )));
    }

    let index = FlatIndex::from_entries(manifest.dimension, entries)?;

    info!(
        "Loaded index snapshot with {} entries from {:?}",
        manifest.entry_count, path
    );
    Ok(Snapshot { manifest, index })
}

fn load_error(error: anyhow::Error) -> AssistantError {
    AssistantError::IndexLoad(format!("{error:#}"))
}

fn write_error(error: anyhow::Error) -> AssistantError {
    AssistantError::IndexWrite(format!("{error:#}"))
}

fn check_consistency(manifest: &IndexManifest, entries: &[IndexEntry]) -> Result<()> {
    if manifest.entry_count != entries.len() {
        return Err(AssistantError::IndexWrite(format!(
            "manifest lists {} entries but {} were given",
            manifest.entry_count,
            entries.len()
        )));
    }

    if manifest.dimension == 0 {
        return Err(AssistantError::IndexWrite(
            "vector dimension must be positive".to_string(),
        ));
    }

    if let Some(entry) = entries
        .iter()
        .find(|entry| entry.vector.len() != manifest.dimension)
    {
        return Err(AssistantError::IndexWrite(format!(
            "entry {} has {} dimensions, manifest declares {}",
            entry.id,
            entry.vector.len(),
            manifest.dimension
        )));
    }

    Ok(())
}

/// Hidden directory next to `path`, unique per call
fn sibling_path(path: &Path, tag: &str) -> anyhow::Result<PathBuf> {
    let name = path
        .file_name()
        .with_context(|| format!("Index path {} has no final component", path.display()))?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    Ok(parent.join(format!(
        ".{}.{}-{}",
        name.to_string_lossy(),
        tag,
        Uuid::new_v4().simple()
    )))
}

fn database_uri(dir: &Path) -> anyhow::Result<String> {
    let absolute = std::path::absolute(dir)
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;
    Ok(format!("file://{}", absolute.display()))
}

async fn write_snapshot_dir(
    dir: &Path,
    manifest: &IndexManifest,
    entries: &[IndexEntry],
) -> anyhow::Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let connection = lancedb::connect(&database_uri(dir)?)
        .execute()
        .await
        .context("Failed to connect to LanceDB")?;

    let schema = create_schema(manifest.dimension)?;

    if entries.is_empty() {
        connection
            .create_empty_table(TABLE_NAME, schema)
            .execute()
            .await
            .context("Failed to create empty chunks table")?;
    } else {
        let record_batch = create_record_batch(Arc::clone(&schema), manifest.dimension, entries)?;
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        connection
            .create_table(TABLE_NAME, reader)
            .execute()
            .await
            .context("Failed to create chunks table")?;
    }

    let manifest_json =
        serde_json::to_string_pretty(manifest).context("Failed to serialize index manifest")?;
    fs::write(dir.join(MANIFEST_FILE), manifest_json).context("Failed to write index manifest")?;

    debug!("Wrote {} entries to {:?}", entries.len(), dir);
    Ok(())
}

fn swap_into_place(staging: &Path, path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        return fs::rename(staging, path)
            .with_context(|| format!("Failed to move snapshot into {}", path.display()));
    }

    let previous = sibling_path(path, "previous")?;
    fs::rename(path, &previous)
        .with_context(|| format!("Failed to move aside existing index at {}", path.display()))?;

    if let Err(e) = fs::rename(staging, path) {
        if let Err(restore) = fs::rename(&previous, path) {
            error!(
                "Failed to restore previous index from {:?}: {}",
                previous, restore
            );
        }
        return Err(e).with_context(|| format!("Failed to move snapshot into {}", path.display()));
    }

    if let Err(e) = fs::remove_dir_all(&previous) {
        warn!("Failed to remove previous index at {:?}: {}", previous, e);
    }
    Ok(())
}

fn create_schema(dimension: usize) -> anyhow::Result<Arc<Schema>> {
    let list_size = i32::try_from(dimension).context("Vector dimension does not fit in i32")?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                list_size,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt64, false),
        Field::new("start_offset", DataType::UInt64, false),
        Field::new("position", DataType::UInt64, false),
    ])))
}

fn create_record_batch(
    schema: Arc<Schema>,
    dimension: usize,
    entries: &[IndexEntry],
) -> anyhow::Result<RecordBatch> {
    let len = entries.len();
    let list_size = i32::try_from(dimension).context("Vector dimension does not fit in i32")?;

    let mut ids = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * dimension);
    let mut texts = Vec::with_capacity(len);
    let mut pages = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut start_offsets = Vec::with_capacity(len);
    let mut positions = Vec::with_capacity(len);

    for (position, entry) in entries.iter().enumerate() {
        ids.push(entry.id.as_str());
        flat_values.extend_from_slice(&entry.vector);
        texts.push(entry.text.as_str());
        pages.push(entry.page);
        chunk_indices.push(entry.chunk_index as u64);
        start_offsets.push(entry.start_offset as u64);
        positions.push(position as u64);
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        list_size,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .context("Failed to create vector array")?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(texts)),
        Arc::new(UInt32Array::from(pages)),
        Arc::new(UInt64Array::from(chunk_indices)),
        Arc::new(UInt64Array::from(start_offsets)),
        Arc::new(UInt64Array::from(positions)),
    ];

    RecordBatch::try_new(schema, arrays).context("Failed to create record batch")
}

fn read_manifest(path: &Path) -> anyhow::Result<IndexManifest> {
    let manifest_path = path.join(MANIFEST_FILE);
    let contents = fs::read_to_string(&manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", manifest_path.display()))
}

async fn read_entries(path: &Path) -> anyhow::Result<Vec<IndexEntry>> {
    let connection = lancedb::connect(&database_uri(path)?)
        .execute()
        .await
        .context("Failed to connect to LanceDB")?;

    let table = connection
        .open_table(TABLE_NAME)
        .execute()
        .await
        .context("Failed to open chunks table")?;

    let count = table
        .count_rows(None)
        .await
        .context("Failed to count rows")?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let batches: Vec<RecordBatch> = table
        .query()
        .limit(count)
        .execute()
        .await
        .context("Failed to query chunks table")?
        .try_collect()
        .await
        .context("Failed to read result stream")?;

    let mut rows = Vec::with_capacity(count);
    for batch in &batches {
        rows.extend(parse_batch(batch)?);
    }

    // Restore insertion order so ties rank the same way after a reload
    rows.sort_by_key(|(position, _)| *position);
    Ok(rows.into_iter().map(|(_, entry)| entry).collect())
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a T> {
    batch
        .column_by_name(name)
        .with_context(|| format!("Missing {name} column"))?
        .as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("Invalid {name} column type"))
}

fn parse_batch(batch: &RecordBatch) -> anyhow::Result<Vec<(u64, IndexEntry)>> {
    let ids = column::<StringArray>(batch, "id")?;
    let vectors = column::<FixedSizeListArray>(batch, "vector")?;
    let texts = column::<StringArray>(batch, "text")?;
    let pages = column::<UInt32Array>(batch, "page")?;
    let chunk_indices = column::<UInt64Array>(batch, "chunk_index")?;
    let start_offsets = column::<UInt64Array>(batch, "start_offset")?;
    let positions = column::<UInt64Array>(batch, "position")?;

    (0..batch.num_rows())
        .map(|row| {
            let values = vectors.value(row);
            let values = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .context("Invalid vector item type")?;

            let entry = IndexEntry {
                id: ids.value(row).to_string(),
                text: texts.value(row).to_string(),
                page: pages.value(row),
                chunk_index: usize::try_from(chunk_indices.value(row))
                    .context("chunk_index out of range")?,
                start_offset: usize::try_from(start_offsets.value(row))
                    .context("start_offset out of range")?,
                vector: values.values().to_vec(),
            };
            Ok((positions.value(row), entry))
        })
        .collect()
}
