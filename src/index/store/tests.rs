use super::*;
use crate::index::VectorIndex;
use tempfile::TempDir;

fn entries(count: usize, dimension: usize) -> Vec<IndexEntry> {
    (0..count)
        .map(|i| IndexEntry {
            id: format!("entry-{i}"),
            text: format!("chunk number {i}"),
            page: u32::try_from(i / 3 + 1).expect("small page number"),
            chunk_index: i % 3,
            start_offset: (i % 3) * 400,
            vector: (0..dimension).map(|d| (i * dimension + d) as f32).collect(),
        })
        .collect()
}

fn manifest_for(entries: &[IndexEntry], dimension: usize) -> IndexManifest {
    IndexManifest::new(
        "all-minilm:latest",
        dimension,
        entries.len(),
        &ChunkingConfig::default(),
        "data/documents.pdf",
    )
}

fn leftover_siblings(dir: &Path) -> Vec<String> {
    fs::read_dir(dir)
        .expect("should read temp dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with('.'))
        .collect()
}

#[tokio::test]
async fn snapshot_round_trip_preserves_order_and_content() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vector_index");
    let entries = entries(7, 4);

    save_snapshot(&path, &manifest_for(&entries, 4), &entries)
        .await
        .expect("should save snapshot");

    assert!(path.join(MANIFEST_FILE).is_file());

    let snapshot = load_snapshot(&path, 4).await.expect("should load snapshot");
    assert_eq!(snapshot.manifest.model, "all-minilm:latest");
    assert_eq!(snapshot.manifest.entry_count, 7);
    assert_eq!(snapshot.manifest.chunk_size, 500);
    assert_eq!(snapshot.manifest.chunk_overlap, 100);
    assert_eq!(snapshot.index.len(), 7);
    assert_eq!(snapshot.index.entries(), entries.as_slice());
}

#[tokio::test]
async fn empty_snapshot_loads_as_empty_index() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vector_index");

    save_snapshot(&path, &manifest_for(&[], 384), &[])
        .await
        .expect("should save empty snapshot");

    let snapshot = load_snapshot(&path, 384).await.expect("should load snapshot");
    assert!(snapshot.index.is_empty());
    assert_eq!(snapshot.index.dimension(), 384);
}

#[tokio::test]
async fn missing_snapshot_is_index_load_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = load_snapshot(&temp_dir.path().join("nothing_here"), 384).await;

    assert!(matches!(result, Err(AssistantError::IndexLoad(_))));
}

#[tokio::test]
async fn dimension_mismatch_is_index_load_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vector_index");
    let entries = entries(3, 4);

    save_snapshot(&path, &manifest_for(&entries, 4), &entries)
        .await
        .expect("should save snapshot");

    match load_snapshot(&path, 384).await {
        Err(AssistantError::IndexLoad(message)) => assert!(message.contains("384")),
        other => panic!("expected IndexLoad error, got {other:?}"),
    }
}

#[tokio::test]
async fn corrupt_manifest_is_index_load_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vector_index");
    let entries = entries(2, 4);

    save_snapshot(&path, &manifest_for(&entries, 4), &entries)
        .await
        .expect("should save snapshot");
    fs::write(path.join(MANIFEST_FILE), "{ not json").expect("should overwrite manifest");

    assert!(matches!(
        load_snapshot(&path, 4).await,
        Err(AssistantError::IndexLoad(_))
    ));
}

#[tokio::test]
async fn directory_without_table_is_index_load_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vector_index");
    fs::create_dir_all(&path).expect("should create dir");
    let manifest = manifest_for(&entries(2, 4), 4);
    fs::write(
        path.join(MANIFEST_FILE),
        serde_json::to_string(&manifest).expect("should serialize manifest"),
    )
    .expect("should write manifest");

    assert!(matches!(
        load_snapshot(&path, 4).await,
        Err(AssistantError::IndexLoad(_))
    ));
}

#[tokio::test]
async fn resave_replaces_previous_snapshot() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vector_index");

    let first = entries(5, 4);
    save_snapshot(&path, &manifest_for(&first, 4), &first)
        .await
        .expect("should save first snapshot");

    let second = entries(2, 4);
    save_snapshot(&path, &manifest_for(&second, 4), &second)
        .await
        .expect("should save second snapshot");

    let snapshot = load_snapshot(&path, 4).await.expect("should load snapshot");
    assert_eq!(snapshot.index.len(), 2);
    assert!(leftover_siblings(temp_dir.path()).is_empty());
}

#[tokio::test]
async fn rejected_save_keeps_previous_snapshot() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("vector_index");

    let good = entries(3, 4);
    save_snapshot(&path, &manifest_for(&good, 4), &good)
        .await
        .expect("should save snapshot");

    let mut bad = entries(2, 4);
    bad[1].vector.pop();
    let result = save_snapshot(&path, &manifest_for(&bad, 4), &bad).await;
    assert!(matches!(result, Err(AssistantError::IndexWrite(_))));

    let snapshot = load_snapshot(&path, 4).await.expect("previous snapshot intact");
    assert_eq!(snapshot.index.len(), 3);
    assert!(leftover_siblings(temp_dir.path()).is_empty());
}

#[test]
fn sibling_paths_are_hidden_and_unique() {
    let path = Path::new("/srv/assistant/vector_index");
    let a = sibling_path(path, "staging").expect("path has a name");
    let b = sibling_path(path, "staging").expect("path has a name");

    assert_eq!(a.parent(), Some(Path::new("/srv/assistant")));
    assert!(
        a.file_name()
            .expect("has name")
            .to_string_lossy()
            .starts_with(".vector_index.staging-")
    );
    assert_ne!(a, b);

    let relative = sibling_path(Path::new("vector_index"), "previous").expect("has a name");
    assert_eq!(relative.parent(), Some(Path::new(".")));
}
