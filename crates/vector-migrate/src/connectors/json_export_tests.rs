//! Tests for the JSON export target.

use super::*;
use crate::connectors::Payload;
use tempfile::TempDir;

fn descriptor() -> CollectionDescriptor {
    CollectionDescriptor::new("incidents", 2, Distance::Cosine)
}

fn record(id: u64, x: f32) -> Record {
    let mut payload = Payload::new();
    payload.insert("n".to_string(), serde_json::json!(id));
    Record::new(id, vec![x, 0.0], payload)
}

#[tokio::test]
async fn test_export_document_written_on_finish() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("exports").join("incidents.json");
    let target = JsonExportTarget::new(JsonExportConfig::new(&path));

    assert!(target.get_or_none("incidents").await.unwrap().is_none());
    target.create(&descriptor()).await.unwrap();
    target
        .upsert("incidents", &[record(1, 0.1), record(2, 0.2)])
        .await
        .unwrap();
    assert!(!path.exists());

    target.finish("incidents").await.unwrap();

    let doc = ExportDocument::read(&path).unwrap();
    assert_eq!(doc.metadata.collection, "incidents");
    assert_eq!(doc.metadata.total_points, 2);
    assert_eq!(doc.metadata.dimension, 2);
    assert!(chrono::DateTime::parse_from_rfc3339(&doc.metadata.exported_at).is_ok());
    assert_eq!(doc.points[1].payload.get("n"), Some(&serde_json::json!(2)));
}

#[tokio::test]
async fn test_replay_upserts_into_existing_export() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("incidents.json");

    let first = JsonExportTarget::new(JsonExportConfig::new(&path));
    first.create(&descriptor()).await.unwrap();
    first
        .upsert("incidents", &[record(1, 0.1), record(2, 0.2)])
        .await
        .unwrap();
    first.finish("incidents").await.unwrap();

    let second = JsonExportTarget::new(JsonExportConfig::new(&path));
    assert_eq!(
        second.get_or_none("incidents").await.unwrap(),
        Some(descriptor())
    );
    second
        .upsert("incidents", &[record(2, 0.9), record(3, 0.3)])
        .await
        .unwrap();
    assert_eq!(second.count("incidents").await.unwrap(), 3);
    second.finish("incidents").await.unwrap();

    let doc = ExportDocument::read(&path).unwrap();
    assert_eq!(doc.points.len(), 3);
    assert_eq!(doc.points[1].vector, vec![0.9, 0.0]);
}

#[tokio::test]
async fn test_upsert_requires_collection() {
    let dir = TempDir::new().unwrap();
    let target = JsonExportTarget::new(JsonExportConfig::new(dir.path().join("out.json")));

    assert!(target.upsert("incidents", &[record(1, 0.1)]).await.is_err());
}

#[tokio::test]
async fn test_corrupt_export_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.json");
    fs::write(&path, "{not json").unwrap();
    let target = JsonExportTarget::new(JsonExportConfig::new(&path));

    assert!(matches!(
        target.get_or_none("incidents").await,
        Err(Error::Json(_))
    ));
}

#[tokio::test]
async fn test_lock_file_is_exclusive() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.json");
    let a = JsonExportTarget::new(JsonExportConfig::new(&path));
    let b = JsonExportTarget::new(JsonExportConfig::new(&path));

    a.acquire_lock("incidents", "run-a").await.unwrap();
    let err = b.acquire_lock("incidents", "run-b").await.unwrap_err();
    assert!(matches!(err, Error::LockHeld { .. }));
    assert!(err.to_string().contains("out.json.lock"));

    b.release_lock("incidents", "run-b").await.unwrap();
    assert!(dir.path().join("out.json.lock").exists());

    a.release_lock("incidents", "run-a").await.unwrap();
    assert!(!dir.path().join("out.json.lock").exists());
    assert!(b.acquire_lock("incidents", "run-b").await.is_ok());
}

#[test]
fn test_config_defaults() {
    let config: JsonExportConfig = serde_yaml::from_str("path: ./out.json").unwrap();
    assert!(config.pretty);
    assert!(config.collection.is_none());
}
