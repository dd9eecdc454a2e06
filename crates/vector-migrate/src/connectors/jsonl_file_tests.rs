//! Tests for the JSONL source connector.

use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_lines(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();
    file
}

fn source_for(file: &NamedTempFile) -> (JsonlFileSource, String) {
    let mut config = JsonlFileConfig::new(file.path());
    config.collection = Some("incidents".to_string());
    (JsonlFileSource::new(config), "incidents".to_string())
}

#[test]
fn test_collection_name_defaults_to_file_stem() {
    let config = JsonlFileConfig::new("/data/embeddings_batch_1.jsonl");
    assert_eq!(config.collection_name(), "embeddings_batch_1");
}

#[test]
fn test_config_defaults_from_yaml() {
    let config: JsonlFileConfig = serde_yaml::from_str("path: ./embeddings.jsonl").unwrap();
    assert_eq!(config.id_field, "id");
    assert_eq!(config.vector_field, "embedding");
    assert_eq!(config.distance, Distance::Cosine);
}

#[tokio::test]
async fn test_collection_info_counts_non_empty_lines() {
    let file = write_lines(&[
        r#"{"id": 1, "embedding": [0.1, 0.2, 0.3], "category": "a"}"#,
        "",
        r#"{"id": 2, "embedding": [0.4, 0.5, 0.6], "category": "b"}"#,
    ]);
    let (source, name) = source_for(&file);

    let info = source.get_collection_info(&name).await.unwrap();

    assert_eq!(info.count, 2);
    assert_eq!(info.descriptor.dimension, 3);
    assert_eq!(info.descriptor.name, "incidents");
}

#[tokio::test]
async fn test_missing_file_is_source_not_found() {
    let config = JsonlFileConfig::new("/nonexistent/embeddings.jsonl");
    let source = JsonlFileSource::new(config);

    let err = source.get_collection_info("embeddings").await.unwrap_err();

    assert!(matches!(err, Error::SourceNotFound(_)));
}

#[tokio::test]
async fn test_wrong_collection_is_source_not_found() {
    let file = write_lines(&[r#"{"id": 1, "embedding": [0.1]}"#]);
    let (source, _) = source_for(&file);

    let err = source.get_collection_info("other").await.unwrap_err();

    assert!(matches!(err, Error::SourceNotFound(_)));
}

#[tokio::test]
async fn test_empty_file_needs_dimension() {
    let file = write_lines(&[]);
    let (source, name) = source_for(&file);
    assert!(matches!(
        source.get_collection_info(&name).await,
        Err(Error::Config(_))
    ));

    let mut config = JsonlFileConfig::new(file.path());
    config.collection = Some(name.clone());
    config.dimension = Some(8);
    let info = JsonlFileSource::new(config)
        .get_collection_info(&name)
        .await
        .unwrap();
    assert_eq!(info.count, 0);
    assert_eq!(info.descriptor.dimension, 8);
}

#[tokio::test]
async fn test_scan_pages_in_order() {
    let lines: Vec<String> = (0..5)
        .map(|i| format!(r#"{{"id": {i}, "embedding": [{i}.0, 1.0]}}"#))
        .collect();
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let file = write_lines(&refs);
    let (source, name) = source_for(&file);

    let first = source
        .scan(&name, 0, 2, ScanOptions::default())
        .await
        .unwrap();
    let second = source
        .scan(&name, 2, 2, ScanOptions::default())
        .await
        .unwrap();
    let third = source
        .scan(&name, 4, 2, ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(first.next_offset, Some(2));
    assert_eq!(second.next_offset, Some(4));
    assert_eq!(third.records.len(), 1);
    assert!(third.is_last());
    assert_eq!(third.records[0].id, PointId::Num(4));
    assert_eq!(second.records[1].vector, vec![3.0, 1.0]);
}

#[tokio::test]
async fn test_scan_at_arbitrary_offset_reseeks() {
    let file = write_lines(&[
        r#"{"id": "a", "embedding": [0.1]}"#,
        r#"{"id": "b", "embedding": [0.2]}"#,
        r#"{"id": "c", "embedding": [0.3]}"#,
    ]);
    let (source, name) = source_for(&file);

    let page = source
        .scan(&name, 1, 10, ScanOptions::default())
        .await
        .unwrap();
    let replay = source
        .scan(&name, 1, 10, ScanOptions::default())
        .await
        .unwrap();
    let beyond = source
        .scan(&name, 9, 10, ScanOptions::default())
        .await
        .unwrap();

    assert_eq!(page.records.len(), 2);
    assert_eq!(page.records[0].id, PointId::from("b"));
    assert_eq!(replay.records.len(), 2);
    assert!(beyond.records.is_empty());
}

#[tokio::test]
async fn test_payload_and_id_fallback() {
    let file = write_lines(&[
        r#"{"embedding_id": "emb-1", "embedding": [0.5], "source_file": "x.json", "original_record": {"title": "Leak"}}"#,
    ]);
    let mut config = JsonlFileConfig::new(file.path());
    config.collection = Some("incidents".to_string());
    let source = JsonlFileSource::new(config.clone());

    let page = source
        .scan("incidents", 0, 10, ScanOptions::default())
        .await
        .unwrap();
    let record = &page.records[0];
    assert_eq!(record.id, PointId::Num(0));
    assert_eq!(record.payload.get("embedding_id"), Some(&serde_json::json!("emb-1")));
    assert!(!record.payload.contains_key("embedding"));

    config.payload_field = Some("original_record".to_string());
    let nested = JsonlFileSource::new(config)
        .scan("incidents", 0, 10, ScanOptions::default())
        .await
        .unwrap();
    assert_eq!(
        nested.records[0].payload.get("title"),
        Some(&serde_json::json!("Leak"))
    );
}

#[tokio::test]
async fn test_invalid_line_is_rejected() {
    let file = write_lines(&[r#"{"id": 1, "embedding": [0.1]}"#, "not json"]);
    let (source, name) = source_for(&file);

    let err = source
        .scan(&name, 0, 10, ScanOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidRecord(_)));
}
