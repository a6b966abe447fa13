use std::sync::Arc;

use common::{event_lines, test_options};
use futures::TryStreamExt;
use object_store::{ObjectStore, local::LocalFileSystem, path::Path};
use spool_core::{
    ObjectStoreSink, Pipeline, PipelineError, RowSchema, SinkError, TargetTable,
};
use tokio_util::sync::CancellationToken;

mod common;

async fn stored_rows(store: &LocalFileSystem, prefix: &str) -> Vec<serde_json::Value> {
    let objects: Vec<_> = store
        .list(Some(&Path::from(prefix)))
        .try_collect()
        .await
        .unwrap();

    let mut rows = Vec::new();
    for object in objects {
        assert!(object.location.as_ref().ends_with(".jsonl"));
        let content = store.get(&object.location).await.unwrap().bytes().await.unwrap();
        for line in std::str::from_utf8(&content).unwrap().lines() {
            rows.push(serde_json::from_str(line).unwrap());
        }
    }
    rows
}

#[tokio::test]
async fn test_batches_are_stored_under_the_target_table() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalFileSystem::new_with_prefix(dir.path()).unwrap());
    let target: TargetTable = "proj.logs.events".parse().unwrap();

    let sink = ObjectStoreSink::new_ulid(
        store.clone(),
        target,
        Arc::new(RowSchema::event_log()),
        true,
    );

    let report = Pipeline::new(test_options().with_batch_size(10), Arc::new(sink))
        .unwrap()
        .run(event_lines(50).as_bytes(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.records_delivered, 50);

    let rows = stored_rows(&store, "proj/logs/events").await;
    assert_eq!(rows.len(), 50);

    let mut seqs: Vec<_> = rows.iter().map(|row| row["seq"].as_i64().unwrap()).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (0..50).collect::<Vec<_>>());

    let first = rows.iter().find(|row| row["seq"] == 0).unwrap();
    assert_eq!(first["time"], "2023-11-14T22:13:20.000Z");
    assert_eq!(first["type"], "t0");
    assert!(first["payload"].as_str().unwrap().contains("\"seq\":0"));
}

#[tokio::test]
async fn test_strict_mode_rejects_unknown_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalFileSystem::new_with_prefix(dir.path()).unwrap());
    let target: TargetTable = "proj.logs.events".parse().unwrap();

    let sink = ObjectStoreSink::new_ulid(
        store.clone(),
        target,
        Arc::new(RowSchema::event_log()),
        true,
    );

    let input = "{\"time\":1700000000000,\"seq\":1,\"extra\":true}\n";
    let err = Pipeline::new(test_options().with_worker_count(1), Arc::new(sink))
        .unwrap()
        .run(input.as_bytes(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Sink {
            source: SinkError::InvalidRecord { index: 0, .. },
            ..
        }
    ));
    assert!(stored_rows(&store, "proj").await.is_empty());
}

#[tokio::test]
async fn test_lenient_mode_skips_invalid_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(LocalFileSystem::new_with_prefix(dir.path()).unwrap());
    let target: TargetTable = "proj.logs.events".parse().unwrap();

    let sink = ObjectStoreSink::new_ulid(
        store.clone(),
        target,
        Arc::new(RowSchema::event_log()),
        false,
    );

    let input = "{\"time\":1700000000000,\"seq\":1,\"extra\":true}\n\
                 {\"time\":1700000000001,\"seq\":\"two\"}\n\
                 {\"time\":1700000000002,\"seq\":3}\n";
    Pipeline::new(test_options().with_worker_count(1), Arc::new(sink))
        .unwrap()
        .run(input.as_bytes(), CancellationToken::new())
        .await
        .unwrap();

    let mut seqs: Vec<_> = stored_rows(&store, "proj/logs/events")
        .await
        .iter()
        .map(|row| row["seq"].as_i64().unwrap())
        .collect();
    seqs.sort_unstable();
    assert_eq!(seqs, vec![1, 3]);
}
