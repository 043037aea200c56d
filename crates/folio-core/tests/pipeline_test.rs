//! Pipeline behaviour against an in-memory store and scripted compilers.

use async_trait::async_trait;
use folio_core::compiler::{CompileError, DocumentCompiler};
use folio_core::store::{BlobClient, ListPage, StoreResult};
use folio_core::{
    parse_rows, BlobStore, Bytes, ObjectStoreClient, Pipeline, PipelineSettings, ProgressEvent,
    ResultSet, RetryPolicy, Row, RowOutcome, StoreError, TemplateSet, UrlStyle,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Returns the rendered source as the "PDF" and records every call.
#[derive(Default)]
struct RecordingCompiler {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
    /// File stems that always fail.
    failing: Vec<&'static str>,
}

#[async_trait]
impl DocumentCompiler for RecordingCompiler {
    async fn compile(&self, source: &Path) -> Result<Vec<u8>, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let stem = source.file_stem().unwrap().to_string_lossy();
        if self.failing.iter().any(|f| *f == stem) {
            return Err(CompileError::Failed {
                source_file: source.to_path_buf(),
                status: "exit status: 1".into(),
                stderr: "error: unknown variable".into(),
            });
        }
        Ok(tokio::fs::read(source).await.unwrap())
    }
}

struct Harness {
    store: Arc<BlobStore>,
    compiler: Arc<RecordingCompiler>,
    work: tempfile::TempDir,
}

impl Harness {
    fn new(compiler: RecordingCompiler) -> Self {
        Self::with_client(Arc::new(ObjectStoreClient::memory()), compiler)
    }

    fn with_client(client: Arc<dyn BlobClient>, compiler: RecordingCompiler) -> Self {
        let store = BlobStore::new(client, UrlStyle::Base("https://files.test".into()))
            .with_retry(RetryPolicy::none());
        Self {
            store: Arc::new(store),
            compiler: Arc::new(compiler),
            work: tempfile::tempdir().unwrap(),
        }
    }

    fn pipeline(&self, concurrency: usize) -> Pipeline {
        Pipeline::new(
            Arc::clone(&self.store),
            self.compiler.clone(),
            PipelineSettings {
                output_prefix: "out/".into(),
                work_dir: self.work.path().join("output"),
                concurrency,
                compile_retry: RetryPolicy::none()
                    .with_max_retries(2)
                    .with_base_delay(Duration::from_millis(1)),
            },
        )
    }

    fn work_file(&self, name: &str) -> PathBuf {
        self.work.path().join("output").join(name)
    }
}

fn rows(value: serde_json::Value) -> Vec<Row> {
    parse_rows(value.to_string().as_bytes()).unwrap()
}

fn templates() -> TemplateSet {
    TemplateSet::from_pairs([("letter.typ", "Dear {{name}}, ref {{id}}")]).unwrap()
}

#[tokio::test]
async fn test_second_run_skips_everything() {
    let harness = Harness::new(RecordingCompiler::default());
    let data = json!([
        {"id": "A", "name": "Ann"},
        {"id": "B", "name": "Bob"},
        {"id": "C", "name": "Cy"}
    ]);

    let first = harness
        .pipeline(3)
        .run(rows(data.clone()), &templates())
        .await
        .unwrap();
    assert!(first
        .iter()
        .all(|r| matches!(r.outcome, RowOutcome::Uploaded { .. })));
    assert_eq!(harness.compiler.calls.load(Ordering::SeqCst), 3);

    let second = harness
        .pipeline(3)
        .run(rows(data), &templates())
        .await
        .unwrap();
    assert!(second
        .iter()
        .all(|r| matches!(r.outcome, RowOutcome::Skipped { .. })));
    assert_eq!(harness.compiler.calls.load(Ordering::SeqCst), 3);

    let first = ResultSet::from_records(first);
    for record in &second {
        assert_eq!(
            first.get(&record.derived_key).unwrap().document_url(),
            record.document_url()
        );
    }
}

#[tokio::test]
async fn test_one_failing_row_does_not_affect_siblings() {
    let harness = Harness::new(RecordingCompiler {
        failing: vec!["B"],
        ..Default::default()
    });

    let records = harness
        .pipeline(2)
        .run(
            rows(json!([
                {"id": "A", "name": "Ann"},
                {"id": "B", "name": "Bob"},
                {"id": "C", "name": "Cy"}
            ])),
            &templates(),
        )
        .await
        .unwrap();

    let set = ResultSet::from_records(records);
    assert_eq!(set.tally(), (2, 0, 1));
    let failed = set.get("out/B.pdf").unwrap();
    assert!(failed.error_reason().unwrap().contains("compile failed"));
    assert!(failed.error_reason().unwrap().contains("3 attempt(s)"));
    assert!(!harness.store.exists("out/B.pdf").await.unwrap());
    assert!(harness.store.exists("out/A.pdf").await.unwrap());
    // 1 + 2 retries for B, one call each for A and C
    assert_eq!(harness.compiler.calls.load(Ordering::SeqCst), 5);
    // The failed row keeps its rendered source; successful ones are cleaned up.
    assert!(harness.work_file("B.typ").exists());
    assert!(!harness.work_file("A.typ").exists());
}

/// Memory store that counts rows between their existence check and upload.
struct RowCountingClient {
    inner: ObjectStoreClient,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[async_trait]
impl BlobClient for RowCountingClient {
    async fn head(&self, key: &str) -> StoreResult<()> {
        let result = self.inner.head(key).await;
        if result.as_ref().is_err_and(StoreError::is_not_found) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        }
        result
    }

    async fn list_page(&self, prefix: &str, token: Option<&str>) -> StoreResult<ListPage> {
        self.inner.list_page(prefix, token).await
    }

    async fn list_folders(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.inner.list_folders(prefix).await
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        let result = self.inner.put(key, bytes, content_type).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[tokio::test]
async fn test_concurrency_never_exceeds_limit() {
    let client = Arc::new(RowCountingClient {
        inner: ObjectStoreClient::memory(),
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let harness = Harness::with_client(
        client.clone(),
        RecordingCompiler {
            delay: Duration::from_millis(20),
            ..Default::default()
        },
    );
    let data: Vec<serde_json::Value> = (0..10)
        .map(|i| json!({"id": format!("row-{i}"), "name": "n"}))
        .collect();

    let records = harness
        .pipeline(2)
        .run(rows(serde_json::Value::Array(data)), &templates())
        .await
        .unwrap();

    assert_eq!(records.len(), 10);
    assert!(records
        .iter()
        .all(|r| matches!(r.outcome, RowOutcome::Uploaded { .. })));
    assert_eq!(harness.compiler.calls.load(Ordering::SeqCst), 10);
    let rows_max = client.max_in_flight.load(Ordering::SeqCst);
    assert!(rows_max <= 2, "observed {rows_max} rows in progress at once");
    assert!(rows_max >= 1);
    assert_eq!(client.in_flight.load(Ordering::SeqCst), 0);
    let compile_max = harness.compiler.max_in_flight.load(Ordering::SeqCst);
    assert!(compile_max <= 2, "observed {compile_max} rows compiling at once");
}

#[tokio::test]
async fn test_progress_reported_once_per_row() {
    let harness = Harness::new(RecordingCompiler {
        failing: vec!["doc_1"],
        ..Default::default()
    });
    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    let pipeline = harness
        .pipeline(3)
        .with_progress(Arc::new(move |event| sink.lock().unwrap().push(event)));

    pipeline
        .run(
            rows(json!([{"id": "A"}, {"id": ""}, {"id": 0}, {"id": "D"}])),
            &templates(),
        )
        .await
        .unwrap();

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 4);
    let done: Vec<usize> = events.iter().map(|e| e.done).collect();
    assert_eq!(done, vec![1, 2, 3, 4]);
    assert!(events.iter().all(|e| e.total == 4));
    assert_eq!(events.iter().filter(|e| e.status == "failed").count(), 1);
}

#[tokio::test]
async fn test_colliding_identities_collapse_to_one_record() {
    let harness = Harness::new(RecordingCompiler::default());

    let records = harness
        .pipeline(1)
        .run(
            rows(json!([
                {"id": "a/b", "name": "first"},
                {"id": "a b", "name": "second"}
            ])),
            &templates(),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.derived_key == "out/a_b.pdf"));
    let set = ResultSet::from_records(records.clone());
    assert_eq!(set.len(), 1);
    assert_eq!(set.get("out/a_b.pdf"), records.last());
}

#[tokio::test]
async fn test_colliding_identities_build_the_last_row_once() {
    let harness = Harness::new(RecordingCompiler {
        delay: Duration::from_millis(30),
        ..Default::default()
    });
    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::default();
    let sink = Arc::clone(&events);

    let records = harness
        .pipeline(2)
        .with_progress(Arc::new(move |event| sink.lock().unwrap().push(event)))
        .run(
            rows(json!([
                {"id": "a/b", "name": "first"},
                {"id": "a b", "name": "second"}
            ])),
            &templates(),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(events.lock().unwrap().len(), 2);
    assert_eq!(harness.compiler.calls.load(Ordering::SeqCst), 1);

    let set = ResultSet::from_records(records);
    assert_eq!(set.len(), 1);
    let kept = set.get("out/a_b.pdf").unwrap();
    assert!(matches!(kept.outcome, RowOutcome::Uploaded { .. }));
    assert_eq!(kept.fields.display_value("name").as_deref(), Some("second"));
    assert_eq!(
        harness.store.download("out/a_b.pdf").await.unwrap(),
        Bytes::from_static(b"Dear second, ref a b")
    );
    assert!(!harness.work_file("a_b.typ").exists());
}

/// Memory store whose existence checks always fail.
struct BrokenHead {
    inner: ObjectStoreClient,
}

#[async_trait]
impl BlobClient for BrokenHead {
    async fn head(&self, _key: &str) -> StoreResult<()> {
        Err(StoreError::AccessDenied {
            message: "head forbidden".into(),
        })
    }

    async fn list_page(&self, prefix: &str, token: Option<&str>) -> StoreResult<ListPage> {
        self.inner.list_page(prefix, token).await
    }

    async fn list_folders(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.inner.list_folders(prefix).await
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        self.inner.put(key, bytes, content_type).await
    }
}

#[tokio::test]
async fn test_exists_failure_marks_row_failed_without_compiling() {
    let harness = Harness::with_client(
        Arc::new(BrokenHead {
            inner: ObjectStoreClient::memory(),
        }),
        RecordingCompiler::default(),
    );

    let records = harness
        .pipeline(2)
        .run(rows(json!([{"id": "A"}, {"id": "B"}])), &templates())
        .await
        .unwrap();

    assert!(records.iter().all(|r| r.is_failed()));
    assert!(records[0]
        .error_reason()
        .unwrap()
        .contains("existence check failed"));
    assert_eq!(harness.compiler.calls.load(Ordering::SeqCst), 0);
}
