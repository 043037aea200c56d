//! Row pipeline: exists-check, render, compile, upload, under a global
//! concurrency cap.
//!
//! Each row moves through
//!
//! ```text
//! Pending -> Skipped
//! Pending -> Rendering -> Compiling -> Uploading -> Recorded
//!        \__________\____________\___________\____-> Failed
//! ```
//!
//! A failing row becomes a `Failed` record; it never aborts its siblings.
//! Re-running with the same data and output prefix skips every row whose
//! document already exists, which is how an interrupted batch resumes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::compiler::{CompileError, DocumentCompiler};
use crate::retry::{RetryError, RetryPolicy};
use crate::row::Row;
use crate::store::naming::{document_key, PDF_CONTENT_TYPE};
use crate::store::{BlobStore, StoreError};
use crate::template::{render, TemplateSet};
use crate::results::{OutputRecord, RowOutcome};

/// Default number of rows processed at once.
pub const DEFAULT_CONCURRENCY: usize = 3;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Prefix of every document key; normalized to end with `/`.
    pub output_prefix: String,
    /// Where rendered sources and compiled PDFs are written.
    pub work_dir: PathBuf,
    /// Maximum number of rows in flight.
    pub concurrency: usize,
    /// Retry policy around the compiler.
    pub compile_retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            output_prefix: String::new(),
            work_dir: PathBuf::from("output"),
            concurrency: DEFAULT_CONCURRENCY,
            compile_retry: RetryPolicy::default(),
        }
    }
}

/// One progress update, emitted once per completed row.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub done: usize,
    pub total: usize,
    /// `uploaded`, `skipped` or `failed`.
    pub status: &'static str,
}

/// Observer for progress events. Side-effect only.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    Pending,
    Skipped,
    Rendering,
    Compiling,
    Uploading,
    Recorded,
    Failed,
}

/// Row-level failures; recorded, never propagated.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("existence check failed: {0}")]
    Store(#[source] StoreError),

    #[error("failed to write source {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("compile failed: {0}")]
    Compile(RetryError<CompileError>),

    #[error("upload failed: {0}")]
    Upload(#[source] StoreError),
}

impl RowError {
    fn failed_in(&self) -> RowState {
        match self {
            RowError::Store(_) => RowState::Pending,
            RowError::Io { .. } => RowState::Rendering,
            RowError::Compile(_) => RowState::Compiling,
            RowError::Upload(_) => RowState::Uploading,
        }
    }
}

/// Failures that stop the whole run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to create work directory {}: {source}", path.display())]
    WorkDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub struct Pipeline {
    store: Arc<BlobStore>,
    compiler: Arc<dyn DocumentCompiler>,
    settings: PipelineSettings,
    progress: Option<ProgressSink>,
}

/// State shared read-only by every row task.
struct RowContext {
    store: Arc<BlobStore>,
    compiler: Arc<dyn DocumentCompiler>,
    template: Arc<str>,
    work_dir: PathBuf,
    compile_retry: RetryPolicy,
}

struct RowJob {
    row: Row,
    safe_key: String,
    object_key: String,
}

impl Pipeline {
    pub fn new(
        store: Arc<BlobStore>,
        compiler: Arc<dyn DocumentCompiler>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            compiler,
            settings,
            progress: None,
        }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Process every row with the primary template.
    ///
    /// Returns one record per row. Rows displaced by a later row with the
    /// same document key come first as `Skipped`; the rest follow in
    /// completion order, so last-write-wins keeps the row that was built.
    pub async fn run(
        &self,
        rows: Vec<Row>,
        templates: &TemplateSet,
    ) -> Result<Vec<OutputRecord>, PipelineError> {
        let work_dir = self.settings.work_dir.clone();
        tokio::fs::create_dir_all(&work_dir)
            .await
            .map_err(|source| PipelineError::WorkDir {
                path: work_dir.clone(),
                source,
            })?;

        let (template_name, template) = templates.primary();
        let total = rows.len();
        let concurrency = self.settings.concurrency.max(1);
        info!(rows = total, concurrency, template = template_name, "starting pipeline");

        let ctx = Arc::new(RowContext {
            store: Arc::clone(&self.store),
            compiler: Arc::clone(&self.compiler),
            template,
            work_dir,
            compile_retry: self.settings.compile_retry,
        });
        let (jobs, superseded) = self.plan(rows);

        let mut records = Vec::with_capacity(total);
        for job in superseded {
            warn!(
                row = %job.safe_key,
                key = %job.object_key,
                "row shares its document key with a later row; later row wins"
            );
            let outcome = RowOutcome::Skipped {
                url: self.store.url_for(&job.object_key),
            };
            self.record(&mut records, job.into_record(outcome), total);
        }

        let sem = Arc::new(Semaphore::new(concurrency));
        let mut join_set = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, RowJob> = HashMap::with_capacity(jobs.len());

        for job in jobs {
            let placeholder = RowJob {
                row: job.row.clone(),
                safe_key: job.safe_key.clone(),
                object_key: job.object_key.clone(),
            };
            let ctx = Arc::clone(&ctx);
            let sem = Arc::clone(&sem);
            let handle = join_set.spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return job.into_record(RowOutcome::Failed {
                            reason: format!("row limiter closed: {e}"),
                        })
                    }
                };
                ctx.process(job).await
            });
            in_flight.insert(handle.id(), placeholder);
        }

        while let Some(joined) = join_set.join_next_with_id().await {
            let record = match joined {
                Ok((id, record)) => {
                    in_flight.remove(&id);
                    record
                }
                Err(e) => {
                    error!(error = %e, "row task aborted");
                    let Some(job) = in_flight.remove(&e.id()) else {
                        continue;
                    };
                    job.into_record(RowOutcome::Failed {
                        reason: format!("row task aborted: {e}"),
                    })
                }
            };
            self.record(&mut records, record, total);
        }

        let failed = records.iter().filter(|r| r.is_failed()).count();
        info!(rows = total, failed, "pipeline finished");
        Ok(records)
    }

    /// One job per document key, keeping the last row for each key.
    ///
    /// Returns the jobs to run and the rows they displace, both in input
    /// order. Two tasks never share a document key or a rendered source file.
    fn plan(&self, rows: Vec<Row>) -> (Vec<RowJob>, Vec<RowJob>) {
        let mut jobs: IndexMap<String, RowJob> = IndexMap::with_capacity(rows.len());
        let mut superseded = Vec::new();

        for (index, row) in rows.into_iter().enumerate() {
            let safe_key = row.safe_key(index);
            let object_key = document_key(&self.settings.output_prefix, &safe_key);
            let job = RowJob {
                object_key: object_key.clone(),
                safe_key,
                row,
            };
            if let Some(previous) = jobs.insert(object_key, job) {
                superseded.push(previous);
            }
        }
        (jobs.into_values().collect(), superseded)
    }

    fn record(&self, records: &mut Vec<OutputRecord>, record: OutputRecord, total: usize) {
        if let Some(ref sink) = self.progress {
            sink(ProgressEvent {
                done: records.len() + 1,
                total,
                status: record.outcome.label(),
            });
        }
        records.push(record);
    }
}

impl RowJob {
    fn into_record(self, outcome: RowOutcome) -> OutputRecord {
        OutputRecord {
            fields: self.row,
            pdf_name: self.safe_key,
            derived_key: self.object_key,
            outcome,
        }
    }
}

impl RowContext {
    async fn process(&self, job: RowJob) -> OutputRecord {
        let outcome = match self.try_process(&job).await {
            Ok(outcome) => outcome,
            Err(e) => {
                transition(&job.safe_key, e.failed_in(), RowState::Failed);
                error!(row = %job.safe_key, key = %job.object_key, error = %e, "row failed");
                RowOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        job.into_record(outcome)
    }

    async fn try_process(&self, job: &RowJob) -> Result<RowOutcome, RowError> {
        let key = job.object_key.as_str();

        if self.store.exists(key).await.map_err(RowError::Store)? {
            transition(&job.safe_key, RowState::Pending, RowState::Skipped);
            info!(row = %job.safe_key, key, "document exists, skipping");
            return Ok(RowOutcome::Skipped {
                url: self.store.url_for(key),
            });
        }

        transition(&job.safe_key, RowState::Pending, RowState::Rendering);
        let source = render(&self.template, &job.row);
        let source_path = self.work_dir.join(format!("{}.typ", job.safe_key));
        tokio::fs::write(&source_path, source)
            .await
            .map_err(|source| RowError::Io {
                path: source_path.clone(),
                source,
            })?;

        transition(&job.safe_key, RowState::Rendering, RowState::Compiling);
        let pdf = self
            .compile_retry
            .execute(|| self.compiler.compile(&source_path))
            .await
            .map_err(RowError::Compile)?;
        if let Err(e) = tokio::fs::remove_file(&source_path).await {
            warn!(path = %source_path.display(), error = %e, "failed to remove rendered source");
        }

        transition(&job.safe_key, RowState::Compiling, RowState::Uploading);
        self.store
            .upload(key, Bytes::from(pdf), PDF_CONTENT_TYPE)
            .await
            .map_err(RowError::Upload)?;

        transition(&job.safe_key, RowState::Uploading, RowState::Recorded);
        Ok(RowOutcome::Uploaded {
            url: self.store.url_for(key),
        })
    }
}

fn transition(row: &str, from: RowState, to: RowState) {
    debug!(row, ?from, ?to, "row state");
}
