//! One complete batch run over a [`Selection`].
//!
//! ```text
//! download templates  -> <work>/template/
//! download images     -> <work>/image/
//! download data file  -> <work>/data.json
//! copy images         -> <work>/output/   (existing files kept)
//! pipeline            -> <work>/output/*.pdf, uploaded per row
//! report              -> <work>/output/pdf_links.xlsx, uploaded
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{info, warn};

use crate::compiler::DocumentCompiler;
use crate::pipeline::{
    Pipeline, PipelineError, PipelineSettings, ProgressSink, DEFAULT_CONCURRENCY,
};
use crate::report::{write_xlsx, ReportError, ReportTable};
use crate::results::{OutputRecord, ResultSet};
use crate::retry::RetryPolicy;
use crate::row::{parse_rows, DataError};
use crate::store::naming::{REPORT_FILE_NAME, XLSX_CONTENT_TYPE};
use crate::store::{BlobStore, DownloadSummary, Selection, StoreError};
use crate::template::{TemplateError, TemplateSet};

/// Fatal errors; any of these aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("failed to download {what} from {prefix}: {source}")]
    Download {
        what: &'static str,
        prefix: String,
        source: StoreError,
    },

    #[error("failed to download data file {key}: {source}")]
    DataDownload { key: String, source: StoreError },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Templates(#[from] TemplateError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("failed to upload report {key}: {source}")]
    ReportUpload { key: String, source: StoreError },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type JobResult<T> = Result<T, JobError>;

/// Local working tree of a run.
#[derive(Debug, Clone)]
pub struct WorkLayout {
    root: PathBuf,
}

impl WorkLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn template_dir(&self) -> PathBuf {
        self.root.join("template")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root.join("image")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn data_file(&self) -> PathBuf {
        self.root.join("data.json")
    }

    pub fn report_file(&self) -> PathBuf {
        self.output_dir().join(REPORT_FILE_NAME)
    }

    async fn create(&self) -> JobResult<()> {
        for dir in [self.template_dir(), self.image_dir(), self.output_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|source| JobError::Io { path: dir, source })?;
        }
        Ok(())
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub rows: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub templates: DownloadSummary,
    pub images: DownloadSummary,
    /// Deduplicated records, as written to the report.
    pub records: Vec<OutputRecord>,
    pub report_key: String,
    pub report_url: String,
}

pub struct BatchJob {
    store: Arc<BlobStore>,
    compiler: Arc<dyn DocumentCompiler>,
    selection: Selection,
    layout: WorkLayout,
    concurrency: usize,
    compile_retry: RetryPolicy,
    progress: Option<ProgressSink>,
}

impl BatchJob {
    pub fn new(
        store: Arc<BlobStore>,
        compiler: Arc<dyn DocumentCompiler>,
        selection: Selection,
    ) -> Self {
        Self {
            store,
            compiler,
            selection,
            layout: WorkLayout::new("."),
            concurrency: DEFAULT_CONCURRENCY,
            compile_retry: RetryPolicy::default(),
            progress: None,
        }
    }

    pub fn with_work_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.layout = WorkLayout::new(root);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_compile_retry(mut self, retry: RetryPolicy) -> Self {
        self.compile_retry = retry;
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn layout(&self) -> &WorkLayout {
        &self.layout
    }

    pub async fn run(&self) -> JobResult<JobSummary> {
        let sel = &self.selection;
        info!(
            templates = %sel.template_prefix,
            images = %sel.image_prefix,
            data = %sel.data_key,
            output = %sel.output_prefix,
            "starting batch"
        );
        self.layout.create().await?;

        let templates = self
            .download("templates", &sel.template_prefix, &self.layout.template_dir())
            .await?;
        let images = self
            .download("images", &sel.image_prefix, &self.layout.image_dir())
            .await?;

        let data = self
            .store
            .download(&sel.data_key)
            .await
            .map_err(|source| JobError::DataDownload {
                key: sel.data_key.clone(),
                source,
            })?;
        let data_file = self.layout.data_file();
        tokio::fs::write(&data_file, &data)
            .await
            .map_err(|source| JobError::Io {
                path: data_file,
                source,
            })?;
        let rows = parse_rows(&data)?;
        info!(rows = rows.len(), "loaded data rows");

        let copied = copy_if_not_exists(&self.layout.image_dir(), &self.layout.output_dir()).await?;
        info!(copied, "copied images into output directory");

        let template_set = TemplateSet::load_dir(&self.layout.template_dir()).await?;

        let mut pipeline = Pipeline::new(
            Arc::clone(&self.store),
            Arc::clone(&self.compiler),
            PipelineSettings {
                output_prefix: sel.output_prefix.clone(),
                work_dir: self.layout.output_dir(),
                concurrency: self.concurrency,
                compile_retry: self.compile_retry,
            },
        );
        if let Some(sink) = &self.progress {
            pipeline = pipeline.with_progress(Arc::clone(sink));
        }

        let total = rows.len();
        let results = ResultSet::from_records(pipeline.run(rows, &template_set).await?);
        if results.len() < total {
            warn!(
                rows = total,
                documents = results.len(),
                "rows share document keys; later results replaced earlier ones"
            );
        }

        let table = ReportTable::from_records(results.export());
        let workbook = write_xlsx(&table)?;
        let report_file = self.layout.report_file();
        tokio::fs::write(&report_file, &workbook)
            .await
            .map_err(|source| JobError::Io {
                path: report_file.clone(),
                source,
            })?;
        info!(path = %report_file.display(), "report written");

        let report_key = sel.report_key();
        self.store
            .upload(&report_key, Bytes::from(workbook), XLSX_CONTENT_TYPE)
            .await
            .map_err(|source| JobError::ReportUpload {
                key: report_key.clone(),
                source,
            })?;

        let (uploaded, skipped, failed) = results.tally();
        info!(rows = total, uploaded, skipped, failed, report = %report_key, "batch finished");

        Ok(JobSummary {
            rows: total,
            uploaded,
            skipped,
            failed,
            templates,
            images,
            records: results.into_records(),
            report_url: self.store.url_for(&report_key),
            report_key,
        })
    }

    async fn download(
        &self,
        what: &'static str,
        prefix: &str,
        dir: &Path,
    ) -> JobResult<DownloadSummary> {
        self.store
            .download_prefix_to_dir(prefix, dir)
            .await
            .map_err(|source| JobError::Download {
                what,
                prefix: prefix.to_string(),
                source,
            })
    }
}

/// Copy regular files from `src` into `dst`, keeping files already there.
///
/// Returns the number of files copied.
pub async fn copy_if_not_exists(src: &Path, dst: &Path) -> JobResult<usize> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| JobError::Io { path, source }
    };

    tokio::fs::create_dir_all(dst).await.map_err(io_err(dst))?;
    let mut entries = tokio::fs::read_dir(src).await.map_err(io_err(src))?;
    let mut copied = 0;

    while let Some(entry) = entries.next_entry().await.map_err(io_err(src))? {
        let path = entry.path();
        let file_type = entry.file_type().await.map_err(io_err(&path))?;
        if !file_type.is_file() {
            continue;
        }
        let target = dst.join(entry.file_name());
        if tokio::fs::try_exists(&target).await.map_err(io_err(&target))? {
            continue;
        }
        tokio::fs::copy(&path, &target).await.map_err(io_err(&target))?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let layout = WorkLayout::new("/work");
        assert_eq!(layout.template_dir(), PathBuf::from("/work/template"));
        assert_eq!(layout.image_dir(), PathBuf::from("/work/image"));
        assert_eq!(layout.data_file(), PathBuf::from("/work/data.json"));
        assert_eq!(
            layout.report_file(),
            PathBuf::from("/work/output/pdf_links.xlsx")
        );
    }

    #[tokio::test]
    async fn copy_keeps_existing_targets() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("logo.png"), b"new").unwrap();
        std::fs::write(src.path().join("seal.png"), b"seal").unwrap();
        std::fs::create_dir(src.path().join("nested")).unwrap();
        std::fs::write(dst.path().join("logo.png"), b"old").unwrap();

        let copied = copy_if_not_exists(src.path(), dst.path()).await.unwrap();

        assert_eq!(copied, 1);
        assert_eq!(std::fs::read(dst.path().join("logo.png")).unwrap(), b"old");
        assert_eq!(std::fs::read(dst.path().join("seal.png")).unwrap(), b"seal");
        assert!(!dst.path().join("nested").exists());
    }
}
