//! Batch document generation: fill Typst templates from JSON rows, compile
//! them to PDF and publish the results to blob storage, with a spreadsheet
//! of links at the end.

pub mod compiler;
pub mod config;
pub mod job;
pub mod pipeline;
pub mod report;
pub mod results;
pub mod retry;
pub mod row;
pub mod store;
pub mod template;

// Convenience re-exports
pub use compiler::{CompileError, DocumentCompiler, TypstCompiler};
pub use config::{ConfigError, RunSettings, StorageConfig};
pub use job::{BatchJob, JobError, JobSummary, WorkLayout};
pub use pipeline::{
    Pipeline, PipelineError, PipelineSettings, ProgressEvent, ProgressSink, RowError,
};
pub use report::{write_xlsx, ReportError, ReportTable};
pub use results::{OutputRecord, ResultSet, RowOutcome};
pub use retry::{RetryError, RetryPolicy};
pub use row::{parse_rows, DataError, Row};
pub use store::{
    BlobClient, BlobStore, ObjectStoreClient, Selection, StoreError, StoreSpec, UrlStyle,
};
pub use template::{render, TemplateError, TemplateSet};

pub use bytes::Bytes;
