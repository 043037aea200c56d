//! Blob storage for templates, images, data files and generated documents.
//!
//! Two layers:
//!
//! 1. [`BlobClient`]: raw key/value operations (head, one list page, get,
//!    put). [`ObjectStoreClient`] implements it over the `object_store`
//!    crate; tests plug in fakes.
//! 2. [`BlobStore`]: the adapter the pipeline talks to. It adds retry,
//!    pagination, folder-marker filtering, bulk prefix downloads and public
//!    URL derivation.
//!
//! # Store URLs
//!
//! ```text
//! s3://my-bucket?region=eu-west-1
//! file:///tmp/folio-store
//! memory://  (for testing)
//! ```

pub mod blob_store;
pub mod error;
pub mod naming;
pub mod object_store_backend;

use async_trait::async_trait;
use bytes::Bytes;

pub use blob_store::{BlobStore, DownloadSummary};
pub use error::{StoreError, StoreResult};
pub use naming::{Selection, UrlStyle};
pub use object_store_backend::{ObjectStoreClient, S3Credentials};

/// Parsed store specification from CLI/config.
#[derive(Debug, Clone)]
pub struct StoreSpec {
    /// The scheme (s3, file, memory)
    pub scheme: String,
    /// Bucket name (empty for file://)
    pub bucket: Option<String>,
    /// Path within the bucket, or the local root for file://
    pub prefix: String,
    /// Optional region (for S3)
    pub region: Option<String>,
}

impl StoreSpec {
    /// Parse a store URL like `s3://bucket?region=..` or `file:///path`.
    pub fn parse(url: &str) -> StoreResult<Self> {
        let url = url::Url::parse(url).map_err(|e| StoreError::InvalidSpec {
            spec: url.to_string(),
            reason: e.to_string(),
        })?;

        let scheme = url.scheme().to_string();
        let bucket = url.host_str().map(|s| s.to_string());
        let prefix = url.path().trim_start_matches('/').to_string();

        let region = url
            .query_pairs()
            .find(|(k, _)| k == "region")
            .map(|(_, v)| v.to_string());

        Ok(Self {
            scheme,
            bucket,
            prefix,
            region,
        })
    }

    /// S3 bucket spec from plain configuration values.
    pub fn s3(bucket: &str, region: &str) -> Self {
        Self {
            scheme: "s3".to_string(),
            bucket: Some(bucket.to_string()),
            prefix: String::new(),
            region: Some(region.to_string()),
        }
    }

    /// Check if this is a memory store (for testing).
    pub fn is_memory(&self) -> bool {
        self.scheme == "memory"
    }

    /// Check if this is a local file store.
    pub fn is_file(&self) -> bool {
        self.scheme == "file"
    }
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Keys in this page, folder markers included.
    pub keys: Vec<String>,
    /// Token for the next page; `None` when the listing is complete.
    pub next_token: Option<String>,
}

/// Raw object storage operations.
///
/// Implementations do no retrying; [`BlobStore`] owns that policy.
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// `Ok(())` if an object exists at `key`,
    /// `Err(StoreError::NotFound)` if not.
    async fn head(&self, key: &str) -> StoreResult<()>;

    /// Fetch one page of keys under `prefix`, continuing after `token`.
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> StoreResult<ListPage>;

    /// Immediate sub-folder names under `prefix`.
    async fn list_folders(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Full object content.
    async fn get(&self, key: &str) -> StoreResult<Bytes>;

    /// Store `bytes` at `key`, overwriting.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()>;
}
