//! Retrying, paginating adapter over a [`BlobClient`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream, TryStreamExt};
use tracing::{debug, error, info};

use super::naming::{basename, is_directory_marker, UrlStyle};
use super::{BlobClient, StoreError, StoreResult};
use crate::retry::RetryPolicy;

/// Outcome of a bulk prefix download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Local files written.
    pub downloaded: Vec<PathBuf>,
    /// Keys that could not be fetched or written.
    pub failed: Vec<String>,
}

/// The blob store the pipeline talks to.
///
/// Cheap to share behind an `Arc`; holds no mutable state.
pub struct BlobStore {
    client: Arc<dyn BlobClient>,
    retry: RetryPolicy,
    urls: UrlStyle,
}

enum Cursor {
    Start,
    After(String),
    Done,
}

impl BlobStore {
    pub fn new(client: Arc<dyn BlobClient>, urls: UrlStyle) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            urls,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Public URL of the object at `key`.
    pub fn url_for(&self, key: &str) -> String {
        self.urls.url_for(key)
    }

    /// `true` if an object exists; `NotFound` maps to `false`, every other
    /// failure is returned.
    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        match self.client.head(key).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lazily list every content key under `prefix`.
    ///
    /// Pages are fetched on demand, each fetch retried; folder markers
    /// (keys ending in `/`) are skipped.
    pub fn list_under_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Stream<Item = StoreResult<String>> + Send + 'a {
        stream::try_unfold(Cursor::Start, move |cursor| async move {
            let token = match cursor {
                Cursor::Done => return Ok::<_, StoreError>(None),
                Cursor::Start => None,
                Cursor::After(token) => Some(token),
            };

            let page = self
                .retry
                .execute_when(
                    || self.client.list_page(prefix, token.as_deref()),
                    StoreError::is_retryable,
                )
                .await
                .map_err(|e| StoreError::exhausted("list", e))?;

            debug!(prefix, keys = page.keys.len(), more = page.next_token.is_some(), "listed page");

            let next = match page.next_token {
                Some(token) => Cursor::After(token),
                None => Cursor::Done,
            };
            let keys: Vec<StoreResult<String>> = page
                .keys
                .into_iter()
                .filter(|k| !is_directory_marker(k))
                .map(Ok)
                .collect();
            Ok(Some((stream::iter(keys), next)))
        })
        .try_flatten()
    }

    /// Collect [`list_under_prefix`](Self::list_under_prefix).
    pub async fn list_keys(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.list_under_prefix(prefix).try_collect().await
    }

    /// Immediate sub-folder names under `prefix`.
    pub async fn list_folders(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.retry
            .execute_when(|| self.client.list_folders(prefix), StoreError::is_retryable)
            .await
            .map_err(|e| StoreError::exhausted("list folders", e))
    }

    /// Fetch the full content of `key`.
    pub async fn download(&self, key: &str) -> StoreResult<Bytes> {
        self.retry
            .execute_when(|| self.client.get(key), StoreError::is_retryable)
            .await
            .map_err(|e| StoreError::exhausted("download", e))
    }

    /// Download every object under `prefix` into `dir/<basename>`.
    ///
    /// A failing object is logged and skipped; a failing listing aborts.
    pub async fn download_prefix_to_dir(
        &self,
        prefix: &str,
        dir: &Path,
    ) -> StoreResult<DownloadSummary> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::Io {
                message: format!("failed to create {}: {}", dir.display(), e),
            })?;

        info!(prefix, dir = %dir.display(), "downloading prefix");
        let mut summary = DownloadSummary::default();
        let keys = self.list_under_prefix(prefix);
        futures::pin_mut!(keys);

        while let Some(key) = keys.try_next().await? {
            let target = dir.join(basename(&key));
            match self.download_to(&key, &target).await {
                Ok(()) => {
                    debug!(key = %key, path = %target.display(), "downloaded");
                    summary.downloaded.push(target);
                }
                Err(e) => {
                    error!(key = %key, error = %e, "failed to download object");
                    summary.failed.push(key);
                }
            }
        }

        info!(
            prefix,
            downloaded = summary.downloaded.len(),
            failed = summary.failed.len(),
            "completed prefix download"
        );
        Ok(summary)
    }

    async fn download_to(&self, key: &str, target: &Path) -> StoreResult<()> {
        let bytes = self.download(key).await?;
        tokio::fs::write(target, &bytes)
            .await
            .map_err(|e| StoreError::Io {
                message: format!("failed to write {}: {}", target.display(), e),
            })
    }

    /// Store `bytes` at `key`, retrying transient failures.
    pub async fn upload(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        self.retry
            .execute_when(
                || self.client.put(key, bytes.clone(), content_type),
                StoreError::is_retryable,
            )
            .await
            .map_err(|e| StoreError::exhausted("upload", e))?;
        info!(key, size = bytes.len(), "uploaded");
        Ok(())
    }
}
