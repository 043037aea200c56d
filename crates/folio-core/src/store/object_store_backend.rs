//! [`BlobClient`] implementation over the `object_store` crate.
//!
//! Supports S3 (and S3-compatible endpoints), the local filesystem and an
//! in-memory store for tests.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::{
    Attribute, Attributes, ObjectMeta, ObjectStore, ObjectStoreExt, PutOptions, PutPayload,
};

use super::{BlobClient, ListPage, StoreError, StoreResult, StoreSpec};

/// Keys per listing page, matching the S3 ListObjectsV2 maximum.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Explicit S3 credentials; when absent the standard AWS environment is used.
#[derive(Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Blob client backed by `object_store`.
pub struct ObjectStoreClient {
    inner: Arc<dyn ObjectStore>,
    /// Optional key prefix inside the bucket (from `s3://bucket/prefix`).
    base_prefix: String,
    page_size: usize,
    /// Whether the backend lists keys in lexicographic order. Offset-based
    /// paging relies on it; unordered backends are sorted client-side.
    ordered_listing: bool,
    /// Whether `put` may carry a Content-Type attribute.
    supports_attributes: bool,
}

impl ObjectStoreClient {
    /// Create a client from a parsed spec.
    pub fn from_spec(spec: &StoreSpec, credentials: Option<&S3Credentials>) -> StoreResult<Self> {
        match spec.scheme.as_str() {
            "memory" => Ok(Self::memory()),
            "file" => {
                let path = if let Some(bucket) = spec.bucket.as_deref().filter(|b| !b.is_empty()) {
                    format!("/{}/{}", bucket, spec.prefix)
                } else if spec.prefix.is_empty() {
                    "/tmp/folio-store".to_string()
                } else {
                    format!("/{}", spec.prefix)
                };
                std::fs::create_dir_all(&path).map_err(|e| StoreError::Io {
                    message: format!("failed to create store directory {}: {}", path, e),
                })?;
                let local = object_store::local::LocalFileSystem::new_with_prefix(&path).map_err(
                    |e| StoreError::Io {
                        message: format!("failed to create local store at {}: {}", path, e),
                    },
                )?;
                Ok(Self {
                    inner: Arc::new(local),
                    base_prefix: String::new(),
                    page_size: DEFAULT_PAGE_SIZE,
                    ordered_listing: false,
                    supports_attributes: false,
                })
            }
            "s3" => {
                let bucket = spec
                    .bucket
                    .as_ref()
                    .ok_or_else(|| StoreError::InvalidSpec {
                        spec: format!("s3://{:?}/{}", spec.bucket, spec.prefix),
                        reason: "S3 URL must include bucket name".to_string(),
                    })?;

                let mut builder = object_store::aws::AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .with_allow_http(false);

                if let Some(region) = &spec.region {
                    builder = builder.with_region(region);
                }
                if let Some(creds) = credentials {
                    builder = builder
                        .with_access_key_id(&creds.access_key_id)
                        .with_secret_access_key(&creds.secret_access_key);
                }

                let s3 = builder.build().map_err(|e| StoreError::NotConfigured {
                    message: format!("failed to create S3 client: {}", e),
                })?;
                Ok(Self {
                    inner: Arc::new(s3),
                    base_prefix: spec.prefix.trim_matches('/').to_string(),
                    page_size: DEFAULT_PAGE_SIZE,
                    ordered_listing: true,
                    supports_attributes: true,
                })
            }
            scheme => Err(StoreError::InvalidSpec {
                spec: spec.scheme.clone(),
                reason: format!("unsupported scheme: {}", scheme),
            }),
        }
    }

    /// Create an in-memory store for testing.
    pub fn memory() -> Self {
        Self::from_store(Arc::new(object_store::memory::InMemory::new()))
    }

    /// Wrap an existing store (lexicographic listing assumed).
    pub fn from_store(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            base_prefix: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            ordered_listing: true,
            supports_attributes: true,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn path(&self, key: &str) -> Path {
        let key = key.trim_matches('/');
        if self.base_prefix.is_empty() {
            Path::from(key)
        } else if key.is_empty() {
            Path::from(self.base_prefix.as_str())
        } else {
            Path::from(format!("{}/{}", self.base_prefix, key))
        }
    }

    fn key(&self, path: &Path) -> String {
        let raw = path.as_ref();
        if self.base_prefix.is_empty() {
            return raw.to_string();
        }
        raw.strip_prefix(self.base_prefix.as_str())
            .map(|rest| rest.trim_start_matches('/').to_string())
            .unwrap_or_else(|| raw.to_string())
    }

    fn list_root(&self, prefix: &str) -> Option<Path> {
        let path = self.path(prefix);
        if path.as_ref().is_empty() {
            None
        } else {
            Some(path)
        }
    }
}

#[async_trait]
impl BlobClient for ObjectStoreClient {
    async fn head(&self, key: &str) -> StoreResult<()> {
        self.inner
            .head(&self.path(key))
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_object_store(e, key))
    }

    async fn list_page(&self, prefix: &str, token: Option<&str>) -> StoreResult<ListPage> {
        let root = self.list_root(prefix);
        let stream = match token {
            Some(after) => self.inner.list_with_offset(root.as_ref(), &self.path(after)),
            None => self.inner.list(root.as_ref()),
        };

        let mut metas: Vec<ObjectMeta> = if self.ordered_listing {
            // One extra entry tells whether another page follows.
            stream
                .take(self.page_size + 1)
                .try_collect()
                .await
                .map_err(|e| StoreError::from_object_store(e, prefix))?
        } else {
            let mut all: Vec<ObjectMeta> = stream
                .try_collect()
                .await
                .map_err(|e| StoreError::from_object_store(e, prefix))?;
            all.sort_by(|a, b| a.location.cmp(&b.location));
            all.truncate(self.page_size + 1);
            all
        };

        let more = metas.len() > self.page_size;
        metas.truncate(self.page_size);
        let keys: Vec<String> = metas.iter().map(|m| self.key(&m.location)).collect();
        let next_token = if more { keys.last().cloned() } else { None };

        Ok(ListPage { keys, next_token })
    }

    async fn list_folders(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let root = self.list_root(prefix);
        let listing = self
            .inner
            .list_with_delimiter(root.as_ref())
            .await
            .map_err(|e| StoreError::from_object_store(e, prefix))?;

        let mut folders: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|p| p.filename().map(|s| s.to_string()))
            .collect();
        folders.sort();
        Ok(folders)
    }

    async fn get(&self, key: &str) -> StoreResult<Bytes> {
        let result = self
            .inner
            .get(&self.path(key))
            .await
            .map_err(|e| StoreError::from_object_store(e, key))?;

        result.bytes().await.map_err(|e| StoreError::Io {
            message: format!("failed to read {} bytes: {}", key, e),
        })
    }

    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        let mut attributes = Attributes::new();
        if self.supports_attributes {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
        }
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        self.inner
            .put_opts(&self.path(key), PutPayload::from_bytes(bytes), opts)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_object_store(e, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip_and_head() {
        let client = ObjectStoreClient::memory();

        client
            .put("out/a.pdf", Bytes::from_static(b"%PDF"), "application/pdf")
            .await
            .unwrap();

        client.head("out/a.pdf").await.unwrap();
        assert_eq!(client.get("out/a.pdf").await.unwrap(), Bytes::from_static(b"%PDF"));

        let missing = client.head("out/b.pdf").await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_pages_follow_offset_tokens() {
        let client = ObjectStoreClient::memory().with_page_size(2);
        for name in ["a", "b", "c", "d", "e"] {
            client
                .put(&format!("p/{name}.typ"), Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap();
        }
        client
            .put("other/z.typ", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap();

        let first = client.list_page("p/", None).await.unwrap();
        assert_eq!(first.keys, vec!["p/a.typ", "p/b.typ"]);
        assert_eq!(first.next_token.as_deref(), Some("p/b.typ"));

        let second = client.list_page("p/", first.next_token.as_deref()).await.unwrap();
        assert_eq!(second.keys, vec!["p/c.typ", "p/d.typ"]);

        let last = client.list_page("p/", second.next_token.as_deref()).await.unwrap();
        assert_eq!(last.keys, vec!["p/e.typ"]);
        assert!(last.next_token.is_none());
    }

    #[tokio::test]
    async fn test_list_folders_returns_child_names() {
        let client = ObjectStoreClient::memory();
        for key in [
            "TEMPLATE/acme/Data/data.json",
            "TEMPLATE/acme/Templates/notice/a.typ",
            "TEMPLATE/globex/Images/logo.png",
        ] {
            client.put(key, Bytes::from_static(b"x"), "text/plain").await.unwrap();
        }

        let clients = client.list_folders("TEMPLATE/").await.unwrap();
        assert_eq!(clients, vec!["acme", "globex"]);
        let templates = client.list_folders("TEMPLATE/acme/Templates/").await.unwrap();
        assert_eq!(templates, vec!["notice"]);
    }

    #[tokio::test]
    async fn test_file_store_lists_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file://{}", dir.path().display());
        let spec = StoreSpec::parse(&url).unwrap();
        let client = ObjectStoreClient::from_spec(&spec, None).unwrap().with_page_size(2);

        for name in ["c", "a", "b"] {
            client
                .put(&format!("t/{name}.typ"), Bytes::from_static(b"x"), "text/plain")
                .await
                .unwrap();
        }

        let first = client.list_page("t/", None).await.unwrap();
        assert_eq!(first.keys, vec!["t/a.typ", "t/b.typ"]);
        let rest = client.list_page("t/", first.next_token.as_deref()).await.unwrap();
        assert_eq!(rest.keys, vec!["t/c.typ"]);
    }
}
