//! Storage and run configuration.
//!
//! Values arrive already resolved (flags, environment, `.env`); this module
//! only validates them and turns them into a ready [`BlobStore`].

use std::path::PathBuf;
use std::sync::Arc;

use crate::pipeline::DEFAULT_CONCURRENCY;
use crate::store::naming::normalize_prefix;
use crate::store::{
    BlobStore, ObjectStoreClient, S3Credentials, StoreError, StoreSpec, UrlStyle,
};

pub const ENV_BUCKET: &str = "S3_BUCKET_NAME";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_ACCESS_KEY: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_CONCURRENCY: &str = "CONCURRENCY";
pub const ENV_OUTPUT_PREFIX: &str = "S3_OUTPUT_PREFIX";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration: {key}")]
    Missing { key: &'static str },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Where documents are stored and how they are addressed publicly.
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Store URL overriding the S3 bucket (`file://...`, `memory://`).
    pub store_url: Option<String>,
    /// Base for public document URLs instead of the S3 virtual-hosted form.
    pub public_base_url: Option<String>,
}

impl StorageConfig {
    /// Check required keys, reporting the first one missing.
    ///
    /// With a `store_url` override only a URL base is required: either
    /// `public_base_url` or bucket plus region.
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(url) = present(&self.store_url) {
            StoreSpec::parse(url)?;
            if present(&self.public_base_url).is_none() {
                require(&self.bucket, ENV_BUCKET)?;
                require(&self.region, ENV_REGION)?;
            }
            return Ok(());
        }

        require(&self.bucket, ENV_BUCKET)?;
        require(&self.region, ENV_REGION)?;
        require(&self.access_key, ENV_ACCESS_KEY)?;
        require(&self.secret_key, ENV_SECRET_KEY)?;
        Ok(())
    }

    pub fn url_style(&self) -> ConfigResult<UrlStyle> {
        if let Some(base) = present(&self.public_base_url) {
            return Ok(UrlStyle::Base(base.to_string()));
        }
        Ok(UrlStyle::VirtualHosted {
            bucket: require(&self.bucket, ENV_BUCKET)?.to_string(),
            region: require(&self.region, ENV_REGION)?.to_string(),
        })
    }

    pub fn store_spec(&self) -> ConfigResult<StoreSpec> {
        match present(&self.store_url) {
            Some(url) => Ok(StoreSpec::parse(url)?),
            None => Ok(StoreSpec::s3(
                require(&self.bucket, ENV_BUCKET)?,
                require(&self.region, ENV_REGION)?,
            )),
        }
    }

    fn credentials(&self) -> Option<S3Credentials> {
        match (present(&self.access_key), present(&self.secret_key)) {
            (Some(id), Some(secret)) => Some(S3Credentials {
                access_key_id: id.to_string(),
                secret_access_key: secret.to_string(),
            }),
            _ => None,
        }
    }

    /// Validate and build the shared store adapter.
    pub fn build_store(&self) -> ConfigResult<Arc<BlobStore>> {
        self.validate()?;
        let spec = self.store_spec()?;
        let client = ObjectStoreClient::from_spec(&spec, self.credentials().as_ref())?;
        Ok(Arc::new(BlobStore::new(Arc::new(client), self.url_style()?)))
    }
}

/// Run-wide knobs outside storage.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub concurrency: usize,
    pub output_prefix: String,
    /// Root of the local working tree (`template/`, `image/`, `output/`).
    pub work_dir: PathBuf,
    pub typst_bin: PathBuf,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            output_prefix: String::new(),
            work_dir: PathBuf::from("."),
            typst_bin: PathBuf::from("typst"),
        }
    }
}

impl RunSettings {
    pub fn new(
        concurrency: usize,
        output_prefix: &str,
        work_dir: impl Into<PathBuf>,
        typst_bin: impl Into<PathBuf>,
    ) -> ConfigResult<Self> {
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_CONCURRENCY,
                reason: "must be at least 1".into(),
            });
        }
        let output_prefix = normalize_prefix(output_prefix);
        if output_prefix.is_empty() {
            return Err(ConfigError::Missing {
                key: ENV_OUTPUT_PREFIX,
            });
        }
        Ok(Self {
            concurrency,
            output_prefix,
            work_dir: work_dir.into(),
            typst_bin: typst_bin.into(),
        })
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn require<'a>(value: &'a Option<String>, key: &'static str) -> ConfigResult<&'a str> {
    present(value).ok_or(ConfigError::Missing { key })
}
