use clap::{Args, Parser, Subcommand};
use folio_core::StorageConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "folio",
    version,
    about = "Batch PDF generation: Typst templates + JSON rows -> documents in object storage"
)]
pub struct Cli {
    /// Directory for process.log and error.log
    #[arg(long, global = true, env = "FOLIO_LOG_DIR", default_value = ".")]
    pub log_dir: PathBuf,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate, upload and report documents for one client template
    Run(RunArgs),
    /// List clients, or the templates of one client
    Ls(LsArgs),
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct StorageArgs {
    /// Bucket holding templates, data and generated documents
    #[arg(long, env = "S3_BUCKET_NAME")]
    pub bucket: Option<String>,

    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key: Option<String>,

    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Store URL replacing the S3 bucket (e.g., file:///srv/folio, memory://)
    #[arg(long = "store", env = "FOLIO_STORE_URL")]
    pub store_url: Option<String>,

    /// Base URL for document links instead of https://<bucket>.s3.<region>.amazonaws.com
    #[arg(long, env = "FOLIO_PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,
}

impl StorageArgs {
    pub fn to_config(&self) -> StorageConfig {
        StorageConfig {
            bucket: self.bucket.clone(),
            region: self.region.clone(),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
            store_url: self.store_url.clone(),
            public_base_url: self.public_base_url.clone(),
        }
    }
}

/// Which client template to run. Anything left out is asked interactively.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    #[arg(long)]
    pub client: Option<String>,

    /// Template folder under TEMPLATE/<client>/Templates/
    #[arg(long)]
    pub template: Option<String>,

    /// Optional subfolder of the template folder ("" for none)
    #[arg(long)]
    pub subfolder: Option<String>,

    /// Key prefix for generated documents and the report
    #[arg(long, env = "S3_OUTPUT_PREFIX")]
    pub output_prefix: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Rows processed at once
    #[arg(long, env = "CONCURRENCY", default_value_t = 3)]
    pub concurrency: usize,

    /// Local working directory (template/, image/, output/, data.json)
    #[arg(long, env = "FOLIO_WORK_DIR", default_value = ".")]
    pub work_dir: PathBuf,

    /// Typst executable
    #[arg(long, env = "TYPST_BIN", default_value = "typst")]
    pub typst_bin: PathBuf,

    /// Extra font directory passed to the compiler
    #[arg(long)]
    pub font_path: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct LsArgs {
    #[command(flatten)]
    pub storage: StorageArgs,

    /// Show the template folders of this client
    #[arg(long)]
    pub client: Option<String>,
}
