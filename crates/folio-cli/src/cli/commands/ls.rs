//! `folio ls` - Show the clients and template folders in the bucket.

use anyhow::{Context, Result};
use folio_core::store::naming::CLIENT_ROOT;

use crate::cli::args::LsArgs;
use crate::exit_codes::SUCCESS;
use crate::selector::templates_prefix;

pub async fn run(args: LsArgs) -> Result<i32> {
    let store = args
        .storage
        .to_config()
        .build_store()
        .context("invalid storage configuration")?;

    let prefix = match &args.client {
        Some(client) => templates_prefix(client),
        None => CLIENT_ROOT.to_string(),
    };
    let folders = store
        .list_folders(&prefix)
        .await
        .with_context(|| format!("failed to list {prefix}"))?;

    if folders.is_empty() {
        eprintln!("No folders under {prefix}");
    }
    for folder in folders {
        println!("{folder}");
    }
    Ok(SUCCESS)
}
