//! Choose client, template folder, subfolder and output prefix.
//!
//! Values given on the command line are used as-is; the rest is picked
//! from the folders present in the bucket.

use anyhow::{bail, Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Select};
use folio_core::store::naming::CLIENT_ROOT;
use folio_core::{BlobStore, Selection};
use tracing::info;

use crate::cli::args::SelectionArgs;

/// Menu entry meaning "use the template folder itself".
pub const NO_SUBFOLDER: &str = "None";

pub fn templates_prefix(client: &str) -> String {
    format!("{CLIENT_ROOT}{client}/Templates/")
}

pub async fn resolve(store: &BlobStore, args: &SelectionArgs) -> Result<Selection> {
    let theme = ColorfulTheme::default();
    let interactive = args.client.is_none() || args.template.is_none();

    let client = match &args.client {
        Some(client) => client.clone(),
        None => {
            let clients = store
                .list_folders(CLIENT_ROOT)
                .await
                .context("failed to list clients")?;
            if clients.is_empty() {
                bail!("no clients found under {CLIENT_ROOT}");
            }
            pick(&theme, "Select client", &clients)?
        }
    };

    let prefix = templates_prefix(&client);
    let template = match &args.template {
        Some(template) => template.clone(),
        None => {
            let templates = store
                .list_folders(&prefix)
                .await
                .with_context(|| format!("failed to list templates under {prefix}"))?;
            if templates.is_empty() {
                bail!("no templates found under {prefix}");
            }
            pick(&theme, "Select template folder", &templates)?
        }
    };

    let subfolder = match &args.subfolder {
        Some(sub) => Some(sub.clone()),
        None if interactive => {
            let sub_prefix = format!("{prefix}{template}/");
            let subfolders = store
                .list_folders(&sub_prefix)
                .await
                .with_context(|| format!("failed to list subfolders under {sub_prefix}"))?;
            if subfolders.is_empty() {
                None
            } else {
                let items = subfolder_items(subfolders);
                let index = Select::with_theme(&theme)
                    .with_prompt("Select subfolder (optional)")
                    .items(&items)
                    .default(items.len() - 1)
                    .interact()
                    .context("subfolder selection aborted")?;
                picked_subfolder(&items, index)
            }
        }
        None => None,
    };

    let output_prefix = match &args.output_prefix {
        Some(prefix) if !interactive => prefix.clone(),
        None if !interactive => String::new(),
        default => Input::<String>::with_theme(&theme)
            .with_prompt("Output prefix for generated documents")
            .default(default.clone().unwrap_or_default())
            .allow_empty(true)
            .interact_text()
            .context("output prefix input aborted")?,
    };

    let selection = Selection::for_client(&client, &template, subfolder.as_deref(), &output_prefix);
    info!(
        templates = %selection.template_prefix,
        images = %selection.image_prefix,
        data = %selection.data_key,
        output = %selection.output_prefix,
        "selected paths"
    );
    Ok(selection)
}

fn pick(theme: &ColorfulTheme, prompt: &str, items: &[String]) -> Result<String> {
    let index = Select::with_theme(theme)
        .with_prompt(prompt)
        .items(items)
        .default(0)
        .interact()
        .with_context(|| format!("{prompt}: selection aborted"))?;
    Ok(items[index].clone())
}

/// Subfolder names followed by the [`NO_SUBFOLDER`] entry.
pub fn subfolder_items(mut folders: Vec<String>) -> Vec<String> {
    folders.push(NO_SUBFOLDER.to_string());
    folders
}

pub fn picked_subfolder(items: &[String], index: usize) -> Option<String> {
    items
        .get(index)
        .filter(|item| item.as_str() != NO_SUBFOLDER)
        .cloned()
}
