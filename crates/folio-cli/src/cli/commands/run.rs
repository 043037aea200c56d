//! `folio run` - Generate documents for every data row and publish the report.

use std::sync::Arc;

use anyhow::{Context, Result};
use folio_core::{BatchJob, ProgressEvent, RunSettings, TypstCompiler};

use crate::cli::args::RunArgs;
use crate::exit_codes::SUCCESS;
use crate::selector;

pub async fn run(args: RunArgs) -> Result<i32> {
    let store = args
        .storage
        .to_config()
        .build_store()
        .context("invalid storage configuration")?;

    let selection = selector::resolve(&store, &args.selection).await?;
    let settings = RunSettings::new(
        args.concurrency,
        &selection.output_prefix,
        &args.work_dir,
        &args.typst_bin,
    )?;

    let mut compiler = TypstCompiler::new(&settings.typst_bin);
    for font_path in &args.font_path {
        compiler = compiler.with_font_path(font_path);
    }

    let summary = BatchJob::new(store, Arc::new(compiler), selection)
        .with_work_dir(&settings.work_dir)
        .with_concurrency(settings.concurrency)
        .with_progress(Arc::new(print_progress))
        .run()
        .await
        .context("batch run failed")?;

    println!();
    println!("Rows:     {}", summary.rows);
    println!("Uploaded: {}", summary.uploaded);
    println!("Skipped:  {}", summary.skipped);
    println!("Failed:   {}", summary.failed);
    if !summary.images.failed.is_empty() || !summary.templates.failed.is_empty() {
        println!(
            "Download failures: {} template(s), {} image(s)",
            summary.templates.failed.len(),
            summary.images.failed.len()
        );
    }
    println!("Report:   {}", summary.report_url);

    Ok(SUCCESS)
}

fn print_progress(event: ProgressEvent) {
    eprintln!("[{}/{}] {}", event.done, event.total, event.status);
}
