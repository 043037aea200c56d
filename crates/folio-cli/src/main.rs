use clap::Parser;

mod cli;
pub mod exit_codes;
mod logging;
mod selector;

use cli::args::Cli;
use cli::commands::dispatch;
use folio_core::ConfigError;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.log_dir) {
        eprintln!("fatal: {e:?}");
        std::process::exit(exit_codes::CONFIG_ERROR);
    }

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "fatal error");
            eprintln!("fatal: {e:?}");
            if e.downcast_ref::<ConfigError>().is_some() {
                exit_codes::CONFIG_ERROR
            } else {
                exit_codes::RUN_FAILED
            }
        }
    };
    std::process::exit(code);
}
