use std::io::IsTerminal;
use std::process::ExitCode;

use serde::Serialize;
use tracing_subscriber::EnvFilter;

use fetch_asset::Fetcher;

use crate::args::{OutputFormat, ValidatedArgs, ValidatedCommand};
use crate::error::AppError;

mod args;
mod error;
mod progress;

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "fetch_asset=warn",
        1 => "fetch_asset=info",
        _ => "fetch_asset=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String, AppError> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).map_err(|e| AppError::output("JSON", e))
        }
        OutputFormat::Toml => toml::to_string(value).map_err(|e| AppError::output("TOML", e)),
    }
}

fn run() -> Result<(), AppError> {
    let args = args::parse();
    init_logging(args.verbose);
    let args = ValidatedArgs::try_from(args)?;
    tracing::debug!(config = ?args.config, "configuration loaded");

    match args.command {
        ValidatedCommand::Fetch { source, options } => {
            let fetcher = Fetcher::new(args.config)?;
            let pb = progress::make_progress_spinner(format!(
                "Fetching {}",
                fetch_asset::redact(&source)
            ));
            let result = fetcher.fetch(&source, &options);
            pb.finish_and_clear();
            let path = result?;
            println!("{}", path.display());
        }
        ValidatedCommand::Plan {
            source,
            options,
            format,
        } => {
            let fetcher = Fetcher::new(args.config)?;
            let plan = fetcher.plan(&source, &options)?;
            println!("{}", render(&plan, format)?);
        }
        ValidatedCommand::Resolve { source, format } => {
            let descriptor = fetch_asset::SourceDescriptor::resolve(&source, &args.config)?;
            println!("{}", render(&descriptor, format)?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let style = if std::io::stderr().is_terminal() {
                args::ERROR
            } else {
                anstyle::Style::new()
            };
            eprintln!(
                "{style}error:{style:#} {}",
                fetch_asset::redact(&err.to_string())
            );
            err.into()
        }
    }
}
