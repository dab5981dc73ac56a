use std::path::PathBuf;

use clap::Parser;

use fetch_asset::{ContentKind, FetchConfig, FetchOptions, Protocol, Provider};

use crate::error::AppError;

// Shamelessly borrowed from https://github.com/crate-ci/clap-cargo/blob/0378657ffdf2b67bcd6f1ab56e04a1322b92dd0e/src/style.rs
use anstyle::AnsiColor::*;
use anstyle::Effects;
use anstyle::Style;

const HEADER: Style = Green.on_default().effects(Effects::BOLD);
const USAGE: Style = Green.on_default().effects(Effects::BOLD);
const LITERAL: Style = Cyan.on_default().effects(Effects::BOLD);
const PLACEHOLDER: Style = Cyan.on_default();
pub const ERROR: Style = Red.on_default().effects(Effects::BOLD);
const VALID: Style = Cyan.on_default().effects(Effects::BOLD);
const INVALID: Style = Yellow.on_default().effects(Effects::BOLD);

const APP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(HEADER)
    .usage(USAGE)
    .literal(LITERAL)
    .placeholder(PLACEHOLDER)
    .error(ERROR)
    .valid(VALID)
    .invalid(INVALID);

const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Parser)]
#[command(name = "fetch-asset")]
#[command(version)]
#[command(about = "Fetch git repositories, repository content and build artifacts")]
#[command(long_about = None)]
#[command(styles = APP_STYLING)]
#[command(term_width = 100)]
pub struct Args {
    /// Configuration file. If omitted, `config.toml` in the user configuration directory is read
    /// when it exists.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Log more (-v for info, -vv for debug). `RUST_LOG` takes precedence.
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Fetch a source into a destination directory
    Fetch {
        #[command(flatten)]
        selection: Selection,

        #[command(flatten)]
        overrides: Overrides,

        /// Prompt for the artifact service password
        #[arg(long)]
        ask_password: bool,
    },
    /// Show the command or request a fetch would issue, without running it
    Plan {
        #[command(flatten)]
        selection: Selection,

        #[command(flatten)]
        overrides: Overrides,

        /// Output format
        #[arg(long, short = 'f', value_enum, value_name = "FORMAT", default_value = "json")]
        format: OutputFormat,
    },
    /// Show how a source identifier is parsed
    Resolve {
        /// Source identifier
        source: String,

        #[command(flatten)]
        overrides: Overrides,

        /// Output format
        #[arg(long, short = 'f', value_enum, value_name = "FORMAT", default_value = "json")]
        format: OutputFormat,
    },
}

#[derive(Debug, clap::Args)]
struct Selection {
    /// Source identifier: URL, SCP address, namespace/repo, or gitlab://namespace/repo[@ref][//path]
    source: String,

    /// Destination directory, created if missing
    #[arg(long, short = 'd', value_name = "PATH", default_value = ".")]
    dest: PathBuf,

    /// Retrieval strategy. Inferred from the source when omitted.
    #[arg(long, short = 'p', value_enum, value_name = "PROVIDER")]
    provider: Option<ProviderArg>,

    /// Branch or tag
    #[arg(long = "ref", short = 'r', value_name = "REF")]
    git_ref: Option<String>,

    /// What the sub-path names, overriding the guess made from its final segment
    #[arg(long, short = 'k', value_enum, value_name = "KIND")]
    kind: Option<KindArg>,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,
}

#[derive(Debug, Default, clap::Args)]
struct Overrides {
    /// git executable to use instead of the one on PATH
    #[arg(long, value_name = "PATH")]
    git_binary: Option<PathBuf>,

    /// Host for namespace/repo shorthand and the REST API
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Clone protocol for namespace/repo shorthand
    #[arg(long, value_enum, value_name = "PROTOCOL")]
    protocol: Option<ProtocolArg>,

    /// User for SSH shorthand addresses
    #[arg(long, value_name = "USER")]
    ssh_user: Option<String>,

    /// REST API base URL, used verbatim
    #[arg(long, value_name = "URL")]
    api_base: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Output in JSON format
    Json,
    /// Output in TOML format
    Toml,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ProviderArg {
    Git,
    Content,
    Artifact,
}

impl From<ProviderArg> for Provider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Git => Provider::Git,
            ProviderArg::Content => Provider::Content,
            ProviderArg::Artifact => Provider::Artifact,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum KindArg {
    Repo,
    Dir,
    File,
}

impl From<KindArg> for ContentKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Repo => ContentKind::Repo,
            KindArg::Dir => ContentKind::Dir,
            KindArg::File => ContentKind::File,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ProtocolArg {
    Ssh,
    Https,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Ssh => Protocol::Ssh,
            ProtocolArg::Https => Protocol::Https,
        }
    }
}

impl Overrides {
    fn into_layer(self) -> FetchConfig {
        FetchConfig {
            git_binary: self.git_binary,
            host: self.host,
            protocol: self.protocol.map(Into::into),
            ssh_user: self.ssh_user,
            api_base: self.api_base,
            ..Default::default()
        }
    }
}

impl Selection {
    fn into_options(self) -> (String, FetchOptions, Option<u64>) {
        let options = FetchOptions {
            destination: self.dest,
            git_ref: self.git_ref,
            provider: self.provider.map(Into::into),
            content_kind: self.kind.map(Into::into),
            deadline: None,
        };
        (self.source, options, self.timeout)
    }
}

#[derive(Debug)]
pub struct ValidatedArgs {
    pub verbose: u8,
    pub config: FetchConfig,
    pub command: ValidatedCommand,
}

#[derive(Debug)]
pub enum ValidatedCommand {
    Fetch {
        source: String,
        options: FetchOptions,
    },
    Plan {
        source: String,
        options: FetchOptions,
        format: OutputFormat,
    },
    Resolve {
        source: String,
        format: OutputFormat,
    },
}

/// The file layer: `--config` must exist; the default location is optional.
fn load_config_file(arg: Option<PathBuf>) -> Result<FetchConfig, AppError> {
    let path = match arg {
        Some(path) => path,
        None => {
            let Some(dirs) = directories::ProjectDirs::from("", "", "fetch-asset") else {
                return Ok(FetchConfig::default());
            };
            let path = dirs.config_dir().join(CONFIG_FILE_NAME);
            if !path.is_file() {
                tracing::debug!(path = %path.display(), "no config file");
                return Ok(FetchConfig::default());
            }
            path
        }
    };
    tracing::debug!(path = %path.display(), "reading config file");
    FetchConfig::from_file(&path).map_err(AppError::config)
}

fn layered_config(
    file: Option<PathBuf>,
    overrides: Overrides,
    timeout: Option<u64>,
) -> Result<FetchConfig, AppError> {
    let env = FetchConfig::from_env().map_err(AppError::config)?;
    let cli = FetchConfig {
        timeout_secs: timeout,
        ..overrides.into_layer()
    };
    Ok(load_config_file(file)?.overlay(env).overlay(cli))
}

fn ask_password() -> Result<String, AppError> {
    rpassword::prompt_password("Artifact password: ")
        .map_err(|e| AppError::arg_validation(format!("failed to read password: {e}")))
}

impl TryFrom<Args> for ValidatedArgs {
    type Error = AppError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let (config, command) = match args.command {
            Command::Fetch {
                selection,
                overrides,
                ask_password: prompt,
            } => {
                let (source, options, timeout) = selection.into_options();
                let mut config = layered_config(args.config, overrides, timeout)?;
                if prompt {
                    config.artifact.password = Some(ask_password()?);
                }
                (config, ValidatedCommand::Fetch { source, options })
            }
            Command::Plan {
                selection,
                overrides,
                format,
            } => {
                let (source, options, timeout) = selection.into_options();
                let config = layered_config(args.config, overrides, timeout)?;
                (
                    config,
                    ValidatedCommand::Plan {
                        source,
                        options,
                        format,
                    },
                )
            }
            Command::Resolve {
                source,
                overrides,
                format,
            } => {
                let config = layered_config(args.config, overrides, None)?;
                (config, ValidatedCommand::Resolve { source, format })
            }
        };
        Ok(ValidatedArgs {
            verbose: args.verbose,
            config,
            command,
        })
    }
}

/// Parse the command line only. Validation reads config files and prompts, so it comes after
/// logging is set up.
pub fn parse() -> Args {
    Args::parse()
}
