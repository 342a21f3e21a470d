//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const ENV_PREFIX: &str = "FOLIO";
pub(crate) const DEFAULT_DIAGRAM_CLI_PATH: &str = "mmdc";
pub(crate) const DEFAULT_DIAGRAM_TIMEOUT_SECONDS: u64 = 30;
pub(crate) const DEFAULT_DIAGRAM_CACHE_CAPACITY: usize = 0;

/// Command-line arguments for the folio binary.
#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Render annotated markdown into typed presentation trees"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render a markdown document, resolving diagrams before printing.
    Render(RenderArgs),
    /// Print the parsed block list without dispatching it.
    Blocks(BlocksArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Serialized render tree.
    #[default]
    Json,
    /// HTML fragment with every node written out.
    Html,
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Markdown file to render, or `-` for standard input.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Wrap HTML output in a standalone page with the syntax stylesheet.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub standalone: bool,

    #[command(flatten)]
    pub overrides: RenderOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct BlocksArgs {
    /// Markdown file to parse, or `-` for standard input.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Render structural comments as visible spans before parsing.
    #[arg(long = "show-comments", action = clap::ArgAction::SetTrue)]
    pub show_comments: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RenderOverrides {
    /// Render structural comments as visible spans.
    #[arg(long = "show-comments", action = clap::ArgAction::SetTrue)]
    pub show_comments: bool,

    /// Override the diagram CLI executable path.
    #[arg(long = "render-diagram-cli-path", value_name = "PATH")]
    pub diagram_cli_path: Option<PathBuf>,

    /// Override the diagram conversion timeout.
    #[arg(long = "render-diagram-timeout-seconds", value_name = "SECONDS")]
    pub diagram_timeout_seconds: Option<u64>,

    /// Override the diagram artifact cache capacity (0 = unbounded).
    #[arg(long = "render-diagram-cache-capacity", value_name = "COUNT")]
    pub diagram_cache_capacity: Option<usize>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub document: DocumentSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub diagram_cli_path: PathBuf,
    pub diagram_timeout_seconds: NonZeroU32,
    pub diagram_cache_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct DocumentSettings {
    pub show_structural_comments: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match &cli.command {
        Command::Render(args) => raw.apply_render_overrides(&args.overrides),
        Command::Blocks(args) => {
            if args.show_comments {
                raw.document.show_structural_comments = Some(true);
            }
        }
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    document: RawDocumentSettings,
}

impl RawSettings {
    fn apply_render_overrides(&mut self, overrides: &RenderOverrides) {
        if overrides.show_comments {
            self.document.show_structural_comments = Some(true);
        }
        if let Some(path) = overrides.diagram_cli_path.as_ref() {
            self.render.diagram_cli_path = Some(path.clone());
        }
        if let Some(seconds) = overrides.diagram_timeout_seconds {
            self.render.diagram_timeout_seconds = Some(seconds);
        }
        if let Some(capacity) = overrides.diagram_cache_capacity {
            self.render.diagram_cache_capacity = Some(capacity);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            render,
            document,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            render: build_render_settings(render)?,
            document: DocumentSettings {
                show_structural_comments: document.show_structural_comments.unwrap_or(false),
            },
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let diagram_cli_path = render
        .diagram_cli_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DIAGRAM_CLI_PATH));
    if diagram_cli_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "render.diagram_cli_path",
            "path must not be empty",
        ));
    }

    let timeout = render
        .diagram_timeout_seconds
        .unwrap_or(DEFAULT_DIAGRAM_TIMEOUT_SECONDS);

    Ok(RenderSettings {
        diagram_cli_path,
        diagram_timeout_seconds: non_zero_u32(timeout, "render.diagram_timeout_seconds")?,
        diagram_cache_capacity: render
            .diagram_cache_capacity
            .unwrap_or(DEFAULT_DIAGRAM_CACHE_CAPACITY),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    diagram_cli_path: Option<PathBuf>,
    diagram_timeout_seconds: Option<u64>,
    diagram_cache_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDocumentSettings {
    show_structural_comments: Option<bool>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
