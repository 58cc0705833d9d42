//! Diagnostics for the CLI: one `tracing` subscriber driven by the global
//! flags.
//!
//! `csvstream_core` logs header detection and declared widths at `debug` and
//! buffer refills at `trace`. Skipped lines and unhandled parse-error
//! notifications are `warn`. Commands log their summaries at `info`.

use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::ColorChoice;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::{Cli, LogFormatArg};

/// Resolved logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Level for the csvstream crates; everything else stays at `warn`.
    pub level_filter: LevelFilter,
    /// Let `RUST_LOG` replace the directives. Off once a level flag is given.
    pub use_env_filter: bool,
    pub with_ansi: bool,
    pub format: LogFormatArg,
    pub log_file: Option<PathBuf>,
}

impl LogConfig {
    /// `--log-level` wins over `-v`/`-q`.
    pub fn from_cli(cli: &Cli) -> Self {
        let level_filter = cli
            .log_level
            .map_or_else(|| cli.verbosity.tracing_level_filter(), LevelFilter::from);
        let with_ansi = match cli.color.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
        };
        Self {
            level_filter,
            use_env_filter: cli.log_level.is_none() && !cli.verbosity.is_present(),
            with_ansi,
            format: cli.log_format,
            log_file: cli.log_file.clone(),
        }
    }

    fn directives(&self) -> String {
        let level = self.level_filter.to_string().to_lowercase();
        format!("warn,csvstream_core={level},csvstream_cli={level}")
    }

    fn env_filter(&self) -> EnvFilter {
        if self.use_env_filter
            && let Ok(filter) = EnvFilter::try_from_default_env()
        {
            return filter;
        }
        EnvFilter::new(self.directives())
    }
}

/// Install the global subscriber, writing to the log file when one is set
/// and to stderr otherwise.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let writer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
        None => BoxMakeWriter::new(io::stderr),
    };
    tracing_subscriber::registry()
        .with(fmt_layer(config, writer).with_filter(config.env_filter()))
        .try_init()
        .context("install tracing subscriber")
}

fn fmt_layer(
    config: &LogConfig,
    writer: BoxMakeWriter,
) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(config.with_ansi)
        .with_target(false)
        .without_time();
    match config.format {
        LogFormatArg::Pretty => layer.boxed(),
        LogFormatArg::Compact => layer.compact().boxed(),
        LogFormatArg::Json => layer.json().boxed(),
    }
}
