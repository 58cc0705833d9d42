use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use tracing::level_filters::LevelFilter;

use csvstream_core::options::{
    DEFAULT_BUFFER_SIZE, DEFAULT_COMMENT, DEFAULT_DELIMITER, DEFAULT_QUOTE,
};
use csvstream_core::{MissingFieldAction, ParseErrorAction, ReaderOptions, ValueTrimming};

#[derive(Parser)]
#[command(
    name = "csvstream",
    version,
    about = "Inspect CSV files with a streaming, forward-only reader",
    long_about = "Reads delimited text one record at a time from a fixed-size buffer. \
                  Parse errors are reported with record, field and buffer position, \
                  and can be thrown, reported and skipped, or skipped per line."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(flatten)]
    pub color: Color,

    /// Override the log level (takes precedence over -v/-q).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print records as a table or as JSON lines.
    Show(ShowArgs),

    /// Count records and parse errors.
    Stats(FileArgs),

    /// Print column metadata.
    Schema(FileArgs),
}

#[derive(Args, Debug, Clone)]
pub struct FileArgs {
    /// CSV file to read.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    #[command(flatten)]
    pub dialect: DialectArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    #[command(flatten)]
    pub input: FileArgs,

    /// Stop after N records.
    #[arg(long = "limit", value_name = "N")]
    pub limit: Option<usize>,

    /// Emit one JSON object per record instead of a table.
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DialectArgs {
    /// Field delimiter.
    #[arg(long = "delimiter", value_name = "CHAR", default_value_t = DEFAULT_DELIMITER)]
    pub delimiter: char,

    /// Quote character.
    #[arg(long = "quote", value_name = "CHAR", default_value_t = DEFAULT_QUOTE)]
    pub quote: char,

    /// Escape character inside quoted fields (defaults to the quote).
    #[arg(long = "escape", value_name = "CHAR")]
    pub escape: Option<char>,

    /// Comment character at the start of a line.
    #[arg(long = "comment", value_name = "CHAR", default_value_t = DEFAULT_COMMENT)]
    pub comment: char,

    /// Treat comment lines as data.
    #[arg(long = "no-comment", conflicts_with = "comment")]
    pub no_comment: bool,

    /// The first record is data, not column names.
    #[arg(long = "no-headers")]
    pub no_headers: bool,

    /// Whitespace trimming mode.
    #[arg(long = "trim", value_enum, default_value = "unquoted")]
    pub trim: TrimArg,

    /// Buffer capacity in chars.
    #[arg(long = "buffer-size", value_name = "CHARS", default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,

    /// End a record at a newline even inside quotes.
    #[arg(long = "no-multiline")]
    pub no_multiline: bool,

    /// Report empty lines as records instead of skipping them.
    #[arg(long = "keep-empty-lines")]
    pub keep_empty_lines: bool,

    /// Raw value to treat as null (case-insensitive).
    #[arg(long = "null-value", value_name = "TEXT")]
    pub null_value: Option<String>,

    /// Input encoding label (e.g. windows-1252, utf-16le).
    #[arg(long = "encoding", value_name = "LABEL")]
    pub encoding: Option<String>,

    /// What to do on a malformed record.
    #[arg(long = "on-error", value_enum)]
    pub on_error: Option<OnErrorArg>,

    /// What to do when a record has fewer fields than the header.
    #[arg(long = "missing", value_enum, default_value = "error")]
    pub missing: MissingArg,
}

impl DialectArgs {
    /// Build reader options, using `default_action` when `--on-error` is absent.
    #[must_use]
    pub fn reader_options(&self, default_action: ParseErrorAction) -> ReaderOptions {
        let mut options = ReaderOptions::default()
            .with_delimiter(self.delimiter)
            .with_quote(self.quote)
            .with_escape(self.escape.unwrap_or(self.quote))
            .with_comment((!self.no_comment).then_some(self.comment))
            .with_headers(!self.no_headers)
            .with_trimming(self.trim.into())
            .with_buffer_size(self.buffer_size)
            .with_multiline(!self.no_multiline)
            .with_skip_empty_lines(!self.keep_empty_lines)
            .with_missing_field_action(self.missing.into())
            .with_parse_error_action(self.on_error.map_or(default_action, Into::into));
        if let Some(null_value) = &self.null_value {
            options = options.with_null_value(null_value.clone());
        }
        if let Some(encoding) = &self.encoding {
            options = options.with_encoding(encoding.clone());
        }
        options
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum TrimArg {
    None,
    Quoted,
    Unquoted,
    All,
}

impl From<TrimArg> for ValueTrimming {
    fn from(value: TrimArg) -> Self {
        match value {
            TrimArg::None => Self::None,
            TrimArg::Quoted => Self::QuotedOnly,
            TrimArg::Unquoted => Self::UnquotedOnly,
            TrimArg::All => Self::All,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OnErrorArg {
    /// Stop at the first parse error.
    Throw,
    /// Report parse errors and keep reading.
    Notify,
    /// Drop the offending line and keep reading.
    Skip,
}

impl From<OnErrorArg> for ParseErrorAction {
    fn from(value: OnErrorArg) -> Self {
        match value {
            OnErrorArg::Throw => Self::ThrowException,
            OnErrorArg::Notify => Self::RaiseEvent,
            OnErrorArg::Skip => Self::AdvanceToNextLine,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MissingArg {
    Error,
    Empty,
    Null,
}

impl From<MissingArg> for MissingFieldAction {
    fn from(value: MissingArg) -> Self {
        match value {
            MissingArg::Error => Self::ParseError,
            MissingArg::Empty => Self::ReplaceByEmpty,
            MissingArg::Null => Self::ReplaceByNull,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LevelFilter {
    fn from(value: LogLevelArg) -> Self {
        match value {
            LogLevelArg::Error => Self::ERROR,
            LogLevelArg::Warn => Self::WARN,
            LogLevelArg::Info => Self::INFO,
            LogLevelArg::Debug => Self::DEBUG,
            LogLevelArg::Trace => Self::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
