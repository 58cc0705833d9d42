//! Dialect and policy options for [`CsvReader`](crate::CsvReader).

use std::collections::BTreeMap;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::{CsvError, Result};

/// Default buffer capacity in chars.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;
/// Default field delimiter.
pub const DEFAULT_DELIMITER: char = ',';
/// Default quote char.
pub const DEFAULT_QUOTE: char = '"';
/// Default escape char (same as the quote, so `""` is a literal quote).
pub const DEFAULT_ESCAPE: char = '"';
/// Default comment char.
pub const DEFAULT_COMMENT: char = '#';

/// Which fields have surrounding whitespace trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueTrimming {
    /// Keep all whitespace.
    None,
    /// Trim inside quoted fields only.
    QuotedOnly,
    /// Trim unquoted fields only (default).
    #[default]
    UnquotedOnly,
    /// Trim every field.
    All,
}

impl ValueTrimming {
    #[must_use]
    pub const fn trims_quoted(self) -> bool {
        matches!(self, Self::QuotedOnly | Self::All)
    }

    #[must_use]
    pub const fn trims_unquoted(self) -> bool {
        matches!(self, Self::UnquotedOnly | Self::All)
    }
}

/// What to do when a short record is accessed beyond its actual width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldAction {
    /// Report a missing-field parse error (default).
    #[default]
    ParseError,
    /// Substitute an empty string.
    ReplaceByEmpty,
    /// Substitute null.
    ReplaceByNull,
}

/// What to do when a parse error is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorAction {
    /// Fail the current operation with the error (default).
    #[default]
    ThrowException,
    /// Notify subscribed handlers and keep parsing.
    RaiseEvent,
    /// Drop the rest of the physical line and resume on the next one.
    AdvanceToNextLine,
}

/// Options for reading CSV data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Field delimiter (default: `,`).
    pub delimiter: char,
    /// Quote char (default: `"`).
    pub quote: char,
    /// Escape char inside quoted fields (default: `"`).
    pub escape: char,
    /// Comment char recognized at the start of a line (default: `#`).
    pub comment: Option<char>,
    /// Whitespace trimming mode.
    pub trimming: ValueTrimming,
    /// Buffer capacity in chars (default: 4096).
    pub buffer_size: usize,
    /// Allow quoted fields to span lines (default: true).
    pub multiline: bool,
    /// Skip zero-length lines (default: true).
    pub skip_empty_lines: bool,
    /// First record holds column names (default: true).
    pub has_headers: bool,
    /// Raw value treated as null, compared ASCII case-insensitively.
    pub null_value: Option<String>,
    /// Custom token table for boolean conversion.
    pub boolean_tokens: Option<BTreeMap<String, bool>>,
    /// WHATWG encoding label (default: UTF-8 with BOM sniffing).
    pub encoding: Option<String>,
    /// Policy for short records.
    pub missing_field_action: MissingFieldAction,
    /// Policy for malformed records.
    pub parse_error_action: ParseErrorAction,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            quote: DEFAULT_QUOTE,
            escape: DEFAULT_ESCAPE,
            comment: Some(DEFAULT_COMMENT),
            trimming: ValueTrimming::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            multiline: true,
            skip_empty_lines: true,
            has_headers: true,
            null_value: None,
            boolean_tokens: None,
            encoding: None,
            missing_field_action: MissingFieldAction::default(),
            parse_error_action: ParseErrorAction::default(),
        }
    }
}

impl ReaderOptions {
    /// Create reader options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = quote;
        self
    }

    #[must_use]
    pub fn with_escape(mut self, escape: char) -> Self {
        self.escape = escape;
        self
    }

    /// Set or disable (`None`) the comment char.
    #[must_use]
    pub fn with_comment(mut self, comment: Option<char>) -> Self {
        self.comment = comment;
        self
    }

    #[must_use]
    pub fn with_trimming(mut self, trimming: ValueTrimming) -> Self {
        self.trimming = trimming;
        self
    }

    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    #[must_use]
    pub fn with_multiline(mut self, multiline: bool) -> Self {
        self.multiline = multiline;
        self
    }

    #[must_use]
    pub fn with_skip_empty_lines(mut self, skip: bool) -> Self {
        self.skip_empty_lines = skip;
        self
    }

    #[must_use]
    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    #[must_use]
    pub fn with_null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = Some(null_value.into());
        self
    }

    /// Replace built-in boolean tokens with a custom table.
    #[must_use]
    pub fn with_boolean_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = (S, bool)>,
        S: Into<String>,
    {
        self.boolean_tokens = Some(
            tokens
                .into_iter()
                .map(|(token, value)| (token.into(), value))
                .collect(),
        );
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = Some(label.into());
        self
    }

    #[must_use]
    pub fn with_missing_field_action(mut self, action: MissingFieldAction) -> Self {
        self.missing_field_action = action;
        self
    }

    #[must_use]
    pub fn with_parse_error_action(mut self, action: ParseErrorAction) -> Self {
        self.parse_error_action = action;
        self
    }

    /// Check the options for conflicting or unusable settings.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(CsvError::invalid_configuration(
                "buffer size must be greater than zero",
            ));
        }
        for (role, ch) in [
            ("delimiter", Some(self.delimiter)),
            ("quote", Some(self.quote)),
            ("escape", Some(self.escape)),
            ("comment", self.comment),
        ] {
            if matches!(ch, Some('\r' | '\n')) {
                return Err(CsvError::invalid_configuration(format!(
                    "{role} must not be a newline char"
                )));
            }
        }
        if self.delimiter == self.quote {
            return Err(CsvError::invalid_configuration(format!(
                "delimiter and quote are both '{}'",
                self.delimiter
            )));
        }
        if self.delimiter == self.escape {
            return Err(CsvError::invalid_configuration(format!(
                "delimiter and escape are both '{}'",
                self.delimiter
            )));
        }
        if let Some(comment) = self.comment
            && (comment == self.delimiter || comment == self.quote || comment == self.escape)
        {
            return Err(CsvError::invalid_configuration(format!(
                "comment char '{comment}' conflicts with delimiter, quote or escape"
            )));
        }
        self.resolve_encoding()?;
        Ok(())
    }

    /// Resolve the configured encoding label.
    pub fn resolve_encoding(&self) -> Result<&'static Encoding> {
        match &self.encoding {
            None => Ok(encoding_rs::UTF_8),
            Some(label) => Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
                CsvError::invalid_configuration(format!("unknown encoding label '{label}'"))
            }),
        }
    }
}
