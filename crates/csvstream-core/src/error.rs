//! Error types for CSV reading.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::value::DataType;

/// Boxed error returned by custom column converters.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Family of a policy-gated parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The record has fewer fields than the declared width.
    MissingField,
    /// Quoting, escaping or line-shape violation.
    Malformed,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField => write!(f, "missing field"),
            Self::Malformed => write!(f, "malformed CSV"),
        }
    }
}

/// Location and context of a parse error.
///
/// `position` is the char offset inside the buffer fill that was current when
/// the error was detected. It is 0 at end of stream and is reproducible for a
/// given buffer capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub record_index: i64,
    pub field_index: usize,
    pub position: usize,
    /// Content of the current buffer fill (empty at end of stream).
    pub raw_snippet: String,
}

impl ParseError {
    /// Create a missing-field error.
    pub fn missing_field(
        record_index: i64,
        field_index: usize,
        position: usize,
        raw_snippet: impl Into<String>,
    ) -> Self {
        Self {
            kind: ParseErrorKind::MissingField,
            record_index,
            field_index,
            position,
            raw_snippet: raw_snippet.into(),
        }
    }

    /// Create a malformed-structure error.
    pub fn malformed(
        record_index: i64,
        field_index: usize,
        position: usize,
        raw_snippet: impl Into<String>,
    ) -> Self {
        Self {
            kind: ParseErrorKind::Malformed,
            record_index,
            field_index,
            position,
            raw_snippet: raw_snippet.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at record {}, field {}, position {}",
            self.kind, self.record_index, self.field_index, self.position
        )
    }
}

impl From<ParseError> for CsvError {
    fn from(error: ParseError) -> Self {
        match error.kind {
            ParseErrorKind::MissingField => Self::MissingField(error),
            ParseErrorKind::Malformed => Self::Malformed(error),
        }
    }
}

/// Errors that can occur while reading CSV data.
#[derive(Debug, Error)]
pub enum CsvError {
    /// A short record was accessed beyond its actual width.
    #[error("{0}")]
    MissingField(ParseError),

    /// Quoting, escaping or record-shape violation.
    #[error("{0}")]
    Malformed(ParseError),

    /// More than one column matches a name case-insensitively.
    #[error("ambiguous column name '{name}': more than one column matches case-insensitively")]
    AmbiguousColumnName { name: String },

    /// A column with the same name already exists.
    #[error("duplicate column name: {name}")]
    DuplicateColumnName { name: String },

    /// No column or header with the given name.
    #[error("column not found: {name}")]
    ColumnNotFound { name: String },

    /// Invalid dialect or reader configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// The reader was closed.
    #[error("reader is closed")]
    ReaderClosed,

    /// The reader was disposed.
    #[error("reader has been disposed")]
    Disposed,

    /// Field access without a current record.
    #[error("no current record: call advance() first")]
    NoCurrentRecord,

    /// Field index beyond the declared width.
    #[error("field index {index} out of range (field count {count})")]
    FieldIndexOutOfRange { index: usize, count: usize },

    /// Built-in conversion failed.
    #[error("cannot convert '{value}' in column '{column}' to {data_type}")]
    Conversion {
        column: String,
        value: String,
        data_type: DataType,
    },

    /// Error raised by a custom converter.
    #[error(transparent)]
    Converter(BoxError),

    /// A converted record could not be mapped onto the target type.
    #[error("cannot map record {record_index}: {source}")]
    Mapping {
        record_index: i64,
        source: serde_json::Error,
    },

    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for CSV operations.
pub type Result<T> = std::result::Result<T, CsvError>;

impl CsvError {
    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an AmbiguousColumnName error.
    pub fn ambiguous_column(name: impl Into<String>) -> Self {
        Self::AmbiguousColumnName { name: name.into() }
    }

    /// Create a DuplicateColumnName error.
    pub fn duplicate_column(name: impl Into<String>) -> Self {
        Self::DuplicateColumnName { name: name.into() }
    }

    /// Create a ColumnNotFound error.
    pub fn column_not_found(name: impl Into<String>) -> Self {
        Self::ColumnNotFound { name: name.into() }
    }

    /// Create a Conversion error.
    pub fn conversion(
        column: impl Into<String>,
        value: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        Self::Conversion {
            column: column.into(),
            value: value.into(),
            data_type,
        }
    }

    /// The parse error carried by a policy-gated error.
    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            Self::MissingField(error) | Self::Malformed(error) => Some(error),
            _ => None,
        }
    }
}
