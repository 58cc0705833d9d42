//! Streaming, forward-only CSV reader.
//!
//! Records are tokenized one at a time from a fixed-capacity char buffer, so
//! memory use does not grow with the input and reported error positions are
//! reproducible for a given buffer size. On top of the raw field stream sit
//! typed columns, virtual columns, custom converters, a row filter and serde
//! mapping.
//!
//! ```
//! use csvstream_core::{CsvReader, MissingFieldAction, ReaderOptions};
//!
//! let data = "name,city\nAda,London\nAlan\n";
//! let options = ReaderOptions::default()
//!     .with_missing_field_action(MissingFieldAction::ReplaceByNull);
//! let mut reader = CsvReader::with_options(data.as_bytes(), options)?;
//!
//! assert!(reader.advance()?);
//! assert_eq!(reader.field_by_name("city")?, Some("London"));
//! assert!(reader.advance()?);
//! assert_eq!(reader.field(1)?, None);
//! assert!(!reader.advance()?);
//! # Ok::<(), csvstream_core::CsvError>(())
//! ```

pub mod column;
pub mod convert;
pub mod cursor;
pub mod error;
pub mod mapping;
pub mod options;
pub mod policy;
pub mod reader;
pub mod record;
pub mod value;

mod source;
mod tokenizer;

// Errors
pub use error::{BoxError, CsvError, ParseError, ParseErrorKind, Result};

// Configuration
pub use options::{MissingFieldAction, ParseErrorAction, ReaderOptions, ValueTrimming};

// Reading
pub use policy::{ParseErrorEvent, ParseErrorHandler};
pub use reader::{CsvReader, ExcludeFilter, ReaderState, RowView};
pub use record::Record;

// Columns and conversion
pub use column::{Column, ColumnCollection, Converter, Locale};
pub use convert::{ConvertContext, DateStyle, NumberStyle};
pub use value::{DataType, Value};

// Facades
pub use cursor::{CsvCursor, SchemaColumn};
pub use mapping::MapRecords;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
