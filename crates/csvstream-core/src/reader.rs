//! Streaming CSV reader.
//!
//! [`CsvReader`] pulls one record at a time from the tokenizer, applies the
//! row filter, and resolves missing fields lazily on access. Typed access goes
//! through the output schema: declared [`Column`]s (or the header names) plus
//! virtual columns.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::column::{Column, ColumnCollection};
use crate::convert::{ConvertContext, convert_as};
use crate::error::{CsvError, ParseError, Result};
use crate::options::{MissingFieldAction, ParseErrorAction, ReaderOptions};
use crate::policy::{ErrorPolicy, ParseErrorEvent};
use crate::record::Record;
use crate::source::BufferedSource;
use crate::tokenizer::{Dialect, ReadContext, Tokenizer};
use crate::value::{DataType, Value};

/// Lifecycle of a [`CsvReader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Header (or first record) not read yet.
    NotInitialized,
    Reading,
    /// End of stream reached.
    Exhausted,
    Closed,
    /// Terminal; overrides every other state.
    Disposed,
}

/// Read-only view of the current row, handed to the exclude filter.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    record: &'a Record,
    names: &'a ColumnCollection,
}

impl<'a> RowView<'a> {
    /// Raw field at `index`, if the row has it.
    pub fn get(&self, index: usize) -> Option<&'a str> {
        self.record.get(index)
    }

    /// Raw field under the header `name`. Unknown or ambiguous names yield `None`.
    pub fn get_by_name(&self, name: &str) -> Option<&'a str> {
        let index = self.names.index_of(name).ok().flatten()?;
        self.record.get(index)
    }

    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    pub fn record_index(&self) -> i64 {
        self.record.index()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> {
        self.record.iter()
    }
}

/// Predicate over the raw row; returning `true` skips the row.
pub type ExcludeFilter = Box<dyn FnMut(&RowView<'_>) -> bool>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldSource {
    Field(usize),
    Virtual,
}

/// Output columns resolved against the physical fields.
#[derive(Debug)]
struct Schema {
    columns: ColumnCollection,
    sources: Vec<FieldSource>,
}

/// Forward-only CSV reader.
pub struct CsvReader<R> {
    tokenizer: Tokenizer<R>,
    options: ReaderOptions,
    policy: ErrorPolicy,
    missing_field_action: MissingFieldAction,
    record: Record,
    field_names: Vec<String>,
    field_columns: ColumnCollection,
    declared_width: usize,
    columns: Option<ColumnCollection>,
    virtual_columns: Vec<Column>,
    schema: Option<Schema>,
    exclude_filter: Option<ExcludeFilter>,
    state: ReaderState,
    pending_first: bool,
    has_current: bool,
    next_index: i64,
}

impl<R: Read> CsvReader<R> {
    /// Create a reader with default options.
    pub fn new(reader: R) -> Self {
        Self::build(reader, ReaderOptions::default(), encoding_rs::UTF_8)
    }

    /// Create a reader after validating `options`.
    pub fn with_options(reader: R, options: ReaderOptions) -> Result<Self> {
        options.validate()?;
        let encoding = options.resolve_encoding()?;
        Ok(Self::build(reader, options, encoding))
    }

    fn build(reader: R, options: ReaderOptions, encoding: &'static encoding_rs::Encoding) -> Self {
        let source = BufferedSource::new(reader, options.buffer_size, encoding);
        let tokenizer = Tokenizer::new(source, Dialect::from_options(&options));
        Self {
            tokenizer,
            policy: ErrorPolicy::new(options.parse_error_action),
            missing_field_action: options.missing_field_action,
            options,
            record: Record::new(),
            field_names: Vec::new(),
            field_columns: ColumnCollection::new(),
            declared_width: 0,
            columns: None,
            virtual_columns: Vec::new(),
            schema: None,
            exclude_filter: None,
            state: ReaderState::NotInitialized,
            pending_first: false,
            has_current: false,
            next_index: 0,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Move to the next surfaced record. Returns `false` at end of stream.
    pub fn advance(&mut self) -> Result<bool> {
        self.guard()?;
        self.has_current = false;
        self.ensure_initialized()?;
        if self.state == ReaderState::Exhausted {
            return Ok(false);
        }

        loop {
            let found = if self.pending_first {
                self.pending_first = false;
                true
            } else {
                let ctx = ReadContext {
                    record_index: self.next_index,
                    declared_width: Some(self.declared_width),
                };
                self.tokenizer
                    .read_record(&mut self.record, &ctx, &mut self.policy)?
            };
            if !found {
                tracing::debug!(records = self.next_index, "end of stream");
                self.state = ReaderState::Exhausted;
                return Ok(false);
            }

            self.record.set_index(self.next_index);
            self.next_index += 1;

            if let Some(filter) = self.exclude_filter.as_mut() {
                let row = RowView {
                    record: &self.record,
                    names: &self.field_columns,
                };
                if filter(&row) {
                    tracing::trace!(record = self.record.index(), "row excluded");
                    continue;
                }
            }
            self.has_current = true;
            return Ok(true);
        }
    }

    fn ensure_initialized(&mut self) -> Result<()> {
        if self.state != ReaderState::NotInitialized {
            return Ok(());
        }
        let has_headers = self.options.has_headers;
        let ctx = ReadContext {
            record_index: if has_headers { -1 } else { 0 },
            declared_width: None,
        };
        let found = self
            .tokenizer
            .read_record(&mut self.record, &ctx, &mut self.policy)?;
        let width = if found { self.record.len() } else { 0 };

        let names: Vec<String> = if has_headers {
            self.record
                .iter()
                .enumerate()
                .map(|(index, name)| {
                    if name.is_empty() {
                        format!("Column{index}")
                    } else {
                        name.to_string()
                    }
                })
                .collect()
        } else {
            (0..width).map(|index| format!("Column{index}")).collect()
        };
        let field_columns = ColumnCollection::from_columns(names.iter().map(Column::new))?;

        if has_headers {
            tracing::debug!(fields = width, headers = ?names, "read header row");
            self.record.set_index(-1);
        } else {
            tracing::debug!(fields = width, "declared width from first record");
            self.pending_first = found;
        }

        self.field_names = names;
        self.field_columns = field_columns;
        self.declared_width = width;
        self.record.set_declared_width(width);
        self.schema = None;
        self.state = if found {
            ReaderState::Reading
        } else {
            ReaderState::Exhausted
        };
        Ok(())
    }

    pub(crate) fn guard(&self) -> Result<()> {
        match self.state {
            ReaderState::Disposed => Err(CsvError::Disposed),
            ReaderState::Closed => Err(CsvError::ReaderClosed),
            _ => Ok(()),
        }
    }

    fn ensure_current(&self) -> Result<()> {
        self.guard()?;
        if self.has_current {
            Ok(())
        } else {
            Err(CsvError::NoCurrentRecord)
        }
    }

    /// Release the underlying stream; later access fails with `ReaderClosed`.
    pub fn close(&mut self) {
        if self.state == ReaderState::Disposed {
            return;
        }
        self.tokenizer.close();
        self.has_current = false;
        self.state = ReaderState::Closed;
    }

    /// Release everything; later access fails with `Disposed`.
    pub fn dispose(&mut self) {
        self.tokenizer.close();
        self.has_current = false;
        self.exclude_filter = None;
        self.state = ReaderState::Disposed;
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ReaderState::Closed | ReaderState::Disposed)
    }

    /// Index of the current record (-1 before the first one).
    pub fn current_record_index(&self) -> i64 {
        self.record.index()
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    // ========================================================================
    // Raw field access
    // ========================================================================

    /// Number of fields fixed by the header row or the first record.
    pub fn field_count(&mut self) -> Result<usize> {
        self.guard()?;
        self.ensure_initialized()?;
        Ok(self.declared_width)
    }

    /// Header names, or `Column0`, `Column1`, ... without a header row.
    pub fn headers(&mut self) -> Result<&[String]> {
        self.guard()?;
        self.ensure_initialized()?;
        Ok(&self.field_names)
    }

    pub fn has_headers(&self) -> bool {
        self.options.has_headers
    }

    /// Physical index of the field named `name`.
    pub fn field_index(&mut self, name: &str) -> Result<usize> {
        self.guard()?;
        self.ensure_initialized()?;
        self.field_columns
            .index_of(name)?
            .ok_or_else(|| CsvError::column_not_found(name))
    }

    /// The current record's raw fields.
    pub fn record(&self) -> Result<&Record> {
        self.ensure_current()?;
        Ok(&self.record)
    }

    /// Raw field at `index`; `None` is a null substituted for a missing field.
    pub fn field(&mut self, index: usize) -> Result<Option<&str>> {
        self.ensure_current()?;
        if index >= self.declared_width {
            return Err(CsvError::FieldIndexOutOfRange {
                index,
                count: self.declared_width,
            });
        }
        if index < self.record.len() {
            return Ok(self.record.get(index));
        }
        self.missing_field()
    }

    /// Raw field under the header `name`.
    pub fn field_by_name(&mut self, name: &str) -> Result<Option<&str>> {
        let index = self.field_index(name)?;
        self.field(index)
    }

    /// Copy every field of the current record, substituting missing ones.
    pub fn copy_record_to(&mut self, target: &mut Vec<Option<String>>) -> Result<()> {
        self.ensure_current()?;
        target.clear();
        target.extend(self.record.iter().map(|field| Some(field.to_string())));
        for _ in self.record.len()..self.declared_width {
            let value = self.missing_field()?;
            target.push(value.map(str::to_string));
        }
        Ok(())
    }

    /// Every field of the current record as owned values.
    pub fn record_values(&mut self) -> Result<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(self.declared_width);
        self.copy_record_to(&mut values)?;
        Ok(values)
    }

    /// Resolve a field beyond the actual width of the current record.
    fn missing_field(&mut self) -> Result<Option<&'static str>> {
        match self.missing_field_action {
            MissingFieldAction::ReplaceByEmpty => Ok(Some("")),
            MissingFieldAction::ReplaceByNull => Ok(None),
            MissingFieldAction::ParseError => {
                let error = ParseError::missing_field(
                    self.record.index(),
                    self.record.len(),
                    self.record.end_position(),
                    self.tokenizer.snapshot(),
                );
                self.policy.resolve(error)?;
                Ok(None)
            }
        }
    }

    // ========================================================================
    // Output schema and typed access
    // ========================================================================

    /// Declare the output columns; replaces any previous declaration.
    pub fn set_columns(&mut self, columns: ColumnCollection) {
        self.columns = Some(columns);
        self.schema = None;
    }

    /// Append a column that is not backed by an incoming field.
    pub fn add_virtual_column(&mut self, column: Column) {
        self.virtual_columns.push(column.as_virtual());
        self.schema = None;
    }

    /// Output columns: declared columns (or header names) plus virtual ones.
    pub fn columns(&mut self) -> Result<&ColumnCollection> {
        Ok(&self.schema()?.columns)
    }

    /// Ordinal of the output column `name`.
    pub fn ordinal(&mut self, name: &str) -> Result<usize> {
        self.schema()?
            .columns
            .index_of(name)?
            .ok_or_else(|| CsvError::column_not_found(name))
    }

    /// Converted value of the output column at `ordinal`.
    pub fn value(&mut self, ordinal: usize) -> Result<Value> {
        self.typed_value(ordinal, None)
    }

    /// Value of the output column at `ordinal` converted as `data_type`.
    pub fn value_as(&mut self, ordinal: usize, data_type: DataType) -> Result<Value> {
        self.typed_value(ordinal, Some(data_type))
    }

    pub fn value_by_name(&mut self, name: &str) -> Result<Value> {
        let ordinal = self.ordinal(name)?;
        self.value(ordinal)
    }

    /// Converted values of every output column.
    pub fn values(&mut self) -> Result<Vec<Value>> {
        self.ensure_current()?;
        let count = self.schema()?.columns.len();
        (0..count).map(|ordinal| self.value(ordinal)).collect()
    }

    fn typed_value(&mut self, ordinal: usize, data_type: Option<DataType>) -> Result<Value> {
        self.ensure_current()?;
        let (source, has_default, count) = {
            let schema = self.schema()?;
            let count = schema.sources.len();
            match schema.sources.get(ordinal) {
                Some(&source) => {
                    let has_default = schema
                        .columns
                        .get(ordinal)
                        .is_some_and(|column| column.default_value.is_some());
                    (source, has_default, count)
                }
                None => {
                    return Err(CsvError::FieldIndexOutOfRange {
                        index: ordinal,
                        count,
                    });
                }
            }
        };

        let substitute = match source {
            FieldSource::Field(index) if index >= self.record.len() && !has_default => {
                Some(self.missing_field()?)
            }
            _ => None,
        };

        let Some(schema) = self.schema.as_ref() else {
            return Err(CsvError::NoCurrentRecord);
        };
        let Some(column) = schema.columns.get(ordinal) else {
            return Err(CsvError::FieldIndexOutOfRange {
                index: ordinal,
                count,
            });
        };
        let raw = match (source, substitute) {
            (FieldSource::Virtual, _) => column.default_value.as_deref(),
            (FieldSource::Field(_), Some(value)) => value,
            (FieldSource::Field(index), None) => self
                .record
                .get(index)
                .or(column.default_value.as_deref()),
        };
        let ctx = ConvertContext {
            null_value: self.options.null_value.as_deref(),
            boolean_tokens: self.options.boolean_tokens.as_ref(),
        };
        convert_as(column, data_type.unwrap_or(column.data_type), raw, &ctx)
    }

    fn schema(&mut self) -> Result<&Schema> {
        self.guard()?;
        self.ensure_initialized()?;
        let schema = match self.schema.take() {
            Some(schema) => schema,
            None => self.build_schema()?,
        };
        Ok(self.schema.insert(schema))
    }

    fn build_schema(&self) -> Result<Schema> {
        let mut columns = match &self.columns {
            Some(declared) => ColumnCollection::with_locale(declared.locale()),
            None => ColumnCollection::new(),
        };
        let mut sources = Vec::new();

        match &self.columns {
            Some(declared) => {
                let mut position = 0;
                for column in declared {
                    let source = if column.is_virtual {
                        FieldSource::Virtual
                    } else if self.options.has_headers {
                        let index = self
                            .field_columns
                            .index_of(&column.name)?
                            .ok_or_else(|| CsvError::column_not_found(&column.name))?;
                        FieldSource::Field(index)
                    } else {
                        if position >= self.declared_width {
                            return Err(CsvError::invalid_configuration(format!(
                                "column '{}' maps to field {position} but records have {} fields",
                                column.name, self.declared_width
                            )));
                        }
                        position += 1;
                        FieldSource::Field(position - 1)
                    };
                    columns.push(column.clone())?;
                    sources.push(source);
                }
            }
            None => {
                for (index, name) in self.field_names.iter().enumerate() {
                    columns.push(Column::new(name))?;
                    sources.push(FieldSource::Field(index));
                }
            }
        }

        for column in &self.virtual_columns {
            columns.push(column.clone())?;
            sources.push(FieldSource::Virtual);
        }
        Ok(Schema { columns, sources })
    }

    // ========================================================================
    // Filters and policies
    // ========================================================================

    /// Skip every row for which `filter` returns `true`.
    pub fn set_exclude_filter<F>(&mut self, filter: F)
    where
        F: FnMut(&RowView<'_>) -> bool + 'static,
    {
        self.exclude_filter = Some(Box::new(filter));
    }

    pub fn clear_exclude_filter(&mut self) {
        self.exclude_filter = None;
    }

    /// Subscribe to parse errors routed through [`ParseErrorAction::RaiseEvent`].
    pub fn on_parse_error<F>(&mut self, handler: F)
    where
        F: FnMut(&mut ParseErrorEvent) + 'static,
    {
        self.policy.subscribe(Box::new(handler));
    }

    pub fn missing_field_action(&self) -> MissingFieldAction {
        self.missing_field_action
    }

    pub fn set_missing_field_action(&mut self, action: MissingFieldAction) {
        self.missing_field_action = action;
    }

    pub fn parse_error_action(&self) -> ParseErrorAction {
        self.policy.action()
    }

    pub fn set_parse_error_action(&mut self, action: ParseErrorAction) {
        self.policy.set_action(action);
    }
}

impl CsvReader<File> {
    /// Open a file with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ReaderOptions::default())
    }

    /// Open a file with the given options.
    pub fn open_with_options(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                CsvError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CsvError::Io(error)
            }
        })?;
        Self::with_options(file, options)
    }
}

impl<R> std::fmt::Debug for CsvReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvReader")
            .field("state", &self.state)
            .field("record_index", &self.record.index())
            .field("declared_width", &self.declared_width)
            .field("headers", &self.field_names)
            .finish_non_exhaustive()
    }
}
