//! Column descriptors and the ordered, uniquely-named column collection.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::convert::{DateStyle, NumberStyle};
use crate::error::{BoxError, CsvError, Result};
use crate::value::{DataType, Value};

/// Custom conversion from a raw field (or null) to a typed value.
pub type Converter =
    Arc<dyn Fn(Option<&str>) -> std::result::Result<Value, BoxError> + Send + Sync>;

/// Output column descriptor.
#[derive(Clone, Default)]
pub struct Column {
    /// Column name (unique within a collection).
    pub name: String,
    /// Target type for built-in conversion.
    pub data_type: DataType,
    /// Raw value used for virtual columns and missing fields.
    pub default_value: Option<String>,
    /// Numeric parsing rules (type default when `None`).
    pub number_style: Option<NumberStyle>,
    /// Date parsing rules (ISO and common forms when `None`).
    pub date_style: Option<DateStyle>,
    /// Not backed by an incoming field.
    pub is_virtual: bool,
    converter: Option<Converter>,
}

impl Column {
    /// Create a string column.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a column with a declared type.
    pub fn typed(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            ..Self::default()
        }
    }

    /// Create a virtual column that always yields `default_value`.
    pub fn virtual_column(name: impl Into<String>, default_value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_value: Some(default_value.into()),
            is_virtual: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    #[must_use]
    pub fn with_number_style(mut self, style: NumberStyle) -> Self {
        self.number_style = Some(style);
        self
    }

    #[must_use]
    pub fn with_date_style(mut self, style: DateStyle) -> Self {
        self.date_style = Some(style);
        self
    }

    /// Install a custom converter; it replaces built-in conversion entirely.
    #[must_use]
    pub fn with_converter<F>(mut self, converter: F) -> Self
    where
        F: Fn(Option<&str>) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.converter = Some(Arc::new(converter));
        self
    }

    #[must_use]
    pub fn as_virtual(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    pub fn converter(&self) -> Option<&Converter> {
        self.converter.as_ref()
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("default_value", &self.default_value)
            .field("number_style", &self.number_style)
            .field("date_style", &self.date_style)
            .field("is_virtual", &self.is_virtual)
            .field("converter", &self.converter.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Case folding used for case-insensitive name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    /// Unicode lowercase, fullwidth ASCII folded to ASCII (default).
    #[default]
    Invariant,
    /// ASCII letters only.
    Ascii,
    /// Turkish dotted and dotless I.
    Turkish,
}

impl Locale {
    /// Fold `name` to its comparison key.
    pub fn fold(self, name: &str) -> String {
        match self {
            Self::Ascii => name.to_ascii_lowercase(),
            Self::Invariant => name
                .chars()
                .map(|ch| match ch {
                    '\u{ff01}'..='\u{ff5e}' => {
                        char::from_u32(u32::from(ch) - 0xfee0).unwrap_or(ch)
                    }
                    _ => ch,
                })
                .flat_map(char::to_lowercase)
                .collect(),
            Self::Turkish => name
                .chars()
                .flat_map(|ch| match ch {
                    'I' => 'ı'.to_lowercase(),
                    'İ' => 'i'.to_lowercase(),
                    _ => ch.to_lowercase(),
                })
                .collect(),
        }
    }
}

/// Ordered collection of uniquely-named columns.
///
/// Lookup is exact first, then a case-insensitive scan under the current
/// [`Locale`]. The scan fails on a second match so an ambiguous name is
/// distinguishable from an unknown one.
#[derive(Debug, Clone, Default)]
pub struct ColumnCollection {
    columns: Vec<Column>,
    exact: HashMap<String, usize>,
    folded: Vec<String>,
    locale: Locale,
}

impl ColumnCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale(locale: Locale) -> Self {
        Self {
            locale,
            ..Self::default()
        }
    }

    /// Build a collection from columns in order.
    pub fn from_columns<I>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = Column>,
    {
        let mut collection = Self::new();
        for column in columns {
            collection.push(column)?;
        }
        Ok(collection)
    }

    /// Append a column, naming it `ColumnN` when its name is empty.
    pub fn push(&mut self, mut column: Column) -> Result<usize> {
        if column.name.is_empty() {
            column.name = self.next_default_name();
        }
        if self.exact.contains_key(&column.name) {
            return Err(CsvError::duplicate_column(column.name));
        }
        let index = self.columns.len();
        self.exact.insert(column.name.clone(), index);
        self.folded.push(self.locale.fold(&column.name));
        self.columns.push(column);
        Ok(index)
    }

    /// Append a typed column and return it for further configuration.
    pub fn add(&mut self, name: impl Into<String>, data_type: DataType) -> Result<&mut Column> {
        let index = self.push(Column::typed(name, data_type))?;
        Ok(&mut self.columns[index])
    }

    fn next_default_name(&self) -> String {
        let mut n = 1usize;
        loop {
            let name = format!("Column{n}");
            if !self.exact.contains_key(&name) {
                return name;
            }
            n += 1;
        }
    }

    /// Position of `name`: exact match, else a unique case-insensitive one.
    pub fn index_of(&self, name: &str) -> Result<Option<usize>> {
        if let Some(&index) = self.exact.get(name) {
            return Ok(Some(index));
        }
        let key = self.locale.fold(name);
        let mut found = None;
        for (index, folded) in self.folded.iter().enumerate() {
            if *folded == key {
                if found.is_some() {
                    return Err(CsvError::ambiguous_column(name));
                }
                found = Some(index);
            }
        }
        Ok(found)
    }

    pub fn contains(&self, name: &str) -> bool {
        matches!(self.index_of(name), Ok(Some(_)))
    }

    pub fn get(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Column> {
        self.columns.get_mut(index)
    }

    pub fn get_by_name(&self, name: &str) -> Result<Option<&Column>> {
        Ok(self.index_of(name)?.map(|index| &self.columns[index]))
    }

    /// Remove the column matching `name`.
    pub fn remove(&mut self, name: &str) -> Result<Option<Column>> {
        let Some(index) = self.index_of(name)? else {
            return Ok(None);
        };
        let column = self.columns.remove(index);
        self.folded.remove(index);
        self.rebuild_exact();
        Ok(Some(column))
    }

    pub fn clear(&mut self) {
        self.columns.clear();
        self.exact.clear();
        self.folded.clear();
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Change the comparison locale and re-index every name.
    pub fn set_locale(&mut self, locale: Locale) {
        if self.locale == locale {
            return;
        }
        self.locale = locale;
        self.folded = self
            .columns
            .iter()
            .map(|column| locale.fold(&column.name))
            .collect();
    }

    fn rebuild_exact(&mut self) {
        self.exact = self
            .columns
            .iter()
            .enumerate()
            .map(|(index, column)| (column.name.clone(), index))
            .collect();
    }
}

impl<'a> IntoIterator for &'a ColumnCollection {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
