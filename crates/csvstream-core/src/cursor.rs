//! Forward-only tabular cursor over a [`CsvReader`].

use std::io::Read;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::{CsvError, Result};
use crate::reader::CsvReader;
use crate::value::{DataType, Value};

/// Metadata for one output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaColumn {
    pub name: String,
    pub ordinal: usize,
    pub data_type: DataType,
    pub allow_null: bool,
    pub column_size: i32,
    pub is_unique: bool,
    pub is_key: bool,
    pub is_read_only: bool,
    pub is_long: bool,
}

/// Cursor facade with ordinal-based typed getters.
#[derive(Debug)]
pub struct CsvCursor<R> {
    reader: CsvReader<R>,
}

impl<R: Read> CsvCursor<R> {
    pub fn new(reader: CsvReader<R>) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> CsvReader<R> {
        self.reader
    }

    pub fn reader_mut(&mut self) -> &mut CsvReader<R> {
        &mut self.reader
    }

    /// Advance to the next row.
    pub fn read(&mut self) -> Result<bool> {
        self.reader.advance()
    }

    /// Number of output columns.
    pub fn field_count(&mut self) -> Result<usize> {
        Ok(self.reader.columns()?.len())
    }

    pub fn get_name(&mut self, ordinal: usize) -> Result<String> {
        let columns = self.reader.columns()?;
        columns
            .get(ordinal)
            .map(|column| column.name.clone())
            .ok_or(CsvError::FieldIndexOutOfRange {
                index: ordinal,
                count: columns.len(),
            })
    }

    pub fn get_ordinal(&mut self, name: &str) -> Result<usize> {
        self.reader.ordinal(name)
    }

    pub fn get_value(&mut self, ordinal: usize) -> Result<Value> {
        self.reader.value(ordinal)
    }

    pub fn get_values(&mut self) -> Result<Vec<Value>> {
        self.reader.values()
    }

    pub fn is_null(&mut self, ordinal: usize) -> Result<bool> {
        Ok(self.reader.value(ordinal)?.is_null())
    }

    pub fn get_string(&mut self, ordinal: usize) -> Result<Option<String>> {
        self.typed(ordinal, DataType::String, |value| {
            value.as_str().map(str::to_string)
        })
    }

    pub fn get_bool(&mut self, ordinal: usize) -> Result<Option<bool>> {
        self.typed(ordinal, DataType::Bool, Value::as_bool)
    }

    pub fn get_i32(&mut self, ordinal: usize) -> Result<Option<i32>> {
        self.typed(ordinal, DataType::I32, |value| {
            value.as_i64().and_then(|v| i32::try_from(v).ok())
        })
    }

    pub fn get_i64(&mut self, ordinal: usize) -> Result<Option<i64>> {
        self.typed(ordinal, DataType::I64, Value::as_i64)
    }

    pub fn get_f64(&mut self, ordinal: usize) -> Result<Option<f64>> {
        self.typed(ordinal, DataType::F64, Value::as_f64)
    }

    pub fn get_date_time(&mut self, ordinal: usize) -> Result<Option<NaiveDateTime>> {
        self.typed(ordinal, DataType::DateTime, Value::as_date_time)
    }

    /// Convert as `data_type`; a custom converter producing another variant
    /// is a conversion error.
    fn typed<T>(
        &mut self,
        ordinal: usize,
        data_type: DataType,
        extract: impl FnOnce(&Value) -> Option<T>,
    ) -> Result<Option<T>> {
        let value = self.reader.value_as(ordinal, data_type)?;
        if value.is_null() {
            return Ok(None);
        }
        match extract(&value) {
            Some(typed) => Ok(Some(typed)),
            None => {
                let name = self.get_name(ordinal)?;
                Err(CsvError::conversion(name, value.to_string(), data_type))
            }
        }
    }

    /// Nesting depth; CSV is flat.
    pub fn depth(&self) -> Result<usize> {
        self.reader.guard()?;
        Ok(0)
    }

    /// Always -1; reading never modifies rows.
    pub fn records_affected(&self) -> i64 {
        -1
    }

    /// CSV holds a single result set.
    pub fn next_result(&mut self) -> Result<bool> {
        self.reader.guard()?;
        Ok(false)
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_closed()
    }

    pub fn close(&mut self) {
        self.reader.close();
    }

    /// One entry per output column.
    pub fn schema(&mut self) -> Result<Vec<SchemaColumn>> {
        let columns = self.reader.columns()?;
        Ok(columns
            .iter()
            .enumerate()
            .map(|(ordinal, column)| SchemaColumn {
                name: column.name.clone(),
                ordinal,
                data_type: column.data_type,
                allow_null: true,
                column_size: i32::MAX,
                is_unique: false,
                is_key: false,
                is_read_only: true,
                is_long: false,
            })
            .collect())
    }
}

impl<R: Read> From<CsvReader<R>> for CsvCursor<R> {
    fn from(reader: CsvReader<R>) -> Self {
        Self::new(reader)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::column::{Column, ColumnCollection};

    fn cursor(data: &'static str) -> CsvCursor<&'static [u8]> {
        CsvCursor::new(CsvReader::new(data.as_bytes()))
    }

    #[test]
    fn test_typed_getters() {
        let mut cursor = cursor("n,when,ratio\n5,2020-01-02,0.5\n,,\n");
        assert!(cursor.read().expect("row"));
        assert_eq!(cursor.get_i32(0).expect("i32"), Some(5));
        assert_eq!(
            cursor.get_date_time(1).expect("date"),
            NaiveDate::from_ymd_opt(2020, 1, 2).and_then(|d| d.and_hms_opt(0, 0, 0))
        );
        assert_eq!(cursor.get_f64(2).expect("f64"), Some(0.5));
        assert_eq!(cursor.get_string(0).expect("string"), Some("5".to_string()));

        assert!(cursor.read().expect("row"));
        assert!(cursor.is_null(0).expect("null"));
        assert_eq!(cursor.get_i64(0).expect("null i64"), None);
        assert!(!cursor.read().expect("end"));
    }

    #[test]
    fn test_converter_mismatch_is_conversion_error() {
        let mut reader = CsvReader::new(&b"n\nx\n"[..]);
        reader.set_columns(
            ColumnCollection::from_columns([
                Column::new("n").with_converter(|_| Ok(Value::Bool(true)))
            ])
            .expect("columns"),
        );
        let mut cursor = CsvCursor::from(reader);
        cursor.read().expect("row");
        assert!(matches!(
            cursor.get_i32(0),
            Err(CsvError::Conversion { column, .. }) if column == "n"
        ));
    }

    #[test]
    fn test_constant_metadata() {
        let mut cursor = cursor("a\n1\n");
        assert_eq!(cursor.depth().expect("depth"), 0);
        assert_eq!(cursor.records_affected(), -1);
        assert!(!cursor.next_result().expect("next result"));
        assert_eq!(cursor.field_count().expect("count"), 1);
        assert_eq!(cursor.get_name(0).expect("name"), "a");
        assert!(cursor.get_name(1).is_err());
    }

    #[test]
    fn test_access_after_close() {
        let mut cursor = cursor("a\n1\n");
        cursor.read().expect("row");
        cursor.close();
        assert!(cursor.is_closed());
        assert!(matches!(cursor.read(), Err(CsvError::ReaderClosed)));
        assert!(matches!(cursor.schema(), Err(CsvError::ReaderClosed)));
        assert!(matches!(cursor.get_value(0), Err(CsvError::ReaderClosed)));
        assert!(matches!(cursor.depth(), Err(CsvError::ReaderClosed)));
        assert!(matches!(cursor.next_result(), Err(CsvError::ReaderClosed)));
        assert_eq!(cursor.records_affected(), -1);
    }
}
