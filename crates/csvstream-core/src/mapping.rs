//! Mapping records onto user types through `serde`.

use std::io::Read;
use std::marker::PhantomData;

use serde::de::{self, DeserializeOwned, Deserializer, Visitor};

use crate::error::{CsvError, Result};
use crate::reader::CsvReader;
use crate::value::Value;

/// Lazy sequence of records deserialized into `T`.
///
/// Each resolved column becomes a field of an intermediate JSON object keyed
/// by the property it feeds, which is then deserialized into `T`. For struct
/// targets every field reads the column of the same name, looked up the way
/// [`CsvReader::ordinal`] does; fields with no such column are left out and
/// fall back to serde's handling of absent fields.
pub struct MapRecords<'r, R, T> {
    reader: &'r mut CsvReader<R>,
    mapping: Vec<(String, String)>,
    keys: Option<Vec<(usize, String)>>,
    done: bool,
    _target: PhantomData<fn() -> T>,
}

impl<R: Read> CsvReader<R> {
    /// Iterate over the remaining records as `T`.
    ///
    /// `mapping` pairs a property name with the column it reads from;
    /// properties not listed read the column of the same name.
    pub fn map_records<T, I, K, V>(&mut self, mapping: I) -> MapRecords<'_, R, T>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        MapRecords {
            reader: self,
            mapping: mapping
                .into_iter()
                .map(|(property, column)| (property.into(), column.into()))
                .collect(),
            keys: None,
            done: false,
            _target: PhantomData,
        }
    }
}

impl<R: Read, T: DeserializeOwned> MapRecords<'_, R, T> {
    /// `(ordinal, property)` for every column that feeds `T`.
    fn resolve_keys(&mut self) -> Result<Vec<(usize, String)>> {
        let mut keys = Vec::with_capacity(self.mapping.len());
        for (property, column) in &self.mapping {
            keys.push((self.reader.ordinal(column)?, property.clone()));
        }

        if let Some(fields) = struct_fields::<T>() {
            for &field in fields {
                if self.mapping.iter().any(|(property, _)| property == field) {
                    continue;
                }
                match self.reader.ordinal(field) {
                    Ok(ordinal) => keys.push((ordinal, field.to_string())),
                    Err(CsvError::ColumnNotFound { .. }) => {}
                    Err(error) => return Err(error),
                }
            }
        } else {
            // Maps and other self-describing targets take every column.
            let columns = self.reader.columns()?;
            for (ordinal, column) in columns.iter().enumerate() {
                if !keys.iter().any(|(mapped, _)| *mapped == ordinal) {
                    keys.push((ordinal, column.name.clone()));
                }
            }
        }
        Ok(keys)
    }

    fn map_current(&mut self) -> Result<T> {
        let keys = match self.keys.take() {
            Some(keys) => keys,
            None => self.resolve_keys()?,
        };
        let keys = self.keys.insert(keys);
        let values = self.reader.values()?;
        let object: serde_json::Map<String, serde_json::Value> = keys
            .iter()
            .map(|(ordinal, property)| {
                let value = values
                    .get(*ordinal)
                    .map_or(serde_json::Value::Null, Value::to_json);
                (property.clone(), value)
            })
            .collect();
        serde_json::from_value(serde_json::Value::Object(object)).map_err(|source| {
            CsvError::Mapping {
                record_index: self.reader.current_record_index(),
                source,
            }
        })
    }
}

/// Field names of `T` when it deserializes as a struct.
fn struct_fields<T: DeserializeOwned>() -> Option<&'static [&'static str]> {
    let mut fields = None;
    let _ = T::deserialize(FieldNames {
        fields: &mut fields,
    });
    fields
}

/// Deserializer that records the field list passed to `deserialize_struct`
/// and fails every request.
struct FieldNames<'a> {
    fields: &'a mut Option<&'static [&'static str]>,
}

impl<'de> Deserializer<'de> for FieldNames<'_> {
    type Error = de::value::Error;

    fn deserialize_any<V: Visitor<'de>>(
        self,
        _visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        Err(de::Error::custom("not a struct"))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> std::result::Result<V::Value, Self::Error> {
        *self.fields = Some(fields);
        Err(de::Error::custom("field names recorded"))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}

impl<R: Read, T: DeserializeOwned> Iterator for MapRecords<'_, R, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.advance() {
            Ok(true) => Some(self.map_current()),
            Ok(false) => {
                self.done = true;
                None
            }
            Err(error) => {
                if matches!(error, CsvError::ReaderClosed | CsvError::Disposed) {
                    self.done = true;
                }
                Some(Err(error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::column::ColumnCollection;
    use crate::value::DataType;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: Option<i64>,
    }

    #[test]
    fn test_maps_same_named_columns() {
        let mut csv = CsvReader::new(&b"name,age\nAda,36\nAlan,\n"[..]);
        let mut columns = ColumnCollection::new();
        columns.add("name", DataType::String).expect("name");
        columns.add("age", DataType::I64).expect("age");
        csv.set_columns(columns);

        let people: Vec<Person> = csv
            .map_records(Vec::<(String, String)>::new())
            .collect::<Result<_>>()
            .expect("mapped");
        assert_eq!(
            people,
            vec![
                Person {
                    name: "Ada".into(),
                    age: Some(36),
                },
                Person {
                    name: "Alan".into(),
                    age: None,
                },
            ]
        );
    }

    #[test]
    fn test_property_mapping() {
        let mut csv = CsvReader::new(&b"Full Name,Years\nAda,36\n"[..]);
        let mut columns = ColumnCollection::new();
        columns.add("Full Name", DataType::String).expect("name");
        columns.add("Years", DataType::I64).expect("age");
        csv.set_columns(columns);

        let mut people =
            csv.map_records::<Person, _, _, _>([("name", "full name"), ("age", "Years")]);
        assert_eq!(
            people.next().expect("row").expect("mapped"),
            Person {
                name: "Ada".into(),
                age: Some(36),
            }
        );
        assert!(people.next().is_none());
    }

    #[test]
    fn test_mapping_error_names_record() {
        let mut csv = CsvReader::new(&b"name,age\nAda,old\n"[..]);
        let mut people = csv.map_records::<Person, _, _, _>(Vec::<(String, String)>::new());
        let error = people.next().expect("row").expect_err("age is a string");
        assert!(matches!(error, CsvError::Mapping { record_index: 0, .. }));
    }

    #[test]
    fn test_struct_fields() {
        assert_eq!(struct_fields::<Person>(), Some(&["name", "age"][..]));
        assert_eq!(struct_fields::<serde_json::Value>(), None);
    }

    #[test]
    fn test_unknown_mapped_column() {
        let mut csv = CsvReader::new(&b"name\nAda\n"[..]);
        let mut people = csv.map_records::<Person, _, _, _>([("age", "missing")]);
        assert!(matches!(
            people.next(),
            Some(Err(CsvError::ColumnNotFound { .. }))
        ));
    }
}
