//! File access, cursor schema, object mapping and agreement with the `csv` crate.

use std::io::Write;

use csvstream_core::{
    Column, ColumnCollection, CsvCursor, CsvError, CsvReader, DataType, ReaderOptions,
    ValueTrimming,
};
use proptest::prelude::*;
use serde::Deserialize;

#[test]
fn test_open_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "id,name\n1,Ada\n2,Alan\n").unwrap();

    let mut csv = CsvReader::open(file.path()).unwrap();
    let mut names = Vec::new();
    while csv.advance().unwrap() {
        names.push(csv.field_by_name("name").unwrap().map(str::to_string));
    }
    assert_eq!(names, vec![Some("Ada".into()), Some("Alan".into())]);
}

#[test]
fn test_open_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.csv");
    let error = CsvReader::open(&path).unwrap_err();
    assert!(matches!(error, CsvError::FileNotFound { path: p } if p == path));
}

#[test]
fn test_open_validates_options() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let options = ReaderOptions::default().with_delimiter('"');
    assert!(matches!(
        CsvReader::open_with_options(file.path(), options),
        Err(CsvError::InvalidConfiguration { .. })
    ));
}

#[test]
fn test_schema_metadata() {
    let mut csv = CsvReader::new(&b"id,name,born\n1,Ada,1815-12-10\n"[..]);
    let mut columns = ColumnCollection::new();
    columns.add("id", DataType::I32).unwrap();
    columns.push(Column::new("name")).unwrap();
    columns.add("born", DataType::Date).unwrap();
    csv.set_columns(columns);
    csv.add_virtual_column(Column::virtual_column("source", "import"));

    let mut cursor = CsvCursor::new(csv);
    let schema = cursor.schema().unwrap();
    insta::assert_json_snapshot!(schema, @r#"
    [
      {
        "name": "id",
        "ordinal": 0,
        "data_type": "i32",
        "allow_null": true,
        "column_size": 2147483647,
        "is_unique": false,
        "is_key": false,
        "is_read_only": true,
        "is_long": false
      },
      {
        "name": "name",
        "ordinal": 1,
        "data_type": "string",
        "allow_null": true,
        "column_size": 2147483647,
        "is_unique": false,
        "is_key": false,
        "is_read_only": true,
        "is_long": false
      },
      {
        "name": "born",
        "ordinal": 2,
        "data_type": "date",
        "allow_null": true,
        "column_size": 2147483647,
        "is_unique": false,
        "is_key": false,
        "is_read_only": true,
        "is_long": false
      },
      {
        "name": "source",
        "ordinal": 3,
        "data_type": "string",
        "allow_null": true,
        "column_size": 2147483647,
        "is_unique": false,
        "is_key": false,
        "is_read_only": true,
        "is_long": false
      }
    ]
    "#);

    assert!(cursor.read().unwrap());
    assert_eq!(cursor.get_i32(0).unwrap(), Some(1));
    assert_eq!(cursor.get_ordinal("BORN").unwrap(), 2);
    assert_eq!(
        cursor.get_value(2).unwrap().to_string(),
        "1815-12-10".to_string()
    );
    assert_eq!(cursor.get_string(3).unwrap().as_deref(), Some("import"));
}

#[derive(Debug, Deserialize, PartialEq)]
struct Flight {
    origin: String,
    destination: String,
    seats: Option<u32>,
    direct: bool,
}

#[test]
fn test_map_records_with_property_mapping() {
    let data = "ORIGIN,DESTINATION,SEATS,NONSTOP\nPHL,FLL,180,yes\nNYC,LAX,,no\n";
    let options = ReaderOptions::default().with_boolean_tokens([("yes", true), ("no", false)]);
    let mut csv = CsvReader::with_options(data.as_bytes(), options).unwrap();
    let mut columns = ColumnCollection::new();
    columns.push(Column::new("ORIGIN")).unwrap();
    columns.push(Column::new("DESTINATION")).unwrap();
    columns.add("SEATS", DataType::U32).unwrap();
    columns.add("NONSTOP", DataType::Bool).unwrap();
    csv.set_columns(columns);

    let flights: Vec<Flight> = csv
        .map_records([
            ("origin", "ORIGIN"),
            ("destination", "DESTINATION"),
            ("seats", "SEATS"),
            ("direct", "NONSTOP"),
        ])
        .collect::<csvstream_core::Result<_>>()
        .unwrap();
    assert_eq!(
        flights,
        vec![
            Flight {
                origin: "PHL".into(),
                destination: "FLL".into(),
                seats: Some(180),
                direct: true,
            },
            Flight {
                origin: "NYC".into(),
                destination: "LAX".into(),
                seats: None,
                direct: false,
            },
        ]
    );
}

#[derive(Debug, Deserialize, PartialEq)]
struct Author {
    name: String,
    born: Option<i32>,
    nickname: Option<String>,
}

#[test]
fn test_map_records_matches_columns_ignoring_case() {
    let mut csv = CsvReader::new(&b"Name,BORN,Country\nAda,1815,UK\nGrace,,US\n"[..]);
    let mut columns = ColumnCollection::new();
    columns.add("Name", DataType::String).unwrap();
    columns.add("BORN", DataType::I32).unwrap();
    columns.add("Country", DataType::String).unwrap();
    csv.set_columns(columns);

    let authors: Vec<Author> = csv
        .map_records::<Author, _, &str, &str>([])
        .collect::<csvstream_core::Result<_>>()
        .unwrap();
    assert_eq!(
        authors,
        vec![
            Author {
                name: "Ada".into(),
                born: Some(1815),
                nickname: None,
            },
            Author {
                name: "Grace".into(),
                born: None,
                nickname: None,
            },
        ]
    );
}

#[test]
fn test_map_records_stops_after_close() {
    let mut csv = CsvReader::new(&b"a\n1\n2\n"[..]);
    csv.close();
    let mut rows = csv.map_records::<serde_json::Value, _, &str, &str>([]);
    assert!(matches!(rows.next(), Some(Err(CsvError::ReaderClosed))));
    assert!(rows.next().is_none());
}

fn write_with_csv_crate(rows: &[Vec<String>]) -> String {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row).unwrap();
    }
    String::from_utf8(writer.into_inner().unwrap()).unwrap()
}

proptest! {
    #[test]
    fn prop_agrees_with_csv_crate(
        width in 2usize..5,
        rows in prop::collection::vec(prop::collection::vec("[a-z ,\"\n]{0,6}", 4), 1..12),
        buffer_size in 1usize..32,
    ) {
        let rows: Vec<Vec<String>> = rows
            .into_iter()
            .map(|row| row.into_iter().take(width).collect())
            .collect();
        let data = write_with_csv_crate(&rows);

        let options = ReaderOptions::default()
            .with_headers(false)
            .with_comment(None)
            .with_trimming(ValueTrimming::None)
            .with_buffer_size(buffer_size);
        let mut reader = CsvReader::with_options(data.as_bytes(), options).unwrap();
        let mut parsed = Vec::new();
        while reader.advance().unwrap() {
            let record = reader.record().unwrap();
            parsed.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }
        prop_assert_eq!(parsed, rows);
    }
}
