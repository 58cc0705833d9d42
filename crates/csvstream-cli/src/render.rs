use std::io::{self, Write};

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use csvstream_core::{ParseError, ParseErrorKind, SchemaColumn, Value};

use crate::commands::{FileStats, ShowOutput};

pub fn print_show(output: &ShowOutput) {
    println!("{}", records_table(output));
    print_reported(&output.reported);
}

pub fn records_table(output: &ShowOutput) -> Table {
    let mut table = Table::new();
    table.set_header(output.columns.iter().map(|name| header_cell(name)));
    apply_table_style(&mut table);
    for row in &output.rows {
        table.add_row(row.iter().map(value_cell));
    }
    table
}

/// One JSON object per record, keyed by column name (keys sorted).
pub fn write_json_lines<W: Write>(output: &ShowOutput, writer: &mut W) -> io::Result<()> {
    for row in &output.rows {
        let object: serde_json::Map<String, serde_json::Value> = output
            .columns
            .iter()
            .zip(row)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        serde_json::to_writer(&mut *writer, &object)?;
        writeln!(writer)?;
    }
    Ok(())
}

pub fn print_stats(stats: &FileStats) {
    println!("File: {}", stats.path.display());
    println!("{}", stats_table(stats));
}

pub fn stats_table(stats: &FileStats) -> Table {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Metric"), header_cell("Value")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    table.add_row(vec![Cell::new("Records"), Cell::new(stats.records)]);
    table.add_row(vec![Cell::new("Fields"), Cell::new(stats.field_count)]);
    table.add_row(vec![
        Cell::new("Missing fields"),
        count_cell(stats.missing_fields, Color::Yellow),
    ]);
    table.add_row(vec![
        Cell::new("Malformed"),
        count_cell(stats.malformed, Color::Red),
    ]);
    if !stats.headers.is_empty() {
        table.add_row(vec![Cell::new("Headers"), Cell::new(stats.headers.join(", "))]);
    }
    table
}

pub fn print_schema(schema: &[SchemaColumn]) {
    println!("{}", schema_table(schema));
}

pub fn schema_table(schema: &[SchemaColumn]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("#"),
        header_cell("Column"),
        header_cell("Type"),
        header_cell("Nullable"),
        header_cell("Read-only"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    align_column(&mut table, 3, CellAlignment::Center);
    align_column(&mut table, 4, CellAlignment::Center);
    for column in schema {
        table.add_row(vec![
            Cell::new(column.ordinal),
            Cell::new(&column.name).add_attribute(Attribute::Bold),
            Cell::new(column.data_type),
            flag_cell(column.allow_null),
            flag_cell(column.is_read_only),
        ]);
    }
    table
}

fn print_reported(reported: &[ParseError]) {
    if reported.is_empty() {
        return;
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Kind"),
        header_cell("Record"),
        header_cell("Field"),
        header_cell("Position"),
    ]);
    apply_table_style(&mut table);
    for column in 1..4 {
        align_column(&mut table, column, CellAlignment::Right);
    }
    for error in reported {
        let color = match error.kind {
            ParseErrorKind::MissingField => Color::Yellow,
            ParseErrorKind::Malformed => Color::Red,
        };
        table.add_row(vec![
            Cell::new(error.kind).fg(color),
            Cell::new(error.record_index),
            Cell::new(error.field_index),
            Cell::new(error.position),
        ]);
    }
    eprintln!();
    eprintln!("Parse errors:");
    eprintln!("{table}");
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn value_cell(value: &Value) -> Cell {
    match value {
        Value::Null => dim_cell("NULL"),
        other => Cell::new(other),
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn flag_cell(flag: bool) -> Cell {
    if flag {
        Cell::new("✓").fg(Color::Green)
    } else {
        dim_cell("-")
    }
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> ShowOutput {
        ShowOutput {
            columns: vec!["name".into(), "age".into()],
            rows: vec![
                vec![Value::string("Ada"), Value::Int(36)],
                vec![Value::string("Alan"), Value::Null],
            ],
            reported: Vec::new(),
        }
    }

    #[test]
    fn test_json_lines() {
        let mut buffer = Vec::new();
        write_json_lines(&output(), &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "{\"age\":36,\"name\":\"Ada\"}\n{\"age\":null,\"name\":\"Alan\"}\n"
        );
    }

    #[test]
    fn test_records_table_renders_null() {
        let rendered = records_table(&output()).to_string();
        assert!(rendered.contains("Ada"));
        assert!(rendered.contains("36"));
        assert!(rendered.contains("NULL"));
    }
}
