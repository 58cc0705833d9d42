use std::cell::RefCell;
use std::fs::File;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::{debug, info, info_span};

use csvstream_core::{
    CsvCursor, CsvReader, ParseError, ParseErrorAction, ParseErrorKind, SchemaColumn, Value,
};

use crate::cli::{FileArgs, ShowArgs};

/// Records read by `show`.
#[derive(Debug, Clone)]
pub struct ShowOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Parse errors reported while reading with `--on-error notify`.
    pub reported: Vec<ParseError>,
}

/// Counts produced by `stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    pub path: PathBuf,
    pub records: usize,
    pub field_count: usize,
    pub headers: Vec<String>,
    pub missing_fields: usize,
    pub malformed: usize,
}

impl FileStats {
    pub fn parse_errors(&self) -> usize {
        self.missing_fields + self.malformed
    }
}

type Reported = Rc<RefCell<Vec<ParseError>>>;

fn open_reader(
    input: &FileArgs,
    default_action: ParseErrorAction,
) -> Result<(CsvReader<File>, Reported)> {
    let options = input.dialect.reader_options(default_action);
    debug!(?options, "reader options");
    let mut reader = CsvReader::open_with_options(&input.file, options)
        .with_context(|| format!("open {}", input.file.display()))?;
    let reported: Reported = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&reported);
    reader.on_parse_error(move |event| sink.borrow_mut().push(event.error.clone()));
    Ok((reader, reported))
}

pub fn run_show(args: &ShowArgs) -> Result<ShowOutput> {
    let path = &args.input.file;
    let span = info_span!("show", file = %path.display());
    let _guard = span.enter();

    let (mut reader, reported) = open_reader(&args.input, ParseErrorAction::ThrowException)?;
    let columns: Vec<String> = reader
        .columns()
        .with_context(|| format!("read header of {}", path.display()))?
        .names()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    while args.limit.is_none_or(|limit| rows.len() < limit) {
        let advanced = reader
            .advance()
            .with_context(|| format!("read {}", path.display()))?;
        if !advanced {
            break;
        }
        let values = reader.values().with_context(|| {
            format!(
                "read record {} of {}",
                reader.current_record_index(),
                path.display()
            )
        })?;
        rows.push(values);
    }
    reader.close();
    info!(records = rows.len(), "show complete");

    let reported = reported.take();
    Ok(ShowOutput {
        columns,
        rows,
        reported,
    })
}

/// Read the whole file, touching every declared field so short records are
/// reported. Parse errors go to the notification channel unless `--on-error`
/// says otherwise.
pub fn run_stats(args: &FileArgs) -> Result<FileStats> {
    let path = &args.file;
    let span = info_span!("stats", file = %path.display());
    let _guard = span.enter();

    let (mut reader, reported) = open_reader(args, ParseErrorAction::RaiseEvent)?;
    let field_count = reader
        .field_count()
        .with_context(|| format!("read header of {}", path.display()))?;
    let headers = if reader.has_headers() {
        reader.headers()?.to_vec()
    } else {
        Vec::new()
    };

    let mut records = 0usize;
    let mut buffer = Vec::with_capacity(field_count);
    while reader
        .advance()
        .with_context(|| format!("read {}", path.display()))?
    {
        reader.copy_record_to(&mut buffer).with_context(|| {
            format!(
                "read record {} of {}",
                reader.current_record_index(),
                path.display()
            )
        })?;
        records += 1;
    }
    reader.close();

    let reported = reported.take();
    let missing_fields = reported
        .iter()
        .filter(|error| error.kind == ParseErrorKind::MissingField)
        .count();
    let stats = FileStats {
        path: path.clone(),
        records,
        field_count,
        headers,
        missing_fields,
        malformed: reported.len() - missing_fields,
    };
    info!(
        records = stats.records,
        parse_errors = stats.parse_errors(),
        "stats complete"
    );
    Ok(stats)
}

pub fn run_schema(args: &FileArgs) -> Result<Vec<SchemaColumn>> {
    let path = &args.file;
    let (reader, _reported) = open_reader(args, ParseErrorAction::ThrowException)?;
    let mut cursor = CsvCursor::from(reader);
    cursor
        .schema()
        .with_context(|| format!("read header of {}", path.display()))
}
