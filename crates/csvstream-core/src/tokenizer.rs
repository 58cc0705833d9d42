//! Record tokenizer.
//!
//! A char-at-a-time state machine over [`BufferedSource`]. Partial field
//! content lives in a growable accumulator so a refill in the middle of a
//! field only resets the buffer cursor, never the field.

use std::io::Read;

use crate::error::{ParseError, Result};
use crate::options::ReaderOptions;
use crate::policy::{ErrorPolicy, Recovery};
use crate::record::Record;
use crate::source::BufferedSource;

/// Segmentation rules derived from [`ReaderOptions`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct Dialect {
    pub(crate) delimiter: char,
    pub(crate) quote: char,
    pub(crate) escape: char,
    pub(crate) comment: Option<char>,
    pub(crate) trim_quoted: bool,
    pub(crate) trim_unquoted: bool,
    pub(crate) multiline: bool,
    pub(crate) skip_empty_lines: bool,
}

impl Dialect {
    pub(crate) fn from_options(options: &ReaderOptions) -> Self {
        Self {
            delimiter: options.delimiter,
            quote: options.quote,
            escape: options.escape,
            comment: options.comment,
            trim_quoted: options.trimming.trims_quoted(),
            trim_unquoted: options.trimming.trims_unquoted(),
            multiline: options.multiline,
            skip_empty_lines: options.skip_empty_lines,
        }
    }

    /// Space, tab, or a non-Latin-1 Unicode space; never the delimiter.
    fn is_whitespace(&self, ch: char) -> bool {
        if ch == self.delimiter {
            false
        } else if ch <= '\u{ff}' {
            ch == ' ' || ch == '\t'
        } else {
            ch.is_whitespace()
        }
    }
}

fn is_newline(ch: char) -> bool {
    ch == '\n' || ch == '\r'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Start of a line; leading whitespace is held back until we know the
    /// line is not a comment.
    RecordStart,
    BeforeField,
    UnquotedField,
    QuotedField,
    /// Escape distinct from the quote was read; next char is literal.
    EscapeSeen,
    QuoteSeenInQuotedField,
    AfterField,
    /// Recovering from content after a closing quote.
    StrayContent,
    CommentLine,
    AfterRecord,
    EndOfStream,
}

/// Where the tokenizer is in the stream and which record it is reading.
pub(crate) struct ReadContext {
    pub(crate) record_index: i64,
    pub(crate) declared_width: Option<usize>,
}

pub(crate) struct Tokenizer<R> {
    source: BufferedSource<R>,
    dialect: Dialect,
    field: String,
    quoted: bool,
    /// A parse error escaped mid-line; drop the rest of it on the next read.
    resync: bool,
}

impl<R: Read> Tokenizer<R> {
    pub(crate) fn new(source: BufferedSource<R>, dialect: Dialect) -> Self {
        Self {
            source,
            dialect,
            field: String::new(),
            quoted: false,
            resync: false,
        }
    }

    /// Content of the current buffer fill.
    pub(crate) fn snapshot(&self) -> String {
        self.source.snapshot()
    }

    pub(crate) fn close(&mut self) {
        self.source.close();
    }

    /// Read the next record into `record`. Returns false at end of stream.
    ///
    /// Malformed content is routed through `policy`; records dropped by
    /// [`Recovery::SkipLine`] are never returned.
    pub(crate) fn read_record(
        &mut self,
        record: &mut Record,
        ctx: &ReadContext,
        policy: &mut ErrorPolicy,
    ) -> Result<bool> {
        if std::mem::take(&mut self.resync) {
            self.skip_line()?;
        }
        'record: loop {
            record.clear();
            self.field.clear();
            self.quoted = false;
            let mut drop_extra = false;
            let mut state = State::RecordStart;

            loop {
                match state {
                    State::AfterRecord => {
                        record.set_end_position(self.source.position());
                        return Ok(true);
                    }
                    State::EndOfStream => return Ok(false),
                    _ => {}
                }

                let Some(ch) = self.source.peek()? else {
                    state = match state {
                        State::RecordStart if self.field.is_empty() => State::EndOfStream,
                        State::CommentLine => State::EndOfStream,
                        State::QuotedField | State::EscapeSeen => {
                            let error = self.malformed(record, ctx);
                            match self.resolve(policy, error)? {
                                Recovery::Continue => {
                                    self.finish_field(record, ctx, drop_extra);
                                    State::AfterRecord
                                }
                                Recovery::SkipLine => continue 'record,
                            }
                        }
                        _ => {
                            self.finish_field(record, ctx, drop_extra);
                            State::AfterRecord
                        }
                    };
                    continue;
                };

                let d = self.dialect;
                state = match state {
                    State::RecordStart => {
                        if d.comment == Some(ch) {
                            self.source.bump();
                            self.field.clear();
                            State::CommentLine
                        } else if is_newline(ch) {
                            if self.field.is_empty() && d.skip_empty_lines {
                                self.consume_newline()?;
                                State::RecordStart
                            } else {
                                self.finish_field(record, ctx, drop_extra);
                                self.consume_newline()?;
                                State::AfterRecord
                            }
                        } else if d.is_whitespace(ch) {
                            self.field.push(ch);
                            self.source.bump();
                            State::RecordStart
                        } else if d.trim_unquoted || self.field.is_empty() {
                            self.field.clear();
                            State::BeforeField
                        } else {
                            State::UnquotedField
                        }
                    }
                    State::BeforeField => {
                        if ch == d.quote {
                            self.source.bump();
                            self.quoted = true;
                            State::QuotedField
                        } else if ch == d.delimiter {
                            self.finish_field(record, ctx, drop_extra);
                            self.source.bump();
                            self.after_delimiter(record, ctx, policy, &mut drop_extra)?
                        } else if is_newline(ch) {
                            self.finish_field(record, ctx, drop_extra);
                            self.consume_newline()?;
                            State::AfterRecord
                        } else if d.trim_unquoted && d.is_whitespace(ch) {
                            self.source.bump();
                            State::BeforeField
                        } else {
                            State::UnquotedField
                        }
                    }
                    State::UnquotedField => {
                        if ch == d.delimiter {
                            self.finish_field(record, ctx, drop_extra);
                            self.source.bump();
                            self.after_delimiter(record, ctx, policy, &mut drop_extra)?
                        } else if is_newline(ch) {
                            self.finish_field(record, ctx, drop_extra);
                            self.consume_newline()?;
                            State::AfterRecord
                        } else {
                            self.field.push(ch);
                            self.source.bump();
                            State::UnquotedField
                        }
                    }
                    State::QuotedField => {
                        if ch == d.escape && d.escape != d.quote {
                            self.source.bump();
                            State::EscapeSeen
                        } else if ch == d.quote {
                            self.source.bump();
                            if d.escape == d.quote {
                                State::QuoteSeenInQuotedField
                            } else {
                                State::AfterField
                            }
                        } else if is_newline(ch) && !d.multiline {
                            let error = self.malformed(record, ctx);
                            match self.resolve(policy, error)? {
                                Recovery::Continue => {
                                    self.finish_field(record, ctx, drop_extra);
                                    self.consume_newline()?;
                                    State::AfterRecord
                                }
                                Recovery::SkipLine => {
                                    self.consume_newline()?;
                                    continue 'record;
                                }
                            }
                        } else {
                            self.field.push(ch);
                            self.source.bump();
                            State::QuotedField
                        }
                    }
                    State::EscapeSeen => {
                        self.field.push(ch);
                        self.source.bump();
                        State::QuotedField
                    }
                    State::QuoteSeenInQuotedField => {
                        if ch == d.quote {
                            self.field.push(ch);
                            self.source.bump();
                            State::QuotedField
                        } else {
                            State::AfterField
                        }
                    }
                    State::AfterField => {
                        if ch == d.delimiter {
                            self.finish_field(record, ctx, drop_extra);
                            self.source.bump();
                            self.after_delimiter(record, ctx, policy, &mut drop_extra)?
                        } else if is_newline(ch) {
                            self.finish_field(record, ctx, drop_extra);
                            self.consume_newline()?;
                            State::AfterRecord
                        } else if d.is_whitespace(ch) {
                            self.source.bump();
                            State::AfterField
                        } else {
                            let error = self.malformed(record, ctx);
                            match self.resolve(policy, error)? {
                                Recovery::Continue => State::StrayContent,
                                Recovery::SkipLine => {
                                    self.skip_line()?;
                                    continue 'record;
                                }
                            }
                        }
                    }
                    State::StrayContent => {
                        if ch == d.delimiter {
                            self.finish_field(record, ctx, drop_extra);
                            self.source.bump();
                            self.after_delimiter(record, ctx, policy, &mut drop_extra)?
                        } else if is_newline(ch) {
                            self.finish_field(record, ctx, drop_extra);
                            self.consume_newline()?;
                            State::AfterRecord
                        } else {
                            self.source.bump();
                            State::StrayContent
                        }
                    }
                    State::CommentLine => {
                        if is_newline(ch) {
                            self.consume_newline()?;
                            State::RecordStart
                        } else {
                            self.source.bump();
                            State::CommentLine
                        }
                    }
                    State::AfterRecord | State::EndOfStream => state,
                };
            }
        }
    }

    /// Called after a delimiter was consumed; detects records wider than
    /// the declared width.
    fn after_delimiter(
        &mut self,
        record: &mut Record,
        ctx: &ReadContext,
        policy: &mut ErrorPolicy,
        drop_extra: &mut bool,
    ) -> Result<State> {
        let Some(width) = ctx.declared_width else {
            return Ok(State::BeforeField);
        };
        if *drop_extra || record.len() < width {
            return Ok(State::BeforeField);
        }
        self.source.ensure_available()?;
        let error = ParseError::malformed(
            ctx.record_index,
            width,
            self.source.position(),
            self.source.snapshot(),
        );
        match self.resolve(policy, error)? {
            Recovery::Continue => {
                *drop_extra = true;
                Ok(State::BeforeField)
            }
            Recovery::SkipLine => {
                self.skip_line()?;
                Ok(State::AfterRecord)
            }
        }
    }

    fn finish_field(&mut self, record: &mut Record, ctx: &ReadContext, drop_extra: bool) {
        let beyond_width = ctx
            .declared_width
            .is_some_and(|width| record.len() >= width);
        if !(drop_extra && beyond_width) {
            let d = self.dialect;
            let trim = if self.quoted {
                d.trim_quoted
            } else {
                d.trim_unquoted
            };
            if trim {
                record.push(self.field.trim_matches(|ch| d.is_whitespace(ch)));
            } else {
                record.push(&self.field);
            }
        }
        self.field.clear();
        self.quoted = false;
    }

    /// Route `error` through `policy`. When it escapes to the caller, the
    /// next read resumes on the following line.
    fn resolve(&mut self, policy: &mut ErrorPolicy, error: ParseError) -> Result<Recovery> {
        policy.resolve(error).inspect_err(|_| self.resync = true)
    }

    fn malformed(&self, record: &Record, ctx: &ReadContext) -> ParseError {
        ParseError::malformed(
            ctx.record_index,
            record.len(),
            self.source.position(),
            self.source.snapshot(),
        )
    }

    /// Consume `\n`, `\r` or `\r\n`, then refill if the fill is used up so
    /// the position after a terminator is 0 at a fill boundary.
    fn consume_newline(&mut self) -> Result<()> {
        if let Some(ch) = self.source.peek()? {
            self.source.bump();
            if ch == '\r' && self.source.peek()? == Some('\n') {
                self.source.bump();
            }
        }
        self.source.ensure_available()?;
        Ok(())
    }

    /// Drop everything up to and including the next newline.
    fn skip_line(&mut self) -> Result<()> {
        while let Some(ch) = self.source.peek()? {
            if is_newline(ch) {
                return self.consume_newline();
            }
            self.source.bump();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CsvError;
    use crate::options::{ParseErrorAction, ValueTrimming};

    fn tokenizer<'a>(data: &'a str, options: &ReaderOptions) -> Tokenizer<&'a [u8]> {
        let source = BufferedSource::new(data.as_bytes(), options.buffer_size, encoding_rs::UTF_8);
        Tokenizer::new(source, Dialect::from_options(options))
    }

    fn read_all(data: &str, options: &ReaderOptions) -> Result<Vec<Vec<String>>> {
        let mut tokenizer = tokenizer(data, options);
        let mut policy = ErrorPolicy::new(options.parse_error_action);
        let mut record = Record::new();
        let mut rows = Vec::new();
        let ctx = ReadContext {
            record_index: 0,
            declared_width: None,
        };
        while tokenizer.read_record(&mut record, &ctx, &mut policy)? {
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    fn rows(data: &str) -> Vec<Vec<String>> {
        read_all(data, &ReaderOptions::default()).expect("tokenize")
    }

    #[test]
    fn test_simple_records() {
        assert_eq!(rows("a,b\nc,d"), vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn test_newline_variants() {
        assert_eq!(
            rows("a\r\nb\rc\nd"),
            vec![vec!["a"], vec!["b"], vec!["c"], vec!["d"]]
        );
    }

    #[test]
    fn test_quoted_fields() {
        assert_eq!(
            rows("\"a,b\",\"say \"\"hi\"\"\"\n\"multi\nline\",x"),
            vec![vec!["a,b", "say \"hi\""], vec!["multi\nline", "x"]]
        );
    }

    #[test]
    fn test_trailing_delimiter_yields_empty_field() {
        assert_eq!(rows("a,b,\n"), vec![vec!["a", "b", ""]]);
    }

    #[test]
    fn test_comments_and_empty_lines() {
        assert_eq!(
            rows("\n# comment\n  # indented comment\na,b\n\n\nc,d\n"),
            vec![vec!["a", "b"], vec!["c", "d"]]
        );
    }

    #[test]
    fn test_comment_char_only_at_record_start() {
        assert_eq!(rows("a,#b\n"), vec![vec!["a", "#b"]]);
    }

    #[test]
    fn test_keep_empty_lines() {
        let options = ReaderOptions::default().with_skip_empty_lines(false);
        assert_eq!(
            read_all("a\n\nb", &options).expect("tokenize"),
            vec![vec!["a"], vec![""], vec!["b"]]
        );
    }

    #[test]
    fn test_unquoted_trimming_default() {
        assert_eq!(
            rows("  a  , \"b\" ,\" c \"\t"),
            vec![vec!["a", "b", " c "]]
        );
    }

    #[test]
    fn test_trimming_modes() {
        let data = " a ,\" b \"";
        let none = ReaderOptions::default().with_trimming(ValueTrimming::None);
        assert_eq!(
            read_all(data, &none).expect("none"),
            vec![vec![" a ", " b "]]
        );
        let quoted = ReaderOptions::default().with_trimming(ValueTrimming::QuotedOnly);
        assert_eq!(
            read_all(" a , \" b \" ", &quoted).expect("quoted"),
            vec![vec![" a ", " \" b \" "]]
        );
        assert_eq!(
            read_all(" a ,\" b \"", &quoted).expect("quoted"),
            vec![vec![" a ", "b"]]
        );
        let all = ReaderOptions::default().with_trimming(ValueTrimming::All);
        assert_eq!(
            read_all(" a , \" b \" ", &all).expect("all"),
            vec![vec!["a", "b"]]
        );
    }

    #[test]
    fn test_distinct_escape() {
        let options = ReaderOptions::default().with_escape('\\');
        assert_eq!(
            read_all("\"a\\\"b\",\"c\\\\d\"", &options).expect("tokenize"),
            vec![vec!["a\"b", "c\\d"]]
        );
    }

    #[test]
    fn test_quote_inside_unquoted_field_is_literal() {
        assert_eq!(rows("ab\"c,d"), vec![vec!["ab\"c", "d"]]);
    }

    #[test]
    fn test_tab_delimiter_is_not_trimmed() {
        let options = ReaderOptions::default().with_delimiter('\t');
        assert_eq!(
            read_all("a\t\tb", &options).expect("tokenize"),
            vec![vec!["a", "", "b"]]
        );
    }

    #[test]
    fn test_fields_survive_refills() {
        let options = ReaderOptions::default().with_buffer_size(3);
        assert_eq!(
            read_all("\"abc\"\"def\",ghijkl\r\nmn", &options).expect("tokenize"),
            vec![vec!["abc\"def", "ghijkl"], vec!["mn"]]
        );
    }

    #[test]
    fn test_stray_content_after_quote() {
        let options = ReaderOptions::default().with_escape('\\');
        let error = read_all("\"111\",\"222\"\"333\"", &options).expect_err("malformed");
        let CsvError::Malformed(error) = error else {
            panic!("expected malformed error, got {error:?}");
        };
        assert_eq!(error.record_index, 0);
        assert_eq!(error.field_index, 1);
        assert_eq!(error.position, 11);
        assert_eq!(error.raw_snippet, "\"111\",\"222\"\"333\"");
    }

    #[test]
    fn test_read_after_stray_content_error_starts_next_line() {
        let options = ReaderOptions::default();
        let mut tokenizer = tokenizer("\"x\"y,z\nc,d\n", &options);
        let mut policy = ErrorPolicy::new(ParseErrorAction::ThrowException);
        let mut record = Record::new();
        let ctx = ReadContext {
            record_index: 0,
            declared_width: None,
        };
        assert!(tokenizer.read_record(&mut record, &ctx, &mut policy).is_err());
        assert!(tokenizer.read_record(&mut record, &ctx, &mut policy).expect("next line"));
        assert_eq!(record.iter().collect::<Vec<_>>(), vec!["c", "d"]);
        assert!(!tokenizer.read_record(&mut record, &ctx, &mut policy).expect("end"));
    }

    #[test]
    fn test_unterminated_quote_at_end_of_stream() {
        let error = read_all("a,\"bc", &ReaderOptions::default()).expect_err("malformed");
        let CsvError::Malformed(error) = error else {
            panic!("expected malformed error, got {error:?}");
        };
        assert_eq!(error.field_index, 1);
        assert_eq!(error.position, 0);
        assert_eq!(error.raw_snippet, "");
    }

    #[test]
    fn test_unterminated_quote_recovers_when_notified() {
        let options =
            ReaderOptions::default().with_parse_error_action(ParseErrorAction::RaiseEvent);
        assert_eq!(
            read_all("a,\"bc", &options).expect("tokenize"),
            vec![vec!["a", "bc"]]
        );
    }

    #[test]
    fn test_newline_in_quotes_without_multiline() {
        let options = ReaderOptions::default().with_multiline(false);
        let error = read_all("\"a\nb\",c", &options).expect_err("malformed");
        assert!(matches!(error, CsvError::Malformed(e) if e.position == 2 && e.field_index == 0));

        let skip = options.with_parse_error_action(ParseErrorAction::AdvanceToNextLine);
        assert_eq!(
            read_all("\"a\nb\",c\nd,e", &skip).expect("tokenize"),
            vec![vec!["b\"", "c"], vec!["d", "e"]]
        );
    }

    #[test]
    fn test_advance_drops_malformed_line() {
        let options = ReaderOptions::default()
            .with_parse_error_action(ParseErrorAction::AdvanceToNextLine);
        assert_eq!(
            read_all("\"a\"x,b\nc,d\n", &options).expect("tokenize"),
            vec![vec!["c", "d"]]
        );
    }

    #[test]
    fn test_notify_discards_stray_content() {
        let options =
            ReaderOptions::default().with_parse_error_action(ParseErrorAction::RaiseEvent);
        assert_eq!(
            read_all("\"a\"xyz,b\n", &options).expect("tokenize"),
            vec![vec!["a", "b"]]
        );
    }

    #[test]
    fn test_ragged_long_row() {
        let options = ReaderOptions::default();
        let mut tokenizer = tokenizer("a,b\n1,2,3,4\n5,6", &options);
        let mut record = Record::new();
        let mut policy = ErrorPolicy::new(ParseErrorAction::ThrowException);
        let ctx = ReadContext {
            record_index: 0,
            declared_width: Some(2),
        };
        assert!(tokenizer.read_record(&mut record, &ctx, &mut policy).expect("first"));
        let error = tokenizer
            .read_record(&mut record, &ctx, &mut policy)
            .expect_err("too many fields");
        assert!(matches!(error, CsvError::Malformed(e) if e.field_index == 2 && e.position == 8));
        assert!(tokenizer.read_record(&mut record, &ctx, &mut policy).expect("next line"));
        assert_eq!(record.iter().collect::<Vec<_>>(), vec!["5", "6"]);

        let mut tokenizer = tokenizer_for_skip();
        let mut policy = ErrorPolicy::new(ParseErrorAction::AdvanceToNextLine);
        assert!(tokenizer.read_record(&mut record, &ctx, &mut policy).expect("row"));
        assert_eq!(record.iter().collect::<Vec<_>>(), vec!["1", "2"]);
        assert!(tokenizer.read_record(&mut record, &ctx, &mut policy).expect("row"));
        assert_eq!(record.iter().collect::<Vec<_>>(), vec!["5", "6"]);
        assert!(!tokenizer.read_record(&mut record, &ctx, &mut policy).expect("end"));
    }

    fn tokenizer_for_skip() -> Tokenizer<&'static [u8]> {
        let options = ReaderOptions::default();
        let source = BufferedSource::new(&b"1,2,3,4\n5,6"[..], 4096, encoding_rs::UTF_8);
        Tokenizer::new(source, Dialect::from_options(&options))
    }

    #[test]
    fn test_end_position_after_terminator() {
        let options = ReaderOptions::default().with_buffer_size(4);
        let mut tokenizer = tokenizer("ab\ncd\nef", &options);
        let mut record = Record::new();
        let mut policy = ErrorPolicy::new(ParseErrorAction::ThrowException);
        let ctx = ReadContext {
            record_index: 0,
            declared_width: None,
        };
        tokenizer.read_record(&mut record, &ctx, &mut policy).expect("first");
        assert_eq!(record.end_position(), 3);
        tokenizer.read_record(&mut record, &ctx, &mut policy).expect("second");
        assert_eq!(record.end_position(), 2);
        tokenizer.read_record(&mut record, &ctx, &mut policy).expect("third");
        assert_eq!(record.end_position(), 0);
    }
}
