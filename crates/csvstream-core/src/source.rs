//! Fixed-capacity char buffer over a decoded byte stream.
//!
//! Every fill holds exactly `capacity` chars unless the stream ends first, so
//! the offset of a char inside its fill depends only on the input and the
//! capacity. This is what makes reported error positions reproducible.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use encoding_rs::{CoderResult, Decoder, Encoding};

use crate::error::Result;

const READ_CHUNK: usize = 8 * 1024;

pub(crate) struct BufferedSource<R> {
    reader: Option<R>,
    decoder: Decoder,
    scratch: Box<[u8]>,
    pending: VecDeque<char>,
    input_done: bool,
    buffer: Vec<char>,
    capacity: usize,
    pos: usize,
    eof: bool,
    fills: u64,
}

impl<R: Read> BufferedSource<R> {
    /// Wrap `reader`; the decoder sniffs and strips a BOM before falling back
    /// to `encoding`.
    pub(crate) fn new(reader: R, capacity: usize, encoding: &'static Encoding) -> Self {
        Self {
            reader: Some(reader),
            decoder: encoding.new_decoder(),
            scratch: vec![0; READ_CHUNK].into_boxed_slice(),
            pending: VecDeque::new(),
            input_done: false,
            buffer: Vec::with_capacity(capacity),
            capacity,
            pos: 0,
            eof: false,
            fills: 0,
        }
    }

    /// Next char without consuming it, refilling when the fill is used up.
    pub(crate) fn peek(&mut self) -> Result<Option<char>> {
        if self.pos >= self.buffer.len() && !self.fill()? {
            return Ok(None);
        }
        Ok(Some(self.buffer[self.pos]))
    }

    /// Consume the char returned by the last [`peek`](Self::peek).
    pub(crate) fn bump(&mut self) {
        debug_assert!(self.pos < self.buffer.len());
        self.pos += 1;
    }

    /// Refill if the current fill is used up. Returns false at end of stream.
    pub(crate) fn ensure_available(&mut self) -> Result<bool> {
        if self.pos < self.buffer.len() {
            return Ok(true);
        }
        self.fill()
    }

    /// Offset of the next char inside the current fill.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Content of the current fill.
    pub(crate) fn snapshot(&self) -> String {
        self.buffer.iter().collect()
    }

    #[cfg(test)]
    fn is_eof(&self) -> bool {
        self.eof
    }

    /// Drop the underlying reader. Later reads behave as end of stream.
    pub(crate) fn close(&mut self) {
        self.reader = None;
        self.pending.clear();
        self.buffer.clear();
        self.pos = 0;
        self.input_done = true;
        self.eof = true;
    }

    fn fill(&mut self) -> Result<bool> {
        self.buffer.clear();
        self.pos = 0;
        if self.eof {
            return Ok(false);
        }
        while self.buffer.len() < self.capacity {
            if let Some(ch) = self.pending.pop_front() {
                self.buffer.push(ch);
            } else if !self.decode_more()? {
                break;
            }
        }
        if self.buffer.is_empty() {
            self.eof = true;
            tracing::trace!(fills = self.fills, "end of stream");
            return Ok(false);
        }
        self.fills += 1;
        tracing::trace!(fill = self.fills, chars = self.buffer.len(), "refilled buffer");
        Ok(true)
    }

    /// Decode another chunk into `pending`. Returns false once the input is
    /// exhausted and flushed.
    fn decode_more(&mut self) -> Result<bool> {
        loop {
            if self.input_done {
                return Ok(false);
            }
            let Some(reader) = self.reader.as_mut() else {
                self.input_done = true;
                return Ok(false);
            };
            let read = loop {
                match reader.read(&mut self.scratch) {
                    Ok(read) => break read,
                    Err(error) if error.kind() == ErrorKind::Interrupted => {}
                    Err(error) => return Err(error.into()),
                }
            };
            let last = read == 0;
            let mut decoded = String::with_capacity(utf8_capacity(&self.decoder, read));
            decode_into(&mut self.decoder, &self.scratch[..read], &mut decoded, last);
            if last {
                self.input_done = true;
            }
            if !decoded.is_empty() {
                self.pending.extend(decoded.chars());
                return Ok(true);
            }
        }
    }
}

fn utf8_capacity(decoder: &Decoder, byte_length: usize) -> usize {
    decoder
        .max_utf8_buffer_length(byte_length)
        .unwrap_or(byte_length * 3 + 16)
}

/// Decode all of `bytes`, growing `decoded` whenever the decoder reports it full.
fn decode_into(decoder: &mut Decoder, mut bytes: &[u8], decoded: &mut String, last: bool) {
    loop {
        let (result, consumed, _) = decoder.decode_to_string(bytes, decoded, last);
        bytes = &bytes[consumed..];
        match result {
            CoderResult::InputEmpty => return,
            CoderResult::OutputFull => {
                decoded.reserve(utf8_capacity(decoder, bytes.len()).max(4));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<R: Read>(source: &mut BufferedSource<R>) -> (String, Vec<usize>) {
        let mut text = String::new();
        let mut positions = Vec::new();
        while let Some(ch) = source.peek().expect("peek") {
            positions.push(source.position());
            text.push(ch);
            source.bump();
        }
        (text, positions)
    }

    #[test]
    fn test_fills_are_full_capacity() {
        let mut source = BufferedSource::new("abcdefghij".as_bytes(), 4, encoding_rs::UTF_8);
        let (text, positions) = drain(&mut source);
        assert_eq!(text, "abcdefghij");
        assert_eq!(positions, vec![0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);
        assert!(source.is_eof());
        assert_eq!(source.position(), 0);
        assert_eq!(source.snapshot(), "");
    }

    #[test]
    fn test_small_reads_do_not_shorten_fills() {
        struct Trickle<'a>(&'a [u8]);
        impl Read for Trickle<'_> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let Some((first, rest)) = self.0.split_first() else {
                    return Ok(0);
                };
                buf[0] = *first;
                self.0 = rest;
                Ok(1)
            }
        }
        let mut source = BufferedSource::new(Trickle(b"abcdef"), 4, encoding_rs::UTF_8);
        assert_eq!(source.peek().expect("peek"), Some('a'));
        assert_eq!(source.snapshot(), "abcd");
    }

    #[test]
    fn test_utf8_bom_is_removed() {
        let mut source =
            BufferedSource::new(&b"\xEF\xBB\xBFa,b"[..], 16, encoding_rs::UTF_8);
        let (text, _) = drain(&mut source);
        assert_eq!(text, "a,b");
    }

    #[test]
    fn test_multibyte_chars_count_once() {
        let mut source = BufferedSource::new("é,ü".as_bytes(), 2, encoding_rs::UTF_8);
        let (text, positions) = drain(&mut source);
        assert_eq!(text, "é,ü");
        assert_eq!(positions, vec![0, 1, 0]);
    }

    #[test]
    fn test_legacy_encoding() {
        let bytes = [0x63, 0x61, 0x66, 0xE9];
        let mut source = BufferedSource::new(&bytes[..], 16, encoding_rs::WINDOWS_1252);
        let (text, _) = drain(&mut source);
        assert_eq!(text, "café");
    }

    #[test]
    fn test_decode_grows_full_output() {
        let mut decoder = encoding_rs::UTF_8.new_decoder_without_bom_handling();
        let mut decoded = String::new();
        decode_into(&mut decoder, "naïve café, €5".as_bytes(), &mut decoded, true);
        assert_eq!(decoded, "naïve café, €5");
    }

    #[test]
    fn test_close_behaves_as_end_of_stream() {
        let mut source = BufferedSource::new("abc".as_bytes(), 2, encoding_rs::UTF_8);
        assert_eq!(source.peek().expect("peek"), Some('a'));
        source.close();
        assert_eq!(source.peek().expect("peek"), None);
        assert!(!source.ensure_available().expect("ensure"));
    }
}
