// storage/reader.rs
// Line-by-line record reader

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::document::{decode_line, is_filler, Document};
use crate::error::{io_at, LineBaseError, Result};

/// One decoded line. `line` borrows the reader's buffer, terminator stripped.
#[derive(Debug)]
pub struct RawRecord<'a> {
    pub line_no: usize,
    pub line: &'a str,
    pub document: Document,
}

/// Streams records out of a collection file, skipping blank lines.
///
/// A single line buffer is reused, so memory use is bounded by the longest
/// line rather than the file size.
pub struct RecordReader<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: usize,
}

impl RecordReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(io_at(path))?;
        Ok(RecordReader::new(BufReader::new(file)))
    }
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        RecordReader {
            reader,
            buf: Vec::with_capacity(256),
            line_no: 0,
        }
    }

    /// Lines consumed so far, filler included
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    /// Next record, or `None` at end of file.
    pub fn next_record(&mut self) -> Result<Option<RawRecord<'_>>> {
        let end = loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let mut end = self.buf.len();
            while end > 0 && matches!(self.buf[end - 1], b'\n' | b'\r') {
                end -= 1;
            }

            let blank = std::str::from_utf8(&self.buf[..end]).map_or(false, is_filler);
            if !blank {
                break end;
            }
        };

        let line_no = self.line_no;
        let raw = &self.buf[..end];
        let line = std::str::from_utf8(raw).map_err(|e| {
            LineBaseError::malformed(
                line_no,
                &String::from_utf8_lossy(raw),
                format!("invalid UTF-8: {}", e),
            )
        })?;

        let document = decode_line(line, line_no)?;
        Ok(Some(RawRecord {
            line_no,
            line,
            document,
        }))
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record()
            .map(|record| record.map(|r| r.document))
            .transpose()
    }
}
