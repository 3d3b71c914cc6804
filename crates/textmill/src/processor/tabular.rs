//! Delimited-row (CSV-like) processing with dialect detection.
//!
//! Each cell is scrambled as a single unit: only the first and last character
//! of the whole cell stay in place, even when the cell holds several words.

use std::io::{self, BufRead, BufReader, Cursor, Read, Write};
use std::sync::Arc;

use csv::{QuoteStyle, ReaderBuilder, StringRecord, Terminator, Writer, WriterBuilder};

use crate::error::ProcessError;
use crate::processor::{Extension, FileProcessor};
use crate::transform::{shuffle_inner_letters, RandomShuffler, Shuffler};

/// Bytes inspected to guess the dialect.
const SNIFF_BYTES: u64 = 8 * 1024;

const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];
const QUOTES: [u8; 2] = [b'"', b'\''];

/// Wrapped fields needed before `'` wins over the default `"`.
const MIN_QUOTED_FIELDS: usize = 2;

const BUFFER_SIZE: usize = 16 * 1024;

/// Delimiter, quoting and line terminator of a delimited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: u8,
    pub quote: u8,
    pub crlf: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            crlf: false,
        }
    }
}

impl Dialect {
    /// Guesses the dialect from the beginning of a file.
    ///
    /// `truncated` marks a sample that was cut off, so its last line is
    /// ignored.
    pub fn sniff(sample: &[u8], truncated: bool) -> Self {
        let mut lines: Vec<&[u8]> = sample.split(|b| *b == b'\n').collect();
        if truncated && lines.len() > 1 {
            lines.pop();
        }
        let lines: Vec<&[u8]> = lines
            .into_iter()
            .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
            .filter(|l| !l.is_empty())
            .collect();

        let quote = sniff_quote(&lines);
        let delimiter = sniff_delimiter(&lines, quote);

        Self {
            delimiter,
            quote,
            crlf: sample.windows(2).any(|w| w == b"\r\n"),
        }
    }

    fn terminator(&self) -> Terminator {
        if self.crlf {
            Terminator::CRLF
        } else {
            Terminator::Any(b'\n')
        }
    }

    fn line_ending(&self) -> &'static [u8] {
        if self.crlf {
            b"\r\n"
        } else {
            b"\n"
        }
    }
}

/// Picks `'` only when it wraps whole fields more often than `"` does, and
/// at least [`MIN_QUOTED_FIELDS`] times.
fn sniff_quote(lines: &[&[u8]]) -> u8 {
    let double = quoted_fields(lines, QUOTES[0]);
    let single = quoted_fields(lines, QUOTES[1]);
    if single >= MIN_QUOTED_FIELDS && single > double {
        QUOTES[1]
    } else {
        QUOTES[0]
    }
}

/// Counts fields that open and close with `quote`.
fn quoted_fields(lines: &[&[u8]], quote: u8) -> usize {
    let mut total = 0;
    for line in lines {
        let mut i = 0;
        while i < line.len() {
            let at_field_start = i == 0 || DELIMITERS.contains(&line[i - 1]);
            if line[i] != quote || !at_field_start {
                i += 1;
                continue;
            }
            let closing = (i + 1..line.len()).find(|&j| {
                line[j] == quote && (j + 1 == line.len() || DELIMITERS.contains(&line[j + 1]))
            });
            match closing {
                Some(j) => {
                    total += 1;
                    i = j + 1;
                }
                None => i += 1,
            }
        }
    }
    total
}

/// Picks the delimiter whose per-line count is most consistent.
fn sniff_delimiter(lines: &[&[u8]], quote: u8) -> u8 {
    let mut best = (0usize, DELIMITERS[0]);

    for candidate in DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_unquoted(line, candidate, quote))
            .collect();

        let Some(modal) = modal_count(&counts) else {
            continue;
        };
        let consistent = counts.iter().filter(|c| **c == modal).count();
        if consistent > best.0 {
            best = (consistent, candidate);
        }
    }

    best.1
}

fn count_unquoted(line: &[u8], needle: u8, quote: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for b in line {
        if *b == quote {
            in_quotes = !in_quotes;
        } else if *b == needle && !in_quotes {
            count += 1;
        }
    }
    count
}

/// Most frequent non-zero count, preferring the larger on ties.
fn modal_count(counts: &[usize]) -> Option<usize> {
    let mut tally: Vec<(usize, usize)> = Vec::new();
    for count in counts.iter().copied().filter(|c| *c > 0) {
        match tally.iter_mut().find(|(value, _)| *value == count) {
            Some((_, n)) => *n += 1,
            None => tally.push((count, 1)),
        }
    }
    tally
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
        .map(|(value, _)| value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowState {
    FieldStart,
    Field,
    Quoted,
    QuoteInQuoted,
}

impl RowState {
    fn next(self, b: u8, dialect: &Dialect) -> Self {
        match self {
            RowState::Quoted if b == dialect.quote => RowState::QuoteInQuoted,
            RowState::Quoted => RowState::Quoted,
            RowState::QuoteInQuoted if b == dialect.quote => RowState::Quoted,
            RowState::FieldStart if b == dialect.quote => RowState::Quoted,
            _ if b == dialect.delimiter || b == b'\n' => RowState::FieldStart,
            _ => RowState::Field,
        }
    }
}

/// Splits input into physical rows. A line break inside a quoted field
/// stays part of its row, so blank lines within a cell are not rows.
struct RowSplitter<R> {
    reader: R,
    dialect: Dialect,
}

impl<R: BufRead> RowSplitter<R> {
    /// Reads the next row, terminator included, into `row`.
    fn next_row(&mut self, row: &mut Vec<u8>) -> io::Result<bool> {
        row.clear();
        let mut state = RowState::FieldStart;
        loop {
            let start = row.len();
            if self.reader.read_until(b'\n', row)? == 0 {
                return Ok(!row.is_empty());
            }
            for &b in &row[start..] {
                state = state.next(b, &self.dialect);
            }
            if state != RowState::Quoted {
                return Ok(true);
            }
        }
    }
}

fn is_blank(row: &[u8]) -> bool {
    let row = row.strip_suffix(b"\n").unwrap_or(row);
    row.strip_suffix(b"\r").unwrap_or(row).is_empty()
}

fn count_newlines(bytes: &[u8]) -> u64 {
    bytes.iter().filter(|b| **b == b'\n').count() as u64
}

/// Delimited rows, transformed cell by cell.
pub struct CsvProcessor {
    extension: Extension,
    shuffler: Arc<dyn Shuffler>,
}

impl CsvProcessor {
    pub fn new() -> Self {
        Self::with_shuffler(Arc::new(RandomShuffler))
    }

    pub fn with_shuffler(shuffler: Arc<dyn Shuffler>) -> Self {
        Self {
            extension: Extension(".csv".to_string()),
            shuffler,
        }
    }
}

impl Default for CsvProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FileProcessor for CsvProcessor {
    fn extension(&self) -> &Extension {
        &self.extension
    }

    fn process(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<(), ProcessError> {
        let mut sample = Vec::new();
        Read::take(&mut *input, SNIFF_BYTES).read_to_end(&mut sample)?;
        let dialect = Dialect::sniff(&sample, sample.len() as u64 == SNIFF_BYTES);

        let source = Cursor::new(sample).chain(input);
        let mut rows = RowSplitter {
            reader: BufReader::with_capacity(BUFFER_SIZE, source),
            dialect,
        };

        let mut writer_builder = WriterBuilder::new();
        writer_builder
            .flexible(true)
            .delimiter(dialect.delimiter)
            .quote(dialect.quote)
            .quote_style(QuoteStyle::Necessary)
            .terminator(dialect.terminator());
        let mut writer = writer_builder.from_writer(output);

        let mut row = Vec::new();
        let mut line = 1;
        while rows.next_row(&mut row)? {
            if is_blank(&row) {
                // The csv writer renders an empty record as `""`.
                let out = writer.into_inner().map_err(|e| e.into_error())?;
                out.write_all(dialect.line_ending())?;
                writer = writer_builder.from_writer(out);
            } else {
                self.write_row(&row, line, &dialect, &mut writer)?;
            }
            line += count_newlines(&row);
        }

        writer.flush()?;
        Ok(())
    }
}

impl CsvProcessor {
    /// Transforms the records of one physical row starting at `line`.
    fn write_row<W: Write>(
        &self,
        row: &[u8],
        line: u64,
        dialect: &Dialect,
        writer: &mut Writer<W>,
    ) -> Result<(), ProcessError> {
        if let Err(e) = std::str::from_utf8(row) {
            return Err(ProcessError::Decode {
                line: line + count_newlines(&row[..e.valid_up_to()]),
                message: e.to_string(),
            });
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(dialect.delimiter)
            .quote(dialect.quote)
            .buffer_capacity(row.len().max(64))
            .from_reader(row);

        let mut record = StringRecord::new();
        while reader.read_record(&mut record)? {
            let cells = record
                .iter()
                .map(|cell| shuffle_inner_letters(cell, self.shuffler.as_ref()));
            writer.write_record(cells.map(|c| c.into_owned()))?;
        }
        Ok(())
    }
}
