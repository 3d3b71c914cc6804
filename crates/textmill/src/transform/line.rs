//! Line-level transform and a lazy, streaming adapter over a reader.

use std::io::{self, BufRead, Lines};

use super::word::{shuffle_inner_letters, Shuffler};

/// Scrambles every whitespace-delimited word of `line` and rejoins them with
/// single spaces.
///
/// A line without any words (empty or whitespace-only) is returned as is.
pub fn transform_line(line: &str, shuffler: &dyn Shuffler) -> String {
    let mut words = line.split_whitespace().peekable();
    if words.peek().is_none() {
        return line.to_string();
    }

    let mut out = String::with_capacity(line.len());
    for (i, word) in words.enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&shuffle_inner_letters(word, shuffler));
    }
    out
}

/// Lazily transforms the lines of a reader.
///
/// Each item is one transformed line terminated by `\n`. The trailing line
/// terminator of the source (`\n` or `\r\n`) is stripped before
/// transforming. Reading stops at the first error, which is yielded as is;
/// invalid UTF-8 surfaces as [`io::ErrorKind::InvalidData`].
pub struct TransformedLines<'s, R> {
    lines: Lines<R>,
    shuffler: &'s dyn Shuffler,
    failed: bool,
}

impl<'s, R: BufRead> TransformedLines<'s, R> {
    pub fn new(reader: R, shuffler: &'s dyn Shuffler) -> Self {
        Self {
            lines: reader.lines(),
            shuffler,
            failed: false,
        }
    }
}

impl<R: BufRead> Iterator for TransformedLines<'_, R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.lines.next()? {
            Ok(line) => {
                let mut out = transform_line(&line, self.shuffler);
                out.push('\n');
                Some(Ok(out))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
