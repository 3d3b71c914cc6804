use std::io::{BufReader, ErrorKind, Read, Write};
use std::sync::Arc;

use crate::error::ProcessError;
use crate::processor::{Extension, FileProcessor};
use crate::transform::{RandomShuffler, Shuffler, TransformedLines};

const BUFFER_SIZE: usize = 16 * 1024;

/// Plain UTF-8 text, transformed line by line.
pub struct TextProcessor {
    extension: Extension,
    shuffler: Arc<dyn Shuffler>,
}

impl TextProcessor {
    pub fn new() -> Self {
        Self::with_shuffler(Arc::new(RandomShuffler))
    }

    pub fn with_shuffler(shuffler: Arc<dyn Shuffler>) -> Self {
        Self {
            extension: Extension(".txt".to_string()),
            shuffler,
        }
    }
}

impl Default for TextProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FileProcessor for TextProcessor {
    fn extension(&self) -> &Extension {
        &self.extension
    }

    fn process(&self, input: &mut dyn Read, output: &mut dyn Write) -> Result<(), ProcessError> {
        let reader = BufReader::with_capacity(BUFFER_SIZE, input);

        for (index, line) in TransformedLines::new(reader, self.shuffler.as_ref()).enumerate() {
            let line = line.map_err(|e| match e.kind() {
                ErrorKind::InvalidData => ProcessError::Decode {
                    line: index as u64 + 1,
                    message: e.to_string(),
                },
                _ => ProcessError::Io(e),
            })?;
            output.write_all(line.as_bytes())?;
        }

        output.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::ReverseShuffler;
    use std::io::Cursor;

    fn run(processor: &TextProcessor, input: &[u8]) -> Result<String, ProcessError> {
        let mut output = Vec::new();
        processor.process(&mut Cursor::new(input), &mut output)?;
        Ok(String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_process_text() {
        let processor = TextProcessor::with_shuffler(Arc::new(ReverseShuffler));
        let output = run(&processor, b"Hello, World!\nThis is a test document.\n").unwrap();
        assert_eq!(output, "Holle, Wdlro!\nTihs is a tset dtnemuco.\n");
    }

    #[test]
    fn test_short_words_round_trip() {
        let processor = TextProcessor::new();
        let input = "a bb ccc\nthe cat sat on a mat\n\n   \n";
        assert_eq!(run(&processor, input.as_bytes()).unwrap(), input);
    }

    #[test]
    fn test_crlf_normalized() {
        let processor = TextProcessor::new();
        assert_eq!(run(&processor, b"one\r\ntwo\r\n").unwrap(), "one\ntwo\n");
    }

    #[test]
    fn test_empty_input() {
        let processor = TextProcessor::new();
        assert_eq!(run(&processor, b"").unwrap(), "");
    }

    #[test]
    fn test_invalid_utf8_reports_line() {
        let processor = TextProcessor::new();
        let err = run(&processor, b"ok\nstill ok\n\xc3\x28 bad\n").unwrap_err();
        match err {
            ProcessError::Decode { line, .. } => assert_eq!(line, 3),
            other => panic!("Expected Decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_extension() {
        assert_eq!(TextProcessor::new().extension().as_str(), ".txt");
    }
}
