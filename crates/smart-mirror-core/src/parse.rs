use std::io::BufRead;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read input: {0}")]
    Read(#[from] std::io::Error),
    #[error("line {line}: invalid Size value {value:?}")]
    InvalidSize { line: usize, value: String },
    #[error("line {line}: expected at least 3 fields in popcon row {content:?}")]
    MalformedPopconLine { line: usize, content: String },
    #[error("line {line}: invalid install count {value:?}")]
    InvalidInstallCount { line: usize, value: String },
}

// Lines are decoded lossily and lose their `\n` or `\r\n` terminator.
pub(crate) struct LineReader<R: BufRead> {
    reader: R,
    line_number: usize,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            buf: Vec::new(),
        }
    }

    pub(crate) fn line_number(&self) -> usize {
        self.line_number
    }

    pub(crate) fn next_line(&mut self) -> Result<Option<String>, ParseError> {
        self.buf.clear();
        let bytes_read = self.reader.read_until(b'\n', &mut self.buf)?;
        if bytes_read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
    }
}
