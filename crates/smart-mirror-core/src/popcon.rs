use crate::parse::{LineReader, ParseError};
use std::io::BufRead;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PopconRecord {
    pub package: String,
    pub category: String,
    pub installs: i64,
}

/// Reads `rank name installs ...` rows of a popcon `by_inst` report.
pub struct PopconReader<R: BufRead> {
    lines: LineReader<R>,
    category: String,
    finished: bool,
}

impl<R: BufRead> PopconReader<R> {
    pub fn new(reader: R, category: impl Into<String>) -> Self {
        Self {
            lines: LineReader::new(reader),
            category: category.into(),
            finished: false,
        }
    }

    fn get_next(&mut self) -> Result<Option<PopconRecord>, ParseError> {
        while let Some(line) = self.lines.next_line()? {
            if line.trim().is_empty() || line.starts_with('#') || line.starts_with('-') {
                continue;
            }

            let mut fields = line.split_whitespace();
            let (package, installs) = match (fields.next(), fields.next(), fields.next()) {
                (Some(_), Some(package), Some(installs)) => (package, installs),
                _ => {
                    return Err(ParseError::MalformedPopconLine {
                        line: self.lines.line_number(),
                        content: line.clone(),
                    })
                }
            };

            if package == "Total" {
                continue;
            }

            let installs =
                installs
                    .parse::<i64>()
                    .map_err(|_| ParseError::InvalidInstallCount {
                        line: self.lines.line_number(),
                        value: installs.to_string(),
                    })?;

            return Ok(Some(PopconRecord {
                package: package.to_string(),
                category: self.category.clone(),
                installs,
            }));
        }

        Ok(None)
    }
}

impl<R: BufRead> Iterator for PopconReader<R> {
    type Item = Result<PopconRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.get_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
