use crate::parse::{LineReader, ParseError};
use std::io::BufRead;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PackageRecord {
    pub architecture: String,
    pub package: String,
    pub filename: String,
    pub size: i64,
}

// A line without a space is all key.
fn split_field(line: &str) -> (&str, &str) {
    match line.split_once(' ') {
        Some((key, value)) => (key, value),
        None => (line, ""),
    }
}

/// Reads one [PackageRecord] per stanza. Fields never carry over between stanzas.
pub struct PackageIndexReader<R: BufRead> {
    lines: LineReader<R>,
    finished: bool,
}

impl<R: BufRead> PackageIndexReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: LineReader::new(reader),
            finished: false,
        }
    }

    fn get_next(&mut self) -> Result<Option<PackageRecord>, ParseError> {
        let mut record = PackageRecord::default();
        let mut seen_field = false;

        while let Some(line) = self.lines.next_line()? {
            if line.trim().is_empty() {
                if seen_field {
                    return Ok(Some(record));
                }
                continue;
            }
            seen_field = true;

            let (key, value) = split_field(&line);
            match key {
                "Package:" => record.package = value.to_string(),
                "Architecture:" => record.architecture = value.to_string(),
                "Filename:" => record.filename = value.to_string(),
                "Size:" if value.trim().is_empty() => record.size = 0,
                "Size:" => {
                    record.size = value
                        .trim()
                        .parse::<i64>()
                        .ok()
                        .filter(|size| *size >= 0)
                        .ok_or_else(|| ParseError::InvalidSize {
                            line: self.lines.line_number(),
                            value: value.to_string(),
                        })?;
                }
                _ => {}
            }
        }

        self.finished = true;
        Ok(seen_field.then_some(record))
    }
}

impl<R: BufRead> Iterator for PackageIndexReader<R> {
    type Item = Result<PackageRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.get_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::packages::{PackageIndexReader, PackageRecord};
    use crate::parse::ParseError;

    fn read_all(input: &str) -> Vec<PackageRecord> {
        PackageIndexReader::new(input.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .expect("parse failed")
    }

    #[test]
    fn parses_single_stanza() {
        let records = read_all(
            "Package: foo\nArchitecture: amd64\nFilename: pool/main/f/foo/foo_1.0_amd64.deb\nSize: 1234\n\n",
        );
        assert_eq!(
            records,
            vec![PackageRecord {
                architecture: "amd64".to_string(),
                package: "foo".to_string(),
                filename: "pool/main/f/foo/foo_1.0_amd64.deb".to_string(),
                size: 1234,
            }]
        );
    }

    #[test]
    fn ignores_unknown_fields_and_continuations() {
        let records = read_all(
            "Package: bar\n\
             Priority: optional\n\
             Architecture: all\n\
             Description: a thing\n .\n  more text\n\
             Filename: pool/main/b/bar/bar_2_all.deb\n\
             Size: 7\n\
             MD5sum: abc\n\n",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].package, "bar");
        assert_eq!(records[0].architecture, "all");
        assert_eq!(records[0].filename, "pool/main/b/bar/bar_2_all.deb");
        assert_eq!(records[0].size, 7);
    }

    #[test]
    fn fields_reset_between_stanzas() {
        let records = read_all(
            "Package: one\nArchitecture: i386\nFilename: pool/one.deb\nSize: 1\n\n\
             Package: two\nSize: 2\n\n",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].package, "two");
        assert_eq!(records[1].architecture, "");
        assert_eq!(records[1].filename, "");
    }

    #[test]
    fn blank_runs_and_missing_trailing_blank() {
        let records = read_all(
            "\n\nPackage: a\nArchitecture: amd64\nFilename: a.deb\nSize: 1\n\n\n\n\
             Package: b\r\nArchitecture: amd64\r\nFilename: b.deb\r\nSize: 2",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].package, "a");
        assert_eq!(records[1].package, "b");
        assert_eq!(records[1].filename, "b.deb");
        assert_eq!(records[1].size, 2);
    }

    #[test]
    fn value_is_everything_after_first_space() {
        let records = read_all("Package: odd name\nFilename:\nSize: 3\n\n");
        assert_eq!(records[0].package, "odd name");
        assert_eq!(records[0].filename, "");
    }

    #[test]
    fn invalid_size_is_an_error() {
        let mut reader =
            PackageIndexReader::new("Package: a\nSize: lots\n\nPackage: b\n\n".as_bytes());
        match reader.next() {
            Some(Err(ParseError::InvalidSize { line, value })) => {
                assert_eq!(line, 2);
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn size_without_value_defaults_to_zero() {
        let records = read_all(
            "Package: foo\nArchitecture: amd64\nFilename: pool/foo.deb\nSize:\n\n\
             Package: bar\nArchitecture: amd64\nFilename: pool/bar.deb\nSize: 1\n\n",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].package, "foo");
        assert_eq!(records[0].size, 0);
        assert_eq!(records[1].package, "bar");
        assert_eq!(records[1].size, 1);
    }

    #[test]
    fn whitespace_only_line_separates_stanzas() {
        let records = read_all(
            "Package: a\nArchitecture: amd64\nFilename: a.deb\nSize: 1\n \t\n\
             Package: b\nArchitecture: amd64\nFilename: b.deb\nSize: 2\n",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].package, "a");
        assert_eq!(records[0].filename, "a.deb");
        assert_eq!(records[1].package, "b");
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(read_all("").is_empty());
        assert!(read_all("\n\n").is_empty());
    }
}
