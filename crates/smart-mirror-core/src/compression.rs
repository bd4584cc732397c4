use std::io::Read;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    Bzip2,
    Gzip,
}

impl Compression {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Bzip2 => ".bz2",
            Self::Gzip => ".gz",
        }
    }

    /// Corrupt input surfaces as an I/O error on read.
    pub fn decoder<'a, R: Read + 'a>(&self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            Self::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
            Self::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
        }
    }
}
