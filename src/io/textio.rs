/*! Text file opening and line reading.

Files are transparently decompressed by name: `.gz`/`.tgz`, `.xz` and `.bz2`. Outputs can only be
plain or gzipped.
Lines are decoded lossily: invalid UTF-8 is replaced rather than failing a whole corpus.
!*/
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use xz2::read::XzDecoder;

use crate::error::Error;

/// Boxed buffered reader that can cross thread boundaries.
pub type TextReader = Box<dyn BufRead + Send>;

/// Compression of a file, from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    Plain,
    Gzip,
    Xz,
    Bzip2,
}

impl Codec {
    pub fn from_name(name: &str) -> Self {
        if name.ends_with(".gz") || name.ends_with(".tgz") {
            Codec::Gzip
        } else if name.ends_with(".xz") {
            Codec::Xz
        } else if name.ends_with(".bz2") {
            Codec::Bzip2
        } else {
            Codec::Plain
        }
    }
}

pub fn is_gzipped(name: &str) -> bool {
    Codec::from_name(name) == Codec::Gzip
}

/// Wraps `inner`, decompressing according to the suffix of `name`.
pub fn wrap_reader<R: Read + Send + 'static>(inner: R, name: &str) -> TextReader {
    match Codec::from_name(name) {
        Codec::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(inner))),
        Codec::Xz => Box::new(BufReader::new(XzDecoder::new_multi_decoder(inner))),
        Codec::Bzip2 => Box::new(BufReader::new(MultiBzDecoder::new(inner))),
        Codec::Plain => Box::new(BufReader::new(inner)),
    }
}

/// Opens a (possibly compressed) file for reading.
pub fn open_text(path: &Path) -> Result<TextReader, Error> {
    let file = File::open(path)?;
    Ok(wrap_reader(file, &path.to_string_lossy()))
}

/// Output text file, plain or gzipped.
///
/// [TextWriter::finish] must be called: it writes the gzip trailer and reports failures that
/// dropping the writer would swallow.
pub enum TextWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl TextWriter {
    pub fn new(file: File, gzip: bool) -> Self {
        let file = BufWriter::new(file);
        if gzip {
            TextWriter::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            TextWriter::Plain(file)
        }
    }

    /// Completes the stream and flushes it to the file.
    pub fn finish(self) -> Result<(), Error> {
        let mut file = match self {
            TextWriter::Plain(file) => file,
            TextWriter::Gzip(encoder) => encoder.finish()?,
        };
        file.flush()?;
        Ok(())
    }
}

impl Write for TextWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            TextWriter::Plain(w) => w.write(buf),
            TextWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            TextWriter::Plain(w) => w.flush(),
            TextWriter::Gzip(w) => w.flush(),
        }
    }
}

/// Creates a file for writing, gzip-compressed if its name ends with `.gz`.
pub fn create_text(path: &Path) -> Result<TextWriter, Error> {
    let name = path.to_string_lossy();
    let gzip = match Codec::from_name(&name) {
        Codec::Plain => false,
        Codec::Gzip => true,
        codec => {
            return Err(Error::Format(format!(
                "{name}: {codec:?} output is not supported, use .gz"
            )))
        }
    };
    Ok(TextWriter::new(File::create(path)?, gzip))
}

/// Reads the whole content as a (lossily decoded) string.
pub fn read_to_string(mut reader: TextReader) -> Result<String, Error> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(match String::from_utf8(buf) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

/// Line iterator that never fails on invalid UTF-8.
///
/// Trailing `\n` and `\r\n` are removed.
pub struct LossyLines {
    reader: TextReader,
    buf: Vec<u8>,
}

impl LossyLines {
    pub fn new(reader: TextReader) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(1024),
        }
    }
}

impl Iterator for LossyLines {
    type Item = Result<String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                if self.buf.ends_with(b"\n") {
                    self.buf.pop();
                    if self.buf.ends_with(b"\r") {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(Error::Io(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_lossy_lines() {
        let data: Vec<u8> = b"hello\r\nw\xffrld\nlast".to_vec();
        let lines: Vec<String> = LossyLines::new(wrap_reader(Cursor::new(data), "x.txt"))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(lines, vec!["hello", "w\u{fffd}rld", "last"]);
    }

    #[test]
    fn test_gz_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt.gz");
        let mut w = create_text(&path).unwrap();
        w.write_all(b"one\ntwo\n").unwrap();
        w.finish().unwrap();
        let lines: Vec<String> = LossyLines::new(open_text(&path).unwrap())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_codec() {
        assert_eq!(Codec::from_name("a.tsv.gz"), Codec::Gzip);
        assert_eq!(Codec::from_name("de-en.tgz"), Codec::Gzip);
        assert_eq!(Codec::from_name("dcep.tsv.xz"), Codec::Xz);
        assert_eq!(Codec::from_name("x.en.bz2"), Codec::Bzip2);
        assert_eq!(Codec::from_name("x.en"), Codec::Plain);
    }

    #[test]
    fn test_xz_and_bz2() {
        let dir = tempdir().unwrap();
        let xz = dir.path().join("a.tsv.xz");
        let mut enc = xz2::write::XzEncoder::new(File::create(&xz).unwrap(), 6);
        enc.write_all(b"Hallo\tHello\n").unwrap();
        enc.finish().unwrap();
        let content = read_to_string(open_text(&xz).unwrap()).unwrap();
        assert_eq!(content, "Hallo\tHello\n");

        let bz = dir.path().join("a.txt.bz2");
        let mut enc =
            bzip2::write::BzEncoder::new(File::create(&bz).unwrap(), bzip2::Compression::default());
        enc.write_all(b"Ja\n").unwrap();
        enc.finish().unwrap();
        let content = read_to_string(open_text(&bz).unwrap()).unwrap();
        assert_eq!(content, "Ja\n");
    }

    #[test]
    fn test_unsupported_output() {
        let dir = tempdir().unwrap();
        let res = create_text(&dir.path().join("train.eng.xz"));
        assert!(matches!(res, Err(Error::Format(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_finish_reports_write_errors() {
        let full = match std::fs::OpenOptions::new().write(true).open("/dev/full") {
            Ok(f) => f,
            Err(_) => return,
        };
        let mut w = TextWriter::new(full, true);
        // small enough to stay buffered until the stream is completed
        w.write_all(b"some text\n").unwrap();
        assert!(w.finish().is_err());
    }
}
