//! Opening export documents for reading and writing.
//!
//! Paths ending in `.bz2` are (de)compressed on the fly; `-` or a missing
//! path means stdin/stdout.

use crate::config::{INPUT_BUFFER_SIZE, OUTPUT_BUFFER_SIZE};
use crate::error::{RemapError, Result};
use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Stdout, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Path(PathBuf),
    Stdin,
}

impl InputSource {
    pub fn from_arg(arg: Option<&str>) -> Self {
        match arg {
            None | Some("-") => Self::Stdin,
            Some(path) => Self::Path(PathBuf::from(path)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            Self::Stdin => None,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Path(p) => p.display().to_string(),
            Self::Stdin => "<stdin>".to_string(),
        }
    }

    /// Opens the source for the controlling pass.
    pub fn open(&self) -> Result<Box<dyn BufRead>> {
        match self {
            Self::Path(path) => open_path(path),
            Self::Stdin => Ok(Box::new(io::stdin().lock())),
        }
    }

    /// Opens an independent handle for a pre-scan. Stdin can only be read
    /// once, so it yields [`RemapError::UnreadableInput`].
    pub fn reopen(&self) -> Result<Box<dyn BufRead>> {
        match self {
            Self::Path(path) => open_path(path),
            Self::Stdin => Err(RemapError::UnreadableInput {
                source_name: self.name(),
            }),
        }
    }
}

fn open_path(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if is_bz2(path) {
        let decoder = MultiBzDecoder::new(file);
        Ok(Box::new(BufReader::with_capacity(INPUT_BUFFER_SIZE, decoder)))
    } else {
        Ok(Box::new(BufReader::with_capacity(INPUT_BUFFER_SIZE, file)))
    }
}

fn is_bz2(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "bz2")
}

/// Destination of the rewritten document.
pub enum OutputSink {
    Plain(BufWriter<File>),
    Bz2(BzEncoder<BufWriter<File>>),
    Stdout(BufWriter<Stdout>),
}

impl OutputSink {
    pub fn create(arg: Option<&str>) -> Result<Self> {
        let path = match arg {
            None | Some("-") => {
                return Ok(Self::Stdout(BufWriter::with_capacity(
                    OUTPUT_BUFFER_SIZE,
                    io::stdout(),
                )))
            }
            Some(path) => Path::new(path),
        };
        let file = BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, File::create(path)?);
        if is_bz2(path) {
            Ok(Self::Bz2(BzEncoder::new(file, Compression::default())))
        } else {
            Ok(Self::Plain(file))
        }
    }

    /// Flushes buffers and writes the compression trailer, if any.
    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::Plain(mut w) => w.flush(),
            Self::Bz2(encoder) => encoder.finish()?.flush(),
            Self::Stdout(mut w) => w.flush(),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Bz2(w) => w.write(buf),
            Self::Stdout(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Bz2(w) => w.flush(),
            Self::Stdout(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::read::BzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn dash_means_stdin() {
        assert_eq!(InputSource::from_arg(Some("-")), InputSource::Stdin);
        assert_eq!(InputSource::from_arg(None), InputSource::Stdin);
        assert_eq!(
            InputSource::from_arg(Some("dump.xml")),
            InputSource::Path(PathBuf::from("dump.xml"))
        );
    }

    #[test]
    fn stdin_cannot_be_reopened() {
        let err = InputSource::Stdin.reopen().err().unwrap();
        assert!(matches!(err, RemapError::UnreadableInput { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn bz2_output_roundtrips_through_input() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.xml.bz2");
        let path_str = path.to_str().unwrap();

        let mut sink = OutputSink::create(Some(path_str)).unwrap();
        sink.write_all(b"<mediawiki/>").unwrap();
        sink.finish().unwrap();

        let mut raw = Vec::new();
        BzDecoder::new(File::open(&path).unwrap())
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw, b"<mediawiki/>");

        let mut text = String::new();
        InputSource::from_arg(Some(path_str))
            .reopen()
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "<mediawiki/>");
    }

    #[test]
    fn missing_file_is_io_error() {
        let source = InputSource::from_arg(Some("/nonexistent/dump.xml"));
        assert!(matches!(source.open().err().unwrap(), RemapError::Io(_)));
    }
}
