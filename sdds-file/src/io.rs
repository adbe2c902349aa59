//! Byte streams underneath a dataset.
//!
//! Inputs and outputs are plain files, the standard streams, or compressed files. Gzip and bzip2
//! are handled in process; xz and lzma go through an `xz` child process, which makes the stream
//! sequential only. [`InputStream::popen_used`] reports when that happened.

use std::fmt::{Display, Formatter};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use log::debug;
use sdds_error::{SddsResult, sdds_bail, sdds_err};

/// Where a dataset reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A file on disk.
    Path(PathBuf),
    /// Standard input when reading, standard output when writing.
    Pipe,
}

impl Location {
    /// The file path, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Location::Path(p) => Some(p),
            Location::Pipe => None,
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Location::Path(p) => write!(f, "{}", p.display()),
            Location::Pipe => write!(f, "<pipe>"),
        }
    }
}

impl From<&str> for Location {
    fn from(value: &str) -> Self {
        Location::Path(PathBuf::from(value))
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        Location::Path(PathBuf::from(value))
    }
}

impl From<&Path> for Location {
    fn from(value: &Path) -> Self {
        Location::Path(value.to_path_buf())
    }
}

impl From<PathBuf> for Location {
    fn from(value: PathBuf) -> Self {
        Location::Path(value)
    }
}

impl From<Option<PathBuf>> for Location {
    fn from(value: Option<PathBuf>) -> Self {
        value.map_or(Location::Pipe, Location::Path)
    }
}

/// Compression recognised from a file extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed.
    #[default]
    None,
    /// `.gz`
    Gzip,
    /// `.bz2`
    Bzip2,
    /// `.xz`
    Xz,
    /// `.lzma`
    Lzma,
}

impl Compression {
    /// The compression implied by a path's extension.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("gz") => Compression::Gzip,
            Some("bz2") => Compression::Bzip2,
            Some("xz") => Compression::Xz,
            Some("lzma") => Compression::Lzma,
            _ => Compression::None,
        }
    }

    /// Whether this crate can (de)compress the format without a child process.
    pub fn in_process(self) -> bool {
        matches!(self, Compression::None | Compression::Gzip | Compression::Bzip2)
    }

    /// The external program and its format flag.
    fn command(self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some(("gzip", &[])),
            Compression::Bzip2 => Some(("bzip2", &[])),
            Compression::Xz => Some(("xz", &[])),
            Compression::Lzma => Some(("xz", &["--format=lzma"])),
        }
    }
}

/// A buffered byte source.
pub struct InputStream {
    reader: Box<dyn BufRead>,
    child: Option<Child>,
    description: String,
}

impl InputStream {
    /// Open `location` for reading. With `force_subprocess`, compressed files are always read
    /// through a child process.
    pub fn open(location: &Location, force_subprocess: bool) -> SddsResult<Self> {
        let path = match location {
            Location::Pipe => {
                return Ok(Self {
                    reader: Box::new(BufReader::new(io::stdin())),
                    child: None,
                    description: location.to_string(),
                });
            }
            Location::Path(path) => path,
        };
        let compression = Compression::from_path(path);
        let description = location.to_string();
        if compression != Compression::None && (force_subprocess || !compression.in_process()) {
            return Self::spawn(path, compression, description);
        }
        let file = File::open(path)
            .map_err(|e| sdds_err!(NotFound: "unable to open {}: {}", path.display(), e))?;
        let reader: Box<dyn BufRead> = match compression {
            Compression::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(file))),
            Compression::Bzip2 => Box::new(BufReader::new(MultiBzDecoder::new(file))),
            _ => Box::new(BufReader::new(file)),
        };
        Ok(Self {
            reader,
            child: None,
            description,
        })
    }

    fn spawn(path: &Path, compression: Compression, description: String) -> SddsResult<Self> {
        let (program, format) = compression
            .command()
            .ok_or_else(|| sdds_err!("no decompressor for {}", path.display()))?;
        debug!("decompressing {} through {}", path.display(), program);
        let mut child = Command::new(program)
            .args(format)
            .arg("-dc")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| sdds_err!("unable to run {} for {}: {}", program, path.display(), e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| sdds_err!("{} has no standard output", program))?;
        Ok(Self {
            reader: Box::new(BufReader::new(stdout)),
            child: Some(child),
            description,
        })
    }

    /// True when a child process supplies the bytes; the stream cannot be reopened cheaply.
    pub fn popen_used(&self) -> bool {
        self.child.is_some()
    }

    /// What the stream reads from.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Release the stream, reaping any child process.
    pub fn close(mut self) -> SddsResult<()> {
        drop(self.reader);
        if let Some(mut child) = self.child.take() {
            // The child may be blocked writing output nobody reads any more.
            let _ = child.kill();
            child.wait()?;
        }
        Ok(())
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl BufRead for InputStream {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.reader.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.reader.consume(amt)
    }
}

/// A byte sink. Call [`OutputStream::finish`] to complete compressed output.
pub enum OutputStream {
    /// A plain file.
    File(BufWriter<File>),
    /// Standard output.
    Stdout(BufWriter<io::Stdout>),
    /// A gzip-compressed file.
    Gzip(GzEncoder<BufWriter<File>>),
    /// A bzip2-compressed file.
    Bzip2(BzEncoder<BufWriter<File>>),
    /// A compressor child process writing the file.
    Subprocess(Child, BufWriter<ChildStdin>),
}

impl OutputStream {
    /// Create or truncate `location` for writing, compressing by extension.
    pub fn create(location: &Location) -> SddsResult<Self> {
        Self::open(location, false)
    }

    /// Open `location` for appending. Compressed files cannot be appended to.
    pub fn append(location: &Location) -> SddsResult<Self> {
        Self::open(location, true)
    }

    fn open(location: &Location, append: bool) -> SddsResult<Self> {
        let path = match location {
            Location::Pipe => return Ok(OutputStream::Stdout(BufWriter::new(io::stdout()))),
            Location::Path(path) => path,
        };
        let compression = Compression::from_path(path);
        if append && compression != Compression::None {
            sdds_bail!(
                WrongState: "cannot append to compressed file {}",
                path.display()
            );
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|e| sdds_err!("unable to open {} for writing: {}", path.display(), e))?;
        Ok(match compression {
            Compression::None => OutputStream::File(BufWriter::new(file)),
            Compression::Gzip => OutputStream::Gzip(GzEncoder::new(
                BufWriter::new(file),
                flate2::Compression::default(),
            )),
            Compression::Bzip2 => OutputStream::Bzip2(BzEncoder::new(
                BufWriter::new(file),
                bzip2::Compression::default(),
            )),
            Compression::Xz | Compression::Lzma => {
                let (program, format) = compression
                    .command()
                    .ok_or_else(|| sdds_err!("no compressor for {}", path.display()))?;
                debug!("compressing {} through {}", path.display(), program);
                let mut child = Command::new(program)
                    .args(format)
                    .arg("-zc")
                    .stdin(Stdio::piped())
                    .stdout(Stdio::from(file))
                    .spawn()
                    .map_err(|e| {
                        sdds_err!("unable to run {} for {}: {}", program, path.display(), e)
                    })?;
                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| sdds_err!("{} has no standard input", program))?;
                OutputStream::Subprocess(child, BufWriter::new(stdin))
            }
        })
    }

    /// Flush everything and complete any compressed stream.
    pub fn finish(self) -> SddsResult<()> {
        match self {
            OutputStream::File(mut w) => w.flush()?,
            OutputStream::Stdout(mut w) => w.flush()?,
            OutputStream::Gzip(w) => w.finish()?.flush()?,
            OutputStream::Bzip2(w) => w.finish()?.flush()?,
            OutputStream::Subprocess(mut child, mut stdin) => {
                stdin.flush()?;
                drop(stdin);
                let status = child.wait()?;
                if !status.success() {
                    sdds_bail!("compressor exited with {}", status);
                }
            }
        }
        Ok(())
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputStream::File(w) => w.write(buf),
            OutputStream::Stdout(w) => w.write(buf),
            OutputStream::Gzip(w) => w.write(buf),
            OutputStream::Bzip2(w) => w.write(buf),
            OutputStream::Subprocess(_, w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputStream::File(w) => w.flush(),
            OutputStream::Stdout(w) => w.flush(),
            OutputStream::Gzip(w) => w.flush(),
            OutputStream::Bzip2(w) => w.flush(),
            OutputStream::Subprocess(_, w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("a.sdds", Compression::None)]
    #[case("a.sdds.gz", Compression::Gzip)]
    #[case("a.SDDS.BZ2", Compression::Bzip2)]
    #[case("a.xz", Compression::Xz)]
    #[case("a.lzma", Compression::Lzma)]
    fn extension(#[case] path: &str, #[case] expected: Compression) {
        assert_eq!(Compression::from_path(Path::new(path)), expected);
    }

    #[rstest]
    #[case("data.gz")]
    #[case("data.bz2")]
    #[case("data")]
    fn in_process_round_trip(#[case] name: &str) {
        let dir = tempfile::tempdir().unwrap();
        let location = Location::from(dir.path().join(name));
        let mut out = OutputStream::create(&location).unwrap();
        out.write_all(b"hello\nworld\n").unwrap();
        out.finish().unwrap();

        let mut input = InputStream::open(&location, false).unwrap();
        assert!(!input.popen_used());
        let mut text = String::new();
        input.read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello\nworld\n");
        input.close().unwrap();
    }

    #[test]
    fn append_refuses_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let location = Location::from(dir.path().join("x.gz"));
        assert!(OutputStream::append(&location).is_err());
    }
}
