use std::env;
use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use log::debug;

use crate::utils::error::{BamError, ErrorKind};

/// Number of bytes sniffed off the front of a stream to pick a decoder
pub const MAGIC_LEN: usize = 4;

/// Where the raw (possibly compressed) bytes come from.
pub enum Source {
    /// A file on disk; external decompressors are handed the path directly
    Path(PathBuf),
    /// Any already-open readable stream
    Handle(Box<dyn Read + Send>),
    /// The process's standard input
    Stdin,
}

impl Source {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Source::Path(path.as_ref().to_path_buf())
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Source::Handle(Box::new(reader))
    }

    /// Open the source and read its first bytes without losing them.
    pub fn open(self) -> Result<OpenSource, BamError> {
        let (path, mut reader): (Option<PathBuf>, Box<dyn Read + Send>) = match self {
            Source::Path(path) => {
                let file = File::open(&path).map_err(|e| {
                    BamError::from(e).with_context(format!("could not open {}", path.display()))
                })?;
                (Some(path), Box::new(file))
            }
            Source::Handle(reader) => (None, reader),
            Source::Stdin => (None, Box::new(io::stdin())),
        };
        let magic = read_magic(&mut reader)?;
        let (name, directory) = describe(path.as_deref());
        debug!("opened {} ({} magic bytes)", name, magic.len());
        Ok(OpenSource {
            magic,
            reader,
            path,
            name,
            directory,
        })
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Source::Handle(_) => f.write_str("Handle"),
            Source::Stdin => f.write_str("Stdin"),
        }
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::from_path(path)
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        if path == "-" {
            Source::Stdin
        } else {
            Source::from_path(path)
        }
    }
}

/// A source that has been opened and sniffed.
pub struct OpenSource {
    /// Up to `MAGIC_LEN` bytes; shorter only if the stream itself is
    pub magic: Vec<u8>,
    /// The rest of the stream after `magic`
    pub reader: Box<dyn Read + Send>,
    pub path: Option<PathBuf>,
    /// Base name of the file, or `<stdin>` for streams
    pub name: String,
    /// Directory holding the file, or the working directory for streams
    pub directory: String,
}

impl OpenSource {
    /// The whole stream again, magic bytes included.
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        Box::new(Cursor::new(self.magic).chain(self.reader))
    }
}

impl fmt::Debug for OpenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSource")
            .field("magic", &self.magic)
            .field("path", &self.path)
            .field("name", &self.name)
            .finish()
    }
}

fn read_magic(reader: &mut dyn Read) -> Result<Vec<u8>, BamError> {
    let mut magic = [0; MAGIC_LEN];
    let mut amt = 0;
    while amt < MAGIC_LEN {
        match reader.read(&mut magic[amt..]) {
            Ok(0) => break,
            Ok(n) => amt += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(BamError::from(e).with_context("could not read from input")),
        }
    }
    Ok(magic[..amt].to_vec())
}

fn describe(path: Option<&Path>) -> (String, String) {
    let cwd = || {
        env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    };
    match path {
        Some(path) => {
            let full = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            let name = full
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let directory = full
                .parent()
                .map(|d| d.display().to_string())
                .unwrap_or_else(cwd);
            (name, directory)
        }
        None => ("<stdin>".to_string(), cwd()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_handle_magic_is_kept() -> Result<(), BamError> {
        let src = Source::from_reader(Cursor::new(b"BAM\x01rest".to_vec()));
        let opened = src.open()?;
        assert_eq!(opened.magic, b"BAM\x01");
        assert_eq!(opened.name, "<stdin>");
        let mut all = Vec::new();
        opened.into_reader().read_to_end(&mut all)?;
        assert_eq!(all, b"BAM\x01rest");
        Ok(())
    }

    #[test]
    fn test_short_stream() -> Result<(), BamError> {
        let opened = Source::from_reader(Cursor::new(b"@".to_vec())).open()?;
        assert_eq!(opened.magic, b"@");
        Ok(())
    }

    #[test]
    fn test_path_source() -> Result<(), BamError> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(b"@HD\tVN:1.6\n")?;
        let opened = Source::from_path(file.path()).open()?;
        assert_eq!(opened.magic, b"@HD\t");
        assert!(opened.path.is_some());
        assert!(!opened.name.is_empty());
        Ok(())
    }

    #[test]
    fn test_missing_path() {
        let err = Source::from("/nonexistent/definitely/not.bam").open().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
