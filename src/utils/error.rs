use std::error::Error;
use std::fmt;
use std::io;
use std::num::{ParseFloatError, ParseIntError};
use std::str::Utf8Error;
use std::string::FromUtf8Error;

use crate::buffer::ReadBuffer;

/// Broad classes of failure; callers can match on these to tell
/// setup-time problems apart from mid-stream ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The underlying source could not be opened or read
    Io,
    /// The first bytes are neither BAM nor gzip and no custom decompressor was given
    UnrecognizedFormat,
    /// The decompressed stream does not start with `BAM\x01`
    InvalidMagic,
    /// The stream ended inside the binary header
    TruncatedHeader,
    /// A bgzip member could not be inflated by any strategy
    CorruptBlock,
    /// A record declared more bytes than the stream had left
    TruncatedRecord,
    /// A requested field is not part of the vocabulary
    UnknownField,
    /// An optional field used a type code we can't decode
    UnknownTagType,
    /// Framed data that doesn't make sense (bad lengths, bad ids, bad columns)
    InvalidData,
    /// An external decompressor failed to start or exited badly
    Decompressor,
    /// Invalid reader configuration
    Config,
}

#[derive(Debug)]
pub struct BamError {
    pub kind: ErrorKind,
    pub msg: String,
    /// Offset into the decompressed stream, if known
    pub byte: Option<u64>,
    /// Index of the record being read, if known
    pub record: Option<u64>,
    orig_err: Option<Box<dyn Error + Send + Sync>>,
}

impl BamError {
    pub fn new<T>(kind: ErrorKind, msg: T) -> Self
    where
        T: Into<String>,
    {
        BamError {
            kind,
            msg: msg.into(),
            byte: None,
            record: None,
            orig_err: None,
        }
    }

    pub fn fill_pos(mut self, reader: &ReadBuffer) -> Self {
        let (record_pos, byte_pos) = reader.get_pos();
        self.record = Some(record_pos);
        self.byte = Some(byte_pos);
        self
    }

    /// Prefix the message with what we were doing when it failed.
    pub fn with_context<T>(mut self, context: T) -> Self
    where
        T: Into<String>,
    {
        self.msg = format!("{}: {}", context.into(), self.msg);
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Wrap this error so it can cross a `Read` implementation.
    pub(crate) fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, self)
    }
}

impl fmt::Display for BamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)?;
        match (self.record, self.byte) {
            (Some(r), Some(b)) => write!(f, " (record {}, byte {})", r, b),
            (Some(r), None) => write!(f, " (record {})", r),
            (None, Some(b)) => write!(f, " (byte {})", b),
            (None, None) => Ok(()),
        }
    }
}

impl Error for BamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.orig_err
            .as_ref()
            .map(|c| &**c as &(dyn Error + 'static))
    }
}

impl From<&str> for BamError {
    fn from(error: &str) -> Self {
        BamError::new(ErrorKind::InvalidData, error)
    }
}

impl From<String> for BamError {
    fn from(msg: String) -> Self {
        BamError::new(ErrorKind::InvalidData, msg)
    }
}

impl From<io::Error> for BamError {
    fn from(error: io::Error) -> Self {
        // errors raised inside our own `Read` impls come back wrapped
        if error.get_ref().map_or(false, |e| e.is::<BamError>()) {
            if let Some(inner) = error.into_inner() {
                if let Ok(err) = inner.downcast::<BamError>() {
                    return *err;
                }
            }
            return BamError::new(ErrorKind::Io, "unreadable wrapped error");
        }
        BamError {
            kind: ErrorKind::Io,
            msg: error.to_string(),
            byte: None,
            record: None,
            orig_err: Some(Box::new(error)),
        }
    }
}

macro_rules! impl_from_parse_error {
    ($err:ty) => {
        impl From<$err> for BamError {
            fn from(error: $err) -> Self {
                BamError {
                    kind: ErrorKind::InvalidData,
                    msg: error.to_string(),
                    byte: None,
                    record: None,
                    orig_err: Some(Box::new(error)),
                }
            }
        }
    };
}

impl_from_parse_error!(Utf8Error);
impl_from_parse_error!(FromUtf8Error);
impl_from_parse_error!(ParseIntError);
impl_from_parse_error!(ParseFloatError);
