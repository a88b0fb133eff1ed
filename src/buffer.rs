use std::borrow::Cow;
use std::fmt;
use std::io::{Cursor, Read};
use std::mem::swap;
use std::ops::{Index, Range, RangeFrom, RangeFull, RangeTo};

use byteorder::{ByteOrder, LittleEndian};
use memchr::memchr;

use crate::utils::error::BamError;

/// Default buffer size; grows if a single record is bigger than this
pub const BUFFER_SIZE: usize = 64 * 1024;

/// Wraps a Box<Read> to allow buffered reading
///
/// Primary differences from Rust's built-in BufReader:
///  - residual in buffer is maintained between `fill_buf`s
///  - buffer will be expanded if not enough data present to parse
///  - EOF state is tracked
pub struct ReadBuffer<'s> {
    /// The primary buffer; reloaded from `reader` when needed
    pub buffer: Cow<'s, [u8]>,
    /// The stream to read from
    reader: Box<dyn Read + 's>,
    /// How much we try to hold in `buffer` on each refill
    capacity: usize,
    /// The total amount of data read before byte 0 of this buffer (used for error messages)
    pub reader_pos: u64,
    /// The total number of records consumed (used for error messages)
    pub record_pos: u64,
    /// The amount of this buffer that's been marked as used
    pub consumed: usize,
    /// Is this the last chunk before EOF?
    pub eof: bool,
}

impl<'s> ReadBuffer<'s> {
    /// Create a new ReadBuffer from the `reader` using the default size.
    pub fn new(reader: Box<dyn Read + 's>) -> Result<Self, BamError> {
        Self::with_capacity(BUFFER_SIZE, reader)
    }

    /// Create a new ReadBuffer from the `reader` using the size provided
    pub fn with_capacity(buffer_size: usize, reader: Box<dyn Read + 's>) -> Result<Self, BamError> {
        let mut rb = ReadBuffer {
            buffer: Cow::Owned(Vec::with_capacity(buffer_size)),
            reader,
            capacity: buffer_size.max(1),
            reader_pos: 0,
            record_pos: 0,
            consumed: 0,
            eof: false,
        };
        rb.refill()?;
        Ok(rb)
    }

    pub fn from_slice(slice: &'s [u8]) -> Self {
        ReadBuffer {
            buffer: Cow::Borrowed(slice),
            reader: Box::new(Cursor::new(b"")),
            capacity: slice.len(),
            reader_pos: 0,
            record_pos: 0,
            consumed: 0,
            eof: true,
        }
    }

    /// Refill the buffer from the `reader`; if the buffer is full and nothing
    /// has been consumed the buffer's size is doubled first.
    pub fn refill(&mut self) -> Result<(), BamError> {
        if self.eof {
            return Ok(());
        }

        // pull the buffer out; a Borrowed buffer is always at eof so we
        // shouldn't ever be copying one here
        let mut tmp_buffer = Cow::Borrowed(&b""[..]);
        swap(&mut self.buffer, &mut tmp_buffer);
        let mut buffer = tmp_buffer.into_owned();

        // track how much data was in the reader before the data in the buffer
        self.reader_pos += self.consumed as u64;

        // drop the old data off the front of the buffer
        buffer.drain(..self.consumed);
        self.consumed = 0;
        let len = buffer.len();
        if len >= self.capacity {
            self.capacity *= 2;
        }

        buffer.resize(self.capacity, 0);
        let amt_read = match self.reader.read(&mut buffer[len..]) {
            Ok(amt) => amt,
            Err(e) => {
                buffer.truncate(len);
                self.buffer = Cow::Owned(buffer);
                return Err(BamError::from(e).fill_pos(self));
            }
        };
        buffer.truncate(len + amt_read);
        self.buffer = Cow::Owned(buffer);
        if amt_read == 0 {
            self.eof = true;
        }
        Ok(())
    }

    /// Refill until at least `amt` bytes are buffered. Returns false if the
    /// stream ended first (whatever was available is still in the buffer).
    pub fn fill(&mut self, amt: usize) -> Result<bool, BamError> {
        while self.len() < amt {
            if self.eof {
                return Ok(false);
            }
            self.refill()?;
        }
        Ok(true)
    }

    /// Little-endian `i32` at `pos` past the current position; the caller
    /// must have `fill`ed enough data first.
    pub fn peek_i32(&self, pos: usize) -> i32 {
        LittleEndian::read_i32(&self[pos..pos + 4])
    }

    /// Mark out the data in the buffer and return a reference to it
    /// To be called once an entire record has been consumed
    pub fn consume(&mut self, amt: usize) -> &[u8] {
        self.record_pos += 1;
        self.partial_consume(amt)
    }

    pub fn partial_consume(&mut self, amt: usize) -> &[u8] {
        let start = self.consumed;
        self.consumed += amt;
        &self.buffer[start..self.consumed]
    }

    /// True if this is the last chunk in the stream
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// True if any data is left in the buffer
    pub fn is_empty(&self) -> bool {
        self.consumed >= self.buffer.len()
    }

    /// How much data is in the buffer
    pub fn len(&self) -> usize {
        self.buffer.len() - self.consumed
    }

    /// Total bytes handed out of this buffer so far
    pub fn bytes_read(&self) -> u64 {
        self.reader_pos + self.consumed as u64
    }

    /// The record and byte position that the reader is on
    pub fn get_pos(&self) -> (u64, u64) {
        (self.record_pos, self.bytes_read())
    }

    /// Read a single line out of the buffer.
    ///
    /// Assumes all lines are terminated with a '\n' and an optional '\r'
    /// before so should handle almost all current text file formats, but
    /// may fail on older '\r' only formats.
    pub fn read_line(&mut self) -> Result<Option<&[u8]>, BamError> {
        if self.is_empty() {
            self.refill()?;
            if self.is_empty() {
                return Ok(None);
            }
        }
        // find the newline
        let (end, to_consume) = loop {
            if let Some(e) = memchr(b'\n', &self[..]) {
                if self[..e].last() == Some(&b'\r') {
                    break (e - 1, e + 1);
                } else {
                    break (e, e + 1);
                }
            } else if self.eof() {
                // we couldn't find a new line, but we are at the end of the file
                // so return everything to the EOF
                let l = self.len();
                break (l, l);
            }
            // couldn't find the character; load more
            self.refill()?;
        };

        let buffer = self.consume(to_consume);
        Ok(Some(&buffer[..end]))
    }

    /// Look at the next line without consuming it.
    pub fn peek_line(&mut self) -> Result<Option<&[u8]>, BamError> {
        loop {
            if let Some(e) = memchr(b'\n', &self[..]) {
                let end = if e > 0 && self[e - 1] == b'\r' { e - 1 } else { e };
                return Ok(Some(&self[..end]));
            } else if self.eof() {
                if self.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(&self[..]));
            }
            self.refill()?;
        }
    }
}

impl<'s> fmt::Debug for ReadBuffer<'s> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("reader_pos", &self.reader_pos)
            .field("record_pos", &self.record_pos)
            .field("eof", &self.eof)
            .finish()
    }
}

// It's not really possible to implement Index<(Bound, Bound)> or otherwise
// make this generic over all forms of Range* so we do a little hacky business
macro_rules! impl_index {
    ($index:ty, $return:ty) => {
        impl<'r> Index<$index> for ReadBuffer<'r> {
            type Output = $return;

            fn index(&self, index: $index) -> &Self::Output {
                &self.buffer[self.consumed..][index]
            }
        }
    };
}

impl_index!(Range<usize>, [u8]);
impl_index!(RangeFrom<usize>, [u8]);
impl_index!(RangeTo<usize>, [u8]);
impl_index!(RangeFull, [u8]);
impl_index!(usize, u8);
