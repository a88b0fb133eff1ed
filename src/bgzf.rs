//! In-process decoding of the block-gzip container BAM files are stored in.
//!
//! A bgzip file is a run of ordinary gzip members, each carrying a `BC`
//! extra subfield that holds the member's total size minus one. Knowing the
//! size up front lets us slice out each member and inflate its raw DEFLATE
//! payload directly instead of walking the gzip framing byte by byte.
use std::cmp::min;
use std::io::{self, Read};

use byteorder::{ByteOrder, LittleEndian};
use flate2::bufread::GzDecoder;
use flate2::{Crc, Decompress, FlushDecompress, Status};
use log::{trace, warn};

use crate::utils::error::{BamError, ErrorKind};

/// gzip magic, DEFLATE method, FEXTRA flag set
pub const BGZF_MAGIC: [u8; 4] = [0x1F, 0x8B, 0x08, 0x04];
/// How much compressed data is pulled from the underlying reader at a time
pub const RAW_CHUNK_SIZE: usize = 65536;
/// Members inflated before handing data downstream
pub const MEMBERS_PER_CHUNK: usize = 50;

/// Fixed gzip header, XLEN included
const HEADER_LEN: usize = 12;
/// CRC32 + ISIZE
const FOOTER_LEN: usize = 8;

/// Find the `BC` subfield in a gzip extra field and return its value
/// (total member size minus one).
pub fn find_bsize(extra: &[u8]) -> Option<u16> {
    let mut pos = 0;
    while pos + 4 <= extra.len() {
        let slen = usize::from(LittleEndian::read_u16(&extra[pos + 2..pos + 4]));
        if &extra[pos..pos + 2] == b"BC" && slen == 2 && pos + 6 <= extra.len() {
            return Some(LittleEndian::read_u16(&extra[pos + 4..pos + 6]));
        }
        pos += 4 + slen;
    }
    None
}

/// Inflate one complete member through its `BC`-sized slice. Returns an
/// error message instead of a `BamError` since the caller may retry.
fn inflate_member(
    inflater: &mut Decompress,
    member: &[u8],
    xlen: usize,
    out: &mut Vec<u8>,
) -> Result<(), String> {
    let payload_start = HEADER_LEN + xlen;
    if member.len() < payload_start + FOOTER_LEN {
        return Err(format!("declared member size {} is too small", member.len()));
    }
    let footer = &member[member.len() - FOOTER_LEN..];
    let expected_crc = LittleEndian::read_u32(&footer[..4]);
    let expected_len = LittleEndian::read_u32(&footer[4..]) as usize;

    let start = out.len();
    // a little slack so the end-of-stream marker can be seen with the
    // output already full
    out.reserve(expected_len + 64);
    inflater.reset(false);
    let payload = &member[payload_start..member.len() - FOOTER_LEN];
    match inflater.decompress_vec(payload, out, FlushDecompress::Finish) {
        Ok(Status::StreamEnd) => {}
        Ok(status) => return Err(format!("inflate stopped early ({:?})", status)),
        Err(e) => return Err(e.to_string()),
    }
    if out.len() - start != expected_len {
        return Err(format!(
            "inflated {} bytes, footer says {}",
            out.len() - start,
            expected_len
        ));
    }
    let mut crc = Crc::new();
    crc.update(&out[start..]);
    if crc.sum() != expected_crc {
        return Err("CRC32 mismatch".to_string());
    }
    Ok(())
}

/// A `Read` over the concatenated payloads of every bgzip member in `reader`.
pub struct BgzfDecoder<R> {
    reader: R,
    /// Compressed bytes; everything before `raw_pos` is already decoded
    raw: Vec<u8>,
    raw_pos: usize,
    raw_eof: bool,
    /// Decompressed bytes waiting to be read out
    out: Vec<u8>,
    out_pos: usize,
    inflater: Decompress,
    members_read: u64,
    compressed_bytes_read: u64,
}

impl<R: Read> BgzfDecoder<R> {
    pub fn new(reader: R) -> Self {
        BgzfDecoder {
            reader,
            raw: Vec::with_capacity(RAW_CHUNK_SIZE),
            raw_pos: 0,
            raw_eof: false,
            out: Vec::new(),
            out_pos: 0,
            inflater: Decompress::new(false),
            members_read: 0,
            compressed_bytes_read: 0,
        }
    }

    /// Number of gzip members decoded so far
    pub fn members_read(&self) -> u64 {
        self.members_read
    }

    /// Number of bytes pulled from the compressed input so far
    pub fn compressed_bytes_read(&self) -> u64 {
        self.compressed_bytes_read
    }

    fn available(&self) -> usize {
        self.raw.len() - self.raw_pos
    }

    /// Make sure at least `amt` raw bytes are buffered. Returns false if
    /// the input ended first.
    fn fill_raw(&mut self, amt: usize) -> Result<bool, BamError> {
        while self.available() < amt {
            if self.raw_eof {
                return Ok(false);
            }
            if self.raw_pos > 0 {
                self.raw.drain(..self.raw_pos);
                self.raw_pos = 0;
            }
            let len = self.raw.len();
            self.raw.resize(len + RAW_CHUNK_SIZE.max(amt - len), 0);
            let amt_read = loop {
                match self.reader.read(&mut self.raw[len..]) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        self.raw.truncate(len);
                        return Err(e.into());
                    }
                }
            };
            self.raw.truncate(len + amt_read);
            self.compressed_bytes_read += amt_read as u64;
            if amt_read == 0 {
                self.raw_eof = true;
            }
        }
        Ok(true)
    }

    fn corrupt(&self, msg: String) -> BamError {
        let mut err = BamError::new(ErrorKind::CorruptBlock, msg);
        err.byte = Some(self.compressed_bytes_read - self.available() as u64);
        err
    }

    /// Decode the next member onto the end of `out`. Returns false at a
    /// clean end of input.
    fn next_member(&mut self) -> Result<bool, BamError> {
        if !self.fill_raw(HEADER_LEN + 6)? {
            if self.available() == 0 {
                return Ok(false);
            }
            return Err(self.corrupt(format!(
                "{} trailing bytes are too short to be a bgzip member",
                self.available()
            )));
        }

        let head = &self.raw[self.raw_pos..];
        if head[..4] != BGZF_MAGIC {
            if head[..2] == BGZF_MAGIC[..2] {
                // gzip, just without the BC subfield
                return self.next_member_generic();
            }
            return Err(self.corrupt(format!(
                "expected a bgzip member, found bytes {:?}",
                &head[..4]
            )));
        }
        let xlen = usize::from(LittleEndian::read_u16(&head[10..12]));
        if !self.fill_raw(HEADER_LEN + xlen)? {
            return Err(self.corrupt("bgzip member header is truncated".to_string()));
        }
        let extra = &self.raw[self.raw_pos + HEADER_LEN..self.raw_pos + HEADER_LEN + xlen];
        let block_len = match find_bsize(extra) {
            Some(bsize) => usize::from(bsize) + 1,
            None => return self.next_member_generic(),
        };
        if !self.fill_raw(block_len)? {
            return Err(self.corrupt(format!(
                "bgzip member declares {} bytes but only {} remain",
                block_len,
                self.available()
            )));
        }

        let member = &self.raw[self.raw_pos..self.raw_pos + block_len];
        let start = self.out.len();
        match inflate_member(&mut self.inflater, member, xlen, &mut self.out) {
            Ok(()) => {
                self.raw_pos += block_len;
                self.members_read += 1;
                Ok(true)
            }
            Err(msg) => {
                self.out.truncate(start);
                warn!(
                    "bgzip member {} failed fast inflate ({}); retrying as plain gzip",
                    self.members_read, msg
                );
                self.next_member_generic()
            }
        }
    }

    /// Decode a member by walking its gzip framing instead of trusting `BC`.
    fn next_member_generic(&mut self) -> Result<bool, BamError> {
        loop {
            let start = self.out.len();
            let (res, consumed) = {
                let avail = &self.raw[self.raw_pos..];
                let mut decoder = GzDecoder::new(avail);
                let res = decoder.read_to_end(&mut self.out);
                (res, avail.len() - decoder.into_inner().len())
            };
            match res {
                Ok(_) => {
                    self.raw_pos += consumed;
                    self.members_read += 1;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof && !self.raw_eof => {
                    self.out.truncate(start);
                    let want = 2 * self.available().max(RAW_CHUNK_SIZE / 2);
                    self.fill_raw(want)?;
                }
                Err(e) => {
                    self.out.truncate(start);
                    return Err(self.corrupt(format!(
                        "bgzip member {} could not be inflated: {}",
                        self.members_read, e
                    )));
                }
            }
        }
    }

    /// Inflate up to `MEMBERS_PER_CHUNK` members into `out`. Returns false
    /// once the input is exhausted and nothing new was produced.
    fn next_chunk(&mut self) -> Result<bool, BamError> {
        self.out.clear();
        self.out_pos = 0;
        let mut n_members = 0;
        while n_members < MEMBERS_PER_CHUNK {
            if !self.next_member()? {
                break;
            }
            n_members += 1;
        }
        trace!("inflated {} bgzip members into {} bytes", n_members, self.out.len());
        Ok(n_members > 0)
    }
}

impl<R: Read> Read for BgzfDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // members can legitimately be empty (e.g. the EOF marker) so keep
        // going until there's something to hand out
        while self.out_pos >= self.out.len() {
            if !self.next_chunk().map_err(BamError::into_io)? {
                return Ok(0);
            }
        }
        let amt = min(buf.len(), self.out.len() - self.out_pos);
        buf[..amt].copy_from_slice(&self.out[self.out_pos..self.out_pos + amt]);
        self.out_pos += amt;
        Ok(amt)
    }
}


#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::test_helpers::*;
    use super::*;

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[test]
    fn test_find_bsize() {
        assert_eq!(find_bsize(b"BC\x02\x00\x1b\x00"), Some(27));
        assert_eq!(find_bsize(b"XY\x01\x00\x00BC\x02\x00\x10\x00"), Some(16));
        assert_eq!(find_bsize(b"XY\x01\x00\x00"), None);
    }

    #[test]
    fn test_multiple_members() -> Result<(), BamError> {
        let data = payload(10_000);
        let mut decoder = BgzfDecoder::new(Cursor::new(bgzf_file(&data, 1000)));
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        assert_eq!(out, data);
        assert_eq!(decoder.members_read(), 11);
        Ok(())
    }

    #[test]
    fn test_more_members_than_a_chunk() -> Result<(), BamError> {
        let data = payload(3 * MEMBERS_PER_CHUNK * 10 + 3);
        let mut decoder = BgzfDecoder::new(Cursor::new(bgzf_file(&data, 10)));
        // odd-sized reads to straddle member and chunk boundaries
        let mut out = Vec::new();
        let mut buf = [0; 7];
        loop {
            let n = decoder.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, data);
        Ok(())
    }

    #[test]
    fn test_only_eof_marker() -> Result<(), BamError> {
        let mut decoder = BgzfDecoder::new(Cursor::new(bgzf_file(b"", 10)));
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        assert!(out.is_empty());
        Ok(())
    }

    #[test]
    fn test_plain_gzip_member_fallback() -> Result<(), BamError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"not a bgzip member")?;
        let mut file = bgzf_compress(b"first ");
        file.extend(encoder.finish()?);
        file.extend(bgzf_compress(b" last"));

        let mut decoder = BgzfDecoder::new(Cursor::new(file));
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        assert_eq!(out, b"first not a bgzip member last");
        Ok(())
    }

    #[test]
    fn test_bad_crc_is_corrupt() {
        let mut file = bgzf_compress(b"some alignment bytes");
        let crc_pos = file.len() - 8;
        file[crc_pos] ^= 0xFF;
        let mut out = Vec::new();
        let err: BamError = BgzfDecoder::new(Cursor::new(file))
            .read_to_end(&mut out)
            .unwrap_err()
            .into();
        assert_eq!(err.kind, ErrorKind::CorruptBlock);
    }

    #[test]
    fn test_truncated_member() {
        let mut file = bgzf_compress(&payload(500));
        file.truncate(file.len() - 20);
        let mut out = Vec::new();
        let err: BamError = BgzfDecoder::new(Cursor::new(file))
            .read_to_end(&mut out)
            .unwrap_err()
            .into();
        assert_eq!(err.kind, ErrorKind::CorruptBlock);
    }

    #[test]
    fn test_garbage_after_members() {
        let mut file = bgzf_compress(b"ok");
        file.extend_from_slice(b"this is not gzip at all");
        let mut out = Vec::new();
        let err: BamError = BgzfDecoder::new(Cursor::new(file))
            .read_to_end(&mut out)
            .unwrap_err()
            .into();
        assert_eq!(err.kind, ErrorKind::CorruptBlock);
    }
}
