use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::tags::{parse_bam_tags, Tag};
use crate::utils::error::{BamError, ErrorKind};

/// CIGAR operations by their packed 4-bit index
pub const CIGAR_CODES: &[u8; 9] = b"MIDNSHP=X";
/// Bases by their packed 4-bit code
pub const DNA_CODES: &[u8; 16] = b"=ACMGRSVTWYHKDBN";
/// `block_size` plus the 32 bytes of fixed-width fields
pub const FIXED_LEN: usize = 36;

/// Where each variable-length section of a record ends, counted from the
/// first byte of `block_size`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordEnds {
    pub qname: usize,
    pub cigar: usize,
    pub seq: usize,
    pub qual: usize,
}

impl RecordEnds {
    pub fn new(l_read_name: usize, n_cigar_op: usize, l_seq: usize) -> Self {
        let qname = FIXED_LEN + l_read_name;
        let cigar = qname + 4 * n_cigar_op;
        let seq = cigar + (l_seq + 1) / 2;
        let qual = seq + l_seq;
        RecordEnds {
            qname,
            cigar,
            seq,
            qual,
        }
    }
}

/// One alignment record, still in its binary encoding.
///
/// The slice starts at the record's 4-byte `block_size` so the bytes can be
/// written straight back out into another BAM stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BamRecord<'a> {
    data: &'a [u8],
}

impl<'a> BamRecord<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, BamError> {
        if data.len() < FIXED_LEN {
            return Err(BamError::new(
                ErrorKind::InvalidData,
                format!("record is {} bytes; too short for the fixed fields", data.len()),
            ));
        }
        let record = BamRecord { data };
        if i64::from(record.block_size()) + 4 != data.len() as i64 {
            return Err(BamError::new(
                ErrorKind::InvalidData,
                format!(
                    "block_size {} does not match the {} bytes given",
                    record.block_size(),
                    data.len() - 4
                ),
            ));
        }
        Ok(record)
    }

    /// The whole record, `block_size` included
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn block_size(&self) -> i32 {
        LittleEndian::read_i32(&self.data[0..4])
    }

    pub fn ref_id(&self) -> i32 {
        LittleEndian::read_i32(&self.data[4..8])
    }

    pub fn pos0(&self) -> i32 {
        LittleEndian::read_i32(&self.data[8..12])
    }

    pub fn l_read_name(&self) -> u8 {
        self.data[12]
    }

    pub fn mapq(&self) -> u8 {
        self.data[13]
    }

    pub fn bin(&self) -> u16 {
        LittleEndian::read_u16(&self.data[14..16])
    }

    pub fn n_cigar_op(&self) -> u16 {
        LittleEndian::read_u16(&self.data[16..18])
    }

    pub fn flag(&self) -> u16 {
        LittleEndian::read_u16(&self.data[18..20])
    }

    pub fn l_seq(&self) -> i32 {
        LittleEndian::read_i32(&self.data[20..24])
    }

    pub fn next_ref_id(&self) -> i32 {
        LittleEndian::read_i32(&self.data[24..28])
    }

    pub fn pnext0(&self) -> i32 {
        LittleEndian::read_i32(&self.data[28..32])
    }

    pub fn tlen(&self) -> i32 {
        LittleEndian::read_i32(&self.data[32..36])
    }

    /// Section ends, checked against the record's length.
    pub fn ends(&self) -> Result<RecordEnds, BamError> {
        let l_seq = checked_l_seq(i64::from(self.l_seq()))?;
        let ends = RecordEnds::new(
            usize::from(self.l_read_name()),
            usize::from(self.n_cigar_op()),
            l_seq,
        );
        check_end(ends.qual, self.data.len())?;
        Ok(ends)
    }

    pub fn qname(&self) -> Result<&'a str, BamError> {
        let ends = self.ends()?;
        qname_str(&self.data[FIXED_LEN..ends.qname])
    }

    pub fn cigar(&self) -> Result<Vec<(u32, char)>, BamError> {
        let ends = self.ends()?;
        decode_cigar(&self.data[ends.qname..ends.cigar])
    }

    pub fn seq(&self) -> Result<String, BamError> {
        let ends = self.ends()?;
        Ok(decode_seq(&self.data[ends.cigar..ends.seq], ends.qual - ends.seq))
    }

    pub fn qual(&self) -> Result<String, BamError> {
        let ends = self.ends()?;
        Ok(decode_qual(&self.data[ends.seq..ends.qual]))
    }

    pub fn tags(&self) -> Result<Vec<Tag<'a>>, BamError> {
        let ends = self.ends()?;
        parse_bam_tags(&self.data[ends.qual..])
    }
}

pub(crate) fn checked_l_seq(l_seq: i64) -> Result<usize, BamError> {
    if l_seq < 0 {
        return Err(BamError::new(
            ErrorKind::InvalidData,
            format!("negative l_seq ({})", l_seq),
        ));
    }
    Ok(l_seq as usize)
}

pub(crate) fn check_end(end: usize, len: usize) -> Result<(), BamError> {
    if end > len {
        return Err(BamError::new(
            ErrorKind::InvalidData,
            format!("record fields need {} bytes but the record has {}", end, len),
        ));
    }
    Ok(())
}

/// Read name without its NUL terminator.
pub fn qname_str(raw: &[u8]) -> Result<&str, BamError> {
    let name = match raw.split_last() {
        Some((&0, rest)) => rest,
        _ => raw,
    };
    Ok(std::str::from_utf8(name)?)
}

/// Unpack `(length, op)` pairs from packed little-endian `u32`s.
pub fn decode_cigar(raw: &[u8]) -> Result<Vec<(u32, char)>, BamError> {
    raw.chunks_exact(4)
        .map(|chunk| {
            let op = LittleEndian::read_u32(chunk);
            match CIGAR_CODES.get((op & 0xF) as usize) {
                Some(code) => Ok((op >> 4, char::from(*code))),
                None => Err(BamError::new(
                    ErrorKind::InvalidData,
                    format!("unknown CIGAR operation {}", op & 0xF),
                )),
            }
        })
        .collect()
}

pub fn cigar_string(ops: &[(u32, char)]) -> String {
    let mut cigar = String::with_capacity(ops.len() * 4);
    for (len, op) in ops {
        cigar.push_str(&len.to_string());
        cigar.push(*op);
    }
    cigar
}

/// Unpack 4-bit bases, high nibble first, keeping exactly `l_seq` of them.
pub fn decode_seq(raw: &[u8], l_seq: usize) -> String {
    let mut seq = String::with_capacity(l_seq);
    for idx in 0..l_seq.min(raw.len() * 2) {
        let byte = raw[idx / 2];
        let code = if idx % 2 == 0 { byte >> 4 } else { byte & 0xF };
        seq.push(char::from(DNA_CODES[usize::from(code)]));
    }
    seq
}

/// Phred+33; a leading 0xFF means the qualities weren't stored.
pub fn decode_qual(raw: &[u8]) -> String {
    if raw.first() == Some(&0xFF) {
        return "*".to_string();
    }
    raw.iter().map(|q| char::from(q.saturating_add(33))).collect()
}

/// SAM's 1-based position, with anything unset as 0.
pub fn pos1(pos0: i64) -> i64 {
    if pos0 < 0 {
        0
    } else {
        pos0 + 1
    }
}

/// A decoded field value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value<'a> {
    Int(i64),
    Str(Cow<'a, str>),
    /// Undecoded bytes straight out of the record
    Bytes(&'a [u8]),
    Cigar(Vec<(u32, char)>),
    Tags(Vec<Tag<'a>>),
    List(Vec<Value<'a>>),
    Map(BTreeMap<String, Value<'a>>),
}

impl<'a> Value<'a> {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    pub fn into_owned(self) -> Value<'static> {
        match self {
            Value::Int(i) => Value::Int(i),
            Value::Str(s) => Value::Str(Cow::Owned(s.into_owned())),
            Value::Bytes(b) => Value::List(b.iter().map(|x| Value::Int(i64::from(*x))).collect()),
            Value::Cigar(c) => Value::Cigar(c),
            Value::Tags(t) => Value::Tags(t.into_iter().map(Tag::into_owned).collect()),
            Value::List(l) => Value::List(l.into_iter().map(Value::into_owned).collect()),
            Value::Map(m) => Value::Map(m.into_iter().map(|(k, v)| (k, v.into_owned())).collect()),
        }
    }
}

impl<'a> From<&'a str> for Value<'a> {
    fn from(s: &'a str) -> Self {
        Value::Str(Cow::Borrowed(s))
    }
}

impl<'a> From<String> for Value<'a> {
    fn from(s: String) -> Self {
        Value::Str(Cow::Owned(s))
    }
}

impl<'a> From<i64> for Value<'a> {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (ix, item) in items.iter().enumerate() {
        if ix > 0 {
            write!(f, ",")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl<'a> fmt::Display for Value<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bytes(b) => b.iter().try_for_each(|x| write!(f, "{:02x}", x)),
            Value::Cigar(ops) => {
                for (ix, (len, op)) in ops.iter().enumerate() {
                    if ix > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}{}", len, op)?;
                }
                Ok(())
            }
            Value::Tags(tags) => write_joined(f, tags),
            Value::List(l) => write_joined(f, l),
            Value::Map(m) => {
                for (ix, (k, v)) in m.iter().enumerate() {
                    if ix > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", k, v)?;
                }
                Ok(())
            }
        }
    }
}
