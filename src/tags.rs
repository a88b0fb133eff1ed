use std::borrow::Cow;
use std::fmt;
use std::str;

use byteorder::{ByteOrder, LittleEndian};
use memchr::memchr;
use serde::Serialize;

use crate::utils::error::{BamError, ErrorKind};

/// The payload of an optional field.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue<'a> {
    Char(char),
    Int(i64),
    Float(f32),
    /// `Z` (and text `H`) strings
    Str(Cow<'a, str>),
    /// `B` arrays of integers, with the element type code
    IntArray(char, Vec<i64>),
    FloatArray(Vec<f32>),
}

/// One optional field: a two letter name, a type code and a value.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Tag<'a> {
    pub name: Cow<'a, str>,
    /// The type code as stored; BAM keeps the narrow integer codes
    /// (`c`, `C`, `s`, `S`, `I`) that SAM writes as `i`
    pub type_code: char,
    pub value: TagValue<'a>,
}

impl<'a> Tag<'a> {
    /// The type code as it would be written in a SAM file
    pub fn sam_type(&self) -> char {
        match self.type_code {
            'c' | 'C' | 's' | 'S' | 'I' => 'i',
            c => c,
        }
    }

    pub fn into_owned(self) -> Tag<'static> {
        Tag {
            name: Cow::Owned(self.name.into_owned()),
            type_code: self.type_code,
            value: match self.value {
                TagValue::Str(s) => TagValue::Str(Cow::Owned(s.into_owned())),
                TagValue::Char(c) => TagValue::Char(c),
                TagValue::Int(i) => TagValue::Int(i),
                TagValue::Float(f) => TagValue::Float(f),
                TagValue::IntArray(t, v) => TagValue::IntArray(t, v),
                TagValue::FloatArray(v) => TagValue::FloatArray(v),
            },
        }
    }
}

impl<'a> fmt::Display for Tag<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:", self.name, self.sam_type())?;
        match &self.value {
            TagValue::Char(c) => write!(f, "{}", c),
            TagValue::Int(i) => write!(f, "{}", i),
            TagValue::Float(x) => write!(f, "{}", x),
            TagValue::Str(s) => write!(f, "{}", s),
            TagValue::IntArray(subtype, values) => {
                write!(f, "{}", subtype)?;
                values.iter().try_for_each(|v| write!(f, ",{}", v))
            }
            TagValue::FloatArray(values) => {
                write!(f, "f")?;
                values.iter().try_for_each(|v| write!(f, ",{}", v))
            }
        }
    }
}

/// Tags as the tab-separated trailing columns of a SAM line
pub fn tags_string(tags: &[Tag]) -> String {
    tags.iter()
        .map(|t| t.to_string())
        .collect::<Vec<String>>()
        .join("\t")
}

/// Byte width of a fixed-size BAM tag type
fn scalar_width(code: u8) -> Option<usize> {
    match code {
        b'A' | b'c' | b'C' => Some(1),
        b's' | b'S' => Some(2),
        b'i' | b'I' | b'f' => Some(4),
        _ => None,
    }
}

fn read_int(code: u8, raw: &[u8]) -> i64 {
    match code {
        b'c' => i64::from(raw[0] as i8),
        b'C' => i64::from(raw[0]),
        b's' => i64::from(LittleEndian::read_i16(raw)),
        b'S' => i64::from(LittleEndian::read_u16(raw)),
        b'i' => i64::from(LittleEndian::read_i32(raw)),
        _ => i64::from(LittleEndian::read_u32(raw)),
    }
}

fn truncated(name: &str) -> BamError {
    BamError::new(
        ErrorKind::InvalidData,
        format!("tag {} runs past the end of the record", name),
    )
}

/// Parse the optional fields at the end of a binary record.
///
/// # Errors
/// `UnknownTagType` for a type (or array element type) we can't size;
/// `InvalidData` if a tag runs off the end of `data`.
pub fn parse_bam_tags(data: &[u8]) -> Result<Vec<Tag>, BamError> {
    let mut tags = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        if pos + 3 > data.len() {
            return Err(BamError::new(
                ErrorKind::InvalidData,
                format!("{} stray bytes after the last tag", data.len() - pos),
            ));
        }
        let name = str::from_utf8(&data[pos..pos + 2])?;
        let code = data[pos + 2];
        pos += 3;

        let value = match code {
            b'Z' => {
                let len = memchr(0, &data[pos..]).ok_or_else(|| truncated(name))?;
                let s = str::from_utf8(&data[pos..pos + len])?;
                pos += len + 1;
                TagValue::Str(Cow::Borrowed(s))
            }
            b'B' => {
                if pos + 5 > data.len() {
                    return Err(truncated(name));
                }
                let subtype = data[pos];
                let count = LittleEndian::read_i32(&data[pos + 1..pos + 5]);
                pos += 5;
                let width = match scalar_width(subtype) {
                    Some(w) if subtype != b'A' => w,
                    _ => {
                        return Err(BamError::new(
                            ErrorKind::UnknownTagType,
                            format!(
                                "tag {} is an array of unknown type {:?}",
                                name,
                                char::from(subtype)
                            ),
                        ))
                    }
                };
                if count < 0 {
                    return Err(BamError::new(
                        ErrorKind::InvalidData,
                        format!("tag {} has a negative array length", name),
                    ));
                }
                let end = pos + width * count as usize;
                if end > data.len() {
                    return Err(truncated(name));
                }
                let raw = &data[pos..end];
                pos = end;
                if subtype == b'f' {
                    TagValue::FloatArray(raw.chunks_exact(4).map(LittleEndian::read_f32).collect())
                } else {
                    TagValue::IntArray(
                        char::from(subtype),
                        raw.chunks_exact(width).map(|x| read_int(subtype, x)).collect(),
                    )
                }
            }
            _ => {
                let width = scalar_width(code).ok_or_else(|| {
                    BamError::new(
                        ErrorKind::UnknownTagType,
                        format!("tag {} has unknown type {:?}", name, char::from(code)),
                    )
                })?;
                if pos + width > data.len() {
                    return Err(truncated(name));
                }
                let raw = &data[pos..pos + width];
                pos += width;
                match code {
                    b'A' => TagValue::Char(char::from(raw[0])),
                    b'f' => TagValue::Float(LittleEndian::read_f32(raw)),
                    _ => TagValue::Int(read_int(code, raw)),
                }
            }
        };
        tags.push(Tag {
            name: Cow::Borrowed(name),
            type_code: char::from(code),
            value,
        });
    }
    Ok(tags)
}

/// Parse one `NAME:TYPE:VALUE` column of a SAM line.
pub fn parse_sam_tag(field: &str) -> Result<Tag, BamError> {
    let mut parts = field.splitn(3, ':');
    let (name, code, raw) = match (parts.next(), parts.next(), parts.next()) {
        (Some(n), Some(c), Some(v)) if n.len() == 2 && c.len() == 1 => (n, c, v),
        _ => {
            return Err(BamError::new(
                ErrorKind::InvalidData,
                format!("{:?} is not a NAME:TYPE:VALUE tag", field),
            ))
        }
    };
    let type_code = code.chars().next().unwrap_or('?');
    let value = match type_code {
        'A' => TagValue::Char(raw.chars().next().ok_or_else(|| {
            BamError::new(ErrorKind::InvalidData, format!("tag {} is empty", name))
        })?),
        'i' => TagValue::Int(raw.parse()?),
        'f' => TagValue::Float(raw.parse()?),
        'Z' | 'H' => TagValue::Str(Cow::Borrowed(raw)),
        'B' => {
            let mut values = raw.split(',');
            let subtype = values.next().unwrap_or("");
            match subtype {
                "f" => TagValue::FloatArray(
                    values.map(str::parse::<f32>).collect::<Result<_, _>>()?,
                ),
                "c" | "C" | "s" | "S" | "i" | "I" => TagValue::IntArray(
                    subtype.chars().next().unwrap_or('i'),
                    values.map(str::parse::<i64>).collect::<Result<_, _>>()?,
                ),
                _ => {
                    return Err(BamError::new(
                        ErrorKind::UnknownTagType,
                        format!("tag {} is an array of unknown type {:?}", name, subtype),
                    ))
                }
            }
        }
        _ => {
            return Err(BamError::new(
                ErrorKind::UnknownTagType,
                format!("tag {} has unknown type {:?}", name, type_code),
            ))
        }
    };
    Ok(Tag {
        name: Cow::Borrowed(name),
        type_code,
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded() -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(b"NMC\x02");
        data.extend(b"XSs");
        data.extend(&(-5i16).to_le_bytes());
        data.extend(b"ASi");
        data.extend(&(-70000i32).to_le_bytes());
        data.extend(b"MDZ10A5\x00");
        data.extend(b"XAAx");
        data.extend(b"XFf");
        data.extend(&1.5f32.to_le_bytes());
        data.extend(b"ZBBc");
        data.extend(&3i32.to_le_bytes());
        data.extend(&[1u8, 0xFF, 3]);
        data
    }

    #[test]
    fn test_parse_bam_tags() -> Result<(), BamError> {
        let data = encoded();
        let tags = parse_bam_tags(&data)?;
        assert_eq!(tags.len(), 7);
        assert_eq!(tags[0].name, "NM");
        assert_eq!(tags[0].type_code, 'C');
        assert_eq!(tags[0].value, TagValue::Int(2));
        assert_eq!(tags[1].value, TagValue::Int(-5));
        assert_eq!(tags[2].value, TagValue::Int(-70000));
        assert_eq!(tags[3].value, TagValue::Str(Cow::Borrowed("10A5")));
        assert_eq!(tags[4].value, TagValue::Char('x'));
        assert_eq!(tags[5].value, TagValue::Float(1.5));
        assert_eq!(tags[6].value, TagValue::IntArray('c', vec![1, -1, 3]));
        Ok(())
    }

    #[test]
    fn test_tags_string() -> Result<(), BamError> {
        let data = encoded();
        let tags = parse_bam_tags(&data)?;
        assert_eq!(
            tags_string(&tags),
            "NM:i:2\tXS:i:-5\tAS:i:-70000\tMD:Z:10A5\tXA:A:x\tXF:f:1.5\tZB:B:c,1,-1,3"
        );
        Ok(())
    }

    #[test]
    fn test_unknown_type() {
        let err = parse_bam_tags(b"XXQ\x01\x02").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownTagType);

        let mut data = b"XXBq".to_vec();
        data.extend(&1i32.to_le_bytes());
        data.push(0);
        let err = parse_bam_tags(&data).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownTagType);
    }

    #[test]
    fn test_truncated_tags() {
        assert!(parse_bam_tags(b"MDZ10A5").is_err());
        assert!(parse_bam_tags(b"ASi\x01\x00").is_err());
        assert!(parse_bam_tags(b"A").is_err());
    }

    #[test]
    fn test_parse_sam_tag() -> Result<(), BamError> {
        let tag = parse_sam_tag("NM:i:3")?;
        assert_eq!(tag.value, TagValue::Int(3));
        let tag = parse_sam_tag("XA:Z:chr1,+100,4M,0;")?;
        assert_eq!(tag.value, TagValue::Str(Cow::Borrowed("chr1,+100,4M,0;")));
        let tag = parse_sam_tag("ZB:B:S,1,2")?;
        assert_eq!(tag.value, TagValue::IntArray('S', vec![1, 2]));
        assert_eq!(tag.to_string(), "ZB:B:S,1,2");
        assert_eq!(parse_sam_tag("XX:Q:1").unwrap_err().kind, ErrorKind::UnknownTagType);
        assert!(parse_sam_tag("NM3").is_err());
        Ok(())
    }
}
