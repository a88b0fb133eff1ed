use std::collections::BTreeMap;
use std::str;

use log::{debug, warn};
use serde::Serialize;

use crate::buffer::ReadBuffer;
use crate::utils::error::{BamError, ErrorKind};

pub const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// The text header's `@SQ` names disagree with the binary reference list.
/// Parsing carries on with the binary list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HeaderInconsistency {
    pub text_names: Vec<String>,
    pub binary_names: Vec<String>,
}

/// The header at the front of a decompressed BAM stream.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BamHeader {
    /// The SAM-style text header (`samtools view -H`)
    pub text: String,
    /// Reference names; the index is the `refID` records point at
    pub reference_names: Vec<String>,
    pub reference_lengths: BTreeMap<String, i64>,
    /// Every byte of the header exactly as it was in the stream
    #[serde(skip)]
    pub binary: Vec<u8>,
    pub inconsistency: Option<HeaderInconsistency>,
}

fn need(rb: &mut ReadBuffer, amt: usize) -> Result<(), BamError> {
    if !rb.fill(amt)? {
        return Err(BamError::new(
            ErrorKind::TruncatedHeader,
            format!("BAM header needs {} bytes but the stream ended after {}", amt, rb.len()),
        )
        .fill_pos(rb));
    }
    Ok(())
}

fn non_negative(value: i32, what: &str, rb: &ReadBuffer) -> Result<usize, BamError> {
    if value < 0 {
        return Err(BamError::new(
            ErrorKind::InvalidData,
            format!("BAM header has a negative {} ({})", what, value),
        )
        .fill_pos(rb));
    }
    Ok(value as usize)
}

impl BamHeader {
    /// Read the header off the front of `rb`. Exactly the header's bytes
    /// are consumed; anything after it stays buffered for the records.
    pub fn parse(rb: &mut ReadBuffer) -> Result<Self, BamError> {
        rb.fill(4)?;
        if rb.len() < 4 || &rb[..4] != BAM_MAGIC {
            let found = rb[..rb.len().min(4)].to_vec();
            return Err(BamError::new(
                ErrorKind::InvalidMagic,
                format!("does not appear to be a BAM file (starts with {:?})", found),
            ));
        }

        need(rb, 8)?;
        let l_text = non_negative(rb.peek_i32(4), "l_text", rb)?;
        let mut p = 8 + l_text;
        need(rb, p + 4)?;
        // some writers pad the text with NULs
        let text = str::from_utf8(&rb[8..p])?
            .trim_end_matches('\0')
            .to_string();

        let n_ref = non_negative(rb.peek_i32(p), "n_ref", rb)?;
        p += 4;
        let mut reference_names = Vec::with_capacity(n_ref);
        let mut reference_lengths = BTreeMap::new();
        for _ in 0..n_ref {
            need(rb, p + 4)?;
            let l_name = non_negative(rb.peek_i32(p), "l_name", rb)?;
            p += 4;
            need(rb, p + l_name + 4)?;
            let mut raw_name = &rb[p..p + l_name];
            if raw_name.last() == Some(&0) {
                raw_name = &raw_name[..l_name - 1];
            }
            let name = str::from_utf8(raw_name)?.to_string();
            p += l_name;
            reference_lengths.insert(name.clone(), i64::from(rb.peek_i32(p)));
            reference_names.push(name);
            p += 4;
        }

        let binary = rb.partial_consume(p).to_vec();
        let mut header = BamHeader {
            text,
            reference_names,
            reference_lengths,
            binary,
            inconsistency: None,
        };
        header.cross_check();
        debug!(
            "BAM header: {} bytes, {} references",
            header.binary.len(),
            header.reference_names.len()
        );
        Ok(header)
    }

    fn cross_check(&mut self) {
        let text_names = text_reference_names(&self.text);
        if text_names != self.reference_names {
            warn!(
                "the text header lists references {:?} but the binary header has {:?}; using the binary list",
                text_names, self.reference_names
            );
            self.inconsistency = Some(HeaderInconsistency {
                text_names,
                binary_names: self.reference_names.clone(),
            });
        }
    }

    /// Look up a `refID`; negative ids (unmapped) are `None`.
    pub fn reference_name(&self, ref_id: i32) -> Result<Option<&str>, BamError> {
        if ref_id < 0 {
            return Ok(None);
        }
        self.reference_names
            .get(ref_id as usize)
            .map(|n| Some(n.as_str()))
            .ok_or_else(|| {
                BamError::new(
                    ErrorKind::InvalidData,
                    format!(
                        "refID {} is past the {} references in the header",
                        ref_id,
                        self.reference_names.len()
                    ),
                )
            })
    }

    /// The text header split into lines
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines().filter(|l| !l.is_empty())
    }
}

/// Reference names from the `@SQ\tSN:` lines of a text header, in order.
pub fn text_reference_names(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| line.starts_with("@SQ\tSN:"))
        .filter_map(|line| line.split('\t').nth(1))
        .map(|sn| sn[3..].to_string())
        .collect()
}

/// `SN` to `LN` for every `@SQ` line of a text header. Lines without both
/// tags are skipped.
pub fn text_reference_lengths(text: &str) -> BTreeMap<String, i64> {
    let mut lengths = BTreeMap::new();
    for line in text.lines().filter(|line| line.starts_with("@SQ\t")) {
        let mut name = None;
        let mut length = None;
        for field in line.split('\t').skip(1) {
            if let Some(sn) = field.strip_prefix("SN:") {
                name = Some(sn);
            } else if let Some(ln) = field.strip_prefix("LN:") {
                length = ln.parse::<i64>().ok();
            }
        }
        if let (Some(name), Some(length)) = (name, length) {
            lengths.insert(name.to_string(), length);
        }
    }
    lengths
}

#[cfg(test)]
pub(crate) mod test_helpers {
    /// Serialise a binary BAM header.
    pub fn header_bytes(text: &str, refs: &[(&str, i32)]) -> Vec<u8> {
        let mut data = b"BAM\x01".to_vec();
        data.extend(&(text.len() as i32).to_le_bytes());
        data.extend(text.as_bytes());
        data.extend(&(refs.len() as i32).to_le_bytes());
        for (name, len) in refs {
            data.extend(&(name.len() as i32 + 1).to_le_bytes());
            data.extend(name.as_bytes());
            data.push(0);
            data.extend(&len.to_le_bytes());
        }
        data
    }

    /// A text header with one `@SQ` line per reference.
    pub fn header_text(refs: &[(&str, i32)]) -> String {
        let mut text = "@HD\tVN:1.6\tSO:unsorted\n".to_string();
        for (name, len) in refs {
            text.push_str(&format!("@SQ\tSN:{}\tLN:{}\n", name, len));
        }
        text
    }
}
