//! The output field vocabulary and the per-stream decoding plan.
//!
//! A `FieldPlan` is built once from the requested fields: it expands them
//! by their dependencies, works out which fixed-width integers have to be
//! unpacked and how far into the variable-length sections decoding has to
//! reach. Every record is then decoded against the plan without looking at
//! the field list again.
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};

use crate::header::BamHeader;
use crate::record::{
    check_end, checked_l_seq, cigar_string, decode_cigar, decode_qual, decode_seq, pos1,
    qname_str, BamRecord, RecordEnds, Value, FIXED_LEN,
};
use crate::tags::{parse_bam_tags, tags_string};
use crate::utils::error::{BamError, ErrorKind};

macro_rules! field_table {
    ($($variant:ident => $name:literal, $desc:literal;)*) => {
        /// A decodable output field.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Field {
            $($variant,)*
        }

        impl Field {
            /// Every field, in the order `--list-fields` prints them
            pub const ALL: &'static [Field] = &[$(Field::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Field::$variant => $name,)*
                }
            }

            pub fn description(self) -> &'static str {
                match self {
                    $(Field::$variant => $desc,)*
                }
            }
        }
    };
}

field_table! {
    Sam => "sam", "The whole alignment as a line of SAM.";
    Bam => "bam", "Every byte of the alignment, block_size included, exactly as stored in the BAM.";
    Qname => "sam_qname", "[SAM column 1] The query (fragment) name.";
    BamQname => "bam_qname", "The raw bytes of sam_qname, NUL terminator included.";
    Flag => "sam_flag", "[SAM column 2] The bitwise FLAG.";
    BamFlag => "bam_flag", "The raw bytes of sam_flag.";
    RefId => "sam_refID", "Index of the reference in the header; negative if unmapped.";
    Rname => "sam_rname", "[SAM column 3] The reference name, or * when refID is negative.";
    BamRefId => "bam_refID", "The raw bytes of sam_refID.";
    Pos1 => "sam_pos1", "[SAM column 4] The 1-based position; 0 when not set.";
    Pos0 => "sam_pos0", "The 0-based position exactly as stored (may be negative).";
    BamPos => "bam_pos", "The raw bytes of sam_pos0.";
    Mapq => "sam_mapq", "[SAM column 5] The mapping quality.";
    BamMapq => "bam_mapq", "The raw bytes of sam_mapq.";
    CigarString => "sam_cigar_string", "[SAM column 6] The CIGAR string.";
    CigarList => "sam_cigar_list", "The CIGAR as (length, operation) pairs.";
    BamCigar => "bam_cigar", "The raw packed CIGAR operations.";
    NextRefId => "sam_next_refID", "The refID of the mate; negative if unset.";
    Rnext => "sam_rnext", "[SAM column 7] The reference name of the mate, or * when unset.";
    BamNextRefId => "bam_next_refID", "The raw bytes of sam_next_refID.";
    Pnext1 => "sam_pnext1", "[SAM column 8] The 1-based position of the mate; 0 when not set.";
    Pnext0 => "sam_pnext0", "The 0-based position of the mate exactly as stored.";
    BamPnext => "bam_pnext", "The raw bytes of sam_pnext0.";
    Tlen => "sam_tlen", "[SAM column 9] The observed template length.";
    BamTlen => "bam_tlen", "The raw bytes of sam_tlen.";
    Seq => "sam_seq", "[SAM column 10] The read sequence.";
    BamSeq => "bam_seq", "The raw 4-bit packed sequence.";
    Qual => "sam_qual", "[SAM column 11] Phred+33 base qualities, or * when absent.";
    BamQual => "bam_qual", "The raw base qualities.";
    TagsList => "sam_tags_list", "The optional fields with their BAM type codes.";
    TagsString => "sam_tags_string", "[SAM columns 12+] The optional fields as SAM text.";
    BamTags => "bam_tags", "The raw bytes of the optional fields.";
    Bin => "sam_bin", "The BAI index bin of the alignment.";
    BamBin => "bam_bin", "The raw bytes of sam_bin.";
    BlockSize => "sam_block_size", "Bytes in the alignment, not counting the 4 of block_size itself.";
    BamBlockSize => "bam_block_size", "The raw bytes of sam_block_size.";
    LReadName => "sam_l_read_name", "Length of the query name plus its NUL terminator.";
    BamLReadName => "bam_l_read_name", "The raw bytes of sam_l_read_name.";
    LSeq => "sam_l_seq", "Number of bases in the sequence.";
    BamLSeq => "bam_l_seq", "The raw bytes of sam_l_seq.";
    NCigarOp => "sam_n_cigar_op", "Number of CIGAR operations.";
    BamNCigarOp => "bam_n_cigar_op", "The raw bytes of sam_n_cigar_op.";
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Field {
    type Err = BamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(field) = Field::ALL.iter().find(|f| f.name() == s) {
            return Ok(*field);
        }
        let msg = if s.starts_with("sam") || s.starts_with("bam") {
            format!("{:?} is not a known field (see --list-fields)", s)
        } else {
            format!(
                "{:?} does not start with \"sam\" or \"bam\" so it can't be a record field",
                s
            )
        };
        Err(BamError::new(ErrorKind::UnknownField, msg))
    }
}

/// The fixed-width integers in the first 36 bytes of a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Fixed {
    RefId,
    Pos0,
    LReadName,
    Mapq,
    Bin,
    NCigarOp,
    Flag,
    LSeq,
    NextRefId,
    Pnext0,
    Tlen,
}

impl Fixed {
    /// Byte range inside the record, counting `block_size`
    fn range(self) -> (usize, usize) {
        match self {
            Fixed::RefId => (4, 8),
            Fixed::Pos0 => (8, 12),
            Fixed::LReadName => (12, 13),
            Fixed::Mapq => (13, 14),
            Fixed::Bin => (14, 16),
            Fixed::NCigarOp => (16, 18),
            Fixed::Flag => (18, 20),
            Fixed::LSeq => (20, 24),
            Fixed::NextRefId => (24, 28),
            Fixed::Pnext0 => (28, 32),
            Fixed::Tlen => (32, 36),
        }
    }

    fn unpack(self, data: &[u8]) -> i64 {
        let (start, end) = self.range();
        let raw = &data[start..end];
        match self {
            Fixed::LReadName | Fixed::Mapq => i64::from(raw[0]),
            Fixed::Bin | Fixed::NCigarOp | Fixed::Flag => i64::from(LittleEndian::read_u16(raw)),
            _ => i64::from(LittleEndian::read_i32(raw)),
        }
    }
}

/// How far into the variable-length sections a field reaches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum End {
    Qname,
    Cigar,
    Seq,
    Qual,
}

impl Field {
    fn fixed(self) -> Option<Fixed> {
        Some(match self {
            Field::RefId => Fixed::RefId,
            Field::Pos0 => Fixed::Pos0,
            Field::LReadName => Fixed::LReadName,
            Field::Mapq => Fixed::Mapq,
            Field::Bin => Fixed::Bin,
            Field::NCigarOp => Fixed::NCigarOp,
            Field::Flag => Fixed::Flag,
            Field::LSeq => Fixed::LSeq,
            Field::NextRefId => Fixed::NextRefId,
            Field::Pnext0 => Fixed::Pnext0,
            Field::Tlen => Fixed::Tlen,
            _ => return None,
        })
    }

    fn end(self) -> Option<End> {
        match self {
            Field::Qname | Field::BamQname => Some(End::Qname),
            Field::CigarString | Field::CigarList | Field::BamCigar => Some(End::Cigar),
            Field::Seq | Field::BamSeq => Some(End::Seq),
            Field::Qual | Field::BamQual | Field::TagsList | Field::BamTags => Some(End::Qual),
            _ => None,
        }
    }

    /// Fields that have to be decoded before this one.
    fn direct_deps(self) -> &'static [Field] {
        match self {
            Field::Sam => &[
                Field::Qname,
                Field::Flag,
                Field::Rname,
                Field::Pos1,
                Field::Mapq,
                Field::CigarString,
                Field::BamRefId,
                Field::BamNextRefId,
                Field::Rnext,
                Field::Pnext1,
                Field::Tlen,
                Field::Seq,
                Field::Qual,
                Field::TagsString,
            ],
            Field::TagsString => &[Field::TagsList],
            Field::Pos1 => &[Field::Pos0],
            Field::Pnext1 => &[Field::Pnext0],
            Field::Rname => &[Field::RefId],
            Field::Rnext => &[Field::NextRefId],
            _ => match self.end() {
                Some(End::Qname) => &[Field::LReadName],
                Some(End::Cigar) => &[Field::LReadName, Field::NCigarOp],
                Some(_) => &[Field::LReadName, Field::NCigarOp, Field::LSeq],
                None => &[],
            },
        }
    }

    /// Whether this field can be read off a SAM text line
    pub fn on_text(self) -> bool {
        matches!(
            self,
            Field::Sam
                | Field::Qname
                | Field::Flag
                | Field::Rname
                | Field::Pos1
                | Field::Pos0
                | Field::Mapq
                | Field::CigarString
                | Field::CigarList
                | Field::Rnext
                | Field::Pnext1
                | Field::Pnext0
                | Field::Tlen
                | Field::Seq
                | Field::Qual
                | Field::TagsList
                | Field::TagsString
                | Field::LSeq
        )
    }
}

/// Parse a list of field names, failing on the first unknown one.
pub fn parse_fields<S: AsRef<str>>(names: &[S]) -> Result<Vec<Field>, BamError> {
    names.iter().map(|n| n.as_ref().parse()).collect()
}

/// Everything `fields` needs, themselves included.
pub fn dependency_closure(fields: &[Field]) -> BTreeSet<Field> {
    let mut closure = BTreeSet::new();
    let mut pending: Vec<Field> = fields.to_vec();
    while let Some(field) = pending.pop() {
        if closure.insert(field) {
            pending.extend(field.direct_deps());
        }
    }
    closure
}

/// The precomputed decoding steps for one requested field list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPlan {
    requested: Vec<Field>,
    closure: BTreeSet<Field>,
    fixed: Vec<Fixed>,
    deepest_end: Option<End>,
}

const N_FIXED: usize = 11;

/// One record's unpacked integers and section ends.
struct Unpacked<'a> {
    data: &'a [u8],
    fixed: [i64; N_FIXED],
    ends: RecordEnds,
}

impl<'a> Unpacked<'a> {
    fn int(&self, fixed: Fixed) -> i64 {
        self.fixed[fixed as usize]
    }

    fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        &self.data[start..end]
    }

    fn raw(&self, fixed: Fixed) -> &'a [u8] {
        let (start, end) = fixed.range();
        self.slice(start, end)
    }
}

impl FieldPlan {
    /// # Errors
    /// Fails with `ErrorKind::Config` on an empty field list.
    pub fn new(fields: &[Field]) -> Result<Self, BamError> {
        if fields.is_empty() {
            return Err(BamError::new(
                ErrorKind::Config,
                "at least one field has to be requested",
            ));
        }
        let closure = dependency_closure(fields);
        let fixed: Vec<Fixed> = closure.iter().filter_map(|f| f.fixed()).collect();
        let deepest_end = closure.iter().filter_map(|f| f.end()).max();
        Ok(FieldPlan {
            requested: fields.to_vec(),
            closure,
            fixed,
            deepest_end,
        })
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, BamError> {
        FieldPlan::new(&parse_fields(names)?)
    }

    pub fn fields(&self) -> &[Field] {
        &self.requested
    }

    /// The requested fields plus everything they depend on
    pub fn closure(&self) -> &BTreeSet<Field> {
        &self.closure
    }

    pub fn names(&self) -> Vec<String> {
        self.requested.iter().map(|f| f.name().to_string()).collect()
    }

    fn unpack<'a>(&self, record: &BamRecord<'a>) -> Result<Unpacked<'a>, BamError> {
        let data = record.as_bytes();
        let mut fixed = [0; N_FIXED];
        for f in &self.fixed {
            fixed[*f as usize] = f.unpack(data);
        }
        let mut ends = RecordEnds::new(0, 0, 0);
        if let Some(deepest) = self.deepest_end {
            let l_read_name = fixed[Fixed::LReadName as usize] as usize;
            let n_cigar_op = if deepest >= End::Cigar {
                fixed[Fixed::NCigarOp as usize] as usize
            } else {
                0
            };
            let l_seq = if deepest >= End::Seq {
                checked_l_seq(fixed[Fixed::LSeq as usize])?
            } else {
                0
            };
            ends = RecordEnds::new(l_read_name, n_cigar_op, l_seq);
            let limit = match deepest {
                End::Qname => ends.qname,
                End::Cigar => ends.cigar,
                End::Seq => ends.seq,
                End::Qual => ends.qual,
            };
            check_end(limit, data.len())?;
        }
        Ok(Unpacked { data, fixed, ends })
    }

    /// Decode the requested fields of `record`, in the order they were
    /// requested.
    pub fn decode<'a>(
        &self,
        record: &BamRecord<'a>,
        header: &'a BamHeader,
    ) -> Result<Vec<Value<'a>>, BamError> {
        let unpacked = self.unpack(record)?;
        self.requested
            .iter()
            .map(|f| field_value(*f, &unpacked, header))
            .collect()
    }
}

fn ref_name<'a>(header: &'a BamHeader, ref_id: i64) -> Result<&'a str, BamError> {
    Ok(header.reference_name(ref_id as i32)?.unwrap_or("*"))
}

fn or_star(s: &str) -> &str {
    if s.is_empty() {
        "*"
    } else {
        s
    }
}

fn field_value<'a>(
    field: Field,
    u: &Unpacked<'a>,
    header: &'a BamHeader,
) -> Result<Value<'a>, BamError> {
    let ends = &u.ends;
    Ok(match field {
        Field::Bam => Value::Bytes(u.data),
        Field::BlockSize => Value::Int(i64::from(LittleEndian::read_i32(&u.data[..4]))),
        Field::BamBlockSize => Value::Bytes(&u.data[..4]),
        Field::RefId => Value::Int(u.int(Fixed::RefId)),
        Field::BamRefId => Value::Bytes(u.raw(Fixed::RefId)),
        Field::Pos0 => Value::Int(u.int(Fixed::Pos0)),
        Field::BamPos => Value::Bytes(u.raw(Fixed::Pos0)),
        Field::LReadName => Value::Int(u.int(Fixed::LReadName)),
        Field::BamLReadName => Value::Bytes(u.raw(Fixed::LReadName)),
        Field::Mapq => Value::Int(u.int(Fixed::Mapq)),
        Field::BamMapq => Value::Bytes(u.raw(Fixed::Mapq)),
        Field::Bin => Value::Int(u.int(Fixed::Bin)),
        Field::BamBin => Value::Bytes(u.raw(Fixed::Bin)),
        Field::NCigarOp => Value::Int(u.int(Fixed::NCigarOp)),
        Field::BamNCigarOp => Value::Bytes(u.raw(Fixed::NCigarOp)),
        Field::Flag => Value::Int(u.int(Fixed::Flag)),
        Field::BamFlag => Value::Bytes(u.raw(Fixed::Flag)),
        Field::LSeq => Value::Int(u.int(Fixed::LSeq)),
        Field::BamLSeq => Value::Bytes(u.raw(Fixed::LSeq)),
        Field::NextRefId => Value::Int(u.int(Fixed::NextRefId)),
        Field::BamNextRefId => Value::Bytes(u.raw(Fixed::NextRefId)),
        Field::Pnext0 => Value::Int(u.int(Fixed::Pnext0)),
        Field::BamPnext => Value::Bytes(u.raw(Fixed::Pnext0)),
        Field::Tlen => Value::Int(u.int(Fixed::Tlen)),
        Field::BamTlen => Value::Bytes(u.raw(Fixed::Tlen)),
        Field::Qname => Value::Str(Cow::Borrowed(qname_str(u.slice(FIXED_LEN, ends.qname))?)),
        Field::BamQname => Value::Bytes(u.slice(FIXED_LEN, ends.qname)),
        Field::Rname => Value::from(ref_name(header, u.int(Fixed::RefId))?),
        Field::Rnext => Value::from(ref_name(header, u.int(Fixed::NextRefId))?),
        Field::Pos1 => Value::Int(pos1(u.int(Fixed::Pos0))),
        Field::Pnext1 => Value::Int(pos1(u.int(Fixed::Pnext0))),
        Field::CigarList => Value::Cigar(decode_cigar(u.slice(ends.qname, ends.cigar))?),
        Field::CigarString => {
            Value::from(cigar_string(&decode_cigar(u.slice(ends.qname, ends.cigar))?))
        }
        Field::BamCigar => Value::Bytes(u.slice(ends.qname, ends.cigar)),
        Field::Seq => Value::from(decode_seq(
            u.slice(ends.cigar, ends.seq),
            ends.qual - ends.seq,
        )),
        Field::BamSeq => Value::Bytes(u.slice(ends.cigar, ends.seq)),
        Field::Qual => Value::from(decode_qual(u.slice(ends.seq, ends.qual))),
        Field::BamQual => Value::Bytes(u.slice(ends.seq, ends.qual)),
        Field::TagsList => Value::Tags(parse_bam_tags(&u.data[ends.qual..])?),
        Field::TagsString => Value::from(tags_string(&parse_bam_tags(&u.data[ends.qual..])?)),
        Field::BamTags => Value::Bytes(&u.data[ends.qual..]),
        Field::Sam => Value::from(sam_line(u, header)?),
    })
}

fn sam_line(u: &Unpacked, header: &BamHeader) -> Result<String, BamError> {
    let ends = &u.ends;
    let ref_id = u.int(Fixed::RefId);
    let next_ref_id = u.int(Fixed::NextRefId);
    // unmapped pairs (both -1) print "=" too
    let rnext = if ref_id == next_ref_id {
        "="
    } else {
        ref_name(header, next_ref_id)?
    };
    let cigar = cigar_string(&decode_cigar(u.slice(ends.qname, ends.cigar))?);
    let seq = decode_seq(u.slice(ends.cigar, ends.seq), ends.qual - ends.seq);
    let qual = decode_qual(u.slice(ends.seq, ends.qual));
    let tags = tags_string(&parse_bam_tags(&u.data[ends.qual..])?);
    Ok(format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        qname_str(u.slice(FIXED_LEN, ends.qname))?,
        u.int(Fixed::Flag),
        ref_name(header, ref_id)?,
        pos1(u.int(Fixed::Pos0)),
        u.int(Fixed::Mapq),
        or_star(&cigar),
        rnext,
        pos1(u.int(Fixed::Pnext0)),
        u.int(Fixed::Tlen),
        seq,
        or_star(&qual),
        tags,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ReadBuffer;
    use crate::header::test_helpers::{header_bytes, header_text};
    use crate::record::test_helpers::TestRecord;

    const REFS: [(&str, i32); 2] = [("chr1", 1000), ("chr2", 2000)];

    fn header() -> Result<BamHeader, BamError> {
        let data = header_bytes(&header_text(&REFS), &REFS);
        let header = BamHeader::parse(&mut ReadBuffer::from_slice(&data))?;
        Ok(header)
    }

    fn sample() -> Vec<u8> {
        TestRecord {
            ref_id: 1,
            pos0: 1000,
            flag: 99,
            next_ref_id: 1,
            pnext0: 1200,
            tlen: 250,
            qname: "frag7",
            cigar: &[(2, b'S'), (3, b'M')],
            seq: b"ACGTN",
            qual: Some(&[30, 30, 40, 40, 2]),
            tags: b"NMC\x01MDZ3\x00",
            ..Default::default()
        }
        .encode()
    }

    #[test]
    fn test_field_names() -> Result<(), BamError> {
        assert_eq!(Field::ALL.len(), 42);
        for field in Field::ALL {
            assert_eq!(&field.name().parse::<Field>()?, field);
            assert!(!field.description().is_empty());
        }
        let err = "sam_nope".parse::<Field>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownField);
        let err = "file_name".parse::<Field>().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownField);
        assert!(err.msg.contains("does not start"));
        Ok(())
    }

    #[test]
    fn test_closure() -> Result<(), BamError> {
        let plan = FieldPlan::new(&[Field::Seq])?;
        let closure: Vec<Field> = plan.closure().iter().copied().collect();
        assert_eq!(
            closure,
            vec![Field::Seq, Field::LReadName, Field::LSeq, Field::NCigarOp]
        );
        assert_eq!(plan.deepest_end, Some(End::Seq));

        let plan = FieldPlan::new(&[Field::Pos1, Field::Rname])?;
        assert_eq!(plan.fixed, vec![Fixed::RefId, Fixed::Pos0]);
        assert_eq!(plan.deepest_end, None);

        let plan = FieldPlan::new(&[Field::Sam])?;
        assert!(plan.closure().contains(&Field::TagsList));
        assert!(plan.closure().contains(&Field::Pnext0));
        assert_eq!(plan.deepest_end, Some(End::Qual));

        assert_eq!(FieldPlan::new(&[]).unwrap_err().kind, ErrorKind::Config);
        Ok(())
    }

    #[test]
    fn test_decode_columns() -> Result<(), BamError> {
        let header = header()?;
        let data = sample();
        let record = BamRecord::new(&data)?;
        let plan = FieldPlan::from_names(&[
            "sam_qname",
            "sam_rname",
            "sam_pos1",
            "sam_cigar_string",
            "sam_cigar_list",
            "sam_seq",
            "sam_qual",
            "sam_tags_string",
            "sam_l_seq",
        ])?;
        let values = plan.decode(&record, &header)?;
        assert_eq!(values[0], Value::from("frag7"));
        assert_eq!(values[1], Value::from("chr2"));
        assert_eq!(values[2], Value::Int(1001));
        assert_eq!(values[3], Value::from("2S3M"));
        assert_eq!(values[4], Value::Cigar(vec![(2, 'S'), (3, 'M')]));
        assert_eq!(values[5], Value::from("ACGTN"));
        assert_eq!(values[6], Value::from("??II#"));
        assert_eq!(values[7], Value::from("NM:i:1\tMD:Z:3"));
        assert_eq!(values[8], Value::Int(5));
        Ok(())
    }

    #[test]
    fn test_decode_sam_line() -> Result<(), BamError> {
        let header = header()?;
        let data = sample();
        let record = BamRecord::new(&data)?;
        let values = FieldPlan::new(&[Field::Sam])?.decode(&record, &header)?;
        assert_eq!(
            values[0].as_str(),
            Some("frag7\t99\tchr2\t1001\t60\t2S3M\t=\t1201\t250\tACGTN\t??II#\tNM:i:1\tMD:Z:3")
        );

        let data = TestRecord {
            ref_id: -1,
            pos0: -1,
            flag: 4,
            mapq: 0,
            cigar: &[],
            seq: b"",
            qual: None,
            ..Default::default()
        }
        .encode();
        let record = BamRecord::new(&data)?;
        let values = FieldPlan::new(&[Field::Sam])?.decode(&record, &header)?;
        // unmapped on both ends still counts as the same reference
        assert_eq!(values[0].as_str(), Some("read1\t4\t*\t0\t0\t*\t=\t0\t0\t\t*\t"));
        Ok(())
    }

    #[test]
    fn test_sam_line_rnext() -> Result<(), BamError> {
        let header = header()?;
        let cases = [
            (-1, -1, "="),
            (0, 0, "="),
            (0, 1, "chr2"),
            (0, -1, "*"),
            (-1, 1, "chr2"),
        ];
        for (ref_id, next_ref_id, rnext) in cases.iter() {
            let data = TestRecord {
                ref_id: *ref_id,
                next_ref_id: *next_ref_id,
                ..Default::default()
            }
            .encode();
            let record = BamRecord::new(&data)?;
            let values = FieldPlan::new(&[Field::Sam])?.decode(&record, &header)?;
            let line = values[0].to_string();
            let columns: Vec<&str> = line.split('\t').collect();
            assert_eq!(columns.len(), 12);
            assert_eq!(columns[6], *rnext, "refID {} next {}", ref_id, next_ref_id);
            // no tags still leaves an empty tags column
            assert_eq!(columns[11], "");
        }
        Ok(())
    }

    #[test]
    fn test_every_field_decodes() -> Result<(), BamError> {
        let header = header()?;
        let data = sample();
        let record = BamRecord::new(&data)?;
        for field in Field::ALL {
            let values = FieldPlan::new(&[*field])?.decode(&record, &header)?;
            assert_eq!(values.len(), 1);
        }
        let plan = FieldPlan::new(&[Field::BamFlag, Field::Bin, Field::BamBlockSize])?;
        let values = plan.decode(&record, &header)?;
        assert_eq!(values[0], Value::Bytes(&[99, 0]));
        assert_eq!(values[1], Value::Int(4680));
        assert_eq!(values[2], Value::Bytes(&data[..4]));
        Ok(())
    }

    #[test]
    fn test_raw_fields() -> Result<(), BamError> {
        let header = header()?;
        let data = sample();
        let record = BamRecord::new(&data)?;
        let plan = FieldPlan::new(&[
            Field::Bam,
            Field::BamRefId,
            Field::BamQname,
            Field::BamTags,
            Field::BlockSize,
        ])?;
        let values = plan.decode(&record, &header)?;
        assert_eq!(values[0], Value::Bytes(&data));
        assert_eq!(values[1], Value::Bytes(&[1, 0, 0, 0]));
        assert_eq!(values[2], Value::Bytes(b"frag7\x00"));
        assert_eq!(values[3], Value::Bytes(b"NMC\x01MDZ3\x00"));
        assert_eq!(values[4], Value::Int(data.len() as i64 - 4));
        Ok(())
    }

    #[test]
    fn test_subset_matches_superset() -> Result<(), BamError> {
        let header = header()?;
        let data = sample();
        let record = BamRecord::new(&data)?;
        let small = FieldPlan::new(&[Field::Seq, Field::Pos1])?;
        let mut big_fields = Field::ALL.to_vec();
        big_fields.reverse();
        let big = FieldPlan::new(&big_fields)?;
        let small_values = small.decode(&record, &header)?;
        let big_values = big.decode(&record, &header)?;
        for (field, value) in small.fields().iter().zip(small_values) {
            let ix = big_fields.iter().position(|f| f == field).unwrap();
            assert_eq!(big_values[ix], value);
        }
        Ok(())
    }

    #[test]
    fn test_bad_ref_and_overrun() -> Result<(), BamError> {
        let header = header()?;
        let data = TestRecord {
            ref_id: 7,
            ..Default::default()
        }
        .encode();
        let record = BamRecord::new(&data)?;
        let plan = FieldPlan::new(&[Field::Rname])?;
        assert_eq!(plan.decode(&record, &header).unwrap_err().kind, ErrorKind::InvalidData);
        // refID alone never needs the header lookup
        let plan = FieldPlan::new(&[Field::RefId])?;
        assert_eq!(plan.decode(&record, &header)?, vec![Value::Int(7)]);

        let mut data = TestRecord::default().encode();
        data[12] = 200;
        let record = BamRecord::new(&data)?;
        let plan = FieldPlan::new(&[Field::Qname])?;
        assert_eq!(plan.decode(&record, &header).unwrap_err().kind, ErrorKind::InvalidData);
        // but fields that stop short of the name are fine
        let plan = FieldPlan::new(&[Field::Flag])?;
        assert_eq!(plan.decode(&record, &header)?, vec![Value::Int(0)]);
        Ok(())
    }

    #[test]
    fn test_on_text() {
        assert!(Field::Sam.on_text());
        assert!(Field::Rnext.on_text());
        assert!(!Field::Bam.on_text());
        assert!(!Field::RefId.on_text());
        assert!(!Field::BamSeq.on_text());
    }
}
