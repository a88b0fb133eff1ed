use std::borrow::Cow;
use std::collections::BTreeMap;
use std::str;

use crate::buffer::ReadBuffer;
use crate::fields::Field;
use crate::header::{text_reference_lengths, text_reference_names};
use crate::readers::{ReaderOptions, RecordReader};
use crate::record::Value;
use crate::source::{OpenSource, Source};
use crate::tags::parse_sam_tag;
use crate::utils::error::{BamError, ErrorKind};

/// Number of mandatory columns on an alignment line
const SAM_COLUMNS: usize = 11;

/// Does `line` look like the start of a SAM file?
///
/// `strict` wants the `@HD` line a well-formed file begins with; otherwise
/// any header line will do.
pub fn is_sam(line: &[u8], strict: bool) -> bool {
    if strict {
        line.starts_with(b"@HD")
    } else {
        line.starts_with(b"@")
    }
}

/// One line of SAM, split but not otherwise decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct SamRecord<'s> {
    pub line: &'s str,
    pub qname: &'s str,
    pub flag: u16,
    pub rname: &'s str,
    pub pos1: i64,
    pub mapq: u8,
    pub cigar: &'s str,
    pub rnext: &'s str,
    pub pnext1: i64,
    pub tlen: i64,
    pub seq: &'s str,
    pub qual: &'s str,
    /// Every column after the eleventh, unparsed
    pub tags: Vec<&'s str>,
}

impl<'s> SamRecord<'s> {
    pub fn parse(raw: &'s [u8]) -> Result<Self, BamError> {
        let line = str::from_utf8(raw)?;
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < SAM_COLUMNS {
            return Err(BamError::new(
                ErrorKind::InvalidData,
                format!(
                    "SAM line has {} columns; at least {} are needed",
                    columns.len(),
                    SAM_COLUMNS
                ),
            ));
        }
        Ok(SamRecord {
            line,
            qname: columns[0],
            flag: columns[1].parse()?,
            rname: columns[2],
            pos1: columns[3].parse()?,
            mapq: columns[4].parse()?,
            cigar: columns[5],
            rnext: columns[6],
            pnext1: columns[7].parse()?,
            tlen: columns[8].parse()?,
            seq: columns[9],
            qual: columns[10],
            tags: columns[SAM_COLUMNS..].to_vec(),
        })
    }

    /// The CIGAR as `(length, operation)` pairs; `*` is empty.
    pub fn cigar_list(&self) -> Result<Vec<(u32, char)>, BamError> {
        let mut ops = Vec::new();
        if self.cigar == "*" {
            return Ok(ops);
        }
        let mut start = 0;
        for (ix, c) in self.cigar.char_indices() {
            if c.is_ascii_digit() {
                continue;
            }
            if !"MIDNSHP=X".contains(c) || start == ix {
                return Err(BamError::new(
                    ErrorKind::InvalidData,
                    format!("bad CIGAR string {:?}", self.cigar),
                ));
            }
            ops.push((self.cigar[start..ix].parse()?, c));
            start = ix + c.len_utf8();
        }
        if start != self.cigar.len() {
            return Err(BamError::new(
                ErrorKind::InvalidData,
                format!("CIGAR string {:?} ends without an operation", self.cigar),
            ));
        }
        Ok(ops)
    }

    /// One field's value; `field` has to be one of the text fields.
    pub fn field(&self, field: Field) -> Result<Value<'s>, BamError> {
        Ok(match field {
            Field::Sam => Value::from(self.line),
            Field::Qname => Value::from(self.qname),
            Field::Flag => Value::Int(i64::from(self.flag)),
            Field::Rname => Value::from(self.rname),
            Field::Pos1 => Value::Int(self.pos1),
            Field::Pos0 => Value::Int(self.pos1.saturating_sub(1)),
            Field::Mapq => Value::Int(i64::from(self.mapq)),
            Field::CigarString => Value::from(self.cigar),
            Field::CigarList => Value::Cigar(self.cigar_list()?),
            Field::Rnext if self.rnext == "=" => Value::from(self.rname),
            Field::Rnext => Value::from(self.rnext),
            Field::Pnext1 => Value::Int(self.pnext1),
            Field::Pnext0 => Value::Int(self.pnext1.saturating_sub(1)),
            Field::Tlen => Value::Int(self.tlen),
            Field::Seq => Value::from(self.seq),
            Field::Qual => Value::from(self.qual),
            Field::TagsList => Value::Tags(
                self.tags
                    .iter()
                    .map(|t| parse_sam_tag(*t))
                    .collect::<Result<_, _>>()?,
            ),
            Field::TagsString => Value::Str(Cow::Owned(self.tags.join("\t"))),
            Field::LSeq if self.seq == "*" => Value::Int(0),
            Field::LSeq => Value::Int(self.seq.len() as i64),
            f => {
                return Err(BamError::new(
                    ErrorKind::UnknownField,
                    format!("{} can't be read from SAM text", f),
                ))
            }
        })
    }
}

/// Split the next line of `rb` into a record, tagging errors with the
/// line's position.
fn next_line<'b>(rb: &'b mut ReadBuffer) -> Result<Option<SamRecord<'b>>, BamError> {
    let pos = rb.get_pos();
    match rb.read_line()? {
        Some(line) => SamRecord::parse(line).map(Some).map_err(|e| at_pos(e, pos)),
        None => Ok(None),
    }
}

fn at_pos(mut err: BamError, (record, byte): (u64, u64)) -> BamError {
    err.record = Some(record);
    err.byte = Some(byte);
    err
}

/// Reads SAM text, keeping the `@` header lines.
#[derive(Debug)]
pub struct SamReader<'r> {
    rb: ReadBuffer<'r>,
    header_lines: Vec<String>,
    fields: Option<Vec<Field>>,
    bytes_in_header: u64,
    file_name: String,
    file_directory: String,
}

impl SamReader<'static> {
    pub fn open(source: Source, options: ReaderOptions) -> Result<Self, BamError> {
        SamReader::from_open(source.open()?, options)
    }

    pub(crate) fn from_open(src: OpenSource, options: ReaderOptions) -> Result<Self, BamError> {
        let file_name = src.name.clone();
        let file_directory = src.directory.clone();
        let rb = ReadBuffer::with_capacity(options.buffer_size, src.into_reader())?;
        let mut reader = SamReader::new(rb, options.fields)?;
        reader.file_name = file_name;
        reader.file_directory = file_directory;
        Ok(reader)
    }
}

impl<'r> SamReader<'r> {
    /// # Errors
    /// `UnknownField` if any requested field only exists in BAM.
    pub fn new(mut rb: ReadBuffer<'r>, fields: Option<Vec<Field>>) -> Result<Self, BamError> {
        if let Some(fields) = &fields {
            if fields.is_empty() {
                return Err(BamError::new(
                    ErrorKind::Config,
                    "at least one field has to be requested",
                ));
            }
            if let Some(f) = fields.iter().find(|f| !f.on_text()) {
                return Err(BamError::new(
                    ErrorKind::UnknownField,
                    format!("{} can't be read from SAM text", f),
                ));
            }
        }

        let mut header_lines = Vec::new();
        while let Some(line) = rb.peek_line()? {
            if !is_sam(line, false) {
                break;
            }
            let line = str::from_utf8(line)?.to_string();
            rb.read_line()?;
            header_lines.push(line);
        }
        // header lines aren't records
        rb.record_pos = 0;
        let bytes_in_header = rb.bytes_read();

        Ok(SamReader {
            rb,
            header_lines,
            fields,
            bytes_in_header,
            file_name: String::new(),
            file_directory: String::new(),
        })
    }

    /// The `@` lines from the top of the file, without line endings
    pub fn header_lines(&self) -> &[String] {
        &self.header_lines
    }

    pub fn header_text(&self) -> String {
        let mut text = self.header_lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    /// `SN` to `LN` from the `@SQ` lines
    pub fn reference_lengths(&self) -> BTreeMap<String, i64> {
        text_reference_lengths(&self.header_text())
    }

    pub fn alignments_read(&self) -> u64 {
        self.rb.record_pos
    }

    /// # Errors
    /// `InvalidData` for a line with too few columns or unparseable numbers.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<SamRecord>, BamError> {
        next_line(&mut self.rb)
    }
}

impl<'r> RecordReader for SamReader<'r> {
    fn next_record(&mut self) -> Result<Option<Vec<Value>>, BamError> {
        let pos = self.rb.get_pos();
        let fields: &[Field] = self.fields.as_deref().unwrap_or(&[Field::Sam]);
        let record = match next_line(&mut self.rb)? {
            Some(r) => r,
            None => return Ok(None),
        };
        fields
            .iter()
            .map(|f| record.field(*f))
            .collect::<Result<Vec<Value>, BamError>>()
            .map(Some)
            .map_err(|e| at_pos(e, pos))
    }

    fn headers(&self) -> Vec<String> {
        match &self.fields {
            Some(fields) => fields.iter().map(|f| f.name().to_string()).collect(),
            None => vec![Field::Sam.name().to_string()],
        }
    }

    fn metadata(&self) -> BTreeMap<String, Value> {
        let text = self.header_text();
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "alignments_read".to_string(),
            Value::Int(self.alignments_read() as i64),
        );
        metadata.insert(
            "bytes_read".to_string(),
            Value::Int(self.rb.bytes_read() as i64),
        );
        metadata.insert("decompressor".to_string(), Value::from("none"));
        metadata.insert(
            "header_bytes".to_string(),
            Value::Int(self.bytes_in_header as i64),
        );
        metadata.insert(
            "chromosomes".to_string(),
            Value::List(
                text_reference_names(&text)
                    .into_iter()
                    .map(Value::from)
                    .collect(),
            ),
        );
        metadata.insert(
            "chromosome_lengths".to_string(),
            Value::Map(
                text_reference_lengths(&text)
                    .into_iter()
                    .map(|(k, v)| (k, Value::Int(v)))
                    .collect(),
            ),
        );
        metadata.insert("header".to_string(), Value::from(text));
        metadata.insert(
            "file_name".to_string(),
            Value::Str(Cow::Borrowed(&self.file_name)),
        );
        metadata.insert(
            "file_directory".to_string(),
            Value::Str(Cow::Borrowed(&self.file_directory)),
        );
        metadata
    }
}
