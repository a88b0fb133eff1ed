use std::borrow::Cow;
use std::collections::BTreeMap;

use log::warn;

use crate::buffer::ReadBuffer;
use crate::compression::{decompress, Strategy};
use crate::fields::{Field, FieldPlan};
use crate::header::BamHeader;
use crate::readers::{ReaderOptions, RecordReader};
use crate::record::{BamRecord, Value};
use crate::source::{OpenSource, Source};
use crate::utils::error::{BamError, ErrorKind};

/// `block_size` can't be smaller than the fixed fields after it
const MIN_BLOCK_SIZE: i32 = 32;

/// Tag an error with the record and byte it happened at.
fn at_pos(mut err: BamError, (record, byte): (u64, u64)) -> BamError {
    err.record = Some(record);
    err.byte = Some(byte);
    err
}

/// Frame the next record out of `rb`.
///
/// Fewer than 4 bytes before the end of the stream is a clean end (with a
/// warning if any bytes were left over); a record that declares more bytes
/// than the stream has left is a `TruncatedRecord`.
fn next_alignment<'b>(rb: &'b mut ReadBuffer) -> Result<Option<BamRecord<'b>>, BamError> {
    if !rb.fill(4)? {
        if !rb.is_empty() {
            warn!(
                "ignoring {} stray bytes at the end of the stream (byte {})",
                rb.len(),
                rb.bytes_read()
            );
            let stray = rb.len();
            rb.partial_consume(stray);
        }
        return Ok(None);
    }

    let block_size = rb.peek_i32(0);
    if block_size < MIN_BLOCK_SIZE {
        return Err(BamError::new(
            ErrorKind::InvalidData,
            format!("record declares an impossible block_size of {}", block_size),
        )
        .fill_pos(rb));
    }
    let record_len = block_size as usize + 4;
    if !rb.fill(record_len)? {
        return Err(BamError::new(
            ErrorKind::TruncatedRecord,
            format!(
                "record declares block_size {} but the stream ends after {} more bytes",
                block_size,
                rb.len() - 4
            ),
        )
        .fill_pos(rb));
    }
    let pos = rb.get_pos();
    let data = rb.consume(record_len);
    BamRecord::new(data)
        .map(Some)
        .map_err(|e| at_pos(e, pos))
}

/// Reads alignments out of a (decompressed) BAM stream.
#[derive(Debug)]
pub struct BamReader<'r> {
    rb: ReadBuffer<'r>,
    header: BamHeader,
    plan: Option<FieldPlan>,
    strategy: Strategy,
    file_name: String,
    file_directory: String,
}

impl BamReader<'static> {
    /// Open, decompress and read the header of `source`.
    pub fn open(source: Source, options: ReaderOptions) -> Result<Self, BamError> {
        BamReader::from_open(source.open()?, options)
    }

    pub(crate) fn from_open(src: OpenSource, options: ReaderOptions) -> Result<Self, BamError> {
        // check the fields before doing any work on the stream
        let plan = options.fields.as_deref().map(FieldPlan::new).transpose()?;
        let file_name = src.name.clone();
        let file_directory = src.directory.clone();
        let (stream, strategy) = decompress(src, &options.decompressor)?;
        let rb = ReadBuffer::with_capacity(options.buffer_size, stream)?;
        let mut reader = BamReader::with_plan(rb, plan)?;
        reader.strategy = strategy;
        reader.file_name = file_name;
        reader.file_directory = file_directory;
        Ok(reader)
    }
}

impl<'r> BamReader<'r> {
    /// Read the header off an already-decompressed buffer.
    pub fn new(rb: ReadBuffer<'r>, fields: Option<&[Field]>) -> Result<Self, BamError> {
        let plan = fields.map(FieldPlan::new).transpose()?;
        BamReader::with_plan(rb, plan)
    }

    fn with_plan(mut rb: ReadBuffer<'r>, plan: Option<FieldPlan>) -> Result<Self, BamError> {
        let header = BamHeader::parse(&mut rb)?;
        Ok(BamReader {
            rb,
            header,
            plan,
            strategy: Strategy::Uncompressed,
            file_name: String::new(),
            file_directory: String::new(),
        })
    }

    pub fn header(&self) -> &BamHeader {
        &self.header
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn plan(&self) -> Option<&FieldPlan> {
        self.plan.as_ref()
    }

    /// Number of records framed so far
    pub fn alignments_read(&self) -> u64 {
        self.rb.record_pos
    }

    /// Decompressed bytes handed out so far, header included
    pub fn bytes_read(&self) -> u64 {
        self.rb.bytes_read()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn file_directory(&self) -> &str {
        &self.file_directory
    }

    /// The next raw record.
    ///
    /// # Errors
    /// `TruncatedRecord` if the stream stops partway through a record, or
    /// any error from the decompressor underneath.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<Option<BamRecord>, BamError> {
        next_alignment(&mut self.rb)
    }

    /// The next record decoded into the planned fields.
    ///
    /// # Errors
    /// `Config` if the reader was opened without fields; otherwise anything
    /// from framing or decoding the record.
    pub fn next_fields(&mut self) -> Result<Option<Vec<Value>>, BamError> {
        let plan = self.plan.as_ref().ok_or_else(|| {
            BamError::new(ErrorKind::Config, "this reader was opened without any fields")
        })?;
        let pos = self.rb.get_pos();
        let record = match next_alignment(&mut self.rb)? {
            Some(r) => r,
            None => return Ok(None),
        };
        plan.decode(&record, &self.header)
            .map(Some)
            .map_err(|e| at_pos(e, pos))
    }
}

impl<'r> RecordReader for BamReader<'r> {
    fn next_record(&mut self) -> Result<Option<Vec<Value>>, BamError> {
        if self.plan.is_some() {
            return self.next_fields();
        }
        Ok(self.next()?.map(|r| vec![Value::Bytes(r.as_bytes())]))
    }

    fn headers(&self) -> Vec<String> {
        match &self.plan {
            Some(plan) => plan.names(),
            None => vec![Field::Bam.name().to_string()],
        }
    }

    fn metadata(&self) -> BTreeMap<String, Value> {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "alignments_read".to_string(),
            Value::Int(self.alignments_read() as i64),
        );
        metadata.insert("bytes_read".to_string(), Value::Int(self.bytes_read() as i64));
        metadata.insert(
            "decompressor".to_string(),
            Value::from(self.strategy.to_string()),
        );
        metadata.insert("header".to_string(), Value::from(self.header.text.as_str()));
        metadata.insert(
            "chromosomes".to_string(),
            Value::List(
                self.header
                    .reference_names
                    .iter()
                    .map(|n| Value::from(n.as_str()))
                    .collect(),
            ),
        );
        metadata.insert(
            "chromosome_lengths".to_string(),
            Value::Map(
                self.header
                    .reference_lengths
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::Int(*v)))
                    .collect(),
            ),
        );
        metadata.insert(
            "binary_header".to_string(),
            Value::Bytes(&self.header.binary),
        );
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
