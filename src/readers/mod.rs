use std::collections::BTreeMap;

use crate::buffer::BUFFER_SIZE;
use crate::compression::Decompressor;
use crate::fields::{parse_fields, Field};
use crate::filetype::FileType;
use crate::record::Value;
use crate::source::Source;
use crate::utils::error::BamError;

pub mod bam;
pub mod sam;

/// The trait that maps over the "generic" readers.
///
/// Each reader also has a specialised `next` that returns its own record
/// type; `next_record` turns that into a list of `Value`s.
pub trait RecordReader: ::std::fmt::Debug {
    /// Returns the next record from the file.
    ///
    /// Roughly equivalent to Rust's `Iterator.next`, but obeys slightly
    /// looser lifetime requirements to allow zero-copy parsing.
    ///
    /// # Errors
    /// If the record can't be read, an error is returned.
    fn next_record(&mut self) -> Result<Option<Vec<Value>>, BamError>;

    /// The header titles that correspond to every item in the record
    fn headers(&self) -> Vec<String>;

    /// Extra metadata about the file or data in the file
    fn metadata(&self) -> BTreeMap<String, Value>;
}

/// How a reader should be set up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Fields to decode per record; `None` hands back raw records
    pub fields: Option<Vec<Field>>,
    pub decompressor: Decompressor,
    /// Starting size of the read-ahead buffer
    pub buffer_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            fields: None,
            decompressor: Decompressor::default(),
            buffer_size: BUFFER_SIZE,
        }
    }
}

impl ReaderOptions {
    pub fn fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Like `fields`, but from names.
    ///
    /// # Errors
    /// `UnknownField` for the first name that isn't in the vocabulary.
    pub fn field_names<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self, BamError> {
        self.fields = Some(parse_fields(names)?);
        Ok(self)
    }

    pub fn decompressor(mut self, decompressor: Decompressor) -> Self {
        self.decompressor = decompressor;
        self
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

/// Open `source` with whichever reader fits it.
///
/// BAM (raw or bgzipped) goes to the `BamReader` and SAM text to the
/// `SamReader`. A custom decompressor always produces a `BamReader`.
///
/// # Errors
/// If the source can't be opened, isn't a format we know or the header
/// can't be read, a `BamError` is returned.
pub fn get_reader(
    source: Source,
    options: ReaderOptions,
) -> Result<Box<dyn RecordReader>, BamError> {
    let src = source.open()?;
    let file_type = FileType::from_magic(&src.magic);
    let is_custom = matches!(options.decompressor, Decompressor::Custom(_));
    Ok(match file_type.to_parser_name() {
        "sam" if !is_custom => Box::new(sam::SamReader::from_open(src, options)?),
        _ => Box::new(bam::BamReader::from_open(src, options)?),
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::header::test_helpers::{header_bytes, header_text};
    use crate::record::test_helpers::TestRecord;
    use crate::utils::error::ErrorKind;

    #[test]
    fn test_options() -> Result<(), BamError> {
        let options = ReaderOptions::default()
            .field_names(&["sam_qname", "sam_pos1"])?
            .decompressor(Decompressor::Internal)
            .buffer_size(16);
        assert_eq!(options.fields, Some(vec![Field::Qname, Field::Pos1]));
        assert_eq!(options.buffer_size, 16);
        assert!(ReaderOptions::default().field_names(&["qname"]).is_err());
        Ok(())
    }

    #[test]
    fn test_get_reader_bam() -> Result<(), BamError> {
        let refs = [("chr1", 100)];
        let mut data = header_bytes(&header_text(&refs), &refs);
        data.extend(TestRecord::default().encode());
        let options = ReaderOptions::default().fields(vec![Field::Qname]);
        let mut reader = get_reader(Source::from_reader(Cursor::new(data)), options)?;
        assert_eq!(reader.headers(), vec!["sam_qname"]);
        assert_eq!(reader.next_record()?, Some(vec![Value::from("read1")]));
        assert_eq!(reader.next_record()?, None);
        Ok(())
    }

    #[test]
    fn test_get_reader_sam() -> Result<(), BamError> {
        let data = b"@HD\tVN:1.6\nr1\t0\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\n".to_vec();
        let options = ReaderOptions::default().fields(vec![Field::Seq]);
        let mut reader = get_reader(Source::from_reader(Cursor::new(data)), options)?;
        assert_eq!(reader.next_record()?, Some(vec![Value::from("ACGT")]));
        Ok(())
    }

    #[test]
    fn test_get_reader_unknown() {
        let data = b"plain text, not an alignment".to_vec();
        let err = get_reader(
            Source::from_reader(Cursor::new(data)),
            ReaderOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnrecognizedFormat);
    }
}
