//! bamstream reads BAM alignment files (raw or bgzipped) and SAM text,
//! decoding only the fields that are asked for.
//!
//! An example pulling read names and positions out of a BAM:
//! ```no_run
//! use bamstream::fields::Field;
//! use bamstream::readers::bam::BamReader;
//! use bamstream::readers::ReaderOptions;
//! use bamstream::Source;
//!
//! let options = ReaderOptions::default().fields(vec![Field::Qname, Field::Pos1]);
//! let mut reader = BamReader::open(Source::from_path("./reads.bam"), options)?;
//! while let Some(values) = reader.next_fields()? {
//!     println!("{}\t{}", values[0], values[1]);
//! }
//! # use bamstream::BamError;
//! # Ok::<(), BamError>(())
//! ```

/// bgzip member decoding
pub mod bgzf;
/// The buffer interface that underlies the readers
pub mod buffer;
/// Picking and running a decompressor
pub mod compression;
/// The field vocabulary and decoding plans
pub mod fields;
/// File format inference
pub mod filetype;
/// The binary BAM header
pub mod header;
/// Alignment readers
pub mod readers;
/// Raw records and decoded values
pub mod record;
/// Input sources
pub mod source;
/// Optional fields (tags)
pub mod tags;
/// Error handling
pub mod utils;

pub use compression::Decompressor;
pub use fields::Field;
pub use record::{BamRecord, Value};
pub use source::Source;
pub use utils::error::{BamError, ErrorKind};
