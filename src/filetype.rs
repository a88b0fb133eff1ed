/// The container or record format at the start of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    /// Already-decompressed "binary alignment map" data
    Bam,
    /// Block-gzip container (gzip members with a `BC` extra subfield)
    Bgzf,
    /// Plain gzip without the FEXTRA flag; not something we can stream a BAM out of
    Gzip,
    /// "Sequence alignment map" text
    Sam,
    /// Unknown file type
    Unknown,
}

impl FileType {
    /// Given a slice from the beginning of the file, try to guess which file
    /// format that file is in.
    pub fn from_magic(magic: &[u8]) -> FileType {
        if magic.len() >= 4 {
            match &magic[..4] {
                b"BAM\x01" => return FileType::Bam,
                [0x1F, 0x8B, 0x08, 0x04] => return FileType::Bgzf,
                b"@HD\t" | b"@SQ\t" | b"@RG\t" | b"@PG\t" | b"@CO\t" => return FileType::Sam,
                _ => {}
            }
        }
        if magic.len() < 2 {
            return FileType::Unknown;
        }
        match &magic[..2] {
            [0x1F, 0x8B] => FileType::Gzip,
            [b'@', _] => FileType::Sam,
            _ => FileType::Unknown,
        }
    }

    /// Return the list of possible file extensions a given file format
    /// could have.
    pub fn extensions(&self) -> &[&str] {
        match self {
            FileType::Bam | FileType::Bgzf => &["bam"],
            FileType::Gzip => &["gz", "gzip"],
            FileType::Sam => &["sam"],
            FileType::Unknown => &[""],
        }
    }

    /// Returns the "best" parser for a given file
    pub fn to_parser_name(&self) -> &str {
        match self {
            FileType::Bam | FileType::Bgzf => "bam",
            FileType::Sam => "sam",
            _ => "",
        }
    }
}
