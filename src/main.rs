use std::fs::File;
use std::io::{self, BufWriter, Write};

use clap::{crate_authors, crate_version, Arg, Command};
use log::debug;

use bamstream::fields::{parse_fields, Field};
use bamstream::readers::{get_reader, ReaderOptions, RecordReader};
use bamstream::{BamError, Decompressor, Source};

pub fn write_reader_to_tsv<W: Write>(
    reader: &mut dyn RecordReader,
    writer: &mut W,
    header: bool,
) -> Result<(), BamError> {
    if header {
        writer.write_all(reader.headers().join("\t").as_bytes())?;
        writer.write_all(b"\n")?;
    }
    while let Some(values) = reader.next_record()? {
        for (ix, value) in values.iter().enumerate() {
            if ix > 0 {
                writer.write_all(b"\t")?;
            }
            write!(writer, "{}", value)?;
        }
        writer.write_all(b"\n")?;
    }
    Ok(())
}

fn write_metadata<W: Write>(reader: &dyn RecordReader, writer: &mut W) -> Result<(), BamError> {
    for (key, value) in reader.metadata() {
        writeln!(writer, "{}\t{}", key, value)?;
    }
    Ok(())
}

pub fn main() -> Result<(), BamError> {
    env_logger::init();

    let matches = Command::new("bamstream")
        .about("Decode BAM and SAM alignments into a TSV")
        .author(crate_authors!())
        .version(crate_version!())
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .help("Path to read; if not provided stdin will be used")
                .takes_value(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Path to write to; if not provided stdout will be used")
                .takes_value(true),
        )
        .arg(
            Arg::new("fields")
                .short('f')
                .long("fields")
                .help("Comma-separated fields to output")
                .takes_value(true)
                .default_value("sam"),
        )
        .arg(
            Arg::new("decompressor")
                .short('d')
                .long("decompressor")
                .help("auto, internal, pigz, gzip or a command with {} for the path")
                .takes_value(true)
                .default_value("auto"),
        )
        .arg(
            Arg::new("metadata")
                .short('m')
                .long("metadata")
                .help("Reports metadata about the file instead of the records"),
        )
        .arg(
            Arg::new("list-fields")
                .long("list-fields")
                .help("List the fields that can be output"),
        )
        .arg(
            Arg::new("no-header")
                .long("no-header")
                .help("Don't write the row of field names"),
        )
        .get_matches();

    let mut writer: Box<dyn Write> = if let Some(o) = matches.value_of("output") {
        Box::new(BufWriter::new(File::create(o)?))
    } else {
        Box::new(BufWriter::new(io::stdout()))
    };

    if matches.is_present("list-fields") {
        for field in Field::ALL {
            writeln!(writer, "{}\t{}", field.name(), field.description())?;
        }
        writer.flush()?;
        return Ok(());
    }

    let names: Vec<&str> = matches
        .value_of("fields")
        .unwrap_or("sam")
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .collect();
    let decompressor: Decompressor = matches.value_of("decompressor").unwrap_or("auto").parse()?;
    let options = ReaderOptions::default()
        .fields(parse_fields(&names)?)
        .decompressor(decompressor);

    let source = match matches.value_of("input") {
        Some(i) => Source::from(i),
        None => Source::Stdin,
    };
    debug!("reading {:?}", source);
    let mut reader = get_reader(source, options)?;

    if matches.is_present("metadata") {
        // drain the records so the counters are final
        while reader.next_record()?.is_some() {}
        write_metadata(reader.as_ref(), &mut writer)?;
    } else {
        write_reader_to_tsv(reader.as_mut(), &mut writer, !matches.is_present("no-header"))?;
    }

    writer.flush()?;
    Ok(())
}
