#![no_main]
use libfuzzer_sys::fuzz_target;
extern crate bamstream;

use bamstream::buffer::ReadBuffer;
use bamstream::fields::Field;
use bamstream::filetype::FileType;
use bamstream::readers::bam::BamReader;
use bamstream::readers::sam::SamReader;
use bamstream::readers::RecordReader;
use bamstream::BamError;

fuzz_target!(|data: &[u8]| {
    let _ = generate_reader(data);
});

fn generate_reader<'a>(data: &'a [u8]) -> Result<(), BamError> {
    let rb = ReadBuffer::from_slice(data);
    let mut reader: Box<dyn RecordReader + 'a> = match FileType::from_magic(data) {
        FileType::Sam => Box::new(SamReader::new(rb, Some(vec![Field::Sam, Field::TagsList]))?),
        _ => Box::new(BamReader::new(rb, Some(Field::ALL))?),
    };
    while reader.next_record()?.is_some() {}
    Ok(())
}
