#![allow(dead_code)]
use std::io::Write;

use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};

pub const REFS: [(&str, i32); 3] = [("chr1", 248956422), ("chr2", 242193529), ("chrM", 16569)];

/// One bgzip member holding `data`.
pub fn bgzf_member(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    let cdata = encoder.finish().unwrap();
    let bsize = (18 + cdata.len() + 8 - 1) as u16;

    let mut member = vec![0x1f, 0x8b, 0x08, 0x04, 0, 0, 0, 0, 0, 0xff];
    member.extend(&6u16.to_le_bytes());
    member.extend(b"BC");
    member.extend(&2u16.to_le_bytes());
    member.extend(&bsize.to_le_bytes());
    member.extend(&cdata);
    let mut crc = Crc::new();
    crc.update(data);
    member.extend(&crc.sum().to_le_bytes());
    member.extend(&(data.len() as u32).to_le_bytes());
    member
}

/// `data` split into bgzip members, with the EOF marker at the end.
pub fn bgzf(data: &[u8], member_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in data.chunks(member_size) {
        out.extend(bgzf_member(chunk));
    }
    out.extend(bgzf_member(b""));
    out
}

pub fn header(refs: &[(&str, i32)]) -> Vec<u8> {
    let mut text = "@HD\tVN:1.6\tSO:coordinate\n".to_string();
    for (name, len) in refs {
        text.push_str(&format!("@SQ\tSN:{}\tLN:{}\n", name, len));
    }
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

/// A mapped 8-base record on `ref_id` with an `NM` tag.
pub fn record(ix: usize, ref_id: i32) -> Vec<u8> {
    let qname = format!("read{}", ix);
    let mut body = Vec::new();
    body.extend(&ref_id.to_le_bytes());
    body.extend(&(ix as i32 * 10).to_le_bytes());
    body.push(qname.len() as u8 + 1);
    body.push(60);
    body.extend(&4680u16.to_le_bytes());
    body.extend(&2u16.to_le_bytes());
    body.extend(&0u16.to_le_bytes());
    body.extend(&8i32.to_le_bytes());
    body.extend(&ref_id.to_le_bytes());
    body.extend(&(ix as i32 * 10 + 100).to_le_bytes());
    body.extend(&108i32.to_le_bytes());
    body.extend(qname.as_bytes());
    body.push(0);
    // 6M2S
    body.extend(&(6u32 << 4).to_le_bytes());
    body.extend(&((2u32 << 4) | 4).to_le_bytes());
    // ACGTACGT
    body.extend(&[0x12, 0x48, 0x12, 0x48]);
    body.extend(&[30, 31, 32, 33, 34, 35, 36, 37]);
    body.extend(b"NMC");
    body.push((ix % 5) as u8);

    let mut data = (body.len() as i32).to_le_bytes().to_vec();
    data.extend(body);
    data
}

/// An uncompressed BAM stream with `n` records.
pub fn bam(n: usize) -> Vec<u8> {
    let mut data = header(&REFS);
    for ix in 0..n {
        data.extend(record(ix, (ix % REFS.len()) as i32));
    }
    data
}
