use std::io::{self, Read, Write};

/// Encode a u32 as a variable-length integer
pub fn encode_varint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a variable-length integer from a slice
/// Returns (value, bytes_consumed)
pub fn decode_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 32 {
            return None; // Overflow
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None // Incomplete
}

/// Delta-encode an ascending list of ids
pub fn delta_encode(values: &[u32], buf: &mut Vec<u8>) {
    let mut prev = 0u32;
    for &value in values {
        encode_varint(value - prev, buf);
        prev = value;
    }
}

/// Delta-decode a list of ids; stops at the first malformed varint
pub fn delta_decode(buf: &[u8]) -> Vec<u32> {
    let mut result = Vec::new();
    let mut prev = 0u32;
    let mut pos = 0;

    while pos < buf.len() {
        match decode_varint(&buf[pos..]) {
            Some((delta, consumed)) => {
                prev = prev.saturating_add(delta);
                result.push(prev);
                pos += consumed;
            }
            None => break,
        }
    }

    result
}

/// Encode a posting list of `(id, multiplicity)` pairs with ascending ids.
/// Ids are delta-coded, each followed by its multiplicity.
pub fn encode_postings(postings: &[(u32, u32)], buf: &mut Vec<u8>) {
    let mut prev = 0u32;
    for &(id, count) in postings {
        encode_varint(id - prev, buf);
        encode_varint(count, buf);
        prev = id;
    }
}

/// Lazy decoder over an encoded posting list
pub struct PostingIter<'a> {
    buf: &'a [u8],
    pos: usize,
    prev: u32,
}

impl<'a> PostingIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, prev: 0 }
    }
}

impl Iterator for PostingIter<'_> {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        let (delta, used) = decode_varint(self.buf.get(self.pos..)?)?;
        self.pos += used;
        let (count, used) = decode_varint(&self.buf[self.pos..])?;
        self.pos += used;
        self.prev = self.prev.saturating_add(delta);
        Some((self.prev, count))
    }
}

/// Decode a full posting list
pub fn decode_postings(buf: &[u8]) -> Vec<(u32, u32)> {
    PostingIter::new(buf).collect()
}

/// Write a u32 in little-endian format
pub fn write_u32_le<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u32 in little-endian format
pub fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Write a u64 in little-endian format
pub fn write_u64_le<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u64 in little-endian format
pub fn read_u64_le<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Write a u16 in little-endian format
pub fn write_u16_le<W: Write>(writer: &mut W, value: u16) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Read a u16 in little-endian format
pub fn read_u16_le<R: Read>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}
