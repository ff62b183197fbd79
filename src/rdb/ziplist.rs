//! Ziplist decoding, used by the legacy `ListZiplist`/`ZSetZiplist`/
//! `HashZiplist` value types and by each node of a `ListQuicklist`.

use crate::command::Decoder;
use crate::error::{CanalError, Result};
use crate::rdb::slice::SliceBuffer;

/// Skips the 8-byte `zlbytes`/`zltail` header and returns the 16-bit
/// little-endian entry count.
pub fn read_ziplist_length(buf: &mut SliceBuffer) -> Result<i64> {
    buf.skip(8);
    let b = buf.slice(2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]) as i64)
}

/// Reads one ziplist entry: a `prevlen` field (1 byte, or 5 if the marker
/// byte is 254), then a header byte whose top two bits select a string
/// length (6/14/32-bit) or, for `11`, one of several fixed-width/immediate
/// integer encodings rendered as decimal text.
pub fn read_ziplist_entry(buf: &mut SliceBuffer) -> Result<Vec<u8>> {
    let prevlen = buf.read_byte()?;
    if prevlen == 254 {
        buf.skip(4);
    }
    let header = buf.read_byte()?;
    match header >> 6 {
        0 => Ok(buf.slice((header & 0x3f) as usize)?.to_vec()),
        1 => {
            let lo = buf.read_byte()?;
            let len = ((header & 0x3f) as usize) << 8 | lo as usize;
            Ok(buf.slice(len)?.to_vec())
        }
        2 => {
            let b = buf.slice(4)?;
            let len = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize;
            Ok(buf.slice(len)?.to_vec())
        }
        _ => match header {
            0xc0 => {
                let b = buf.slice(2)?;
                Ok(i16::from_le_bytes([b[0], b[1]]).to_string().into_bytes())
            }
            0xd0 => {
                let b = buf.slice(4)?;
                Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]).to_string().into_bytes())
            }
            0xe0 => {
                let b = buf.slice(8)?;
                let arr: [u8; 8] = b.try_into().unwrap();
                Ok(i64::from_le_bytes(arr).to_string().into_bytes())
            }
            0xf0 => {
                let b = buf.slice(3)?;
                let mut widened = [0u8; 4];
                widened[1..].copy_from_slice(b);
                let v = i32::from_le_bytes(widened) >> 8;
                Ok(v.to_string().into_bytes())
            }
            0xfe => {
                let b = buf.read_byte()?;
                Ok((b as i8).to_string().into_bytes())
            }
            h if h >> 4 == 0x0f => Ok((((h & 0x0f) as i64) - 1).to_string().into_bytes()),
            other => Err(CanalError::protocol(format!("unknown ziplist header byte {:#x}", other))),
        },
    }
}

pub fn decode_ziplist_as_list(
    data: &[u8],
    key: &[u8],
    expiry: i64,
    emit_events: bool,
    sink: &mut impl Decoder,
) -> Result<()> {
    let mut buf = SliceBuffer::new(data);
    let length = read_ziplist_length(&mut buf)?;
    if emit_events {
        sink.begin_list(key, length, expiry);
    }
    for _ in 0..length {
        let value = read_ziplist_entry(&mut buf)?;
        sink.rpush(key, &value)?;
    }
    if emit_events {
        sink.end_list(key);
    }
    Ok(())
}

pub fn decode_ziplist_as_zset(data: &[u8], key: &[u8], expiry: i64, sink: &mut impl Decoder) -> Result<()> {
    let mut buf = SliceBuffer::new(data);
    let cardinality = read_ziplist_length(&mut buf)? / 2;
    sink.begin_zset(key, cardinality, expiry);
    for _ in 0..cardinality {
        let member = read_ziplist_entry(&mut buf)?;
        let score_bytes = read_ziplist_entry(&mut buf)?;
        let score: f64 = std::str::from_utf8(&score_bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| CanalError::protocol("invalid ziplist zset score"))?;
        sink.zadd(key, score, &member)?;
    }
    sink.end_zset(key);
    Ok(())
}

pub fn decode_ziplist_as_hash(data: &[u8], key: &[u8], expiry: i64, sink: &mut impl Decoder) -> Result<()> {
    let mut buf = SliceBuffer::new(data);
    let length = read_ziplist_length(&mut buf)? / 2;
    sink.begin_hash(key, length, expiry);
    for _ in 0..length {
        let field = read_ziplist_entry(&mut buf)?;
        let value = read_ziplist_entry(&mut buf)?;
        sink.hset(key, &field, &value)?;
    }
    sink.end_hash(key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Nop;

    fn ziplist_header(count: u16, body: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; 8];
        out.extend_from_slice(&count.to_le_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn reads_a_small_string_entry() {
        let mut body = vec![0u8]; // prevlen
        body.push(0x05); // 6-bit string length 5
        body.extend_from_slice(b"hello");
        let data = ziplist_header(1, &body);
        let mut buf = SliceBuffer::new(&data);
        read_ziplist_length(&mut buf).unwrap();
        assert_eq!(read_ziplist_entry(&mut buf).unwrap(), b"hello");
    }

    #[test]
    fn reads_an_int16_entry() {
        let mut body = vec![0u8, 0xc0];
        body.extend_from_slice(&(-7i16).to_le_bytes());
        let data = ziplist_header(1, &body);
        let mut buf = SliceBuffer::new(&data);
        read_ziplist_length(&mut buf).unwrap();
        assert_eq!(read_ziplist_entry(&mut buf).unwrap(), b"-7");
    }

    #[test]
    fn reads_a_four_bit_immediate_entry() {
        // 4-bit immediate integers are header bytes 0xf1..=0xff (0xf0 and
        // 0xfe are claimed by int24/int8), value = (header & 0x0f) - 1.
        let data = ziplist_header(1, &[0u8, 0xf5]);
        let mut buf = SliceBuffer::new(&data);
        read_ziplist_length(&mut buf).unwrap();
        assert_eq!(read_ziplist_entry(&mut buf).unwrap(), b"4");
    }

    #[test]
    fn decodes_a_list_ziplist_end_to_end() {
        let mut body = vec![0u8, 0x03];
        body.extend_from_slice(b"one");
        let data = ziplist_header(1, &body);
        let mut sink = Nop;
        decode_ziplist_as_list(&data, b"k", 0, true, &mut sink).unwrap();
    }
}
