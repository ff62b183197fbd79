//! Listpack decoding. RDB only ever nests listpacks inside a stream's
//! master entries, but the entry format itself is independent of that
//! context, so it lives in its own module.

use crate::error::{CanalError, Result};
use crate::rdb::slice::SliceBuffer;

/// Interprets up to 8 big-endian bytes as an unsigned integer. Listpack
/// integer entries come back from [`read_listpack_entry`] as these
/// fixed-width big-endian byte strings; callers needing the numeric value
/// (stream flags/deltas/counts) pass the bytes back through here.
pub fn read_u_int(bytes: &[u8]) -> Result<u64> {
    match bytes.len() {
        1 => Ok(bytes[0] as u64),
        2 => Ok(u16::from_be_bytes([bytes[0], bytes[1]]) as u64),
        3 => {
            let padded = [0u8, bytes[0], bytes[1], bytes[2]];
            Ok(u32::from_be_bytes(padded) as u64)
        }
        4 => Ok(u32::from_be_bytes(bytes.try_into().unwrap()) as u64),
        8 => Ok(u64::from_be_bytes(bytes.try_into().unwrap())),
        other => Err(CanalError::protocol(format!("invalid listpack integer width {}", other))),
    }
}

fn be_bytes(v: u64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

/// `SliceBuffer::first` reports a truncated blob as `io::Error`; every
/// listpack caller surfaces that as a protocol error rather than letting it
/// pass silently (a truncated entry is malformed RDB input, not a transport
/// failure).
fn first(buf: &SliceBuffer, length: usize) -> Result<Vec<u8>> {
    buf.first(length)
        .map_err(|_| CanalError::protocol("truncated listpack entry"))
}

/// Reads one listpack entry and returns its payload — raw string bytes for
/// string encodings, or the integer rendered as fixed-width big-endian
/// bytes (see [`read_u_int`]) for integer encodings. Dispatch is by
/// bitmask, evaluated in the same priority order as the encoding table: the
/// narrower masks (`0x80`, `0xc0`, `0xe0`) are tried before the exact-byte
/// matches for the fixed-width integers, and the 12-bit string mask is
/// tried only after those, since `0xf0`/`0xf1..0xf4` would otherwise also
/// satisfy it.
pub fn read_listpack_entry(buf: &mut SliceBuffer) -> Result<Vec<u8>> {
    let special = buf.read_byte()?;
    if special & 0x80 == 0 {
        // 7-bit unsigned int: value is the low 7 bits, 1-byte backlen follows.
        buf.skip(1);
        Ok(be_bytes((special & 0x7f) as u64))
    } else if special & 0xc0 == 0x80 {
        // 6-bit string length.
        let len = (special & 0x3f) as usize;
        let value = first(buf, len)?;
        buf.skip(1 + len);
        Ok(value)
    } else if special & 0xe0 == 0xc0 {
        // 13-bit signed int, stored across this byte and the next.
        let next = buf.read_byte()?;
        let v = (u64::from(special & 0x1f) << 8) | u64::from(next);
        buf.skip(2);
        Ok(be_bytes(v))
    } else if special == 0xf1 {
        let value = first(buf, 2)?;
        buf.skip(3);
        Ok(value)
    } else if special == 0xf2 {
        let value = first(buf, 3)?;
        buf.skip(4);
        Ok(value)
    } else if special == 0xf3 {
        let value = first(buf, 4)?;
        buf.skip(5);
        Ok(value)
    } else if special == 0xf4 {
        let value = first(buf, 8)?;
        buf.skip(9);
        Ok(value)
    } else if special & 0xf0 == 0xe0 {
        // 12-bit string length, stored across this byte and the next.
        let lo = buf.read_byte()?;
        let len = ((u64::from(special & 0x0f) << 8) | u64::from(lo)) as usize;
        let value = first(buf, len)?;
        buf.skip(2 + len);
        Ok(value)
    } else if special == 0xf0 {
        // 32-bit string length.
        let len_bytes = first(buf, 4)?;
        let len = read_u_int(&len_bytes)? as usize;
        let value = first(buf, len)?;
        buf.skip(5 + len);
        Ok(value)
    } else {
        Err(CanalError::protocol(format!("unsupported listpack encoding byte {:#x}", special)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_bit_uint() {
        let data = [0x2au8, 0x01];
        let mut buf = SliceBuffer::new(&data);
        let v = read_listpack_entry(&mut buf).unwrap();
        assert_eq!(read_u_int(&v).unwrap(), 0x2a);
    }

    #[test]
    fn six_bit_string() {
        let mut data = vec![0x80 | 3u8];
        data.extend_from_slice(b"abc");
        data.push(4); // backlen, unused by the reader
        let mut buf = SliceBuffer::new(&data);
        assert_eq!(read_listpack_entry(&mut buf).unwrap(), b"abc");
    }

    #[test]
    fn thirteen_bit_int() {
        // value 0x1234 & 0x1fff = 0x1234
        let v: u16 = 0x1234;
        let data = [0xc0 | ((v >> 8) as u8 & 0x1f), (v & 0xff) as u8, 0];
        let mut buf = SliceBuffer::new(&data);
        let got = read_listpack_entry(&mut buf).unwrap();
        assert_eq!(read_u_int(&got).unwrap(), v as u64);
    }

    #[test]
    fn twelve_bit_string_not_confused_with_32_bit_marker() {
        let mut data = vec![0xe0u8, 0x03];
        data.extend_from_slice(b"xyz");
        data.push(0); // backlen
        let mut buf = SliceBuffer::new(&data);
        assert_eq!(read_listpack_entry(&mut buf).unwrap(), b"xyz");
    }

    #[test]
    fn truncated_string_entry_errors_instead_of_panicking() {
        // 6-bit string length of 3, but the special byte is the last byte
        // in the buffer — no room for the string payload at all.
        let data = [0x80u8 | 3];
        let mut buf = SliceBuffer::new(&data);
        assert!(read_listpack_entry(&mut buf).is_err());
    }
}
