//! String value encoding: raw bytes, small integers rendered as decimal
//! text, and LZF-compressed blobs. Also the two float encodings RDB uses
//! (binary doubles for `ZSET2`, the older text form for `ZSET`).

use std::io::Read;

use crate::error::{CanalError, Result};
use crate::rdb::length::{read_length, read_u16_le, read_u32_le, read_u64_le, read_u8, ENC_INT16, ENC_INT32, ENC_INT8, ENC_LZF};
use crate::rdb::lzf::lzf_decompress;

pub fn read_string(r: &mut impl Read) -> Result<Vec<u8>> {
    let (length, encoded) = read_length(r)?;
    if encoded {
        return match length {
            ENC_INT8 => Ok((read_u8(r)? as i8).to_string().into_bytes()),
            ENC_INT16 => Ok((read_u16_le(r)? as i16).to_string().into_bytes()),
            ENC_INT32 => Ok((read_u32_le(r)? as i32).to_string().into_bytes()),
            ENC_LZF => {
                let (compressed_len, _) = read_length(r)?;
                let (decompressed_len, _) = read_length(r)?;
                let mut compressed = vec![0u8; compressed_len as usize];
                r.read_exact(&mut compressed)?;
                let decompressed = lzf_decompress(&compressed, decompressed_len as usize);
                Ok(decompressed)
            }
            other => Err(CanalError::protocol(format!("unknown string encoding {}", other))),
        };
    }
    let mut buf = vec![0u8; length as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// The `ZSET2` score encoding: a raw little-endian `f64`.
pub fn read_binary_float64(r: &mut impl Read) -> Result<f64> {
    Ok(f64::from_bits(read_u64_le(r)?))
}

/// The older `ZSET` score encoding: a length byte (with 253/254/255 standing
/// for NaN/+Inf/-Inf) followed by that many bytes of decimal text.
pub fn read_float64_text(r: &mut impl Read) -> Result<f64> {
    let length = read_u8(r)?;
    match length {
        253 => Ok(f64::NAN),
        254 => Ok(f64::INFINITY),
        255 => Ok(f64::NEG_INFINITY),
        len => {
            let mut buf = vec![0u8; len as usize];
            r.read_exact(&mut buf)?;
            std::str::from_utf8(&buf)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| CanalError::protocol("invalid float text"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn raw_string_round_trips() {
        let mut bytes = vec![0x05u8];
        bytes.extend_from_slice(b"hello");
        assert_eq!(read_string(&mut Cursor::new(bytes)).unwrap(), b"hello");
    }

    #[test]
    fn int16_renders_as_decimal_text() {
        let mut bytes = vec![0xc1u8];
        bytes.extend_from_slice(&(-1000i16).to_le_bytes());
        assert_eq!(read_string(&mut Cursor::new(bytes)).unwrap(), b"-1000");
    }

    #[test]
    fn lzf_blob_decompresses() {
        let mut bytes = vec![0xc3u8];
        bytes.push(4); // compressed length
        bytes.push(3); // decompressed length
        bytes.extend_from_slice(&[2, b'a', b'b', b'c']);
        assert_eq!(read_string(&mut Cursor::new(bytes)).unwrap(), b"abc");
    }

    #[test]
    fn text_float_special_cases() {
        assert!(read_float64_text(&mut Cursor::new([253])).unwrap().is_nan());
        assert_eq!(read_float64_text(&mut Cursor::new([254])).unwrap(), f64::INFINITY);
        assert_eq!(read_float64_text(&mut Cursor::new([255])).unwrap(), f64::NEG_INFINITY);
        let mut bytes = vec![3u8];
        bytes.extend_from_slice(b"1.5");
        assert_eq!(read_float64_text(&mut Cursor::new(bytes)).unwrap(), 1.5);
    }

    #[test]
    fn binary_float_reads_little_endian_bits() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1.5f64.to_bits().to_le_bytes());
        assert_eq!(read_binary_float64(&mut Cursor::new(bytes)).unwrap(), 1.5);
    }
}
