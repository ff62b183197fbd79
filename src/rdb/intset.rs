//! Intset decoding, used by the `SetIntset` value type: a flat little-endian
//! array of fixed-width signed integers, each rendered as decimal text.

use crate::command::Decoder;
use crate::error::{CanalError, Result};
use crate::rdb::slice::SliceBuffer;

pub fn decode_intset(data: &[u8], key: &[u8], expiry: i64, sink: &mut impl Decoder) -> Result<()> {
    let mut buf = SliceBuffer::new(data);
    let int_size = u32::from_le_bytes(buf.slice(4)?.try_into().unwrap());
    if int_size != 2 && int_size != 4 && int_size != 8 {
        return Err(CanalError::protocol(format!("unknown intset encoding: {}", int_size)));
    }
    let cardinality = u32::from_le_bytes(buf.slice(4)?.try_into().unwrap());

    sink.begin_set(key, cardinality as i64, expiry);
    for _ in 0..cardinality {
        let bytes = buf.slice(int_size as usize)?;
        let text = match int_size {
            2 => i16::from_le_bytes(bytes.try_into().unwrap()).to_string(),
            4 => i32::from_le_bytes(bytes.try_into().unwrap()).to_string(),
            8 => i64::from_le_bytes(bytes.try_into().unwrap()).to_string(),
            _ => unreachable!(),
        };
        sink.sadd(key, text.as_bytes())?;
    }
    sink.end_set(key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Nop;

    fn intset(width: u32, values: &[i64]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&(values.len() as u32).to_le_bytes());
        for &v in values {
            match width {
                2 => out.extend_from_slice(&(v as i16).to_le_bytes()),
                4 => out.extend_from_slice(&(v as i32).to_le_bytes()),
                8 => out.extend_from_slice(&v.to_le_bytes()),
                _ => unreachable!(),
            }
        }
        out
    }

    #[test]
    fn decodes_16_bit_members() {
        let data = intset(2, &[-7, 42]);
        let mut sink = Nop;
        decode_intset(&data, b"k", 0, &mut sink).unwrap();
    }

    #[test]
    fn rejects_unknown_width() {
        let data = intset(4, &[]);
        let mut bad = data;
        bad[0] = 3;
        let mut sink = Nop;
        assert!(decode_intset(&bad, b"k", 0, &mut sink).is_err());
    }
}
