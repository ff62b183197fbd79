//! Zipmap decoding: the pre-ziplist hash encoding. A length byte (254/255
//! mean "scan to find out"), then alternating field/value entries, each
//! carrying a trailing free-byte count of unused padding.

use crate::command::Decoder;
use crate::error::{CanalError, Result};
use crate::rdb::slice::SliceBuffer;

/// Reads one item's `(length, free)`, or `(-1, 0)` at the `255` terminator.
fn read_item_length(buf: &mut SliceBuffer, read_free: bool) -> Result<(i64, u8)> {
    let b = buf.read_byte()?;
    match b {
        253 => {
            let s = buf.slice(5)?;
            let len = u32::from_be_bytes(s[..4].try_into().unwrap());
            Ok((len as i64, s[4]))
        }
        254 => Err(CanalError::protocol("invalid zipmap item length")),
        255 => Ok((-1, 0)),
        _ => {
            let free = if read_free { buf.read_byte()? } else { 0 };
            Ok((b as i64, free))
        }
    }
}

fn read_item(buf: &mut SliceBuffer, read_free: bool) -> Result<Option<Vec<u8>>> {
    let (length, free) = read_item_length(buf, read_free)?;
    if length < 0 {
        return Ok(None);
    }
    let value = buf.slice(length as usize)?.to_vec();
    buf.skip(free as usize);
    Ok(Some(value))
}

fn count_items(buf: &mut SliceBuffer) -> Result<usize> {
    let start = buf.pos();
    let mut n = 0usize;
    loop {
        let (length, free) = read_item_length(buf, n % 2 != 0)?;
        if length < 0 {
            break;
        }
        buf.skip(length as usize + free as usize);
        n += 1;
    }
    buf.seek(start);
    Ok(n)
}

pub fn decode_zipmap(data: &[u8], key: &[u8], expiry: i64, sink: &mut impl Decoder) -> Result<()> {
    let mut buf = SliceBuffer::new(data);
    let len_byte = buf.read_byte()?;
    let length = if len_byte >= 254 {
        count_items(&mut buf)? / 2
    } else {
        len_byte as usize
    };

    sink.begin_hash(key, length as i64, expiry);
    for _ in 0..length {
        let field = read_item(&mut buf, false)?.unwrap_or_default();
        let value = read_item(&mut buf, true)?.unwrap_or_default();
        sink.hset(key, &field, &value)?;
    }
    sink.end_hash(key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Nop;

    fn small_item(bytes: &[u8], free: u8) -> Vec<u8> {
        let mut out = vec![bytes.len() as u8];
        out.extend_from_slice(bytes);
        if free > 0 {
            out.extend(std::iter::repeat(0u8).take(free as usize));
        }
        out
    }

    #[test]
    fn decodes_one_pair_with_explicit_count() {
        let mut data = vec![1u8];
        data.extend(small_item(b"f", 0));
        let mut value_item = vec![1u8];
        value_item.extend_from_slice(b"v");
        value_item.push(0); // free byte after value
        value_item.push(255); // terminator
        data.extend(value_item);

        let mut sink = Nop;
        decode_zipmap(&data, b"k", 0, &mut sink).unwrap();
    }

    #[test]
    fn rejects_reserved_254_length() {
        let data = vec![1u8, 254];
        let mut sink = Nop;
        assert!(decode_zipmap(&data, b"k", 0, &mut sink).is_err());
    }
}
