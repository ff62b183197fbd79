//! Stream decoding (`StreamListPacks`). Each outer entry packs a base
//! stream id plus a listpack blob holding a "master" field list and a run of
//! delta-encoded sub-entries; consumer-group bookkeeping trails the entries
//! and is read only to advance the cursor; it does not surface a command.

use crate::command::Decoder;
use crate::error::{CanalError, Result};
use crate::rdb::length::read_length;
use crate::rdb::listpack::{read_listpack_entry, read_u_int};
use crate::rdb::slice::SliceBuffer;
use crate::rdb::string::read_string;

const LP_EOF: u8 = 0xff;
const STREAM_ITEM_FLAG_DELETED: u64 = 1 << 0;
const STREAM_ITEM_FLAG_SAMEFIELDS: u64 = 1 << 1;

fn read_stream_id(r: &mut impl std::io::Read) -> Result<(u64, u64)> {
    let entry = read_string(r)?;
    let mut buf = SliceBuffer::new(&entry);
    let ms = u64::from_be_bytes(buf.slice(8)?.try_into().unwrap());
    let seq = u64::from_be_bytes(buf.slice(8)?.try_into().unwrap());
    Ok((ms, seq))
}

fn lp_uint(buf: &mut SliceBuffer) -> Result<u64> {
    read_u_int(&read_listpack_entry(buf)?)
}

pub fn decode_stream(r: &mut impl std::io::Read, key: &[u8], expiry: i64, sink: &mut impl Decoder) -> Result<()> {
    let (cardinality, _) = read_length(r)?;
    sink.begin_stream(key, cardinality as i64, expiry);

    for _ in 0..cardinality {
        let (base_ms, base_seq) = read_stream_id(r)?;
        let lp_data = read_string(r)?;
        let mut lp = SliceBuffer::new(&lp_data);
        lp.skip(4); // total-bytes
        lp.skip(2); // num-elements

        // Master entry: count, deleted, num_fields, field_1..field_N, terminator.
        let count = lp_uint(&mut lp)?;
        let deleted = lp_uint(&mut lp)?;
        let num_fields = lp_uint(&mut lp)?;
        let mut fields = Vec::with_capacity(num_fields as usize);
        for _ in 0..num_fields {
            fields.push(read_listpack_entry(&mut lp)?);
        }
        read_listpack_entry(&mut lp)?; // master entry's own lp-count

        let mut base_ms = base_ms;
        let mut base_seq = base_seq;
        let mut total = count + deleted;
        while total > 0 {
            total -= 1;
            let flags = lp_uint(&mut lp)?;
            let ms_delta = lp_uint(&mut lp)?;
            let seq_delta = lp_uint(&mut lp)?;
            base_ms = base_ms.wrapping_add(ms_delta);
            base_seq = base_seq.wrapping_add(seq_delta);

            let mut payload = Vec::new();
            if flags & STREAM_ITEM_FLAG_SAMEFIELDS != 0 {
                for field in &fields {
                    payload.extend_from_slice(field);
                    payload.push(b' ');
                    let value = read_listpack_entry(&mut lp)?;
                    payload.extend_from_slice(&value);
                    payload.push(b' ');
                }
            } else {
                let entry_num_fields = lp_uint(&mut lp)?;
                for _ in 0..entry_num_fields {
                    let field = read_listpack_entry(&mut lp)?;
                    payload.extend_from_slice(&field);
                    payload.push(b' ');
                    let value = read_listpack_entry(&mut lp)?;
                    payload.extend_from_slice(&value);
                    payload.push(b' ');
                }
            }
            if payload.last() == Some(&b' ') {
                payload.pop();
            }
            read_listpack_entry(&mut lp)?; // per-entry lp-count

            if flags & STREAM_ITEM_FLAG_DELETED == 0 {
                let id = format!("{}-{}", base_ms, base_seq);
                sink.xadd(key, id.as_bytes(), &payload)?;
            }
        }

        let eof = lp.read_byte()?;
        if eof != LP_EOF {
            return Err(CanalError::protocol("rdb listpack eof unexpected"));
        }
    }

    // items, last_id_ms, last_id_seq
    for _ in 0..3 {
        read_length(r)?;
    }

    let (groups, _) = read_length(r)?;
    for _ in 0..groups {
        read_string(r)?; // group name
        read_length(r)?; // last-delivered id ms
        read_length(r)?; // last-delivered id seq

        let (pel, _) = read_length(r)?;
        for _ in 0..pel {
            let mut entry = [0u8; 16];
            std::io::Read::read_exact(r, &mut entry)?;
        }

        let (consumers, _) = read_length(r)?;
        for _ in 0..consumers {
            read_string(r)?; // consumer name
            let (consumer_pel, _) = read_length(r)?;
            for _ in 0..consumer_pel {
                let mut entry = [0u8; 16];
                std::io::Read::read_exact(r, &mut entry)?;
            }
        }
    }

    sink.end_stream(key);
    Ok(())
}
