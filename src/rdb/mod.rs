//! RDB (snapshot) decoding (C3): walks a binary database dump, emitting
//! logical events through a [`Decoder`] sink. See `length`, `string`,
//! `lzf`, `ziplist`, `listpack`, `zipmap`, `intset`, and `stream` for the
//! nested sub-encodings this format packs strings into.

pub mod intset;
pub mod length;
pub mod listpack;
pub mod lzf;
pub mod slice;
pub mod stream;
pub mod string;
pub mod ziplist;
pub mod zipmap;

use std::io::Read;

use crate::command::Decoder;
use crate::error::{CanalError, Result};
use crate::rdb::length::{
    read_length, read_u16_le, read_u32_le, read_u64_le, read_u8, OPCODE_AUX, OPCODE_EOF, OPCODE_EXPIRY,
    OPCODE_EXPIRY_MS, OPCODE_FREQ, OPCODE_IDLE, OPCODE_MODULE_AUX, OPCODE_RESIZE_DB, OPCODE_SELECT_DB, RDB_VERSION,
};
use crate::rdb::string::{read_binary_float64, read_float64_text, read_string};

pub const TYPE_STRING: u8 = 0;
pub const TYPE_LIST: u8 = 1;
pub const TYPE_SET: u8 = 2;
pub const TYPE_ZSET: u8 = 3;
pub const TYPE_HASH: u8 = 4;
pub const TYPE_ZSET2: u8 = 5;
pub const TYPE_MODULE: u8 = 6;
pub const TYPE_MODULE2: u8 = 7;
pub const TYPE_HASH_ZIPMAP: u8 = 9;
pub const TYPE_LIST_ZIPLIST: u8 = 10;
pub const TYPE_SET_INTSET: u8 = 11;
pub const TYPE_ZSET_ZIPLIST: u8 = 12;
pub const TYPE_HASH_ZIPLIST: u8 = 13;
pub const TYPE_LIST_QUICKLIST: u8 = 14;
pub const TYPE_STREAM_LISTPACKS: u8 = 15;

/// Scans forward for the `R` that starts the `REDIS<vvvv>` magic, exactly
/// as the original decoder's defensive `checkHeader` does, then validates
/// the rest of the preamble.
fn check_header(r: &mut impl Read) -> Result<()> {
    loop {
        let b = read_u8(r)?;
        if b == b'R' {
            break;
        }
    }
    let mut rest = [0u8; 8];
    r.read_exact(&mut rest)?;
    if &rest[0..4] != b"EDIS" {
        return Err(CanalError::protocol(format!(
            "invalid file format, header R{}",
            String::from_utf8_lossy(&rest)
        )));
    }
    let version: i64 = std::str::from_utf8(&rest[4..8])
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(-1);
    if !(1..=RDB_VERSION).contains(&version) {
        return Err(CanalError::protocol(format!("invalid RDB version number {}", version)));
    }
    Ok(())
}

/// Decodes one RDB snapshot from `r`, calling `sink` once per logical event,
/// and leaves `r` positioned at the first byte after the snapshot's `EOF`
/// opcode and 8-byte CRC trailer (which is read and discarded — CRC
/// validation is out of scope).
pub fn decode(r: &mut impl Read, sink: &mut impl Decoder) -> Result<()> {
    check_header(r)?;
    sink.begin_rdb();

    let mut db: i64 = 0;
    let mut expiry: i64 = 0;
    let mut lru_idle: u64 = 0;
    let mut lfu_freq: i64 = 0;
    let mut first_db = true;

    loop {
        let op = read_u8(r)?;
        match op {
            OPCODE_FREQ => {
                lfu_freq = read_u8(r)? as i64;
            }
            OPCODE_IDLE => {
                let (idle, _) = read_length(r)?;
                lru_idle = idle;
            }
            OPCODE_AUX => {
                let key = read_string(r)?;
                let value = read_string(r)?;
                sink.aux(&key, &value);
            }
            OPCODE_RESIZE_DB => {
                let (db_size, _) = read_length(r)?;
                let (expires_size, _) = read_length(r)?;
                sink.resize_database(db_size as u32, expires_size as u32);
            }
            OPCODE_EXPIRY_MS => {
                expiry = read_u64_le(r)? as i64;
            }
            OPCODE_EXPIRY => {
                expiry = read_u32_le(r)? as i64 * 1000;
            }
            OPCODE_SELECT_DB => {
                if !first_db {
                    sink.end_database(db);
                }
                first_db = false;
                let (n, _) = read_length(r)?;
                db = n as i64;
                sink.begin_database(db)?;
            }
            OPCODE_EOF => {
                sink.end_database(db);
                sink.end_rdb();
                let mut crc = [0u8; 8];
                r.read_exact(&mut crc)?;
                return Ok(());
            }
            OPCODE_MODULE_AUX => {
                // Module-typed aux records are out of scope; the original
                // decoder has no handling for this opcode either, beyond
                // falling through to the next record.
            }
            other => {
                let key = read_string(r)?;
                read_object(r, &key, other, expiry, sink)?;
                let _ = (lfu_freq, lru_idle);
                expiry = 0;
                lfu_freq = 0;
                lru_idle = 0;
            }
        }
    }
}

fn read_object(r: &mut impl Read, key: &[u8], typ: u8, expiry: i64, sink: &mut impl Decoder) -> Result<()> {
    match typ {
        TYPE_STRING => {
            let value = read_string(r)?;
            sink.set(key, &value, expiry)
        }
        TYPE_LIST => {
            let (length, _) = read_length(r)?;
            sink.begin_list(key, length as i64, expiry);
            for _ in 0..length {
                let value = read_string(r)?;
                sink.rpush(key, &value)?;
            }
            sink.end_list(key);
            Ok(())
        }
        TYPE_LIST_QUICKLIST => {
            let (length, _) = read_length(r)?;
            sink.begin_list(key, -1, expiry);
            for _ in 0..length {
                let node = read_string(r)?;
                ziplist::decode_ziplist_as_list(&node, key, 0, false, sink)?;
            }
            sink.end_list(key);
            Ok(())
        }
        TYPE_SET => {
            let (cardinality, _) = read_length(r)?;
            sink.begin_set(key, cardinality as i64, expiry);
            for _ in 0..cardinality {
                let member = read_string(r)?;
                sink.sadd(key, &member)?;
            }
            sink.end_set(key);
            Ok(())
        }
        TYPE_ZSET | TYPE_ZSET2 => {
            let (cardinality, _) = read_length(r)?;
            sink.begin_zset(key, cardinality as i64, expiry);
            for _ in 0..cardinality {
                let member = read_string(r)?;
                let score = if typ == TYPE_ZSET2 {
                    read_binary_float64(r)?
                } else {
                    read_float64_text(r)?
                };
                sink.zadd(key, score, &member)?;
            }
            sink.end_zset(key);
            Ok(())
        }
        TYPE_HASH => {
            let (length, _) = read_length(r)?;
            sink.begin_hash(key, length as i64, expiry);
            for _ in 0..length {
                let field = read_string(r)?;
                let value = read_string(r)?;
                sink.hset(key, &field, &value)?;
            }
            sink.end_hash(key);
            Ok(())
        }
        TYPE_HASH_ZIPMAP => {
            let blob = read_string(r)?;
            zipmap::decode_zipmap(&blob, key, expiry, sink)
        }
        TYPE_LIST_ZIPLIST => {
            let blob = read_string(r)?;
            ziplist::decode_ziplist_as_list(&blob, key, expiry, true, sink)
        }
        TYPE_SET_INTSET => {
            let blob = read_string(r)?;
            intset::decode_intset(&blob, key, expiry, sink)
        }
        TYPE_ZSET_ZIPLIST => {
            let blob = read_string(r)?;
            ziplist::decode_ziplist_as_zset(&blob, key, expiry, sink)
        }
        TYPE_HASH_ZIPLIST => {
            let blob = read_string(r)?;
            ziplist::decode_ziplist_as_hash(&blob, key, expiry, sink)
        }
        TYPE_STREAM_LISTPACKS => stream::decode_stream(r, key, expiry, sink),
        TYPE_MODULE | TYPE_MODULE2 => Err(CanalError::UnsupportedModule),
        other => Err(CanalError::protocol(format!(
            "unknown object type {} for key {}",
            other,
            String::from_utf8_lossy(key)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Decoder, RDBDecoder};
    use std::io::Cursor;

    #[derive(Default)]
    struct Collector {
        events: Vec<String>,
    }

    impl RDBDecoder for Collector {
        fn begin_rdb(&mut self) {
            self.events.push("BeginRDB".into());
        }
        fn end_rdb(&mut self) {
            self.events.push("EndRDB".into());
        }
    }

    impl Decoder for Collector {
        fn begin_database(&mut self, n: i64) -> Result<()> {
            self.events.push(format!("BeginDatabase({})", n));
            Ok(())
        }
        fn end_database(&mut self, n: i64) {
            self.events.push(format!("EndDatabase({})", n));
        }
        fn set(&mut self, key: &[u8], value: &[u8], expiry: i64) -> Result<()> {
            self.events.push(format!(
                "Set({},{},{})",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value),
                expiry
            ));
            Ok(())
        }
    }

    fn length_byte(n: u8) -> u8 {
        n & 0x3f
    }

    #[test]
    fn one_string_key_snapshot_emits_expected_event_sequence() {
        let mut data = Vec::new();
        data.extend_from_slice(b"REDIS0009");
        data.push(OPCODE_SELECT_DB);
        data.push(length_byte(0));
        data.push(TYPE_STRING);
        data.push(length_byte(1));
        data.push(b'a');
        data.push(length_byte(1));
        data.push(b'b');
        data.push(OPCODE_EOF);
        data.extend_from_slice(&[0u8; 8]);

        let mut collector = Collector::default();
        let mut r = Cursor::new(data);
        decode(&mut r, &mut collector).unwrap();

        assert_eq!(
            collector.events,
            vec![
                "BeginRDB".to_string(),
                "BeginDatabase(0)".to_string(),
                "Set(a,b,0)".to_string(),
                "EndDatabase(0)".to_string(),
                "EndRDB".to_string(),
            ]
        );
    }

    #[test]
    fn reader_is_left_positioned_after_crc_trailer() {
        let mut data = Vec::new();
        data.extend_from_slice(b"REDIS0009");
        data.push(OPCODE_EOF);
        data.extend_from_slice(&[0u8; 8]);
        data.extend_from_slice(b"trailing");

        let mut collector = Collector::default();
        let mut r = Cursor::new(data);
        decode(&mut r, &mut collector).unwrap();

        let mut rest = Vec::new();
        r.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"trailing");
    }

    #[test]
    fn module_type_fails_fast() {
        let mut data = Vec::new();
        data.extend_from_slice(b"REDIS0009");
        data.push(length_byte(1));
        data.push(b'k');
        data.push(6); // TYPE_MODULE
        let mut collector = Collector::default();
        let mut r = Cursor::new(data);
        assert!(decode(&mut r, &mut collector).is_err());
    }

    #[test]
    fn leading_garbage_before_magic_is_skipped() {
        let mut data = vec![0x01, 0x02];
        data.extend_from_slice(b"REDIS0009");
        data.push(OPCODE_EOF);
        data.extend_from_slice(&[0u8; 8]);
        let mut collector = Collector::default();
        let mut r = Cursor::new(data);
        decode(&mut r, &mut collector).unwrap();
    }
}
