//! The logical command record and the event-sink trait surface (C5).

use std::fmt;

use crate::error::{CanalError, Result};

/// An ordered sequence of textual arguments. `verb()` is `D[0]`; `args()` is
/// `D[1..]`. Construction enforces `len(D) >= 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    d: Vec<String>,
}

impl Command {
    pub fn new(d: Vec<String>) -> Result<Self> {
        if d.is_empty() {
            return Err(CanalError::protocol("command requires at least one argument"));
        }
        Ok(Command { d })
    }

    /// Builds a command from a verb plus operands.
    pub fn from_parts(verb: impl Into<String>, args: &[String]) -> Result<Self> {
        let mut d = Vec::with_capacity(args.len() + 1);
        d.push(verb.into());
        d.extend_from_slice(args);
        Self::new(d)
    }

    /// Builds a command by splitting a string on CRLF.
    pub fn from_line(line: &str) -> Result<Self> {
        let d: Vec<String> = line.split("\r\n").map(|s| s.to_string()).collect();
        Self::new(d)
    }

    pub fn verb(&self) -> &str {
        &self.d[0]
    }

    /// `D[1..]` as a generic argument vector, for re-serializing the
    /// command back onto the wire.
    pub fn args(&self) -> &[String] {
        &self.d[1..]
    }

    pub fn d(&self) -> &[String] {
        &self.d
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.d.join(" "))
    }
}

/// The command sink: a non-`Ok` return aborts replication.
pub trait CommandDecoder {
    fn command(&mut self, cmd: &Command) -> Result<()>;
}

/// The subset of [`Decoder`] concerned with RDB-file framing rather than
/// per-key events.
pub trait RDBDecoder {
    /// Called when parsing of a valid RDB file begins.
    fn begin_rdb(&mut self) {}
    /// Called when parsing of the RDB file is complete.
    fn end_rdb(&mut self) {}
    /// An auxiliary key/value field (e.g. `repl-offset`, `repl-id`).
    fn aux(&mut self, _key: &[u8], _value: &[u8]) {}
    /// A resize-db hint: approximate key count and keys-with-expiry count.
    fn resize_database(&mut self, _db_size: u32, _expires_size: u32) {}
}

/// Translates snapshot events into logical writes. Every method has a
/// no-op default so implementers override only what matters; see [`Nop`]
/// for a ready-made no-op sink.
pub trait Decoder: RDBDecoder {
    /// Begins database `n`. Another database will not begin until
    /// `end_database` is called.
    fn begin_database(&mut self, _n: i64) -> Result<()> {
        Ok(())
    }
    fn end_database(&mut self, _n: i64) {}

    /// Called once for each string key.
    fn set(&mut self, _key: &[u8], _value: &[u8], _expiry: i64) -> Result<()> {
        Ok(())
    }

    /// `hset` is called exactly `length` times before `end_hash`.
    fn begin_hash(&mut self, _key: &[u8], _length: i64, _expiry: i64) {}
    fn hset(&mut self, _key: &[u8], _field: &[u8], _value: &[u8]) -> Result<()> {
        Ok(())
    }
    fn end_hash(&mut self, _key: &[u8]) {}

    /// `sadd` is called exactly `cardinality` times before `end_set`.
    fn begin_set(&mut self, _key: &[u8], _cardinality: i64, _expiry: i64) {}
    fn sadd(&mut self, _key: &[u8], _member: &[u8]) -> Result<()> {
        Ok(())
    }
    fn end_set(&mut self, _key: &[u8]) {}

    /// `rpush` is called exactly `length` times before `end_list`. If the
    /// length is unknown (a quicklist), `length` is `-1`.
    fn begin_list(&mut self, _key: &[u8], _length: i64, _expiry: i64) {}
    fn rpush(&mut self, _key: &[u8], _value: &[u8]) -> Result<()> {
        Ok(())
    }
    fn end_list(&mut self, _key: &[u8]) {}

    /// `zadd` is called exactly `cardinality` times before `end_zset`.
    fn begin_zset(&mut self, _key: &[u8], _cardinality: i64, _expiry: i64) {}
    fn zadd(&mut self, _key: &[u8], _score: f64, _member: &[u8]) -> Result<()> {
        Ok(())
    }
    fn end_zset(&mut self, _key: &[u8]) {}

    /// `xadd` is called once per live (non-deleted) entry in a stream.
    fn begin_stream(&mut self, _key: &[u8], _cardinality: i64, _expiry: i64) {}
    fn xadd(&mut self, _key: &[u8], _stream_id: &[u8], _listpack: &[u8]) -> Result<()> {
        Ok(())
    }
    fn end_stream(&mut self, _key: &[u8]) {}
}

/// A `Decoder` that ignores every event. Embed or delegate to it when only
/// a handful of event methods matter.
#[derive(Debug, Default, Clone, Copy)]
pub struct Nop;

impl RDBDecoder for Nop {}
impl Decoder for Nop {}
