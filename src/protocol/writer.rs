//! Buffered RESP writer (C2).

use std::io::Write;

use crate::error::Result;
use crate::protocol::value::{multi_bulk_value, Arg, Value};

/// A buffered sink. Each write records the bytes just written in `cur` for
/// test/inspection, then flushes immediately — replication handshakes and
/// acks are latency-sensitive single commands, not a pipelined stream.
pub struct Writer<W> {
    inner: W,
    cur: Vec<u8>,
}

impl<W: Write> Writer<W> {
    pub fn new(inner: W) -> Self {
        Writer {
            inner,
            cur: Vec::new(),
        }
    }

    pub fn write_multi_bulk(&mut self, command_name: &str, args: &[Arg]) -> Result<()> {
        let value = multi_bulk_value(command_name, args);
        self.write_value(&value)
    }

    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        let bytes = value.marshal()?;
        self.inner.write_all(&bytes)?;
        self.inner.flush()?;
        self.cur = bytes;
        Ok(())
    }

    /// The bytes written by the most recent call, kept around for tests.
    pub fn cur(&self) -> &[u8] {
        &self.cur
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}
