//! Socket→pipe decoupling (C4): the handshake/ack writer must keep using
//! the socket directly while the RDB decoder and the live command loop
//! consume a plain `Read`, without the decoder blocking the socket reader
//! (or vice versa) on backpressure.
//!
//! A bounded `std::sync::mpsc` channel of byte chunks, fed by a relay
//! thread reading off the socket, drained by a [`PipeReader`] that
//! implements [`std::io::Read`], gives an in-process duplex pipe without
//! pulling in a separate channel crate.

use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

/// One data frame's worth of socket bytes: large enough that a normal
/// reply or command doesn't fragment across many channel sends.
const CHUNK_SIZE: usize = 4108;
/// The free list never grows past this many buffers in flight.
const MAX_INFLIGHT: usize = 2048;

/// Reads chunks off a `Read` source on a background thread and relays them
/// through a bounded channel, so a slow consumer never stalls the socket
/// read loop beyond the channel's own depth.
pub struct PipeReader {
    rx: Receiver<io::Result<Vec<u8>>>,
    current: Vec<u8>,
    pos: usize,
    done: bool,
}

impl PipeReader {
    /// Spawns the relay thread and returns a reader over its output. The
    /// thread exits, and the pipe reports EOF, once `source` returns `Ok(0)`
    /// or an error.
    pub fn spawn<R: Read + Send + 'static>(mut source: R) -> Self {
        let (tx, rx): (SyncSender<io::Result<Vec<u8>>>, _) = mpsc::sync_channel(MAX_INFLIGHT);
        thread::spawn(move || loop {
            let mut buf = vec![0u8; CHUNK_SIZE];
            match source.read(&mut buf) {
                Ok(0) => {
                    let _ = tx.send(Ok(Vec::new()));
                    return;
                }
                Ok(n) => {
                    buf.truncate(n);
                    if tx.send(Ok(buf)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            }
        });
        PipeReader {
            rx,
            current: Vec::new(),
            pos: 0,
            done: false,
        }
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.done {
            return Ok(0);
        }
        if self.pos >= self.current.len() {
            match self.rx.recv() {
                Ok(Ok(chunk)) if chunk.is_empty() => {
                    self.done = true;
                    return Ok(0);
                }
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Ok(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                Err(_) => {
                    self.done = true;
                    return Ok(0);
                }
            }
        }
        let n = (self.current.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn relays_all_bytes_across_chunk_boundaries() {
        let data = vec![7u8; CHUNK_SIZE * 3 + 17];
        let mut reader = PipeReader::spawn(Cursor::new(data.clone()));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn empty_source_yields_immediate_eof() {
        let mut reader = PipeReader::spawn(Cursor::new(Vec::new()));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }

    struct Failing;
    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        }
    }

    #[test]
    fn source_error_propagates() {
        let mut reader = PipeReader::spawn(Failing);
        let mut byte = [0u8; 1];
        assert!(reader.read(&mut byte).is_err());
    }
}
