//! Buffered, fragmentation-tolerant RESP reader (C2).
//!
//! Wraps any [`std::io::Read`] source and blocks on it the way the
//! replication driver's socket does — it never assumes a single underlying
//! `read()` call delivers a complete frame.

use std::io::{self, BufRead, BufReader, Read};

use crate::error::{CanalError, Result};
use crate::protocol::value::{Tag, Value};

const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
const MAX_ARRAY_LEN: i64 = 1024 * 1024;

pub struct Reader<R> {
    inner: BufReader<R>,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Reader {
            inner: BufReader::with_capacity(4096, inner),
        }
    }

    /// Reads one arbitrary top-level value. Returns the value and the
    /// number of bytes consumed from the wire.
    pub fn read_bulk(&mut self) -> Result<(Value, usize)> {
        self.read_value(false)
    }

    /// Reads one array value; also used for the telnet-style inline form.
    pub fn read_multi_bulk(&mut self) -> Result<(Value, usize)> {
        self.read_value(true)
    }

    fn read_value(&mut self, multibulk: bool) -> Result<(Value, usize)> {
        let mut byte = [0u8; 1];
        let read = self.inner.read(&mut byte)?;
        if read == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into());
        }
        let c = byte[0];
        let (value, rest) = match c {
            b'*' => self.read_array_value(multibulk)?,
            b'+' => self.read_simple(Tag::SimpleString)?,
            b'-' => self.read_simple(Tag::Error)?,
            b':' => self.read_integer_value()?,
            b'$' => self.read_bulk_value()?,
            0x0a | b'0' => {
                return Ok((
                    Value {
                        tag: Tag::None,
                        integer: 0,
                        str_: Vec::new(),
                        array: None,
                        null: true,
                        size: 1,
                    },
                    1,
                ))
            }
            other => {
                eprintln!("opcode error {}", other);
                return Ok((
                    Value {
                        tag: Tag::None,
                        integer: 0,
                        str_: Vec::new(),
                        array: None,
                        null: false,
                        size: 1,
                    },
                    1,
                ));
            }
        };
        Ok((value, 1 + rest))
    }

    fn read_line(&mut self) -> Result<(Vec<u8>, usize)> {
        let mut buf = Vec::new();
        let n = self.inner.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into());
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        let consumed = buf.len() + 2;
        Ok((buf, consumed))
    }

    fn read_int(&mut self) -> Result<(i64, usize)> {
        let (line, n) = self.read_line()?;
        let s = std::str::from_utf8(&line).map_err(|_| CanalError::protocol("invalid integer"))?;
        let v: i64 = s.trim().parse().map_err(|_| CanalError::protocol("invalid integer"))?;
        Ok((v, n))
    }

    fn read_simple(&mut self, tag: Tag) -> Result<(Value, usize)> {
        let (line, n) = self.read_line()?;
        Ok((
            Value {
                tag,
                integer: 0,
                str_: line,
                array: None,
                null: false,
                size: 0,
            },
            n,
        ))
    }

    fn read_integer_value(&mut self) -> Result<(Value, usize)> {
        let (i, n) = self
            .read_int()
            .map_err(|_| CanalError::protocol("invalid integer"))?;
        Ok((
            Value {
                tag: Tag::Integer,
                integer: i,
                str_: Vec::new(),
                array: None,
                null: false,
                size: 0,
            },
            n,
        ))
    }

    fn read_bulk_value(&mut self) -> Result<(Value, usize)> {
        let (l, mut n) = self
            .read_int()
            .map_err(|_| CanalError::protocol("invalid bulk length"))?;
        if l < 0 {
            return Ok((
                Value {
                    tag: Tag::BulkString,
                    integer: 0,
                    str_: Vec::new(),
                    array: None,
                    null: true,
                    size: 0,
                },
                n,
            ));
        }
        if l > MAX_BULK_LEN {
            return Err(CanalError::protocol("invalid bulk length"));
        }
        let l = l as usize;
        let mut buf = vec![0u8; l + 2];
        self.inner.read_exact(&mut buf)?;
        n += l + 2;
        if buf[l] != b'\r' || buf[l + 1] != b'\n' {
            return Err(CanalError::protocol("invalid bulk line ending"));
        }
        buf.truncate(l);
        Ok((
            Value {
                tag: Tag::BulkString,
                integer: 0,
                str_: buf,
                array: None,
                null: false,
                size: 0,
            },
            n,
        ))
    }

    fn read_array_value(&mut self, multibulk: bool) -> Result<(Value, usize)> {
        let (l, mut n) = match self.read_int() {
            Ok(v) => v,
            Err(_) if multibulk => return Err(CanalError::protocol("invalid multibulk length")),
            Err(_) => return Err(CanalError::protocol("invalid array length")),
        };
        if l > MAX_ARRAY_LEN {
            return Err(if multibulk {
                CanalError::protocol("invalid multibulk length")
            } else {
                CanalError::protocol("invalid array length")
            });
        }
        if l < 0 {
            return Ok((
                Value {
                    tag: Tag::Array,
                    integer: 0,
                    str_: Vec::new(),
                    array: None,
                    null: true,
                    size: 0,
                },
                n,
            ));
        }
        let mut vals = Vec::with_capacity(l as usize);
        for _ in 0..l {
            let (v, rn) = self.read_value(multibulk)?;
            n += rn;
            vals.push(v);
        }
        Ok((
            Value {
                tag: Tag::Array,
                integer: 0,
                str_: Vec::new(),
                array: Some(vals),
                null: false,
                size: 0,
            },
            n,
        ))
    }

    /// Hands back the underlying reader, discarding this reader's buffer.
    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }

    pub fn get_mut(&mut self) -> &mut R {
        self.inner.get_mut()
    }

    /// Hands back the underlying `BufReader` itself, buffered bytes and all.
    /// Used to pass the socket to the RDB decoder mid-stream without losing
    /// bytes the framed reader already pulled off the wire, then rebuild a
    /// `Reader` over the same buffer once the snapshot has been consumed.
    pub fn into_buf_reader(self) -> BufReader<R> {
        self.inner
    }

    pub fn from_buf_reader(inner: BufReader<R>) -> Self {
        Reader { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_three_integers_then_eof() {
        let mut r = Reader::new(Cursor::new(b":1234567\r\n:-90898\r\n:0\r\n".to_vec()));
        let (v1, n1) = r.read_bulk().unwrap();
        assert_eq!(v1.integer(), 1234567);
        let (v2, n2) = r.read_bulk().unwrap();
        assert_eq!(v2.integer(), -90898);
        let (v3, n3) = r.read_bulk().unwrap();
        assert_eq!(v3.integer(), 0);
        assert_eq!(n1 + n2 + n3, 24);
        assert!(r.read_bulk().is_err());
    }

    #[test]
    fn big_fragmented_bulk_reassembles() {
        let payload = vec![7u8; 10 * 1024 * 1024];
        let mut frame = Vec::new();
        frame.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$3\r\nKEY\r\n");
        frame.extend_from_slice(format!("${}\r\n", payload.len()).as_bytes());
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(b"\r\n");

        struct Chunked {
            data: Vec<u8>,
            pos: usize,
            chunk: usize,
        }
        impl Read for Chunked {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if self.pos >= self.data.len() {
                    return Ok(0);
                }
                let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
                buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
                self.pos += n;
                Ok(n)
            }
        }

        let total = frame.len();
        let mut r = Reader::new(Chunked {
            data: frame,
            pos: 0,
            chunk: 1024,
        });
        let (v, n) = r.read_multi_bulk().unwrap();
        let arr = v.array().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr[0].string(), "SET");
        assert_eq!(arr[1].string(), "KEY");
        assert_eq!(arr[2].bytes().len(), payload.len());
        assert_eq!(n, total);
    }

    #[test]
    fn idle_filler_bytes_are_tolerated() {
        let mut r = Reader::new(Cursor::new(vec![0x0au8]));
        let (v, n) = r.read_bulk().unwrap();
        assert!(v.is_null());
        assert_eq!(n, 1);
    }

    #[test]
    fn unknown_opcode_is_permissive() {
        let mut r = Reader::new(Cursor::new(vec![b'Z']));
        let (v, n) = r.read_bulk().unwrap();
        assert_eq!(n, 1);
        assert!(!v.is_null() || v.tag == Tag::None);
    }

    #[test]
    fn null_bulk_and_null_array() {
        let mut r = Reader::new(Cursor::new(b"$-1\r\n*-1\r\n".to_vec()));
        let (v1, _) = r.read_bulk().unwrap();
        assert!(v1.is_null());
        let (v2, _) = r.read_bulk().unwrap();
        assert!(v2.is_null());
        assert!(v2.array().is_none());
    }
}
