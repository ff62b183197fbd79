//! An in-memory cursor over an already-read RDB blob (a ziplist, listpack,
//! zipmap or intset payload). Mirrors the permissive peek-without-advance
//! semantics the stream/ziplist/listpack readers all depend on.

use std::io;

pub struct SliceBuffer<'a> {
    s: &'a [u8],
    i: usize,
}

impl<'a> SliceBuffer<'a> {
    pub fn new(s: &'a [u8]) -> Self {
        SliceBuffer { s, i: 0 }
    }

    /// Reads and advances past `n` bytes.
    pub fn slice(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.i + n > self.s.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        }
        let b = &self.s[self.i..self.i + n];
        self.i += n;
        Ok(b)
    }

    pub fn skip(&mut self, n: usize) {
        let _ = self.slice(n).expect("slice buffer skip out of range");
    }

    pub fn read_byte(&mut self) -> io::Result<u8> {
        if self.i >= self.s.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        }
        let b = self.s[self.i];
        self.i += 1;
        Ok(b)
    }

    /// Peeks up to `length` bytes without advancing the cursor. Zero-pads
    /// when fewer than `length` bytes remain, only failing once the cursor
    /// has run off the end entirely — listpack callers rely on this to size
    /// a fixed-width read before deciding how far to `skip`.
    pub fn first(&self, length: usize) -> io::Result<Vec<u8>> {
        if self.i >= self.s.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        }
        let mut buf = vec![0u8; length];
        let avail = &self.s[self.i..];
        let n = avail.len().min(length);
        buf[..n].copy_from_slice(&avail[..n]);
        Ok(buf)
    }

    pub fn seek(&mut self, pos: usize) {
        self.i = pos;
    }

    pub fn pos(&self) -> usize {
        self.i
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_zero_pads_near_the_end() {
        let data = [1u8, 2, 3];
        let mut buf = SliceBuffer::new(&data);
        buf.skip(2);
        assert_eq!(buf.first(4).unwrap(), vec![3, 0, 0, 0]);
    }

    #[test]
    fn first_errors_once_the_cursor_is_past_the_end() {
        let data = [1u8];
        let mut buf = SliceBuffer::new(&data);
        buf.skip(1);
        assert!(buf.first(4).is_err());
    }

    #[test]
    fn slice_advances_and_bounds_checks() {
        let data = [1u8, 2, 3, 4];
        let mut buf = SliceBuffer::new(&data);
        assert_eq!(buf.slice(2).unwrap(), &[1, 2]);
        assert_eq!(buf.slice(2).unwrap(), &[3, 4]);
        assert!(buf.slice(1).is_err());
    }
}
