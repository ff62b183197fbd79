//! The RESP `Value` model: a tagged union over the five wire RESP kinds plus
//! the `Rdb` marker classification used to recognize a `FULLRESYNC` reply.

use std::fmt;

use crate::error::{CanalError, Result};

/// The wire tag a `Value` was parsed from or constructed as.
///
/// `None` is the zero value used for the idle-filler frames (`0x0A`, `'0'`)
/// and as the "nothing observed yet" default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    None,
    SimpleString,
    Error,
    Integer,
    BulkString,
    Array,
}

/// The logical classification returned by [`Value::kind`]. `Rdb` is never a
/// wire tag; it is derived when a `SimpleString` payload begins with the
/// token `FULLRESYNC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    None,
    SimpleString,
    Error,
    Integer,
    BulkString,
    Array,
    Rdb,
}

/// A tagged RESP value.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub tag: Tag,
    pub integer: i64,
    pub str_: Vec<u8>,
    pub array: Option<Vec<Value>>,
    pub null: bool,
    /// Bytes consumed on the wire when this value was read. Zero for
    /// values built programmatically.
    pub size: usize,
}

pub const NIL_VALUE: Value = Value {
    tag: Tag::None,
    integer: 0,
    str_: Vec::new(),
    array: None,
    null: true,
    size: 0,
};

impl Value {
    fn new(tag: Tag) -> Self {
        Value {
            tag,
            integer: 0,
            str_: Vec::new(),
            array: None,
            null: false,
            size: 0,
        }
    }

    /// Logical classification, recognizing the `FULLRESYNC` marker.
    pub fn kind(&self) -> Kind {
        if self.tag == Tag::SimpleString && self.str_.starts_with(b"FULLRESYNC") {
            return Kind::Rdb;
        }
        match self.tag {
            Tag::None => Kind::None,
            Tag::SimpleString => Kind::SimpleString,
            Tag::Error => Kind::Error,
            Tag::Integer => Kind::Integer,
            Tag::BulkString => Kind::BulkString,
            Tag::Array => Kind::Array,
        }
    }

    /// For an `Rdb`-classified value, extract `(repl_id, offset)` from the
    /// `FULLRESYNC <id> <offset>` payload.
    pub fn repl_info(&self) -> Option<(String, i64)> {
        if self.kind() != Kind::Rdb {
            return None;
        }
        let parts: Vec<&[u8]> = self.str_.split(|&b| b == b' ').collect();
        if parts.len() < 3 {
            return None;
        }
        let offset: i64 = std::str::from_utf8(parts[2]).ok()?.parse().ok()?;
        let repl_id = String::from_utf8_lossy(parts[1]).into_owned();
        Some((repl_id, offset))
    }

    pub fn integer(&self) -> i64 {
        match self.tag {
            Tag::Integer => self.integer,
            _ => self.string().parse().unwrap_or(0),
        }
    }

    pub fn float(&self) -> f64 {
        match self.tag {
            Tag::Integer => self.integer as f64,
            _ => self.string().parse().unwrap_or(0.0),
        }
    }

    pub fn bool_(&self) -> bool {
        self.integer() != 0
    }

    /// String coercion: raw payload text for bulk/simple/error, decimal for
    /// integer, and the space-joined (trailing space trimmed) coercion of
    /// each element, recursively, for array.
    pub fn string(&self) -> String {
        match self.tag {
            Tag::BulkString | Tag::SimpleString | Tag::Error => {
                String::from_utf8_lossy(&self.str_).into_owned()
            }
            Tag::Integer => self.integer.to_string(),
            Tag::Array => {
                let mut out = String::new();
                concat_array(&mut out, self.array.as_deref().unwrap_or(&[]));
                out.trim_end_matches(' ').to_string()
            }
            Tag::None => String::new(),
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        match self.tag {
            Tag::BulkString | Tag::SimpleString | Tag::Error => self.str_.clone(),
            _ => self.string().into_bytes(),
        }
    }

    pub fn error(&self) -> Option<String> {
        match self.tag {
            Tag::Error => Some(String::from_utf8_lossy(&self.str_).into_owned()),
            _ => None,
        }
    }

    /// `None` when the value isn't an array, or is an explicitly null one.
    pub fn array(&self) -> Option<&[Value]> {
        if self.tag == Tag::Array && !self.null {
            self.array.as_deref()
        } else {
            None
        }
    }

    pub fn is_null(&self) -> bool {
        self.null
    }

    /// Byte-equal marshalling defines equality between two `Value`s.
    pub fn equals(&self, other: &Value) -> bool {
        match (self.marshal(), other.marshal()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// The original serialized byte representation of this value.
    pub fn marshal(&self) -> Result<Vec<u8>> {
        match self.tag {
            Tag::None => {
                if self.null {
                    Ok(b"$-1\r\n".to_vec())
                } else {
                    Err(CanalError::protocol("unknown resp type encountered"))
                }
            }
            Tag::Error | Tag::SimpleString => Ok(marshal_simple(self.tag, &self.str_)),
            Tag::Integer => Ok(marshal_simple(Tag::Integer, self.integer.to_string().as_bytes())),
            Tag::BulkString => Ok(marshal_bulk(self)),
            Tag::Array => marshal_array(self),
        }
    }
}

fn concat_array(out: &mut String, vals: &[Value]) {
    for v in vals {
        out.push_str(&v.string());
        out.push(' ');
        if let Some(inner) = v.array() {
            concat_array(out, inner);
        }
    }
}

fn marshal_simple(tag: Tag, payload: &[u8]) -> Vec<u8> {
    let prefix = match tag {
        Tag::SimpleString => b'+',
        Tag::Error => b'-',
        Tag::Integer => b':',
        _ => unreachable!(),
    };
    let mut out = Vec::with_capacity(payload.len() + 3);
    out.push(prefix);
    out.extend_from_slice(payload);
    out.extend_from_slice(b"\r\n");
    out
}

fn marshal_bulk(v: &Value) -> Vec<u8> {
    if v.null {
        return b"$-1\r\n".to_vec();
    }
    let len = v.str_.len().to_string();
    let mut out = Vec::with_capacity(1 + len.len() + 2 + v.str_.len() + 2);
    out.push(b'$');
    out.extend_from_slice(len.as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&v.str_);
    out.extend_from_slice(b"\r\n");
    out
}

fn marshal_array(v: &Value) -> Result<Vec<u8>> {
    if v.null {
        return Ok(b"*-1\r\n".to_vec());
    }
    let elems = v.array.as_deref().unwrap_or(&[]);
    let len = elems.len().to_string();
    let mut out = Vec::with_capacity(3 + len.len() + 16 * elems.len());
    out.push(b'*');
    out.extend_from_slice(len.as_bytes());
    out.extend_from_slice(b"\r\n");
    for elem in elems {
        out.extend_from_slice(&elem.marshal()?);
    }
    Ok(out)
}

/// Marshals a value the way the telnet-style multi-bulk writer reports byte
/// counts: `(bytes, length)`, with `length == bytes.len()`.
pub fn multi_bulk_bytes(v: &Value) -> (Vec<u8>, usize) {
    let mut buf = Vec::new();
    match v.tag {
        Tag::SimpleString | Tag::Error => {
            let prefix = if v.tag == Tag::SimpleString { b'+' } else { b'-' };
            buf.push(prefix);
            buf.extend_from_slice(v.string().as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        Tag::BulkString | Tag::Integer => {
            buf.push(if v.tag == Tag::BulkString { b'$' } else { b':' });
            buf.extend_from_slice(v.string().len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            buf.extend_from_slice(v.string().as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
        Tag::Array => {
            buf.push(b'*');
            let elems = v.array.as_deref().unwrap_or(&[]);
            buf.extend_from_slice(elems.len().to_string().as_bytes());
            buf.extend_from_slice(b"\r\n");
            for elem in elems {
                let (bytes, _) = multi_bulk_bytes(elem);
                buf.extend_from_slice(&bytes);
            }
        }
        Tag::None => {}
    }
    let len = buf.len();
    (buf, len)
}

/// Carriage returns and newlines in the payload are rewritten to spaces, per
/// the RESP simple-string framing rule.
fn form_single_line(s: &str) -> String {
    s.chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

pub fn simple_string_value(s: &str) -> Value {
    let mut v = Value::new(Tag::SimpleString);
    v.str_ = form_single_line(s).into_bytes();
    v
}

pub fn error_value(err: &dyn std::error::Error) -> Value {
    let mut v = Value::new(Tag::Error);
    v.str_ = err.to_string().into_bytes();
    v
}

pub fn error_message(msg: impl Into<String>) -> Value {
    let mut v = Value::new(Tag::Error);
    v.str_ = msg.into().into_bytes();
    v
}

pub fn integer_value(i: i64) -> Value {
    let mut v = Value::new(Tag::Integer);
    v.integer = i;
    v
}

pub fn bool_value(b: bool) -> Value {
    integer_value(if b { 1 } else { 0 })
}

pub fn bytes_value(b: Vec<u8>) -> Value {
    let mut v = Value::new(Tag::BulkString);
    v.str_ = b;
    v
}

pub fn string_value(s: impl Into<String>) -> Value {
    bytes_value(s.into().into_bytes())
}

pub fn null_value() -> Value {
    let mut v = Value::new(Tag::BulkString);
    v.null = true;
    v
}

pub fn float_value(f: f64) -> Value {
    string_value(f.to_string())
}

pub fn array_value(vals: Vec<Value>) -> Value {
    let mut v = Value::new(Tag::Array);
    v.array = Some(vals);
    v
}

pub fn null_array() -> Value {
    let mut v = Value::new(Tag::Array);
    v.null = true;
    v
}

/// A tagged argument, used by [`multi_bulk_value`] and [`any_value`] in
/// place of an untyped variadic list.
#[derive(Debug, Clone)]
pub enum Arg {
    Str(String),
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    Value(Value),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Str(s) => write!(f, "{}", s),
            Arg::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Float(v) => write!(f, "{}", v),
            Arg::Bool(b) => write!(f, "{}", b),
            Arg::Null => write!(f, ""),
            Arg::Value(v) => write!(f, "{}", v.string()),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}
impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}
impl From<Vec<u8>> for Arg {
    fn from(b: Vec<u8>) -> Self {
        Arg::Bytes(b)
    }
}
impl From<i64> for Arg {
    fn from(i: i64) -> Self {
        Arg::Int(i)
    }
}
impl From<f64> for Arg {
    fn from(f: f64) -> Self {
        Arg::Float(f)
    }
}
impl From<bool> for Arg {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

/// Classifies a scalar into the narrowest RESP representation: integer/bool
/// become `Integer`, float becomes a `BulkString` holding the shortest
/// round-trippable decimal, bytes/string become `BulkString`, `Null` a null
/// bulk string, and an already-built `Value` passes through unchanged.
pub fn any_value(arg: &Arg) -> Value {
    match arg {
        Arg::Null => null_value(),
        Arg::Int(i) => integer_value(*i),
        Arg::Bool(b) => bool_value(*b),
        Arg::Float(f) => float_value(*f),
        Arg::Bytes(b) => string_value(String::from_utf8_lossy(b).into_owned()),
        Arg::Str(s) => string_value(s.clone()),
        Arg::Value(v) => v.clone(),
    }
}

/// Builds an Array whose first element is the bulk string `command_name`
/// and each subsequent element is a bulk-string rendering of `args`.
///
/// An already-bulk `Arg::Value` passes through unchanged; `Arg::Null`
/// becomes a null bulk string; bytes/strings are taken directly; every
/// other scalar uses its default text rendering. Unlike [`any_value`],
/// every argument here becomes a `BulkString` — this is the argv form the
/// wire protocol expects for a command invocation.
pub fn multi_bulk_value(command_name: &str, args: &[Arg]) -> Value {
    let mut vals = Vec::with_capacity(args.len() + 1);
    vals.push(string_value(command_name));
    for arg in args {
        vals.push(match arg {
            Arg::Value(v) if v.tag == Tag::BulkString => v.clone(),
            Arg::Bytes(b) => string_value(String::from_utf8_lossy(b).into_owned()),
            Arg::Str(s) => string_value(s.clone()),
            Arg::Null => null_value(),
            other => string_value(other.to_string()),
        });
    }
    array_value(vals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_null_bulk() {
        let v = Value {
            tag: Tag::None,
            null: true,
            ..NIL_VALUE
        };
        assert_eq!(v.marshal().unwrap(), b"$-1\r\n");
    }

    #[test]
    fn marshal_zero_tag_non_null_fails() {
        let v = Value {
            tag: Tag::None,
            null: false,
            ..NIL_VALUE
        };
        assert!(v.marshal().is_err());
    }

    #[test]
    fn multi_bulk_value_marshals_set_command() {
        let v = multi_bulk_value("SET", &[Arg::from("x"), Arg::from("1234")]);
        let out = v.marshal().unwrap();
        assert_eq!(out, b"*3\r\n$3\r\nSET\r\n$1\r\nx\r\n$4\r\n1234\r\n");
        let (bytes, len) = multi_bulk_bytes(&v);
        assert_eq!(len, 31);
        assert_eq!(bytes.len(), 31);
    }

    #[test]
    fn fullresync_simple_string_is_classified_as_rdb() {
        let v = simple_string_value("FULLRESYNC 875aa386440719e2d343628d44225b7bed0a0acc 4321");
        assert_eq!(v.kind(), Kind::Rdb);
        let (id, offset) = v.repl_info().unwrap();
        assert_eq!(id, "875aa386440719e2d343628d44225b7bed0a0acc");
        assert_eq!(offset, 4321);
    }

    #[test]
    fn array_string_join_trims_trailing_space() {
        let v = array_value(vec![string_value("SET"), string_value("KEY"), string_value("VAL")]);
        assert_eq!(v.string(), "SET KEY VAL");
    }

    #[test]
    fn equals_compares_marshalled_bytes() {
        let a = integer_value(5);
        let b = integer_value(5);
        let c = integer_value(6);
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
    }
}
