//! RESP (REdis Serialization Protocol) value model and framed I/O.
//!
//! `value` is C1 (the `Value` tagged union, coercions, marshalling).
//! `reader`/`writer` are C2 (fragmentation-tolerant framed I/O over any
//! `Read`/`Write` source).

pub mod reader;
pub mod value;
pub mod writer;

pub use reader::Reader;
pub use value::{
    any_value, array_value, bool_value, bytes_value, error_message, error_value, float_value,
    integer_value, multi_bulk_bytes, multi_bulk_value, null_array, null_value, simple_string_value,
    string_value, Arg, Kind, Tag, Value, NIL_VALUE,
};
pub use writer::Writer;
