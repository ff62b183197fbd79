//! canal: a replication-stream client.
//!
//! Dials a Redis-protocol server, impersonates a replica through the
//! `PSYNC` handshake, decodes the RDB snapshot it receives, and streams
//! both the snapshot and the live write log as a uniform [`Command`]
//! sequence through a user-supplied sink.

pub mod command;
pub mod error;
pub mod protocol;
pub mod rdb;
pub mod replication;

pub use command::{Command, CommandDecoder, Decoder, Nop, RDBDecoder};
pub use error::{CanalError, Result};
pub use protocol::value::Value;
pub use replication::{Canal, Config};
