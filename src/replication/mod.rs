//! Replication driver (C4): dials a server impersonating a replica, decodes
//! the snapshot it sends, and streams the live write log, emitting a
//! uniform `Command` sequence to the caller's sink.

pub mod client;
pub mod config;
pub mod pipe;

pub use client::Canal;
pub use config::Config;
