//! The replication session driver (C4): dials a server, negotiates the
//! handshake, and streams both the snapshot and the live command log
//! through a single [`CommandDecoder`] sink.

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::command::{Command, CommandDecoder, Decoder, RDBDecoder};
use crate::error::{CanalError, Result};
use crate::protocol::reader::Reader;
use crate::protocol::value::{Arg, Tag};
use crate::protocol::writer::Writer;
use crate::rdb;
use crate::replication::config::Config;
use crate::replication::pipe::PipeReader;

/// Parses a dotted version string (`"7.2.4"`) into a numeric triplet,
/// missing/non-numeric components default to 0. A numeric triplet compare
/// avoids misordering e.g. `"10.0.0"` below `"4.0.0"`, which a lexicographic
/// string compare would.
fn parse_semver_ish(s: &str) -> (u32, u32, u32) {
    let mut parts = s.trim().splitn(3, '.').map(|p| p.parse::<u32>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

fn expect_ok(resp: &mut Reader<TcpStream>, context: &str) -> Result<()> {
    let (val, _) = resp.read_bulk()?;
    if val.bytes().as_slice() != b"OK" {
        return Err(CanalError::protocol(format!("{} failed: {}", context, val.string())));
    }
    Ok(())
}

/// A replication session: owns the socket and the handshake-derived state
/// (replication id, offset, parsed `INFO` sections). Shared across the
/// foreground parse loop and the background ack task via atomics/mutexes
/// rather than a single-owner borrow, since `Close()` is meant to be called
/// from another thread while `run()` blocks.
pub struct Canal {
    cfg: Config,
    stream: TcpStream,
    ip: String,
    port: u16,
    db: Mutex<i64>,
    repl_id: Mutex<String>,
    offset: Arc<AtomicI64>,
    redis_info: HashMap<String, HashMap<String, String>>,
    ack_err_tx: SyncSender<std::io::Error>,
    ack_err_rx: Receiver<std::io::Error>,
    close_tx: SyncSender<()>,
    close_rx: Mutex<Option<Receiver<()>>>,
    ack_started: AtomicBool,
}

impl Canal {
    /// Connects, runs the handshake through `INFO`, and optionally redials
    /// the real master. Starts with `replId = "?"` and `offset = -1`,
    /// requesting a full resync.
    pub fn new(cfg: Config) -> Result<Self> {
        let mut canal = Self::dial(cfg)?;
        canal.offset.store(-1, Ordering::SeqCst);
        Ok(canal)
    }

    /// Like [`Canal::new`], but begins from a known checkpoint: the server
    /// may reply `CONTINUE` instead of `FULLRESYNC` if `repl_id` is still
    /// valid on its side.
    pub fn from_offset(cfg: Config, repl_id: impl Into<String>, offset: i64) -> Result<Self> {
        let canal = Self::dial(cfg)?;
        *canal.repl_id.lock().unwrap() = repl_id.into();
        canal.offset.store(offset, Ordering::SeqCst);
        Ok(canal)
    }

    fn dial(cfg: Config) -> Result<Self> {
        let stream = connect(&cfg)?;
        let mut canal = Self::from_stream(cfg, stream)?;
        canal.info()?;

        if canal.cfg.discover_master && !canal.is_master() {
            if let Some((host, port, repl_id)) = canal.real_master() {
                let mut redial_cfg = canal.cfg.clone();
                redial_cfg.addr = format!("{}:{}", host, port)
                    .parse::<std::net::SocketAddr>()
                    .map_err(|_| CanalError::protocol("invalid master_host/master_port in INFO reply"))?;
                let stream = connect(&redial_cfg)?;
                canal = Self::from_stream(redial_cfg, stream)?;
                canal.info()?;
                *canal.repl_id.lock().unwrap() = repl_id;
            }
        }

        Ok(canal)
    }

    fn from_stream(cfg: Config, stream: TcpStream) -> Result<Self> {
        let local_addr = stream.local_addr()?;
        let (ack_err_tx, ack_err_rx) = mpsc::sync_channel(1);
        let (close_tx, close_rx) = mpsc::sync_channel(1);
        Ok(Canal {
            cfg,
            stream,
            ip: local_addr.ip().to_string(),
            port: local_addr.port(),
            db: Mutex::new(0),
            repl_id: Mutex::new(String::new()),
            offset: Arc::new(AtomicI64::new(0)),
            redis_info: HashMap::new(),
            ack_err_tx,
            ack_err_rx,
            close_tx,
            close_rx: Mutex::new(Some(close_rx)),
            ack_started: AtomicBool::new(false),
        })
    }

    /// Issues `INFO` and parses the reply into a section→key→value map,
    /// e.g. `redis_info["Server"]["redis_version"]`.
    fn info(&mut self) -> Result<()> {
        let mut wr = Writer::new(self.stream.try_clone()?);
        let mut resp = Reader::new(self.stream.try_clone()?);
        wr.write_multi_bulk("INFO", &[])?;
        let (val, _) = resp.read_bulk()?;

        let mut section = String::new();
        for raw_line in val.string().split('\n') {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(rest) = line.strip_prefix('#') {
                section = rest.trim().to_string();
                self.redis_info.entry(section.clone()).or_default();
                continue;
            }
            let mut parts = line.splitn(2, ':');
            let (Some(k), Some(v)) = (parts.next(), parts.next()) else {
                continue;
            };
            self.redis_info
                .entry(section.clone())
                .or_default()
                .insert(k.to_string(), v.to_string());
        }
        Ok(())
    }

    fn version(&self) -> Option<&str> {
        self.redis_info.get("Server")?.get("redis_version").map(|s| s.as_str())
    }

    fn is_master(&self) -> bool {
        self.redis_info
            .get("Replication")
            .and_then(|r| r.get("role"))
            .map(|r| r == "master")
            .unwrap_or(false)
    }

    fn real_master(&self) -> Option<(String, String, String)> {
        let replication = self.redis_info.get("Replication")?;
        Some((
            replication.get("master_host")?.clone(),
            replication.get("master_port")?.clone(),
            replication.get("master_replid")?.clone(),
        ))
    }

    /// Sends the version-gated `REPLCONF` preamble followed by `PSYNC`.
    fn replconf(&self) -> Result<(Writer<TcpStream>, Reader<TcpStream>)> {
        let mut wr = Writer::new(self.stream.try_clone()?);
        let mut resp = Reader::new(self.stream.try_clone()?);

        let version = self
            .version()
            .ok_or_else(|| CanalError::protocol("get version error"))?;
        if parse_semver_ish(version) > (4, 0, 0) {
            wr.write_multi_bulk("REPLCONF", &[Arg::from("listening-port"), Arg::from(self.port.to_string())])?;
            expect_ok(&mut resp, "replconf listening-port")?;

            wr.write_multi_bulk("REPLCONF", &[Arg::from("ip-address"), Arg::from(self.ip.clone())])?;
            expect_ok(&mut resp, "replconf ip-address")?;

            wr.write_multi_bulk("REPLCONF", &[Arg::from("capa"), Arg::from("eof")])?;
            expect_ok(&mut resp, "replconf capa eof")?;

            wr.write_multi_bulk("REPLCONF", &[Arg::from("capa"), Arg::from("psync2")])?;
            expect_ok(&mut resp, "replconf capa psync2")?;
        }

        let mut repl_id = self.repl_id.lock().unwrap();
        if repl_id.is_empty() {
            *repl_id = "?".to_string();
        }
        let offset = self.offset.load(Ordering::SeqCst);
        wr.write_multi_bulk("PSYNC", &[Arg::from(repl_id.clone()), Arg::from(offset)])?;

        Ok((wr, resp))
    }

    /// Runs the session to completion: handshake, snapshot, then the live
    /// command stream. Returns when the connection closes, the sink returns
    /// an error, or [`Canal::close`] stops the ack task and its write error
    /// unwinds the loop.
    ///
    /// ```ignore
    /// let canal = Canal::new(cfg)?;
    /// canal.run(&mut my_sink)?;
    /// ```
    pub fn run(&self, cmder: &mut dyn CommandDecoder) -> Result<()> {
        let (wr, resp) = self.replconf()?;
        let pipe = PipeReader::spawn(resp.into_buf_reader());
        self.handle(wr, Reader::new(pipe), cmder)
    }

    fn handle(
        &self,
        mut wr: Writer<TcpStream>,
        mut resp: Reader<PipeReader>,
        cmder: &mut dyn CommandDecoder,
    ) -> Result<()> {
        loop {
            match self.ack_err_rx.try_recv() {
                Ok(e) => return Err(CanalError::AckWrite(e)),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {}
            }

            let (val, n) = resp.read_bulk()?;
            match val.tag {
                Tag::Error | Tag::Integer | Tag::BulkString => {}
                Tag::SimpleString => {
                    let text = val.string();
                    if let Some((repl_id, offset)) = val.repl_info() {
                        *self.repl_id.lock().unwrap() = repl_id;
                        self.offset.store(offset, Ordering::SeqCst);
                        let mut adapter = CanalDecoder { canal: self, cmder: &mut *cmder };
                        let mut buf_reader = resp.into_buf_reader();
                        rdb::decode(&mut buf_reader, &mut adapter)?;
                        resp = Reader::from_buf_reader(buf_reader);
                    } else if let Some(rest) = text.strip_prefix("CONTINUE") {
                        let new_id = rest.trim();
                        if !new_id.is_empty() {
                            *self.repl_id.lock().unwrap() = new_id.to_string();
                        }
                    }
                }
                Tag::Array => {
                    let cmd = Command::from_line(&val.string())?;
                    cmder.command(&cmd)?;
                    self.offset.fetch_add(n as i64, Ordering::SeqCst);
                }
                Tag::None => {}
            }

            if !self.ack_started.swap(true, Ordering::SeqCst) {
                self.spawn_ack_task(&mut wr)?;
            }
        }
    }

    fn spawn_ack_task(&self, wr: &mut Writer<TcpStream>) -> Result<()> {
        let stream = wr.get_mut().try_clone()?;
        let ack_err_tx = self.ack_err_tx.clone();
        let close_rx = self
            .close_rx
            .lock()
            .unwrap()
            .take()
            .expect("ack task spawned more than once");
        let offset_source = Arc::clone(&self.offset);
        thread::spawn(move || {
            let mut ack_writer = Writer::new(stream);
            loop {
                if close_rx.try_recv().is_ok() {
                    return;
                }
                let offset = offset_source.load(Ordering::SeqCst);
                if let Err(e) = ack_writer.write_multi_bulk("REPLCONF", &[Arg::from("ACK"), Arg::from(offset)]) {
                    let io_err = match e {
                        CanalError::Transport(io_err) => io_err,
                        other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
                    };
                    let _ = ack_err_tx.send(io_err);
                    return;
                }
                thread::sleep(Duration::from_secs(1));
            }
        });
        Ok(())
    }

    /// Signals the ack task to stop. Never blocks: the channel is
    /// buffered to size one, so this send succeeds even with no running
    /// ack task to receive it.
    pub fn close(&self) {
        let _ = self.close_tx.try_send(());
    }

    pub fn get_repl_id(&self) -> String {
        self.repl_id.lock().unwrap().clone()
    }

    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::SeqCst)
    }
}

fn connect(cfg: &Config) -> Result<TcpStream> {
    let stream = match cfg.connect_timeout {
        Some(d) => TcpStream::connect_timeout(&cfg.addr, d)?,
        None => TcpStream::connect(cfg.addr)?,
    };
    stream.set_read_timeout(cfg.read_timeout)?;
    stream.set_write_timeout(cfg.write_timeout)?;
    stream.set_nodelay(true)?;

    let mut wr = Writer::new(stream.try_clone()?);
    let mut resp = Reader::new(stream.try_clone()?);

    if let Some(password) = &cfg.password {
        wr.write_multi_bulk("AUTH", &[Arg::from(password.clone())])?;
        expect_ok(&mut resp, "auth")?;
    }

    wr.write_multi_bulk("PING", &[])?;
    let (val, _) = resp.read_bulk()?;
    if val.bytes().as_slice() != b"PONG" {
        return Err(CanalError::protocol(format!("unexpected PING reply: {}", val.string())));
    }

    Ok(stream)
}

/// Translates RDB snapshot events into `Command`s, forwarding each to the
/// caller-supplied sink and updating the owning `Canal`'s
/// `db`/`offset`/`replId` along the way.
struct CanalDecoder<'a> {
    canal: &'a Canal,
    cmder: &'a mut dyn CommandDecoder,
}

impl<'a> CanalDecoder<'a> {
    fn emit(&mut self, verb: &str, args: &[String]) -> Result<()> {
        let cmd = Command::from_parts(verb, args)?;
        self.cmder.command(&cmd)
    }
}

fn s(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl<'a> RDBDecoder for CanalDecoder<'a> {
    fn aux(&mut self, key: &[u8], value: &[u8]) {
        match key {
            b"repl-offset" => {
                if let Ok(n) = s(value).parse::<i64>() {
                    self.canal.offset.store(n, Ordering::SeqCst);
                }
            }
            b"repl-id" => {
                *self.canal.repl_id.lock().unwrap() = s(value);
            }
            _ => {}
        }
    }
}

impl<'a> Decoder for CanalDecoder<'a> {
    fn begin_database(&mut self, n: i64) -> Result<()> {
        *self.canal.db.lock().unwrap() = n;
        self.emit("SELECT", &[n.to_string()])
    }

    fn set(&mut self, key: &[u8], value: &[u8], _expiry: i64) -> Result<()> {
        self.emit("SET", &[s(key), s(value)])
    }

    fn hset(&mut self, key: &[u8], field: &[u8], value: &[u8]) -> Result<()> {
        self.emit("HSET", &[s(key), s(field), s(value)])
    }

    fn sadd(&mut self, key: &[u8], member: &[u8]) -> Result<()> {
        self.emit("SADD", &[s(key), s(member)])
    }

    fn rpush(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.emit("RPUSH", &[s(key), s(value)])
    }

    fn zadd(&mut self, key: &[u8], score: f64, member: &[u8]) -> Result<()> {
        self.emit("ZADD", &[s(key), format!("{:.6}", score), s(member)])
    }

    fn xadd(&mut self, key: &[u8], stream_id: &[u8], listpack: &[u8]) -> Result<()> {
        self.emit("XADD", &[s(key), s(stream_id), s(listpack)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semver_ish_orders_numerically_past_single_digit_majors() {
        assert!(parse_semver_ish("10.0.0") > parse_semver_ish("4.0.0"));
        assert!(parse_semver_ish("4.0.0") > parse_semver_ish("3.9.9"));
        assert_eq!(parse_semver_ish("7.2"), (7, 2, 0));
        assert_eq!(parse_semver_ish("garbage"), (0, 0, 0));
    }
}
