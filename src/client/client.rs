//! RespKV Client
//!
//! A blocking client that supports pipelining: any number of threads may
//! share one `Client`, and a single thread may `send` several requests
//! before waiting for any reply.
//!
//! ## Threads
//! - Callers write requests under the writer lock, enqueueing their reply
//!   slot in the same critical section, so queue order is wire order
//! - A reader thread decodes replies and fills slots oldest-first
//!
//! The idle timeout counts traffic in both directions: a write resets it
//! just as a read does.
//!
//! When the connection ends for any reason (idle timeout, server close,
//! I/O error, `close()`), every request still waiting is rejected with
//! [`KvError::Connection`].

use std::io::{BufWriter, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam::channel::{bounded, Receiver};
use parking_lot::Mutex;

use super::pending::PendingRequestQueue;
use crate::config::Config;
use crate::error::{KvError, Result};
use crate::protocol::{encode, Command, FrameBuffer, RespValue, StringStyle};

/// Size of a single socket read
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Client connection to a RespKV server
pub struct Client {
    /// Request writer; held while a request is enqueued and written
    writer: Mutex<BufWriter<TcpStream>>,

    /// Socket handle used to close the connection and adjust timeouts
    stream: TcpStream,

    /// Reply slots in request order
    pending: Arc<PendingRequestQueue>,

    /// Last read or write, shared with the reader thread
    activity: Arc<IdleTimer>,

    /// Reply reader thread
    reader: Mutex<Option<JoinHandle<()>>>,

    /// Peer address for logging
    peer_addr: String,
}

/// A request that has been written and awaits its reply
#[must_use = "the reply is lost unless waited on"]
pub struct ReplyHandle {
    rx: Receiver<Result<RespValue>>,
}

impl ReplyHandle {
    /// Block until the reply arrives or the connection ends
    ///
    /// An error reply from the server is returned as [`KvError::Server`].
    pub fn wait(self) -> Result<RespValue> {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(KvError::Connection(
                "connection closed before reply".to_string(),
            )),
        }
    }
}

impl Client {
    /// Connect with default settings
    pub fn connect(addr: &str) -> Result<Self> {
        Self::connect_with(addr, &Config::default())
    }

    /// Connect using the timeouts and queue capacity from `config`
    pub fn connect_with(addr: &str, config: &Config) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| KvError::Connection(format!("failed to connect to {}: {}", addr, e)))?;

        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.idle_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;

        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| addr.to_string());

        let pending = Arc::new(PendingRequestQueue::new(config.max_pending_requests));
        let activity = Arc::new(IdleTimer::new(config.idle_timeout()));

        let reader = {
            let stream = stream.try_clone()?;
            let pending = Arc::clone(&pending);
            let activity = Arc::clone(&activity);
            let peer_addr = peer_addr.clone();
            thread::Builder::new()
                .name("respkv-client-reader".to_string())
                .spawn(move || read_replies(stream, pending, activity, peer_addr))?
        };

        let writer = BufWriter::new(stream.try_clone()?);
        tracing::debug!("Connected to {}", peer_addr);

        Ok(Self {
            writer: Mutex::new(writer),
            stream,
            pending,
            activity,
            reader: Mutex::new(Some(reader)),
            peer_addr,
        })
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// `PING [message]`: returns `PONG`, or the message
    pub fn ping(&self, message: Option<&str>) -> Result<String> {
        let command = Command::Ping {
            message: message.map(|m| Bytes::copy_from_slice(m.as_bytes())),
        };
        expect_text(self.execute(&command)?)
    }

    /// `ECHO message`
    pub fn echo(&self, message: &str) -> Result<String> {
        let command = Command::Echo {
            message: Bytes::copy_from_slice(message.as_bytes()),
        };
        expect_text(self.execute(&command)?)
    }

    /// `SET key value`
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let command = Command::Set {
            key: Bytes::copy_from_slice(key.as_bytes()),
            value: Bytes::copy_from_slice(value.as_bytes()),
        };
        match self.execute(&command)? {
            RespValue::SimpleString(status) if status == "OK" => Ok(()),
            other => Err(unexpected_reply("SET", &other)),
        }
    }

    /// `GET key`: `None` if the key does not exist
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let command = Command::Get {
            key: Bytes::copy_from_slice(key.as_bytes()),
        };
        match self.execute(&command)? {
            RespValue::BulkString(None) => Ok(None),
            RespValue::BulkString(Some(data)) => into_string(data).map(Some),
            other => Err(unexpected_reply("GET", &other)),
        }
    }

    /// `DEL key`: number of keys removed (0 or 1)
    pub fn del(&self, key: &str) -> Result<i64> {
        let command = Command::Del {
            key: Bytes::copy_from_slice(key.as_bytes()),
        };
        match self.execute(&command)? {
            RespValue::Integer(n) => Ok(n),
            other => Err(unexpected_reply("DEL", &other)),
        }
    }

    /// Send a command and wait for its reply
    pub fn execute(&self, command: &Command) -> Result<RespValue> {
        self.send_frame(&command.to_frame())?.wait()
    }

    /// Send `[COMMAND, arg...]` and wait for the reply
    pub fn call<I, T>(&self, args: I) -> Result<RespValue>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.send(args)?.wait()
    }

    /// Send `[COMMAND, arg...]` without waiting
    ///
    /// Replies are matched to requests in send order, so handles may be
    /// waited on in any order.
    pub fn send<I, T>(&self, args: I) -> Result<ReplyHandle>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.send_frame(&RespValue::command(args))
    }

    fn send_frame(&self, request: &RespValue) -> Result<ReplyHandle> {
        let bytes = encode(request, StringStyle::Bulk)?;
        let (tx, rx) = bounded(1);

        let mut writer = self.writer.lock();
        self.pending.push(tx)?;

        let written = writer.write_all(&bytes).and_then(|_| writer.flush());
        if let Err(e) = written {
            let reason = format!("write to {} failed: {}", self.peer_addr, e);
            tracing::warn!("{}", reason);
            self.pending.close(&reason);
            let _ = self.stream.shutdown(Shutdown::Both);
            return Err(KvError::Connection(reason));
        }

        self.activity.touch();
        tracing::trace!("Sent {} bytes to {}", bytes.len(), self.peer_addr);
        Ok(ReplyHandle { rx })
    }

    // =========================================================================
    // Connection management
    // =========================================================================

    /// Change how long the connection may sit without traffic
    ///
    /// `None` disables the idle timeout. The reader picks the new value
    /// up when its current read returns.
    pub fn set_idle_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        if timeout == Some(Duration::ZERO) {
            return Err(KvError::Config("idle timeout must be non-zero".to_string()));
        }
        self.activity.set_idle(timeout);
        Ok(())
    }

    /// Close the connection
    ///
    /// Every request still awaiting a reply is rejected before this
    /// returns.
    pub fn close(&self) {
        let rejected = self.pending.close("connection closed by client");
        let _ = self.stream.shutdown(Shutdown::Both);

        if let Some(reader) = self.reader.lock().take() {
            let _ = reader.join();
        }
        tracing::debug!(
            "Disconnected from {} ({} pending requests rejected)",
            self.peer_addr,
            rejected
        );
    }

    /// True until the connection has ended
    pub fn is_open(&self) -> bool {
        !self.pending.is_closed()
    }

    /// Number of requests awaiting a reply
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

/// Idle deadline bookkeeping
///
/// The socket read timeout only sees inbound bytes, so the reader treats
/// it as a wake-up and decides from here whether the connection was
/// really idle.
struct IdleTimer {
    state: Mutex<IdleState>,
}

struct IdleState {
    idle: Option<Duration>,
    last_activity: Instant,
}

impl IdleTimer {
    fn new(idle: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(IdleState {
                idle,
                last_activity: Instant::now(),
            }),
        }
    }

    fn touch(&self) {
        self.state.lock().last_activity = Instant::now();
    }

    fn set_idle(&self, idle: Option<Duration>) {
        self.state.lock().idle = idle;
    }

    fn idle(&self) -> Option<Duration> {
        self.state.lock().idle
    }

    /// Time left before the connection counts as idle; `None` if disabled
    fn remaining(&self) -> Option<Duration> {
        let state = self.state.lock();
        state
            .idle
            .map(|idle| idle.saturating_sub(state.last_activity.elapsed()))
    }
}

/// Set the socket read timeout unless it already has that value
fn arm(
    stream: &TcpStream,
    armed: &mut Option<Duration>,
    timeout: Option<Duration>,
) -> std::io::Result<()> {
    if *armed != timeout {
        stream.set_read_timeout(timeout)?;
        *armed = timeout;
    }
    Ok(())
}

/// Reader thread: decode replies and hand them out in order
fn read_replies(
    mut stream: TcpStream,
    pending: Arc<PendingRequestQueue>,
    activity: Arc<IdleTimer>,
    peer_addr: String,
) {
    let mut frames = FrameBuffer::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    let mut armed = activity.idle();

    let reason = 'read: loop {
        let n = match stream.read(&mut chunk) {
            Ok(0) => break "connection closed by server".to_string(),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                match activity.remaining() {
                    Some(left) if left.is_zero() => break "idle timeout".to_string(),
                    // A write kept the connection alive; sleep for what is left
                    left => {
                        if let Err(e) = arm(&stream, &mut armed, left) {
                            break format!("read failed: {}", e);
                        }
                        continue;
                    }
                }
            }
            Err(e) => break format!("read failed: {}", e),
        };

        activity.touch();
        if let Err(e) = arm(&stream, &mut armed, activity.idle()) {
            break format!("read failed: {}", e);
        }

        tracing::trace!("Received {} bytes from {}", n, peer_addr);
        frames.extend(&chunk[..n]);

        loop {
            match frames.next_frame() {
                Ok(Some(reply)) => {
                    if !pending.resolve_next(reply) {
                        tracing::warn!("Dropping unsolicited reply from {}", peer_addr);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let reason = format!("unparseable reply: {}", e);
                    pending.reject_next(e);
                    break 'read reason;
                }
            }
        }
    };

    let rejected = pending.close(&reason);
    let _ = stream.shutdown(Shutdown::Both);
    if rejected > 0 {
        tracing::warn!(
            "Connection to {} ended ({}), {} pending requests rejected",
            peer_addr,
            reason,
            rejected
        );
    } else {
        tracing::debug!("Connection to {} ended ({})", peer_addr, reason);
    }
}

fn expect_text(reply: RespValue) -> Result<String> {
    match reply {
        RespValue::SimpleString(text) => Ok(text),
        RespValue::BulkString(Some(data)) => into_string(data),
        other => Err(unexpected_reply("text", &other)),
    }
}

fn into_string(data: Bytes) -> Result<String> {
    String::from_utf8(data.to_vec())
        .map_err(|_| KvError::Protocol("reply is not valid utf-8".to_string()))
}

fn unexpected_reply(expected: &str, reply: &RespValue) -> KvError {
    KvError::Protocol(format!(
        "unexpected {} reply to {}",
        reply.kind(),
        expected
    ))
}
