//! Connection Handler
//!
//! Handles individual client connections: reads the byte stream, frames
//! it, executes each command against the store and writes the reply
//! before decoding the next frame.

use std::io::{BufWriter, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::protocol::{encode, Command, FrameBuffer, RespValue, StringStyle};
use crate::store::KeyValueStore;

/// Size of a single socket read
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reply sent before dropping a connection whose stream cannot be parsed
pub const PARSE_ERROR_REPLY: &str = "Cannot Parse";

/// Handles a single client connection
pub struct Connection {
    /// TCP stream reader
    reader: TcpStream,

    /// TCP stream writer (buffered, flushed after every reply)
    writer: BufWriter<TcpStream>,

    /// Bytes received but not yet decoded
    frames: FrameBuffer,

    /// Reference to the shared store
    store: Arc<KeyValueStore>,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    ///
    /// Sets up buffered I/O and configures timeouts
    pub fn new(stream: TcpStream, store: Arc<KeyValueStore>, config: &Config) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;

        let write_stream = stream.try_clone()?;

        Ok(Self {
            reader: stream,
            writer: BufWriter::new(write_stream),
            frames: FrameBuffer::new(),
            store,
            peer_addr,
        })
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Returns `Ok(())` when the client disconnects, and an error when the
    /// connection had to be dropped (unparseable input, I/O failure).
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = match self.reader.read(&mut chunk) {
                Ok(0) => {
                    if !self.frames.is_empty() {
                        tracing::debug!(
                            "Client {} disconnected with {} bytes of a partial frame",
                            self.peer_addr,
                            self.frames.buffered_len()
                        );
                    } else {
                        tracing::debug!("Client {} disconnected", self.peer_addr);
                    }
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if is_disconnect(&e) => {
                    tracing::debug!("Connection to {} lost: {}", self.peer_addr, e);
                    return Ok(());
                }
                // WouldBlock on Unix, TimedOut on Windows
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    return Err(e.into());
                }
            };

            tracing::trace!("Received {} bytes from {}", n, self.peer_addr);
            self.frames.extend(&chunk[..n]);

            if let Err(e) = self.process_frames() {
                if let KvError::Io(ref io_err) = e {
                    if is_disconnect(io_err) {
                        tracing::debug!(
                            "Client {} disconnected before response could be sent: {}",
                            self.peer_addr,
                            e
                        );
                        return Ok(());
                    }
                }
                return Err(e);
            }
        }
    }

    /// Execute every complete frame in the buffer, in order
    fn process_frames(&mut self) -> Result<()> {
        loop {
            let frame = match self.frames.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => {
                    tracing::warn!("Dropping {}: {}", self.peer_addr, e);
                    // Best effort; the connection is closed either way
                    let _ = self.send_reply(&RespValue::error(PARSE_ERROR_REPLY));
                    return Err(e);
                }
            };

            let reply = self.execute_frame(frame);
            self.send_reply(&reply)?;
        }
    }

    /// Turn one request frame into its reply
    fn execute_frame(&self, frame: RespValue) -> RespValue {
        match Command::from_frame(frame) {
            Ok(command) => {
                tracing::debug!("{} from {}", command.name(), self.peer_addr);
                execute_command(&self.store, command)
            }
            Err(e) => {
                tracing::debug!("Rejected request from {}: {}", self.peer_addr, e);
                RespValue::Error(e.to_string())
            }
        }
    }

    /// Send a reply to the client
    fn send_reply(&mut self, reply: &RespValue) -> Result<()> {
        let bytes = match encode(reply, StringStyle::Simple) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Cannot encode reply for {}: {}", self.peer_addr, e);
                encode(&RespValue::error("ERR reply could not be encoded"), StringStyle::Simple)?
            }
        };
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Execute a command against the store and build its reply
pub fn execute_command(store: &KeyValueStore, command: Command) -> RespValue {
    match command {
        Command::Ping { message: None } => RespValue::simple("PONG"),
        Command::Ping { message: Some(message) } | Command::Echo { message } => text_reply(message),
        Command::Set { key, value } => {
            store.set(key, value);
            RespValue::ok()
        }
        Command::Get { key } => RespValue::BulkString(store.get(&key)),
        Command::Del { key } => RespValue::Integer(store.delete(&key) as i64),
        Command::Unknown { name } => RespValue::error(format!("Unknown command: {}", name)),
    }
}

/// Simple string when the message allows it, bulk string otherwise
fn text_reply(message: Bytes) -> RespValue {
    match String::from_utf8(message.to_vec()) {
        Ok(text) if !text.contains(|c: char| c == '\r' || c == '\n') => RespValue::SimpleString(text),
        _ => RespValue::BulkString(Some(message)),
    }
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}
