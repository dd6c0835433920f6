//! Frame buffer
//!
//! Accumulates bytes read from a socket and hands out complete frames.
//! Both ends of a connection use one: a read may end anywhere, including
//! in the middle of a length prefix, so whatever is left after the last
//! complete frame stays buffered until the next read.

use bytes::{Buf, BytesMut};

use super::codec::{decode_at, FrameMode};
use super::RespValue;
use crate::error::Result;

/// Default initial capacity (4 KB)
const INITIAL_CAPACITY: usize = 4 * 1024;

/// Per-connection accumulation buffer with a read offset
#[derive(Debug)]
pub struct FrameBuffer {
    buf: BytesMut,

    /// Start of the first undecoded byte in `buf`
    offset: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_CAPACITY),
            offset: 0,
        }
    }

    /// Append a chunk read from the socket
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Decode the next complete frame, if one is buffered
    ///
    /// Returns `Ok(None)` when the remaining bytes are empty or hold only
    /// part of a frame; those bytes are kept for the next call. A protocol
    /// error leaves the buffer untouched: the stream has no recoverable
    /// frame boundary after it.
    pub fn next_frame(&mut self) -> Result<Option<RespValue>> {
        match decode_at(&self.buf, self.offset, FrameMode::Multi)? {
            Some((value, consumed)) => {
                self.offset += consumed;
                Ok(Some(value))
            }
            None => {
                self.compact();
                Ok(None)
            }
        }
    }

    /// Number of buffered bytes not yet decoded
    pub fn buffered_len(&self) -> usize {
        self.buf.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.buffered_len() == 0
    }

    /// Drop the already-decoded prefix
    fn compact(&mut self) {
        if self.offset > 0 {
            self.buf.advance(self.offset);
            self.offset = 0;
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
