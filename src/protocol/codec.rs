//! Protocol codec
//!
//! Encoding and decoding functions for the RESP wire format.
//!
//! ## Wire Format
//!
//! ```text
//! +<text>\r\n                      simple string
//! -<message>\r\n                   error
//! :<decimal>\r\n                   integer
//! $<len>\r\n<bytes>\r\n            bulk string   ($-1\r\n = null)
//! *<count>\r\n<value>...           array         (*-1\r\n = null)
//! ```
//!
//! The decoder works on a borrowed byte slice and never consumes it.
//! When the slice ends part-way through a frame it reports `Ok(None)`
//! so the caller can append more bytes and retry from the same offset.
//! Malformed input is reported as [`KvError::Protocol`]. The two are
//! never conflated.

use std::io::Cursor;

use bytes::{BufMut, Bytes, BytesMut};

use super::RespValue;
use crate::error::{KvError, Result};

/// Maximum nesting depth for arrays
pub const MAX_NESTING_DEPTH: usize = 64;

/// Maximum number of elements in one array
pub const MAX_ARRAY_ELEMENTS: i64 = 1_048_576;

/// Maximum bulk string length (512 MB)
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Widest valid integer line (`-9223372036854775808`)
const MAX_INTEGER_LEN: usize = 20;

/// Cap on up-front allocation for declared array counts
const PREALLOC_CAP: usize = 1024;

const CRLF: &[u8] = b"\r\n";

/// How text values are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringStyle {
    /// Text as simple strings (`+text\r\n`)
    Simple,

    /// Text as bulk strings (`$len\r\ntext\r\n`); used for requests
    Bulk,
}

/// Whether a decode may leave bytes after the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// Exactly one frame; trailing bytes are a protocol error
    Single,

    /// One frame out of a stream; trailing bytes are left for the next call
    Multi,
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a value to bytes
pub fn encode(value: &RespValue, style: StringStyle) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    encode_into(value, style, &mut dst)?;
    Ok(dst.freeze())
}

/// Encode a value onto the end of `dst`
///
/// On failure `dst` is left as it was.
pub fn encode_into(value: &RespValue, style: StringStyle, dst: &mut BytesMut) -> Result<()> {
    let mark = dst.len();
    let result = write_value(value, style, dst);
    if result.is_err() {
        dst.truncate(mark);
    }
    result
}

fn write_value(value: &RespValue, style: StringStyle, dst: &mut BytesMut) -> Result<()> {
    match value {
        RespValue::SimpleString(text) => match style {
            StringStyle::Bulk => write_bulk(text.as_bytes(), dst),
            StringStyle::Simple => {
                check_single_line(text, "simple string")?;
                dst.put_u8(b'+');
                dst.put_slice(text.as_bytes());
                dst.put_slice(CRLF);
            }
        },
        RespValue::Error(message) => {
            check_single_line(message, "error message")?;
            dst.put_u8(b'-');
            dst.put_slice(message.as_bytes());
            dst.put_slice(CRLF);
        }
        RespValue::Integer(n) => write_header(b':', *n, dst),
        RespValue::BulkString(None) => dst.put_slice(b"$-1\r\n"),
        RespValue::BulkString(Some(data)) => write_bulk(data, dst),
        RespValue::Array(None) => dst.put_slice(b"*-1\r\n"),
        RespValue::Array(Some(items)) => {
            write_header(b'*', items.len() as i64, dst);
            for item in items {
                write_value(item, style, dst)?;
            }
        }
    }
    Ok(())
}

fn write_bulk(data: &[u8], dst: &mut BytesMut) {
    write_header(b'$', data.len() as i64, dst);
    dst.put_slice(data);
    dst.put_slice(CRLF);
}

fn write_header(lead: u8, n: i64, dst: &mut BytesMut) {
    dst.put_u8(lead);
    dst.put_slice(n.to_string().as_bytes());
    dst.put_slice(CRLF);
}

fn check_single_line(text: &str, what: &str) -> Result<()> {
    if text.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(KvError::InvalidValue(format!(
            "{} contains CR or LF: {:?}",
            what, text
        )));
    }
    Ok(())
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one frame from the start of `buf`
///
/// Returns the value and the number of bytes it occupied, or `Ok(None)`
/// if `buf` does not yet hold a complete frame.
pub fn decode(buf: &[u8], mode: FrameMode) -> Result<Option<(RespValue, usize)>> {
    decode_at(buf, 0, mode)
}

/// Decode one frame starting at `cursor`
///
/// The returned byte count is relative to `cursor`.
pub fn decode_at(buf: &[u8], cursor: usize, mode: FrameMode) -> Result<Option<(RespValue, usize)>> {
    if cursor >= buf.len() {
        return Ok(None);
    }

    let mut cur = Cursor::new(&buf[cursor..]);
    match parse_value(&mut cur, 0) {
        Ok(value) => {
            let consumed = cur.position() as usize;
            if mode == FrameMode::Single && cursor + consumed < buf.len() {
                return Err(KvError::Protocol(format!(
                    "unexpected trailing bytes at offset {}",
                    cursor + consumed
                )));
            }
            Ok(Some((value, consumed)))
        }
        Err(KvError::IncompleteFrame) => Ok(None),
        Err(e) => Err(e),
    }
}

fn parse_value(cur: &mut Cursor<&[u8]>, depth: usize) -> Result<RespValue> {
    match read_byte(cur)? {
        b'+' => Ok(RespValue::SimpleString(read_text(cur, "simple string")?)),
        b'-' => Ok(RespValue::Error(read_text(cur, "error")?)),
        b':' => Ok(RespValue::Integer(read_integer(cur)?)),
        b'$' => parse_bulk(cur),
        b'*' => parse_array(cur, depth),
        other => Err(KvError::Protocol(format!(
            "invalid lead byte {:#04x} at offset {}",
            other,
            cur.position() - 1
        ))),
    }
}

fn parse_bulk(cur: &mut Cursor<&[u8]>) -> Result<RespValue> {
    let len = read_integer(cur)?;
    if len == -1 {
        return Ok(RespValue::BulkString(None));
    }
    if len < -1 {
        return Err(KvError::Protocol(format!("invalid bulk string length {}", len)));
    }
    if len > MAX_BULK_LEN {
        return Err(KvError::Protocol(format!(
            "bulk string too large: {} bytes (max {})",
            len, MAX_BULK_LEN
        )));
    }

    let len = len as usize;
    let buf: &[u8] = *cur.get_ref();
    let start = cur.position() as usize;
    let available = buf.len() - start;

    // The byte right after the body must start the CRLF, even if the LF
    // has not arrived yet.
    if available > len && buf[start + len] != b'\r' {
        return Err(KvError::Protocol(format!(
            "bulk string body longer than declared length {}",
            len
        )));
    }
    if available < len + 2 {
        return Err(KvError::IncompleteFrame);
    }
    if buf[start + len + 1] != b'\n' {
        return Err(KvError::Protocol(
            "bulk string not terminated by CRLF".to_string(),
        ));
    }

    let data = Bytes::copy_from_slice(&buf[start..start + len]);
    cur.set_position((start + len + 2) as u64);
    Ok(RespValue::BulkString(Some(data)))
}

fn parse_array(cur: &mut Cursor<&[u8]>, depth: usize) -> Result<RespValue> {
    let count = read_integer(cur)?;
    if count == -1 {
        return Ok(RespValue::Array(None));
    }
    if count < -1 {
        return Err(KvError::Protocol(format!("invalid array length {}", count)));
    }
    if count > MAX_ARRAY_ELEMENTS {
        return Err(KvError::Protocol(format!(
            "array too large: {} elements (max {})",
            count, MAX_ARRAY_ELEMENTS
        )));
    }

    let depth = depth + 1;
    if depth > MAX_NESTING_DEPTH {
        return Err(KvError::Protocol(format!(
            "arrays nested deeper than {}",
            MAX_NESTING_DEPTH
        )));
    }

    let count = count as usize;
    let mut items = Vec::with_capacity(count.min(PREALLOC_CAP));
    for _ in 0..count {
        items.push(parse_value(cur, depth)?);
    }
    Ok(RespValue::Array(Some(items)))
}

// =============================================================================
// Cursor helpers
// =============================================================================

fn read_byte(cur: &mut Cursor<&[u8]>) -> Result<u8> {
    let pos = cur.position() as usize;
    let byte = *cur.get_ref().get(pos).ok_or(KvError::IncompleteFrame)?;
    cur.set_position((pos + 1) as u64);
    Ok(byte)
}

/// Bytes up to the next CRLF; the cursor moves past the CRLF
fn read_line<'a>(cur: &mut Cursor<&'a [u8]>) -> Result<&'a [u8]> {
    let buf: &'a [u8] = *cur.get_ref();
    let start = cur.position() as usize;
    let rest = &buf[start..];

    let Some(i) = rest.iter().position(|&b| b == b'\r' || b == b'\n') else {
        return Err(KvError::IncompleteFrame);
    };
    if rest[i] == b'\n' {
        return Err(KvError::Protocol(format!(
            "bare line feed at offset {}",
            start + i
        )));
    }
    match rest.get(i + 1) {
        None => Err(KvError::IncompleteFrame),
        Some(b'\n') => {
            cur.set_position((start + i + 2) as u64);
            Ok(&rest[..i])
        }
        Some(_) => Err(KvError::Protocol(format!(
            "carriage return without line feed at offset {}",
            start + i
        ))),
    }
}

fn read_text(cur: &mut Cursor<&[u8]>, what: &str) -> Result<String> {
    let line = read_line(cur)?;
    std::str::from_utf8(line)
        .map(str::to_owned)
        .map_err(|_| KvError::Protocol(format!("invalid utf-8 in {}", what)))
}

/// Read a CRLF-terminated signed decimal
///
/// A partial line that already holds a non-digit, or is already wider
/// than any i64, is reported as a protocol error rather than waiting for
/// bytes that cannot fix it.
fn read_integer(cur: &mut Cursor<&[u8]>) -> Result<i64> {
    let start = cur.position() as usize;
    match read_line(cur) {
        Ok(line) => parse_i64(line),
        Err(KvError::IncompleteFrame) => {
            let partial = &cur.get_ref()[start..];
            let partial = partial.strip_suffix(b"\r").unwrap_or(partial);
            if partial.len() <= MAX_INTEGER_LEN && is_integer_prefix(partial) {
                Err(KvError::IncompleteFrame)
            } else {
                Err(invalid_integer(partial))
            }
        }
        Err(e) => Err(e),
    }
}

fn is_integer_prefix(bytes: &[u8]) -> bool {
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    digits.iter().all(u8::is_ascii_digit)
}

fn parse_i64(line: &[u8]) -> Result<i64> {
    let digits = line.strip_prefix(b"-").unwrap_or(line);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid_integer(line));
    }
    // ASCII digits with an optional sign are valid UTF-8
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| invalid_integer(line))
}

fn invalid_integer(bytes: &[u8]) -> KvError {
    KvError::Protocol(format!(
        "invalid integer {:?}",
        String::from_utf8_lossy(bytes)
    ))
}
