//! RESP value definitions
//!
//! The only values the wire format can carry.

use bytes::Bytes;

/// A single RESP value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+OK\r\n`; text must not contain CR or LF
    SimpleString(String),

    /// `-message\r\n`
    Error(String),

    /// `:42\r\n`
    Integer(i64),

    /// `$5\r\nhello\r\n`, or `$-1\r\n` when null
    BulkString(Option<Bytes>),

    /// `*2\r\n...`, or `*-1\r\n` when null; elements may nest
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Build a request: an array of bulk strings `[COMMAND, arg...]`
    pub fn command<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let parts = args
            .into_iter()
            .map(|arg| RespValue::bulk(arg.as_ref()))
            .collect();
        RespValue::Array(Some(parts))
    }

    /// `+OK`
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    pub fn simple(text: impl Into<String>) -> Self {
        RespValue::SimpleString(text.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        RespValue::Error(message.into())
    }

    pub fn bulk(data: &[u8]) -> Self {
        RespValue::BulkString(Some(Bytes::copy_from_slice(data)))
    }

    /// `$-1`
    pub fn null_bulk() -> Self {
        RespValue::BulkString(None)
    }

    /// `*-1`
    pub fn null_array() -> Self {
        RespValue::Array(None)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Short type name used in log and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "simple string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(_) => "bulk string",
            RespValue::Array(_) => "array",
        }
    }
}
