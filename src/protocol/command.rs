//! Command definitions
//!
//! Represents commands from clients. A request on the wire is an array
//! of bulk strings `[COMMAND, arg...]`.

use bytes::Bytes;

use super::RespValue;
use crate::error::{KvError, Result};

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ping (health check), optionally echoing a message
    Ping { message: Option<Bytes> },

    /// Echo a message back
    Echo { message: Bytes },

    /// Set a key-value pair
    Set { key: Bytes, value: Bytes },

    /// Get a value by key
    Get { key: Bytes },

    /// Delete a key
    Del { key: Bytes },

    /// Anything else; answered with an error reply
    Unknown { name: String },
}

impl Command {
    /// Parse a decoded request frame
    ///
    /// Command names are case-insensitive. Errors are
    /// [`KvError::Command`] and are meant to be sent back to the client.
    pub fn from_frame(frame: RespValue) -> Result<Command> {
        let mut args = match frame {
            RespValue::Array(Some(items)) if !items.is_empty() => items
                .into_iter()
                .map(into_arg)
                .collect::<Result<Vec<Bytes>>>()?,
            _ => return Err(invalid_request()),
        };

        let name = args.remove(0);
        let mut args = args.into_iter();

        let command = if name.eq_ignore_ascii_case(b"PING") {
            match args.len() {
                0 | 1 => Command::Ping { message: args.next() },
                _ => return Err(wrong_arity("ping")),
            }
        } else if name.eq_ignore_ascii_case(b"ECHO") {
            match (args.next(), args.len()) {
                (Some(message), 0) => Command::Echo { message },
                _ => return Err(wrong_arity("echo")),
            }
        } else if name.eq_ignore_ascii_case(b"SET") {
            match (args.next(), args.next(), args.len()) {
                (Some(key), Some(value), 0) => Command::Set { key, value },
                _ => return Err(wrong_arity("set")),
            }
        } else if name.eq_ignore_ascii_case(b"GET") {
            match (args.next(), args.len()) {
                (Some(key), 0) => Command::Get { key },
                _ => return Err(wrong_arity("get")),
            }
        } else if name.eq_ignore_ascii_case(b"DEL") {
            match (args.next(), args.len()) {
                (Some(key), 0) => Command::Del { key },
                _ => return Err(wrong_arity("del")),
            }
        } else {
            Command::Unknown {
                name: String::from_utf8_lossy(&name).into_owned(),
            }
        };

        Ok(command)
    }

    /// Build the request frame for this command
    pub fn to_frame(&self) -> RespValue {
        let name = self.name().as_bytes();
        match self {
            Command::Ping { message: None } => RespValue::command([name]),
            Command::Ping { message: Some(message) } => RespValue::command([name, &message[..]]),
            Command::Echo { message } => RespValue::command([name, &message[..]]),
            Command::Set { key, value } => RespValue::command([name, &key[..], &value[..]]),
            Command::Get { key } => RespValue::command([name, &key[..]]),
            Command::Del { key } => RespValue::command([name, &key[..]]),
            Command::Unknown { .. } => RespValue::command([name]),
        }
    }

    /// Canonical command name
    pub fn name(&self) -> &str {
        match self {
            Command::Ping { .. } => "PING",
            Command::Echo { .. } => "ECHO",
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Del { .. } => "DEL",
            Command::Unknown { name } => name,
        }
    }
}

fn into_arg(value: RespValue) -> Result<Bytes> {
    match value {
        RespValue::BulkString(Some(data)) => Ok(data),
        RespValue::SimpleString(text) => Ok(Bytes::from(text)),
        _ => Err(invalid_request()),
    }
}

fn invalid_request() -> KvError {
    KvError::Command("ERR Protocol error: expected array of bulk strings".to_string())
}

fn wrong_arity(command: &str) -> KvError {
    KvError::Command(format!(
        "ERR wrong number of arguments for '{}' command",
        command
    ))
}
