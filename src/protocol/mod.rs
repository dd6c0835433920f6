//! Protocol Module
//!
//! Defines the wire protocol for client-server communication: a subset
//! of RESP (REdis Serialization Protocol).
//!
//! ## Value Types
//! - `+` Simple string   `+OK\r\n`
//! - `-` Error           `-Unknown command: FOO\r\n`
//! - `:` Integer         `:1\r\n`
//! - `$` Bulk string     `$3\r\nbar\r\n`, null: `$-1\r\n`
//! - `*` Array           `*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n`, null: `*-1\r\n`
//!
//! ### Requests
//! Always an array of bulk strings: `[COMMAND, arg...]`
//!
//! ### Commands
//! - PING [message]
//! - ECHO message
//! - SET key value
//! - GET key
//! - DEL key

mod value;
mod command;
mod codec;
mod buffer;

pub use value::RespValue;
pub use command::Command;
pub use codec::{
    decode, decode_at, encode, encode_into, FrameMode, StringStyle, MAX_ARRAY_ELEMENTS,
    MAX_BULK_LEN, MAX_NESTING_DEPTH,
};
pub use buffer::FrameBuffer;
