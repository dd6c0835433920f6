//! Network Module
//!
//! TCP server and connection handling.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One thread per connection; commands on a connection run strictly
//!   in the order they were received
//! - All connections share one `KeyValueStore`

mod server;
mod connection;

pub use server::Server;
pub use connection::{execute_command, Connection, PARSE_ERROR_REPLY};
