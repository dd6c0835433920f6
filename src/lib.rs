//! # RespKV
//!
//! A minimal Redis-style key-value store:
//! - RESP wire codec with resumable, incremental decoding
//! - TCP server holding an in-memory key-value map
//! - Pipelining client that correlates replies by order
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────┐             ┌─────────────────────────────┐
//! │          Client          │             │           Server            │
//! │                          │   RESP /    │                             │
//! │  call ──► encode ────────┼─── TCP ────►│  FrameBuffer ──► decode     │
//! │    │                     │             │                    │        │
//! │    ▼                     │             │                    ▼        │
//! │  PendingRequestQueue     │             │  Command ──► KeyValueStore  │
//! │    ▲                     │             │                    │        │
//! │    │                     │             │                    ▼        │
//! │  decode ◄── FrameBuffer ◄┼─────────────┼──────────────── encode      │
//! └──────────────────────────┘             └─────────────────────────────┘
//! ```
//!
//! Supported commands: PING, ECHO, SET, GET, DEL.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod store;
pub mod network;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{KvError, Result};
pub use config::Config;
pub use protocol::RespValue;
pub use store::KeyValueStore;
pub use network::Server;
pub use client::Client;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of RespKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
