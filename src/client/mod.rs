//! Client Module
//!
//! Blocking, pipelining client for the RespKV server.
//!
//! ## Correlation
//! Requests carry no id. Replies are matched to requests purely by
//! order, through the `PendingRequestQueue`.

mod client;
mod pending;

pub use client::{Client, ReplyHandle};
pub use pending::{PendingRequestQueue, ReplySlot};
