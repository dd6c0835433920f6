//! Pending request queue
//!
//! Replies carry no request id. The only thing tying a reply to its
//! request is position: the n-th reply read from the connection answers
//! the n-th request written to it. Each request leaves a one-shot reply
//! slot here, and each decoded reply fills the oldest slot.
//!
//! Once the queue is closed every waiting slot has been rejected and no
//! new slot is accepted.

use std::collections::VecDeque;

use crossbeam::channel::Sender;
use parking_lot::Mutex;

use crate::error::{KvError, Result};
use crate::protocol::RespValue;

/// Sending half of a one-shot reply slot
pub type ReplySlot = Sender<Result<RespValue>>;

/// Bounded FIFO of reply slots for one connection
pub struct PendingRequestQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

struct QueueState {
    waiting: VecDeque<ReplySlot>,

    /// Why the queue was closed, once it is
    closed: Option<String>,
}

impl PendingRequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                waiting: VecDeque::new(),
                closed: None,
            }),
            capacity,
        }
    }

    /// Enqueue a slot for a request about to be written
    ///
    /// Fails with a connection error once closed, and with a backpressure
    /// error when `capacity` slots are already waiting.
    pub fn push(&self, slot: ReplySlot) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.closed {
            return Err(KvError::Connection(reason.clone()));
        }
        if state.waiting.len() >= self.capacity {
            return Err(KvError::Backpressure {
                capacity: self.capacity,
            });
        }
        state.waiting.push_back(slot);
        Ok(())
    }

    /// Fill the oldest slot with a reply
    ///
    /// An error reply rejects the slot with [`KvError::Server`]. Returns
    /// false if nothing was waiting.
    pub fn resolve_next(&self, reply: RespValue) -> bool {
        let result = match reply {
            RespValue::Error(message) => Err(KvError::Server(message)),
            value => Ok(value),
        };
        self.complete_next(result)
    }

    /// Reject the oldest slot with `error`
    pub fn reject_next(&self, error: KvError) -> bool {
        self.complete_next(Err(error))
    }

    fn complete_next(&self, result: Result<RespValue>) -> bool {
        let slot = self.state.lock().waiting.pop_front();
        match slot {
            Some(slot) => {
                // The caller may have given up on the reply; nothing to do then
                let _ = slot.send(result);
                true
            }
            None => false,
        }
    }

    /// Close the queue and reject every waiting slot
    ///
    /// Returns the number of slots rejected. Later calls keep the first
    /// reason.
    pub fn close(&self, reason: &str) -> usize {
        let (reason, waiting) = {
            let mut state = self.state.lock();
            let reason = state.closed.get_or_insert_with(|| reason.to_string()).clone();
            let waiting: Vec<ReplySlot> = state.waiting.drain(..).collect();
            (reason, waiting)
        };

        for slot in &waiting {
            let _ = slot.send(Err(KvError::Connection(reason.clone())));
        }
        waiting.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    /// Number of requests awaiting a reply
    pub fn len(&self) -> usize {
        self.state.lock().waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
