// Message queues shared between the engine thread and the I/O thread
//
// Two FIFOs live under one bridge mutex. The append and swap primitives
// here are the only access paths to the shared queues; the lock itself is
// held by the bridge.

use std::collections::VecDeque;

use crate::string16::String16;

/// Session identifier minted by the socket server, unique within one
/// bridge lifetime. `0` is used for control entries that target no session.
pub type SessionId = i32;

/// Engine-bound actions posted from the I/O thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectorAction {
    /// Attach a session and echo `AcceptSession` back to the server.
    StartSession,
    /// Attach a session without the echo: the I/O thread already accepted
    /// the socket directly in wait-for-connect mode.
    StartSessionUnconditionally,
    SendMessage,
    EndSession,
}

/// Server-bound actions written from the engine thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    AcceptSession,
    DeclineSession,
    SendMessage,
    /// Close the listener and let open sessions drain.
    Stop,
    /// Terminate every connection, then stop.
    Kill,
}

/// One queue entry. The payload buffer is owned by the entry and moves to
/// the draining thread on pop.
#[derive(Debug)]
pub struct Message<A> {
    pub action: A,
    pub session_id: SessionId,
    pub payload: String16,
}

/// FIFO of `(action, session_id, payload)` triples.
#[derive(Debug)]
pub struct MessageQueue<A> {
    entries: VecDeque<Message<A>>,
}

impl<A> MessageQueue<A> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Push an entry, reporting whether the queue was empty beforehand.
    ///
    /// The return value is the wake-up edge: callers signal the peer thread
    /// only on an empty-to-non-empty transition. A signal outstanding from
    /// the previous transition is sufficient to drain every entry appended
    /// since, so bursts coalesce without losing the edge.
    pub fn append(&mut self, action: A, session_id: SessionId, payload: String16) -> bool {
        let was_empty = self.entries.is_empty();
        self.entries.push_back(Message {
            action,
            session_id,
            payload,
        });
        was_empty
    }

    /// Exchange the contents of two queues in O(1).
    ///
    /// Used to move an entire queue into a thread-local drain buffer so the
    /// lock is not held during dispatch.
    pub fn swap(&mut self, other: &mut Self) {
        std::mem::swap(&mut self.entries, &mut other.entries);
    }

    pub fn pop_front(&mut self) -> Option<Message<A>> {
        self.entries.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<A> Default for MessageQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}
