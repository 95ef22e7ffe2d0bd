//! # Message Port
//!
//! Asynchronous message passing out of the sample stream. Blocks publish
//! `(key, value)` messages on named output ports; whoever owns the port
//! drains them. Values reuse [`TagValue`] so a command dict or a frequency
//! correction can move between messages and stream tags without conversion.
//!
//! ## Example
//!
//! ```rust
//! use r4w_timing::message_port::{Message, MessagePort};
//!
//! let mut port = MessagePort::new("freq");
//! port.send(Message::float("freq", -25e3));
//! let msg = port.recv().unwrap();
//! assert_eq!(msg.key(), "freq");
//! assert_eq!(msg.as_float(), Some(-25e3));
//! ```

use crate::stream_tags::TagValue;
use std::collections::VecDeque;
use tracing::debug;

/// A message with key-value content.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    key: String,
    value: TagValue,
}

impl Message {
    /// Create a message from any value.
    pub fn new(key: &str, value: TagValue) -> Self {
        Self {
            key: key.to_string(),
            value,
        }
    }

    /// Create a message with float value.
    pub fn float(key: &str, value: f64) -> Self {
        Self::new(key, TagValue::Float(value))
    }

    /// Get message key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get message value.
    pub fn value(&self) -> &TagValue {
        &self.value
    }

    /// Get as float if applicable.
    pub fn as_float(&self) -> Option<f64> {
        self.value.as_float()
    }
}

/// Output message port. FIFO; the oldest message is evicted once `max_queue`
/// messages are waiting so an undrained port cannot grow without bound.
#[derive(Debug, Clone)]
pub struct MessagePort {
    name: String,
    queue: VecDeque<Message>,
    max_queue: usize,
    messages_sent: u64,
    messages_dropped: u64,
}

impl MessagePort {
    /// Create a new message port.
    pub fn new(name: &str) -> Self {
        Self::with_capacity(name, 1024)
    }

    /// Create with custom queue capacity.
    pub fn with_capacity(name: &str, max_queue: usize) -> Self {
        Self {
            name: name.to_string(),
            queue: VecDeque::new(),
            max_queue: max_queue.max(1),
            messages_sent: 0,
            messages_dropped: 0,
        }
    }

    /// Send a message, evicting the oldest pending one when the port is full.
    pub fn send(&mut self, msg: Message) {
        if self.queue.len() >= self.max_queue {
            if let Some(evicted) = self.queue.pop_front() {
                debug!(port = %self.name, key = evicted.key(), "message evicted from full port");
            }
            self.messages_dropped += 1;
        }
        self.queue.push_back(msg);
        self.messages_sent += 1;
    }

    /// Receive a message (FIFO).
    pub fn recv(&mut self) -> Option<Message> {
        self.queue.pop_front()
    }

    /// Get number of pending messages.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Drain all pending messages.
    pub fn drain(&mut self) -> Vec<Message> {
        self.queue.drain(..).collect()
    }

    /// Get port name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get total messages sent.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    /// Get messages evicted due to queue overflow.
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped
    }
}
