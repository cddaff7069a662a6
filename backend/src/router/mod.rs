//! Message Router
//!
//! FIFO broker of [`Packet`]s between robots, the environment and broadcast
//! recipients.
//!
//! # Delivery model
//!
//! - Packets are delivered in the order they were queued
//! - Every dequeue appends exactly one [`MessageRecord`] and bumps
//!   `total_messages`, including broadcasts (one record, not one per
//!   recipient)
//! - The queue is bounded; a full queue rejects new packets with
//!   [`RouterError::QueueFull`] and leaves the queue untouched
//!
//! Packets addressed to robots that are not registered in this environment
//! can be moved to an outbox with [`MessageRouter::forward_packets`] and
//! handed to a parent environment through [`MessageRouter::take_forwarded`].

use crate::models::{Address, MessageRecord, Packet, PacketKind, Payload, RobotId, RunLogs};
use std::collections::VecDeque;
use thiserror::Error;
use tracing::warn;

/// Default bound on queued packets
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

#[derive(Debug, Error, PartialEq)]
pub enum RouterError {
    #[error("Message queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Forwarding outbox full (capacity {capacity})")]
    OutboxFull { capacity: usize },
}

/// FIFO packet queue with an outbox for forwarded traffic
#[derive(Debug, Clone)]
pub struct MessageRouter {
    queue: VecDeque<Packet>,
    outbox: VecDeque<Packet>,
    capacity: usize,
    total_messages: u64,
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl MessageRouter {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            outbox: VecDeque::new(),
            capacity,
            total_messages: 0,
        }
    }

    /// Rebuild from checkpointed queues
    pub fn from_parts(
        queue: Vec<Packet>,
        outbox: Vec<Packet>,
        capacity: usize,
        total_messages: u64,
    ) -> Self {
        Self {
            queue: queue.into(),
            outbox: outbox.into(),
            capacity,
            total_messages,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Packets waiting for delivery
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Packets delivered since construction or the last `clear`
    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    pub fn queued(&self) -> impl Iterator<Item = &Packet> {
        self.queue.iter()
    }

    pub fn forwarded(&self) -> impl Iterator<Item = &Packet> {
        self.outbox.iter()
    }

    /// Build and enqueue a packet
    pub fn send_msg(
        &mut self,
        payload: Option<Payload>,
        to: Address,
        from: Address,
        kind: PacketKind,
        step: usize,
    ) -> Result<(), RouterError> {
        self.send_packet(Packet::new(from, to, kind, payload, step))
    }

    pub fn send_packet(&mut self, packet: Packet) -> Result<(), RouterError> {
        if self.queue.len() >= self.capacity {
            warn!(
                capacity = self.capacity,
                kind = %packet.kind(),
                "message queue full, packet rejected"
            );
            return Err(RouterError::QueueFull {
                capacity: self.capacity,
            });
        }
        self.queue.push_back(packet);
        Ok(())
    }

    /// Push a packet straight to the outbox
    pub fn forward_packet(&mut self, packet: Packet) -> Result<(), RouterError> {
        if self.outbox.len() >= self.capacity {
            warn!(capacity = self.capacity, "forwarding outbox full");
            return Err(RouterError::OutboxFull {
                capacity: self.capacity,
            });
        }
        self.outbox.push_back(packet);
        Ok(())
    }

    /// Move every queued packet addressed to an unknown robot to the outbox
    ///
    /// Relative order is kept in both queues. Stops moving once the outbox
    /// is full; remaining packets stay queued. Returns the number moved.
    pub fn forward_packets(&mut self, is_known: impl Fn(RobotId) -> bool) -> usize {
        let mut kept = VecDeque::with_capacity(self.queue.len());
        let mut moved = 0;

        for packet in self.queue.drain(..) {
            let foreign = matches!(packet.to(), Address::Robot(id) if !is_known(id));
            if foreign && self.outbox.len() < self.capacity {
                self.outbox.push_back(packet);
                moved += 1;
            } else {
                kept.push_back(packet);
            }
        }

        self.queue = kept;
        moved
    }

    /// Drain the outbox, oldest first
    pub fn take_forwarded(&mut self) -> Vec<Packet> {
        self.outbox.drain(..).collect()
    }

    /// Enqueue packets forwarded from another environment
    ///
    /// All or nothing: if they do not fit, none are queued.
    pub fn accept(&mut self, packets: Vec<Packet>) -> Result<usize, RouterError> {
        if self.queue.len() + packets.len() > self.capacity {
            warn!(
                capacity = self.capacity,
                incoming = packets.len(),
                "cannot accept forwarded packets"
            );
            return Err(RouterError::QueueFull {
                capacity: self.capacity,
            });
        }
        let count = packets.len();
        self.queue.extend(packets);
        Ok(count)
    }

    /// Pop the oldest packet, logging the delivery
    pub fn dequeue(&mut self, step: usize, logs: &mut RunLogs) -> Option<Packet> {
        let packet = self.queue.pop_front()?;
        logs.record_message(MessageRecord {
            step,
            from: packet.from(),
            to: packet.to(),
            kind: packet.kind(),
        });
        self.total_messages += 1;
        Some(packet)
    }

    /// Drop queued and forwarded packets and reset the counter
    pub fn clear(&mut self) {
        self.queue.clear();
        self.outbox.clear();
        self.total_messages = 0;
    }
}
