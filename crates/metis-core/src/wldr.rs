//! WLDR, the optional per-connection loss-detection sidecar (spec.md
//! §4.8). Labels are attached by the sender, gaps are detected by the
//! receiver, and retransmission is bounded both in attempt count and in
//! buffer depth. Structured like the teacher's small per-connection
//! tracking tables (`packet_cache::PacketCache`): a `HashMap` keyed by a
//! cheap id, pruned by an explicit bound rather than a background sweep.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::message::Message;

pub const MAX_RTX: u8 = 3;
pub const BUFFER_SIZE: usize = 8192;

struct Labeled {
    message: Arc<Message>,
    retransmit_count: u8,
}

/// Attaches monotonically increasing 16-bit labels and holds a bounded
/// history to serve retransmit requests from.
pub struct WldrSender {
    next_label: u16,
    buffer: HashMap<u16, Labeled>,
    order: VecDeque<u16>,
}

impl WldrSender {
    pub fn new() -> Self {
        Self { next_label: 0, buffer: HashMap::new(), order: VecDeque::new() }
    }

    /// Assigns the next label to `message` and retains it for possible
    /// retransmission. Wraps at `u16::MAX`, matching the wire field width.
    pub fn tag(&mut self, message: Arc<Message>) -> u16 {
        let label = self.next_label;
        self.next_label = self.next_label.wrapping_add(1);

        if self.order.len() >= BUFFER_SIZE {
            if let Some(oldest) = self.order.pop_front() {
                self.buffer.remove(&oldest);
            }
        }
        self.buffer.insert(label, Labeled { message, retransmit_count: 0 });
        self.order.push_back(label);
        label
    }

    /// A receiver reported a gap: `expected_label` was the next one due,
    /// but `newly_arrived_label` turned up instead. Returns every
    /// still-buffered message in `[expected_label, newly_arrived_label)`
    /// that has not yet been retransmitted `MAX_RTX` times; messages that
    /// exhaust their retransmit budget are dropped from the buffer and
    /// surfaced as nothing, per spec.md §4.8.
    pub fn on_loss_notification(&mut self, expected_label: u16, newly_arrived_label: u16) -> Vec<Arc<Message>> {
        let mut to_retransmit = Vec::new();
        let mut exhausted = Vec::new();

        let mut label = expected_label;
        while label != newly_arrived_label {
            if let Some(entry) = self.buffer.get_mut(&label) {
                if entry.retransmit_count < MAX_RTX {
                    entry.retransmit_count += 1;
                    to_retransmit.push(Arc::clone(&entry.message));
                } else {
                    exhausted.push(label);
                }
            }
            label = label.wrapping_add(1);
        }

        for label in exhausted {
            self.buffer.remove(&label);
            self.order.retain(|&l| l != label);
        }

        to_retransmit
    }
}

impl Default for WldrSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Detects label gaps on the receiving side of a WLDR-enabled connection.
pub struct WldrReceiver {
    last_received: Option<u16>,
}

impl WldrReceiver {
    pub fn new() -> Self {
        Self { last_received: None }
    }

    /// Records an arriving label and returns `Some((expected, newly_arrived))`
    /// if it detected a gap (i.e. `label` is not immediately after the
    /// previous one seen).
    pub fn observe(&mut self, label: u16) -> Option<(u16, u16)> {
        let gap = match self.last_received {
            Some(last) if label != last.wrapping_add(1) => Some((last.wrapping_add(1), label)),
            _ => None,
        };
        self.last_received = Some(label);
        gap
    }
}

impl Default for WldrReceiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metis_wire::{build, FieldDict, PacketType};

    fn message() -> Arc<Message> {
        let raw = build(&FieldDict { packet_type: Some(PacketType::ContentObject), ..Default::default() }).unwrap();
        Message::parse(raw, None, 0).unwrap()
    }

    #[test]
    fn receiver_detects_a_single_label_gap() {
        let mut receiver = WldrReceiver::new();
        assert_eq!(receiver.observe(0), None);
        assert_eq!(receiver.observe(1), None);
        assert_eq!(receiver.observe(3), Some((2, 3)));
    }

    #[test]
    fn sender_retransmits_the_gap_and_stops_after_max_rtx() {
        let mut sender = WldrSender::new();
        sender.tag(message());
        sender.tag(message());
        sender.tag(message());

        for attempt in 1..=MAX_RTX {
            let retransmitted = sender.on_loss_notification(0, 2);
            assert_eq!(retransmitted.len(), 2, "attempt {attempt}");
        }

        let retransmitted = sender.on_loss_notification(0, 2);
        assert!(retransmitted.is_empty());
    }

    #[test]
    fn buffer_evicts_oldest_label_once_full() {
        let mut sender = WldrSender::new();
        for _ in 0..BUFFER_SIZE {
            sender.tag(message());
        }
        sender.tag(message());
        assert_eq!(sender.order.len(), BUFFER_SIZE);
        assert!(!sender.buffer.contains_key(&0));
    }
}
