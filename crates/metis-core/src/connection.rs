//! Connections and the table that indexes them (spec.md §3, "Connection" /
//! "Connection Table"). Grounded in the teacher's table-of-structs style
//! (`path_table.rs`, `link_table.rs`): a primary `HashMap` keyed by id plus
//! secondary maps for the lookups callers actually need.

use std::collections::HashMap;
use std::sync::Arc;

use crate::message::{ConnectionId, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressKind {
    Inet,
    Inet6,
    Link,
    Local,
    Unix,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub kind: AddressKind,
    pub value: String,
}

impl Address {
    pub fn new(kind: AddressKind, value: impl Into<String>) -> Self {
        Self { kind, value: value.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Up,
    Down,
}

/// The drop policy applied to a connection's bounded outbox once it is full
/// (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    DropOldest,
    DropNewest,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::DropNewest
    }
}

/// A peer I/O endpoint. The outbox is drained by the transport layer
/// (`metis-transport`); `metis-core` only enforces the capacity/drop policy
/// so pipeline behavior is testable without real sockets.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    local: Address,
    remote: Address,
    state: ConnectionState,
    is_local: bool,
    outbox_capacity: usize,
    overflow_policy: OverflowPolicy,
    outbox: std::collections::VecDeque<Arc<Message>>,
}

impl Connection {
    pub fn new(id: ConnectionId, local: Address, remote: Address, is_local: bool, outbox_capacity: usize) -> Self {
        Self {
            id,
            local,
            remote,
            state: ConnectionState::Down,
            is_local,
            outbox_capacity,
            overflow_policy: OverflowPolicy::default(),
            outbox: std::collections::VecDeque::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn local(&self) -> &Address {
        &self.local
    }

    pub fn remote(&self) -> &Address {
        &self.remote
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn set_overflow_policy(&mut self, policy: OverflowPolicy) {
        self.overflow_policy = policy;
    }

    /// Queues `message` for send. Non-blocking: a full outbox applies the
    /// configured drop policy rather than blocking the event loop (spec.md
    /// §4.7, §7 `QueueFull`).
    pub fn send(&mut self, message: Arc<Message>) {
        if self.state == ConnectionState::Down {
            log::debug!("connection {} is down, dropping send", self.id);
            return;
        }
        if self.outbox.len() >= self.outbox_capacity {
            match self.overflow_policy {
                OverflowPolicy::DropNewest => {
                    log::debug!("outbox full on connection {}, dropping newest", self.id);
                    return;
                }
                OverflowPolicy::DropOldest => {
                    self.outbox.pop_front();
                }
            }
        }
        self.outbox.push_back(message);
    }

    pub fn drain_outbox(&mut self) -> Vec<Arc<Message>> {
        self.outbox.drain(..).collect()
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AddressPair {
    local: Address,
    remote: Address,
}

/// Maps connection id to `Connection`, plus the two secondary indices the
/// pipeline needs: `(local,remote)` for de-duplicating UDP pseudo-connections
/// and fd for listener demux (spec.md §3).
#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: HashMap<ConnectionId, Connection>,
    by_address_pair: HashMap<AddressPair, ConnectionId>,
    by_fd: HashMap<i32, ConnectionId>,
    next_id: ConnectionId,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, local: Address, remote: Address, is_local: bool, outbox_capacity: usize) -> ConnectionId {
        self.next_id += 1;
        let id = self.next_id;
        let pair = AddressPair { local: local.clone(), remote: remote.clone() };
        let connection = Connection::new(id, local, remote, is_local, outbox_capacity);
        self.connections.insert(id, connection);
        self.by_address_pair.insert(pair, id);
        id
    }

    pub fn bind_fd(&mut self, fd: i32, id: ConnectionId) {
        self.by_fd.insert(fd, id);
    }

    pub fn lookup_by_address(&self, local: &Address, remote: &Address) -> Option<ConnectionId> {
        self.by_address_pair
            .get(&AddressPair { local: local.clone(), remote: remote.clone() })
            .copied()
    }

    pub fn lookup_by_fd(&self, fd: i32) -> Option<ConnectionId> {
        self.by_fd.get(&fd).copied()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub fn is_live(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Removes a connection from every index. Callers are responsible for
    /// purging it from FIB/Strategy/PIT state (spec.md §3, "destroyed only
    /// after removal from the table and PIT/FIB purge").
    pub fn destroy(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        self.by_address_pair.retain(|_, v| *v != id);
        self.by_fd.retain(|_, v| *v != id);
        Some(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_pseudo_connection_dedupes_by_address_pair() {
        let mut table = ConnectionTable::new();
        let local = Address::new(AddressKind::Inet, "0.0.0.0:9695");
        let remote = Address::new(AddressKind::Inet, "10.0.0.1:9695");
        let id = table.create(local.clone(), remote.clone(), false, 16);
        assert_eq!(table.lookup_by_address(&local, &remote), Some(id));
    }

    #[test]
    fn destroy_removes_every_index() {
        let mut table = ConnectionTable::new();
        let local = Address::new(AddressKind::Inet, "0.0.0.0:9695");
        let remote = Address::new(AddressKind::Inet, "10.0.0.1:9695");
        let id = table.create(local.clone(), remote.clone(), false, 16);
        table.bind_fd(4, id);
        table.destroy(id);
        assert!(table.get(id).is_none());
        assert_eq!(table.lookup_by_address(&local, &remote), None);
        assert_eq!(table.lookup_by_fd(4), None);
    }

    #[test]
    fn send_on_down_connection_is_dropped_silently() {
        let mut table = ConnectionTable::new();
        let id = table.create(
            Address::new(AddressKind::Local, "a"),
            Address::new(AddressKind::Local, "b"),
            true,
            4,
        );
        let connection = table.get_mut(id).unwrap();
        let raw = metis_wire::build(&metis_wire::FieldDict {
            packet_type: Some(metis_wire::PacketType::Interest),
            ..Default::default()
        })
        .unwrap();
        let message = Message::parse(raw, None, 0).unwrap();
        connection.send(message);
        assert_eq!(connection.outbox_len(), 0);
    }

    #[test]
    fn drop_newest_keeps_oldest_entries_when_full() {
        let mut connection = Connection::new(
            1,
            Address::new(AddressKind::Local, "a"),
            Address::new(AddressKind::Local, "b"),
            true,
            1,
        );
        connection.set_state(ConnectionState::Up);

        let make = |tick| {
            let raw = metis_wire::build(&metis_wire::FieldDict {
                packet_type: Some(metis_wire::PacketType::Interest),
                ..Default::default()
            })
            .unwrap();
            Message::parse(raw, None, tick).unwrap()
        };

        connection.send(make(1));
        connection.send(make(2));
        let drained = connection.drain_outbox();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].arrival_tick(), 1);
    }
}
