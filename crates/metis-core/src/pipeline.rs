//! The forwarding pipeline (spec.md §4.5): binds Connection Table, FIB,
//! PIT and Content Store together behind `receive_interest`,
//! `receive_content_object`, `receive_interest_return` and `on_pit_expiry`.
//! Everything here runs on the single cooperative loop thread (spec.md §5);
//! `metis-transport` is the only caller.

use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::{Connection, ConnectionTable};
use crate::content_store::{ContentStore, CsEntry};
use crate::error::MetisError;
use crate::fib::Fib;
use crate::message::{ConnectionId, Message, MessageKind, Tick};
use crate::messenger::Messenger;
use crate::name::{Name, NameTable};
use crate::pit::{Pit, PitKey, PitVerdict};
use crate::strategy::StrategyKind;

/// Per-kind drop counters surfaced via the control plane's `list` command
/// (spec.md §7, "bump counters surfaced via `list` commands").
#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorCounters {
    pub invalid_packet: u64,
    pub no_route: u64,
    pub hop_limit_exceeded: u64,
    pub unsolicited: u64,
    pub queue_full: u64,
    pub connection_gone: u64,
}

impl ErrorCounters {
    fn bump(&mut self, error: &MetisError) {
        match error {
            MetisError::InvalidPacket(_) => self.invalid_packet += 1,
            MetisError::NoRoute => self.no_route += 1,
            MetisError::HopLimitExceeded => self.hop_limit_exceeded += 1,
            MetisError::Unsolicited => self.unsolicited += 1,
            MetisError::QueueFull => self.queue_full += 1,
            MetisError::ConnectionGone => self.connection_gone += 1,
            MetisError::ControlError(_) | MetisError::Fatal(_) => {}
        }
    }
}

pub struct ForwarderConfig {
    pub content_store_capacity: usize,
    pub default_interest_lifetime: Tick,
    pub max_interest_lifetime: Tick,
    pub connection_outbox_capacity: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            content_store_capacity: 65536,
            default_interest_lifetime: 4_000,
            max_interest_lifetime: 60_000,
            connection_outbox_capacity: 256,
        }
    }
}

/// Owns every loop-private table (spec.md §5). Constructed once by the
/// entry point and threaded down explicitly; there is no ambient global
/// forwarder instance (spec.md §9, "Global singletons").
pub struct Forwarder {
    config: ForwarderConfig,
    pub names: NameTable,
    pub connections: ConnectionTable,
    pub fib: Fib,
    pub pit: Pit,
    pub content_store: ContentStore,
    pub messenger: Messenger,
    pub counters: ErrorCounters,
    emit_interest_return_on_miss: bool,
}

impl Forwarder {
    pub fn new(config: ForwarderConfig) -> Self {
        let content_store = ContentStore::new(config.content_store_capacity);
        Self {
            config,
            names: NameTable::new(),
            connections: ConnectionTable::new(),
            fib: Fib::new(),
            pit: Pit::new(),
            content_store,
            messenger: Messenger::new(),
            counters: ErrorCounters::default(),
            emit_interest_return_on_miss: false,
        }
    }

    pub fn set_emit_interest_return_on_miss(&mut self, on: bool) {
        self.emit_interest_return_on_miss = on;
    }

    /// Records a wire-parse failure observed before a `Message` could even
    /// be constructed (spec.md §7, `InvalidPacket`). The pipeline's own
    /// `receive_*` entry points take an already-parsed `Message`, so
    /// `metis-transport` calls this directly when `Message::parse` itself
    /// fails on bytes freshly read off a socket.
    pub fn record_invalid_packet(&mut self) {
        self.counters.bump(&MetisError::InvalidPacket(metis_wire::WireError::Truncated));
    }

    pub fn add_route(&mut self, prefix: Name, nexthop: ConnectionId, strategy: StrategyKind) {
        self.fib.add(&mut self.names, prefix, nexthop, strategy);
    }

    /// `remove route` (spec.md §6): a no-op if no entry covers `prefix`,
    /// matching `Fib::remove`'s own contract.
    pub fn remove_route(&mut self, prefix: &Name, nexthop: ConnectionId) {
        self.fib.remove(&self.names, prefix, nexthop);
    }

    /// `set strategy` (spec.md §6). Returns `false` if no entry covers
    /// `prefix`.
    pub fn set_strategy(&mut self, prefix: &Name, strategy: StrategyKind) -> bool {
        self.fib.set_strategy(&self.names, prefix, strategy)
    }

    /// Destroys a connection, purging it from the FIB/Strategy state. PIT
    /// reverse-path references to it are left to expire naturally; a PIT
    /// entry whose only reverse-path member disappears still carries a
    /// nonempty reverse-path set per invariant 1, it just can no longer be
    /// satisfied usefully, and the expiry timer reclaims it.
    pub fn destroy_connection(&mut self, id: ConnectionId, now: Tick) {
        self.fib.purge_connection(id);
        if let Some(mut connection) = self.connections.destroy(id) {
            connection.set_state(crate::connection::ConnectionState::Down);
        }
        self.messenger.publish(id, crate::messenger::MissiveKind::Destroyed, now);
    }

    fn send_to(&mut self, connection_id: ConnectionId, message: Arc<Message>) {
        match self.connections.get_mut(connection_id) {
            Some(connection) => connection.send(message),
            None => {
                self.counters.bump(&MetisError::ConnectionGone);
                log::debug!("send on connection {connection_id} which no longer exists");
            }
        }
    }

    fn send_to_many(&mut self, connection_ids: impl IntoIterator<Item = ConnectionId>, message: &Arc<Message>) {
        for id in connection_ids {
            self.send_to(id, Arc::clone(message));
        }
    }

    /// `receiveInterest` (spec.md §4.5). `in_connection` is the ingress
    /// connection; `now` is the current tick.
    pub fn receive_interest(&mut self, mut message: Arc<Message>, in_connection: ConnectionId, now: Tick) {
        debug_assert_eq!(message.kind(), MessageKind::Interest);

        let name = match message.name() {
            Ok(Some(name)) => name,
            Ok(None) => {
                self.counters.bump(&MetisError::InvalidPacket(metis_wire::WireError::MissingField));
                return;
            }
            Err(err) => {
                self.counters.bump(&err);
                log::debug!("dropping Interest: {err}");
                return;
            }
        };

        let is_local = self.connections.get(in_connection).map(Connection::is_local).unwrap_or(false);
        let hop_limit = message.hop_limit();

        if !is_local && hop_limit == Some(0) {
            self.counters.bump(&MetisError::HopLimitExceeded);
            return;
        }

        let name_id = self.names.intern(name.clone());
        let keyid = message.keyid_restriction();
        let hash = message.hash_restriction();

        if self.content_store.cache_serve() {
            if let Some(hit) = self.content_store.fetch(name_id, keyid, hash, now) {
                let hit = Arc::clone(hit);
                self.send_to(in_connection, hit);
                return;
            }
        }

        let key = PitKey::for_interest(name_id, keyid, hash);
        let verdict = self.pit.receive_interest(
            key.clone(),
            name_id,
            in_connection,
            now,
            message.interest_lifetime(),
            self.config.default_interest_lifetime,
            self.config.max_interest_lifetime,
        );

        if verdict == PitVerdict::Aggregated {
            return;
        }

        if !is_local {
            match message.decrement_hop_limit() {
                Some(decremented) => {
                    if decremented.hop_limit() == Some(0) {
                        self.pit.remove(&key);
                        self.counters.bump(&MetisError::HopLimitExceeded);
                        return;
                    }
                    message = decremented;
                }
                None => {
                    log::debug!("non-local Interest carried no hop-limit field");
                }
            }
        }

        let fib_hit = self.fib.lookup(&self.names, &name);
        let Some(fib_id) = fib_hit else {
            self.pit.remove(&key);
            self.counters.bump(&MetisError::NoRoute);
            if self.emit_interest_return_on_miss {
                log::debug!("NoRoute for interest on connection {in_connection}, InterestReturn emission left to the transport layer");
            }
            return;
        };

        let entry = self.fib.entry_mut(fib_id).expect("fib_hit came from a live lookup");
        let egress = entry.strategy.lookup_nexthops(&entry.nexthops, in_connection);

        if egress.is_empty() {
            self.pit.remove(&key);
            self.counters.bump(&MetisError::NoRoute);
            return;
        }

        for &nexthop in &egress {
            entry.strategy.on_interest_sent(nexthop);
        }

        self.pit.record_egress(&key, egress.clone());
        self.send_to_many(egress, &message);
    }

    /// `receiveContentObject` (spec.md §4.5). Split-horizon: never sends
    /// back out on `in_connection` even if it ended up in the PIT's
    /// reverse-path set.
    pub fn receive_content_object(&mut self, message: Arc<Message>, in_connection: ConnectionId, now: Tick) {
        debug_assert_eq!(message.kind(), MessageKind::ContentObject);

        let name = match message.name() {
            Ok(Some(name)) => name,
            Ok(None) => return,
            Err(err) => {
                self.counters.bump(&err);
                log::debug!("dropping Content Object: {err}");
                return;
            }
        };
        let name_id = self.names.intern(name);
        let keyid = message.keyid_restriction().map(<[u8]>::to_vec);
        let hash = message.hash_restriction().map(<[u8]>::to_vec);

        let not_expired = message.expiry_time().map_or(true, |expiry| expiry > now);
        if self.content_store.cache_store() && not_expired {
            self.content_store.save(CsEntry {
                message: Arc::clone(&message),
                name_id,
                keyid: keyid.clone(),
                hash: hash.clone(),
                expiry_walltime: message.expiry_time(),
                recommended_cache_time: message.recommended_cache_time(),
                insertion_tick: now,
            });
        }

        let satisfied = self.pit.receive_content_object(name_id, keyid.as_deref(), hash.as_deref());
        if satisfied.is_empty() {
            self.counters.bump(&MetisError::Unsolicited);
            return;
        }

        let mut downstream = std::collections::HashSet::new();
        for entry in satisfied {
            downstream.extend(entry.reverse_path.iter().copied());
            if let Some(fib_id) = self.fib.lookup_by_name_id(&self.names, entry.name_id) {
                if let Some(fib_entry) = self.fib.entry_mut(fib_id) {
                    for &nexthop in &entry.egress {
                        fib_entry.strategy.on_satisfied(nexthop);
                    }
                }
            }
        }

        let split_horizon = downstream.into_iter().filter(|&id| id != in_connection);
        self.send_to_many(split_horizon, &message);
    }

    /// InterestReturn is a forwarding hint only: it never removes PIT
    /// entries (the expiry timer handles that), per spec.md §4.5 and §9
    /// Open Question (c).
    pub fn receive_interest_return(&mut self, _message: Arc<Message>, _in_connection: ConnectionId) {
        log::debug!("InterestReturn received; no PIT mutation performed");
    }

    /// Runs the PIT expiry timer for the given tick (spec.md §4.3, §5).
    pub fn on_pit_expiry(&mut self, now: Tick) -> usize {
        self.pit.expire(now).len()
    }

    pub fn cache_clear(&mut self) {
        self.content_store.clear();
    }

    pub fn set_cache_serve(&mut self, on: bool) {
        self.content_store.set_cache_serve(on);
    }

    pub fn set_cache_store(&mut self, on: bool) {
        self.content_store.set_cache_store(on);
    }

    /// Destroys every connection whose state has been `Down` longer than
    /// `keepalive_threshold` ticks, purging it from FIB/Strategy state as
    /// it goes (spec.md §5, "Cancellation and timeouts").
    pub fn reap_stale_connections(&mut self, now: Tick, down_since: &HashMap<ConnectionId, Tick>, keepalive_threshold: Tick) {
        let stale: Vec<ConnectionId> = down_since
            .iter()
            .filter(|&(_, &since)| now.saturating_sub(since) > keepalive_threshold)
            .map(|(&id, _)| id)
            .collect();
        for id in stale {
            self.destroy_connection(id, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{Address, AddressKind};
    use crate::name::NameSegment;
    use metis_wire::{build, FieldDict, PacketType};

    fn name(segments: &[&str]) -> Name {
        Name::new(segments.iter().map(|s| NameSegment::new(0, s.as_bytes())).collect())
    }

    fn encode(name: &Name) -> Vec<u8> {
        crate::message::encode_name(name)
    }

    fn interest(name: &Name, hop_limit: u8) -> Arc<Message> {
        let dict = FieldDict {
            packet_type: Some(PacketType::Interest),
            hop_limit,
            name: Some(encode(name)),
            ..Default::default()
        };
        Message::parse(build(&dict).unwrap(), None, 0).unwrap()
    }

    fn content_object(name: &Name) -> Arc<Message> {
        let dict = FieldDict {
            packet_type: Some(PacketType::ContentObject),
            name: Some(encode(name)),
            payload: Some(b"hello".to_vec()),
            ..Default::default()
        };
        Message::parse(build(&dict).unwrap(), None, 0).unwrap()
    }

    fn connect(forwarder: &mut Forwarder, label: &str) -> ConnectionId {
        let id = forwarder.connections.create(
            Address::new(AddressKind::Local, "local"),
            Address::new(AddressKind::Local, label),
            false,
            16,
        );
        forwarder.connections.get_mut(id).unwrap().set_state(crate::connection::ConnectionState::Up);
        id
    }

    /// S1 Aggregation.
    #[test]
    fn aggregation_then_satisfaction_fans_out_to_every_reverse_path_member() {
        let mut forwarder = Forwarder::new(ForwarderConfig::default());
        let a = connect(&mut forwarder, "a");
        let b = connect(&mut forwarder, "b");
        let c = connect(&mut forwarder, "c");

        let target = name(&["a", "b"]);
        forwarder.add_route(target.clone(), c, StrategyKind::All);

        forwarder.receive_interest(interest(&target, 5), a, 0);
        assert_eq!(forwarder.connections.get(c).unwrap().outbox_len(), 1);

        forwarder.receive_interest(interest(&target, 5), b, 1);
        assert_eq!(forwarder.connections.get(c).unwrap().outbox_len(), 1, "no second send on C");

        forwarder.receive_content_object(content_object(&target), c, 2);
        assert_eq!(forwarder.connections.get(a).unwrap().outbox_len(), 1);
        assert_eq!(forwarder.connections.get(b).unwrap().outbox_len(), 1);
    }

    /// S2 Longest-prefix.
    #[test]
    fn longest_prefix_match_picks_the_more_specific_route() {
        let mut forwarder = Forwarder::new(ForwarderConfig::default());
        let ingress = connect(&mut forwarder, "in");
        let c1 = connect(&mut forwarder, "c1");
        let c2 = connect(&mut forwarder, "c2");

        forwarder.add_route(name(&["a"]), c1, StrategyKind::All);
        forwarder.add_route(name(&["a", "b"]), c2, StrategyKind::All);

        forwarder.receive_interest(interest(&name(&["a", "b", "x"]), 5), ingress, 0);
        assert_eq!(forwarder.connections.get(c2).unwrap().outbox_len(), 1);
        assert_eq!(forwarder.connections.get(c1).unwrap().outbox_len(), 0);

        forwarder.receive_interest(interest(&name(&["a", "x"]), 5), ingress, 1);
        assert_eq!(forwarder.connections.get(c1).unwrap().outbox_len(), 1);
    }

    /// S3 Hop-limit exhaustion.
    #[test]
    fn hop_limit_reaching_zero_drops_without_forwarding() {
        let mut forwarder = Forwarder::new(ForwarderConfig::default());
        let ingress = connect(&mut forwarder, "in");
        let c1 = connect(&mut forwarder, "c1");
        let target = name(&["a"]);
        forwarder.add_route(target.clone(), c1, StrategyKind::All);

        forwarder.receive_interest(interest(&target, 1), ingress, 0);
        assert_eq!(forwarder.connections.get(c1).unwrap().outbox_len(), 0);
        assert_eq!(forwarder.pit.len(), 0);
    }

    /// S4 Cache hit, corrected per spec.md §8: the CS is populated only as
    /// a side effect of PIT satisfaction, never from unsolicited content.
    #[test]
    fn cache_is_populated_by_satisfaction_not_by_unsolicited_content() {
        let mut forwarder = Forwarder::new(ForwarderConfig::default());
        let producer = connect(&mut forwarder, "producer");
        let consumer = connect(&mut forwarder, "consumer");
        let target = name(&["p"]);
        forwarder.add_route(target.clone(), producer, StrategyKind::All);

        // Unsolicited: no Interest preceded it.
        forwarder.receive_content_object(content_object(&target), producer, 0);
        assert_eq!(forwarder.counters.unsolicited, 1);

        forwarder.receive_interest(interest(&target, 5), consumer, 1);
        forwarder.receive_content_object(content_object(&target), producer, 2);
        assert_eq!(forwarder.connections.get(consumer).unwrap().outbox_len(), 1);

        // Now a fresh Interest should be served from the CS without a
        // second FIB-routed send on the producer connection.
        forwarder.receive_interest(interest(&target, 5), consumer, 3);
        assert_eq!(forwarder.connections.get(producer).unwrap().outbox_len(), 0);
        assert_eq!(forwarder.connections.get(consumer).unwrap().outbox_len(), 2);
    }

    /// S6 Connection purge.
    #[test]
    fn destroying_every_nexthop_removes_the_fib_entry() {
        let mut forwarder = Forwarder::new(ForwarderConfig::default());
        let c1 = connect(&mut forwarder, "c1");
        let c2 = connect(&mut forwarder, "c2");
        forwarder.add_route(name(&["a"]), c1, StrategyKind::All);
        forwarder.add_route(name(&["a"]), c2, StrategyKind::All);

        forwarder.destroy_connection(c1, 0);
        assert_eq!(forwarder.fib.len(), 1);
        forwarder.destroy_connection(c2, 1);
        assert_eq!(forwarder.fib.len(), 0);
    }

    #[test]
    fn split_horizon_never_sends_content_back_on_ingress() {
        let mut forwarder = Forwarder::new(ForwarderConfig::default());
        let a = connect(&mut forwarder, "a");
        let c = connect(&mut forwarder, "c");
        let target = name(&["a"]);
        forwarder.add_route(target.clone(), c, StrategyKind::All);

        forwarder.receive_interest(interest(&target, 5), a, 0);
        // Content arrives back in on the same connection it was forwarded
        // to (`c`); it must not be echoed back to `c` itself even though
        // `c` is not actually in the reverse-path set here.
        forwarder.receive_content_object(content_object(&target), c, 1);
        assert_eq!(forwarder.connections.get(c).unwrap().outbox_len(), 0);
        assert_eq!(forwarder.connections.get(a).unwrap().outbox_len(), 1);
    }
}
