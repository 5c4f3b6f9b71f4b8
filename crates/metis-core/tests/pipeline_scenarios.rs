use metis_core::connection::{Address, AddressKind, ConnectionState};
use metis_core::message::{ConnectionId, Message};
use metis_core::name::{Name, NameSegment};
use metis_core::strategy::StrategyKind;
use metis_core::{Forwarder, ForwarderConfig};
use metis_wire::{build, FieldDict, PacketType};

fn name(segments: &[&str]) -> Name {
    Name::new(segments.iter().map(|s| NameSegment::new(0, s.as_bytes())).collect())
}

fn connect(forwarder: &mut Forwarder, label: &str) -> ConnectionId {
    let id = forwarder.connections.create(
        Address::new(AddressKind::Local, "local"),
        Address::new(AddressKind::Local, label),
        false,
        16,
    );
    forwarder.connections.get_mut(id).unwrap().set_state(ConnectionState::Up);
    id
}

fn interest(name: &Name, hop_limit: u8) -> std::sync::Arc<Message> {
    let dict = FieldDict {
        packet_type: Some(PacketType::Interest),
        hop_limit,
        name: Some(metis_core::message::encode_name(name)),
        ..Default::default()
    };
    Message::parse(build(&dict).unwrap(), None, 0).unwrap()
}

fn content_object(name: &Name, expiry_time: Option<u64>) -> std::sync::Arc<Message> {
    let dict = FieldDict {
        packet_type: Some(PacketType::ContentObject),
        name: Some(metis_core::message::encode_name(name)),
        payload: Some(b"payload".to_vec()),
        expiry_time: expiry_time.map(|t| t.to_be_bytes().to_vec()),
        ..Default::default()
    };
    Message::parse(build(&dict).unwrap(), None, 0).unwrap()
}

/// S5 LRU eviction, exercised through the assembled pipeline rather than
/// the Content Store directly: three distinct names are each satisfied in
/// turn against a capacity-2 store, and the oldest stops hitting.
#[test]
fn lru_eviction_through_the_full_pipeline() {
    let mut config = ForwarderConfig::default();
    config.content_store_capacity = 2;
    let mut forwarder = Forwarder::new(config);

    let producer = connect(&mut forwarder, "producer");
    let consumer = connect(&mut forwarder, "consumer");

    for label in ["o1", "o2", "o3"] {
        let target = name(&[label]);
        forwarder.add_route(target.clone(), producer, StrategyKind::All);
        forwarder.receive_interest(interest(&target, 8), consumer, 0);
        forwarder.receive_content_object(content_object(&target, None), producer, 1);
    }

    assert_eq!(forwarder.content_store.len(), 2);

    // A fresh Interest for o1 should miss the CS and need a fresh FIB-routed
    // send, since it was evicted; o2 and o3 should still hit locally.
    let producer_sends_before = forwarder.connections.get(producer).unwrap().outbox_len();
    forwarder.receive_interest(interest(&name(&["o1"]), 8), consumer, 2);
    assert!(forwarder.connections.get(producer).unwrap().outbox_len() > producer_sends_before);
}

/// PIT entries that are never satisfied are reclaimed by the expiry timer,
/// not left to accumulate (spec.md §4.3, invariant 1).
#[test]
fn unsatisfied_interest_is_reclaimed_by_pit_expiry() {
    let mut forwarder = Forwarder::new(ForwarderConfig::default());
    let consumer = connect(&mut forwarder, "consumer");
    let producer = connect(&mut forwarder, "producer");
    let target = name(&["never", "answered"]);
    forwarder.add_route(target.clone(), producer, StrategyKind::All);

    forwarder.receive_interest(interest(&target, 8), consumer, 0);
    assert_eq!(forwarder.pit.len(), 1);

    let expired = forwarder.on_pit_expiry(forwarder.pit.get(&metis_core::PitKey::Name(
        forwarder.names.lookup(&target).unwrap(),
    )).unwrap().expiry_tick);
    assert_eq!(expired, 1);
    assert_eq!(forwarder.pit.len(), 0);
}

/// A Content Object whose expiry time has already passed is never cached,
/// even though it still satisfies and forwards to the PIT's reverse path.
#[test]
fn expired_content_object_satisfies_pit_but_is_not_cached() {
    let mut forwarder = Forwarder::new(ForwarderConfig::default());
    let consumer = connect(&mut forwarder, "consumer");
    let producer = connect(&mut forwarder, "producer");
    let target = name(&["stale"]);
    forwarder.add_route(target.clone(), producer, StrategyKind::All);

    forwarder.receive_interest(interest(&target, 8), consumer, 0);
    forwarder.receive_content_object(content_object(&target, Some(0)), producer, 10);

    assert_eq!(forwarder.connections.get(consumer).unwrap().outbox_len(), 1);
    assert_eq!(forwarder.content_store.len(), 0);
}
