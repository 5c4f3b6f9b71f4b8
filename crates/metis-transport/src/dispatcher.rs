//! The Dispatcher (spec.md §2, "Clock & Dispatcher"; §5). Owns every
//! loop-private table via `metis_core::Forwarder` and is the only place
//! that ever calls into it: listeners never touch the tables directly,
//! they publish `TransportEvent`s across an `mpsc` channel that stands in
//! for the "cross-thread ring buffer" the spec describes, drained once per
//! `tokio::select!` iteration.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use metis_control::{
    CacheKind, ConnectionSummary, ControlCommand, ControlResponse, CounterSnapshot, InterfaceSummary, ListResource,
    ListenerKind, RouteSummary, StrategyName, Toggle, TransportKind,
};
use metis_core::connection::ConnectionState;
use metis_core::message::{ConnectionId, Message, MessageKind};
use metis_core::messenger::missive_kind_for_transition;
use metis_core::{Forwarder, StrategyKind, Tick};

use crate::clock::Clock;
use crate::control::ControlRequest;
use crate::ethernet::{self, EthernetConfig};
use crate::event::{EventSink, TransportEvent, Writer};
use crate::{tcp, udp, unix};
use crate::ControlSink;

pub struct DispatcherConfig {
    pub reap_period: Duration,
    pub pit_expiry_period: Duration,
    pub keepalive_threshold: Tick,
    pub event_channel_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            reap_period: Duration::from_secs(1),
            pit_expiry_period: Duration::from_millis(100),
            keepalive_threshold: 30_000,
            event_channel_capacity: 1024,
        }
    }
}

/// The event-driven single-threaded dispatcher (spec.md §2, §5). Built
/// once by the entry point, handed listeners via `event_sink()`, then run
/// to completion with `run()`.
pub struct Dispatcher {
    clock: Clock,
    forwarder: Forwarder,
    config: DispatcherConfig,
    event_tx: mpsc::Sender<TransportEvent>,
    event_rx: mpsc::Receiver<TransportEvent>,
    control_tx: mpsc::Sender<ControlRequest>,
    control_rx: mpsc::Receiver<ControlRequest>,
    writers: HashMap<ConnectionId, Writer>,
    down_since: HashMap<ConnectionId, Tick>,
    /// Symbolic connection names assigned by `add connection` control
    /// commands (spec.md §6); listener-discovered peers carry no symbolic
    /// name until one is assigned this way.
    symbolic_connections: HashMap<String, ConnectionId>,
    /// Listeners brought up either at static startup or via `add listener`
    /// (spec.md §6's `list interfaces`).
    interfaces: HashMap<String, InterfaceSummary>,
    /// Connections with a WLDR sidecar armed via `set wldr on` (spec.md
    /// §4.8, §6). Tracked here as the control-visible on/off switch; the
    /// labeling/retransmission state machine itself lives in
    /// `metis_core::wldr` per connection once a transport actually drives
    /// packets through it.
    wldr_enabled: std::collections::HashSet<ConnectionId>,
    shutdown: CancellationToken,
}

const CONTROL_CHANNEL_CAPACITY: usize = 64;

impl Dispatcher {
    pub fn new(clock: Clock, forwarder: Forwarder, config: DispatcherConfig) -> Self {
        Self::new_with_shutdown(clock, forwarder, config, CancellationToken::new())
    }

    /// Like `new`, but shares `shutdown` with the caller so a `quit`
    /// control command (spec.md §6) can cancel the same token the caller
    /// passes to `run`.
    pub fn new_with_shutdown(clock: Clock, forwarder: Forwarder, config: DispatcherConfig, shutdown: CancellationToken) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);
        Self {
            clock,
            forwarder,
            config,
            event_tx,
            event_rx,
            control_tx,
            control_rx,
            writers: HashMap::new(),
            down_since: HashMap::new(),
            symbolic_connections: HashMap::new(),
            interfaces: HashMap::new(),
            wldr_enabled: std::collections::HashSet::new(),
            shutdown,
        }
    }

    /// The handle every listener task is given to publish readiness
    /// events back to this dispatcher.
    pub fn event_sink(&self) -> EventSink {
        EventSink::new(self.event_tx.clone())
    }

    /// The handle a control-channel listener (`metisd`) submits parsed
    /// `ControlCommand`s through.
    pub fn control_sink(&self) -> ControlSink {
        ControlSink::new(self.control_tx.clone())
    }

    /// Registers a statically-configured listener (one brought up before
    /// `run`, from `ForwarderConfig`, rather than via `add listener`) so
    /// it shows up in `list interfaces` too.
    pub fn register_static_interface(&mut self, symbolic: impl Into<String>, kind: impl Into<String>, addr: impl Into<String>) {
        let symbolic = symbolic.into();
        self.interfaces.insert(symbolic.clone(), InterfaceSummary { symbolic, kind: kind.into(), addr: addr.into() });
    }

    pub fn forwarder(&self) -> &Forwarder {
        &self.forwarder
    }

    pub fn forwarder_mut(&mut self) -> &mut Forwarder {
        &mut self.forwarder
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Runs the event loop until `shutdown` is cancelled. This is the only
    /// place Interest/ContentObject/InterestReturn ingress, the PIT expiry
    /// timer and the connection-reap timer are invoked (spec.md §5: "All
    /// mutations of those data structures happen on the loop thread").
    pub async fn run(mut self, shutdown: CancellationToken) {
        self.shutdown = shutdown.clone();
        let mut reap_interval = tokio::time::interval(self.config.reap_period);
        let mut pit_interval = tokio::time::interval(self.config.pit_expiry_period);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("dispatcher: shutdown requested");
                    break;
                }
                _ = reap_interval.tick() => {
                    let now = self.clock.now();
                    self.forwarder.reap_stale_connections(now, &self.down_since, self.config.keepalive_threshold);
                    let forwarder = &self.forwarder;
                    self.down_since.retain(|id, _| forwarder.connections.is_live(*id));
                    self.writers.retain(|id, _| forwarder.connections.is_live(*id));
                    self.symbolic_connections.retain(|_, id| forwarder.connections.is_live(*id));
                }
                _ = pit_interval.tick() => {
                    let now = self.clock.now();
                    let expired = self.forwarder.on_pit_expiry(now);
                    if expired > 0 {
                        log::trace!("dispatcher: pit expiry reclaimed {expired} entries");
                    }
                }
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => {
                            self.handle_event(event);
                            self.flush_outboxes();
                        }
                        None => {
                            log::warn!("dispatcher: every listener dropped its event sink, stopping");
                            break;
                        }
                    }
                }
                request = self.control_rx.recv() => {
                    match request {
                        Some(ControlRequest { command, reply }) => {
                            let response = self.execute_control(command).await;
                            let _ = reply.send(response);
                        }
                        None => log::debug!("dispatcher: every control sink dropped"),
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Accepted { local, remote, is_local, writer, symbolic, assign } => {
                let id = self.forwarder.connections.create(local, remote, is_local, 256);
                if let Some(connection) = self.forwarder.connections.get_mut(id) {
                    let kind = missive_kind_for_transition(None, ConnectionState::Up);
                    connection.set_state(ConnectionState::Up);
                    self.forwarder.messenger.publish(id, kind, self.clock.now());
                }
                self.writers.insert(id, writer);
                if let Some(symbolic) = symbolic {
                    self.symbolic_connections.insert(symbolic, id);
                }
                let _ = assign.send(id);
            }
            TransportEvent::Data { connection_id, bytes } => {
                let now = self.clock.now();
                match Message::parse(bytes, Some(connection_id), now) {
                    Ok(message) => match message.kind() {
                        MessageKind::Interest => self.forwarder.receive_interest(message, connection_id, now),
                        MessageKind::ContentObject => self.forwarder.receive_content_object(message, connection_id, now),
                        MessageKind::InterestReturn => self.forwarder.receive_interest_return(message, connection_id),
                        MessageKind::Control => {
                            log::debug!("dispatcher: embedded CPI Control packet on connection {connection_id}, dropping (out of scope, spec.md §1)");
                        }
                    },
                    Err(err) => {
                        log::debug!("dispatcher: dropping unparseable packet on connection {connection_id}: {err}");
                        self.forwarder.record_invalid_packet();
                    }
                }
            }
            TransportEvent::Closed { connection_id } => {
                if let Some(connection) = self.forwarder.connections.get_mut(connection_id) {
                    let kind = missive_kind_for_transition(Some(ConnectionState::Up), ConnectionState::Down);
                    connection.set_state(ConnectionState::Down);
                    self.forwarder.messenger.publish(connection_id, kind, self.clock.now());
                }
                self.down_since.insert(connection_id, self.clock.now());
            }
        }
    }

    fn find_connection(&self, symbolic: &str) -> Option<ConnectionId> {
        self.symbolic_connections.get(symbolic).copied()
    }

    /// Executes one parsed `ControlCommand` against the live tables
    /// (spec.md §6). Runs on the loop thread like everything else in this
    /// file; the only awaits here are a fast listener `bind()` (so a bad
    /// address reports back immediately) and `tokio::spawn` hand-offs for
    /// the actual accept/dial loops, which run independently afterward.
    async fn execute_control(&mut self, command: ControlCommand) -> ControlResponse {
        match command {
            ControlCommand::AddConnection { transport, symbolic, remote, local: _local } => {
                let sink = self.event_sink();
                let cancel = self.shutdown.child_token();
                match transport {
                    TransportKind::Tcp => {
                        let Ok(remote_addr) = remote.parse::<SocketAddr>() else {
                            return ControlResponse::nack(format!("invalid remote address: {remote}"));
                        };
                        tokio::spawn(async move {
                            if let Err(err) = tcp::connect(remote_addr, false, symbolic.clone(), sink, cancel).await {
                                log::warn!("dispatcher: add connection tcp {symbolic} failed: {err}");
                            }
                        });
                        ControlResponse::Ack
                    }
                    TransportKind::Udp => {
                        let Ok(remote_addr) = remote.parse::<SocketAddr>() else {
                            return ControlResponse::nack(format!("invalid remote address: {remote}"));
                        };
                        tokio::spawn(async move {
                            if let Err(err) = udp::connect(remote_addr, symbolic.clone(), sink, cancel).await {
                                log::warn!("dispatcher: add connection udp {symbolic} failed: {err}");
                            }
                        });
                        ControlResponse::Ack
                    }
                    TransportKind::Ether => ControlResponse::nack("ethernet connections are not supported in this build"),
                }
            }
            ControlCommand::AddListener { kind, symbolic, addr, port_or_ifname } => {
                let sink = self.event_sink();
                let cancel = self.shutdown.child_token();
                match kind {
                    ListenerKind::Tcp => {
                        let Ok(bind_addr) = format!("{addr}:{port_or_ifname}").parse::<SocketAddr>() else {
                            return ControlResponse::nack(format!("invalid bind address: {addr}:{port_or_ifname}"));
                        };
                        match tcp::bind(bind_addr).await {
                            Ok(listener) => {
                                tokio::spawn(async move { tcp::serve(listener, bind_addr, false, sink, cancel).await });
                                self.register_static_interface(symbolic, "tcp", bind_addr.to_string());
                                ControlResponse::Ack
                            }
                            Err(err) => ControlResponse::nack(err.to_string()),
                        }
                    }
                    ListenerKind::Udp => {
                        let Ok(bind_addr) = format!("{addr}:{port_or_ifname}").parse::<SocketAddr>() else {
                            return ControlResponse::nack(format!("invalid bind address: {addr}:{port_or_ifname}"));
                        };
                        match udp::bind(bind_addr).await {
                            Ok(socket) => {
                                tokio::spawn(async move { udp::serve(socket, bind_addr, sink, cancel).await });
                                self.register_static_interface(symbolic, "udp", bind_addr.to_string());
                                ControlResponse::Ack
                            }
                            Err(err) => ControlResponse::nack(err.to_string()),
                        }
                    }
                    ListenerKind::Local => match unix::bind(&addr) {
                        Ok(listener) => {
                            let path = addr.clone();
                            tokio::spawn(async move { unix::serve(listener, path.into(), sink, cancel).await });
                            self.register_static_interface(symbolic, "local", addr);
                            ControlResponse::Ack
                        }
                        Err(err) => ControlResponse::nack(err.to_string()),
                    },
                    ListenerKind::Ether => {
                        let ethertype = port_or_ifname.parse::<u16>().unwrap_or(ethernet::DEFAULT_ETHERTYPE);
                        match ethernet::spawn(EthernetConfig { interface: addr, ethertype }, sink, cancel).await {
                            Ok(()) => ControlResponse::Ack,
                            Err(err) => ControlResponse::nack(err.to_string()),
                        }
                    }
                }
            }
            ControlCommand::AddRoute { symbolic, prefix, cost: _cost } => {
                let Some(connection_id) = self.find_connection(&symbolic) else {
                    return ControlResponse::nack(format!("no such connection: {symbolic}"));
                };
                let Some(name) = metis_control::name_text::parse(&prefix) else {
                    return ControlResponse::nack(format!("invalid prefix: {prefix}"));
                };
                self.forwarder.add_route(name, connection_id, StrategyKind::All);
                ControlResponse::Ack
            }
            ControlCommand::RemoveConnection { symbolic } => {
                let Some(connection_id) = self.find_connection(&symbolic) else {
                    return ControlResponse::nack(format!("no such connection: {symbolic}"));
                };
                let now = self.clock.now();
                self.forwarder.destroy_connection(connection_id, now);
                self.symbolic_connections.remove(&symbolic);
                self.down_since.remove(&connection_id);
                self.writers.remove(&connection_id);
                self.wldr_enabled.remove(&connection_id);
                ControlResponse::Ack
            }
            ControlCommand::RemoveRoute { symbolic, prefix } => {
                let Some(connection_id) = self.find_connection(&symbolic) else {
                    return ControlResponse::nack(format!("no such connection: {symbolic}"));
                };
                let Some(name) = metis_control::name_text::parse(&prefix) else {
                    return ControlResponse::nack(format!("invalid prefix: {prefix}"));
                };
                self.forwarder.remove_route(&name, connection_id);
                ControlResponse::Ack
            }
            ControlCommand::List(ListResource::Connections) => {
                let reverse: HashMap<ConnectionId, &str> =
                    self.symbolic_connections.iter().map(|(name, &id)| (id, name.as_str())).collect();
                let items = self
                    .forwarder
                    .connections
                    .iter()
                    .map(|connection| ConnectionSummary {
                        id: connection.id(),
                        symbolic: reverse.get(&connection.id()).map(|s| s.to_string()).unwrap_or_default(),
                        local: connection.local().value.clone(),
                        remote: connection.remote().value.clone(),
                        state: format!("{:?}", connection.state()).to_lowercase(),
                        is_local: connection.is_local(),
                    })
                    .collect();
                ControlResponse::Connections { items, counters: CounterSnapshot::from(self.forwarder.counters) }
            }
            ControlCommand::List(ListResource::Routes) => {
                let items = self
                    .forwarder
                    .fib
                    .iter()
                    .map(|(id, entry)| RouteSummary {
                        prefix: metis_control::name_text::format(self.forwarder.names.resolve(id)),
                        nexthops: entry.nexthops.iter().copied().collect(),
                    })
                    .collect();
                ControlResponse::Routes { items }
            }
            ControlCommand::List(ListResource::Interfaces) => {
                ControlResponse::Interfaces { items: self.interfaces.values().cloned().collect() }
            }
            ControlCommand::SetStrategy { prefix, strategy } => {
                let Some(name) = metis_control::name_text::parse(&prefix) else {
                    return ControlResponse::nack(format!("invalid prefix: {prefix}"));
                };
                if self.forwarder.set_strategy(&name, StrategyKind::from(strategy)) {
                    ControlResponse::Ack
                } else {
                    ControlResponse::nack(format!("no such prefix: {prefix}"))
                }
            }
            ControlCommand::SetWldr { toggle, symbolic } => {
                let Some(connection_id) = self.find_connection(&symbolic) else {
                    return ControlResponse::nack(format!("no such connection: {symbolic}"));
                };
                if toggle.as_bool() {
                    self.wldr_enabled.insert(connection_id);
                } else {
                    self.wldr_enabled.remove(&connection_id);
                }
                ControlResponse::Ack
            }
            ControlCommand::SetDebug => {
                log::set_max_level(log::LevelFilter::Debug);
                ControlResponse::Ack
            }
            ControlCommand::UnsetDebug => {
                log::set_max_level(log::LevelFilter::Info);
                ControlResponse::Ack
            }
            ControlCommand::Cache { kind, toggle } => {
                match kind {
                    CacheKind::Serve => self.forwarder.set_cache_serve(toggle.as_bool()),
                    CacheKind::Store => self.forwarder.set_cache_store(toggle.as_bool()),
                }
                ControlResponse::Ack
            }
            ControlCommand::CacheClear => {
                self.forwarder.cache_clear();
                ControlResponse::Ack
            }
            ControlCommand::Quit => {
                self.shutdown.cancel();
                ControlResponse::Ack
            }
            ControlCommand::Help(topic) => ControlResponse::Help { text: help_text(topic.as_deref()) },
        }
    }

    /// Drains every connection's outbox onto its writer channel. Run once
    /// per processed event rather than on a separate timer, so a
    /// satisfied Interest reaches the wire within the same loop iteration
    /// that produced it.
    fn flush_outboxes(&mut self) {
        let dirty: Vec<ConnectionId> =
            self.forwarder.connections.iter().filter(|c| c.outbox_len() > 0).map(|c| c.id()).collect();
        for id in dirty {
            let Some(connection) = self.forwarder.connections.get_mut(id) else { continue };
            let messages = connection.drain_outbox();
            let Some(writer) = self.writers.get(&id) else { continue };
            for message in messages {
                if writer.send(message.raw().to_vec()).is_err() {
                    log::debug!("dispatcher: writer for connection {id} gone, dropping queued send");
                }
            }
        }
    }
}

/// Static `help`/`help <topic>` text (spec.md §6). Every topic mirrors one
/// of the grammar's top-level verbs; an unrecognized topic falls back to
/// the full command list rather than erroring, since `help` never fails.
fn help_text(topic: Option<&str>) -> String {
    const FULL: &str = "\
add connection {tcp|udp|ether} <symbolic> <remote> <local>
add listener {tcp|udp|ether|local} <symbolic> <addr> <port|ifname>
add route <symbolic> <prefix> <cost>
remove connection <symbolic>
remove route <symbolic> <prefix>
list {connections|routes|interfaces}
set strategy <prefix> {all|random|loadbalancer}
set wldr {on|off} <symbolic>
set debug
unset debug
cache {serve|store} {on|off}
cache clear
quit
help [command]";

    match topic {
        None => FULL.to_string(),
        Some("add") => "add connection {tcp|udp|ether} <symbolic> <remote> <local>\nadd listener {tcp|udp|ether|local} <symbolic> <addr> <port|ifname>\nadd route <symbolic> <prefix> <cost>".to_string(),
        Some("remove") => "remove connection <symbolic>\nremove route <symbolic> <prefix>".to_string(),
        Some("list") => "list {connections|routes|interfaces}".to_string(),
        Some("set") => "set strategy <prefix> {all|random|loadbalancer}\nset wldr {on|off} <symbolic>\nset debug".to_string(),
        Some("cache") => "cache {serve|store} {on|off}\ncache clear".to_string(),
        Some(_) => FULL.to_string(),
    }
}
