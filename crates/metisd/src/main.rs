//! `metisd`: the Metis forwarder daemon (spec.md §1, §6). Loads a
//! `ForwarderConfig`, builds `metis_core::Forwarder`, brings up every
//! configured listener through `metis_transport`, serves the control
//! channel, and runs the `Dispatcher` event loop to completion.

mod config;
mod control_channel;
mod daemonize;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use metis_core::Forwarder;
use metis_transport::ethernet::{self, EthernetConfig};
use metis_transport::{multicast, tcp, udp, unix, Clock, Dispatcher, DispatcherConfig};

use config::{ForwarderConfig as DaemonConfig, ListenerConfig};

#[derive(Parser, Debug)]
#[command(name = "metisd", about = "Name-based CCN/ICN packet forwarder")]
struct Args {
    /// Path to a `ForwarderConfig` TOML file (spec.md §6's ambient config
    /// layer: listeners and forwarding defaults only, never routes).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the config file's control socket path.
    #[arg(long)]
    control_socket: Option<String>,
    /// Detaches from the controlling terminal (spec.md §6, "Environment").
    #[arg(long, default_value_t = false)]
    daemonize: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let daemon_config = match &args.config {
        Some(path) => DaemonConfig::from_path(path).unwrap_or_else(|err| {
            log::error!("metisd: failed to load config {}: {err}", path.display());
            std::process::exit(1);
        }),
        None => DaemonConfig::default(),
    };

    if args.daemonize {
        if let Err(err) = daemonize::daemonize() {
            log::error!("metisd: daemonize failed: {err}");
            std::process::exit(1);
        }
    }

    let control_socket = args.control_socket.clone().unwrap_or_else(|| daemon_config.control_socket.clone());

    let forwarder = Forwarder::new(metis_core::ForwarderConfig {
        content_store_capacity: daemon_config.forwarding.content_store_capacity,
        default_interest_lifetime: daemon_config.forwarding.default_interest_lifetime_ms,
        max_interest_lifetime: daemon_config.forwarding.max_interest_lifetime_ms,
        connection_outbox_capacity: daemon_config.forwarding.connection_outbox_capacity,
    });
    let mut forwarder = forwarder;
    forwarder.set_cache_serve(daemon_config.forwarding.cache_serve);
    forwarder.set_cache_store(daemon_config.forwarding.cache_store);

    let clock = Clock::new(Duration::from_millis(daemon_config.forwarding.tick_duration_ms.max(1)));
    let dispatcher_config = DispatcherConfig {
        keepalive_threshold: clock.to_ticks(Duration::from_millis(daemon_config.forwarding.keepalive_threshold_ms)),
        ..DispatcherConfig::default()
    };

    let shutdown = CancellationToken::new();
    let mut dispatcher = Dispatcher::new_with_shutdown(clock, forwarder, dispatcher_config, shutdown.clone());

    for listener in daemon_config.enabled_listeners() {
        if let Err(err) = bring_up_listener(&mut dispatcher, listener, shutdown.clone()).await {
            log::error!("metisd: listener {} ({}) failed to bind: {err}", listener.symbolic, listener.kind);
            std::process::exit(1);
        }
    }

    match control_channel::bind(&control_socket) {
        Ok(listener) => {
            let control = dispatcher.control_sink();
            let cancel = shutdown.clone();
            let path = PathBuf::from(&control_socket);
            tokio::spawn(async move { control_channel::serve(listener, path, control, cancel).await });
        }
        Err(err) => {
            log::error!("metisd: failed to bind control socket {control_socket}: {err}");
            std::process::exit(1);
        }
    }

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("metisd: received interrupt, shutting down");
            ctrl_c_shutdown.cancel();
        }
    });

    log::info!("metisd: running");
    dispatcher.run(shutdown).await;
    log::info!("metisd: stopped");
}

/// Brings up one statically-configured listener and registers it so it
/// shows up in `list interfaces` (spec.md §6) the same as one brought up
/// later via `add listener`.
async fn bring_up_listener(
    dispatcher: &mut Dispatcher,
    listener: &ListenerConfig,
    cancel: CancellationToken,
) -> Result<(), metis_transport::ListenError> {
    let sink = dispatcher.event_sink();
    match listener.kind.as_str() {
        "tcp" => {
            let bind_addr = socket_addr(listener)?;
            let is_local = listener.is_local;
            let bound = tcp::bind(bind_addr).await?;
            tokio::spawn(async move { tcp::serve(bound, bind_addr, is_local, sink, cancel).await });
            dispatcher.register_static_interface(&listener.symbolic, "tcp", bind_addr.to_string());
        }
        "udp" => {
            let bind_addr = socket_addr(listener)?;
            let bound = udp::bind(bind_addr).await?;
            tokio::spawn(async move { udp::serve(bound, bind_addr, sink, cancel).await });
            dispatcher.register_static_interface(&listener.symbolic, "udp", bind_addr.to_string());
        }
        "local" => {
            let path = listener.addr.clone().unwrap_or_default();
            let bound = unix::bind(&path)?;
            let path_owned = path.clone();
            tokio::spawn(async move { unix::serve(bound, path_owned.into(), sink, cancel).await });
            dispatcher.register_static_interface(&listener.symbolic, "local", path);
        }
        "multicast" => {
            let bind_addr = socket_addr(listener)?;
            let group: std::net::Ipv4Addr = listener
                .ifname
                .as_deref()
                .and_then(|g| g.parse().ok())
                .unwrap_or(std::net::Ipv4Addr::new(224, 0, 0, 9));
            let listener_symbolic = listener.symbolic.clone();
            tokio::spawn(async move {
                if let Err(err) = multicast::spawn(bind_addr, group, sink, cancel).await {
                    log::warn!("metisd: multicast listener {listener_symbolic} stopped: {err}");
                }
            });
            dispatcher.register_static_interface(&listener.symbolic, "multicast", format!("{bind_addr} group {group}"));
        }
        "ether" => {
            let interface = listener.ifname.clone().unwrap_or_default();
            let ethertype = listener.port.unwrap_or(ethernet::DEFAULT_ETHERTYPE);
            ethernet::spawn(EthernetConfig { interface: interface.clone(), ethertype }, sink, cancel).await?;
            dispatcher.register_static_interface(&listener.symbolic, "ether", interface);
        }
        other => {
            log::warn!("metisd: unknown listener kind {other} for {}, skipping", listener.symbolic);
        }
    }
    Ok(())
}

fn socket_addr(listener: &ListenerConfig) -> Result<SocketAddr, metis_transport::ListenError> {
    let addr = listener.addr.clone().unwrap_or_else(|| "0.0.0.0".to_string());
    let port = listener.port.unwrap_or(config::DEFAULT_DATA_PORT);
    format!("{addr}:{port}")
        .parse()
        .map_err(|_| metis_transport::ListenError::Unsupported("invalid listener address in config"))
}

