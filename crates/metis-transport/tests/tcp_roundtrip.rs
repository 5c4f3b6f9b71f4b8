use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use metis_core::name::{Name, NameSegment};
use metis_core::strategy::StrategyKind;
use metis_core::{Forwarder, ForwarderConfig};
use metis_transport::{Clock, Dispatcher, DispatcherConfig};
use metis_wire::{build, FieldDict, PacketType};

fn reserve_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("ephemeral addr").port()
}

fn name(segments: &[&str]) -> Name {
    Name::new(segments.iter().map(|s| NameSegment::new(0, s.as_bytes())).collect())
}

fn interest_bytes(n: &Name, hop_limit: u8) -> Vec<u8> {
    let dict = FieldDict {
        packet_type: Some(PacketType::Interest),
        hop_limit,
        name: Some(metis_core::message::encode_name(n)),
        ..Default::default()
    };
    build(&dict).unwrap()
}

/// Two TCP clients connect to one Dispatcher-backed listener. A route to
/// the prefix is installed for the connection id the producer is bound to
/// receive (`ConnectionTable` hands out ids sequentially, so connecting
/// the producer first and waiting a beat before connecting the consumer
/// makes its id predictable), then the consumer's Interest is forwarded
/// across the wire and the producer actually receives bytes on its socket
/// (spec.md §4.7, §5).
#[tokio::test]
async fn interest_forwarded_across_real_tcp_sockets() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off")).is_test(true).try_init();

    let port = reserve_port();
    let bind_addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let prefix = name(&["test", "data"]);
    let mut forwarder = Forwarder::new(ForwarderConfig::default());
    let producer_connection_id = 1;
    forwarder.add_route(prefix.clone(), producer_connection_id, StrategyKind::All);

    let clock = Clock::new(Duration::from_millis(1));
    let dispatcher = Dispatcher::new(clock, forwarder, DispatcherConfig::default());
    let sink = dispatcher.event_sink();

    let shutdown = CancellationToken::new();
    let listen_cancel = shutdown.clone();
    let listener_task = tokio::spawn(async move {
        metis_transport::tcp::spawn(bind_addr, false, sink, listen_cancel).await.unwrap();
    });

    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut producer = TcpStream::connect(bind_addr).await.expect("producer connects");
    tokio::time::sleep(Duration::from_millis(20)).await;
    let mut consumer = TcpStream::connect(bind_addr).await.expect("consumer connects");
    tokio::time::sleep(Duration::from_millis(20)).await;

    consumer.write_all(&interest_bytes(&prefix, 4)).await.unwrap();

    let mut buf = vec![0u8; 1024];
    let read = tokio::time::timeout(Duration::from_secs(1), producer.read(&mut buf))
        .await
        .expect("producer should receive the forwarded interest")
        .expect("read succeeds");
    assert!(read > 0, "producer socket got no bytes");

    shutdown.cancel();
    listener_task.abort();
    let _ = dispatcher_task.await;
}

/// A second scenario exercises the listener/event machinery alone (no
/// Dispatcher), verifying the accept handshake assigns distinct ids and
/// that closing a peer's socket reaches the event stream as `Closed`.
#[tokio::test]
async fn accept_handshake_assigns_ids_and_reports_close() {
    let port = reserve_port();
    let bind_addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let sink = metis_transport::EventSink::new(tx);
    let cancel = CancellationToken::new();

    let listen_cancel = cancel.clone();
    let listener_task = tokio::spawn(async move {
        metis_transport::tcp::spawn(bind_addr, false, sink, listen_cancel).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let client = TcpStream::connect(bind_addr).await.expect("client connects");

    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.expect("no timeout").expect("event received");
    match event {
        metis_transport::TransportEvent::Accepted { assign, .. } => {
            let _ = assign.send(7);
        }
        _ => panic!("expected an Accepted event"),
    }

    drop(client);
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.expect("no timeout").expect("event received");
    assert!(matches!(event, metis_transport::TransportEvent::Closed { connection_id: 7 }));

    cancel.cancel();
    listener_task.abort();
}
