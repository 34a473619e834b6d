//! End-to-end tests: a real ClipSync host and a `PeerClient` on loopback.
//!
//! The host runs [`ClipSyncService`] over an [`InMemoryClipboard`]; the peer
//! finds it through a beacon sent straight to the listener's port, connects,
//! and exchanges clipboard content in both directions.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use clipsync_core::{ClipboardContent, ClipboardUpdate};
use clipsync_host::infrastructure::clipboard::memory::InMemoryClipboard;
use clipsync_host::infrastructure::network::discovery::BeaconConfig;
use clipsync_host::infrastructure::network::relay::RelayConfig;
use clipsync_host::infrastructure::service::{ClipSyncService, ServiceConfig};
use clipsync_peer::infrastructure::discovery::{
    DiscoveryEvent, DiscoveryListener, ListenerConfig,
};
use clipsync_peer::infrastructure::network::{PeerClient, PeerConfig, PeerEvent};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};

const WAIT: Duration = Duration::from_secs(3);

// ── Helpers ───────────────────────────────────────────────────────────────────

fn host_config(beacon_target: Option<SocketAddr>) -> ServiceConfig {
    let base_port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    ServiceConfig {
        relay: RelayConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port,
            port_range: 1,
            io_timeout: Duration::from_millis(100),
            forward_inbound: false,
        },
        poll_interval: Duration::from_millis(20),
        beacon: beacon_target.map(|target| BeaconConfig {
            target,
            interval: Duration::from_millis(100),
            device_type: "windows".to_string(),
            device_name: Some("loopback-host".to_string()),
        }),
    }
}

async fn next_event(rx: &mut mpsc::Receiver<PeerEvent>) -> PeerEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("event must arrive in time")
        .expect("event channel closed")
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

fn peer(relay_addr: SocketAddr) -> Arc<PeerClient> {
    Arc::new(PeerClient::new(PeerConfig {
        relay_addr,
        connect_timeout: Duration::from_secs(1),
        reconnect_interval: None,
    }))
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_peer_receives_host_copies_and_sends_text_back() {
    // Arrange
    let clipboard = Arc::new(InMemoryClipboard::new());
    let service = ClipSyncService::new(host_config(None), clipboard.clone());
    let port = service.start().await.unwrap();
    let client = peer(SocketAddr::from(([127, 0, 0, 1], port)));
    let running = Arc::new(AtomicBool::new(true));
    let mut rx = Arc::clone(&client).start(running).await;
    assert!(matches!(next_event(&mut rx).await, PeerEvent::Connected { .. }));
    assert!(wait_until(|| service.relay().peer_count() == 1).await);

    // Act 1 – copy on the host
    clipboard.copy(ClipboardContent::Text("from host".to_string()));

    // Assert 1
    match next_event(&mut rx).await {
        PeerEvent::Update(update) => {
            assert_eq!(update.content(), &ClipboardContent::Text("from host".to_string()));
        }
        other => panic!("unexpected event {other:?}"),
    }

    // Act 2 – the peer sends text back
    client.send_text("from peer").await.unwrap();

    // Assert 2 – applied on the host and not echoed to the sender
    let expected = Some(ClipboardContent::Text("from peer".to_string()));
    assert!(wait_until(|| clipboard.current() == expected).await);
    assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());

    service.stop().await;
}

#[tokio::test]
async fn test_peer_receives_images_as_png_bytes() {
    // Arrange
    let clipboard = Arc::new(InMemoryClipboard::new());
    let service = ClipSyncService::new(host_config(None), clipboard.clone());
    let port = service.start().await.unwrap();
    let mut rx = peer(SocketAddr::from(([127, 0, 0, 1], port)))
        .start(Arc::new(AtomicBool::new(true)))
        .await;
    assert!(matches!(next_event(&mut rx).await, PeerEvent::Connected { .. }));
    assert!(wait_until(|| service.relay().peer_count() == 1).await);

    // Act
    let png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00];
    clipboard.copy(ClipboardContent::Image(png.clone()));

    // Assert
    match next_event(&mut rx).await {
        PeerEvent::Update(update) => assert_eq!(update.into_content(), ClipboardContent::Image(png)),
        other => panic!("unexpected event {other:?}"),
    }

    service.stop().await;
}

#[tokio::test]
async fn test_host_stop_reports_disconnected_to_peer() {
    // Arrange
    let service = ClipSyncService::new(host_config(None), Arc::new(InMemoryClipboard::new()));
    let port = service.start().await.unwrap();
    let mut rx = peer(SocketAddr::from(([127, 0, 0, 1], port)))
        .start(Arc::new(AtomicBool::new(true)))
        .await;
    assert!(matches!(next_event(&mut rx).await, PeerEvent::Connected { .. }));

    // Act
    service.stop().await;

    // Assert
    assert_eq!(next_event(&mut rx).await, PeerEvent::Disconnected);
}

#[tokio::test]
async fn test_listener_discovers_host_and_peer_connects_to_advertised_port() {
    // Arrange – listener on an ephemeral loopback port, host beacons aimed at it
    let listener = DiscoveryListener::bind(ListenerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..ListenerConfig::default()
    })
    .unwrap();
    let target = listener.local_addr().unwrap();
    let listening = Arc::new(AtomicBool::new(true));
    let (mut events, handle) = listener.spawn(Arc::clone(&listening)).unwrap();

    let clipboard = Arc::new(InMemoryClipboard::with_text("already here"));
    let service = ClipSyncService::new(host_config(Some(target)), clipboard.clone());
    let port = service.start().await.unwrap();

    // Act
    let found = timeout(WAIT, events.recv()).await.unwrap().unwrap();

    // Assert – the beacon carries the bound port
    let host = match found {
        DiscoveryEvent::Found(host) => host,
        other => panic!("unexpected event {other:?}"),
    };
    assert_eq!(host.port, port);
    assert_eq!(host.device_name, "loopback-host");

    // The relay only listens on loopback, while the beacon advertises the
    // machine's LAN address, so dial loopback on the advertised port.
    let client = peer(SocketAddr::from(([127, 0, 0, 1], host.port)));
    let mut rx = Arc::clone(&client).start(Arc::new(AtomicBool::new(true))).await;
    assert!(matches!(next_event(&mut rx).await, PeerEvent::Connected { .. }));
    client
        .send_update(&ClipboardUpdate::text("via discovery"))
        .await
        .unwrap();
    let expected = Some(ClipboardContent::Text("via discovery".to_string()));
    assert!(wait_until(|| clipboard.current() == expected).await);

    listening.store(false, std::sync::atomic::Ordering::Relaxed);
    service.stop().await;
    drop(events);
    tokio::task::spawn_blocking(move || handle.join()).await.unwrap().unwrap();
}
