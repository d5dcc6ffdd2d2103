//! The real service with its sockets and threads, started and stopped on a
//! fixed discovery port.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::mpsc::Receiver;

use lanpeer::config::{ConnectionConfig, DiscoveryConfig, ServiceConfig};
use lanpeer::log::{LogSink, NoopLogSink};
use lanpeer::{LanPeerService, PeerEvent, SendError, ServiceError};

const DISCOVERY_PORT: u16 = 33_999;

fn config() -> ServiceConfig {
    ServiceConfig {
        discovery: DiscoveryConfig {
            port: DISCOVERY_PORT,
            broadcast: false,
            ..DiscoveryConfig::default()
        },
        connections: ConnectionConfig {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            ..ConnectionConfig::default()
        },
        dialable_number: Some("SKP-40404".into()),
        ..ServiceConfig::default()
    }
}

/// Lifecycle events already delivered; `stop` has joined the loop, so
/// nothing more is in flight.
fn lifecycle(events: &Receiver<PeerEvent>) -> Vec<PeerEvent> {
    events
        .try_iter()
        .filter(|e| matches!(e, PeerEvent::Connected | PeerEvent::Disconnected))
        .collect()
}

#[test]
fn stop_is_synchronous_idempotent_and_frees_the_ports() {
    let log: Arc<dyn LogSink> = Arc::new(NoopLogSink);
    let (mut svc, events) = LanPeerService::new(config(), log);

    svc.start("alice").unwrap();
    assert!(svc.is_running());
    assert_eq!(svc.username(), Some("alice"));
    assert_eq!(svc.dialable_number(), Some("SKP-40404"));
    assert_ne!(svc.ws_port(), Some(0));
    assert!(matches!(svc.start("alice"), Err(ServiceError::AlreadyRunning)));

    svc.stop();
    assert!(!svc.is_running());
    assert_eq!(svc.send_message("bob", "hi"), Err(SendError::NotRunning));
    assert_eq!(lifecycle(&events), vec![PeerEvent::Connected, PeerEvent::Disconnected]);

    svc.stop();
    assert!(lifecycle(&events).is_empty());

    // Same discovery port again: everything was released by the first stop.
    svc.start("alice").unwrap();
    assert!(svc.is_running());
    svc.stop();
    assert_eq!(lifecycle(&events), vec![PeerEvent::Connected, PeerEvent::Disconnected]);
}
