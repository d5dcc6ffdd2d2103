#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use lanpeer::config::ServiceConfig;
use lanpeer::connection_manager::{ConnId, ConnState};
use lanpeer::core::{LocalIdentity, PeerEngine, SendError};
use lanpeer::discovery::DiscoveryPacket;
use lanpeer::log::NoopLogSink;
use lanpeer::media::{MediaFrame, MediaKind};
use lanpeer::signaling::{Envelope, PeerEvent};
use lanpeer::transport::{CloseReason, NetAction};

const BOB_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));
const BOB_REMOTE: SocketAddr = SocketAddr::new(BOB_IP, 51_000);

fn alice() -> PeerEngine {
    let mut e = PeerEngine::new(
        LocalIdentity::new("alice", 5000, "SKP-11111"),
        &ServiceConfig::default(),
        Arc::new(NoopLogSink),
    );
    e.start();
    e.drain_events();
    e
}

fn announce(e: &mut PeerEngine, name: &str, port: u16, now_ms: u64) {
    let packet = DiscoveryPacket::new(name, "Online", port, "SKP-22222").to_bytes();
    e.on_discovery_datagram(&packet, BOB_IP, now_ms);
}

fn texts(actions: &[NetAction], conn: ConnId) -> Vec<Envelope> {
    actions
        .iter()
        .filter_map(|a| match a {
            NetAction::SendText { conn: c, text } if *c == conn => {
                Some(serde_json::from_str::<Envelope>(text).unwrap())
            }
            _ => None,
        })
        .collect()
}

fn single_connect(actions: &[NetAction]) -> ConnId {
    match actions {
        [NetAction::Connect { conn, .. }] => *conn,
        other => panic!("expected one connect, got {other:?}"),
    }
}

fn message_from(from: &str, text: &str) -> String {
    serde_json::json!({"type": "message", "from": from, "text": text, "timestamp": ""}).to_string()
}

/// Inbound connection already identified as bob.
fn identified_bob(e: &mut PeerEngine) -> ConnId {
    let conn = e.on_inbound(BOB_REMOTE, 0);
    let actions = e.on_text(conn, r#"{"type":"identify","username":"bob"}"#, 0);
    assert!(actions.is_empty());
    conn
}

#[test]
fn first_send_connects_then_identifies_before_flushing() {
    let mut e = alice();
    announce(&mut e, "bob", 5001, 0);
    e.drain_events();

    let actions = e.send_message("bob", "hello", 1_000).unwrap();
    let conn = match &actions[..] {
        [NetAction::Connect { conn, peer, addr, url }] => {
            assert_eq!(peer, "bob");
            assert_eq!(*addr, SocketAddr::new(BOB_IP, 5001));
            assert_eq!(url, "ws://192.168.1.20:5001");
            *conn
        }
        other => panic!("expected connect, got {other:?}"),
    };
    assert_eq!(e.pending_len("bob"), 1);
    assert_eq!(e.outbound_for("bob").unwrap().state, ConnState::Connecting);

    let sent = texts(&e.on_connected(conn), conn);
    assert_eq!(
        sent[0],
        Envelope::Identify {
            username: "alice".into()
        }
    );
    match &sent[1] {
        Envelope::Message { from, text, timestamp } => {
            assert_eq!(from, "alice");
            assert_eq!(text, "hello");
            assert!(timestamp.starts_with("1970-01-01T00:00:01"));
        }
        other => panic!("expected message, got {other:?}"),
    }
    assert_eq!(sent.len(), 2);
    assert_eq!(e.pending_len("bob"), 0);
    assert_eq!(e.outbound_for("bob").unwrap().state, ConnState::Open);
}

#[test]
fn sends_while_connecting_flush_in_order_on_one_connection() {
    let mut e = alice();
    announce(&mut e, "bob", 5001, 0);

    let conn = single_connect(&e.send_message("bob", "one", 10).unwrap());
    assert!(e.send_message("bob", "two", 20).unwrap().is_empty());
    assert!(e.send_typing("bob", 30).unwrap().is_empty());
    assert_eq!(e.pending_len("bob"), 3);

    let sent = texts(&e.on_connected(conn), conn);
    let kinds: Vec<&str> = sent.iter().map(Envelope::kind).collect();
    assert_eq!(kinds, ["identify", "message", "message", "typing"]);
}

#[test]
fn open_connection_is_reused_and_replaced_after_close() {
    let mut e = alice();
    announce(&mut e, "bob", 5001, 0);
    let first = single_connect(&e.send_message("bob", "hi", 10).unwrap());
    e.on_connected(first);

    let actions = e.send_message("bob", "again", 20).unwrap();
    assert!(matches!(&actions[..], [NetAction::SendText { conn, .. }] if *conn == first));
    assert_eq!(e.connection_count(), 1);

    e.on_closed(first, "remote closed");
    assert_eq!(
        e.drain_events(),
        vec![PeerEvent::ConnectionLost { peer: "bob".into() }]
    );

    let second = single_connect(&e.send_message("bob", "back?", 30).unwrap());
    assert_ne!(first, second);
    assert!(e.send_message("bob", "queued", 40).unwrap().is_empty());
}

#[test]
fn failed_connect_drops_queue_and_next_send_retries() {
    let mut e = alice();
    announce(&mut e, "bob", 5001, 0);
    let conn = single_connect(&e.send_message("bob", "hi", 10).unwrap());
    e.on_connect_failed(conn, "connection refused");

    assert_eq!(e.pending_len("bob"), 0);
    assert!(e.outbound_for("bob").is_none());
    assert!(e.drain_events().iter().all(|ev| !matches!(ev, PeerEvent::ConnectionLost { .. })));
    single_connect(&e.send_message("bob", "retry", 20).unwrap());
}

#[test]
fn sending_to_unknown_peer_is_refused() {
    let mut e = alice();
    let err = e.send_message("carol", "hi", 10).unwrap_err();
    assert_eq!(err, SendError::PeerUnreachable("carol".into()));
    assert_eq!(
        e.drain_events(),
        vec![PeerEvent::PeerUnreachable {
            peer: "carol".into()
        }]
    );
    assert_eq!(e.connection_count(), 0);
}

#[test]
fn stopped_engine_refuses_sends() {
    let mut e = alice();
    announce(&mut e, "bob", 5001, 0);
    e.stop();
    assert_eq!(e.send_message("bob", "hi", 10), Err(SendError::NotRunning));
}

#[test]
fn inbound_message_requires_identify_and_is_acknowledged() {
    let mut e = alice();
    let conn = e.on_inbound(BOB_REMOTE, 0);

    assert!(e.on_text(conn, &message_from("bob", "too early"), 1).is_empty());
    assert!(e.drain_events().is_empty());

    e.on_text(conn, r#"{"type":"identify","username":"bob"}"#, 2);
    assert_eq!(e.connection(conn).unwrap().bound_peer.as_deref(), Some("bob"));

    let actions = e.on_text(conn, &message_from("bob", "hi alice"), 3);
    assert_eq!(
        texts(&actions, conn),
        vec![Envelope::MessageAck {
            from: "alice".into(),
            text: "hi alice".into()
        }]
    );
    assert_eq!(
        e.drain_events(),
        vec![PeerEvent::MessageReceived {
            from: "bob".into(),
            text: "hi alice".into(),
            timestamp: String::new()
        }]
    );
}

#[test]
fn spoofed_sender_is_dropped() {
    let mut e = alice();
    let conn = identified_bob(&mut e);
    assert!(e.on_text(conn, &message_from("mallory", "trust me"), 1).is_empty());
    assert!(e.on_text(conn, r#"{"type":"typing"}"#, 2).is_empty());
    assert!(e.drain_events().is_empty());
}

#[test]
fn empty_identify_closes_with_policy_violation() {
    let mut e = alice();
    let conn = e.on_inbound(BOB_REMOTE, 0);
    let actions = e.on_text(conn, r#"{"type":"identify","username":""}"#, 1);
    assert_eq!(
        actions,
        vec![NetAction::Close {
            conn,
            reason: CloseReason::policy("Empty username")
        }]
    );
    assert!(e.connection(conn).is_none());
}

#[test]
fn identify_on_outbound_connection_is_ignored() {
    let mut e = alice();
    announce(&mut e, "bob", 5001, 0);
    let conn = single_connect(&e.send_message("bob", "hi", 10).unwrap());
    e.on_connected(conn);
    assert!(e.on_text(conn, r#"{"type":"identify","username":"mallory"}"#, 11).is_empty());
    assert_eq!(e.connection(conn).unwrap().bound_peer.as_deref(), Some("bob"));
}

#[test]
fn thirty_first_message_in_window_is_dropped() {
    let mut e = alice();
    let conn = identified_bob(&mut e);

    for i in 0..31 {
        e.on_text(conn, &message_from("bob", &format!("m{i}")), 1_000);
    }
    let received = e
        .drain_events()
        .into_iter()
        .filter(|ev| matches!(ev, PeerEvent::MessageReceived { .. }))
        .count();
    assert_eq!(received, 30);

    // Window elapsed: accepted again.
    e.on_text(conn, &message_from("bob", "later"), 61_001);
    assert!(matches!(
        e.drain_events().as_slice(),
        [PeerEvent::MessageReceived { text, .. }] if text == "later"
    ));
}

#[test]
fn malformed_and_oversized_envelopes_are_dropped() {
    let mut e = alice();
    let conn = identified_bob(&mut e);
    assert!(e.on_text(conn, "not json", 1).is_empty());
    assert!(e.on_text(conn, "[1,2,3]", 1).is_empty());
    assert!(e.on_text(conn, r#"{"type":"launch_missiles","from":"bob"}"#, 1).is_empty());

    let huge = message_from("bob", &"x".repeat(70_000));
    assert!(e.on_text(conn, &huge, 1).is_empty());
    assert!(e.drain_events().is_empty());

    // Connection survives.
    e.on_text(conn, &message_from("bob", "still here"), 2);
    assert_eq!(e.drain_events().len(), 1);
}

#[test]
fn expired_peer_is_purged_once_with_its_connection_and_queue() {
    let mut e = alice();
    announce(&mut e, "bob", 5001, 0);
    e.drain_events();
    let conn = single_connect(&e.send_message("bob", "hi", 100).unwrap());

    assert!(e.on_sweep(15_000).is_empty(), "exactly at the window is still live");
    assert!(e.drain_events().is_empty());

    let actions = e.on_sweep(15_001);
    assert!(matches!(&actions[..], [NetAction::Close { conn: c, .. }] if *c == conn));
    assert_eq!(
        e.drain_events(),
        vec![
            PeerEvent::PresenceChanged {
                peer: "bob".into(),
                status: "Offline".into()
            },
            PeerEvent::ContactList(Vec::new()),
        ]
    );
    assert_eq!(e.pending_len("bob"), 0);
    assert!(e.peer("bob").is_none());

    assert!(e.on_sweep(20_000).is_empty());
    assert!(e.drain_events().is_empty());
    assert!(e.send_message("bob", "gone", 20_001).is_err());
}

#[test]
fn file_data_is_decoded_and_bad_base64_dropped() {
    let mut e = alice();
    let conn = identified_bob(&mut e);
    let good = serde_json::json!({
        "type": "file_data", "from": "bob", "fileName": "a.txt", "fileSize": 3.0, "data": "YWJj"
    });
    e.on_text(conn, &good.to_string(), 1);
    assert_eq!(
        e.drain_events(),
        vec![PeerEvent::FileData {
            from: "bob".into(),
            file_name: "a.txt".into(),
            data: Bytes::from_static(b"abc")
        }]
    );

    let bad = serde_json::json!({
        "type": "file_data", "from": "bob", "fileName": "b.txt", "fileSize": 1, "data": "***"
    });
    e.on_text(conn, &bad.to_string(), 2);
    assert!(e.drain_events().is_empty());
}

#[test]
fn media_is_never_queued() {
    let mut e = alice();
    announce(&mut e, "bob", 5001, 0);

    let conn = single_connect(&e.send_audio("bob", Bytes::from_static(b"pcm0"), 10).unwrap());
    assert!(e.send_audio("bob", Bytes::from_static(b"pcm1"), 20).unwrap().is_empty());
    assert_eq!(e.pending_len("bob"), 0);

    let flushed = e.on_connected(conn);
    assert_eq!(flushed.len(), 1, "only identify: {flushed:?}");

    let mut seqs = Vec::new();
    for _ in 0..2 {
        let actions = e.send_audio("bob", Bytes::from_static(b"pcm"), 30).unwrap();
        let [NetAction::SendBinary { data, .. }] = &actions[..] else {
            panic!("expected binary, got {actions:?}");
        };
        let frame = MediaFrame::parse(data).unwrap();
        assert_eq!(frame.kind, MediaKind::Audio);
        seqs.push(frame.seq);
    }
    assert_eq!(seqs, [0, 1]);

    // Video has its own counter.
    let actions = e.send_video("bob", Bytes::from_static(b"jpg"), 40).unwrap();
    let [NetAction::SendBinary { data, .. }] = &actions[..] else {
        panic!("expected binary");
    };
    assert_eq!(MediaFrame::parse(data).unwrap().seq, 0);
}

#[test]
fn binary_frames_need_an_identity() {
    let mut e = alice();
    let conn = e.on_inbound(BOB_REMOTE, 0);
    let frame = MediaFrame::audio(7, Bytes::from_static(b"voice")).encode();

    e.on_binary(conn, &frame);
    assert!(e.drain_events().is_empty());

    e.on_text(conn, r#"{"type":"identify","username":"bob"}"#, 1);
    e.on_binary(conn, &frame);
    e.on_binary(conn, &Bytes::from_static(b"XYZ\0\0\0\0\0"));
    assert_eq!(
        e.drain_events(),
        vec![PeerEvent::AudioData {
            from: "bob".into(),
            payload: Bytes::from_static(b"voice")
        }]
    );
}

#[test]
fn conference_create_fans_out_and_media_reaches_open_participants() {
    let mut e = alice();
    announce(&mut e, "bob", 5001, 0);
    e.drain_events();

    let (conf_id, actions) = e
        .create_conference(vec!["bob".into(), "carol".into()], 10)
        .unwrap();
    let conn = single_connect(&actions);
    assert!(e.drain_events().contains(&PeerEvent::PeerUnreachable {
        peer: "carol".into()
    }));
    assert!(e.conferences().is_participant(&conf_id, "alice"));

    let sent = texts(&e.on_connected(conn), conn);
    match &sent[1] {
        Envelope::ConfCreate {
            from,
            conference_id,
            participants,
        } => {
            assert_eq!(from, "alice");
            assert_eq!(conference_id, &conf_id);
            assert_eq!(participants, &["alice", "bob", "carol"]);
        }
        other => panic!("expected conf_create, got {other:?}"),
    }

    let actions = e
        .send_conference_audio(&conf_id, Bytes::from_static(b"mix"), 20)
        .unwrap();
    let [NetAction::SendBinary { conn: c, data }] = &actions[..] else {
        panic!("expected one frame for bob, got {actions:?}");
    };
    assert_eq!(*c, conn);
    let frame = MediaFrame::parse(data).unwrap();
    assert_eq!(frame.kind, MediaKind::ConferenceAudio);
    assert_eq!(frame.conference_id.as_deref(), Some(conf_id.as_str()));
    assert_eq!(frame.payload, Bytes::from_static(b"mix"));

    assert!(e.send_conference_audio("no-such-conf", Bytes::new(), 30).is_err());
}

#[test]
fn inbound_conference_signals_keep_registry_in_sync() {
    let mut e = alice();
    let conn = identified_bob(&mut e);

    let create = serde_json::json!({
        "type": "conf_create", "from": "bob", "conferenceId": "c-1", "participants": ["alice", "bob"]
    });
    e.on_text(conn, &create.to_string(), 1);
    assert!(e.conferences().is_participant("c-1", "bob"));
    assert!(matches!(
        e.drain_events().as_slice(),
        [PeerEvent::ConferenceCreated { conference_id, .. }] if conference_id == "c-1"
    ));

    let leave = serde_json::json!({"type": "conf_leave", "from": "bob", "conferenceId": "c-1"});
    e.on_text(conn, &leave.to_string(), 2);
    assert!(!e.conferences().is_participant("c-1", "bob"));
    assert!(e.conferences().is_participant("c-1", "alice"));

    e.leave_conference("c-1", 3).unwrap();
    assert!(e.conferences().get("c-1").is_none());
}

#[test]
fn repeated_conf_create_cannot_take_over_a_conference() {
    let mut e = alice();
    let (conf_id, _) = e
        .create_conference(vec!["bob".into(), "carol".into()], 0)
        .unwrap();
    let conn = identified_bob(&mut e);
    e.drain_events();

    let takeover = serde_json::json!({
        "type": "conf_create", "from": "bob", "conferenceId": conf_id, "participants": ["bob"]
    });
    assert!(e.on_text(conn, &takeover.to_string(), 1).is_empty());
    assert!(e.drain_events().is_empty());

    let rec = e.conferences().get(&conf_id).unwrap();
    assert_eq!(rec.host, "alice");
    assert_eq!(
        e.conferences().participants(&conf_id).unwrap(),
        vec!["alice", "bob", "carol"]
    );
}
