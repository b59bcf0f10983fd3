//! Scenario tests for the synchronization manager.

use super::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use glam::Vec3;

use crate::messages::{ItemAction, MessageKind, Orientation};
use crate::reconnection::ReconnectConfig;
use crate::testing::{ManualClock, RecordingTransport};

const FRAME: Duration = Duration::from_millis(16);

type TestManager = SyncManager<RecordingTransport, ManualClock>;

fn base_config() -> SyncConfig {
    SyncConfig::new("local", "arena")
}

fn manager_with(config: SyncConfig) -> (TestManager, RecordingTransport, ManualClock) {
    let transport = RecordingTransport::new();
    let clock = ManualClock::new();
    let manager = SyncManager::with_clock(config, transport.clone(), clock.clone());
    (manager, transport, clock)
}

/// Helper: a manager whose transport has already reported a successful connect.
fn connected(config: SyncConfig) -> (TestManager, RecordingTransport, ManualClock) {
    let (mut manager, transport, clock) = manager_with(config);
    manager.connect();
    assert!(transport.complete_connect());
    manager.pump();
    assert_eq!(manager.connection_state(), ConnectionState::Connected);
    (manager, transport, clock)
}

fn update(origin: &str, position: Vec3) -> Message {
    Message::new(origin, 0, Payload::EntityUpdate(EntityState::at(position)))
}

fn recorder<T: Clone + 'static>() -> Rc<RefCell<Vec<T>>> {
    Rc::new(RefCell::new(Vec::new()))
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[test]
fn test_burst_within_interval_sends_once_with_last_snapshot() {
    let config = SyncConfig {
        min_send_interval: Duration::from_millis(1_000),
        ..base_config()
    };
    let (mut manager, transport, clock) = connected(config);

    for x in [1.0, 2.0, 3.0] {
        manager.send_state(EntityState::at(Vec3::new(x, 0.0, 0.0)));
        clock.advance_ms(2);
    }
    manager.advance(FRAME);
    assert_eq!(transport.sent_count(), 0);

    clock.advance_ms(1_000);
    manager.advance(FRAME);
    manager.advance(FRAME);

    let sent = transport.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].origin_id, "local");
    match &sent[0].payload {
        Payload::EntityUpdate(state) => assert_eq!(state.position, Vec3::new(3.0, 0.0, 0.0)),
        other => panic!("expected entity-update, got {other:?}"),
    }
}

#[test]
fn test_state_buffered_offline_is_flushed_on_connect() {
    let (mut manager, transport, _clock) = manager_with(base_config());
    manager.send_state(EntityState::at(Vec3::X));
    manager.send_state(EntityState::at(Vec3::Y));
    assert_eq!(transport.sent_count(), 0);

    manager.connect();
    assert_eq!(transport.sent_count(), 0);
    transport.complete_connect();
    manager.pump();

    let sent = transport.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].payload, Payload::EntityUpdate(EntityState::at(Vec3::Y)));
}

#[test]
fn test_send_failure_is_counted_not_surfaced() {
    let (mut manager, transport, clock) = connected(base_config());
    transport.fail_sends(true);

    clock.advance_ms(200);
    manager.send_state(EntityState::at(Vec3::ONE));
    clock.advance_ms(200);
    manager.send_state(EntityState::at(Vec3::ONE));

    let stats = manager.stats();
    assert_eq!(stats.send_failures, 2);
    assert_eq!(stats.messages_sent, 0);
    assert_eq!(manager.connection_state(), ConnectionState::Connected);

    let end = SessionEnd {
        round: 1,
        reason: "timer".to_string(),
        winner_id: None,
    };
    assert!(matches!(
        manager.send_session_end(end),
        Err(SendError::Transport(TransportError::SendFailed(_)))
    ));
}

#[test]
fn test_one_shot_senders_attempt_delivery_while_reconnecting() {
    let (mut manager, transport, _clock) = connected(base_config());
    transport.drop_connection("blip");
    manager.pump();
    assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
    assert!(manager.has_pending_retry());
    transport.clear_sent();

    let end = SessionEnd {
        round: 1,
        reason: "timer".to_string(),
        winner_id: None,
    };
    assert!(manager.send_session_end(end).is_ok());
    let sent = transport.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind(), MessageKind::SessionEnd);
}

#[test]
fn test_one_shot_send_reports_transport_refusal_while_offline() {
    let (mut manager, transport, _clock) = manager_with(base_config());
    transport.fail_sends(true);
    let sync = TimerSync {
        round: 1,
        remaining_ms: 30_000,
    };
    assert!(matches!(
        manager.send_timer_sync(sync),
        Err(SendError::Transport(TransportError::SendFailed(_)))
    ));
    assert_eq!(manager.stats().send_failures, 1);
}

#[test]
fn test_one_shot_senders_skip_the_throttle() {
    let (mut manager, transport, _clock) = connected(base_config());
    let item = ItemState {
        item_id: "orb-1".to_string(),
        kind: "fuel".to_string(),
        position: Vec3::new(4.0, 1.0, 0.0),
        active: true,
    };

    manager
        .send_session_start(SessionStart {
            round: 2,
            participants: vec!["local".to_string(), "r1".to_string()],
            duration_ms: 60_000,
        })
        .unwrap();
    manager
        .send_item_event(ItemChange {
            action: ItemAction::Spawned,
            item: item.clone(),
            actor_id: None,
        })
        .unwrap();
    manager.send_items_full_sync(vec![item]).unwrap();

    let kinds: Vec<_> = transport.sent_messages().iter().map(Message::kind).collect();
    assert_eq!(
        kinds,
        vec![
            MessageKind::SessionStart,
            MessageKind::ItemEvent,
            MessageKind::ItemsFullSync
        ]
    );
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[test]
fn test_remote_entity_converges_exactly_at_window() {
    let config = SyncConfig {
        interpolation_window: Duration::from_millis(500),
        ..base_config()
    };
    let (mut manager, transport, clock) = connected(config);

    transport.deliver(&update("r1", Vec3::ZERO));
    manager.advance(FRAME);
    transport.deliver(&update("r1", Vec3::new(10.0, 0.0, 0.0)));
    manager.advance(FRAME);

    clock.advance_ms(250);
    manager.advance(FRAME);
    let halfway = manager.remote_entity("r1").unwrap().displayed.position;
    assert!((halfway.x - 5.0).abs() < 1e-3, "halfway was {halfway:?}");

    clock.advance_ms(250);
    manager.advance(FRAME);
    let entity = manager.remote_entity("r1").unwrap();
    assert_eq!(entity.displayed.position, Vec3::new(10.0, 0.0, 0.0));
    assert_eq!(entity.progress, 1.0);
}

#[test]
fn test_frame_delta_does_not_drive_blending() {
    let config = SyncConfig {
        interpolation_window: Duration::from_millis(500),
        ..base_config()
    };
    let (mut manager, transport, clock) = connected(config);

    transport.deliver(&update("r1", Vec3::ZERO));
    manager.advance(FRAME);
    transport.deliver(&update("r1", Vec3::new(10.0, 0.0, 0.0)));
    manager.advance(FRAME);

    clock.advance_ms(250);
    manager.advance(Duration::from_secs(10));
    let entity = manager.remote_entity("r1").unwrap();
    assert!((entity.progress - 0.5).abs() < 1e-3);
}

#[test]
fn test_first_update_is_displayed_without_blending() {
    let (mut manager, transport, _clock) = connected(base_config());
    let state = EntityState::at(Vec3::new(3.0, 2.0, 1.0))
        .with_orientation(Orientation::new(0.5, -0.1))
        .with_resource(250.0);
    transport.deliver(&Message::new("r1", 7, Payload::EntityUpdate(state)));
    manager.pump();

    let entity = manager.remote_entity("r1").unwrap();
    assert_eq!(entity.displayed, entity.target);
    assert_eq!(entity.displayed.position, Vec3::new(3.0, 2.0, 1.0));
    assert_eq!(entity.resource, 100.0);
    assert_eq!(entity.last_timestamp, 7);
}

#[test]
fn test_update_missing_velocity_is_dropped() {
    let (mut manager, transport, _clock) = connected(base_config());
    let json = br#"{
        "type": "entity-update",
        "originId": "r2",
        "timestamp": 1,
        "position": {"x": 1.0, "y": 0.0, "z": 0.0},
        "orientation": {"yaw": 0.0, "pitch": 0.0},
        "resource": 50.0,
        "abilities": {"dashing": false, "jetpacking": false, "grounded": true}
    }"#;
    transport.deliver_raw(json.to_vec());
    manager.advance(FRAME);

    assert_eq!(manager.remote_entities().count(), 0);
    assert_eq!(manager.stats().messages_dropped, 1);
}

#[test]
fn test_negative_resource_bound_does_not_break_inbound() {
    let config = SyncConfig {
        resource_max: -1.0,
        ..base_config()
    };
    let (mut manager, transport, _clock) = connected(config);
    let state = EntityState::at(Vec3::ZERO).with_resource(250.0);
    transport.deliver(&Message::new("r1", 0, Payload::EntityUpdate(state)));
    manager.pump();

    let entity = manager.remote_entity("r1").unwrap();
    assert_eq!(entity.resource, 100.0);
}

#[test]
fn test_malformed_payload_is_dropped() {
    let (mut manager, transport, _clock) = connected(base_config());
    transport.deliver_raw(b"not json".to_vec());
    transport.deliver(&update("r1", Vec3::ONE));
    manager.pump();

    let stats = manager.stats();
    assert_eq!(stats.messages_dropped, 1);
    assert_eq!(stats.messages_received, 1);
    assert_eq!(stats.tracked_entity_count, 1);
}

#[test]
fn test_self_echo_never_touches_the_store() {
    let (mut manager, transport, _clock) = connected(base_config());
    let ends = recorder::<SessionEnd>();
    let sink = Rc::clone(&ends);
    manager.on_session_end(move |end| sink.borrow_mut().push(end.clone()));

    transport.deliver(&update("local", Vec3::ONE));
    transport.deliver(&Message::new(
        "local",
        0,
        Payload::SessionEnd(SessionEnd {
            round: 1,
            reason: "host-quit".to_string(),
            winner_id: None,
        }),
    ));
    manager.advance(FRAME);

    assert!(manager.remote_entity("local").is_none());
    assert!(ends.borrow().is_empty());
    // Echo still counts as traffic.
    assert_eq!(manager.stats().messages_received, 2);
    assert_eq!(manager.stats().ms_since_last_receive, Some(0));
}

#[test]
fn test_session_messages_reach_listeners() {
    let (mut manager, transport, _clock) = connected(base_config());
    let log = recorder::<String>();

    let l = Rc::clone(&log);
    manager.on_session_start(move |s| l.borrow_mut().push(format!("start:{}", s.round)));
    let l = Rc::clone(&log);
    manager.on_timer_sync(move |t| l.borrow_mut().push(format!("timer:{}", t.remaining_ms)));
    let l = Rc::clone(&log);
    manager.on_session_end(move |e| {
        l.borrow_mut()
            .push(format!("end:{}", e.winner_id.as_deref().unwrap_or("-")))
    });
    let l = Rc::clone(&log);
    manager.on_item_event(move |event| {
        let entry = match event {
            ItemEvent::Change(change) => format!("item:{}", change.item.item_id),
            ItemEvent::FullSync(items) => format!("items:{}", items.len()),
        };
        l.borrow_mut().push(entry);
    });

    let item = ItemState {
        item_id: "orb-1".to_string(),
        kind: "fuel".to_string(),
        position: Vec3::ZERO,
        active: false,
    };
    let inbound = [
        Payload::SessionStart(SessionStart {
            round: 3,
            participants: vec!["host".to_string()],
            duration_ms: 90_000,
        }),
        Payload::TimerSync(TimerSync {
            round: 3,
            remaining_ms: 45_000,
        }),
        Payload::ItemEvent(ItemChange {
            action: ItemAction::Collected,
            item: item.clone(),
            actor_id: Some("host".to_string()),
        }),
        Payload::ItemsFullSync(ItemsFullSync { items: vec![item] }),
        Payload::SessionEnd(SessionEnd {
            round: 3,
            reason: "timer".to_string(),
            winner_id: Some("host".to_string()),
        }),
    ];
    for payload in inbound {
        transport.deliver(&Message::new("host", 10, payload));
    }
    manager.pump();

    assert_eq!(
        *log.borrow(),
        vec![
            "start:3",
            "timer:45000",
            "item:orb-1",
            "items:1",
            "end:host"
        ]
    );
    assert_eq!(manager.remote_entities().count(), 0);
}

#[test]
fn test_out_of_order_updates_accepted_by_default() {
    let (mut manager, transport, _clock) = connected(base_config());
    let newer = Message::new("r1", 20, Payload::EntityUpdate(EntityState::at(Vec3::X)));
    let older = Message::new("r1", 10, Payload::EntityUpdate(EntityState::at(Vec3::Y)));
    transport.deliver(&newer);
    transport.deliver(&older);
    manager.pump();

    assert_eq!(manager.remote_entity("r1").unwrap().target.position, Vec3::Y);
}

#[test]
fn test_out_of_order_updates_rejected_when_enabled() {
    let config = SyncConfig {
        reject_out_of_order: true,
        ..base_config()
    };
    let (mut manager, transport, _clock) = connected(config);
    let newer = Message::new("r1", 20, Payload::EntityUpdate(EntityState::at(Vec3::X)));
    let older = Message::new("r1", 10, Payload::EntityUpdate(EntityState::at(Vec3::Y)));
    transport.deliver(&newer);
    transport.deliver(&older);
    manager.pump();

    assert_eq!(manager.remote_entity("r1").unwrap().target.position, Vec3::X);
    assert_eq!(manager.stats().messages_dropped, 1);
}

#[test]
fn test_receive_message_validates() {
    let (mut manager, _transport, _clock) = connected(base_config());
    let bad = Message::new(
        "r1",
        0,
        Payload::EntityUpdate(EntityState::at(Vec3::new(f32::NAN, 0.0, 0.0))),
    );
    manager.receive_message(bad);
    manager.receive_message(update("", Vec3::ZERO));
    manager.receive_message(update("r1", Vec3::ONE));

    assert_eq!(manager.stats().messages_dropped, 2);
    assert_eq!(manager.remote_entity("r1").unwrap().target.position, Vec3::ONE);
}

// ---------------------------------------------------------------------------
// Silence detection
// ---------------------------------------------------------------------------

#[test]
fn test_silent_entity_evicted_and_reported_once() {
    let config = SyncConfig {
        disconnect_timeout: Duration::from_millis(1_000),
        ..base_config()
    };
    let (mut manager, transport, clock) = connected(config);
    let gone = recorder::<String>();
    let sink = Rc::clone(&gone);
    manager.on_disconnect(move |id| sink.borrow_mut().push(id.to_string()));

    transport.deliver(&update("r1", Vec3::ZERO));
    manager.advance(FRAME);

    clock.advance_ms(1_500);
    manager.advance(FRAME);
    assert!(manager.remote_entity("r1").is_none());
    assert_eq!(*gone.borrow(), vec!["r1"]);

    for _ in 0..20 {
        clock.advance_ms(500);
        manager.advance(FRAME);
    }
    assert_eq!(gone.borrow().len(), 1);
}

#[test]
fn test_returning_entity_is_detected_again() {
    let config = SyncConfig {
        disconnect_timeout: Duration::from_millis(1_000),
        ..base_config()
    };
    let (mut manager, transport, clock) = connected(config);
    let gone = recorder::<String>();
    let sink = Rc::clone(&gone);
    manager.on_disconnect(move |id| sink.borrow_mut().push(id.to_string()));

    transport.deliver(&update("r1", Vec3::ZERO));
    manager.advance(FRAME);
    clock.advance_ms(1_500);
    manager.advance(FRAME);

    transport.deliver(&update("r1", Vec3::ONE));
    manager.advance(FRAME);
    let entity = manager.remote_entity("r1").unwrap();
    assert_eq!(entity.displayed.position, Vec3::ONE);

    clock.advance_ms(1_500);
    manager.advance(FRAME);
    assert_eq!(*gone.borrow(), vec!["r1", "r1"]);
}

#[test]
fn test_local_entities_are_never_evicted() {
    let config = SyncConfig {
        disconnect_timeout: Duration::from_millis(1_000),
        ..base_config()
    };
    let (mut manager, _transport, clock) = connected(config);
    let gone = recorder::<String>();
    let sink = Rc::clone(&gone);
    manager.on_disconnect(move |id| sink.borrow_mut().push(id.to_string()));

    manager.track_local_entity("bot-1", EntityState::at(Vec3::ZERO));
    manager.track_local_entity("local", EntityState::at(Vec3::ZERO));
    assert!(manager.remote_entity("local").is_none());

    clock.advance_ms(10_000);
    manager.advance(FRAME);
    assert!(manager.update_local_entity("bot-1", EntityState::at(Vec3::X)));
    assert!(!manager.update_local_entity("bot-2", EntityState::at(Vec3::X)));
    clock.advance_ms(10_000);
    manager.advance(FRAME);

    let bot = manager.remote_entity("bot-1").unwrap();
    assert!(bot.exempt);
    assert_eq!(bot.displayed.position, Vec3::X);
    assert!(gone.borrow().is_empty());
}

#[test]
fn test_remove_entity_skips_disconnect_listeners() {
    let (mut manager, transport, _clock) = connected(base_config());
    let gone = recorder::<String>();
    let sink = Rc::clone(&gone);
    manager.on_disconnect(move |id| sink.borrow_mut().push(id.to_string()));

    transport.deliver(&update("r1", Vec3::ZERO));
    manager.advance(FRAME);
    assert!(manager.remove_entity("r1").is_some());
    assert!(manager.remove_entity("r1").is_none());
    manager.advance(FRAME);
    assert!(gone.borrow().is_empty());

    transport.deliver(&update("r1", Vec3::ONE));
    manager.advance(FRAME);
    assert!(manager.remote_entity("r1").is_some());
}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

#[test]
fn test_panicking_update_listener_does_not_abort_tick() {
    let (mut manager, transport, _clock) = connected(base_config());
    let seen = recorder::<String>();

    manager.on_update(|entity| {
        if entity.id == "r1" {
            panic!("render layer bug");
        }
    });
    let sink = Rc::clone(&seen);
    manager.on_update(move |entity| sink.borrow_mut().push(entity.id.clone()));

    transport.deliver(&update("r1", Vec3::ZERO));
    transport.deliver(&update("r2", Vec3::ONE));
    manager.advance(FRAME);

    let mut ids = seen.borrow().clone();
    ids.sort();
    assert_eq!(ids, vec!["r1", "r2"]);
}

#[test]
fn test_unsubscribed_listener_is_not_called() {
    let (mut manager, transport, _clock) = connected(base_config());
    let hits = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&hits);
    let sub = manager.on_update(move |_| *counter.borrow_mut() += 1);
    assert_eq!(manager.stats().listener_count, 1);

    transport.deliver(&update("r1", Vec3::ZERO));
    manager.advance(FRAME);
    assert!(manager.unsubscribe(sub));
    manager.advance(FRAME);

    assert_eq!(*hits.borrow(), 1);
    assert_eq!(manager.stats().listener_count, 0);
}

// ---------------------------------------------------------------------------
// Connection lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_reconnect_attempts_are_bounded() {
    let config = SyncConfig {
        reconnect: ReconnectConfig {
            max_attempts: 3,
            ..Default::default()
        },
        ..base_config()
    };
    let (mut manager, transport, clock) = manager_with(config);
    transport.refuse_connect(Some("backend down"));

    manager.connect();
    assert_eq!(manager.stats().reconnect_attempts, 1);

    for delay_ms in [1_000, 2_000, 4_000] {
        assert!(manager.has_pending_retry());
        clock.advance_ms(delay_ms - 1);
        manager.pump();
        let calls = transport.connect_calls();
        clock.advance_ms(1);
        manager.pump();
        assert_eq!(transport.connect_calls(), calls + 1);
    }

    assert_eq!(transport.connect_calls(), 4);
    assert_eq!(manager.stats().reconnect_attempts, 3);
    assert!(!manager.has_pending_retry());

    clock.advance_ms(3_600_000);
    manager.advance(FRAME);
    assert_eq!(transport.connect_calls(), 4);
    assert_eq!(manager.stats().reconnect_attempts, 3);
    assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn test_dropped_link_reconnects_and_resets_attempts() {
    let (mut manager, transport, clock) = connected(base_config());
    let connects = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&connects);
    manager.on_connect(move || *counter.borrow_mut() += 1);

    transport.drop_connection("socket closed");
    manager.pump();
    assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
    assert!(manager.has_pending_retry());

    clock.advance_ms(1_000);
    manager.pump();
    assert_eq!(manager.connection_state(), ConnectionState::Connecting);
    assert_eq!(transport.connect_calls(), 2);

    transport.complete_connect();
    manager.pump();
    assert_eq!(manager.connection_state(), ConnectionState::Connected);
    assert_eq!(manager.stats().reconnect_attempts, 0);
    assert_eq!(*connects.borrow(), 1);
}

#[test]
fn test_async_connect_failure_schedules_retry() {
    let (mut manager, transport, _clock) = manager_with(base_config());
    manager.connect();
    assert!(transport.fail_connect("timeout"));
    manager.pump();

    assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
    assert!(manager.has_pending_retry());
    // The abandoned attempt is no longer listened to.
    assert!(!transport.complete_connect());
}

#[test]
fn test_teardown_is_idempotent() {
    let (mut manager, transport, clock) = connected(base_config());
    transport.deliver(&update("r1", Vec3::ZERO));
    manager.advance(FRAME);
    clock.advance_ms(10);
    manager.send_state(EntityState::at(Vec3::ONE));

    manager.disconnect();
    let once = manager.stats();
    manager.disconnect();
    let twice = manager.stats();

    assert_eq!(once, twice);
    assert_eq!(twice.connection_state, ConnectionState::Disconnected);
    assert_eq!(twice.tracked_entity_count, 0);
    assert_eq!(twice.reconnect_attempts, 0);
    assert!(!manager.has_pending_retry());
    assert!(manager.outbound_state().is_none());
    assert_eq!(transport.disconnect_calls(), 1);
}

#[test]
fn test_teardown_cancels_pending_retry() {
    let (mut manager, transport, clock) = manager_with(base_config());
    transport.refuse_connect(Some("backend down"));
    manager.connect();
    assert!(manager.has_pending_retry());

    manager.disconnect();
    assert!(!manager.has_pending_retry());

    clock.advance_ms(60_000);
    manager.advance(FRAME);
    assert_eq!(transport.connect_calls(), 1);
    assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
}

#[test]
fn test_events_after_teardown_are_ignored() {
    let (mut manager, transport, _clock) = manager_with(base_config());
    let connects = Rc::new(RefCell::new(0));
    let counter = Rc::clone(&connects);
    manager.on_connect(move || *counter.borrow_mut() += 1);

    manager.connect();
    manager.disconnect();
    assert!(!transport.is_listening());
    assert!(!transport.complete_connect());
    manager.pump();

    assert_eq!(manager.connection_state(), ConnectionState::Disconnected);
    assert_eq!(*connects.borrow(), 0);
}

#[test]
fn test_explicit_connect_is_noop_while_connected() {
    let (mut manager, transport, _clock) = connected(base_config());
    manager.connect();
    assert_eq!(transport.connect_calls(), 1);
}

#[test]
fn test_drop_closes_transport() {
    let (manager, transport, _clock) = connected(base_config());
    drop(manager);
    assert_eq!(transport.disconnect_calls(), 1);
}

// ---------------------------------------------------------------------------
// Polling and stats
// ---------------------------------------------------------------------------

#[test]
fn test_poll_session_state_routes_payloads() {
    let (mut manager, transport, _clock) = connected(base_config());
    let timers = recorder::<TimerSync>();
    let sink = Rc::clone(&timers);
    manager.on_timer_sync(move |t| sink.borrow_mut().push(t.clone()));

    transport.set_session_state(&[
        update("host", Vec3::X),
        Message::new(
            "host",
            5,
            Payload::TimerSync(TimerSync {
                round: 1,
                remaining_ms: 12_000,
            }),
        ),
    ]);

    assert_eq!(manager.poll_session_state().unwrap(), 2);
    assert!(manager.remote_entity("host").is_some());
    assert_eq!(timers.borrow().len(), 1);
}

#[test]
fn test_poll_session_state_errors() {
    let (mut manager, _transport, _clock) = manager_with(base_config());
    assert_eq!(
        manager.poll_session_state(),
        Err(TransportError::NotConnected)
    );

    let (mut manager, _transport, _clock) = connected(base_config());
    assert_eq!(
        manager.poll_session_state(),
        Err(TransportError::Unsupported)
    );
}

#[test]
fn test_stats_track_receive_age() {
    let (mut manager, transport, clock) = connected(base_config());
    assert_eq!(manager.stats().ms_since_last_receive, None);

    transport.deliver(&update("r1", Vec3::ZERO));
    manager.pump();
    clock.advance_ms(250);

    let stats = manager.stats();
    assert_eq!(stats.ms_since_last_receive, Some(250));
    assert_eq!(stats.tracked_entity_count, 1);
    assert_eq!(stats.connection_state, ConnectionState::Connected);
}
