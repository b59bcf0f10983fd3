//! Demo binary: a host and a guest synchronizing over a lossy in-memory hub.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p tether-demo -- --packet-loss 0.3` to stress it.
//! Simulated time runs on a manual clock, so the run completes instantly and
//! the same seed always produces the same log.

mod loopback;

use std::f32::consts::TAU;
use std::time::Duration;

use clap::Parser;
use glam::Vec3;
use tether_config::{CliArgs, Config};
use tether_sync::testing::ManualClock;
use tether_sync::{
    ConnectionState, EntityState, ItemAction, ItemChange, ItemEvent, ItemState, Orientation,
    SessionEnd, SessionStart, SyncConfig, SyncManager, TimerSync,
};
use tracing::{info, warn};

use loopback::{LoopbackHub, LoopbackTransport};

type DemoManager = SyncManager<LoopbackTransport, ManualClock>;

const GUEST_ID: &str = "guest-1";
const BOT_ID: &str = "bot-1";

/// Position on a circle of `radius` after `t` seconds at one lap per `period`.
fn orbit(t: f32, radius: f32, period: f32) -> EntityState {
    let angle = TAU * t / period;
    let speed = TAU * radius / period;
    EntityState::at(Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin()))
        .with_velocity(Vec3::new(-speed * angle.sin(), 0.0, speed * angle.cos()))
        .with_orientation(Orientation::new(angle + TAU / 4.0, 0.0))
        .with_resource(100.0 - (t * 3.0) % 100.0)
}

fn watch(guest: &mut DemoManager) {
    guest.on_connect(|| info!("[guest] connected"));
    guest.on_disconnect(|id| info!("[guest] {} went silent", id));
    guest.on_session_start(|s| {
        info!(
            "[guest] round {} starts with {} participants",
            s.round,
            s.participants.len()
        )
    });
    guest.on_timer_sync(|t| info!("[guest] round {}: {} ms left", t.round, t.remaining_ms));
    guest.on_item_event(|event| match event {
        ItemEvent::Change(change) => {
            info!("[guest] item {} {:?}", change.item.item_id, change.action)
        }
        ItemEvent::FullSync(items) => info!("[guest] item resync: {} items", items.len()),
    });
    guest.on_session_end(|e| {
        info!(
            "[guest] round {} over ({}), winner: {}",
            e.round,
            e.reason,
            e.winner_id.as_deref().unwrap_or("none")
        )
    });
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = args
        .config
        .clone()
        .unwrap_or_else(tether_config::default_config_dir);

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("Invalid settings: {e}, using defaults");
        config = Config::default();
    }

    let log_dir = config_dir.join("logs");
    tether_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let demo = &config.demo;
    let tick_rate = demo.tick_rate_hz.max(1);
    let dt = Duration::from_secs_f64(1.0 / f64::from(tick_rate));
    let total_ticks = u64::from(demo.duration_s) * u64::from(tick_rate);
    let outage = (total_ticks * 2 / 5, total_ticks * 11 / 20);

    info!(
        "Running {} ticks at {} Hz, packet loss {:.0}%, seed {}",
        total_ticks,
        tick_rate,
        demo.packet_loss * 100.0,
        demo.seed
    );

    let clock = ManualClock::new();
    let hub = LoopbackHub::new(demo.packet_loss, demo.seed);

    let host_config = SyncConfig::from(&config);
    let guest_config = SyncConfig {
        local_id: GUEST_ID.to_string(),
        ..host_config.clone()
    };
    let host_id = host_config.local_id.clone();

    let mut host: DemoManager =
        SyncManager::with_clock(host_config, hub.transport(), clock.clone());
    let mut guest: DemoManager =
        SyncManager::with_clock(guest_config, hub.transport(), clock.clone());
    watch(&mut guest);

    host.connect();
    guest.connect();
    host.advance(dt);
    guest.advance(dt);

    let start = SessionStart {
        round: 1,
        participants: vec![host_id.clone(), GUEST_ID.to_string(), BOT_ID.to_string()],
        duration_ms: u64::from(demo.duration_s) * 1000,
    };
    if let Err(e) = host.send_session_start(start) {
        warn!("Session start not sent: {}", e);
    }
    host.track_local_entity(BOT_ID, orbit(0.0, 4.0, 3.0));

    let orb = ItemState {
        item_id: "orb-1".to_string(),
        kind: "fuel".to_string(),
        position: Vec3::new(2.0, 0.0, 2.0),
        active: true,
    };

    for tick in 0..total_ticks {
        clock.advance(dt);
        let t = clock.elapsed().as_secs_f32();

        if tick == outage.0 {
            warn!("Simulating hub outage");
            hub.set_online(false);
        } else if tick == outage.1 {
            info!("Hub back online");
            hub.set_online(true);
        }

        host.send_state(orbit(t, 10.0, 8.0));
        guest.send_state(orbit(t + 2.0, 6.0, 5.0));
        host.update_local_entity(BOT_ID, orbit(t, 4.0, 3.0));

        let host_online = host.connection_state() == ConnectionState::Connected;
        if tick % u64::from(tick_rate) == 0 && host_online {
            let elapsed = clock.elapsed().as_millis() as u64;
            let sync = TimerSync {
                round: 1,
                remaining_ms: (u64::from(demo.duration_s) * 1000).saturating_sub(elapsed),
            };
            if let Err(e) = host.send_timer_sync(sync) {
                warn!("Timer sync not sent: {}", e);
            }
        }
        if tick == total_ticks / 4 {
            let change = ItemChange {
                action: ItemAction::Collected,
                item: ItemState {
                    active: false,
                    ..orb.clone()
                },
                actor_id: Some(GUEST_ID.to_string()),
            };
            if let Err(e) = guest.send_item_event(change) {
                warn!("Item event not sent: {}", e);
            }
        }

        host.advance(dt);
        guest.advance(dt);
    }

    // The guest may have missed the last updates; pull the hub's retained state.
    match guest.poll_session_state() {
        Ok(n) => info!("[guest] polled {} retained payloads", n),
        Err(e) => warn!("[guest] poll failed: {}", e),
    }
    if let Err(e) = host.send_items_full_sync(vec![orb]) {
        warn!("Item resync not sent: {}", e);
    }
    let end = SessionEnd {
        round: 1,
        reason: "timer".to_string(),
        winner_id: Some(host_id),
    };
    if let Err(e) = host.send_session_end(end) {
        warn!("Session end not sent: {}", e);
    }
    host.advance(dt);
    guest.advance(dt);

    for (name, manager) in [("host", &host), ("guest", &guest)] {
        let stats = manager.stats();
        info!("[{}] {:?}", name, stats);
        for entity in manager.remote_entities() {
            let p = entity.displayed.position;
            info!(
                "[{}] sees {} at ({:.2}, {:.2}, {:.2}), progress {:.2}",
                name, entity.id, p.x, p.y, p.z, entity.progress
            );
        }
    }
    info!(
        "Hub delivered {} payloads, dropped {}",
        hub.delivered(),
        hub.dropped()
    );

    host.disconnect();
    guest.disconnect();
}
