//! End-to-end failure isolation: three rover endpoints, one of which never
//! answers, polled by one coordinator. The dead rover must go stale without
//! disturbing the healthy ones.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use rovos_coordinator::{RosterEntry, RoverServer, SessionLauncher, SwarmCoordinator};
use rovos_telemetry::TelemetryStore;
use rovos_types::{ConnectionStatus, DeviceSample};
use tokio::net::TcpListener;

struct NoopLauncher;

impl SessionLauncher for NoopLauncher {
    fn start(&self, _device_id: &str) -> bool {
        true
    }
}

async fn healthy_rover(device_id: &str, x_mm: f64) -> RosterEntry {
    let store = Arc::new(TelemetryStore::new());
    store.publish_raw(DeviceSample {
        device_id: device_id.to_string(),
        x_mm,
        y_mm: 250.0,
        z_mm: 0.0,
        timestamp: Utc::now(),
        sequence: 1,
    });
    store.publish_filtered(device_id, (x_mm, 250.0));
    store.set_status(device_id, ConnectionStatus::Connected);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let server = RoverServer::new(device_id, store, Arc::new(NoopLauncher));
    tokio::spawn(server.serve(listener));

    RosterEntry {
        id: device_id.to_string(),
        ip: "127.0.0.1".to_string(),
        port,
    }
}

/// Accepts connections and then sits on them forever.
async fn silent_rover(device_id: &str) -> RosterEntry {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            if let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        }
    });
    RosterEntry {
        id: device_id.to_string(),
        ip: "127.0.0.1".to_string(),
        port,
    }
}

#[tokio::test]
async fn one_dead_rover_does_not_block_the_fleet() {
    let roster = vec![
        healthy_rover("Rov1", 1000.0).await,
        healthy_rover("Rov2", 2000.0).await,
        silent_rover("Rov3").await,
    ];

    let stop = Arc::new(AtomicBool::new(false));
    let coordinator = SwarmCoordinator::new(Arc::clone(&stop))
        .with_poll_interval(Duration::from_millis(25))
        .with_rpc_timeout(Duration::from_millis(50));
    let view = coordinator.view();
    let pollers = coordinator.spawn_pollers(&roster);

    // Let every poller complete several rounds, including the dead rover's
    // timeouts.
    tokio::time::sleep(Duration::from_millis(400)).await;
    stop.store(true, Ordering::SeqCst);
    for poller in pollers {
        poller.await.expect("poller panicked");
    }

    let rov1 = view.get("Rov1").expect("Rov1 polled");
    assert!(rov1.fresh);
    let report = rov1.report.expect("Rov1 report");
    assert_eq!(report.x, 1000.0);
    assert_eq!(report.status, "Connected");

    let rov2 = view.get("Rov2").expect("Rov2 polled");
    assert!(rov2.fresh);
    assert_eq!(rov2.report.expect("Rov2 report").x, 2000.0);

    let rov3 = view.get("Rov3").expect("Rov3 tracked");
    assert!(!rov3.fresh);
    assert!(rov3.report.is_none());
}
