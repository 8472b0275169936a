//! `rovos` – rover node and fleet coordinator in one binary.
//!
//! `rovos rover` runs the full on-rover stack: a ranging session feeding the
//! filter pump, the RPC endpoint, the motion-control loop and the SQLite
//! mission log. `rovos coordinator` polls every rover on the roster and
//! prints the fleet view.
//!
//! Configuration comes from `rovos.toml` (see [`config`]); `ROVOS_*`
//! environment variables override individual fields.

mod config;
mod pump;
mod telemetry;
mod tty;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use colored::Colorize;
use rovos_control::{ControlLoop, MotionController};
use rovos_coordinator::{RoverServer, SessionLauncher, SwarmCoordinator, SwarmView};
use rovos_log::{MissionLog, TickRecord};
use rovos_radio::sim::{SimScanner, SimTransport};
use rovos_radio::transport::SerialUwbTransport;
use rovos_radio::{DeviceHandle, RangingSession, RangingTransport, SessionConfig};
use rovos_telemetry::TelemetryStore;
use rovos_types::{ControlError, Rgb, VelocityCommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{Config, Transport};
use crate::tty::TtyLineIo;

fn main() {
    banner();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(mode) = args.first().map(String::as_str) else {
        usage();
        return;
    };

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!("{} {}", "config:".bold(), config::config_path().display());
            cfg
        }
        Ok(None) => {
            println!("{}", "no rovos.toml found, using defaults".yellow());
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(err) => {
            eprintln!("{} {}", "config error:".red().bold(), err);
            std::process::exit(2);
        }
    };

    // Tracing comes up once the `[log]` section is known, and before the
    // runtime: the simple OTLP exporter needs no runtime at init time, and
    // must not capture one.
    let _guard = telemetry::init_tracing(&cfg.log);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("{} {}", "runtime error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let drive = ConsoleDrive::default();
    {
        let stop = Arc::clone(&stop);
        let drive = drive.clone();
        let handler = move || {
            // Zero the chassis before anything reacts to the flag.
            drive.emergency_stop();
            stop.store(true, Ordering::SeqCst);
        };
        if let Err(err) = ctrlc::set_handler(handler) {
            eprintln!("{} {}", "signal handler error:".red().bold(), err);
            std::process::exit(1);
        }
    }

    let result = match mode {
        "rover" => runtime.block_on(run_rover(cfg, stop, drive)),
        "coordinator" => runtime.block_on(run_coordinator(cfg, stop)),
        other => {
            eprintln!("{} unknown mode `{other}`", "error:".red().bold());
            usage();
            std::process::exit(2);
        }
    };

    if let Err(err) = result {
        eprintln!("{} {}", "fatal:".red().bold(), err);
        std::process::exit(1);
    }
}

fn banner() {
    println!("{}", "rovos - UWB rover swarm runtime".bold().cyan());
}

fn usage() {
    println!("usage: rovos <rover|coordinator>");
    println!();
    println!("  rover        run the ranging, control and RPC stack on a rover");
    println!("  coordinator  poll the fleet roster and print the swarm view");
}

// ---------------------------------------------------------------------------
// Rover mode
// ---------------------------------------------------------------------------

async fn run_rover(
    cfg: Config,
    stop: Arc<AtomicBool>,
    mut drive: ConsoleDrive,
) -> Result<(), String> {
    println!(
        "{} {} ({} transport)",
        "rover".green().bold(),
        cfg.device_id,
        cfg.transport
    );

    let store = Arc::new(TelemetryStore::new());
    let (samples_tx, samples_rx) = mpsc::channel(256);
    tokio::spawn(pump::run(samples_rx, cfg.filter_chain(), Arc::clone(&store)));

    let transport: Box<dyn RangingTransport> = match cfg.transport {
        Transport::Sim => Box::new(sim_transport(&cfg)),
        Transport::Serial => {
            let io = TtyLineIo::open(&cfg.serial_port)
                .await
                .map_err(|e| e.to_string())?;
            Box::new(SerialUwbTransport::new(Box::new(io)))
        }
    };
    let mut session_config = SessionConfig::new(&cfg.device_id);
    if let Some(identity) = &cfg.expected_identity {
        session_config = session_config.with_expected_identity(identity);
    }
    let session = RangingSession::new(
        session_config,
        transport,
        Arc::clone(&store),
        samples_tx,
        Arc::clone(&stop),
    );
    // The sim advertises itself so the scan gate is exercised end to end;
    // the serial path connects directly.
    let session = match cfg.transport {
        Transport::Sim => session.with_scanner(Box::new(SimScanner::new(vec![DeviceHandle {
            name: format!("{}-dwm", cfg.device_id),
            address: "SIM:00".to_string(),
        }]))),
        Transport::Serial => session,
    };

    let starter = Arc::new(SessionStarter::new(session));
    if cfg.autostart_ranging {
        starter.start(&cfg.device_id);
    } else {
        println!(
            "{}",
            "waiting for start_connection before ranging".yellow()
        );
    }

    let listener = TcpListener::bind(("0.0.0.0", cfg.rpc_port))
        .await
        .map_err(|e| format!("bind 0.0.0.0:{}: {e}", cfg.rpc_port))?;
    let launcher: Arc<dyn SessionLauncher> = starter;
    let server = RoverServer::new(&cfg.device_id, Arc::clone(&store), launcher);
    tokio::spawn(async move {
        if let Err(err) = server.serve(listener).await {
            warn!(%err, "rpc server stopped");
        }
    });

    let log = MissionLog::open(&cfg.log_db).map_err(|e| e.to_string())?;
    let mission_id = Uuid::new_v4();
    println!("{} {}", "mission".bold(), mission_id);

    let controller = MotionController::new(cfg.controller_config(), cfg.plan());
    let control = ControlLoop::new(
        controller,
        Arc::clone(&store),
        &cfg.device_id,
        Arc::clone(&stop),
    );

    let device_id = cfg.device_id.clone();
    let result = control
        .run(&mut drive, |report| {
            let record = TickRecord {
                mission_id,
                tick: report.tick,
                timestamp: Utc::now(),
                device_id: device_id.clone(),
                state: format!("{:?}", report.state),
                position: report.position,
                target: report.target.as_ref().map(|t| (t.x_mm, t.y_mm)),
                speed: report.command.map(|c| c.speed),
                heading_deg: report.command.map(|c| c.heading_deg),
                waypoint_index: report.waypoint_index as u64,
            };
            if let Err(err) = log.record_tick(&record) {
                warn!(%err, "mission log write failed");
            }
        })
        .await;

    match result {
        Ok(state) => {
            println!("{} {state:?}", "mission ended:".green().bold());
            Ok(())
        }
        Err(err) => Err(format!("mission aborted: {err}")),
    }
}

/// A scripted flight for hardware-free runs: hold the arena centre until the
/// filters warm up, then walk the choreography waypoint by waypoint.
fn sim_transport(cfg: &Config) -> SimTransport {
    let origin = (
        cfg.control.arena_width_mm / 2.0,
        cfg.control.arena_height_mm / 2.0,
    );
    let mut sim = SimTransport::new()
        .with_description(format!("sim:{}", cfg.device_id))
        .with_sample_interval(Duration::from_millis(50));

    for _ in 0..15 {
        sim = sim.with_sample(origin.0, origin.1, 0.0);
    }

    let mut rows = cfg.waypoints.clone();
    rows.sort_by_key(|w| w.time_ms);
    // The controller anchors the plan's first waypoint at the first fix, so
    // the scripted track replays displacements from that waypoint.
    let anchor = rows
        .first()
        .map(|r| (r.x_m * 1000.0, r.y_m * 1000.0))
        .unwrap_or((0.0, 0.0));
    let mut from = anchor;
    for row in &rows {
        // Choreography rows are metres.
        let to = (row.x_m * 1000.0, row.y_m * 1000.0);
        for step in 1..=20 {
            let t = f64::from(step) / 20.0;
            sim = sim.with_sample(
                origin.0 + from.0 + (to.0 - from.0) * t - anchor.0,
                origin.1 + from.1 + (to.1 - from.1) * t - anchor.1,
                0.0,
            );
        }
        from = to;
    }
    // Hold the final pose long enough for the smoothed estimate to settle
    // inside the arrival tolerance.
    for _ in 0..40 {
        sim = sim.with_sample(origin.0 + from.0 - anchor.0, origin.1 + from.1 - anchor.1, 0.0);
    }
    sim
}

/// One-shot launcher handed to the RPC server: the first `start_connection`
/// takes the session out of the slot and spawns it.
struct SessionStarter {
    session: Mutex<Option<RangingSession>>,
}

impl SessionStarter {
    fn new(session: RangingSession) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

impl SessionLauncher for SessionStarter {
    fn start(&self, device_id: &str) -> bool {
        match self.session.lock().expect("session slot poisoned").take() {
            Some(session) => {
                info!(%device_id, "ranging session started");
                tokio::spawn(session.run());
                true
            }
            None => false,
        }
    }
}

/// Drive backend that narrates commands instead of moving motors.
///
/// Cloneable so the Ctrl-C handler can issue a zero-speed command through
/// the same backend the control loop drives.
#[derive(Clone, Default)]
struct ConsoleDrive {
    last: Arc<Mutex<Option<VelocityCommand>>>,
}

impl ConsoleDrive {
    fn apply(&self, command: &VelocityCommand) {
        debug!(
            speed = command.speed,
            heading_deg = command.heading_deg,
            "drive"
        );
        *self.last.lock().expect("drive state poisoned") = Some(*command);
    }

    fn emergency_stop(&self) {
        self.apply(&VelocityCommand::stop());
        println!("{}", "emergency stop: zero-speed commanded".red().bold());
    }
}

impl rovos_control::DriveActuator for ConsoleDrive {
    fn drive(&mut self, command: &VelocityCommand) -> Result<(), ControlError> {
        self.apply(command);
        Ok(())
    }

    fn set_indicator(&mut self, color: Rgb) -> Result<(), ControlError> {
        debug!(r = color.0, g = color.1, b = color.2, "indicator");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Coordinator mode
// ---------------------------------------------------------------------------

async fn run_coordinator(cfg: Config, stop: Arc<AtomicBool>) -> Result<(), String> {
    let roster = cfg.roster();
    if roster.is_empty() {
        return Err("coordinator mode needs [[roster]] entries in rovos.toml".to_string());
    }
    println!(
        "{} polling {} rover(s)",
        "coordinator".green().bold(),
        roster.len()
    );

    let coordinator = SwarmCoordinator::new(Arc::clone(&stop));
    let view = coordinator.view();
    let pollers = coordinator.spawn_pollers(&roster);

    while !stop.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_secs(1)).await;
        print_fleet(&view);
    }
    for poller in pollers {
        let _ = poller.await;
    }
    println!("{}", "coordinator stopped".yellow());
    Ok(())
}

fn print_fleet(view: &SwarmView) {
    let mut entries = view.snapshot();
    entries.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    println!("{}", "fleet".bold());
    for entry in entries {
        let freshness = if entry.fresh {
            "fresh".green()
        } else {
            "stale".yellow()
        };
        match &entry.report {
            Some(report) => println!(
                "  {:<8} {freshness} x={:>9.1} y={:>9.1} z={:>9.1} [{}] {}",
                entry.device_id, report.x, report.y, report.z, report.status, report.timestamp
            ),
            None => println!("  {:<8} {freshness} (no report yet)", entry.device_id),
        }
    }
}
