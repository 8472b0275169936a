//! [`RoverServer`] – the per-rover RPC endpoint.
//!
//! Accepts TCP connections and speaks the JSON-lines protocol from [`wire`].
//! Each accepted connection gets its own task; a misbehaving client is
//! answered with an error frame and never takes the server down.
//!
//! [`wire`]: crate::wire

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rovos_telemetry::TelemetryStore;
use rovos_types::RpcError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::wire::{CoordinateReport, Request, Response, format_timestamp};

/// Hook through which `start_connection` begins ranging.
///
/// Returns `false` when a session for the device is already running. The
/// server additionally tracks started devices itself, so a launcher is never
/// invoked twice for the same id.
pub trait SessionLauncher: Send + Sync {
    fn start(&self, device_id: &str) -> bool;
}

impl<F> SessionLauncher for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn start(&self, device_id: &str) -> bool {
        self(device_id)
    }
}

/// RPC endpoint serving one rover's telemetry.
pub struct RoverServer {
    device_id: String,
    store: Arc<TelemetryStore>,
    launcher: Arc<dyn SessionLauncher>,
    started: Arc<Mutex<HashSet<String>>>,
}

impl RoverServer {
    pub fn new(
        device_id: impl Into<String>,
        store: Arc<TelemetryStore>,
        launcher: Arc<dyn SessionLauncher>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            store,
            launcher,
            started: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Accept connections forever. The caller binds the listener so tests
    /// can use an ephemeral port.
    pub async fn serve(self, listener: TcpListener) -> Result<(), RpcError> {
        let local = listener
            .local_addr()
            .map_err(|e| RpcError::Protocol(e.to_string()))?;
        info!(device = %self.device_id, %local, "rpc server listening");
        let shared = Arc::new(self);
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = Arc::clone(&shared);
                    tokio::spawn(async move {
                        if let Err(err) = server.handle_connection(stream).await {
                            debug!(%peer, %err, "client connection ended");
                        }
                    });
                }
                Err(err) => {
                    warn!(%err, "accept failed");
                }
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<(), RpcError> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| RpcError::Protocol(e.to_string()))?
        {
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<Request>(&line) {
                Ok(request) => self.handle(request),
                Err(err) => Response::Error {
                    message: format!("unrecognized request: {err}"),
                },
            };
            let mut frame = serde_json::to_string(&response)
                .map_err(|e| RpcError::Protocol(e.to_string()))?;
            frame.push('\n');
            writer
                .write_all(frame.as_bytes())
                .await
                .map_err(|e| RpcError::Protocol(e.to_string()))?;
        }
        Ok(())
    }

    fn handle(&self, request: Request) -> Response {
        match request {
            Request::StartConnection { device_id } => {
                let newly = self
                    .started
                    .lock()
                    .expect("started set poisoned")
                    .insert(device_id.clone());
                if newly {
                    info!(device = %device_id, "starting ranging session");
                    self.launcher.start(&device_id);
                }
                Response::Ack {
                    device_id,
                    already_running: !newly,
                }
            }
            Request::GetCoordinates => match self.store.get(&self.device_id) {
                Some(rec) => {
                    let (x, y) = rec
                        .last_filtered
                        .unwrap_or((rec.last_raw.x_mm, rec.last_raw.y_mm));
                    Response::Coordinates(CoordinateReport {
                        name: rec.device_id,
                        x,
                        y,
                        z: rec.last_raw.z_mm,
                        timestamp: format_timestamp(rec.updated_at),
                        status: rec.status.to_string(),
                    })
                }
                None => Response::Error {
                    message: format!("no telemetry for {}", self.device_id),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use rovos_types::{ConnectionStatus, DeviceSample};

    struct CountingLauncher(AtomicUsize);

    impl SessionLauncher for CountingLauncher {
        fn start(&self, _device_id: &str) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    fn server_with(store: Arc<TelemetryStore>) -> (RoverServer, Arc<CountingLauncher>) {
        let launcher = Arc::new(CountingLauncher(AtomicUsize::new(0)));
        let server = RoverServer::new("Rov1", store, launcher.clone() as Arc<dyn SessionLauncher>);
        (server, launcher)
    }

    #[test]
    fn start_connection_is_idempotent() {
        let (server, launcher) = server_with(Arc::new(TelemetryStore::new()));
        let first = server.handle(Request::StartConnection {
            device_id: "Rov1".to_string(),
        });
        let second = server.handle(Request::StartConnection {
            device_id: "Rov1".to_string(),
        });
        assert_eq!(
            first,
            Response::Ack {
                device_id: "Rov1".to_string(),
                already_running: false
            }
        );
        assert_eq!(
            second,
            Response::Ack {
                device_id: "Rov1".to_string(),
                already_running: true
            }
        );
        assert_eq!(launcher.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn get_coordinates_prefers_the_filtered_estimate() {
        let store = Arc::new(TelemetryStore::new());
        store.publish_raw(DeviceSample {
            device_id: "Rov1".to_string(),
            x_mm: 500.0,
            y_mm: 600.0,
            z_mm: 70.0,
            timestamp: Utc::now(),
            sequence: 1,
        });
        store.publish_filtered("Rov1", (498.5, 601.25));
        store.set_status("Rov1", ConnectionStatus::Connected);

        let (server, _) = server_with(store);
        let Response::Coordinates(report) = server.handle(Request::GetCoordinates) else {
            panic!("expected coordinates");
        };
        assert_eq!(report.name, "Rov1");
        assert_eq!((report.x, report.y), (498.5, 601.25));
        assert_eq!(report.z, 70.0);
        assert_eq!(report.status, "Connected");
        // "%Y-%m-%d %H:%M:%S%.6f" is 26 characters.
        assert_eq!(report.timestamp.len(), 26);
    }

    #[test]
    fn get_coordinates_falls_back_to_raw() {
        let store = Arc::new(TelemetryStore::new());
        store.publish_raw(DeviceSample {
            device_id: "Rov1".to_string(),
            x_mm: 500.0,
            y_mm: 600.0,
            z_mm: 0.0,
            timestamp: Utc::now(),
            sequence: 1,
        });
        let (server, _) = server_with(store);
        let Response::Coordinates(report) = server.handle(Request::GetCoordinates) else {
            panic!("expected coordinates");
        };
        assert_eq!((report.x, report.y), (500.0, 600.0));
    }

    #[test]
    fn get_coordinates_without_telemetry_is_an_error_frame() {
        let (server, _) = server_with(Arc::new(TelemetryStore::new()));
        assert!(matches!(
            server.handle(Request::GetCoordinates),
            Response::Error { .. }
        ));
    }

    #[tokio::test]
    async fn malformed_line_gets_an_error_frame_and_keeps_the_connection() {
        let store = Arc::new(TelemetryStore::new());
        store.publish_raw(DeviceSample {
            device_id: "Rov1".to_string(),
            x_mm: 1.0,
            y_mm: 2.0,
            z_mm: 0.0,
            timestamp: Utc::now(),
            sequence: 1,
        });
        let (server, _) = server_with(store);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(server.serve(listener));

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        writer.write_all(b"garbage\n").await.unwrap();
        let reply = lines.next_line().await.unwrap().unwrap();
        assert!(matches!(
            serde_json::from_str::<Response>(&reply).unwrap(),
            Response::Error { .. }
        ));

        // The same connection still answers real requests.
        writer
            .write_all(b"{\"op\":\"get_coordinates\"}\n")
            .await
            .unwrap();
        let reply = lines.next_line().await.unwrap().unwrap();
        assert!(matches!(
            serde_json::from_str::<Response>(&reply).unwrap(),
            Response::Coordinates(_)
        ));
    }
}
