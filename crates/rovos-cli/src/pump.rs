//! The filter pump: raw samples in, smoothed estimates out.
//!
//! Sits between the ranging session's sample channel and the telemetry
//! store. One pump per device; the chain's warm-up means the first estimates
//! are withheld rather than published half-baked.

use std::sync::Arc;

use rovos_filter::FilterChain;
use rovos_telemetry::TelemetryStore;
use rovos_types::DeviceSample;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Consume samples until the channel closes.
pub async fn run(
    mut samples: mpsc::Receiver<DeviceSample>,
    mut chain: FilterChain,
    store: Arc<TelemetryStore>,
) {
    while let Some(sample) = samples.recv().await {
        match chain.update(&sample) {
            Some(estimate) => {
                debug!(
                    device = %sample.device_id,
                    x = estimate.0,
                    y = estimate.1,
                    "filtered estimate"
                );
                store.publish_filtered(&sample.device_id, estimate);
            }
            None => {
                debug!(device = %sample.device_id, seq = sample.sequence, "warming up");
            }
        }
    }
    info!("sample channel closed, filter pump done");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(x: f64, seq: u64) -> DeviceSample {
        DeviceSample {
            device_id: "Rov1".to_string(),
            x_mm: x,
            y_mm: 0.0,
            z_mm: 0.0,
            timestamp: Utc::now(),
            sequence: seq,
        }
    }

    #[tokio::test]
    async fn warmed_chain_publishes_estimates() {
        let store = Arc::new(TelemetryStore::new());
        let (tx, rx) = mpsc::channel(64);
        let pump = tokio::spawn(run(rx, FilterChain::averaged(), Arc::clone(&store)));

        store.publish_raw(sample(100.0, 0));
        for seq in 0..30 {
            tx.send(sample(100.0, seq)).await.unwrap();
        }
        drop(tx);
        pump.await.unwrap();

        let rec = store.get("Rov1").expect("record");
        let (x, _) = rec.last_filtered.expect("filtered");
        assert!((x - 100.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn nothing_is_published_during_warmup() {
        let store = Arc::new(TelemetryStore::new());
        let (tx, rx) = mpsc::channel(64);
        let pump = tokio::spawn(run(rx, FilterChain::full(), Arc::clone(&store)));

        store.publish_raw(sample(100.0, 0));
        // The full chain warms up over the moving-average window (10).
        for seq in 0..5 {
            tx.send(sample(100.0, seq)).await.unwrap();
        }
        drop(tx);
        pump.await.unwrap();

        assert!(store.get("Rov1").unwrap().last_filtered.is_none());
    }
}
