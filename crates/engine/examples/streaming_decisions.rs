//! Feeds a synthetic telemetry stream through the engine and logs every
//! decision it makes: a throughput spike raises an anomaly, a starved
//! gaming flow accumulates QoS violations into a steering recommendation,
//! and the predictor starts emitting trained parameter updates.
//!
//! Run with: `cargo run --example streaming_decisions`

use std::sync::Arc;

use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use decision_engine::{
    Decision, DecisionEngine, Dispatcher, EngineConfig, EntityId, MeasurementReport,
    METRIC_CONN_ESTAB, METRIC_THP_DL, METRIC_THP_UL,
};

struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    async fn dispatch(&self, decision: Decision) {
        info!(
            kind = decision.kind(),
            payload = %serde_json::to_string(&decision).unwrap_or_default(),
            "dispatching control action"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let mut config = EngineConfig::default();
    // Scale the load indicators to the demo's throughput range so steering
    // becomes reachable.
    config.steering.load_normalization_mbps = 10.0;
    config.steering.load_threshold = 0.5;

    let engine = Arc::new(DecisionEngine::new(config)?);
    let (tx, rx) = mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let pump = tokio::spawn(
        engine
            .clone()
            .run(rx, Arc::new(LogDispatcher) as Arc<dyn Dispatcher>, shutdown_rx),
    );

    let mut rng = StdRng::seed_from_u64(7);
    let web_ue = EntityId::ue("ue-web");
    let gaming_ue = EntityId::ue("ue-gaming");

    for tick in 0..200 {
        let ts = tick as f64;

        // Steady web browsing with one injected downlink spike.
        let dl = if tick == 120 {
            400.0
        } else {
            8.0 + rng.gen_range(-2.0..2.0)
        };
        let report = MeasurementReport::new(web_ue.clone(), ts)
            .with_metric(METRIC_THP_DL, dl)
            .with_metric(METRIC_THP_UL, 4.0 + rng.gen_range(-0.5..0.5))
            .with_metric(METRIC_CONN_ESTAB, 95.0);
        tx.send(report).await?;

        // Bursty uplink gamer whose downlink is starved below the QoS floor.
        let ul = if tick % 2 == 0 {
            2.5 + rng.gen_range(0.0..1.0)
        } else {
            9.0 + rng.gen_range(0.0..6.0)
        };
        let report = MeasurementReport::new(gaming_ue.clone(), ts)
            .with_metric(METRIC_THP_DL, 0.3)
            .with_metric(METRIC_THP_UL, ul)
            .with_metric(METRIC_CONN_ESTAB, 20.0);
        tx.send(report).await?;
    }

    drop(tx);
    pump.await?;

    let stats = engine.stats();
    info!(
        samples = stats.samples_seen,
        decisions = stats.decisions_emitted,
        anomalies = stats.anomalies_detected,
        series = stats.tracked_series,
        trained = stats.model_trained,
        "stream drained"
    );
    Ok(())
}
