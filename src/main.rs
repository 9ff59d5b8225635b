//! bd-loopback - drives the BD pipeline against a software loopback
//!
//! Prints the chip layout, pushes spike tags through the full
//! encode → transport → decode chain, turns traffic off and waits for the
//! drain window.
//!
//! Usage: `bd-loopback [config.toml]`

use anyhow::{bail, Context};
use bd_driver::{
    codec::BDWord,
    config::DriverConfig,
    layout::{words::FIFO_TAG, FunnelLeaf, HardwareLayout, HornLeaf},
    pipeline::Pipeline,
    transport::loopback,
    types::EncInput,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const CORE: u32 = 0;
const SPIKES: u64 = 1000;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,bd_driver=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DriverConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => DriverConfig::default(),
    };

    let layout = Arc::new(HardwareLayout::bd_v1().context("building chip layout")?);
    println!("{}", serde_json::to_string_pretty(&layout.report())?);

    let (mut tx, rx) = loopback(layout.clone(), CORE);
    tx.route(HornLeaf::NeuronInject, FunnelLeaf::DumpPreFifo)?;
    let mut pipeline = Pipeline::new(layout, config, tx, rx)?;
    pipeline.start()?;

    let inputs = (0..SPIKES)
        .map(|i| {
            let word = BDWord::create(&FIFO_TAG, &[("COUNT", i % 512), ("TAG", i % 2048)])?;
            Ok(EncInput::new(CORE, HornLeaf::NeuronInject, word))
        })
        .collect::<bd_driver::Result<Vec<_>>>()?;

    let started = Instant::now();
    pipeline.submit(&inputs)?;
    let records = pipeline.recv_exact(FunnelLeaf::DumpPreFifo, inputs.len(), Duration::from_secs(10))?;
    let elapsed = started.elapsed();

    for (input, record) in inputs.iter().zip(&records) {
        if input.payload.raw() != record.payload.raw() {
            bail!(
                "record {} mismatch: sent {:?}, got {:?}",
                record.time_epoch,
                input.payload,
                record.payload
            );
        }
    }
    tracing::info!("Round trip of {} spikes in {:?}", records.len(), elapsed);

    pipeline.disable_traffic(CORE)?;
    let drain_started = Instant::now();
    pipeline.state().wait_for_traffic_off(CORE);
    tracing::info!("Traffic drained after {:?}", drain_started.elapsed());

    pipeline.stop()?;
    println!("{}", serde_json::to_string_pretty(&pipeline.stats())?);
    Ok(())
}
