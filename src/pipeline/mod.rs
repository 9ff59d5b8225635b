//! Caller-owned encode/decode pipeline
//!
//! [`Pipeline`] wires every stage together and owns all of it: the channels,
//! the four workers and the chip state mirror. There is no global driver
//! instance; create one pipeline per session and pass it by reference.
//!
//! # Architecture
//!
//! ```text
//!  submit ──► [enc input] ──► Encoder ──► [enc output bytes] ──► DownstreamPump ──► TransportTx
//!
//!  TransportRx ──► UpstreamPump ──► [dec input] ──► Decoder ─┬─► [RoAcc output]  ──► recv
//!                                                           ├─► [DumpAm output] ──► recv
//!                                                           └─► ... one per funnel leaf
//! ```
//!
//! Every channel is bounded. A slow consumer backs the whole chain up to
//! [`Pipeline::submit`] instead of dropping data.
//!
//! # Example
//!
//! ```ignore
//! use bd_driver::pipeline::Pipeline;
//!
//! let mut pipeline = Pipeline::new(layout, DriverConfig::default(), tx, rx)?;
//! pipeline.start()?;
//! pipeline.submit(&[EncInput::new(0, HornLeaf::NeuronInject, word)])?;
//! let records = pipeline.recv(FunnelLeaf::RoAcc, 64, Some(Duration::from_millis(100)))?;
//! pipeline.stop()?;
//! ```

use crate::channel::BoundedChannel;
use crate::codec::BDWord;
use crate::config::DriverConfig;
use crate::decoder::{Decoder, DecoderOutputs};
use crate::encoder::{encode_horn_word, Encoder};
use crate::error::{DriverError, Result, ResultExt};
use crate::layout::{FunnelLeaf, HardwareLayout, RegId};
use crate::state::ChipStateModel;
use crate::transport::{DownstreamPump, TransportRx, TransportTx, UpstreamPump};
use crate::types::{CoreId, DecOutput, EncInput, RawTransfer};
use crate::worker::{Worker, WorkerEvent, WorkerStatsSnapshot};
use crossbeam_channel::{bounded, Receiver};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle events kept before the owner drains them
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Worker counters of every stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub encoder: WorkerStatsSnapshot,
    pub downstream: WorkerStatsSnapshot,
    pub upstream: WorkerStatsSnapshot,
    pub decoder: WorkerStatsSnapshot,
}

/// Owner of the channels, workers and state of one driver session
pub struct Pipeline {
    layout: Arc<HardwareLayout>,
    enc_input: Arc<BoundedChannel<EncInput>>,
    dec_outputs: DecoderOutputs,
    encoder: Worker<Encoder>,
    downstream: Worker<DownstreamPump>,
    upstream: Worker<UpstreamPump>,
    decoder: Worker<Decoder>,
    state: ChipStateModel,
    events: Receiver<WorkerEvent>,
    poll_timeout: Duration,
}

impl Pipeline {
    /// Build a stopped pipeline over a transport
    pub fn new(
        layout: Arc<HardwareLayout>,
        config: DriverConfig,
        tx: impl TransportTx,
        rx: impl TransportRx,
    ) -> Result<Self> {
        config.validate()?;
        let channels = &config.channels;
        let chunk_size = config.workers.chunk_size;
        let poll_timeout = config.workers.poll_timeout();

        let enc_input = Arc::new(BoundedChannel::new(channels.encoder_input_capacity));
        let enc_output: Arc<BoundedChannel<u8>> =
            Arc::new(BoundedChannel::new(channels.encoder_output_capacity));
        let dec_input: Arc<BoundedChannel<RawTransfer>> =
            Arc::new(BoundedChannel::new(channels.decoder_input_capacity));
        let dec_outputs: DecoderOutputs = layout
            .funnel_leaves()
            .into_iter()
            .map(|leaf| {
                let channel = BoundedChannel::new(channels.decoder_output_capacity);
                (leaf, Arc::new(channel))
            })
            .collect();

        let (event_tx, events) = bounded(EVENT_CHANNEL_CAPACITY);
        let encoder = Worker::new(
            Encoder::new(layout.clone(), enc_input.clone(), enc_output.clone(), chunk_size),
            poll_timeout,
        )
        .with_events(event_tx.clone());
        let downstream = Worker::new(
            DownstreamPump::new(enc_output, Box::new(tx), chunk_size),
            poll_timeout,
        )
        .with_events(event_tx.clone());
        let upstream = Worker::new(
            UpstreamPump::new(layout.clone(), Box::new(rx), dec_input.clone()),
            poll_timeout,
        )
        .with_events(event_tx.clone());
        let decoder = Worker::new(
            Decoder::new(layout.clone(), dec_input, dec_outputs.clone(), chunk_size),
            poll_timeout,
        )
        .with_events(event_tx);

        let state = ChipStateModel::new(
            layout.clone(),
            config.traffic.drain(),
            config.traffic.poll_interval(),
        );

        Ok(Self {
            layout,
            enc_input,
            dec_outputs,
            encoder,
            downstream,
            upstream,
            decoder,
            state,
            events,
            poll_timeout,
        })
    }

    pub fn layout(&self) -> &Arc<HardwareLayout> {
        &self.layout
    }

    // ==================== Lifecycle ====================

    /// Start every worker, consumers first
    pub fn start(&mut self) -> Result<()> {
        self.decoder.start().context("starting decoder")?;
        self.upstream.start().context("starting upstream pump")?;
        self.downstream.start().context("starting downstream pump")?;
        self.encoder.start().context("starting encoder")?;
        tracing::info!("Pipeline started ({})", self.layout.version());
        Ok(())
    }

    /// Stop every worker, producers first
    ///
    /// All workers are stopped even if one reports a fault; the first fault
    /// is returned. Stopping a stopped pipeline is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let results = [
            self.encoder.stop(),
            self.downstream.stop(),
            self.upstream.stop(),
            self.decoder.stop(),
        ];
        tracing::info!("Pipeline stopped");
        results.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }

    /// Whether every worker is running
    pub fn is_running(&self) -> bool {
        self.encoder.is_running()
            && self.downstream.is_running()
            && self.upstream.is_running()
            && self.decoder.is_running()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            encoder: self.encoder.stats(),
            downstream: self.downstream.stats(),
            upstream: self.upstream.stats(),
            decoder: self.decoder.stats(),
        }
    }

    /// Drain pending worker lifecycle events
    pub fn events(&self) -> Vec<WorkerEvent> {
        self.events.try_iter().collect()
    }

    // ==================== Submission ====================

    /// Queue requests for the encoder, blocking while the input is full
    ///
    /// Every request is checked against the layout first; a bad request
    /// rejects the whole call before anything is queued. While blocked, a
    /// dead or stopped worker ends the wait with [`DriverError::WorkerFault`];
    /// requests queued before that point stay queued.
    pub fn submit(&self, inputs: &[EncInput]) -> Result<()> {
        self.check_inputs(inputs)?;
        for chunk in inputs.chunks(self.enc_input.capacity()) {
            while !self.enc_input.push(chunk, Some(self.poll_timeout)) {
                self.check_workers()?;
            }
        }
        Ok(())
    }

    /// Fail if nothing will ever drain the encoder input
    fn check_workers(&self) -> Result<()> {
        let faults = [
            (self.encoder.name(), self.encoder.fault()),
            (self.downstream.name(), self.downstream.fault()),
            (self.upstream.name(), self.upstream.fault()),
            (self.decoder.name(), self.decoder.fault()),
        ];
        for (worker, fault) in faults {
            if let Some(message) = fault {
                return Err(DriverError::WorkerFault {
                    worker: worker.to_string(),
                    message,
                });
            }
        }
        if !self.is_running() {
            return Err(DriverError::WorkerFault {
                worker: "pipeline".to_string(),
                message: "not running, encoder input is full".to_string(),
            });
        }
        Ok(())
    }

    /// Queue requests atomically, giving up after `timeout`
    ///
    /// Returns `false` if the input channel had no room in time.
    pub fn try_submit(&self, inputs: &[EncInput], timeout: Duration) -> Result<bool> {
        if inputs.len() > self.enc_input.capacity() {
            return Err(DriverError::Config(format!(
                "batch of {} exceeds encoder input capacity {}",
                inputs.len(),
                self.enc_input.capacity()
            )));
        }
        self.check_inputs(inputs)?;
        Ok(self.enc_input.push(inputs, Some(timeout)))
    }

    fn check_inputs(&self, inputs: &[EncInput]) -> Result<()> {
        for input in inputs {
            encode_horn_word(&self.layout, input.leaf, input.payload.raw())
                .with_context(|| format!("rejecting request for core {}", input.core_id))?;
        }
        Ok(())
    }

    // ==================== Output ====================

    /// Decoder output channel of a funnel leaf
    pub fn output(&self, leaf: FunnelLeaf) -> Result<&Arc<BoundedChannel<DecOutput>>> {
        self.dec_outputs
            .get(&leaf)
            .ok_or(DriverError::UnknownFunnelLeaf(leaf))
    }

    /// Pop up to `max` records of a leaf; empty on timeout
    pub fn recv(&self, leaf: FunnelLeaf, max: usize, timeout: Option<Duration>) -> Result<Vec<DecOutput>> {
        let channel = self.output(leaf)?;
        if max == 0 {
            return Ok(Vec::new());
        }
        Ok(channel.pop(max.min(channel.capacity()), timeout, 1))
    }

    /// Collect exactly `count` records of a leaf within `timeout`
    pub fn recv_exact(&self, leaf: FunnelLeaf, count: usize, timeout: Duration) -> Result<Vec<DecOutput>> {
        let channel = self.output(leaf)?;
        let deadline = Instant::now() + timeout;
        let mut records = Vec::with_capacity(count);
        while records.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return Err(DriverError::Timeout(format!(
                    "{} of {} {:?} records after {:?}",
                    records.len(),
                    count,
                    leaf,
                    timeout
                )));
            }
            let wanted = (count - records.len()).min(channel.capacity());
            channel.pop_into(&mut records, wanted, Some(deadline - now), 1);
        }
        Ok(records)
    }

    // ==================== State ====================

    pub fn state(&self) -> &ChipStateModel {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ChipStateModel {
        &mut self.state
    }

    /// Write a register: record it and send it to the chip
    pub fn program_reg(&mut self, core: CoreId, reg: RegId, word: BDWord) -> Result<()> {
        let leaf = self.layout.leaf_for_reg(reg)?;
        self.state.set_reg(core, reg, word)?;
        self.submit(&[EncInput::new(core, leaf, word)])
    }

    /// Write a traffic toggle: record it and send it to the chip
    pub fn program_toggle(
        &mut self,
        core: CoreId,
        reg: RegId,
        traffic_enabled: bool,
        dump_enabled: bool,
    ) -> Result<()> {
        let leaf = self.layout.leaf_for_reg(reg)?;
        let word = self.state.set_toggle(core, reg, traffic_enabled, dump_enabled)?;
        self.submit(&[EncInput::new(core, leaf, word)])
    }

    /// Turn every traffic toggle of a core off
    ///
    /// Traffic is only quiescent after the drain window; see
    /// [`ChipStateModel::wait_for_traffic_off`].
    pub fn disable_traffic(&mut self, core: CoreId) -> Result<()> {
        for reg in self.layout.traffic_registers() {
            self.program_toggle(core, reg, false, false)?;
        }
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Pipeline stopped with fault: {}", e);
        }
    }
}
