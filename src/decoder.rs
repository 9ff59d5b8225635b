//! Funnel decoder stage
//!
//! Consumes [`RawTransfer`]s that the transport has already demultiplexed to
//! their funnel leaf, reassembles each leaf's `serialization_factor`
//! consecutive transfers into one `chunk_width` record and fans the records
//! out to one output channel per leaf.
//!
//! The first transfer received for a record is its most significant slice.
//! Partial records are kept per `(core, leaf)`, so transfers of different
//! leaves may interleave freely.
//!
//! Each leaf channel stamps its records with a `time_epoch` that starts at 0
//! and increases by one per record. Order within a leaf follows receive
//! order; there is no ordering across leaves.

use crate::channel::BoundedChannel;
use crate::codec::{fits, pack, BDWord};
use crate::error::{DriverError, Result};
use crate::layout::{FunnelLeaf, HardwareLayout};
use crate::types::{CoreId, DecOutput, RawTransfer};
use crate::worker::{ChunkProcessor, WorkerContext};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Output channels of the decoder, one per funnel leaf
pub type DecoderOutputs = HashMap<FunnelLeaf, Arc<BoundedChannel<DecOutput>>>;

/// Decoder stage processor
pub struct Decoder {
    layout: Arc<HardwareLayout>,
    input: Arc<BoundedChannel<RawTransfer>>,
    outputs: DecoderOutputs,
    chunk_size: usize,
    partial: HashMap<(CoreId, FunnelLeaf), Vec<u64>>,
    epochs: HashMap<FunnelLeaf, u64>,
    batch: Vec<RawTransfer>,
    undelivered: VecDeque<(FunnelLeaf, DecOutput)>,
}

impl Decoder {
    pub fn new(
        layout: Arc<HardwareLayout>,
        input: Arc<BoundedChannel<RawTransfer>>,
        outputs: DecoderOutputs,
        chunk_size: usize,
    ) -> Self {
        let chunk_size = chunk_size.clamp(1, input.capacity());
        Self {
            layout,
            input,
            outputs,
            chunk_size,
            partial: HashMap::new(),
            epochs: HashMap::new(),
            batch: Vec::with_capacity(chunk_size),
            undelivered: VecDeque::new(),
        }
    }

    /// Transfers buffered towards the next record of a leaf
    pub fn pending_transfers(&self, core_id: CoreId, leaf: FunnelLeaf) -> usize {
        self.partial.get(&(core_id, leaf)).map_or(0, Vec::len)
    }

    /// Finished records still waiting for room on their output channel
    pub fn undelivered_records(&self) -> usize {
        self.undelivered.len()
    }

    /// Number of records emitted so far on a leaf channel
    pub fn records_emitted(&self, leaf: FunnelLeaf) -> u64 {
        self.epochs.get(&leaf).copied().unwrap_or(0)
    }

    /// Fold one transfer in; returns a finished record if this completed one
    fn absorb(&mut self, transfer: RawTransfer) -> Result<Option<(FunnelLeaf, DecOutput)>> {
        let info = self.layout.leaf(transfer.leaf)?;
        if !fits(transfer.data, info.data_width) {
            return Err(DriverError::FieldOverflow {
                field: format!("{:?} transfer", transfer.leaf),
                value: transfer.data,
                width: info.data_width,
            });
        }
        if !self.outputs.contains_key(&transfer.leaf) {
            return Err(DriverError::Config(format!(
                "no decoder output channel for {:?}",
                transfer.leaf
            )));
        }

        let factor = info.serialization_factor as usize;
        let parts = self
            .partial
            .entry((transfer.core_id, transfer.leaf))
            .or_insert_with(|| Vec::with_capacity(factor));
        parts.push(transfer.data);
        if parts.len() < factor {
            return Ok(None);
        }

        let widths = vec![info.data_width; factor];
        let raw = pack(parts, &widths)?;
        parts.clear();
        let payload = BDWord::from_raw(info.layout, raw)
            .map_err(|e| e.with_context(format!("decoding {:?}", transfer.leaf)))?;

        let epoch = self.epochs.entry(transfer.leaf).or_insert(0);
        let record = DecOutput {
            payload,
            core_id: transfer.core_id,
            time_epoch: *epoch,
        };
        *epoch += 1;
        tracing::trace!("{:?}#{} <- {:?}", transfer.leaf, record.time_epoch, payload);
        Ok(Some((transfer.leaf, record)))
    }

    /// Push one record, retrying until it fits or the worker stops
    fn deliver(&self, leaf: FunnelLeaf, record: DecOutput, ctx: &WorkerContext) -> bool {
        let Some(channel) = self.outputs.get(&leaf) else {
            return false;
        };
        loop {
            if channel.push(&[record], ctx.tick()) {
                return true;
            }
            if !ctx.is_running() {
                return false;
            }
            tracing::debug!("{:?} output full, waiting for consumer", leaf);
        }
    }

    /// Deliver finished records in order; the rest wait for the next run
    fn deliver_finished(&mut self, ctx: &WorkerContext) -> usize {
        let mut delivered = 0;
        while let Some(&(leaf, record)) = self.undelivered.front() {
            if !self.deliver(leaf, record, ctx) {
                tracing::debug!(
                    "Decoder stopping with full output; holding {} records",
                    self.undelivered.len()
                );
                break;
            }
            self.undelivered.pop_front();
            delivered += 1;
        }
        delivered
    }
}

impl ChunkProcessor for Decoder {
    fn name(&self) -> &'static str {
        "decoder"
    }

    fn process_chunk(&mut self, ctx: &WorkerContext) -> Result<usize> {
        if !self.undelivered.is_empty() {
            return Ok(self.deliver_finished(ctx));
        }

        let mut batch = std::mem::take(&mut self.batch);
        batch.clear();
        let count = self.input.pop_into(&mut batch, self.chunk_size, ctx.tick(), 1);

        let mut result = Ok(());
        for &transfer in &batch {
            match self.absorb(transfer) {
                Ok(Some(record)) => self.undelivered.push_back(record),
                Ok(None) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.batch = batch;

        // Records finished before a bad transfer still go out.
        let delivered = self.deliver_finished(ctx);
        result?;
        if count > 0 {
            tracing::debug!("Decoded {} transfers into {} records", count, delivered);
        }
        Ok(count)
    }
}
