//! Horn encoder stage
//!
//! Pops typed [`EncInput`] requests, prefixes each payload with its horn
//! leaf's route and writes the resulting wire words to the byte channel that
//! feeds the transport.
//!
//! # Horn word format
//!
//! ```text
//!  63                       route_length     0
//! +---------------------------+----------------+
//! |  payload (chunk_width)    |     route      |
//! +---------------------------+----------------+
//! ```
//!
//! The route sits in the low bits because the tree strips it hop by hop as
//! the word descends. Each word goes out as [`WIRE_WORD_BYTES`] little-endian
//! bytes.

use crate::channel::BoundedChannel;
use crate::codec::{fits, pack, unpack};
use crate::error::{DriverError, Result};
use crate::layout::{HardwareLayout, HornLeaf};
use crate::types::EncInput;
use crate::worker::{ChunkProcessor, WorkerContext};
use std::sync::Arc;

/// Bytes per wire word in either direction
pub const WIRE_WORD_BYTES: usize = 8;

/// Pack a payload and its leaf's route into one horn word
///
/// An unknown leaf or a payload wider than the leaf's chunk width is a
/// configuration error; nothing is truncated.
pub fn encode_horn_word(layout: &HardwareLayout, leaf: HornLeaf, payload: u64) -> Result<u64> {
    let info = layout.leaf(leaf)?;
    if !fits(payload, info.chunk_width) {
        return Err(DriverError::FieldOverflow {
            field: format!("{:?} payload", leaf),
            value: payload,
            width: info.chunk_width,
        });
    }
    pack(
        &[payload, info.route.value],
        &[info.chunk_width, info.route.length],
    )
}

/// Split a horn word back into its leaf and payload
pub fn decode_horn_word(layout: &HardwareLayout, word: u64) -> Result<(HornLeaf, u64)> {
    let leaf = layout
        .horn_leaf_for_word(word)
        .ok_or_else(|| DriverError::InvalidRoute(format!("no horn route matches {:#x}", word)))?;
    let info = layout.leaf(leaf)?;
    let fields = unpack(word, &[info.chunk_width, info.route.length])?;
    Ok((leaf, fields[0]))
}

/// Encoder stage processor
pub struct Encoder {
    layout: Arc<HardwareLayout>,
    input: Arc<BoundedChannel<EncInput>>,
    output: Arc<BoundedChannel<u8>>,
    chunk_size: usize,
    batch: Vec<EncInput>,
    words: Vec<u64>,
}

impl Encoder {
    pub fn new(
        layout: Arc<HardwareLayout>,
        input: Arc<BoundedChannel<EncInput>>,
        output: Arc<BoundedChannel<u8>>,
        chunk_size: usize,
    ) -> Self {
        let chunk_size = chunk_size.clamp(1, input.capacity());
        Self {
            layout,
            input,
            output,
            chunk_size,
            batch: Vec::with_capacity(chunk_size),
            words: Vec::with_capacity(chunk_size),
        }
    }

    /// Words encoded but not yet written to the output
    pub fn pending_words(&self) -> usize {
        self.words.len()
    }

    /// Encode the current batch; any bad input rejects the whole batch
    fn encode_batch(&mut self) -> Result<()> {
        let mut encoded = Vec::with_capacity(self.batch.len());
        for input in &self.batch {
            let word = encode_horn_word(&self.layout, input.leaf, input.payload.raw())
                .map_err(|e| e.with_context(format!("encoding for core {}", input.core_id)))?;
            tracing::trace!("{:?} -> {:#018x}", input.leaf, word);
            encoded.push(word);
        }
        self.words.extend(encoded);
        Ok(())
    }

    /// Write pending words straight into the output ring
    ///
    /// Returns the number of words written. Words that did not fit before
    /// the worker was told to stop stay pending for the next run.
    fn write_words(&mut self, ctx: &WorkerContext) -> usize {
        let per_lock = (self.output.capacity() / WIRE_WORD_BYTES).max(1);
        let mut written = 0;

        while !self.words.is_empty() {
            let n = self.words.len().min(per_lock);
            match self.output.lock_back(n * WIRE_WORD_BYTES, ctx.tick()) {
                Some(mut view) => {
                    for (slot, word) in view.chunks_exact_mut(WIRE_WORD_BYTES).zip(&self.words[..n]) {
                        slot.copy_from_slice(&word.to_le_bytes());
                    }
                    view.commit();
                    self.words.drain(..n);
                    written += n;
                }
                None if !ctx.is_running() => {
                    tracing::debug!(
                        "Encoder stopping with full output; holding {} words",
                        self.words.len()
                    );
                    break;
                }
                None => {}
            }
        }
        written
    }
}

impl ChunkProcessor for Encoder {
    fn name(&self) -> &'static str {
        "encoder"
    }

    fn process_chunk(&mut self, ctx: &WorkerContext) -> Result<usize> {
        if !self.words.is_empty() {
            return Ok(self.write_words(ctx));
        }

        self.batch.clear();
        let count = self
            .input
            .pop_into(&mut self.batch, self.chunk_size, ctx.tick(), 1);
        if count == 0 {
            return Ok(0);
        }

        self.encode_batch()?;
        let written = self.write_words(ctx);
        tracing::debug!("Encoded {} of {} inputs", written, count);
        Ok(written)
    }
}
