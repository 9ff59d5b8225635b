//! Byte transport boundary
//!
//! The driver talks to the chip (or a simulator) through two traits:
//!
//! - [`TransportTx`] accepts horn bytes and must deliver them in order.
//! - [`TransportRx`] yields [`SubStreamChunk`]s. The transport demultiplexes
//!   the physical funnel sub-streams, so every chunk is already tagged with
//!   its core and funnel leaf. Nothing downstream infers a leaf from bits.
//!
//! Two pipeline stages sit on the boundary: [`DownstreamPump`] moves encoder
//! output bytes to the Tx side, [`UpstreamPump`] reassembles 8-byte
//! transfers per sub-stream and feeds the decoder.
//!
//! [`loopback`] builds a connected software pair for testing without
//! hardware. Configured horn leaves are echoed back on a funnel leaf; every
//! other horn word is consumed, the way the chip consumes register writes.

use crate::channel::BoundedChannel;
use crate::codec::{fits, unpack};
use crate::encoder::{decode_horn_word, WIRE_WORD_BYTES};
use crate::error::{DriverError, Result};
use crate::layout::{FunnelLeaf, HardwareLayout, HornLeaf};
use crate::types::{CoreId, RawTransfer};
use crate::worker::{ChunkProcessor, WorkerContext};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Bytes received on one funnel sub-stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubStreamChunk {
    pub core_id: CoreId,
    pub leaf: FunnelLeaf,
    pub bytes: Vec<u8>,
}

/// Host→chip byte sink
#[cfg_attr(test, mockall::automock)]
pub trait TransportTx: Send + 'static {
    /// Deliver `bytes` to the medium, in order
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Chip→host sub-stream source
#[cfg_attr(test, mockall::automock)]
pub trait TransportRx: Send + 'static {
    /// Next chunk, or `None` if nothing arrived within `timeout`
    fn recv(&mut self, timeout: Duration) -> Result<Option<SubStreamChunk>>;
}

// ==================== Pumps ====================

/// Moves encoded horn bytes from the encoder output to the transport
pub struct DownstreamPump {
    input: Arc<BoundedChannel<u8>>,
    tx: Box<dyn TransportTx>,
    max_bytes: usize,
    buffer: Vec<u8>,
}

impl DownstreamPump {
    /// `max_words` bounds how many wire words go out per send
    pub fn new(input: Arc<BoundedChannel<u8>>, tx: Box<dyn TransportTx>, max_words: usize) -> Self {
        let max_bytes = (max_words.max(1) * WIRE_WORD_BYTES)
            .min(input.capacity() - input.capacity() % WIRE_WORD_BYTES)
            .max(WIRE_WORD_BYTES);
        Self {
            input,
            tx,
            max_bytes,
            buffer: Vec::with_capacity(max_bytes),
        }
    }
}

impl ChunkProcessor for DownstreamPump {
    fn name(&self) -> &'static str {
        "downstream"
    }

    fn process_chunk(&mut self, ctx: &WorkerContext) -> Result<usize> {
        self.buffer.clear();
        // Whole words only, so a send never splits a horn word.
        let count = self
            .input
            .pop_into(&mut self.buffer, self.max_bytes, ctx.tick(), WIRE_WORD_BYTES);
        if count == 0 {
            return Ok(0);
        }
        self.tx
            .send(&self.buffer)
            .map_err(|e| e.with_context("sending horn words"))?;
        tracing::debug!("Sent {} horn words", count / WIRE_WORD_BYTES);
        Ok(count / WIRE_WORD_BYTES)
    }
}

/// Reassembles funnel transfers from sub-stream bytes for the decoder
pub struct UpstreamPump {
    layout: Arc<HardwareLayout>,
    rx: Box<dyn TransportRx>,
    output: Arc<BoundedChannel<RawTransfer>>,
    leftovers: HashMap<(CoreId, FunnelLeaf), Vec<u8>>,
    held: VecDeque<RawTransfer>,
}

impl UpstreamPump {
    pub fn new(
        layout: Arc<HardwareLayout>,
        rx: Box<dyn TransportRx>,
        output: Arc<BoundedChannel<RawTransfer>>,
    ) -> Self {
        Self {
            layout,
            rx,
            output,
            leftovers: HashMap::new(),
            held: VecDeque::new(),
        }
    }

    /// Bytes held back waiting for the rest of a transfer
    pub fn leftover_bytes(&self, core_id: CoreId, leaf: FunnelLeaf) -> usize {
        self.leftovers.get(&(core_id, leaf)).map_or(0, Vec::len)
    }

    /// Whole transfers received but not yet accepted by the decoder input
    pub fn held_transfers(&self) -> usize {
        self.held.len()
    }

    /// Push held transfers in order until none are left or the worker stops
    ///
    /// Whatever did not fit stays held for the next run, so a record is
    /// never split by a restart.
    fn forward_held(&mut self, ctx: &WorkerContext) -> usize {
        let per_push = self.output.capacity();
        let mut forwarded = 0;
        while !self.held.is_empty() {
            let n = self.held.len().min(per_push);
            let group = &self.held.make_contiguous()[..n];
            if self.output.push(group, ctx.tick()) {
                self.held.drain(..n);
                forwarded += n;
            } else if !ctx.is_running() {
                tracing::debug!(
                    "Upstream stopping with full decoder input; holding {} transfers",
                    self.held.len()
                );
                break;
            }
        }
        forwarded
    }

    fn split_transfers(&mut self, chunk: SubStreamChunk) -> Result<Vec<RawTransfer>> {
        let data_width = self.layout.width_for(chunk.leaf)?;
        let buffer = self.leftovers.entry((chunk.core_id, chunk.leaf)).or_default();
        buffer.extend_from_slice(&chunk.bytes);

        let whole = buffer.len() - buffer.len() % WIRE_WORD_BYTES;
        let mut transfers = Vec::with_capacity(whole / WIRE_WORD_BYTES);
        for bytes in buffer[..whole].chunks_exact(WIRE_WORD_BYTES) {
            let mut word = [0u8; WIRE_WORD_BYTES];
            word.copy_from_slice(bytes);
            let data = u64::from_le_bytes(word);
            if !fits(data, data_width) {
                return Err(DriverError::FieldOverflow {
                    field: format!("{:?} transfer", chunk.leaf),
                    value: data,
                    width: data_width,
                });
            }
            transfers.push(RawTransfer::new(chunk.core_id, chunk.leaf, data));
        }
        buffer.drain(..whole);
        Ok(transfers)
    }
}

impl ChunkProcessor for UpstreamPump {
    fn name(&self) -> &'static str {
        "upstream"
    }

    fn process_chunk(&mut self, ctx: &WorkerContext) -> Result<usize> {
        if !self.held.is_empty() {
            return Ok(self.forward_held(ctx));
        }
        let Some(chunk) = self.rx.recv(ctx.poll_timeout())? else {
            return Ok(0);
        };
        let transfers = self.split_transfers(chunk)?;
        self.held.extend(transfers);
        Ok(self.forward_held(ctx))
    }
}

// ==================== Loopback ====================

/// Build a connected software transport for one core
pub fn loopback(layout: Arc<HardwareLayout>, core_id: CoreId) -> (LoopbackTx, LoopbackRx) {
    let (sender, receiver) = unbounded();
    let tx = LoopbackTx {
        layout,
        core_id,
        echo: HashMap::new(),
        pending: Vec::new(),
        sender,
    };
    (tx, LoopbackRx { receiver })
}

/// Tx half of [`loopback`]
pub struct LoopbackTx {
    layout: Arc<HardwareLayout>,
    core_id: CoreId,
    echo: HashMap<HornLeaf, FunnelLeaf>,
    pending: Vec<u8>,
    sender: Sender<SubStreamChunk>,
}

impl LoopbackTx {
    /// Echo payloads written to `from` back on the funnel leaf `to`
    ///
    /// The horn payload must fit the funnel leaf's chunk width.
    pub fn route(&mut self, from: HornLeaf, to: FunnelLeaf) -> Result<&mut Self> {
        let horn = self.layout.leaf(from)?.chunk_width;
        let funnel = self.layout.leaf(to)?.chunk_width;
        if horn > funnel {
            return Err(DriverError::InvalidLayout(format!(
                "cannot echo {:?} ({} bits) on {:?} ({} bits)",
                from, horn, to, funnel
            )));
        }
        self.echo.insert(from, to);
        Ok(self)
    }

    fn echo_word(&self, word: u64) -> Result<()> {
        let (horn, payload) = decode_horn_word(&self.layout, word)?;
        let Some(&leaf) = self.echo.get(&horn) else {
            tracing::trace!("Loopback consumed {:?} word {:#x}", horn, payload);
            return Ok(());
        };

        let info = self.layout.leaf(leaf)?;
        let widths = vec![info.data_width; info.serialization_factor as usize];
        let bytes = unpack(payload, &widths)?
            .into_iter()
            .flat_map(u64::to_le_bytes)
            .collect();
        self.sender
            .send(SubStreamChunk {
                core_id: self.core_id,
                leaf,
                bytes,
            })
            .map_err(|_| DriverError::Transport("loopback receiver dropped".to_string()))
    }
}

impl TransportTx for LoopbackTx {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(bytes);
        let whole = self.pending.len() - self.pending.len() % WIRE_WORD_BYTES;
        let words: Vec<u64> = self.pending[..whole]
            .chunks_exact(WIRE_WORD_BYTES)
            .map(|b| {
                let mut word = [0u8; WIRE_WORD_BYTES];
                word.copy_from_slice(b);
                u64::from_le_bytes(word)
            })
            .collect();
        self.pending.drain(..whole);

        for word in words {
            self.echo_word(word)
                .map_err(|e| DriverError::Transport(format!("loopback: {}", e)))?;
        }
        Ok(())
    }
}

/// Rx half of [`loopback`]
pub struct LoopbackRx {
    receiver: Receiver<SubStreamChunk>,
}

impl TransportRx for LoopbackRx {
    fn recv(&mut self, timeout: Duration) -> Result<Option<SubStreamChunk>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(chunk) => Ok(Some(chunk)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(DriverError::Transport("loopback sender dropped".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_horn_word;
    use mockall::Sequence;
    use std::sync::atomic::AtomicBool;

    fn layout() -> Arc<HardwareLayout> {
        Arc::new(HardwareLayout::bd_v1().unwrap())
    }

    fn ctx() -> WorkerContext {
        WorkerContext::new(Arc::new(AtomicBool::new(true)), Duration::from_millis(10))
    }

    #[test]
    fn test_downstream_sends_whole_words() {
        let input = Arc::new(BoundedChannel::new(64));
        input.push(&[1u8; 20], None);

        let mut tx = MockTransportTx::new();
        tx.expect_send()
            .withf(|bytes: &[u8]| bytes == &[1u8; 16])
            .times(1)
            .returning(|_| Ok(()));
        let mut pump = DownstreamPump::new(input.clone(), Box::new(tx), 8);

        assert_eq!(pump.process_chunk(&ctx()).unwrap(), 2);
        // The trailing partial word stays queued.
        assert_eq!(input.len(), 4);
    }

    #[test]
    fn test_downstream_respects_max_words() {
        let input = Arc::new(BoundedChannel::new(64));
        input.push(&[7u8; 32], None);

        let mut tx = MockTransportTx::new();
        tx.expect_send()
            .withf(|bytes: &[u8]| bytes.len() == 16)
            .times(2)
            .returning(|_| Ok(()));
        let mut pump = DownstreamPump::new(input, Box::new(tx), 2);
        assert_eq!(pump.process_chunk(&ctx()).unwrap(), 2);
        assert_eq!(pump.process_chunk(&ctx()).unwrap(), 2);
    }

    #[test]
    fn test_downstream_transport_error_is_fatal() {
        let input = Arc::new(BoundedChannel::new(64));
        input.push(&[0u8; 8], None);

        let mut tx = MockTransportTx::new();
        tx.expect_send()
            .returning(|_| Err(DriverError::Transport("usb stall".to_string())));
        let mut pump = DownstreamPump::new(input, Box::new(tx), 8);
        let err = pump.process_chunk(&ctx()).unwrap_err();
        assert!(err.to_string().contains("usb stall"));
    }

    #[test]
    fn test_upstream_reassembles_split_transfers() {
        let first = 0x0123u64.to_le_bytes();
        let second = 0x0456u64.to_le_bytes();

        let mut seq = Sequence::new();
        let mut rx = MockTransportRx::new();
        let mut middle = first[5..].to_vec();
        middle.extend_from_slice(&second[..3]);
        for bytes in [first[..5].to_vec(), middle, second[3..].to_vec()] {
            rx.expect_recv()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| {
                    Ok(Some(SubStreamChunk {
                        core_id: 0,
                        leaf: FunnelLeaf::DumpPat,
                        bytes: bytes.clone(),
                    }))
                });
        }

        let output = Arc::new(BoundedChannel::new(16));
        let mut pump = UpstreamPump::new(layout(), Box::new(rx), output.clone());

        assert_eq!(pump.process_chunk(&ctx()).unwrap(), 0);
        assert_eq!(pump.leftover_bytes(0, FunnelLeaf::DumpPat), 5);
        assert_eq!(pump.process_chunk(&ctx()).unwrap(), 1);
        assert_eq!(pump.leftover_bytes(0, FunnelLeaf::DumpPat), 3);
        assert_eq!(pump.process_chunk(&ctx()).unwrap(), 1);
        assert_eq!(pump.leftover_bytes(0, FunnelLeaf::DumpPat), 0);

        let transfers = output.pop(16, Some(Duration::ZERO), 1);
        assert_eq!(
            transfers,
            vec![
                RawTransfer::new(0, FunnelLeaf::DumpPat, 0x0123),
                RawTransfer::new(0, FunnelLeaf::DumpPat, 0x0456),
            ]
        );
    }

    #[test]
    fn test_upstream_holds_transfers_across_restart() {
        use crate::decoder::{Decoder, DecoderOutputs};

        let layout = layout();
        let width = layout.width_for(FunnelLeaf::RoAcc).unwrap();
        let record = |hi: u64, lo: u64| {
            let mut bytes = hi.to_le_bytes().to_vec();
            bytes.extend_from_slice(&lo.to_le_bytes());
            SubStreamChunk {
                core_id: 0,
                leaf: FunnelLeaf::RoAcc,
                bytes,
            }
        };

        let mut seq = Sequence::new();
        let mut rx = MockTransportRx::new();
        for chunk in [record(1, 2), record(3, 4)] {
            rx.expect_recv()
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_| Ok(Some(chunk.clone())));
        }

        // One transfer of room: every record has to cross a stop.
        let dec_input = Arc::new(BoundedChannel::new(1));
        let output = Arc::new(BoundedChannel::new(8));
        let outputs: DecoderOutputs = [(FunnelLeaf::RoAcc, output.clone())].into_iter().collect();
        let mut pump = UpstreamPump::new(layout.clone(), Box::new(rx), dec_input.clone());
        let mut decoder = Decoder::new(layout, dec_input, outputs, 1);
        let stopping = WorkerContext::new(Arc::new(AtomicBool::new(false)), Duration::from_millis(5));

        for _ in 0..2 {
            assert_eq!(pump.process_chunk(&stopping).unwrap(), 1);
            assert_eq!(pump.held_transfers(), 1);
            decoder.process_chunk(&ctx()).unwrap();

            // Restarted: the held low half is forwarded before anything new.
            assert_eq!(pump.process_chunk(&ctx()).unwrap(), 1);
            assert_eq!(pump.held_transfers(), 0);
            decoder.process_chunk(&ctx()).unwrap();
        }

        let records: Vec<u64> = output
            .pop(8, Some(Duration::ZERO), 1)
            .iter()
            .map(|r| r.payload.raw())
            .collect();
        assert_eq!(records, vec![(1 << width) | 2, (3 << width) | 4]);
    }

    #[test]
    fn test_upstream_idle_on_timeout() {
        let mut rx = MockTransportRx::new();
        rx.expect_recv().returning(|_| Ok(None));
        let output = Arc::new(BoundedChannel::new(4));
        let mut pump = UpstreamPump::new(layout(), Box::new(rx), output);
        assert_eq!(pump.process_chunk(&ctx()).unwrap(), 0);
    }

    #[test]
    fn test_upstream_rejects_oversized_transfer() {
        let mut rx = MockTransportRx::new();
        rx.expect_recv().returning(|_| {
            Ok(Some(SubStreamChunk {
                core_id: 0,
                leaf: FunnelLeaf::Overflow0,
                bytes: 2u64.to_le_bytes().to_vec(),
            }))
        });
        let output = Arc::new(BoundedChannel::new(4));
        let mut pump = UpstreamPump::new(layout(), Box::new(rx), output.clone());
        assert!(pump.process_chunk(&ctx()).unwrap_err().is_configuration_error());
        assert!(output.is_empty());
    }

    #[test]
    fn test_loopback_echoes_serialized_payload() {
        let layout = layout();
        let (mut tx, mut rx) = loopback(layout.clone(), 2);
        tx.route(HornLeaf::NeuronInject, FunnelLeaf::RoAcc).unwrap();

        let info = layout.leaf(FunnelLeaf::RoAcc).unwrap();
        assert_eq!(info.serialization_factor, 2);
        let payload = (0x5u64 << info.data_width) | 0x9;
        let word = encode_horn_word(&layout, HornLeaf::NeuronInject, payload).unwrap();
        tx.send(&word.to_le_bytes()).unwrap();

        let chunk = rx.recv(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(chunk.core_id, 2);
        assert_eq!(chunk.leaf, FunnelLeaf::RoAcc);
        let mut expected = 0x5u64.to_le_bytes().to_vec();
        expected.extend_from_slice(&0x9u64.to_le_bytes());
        assert_eq!(chunk.bytes, expected);
    }

    #[test]
    fn test_loopback_consumes_unrouted_words() {
        let layout = layout();
        let (mut tx, mut rx) = loopback(layout.clone(), 0);
        let word = encode_horn_word(&layout, HornLeaf::TogglePreFifo, 0b01).unwrap();
        // Split across two sends.
        let bytes = word.to_le_bytes();
        tx.send(&bytes[..3]).unwrap();
        tx.send(&bytes[3..]).unwrap();
        assert_eq!(rx.recv(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn test_loopback_rejects_narrow_echo() {
        let (mut tx, _rx) = loopback(layout(), 0);
        assert!(tx.route(HornLeaf::ProgAmmm, FunnelLeaf::Overflow0).is_err());
    }

    #[test]
    fn test_loopback_rx_reports_disconnect() {
        let (tx, mut rx) = loopback(layout(), 0);
        drop(tx);
        assert!(rx.recv(Duration::from_millis(10)).is_err());
    }
}
