//! Core data types for the BD driver
//!
//! Records that flow through the pipeline channels. All of them are small
//! `Copy` values so the channels can move them in bulk.

use crate::codec::BDWord;
use crate::layout::{FunnelLeaf, HornLeaf};
use serde::Serialize;

/// Index of a core on the chip
pub type CoreId = u32;

/// A horn or funnel leaf on a specific core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HardwareLocation<L> {
    pub core_id: CoreId,
    pub leaf: L,
}

impl<L> HardwareLocation<L> {
    pub fn new(core_id: CoreId, leaf: L) -> Self {
        Self { core_id, leaf }
    }
}

/// Unit of work submitted to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncInput {
    pub core_id: CoreId,
    pub leaf: HornLeaf,
    /// Payload, interpreted with the leaf's word layout
    pub payload: BDWord,
}

impl EncInput {
    pub fn new(core_id: CoreId, leaf: HornLeaf, payload: BDWord) -> Self {
        Self {
            core_id,
            leaf,
            payload,
        }
    }

    /// Where this request is headed
    pub fn location(&self) -> HardwareLocation<HornLeaf> {
        HardwareLocation::new(self.core_id, self.leaf)
    }
}

/// One physical funnel transfer, already demultiplexed to its leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawTransfer {
    pub core_id: CoreId,
    pub leaf: FunnelLeaf,
    /// Transfer contents, right-justified in `data_width` bits
    pub data: u64,
}

impl RawTransfer {
    pub fn new(core_id: CoreId, leaf: FunnelLeaf, data: u64) -> Self {
        Self {
            core_id,
            leaf,
            data,
        }
    }

    pub fn location(&self) -> HardwareLocation<FunnelLeaf> {
        HardwareLocation::new(self.core_id, self.leaf)
    }
}

/// A decoded record delivered on a funnel leaf's output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecOutput {
    pub payload: BDWord,
    pub core_id: CoreId,
    /// Receive-order counter of the leaf channel (not wall-clock time)
    pub time_epoch: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_location_is_a_map_key() {
        let mut seen = HashSet::new();
        assert!(seen.insert(HardwareLocation::new(0, HornLeaf::ProgPat)));
        assert!(seen.insert(HardwareLocation::new(1, HornLeaf::ProgPat)));
        assert!(!seen.insert(HardwareLocation::new(0, HornLeaf::ProgPat)));
    }

    #[test]
    fn test_enc_input_location() {
        let input = EncInput::new(3, HornLeaf::NeuronInject, BDWord::default());
        assert_eq!(input.location(), HardwareLocation::new(3, HornLeaf::NeuronInject));
    }
}
