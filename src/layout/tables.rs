//! Static chip description for BD
//!
//! Route paths are written root-first: the first character is the branch
//! selected at the root of the tree and lands in bit 0 of the route value.
//!
//! ## Horn tree
//!
//! ```text
//! 000      neuron inject        10000..10011  FIFO init / neuron config / ADC
//! 001      AM/MM program        10100..10111  traffic toggles
//! 010      PAT program          110xxxx       DACs (12)
//! 011x     TAT0/TAT1 program    111xx         FIFO delays
//! ```
//!
//! ## Funnel tree
//!
//! ```text
//! 00   accumulator readout      1100   pre-FIFO dump
//! 01   TAT tag readout          1101x  post-FIFO dumps
//! 1000 AM dump    1001 MM dump  1110   overflow 0
//! 1010 PAT dump   1011x TAT0/1  1111   overflow 1
//! ```

use super::words::*;
use super::{ComponentType, DacSignal, FunnelLeaf, HornLeaf, MemId, MiscWidth, RegId};
use crate::codec::WordLayout;

/// Static description of one leaf of the horn or funnel tree
#[derive(Debug)]
pub struct LeafSpec<L> {
    pub leaf: L,
    /// Root-first route path, e.g. `"10100"`
    pub path: &'static str,
    pub component: ComponentType,
    pub index: u32,
    /// Width of one physical transfer
    pub data_width: u32,
    /// Transfers per logical word
    pub serialization: u32,
    pub layout: &'static WordLayout,
    pub description: &'static str,
}

/// Static description of an on-chip memory
#[derive(Debug)]
pub struct MemSpec {
    pub mem: MemId,
    pub size: usize,
    pub layout: &'static WordLayout,
    pub prog_leaf: HornLeaf,
    pub dump_leaf: Option<FunnelLeaf>,
}

/// Static description of a register
#[derive(Debug)]
pub struct RegSpec {
    pub reg: RegId,
    pub leaf: HornLeaf,
}

/// Static description of a DAC
#[derive(Debug)]
pub struct DacSpec {
    pub signal: DacSignal,
    pub reg: RegId,
    pub default_count: u64,
}

/// Complete versioned chip description
#[derive(Debug)]
pub struct ChipSpec {
    pub version: &'static str,
    pub horn: &'static [LeafSpec<HornLeaf>],
    pub funnel: &'static [LeafSpec<FunnelLeaf>],
    pub memories: &'static [MemSpec],
    pub registers: &'static [RegSpec],
    pub dacs: &'static [DacSpec],
    pub misc: &'static [(MiscWidth, u32)],
}

const fn horn(
    leaf: HornLeaf,
    path: &'static str,
    component: ComponentType,
    index: u32,
    data_width: u32,
    serialization: u32,
    layout: &'static WordLayout,
    description: &'static str,
) -> LeafSpec<HornLeaf> {
    LeafSpec {
        leaf,
        path,
        component,
        index,
        data_width,
        serialization,
        layout,
        description,
    }
}

const fn funnel(
    leaf: FunnelLeaf,
    path: &'static str,
    component: ComponentType,
    index: u32,
    data_width: u32,
    serialization: u32,
    layout: &'static WordLayout,
    description: &'static str,
) -> LeafSpec<FunnelLeaf> {
    LeafSpec {
        leaf,
        path,
        component,
        index,
        data_width,
        serialization,
        layout,
        description,
    }
}

const fn dac(leaf: HornLeaf, path: &'static str, index: u32, description: &'static str) -> LeafSpec<HornLeaf> {
    horn(leaf, path, ComponentType::Dac, index, 11, 1, &DAC, description)
}

use ComponentType as C;

static BD_V1_HORN: [LeafSpec<HornLeaf>; 29] = [
    horn(HornLeaf::NeuronInject, "000", C::Input, 0, 20, 1, &FIFO_TAG, "tag input to the pre-FIFO"),
    horn(HornLeaf::ProgAmmm, "001", C::Memory, 0, 28, 2, &AMMM_PROG, "AM/MM programming"),
    horn(HornLeaf::ProgPat, "010", C::Memory, 2, 13, 2, &PAT_PROG, "PAT programming"),
    horn(HornLeaf::ProgTat0, "0110", C::Memory, 3, 39, 1, &TAT_PROG, "TAT0 programming"),
    horn(HornLeaf::ProgTat1, "0111", C::Memory, 4, 39, 1, &TAT_PROG, "TAT1 programming"),
    horn(HornLeaf::InitFifoDct, "10000", C::Fifo, 0, 11, 1, &FIFO_INIT, "delay-compensation FIFO init"),
    horn(HornLeaf::InitFifoHt, "10001", C::Fifo, 1, 1, 1, &FIFO_INIT_HT, "FIFO head/tail init"),
    horn(HornLeaf::NeuronConfig, "10010", C::NeuronConfig, 0, 18, 1, &NEURON_CONFIG, "neuron element configuration"),
    horn(HornLeaf::AdcControl, "10011", C::Adc, 0, 3, 1, &ADC, "ADC control"),
    horn(HornLeaf::TogglePreFifo, "10100", C::Register, 0, 2, 1, &TOGGLE, "pre-FIFO traffic/dump toggle"),
    horn(HornLeaf::TogglePostFifo0, "10101", C::Register, 1, 2, 1, &TOGGLE, "post-FIFO 0 traffic/dump toggle"),
    horn(HornLeaf::TogglePostFifo1, "10110", C::Register, 2, 2, 1, &TOGGLE, "post-FIFO 1 traffic/dump toggle"),
    horn(HornLeaf::NeuronDumpToggle, "10111", C::Register, 3, 2, 1, &TOGGLE, "neuron spike traffic/dump toggle"),
    dac(HornLeaf::DacDiffG, "1100000", 0, "diffusor gate DAC"),
    dac(HornLeaf::DacDiffR, "1100001", 1, "diffusor resistor DAC"),
    dac(HornLeaf::DacSomaOffset, "1100010", 2, "soma offset DAC"),
    dac(HornLeaf::DacSomaRef, "1100011", 3, "soma refractory DAC"),
    dac(HornLeaf::DacSynExc, "1100100", 4, "synapse excitatory DAC"),
    dac(HornLeaf::DacSynDc, "1100101", 5, "synapse DC DAC"),
    dac(HornLeaf::DacSynInh, "1100110", 6, "synapse inhibitory DAC"),
    dac(HornLeaf::DacSynLk, "1100111", 7, "synapse leak DAC"),
    dac(HornLeaf::DacSynPd, "1101000", 8, "synapse pulse-down DAC"),
    dac(HornLeaf::DacSynPu, "1101001", 9, "synapse pulse-up DAC"),
    dac(HornLeaf::DacAdcBias1, "1101010", 10, "ADC bias 1 DAC"),
    dac(HornLeaf::DacAdcBias2, "1101011", 11, "ADC bias 2 DAC"),
    horn(HornLeaf::DelayDctFifoInput, "11100", C::Register, 4, 8, 1, &DELAY, "DCT FIFO input delay"),
    horn(HornLeaf::DelayDctFifoOutput, "11101", C::Register, 5, 8, 1, &DELAY, "DCT FIFO output delay"),
    horn(HornLeaf::DelayPgFifoInput, "11110", C::Register, 6, 8, 1, &DELAY, "PG FIFO input delay"),
    horn(HornLeaf::DelayPgFifoOutput, "11111", C::Register, 7, 8, 1, &DELAY, "PG FIFO output delay"),
];

static BD_V1_FUNNEL: [LeafSpec<FunnelLeaf>; 12] = [
    funnel(FunnelLeaf::RoAcc, "00", C::Output, 0, 14, 2, &OUTPUT_TAG, "accumulator tag readout"),
    funnel(FunnelLeaf::RoTat, "01", C::Output, 1, 28, 1, &OUTPUT_TAG, "TAT tag readout"),
    funnel(FunnelLeaf::DumpAm, "1000", C::Dump, 0, 19, 2, &AM_ENTRY, "AM dump"),
    funnel(FunnelLeaf::DumpMm, "1001", C::Dump, 1, 8, 1, &MM_ENTRY, "MM dump"),
    funnel(FunnelLeaf::DumpPat, "1010", C::Dump, 2, 20, 1, &PAT_ENTRY, "PAT dump"),
    funnel(FunnelLeaf::DumpTat0, "10110", C::Dump, 3, 29, 1, &TAT_ENTRY, "TAT0 dump"),
    funnel(FunnelLeaf::DumpTat1, "10111", C::Dump, 4, 29, 1, &TAT_ENTRY, "TAT1 dump"),
    funnel(FunnelLeaf::DumpPreFifo, "1100", C::Fifo, 0, 20, 1, &FIFO_TAG, "pre-FIFO tag dump"),
    funnel(FunnelLeaf::DumpPostFifo0, "11010", C::Fifo, 1, 19, 1, &POST_FIFO_TAG, "post-FIFO 0 tag dump"),
    funnel(FunnelLeaf::DumpPostFifo1, "11011", C::Fifo, 2, 19, 1, &POST_FIFO_TAG, "post-FIFO 1 tag dump"),
    funnel(FunnelLeaf::Overflow0, "1110", C::Overflow, 0, 1, 1, &OVERFLOW, "FIFO overflow 0"),
    funnel(FunnelLeaf::Overflow1, "1111", C::Overflow, 1, 1, 1, &OVERFLOW, "FIFO overflow 1"),
];

static BD_V1_MEMORIES: [MemSpec; 7] = [
    MemSpec { mem: MemId::Am, size: 1024, layout: &AM_ENTRY, prog_leaf: HornLeaf::ProgAmmm, dump_leaf: Some(FunnelLeaf::DumpAm) },
    MemSpec { mem: MemId::Mm, size: 65536, layout: &MM_ENTRY, prog_leaf: HornLeaf::ProgAmmm, dump_leaf: Some(FunnelLeaf::DumpMm) },
    MemSpec { mem: MemId::Pat, size: 64, layout: &PAT_ENTRY, prog_leaf: HornLeaf::ProgPat, dump_leaf: Some(FunnelLeaf::DumpPat) },
    MemSpec { mem: MemId::Tat0, size: 1024, layout: &TAT_ENTRY, prog_leaf: HornLeaf::ProgTat0, dump_leaf: Some(FunnelLeaf::DumpTat0) },
    MemSpec { mem: MemId::Tat1, size: 1024, layout: &TAT_ENTRY, prog_leaf: HornLeaf::ProgTat1, dump_leaf: Some(FunnelLeaf::DumpTat1) },
    MemSpec { mem: MemId::FifoDct, size: 2048, layout: &FIFO_TAG, prog_leaf: HornLeaf::InitFifoDct, dump_leaf: Some(FunnelLeaf::DumpPreFifo) },
    MemSpec { mem: MemId::FifoPg, size: 2048, layout: &POST_FIFO_TAG, prog_leaf: HornLeaf::InitFifoHt, dump_leaf: None },
];

static BD_V1_REGISTERS: [RegSpec; 21] = [
    RegSpec { reg: RegId::TogglePreFifo, leaf: HornLeaf::TogglePreFifo },
    RegSpec { reg: RegId::TogglePostFifo0, leaf: HornLeaf::TogglePostFifo0 },
    RegSpec { reg: RegId::TogglePostFifo1, leaf: HornLeaf::TogglePostFifo1 },
    RegSpec { reg: RegId::NeuronDumpToggle, leaf: HornLeaf::NeuronDumpToggle },
    RegSpec { reg: RegId::DelayDctFifoInput, leaf: HornLeaf::DelayDctFifoInput },
    RegSpec { reg: RegId::DelayDctFifoOutput, leaf: HornLeaf::DelayDctFifoOutput },
    RegSpec { reg: RegId::DelayPgFifoInput, leaf: HornLeaf::DelayPgFifoInput },
    RegSpec { reg: RegId::DelayPgFifoOutput, leaf: HornLeaf::DelayPgFifoOutput },
    RegSpec { reg: RegId::AdcControl, leaf: HornLeaf::AdcControl },
    RegSpec { reg: RegId::DacDiffG, leaf: HornLeaf::DacDiffG },
    RegSpec { reg: RegId::DacDiffR, leaf: HornLeaf::DacDiffR },
    RegSpec { reg: RegId::DacSomaOffset, leaf: HornLeaf::DacSomaOffset },
    RegSpec { reg: RegId::DacSomaRef, leaf: HornLeaf::DacSomaRef },
    RegSpec { reg: RegId::DacSynExc, leaf: HornLeaf::DacSynExc },
    RegSpec { reg: RegId::DacSynDc, leaf: HornLeaf::DacSynDc },
    RegSpec { reg: RegId::DacSynInh, leaf: HornLeaf::DacSynInh },
    RegSpec { reg: RegId::DacSynLk, leaf: HornLeaf::DacSynLk },
    RegSpec { reg: RegId::DacSynPd, leaf: HornLeaf::DacSynPd },
    RegSpec { reg: RegId::DacSynPu, leaf: HornLeaf::DacSynPu },
    RegSpec { reg: RegId::DacAdcBias1, leaf: HornLeaf::DacAdcBias1 },
    RegSpec { reg: RegId::DacAdcBias2, leaf: HornLeaf::DacAdcBias2 },
];

static BD_V1_DACS: [DacSpec; 12] = [
    DacSpec { signal: DacSignal::DiffG, reg: RegId::DacDiffG, default_count: 1023 },
    DacSpec { signal: DacSignal::DiffR, reg: RegId::DacDiffR, default_count: 500 },
    DacSpec { signal: DacSignal::SomaOffset, reg: RegId::DacSomaOffset, default_count: 2 },
    DacSpec { signal: DacSignal::SomaRef, reg: RegId::DacSomaRef, default_count: 1023 },
    DacSpec { signal: DacSignal::SynExc, reg: RegId::DacSynExc, default_count: 512 },
    DacSpec { signal: DacSignal::SynDc, reg: RegId::DacSynDc, default_count: 544 },
    DacSpec { signal: DacSignal::SynInh, reg: RegId::DacSynInh, default_count: 512 },
    DacSpec { signal: DacSignal::SynLk, reg: RegId::DacSynLk, default_count: 10 },
    DacSpec { signal: DacSignal::SynPd, reg: RegId::DacSynPd, default_count: 40 },
    DacSpec { signal: DacSignal::SynPu, reg: RegId::DacSynPu, default_count: 1023 },
    DacSpec { signal: DacSignal::AdcBias1, reg: RegId::DacAdcBias1, default_count: 1023 },
    DacSpec { signal: DacSignal::AdcBias2, reg: RegId::DacAdcBias2, default_count: 1023 },
];

static BD_V1_MISC: [(MiscWidth, u32); 3] = [
    (MiscWidth::WireWord, 64),
    (MiscWidth::DacCount, 10),
    (MiscWidth::NeuronAddress, 12),
];

/// BD revision 1
pub static BD_V1: ChipSpec = ChipSpec {
    version: "bd-v1",
    horn: &BD_V1_HORN,
    funnel: &BD_V1_FUNNEL,
    memories: &BD_V1_MEMORIES,
    registers: &BD_V1_REGISTERS,
    dacs: &BD_V1_DACS,
    misc: &BD_V1_MISC,
};
