//! Hardware layout of the BD addressing trees
//!
//! [`HardwareLayout`] is the immutable description of the chip: the horn
//! (host→chip) and funnel (chip→host) routing tables, each leaf's route,
//! serialization factor and widths, memory sizes, register and DAC maps.
//!
//! It is built once from a static [`ChipSpec`] and validated on
//! construction. After that it is never mutated, so it can be shared across
//! every worker thread behind an `Arc` without locking.
//!
//! # Example
//!
//! ```ignore
//! use bd_driver::layout::{HardwareLayout, HornLeaf};
//!
//! let layout = HardwareLayout::bd_v1()?;
//! let route = layout.route_for(HornLeaf::TogglePreFifo)?;
//! assert_eq!(route.length, 5);
//! ```

pub mod tables;
pub mod words;

pub use tables::{ChipSpec, DacSpec, LeafSpec, MemSpec, RegSpec, BD_V1};

use crate::codec::{max_val, WordLayout, WORD_BITS};
use crate::error::{DriverError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

// ==================== Identifiers ====================

/// Horn (host→chip) leaf identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum HornLeaf {
    NeuronInject,
    ProgAmmm,
    ProgPat,
    ProgTat0,
    ProgTat1,
    InitFifoDct,
    InitFifoHt,
    NeuronConfig,
    AdcControl,
    TogglePreFifo,
    TogglePostFifo0,
    TogglePostFifo1,
    NeuronDumpToggle,
    DacDiffG,
    DacDiffR,
    DacSomaOffset,
    DacSomaRef,
    DacSynExc,
    DacSynDc,
    DacSynInh,
    DacSynLk,
    DacSynPd,
    DacSynPu,
    DacAdcBias1,
    DacAdcBias2,
    DelayDctFifoInput,
    DelayDctFifoOutput,
    DelayPgFifoInput,
    DelayPgFifoOutput,
}

/// Funnel (chip→host) leaf identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FunnelLeaf {
    RoAcc,
    RoTat,
    DumpAm,
    DumpMm,
    DumpPat,
    DumpTat0,
    DumpTat1,
    DumpPreFifo,
    DumpPostFifo0,
    DumpPostFifo1,
    Overflow0,
    Overflow1,
}

/// On-chip memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MemId {
    Am,
    Mm,
    Pat,
    Tat0,
    Tat1,
    FifoDct,
    FifoPg,
}

/// Registers programmable through a dedicated horn leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RegId {
    TogglePreFifo,
    TogglePostFifo0,
    TogglePostFifo1,
    NeuronDumpToggle,
    DelayDctFifoInput,
    DelayDctFifoOutput,
    DelayPgFifoInput,
    DelayPgFifoOutput,
    AdcControl,
    DacDiffG,
    DacDiffR,
    DacSomaOffset,
    DacSomaRef,
    DacSynExc,
    DacSynDc,
    DacSynInh,
    DacSynLk,
    DacSynPd,
    DacSynPu,
    DacAdcBias1,
    DacAdcBias2,
}

impl RegId {
    /// Registers whose traffic bit gates spike traffic through the chip
    pub const TRAFFIC_CONTROL: [RegId; 4] = [
        RegId::TogglePreFifo,
        RegId::TogglePostFifo0,
        RegId::TogglePostFifo1,
        RegId::NeuronDumpToggle,
    ];

    /// Whether this register is one of the traffic toggles
    pub fn is_traffic_control(self) -> bool {
        Self::TRAFFIC_CONTROL.contains(&self)
    }
}

/// DAC bias signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum DacSignal {
    DiffG,
    DiffR,
    SomaOffset,
    SomaRef,
    SynExc,
    SynDc,
    SynInh,
    SynLk,
    SynPd,
    SynPu,
    AdcBias1,
    AdcBias2,
}

/// Widths that do not belong to a single leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum MiscWidth {
    /// Width of one word on the byte transport
    WireWord,
    /// Resolution of a DAC count
    DacCount,
    /// Width of a neuron address
    NeuronAddress,
}

/// Kind of component a leaf terminates at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentType {
    Input,
    Memory,
    Register,
    Dac,
    Adc,
    NeuronConfig,
    Fifo,
    Output,
    Dump,
    Overflow,
}

// ==================== Routes & Leaves ====================

/// Right-justified route prefix stripped hop by hop by the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RouteEntry {
    /// Route bits, first hop in bit 0
    pub value: u64,
    /// Number of route bits
    pub length: u32,
}

impl RouteEntry {
    /// Create a route entry, checking `length <= 64` and `value < 2^length`
    pub fn new(value: u64, length: u32) -> Result<Self> {
        if length > WORD_BITS {
            return Err(DriverError::InvalidRoute(format!(
                "route length {} exceeds {}-bit word",
                length, WORD_BITS
            )));
        }
        if value > max_val(length) {
            return Err(DriverError::InvalidRoute(format!(
                "route value {:#b} does not fit {} bits",
                value, length
            )));
        }
        Ok(Self { value, length })
    }

    /// Parse a root-first path such as `"0110"`
    pub fn from_path(path: &str) -> Result<Self> {
        let length = u32::try_from(path.len())
            .map_err(|_| DriverError::InvalidRoute(format!("route path too long: {}", path)))?;
        if length > WORD_BITS {
            return Err(DriverError::InvalidRoute(format!(
                "route path '{}' longer than {} hops",
                path, WORD_BITS
            )));
        }
        let mut value = 0u64;
        for (bit, hop) in path.chars().enumerate() {
            match hop {
                '0' => {}
                '1' => value |= 1 << bit,
                other => {
                    return Err(DriverError::InvalidRoute(format!(
                        "invalid hop '{}' in route path '{}'",
                        other, path
                    )))
                }
            }
        }
        Self::new(value, length)
    }

    /// Whether the low bits of `word` select this route
    #[inline]
    pub fn matches(&self, word: u64) -> bool {
        word & max_val(self.length) == self.value
    }

    /// Whether one route is a prefix of the other, making decoding ambiguous
    pub fn conflicts_with(&self, other: &RouteEntry) -> bool {
        let shorter = self.length.min(other.length);
        (self.value & max_val(shorter)) == (other.value & max_val(shorter))
    }
}

/// Everything the codec needs to know about one leaf
#[derive(Debug, Clone)]
pub struct LeafInfo {
    pub component_type: ComponentType,
    pub component_index: u32,
    pub route: RouteEntry,
    /// Width of one physical transfer
    pub data_width: u32,
    /// Transfers concatenated into one logical word
    pub serialization_factor: u32,
    /// `data_width * serialization_factor`
    pub chunk_width: u32,
    /// Field layout of the logical word
    pub layout: &'static WordLayout,
    pub description: &'static str,
}

/// Memory description
#[derive(Debug, Clone)]
pub struct MemInfo {
    pub size: usize,
    pub layout: &'static WordLayout,
    pub prog_leaf: HornLeaf,
    pub dump_leaf: Option<FunnelLeaf>,
}

/// DAC description
#[derive(Debug, Clone, Copy)]
pub struct DacInfo {
    pub reg: RegId,
    pub default_count: u64,
}

/// Leaf identifiers of either tree
///
/// Lets route/width/serialization lookups share one generic API across the
/// two independent id spaces.
pub trait LeafId: Copy + Eq + Hash + Debug + Ord {
    /// Look this leaf up in the layout
    fn info(self, layout: &HardwareLayout) -> Result<&LeafInfo>;
}

impl LeafId for HornLeaf {
    fn info(self, layout: &HardwareLayout) -> Result<&LeafInfo> {
        layout
            .horn
            .get(&self)
            .ok_or(DriverError::UnknownHornLeaf(self))
    }
}

impl LeafId for FunnelLeaf {
    fn info(self, layout: &HardwareLayout) -> Result<&LeafInfo> {
        layout
            .funnel
            .get(&self)
            .ok_or(DriverError::UnknownFunnelLeaf(self))
    }
}

// ==================== Hardware Layout ====================

/// Immutable, validated description of the chip's addressing trees
#[derive(Debug)]
pub struct HardwareLayout {
    version: &'static str,
    horn: HashMap<HornLeaf, LeafInfo>,
    funnel: HashMap<FunnelLeaf, LeafInfo>,
    /// Horn leaves sorted by id, for deterministic route matching
    horn_order: Vec<HornLeaf>,
    memories: HashMap<MemId, MemInfo>,
    registers: HashMap<RegId, HornLeaf>,
    dacs: HashMap<DacSignal, DacInfo>,
    misc: HashMap<MiscWidth, u32>,
}

impl HardwareLayout {
    /// Build and validate the layout described by `spec`
    pub fn from_spec(spec: &ChipSpec) -> Result<Self> {
        let horn = build_tree(spec.horn, "horn", |info| {
            info.route.length + info.chunk_width
        })?;
        let funnel = build_tree(spec.funnel, "funnel", |info| {
            info.route.length + info.data_width
        })?;

        let mut memories = HashMap::new();
        for m in spec.memories {
            if m.size == 0 {
                return Err(invalid(format!("memory {:?} has zero size", m.mem)));
            }
            if !horn.contains_key(&m.prog_leaf) {
                return Err(invalid(format!(
                    "memory {:?} programs through missing horn leaf {:?}",
                    m.mem, m.prog_leaf
                )));
            }
            if let Some(dump) = m.dump_leaf {
                if !funnel.contains_key(&dump) {
                    return Err(invalid(format!(
                        "memory {:?} dumps through missing funnel leaf {:?}",
                        m.mem, dump
                    )));
                }
            }
            let info = MemInfo {
                size: m.size,
                layout: m.layout,
                prog_leaf: m.prog_leaf,
                dump_leaf: m.dump_leaf,
            };
            if memories.insert(m.mem, info).is_some() {
                return Err(invalid(format!("memory {:?} listed twice", m.mem)));
            }
        }

        let mut registers = HashMap::new();
        for r in spec.registers {
            if !horn.contains_key(&r.leaf) {
                return Err(invalid(format!(
                    "register {:?} maps to missing horn leaf {:?}",
                    r.reg, r.leaf
                )));
            }
            if registers.insert(r.reg, r.leaf).is_some() {
                return Err(invalid(format!("register {:?} listed twice", r.reg)));
            }
        }

        let mut dacs = HashMap::new();
        for d in spec.dacs {
            let leaf = registers.get(&d.reg).ok_or_else(|| {
                invalid(format!("DAC {:?} maps to missing register {:?}", d.signal, d.reg))
            })?;
            let layout = horn[leaf].layout;
            let value_width = layout
                .index_of("DAC_VALUE")
                .map(|i| layout.fields[i].width)
                .ok_or_else(|| invalid(format!("register {:?} is not a DAC", d.reg)))?;
            if d.default_count > max_val(value_width) {
                return Err(invalid(format!(
                    "DAC {:?} default {} exceeds {} bits",
                    d.signal, d.default_count, value_width
                )));
            }
            let info = DacInfo {
                reg: d.reg,
                default_count: d.default_count,
            };
            if dacs.insert(d.signal, info).is_some() {
                return Err(invalid(format!("DAC {:?} listed twice", d.signal)));
            }
        }

        let misc: HashMap<_, _> = spec.misc.iter().copied().collect();

        let mut horn_order: Vec<_> = horn.keys().copied().collect();
        horn_order.sort();

        tracing::info!(
            "Loaded hardware layout {} ({} horn leaves, {} funnel leaves)",
            spec.version,
            horn.len(),
            funnel.len()
        );

        Ok(Self {
            version: spec.version,
            horn,
            funnel,
            horn_order,
            memories,
            registers,
            dacs,
            misc,
        })
    }

    /// The validated layout of BD revision 1
    pub fn bd_v1() -> Result<Self> {
        Self::from_spec(&BD_V1)
    }

    /// Version string of the static table this layout was built from
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Leaf information for a horn or funnel leaf
    pub fn leaf<L: LeafId>(&self, leaf: L) -> Result<&LeafInfo> {
        leaf.info(self)
    }

    /// Route of a horn or funnel leaf (`RouteFor`)
    pub fn route_for<L: LeafId>(&self, leaf: L) -> Result<RouteEntry> {
        Ok(leaf.info(self)?.route)
    }

    /// Serialization factor of a leaf (`SerializationFor`)
    pub fn serialization_for<L: LeafId>(&self, leaf: L) -> Result<u32> {
        Ok(leaf.info(self)?.serialization_factor)
    }

    /// Physical transfer width of a leaf (`WidthFor`)
    pub fn width_for<L: LeafId>(&self, leaf: L) -> Result<u32> {
        Ok(leaf.info(self)?.data_width)
    }

    /// Width that does not belong to a single leaf
    pub fn misc_width(&self, id: MiscWidth) -> Option<u32> {
        self.misc.get(&id).copied()
    }

    /// Memory capacity in words (`SizeOf`)
    pub fn size_of(&self, mem: MemId) -> Result<usize> {
        Ok(self.mem_info(mem)?.size)
    }

    /// Full memory description
    pub fn mem_info(&self, mem: MemId) -> Result<&MemInfo> {
        self.memories.get(&mem).ok_or(DriverError::UnknownMemory(mem))
    }

    /// Horn leaf used to program a memory
    pub fn prog_leaf_for(&self, mem: MemId) -> Result<HornLeaf> {
        Ok(self.mem_info(mem)?.prog_leaf)
    }

    /// Funnel leaf a memory dumps through, if it can be dumped
    pub fn dump_leaf_for(&self, mem: MemId) -> Result<Option<FunnelLeaf>> {
        Ok(self.mem_info(mem)?.dump_leaf)
    }

    /// Horn leaf that programs a register
    pub fn leaf_for_reg(&self, reg: RegId) -> Result<HornLeaf> {
        self.registers
            .get(&reg)
            .copied()
            .ok_or(DriverError::UnknownRegister(reg))
    }

    /// Word layout of a register
    pub fn reg_layout(&self, reg: RegId) -> Result<&'static WordLayout> {
        let leaf = self.leaf_for_reg(reg)?;
        Ok(self.leaf(leaf)?.layout)
    }

    /// Register that holds a DAC
    pub fn reg_for_dac(&self, dac: DacSignal) -> Option<RegId> {
        self.dacs.get(&dac).map(|d| d.reg)
    }

    /// Default count programmed into a DAC
    pub fn dac_default(&self, dac: DacSignal) -> Option<u64> {
        self.dacs.get(&dac).map(|d| d.default_count)
    }

    /// Horn leaves in id order
    pub fn horn_leaves(&self) -> &[HornLeaf] {
        &self.horn_order
    }

    /// Funnel leaves in id order
    pub fn funnel_leaves(&self) -> Vec<FunnelLeaf> {
        let mut leaves: Vec<_> = self.funnel.keys().copied().collect();
        leaves.sort();
        leaves
    }

    /// Traffic-control registers present in this layout
    pub fn traffic_registers(&self) -> Vec<RegId> {
        RegId::TRAFFIC_CONTROL
            .iter()
            .copied()
            .filter(|r| self.registers.contains_key(r))
            .collect()
    }

    /// Identify the horn leaf a packed horn word is addressed to
    ///
    /// Routes are validated to be unambiguous, so at most one leaf matches.
    pub fn horn_leaf_for_word(&self, word: u64) -> Option<HornLeaf> {
        self.horn_order
            .iter()
            .copied()
            .find(|leaf| self.horn[leaf].route.matches(word))
    }

    /// Serializable summary of the routing tables
    pub fn report(&self) -> LayoutReport {
        let horn = self
            .horn_order
            .iter()
            .map(|leaf| LeafReport::new(format!("{:?}", leaf), &self.horn[leaf]))
            .collect();
        let funnel = self
            .funnel_leaves()
            .iter()
            .map(|leaf| LeafReport::new(format!("{:?}", leaf), &self.funnel[leaf]))
            .collect();
        let mut memories: Vec<_> = self
            .memories
            .iter()
            .map(|(mem, info)| MemReport {
                mem: *mem,
                size: info.size,
                layout: info.layout.name,
                word_width: info.layout.width(),
                prog_leaf: info.prog_leaf,
                dump_leaf: info.dump_leaf,
            })
            .collect();
        memories.sort_by_key(|m| m.mem);

        LayoutReport {
            version: self.version,
            horn,
            funnel,
            memories,
        }
    }
}

fn invalid(message: String) -> DriverError {
    DriverError::InvalidLayout(message)
}

/// Validate one tree's leaf table and index it by leaf id
fn build_tree<L: LeafId>(
    specs: &[LeafSpec<L>],
    tree: &str,
    wire_width: impl Fn(&LeafInfo) -> u32,
) -> Result<HashMap<L, LeafInfo>> {
    let mut leaves: HashMap<L, LeafInfo> = HashMap::with_capacity(specs.len());

    for spec in specs {
        let route = RouteEntry::from_path(spec.path)?;
        if spec.data_width == 0 || spec.serialization == 0 {
            return Err(invalid(format!(
                "{} leaf {:?} has zero data width or serialization",
                tree, spec.leaf
            )));
        }
        let chunk_width = spec
            .data_width
            .checked_mul(spec.serialization)
            .filter(|&w| w <= WORD_BITS)
            .ok_or_else(|| {
                invalid(format!(
                    "{} leaf {:?} chunk of {}x{} bits exceeds a word",
                    tree, spec.leaf, spec.serialization, spec.data_width
                ))
            })?;
        if spec.layout.width() > chunk_width {
            return Err(invalid(format!(
                "{} leaf {:?} layout {} is {} bits, chunk is {}",
                tree,
                spec.leaf,
                spec.layout.name,
                spec.layout.width(),
                chunk_width
            )));
        }

        let info = LeafInfo {
            component_type: spec.component,
            component_index: spec.index,
            route,
            data_width: spec.data_width,
            serialization_factor: spec.serialization,
            chunk_width,
            layout: spec.layout,
            description: spec.description,
        };
        if wire_width(&info) > WORD_BITS {
            return Err(invalid(format!(
                "{} leaf {:?} needs {} bits on the wire",
                tree,
                spec.leaf,
                wire_width(&info)
            )));
        }

        for (other, other_info) in &leaves {
            if route.conflicts_with(&other_info.route) {
                return Err(DriverError::InvalidRoute(format!(
                    "{} routes of {:?} and {:?} are ambiguous",
                    tree, spec.leaf, other
                )));
            }
        }

        if leaves.insert(spec.leaf, info).is_some() {
            return Err(invalid(format!("{} leaf {:?} listed twice", tree, spec.leaf)));
        }
    }

    Ok(leaves)
}

// ==================== Reports ====================

/// Serializable summary of one leaf
#[derive(Debug, Clone, Serialize)]
pub struct LeafReport {
    pub leaf: String,
    pub component: ComponentType,
    pub component_index: u32,
    pub route_value: u64,
    pub route_length: u32,
    pub data_width: u32,
    pub serialization_factor: u32,
    pub chunk_width: u32,
    pub layout: &'static str,
    pub description: &'static str,
}

impl LeafReport {
    fn new(leaf: String, info: &LeafInfo) -> Self {
        Self {
            leaf,
            component: info.component_type,
            component_index: info.component_index,
            route_value: info.route.value,
            route_length: info.route.length,
            data_width: info.data_width,
            serialization_factor: info.serialization_factor,
            chunk_width: info.chunk_width,
            layout: info.layout.name,
            description: info.description,
        }
    }
}

/// Serializable summary of one memory
#[derive(Debug, Clone, Serialize)]
pub struct MemReport {
    pub mem: MemId,
    pub size: usize,
    pub layout: &'static str,
    pub word_width: u32,
    pub prog_leaf: HornLeaf,
    pub dump_leaf: Option<FunnelLeaf>,
}

/// Serializable summary of a whole layout
#[derive(Debug, Clone, Serialize)]
pub struct LayoutReport {
    pub version: &'static str,
    pub horn: Vec<LeafReport>,
    pub funnel: Vec<LeafReport>,
    pub memories: Vec<MemReport>,
}

#[cfg(test)]
mod tests {
    use super::words::{DAC, TOGGLE};
    use super::*;

    #[test]
    fn test_bd_v1_is_valid() {
        let layout = HardwareLayout::bd_v1().unwrap();
        assert_eq!(layout.version(), "bd-v1");
        assert_eq!(layout.horn_leaves().len(), 29);
        assert_eq!(layout.funnel_leaves().len(), 12);
    }

    #[test]
    fn test_route_from_path_is_root_first() {
        let route = RouteEntry::from_path("10100").unwrap();
        assert_eq!(route.length, 5);
        assert_eq!(route.value, 0b00101);
        assert!(RouteEntry::from_path("10x").is_err());
    }

    #[test]
    fn test_route_entry_bounds() {
        assert!(RouteEntry::new(0b111, 3).is_ok());
        assert!(RouteEntry::new(0b1000, 3).is_err());
        assert!(RouteEntry::new(0, 65).is_err());
    }

    #[test]
    fn test_route_conflicts() {
        let a = RouteEntry::from_path("10").unwrap();
        let b = RouteEntry::from_path("101").unwrap();
        let c = RouteEntry::from_path("11").unwrap();
        assert!(a.conflicts_with(&b));
        assert!(b.conflicts_with(&a));
        assert!(!a.conflicts_with(&c));
    }

    #[test]
    fn test_lookups() {
        let layout = HardwareLayout::bd_v1().unwrap();

        assert_eq!(layout.route_for(HornLeaf::ProgTat1).unwrap().length, 4);
        assert_eq!(layout.serialization_for(HornLeaf::ProgAmmm).unwrap(), 2);
        assert_eq!(layout.serialization_for(FunnelLeaf::DumpAm).unwrap(), 2);
        assert_eq!(layout.width_for(FunnelLeaf::DumpAm).unwrap(), 19);
        assert_eq!(layout.leaf(FunnelLeaf::DumpAm).unwrap().chunk_width, 38);

        assert_eq!(layout.size_of(MemId::Am).unwrap(), 1024);
        assert_eq!(layout.size_of(MemId::Mm).unwrap(), 65536);
        assert_eq!(layout.prog_leaf_for(MemId::Mm).unwrap(), HornLeaf::ProgAmmm);
        assert_eq!(layout.dump_leaf_for(MemId::Pat).unwrap(), Some(FunnelLeaf::DumpPat));
        assert_eq!(layout.dump_leaf_for(MemId::FifoPg).unwrap(), None);

        assert_eq!(layout.leaf_for_reg(RegId::DacSynLk).unwrap(), HornLeaf::DacSynLk);
        assert_eq!(layout.reg_for_dac(DacSignal::SynLk), Some(RegId::DacSynLk));
        assert_eq!(layout.dac_default(DacSignal::DiffR), Some(500));
        assert!(std::ptr::eq(layout.reg_layout(RegId::DacDiffG).unwrap(), &DAC));
        assert!(std::ptr::eq(layout.reg_layout(RegId::TogglePreFifo).unwrap(), &TOGGLE));

        assert_eq!(layout.misc_width(MiscWidth::WireWord), Some(64));
        assert_eq!(layout.traffic_registers().len(), 4);
    }

    #[test]
    fn test_every_leaf_fits_the_wire() {
        let layout = HardwareLayout::bd_v1().unwrap();
        for &leaf in layout.horn_leaves() {
            let info = layout.leaf(leaf).unwrap();
            assert_eq!(info.chunk_width, info.data_width * info.serialization_factor);
            assert!(info.route.length + info.chunk_width <= WORD_BITS, "{:?}", leaf);
        }
        for leaf in layout.funnel_leaves() {
            let info = layout.leaf(leaf).unwrap();
            assert_eq!(info.chunk_width, info.data_width * info.serialization_factor);
            assert!(info.layout.width() <= info.chunk_width, "{:?}", leaf);
        }
    }

    #[test]
    fn test_horn_leaf_for_word() {
        let layout = HardwareLayout::bd_v1().unwrap();
        for &leaf in layout.horn_leaves() {
            let route = layout.route_for(leaf).unwrap();
            let word = (0x5a5 << route.length) | route.value;
            assert_eq!(layout.horn_leaf_for_word(word), Some(leaf));
        }
    }

    static BAD_HORN: [LeafSpec<HornLeaf>; 2] = [
        LeafSpec {
            leaf: HornLeaf::TogglePreFifo,
            path: "10",
            component: ComponentType::Register,
            index: 0,
            data_width: 2,
            serialization: 1,
            layout: &TOGGLE,
            description: "",
        },
        LeafSpec {
            leaf: HornLeaf::TogglePostFifo0,
            path: "101",
            component: ComponentType::Register,
            index: 1,
            data_width: 2,
            serialization: 1,
            layout: &TOGGLE,
            description: "",
        },
    ];

    static WIDE_HORN: [LeafSpec<HornLeaf>; 1] = [LeafSpec {
        leaf: HornLeaf::DacDiffG,
        path: "1",
        component: ComponentType::Dac,
        index: 0,
        data_width: 32,
        serialization: 2,
        layout: &DAC,
        description: "",
    }];

    fn spec_with_horn(horn: &'static [LeafSpec<HornLeaf>]) -> ChipSpec {
        ChipSpec {
            version: "test",
            horn,
            funnel: &[],
            memories: &[],
            registers: &[],
            dacs: &[],
            misc: &[],
        }
    }

    #[test]
    fn test_ambiguous_routes_rejected() {
        let err = HardwareLayout::from_spec(&spec_with_horn(&BAD_HORN)).unwrap_err();
        assert!(matches!(err, DriverError::InvalidRoute(_)));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_wire_overflow_rejected() {
        let err = HardwareLayout::from_spec(&spec_with_horn(&WIDE_HORN)).unwrap_err();
        assert!(matches!(err, DriverError::InvalidLayout(_)));
    }

    #[test]
    fn test_missing_leaf_lookup() {
        let layout = HardwareLayout::from_spec(&spec_with_horn(&[])).unwrap();
        assert!(matches!(
            layout.route_for(HornLeaf::NeuronInject),
            Err(DriverError::UnknownHornLeaf(HornLeaf::NeuronInject))
        ));
        assert!(matches!(
            layout.size_of(MemId::Am),
            Err(DriverError::UnknownMemory(MemId::Am))
        ));
    }

    #[test]
    fn test_report_serializes() {
        let layout = HardwareLayout::bd_v1().unwrap();
        let json = serde_json::to_string(&layout.report()).unwrap();
        assert!(json.contains("\"version\":\"bd-v1\""));
        assert!(json.contains("ProgAmmm"));
    }
}
