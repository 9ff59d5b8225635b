//! Software mirror of commanded chip state
//!
//! [`ChipStateModel`] remembers, per core, what the driver last programmed
//! into registers, toggles and memories. Values that were never programmed
//! read back as `None`, never as zero.
//!
//! # Traffic drain
//!
//! Turning traffic off is not instantaneous: spikes already in flight keep
//! arriving for a while. A core only counts as traffic-off once every
//! traffic toggle is disabled *and* the drain window has elapsed since the
//! most recent enabled→disabled transition.
//!
//! ```text
//! set_toggle(.., false)   t0          t0 + drain
//!         |-----------------|------------------|----->
//!   is_traffic_off:       false             true
//! ```
//!
//! The model is single-writer: mutation needs `&mut self`, which the
//! pipeline only hands out to its owner.

use crate::codec::BDWord;
use crate::error::{DriverError, Result};
use crate::layout::{DacSignal, HardwareLayout, MemId, RegId};
use crate::types::CoreId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Last commanded state of one toggle register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleState {
    pub traffic_enabled: bool,
    pub dump_enabled: bool,
    /// When traffic last went from enabled (or unknown) to disabled
    pub last_off_change_time: Option<Instant>,
}

#[derive(Debug, Default)]
struct CoreState {
    registers: HashMap<RegId, BDWord>,
    toggles: HashMap<RegId, ToggleState>,
    memories: HashMap<MemId, Vec<Option<u64>>>,
}

/// Per-core mirror of registers, toggles and memories
#[derive(Debug)]
pub struct ChipStateModel {
    layout: Arc<HardwareLayout>,
    drain: Duration,
    poll_interval: Duration,
    cores: HashMap<CoreId, CoreState>,
}

impl ChipStateModel {
    pub fn new(layout: Arc<HardwareLayout>, drain: Duration, poll_interval: Duration) -> Self {
        Self {
            layout,
            drain,
            poll_interval,
            cores: HashMap::new(),
        }
    }

    pub fn drain_duration(&self) -> Duration {
        self.drain
    }

    /// Cores that have any recorded state
    pub fn cores(&self) -> Vec<CoreId> {
        let mut cores: Vec<_> = self.cores.keys().copied().collect();
        cores.sort_unstable();
        cores
    }

    fn core_mut(&mut self, core: CoreId) -> &mut CoreState {
        self.cores.entry(core).or_default()
    }

    // ==================== Registers ====================

    /// Record a register write
    ///
    /// The word must use the register's layout. Writes to a traffic toggle
    /// update its toggle state exactly like [`set_toggle`](Self::set_toggle).
    pub fn set_reg(&mut self, core: CoreId, reg: RegId, word: BDWord) -> Result<()> {
        let layout = self.layout.reg_layout(reg)?;
        if !std::ptr::eq(layout, word.layout()) {
            return Err(DriverError::InvalidLayout(format!(
                "{:?} expects a {} word, got {}",
                reg,
                layout.name,
                word.layout().name
            )));
        }
        if reg.is_traffic_control() {
            let traffic_enabled = word.at("TRAFFIC_ENABLE")? != 0;
            let dump_enabled = word.at("DUMP_ENABLE")? != 0;
            self.record_toggle(core, reg, traffic_enabled, dump_enabled);
        }
        self.core_mut(core).registers.insert(reg, word);
        Ok(())
    }

    /// Last value written to a register, `None` if never programmed
    pub fn get_reg(&self, core: CoreId, reg: RegId) -> Option<BDWord> {
        self.cores.get(&core)?.registers.get(&reg).copied()
    }

    /// Program a DAC count through its register
    pub fn set_dac(&mut self, core: CoreId, dac: DacSignal, count: u64) -> Result<BDWord> {
        let reg = self
            .layout
            .reg_for_dac(dac)
            .ok_or_else(|| DriverError::InvalidLayout(format!("no register for {:?}", dac)))?;
        let word = BDWord::create(self.layout.reg_layout(reg)?, &[("DAC_VALUE", count)])?;
        self.set_reg(core, reg, word)?;
        Ok(word)
    }

    // ==================== Toggles ====================

    /// Record a toggle write and return the packed register word
    ///
    /// Disabling traffic on a toggle that was enabled, or never set, stamps
    /// the drain window.
    pub fn set_toggle(
        &mut self,
        core: CoreId,
        reg: RegId,
        traffic_enabled: bool,
        dump_enabled: bool,
    ) -> Result<BDWord> {
        if !reg.is_traffic_control() {
            return Err(DriverError::NotAToggle(reg));
        }
        let word = BDWord::create(
            self.layout.reg_layout(reg)?,
            &[
                ("TRAFFIC_ENABLE", u64::from(traffic_enabled)),
                ("DUMP_ENABLE", u64::from(dump_enabled)),
            ],
        )?;
        self.set_reg(core, reg, word)?;
        Ok(word)
    }

    fn record_toggle(&mut self, core: CoreId, reg: RegId, traffic_enabled: bool, dump_enabled: bool) {
        let state = self.core_mut(core);
        let previous = state.toggles.get(&reg).copied();
        let was_enabled = previous.map_or(true, |t| t.traffic_enabled);
        let last_off_change_time = if was_enabled && !traffic_enabled {
            tracing::debug!("Core {} {:?} traffic off, draining", core, reg);
            Some(Instant::now())
        } else {
            previous.and_then(|t| t.last_off_change_time)
        };

        state.toggles.insert(
            reg,
            ToggleState {
                traffic_enabled,
                dump_enabled,
                last_off_change_time,
            },
        );
    }

    pub fn toggle(&self, core: CoreId, reg: RegId) -> Option<ToggleState> {
        self.cores.get(&core)?.toggles.get(&reg).copied()
    }

    /// Whether traffic on `core` is off and fully drained
    ///
    /// A core whose toggles were never all commanded off is not off.
    pub fn is_traffic_off(&self, core: CoreId) -> bool {
        let Some(state) = self.cores.get(&core) else {
            return false;
        };

        let mut latest: Option<Instant> = None;
        for reg in self.layout.traffic_registers() {
            match state.toggles.get(&reg) {
                Some(toggle) if !toggle.traffic_enabled => {
                    latest = latest.max(toggle.last_off_change_time);
                }
                _ => return false,
            }
        }
        latest.map_or(true, |t| t.elapsed() >= self.drain)
    }

    /// Block until [`is_traffic_off`](Self::is_traffic_off) holds
    ///
    /// Polls every `poll_interval`. Never returns if traffic is not being
    /// turned off; see [`wait_for_traffic_off_timeout`](Self::wait_for_traffic_off_timeout).
    pub fn wait_for_traffic_off(&self, core: CoreId) {
        while !self.is_traffic_off(core) {
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Bounded [`wait_for_traffic_off`](Self::wait_for_traffic_off)
    ///
    /// Returns whether traffic was off before `timeout` elapsed.
    pub fn wait_for_traffic_off_timeout(&self, core: CoreId, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_traffic_off(core) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(self.poll_interval.min(deadline - now));
        }
    }

    // ==================== Memories ====================

    /// Record a write of `values` starting at `start`
    pub fn set_mem(&mut self, core: CoreId, mem: MemId, start: usize, values: &[u64]) -> Result<()> {
        let info = self.layout.mem_info(mem)?;
        let (size, word_layout) = (info.size, info.layout);
        let end = check_range(mem, start, values.len(), size)?;
        for &value in values {
            BDWord::from_raw(word_layout, value)
                .map_err(|e| e.with_context(format!("{:?} write at {}", mem, start)))?;
        }

        let memory = self
            .core_mut(core)
            .memories
            .entry(mem)
            .or_insert_with(|| vec![None; size]);
        for (slot, &value) in memory[start..end].iter_mut().zip(values) {
            *slot = Some(value);
        }
        Ok(())
    }

    /// Read back `len` words from `start`
    ///
    /// `None` unless every word in the range was written (or the range is
    /// invalid).
    pub fn get_mem(&self, core: CoreId, mem: MemId, start: usize, len: usize) -> Option<Vec<BDWord>> {
        let info = self.layout.mem_info(mem).ok()?;
        let end = check_range(mem, start, len, info.size).ok()?;
        let memory = self.cores.get(&core)?.memories.get(&mem)?;
        memory[start..end]
            .iter()
            .map(|slot| slot.and_then(|v| BDWord::from_raw(info.layout, v).ok()))
            .collect()
    }
}

fn check_range(mem: MemId, start: usize, len: usize, size: usize) -> Result<usize> {
    match start.checked_add(len) {
        Some(end) if end <= size => Ok(end),
        _ => Err(DriverError::MemoryRange {
            mem,
            start,
            end: start.saturating_add(len),
            size,
        }),
    }
}
