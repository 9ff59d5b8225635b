//! Field layouts of every payload, register and memory word on the chip
//!
//! Fields are listed MSB-first, matching [`crate::codec::pack`].

use crate::codec::{Field, WordLayout};

// ── Spike / tag traffic ──────────────────────────────────────────────────────

/// Tag word entering the pre-FIFO (horn input, pre-FIFO dump)
pub static FIFO_TAG: WordLayout =
    WordLayout::new("FIFO_TAG", &[Field::new("COUNT", 9), Field::new("TAG", 11)]);

/// Tag word leaving the post-FIFOs
pub static POST_FIFO_TAG: WordLayout =
    WordLayout::new("POST_FIFO_TAG", &[Field::new("COUNT", 8), Field::new("TAG", 11)]);

/// Routed output tag (accumulator and TAT readout)
pub static OUTPUT_TAG: WordLayout = WordLayout::new(
    "OUTPUT_TAG",
    &[
        Field::new("COUNT", 9),
        Field::new("TAG", 11),
        Field::new("GLOBAL_ROUTE", 8),
    ],
);

/// Single-bit overflow indicator
pub static OVERFLOW: WordLayout = WordLayout::new("OVERFLOW", &[Field::new("OVERFLOW", 1)]);

// ── Memory entries ───────────────────────────────────────────────────────────

/// Accumulator memory entry
pub static AM_ENTRY: WordLayout = WordLayout::new(
    "AM_ENTRY",
    &[
        Field::new("ACCUMULATOR_VALUE", 15),
        Field::new("THRESHOLD", 3),
        Field::new("STOP", 1),
        Field::new("NEXT_ADDRESS", 19),
    ],
);

/// Main (weight) memory entry
pub static MM_ENTRY: WordLayout = WordLayout::new("MM_ENTRY", &[Field::new("WEIGHT", 8)]);

/// Pointer table entry
pub static PAT_ENTRY: WordLayout = WordLayout::new(
    "PAT_ENTRY",
    &[
        Field::new("AM_ADDRESS", 10),
        Field::new("MM_ADDRESS_LO", 8),
        Field::new("MM_ADDRESS_HI", 2),
    ],
);

/// Tag action table entry
pub static TAT_ENTRY: WordLayout = WordLayout::new(
    "TAT_ENTRY",
    &[
        Field::new("STOP", 1),
        Field::new("TYPE", 2),
        Field::new("DATA", 26),
    ],
);

// ── Memory programming words ─────────────────────────────────────────────────

/// Shared AM/MM programming word
pub static AMMM_PROG: WordLayout = WordLayout::new(
    "AMMM_PROG",
    &[
        Field::new("OPCODE", 2),
        Field::new("ADDRESS", 16),
        Field::new("DATA", 38),
    ],
);

/// PAT programming word
pub static PAT_PROG: WordLayout =
    WordLayout::new("PAT_PROG", &[Field::new("ADDRESS", 6), Field::new("DATA", 20)]);

/// TAT programming word
pub static TAT_PROG: WordLayout =
    WordLayout::new("TAT_PROG", &[Field::new("ADDRESS", 10), Field::new("DATA", 29)]);

/// Delay-compensation FIFO initialization word
pub static FIFO_INIT: WordLayout = WordLayout::new("FIFO_INIT", &[Field::new("ADDRESS", 11)]);

/// Head/tail FIFO initialization strobe
pub static FIFO_INIT_HT: WordLayout = WordLayout::new("FIFO_INIT_HT", &[Field::new("ENABLE", 1)]);

// ── Registers ────────────────────────────────────────────────────────────────

/// Traffic / dump toggle register
pub static TOGGLE: WordLayout = WordLayout::new(
    "TOGGLE",
    &[Field::new("TRAFFIC_ENABLE", 1), Field::new("DUMP_ENABLE", 1)],
);

/// FIFO read/write delay register
pub static DELAY: WordLayout = WordLayout::new(
    "DELAY",
    &[Field::new("READ_DELAY", 4), Field::new("WRITE_DELAY", 4)],
);

/// DAC register
pub static DAC: WordLayout = WordLayout::new(
    "DAC",
    &[Field::new("DAC_TO_ADC_CONN", 1), Field::new("DAC_VALUE", 10)],
);

/// ADC control register
pub static ADC: WordLayout = WordLayout::new(
    "ADC",
    &[
        Field::new("SMALL_CURRENT_0", 1),
        Field::new("SMALL_CURRENT_1", 1),
        Field::new("OUTPUT_ENABLE", 1),
    ],
);

/// Per-element neuron configuration write
pub static NEURON_CONFIG: WordLayout = WordLayout::new(
    "NEURON_CONFIG",
    &[
        Field::new("TILE_ID", 8),
        Field::new("ELEM_ID", 4),
        Field::new("CONFIG_VALUE", 6),
    ],
);
