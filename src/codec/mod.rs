//! Bit-field word codec
//!
//! Pure, stateless functions that pack integer fields of given bit widths
//! into one 64-bit word and unpack them again. These are the single source
//! of truth for every word layout in the driver: leaf payloads, register
//! words, memory words and the horn/funnel wire words are all expressed as
//! ordered `(field, width)` lists consumed by [`pack`] / [`unpack`].
//!
//! # Bit order
//!
//! Packing is MSB-first: the first value occupies the highest-order bits of
//! the packed slice and subsequent values follow towards bit 0.
//!
//! ```text
//! pack([0b1, 0b01, 0b110], [1, 2, 3]) = 0b1_01_110
//! ```
//!
//! Values are never truncated. A value that does not fit its width is an
//! error, as is a total width above [`WORD_BITS`].

pub mod word;

pub use word::{BDWord, Field, WordLayout};

use crate::error::{DriverError, Result};

/// Width of every packed word in bits
pub const WORD_BITS: u32 = 64;

/// Largest value representable in `width` bits (`2^width - 1`)
///
/// Widths of 64 or more saturate to `u64::MAX`.
pub const fn max_val(width: u32) -> u64 {
    if width >= WORD_BITS {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Whether `value` fits in `width` bits
#[inline]
pub const fn fits(value: u64, width: u32) -> bool {
    value <= max_val(width)
}

/// Sum of `widths`, rejecting totals wider than a word
pub fn total_width(widths: &[u32]) -> Result<u32> {
    let total: u64 = widths.iter().map(|&w| u64::from(w)).sum();
    if total > u64::from(WORD_BITS) {
        return Err(DriverError::WidthOverflow {
            total: u32::try_from(total).unwrap_or(u32::MAX),
            max: WORD_BITS,
        });
    }
    Ok(total as u32)
}

/// Pack `values` into one word, MSB-first
///
/// `values[i]` must fit in `widths[i]` bits.
pub fn pack(values: &[u64], widths: &[u32]) -> Result<u64> {
    if values.len() != widths.len() {
        return Err(DriverError::FieldCountMismatch {
            values: values.len(),
            widths: widths.len(),
        });
    }
    total_width(widths)?;

    let mut word = 0u64;
    for (i, (&value, &width)) in values.iter().zip(widths).enumerate() {
        if !fits(value, width) {
            return Err(DriverError::FieldOverflow {
                field: format!("#{}", i),
                value,
                width,
            });
        }
        word = shift_in(word, value, width);
    }
    Ok(word)
}

/// Unpack `widths.len()` fields from `word`, in the same order [`pack`] uses
///
/// The word must not carry bits above the total width.
pub fn unpack(word: u64, widths: &[u32]) -> Result<Vec<u64>> {
    let total = total_width(widths)?;
    if !fits(word, total) {
        return Err(DriverError::FieldOverflow {
            field: "word".to_string(),
            value: word,
            width: total,
        });
    }

    let mut values = vec![0u64; widths.len()];
    let mut rest = word;
    for (slot, &width) in values.iter_mut().zip(widths).rev() {
        *slot = rest & max_val(width);
        rest = if width >= WORD_BITS { 0 } else { rest >> width };
    }
    Ok(values)
}

/// Append `width` low bits of `value` below `word`
#[inline]
fn shift_in(word: u64, value: u64, width: u32) -> u64 {
    if width == 0 {
        word
    } else if width >= WORD_BITS {
        value
    } else {
        (word << width) | value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_max_val() {
        assert_eq!(max_val(0), 0);
        assert_eq!(max_val(1), 1);
        assert_eq!(max_val(10), 1023);
        assert_eq!(max_val(64), u64::MAX);
    }

    #[test]
    fn test_pack_is_msb_first() {
        let word = pack(&[0b1, 0b01, 0b110], &[1, 2, 3]).unwrap();
        assert_eq!(word, 0b1_01_110);
    }

    #[test]
    fn test_unpack_known_word() {
        let fields = unpack(0b1_01_110, &[1, 2, 3]).unwrap();
        assert_eq!(fields, vec![0b1, 0b01, 0b110]);
    }

    #[test]
    fn test_full_width_single_field() {
        let word = pack(&[u64::MAX], &[64]).unwrap();
        assert_eq!(word, u64::MAX);
        assert_eq!(unpack(word, &[64]).unwrap(), vec![u64::MAX]);
    }

    #[test]
    fn test_zero_width_fields_are_empty() {
        let word = pack(&[0, 5, 0], &[0, 3, 0]).unwrap();
        assert_eq!(word, 5);
        assert_eq!(unpack(word, &[0, 3, 0]).unwrap(), vec![0, 5, 0]);
    }

    #[test]
    fn test_pack_rejects_overflow() {
        let err = pack(&[4], &[2]).unwrap_err();
        assert!(matches!(err, DriverError::FieldOverflow { value: 4, width: 2, .. }));
    }

    #[test]
    fn test_pack_rejects_wide_layout() {
        let err = pack(&[0, 0], &[40, 25]).unwrap_err();
        assert!(matches!(err, DriverError::WidthOverflow { total: 65, max: 64 }));
    }

    #[test]
    fn test_pack_rejects_count_mismatch() {
        let err = pack(&[1, 2], &[4]).unwrap_err();
        assert!(matches!(err, DriverError::FieldCountMismatch { values: 2, widths: 1 }));
    }

    #[test]
    fn test_unpack_rejects_stray_high_bits() {
        assert!(unpack(0x100, &[4, 4]).is_err());
    }

    fn layout_strategy() -> impl Strategy<Value = (Vec<u32>, Vec<u64>)> {
        prop::collection::vec(0u32..=16, 1..=4)
            .prop_flat_map(|widths| {
                let values: Vec<_> = widths.iter().map(|&w| 0..=max_val(w)).collect();
                (Just(widths), values)
            })
    }

    proptest! {
        #[test]
        fn test_round_trip((widths, values) in layout_strategy()) {
            let word = pack(&values, &widths).unwrap();
            prop_assert_eq!(unpack(word, &widths).unwrap(), values);
        }

        #[test]
        fn test_overflow_is_rejected(width in 0u32..63, excess in 0u64..1024) {
            let value = max_val(width) + 1 + excess;
            prop_assert!(pack(&[value], &[width]).is_err());
        }
    }
}
