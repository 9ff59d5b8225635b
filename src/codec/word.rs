//! Typed words with named bit-field layouts
//!
//! A [`WordLayout`] is an ordered list of named fields. A [`BDWord`] pairs a
//! raw 64-bit value with the layout it should be interpreted with, so every
//! word that flows through the pipeline carries its own field description.

use super::{fits, max_val, pack, unpack, WORD_BITS};
use crate::error::{DriverError, Result};
use std::fmt;

/// A single named bit field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Field name (upper snake case by convention)
    pub name: &'static str,
    /// Width in bits
    pub width: u32,
}

impl Field {
    /// Create a field description
    pub const fn new(name: &'static str, width: u32) -> Self {
        Self { name, width }
    }
}

/// Ordered field layout of a word, first field in the most significant bits
#[derive(Debug, PartialEq, Eq)]
pub struct WordLayout {
    /// Layout name used in diagnostics
    pub name: &'static str,
    /// Fields, MSB-first
    pub fields: &'static [Field],
}

impl WordLayout {
    /// Create a layout
    pub const fn new(name: &'static str, fields: &'static [Field]) -> Self {
        Self { name, fields }
    }

    /// Total width of all fields
    pub const fn width(&self) -> u32 {
        let mut total = 0;
        let mut i = 0;
        while i < self.fields.len() {
            total += self.fields[i].width;
            i += 1;
        }
        total
    }

    /// Field widths in layout order
    pub fn widths(&self) -> Vec<u32> {
        self.fields.iter().map(|f| f.width).collect()
    }

    /// Index of a field by name
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == field)
    }

    /// Pack named field values into a raw word
    ///
    /// Fields that are not mentioned are zero. Unknown names and values that
    /// do not fit their field are rejected.
    pub fn pack(&self, values: &[(&str, u64)]) -> Result<u64> {
        let mut ordered = vec![0u64; self.fields.len()];
        for &(name, value) in values {
            let idx = self.index_of(name).ok_or_else(|| DriverError::UnknownField {
                layout: self.name,
                field: name.to_string(),
            })?;
            let width = self.fields[idx].width;
            if !fits(value, width) {
                return Err(DriverError::FieldOverflow {
                    field: format!("{}.{}", self.name, name),
                    value,
                    width,
                });
            }
            ordered[idx] = value;
        }
        pack(&ordered, &self.widths())
    }

    /// Extract one named field from a raw word
    pub fn extract(&self, raw: u64, field: &str) -> Result<u64> {
        let idx = self.index_of(field).ok_or_else(|| DriverError::UnknownField {
            layout: self.name,
            field: field.to_string(),
        })?;
        let values = unpack(raw, &self.widths())?;
        Ok(values[idx])
    }

    /// Whether `raw` carries no bits above this layout's width
    pub fn accepts(&self, raw: u64) -> bool {
        self.width() <= WORD_BITS && fits(raw, self.width())
    }

    /// Largest raw value this layout can hold
    pub fn max_raw(&self) -> u64 {
        max_val(self.width())
    }
}

/// A raw word interpreted through a field layout
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BDWord {
    layout: &'static WordLayout,
    value: u64,
}

impl BDWord {
    /// Pack named field values into a word (`Word.Create`)
    pub fn create(layout: &'static WordLayout, values: &[(&str, u64)]) -> Result<Self> {
        let value = layout.pack(values)?;
        Ok(Self { layout, value })
    }

    /// Wrap an already packed raw value, checking it fits the layout
    pub fn from_raw(layout: &'static WordLayout, value: u64) -> Result<Self> {
        if !layout.accepts(value) {
            return Err(DriverError::FieldOverflow {
                field: layout.name.to_string(),
                value,
                width: layout.width(),
            });
        }
        Ok(Self { layout, value })
    }

    /// Read one field (`Word.At`)
    pub fn at(&self, field: &str) -> Result<u64> {
        self.layout.extract(self.value, field)
    }

    /// All fields as `(name, value)` pairs in layout order
    pub fn fields(&self) -> Vec<(&'static str, u64)> {
        // The constructor guarantees the value fits, so unpacking cannot fail.
        let values = unpack(self.value, &self.layout.widths()).unwrap_or_default();
        self.layout
            .fields
            .iter()
            .map(|f| f.name)
            .zip(values)
            .collect()
    }

    /// Raw packed value
    pub fn raw(&self) -> u64 {
        self.value
    }

    /// Layout this word is interpreted with
    pub fn layout(&self) -> &'static WordLayout {
        self.layout
    }

    /// Width of this word's layout
    pub fn width(&self) -> u32 {
        self.layout.width()
    }
}

impl fmt::Debug for BDWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(self.layout.name);
        for (name, value) in self.fields() {
            s.field(name, &value);
        }
        s.finish()
    }
}

/// Layout used for words that have no field structure
pub static RAW_WORD: WordLayout = WordLayout::new("RAW", &[Field::new("VALUE", WORD_BITS)]);

impl Default for BDWord {
    fn default() -> Self {
        Self {
            layout: &RAW_WORD,
            value: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static DAC: WordLayout = WordLayout::new(
        "DAC",
        &[Field::new("DAC_TO_ADC_CONN", 1), Field::new("DAC_VALUE", 10)],
    );

    #[test]
    fn test_layout_width() {
        assert_eq!(DAC.width(), 11);
        assert_eq!(DAC.widths(), vec![1, 10]);
        assert_eq!(DAC.max_raw(), 0x7ff);
    }

    #[test]
    fn test_create_and_read_back() {
        let word = BDWord::create(&DAC, &[("DAC_VALUE", 512), ("DAC_TO_ADC_CONN", 1)]).unwrap();
        assert_eq!(word.raw(), (1 << 10) | 512);
        assert_eq!(word.at("DAC_VALUE").unwrap(), 512);
        assert_eq!(word.at("DAC_TO_ADC_CONN").unwrap(), 1);
        assert_eq!(word.fields(), vec![("DAC_TO_ADC_CONN", 1), ("DAC_VALUE", 512)]);
    }

    #[test]
    fn test_unmentioned_fields_are_zero() {
        let word = BDWord::create(&DAC, &[("DAC_VALUE", 3)]).unwrap();
        assert_eq!(word.at("DAC_TO_ADC_CONN").unwrap(), 0);
    }

    #[test]
    fn test_create_rejects_overflow() {
        let err = BDWord::create(&DAC, &[("DAC_VALUE", 1024)]).unwrap_err();
        match err {
            DriverError::FieldOverflow { field, value, width } => {
                assert_eq!(field, "DAC.DAC_VALUE");
                assert_eq!(value, 1024);
                assert_eq!(width, 10);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unknown_field() {
        assert!(matches!(
            BDWord::create(&DAC, &[("GAIN", 1)]),
            Err(DriverError::UnknownField { layout: "DAC", .. })
        ));
        let word = BDWord::create(&DAC, &[]).unwrap();
        assert!(word.at("GAIN").is_err());
    }

    #[test]
    fn test_from_raw_checks_width() {
        assert!(BDWord::from_raw(&DAC, 0x7ff).is_ok());
        assert!(BDWord::from_raw(&DAC, 0x800).is_err());
    }

    #[test]
    fn test_debug_lists_fields() {
        let word = BDWord::create(&DAC, &[("DAC_VALUE", 7)]).unwrap();
        let text = format!("{:?}", word);
        assert!(text.starts_with("DAC"));
        assert!(text.contains("DAC_VALUE: 7"));
    }
}
