//! Error handling for the BD driver
//!
//! This module defines the crate-wide error type and a Result alias.
//!
//! Errors fall into a few classes:
//!
//! - **Configuration errors** (unknown leaf, field overflow, bad route, ...)
//!   are fatal. They indicate a wrong layout table or a caller bug, and the
//!   driver never attempts a best-effort encoding when one occurs.
//! - **Transport / worker faults** surface hardware-side or thread-side failures.
//! - Channel timeouts are *not* errors: the channel API reports them as
//!   `false` / empty results so callers can retry.

use crate::layout::{FunnelLeaf, HornLeaf, MemId, RegId};
use thiserror::Error;

/// Main error type for BD driver operations
#[derive(Error, Debug)]
pub enum DriverError {
    /// A horn leaf is not present in the hardware layout
    #[error("Unknown horn leaf: {0:?}")]
    UnknownHornLeaf(HornLeaf),

    /// A funnel leaf is not present in the hardware layout
    #[error("Unknown funnel leaf: {0:?}")]
    UnknownFunnelLeaf(FunnelLeaf),

    /// A memory is not present in the hardware layout
    #[error("Unknown memory: {0:?}")]
    UnknownMemory(MemId),

    /// A register is not present in the hardware layout
    #[error("Unknown register: {0:?}")]
    UnknownRegister(RegId),

    /// A field name does not exist in a word layout
    #[error("Unknown field '{field}' in word layout {layout}")]
    UnknownField { layout: &'static str, field: String },

    /// A value does not fit its declared bit width
    #[error("Value {value:#x} does not fit field '{field}' ({width} bits)")]
    FieldOverflow {
        field: String,
        value: u64,
        width: u32,
    },

    /// The sum of field widths exceeds the word width
    #[error("Total width {total} exceeds {max}-bit word")]
    WidthOverflow { total: u32, max: u32 },

    /// Number of values does not match number of widths
    #[error("Got {values} values for {widths} field widths")]
    FieldCountMismatch { values: usize, widths: usize },

    /// A route entry or route path is malformed or ambiguous
    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    /// The static chip table is internally inconsistent
    #[error("Invalid hardware layout: {0}")]
    InvalidLayout(String),

    /// A toggle operation named a register that is not a traffic toggle
    #[error("Register {0:?} is not a traffic toggle")]
    NotAToggle(RegId),

    /// A memory access falls outside the memory
    #[error("Range {start}..{end} outside {mem:?} (size {size})")]
    MemoryRange {
        mem: MemId,
        start: usize,
        end: usize,
        size: usize,
    },

    /// Errors related to runtime configuration loading/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors reported by the byte transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// A background worker stopped because of a fatal error
    #[error("Worker '{worker}' faulted: {message}")]
    WorkerFault { worker: String, message: String },

    /// Bounded wait elapsed in a pipeline convenience call
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DriverError>,
    },
}

impl DriverError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DriverError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error belongs to the fatal configuration class
    ///
    /// Configuration errors mean the layout table or the caller is wrong;
    /// retrying can never succeed.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            DriverError::UnknownHornLeaf(_)
            | DriverError::UnknownFunnelLeaf(_)
            | DriverError::UnknownMemory(_)
            | DriverError::UnknownRegister(_)
            | DriverError::NotAToggle(_)
            | DriverError::UnknownField { .. }
            | DriverError::FieldOverflow { .. }
            | DriverError::WidthOverflow { .. }
            | DriverError::FieldCountMismatch { .. }
            | DriverError::InvalidRoute(_)
            | DriverError::InvalidLayout(_)
            | DriverError::MemoryRange { .. } => true,
            DriverError::WithContext { source, .. } => source.is_configuration_error(),
            _ => false,
        }
    }
}

/// Result type alias for BD driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::FieldOverflow {
            field: "DAC_VALUE".to_string(),
            value: 0x400,
            width: 10,
        };
        assert_eq!(
            err.to_string(),
            "Value 0x400 does not fit field 'DAC_VALUE' (10 bits)"
        );
    }

    #[test]
    fn test_error_with_context() {
        let err = DriverError::Config("chunk_size is zero".to_string());
        let with_ctx = err.with_context("Failed to load driver.toml");
        assert!(with_ctx.to_string().contains("Failed to load driver.toml"));
        assert!(with_ctx.to_string().contains("chunk_size is zero"));
    }

    #[test]
    fn test_configuration_class() {
        assert!(DriverError::UnknownHornLeaf(HornLeaf::NeuronInject).is_configuration_error());
        assert!(DriverError::WidthOverflow { total: 65, max: 64 }
            .with_context("packing")
            .is_configuration_error());
        assert!(!DriverError::Transport("link down".to_string()).is_configuration_error());
        assert!(!DriverError::Timeout("recv".to_string()).is_configuration_error());
    }
}
