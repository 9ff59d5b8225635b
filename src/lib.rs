//! # bd-driver: BD neuromorphic chip driver core
//!
//! Translates typed, location-addressed requests into the BD chip's wire
//! format and the chip's raw output back into typed per-leaf records,
//! concurrently and without losing or reordering data under backpressure.
//!
//! ## Architecture
//!
//! - **Channels**: [`channel::BoundedChannel`] is the only handoff between
//!   threads; every stage blocks instead of dropping data
//! - **Codec**: MSB-first bit-field packing and typed [`codec::BDWord`]s
//! - **Layout**: the immutable horn/funnel routing tables of the chip,
//!   shared by every worker behind an `Arc`
//! - **Workers**: encoder, decoder and the two transport pumps, each a
//!   [`worker::ChunkProcessor`] driven by a generic [`worker::Worker`]
//! - **State**: [`state::ChipStateModel`] mirrors what was programmed and
//!   debounces traffic shutdown with a drain window
//!
//! ## Example
//!
//! ```ignore
//! use bd_driver::{
//!     config::DriverConfig,
//!     layout::{FunnelLeaf, HardwareLayout, HornLeaf},
//!     pipeline::Pipeline,
//!     transport::loopback,
//! };
//! use std::sync::Arc;
//!
//! let layout = Arc::new(HardwareLayout::bd_v1()?);
//! let (mut tx, rx) = loopback(layout.clone(), 0);
//! tx.route(HornLeaf::NeuronInject, FunnelLeaf::DumpPreFifo)?;
//!
//! let mut pipeline = Pipeline::new(layout, DriverConfig::default(), tx, rx)?;
//! pipeline.start()?;
//! pipeline.submit(&inputs)?;
//! let records = pipeline.recv_exact(FunnelLeaf::DumpPreFifo, inputs.len(), timeout)?;
//! ```

pub mod channel;
pub mod codec;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod state;
pub mod transport;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use channel::BoundedChannel;
pub use codec::{BDWord, WordLayout};
pub use config::DriverConfig;
pub use error::{DriverError, Result};
pub use layout::{FunnelLeaf, HardwareLayout, HornLeaf, MemId, RegId};
pub use pipeline::Pipeline;
pub use state::ChipStateModel;
pub use types::{CoreId, DecOutput, EncInput, HardwareLocation, RawTransfer};
