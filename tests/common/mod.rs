//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use bd_driver::config::DriverConfig;
use bd_driver::layout::HardwareLayout;
use std::sync::Arc;
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Shared BD v1 layout
pub fn bd_layout() -> Arc<HardwareLayout> {
    Arc::new(HardwareLayout::bd_v1().expect("BD v1 table is valid"))
}

/// Config with a short poll tick so tests stop quickly
pub fn fast_config() -> DriverConfig {
    let mut config = DriverConfig::default();
    config.workers.poll_timeout_ms = 2;
    config.traffic.poll_interval_ms = 1;
    config
}
