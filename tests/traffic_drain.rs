//! Timing tests for the traffic drain window
//!
//! Run serially: they measure wall-clock intervals and must not compete
//! with each other for CPU.

mod common;

use bd_driver::layout::RegId;
use bd_driver::state::ChipStateModel;
use common::builders::LoopbackPipelineBuilder;
use serial_test::serial;
use std::thread;
use std::time::{Duration, Instant};

const DRAIN: Duration = Duration::from_millis(50);

fn model() -> ChipStateModel {
    ChipStateModel::new(common::bd_layout(), DRAIN, Duration::from_millis(1))
}

fn disable_all(model: &mut ChipStateModel, core: u32) {
    for reg in RegId::TRAFFIC_CONTROL {
        model.set_toggle(core, reg, false, false).unwrap();
    }
}

#[test]
#[serial]
fn test_off_only_after_drain_window() {
    let mut model = model();
    for reg in RegId::TRAFFIC_CONTROL {
        model.set_toggle(0, reg, true, false).unwrap();
    }
    assert!(!model.is_traffic_off(0));

    disable_all(&mut model, 0);
    thread::sleep(Duration::from_millis(10));
    assert!(!model.is_traffic_off(0));

    thread::sleep(Duration::from_millis(50));
    assert!(model.is_traffic_off(0));
}

#[test]
#[serial]
fn test_wait_returns_no_earlier_than_drain() {
    let mut model = model();
    let t0 = Instant::now();
    disable_all(&mut model, 0);
    model.wait_for_traffic_off(0);
    assert!(t0.elapsed() >= DRAIN);
}

#[test]
#[serial]
fn test_latest_off_transition_counts() {
    let mut model = model();
    disable_all(&mut model, 0);
    thread::sleep(Duration::from_millis(40));

    // Re-enable and disable one toggle: the window restarts from now.
    model.set_toggle(0, RegId::NeuronDumpToggle, true, false).unwrap();
    let t1 = Instant::now();
    model.set_toggle(0, RegId::NeuronDumpToggle, false, false).unwrap();

    thread::sleep(Duration::from_millis(20));
    assert!(!model.is_traffic_off(0));
    model.wait_for_traffic_off(0);
    assert!(t1.elapsed() >= DRAIN);
}

#[test]
#[serial]
fn test_bounded_wait() {
    let mut model = model();
    assert!(!model.wait_for_traffic_off_timeout(0, Duration::from_millis(20)));

    disable_all(&mut model, 0);
    assert!(!model.wait_for_traffic_off_timeout(0, Duration::from_millis(10)));
    assert!(model.wait_for_traffic_off_timeout(0, Duration::from_secs(1)));
}

#[test]
#[serial]
fn test_cores_drain_independently() {
    let mut model = model();
    disable_all(&mut model, 0);
    thread::sleep(DRAIN + Duration::from_millis(10));
    disable_all(&mut model, 1);

    assert!(model.is_traffic_off(0));
    assert!(!model.is_traffic_off(1));
}

#[test]
#[serial]
fn test_pipeline_disable_traffic() {
    let mut config = common::fast_config();
    config.traffic.drain_ms = 50;
    let mut pipeline = LoopbackPipelineBuilder::new().config(config).build();
    pipeline.start().unwrap();

    let t0 = Instant::now();
    pipeline.disable_traffic(0).unwrap();
    assert!(!pipeline.state().is_traffic_off(0));
    pipeline.state().wait_for_traffic_off(0);
    assert!(t0.elapsed() >= DRAIN);
    pipeline.stop().unwrap();
}
