//! Test data builders for creating test objects

use bd_driver::codec::BDWord;
use bd_driver::layout::words::FIFO_TAG;
use bd_driver::layout::{FunnelLeaf, HardwareLayout, HornLeaf};
use bd_driver::pipeline::Pipeline;
use bd_driver::transport::loopback;
use bd_driver::types::{CoreId, EncInput};
use bd_driver::DriverConfig;
use std::sync::Arc;

/// Builder for a pipeline running over a loopback transport
pub struct LoopbackPipelineBuilder {
    layout: Arc<HardwareLayout>,
    config: DriverConfig,
    core_id: CoreId,
    routes: Vec<(HornLeaf, FunnelLeaf)>,
}

impl LoopbackPipelineBuilder {
    pub fn new() -> Self {
        Self {
            layout: super::bd_layout(),
            config: super::fast_config(),
            core_id: 0,
            routes: Vec::new(),
        }
    }

    pub fn config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn core(mut self, core_id: CoreId) -> Self {
        self.core_id = core_id;
        self
    }

    pub fn route(mut self, from: HornLeaf, to: FunnelLeaf) -> Self {
        self.routes.push((from, to));
        self
    }

    pub fn build(self) -> Pipeline {
        let (mut tx, rx) = loopback(self.layout.clone(), self.core_id);
        for (from, to) in self.routes {
            tx.route(from, to).expect("loopback route");
        }
        Pipeline::new(self.layout, self.config, tx, rx).expect("pipeline")
    }
}

/// Spike-tag inputs with distinct, recoverable payloads
pub fn spike_inputs(core_id: CoreId, count: u64) -> Vec<EncInput> {
    (0..count)
        .map(|i| {
            let word = BDWord::create(&FIFO_TAG, &[("COUNT", i % 512), ("TAG", i % 2048)])
                .expect("tag fits");
            EncInput::new(core_id, HornLeaf::NeuronInject, word)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spike_inputs_are_distinct() {
        let inputs = spike_inputs(0, 3);
        assert_eq!(inputs.len(), 3);
        assert_ne!(inputs[0].payload, inputs[1].payload);
    }
}
