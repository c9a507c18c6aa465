//! IndexSelector: pick one element out of an array.

use crate::pipeline::node::{Inputs, NodeBehavior, OperatorBehavior};
use crate::pipeline::parameter::ParameterVector;
use crate::pipeline::port::SlotDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexSelectorConfig {
    pub index: usize,
}

#[derive(Debug, Clone)]
pub struct IndexSelector {
    config: IndexSelectorConfig,
}

impl IndexSelector {
    pub fn new(index: usize) -> Self {
        Self {
            config: IndexSelectorConfig { index },
        }
    }

    pub fn from_config(config: IndexSelectorConfig) -> Self {
        Self { config }
    }

    pub fn index(&self) -> usize {
        self.config.index
    }
}

impl NodeBehavior for IndexSelector {
    fn class_name(&self) -> &'static str {
        "IndexSelector"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.config)
    }

    fn output_count(&self) -> usize {
        1
    }

    fn output_name(&self, _index: usize) -> String {
        "selected".to_string()
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        vec![SlotDescriptor::array("input")]
    }
}

impl OperatorBehavior for IndexSelector {
    fn begin_run(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let Some(out) = outputs.first_mut() else {
            return;
        };
        out.resize(1);
        let limits = inputs
            .get(0)
            .and_then(|input| input.get(self.config.index))
            .map(|p| (p.lower_limit, p.upper_limit))
            .unwrap_or((0.0, 0.0));
        out.set_limits(limits.0, limits.1);
        out.invalidate_all();
    }

    fn step(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let Some(out) = outputs.first_mut().and_then(|o| o.get_mut(0)) else {
            return;
        };
        match inputs.get(0).and_then(|input| input.get(self.config.index)) {
            Some(param) => *out = *param,
            None => out.invalidate(),
        }
    }
}
