//! PreviousValue: outputs the input of the previous event.

use crate::pipeline::node::{Inputs, NodeBehavior, OperatorBehavior};
use crate::pipeline::parameter::{Parameter, ParameterVector};
use crate::pipeline::port::SlotDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousValueConfig {
    /// Only remember valid inputs, so the output holds the last valid value.
    pub keep_valid: bool,
}

#[derive(Debug, Clone)]
pub struct PreviousValue {
    config: PreviousValueConfig,
    previous: Vec<Parameter>,
}

impl PreviousValue {
    pub fn new(config: PreviousValueConfig) -> Self {
        Self {
            config,
            previous: Vec::new(),
        }
    }

    pub fn config(&self) -> PreviousValueConfig {
        self.config
    }
}

impl NodeBehavior for PreviousValue {
    fn class_name(&self) -> &'static str {
        "PreviousValue"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.config)
    }

    fn output_count(&self) -> usize {
        1
    }

    fn output_name(&self, _index: usize) -> String {
        "previous".to_string()
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        vec![SlotDescriptor::both("input")]
    }
}

impl OperatorBehavior for PreviousValue {
    fn begin_run(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let len = inputs.len_of(0);
        self.previous.clear();
        if let Some(input) = inputs.get(0) {
            self.previous.extend(
                input
                    .iter()
                    .map(|p| Parameter::with_limits(p.lower_limit, p.upper_limit)),
            );
        }
        self.previous.resize(len, Parameter::default());

        if let Some(out) = outputs.first_mut() {
            out.resize(len);
            for (param, prev) in out.iter_mut().zip(&self.previous) {
                *param = *prev;
            }
        }
    }

    fn step(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let (Some(input), Some(out)) = (inputs.get(0), outputs.first_mut()) else {
            return;
        };

        for (i, (param, prev)) in out.iter_mut().zip(self.previous.iter_mut()).enumerate() {
            *param = *prev;
            if let Some(current) = input.get(i) {
                if current.valid || !self.config.keep_valid {
                    *prev = *current;
                }
            }
        }
    }
}
