//! ArrayConcat: joins any number of inputs into one array.
//!
//! The slot list is dynamic: slots can be appended and the last one removed,
//! down to a single slot.

use crate::pipeline::node::{Inputs, NodeBehavior, OperatorBehavior};
use crate::pipeline::parameter::ParameterVector;
use crate::pipeline::port::{InputType, SlotDescriptor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayConcatConfig {
    pub input_count: usize,
}

impl Default for ArrayConcatConfig {
    fn default() -> Self {
        Self { input_count: 1 }
    }
}

#[derive(Debug, Clone)]
pub struct ArrayConcat {
    config: ArrayConcatConfig,
}

impl ArrayConcat {
    pub fn new(input_count: usize) -> Self {
        Self {
            config: ArrayConcatConfig {
                input_count: input_count.max(1),
            },
        }
    }

    pub fn input_count(&self) -> usize {
        self.config.input_count
    }

    fn slot_descriptor(index: usize) -> SlotDescriptor {
        SlotDescriptor::named(format!("input{}", index), InputType::BOTH)
    }
}

impl NodeBehavior for ArrayConcat {
    fn class_name(&self) -> &'static str {
        "ArrayConcat"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.config)
    }

    fn output_count(&self) -> usize {
        1
    }

    fn output_name(&self, _index: usize) -> String {
        "concatenated".to_string()
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        (0..self.config.input_count)
            .map(Self::slot_descriptor)
            .collect()
    }
}

impl OperatorBehavior for ArrayConcat {
    fn begin_run(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let Some(out) = outputs.first_mut() else {
            return;
        };
        let total = (0..inputs.slot_count()).map(|s| inputs.len_of(s)).sum();
        out.resize(total);

        let mut offset = 0;
        for slot in 0..inputs.slot_count() {
            let Some(input) = inputs.get(slot) else {
                continue;
            };
            for (i, param) in input.iter().enumerate() {
                if let Some(dst) = out.get_mut(offset + i) {
                    dst.lower_limit = param.lower_limit;
                    dst.upper_limit = param.upper_limit;
                }
            }
            offset += input.len();
        }
        out.invalidate_all();
    }

    fn step(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let Some(out) = outputs.first_mut() else {
            return;
        };

        let mut offset = 0;
        for slot in 0..inputs.slot_count() {
            let Some(input) = inputs.get(slot) else {
                continue;
            };
            for (i, param) in input.iter().enumerate() {
                if let Some(dst) = out.get_mut(offset + i) {
                    *dst = *param;
                }
            }
            offset += input.len();
        }
    }

    fn add_input_slot(&mut self) -> Option<SlotDescriptor> {
        let descriptor = Self::slot_descriptor(self.config.input_count);
        self.config.input_count += 1;
        Some(descriptor)
    }

    fn remove_input_slot(&mut self) -> bool {
        if self.config.input_count <= 1 {
            return false;
        }
        self.config.input_count -= 1;
        true
    }
}
