//! RetainValid: holds the most recent valid value of each element.
//!
//! Unlike `PreviousValue` the output follows the current event: a valid
//! input is passed through immediately, an invalid one leaves the last valid
//! value in place.

use crate::pipeline::node::{Inputs, NodeBehavior, OperatorBehavior};
use crate::pipeline::parameter::ParameterVector;
use crate::pipeline::port::SlotDescriptor;

#[derive(Debug, Clone, Default)]
pub struct RetainValid;

impl RetainValid {
    pub fn new() -> Self {
        Self
    }
}

impl NodeBehavior for RetainValid {
    fn class_name(&self) -> &'static str {
        "RetainValid"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        Ok(serde_json::Value::Object(serde_json::Map::new()))
    }

    fn output_count(&self) -> usize {
        1
    }

    fn output_name(&self, _index: usize) -> String {
        "retained".to_string()
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        vec![SlotDescriptor::both("input")]
    }
}

impl OperatorBehavior for RetainValid {
    fn begin_run(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let Some(out) = outputs.first_mut() else {
            return;
        };
        let Some(input) = inputs.get(0) else {
            out.resize(0);
            return;
        };

        // Values retained from a previous run stay as long as the size holds.
        let keep = out.len() == input.len();
        out.resize(input.len());
        for (param, limits) in out.iter_mut().zip(input.iter()) {
            param.lower_limit = limits.lower_limit;
            param.upper_limit = limits.upper_limit;
        }
        if !keep {
            out.invalidate_all();
        }
    }

    fn step(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let (Some(input), Some(out)) = (inputs.get(0), outputs.first_mut()) else {
            return;
        };
        for (param, current) in out.iter_mut().zip(input.iter()) {
            if current.valid {
                *param = *current;
            }
        }
    }
}
