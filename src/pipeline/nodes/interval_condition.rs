//! IntervalCondition: one bit per input element, true if the element is
//! valid and inside its interval.

use crate::pipeline::node::{ConditionBehavior, Inputs, NodeBehavior};
use crate::pipeline::port::SlotDescriptor;
use serde::{Deserialize, Serialize};

/// Half-open interval `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value < self.max
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IntervalConditionConfig {
    pub intervals: Vec<Interval>,
}

#[derive(Debug, Clone)]
pub struct IntervalCondition {
    config: IntervalConditionConfig,
}

impl IntervalCondition {
    pub fn new(intervals: Vec<Interval>) -> Self {
        Self {
            config: IntervalConditionConfig { intervals },
        }
    }

    pub fn from_config(config: IntervalConditionConfig) -> Self {
        Self { config }
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.config.intervals
    }
}

impl NodeBehavior for IntervalCondition {
    fn class_name(&self) -> &'static str {
        "IntervalCondition"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.config)
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        vec![SlotDescriptor::both("input")]
    }
}

impl ConditionBehavior for IntervalCondition {
    fn bit_count(&self, inputs: &Inputs<'_>) -> usize {
        inputs.len_of(0)
    }

    fn evaluate(&mut self, inputs: &Inputs<'_>, bits: &mut [bool]) {
        let Some(input) = inputs.get(0) else {
            bits.fill(false);
            return;
        };

        for (i, bit) in bits.iter_mut().enumerate() {
            *bit = match (input.get(i), self.config.intervals.get(i)) {
                (Some(param), Some(interval)) => param.valid && interval.contains(param.value),
                _ => false,
            };
        }
    }
}
