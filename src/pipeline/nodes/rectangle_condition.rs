//! RectangleCondition: a single bit, true if both inputs are valid and the
//! point lies inside the rectangle.

use crate::pipeline::node::{ConditionBehavior, Inputs, NodeBehavior};
use crate::pipeline::nodes::interval_condition::Interval;
use crate::pipeline::port::SlotDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectangleConditionConfig {
    pub x: Interval,
    pub y: Interval,
}

#[derive(Debug, Clone)]
pub struct RectangleCondition {
    config: RectangleConditionConfig,
}

impl RectangleCondition {
    pub fn new(x: Interval, y: Interval) -> Self {
        Self {
            config: RectangleConditionConfig { x, y },
        }
    }

    pub fn from_config(config: RectangleConditionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> RectangleConditionConfig {
        self.config
    }
}

impl NodeBehavior for RectangleCondition {
    fn class_name(&self) -> &'static str {
        "RectangleCondition"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.config)
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        vec![SlotDescriptor::value("x"), SlotDescriptor::value("y")]
    }
}

impl ConditionBehavior for RectangleCondition {
    fn bit_count(&self, _inputs: &Inputs<'_>) -> usize {
        1
    }

    fn evaluate(&mut self, inputs: &Inputs<'_>, bits: &mut [bool]) {
        let x = inputs.get(0).and_then(|i| i.first()).and_then(|p| p.get());
        let y = inputs.get(1).and_then(|i| i.first()).and_then(|p| p.get());

        let inside = match (x, y) {
            (Some(x), Some(y)) => self.config.x.contains(x) && self.config.y.contains(y),
            _ => false,
        };
        if let Some(bit) = bits.first_mut() {
            *bit = inside;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::{NodeId, PipeId};
    use crate::pipeline::port::{Pipe, Slot};

    fn evaluate(cond: &mut RectangleCondition, x: Option<f64>, y: Option<f64>) -> Vec<bool> {
        let pipes: Vec<Option<Pipe>> = [x, y]
            .iter()
            .map(|value| {
                let mut pipe = Pipe::new(NodeId(0), 0, "in");
                pipe.params.resize(1);
                if let Some(v) = value {
                    pipe.params[0].set(*v);
                }
                Some(pipe)
            })
            .collect();
        let slots: Vec<Slot> = cond
            .slot_descriptors()
            .iter()
            .enumerate()
            .map(|(i, desc)| {
                let mut slot = Slot::new(desc, NodeId(2), i);
                slot.input = Some(PipeId(i as u32));
                slot
            })
            .collect();
        let inputs = Inputs::new(&slots, &pipes);

        let mut bits = vec![false; cond.bit_count(&inputs)];
        cond.evaluate(&inputs, &mut bits);
        bits
    }

    #[test]
    fn test_single_bit_inside_rectangle() {
        let mut cond = RectangleCondition::new(Interval::new(0.0, 10.0), Interval::new(0.0, 5.0));

        assert_eq!(evaluate(&mut cond, Some(3.0), Some(4.0)), vec![true]);
        assert_eq!(evaluate(&mut cond, Some(3.0), Some(5.0)), vec![false]);
        assert_eq!(evaluate(&mut cond, Some(-1.0), Some(1.0)), vec![false]);
        assert_eq!(evaluate(&mut cond, None, Some(1.0)), vec![false]);
    }
}
