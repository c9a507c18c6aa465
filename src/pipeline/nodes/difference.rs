//! Difference: element-wise `A - B`.

use crate::pipeline::node::{Inputs, NodeBehavior, OperatorBehavior};
use crate::pipeline::parameter::ParameterVector;
use crate::pipeline::port::SlotDescriptor;

#[derive(Debug, Clone, Default)]
pub struct Difference;

impl Difference {
    pub fn new() -> Self {
        Self
    }
}

impl NodeBehavior for Difference {
    fn class_name(&self) -> &'static str {
        "Difference"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        Ok(serde_json::Value::Object(serde_json::Map::new()))
    }

    fn output_count(&self) -> usize {
        1
    }

    fn output_name(&self, _index: usize) -> String {
        "difference".to_string()
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        vec![SlotDescriptor::both("A"), SlotDescriptor::both("B")]
    }
}

impl OperatorBehavior for Difference {
    fn begin_run(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let Some(out) = outputs.first_mut() else {
            return;
        };
        let (Some(a), Some(b)) = (inputs.get(0), inputs.get(1)) else {
            out.resize(0);
            return;
        };

        out.resize(a.len().min(b.len()));
        for (i, param) in out.iter_mut().enumerate() {
            if let (Some(pa), Some(pb)) = (a.get(i), b.get(i)) {
                param.lower_limit = pa.lower_limit - pb.upper_limit;
                param.upper_limit = pa.upper_limit - pb.lower_limit;
            }
        }
        out.invalidate_all();
    }

    fn step(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let (Some(a), Some(b), Some(out)) = (inputs.get(0), inputs.get(1), outputs.first_mut())
        else {
            return;
        };

        for (i, param) in out.iter_mut().enumerate() {
            match (a.get(i), b.get(i)) {
                (Some(pa), Some(pb)) if pa.valid && pb.valid => param.set(pa.value - pb.value),
                _ => param.invalidate(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::id::{NodeId, PipeId};
    use crate::pipeline::port::{Pipe, Slot};

    fn pipe(values: &[Option<f64>], lower: f64, upper: f64) -> Option<Pipe> {
        let mut pipe = Pipe::new(NodeId(0), 0, "in");
        pipe.params.resize(values.len());
        pipe.params.set_limits(lower, upper);
        for (param, value) in pipe.params.iter_mut().zip(values) {
            if let Some(v) = value {
                param.set(*v);
            }
        }
        Some(pipe)
    }

    fn slots(connected: usize) -> Vec<Slot> {
        Difference::new()
            .slot_descriptors()
            .iter()
            .enumerate()
            .map(|(i, desc)| {
                let mut slot = Slot::new(desc, NodeId(2), i);
                if i < connected {
                    slot.input = Some(PipeId(i as u32));
                }
                slot
            })
            .collect()
    }

    #[test]
    fn test_element_wise_difference() {
        let pipes = vec![
            pipe(&[Some(5.0), Some(3.0), None, Some(8.0)], 0.0, 10.0),
            pipe(&[Some(2.0), None, Some(1.0)], 0.0, 4.0),
        ];
        let slots = slots(2);
        let inputs = Inputs::new(&slots, &pipes);
        let mut node = Difference::new();
        let mut out = vec![ParameterVector::new("difference")];

        node.begin_run(&inputs, &mut out);
        assert_eq!(out[0].len(), 3);
        assert_eq!((out[0][0].lower_limit, out[0][0].upper_limit), (-4.0, 10.0));

        node.step(&inputs, &mut out);
        assert_eq!(out[0][0].get(), Some(3.0));
        assert_eq!(out[0][1].get(), None);
        assert_eq!(out[0][2].get(), None);
    }

    #[test]
    fn test_missing_input_gives_empty_output() {
        let pipes = vec![pipe(&[Some(1.0)], 0.0, 2.0)];
        let slots = slots(1);
        let mut out = vec![ParameterVector::with_size("difference", 4)];

        Difference::new().begin_run(&Inputs::new(&slots, &pipes), &mut out);
        assert!(out[0].is_empty());
    }
}
