//! AggregateOps: reduce an array to a single value.
//!
//! Only valid elements inside the optional thresholds take part. If none do,
//! the output is invalid.

use crate::pipeline::node::{Inputs, NodeBehavior, OperatorBehavior};
use crate::pipeline::parameter::ParameterVector;
use crate::pipeline::port::SlotDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AggregateOp {
    #[default]
    Sum,
    Mean,
    Sigma,
    Min,
    Max,
    Multiplicity,
    /// Index of the minimum element.
    MinX,
    /// Index of the maximum element.
    MaxX,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateConfig {
    pub op: AggregateOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_threshold: Option<f64>,
}

impl AggregateConfig {
    pub fn new(op: AggregateOp) -> Self {
        Self {
            op,
            ..Default::default()
        }
    }

    #[inline]
    fn accepts(&self, value: f64) -> bool {
        self.min_threshold.map_or(true, |min| value >= min)
            && self.max_threshold.map_or(true, |max| value <= max)
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOps {
    config: AggregateConfig,
}

impl AggregateOps {
    pub fn new(config: AggregateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> AggregateConfig {
        self.config
    }
}

impl NodeBehavior for AggregateOps {
    fn class_name(&self) -> &'static str {
        "AggregateOps"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self.config)
    }

    fn output_count(&self) -> usize {
        1
    }

    fn output_name(&self, _index: usize) -> String {
        format!("{:?}", self.config.op).to_lowercase()
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        vec![SlotDescriptor::array("input")]
    }
}

impl OperatorBehavior for AggregateOps {
    fn begin_run(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let Some(out) = outputs.first_mut() else {
            return;
        };
        out.resize(1);
        out.invalidate_all();

        let Some(input) = inputs.get(0) else {
            out.set_limits(0.0, 0.0);
            return;
        };

        let n = input.len() as f64;
        let min_lower = input.iter().map(|p| p.lower_limit).fold(f64::INFINITY, f64::min);
        let max_upper = input
            .iter()
            .map(|p| p.upper_limit)
            .fold(f64::NEG_INFINITY, f64::max);
        let (min_lower, max_upper) = if input.is_empty() {
            (0.0, 0.0)
        } else {
            (min_lower, max_upper)
        };

        let (lower, upper) = match self.config.op {
            AggregateOp::Sum => (
                input.iter().map(|p| p.lower_limit).sum(),
                input.iter().map(|p| p.upper_limit).sum(),
            ),
            AggregateOp::Mean | AggregateOp::Min | AggregateOp::Max => (min_lower, max_upper),
            AggregateOp::Sigma => (0.0, max_upper - min_lower),
            AggregateOp::Multiplicity => (0.0, n + 1.0),
            AggregateOp::MinX | AggregateOp::MaxX => (0.0, n),
        };
        out.set_limits(lower, upper);
    }

    fn step(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let (Some(input), Some(out)) = (inputs.get(0), outputs.first_mut().and_then(|o| o.get_mut(0)))
        else {
            return;
        };

        let mut count = 0usize;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        let mut min = (f64::INFINITY, 0usize);
        let mut max = (f64::NEG_INFINITY, 0usize);

        for (i, p) in input.iter().enumerate() {
            if !p.valid || !self.config.accepts(p.value) {
                continue;
            }
            count += 1;
            sum += p.value;
            sum_sq += p.value * p.value;
            if p.value < min.0 {
                min = (p.value, i);
            }
            if p.value > max.0 {
                max = (p.value, i);
            }
        }

        if count == 0 && self.config.op != AggregateOp::Multiplicity {
            out.invalidate();
            return;
        }

        let n = count as f64;
        let value = match self.config.op {
            AggregateOp::Sum => sum,
            AggregateOp::Mean => sum / n,
            AggregateOp::Sigma => {
                let mean = sum / n;
                (sum_sq / n - mean * mean).max(0.0).sqrt()
            }
            AggregateOp::Min => min.0,
            AggregateOp::Max => max.0,
            AggregateOp::Multiplicity => n,
            AggregateOp::MinX => min.1 as f64,
            AggregateOp::MaxX => max.1 as f64,
        };
        out.set(value);
    }
}
