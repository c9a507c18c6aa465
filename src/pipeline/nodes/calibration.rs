//! CalibrationMinMax: linear mapping of input limits onto a unit range.

use crate::pipeline::node::{Inputs, NodeBehavior, OperatorBehavior};
use crate::pipeline::parameter::ParameterVector;
use crate::pipeline::port::SlotDescriptor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRange {
    pub unit_min: f64,
    pub unit_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationConfig {
    pub unit_min: f64,
    pub unit_max: f64,
    #[serde(default)]
    pub unit_label: String,
    /// Per-address overrides of the global range.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calibrations: Vec<Option<UnitRange>>,
}

impl CalibrationConfig {
    pub fn new(unit_min: f64, unit_max: f64) -> Self {
        Self {
            unit_min,
            unit_max,
            unit_label: String::new(),
            calibrations: Vec::new(),
        }
    }

    pub fn range_for(&self, address: usize) -> UnitRange {
        self.calibrations
            .get(address)
            .copied()
            .flatten()
            .unwrap_or(UnitRange {
                unit_min: self.unit_min,
                unit_max: self.unit_max,
            })
    }
}

#[inline]
pub fn calibrate(value: f64, lower: f64, upper: f64, unit: UnitRange) -> Option<f64> {
    let width = upper - lower;
    if width == 0.0 {
        return None;
    }
    Some((value - lower) * (unit.unit_max - unit.unit_min) / width + unit.unit_min)
}

#[derive(Debug, Clone)]
pub struct CalibrationMinMax {
    config: CalibrationConfig,
}

impl CalibrationMinMax {
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }
}

impl NodeBehavior for CalibrationMinMax {
    fn class_name(&self) -> &'static str {
        "CalibrationMinMax"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.config)
    }

    fn output_count(&self) -> usize {
        1
    }

    fn output_name(&self, _index: usize) -> String {
        "calibrated".to_string()
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        vec![SlotDescriptor::both("input")]
    }
}

impl OperatorBehavior for CalibrationMinMax {
    fn begin_run(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let Some(out) = outputs.first_mut() else {
            return;
        };
        out.resize(inputs.len_of(0));
        out.unit = self.config.unit_label.clone();
        for (i, param) in out.iter_mut().enumerate() {
            let range = self.config.range_for(i);
            param.lower_limit = range.unit_min;
            param.upper_limit = range.unit_max;
        }
        out.invalidate_all();
    }

    fn step(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        let (Some(input), Some(out)) = (inputs.get(0), outputs.first_mut()) else {
            return;
        };

        for (i, param) in out.iter_mut().enumerate() {
            let calibrated = input.get(i).filter(|p| p.valid).and_then(|p| {
                calibrate(p.value, p.lower_limit, p.upper_limit, self.config.range_for(i))
            });
            match calibrated {
                Some(value) => param.set(value),
                None => param.invalidate(),
            }
        }
    }
}
