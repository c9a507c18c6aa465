//! RateMonitorSink: per-element rate histories sampled on each timetick.
//!
//! - `FlowRate`: number of valid inputs seen since the previous tick.
//! - `CounterDifference`: difference of the last counter value to the value
//!   seen at the previous tick. Counter wrap-arounds produce no sample.
//! - `PrecalculatedRate`: the last valid input value itself.
//!
//! Every sample is multiplied by `calibration_factor`.

use crate::config::AnalysisSettings;
use crate::pipeline::node::{BeginRunMode, Inputs, NodeBehavior, SinkBehavior};
use crate::pipeline::port::SlotDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RateType {
    #[default]
    FlowRate,
    CounterDifference,
    PrecalculatedRate,
}

fn default_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateMonitorConfig {
    pub rate_type: RateType,
    #[serde(default = "default_factor")]
    pub calibration_factor: f64,
    #[serde(default)]
    pub unit_label: String,
}

impl RateMonitorConfig {
    pub fn new(rate_type: RateType) -> Self {
        Self {
            rate_type,
            calibration_factor: 1.0,
            unit_label: String::new(),
        }
    }
}

/// Fixed-capacity ring of rate samples, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RateHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[derive(Debug, Clone, Default)]
struct ElementState {
    hits: u64,
    last_value: Option<f64>,
    previous_counter: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct RateMonitorSink {
    config: RateMonitorConfig,
    histories: Vec<RateHistory>,
    elements: Vec<ElementState>,
}

impl RateMonitorSink {
    pub fn new(config: RateMonitorConfig) -> Self {
        Self {
            config,
            histories: Vec::new(),
            elements: Vec::new(),
        }
    }

    pub fn config(&self) -> &RateMonitorConfig {
        &self.config
    }

    pub fn histories(&self) -> &[RateHistory] {
        &self.histories
    }

    pub fn rate_history(&self, index: usize) -> Option<&RateHistory> {
        self.histories.get(index)
    }
}

impl NodeBehavior for RateMonitorSink {
    fn class_name(&self) -> &'static str {
        "RateMonitorSink"
    }

    fn write_data(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.config)
    }

    fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
        vec![SlotDescriptor::both("input")]
    }
}

impl SinkBehavior for RateMonitorSink {
    fn begin_run(&mut self, inputs: &Inputs<'_>, mode: BeginRunMode, settings: &AnalysisSettings) {
        let len = inputs.len_of(0);
        let capacity = settings.rate_history_capacity;

        let unchanged = self.histories.len() == len
            && self.histories.iter().all(|h| h.capacity() == capacity);
        if mode == BeginRunMode::ClearState || !unchanged {
            self.histories = (0..len).map(|_| RateHistory::with_capacity(capacity)).collect();
        }

        // Counters restart with the run, so the first tick only primes them.
        self.elements.clear();
        self.elements.resize(len, ElementState::default());
    }

    fn accumulate(&mut self, inputs: &Inputs<'_>) {
        let Some(input) = inputs.get(0) else {
            return;
        };
        for (state, param) in self.elements.iter_mut().zip(input.iter()) {
            if !param.valid {
                continue;
            }
            state.hits += 1;
            state.last_value = Some(param.value);
        }
    }

    fn timetick(&mut self) {
        let factor = self.config.calibration_factor;

        for (state, history) in self.elements.iter_mut().zip(self.histories.iter_mut()) {
            let sample = match self.config.rate_type {
                RateType::FlowRate => Some(state.hits as f64),
                RateType::PrecalculatedRate => state.last_value,
                RateType::CounterDifference => {
                    let sample = match (state.previous_counter, state.last_value) {
                        (Some(prev), Some(current)) if current >= prev => Some(current - prev),
                        _ => None,
                    };
                    if state.last_value.is_some() {
                        state.previous_counter = state.last_value;
                    }
                    sample
                }
            };

            if let Some(sample) = sample {
                history.push(sample * factor);
            }
            state.hits = 0;
        }
    }

    fn clear(&mut self) {
        for history in &mut self.histories {
            history.clear();
        }
        for state in &mut self.elements {
            *state = ElementState::default();
        }
    }

    fn storage_size(&self) -> usize {
        self.histories.len() * self.histories.first().map_or(0, |h| h.capacity()) * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = RateHistory::with_capacity(3);
        for i in 0..5 {
            history.push(i as f64);
        }
        assert_eq!(history.samples().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(history.last(), Some(4.0));
    }

    #[test]
    fn test_counter_difference() {
        let mut sink = RateMonitorSink::new(RateMonitorConfig::new(RateType::CounterDifference));
        sink.histories = vec![RateHistory::with_capacity(8)];
        sink.elements = vec![ElementState::default()];

        sink.elements[0].last_value = Some(100.0);
        sink.timetick();
        assert!(sink.histories[0].is_empty());

        sink.elements[0].last_value = Some(150.0);
        sink.timetick();
        assert_eq!(sink.histories[0].last(), Some(50.0));

        // Counter wrapped: no sample.
        sink.elements[0].last_value = Some(10.0);
        sink.timetick();
        assert_eq!(sink.histories[0].len(), 1);
    }
}
