//! Built-in analysis node implementations.
//!
//! Each node kind has an enum over its built-in types. The enums implement
//! the kind's capability trait by matching on the variant.

pub mod aggregate_ops;
pub mod array_concat;
pub mod calibration;
pub mod difference;
pub mod extractor;
pub mod histo1d_sink;
pub mod histo2d_sink;
pub mod index_selector;
pub mod interval_condition;
pub mod listfilter_extractor;
pub mod multi_hit_extractor;
pub mod previous_value;
pub mod rate_monitor_sink;
pub mod rectangle_condition;
pub mod retain_valid;

pub use aggregate_ops::{AggregateConfig, AggregateOp, AggregateOps};
pub use array_concat::{ArrayConcat, ArrayConcatConfig};
pub use calibration::{CalibrationConfig, CalibrationMinMax, UnitRange};
pub use difference::Difference;
pub use extractor::{Extractor, ExtractorConfig, SubFilterConfig};
pub use histo1d_sink::{Histo1DSink, Histo1DSinkConfig};
pub use histo2d_sink::{Histo2DSink, Histo2DSinkConfig};
pub use index_selector::{IndexSelector, IndexSelectorConfig};
pub use interval_condition::{Interval, IntervalCondition, IntervalConditionConfig};
pub use listfilter_extractor::{ListFilterExtractor, ListFilterExtractorConfig};
pub use multi_hit_extractor::{
    MultiHitExtractor, MultiHitExtractorConfig, MultiHitShape, HIT_COUNTS_NAME,
};
pub use previous_value::{PreviousValue, PreviousValueConfig};
pub use rate_monitor_sink::{RateHistory, RateMonitorConfig, RateMonitorSink, RateType};
pub use rectangle_condition::{RectangleCondition, RectangleConditionConfig};
pub use retain_valid::RetainValid;

use crate::config::AnalysisSettings;
use crate::pipeline::node::{
    BeginRunMode, ConditionBehavior, Inputs, NodeBehavior, OperatorBehavior, SinkBehavior,
    SourceBehavior,
};
use crate::pipeline::parameter::ParameterVector;
use crate::pipeline::port::SlotDescriptor;

/// Implements `NodeBehavior` for a kind enum by forwarding to each variant.
macro_rules! forward_node_behavior {
    ($kind:ident { $($variant:ident),+ $(,)? }) => {
        impl NodeBehavior for $kind {
            fn class_name(&self) -> &'static str {
                match self {
                    $($kind::$variant(n) => n.class_name(),)+
                }
            }

            fn write_data(&self) -> serde_json::Result<serde_json::Value> {
                match self {
                    $($kind::$variant(n) => n.write_data(),)+
                }
            }

            fn output_count(&self) -> usize {
                match self {
                    $($kind::$variant(n) => n.output_count(),)+
                }
            }

            fn output_name(&self, index: usize) -> String {
                match self {
                    $($kind::$variant(n) => n.output_name(index),)+
                }
            }

            fn slot_descriptors(&self) -> Vec<SlotDescriptor> {
                match self {
                    $($kind::$variant(n) => n.slot_descriptors(),)+
                }
            }
        }
    };
}

// ==================== Sources ====================

#[derive(Debug, Clone)]
pub enum SourceNode {
    Extractor(Extractor),
    ListFilterExtractor(ListFilterExtractor),
    MultiHitExtractor(MultiHitExtractor),
}

forward_node_behavior!(SourceNode {
    Extractor,
    ListFilterExtractor,
    MultiHitExtractor
});

impl SourceBehavior for SourceNode {
    fn begin_run(&mut self, outputs: &mut [ParameterVector], settings: &AnalysisSettings) {
        match self {
            SourceNode::Extractor(n) => n.begin_run(outputs, settings),
            SourceNode::ListFilterExtractor(n) => n.begin_run(outputs, settings),
            SourceNode::MultiHitExtractor(n) => n.begin_run(outputs, settings),
        }
    }

    fn begin_event(&mut self, outputs: &mut [ParameterVector]) {
        match self {
            SourceNode::Extractor(n) => n.begin_event(outputs),
            SourceNode::ListFilterExtractor(n) => n.begin_event(outputs),
            SourceNode::MultiHitExtractor(n) => n.begin_event(outputs),
        }
    }

    #[inline]
    fn process_module_data(&mut self, words: &[u32], outputs: &mut [ParameterVector]) {
        match self {
            SourceNode::Extractor(n) => n.process_module_data(words, outputs),
            SourceNode::ListFilterExtractor(n) => n.process_module_data(words, outputs),
            SourceNode::MultiHitExtractor(n) => n.process_module_data(words, outputs),
        }
    }
}

// ==================== Operators ====================

#[derive(Debug, Clone)]
pub enum OperatorNode {
    Calibration(CalibrationMinMax),
    IndexSelector(IndexSelector),
    Difference(Difference),
    PreviousValue(PreviousValue),
    RetainValid(RetainValid),
    Aggregate(AggregateOps),
    ArrayConcat(ArrayConcat),
}

forward_node_behavior!(OperatorNode {
    Calibration,
    IndexSelector,
    Difference,
    PreviousValue,
    RetainValid,
    Aggregate,
    ArrayConcat
});

impl OperatorBehavior for OperatorNode {
    fn begin_run(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        match self {
            OperatorNode::Calibration(n) => n.begin_run(inputs, outputs),
            OperatorNode::IndexSelector(n) => n.begin_run(inputs, outputs),
            OperatorNode::Difference(n) => n.begin_run(inputs, outputs),
            OperatorNode::PreviousValue(n) => n.begin_run(inputs, outputs),
            OperatorNode::RetainValid(n) => n.begin_run(inputs, outputs),
            OperatorNode::Aggregate(n) => n.begin_run(inputs, outputs),
            OperatorNode::ArrayConcat(n) => n.begin_run(inputs, outputs),
        }
    }

    #[inline]
    fn step(&mut self, inputs: &Inputs<'_>, outputs: &mut [ParameterVector]) {
        match self {
            OperatorNode::Calibration(n) => n.step(inputs, outputs),
            OperatorNode::IndexSelector(n) => n.step(inputs, outputs),
            OperatorNode::Difference(n) => n.step(inputs, outputs),
            OperatorNode::PreviousValue(n) => n.step(inputs, outputs),
            OperatorNode::RetainValid(n) => n.step(inputs, outputs),
            OperatorNode::Aggregate(n) => n.step(inputs, outputs),
            OperatorNode::ArrayConcat(n) => n.step(inputs, outputs),
        }
    }

    fn add_input_slot(&mut self) -> Option<SlotDescriptor> {
        match self {
            OperatorNode::ArrayConcat(n) => n.add_input_slot(),
            _ => None,
        }
    }

    fn remove_input_slot(&mut self) -> bool {
        match self {
            OperatorNode::ArrayConcat(n) => n.remove_input_slot(),
            _ => false,
        }
    }
}

// ==================== Conditions ====================

#[derive(Debug, Clone)]
pub enum ConditionNode {
    Interval(IntervalCondition),
    Rectangle(RectangleCondition),
}

forward_node_behavior!(ConditionNode { Interval, Rectangle });

impl ConditionBehavior for ConditionNode {
    fn bit_count(&self, inputs: &Inputs<'_>) -> usize {
        match self {
            ConditionNode::Interval(n) => n.bit_count(inputs),
            ConditionNode::Rectangle(n) => n.bit_count(inputs),
        }
    }

    fn begin_run(&mut self, inputs: &Inputs<'_>) {
        match self {
            ConditionNode::Interval(n) => n.begin_run(inputs),
            ConditionNode::Rectangle(n) => n.begin_run(inputs),
        }
    }

    #[inline]
    fn evaluate(&mut self, inputs: &Inputs<'_>, bits: &mut [bool]) {
        match self {
            ConditionNode::Interval(n) => n.evaluate(inputs, bits),
            ConditionNode::Rectangle(n) => n.evaluate(inputs, bits),
        }
    }
}

// ==================== Sinks ====================

#[derive(Debug, Clone)]
pub enum SinkNode {
    Histo1D(Histo1DSink),
    Histo2D(Histo2DSink),
    RateMonitor(RateMonitorSink),
}

forward_node_behavior!(SinkNode {
    Histo1D,
    Histo2D,
    RateMonitor
});

impl SinkBehavior for SinkNode {
    fn begin_run(&mut self, inputs: &Inputs<'_>, mode: BeginRunMode, settings: &AnalysisSettings) {
        match self {
            SinkNode::Histo1D(n) => n.begin_run(inputs, mode, settings),
            SinkNode::Histo2D(n) => n.begin_run(inputs, mode, settings),
            SinkNode::RateMonitor(n) => n.begin_run(inputs, mode, settings),
        }
    }

    #[inline]
    fn accumulate(&mut self, inputs: &Inputs<'_>) {
        match self {
            SinkNode::Histo1D(n) => n.accumulate(inputs),
            SinkNode::Histo2D(n) => n.accumulate(inputs),
            SinkNode::RateMonitor(n) => n.accumulate(inputs),
        }
    }

    fn timetick(&mut self) {
        match self {
            SinkNode::Histo1D(n) => n.timetick(),
            SinkNode::Histo2D(n) => n.timetick(),
            SinkNode::RateMonitor(n) => n.timetick(),
        }
    }

    fn end_run(&mut self) {
        match self {
            SinkNode::Histo1D(n) => n.end_run(),
            SinkNode::Histo2D(n) => n.end_run(),
            SinkNode::RateMonitor(n) => n.end_run(),
        }
    }

    fn clear(&mut self) {
        match self {
            SinkNode::Histo1D(n) => n.clear(),
            SinkNode::Histo2D(n) => n.clear(),
            SinkNode::RateMonitor(n) => n.clear(),
        }
    }

    fn storage_size(&self) -> usize {
        match self {
            SinkNode::Histo1D(n) => n.storage_size(),
            SinkNode::Histo2D(n) => n.storage_size(),
            SinkNode::RateMonitor(n) => n.storage_size(),
        }
    }
}

impl SinkNode {
    pub fn as_histo1d(&self) -> Option<&Histo1DSink> {
        match self {
            SinkNode::Histo1D(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_histo2d(&self) -> Option<&Histo2DSink> {
        match self {
            SinkNode::Histo2D(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_rate_monitor(&self) -> Option<&RateMonitorSink> {
        match self {
            SinkNode::RateMonitor(n) => Some(n),
            _ => None,
        }
    }
}
