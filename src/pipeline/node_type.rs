//! Node class registry for dynamic node creation.
//!
//! Every built-in node has a stable class name that is written to analysis
//! documents. `NodeClass::create` rebuilds a node from its class name and
//! data blob.

use crate::filter::FilterError;
use crate::pipeline::node::NodeKind;
use crate::pipeline::nodes::*;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeFactoryError {
    #[error("Unknown node class {0:?}")]
    UnknownClass(String),

    #[error("Invalid node data: {0}")]
    Data(#[from] serde_json::Error),

    #[error("Invalid filter: {0}")]
    Filter(#[from] FilterError),
}

/// Which capability set a class belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCategory {
    Source,
    Operator,
    Condition,
    Sink,
}

/// Types of nodes that can be instantiated dynamically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    // Sources
    Extractor,
    ListFilterExtractor,
    MultiHitExtractor,

    // Operators
    CalibrationMinMax,
    IndexSelector,
    Difference,
    PreviousValue,
    RetainValid,
    AggregateOps,
    ArrayConcat,

    // Conditions
    IntervalCondition,
    RectangleCondition,

    // Sinks
    Histo1DSink,
    Histo2DSink,
    RateMonitorSink,
}

impl NodeClass {
    /// Get all available node classes.
    pub fn all() -> &'static [NodeClass] {
        &[
            NodeClass::Extractor,
            NodeClass::ListFilterExtractor,
            NodeClass::MultiHitExtractor,
            NodeClass::CalibrationMinMax,
            NodeClass::IndexSelector,
            NodeClass::Difference,
            NodeClass::PreviousValue,
            NodeClass::RetainValid,
            NodeClass::AggregateOps,
            NodeClass::ArrayConcat,
            NodeClass::IntervalCondition,
            NodeClass::RectangleCondition,
            NodeClass::Histo1DSink,
            NodeClass::Histo2DSink,
            NodeClass::RateMonitorSink,
        ]
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            NodeClass::Extractor => "Extractor",
            NodeClass::ListFilterExtractor => "ListFilterExtractor",
            NodeClass::MultiHitExtractor => "MultiHitExtractor",
            NodeClass::CalibrationMinMax => "CalibrationMinMax",
            NodeClass::IndexSelector => "IndexSelector",
            NodeClass::Difference => "Difference",
            NodeClass::PreviousValue => "PreviousValue",
            NodeClass::RetainValid => "RetainValid",
            NodeClass::AggregateOps => "AggregateOps",
            NodeClass::ArrayConcat => "ArrayConcat",
            NodeClass::IntervalCondition => "IntervalCondition",
            NodeClass::RectangleCondition => "RectangleCondition",
            NodeClass::Histo1DSink => "Histo1DSink",
            NodeClass::Histo2DSink => "Histo2DSink",
            NodeClass::RateMonitorSink => "RateMonitorSink",
        }
    }

    /// Look up a class by name. Accepts the namespaced form `analysis::Name`
    /// found in older documents.
    pub fn from_class_name(name: &str) -> Option<NodeClass> {
        let name = name.rsplit("::").next().unwrap_or(name);
        Self::all().iter().copied().find(|c| c.class_name() == name)
    }

    pub fn category(&self) -> NodeCategory {
        match self {
            NodeClass::Extractor | NodeClass::ListFilterExtractor | NodeClass::MultiHitExtractor => {
                NodeCategory::Source
            }
            NodeClass::IntervalCondition | NodeClass::RectangleCondition => NodeCategory::Condition,
            NodeClass::Histo1DSink | NodeClass::Histo2DSink | NodeClass::RateMonitorSink => {
                NodeCategory::Sink
            }
            _ => NodeCategory::Operator,
        }
    }

    /// Short description of what the node does.
    pub fn description(&self) -> &'static str {
        match self {
            NodeClass::Extractor => "Extracts address/data pairs using a multi-word filter.",
            NodeClass::ListFilterExtractor => {
                "Combines word groups and extracts one value per repetition."
            }
            NodeClass::MultiHitExtractor => "Keeps several hits per address.",
            NodeClass::CalibrationMinMax => "Maps input limits linearly onto a unit range.",
            NodeClass::IndexSelector => "Selects one element of an array.",
            NodeClass::Difference => "Element-wise difference of two inputs.",
            NodeClass::PreviousValue => "Outputs the input of the previous event.",
            NodeClass::RetainValid => "Holds the last valid value of each element.",
            NodeClass::AggregateOps => "Reduces an array to a single value.",
            NodeClass::ArrayConcat => "Concatenates several inputs into one array.",
            NodeClass::IntervalCondition => "One bit per element: value inside its interval.",
            NodeClass::RectangleCondition => "One bit: (x, y) inside a rectangle.",
            NodeClass::Histo1DSink => "One 1D histogram per input element.",
            NodeClass::Histo2DSink => "2D histogram of two values.",
            NodeClass::RateMonitorSink => "Rate histories sampled on each timetick.",
        }
    }

    /// Build a node of this class from its data blob.
    pub fn create(&self, data: &Value) -> Result<NodeKind, NodeFactoryError> {
        let data = data.clone();
        let node: NodeKind = match self {
            NodeClass::Extractor => {
                SourceNode::Extractor(Extractor::new(serde_json::from_value(data)?)?).into()
            }
            NodeClass::ListFilterExtractor => SourceNode::ListFilterExtractor(
                ListFilterExtractor::new(serde_json::from_value(data)?)?,
            )
            .into(),
            NodeClass::MultiHitExtractor => SourceNode::MultiHitExtractor(
                MultiHitExtractor::new(serde_json::from_value(data)?)?,
            )
            .into(),
            NodeClass::CalibrationMinMax => OperatorNode::Calibration(CalibrationMinMax::new(
                serde_json::from_value(data)?,
            ))
            .into(),
            NodeClass::IndexSelector => OperatorNode::IndexSelector(IndexSelector::from_config(
                serde_json::from_value(data)?,
            ))
            .into(),
            NodeClass::Difference => OperatorNode::Difference(Difference::new()).into(),
            NodeClass::PreviousValue => {
                OperatorNode::PreviousValue(PreviousValue::new(serde_json::from_value(data)?))
                    .into()
            }
            NodeClass::RetainValid => OperatorNode::RetainValid(RetainValid::new()).into(),
            NodeClass::AggregateOps => {
                OperatorNode::Aggregate(AggregateOps::new(serde_json::from_value(data)?)).into()
            }
            NodeClass::ArrayConcat => {
                let config: ArrayConcatConfig = serde_json::from_value(data)?;
                OperatorNode::ArrayConcat(ArrayConcat::new(config.input_count)).into()
            }
            NodeClass::IntervalCondition => ConditionNode::Interval(
                IntervalCondition::from_config(serde_json::from_value(data)?),
            )
            .into(),
            NodeClass::RectangleCondition => ConditionNode::Rectangle(
                RectangleCondition::from_config(serde_json::from_value(data)?),
            )
            .into(),
            NodeClass::Histo1DSink => {
                SinkNode::Histo1D(Histo1DSink::new(serde_json::from_value(data)?)).into()
            }
            NodeClass::Histo2DSink => {
                SinkNode::Histo2D(Histo2DSink::new(serde_json::from_value(data)?)).into()
            }
            NodeClass::RateMonitorSink => {
                SinkNode::RateMonitor(RateMonitorSink::new(serde_json::from_value(data)?)).into()
            }
        };
        Ok(node)
    }
}

impl std::fmt::Display for NodeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.class_name())
    }
}

/// Rebuild a node from a class name and data blob.
pub fn create_node(class_name: &str, data: &Value) -> Result<NodeKind, NodeFactoryError> {
    NodeClass::from_class_name(class_name)
        .ok_or_else(|| NodeFactoryError::UnknownClass(class_name.to_string()))?
        .create(data)
}
