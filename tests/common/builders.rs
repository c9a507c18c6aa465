//! Test data builders for creating analyses

use vme_analysis::config::{RunInfo, VmeConfig};
use vme_analysis::pipeline::nodes::{
    CalibrationConfig, CalibrationMinMax, Extractor, ExtractorConfig, Histo1DSink,
    Histo1DSinkConfig, Interval, IntervalCondition, MultiHitExtractor, MultiHitExtractorConfig,
    MultiHitShape, OperatorNode, SinkNode, ConditionNode, SourceNode,
};
use vme_analysis::pipeline::{Analysis, BeginRunMode, NodeId, ObjectId, ObjectMeta};

/// Builder for an analysis on a single event with a single module.
pub struct AnalysisBuilder {
    pub analysis: Analysis,
    pub vme: VmeConfig,
    pub event_id: ObjectId,
    pub module_id: ObjectId,
}

impl AnalysisBuilder {
    pub fn new() -> Self {
        let mut vme = VmeConfig::default();
        let event_id = vme.add_event("event0");
        let module_id = vme
            .add_module(0, "mdpp16", "mdpp16_scp")
            .expect("event 0 exists");
        Self {
            analysis: Analysis::new(),
            vme,
            event_id,
            module_id,
        }
    }

    fn meta(&self, name: &str) -> ObjectMeta {
        ObjectMeta::new(name, self.event_id)
    }

    pub fn extractor(&mut self, name: &str, template: &str) -> NodeId {
        let extractor = Extractor::new(ExtractorConfig::single(template)).expect("valid template");
        let meta = self.meta(name).with_module(self.module_id);
        self.analysis
            .add_source(meta, SourceNode::Extractor(extractor))
            .expect("add extractor")
    }

    pub fn multi_hit(&mut self, name: &str, template: &str, max_hits: u32, shape: MultiHitShape) -> NodeId {
        let config = MultiHitExtractorConfig::new(template, max_hits, shape);
        let extractor = MultiHitExtractor::new(config).expect("valid template");
        let meta = self.meta(name).with_module(self.module_id);
        self.analysis
            .add_source(meta, SourceNode::MultiHitExtractor(extractor))
            .expect("add multi-hit extractor")
    }

    /// Calibration fed by the whole first output of `input`.
    pub fn calibration(&mut self, name: &str, input: NodeId, unit_min: f64, unit_max: f64) -> NodeId {
        let calib = CalibrationMinMax::new(CalibrationConfig::new(unit_min, unit_max));
        let id = self
            .analysis
            .add_operator(self.meta(name), OperatorNode::Calibration(calib))
            .expect("add calibration");
        self.connect(id, 0, input, 0);
        id
    }

    pub fn histo1d(&mut self, name: &str, input: NodeId, bins: u32) -> NodeId {
        let config = Histo1DSinkConfig {
            bins: Some(bins),
            range: None,
        };
        let id = self
            .analysis
            .add_operator(self.meta(name), SinkNode::Histo1D(Histo1DSink::new(config)))
            .expect("add histogram");
        self.connect(id, 0, input, 0);
        id
    }

    pub fn interval_condition(&mut self, name: &str, input: NodeId, intervals: Vec<Interval>) -> NodeId {
        let id = self
            .analysis
            .add_operator(
                self.meta(name),
                ConditionNode::Interval(IntervalCondition::new(intervals)),
            )
            .expect("add condition");
        self.connect(id, 0, input, 0);
        id
    }

    pub fn connect(&mut self, dst: NodeId, slot: usize, src: NodeId, output: usize) {
        self.analysis
            .connect_input(dst, slot, src, output, None)
            .expect("connect");
    }

    pub fn begin_run(&mut self) {
        self.analysis
            .begin_run(RunInfo::new("test", true), &self.vme, BeginRunMode::ClearState)
            .expect("begin run");
    }

    /// Run one event feeding `words` to module 0.
    pub fn event(&mut self, words: &[u32]) {
        self.analysis.begin_event(0).expect("begin event");
        self.analysis
            .process_module_data(0, 0, words)
            .expect("module data");
        self.analysis.end_event(0).expect("end event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_wires_chain() {
        let mut b = AnalysisBuilder::new();
        let src = b.extractor("amplitude", "AAAADDDD");
        let calib = b.calibration("calibrated", src, 0.0, 1.0);
        b.histo1d("amplitude_h1", calib, 16);
        assert_eq!(b.analysis.node_count(), 3);
        assert_eq!(b.analysis.pipe_count(), 2);
    }
}
