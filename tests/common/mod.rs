//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use vme_analysis::pipeline::{Analysis, NodeId};

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Valid values of one output, `None` for invalid elements.
pub fn output_values(analysis: &Analysis, node: NodeId, index: usize) -> Vec<Option<f64>> {
    analysis
        .output(node, index)
        .map(|pipe| pipe.params.iter().map(|p| p.get()).collect())
        .unwrap_or_default()
}
