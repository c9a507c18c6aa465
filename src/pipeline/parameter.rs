//! Parameters and parameter vectors, the data carried by pipes.
//!
//! A `ParameterVector` is allocated when a run begins and reused for every
//! event afterwards. Invalidating it clears the `valid` flags in place and
//! keeps the previous values and limits around.

use std::ops::{Index, IndexMut};

/// One computed value with its validity flag and value range.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Parameter {
    pub valid: bool,
    pub value: f64,
    /// Inclusive.
    pub lower_limit: f64,
    /// Exclusive.
    pub upper_limit: f64,
}

impl Parameter {
    pub fn new(value: f64) -> Self {
        Self {
            valid: true,
            value,
            ..Default::default()
        }
    }

    pub fn with_limits(lower_limit: f64, upper_limit: f64) -> Self {
        Self {
            valid: false,
            value: 0.0,
            lower_limit,
            upper_limit,
        }
    }

    #[inline]
    pub fn set(&mut self, value: f64) {
        self.value = value;
        self.valid = true;
    }

    #[inline]
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// The valid value, if any.
    #[inline]
    pub fn get(&self) -> Option<f64> {
        self.valid.then_some(self.value)
    }

    #[inline]
    pub fn in_limits(&self) -> bool {
        self.lower_limit <= self.value && self.value < self.upper_limit
    }
}

/// Named, ordered sequence of parameters. The index is the parameter address.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterVector {
    pub name: String,
    pub unit: String,
    params: Vec<Parameter>,
}

impl ParameterVector {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: String::new(),
            params: Vec::new(),
        }
    }

    pub fn with_size(name: impl Into<String>, size: usize) -> Self {
        let mut result = Self::new(name);
        result.resize(size);
        result
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Resize the vector. New elements start out invalid.
    pub fn resize(&mut self, size: usize) {
        self.params.resize(size, Parameter::default());
    }

    /// Clear the `valid` flag of every element, keeping values and limits.
    #[inline]
    pub fn invalidate_all(&mut self) {
        for param in &mut self.params {
            param.valid = false;
        }
    }

    /// Set the same limits on every element.
    pub fn set_limits(&mut self, lower_limit: f64, upper_limit: f64) {
        for param in &mut self.params {
            param.lower_limit = lower_limit;
            param.upper_limit = upper_limit;
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.params.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Parameter> {
        self.params.get_mut(index)
    }

    pub fn first(&self) -> Option<&Parameter> {
        self.params.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Parameter> {
        self.params.iter_mut()
    }

    pub fn as_slice(&self) -> &[Parameter] {
        &self.params
    }

    /// Number of currently valid elements.
    pub fn valid_count(&self) -> usize {
        self.params.iter().filter(|p| p.valid).count()
    }
}

impl Index<usize> for ParameterVector {
    type Output = Parameter;

    fn index(&self, index: usize) -> &Self::Output {
        &self.params[index]
    }
}

impl IndexMut<usize> for ParameterVector {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.params[index]
    }
}

impl<'a> IntoIterator for &'a ParameterVector {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_starts_invalid() {
        let params = ParameterVector::with_size("test", 4);
        assert_eq!(params.len(), 4);
        assert_eq!(params.valid_count(), 0);
    }

    #[test]
    fn test_invalidate_keeps_values() {
        let mut params = ParameterVector::with_size("test", 2);
        params.set_limits(0.0, 16.0);
        params[1].set(7.0);
        assert_eq!(params.valid_count(), 1);

        params.invalidate_all();
        assert_eq!(params.valid_count(), 0);
        assert_eq!(params[1].value, 7.0);
        assert_eq!(params[1].upper_limit, 16.0);
        assert_eq!(params[1].get(), None);
    }
}
