//! Per-field shape registry.
//!
//! The learner stacks sampled rows into dense arrays, so every row of a
//! field must share one shape. The first stored row registers the shape;
//! later rows are checked against it.

use std::collections::BTreeMap;

use crate::error::{ReplayError, Result};

#[derive(Debug, Clone, Default)]
pub struct ShapeGuard {
    shapes: BTreeMap<&'static str, Vec<usize>>,
}

impl ShapeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a batch of row shapes for `field` without registering anything.
    ///
    /// Returns the shape that must be registered once the batch is committed
    /// (`None` when the field is already registered or the batch is empty).
    pub fn check<'a, I>(&self, field: &'static str, shapes: I) -> Result<Option<Vec<usize>>>
    where
        I: IntoIterator<Item = &'a [usize]>,
    {
        let mut shapes = shapes.into_iter();
        let (reference, pending) = match self.shapes.get(field) {
            Some(registered) => (registered.as_slice(), false),
            None => match shapes.next() {
                Some(first) => (first, true),
                None => return Ok(None),
            },
        };

        for shape in shapes {
            if shape != reference {
                return Err(ReplayError::shape_mismatch(field, reference, shape));
            }
        }
        Ok(pending.then(|| reference.to_vec()))
    }

    /// Register a shape returned by `check`.
    pub fn commit(&mut self, field: &'static str, shape: Option<Vec<usize>>) {
        if let Some(shape) = shape {
            self.shapes.entry(field).or_insert(shape);
        }
    }

    pub fn get(&self, field: &str) -> Option<&[usize]> {
        self.shapes.get(field).map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        self.shapes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_batch_registers() {
        let mut guard = ShapeGuard::new();
        let rows: Vec<Vec<usize>> = vec![vec![4], vec![4]];

        let pending = guard.check("obs", rows.iter().map(Vec::as_slice)).unwrap();
        assert_eq!(pending, Some(vec![4]));
        guard.commit("obs", pending);
        assert_eq!(guard.get("obs"), Some(&[4usize][..]));
    }

    #[test]
    fn test_mismatch_within_first_batch() {
        let guard = ShapeGuard::new();
        let rows: Vec<Vec<usize>> = vec![vec![4], vec![5]];
        assert!(guard.check("obs", rows.iter().map(Vec::as_slice)).is_err());
    }

    #[test]
    fn test_mismatch_against_registered() {
        let mut guard = ShapeGuard::new();
        guard.commit("image", Some(vec![3, 8, 8]));

        let ok: Vec<Vec<usize>> = vec![vec![3, 8, 8]];
        assert_eq!(guard.check("image", ok.iter().map(Vec::as_slice)).unwrap(), None);

        let bad: Vec<Vec<usize>> = vec![vec![3, 4, 4]];
        assert!(guard.check("image", bad.iter().map(Vec::as_slice)).is_err());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let guard = ShapeGuard::new();
        assert_eq!(guard.check("obs", std::iter::empty()).unwrap(), None);
    }
}
