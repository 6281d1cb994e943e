//! Open payload type for extra columns and heterogeneous fields.

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};

/// Dense row-major f32 tensor (images, textures, box arrays).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(ReplayError::ShapeMismatch {
                field: "tensor".to_string(),
                expected: format!("{} elements for shape {:?}", numel, shape),
                actual: format!("{} elements", data.len()),
            });
        }
        Ok(Self { shape, data })
    }

    /// Tensor of the given shape filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let numel = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; numel],
        }
    }

    /// Tensor of the given shape filled with `value`.
    pub fn full(shape: Vec<usize>, value: f32) -> Self {
        let numel = shape.iter().product();
        Self {
            shape,
            data: vec![value; numel],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }
}

/// A dynamically typed value stored in an extra column.
///
/// `Missing` is the backfill sentinel: it marks rows written before a key
/// was first seen, or rows whose entry did not carry the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Missing,
    Flag(bool),
    Scalar(f32),
    Vector(Vec<f32>),
    Tensor(Tensor),
}

impl Value {
    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Scalar payload, if this is a scalar or a flag (as 0.0 / 1.0).
    pub fn as_scalar(&self) -> Option<f32> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Flag(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Flat view of vector and tensor payloads.
    pub fn as_slice(&self) -> Option<&[f32]> {
        match self {
            Self::Vector(v) => Some(v),
            Self::Tensor(t) => Some(t.data()),
            _ => None,
        }
    }

    /// Shape of the payload (`[]` for scalars, flags and the sentinel).
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Vector(v) => vec![v.len()],
            Self::Tensor(t) => t.shape().to_vec(),
            Self::Missing | Self::Flag(_) | Self::Scalar(_) => Vec::new(),
        }
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Scalar(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Self::Vector(v)
    }
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Self::Tensor(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_new_checks_numel() {
        assert!(Tensor::new(vec![2, 3], vec![0.0; 6]).is_ok());
        let err = Tensor::new(vec![2, 3], vec![0.0; 5]).unwrap_err();
        assert!(matches!(err, ReplayError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(1.5).as_scalar(), Some(1.5));
        assert_eq!(Value::from(true).as_scalar(), Some(1.0));
        assert_eq!(Value::from(vec![1.0, 2.0]).shape(), vec![2]);
        assert_eq!(Value::from(Tensor::zeros(vec![3, 4, 4])).shape(), vec![3, 4, 4]);
        assert!(Value::Missing.is_missing());
        assert!(Value::Missing.as_slice().is_none());
    }
}
