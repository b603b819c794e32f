//! Tensor shapes: ordered, non-negative dimension lists.

use crate::error::{ErrorBuilder, ErrorKind, Result};

/// An ordered sequence of non-negative dimensions.
///
/// A rank-0 shape denotes a scalar; its element count is `1` (the empty
/// product), matching `spec.md` §3.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Shape {
    dims: Vec<u32>,
}

impl Shape {
    /// Builds a shape from an explicit list of dimensions.
    pub fn new(dims: impl Into<Vec<u32>>) -> Shape {
        Shape { dims: dims.into() }
    }

    /// The rank-0 (scalar) shape.
    pub fn scalar() -> Shape {
        Shape { dims: Vec::new() }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// The dimension list.
    pub fn dims(&self) -> &[u32] {
        &self.dims
    }

    /// Total element count: the product of all dimensions, or `1` for rank-0.
    ///
    /// Returns `ResourceExhausted` on overflow of `usize`, rather than
    /// silently wrapping a shape into a too-small allocation.
    pub fn element_count(&self) -> Result<usize> {
        let mut count: usize = 1;
        for &dim in &self.dims {
            count = count
                .checked_mul(dim as usize)
                .ok_or_else(|| {
                    ErrorBuilder::new(ErrorKind::ResourceExhausted)
                        .with("shape element count overflows usize".to_string())
                        .build()
                })?;
        }
        Ok(count)
    }

    /// Returns the byte-strides (row-major) for a shape whose elements are
    /// `element_size` bytes wide, used by kernels that walk hyper-rectangular
    /// regions (`Copy`, `Pad`, `Transpose`, ...).
    pub fn row_major_strides(&self, element_size: usize) -> Vec<usize> {
        let mut strides = vec![0usize; self.dims.len()];
        let mut acc = element_size;
        for i in (0..self.dims.len()).rev() {
            strides[i] = acc;
            acc = acc.saturating_mul(self.dims[i] as usize);
        }
        strides
    }

    /// Validates that `index` at dimension `dim` is less than that
    /// dimension's extent, the kind of bound check kernels perform before
    /// assuming preconditions hold.
    pub fn check_index(&self, dim: usize, index: u32) -> Result<()> {
        let extent = *self.dims.get(dim).ok_or_else(|| {
            ErrorBuilder::new(ErrorKind::OutOfRange)
                .with(format!("dimension {dim} out of range for rank {}", self.rank()))
                .build()
        })?;
        if index >= extent {
            return Err(ErrorBuilder::new(ErrorKind::OutOfRange)
                .with(format!("index {index} out of range for extent {extent} at dim {dim}"))
                .build());
        }
        Ok(())
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, "x")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<u32>> for Shape {
    fn from(dims: Vec<u32>) -> Shape {
        Shape { dims }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_element_count_is_one() {
        assert_eq!(Shape::scalar().element_count().unwrap(), 1);
    }

    #[test]
    fn element_count_is_product_of_dims() {
        let s = Shape::new(vec![2, 3, 4]);
        assert_eq!(s.element_count().unwrap(), 24);
    }

    #[test]
    fn zero_dim_yields_zero_elements() {
        let s = Shape::new(vec![2, 0, 4]);
        assert_eq!(s.element_count().unwrap(), 0);
    }

    #[test]
    fn check_index_rejects_out_of_bounds() {
        let s = Shape::new(vec![2, 3]);
        assert!(s.check_index(0, 1).is_ok());
        assert!(s.check_index(0, 2).is_err());
        assert!(s.check_index(2, 0).is_err());
    }
}
