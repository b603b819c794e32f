//! Shape-rearranging kernels: `Copy`, `Transpose`, `Pad`, `Reverse`,
//! `Broadcast`/`Tile` (`spec.md` §4.9).

use rt_core::{ErrorBuilder, ErrorKind, Result};

/// Iterates every multi-dimensional index of a row-major shape, lowest
/// dimension fastest-varying last, in ascending linear order.
struct MultiIndexIter<'a> {
    dims: &'a [u32],
    current: Vec<u32>,
    done: bool,
}

impl<'a> MultiIndexIter<'a> {
    fn new(dims: &'a [u32]) -> MultiIndexIter<'a> {
        let done = dims.iter().any(|&d| d == 0);
        MultiIndexIter { dims, current: vec![0; dims.len()], done }
    }
}

impl<'a> Iterator for MultiIndexIter<'a> {
    type Item = Vec<u32>;

    fn next(&mut self) -> Option<Vec<u32>> {
        if self.done {
            return None;
        }
        let result = self.current.clone();
        if self.dims.is_empty() {
            self.done = true;
            return Some(result);
        }
        for i in (0..self.dims.len()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.dims[i] {
                return Some(result);
            }
            self.current[i] = 0;
        }
        self.done = true;
        Some(result)
    }
}

fn row_major_linear(index: &[u32], dims: &[u32]) -> usize {
    let mut linear = 0usize;
    let mut stride = 1usize;
    for i in (0..dims.len()).rev() {
        linear += index[i] as usize * stride;
        stride *= dims[i] as usize;
    }
    linear
}

/// Copies a hyper-rectangular region of `lengths` elements starting at
/// `src_offset` in `src_dims` into `dst_offset` in `dst_dims`. No overlap
/// checking, matching `spec.md`'s `Copy<N>` contract.
pub fn copy_rect<T: Copy>(
    dst: &mut [T],
    dst_dims: &[u32],
    dst_offset: &[u32],
    src: &[T],
    src_dims: &[u32],
    src_offset: &[u32],
    lengths: &[u32],
) {
    debug_assert_eq!(dst_dims.len(), src_dims.len());
    debug_assert_eq!(dst_dims.len(), lengths.len());
    for rel in MultiIndexIter::new(lengths) {
        let src_idx: Vec<u32> = rel.iter().zip(src_offset).map(|(r, o)| r + o).collect();
        let dst_idx: Vec<u32> = rel.iter().zip(dst_offset).map(|(r, o)| r + o).collect();
        let s = row_major_linear(&src_idx, src_dims);
        let d = row_major_linear(&dst_idx, dst_dims);
        dst[d] = src[s];
    }
}

/// Permutes dimensions per `perm`, a permutation of `[0..rank)`.
pub fn transpose<T: Copy>(dst: &mut [T], src: &[T], src_dims: &[u32], perm: &[usize]) -> Result<()> {
    if perm.len() != src_dims.len() {
        return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with("transpose permutation rank mismatch".to_string())
            .build());
    }
    let dst_dims: Vec<u32> = perm.iter().map(|&p| src_dims[p]).collect();
    for src_idx in MultiIndexIter::new(src_dims) {
        let dst_idx: Vec<u32> = perm.iter().map(|&p| src_idx[p]).collect();
        let s = row_major_linear(&src_idx, src_dims);
        let d = row_major_linear(&dst_idx, &dst_dims);
        dst[d] = src[s];
    }
    Ok(())
}

/// Inserts `edge_low`/`edge_high`/`interior` padding per dimension, filling
/// with `padding_value`. Negative paddings are invalid (`spec.md` §4.9);
/// `edge_low`/`edge_high` are signed to let callers reject them explicitly,
/// but this kernel assumes the dispatcher already did so (the dispatcher
/// validates `spec.md`'s closed preconditions before calling into kernels).
pub fn pad<T: Copy>(
    dst: &mut [T],
    dst_dims: &[u32],
    src: &[T],
    src_dims: &[u32],
    edge_low: &[u32],
    interior: &[u32],
    padding_value: T,
) {
    dst.iter_mut().for_each(|d| *d = padding_value);
    for src_idx in MultiIndexIter::new(src_dims) {
        let dst_idx: Vec<u32> = src_idx
            .iter()
            .enumerate()
            .map(|(i, &v)| edge_low[i] + v * (interior[i] + 1))
            .collect();
        let s = row_major_linear(&src_idx, src_dims);
        let d = row_major_linear(&dst_idx, dst_dims);
        dst[d] = src[s];
    }
}

/// Reverses iteration order along each dimension named in `dimensions`.
pub fn reverse<T: Copy>(dst: &mut [T], src: &[T], dims: &[u32], dimensions: &[usize]) {
    for idx in MultiIndexIter::new(dims) {
        let src_idx: Vec<u32> = idx
            .iter()
            .enumerate()
            .map(|(i, &v)| if dimensions.contains(&i) { dims[i] - 1 - v } else { v })
            .collect();
        let d = row_major_linear(&idx, dims);
        let s = row_major_linear(&src_idx, dims);
        dst[d] = src[s];
    }
}

/// Broadcasts `src` (whose all-ones dims extend) into a larger `dst_dims`.
pub fn broadcast<T: Copy>(dst: &mut [T], dst_dims: &[u32], src: &[T], src_dims: &[u32]) -> Result<()> {
    if src_dims.len() != dst_dims.len() {
        return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with("broadcast requires matching rank".to_string())
            .build());
    }
    for (s, d) in src_dims.iter().zip(dst_dims) {
        if *s != 1 && s != d {
            return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with(format!("cannot broadcast dim {s} into {d}"))
                .build());
        }
    }
    for dst_idx in MultiIndexIter::new(dst_dims) {
        let src_idx: Vec<u32> = dst_idx
            .iter()
            .zip(src_dims)
            .map(|(&v, &s)| if s == 1 { 0 } else { v })
            .collect();
        let d = row_major_linear(&dst_idx, dst_dims);
        let s = row_major_linear(&src_idx, src_dims);
        dst[d] = src[s];
    }
    Ok(())
}

/// Repeats `src` into `dst_dims` by integer repetition (every `dst_dims[i]`
/// must be a multiple of `src_dims[i]`).
pub fn tile<T: Copy>(dst: &mut [T], dst_dims: &[u32], src: &[T], src_dims: &[u32]) -> Result<()> {
    if src_dims.len() != dst_dims.len() {
        return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with("tile requires matching rank".to_string())
            .build());
    }
    for (s, d) in src_dims.iter().zip(dst_dims) {
        if *s == 0 || d % s != 0 {
            return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with(format!("tile destination dim {d} is not a multiple of source dim {s}"))
                .build());
        }
    }
    for dst_idx in MultiIndexIter::new(dst_dims) {
        let src_idx: Vec<u32> = dst_idx.iter().zip(src_dims).map(|(&v, &s)| v % s).collect();
        let d = row_major_linear(&dst_idx, dst_dims);
        let s = row_major_linear(&src_idx, src_dims);
        dst[d] = src[s];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_then_inverse_perm_is_identity() {
        let src = [1, 2, 3, 4, 5, 6];
        let dims = [2u32, 3];
        let mut transposed = [0; 6];
        transpose(&mut transposed, &src, &dims, &[1, 0]).unwrap();
        let transposed_dims = [3u32, 2];
        let mut back = [0; 6];
        transpose(&mut back, &transposed, &transposed_dims, &[1, 0]).unwrap();
        assert_eq!(back, src);
    }

    #[test]
    fn reverse_twice_is_identity() {
        let src = [1, 2, 3, 4];
        let dims = [4u32];
        let mut once = [0; 4];
        reverse(&mut once, &src, &dims, &[0]);
        let mut twice = [0; 4];
        reverse(&mut twice, &once, &dims, &[0]);
        assert_eq!(twice, src);
    }

    #[test]
    fn broadcast_extends_all_ones_dim() {
        let src = [1, 2, 3];
        let src_dims = [1u32, 3];
        let dst_dims = [2u32, 3];
        let mut dst = [0; 6];
        broadcast(&mut dst, &dst_dims, &src, &src_dims).unwrap();
        assert_eq!(dst, [1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn tile_repeats_integer_multiple() {
        let src = [1, 2];
        let src_dims = [2u32];
        let dst_dims = [6u32];
        let mut dst = [0; 6];
        tile(&mut dst, &dst_dims, &src, &src_dims).unwrap();
        assert_eq!(dst, [1, 2, 1, 2, 1, 2]);
    }

    #[test]
    fn pad_fills_edges_with_padding_value() {
        let src = [1, 2];
        let src_dims = [2u32];
        let dst_dims = [4u32];
        let mut dst = [0; 4];
        pad(&mut dst, &dst_dims, &src, &src_dims, &[1], &[0], -1);
        assert_eq!(dst, [-1, 1, 2, -1]);
    }

    #[test]
    fn copy_rect_moves_a_sub_region() {
        let src = [1, 2, 3, 4, 5, 6, 7, 8, 9];
        let src_dims = [3u32, 3];
        let dst_dims = [2u32, 2];
        let mut dst = [0; 4];
        copy_rect(&mut dst, &dst_dims, &[0, 0], &src, &src_dims, &[1, 1], &[2, 2]);
        assert_eq!(dst, [5, 6, 8, 9]);
    }
}
