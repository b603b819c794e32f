//! `ReduceSum/Min/Max<T>` (`spec.md` §4.9): reduction along a single
//! dimension, seeded from an identity supplied by `init_buffer`.

use rt_core::{ErrorBuilder, ErrorKind, Result};

fn dst_dims(src_dims: &[u32], dim: usize) -> Vec<u32> {
    src_dims
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != dim)
        .map(|(_, &d)| d)
        .collect()
}

fn strides(dims: &[u32]) -> Vec<usize> {
    let mut strides = vec![0usize; dims.len()];
    let mut acc = 1usize;
    for i in (0..dims.len()).rev() {
        strides[i] = acc;
        acc *= dims[i] as usize;
    }
    strides
}

fn reduce_generic<T: Copy>(
    dst: &mut [T],
    src: &[T],
    src_dims: &[u32],
    dim: usize,
    init: &[T],
    combine: impl Fn(T, T) -> T,
) -> Result<()> {
    if dim >= src_dims.len() {
        return Err(ErrorBuilder::new(ErrorKind::OutOfRange)
            .with(format!("reduction dimension {dim} out of range for rank {}", src_dims.len()))
            .build());
    }
    let out_dims = dst_dims(src_dims, dim);
    let out_len = out_dims.iter().product::<u32>() as usize;
    if init.len() != 1 && init.len() != out_len {
        return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with("init buffer must be a scalar or match the reduced shape".to_string())
            .build());
    }
    for (i, d) in dst.iter_mut().enumerate() {
        *d = if init.len() == 1 { init[0] } else { init[i] };
    }

    let src_strides = strides(src_dims);
    let total: usize = src_dims.iter().product::<u32>() as usize;
    let mut multi_index = vec![0u32; src_dims.len()];
    for linear in 0..total {
        let mut remaining = linear;
        for (i, &stride) in src_strides.iter().enumerate() {
            multi_index[i] = (remaining / stride) as u32;
            remaining %= stride;
        }
        let out_index: Vec<u32> = multi_index
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != dim)
            .map(|(_, &v)| v)
            .collect();
        let out_strides = strides(&out_dims);
        let out_linear: usize = out_index
            .iter()
            .zip(out_strides.iter())
            .map(|(&v, &s)| v as usize * s)
            .sum();
        dst[out_linear] = combine(dst[out_linear], src[linear]);
    }
    Ok(())
}

pub fn reduce_sum<T: Copy + std::ops::Add<Output = T>>(
    dst: &mut [T],
    src: &[T],
    src_dims: &[u32],
    dim: usize,
    init: &[T],
) -> Result<()> {
    reduce_generic(dst, src, src_dims, dim, init, |a, b| a + b)
}

pub fn reduce_min<T: Copy + PartialOrd>(
    dst: &mut [T],
    src: &[T],
    src_dims: &[u32],
    dim: usize,
    init: &[T],
) -> Result<()> {
    reduce_generic(dst, src, src_dims, dim, init, |a, b| if b < a { b } else { a })
}

pub fn reduce_max<T: Copy + PartialOrd>(
    dst: &mut [T],
    src: &[T],
    src_dims: &[u32],
    dim: usize,
    init: &[T],
) -> Result<()> {
    reduce_generic(dst, src, src_dims, dim, init, |a, b| if b > a { b } else { a })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_sum_matches_worked_example_s2() {
        // spec.md S2: [[1,2,3],[4,5,6]] summed along dim=1 -> [6.0, 15.0]
        let src = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut dst = [0.0f32; 2];
        reduce_sum(&mut dst, &src, &[2, 3], 1, &[0.0f32]).unwrap();
        assert_eq!(dst, [6.0, 15.0]);
    }

    #[test]
    fn reduce_min_over_leading_dimension() {
        let src = [5, 1, 9, 2];
        let mut dst = [0; 2];
        reduce_min(&mut dst, &src, &[2, 2], 0, &[i32::MAX]).unwrap();
        assert_eq!(dst, [5, 1]);
    }

    #[test]
    fn rejects_dimension_out_of_range() {
        let src = [1, 2, 3, 4];
        let mut dst = [0; 2];
        let err = reduce_sum(&mut dst, &src, &[2, 2], 5, &[0]).unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::OutOfRange);
    }
}
