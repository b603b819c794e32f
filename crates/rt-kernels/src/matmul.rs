//! `MatMul<T,ACC>` (`spec.md` §4.9): `dst = bias + quantize(lhs · rhs,
//! mantissa, exponent)`, with a shared [`RuntimeState`] scratch/pool handle
//! held across invocations.

use parking_lot::Mutex;
use rt_core::{ErrorBuilder, ErrorKind, Result};

/// Scalars usable as MatMul operands or accumulators. Conversion goes
/// through `f64` as a common pivot; this loses precision only for `i64`
/// magnitudes beyond 2^53, which is outside what the interpreter backend's
/// reference kernels are expected to handle exactly (a SIMD/BLAS-backed
/// accumulator would use wider native arithmetic, but isn't in scope here).
pub trait MatMulScalar: Copy {
    fn to_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
}

macro_rules! impl_matmul_scalar {
    ($t:ty) => {
        impl MatMulScalar for $t {
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn from_f64(v: f64) -> $t {
                v as $t
            }
        }
    };
}

impl_matmul_scalar!(i8);
impl_matmul_scalar!(i16);
impl_matmul_scalar!(i32);
impl_matmul_scalar!(i64);
impl_matmul_scalar!(f32);
impl_matmul_scalar!(f64);

/// Held state shared across MatMul invocations: a thread pool placeholder
/// and reusable scratch memory, mirroring `spec.md`'s "Held `RuntimeState`
/// (thread pool, scratch) is shared across invocations."
///
/// The interpreter backend runs single-threaded per fiber (`spec.md` §5), so
/// the "thread pool" here is deliberately inert; it exists as the seam a
/// real parallel backend would plug into without changing the kernel's call
/// signature.
pub struct RuntimeState {
    scratch: Mutex<Vec<f64>>,
}

impl RuntimeState {
    pub fn new() -> RuntimeState {
        RuntimeState { scratch: Mutex::new(Vec::new()) }
    }

    fn with_scratch<R>(&self, len: usize, f: impl FnOnce(&mut [f64]) -> R) -> R {
        let mut scratch = self.scratch.lock();
        scratch.clear();
        scratch.resize(len, 0.0);
        f(&mut scratch)
    }
}

impl Default for RuntimeState {
    fn default() -> RuntimeState {
        RuntimeState::new()
    }
}

fn quantize(value: f64, mantissa: i32, exponent: i32) -> f64 {
    value * mantissa as f64 * 2f64.powi(exponent)
}

/// `lhs` is `m x k`, `rhs` is `k x n`, `dst`/`bias` are `m x n`.
/// `mantissa`/`exponent` are either length `1` (uniform quantization) or
/// length `m` (per-row quantization), per `spec.md` §4.9.
#[allow(clippy::too_many_arguments)]
pub fn matmul<T: MatMulScalar, Acc: MatMulScalar>(
    state: &RuntimeState,
    dst: &mut [Acc],
    lhs: &[T],
    rhs: &[T],
    m: usize,
    k: usize,
    n: usize,
    bias: &[Acc],
    mantissa: &[i32],
    exponent: &[i32],
) -> Result<()> {
    if lhs.len() != m * k || rhs.len() != k * n || dst.len() != m * n || bias.len() != m * n {
        return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
            .with("matmul operand shapes do not agree with (m, k, n)".to_string())
            .build());
    }
    let per_row = match (mantissa.len(), exponent.len()) {
        (1, 1) => false,
        (a, b) if a == m && b == m => true,
        _ => {
            return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                .with("mantissa/exponent must have length 1 or match dst rows".to_string())
                .build())
        }
    };

    state.with_scratch(m * n, |acc| {
        for row in 0..m {
            for col in 0..n {
                let mut sum = 0.0f64;
                for i in 0..k {
                    sum += lhs[row * k + i].to_f64() * rhs[i * n + col].to_f64();
                }
                acc[row * n + col] = sum;
            }
        }
        for row in 0..m {
            let (mant, exp) = if per_row { (mantissa[row], exponent[row]) } else { (mantissa[0], exponent[0]) };
            for col in 0..n {
                let idx = row * n + col;
                let quantized = quantize(acc[idx], mant, exp);
                dst[idx] = Acc::from_f64(quantized + bias[idx].to_f64());
            }
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_matches_worked_example_s4() {
        // spec.md S4: 2x3 times 3x2 f32 matrices with bias [1,1], unit quantization.
        let lhs = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let rhs = [7.0f32, 8.0, 9.0, 10.0, 11.0, 12.0];
        let bias = [1.0f32, 1.0, 1.0, 1.0];
        let state = RuntimeState::new();
        let mut dst = [0.0f32; 4];
        matmul(&state, &mut dst, &lhs, &rhs, 2, 3, 2, &bias, &[1], &[0]).unwrap();
        // plain product: [[58,64],[139,154]] + bias
        assert_eq!(dst, [59.0, 65.0, 140.0, 155.0]);
    }

    #[test]
    fn rejects_shape_mismatch() {
        let state = RuntimeState::new();
        let mut dst = [0.0f32; 4];
        let err = matmul(&state, &mut dst, &[1.0f32], &[1.0f32], 2, 3, 2, &[0.0f32; 4], &[1], &[0])
            .unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::InvalidArgument);
    }

    #[test]
    fn per_row_quantization_scales_each_row_independently() {
        let lhs = [1.0f32, 1.0];
        let rhs = [1.0f32, 1.0];
        let state = RuntimeState::new();
        let mut dst = [0.0f32; 1];
        // 1x2 times 2x1 -> single row, exercise per-row with length == m == 1.
        matmul(&state, &mut dst, &lhs, &rhs, 1, 2, 1, &[0.0f32], &[2], &[1]).unwrap();
        // sum = 2.0, quantize with mantissa=2, exponent=1 -> 2*2*2 = 8
        assert_eq!(dst, [8.0]);
    }
}
