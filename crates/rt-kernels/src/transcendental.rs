//! `Exp/Log/Rsqrt/Cos/Sin/Tanh/Atan2<T>` (`spec.md` §4.9).
//!
//! Real-valued; NaN propagates by construction since these all delegate to
//! `num_traits::Float`'s `std`-backed implementations.

use num_traits::Float;

macro_rules! unary_transcendental {
    ($name:ident, $method:ident) => {
        pub fn $name<T: Float>(dst: &mut [T], src: &[T]) {
            debug_assert_eq!(dst.len(), src.len());
            for (d, s) in dst.iter_mut().zip(src) {
                *d = s.$method();
            }
        }
    };
}

unary_transcendental!(exp, exp);
unary_transcendental!(ln, ln);
unary_transcendental!(cos, cos);
unary_transcendental!(sin, sin);
unary_transcendental!(tanh, tanh);

/// `1 / sqrt(x)`, not provided directly by `num_traits::Float`.
pub fn rsqrt<T: Float>(dst: &mut [T], src: &[T]) {
    debug_assert_eq!(dst.len(), src.len());
    for (d, s) in dst.iter_mut().zip(src) {
        *d = T::one() / s.sqrt();
    }
}

pub fn atan2<T: Float>(dst: &mut [T], lhs: &[T], rhs: &[T]) {
    debug_assert_eq!(dst.len(), lhs.len());
    debug_assert_eq!(dst.len(), rhs.len());
    for i in 0..dst.len() {
        dst[i] = lhs[i].atan2(rhs[i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exp_of_zero_is_one() {
        let mut dst = [0.0f64; 1];
        exp(&mut dst, &[0.0f64]);
        assert!((dst[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rsqrt_of_four_is_half() {
        let mut dst = [0.0f32; 1];
        rsqrt(&mut dst, &[4.0f32]);
        assert!((dst[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn nan_propagates_through_sin() {
        let mut dst = [0.0f32; 1];
        sin(&mut dst, &[f32::NAN]);
        assert!(dst[0].is_nan());
    }
}
