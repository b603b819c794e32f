//! `Convert<SRC,DST>` (`spec.md` §4.9).
//!
//! Float→int conversions truncate toward zero; int→smaller-int narrowing
//! saturates at the destination's bounds, matching the spec's contract
//! rather than Rust's default `as`-cast wraparound.

macro_rules! int_to_int {
    ($name:ident, $src:ty, $dst:ty) => {
        pub fn $name(dst: &mut [$dst], src: &[$src]) {
            debug_assert_eq!(dst.len(), src.len());
            for (d, s) in dst.iter_mut().zip(src) {
                let widened = *s as i128;
                let clamped = widened.clamp(<$dst>::MIN as i128, <$dst>::MAX as i128);
                *d = clamped as $dst;
            }
        }
    };
}

macro_rules! float_to_int {
    ($name:ident, $src:ty, $dst:ty) => {
        pub fn $name(dst: &mut [$dst], src: &[$src]) {
            debug_assert_eq!(dst.len(), src.len());
            for (d, s) in dst.iter_mut().zip(src) {
                let truncated = s.trunc();
                *d = if truncated.is_nan() {
                    0
                } else if truncated <= <$dst>::MIN as $src {
                    <$dst>::MIN
                } else if truncated >= <$dst>::MAX as $src {
                    <$dst>::MAX
                } else {
                    truncated as $dst
                };
            }
        }
    };
}

macro_rules! int_to_float {
    ($name:ident, $src:ty, $dst:ty) => {
        pub fn $name(dst: &mut [$dst], src: &[$src]) {
            debug_assert_eq!(dst.len(), src.len());
            for (d, s) in dst.iter_mut().zip(src) {
                *d = *s as $dst;
            }
        }
    };
}

macro_rules! float_to_float {
    ($name:ident, $src:ty, $dst:ty) => {
        pub fn $name(dst: &mut [$dst], src: &[$src]) {
            debug_assert_eq!(dst.len(), src.len());
            for (d, s) in dst.iter_mut().zip(src) {
                *d = *s as $dst;
            }
        }
    };
}

int_to_int!(convert_i8_to_i16, i8, i16);
int_to_int!(convert_i8_to_i32, i8, i32);
int_to_int!(convert_i8_to_i64, i8, i64);
int_to_int!(convert_i16_to_i8, i16, i8);
int_to_int!(convert_i16_to_i32, i16, i32);
int_to_int!(convert_i16_to_i64, i16, i64);
int_to_int!(convert_i32_to_i8, i32, i8);
int_to_int!(convert_i32_to_i16, i32, i16);
int_to_int!(convert_i32_to_i64, i32, i64);
int_to_int!(convert_i64_to_i8, i64, i8);
int_to_int!(convert_i64_to_i16, i64, i16);
int_to_int!(convert_i64_to_i32, i64, i32);

float_to_int!(convert_f32_to_i8, f32, i8);
float_to_int!(convert_f32_to_i16, f32, i16);
float_to_int!(convert_f32_to_i32, f32, i32);
float_to_int!(convert_f32_to_i64, f32, i64);
float_to_int!(convert_f64_to_i8, f64, i8);
float_to_int!(convert_f64_to_i16, f64, i16);
float_to_int!(convert_f64_to_i32, f64, i32);
float_to_int!(convert_f64_to_i64, f64, i64);

int_to_float!(convert_i8_to_f32, i8, f32);
int_to_float!(convert_i16_to_f32, i16, f32);
int_to_float!(convert_i32_to_f32, i32, f32);
int_to_float!(convert_i64_to_f32, i64, f32);
int_to_float!(convert_i8_to_f64, i8, f64);
int_to_float!(convert_i16_to_f64, i16, f64);
int_to_float!(convert_i32_to_f64, i32, f64);
int_to_float!(convert_i64_to_f64, i64, f64);

float_to_float!(convert_f32_to_f64, f32, f64);
float_to_float!(convert_f64_to_f32, f64, f32);

/// `Convert<T,T>` is always the identity (`spec.md` §8 round-trip law).
pub fn convert_identity<T: Copy>(dst: &mut [T], src: &[T]) {
    debug_assert_eq!(dst.len(), src.len());
    dst.copy_from_slice(src);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowing_int_saturates() {
        let mut dst = [0i8; 2];
        convert_i32_to_i8(&mut dst, &[1000, -1000]);
        assert_eq!(dst, [i8::MAX, i8::MIN]);
    }

    #[test]
    fn float_to_int_truncates_toward_zero() {
        let mut dst = [0i32; 2];
        convert_f32_to_i32(&mut dst, &[1.9, -1.9]);
        assert_eq!(dst, [1, -1]);
    }

    #[test]
    fn float_to_int_saturates_out_of_range() {
        let mut dst = [0i8; 1];
        convert_f32_to_i8(&mut dst, &[1e9]);
        assert_eq!(dst, [i8::MAX]);
    }

    #[test]
    fn identity_convert_is_id() {
        let mut dst = [0i32; 3];
        convert_identity(&mut dst, &[1, 2, 3]);
        assert_eq!(dst, [1, 2, 3]);
    }
}
