//! `CompareEQ/NE/LT/LE/GT/GE<T>` (`spec.md` §4.9).

/// The six comparison predicates shared by integer and float compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparePredicate {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// `dst[i] = (lhs[i] op rhs[i]) ? 1 : 0`; `dst` is `u8`-bitmap semantics.
///
/// Shapes (and therefore slice lengths) must match; this is a dispatcher
/// precondition, asserted here rather than silently truncated.
pub fn compare<T: PartialOrd>(pred: ComparePredicate, dst: &mut [u8], lhs: &[T], rhs: &[T]) {
    debug_assert_eq!(lhs.len(), rhs.len());
    debug_assert_eq!(lhs.len(), dst.len());
    for ((d, a), b) in dst.iter_mut().zip(lhs).zip(rhs) {
        let result = match pred {
            ComparePredicate::Eq => a == b,
            ComparePredicate::Ne => a != b,
            ComparePredicate::Lt => a < b,
            ComparePredicate::Le => a <= b,
            ComparePredicate::Gt => a > b,
            ComparePredicate::Ge => a >= b,
        };
        *d = result as u8;
    }
}

/// `dst[i] = cond[i] ? lhs[i] : rhs[i]`. `cond` is `u8`-bitmap.
pub fn select<T: Copy>(dst: &mut [T], cond: &[u8], lhs: &[T], rhs: &[T]) {
    debug_assert_eq!(cond.len(), lhs.len());
    debug_assert_eq!(cond.len(), rhs.len());
    debug_assert_eq!(cond.len(), dst.len());
    for (((d, c), a), b) in dst.iter_mut().zip(cond).zip(lhs).zip(rhs) {
        *d = if *c != 0 { *a } else { *b };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_lt_produces_bitmap() {
        let lhs = [1i32, 2, 3];
        let rhs = [3i32, 2, 1];
        let mut dst = [0u8; 3];
        compare(ComparePredicate::Lt, &mut dst, &lhs, &rhs);
        assert_eq!(dst, [1, 0, 0]);
    }

    #[test]
    fn select_picks_lhs_when_cond_true() {
        let cond = [1u8, 0, 1];
        let lhs = [10i32, 20, 30];
        let rhs = [1i32, 2, 3];
        let mut dst = [0i32; 3];
        select(&mut dst, &cond, &lhs, &rhs);
        assert_eq!(dst, [10, 2, 30]);
    }
}
