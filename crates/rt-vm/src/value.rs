//! Slot values: empty, a `BufferView`, or a builtin scalar (`spec.md` §3).

use rt_hal::BufferView;

/// A scalar held directly in a stack slot rather than behind a buffer
/// view, used for loop counters, predicates and other small control-flow
/// values that never need device residency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Scalar {
    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::I8(v) => v as i64,
            Scalar::I16(v) => v as i64,
            Scalar::I32(v) => v as i64,
            Scalar::I64(v) => v,
            Scalar::F32(v) => v as i64,
            Scalar::F64(v) => v as i64,
        }
    }

    pub fn is_truthy(self) -> bool {
        self.as_i64() != 0
    }
}

/// The contents of one stack slot (`spec.md` §3: "empty, a BufferView, or a
/// scalar of a builtin type").
#[derive(Debug, Clone)]
pub enum Value {
    Empty,
    Buffer(BufferView),
    Scalar(Scalar),
}

impl Value {
    pub fn as_buffer(&self) -> Option<&BufferView> {
        match self {
            Value::Buffer(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Scalar(s) => Some(*s),
            _ => None,
        }
    }
}
