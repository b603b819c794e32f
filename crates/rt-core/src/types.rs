//! The builtin scalar type registry (spec component C1).

use crate::error::{ErrorBuilder, ErrorKind, Result};

/// A builtin scalar element type, or `Opaque` for types the runtime does not
/// interpret (e.g. user-defined or not-yet-lowered element kinds).
///
/// The 8-bit wire index matches `FromTypeIndex` in the bytecode grammar:
/// `0..=6` are the concrete scalars in declaration order below, `7` is
/// `Opaque`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Type {
    I8 = 0,
    I16 = 1,
    I32 = 2,
    I64 = 3,
    F16 = 4,
    F32 = 5,
    F64 = 6,
    Opaque = 7,
}

impl Type {
    /// Looks up a `Type` by its 8-bit wire index.
    ///
    /// Returns `OutOfRange` for any value outside the closed enumeration,
    /// matching the decoder's "never read past the grammar" invariant.
    pub fn from_type_index(index: u8) -> Result<Type> {
        Ok(match index {
            0 => Type::I8,
            1 => Type::I16,
            2 => Type::I32,
            3 => Type::I64,
            4 => Type::F16,
            5 => Type::F32,
            6 => Type::F64,
            7 => Type::Opaque,
            other => {
                return Err(ErrorBuilder::new(ErrorKind::OutOfRange)
                    .with(format!("type index {other} is not a valid builtin type"))
                    .build())
            }
        })
    }

    /// The wire index for this type, the inverse of [`Type::from_type_index`].
    pub fn type_index(self) -> u8 {
        self as u8
    }

    /// Whether this is one of the concrete scalars (i.e. not `Opaque`).
    ///
    /// Callers must check this before sizing memory by [`Type::element_size`];
    /// `Opaque` has no defined size.
    pub fn is_builtin(self) -> bool {
        !matches!(self, Type::Opaque)
    }

    /// Bytes occupied by one element of this type.
    ///
    /// Returns `InvalidArgument` for `Opaque`, since its size is undefined
    /// and callers must not use it to size typed memory.
    pub fn element_size(self) -> Result<usize> {
        Ok(match self {
            Type::I8 => 1,
            Type::I16 => 2,
            Type::I32 => 4,
            Type::I64 => 8,
            Type::F16 => 2,
            Type::F32 => 4,
            Type::F64 => 8,
            Type::Opaque => {
                return Err(ErrorBuilder::new(ErrorKind::InvalidArgument)
                    .with("opaque types have no element size".to_string())
                    .build())
            }
        })
    }

    /// True for the signed/unsigned integer scalars.
    pub fn is_integer(self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I32 | Type::I64)
    }

    /// True for the floating point scalars.
    pub fn is_float(self) -> bool {
        matches!(self, Type::F16 | Type::F32 | Type::F64)
    }

    /// A short debug string for disassembly (`i32`, `f32`, `opaque`, ...).
    pub fn debug_string(self) -> &'static str {
        match self {
            Type::I8 => "i8",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::F16 => "f16",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::Opaque => "opaque",
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.debug_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_declared_index() {
        for idx in 0u8..=7 {
            let ty = Type::from_type_index(idx).unwrap();
            assert_eq!(ty.type_index(), idx);
        }
    }

    #[test]
    fn rejects_out_of_range_index() {
        assert!(Type::from_type_index(8).is_err());
        assert!(Type::from_type_index(255).is_err());
    }

    #[test]
    fn opaque_has_no_element_size() {
        assert!(Type::Opaque.element_size().is_err());
        assert!(!Type::Opaque.is_builtin());
    }

    #[test]
    fn element_sizes_match_byte_widths() {
        assert_eq!(Type::I8.element_size().unwrap(), 1);
        assert_eq!(Type::I64.element_size().unwrap(), 8);
        assert_eq!(Type::F32.element_size().unwrap(), 4);
        assert_eq!(Type::F64.element_size().unwrap(), 8);
    }
}
