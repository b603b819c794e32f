//! Type-generic kernels executed by the interpreter (spec component C11).
//!
//! Each kernel is a pure function over typed spans; length/shape
//! preconditions are checked by the dispatcher in `rt-vm`; a kernel itself
//! only reports the handful of errors the spec calls out explicitly
//! (division by zero, out-of-width shifts). Mirrors the way `ocl`'s
//! `OclPrm`/`OclScl` traits bound kernel-callable scalar types with
//! `num_traits`, generalized from OpenCL-kernel source generation to
//! directly-executed Rust functions.

mod arithmetic;
mod compare;
mod convert;
mod matmul;
mod reduce;
mod shape_ops;
mod transcendental;

pub use arithmetic::*;
pub use compare::*;
pub use convert::*;
pub use matmul::*;
pub use reduce::*;
pub use shape_ops::*;
pub use transcendental::*;

pub use rt_core::{Error, ErrorBuilder, ErrorKind, Result};
