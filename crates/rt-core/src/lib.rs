//! Scalar type registry, shapes, and the shared error taxonomy used across
//! the runtime's bytecode, HAL, kernel and VM layers.
//!
//! This crate plays the role `ocl-core` plays for `ocl`: the common,
//! dependency-free vocabulary that every higher layer builds on.

mod config;
mod error;
mod shape;
mod types;

pub use config::{Config, ConfigBuilder};
pub use error::{Error, ErrorBuilder, ErrorKind, Result};
pub use shape::Shape;
pub use types::Type;
