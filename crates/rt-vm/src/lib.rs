//! The virtual machine: stack and value types (C7), fetch-decode-execute
//! interpreter dispatch (C9), sequencer dispatch onto HAL command queues
//! (C10), and the process-wide `Instance` (C12).
//!
//! Mirrors the way `ocl` layers a `ProQue`'s convenience surface over the
//! lower-level `Context`/`Queue`/`Kernel` primitives: `Instance` is the
//! thing a host application actually constructs, `Interpreter`/`Sequencer`
//! are the two dispatch strategies it chooses between per `spec.md` §4.8.

mod instance;
mod interpreter;
mod linker;
mod sequencer;
mod stack;
mod value;

pub use instance::{DebugServer, Instance};
pub use interpreter::{CallKind, HalRequest, Interpreter};
pub use linker::{Linker, ModuleId};
pub use sequencer::{ExecutableResolver, Sequencer};
pub use stack::{Stack, StackFrame};
pub use value::{Scalar, Value};

pub use rt_core::{Error, ErrorBuilder, ErrorKind, Result};
