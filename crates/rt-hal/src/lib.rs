//! Hardware abstraction layer: the object model the VM targets.
//!
//! Structured the way `ocl::standard` structures `Device`/`Queue`/`Buffer`/
//! `Context` around a lower-level core (here `rt_core`), but generalized
//! past a single vendor API to the pluggable multi-device model `spec.md`
//! §2/§4 describes.

mod allocator;
mod buffer;
mod device;
mod device_manager;
mod driver;
mod executable;
mod host_driver;
mod memory;
mod queue;

pub use allocator::{Allocator, HostAllocator};
pub use buffer::{Buffer, BufferView, DeviceSize};
pub use device::{Device, DeviceInfo, DevicePlacement};
pub use device_manager::{DeviceManager, PlacementSpec};
pub use driver::Driver;
pub use executable::{
    CachingMode, DebugInfo, Executable, ExecutableCache, ExecutableFormat, ExecutableSpec,
    HostExecutableCache,
};
pub use host_driver::HostDriver;
pub use memory::{BufferUsage, MemoryType};
pub use queue::{CommandOp, CommandQueue, FenceValue, InlineQueue, SubmissionBatch};

pub use rt_core::{Error, ErrorBuilder, ErrorKind, Result};
