//! A minimal driver exposing plain host memory and an inert command queue.
//!
//! Useful on its own for tests and for placement-resolution exercises;
//! a real interpreter-backed device (one whose queue actually executes
//! `Dispatch` ops against kernels) is assembled by `rt-vm`, which knows
//! about the interpreter and must not be a dependency of `rt-hal`.

use std::sync::{atomic::AtomicU64, Arc};

use rt_core::{ErrorBuilder, ErrorKind, Result};

use crate::allocator::{Allocator, HostAllocator};
use crate::device::{Device, DeviceInfo};
use crate::driver::Driver;
use crate::executable::{ExecutableCache, ExecutableFormat, HostExecutableCache};
use crate::queue::{CommandQueue, InlineQueue, SubmissionBatch};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

fn reject_all_dispatch(_batch: &SubmissionBatch) -> Result<()> {
    Err(ErrorBuilder::new(ErrorKind::Unimplemented)
        .with("host_driver devices do not execute dispatches on their own".to_string())
        .build())
}

/// A `Driver` producing devices backed by [`HostAllocator`] and an
/// [`HostExecutableCache`] for the given `supported_formats`.
pub struct HostDriver {
    supported_formats: Vec<ExecutableFormat>,
}

impl HostDriver {
    pub fn new(supported_formats: Vec<ExecutableFormat>) -> HostDriver {
        HostDriver { supported_formats }
    }
}

impl Driver for HostDriver {
    fn name(&self) -> &str {
        "host"
    }

    fn enumerate_available_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(vec![DeviceInfo { name: "host".to_string(), queue_count: 1 }])
    }

    fn create_default_device(&self) -> Result<Device> {
        let id = NEXT_DEVICE_ID.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let allocator: Arc<dyn Allocator> = Arc::new(HostAllocator::new(id));
        let cache: Arc<dyn ExecutableCache> =
            Arc::new(HostExecutableCache::new(self.supported_formats.clone()));
        let queue: Arc<dyn CommandQueue> = Arc::new(InlineQueue::new(reject_all_dispatch));
        Ok(Device::new(
            id,
            DeviceInfo { name: "host".to_string(), queue_count: 1 },
            allocator,
            cache,
            vec![queue],
        ))
    }

    fn create_device(&self, _info: &DeviceInfo) -> Result<Device> {
        self.create_default_device()
    }
}
