//! Device (spec component C4, part one).

use std::sync::Arc;

use crate::allocator::Allocator;
use crate::executable::ExecutableCache;
use crate::queue::CommandQueue;

/// Static information about a device, as enumerated by a [`crate::Driver`]
/// (mirrors `ocl_core::DeviceInfoResult`'s role, narrowed to what placement
/// resolution and allocator matching need).
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub queue_count: usize,
}

struct DeviceInner {
    id: u64,
    info: DeviceInfo,
    allocator: Arc<dyn Allocator>,
    executable_cache: Arc<dyn ExecutableCache>,
    queues: Vec<Arc<dyn CommandQueue>>,
}

/// A registered compute device: an allocator, an executable cache, and one
/// or more command queues.
///
/// Cheap to clone (an `Arc` handle), matching `ocl::standard::Device`.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    pub fn new(
        id: u64,
        info: DeviceInfo,
        allocator: Arc<dyn Allocator>,
        executable_cache: Arc<dyn ExecutableCache>,
        queues: Vec<Arc<dyn CommandQueue>>,
    ) -> Device {
        Device {
            inner: Arc::new(DeviceInner {
                id,
                info,
                allocator,
                executable_cache,
                queues,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.inner.info
    }

    pub fn allocator(&self) -> &Arc<dyn Allocator> {
        &self.inner.allocator
    }

    pub fn executable_cache(&self) -> &Arc<dyn ExecutableCache> {
        &self.inner.executable_cache
    }

    pub fn queue(&self, index: usize) -> Option<&Arc<dyn CommandQueue>> {
        self.inner.queues.get(index)
    }

    pub fn queue_count(&self) -> usize {
        self.inner.queues.len()
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.inner.id)
            .field("name", &self.inner.info.name)
            .finish()
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}
impl Eq for Device {}

/// A `(Device, queue_index, score)` hint produced by
/// [`crate::DeviceManager::resolve_placement`].
///
/// Must not outlive its `Device`'s registration (`spec.md` §3, invariant 5);
/// since `Device` is an `Arc` handle the value stays valid as a Rust object
/// regardless, but a `DevicePlacement` referring to an *unregistered*
/// device must not be used to submit new work — callers re-resolve instead
/// of caching placements across an unregister.
#[derive(Debug, Clone)]
pub struct DevicePlacement {
    pub device: Device,
    pub queue_index: usize,
    pub score: u32,
}
