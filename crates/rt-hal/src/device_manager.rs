//! DeviceManager (spec component C4, part three).

use std::sync::Arc;

use parking_lot::RwLock;
use rt_core::{ErrorBuilder, ErrorKind, Result};

use crate::allocator::Allocator;
use crate::buffer::{Buffer, DeviceSize};
use crate::device::{Device, DevicePlacement};
use crate::executable::ExecutableFormat;
use crate::memory::{BufferUsage, MemoryType};

/// Request passed to [`DeviceManager::resolve_placement`]: an ordered list
/// of acceptable executable formats, earliest-preferred.
#[derive(Debug, Clone)]
pub struct PlacementSpec {
    pub available_formats: Vec<ExecutableFormat>,
}

/// Thread-safe registry of devices (`spec.md` §4.3, §5).
///
/// Guarded by a single `parking_lot::RwLock`: reads (placement resolution,
/// allocator lookup) take a shared view; registration takes the exclusive
/// path, matching the "single mutex, shared reads / exclusive writes"
/// policy in `spec.md` §5.
pub struct DeviceManager {
    devices: RwLock<Vec<Device>>,
}

impl DeviceManager {
    pub fn new() -> DeviceManager {
        DeviceManager {
            devices: RwLock::new(Vec::new()),
        }
    }

    /// Registers `device`. Idempotent: registering the same device id twice
    /// returns `AlreadyExists` rather than duplicating the entry.
    pub fn register_device(&self, device: Device) -> Result<()> {
        let mut devices = self.devices.write();
        if devices.iter().any(|d| d.id() == device.id()) {
            return Err(ErrorBuilder::new(ErrorKind::AlreadyExists)
                .with(format!("device {} is already registered", device.id()))
                .build());
        }
        devices.push(device);
        Ok(())
    }

    /// Unregisters the device with the given id. Idempotent: unregistering
    /// an id that isn't registered is a no-op, matching the spec's
    /// "idempotent for duplicate registration" wording applied symmetrically
    /// to removal.
    pub fn unregister_device(&self, device_id: u64) {
        let mut devices = self.devices.write();
        devices.retain(|d| d.id() != device_id);
    }

    pub fn registered_devices(&self) -> Vec<Device> {
        self.devices.read().clone()
    }

    /// Resolution policy (`spec.md` §4.3):
    /// iterate formats outermost (earlier-listed formats outrank later),
    /// devices innermost in registration order (ties go to the
    /// first-registered device); the first device whose executable cache
    /// can prepare the format wins.
    pub fn resolve_placement(&self, spec: &PlacementSpec) -> Result<DevicePlacement> {
        let devices = self.devices.read();
        for (rank, format) in spec.available_formats.iter().enumerate() {
            for device in devices.iter() {
                if device.executable_cache().can_prepare_format(*format) {
                    return Ok(DevicePlacement {
                        device: device.clone(),
                        queue_index: 0,
                        score: rank as u32,
                    });
                }
            }
        }
        Err(ErrorBuilder::new(ErrorKind::NotFound)
            .with("no registered device can prepare any of the requested formats".to_string())
            .build())
    }

    /// Returns an allocator whose buffers satisfy every device named in
    /// `placements`.
    pub fn find_compatible_allocator(
        &self,
        memory_type: MemoryType,
        usage: BufferUsage,
        placements: &[DevicePlacement],
    ) -> Result<Arc<dyn Allocator>> {
        if placements.is_empty() {
            return Err(ErrorBuilder::new(ErrorKind::FailedPrecondition)
                .with("find_compatible_allocator requires at least one placement".to_string())
                .build());
        }
        'candidates: for candidate in placements {
            let candidate_alloc = candidate.device.allocator();
            for other in placements {
                let ok = candidate_alloc.can_use_buffer_like(
                    other.device.allocator().as_ref(),
                    memory_type,
                    usage,
                    usage,
                );
                if !ok {
                    continue 'candidates;
                }
            }
            return Ok(candidate_alloc.clone());
        }
        Err(ErrorBuilder::new(ErrorKind::FailedPrecondition)
            .with("no allocator satisfies every requested placement".to_string())
            .build())
    }

    /// Best-effort device-visible allocation: falls back to host memory
    /// when no device-visible memory is available, always succeeding.
    pub fn try_allocate_device_visible_buffer(
        &self,
        placements: &[DevicePlacement],
        usage: BufferUsage,
        size: DeviceSize,
    ) -> Result<Buffer> {
        match self.allocate_device_visible_buffer(placements, usage, size) {
            Ok(buf) => Ok(buf),
            Err(_) => {
                let allocator = placements
                    .first()
                    .map(|p| p.device.allocator().clone())
                    .ok_or_else(|| {
                        ErrorBuilder::new(ErrorKind::FailedPrecondition)
                            .with("no placement to fall back to host allocation with".to_string())
                            .build()
                    })?;
                allocator.allocate(MemoryType::host_only(), usage, size)
            }
        }
    }

    /// Strict device-visible allocation: errors if no device-visible memory
    /// can be produced across `placements`.
    pub fn allocate_device_visible_buffer(
        &self,
        placements: &[DevicePlacement],
        usage: BufferUsage,
        size: DeviceSize,
    ) -> Result<Buffer> {
        let allocator =
            self.find_compatible_allocator(MemoryType::DEVICE_VISIBLE, usage, placements)?;
        allocator.allocate(MemoryType::DEVICE_VISIBLE, usage, size)
    }

    /// Strict device-local allocation: errors if no device-local memory can
    /// be produced across `placements`.
    pub fn allocate_device_local_buffer(
        &self,
        placements: &[DevicePlacement],
        usage: BufferUsage,
        size: DeviceSize,
    ) -> Result<Buffer> {
        let allocator =
            self.find_compatible_allocator(MemoryType::DEVICE_LOCAL, usage, placements)?;
        allocator.allocate(MemoryType::DEVICE_LOCAL, usage, size)
    }
}

impl Default for DeviceManager {
    fn default() -> DeviceManager {
        DeviceManager::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::HostAllocator;
    use crate::executable::{ExecutableCache, HostExecutableCache};
    use crate::device::DeviceInfo;

    fn device_with_formats(id: u64, formats: Vec<ExecutableFormat>) -> Device {
        let cache: Arc<dyn ExecutableCache> = Arc::new(HostExecutableCache::new(formats));
        let allocator: Arc<dyn Allocator> = Arc::new(HostAllocator::new(id));
        Device::new(
            id,
            DeviceInfo { name: format!("dev{id}"), queue_count: 1 },
            allocator,
            cache,
            vec![],
        )
    }

    #[test]
    fn resolve_placement_prefers_earlier_listed_format() {
        let mgr = DeviceManager::new();
        let d1 = device_with_formats(1, vec![ExecutableFormat(0xA)]);
        let d2 = device_with_formats(2, vec![ExecutableFormat(0xB)]);
        mgr.register_device(d1.clone()).unwrap();
        mgr.register_device(d2.clone()).unwrap();

        let placement = mgr
            .resolve_placement(&PlacementSpec {
                available_formats: vec![ExecutableFormat(0xB), ExecutableFormat(0xA)],
            })
            .unwrap();
        assert_eq!(placement.device.id(), 2);

        let placement = mgr
            .resolve_placement(&PlacementSpec {
                available_formats: vec![ExecutableFormat(0xA), ExecutableFormat(0xB)],
            })
            .unwrap();
        assert_eq!(placement.device.id(), 1);
    }

    #[test]
    fn resolve_placement_not_found_after_unregister() {
        let mgr = DeviceManager::new();
        let d1 = device_with_formats(1, vec![ExecutableFormat(0xA)]);
        mgr.register_device(d1).unwrap();
        mgr.unregister_device(1);

        let err = mgr
            .resolve_placement(&PlacementSpec { available_formats: vec![ExecutableFormat(0xA)] })
            .unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::NotFound);
    }

    #[test]
    fn duplicate_registration_is_already_exists() {
        let mgr = DeviceManager::new();
        let d1 = device_with_formats(1, vec![]);
        mgr.register_device(d1.clone()).unwrap();
        let err = mgr.register_device(d1).unwrap_err();
        assert_eq!(err.kind(), rt_core::ErrorKind::AlreadyExists);
    }
}
